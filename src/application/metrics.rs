//! Fit-quality metrics for held-out evaluation.

/// Coefficient of determination between actual and predicted values.
///
/// R² = 1 - SS_res / SS_tot. Returns 0.0 when the actual series has zero
/// variance (R² is undefined there) or when the slices are empty or of
/// mismatched length.
pub fn r2_score(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() || actual.len() != predicted.len() {
        return 0.0;
    }

    let n = actual.len() as f64;
    let mean = actual.iter().sum::<f64>() / n;

    let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();
    let ss_res: f64 = actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| (a - p).powi(2))
        .sum();

    if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_prediction_scores_one() {
        let actual = [1.0, 2.0, 3.0, 4.0];
        assert!((r2_score(&actual, &actual) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_mean_prediction_scores_zero() {
        let actual = [1.0, 2.0, 3.0, 4.0];
        let mean_pred = [2.5; 4];
        assert!(r2_score(&actual, &mean_pred).abs() < 1e-12);
    }

    #[test]
    fn test_bad_prediction_scores_negative() {
        let actual = [1.0, 2.0, 3.0, 4.0];
        let inverted = [4.0, 3.0, 2.0, 1.0];
        assert!(r2_score(&actual, &inverted) < 0.0);
    }

    #[test]
    fn test_constant_actual_returns_zero() {
        assert_eq!(r2_score(&[5.0, 5.0, 5.0], &[5.0, 5.0, 5.0]), 0.0);
    }

    #[test]
    fn test_length_mismatch_returns_zero() {
        assert_eq!(r2_score(&[1.0, 2.0], &[1.0]), 0.0);
    }
}
