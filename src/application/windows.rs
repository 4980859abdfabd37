//! Supervised window generation for one-step-ahead sequence training.

use crate::domain::errors::ForecastError;

/// A fixed-length normalized input window and the scalar that follows it.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    pub input: Vec<f64>,
    pub target: f64,
}

/// Slice `series` into overlapping lookback windows with one-step-ahead
/// targets: for each i in lookback..len, input = series[i-lookback..i],
/// target = series[i]. Output is chronological (earliest window first),
/// which the pipeline's train/test split relies on.
pub fn make_windows(series: &[f64], lookback: usize) -> Result<Vec<Window>, ForecastError> {
    if lookback == 0 {
        return Err(ForecastError::InvalidRequest {
            reason: "lookback must be at least 1".to_string(),
        });
    }
    if series.len() <= lookback {
        return Err(ForecastError::InsufficientData {
            required: lookback + 1,
            actual: series.len(),
        });
    }

    let windows = (lookback..series.len())
        .map(|i| Window {
            input: series[i - lookback..i].to_vec(),
            target: series[i],
        })
        .collect();

    Ok(windows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_count_and_shape() {
        let series: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let windows = make_windows(&series, 60).unwrap();

        assert_eq!(windows.len(), 40);
        for w in &windows {
            assert_eq!(w.input.len(), 60);
        }
    }

    #[test]
    fn test_windows_are_chronological() {
        let series: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let windows = make_windows(&series, 3).unwrap();

        assert_eq!(windows.len(), 7);
        assert_eq!(windows[0].input, vec![0.0, 1.0, 2.0]);
        assert_eq!(windows[0].target, 3.0);
        assert_eq!(windows[6].input, vec![6.0, 7.0, 8.0]);
        assert_eq!(windows[6].target, 9.0);
    }

    #[test]
    fn test_series_equal_to_lookback_is_insufficient() {
        let series = vec![1.0; 60];
        let err = make_windows(&series, 60).unwrap_err();
        assert!(matches!(
            err,
            ForecastError::InsufficientData {
                required: 61,
                actual: 60
            }
        ));
    }

    #[test]
    fn test_zero_lookback_rejected() {
        let err = make_windows(&[1.0, 2.0], 0).unwrap_err();
        assert!(matches!(err, ForecastError::InvalidRequest { .. }));
    }
}
