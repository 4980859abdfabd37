//! Recurrent forecaster: a fixed sparse tanh reservoir driven over the
//! input window, with a linear readout over [final state, last input, bias]
//! trained by Adam on mean-squared error.
//!
//! The recurrent weights are scaled to a spectral radius below 1 and then
//! frozen; reservoir states are therefore a pure function of the window,
//! which keeps inference deterministic and makes the readout fit a convex
//! problem. The trained parameters serialize as a fixed-order weight list:
//! [input weights, recurrent weights row-major, readout weights].

use super::{Architecture, ModelBlob, ModelConfig, SequenceModel, TrainingConfig};
use crate::application::windows::Window;
use crate::domain::errors::ForecastError;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

#[derive(Debug)]
pub struct EchoStateNet {
    lookback: usize,
    reservoir_size: usize,
    spectral_radius: f64,
    input_scaling: f64,
    sparsity: f64,
    leak_rate: f64,
    w_in: Array1<f64>,
    w_res: Array2<f64>,
    w_out: Array1<f64>,
}

impl EchoStateNet {
    pub fn new(lookback: usize, cfg: &ModelConfig, seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_rng(&mut rand::rng()),
        };

        let h = cfg.reservoir_size;
        let w_in = Array1::from_shape_fn(h, |_| rng.random_range(-1.0..1.0) * cfg.input_scaling);

        let mut w_res = Array2::<f64>::zeros((h, h));
        for i in 0..h {
            for j in 0..h {
                if rng.random::<f64>() < cfg.sparsity {
                    w_res[[i, j]] = rng.random_range(-1.0..1.0);
                }
            }
        }

        let radius = estimate_spectral_radius(&w_res, 50, &mut rng);
        if radius > 1e-10 {
            w_res *= cfg.spectral_radius / radius;
        }

        Self {
            lookback,
            reservoir_size: h,
            spectral_radius: cfg.spectral_radius,
            input_scaling: cfg.input_scaling,
            sparsity: cfg.sparsity,
            leak_rate: cfg.leak_rate,
            w_in,
            w_res,
            // readout dimension: reservoir states + last input + bias
            w_out: Array1::zeros(h + 2),
        }
    }

    /// Rebuild from a persisted tag and weight list, validating shapes.
    pub fn from_blob(arch: &Architecture, weights: &[Vec<f64>]) -> Result<Self, ForecastError> {
        let Architecture::EchoState {
            lookback,
            reservoir_size,
            spectral_radius,
            input_scaling,
            sparsity,
            leak_rate,
        } = *arch;

        if weights.len() != 3 {
            return Err(ForecastError::CacheIncompatible {
                reason: format!("expected 3 weight arrays, found {}", weights.len()),
            });
        }

        let h = reservoir_size;
        let expect = |name: &str, got: usize, want: usize| {
            if got == want {
                Ok(())
            } else {
                Err(ForecastError::CacheIncompatible {
                    reason: format!("{name} has {got} values, architecture requires {want}"),
                })
            }
        };
        expect("input weights", weights[0].len(), h)?;
        expect("recurrent weights", weights[1].len(), h * h)?;
        expect("readout weights", weights[2].len(), h + 2)?;

        let w_res =
            Array2::from_shape_vec((h, h), weights[1].clone()).map_err(|e| {
                ForecastError::CacheIncompatible {
                    reason: format!("recurrent weights are not a {h}x{h} matrix: {e}"),
                }
            })?;

        Ok(Self {
            lookback,
            reservoir_size: h,
            spectral_radius,
            input_scaling,
            sparsity,
            leak_rate,
            w_in: Array1::from_vec(weights[0].clone()),
            w_res,
            w_out: Array1::from_vec(weights[2].clone()),
        })
    }

    /// Drive the reservoir over the window and return the readout features
    /// [final state, last input, bias].
    fn features(&self, window: &[f64]) -> Result<Array1<f64>, ForecastError> {
        if window.len() != self.lookback {
            return Err(ForecastError::ShapeMismatch {
                expected: self.lookback,
                actual: window.len(),
            });
        }

        let mut state = Array1::<f64>::zeros(self.reservoir_size);
        for &x in window {
            let pre = &self.w_in * x + self.w_res.dot(&state);
            let activated = pre.mapv(f64::tanh);
            state = &state * (1.0 - self.leak_rate) + &activated * self.leak_rate;
        }

        let last = window.last().copied().unwrap_or(0.0);
        let mut feats = Vec::with_capacity(self.reservoir_size + 2);
        feats.extend(state.iter());
        feats.push(last);
        feats.push(1.0);
        Ok(Array1::from_vec(feats))
    }
}

impl SequenceModel for EchoStateNet {
    fn lookback(&self) -> usize {
        self.lookback
    }

    fn train(&mut self, windows: &[Window], cfg: &TrainingConfig) -> Result<(), ForecastError> {
        if windows.is_empty() {
            return Err(ForecastError::InsufficientData {
                required: 1,
                actual: 0,
            });
        }

        // The recurrent weights stay frozen, so per-window features can be
        // computed once up front; each epoch is one full-batch Adam step on
        // the readout.
        let feats: Vec<Array1<f64>> = windows
            .iter()
            .map(|w| self.features(&w.input))
            .collect::<Result<_, _>>()?;
        let targets: Vec<f64> = windows.iter().map(|w| w.target).collect();

        let n = feats.len() as f64;
        let mut adam = Adam::new(self.reservoir_size + 2, cfg.learning_rate);
        let mut last_mse = f64::INFINITY;

        for epoch in 0..cfg.epochs {
            let mut grad = Array1::<f64>::zeros(self.reservoir_size + 2);
            let mut sq_err = 0.0;
            for (phi, &target) in feats.iter().zip(&targets) {
                let err = self.w_out.dot(phi) - target;
                sq_err += err * err;
                grad.scaled_add(2.0 * err / n, phi);
            }
            adam.step(&mut self.w_out, &grad);

            last_mse = sq_err / n;
            if epoch % 100 == 0 {
                debug!("epoch {}: mse {:.6}", epoch, last_mse);
            }
        }

        debug!(
            "training finished: {} windows, {} epochs, final mse {:.6}",
            windows.len(),
            cfg.epochs,
            last_mse
        );
        Ok(())
    }

    fn predict(&self, window: &[f64]) -> Result<f64, ForecastError> {
        let feats = self.features(window)?;
        Ok(self.w_out.dot(&feats))
    }

    fn to_blob(&self) -> ModelBlob {
        ModelBlob {
            architecture: Architecture::EchoState {
                lookback: self.lookback,
                reservoir_size: self.reservoir_size,
                spectral_radius: self.spectral_radius,
                input_scaling: self.input_scaling,
                sparsity: self.sparsity,
                leak_rate: self.leak_rate,
            },
            weights: vec![
                self.w_in.to_vec(),
                self.w_res.iter().cloned().collect(),
                self.w_out.to_vec(),
            ],
        }
    }
}

/// Largest absolute eigenvalue of `w`, estimated by power iteration.
fn estimate_spectral_radius(w: &Array2<f64>, iterations: usize, rng: &mut StdRng) -> f64 {
    let h = w.nrows();
    if h == 0 {
        return 0.0;
    }

    let mut v = Array1::from_shape_fn(h, |_| rng.random_range(0.1..1.0_f64));
    let norm0 = v.dot(&v).sqrt();
    v /= norm0;

    let mut radius = 0.0;
    for _ in 0..iterations {
        let next = w.dot(&v);
        let norm = next.dot(&next).sqrt();
        if norm < 1e-12 {
            return 0.0;
        }
        radius = norm;
        v = next / norm;
    }
    radius
}

/// Adam with the usual defaults; one step per full-batch gradient.
struct Adam {
    lr: f64,
    beta1: f64,
    beta2: f64,
    eps: f64,
    t: i32,
    m: Array1<f64>,
    v: Array1<f64>,
}

impl Adam {
    fn new(dim: usize, lr: f64) -> Self {
        Self {
            lr,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            t: 0,
            m: Array1::zeros(dim),
            v: Array1::zeros(dim),
        }
    }

    fn step(&mut self, params: &mut Array1<f64>, grad: &Array1<f64>) {
        self.t += 1;
        self.m = &self.m * self.beta1 + grad * (1.0 - self.beta1);
        self.v = &self.v * self.beta2 + &grad.mapv(|g| g * g) * (1.0 - self.beta2);

        let m_hat = &self.m / (1.0 - self.beta1.powi(self.t));
        let v_hat = &self.v / (1.0 - self.beta2.powi(self.t));
        let update = m_hat / (v_hat.mapv(f64::sqrt) + self.eps);
        params.scaled_add(-self.lr, &update);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_cfg() -> ModelConfig {
        ModelConfig {
            reservoir_size: 16,
            ..ModelConfig::default()
        }
    }

    fn ramp_windows(len: usize, lookback: usize) -> Vec<Window> {
        let series: Vec<f64> = (0..len).map(|i| i as f64 / (len - 1) as f64).collect();
        crate::application::windows::make_windows(&series, lookback).unwrap()
    }

    #[test]
    fn test_predict_rejects_wrong_window_length() {
        let net = EchoStateNet::new(10, &small_cfg(), Some(3));
        let err = net.predict(&[0.5; 7]).unwrap_err();
        assert!(matches!(
            err,
            ForecastError::ShapeMismatch {
                expected: 10,
                actual: 7
            }
        ));
    }

    #[test]
    fn test_train_rejects_empty_batch() {
        let mut net = EchoStateNet::new(10, &small_cfg(), Some(3));
        let err = net.train(&[], &TrainingConfig::default()).unwrap_err();
        assert!(matches!(err, ForecastError::InsufficientData { .. }));
    }

    #[test]
    fn test_prediction_is_deterministic() {
        let mut net = EchoStateNet::new(5, &small_cfg(), Some(3));
        net.train(
            &ramp_windows(40, 5),
            &TrainingConfig {
                epochs: 50,
                learning_rate: 0.01,
                seed: Some(3),
            },
        )
        .unwrap();

        let window = [0.1, 0.2, 0.3, 0.4, 0.5];
        let a = net.predict(&window).unwrap();
        let b = net.predict(&window).unwrap();
        assert_eq!(a.to_bits(), b.to_bits());
    }

    #[test]
    fn test_same_seed_builds_identical_nets() {
        let a = EchoStateNet::new(5, &small_cfg(), Some(9));
        let b = EchoStateNet::new(5, &small_cfg(), Some(9));
        assert_eq!(a.to_blob(), b.to_blob());
    }

    #[test]
    fn test_training_fits_linear_ramp() {
        let lookback = 8;
        let windows = ramp_windows(80, lookback);
        let mut net = EchoStateNet::new(lookback, &small_cfg(), Some(7));
        net.train(
            &windows,
            &TrainingConfig {
                epochs: 1500,
                learning_rate: 0.02,
                seed: Some(7),
            },
        )
        .unwrap();

        // One-step prediction on the last training window should land close
        // to its target.
        let last = windows.last().unwrap();
        let pred = net.predict(&last.input).unwrap();
        assert!(
            (pred - last.target).abs() < 0.05,
            "prediction {pred} too far from target {}",
            last.target
        );
    }

    #[test]
    fn test_blob_round_trip_is_lossless() {
        let net = EchoStateNet::new(6, &small_cfg(), Some(21));
        let blob = net.to_blob();
        let restored = EchoStateNet::from_blob(&blob.architecture, &blob.weights).unwrap();

        let window = [0.0, 0.2, 0.4, 0.6, 0.8, 1.0];
        assert_eq!(
            net.predict(&window).unwrap().to_bits(),
            restored.predict(&window).unwrap().to_bits()
        );
    }

    #[test]
    fn test_from_blob_rejects_truncated_weights() {
        let net = EchoStateNet::new(6, &small_cfg(), Some(21));
        let mut blob = net.to_blob();
        blob.weights[1].pop();

        let err = EchoStateNet::from_blob(&blob.architecture, &blob.weights).unwrap_err();
        assert!(matches!(err, ForecastError::CacheIncompatible { .. }));
    }

    #[test]
    fn test_reservoir_states_stay_bounded() {
        // tanh units keep every state component in [-1, 1] no matter how
        // long the window is.
        let lookback = 300;
        let net = EchoStateNet::new(lookback, &small_cfg(), Some(5));
        let window = vec![1.0; lookback];

        let feats = net.features(&window).unwrap();
        for v in feats.iter() {
            assert!(v.abs() <= 1.0 + 1e-12, "unbounded feature {v}");
        }
    }
}
