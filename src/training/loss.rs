//! Loss functions and the percentage-error metric
//!
//! Loss selectors are parsed once at startup into [`LossKind`]. Unknown or
//! malformed names fall back to MSE with a warning unless strict selection
//! is requested.

use std::fmt;

use burn::nn::loss::{MseLoss, Reduction};
use burn::tensor::{backend::Backend, Tensor};
use tracing::warn;

use crate::training::transform::TargetTransform;
use crate::utils::error::{AreaError, Result};

const MAPE_EPSILON: f64 = 1e-7;
const RELATIVE_EPSILON: f64 = 1e-5;
const CUSTOM_PREFIX: &str = "custom_";

/// Training loss
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LossKind {
    /// Mean squared error in the active target space
    Mse,
    /// Mean absolute percentage error in the active target space
    Mape,
    /// `alpha * relative error of exp(values) + beta * squared error`.
    ///
    /// Always exponentiates, so it assumes log-space targets.
    Composite { alpha: f64, beta: f64 },
}

impl LossKind {
    /// Parse a selector (`mse_keras`, `mape_keras`, `custom_<alpha>_<beta>`)
    pub fn parse(name: &str) -> std::result::Result<Self, String> {
        let lower = name.trim().to_lowercase();

        match lower.as_str() {
            "mse_keras" => Ok(LossKind::Mse),
            "mape_keras" => Ok(LossKind::Mape),
            custom if custom.starts_with(CUSTOM_PREFIX) => {
                let params: Vec<&str> = custom[CUSTOM_PREFIX.len()..].split('_').collect();
                match params.as_slice() {
                    [alpha, beta] => match (alpha.parse::<f64>(), beta.parse::<f64>()) {
                        (Ok(alpha), Ok(beta)) if alpha.is_finite() && beta.is_finite() => {
                            Ok(LossKind::Composite { alpha, beta })
                        }
                        _ => Err(format!("Malformed custom loss parameters in '{}'", name)),
                    },
                    _ => Err(format!(
                        "Custom loss '{}' must look like custom_<alpha>_<beta>",
                        name
                    )),
                }
            }
            _ => Err(format!("Unknown loss function '{}'", name)),
        }
    }

    /// Parse a selector, falling back to MSE on failure.
    ///
    /// With `strict` set, a bad selector is a configuration error instead.
    pub fn select(name: &str, strict: bool) -> Result<Self> {
        match Self::parse(name) {
            Ok(kind) => Ok(kind),
            Err(msg) if strict => Err(AreaError::Config(msg)),
            Err(msg) => {
                warn!("{}, falling back to mean squared error", msg);
                Ok(LossKind::Mse)
            }
        }
    }

    /// Loss between predictions and targets, both of shape [batch_size]
    pub fn forward<B: Backend>(&self, predictions: Tensor<B, 1>, targets: Tensor<B, 1>) -> Tensor<B, 1> {
        match self {
            LossKind::Mse => MseLoss::new().forward(predictions, targets, Reduction::Mean),
            LossKind::Mape => {
                let denom = targets.clone().abs().clamp_min(MAPE_EPSILON);
                (targets - predictions)
                    .abs()
                    .div(denom)
                    .mean()
                    .mul_scalar(100.0)
            }
            LossKind::Composite { alpha, beta } => {
                let squared = (targets.clone() - predictions.clone()).powf_scalar(2.0).mean();

                let true_areas = targets.exp();
                let pred_areas = predictions.exp();
                let denom = true_areas.clone().abs().clamp_min(RELATIVE_EPSILON);
                let relative = (true_areas - pred_areas).abs().div(denom).mean();

                relative.mul_scalar(*alpha) + squared.mul_scalar(*beta)
            }
        }
    }
}

impl fmt::Display for LossKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LossKind::Mse => write!(f, "mse_keras"),
            LossKind::Mape => write!(f, "mape_keras"),
            LossKind::Composite { alpha, beta } => write!(f, "custom_{}_{}", alpha, beta),
        }
    }
}

/// Mean relative error in percent, measured on areas.
///
/// In log mode both tensors are exponentiated first.
pub fn percentage_error<B: Backend>(
    predictions: Tensor<B, 1>,
    targets: Tensor<B, 1>,
    transform: TargetTransform,
) -> Tensor<B, 1> {
    let (predictions, targets) = match transform {
        TargetTransform::Log => (predictions.exp(), targets.exp()),
        TargetTransform::Identity => (predictions, targets),
    };

    let denom = targets.clone().abs().clamp_min(RELATIVE_EPSILON);
    (targets - predictions)
        .abs()
        .div(denom)
        .mean()
        .mul_scalar(100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::{ElementConversion, TensorData};
    use crate::utils::logging::capture_warnings;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn tensor(values: &[f32]) -> Tensor<TestBackend, 1> {
        let device = Default::default();
        Tensor::from_floats(TensorData::new(values.to_vec(), [values.len()]), &device)
    }

    fn scalar(t: Tensor<TestBackend, 1>) -> f64 {
        t.into_scalar().elem::<f64>()
    }

    #[test]
    fn test_parse_known_names() {
        assert_eq!(LossKind::parse("mse_keras"), Ok(LossKind::Mse));
        assert_eq!(LossKind::parse("MAPE_Keras"), Ok(LossKind::Mape));
        assert_eq!(
            LossKind::parse("custom_0.7_0.3"),
            Ok(LossKind::Composite {
                alpha: 0.7,
                beta: 0.3
            })
        );
    }

    #[test]
    fn test_malformed_custom_falls_back() {
        assert!(LossKind::parse("custom_bad_0.3").is_err());
        assert!(LossKind::parse("custom_0.7").is_err());
        assert_eq!(LossKind::select("custom_bad_0.3", false).unwrap(), LossKind::Mse);
        assert_eq!(LossKind::select("huber", false).unwrap(), LossKind::Mse);
    }

    #[test]
    fn test_malformed_custom_warns() {
        let (kind, logs) = capture_warnings(|| LossKind::select("custom_bad_0.3", false));
        assert_eq!(kind.unwrap(), LossKind::Mse);
        assert!(logs.contains("WARN"), "{}", logs);
        assert!(logs.contains("falling back to mean squared error"), "{}", logs);

        let (_, logs) = capture_warnings(|| LossKind::select("custom_0.7_0.3", false));
        assert!(logs.is_empty(), "{}", logs);
    }

    #[test]
    fn test_strict_selection_errors() {
        let err = LossKind::select("huber", true).unwrap_err();
        assert!(matches!(err, AreaError::Config(_)));
        assert!(LossKind::select("mse_keras", true).is_ok());
    }

    #[test]
    fn test_display_round_trip() {
        let kind = LossKind::Composite {
            alpha: 0.7,
            beta: 0.3,
        };
        assert_eq!(kind.to_string(), "custom_0.7_0.3");
        assert_eq!(LossKind::parse(&kind.to_string()), Ok(kind));
    }

    #[test]
    fn test_mse_value() {
        let loss = LossKind::Mse.forward(tensor(&[1.0, 3.0]), tensor(&[2.0, 5.0]));
        assert!((scalar(loss) - 2.5).abs() < 1e-6);
    }

    #[test]
    fn test_mape_value() {
        let loss = LossKind::Mape.forward(tensor(&[9.0, 22.0]), tensor(&[10.0, 20.0]));
        assert!((scalar(loss) - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_composite_value() {
        let kind = LossKind::Composite {
            alpha: 0.7,
            beta: 0.3,
        };
        let t = 2.0f32.ln();
        let loss = kind.forward(tensor(&[t]), tensor(&[t]));
        assert!(scalar(loss).abs() < 1e-6);

        // prediction ln(1) vs target ln(2): relative 0.5, squared ln(2)^2
        let loss = kind.forward(tensor(&[0.0]), tensor(&[t]));
        let expected = 0.7 * 0.5 + 0.3 * (2.0f64.ln()).powi(2);
        assert!((scalar(loss) - expected).abs() < 1e-4);
    }

    #[test]
    fn test_percentage_error_modes() {
        let err = percentage_error(tensor(&[9.0]), tensor(&[10.0]), TargetTransform::Identity);
        assert!((scalar(err) - 10.0).abs() < 1e-4);

        let err = percentage_error(
            tensor(&[9.0f32.ln()]),
            tensor(&[10.0f32.ln()]),
            TargetTransform::Log,
        );
        assert!((scalar(err) - 10.0).abs() < 1e-3);
    }

    #[test]
    fn test_percentage_error_zero_target_is_finite() {
        let err = percentage_error(tensor(&[0.5]), tensor(&[0.0]), TargetTransform::Identity);
        assert!(scalar(err).is_finite());
    }
}
