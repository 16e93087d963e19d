//! Loss metrics comparing two surfaces cell by cell.
//!
//! Cells where either side is not finite (missing quotes, failed
//! implied-volatility inversions) are left out of the mean.

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::error::SurfaceError;

/// Reduction applied to the elementwise errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LossMetric {
    /// Mean squared error
    Mse,
    /// Root mean squared error
    #[default]
    Rmse,
    /// Mean absolute error
    Mae,
}

impl LossMetric {
    pub fn evaluate(self, empirical: &[f64], model: &[f64]) -> Result<f64> {
        match self {
            LossMetric::Mse => mse(empirical, model),
            LossMetric::Rmse => rmse(empirical, model),
            LossMetric::Mae => mae(empirical, model),
        }
    }
}

impl fmt::Display for LossMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LossMetric::Mse => "MSE",
            LossMetric::Rmse => "RMSE",
            LossMetric::Mae => "MAE",
        };
        f.write_str(name)
    }
}

impl FromStr for LossMetric {
    type Err = SurfaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "MSE" => Ok(LossMetric::Mse),
            "RMSE" => Ok(LossMetric::Rmse),
            "MAE" => Ok(LossMetric::Mae),
            _ => Err(SurfaceError::invalid(format!("loss metric unknown: {}", s))),
        }
    }
}

/// Mean of `f(a - b)` over the pairs where both values are finite.
fn mean_error<F>(empirical: &[f64], model: &[f64], f: F) -> Result<f64>
where
    F: Fn(f64) -> f64,
{
    if empirical.len() != model.len() {
        return Err(SurfaceError::invalid(format!(
            "cannot compare {} empirical values with {} model values",
            empirical.len(),
            model.len()
        ))
        .into());
    }
    let (sum, count) = empirical
        .iter()
        .zip(model)
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .fold((0.0, 0usize), |(sum, count), (a, b)| (sum + f(a - b), count + 1));
    if count == 0 {
        return Err(SurfaceError::numerical("no finite pairs to compare").into());
    }
    Ok(sum / count as f64)
}

pub fn mse(empirical: &[f64], model: &[f64]) -> Result<f64> {
    mean_error(empirical, model, |e| e * e)
}

pub fn rmse(empirical: &[f64], model: &[f64]) -> Result<f64> {
    Ok(mse(empirical, model)?.sqrt())
}

pub fn mae(empirical: &[f64], model: &[f64]) -> Result<f64> {
    mean_error(empirical, model, f64::abs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_identical_surfaces_have_zero_loss() {
        let x = [1.0, 2.5, f64::NAN, 4.0];
        for metric in [LossMetric::Mse, LossMetric::Rmse, LossMetric::Mae] {
            assert_eq!(metric.evaluate(&x, &x).unwrap(), 0.0);
        }
    }

    #[test]
    fn test_rmse_is_root_of_mse() {
        let a = [1.0, 2.0, 3.0, 7.5];
        let b = [1.5, 1.0, 3.25, 4.0];
        assert_eq!(rmse(&a, &b).unwrap(), mse(&a, &b).unwrap().sqrt());
        assert_relative_eq!(mae(&a, &b).unwrap(), (0.5 + 1.0 + 0.25 + 3.5) / 4.0);
    }

    #[test]
    fn test_non_finite_pairs_are_skipped() {
        let a = [1.0, f64::NAN, 3.0];
        let b = [2.0, 5.0, f64::INFINITY];
        assert_eq!(mse(&a, &b).unwrap(), 1.0);

        let err = mse(&[f64::NAN], &[1.0]).unwrap_err();
        assert!(matches!(
            SurfaceError::classify(&err),
            Some(SurfaceError::Numerical(_))
        ));
        assert!(mae(&[1.0, 2.0], &[1.0]).is_err());
    }

    #[test]
    fn test_metric_names() {
        assert_eq!("rmse".parse::<LossMetric>().unwrap(), LossMetric::Rmse);
        assert_eq!(LossMetric::Mae.to_string(), "MAE");
        assert!("L2".parse::<LossMetric>().is_err());
    }
}
