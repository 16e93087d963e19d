//! Ordered parameter schemas for the stochastic-volatility models.
//!
//! Each model keeps its parameters in a fixed-layout struct implementing
//! [`ModelParameters`]. The optimizer works on plain `Vec<f64>` vectors, and
//! the position of every parameter inside such a vector is fixed by the
//! struct's `NAMES` table rather than by any map iteration order.

use anyhow::Result;

use crate::error::SurfaceError;

/// Fixed-size, ordered parameter set of a model.
pub trait ModelParameters: Sized + Clone + Send + Sync + std::fmt::Debug {
    /// Parameter names in optimization-vector order.
    const NAMES: &'static [&'static str];

    /// Optimization vector, ordered as [`Self::NAMES`].
    fn to_vector(&self) -> Vec<f64>;

    /// Rebuilds the parameters from an optimization vector and validates them.
    fn from_vector(values: &[f64]) -> Result<Self>;

    /// Finite `(min, max)` search box per parameter, ordered as [`Self::NAMES`].
    fn bounds() -> Vec<(f64, f64)>;

    /// Closed interval of admissible values per parameter. May be unbounded and
    /// is never narrower than [`Self::bounds`].
    fn domain() -> Vec<(f64, f64)> {
        Self::bounds()
    }

    /// Rejects non-finite values and values outside [`Self::domain`].
    fn validate(&self) -> Result<()> {
        check_within_bounds(&self.to_vector(), &Self::domain(), Self::NAMES)
    }

    /// `(name, value)` pairs in vector order.
    fn named(&self) -> Vec<(&'static str, f64)> {
        Self::NAMES.iter().copied().zip(self.to_vector()).collect()
    }
}

/// Fails unless `values` has one entry per name.
pub fn check_length(values: &[f64], names: &[&str]) -> Result<()> {
    if values.len() != names.len() {
        return Err(SurfaceError::invalid(format!(
            "expected {} parameters ({}), got {}",
            names.len(),
            names.join(", "),
            values.len()
        ))
        .into());
    }
    Ok(())
}

/// Fails on the first non-finite value or value outside its bounds.
pub fn check_within_bounds(values: &[f64], bounds: &[(f64, f64)], names: &[&str]) -> Result<()> {
    check_length(values, names)?;
    for ((value, (lo, hi)), name) in values.iter().zip(bounds).zip(names) {
        if !value.is_finite() || value < lo || value > hi {
            return Err(SurfaceError::invalid(format!(
                "{} = {} outside [{}, {}]",
                name, value, lo, hi
            ))
            .into());
        }
    }
    Ok(())
}

/// Projects `values` onto the box.
pub fn clamp_to_bounds(values: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
    values
        .iter()
        .zip(bounds)
        .map(|(v, (lo, hi))| v.clamp(*lo, *hi))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_mismatch_names_parameters() {
        let err = check_length(&[1.0], &["a", "b"]).unwrap_err();
        assert!(err.to_string().contains("a, b"));
    }

    #[test]
    fn test_bounds_checks() {
        let bounds = [(0.0, 1.0), (-1.0, 1.0)];
        assert!(check_within_bounds(&[0.5, 0.0], &bounds, &["x", "y"]).is_ok());
        assert!(check_within_bounds(&[1.5, 0.0], &bounds, &["x", "y"]).is_err());
        assert!(check_within_bounds(&[f64::NAN, 0.0], &bounds, &["x", "y"]).is_err());
        assert_eq!(clamp_to_bounds(&[1.5, -2.0], &bounds), vec![1.0, -1.0]);
    }
}
