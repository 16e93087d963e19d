//! Natural cubic spline used for discount curves and dividend-yield terms.

use anyhow::Result;

use crate::error::SurfaceError;

/// Behaviour outside the knot range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Extrapolation {
    /// Hold the end values.
    Flat,
    /// Continue the first/last cubic piece.
    #[default]
    Polynomial,
}

#[derive(Debug, Clone)]
pub struct NaturalCubicSpline {
    x: Vec<f64>,
    y: Vec<f64>,
    y2: Vec<f64>,
    extrapolation: Extrapolation,
}

impl NaturalCubicSpline {
    /// Builds a spline through `(x, y)`; `x` must be strictly increasing.
    ///
    /// A single knot degenerates to a constant.
    pub fn new(x: Vec<f64>, y: Vec<f64>, extrapolation: Extrapolation) -> Result<Self> {
        if x.len() != y.len() || x.is_empty() {
            return Err(SurfaceError::invalid(format!(
                "spline needs matching non-empty knots, got {} x and {} y",
                x.len(),
                y.len()
            ))
            .into());
        }
        if x.windows(2).any(|w| w[1] <= w[0]) {
            return Err(SurfaceError::invalid("spline knots must be strictly increasing").into());
        }
        if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
            return Err(SurfaceError::invalid("spline knots must be finite").into());
        }

        let n = x.len();
        let mut y2 = vec![0.0_f64; n];
        if n > 2 {
            let mut u = vec![0.0_f64; n - 1];
            for i in 1..(n - 1) {
                let sig = (x[i] - x[i - 1]) / (x[i + 1] - x[i - 1]);
                let p = sig * y2[i - 1] + 2.0;
                y2[i] = (sig - 1.0) / p;
                let ddydx =
                    (y[i + 1] - y[i]) / (x[i + 1] - x[i]) - (y[i] - y[i - 1]) / (x[i] - x[i - 1]);
                u[i] = (6.0 * ddydx / (x[i + 1] - x[i - 1]) - sig * u[i - 1]) / p;
            }
            for k in (0..(n - 1)).rev() {
                y2[k] = y2[k] * y2[k + 1] + u[k];
            }
        }

        Ok(Self {
            x,
            y,
            y2,
            extrapolation,
        })
    }

    pub fn evaluate(&self, xq: f64) -> f64 {
        let n = self.x.len();
        if n == 1 {
            return self.y[0];
        }
        if self.extrapolation == Extrapolation::Flat {
            if xq <= self.x[0] {
                return self.y[0];
            }
            if xq >= self.x[n - 1] {
                return self.y[n - 1];
            }
        }

        let (klo, khi) = if xq <= self.x[0] {
            (0, 1)
        } else if xq >= self.x[n - 1] {
            (n - 2, n - 1)
        } else {
            let khi = self.x.partition_point(|&knot| knot <= xq).min(n - 1);
            (khi - 1, khi)
        };

        let h = self.x[khi] - self.x[klo];
        let a = (self.x[khi] - xq) / h;
        let b = (xq - self.x[klo]) / h;

        a * self.y[klo]
            + b * self.y[khi]
            + ((a * a * a - a) * self.y2[klo] + (b * b * b - b) * self.y2[khi]) * (h * h) / 6.0
    }

    pub fn evaluate_many(&self, xs: &[f64]) -> Vec<f64> {
        xs.iter().map(|&x| self.evaluate(x)).collect()
    }
}
