//! Gauss-Legendre quadrature on finite intervals and on `[0, ∞)`.

use std::f64::consts::PI;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::error::SurfaceError;

/// How the Heston probability integrals over `[0, ∞)` are evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Quadrature {
    /// Fixed-degree rule under `u = (1 + x) / (1 - x)`.
    GaussLegendre { degree: usize },
    /// Recursive bisection until two refinements agree within `tolerance`.
    Adaptive { tolerance: f64, max_depth: usize },
}

impl Default for Quadrature {
    fn default() -> Self {
        Quadrature::GaussLegendre { degree: 64 }
    }
}

impl Quadrature {
    pub fn validate(&self) -> Result<()> {
        match *self {
            Quadrature::GaussLegendre { degree } if degree == 0 => {
                Err(SurfaceError::invalid("quadrature degree must be positive").into())
            }
            Quadrature::Adaptive { tolerance, .. } if tolerance.is_nan() || tolerance <= 0.0 => {
                Err(SurfaceError::invalid("adaptive quadrature tolerance must be positive").into())
            }
            _ => Ok(()),
        }
    }

    /// Integrates `f` over `[0, ∞)`.
    pub fn integrate_half_line<F>(&self, f: F) -> Result<f64>
    where
        F: Fn(f64) -> f64,
    {
        self.validate()?;
        let transformed = |x: f64| {
            let u = (1.0 + x) / (1.0 - x);
            f(u) * 2.0 / ((1.0 - x) * (1.0 - x))
        };
        match *self {
            Quadrature::GaussLegendre { degree } => {
                Ok(GaussLegendre::new(degree)?.integrate(transformed, -1.0, 1.0))
            }
            Quadrature::Adaptive {
                tolerance,
                max_depth,
            } => {
                let rule = GaussLegendre::new(ADAPTIVE_DEGREE)?;
                Ok(rule.integrate_adaptive(&transformed, -1.0, 1.0, tolerance, max_depth))
            }
        }
    }
}

const ADAPTIVE_DEGREE: usize = 15;

fn legendre_polynomial_and_derivative(n: usize, x: f64) -> (f64, f64) {
    if n == 0 {
        return (1.0, 0.0);
    }
    let mut previous = 1.0;
    let mut current = x;
    for k in 2..=n {
        let kf = k as f64;
        let next = ((2.0 * kf - 1.0) * x * current - (kf - 1.0) * previous) / kf;
        previous = current;
        current = next;
    }
    let derivative = (n as f64) * (x * current - previous) / (x * x - 1.0);
    (current, derivative)
}

/// Nodes and weights of the `n`-point rule on `[-1, 1]`, ascending.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussLegendre {
    nodes: Vec<f64>,
    weights: Vec<f64>,
}

impl GaussLegendre {
    pub fn new(n: usize) -> Result<Self> {
        if n == 0 {
            return Err(SurfaceError::invalid("Gauss-Legendre rule needs at least one node").into());
        }
        let mut nodes = vec![0.0; n];
        let mut weights = vec![0.0; n];
        let nf = n as f64;

        for i in 0..n.div_ceil(2) {
            // Newton iteration from the Tricomi initial guess.
            let mut z = (PI * (i as f64 + 0.75) / (nf + 0.5)).cos();
            for _ in 0..100 {
                let (p, dp) = legendre_polynomial_and_derivative(n, z);
                let dz = p / dp;
                z -= dz;
                if dz.abs() < 1e-15 {
                    break;
                }
            }
            let (_, dp) = legendre_polynomial_and_derivative(n, z);
            let w = 2.0 / ((1.0 - z * z) * dp * dp);
            nodes[i] = -z;
            nodes[n - 1 - i] = z;
            weights[i] = w;
            weights[n - 1 - i] = w;
        }
        Ok(Self { nodes, weights })
    }

    pub fn degree(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &[f64] {
        &self.nodes
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Integrates `f` over `[a, b]`; endpoints are never evaluated.
    pub fn integrate<F>(&self, f: F, a: f64, b: f64) -> f64
    where
        F: Fn(f64) -> f64,
    {
        let half_width = 0.5 * (b - a);
        let centre = 0.5 * (b + a);
        half_width
            * self
                .nodes
                .iter()
                .zip(&self.weights)
                .map(|(&x, &w)| w * f(half_width * x + centre))
                .sum::<f64>()
    }

    fn integrate_adaptive<F>(&self, f: &F, a: f64, b: f64, tolerance: f64, depth: usize) -> f64
    where
        F: Fn(f64) -> f64,
    {
        let whole = self.integrate(f, a, b);
        let mid = 0.5 * (a + b);
        let halves = self.integrate(f, a, mid) + self.integrate(f, mid, b);
        if depth == 0 || (whole - halves).abs() <= tolerance || !halves.is_finite() {
            return halves;
        }
        self.integrate_adaptive(f, a, mid, 0.5 * tolerance, depth - 1)
            + self.integrate_adaptive(f, mid, b, 0.5 * tolerance, depth - 1)
    }
}
