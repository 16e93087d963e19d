//! Hybrid-scheme simulation of the rough Bergomi model (`κ = 1`).
//!
//! Bennedsen, Lunde and Pakkanen (2017); McCrickerd and Pakkanen (2018).
//! The Volterra process is the exact integral over the most recent step plus
//! a Riemann-sum convolution of the kernel against earlier Brownian increments.

use anyhow::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use rayon::prelude::*;
use tracing::debug;

use super::RoughBergomiParameters;
use crate::models::{path_seed, SimulatedPaths, SimulationSettings};

/// Optimal evaluation point of the kernel on the k-th step (hybrid scheme, κ = 1).
fn discretisation(k: usize, alpha: f64) -> f64 {
    let k = k as f64;
    ((k.powf(alpha + 1.0) - (k - 1.0).powf(alpha + 1.0)) / (alpha + 1.0)).powf(1.0 / alpha)
}

/// Kernel weights `g(b_k / n)` with `g(x) = x^α`; entries 0 and 1 are zero
/// because the most recent step is integrated exactly.
pub fn kernel_weights(alpha: f64, steps: usize, steps_per_year: usize) -> Vec<f64> {
    let n = steps_per_year as f64;
    let mut gamma = vec![0.0; steps + 1];
    for (k, weight) in gamma.iter_mut().enumerate().skip(2) {
        *weight = if alpha.abs() < 1e-12 {
            1.0
        } else {
            (discretisation(k, alpha) / n).powf(alpha)
        };
    }
    gamma
}

/// Per-step law of `(ΔW, ∫ (t - s)^α dW)` as a Cholesky factor.
#[derive(Debug, Clone, Copy)]
struct StepCovariance {
    sqrt_dt: f64,
    loading: f64,
    residual: f64,
}

impl StepCovariance {
    fn new(alpha: f64, steps_per_year: usize) -> Self {
        let n = steps_per_year as f64;
        let var1 = 1.0 / n;
        let cov = 1.0 / ((alpha + 1.0) * n.powf(alpha + 1.0));
        let var2 = 1.0 / ((2.0 * alpha + 1.0) * n.powf(2.0 * alpha + 1.0));
        Self {
            sqrt_dt: var1.sqrt(),
            loading: cov / var1.sqrt(),
            residual: (var2 - cov * cov / var1).max(0.0).sqrt(),
        }
    }
}

/// Simulates `settings.num_paths` price and variance paths.
///
/// `drift` holds one log-price drift increment per step.
pub fn simulate(
    spot: f64,
    initial_variance: f64,
    parameters: &RoughBergomiParameters,
    settings: &SimulationSettings,
    drift: &[f64],
) -> Result<SimulatedPaths> {
    settings.validate()?;
    let steps = settings.steps();
    let dt = settings.dt();
    let alpha = 0.5 - parameters.hurst_index;
    let eta = parameters.volatility_of_volatility;
    let rho = parameters.wiener_correlation;
    let rho_bar = (1.0 - rho * rho).max(0.0).sqrt();
    let scale = (2.0 * alpha + 1.0).sqrt();

    let gamma = kernel_weights(alpha, steps, settings.steps_per_year);
    let covariance = StepCovariance::new(alpha, settings.steps_per_year);
    // Deterministic part of the variance exponent.
    let compensator: Vec<f64> = (0..=steps)
        .map(|i| 0.5 * eta * eta * (i as f64 * dt).powf(2.0 * alpha + 1.0))
        .collect();

    debug!(steps, num_paths = settings.num_paths, alpha, "simulating rough Bergomi paths");

    let rows: Vec<(Vec<f64>, Vec<f64>)> = (0..settings.num_paths)
        .into_par_iter()
        .map(|path| {
            let mut rng = StdRng::seed_from_u64(path_seed(settings.seed, path));
            let mut brownian = Vec::with_capacity(steps);
            let mut exact = Vec::with_capacity(steps);
            let mut independent = Vec::with_capacity(steps);
            for _ in 0..steps {
                let z1: f64 = StandardNormal.sample(&mut rng);
                let z2: f64 = StandardNormal.sample(&mut rng);
                let z3: f64 = StandardNormal.sample(&mut rng);
                brownian.push(covariance.sqrt_dt * z1);
                exact.push(covariance.loading * z1 + covariance.residual * z2);
                independent.push(covariance.sqrt_dt * z3);
            }

            let mut variances = Vec::with_capacity(steps + 1);
            variances.push(initial_variance);
            for i in 1..=steps {
                let convolved: f64 = (2..=i).map(|k| gamma[k] * brownian[i - k]).sum();
                let volterra = scale * (exact[i - 1] + convolved);
                variances.push(initial_variance * (eta * volterra - compensator[i]).exp());
            }

            let mut prices = Vec::with_capacity(steps + 1);
            let mut log_price = spot.ln();
            prices.push(spot);
            for i in 0..steps {
                let variance = variances[i];
                log_price += drift.get(i).copied().unwrap_or(0.0)
                    + variance.sqrt() * (rho * brownian[i] + rho_bar * independent[i])
                    - 0.5 * variance * dt;
                prices.push(log_price.exp());
            }
            (prices, variances)
        })
        .collect();

    let (prices, variances): (Vec<Vec<f64>>, Vec<Vec<f64>>) = rows.into_iter().unzip();
    Ok(SimulatedPaths {
        steps_per_year: settings.steps_per_year,
        prices,
        variances,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DriftMode;
    use approx::assert_relative_eq;

    fn parameters() -> RoughBergomiParameters {
        RoughBergomiParameters {
            hurst_index: 0.1,
            volatility_of_volatility: 1.9,
            wiener_correlation: -0.9,
        }
    }

    fn settings(num_paths: usize) -> SimulationSettings {
        SimulationSettings {
            simulation_length: 0.5,
            steps_per_year: 100,
            num_paths,
            drift: DriftMode::None,
            ..Default::default()
        }
    }

    #[test]
    fn test_kernel_weights() {
        let gamma = kernel_weights(0.4, 5, 100);
        assert_eq!(gamma[0], 0.0);
        assert_eq!(gamma[1], 0.0);
        assert!(gamma[2..].windows(2).all(|w| w[0] < w[1]));
        assert!(kernel_weights(0.0, 3, 100)[2..].iter().all(|g| *g == 1.0));
    }

    #[test]
    fn test_step_covariance_is_positive_semidefinite() {
        for hurst in [0.05, 0.1, 0.3, 0.45] {
            let c = StepCovariance::new(0.5 - hurst, 365);
            assert!(c.residual > 0.0);
            assert_relative_eq!(c.sqrt_dt * c.sqrt_dt, 1.0 / 365.0, epsilon = 1e-15);
        }
    }

    #[test]
    fn test_variance_stays_positive_and_starts_at_initial() {
        let s = settings(200);
        let drift = vec![0.0; s.steps()];
        let paths = simulate(100.0, 0.04, &parameters(), &s, &drift).unwrap();
        assert_eq!(paths.num_paths(), 200);
        assert_eq!(paths.num_steps(), 50);
        for row in &paths.variances {
            assert_eq!(row[0], 0.04);
            assert!(row.iter().all(|v| *v > 0.0 && v.is_finite()));
        }
    }

    #[test]
    fn test_mean_variance_is_flat() {
        let s = settings(4000);
        let drift = vec![0.0; s.steps()];
        let paths = simulate(100.0, 0.04, &parameters(), &s, &drift).unwrap();
        let last = paths.num_steps();
        let mean: f64 = paths.variances.iter().map(|row| row[last]).sum::<f64>() / 4000.0;
        assert!((mean - 0.04).abs() < 0.008, "mean terminal variance {}", mean);
    }

    #[test]
    fn test_same_seed_same_paths() {
        let s = settings(20);
        let drift = vec![0.0; s.steps()];
        let a = simulate(100.0, 0.04, &parameters(), &s, &drift).unwrap();
        let b = simulate(100.0, 0.04, &parameters(), &s, &drift).unwrap();
        assert_eq!(a, b);
        let other = SimulationSettings { seed: 7, ..s };
        let c = simulate(100.0, 0.04, &parameters(), &other, &drift).unwrap();
        assert_ne!(a.prices, c.prices);
    }
}
