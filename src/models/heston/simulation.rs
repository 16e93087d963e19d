//! Euler simulation of the Heston dynamics with full truncation.

use anyhow::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use rayon::prelude::*;
use tracing::debug;

use super::HestonParameters;
use crate::models::{path_seed, SimulatedPaths, SimulationSettings};

/// Simulates `settings.num_paths` paths starting at `spot`.
///
/// `drift` holds one log-price drift increment per step.
pub fn simulate(
    spot: f64,
    parameters: &HestonParameters,
    settings: &SimulationSettings,
    drift: &[f64],
) -> Result<SimulatedPaths> {
    settings.validate()?;
    let steps = settings.steps();
    let dt = settings.dt();
    let sqrt_dt = dt.sqrt();
    let HestonParameters {
        initial_variance: v0,
        long_term_variance: theta,
        volatility_of_volatility: eta,
        mean_reversion_rate: kappa,
        wiener_correlation: rho,
    } = *parameters;
    let rho_bar = (1.0 - rho * rho).max(0.0).sqrt();

    debug!(steps, num_paths = settings.num_paths, "simulating Heston paths");

    let rows: Vec<(Vec<f64>, Vec<f64>)> = (0..settings.num_paths)
        .into_par_iter()
        .map(|path| {
            let mut rng = StdRng::seed_from_u64(path_seed(settings.seed, path));
            let mut prices = Vec::with_capacity(steps + 1);
            let mut variances = Vec::with_capacity(steps + 1);
            let mut log_price = spot.ln();
            let mut variance = v0;
            prices.push(spot);
            variances.push(variance);

            for step in 0..steps {
                let z1: f64 = StandardNormal.sample(&mut rng);
                let z2: f64 = StandardNormal.sample(&mut rng);
                let dw_variance = sqrt_dt * z1;
                let dw_price = rho * dw_variance + rho_bar * sqrt_dt * z2;

                let sqrt_variance = variance.sqrt();
                log_price += drift.get(step).copied().unwrap_or(0.0) + sqrt_variance * dw_price
                    - 0.5 * variance * dt;
                variance = (variance
                    + kappa * (theta - variance) * dt
                    + eta * sqrt_variance * dw_variance)
                    .max(0.0);

                prices.push(log_price.exp());
                variances.push(variance);
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
