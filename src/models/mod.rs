//! Stochastic-volatility models.
//!
//! Every model implements [`StochasticVolatilityModel`]: batch pricing of
//! option contracts, Monte-Carlo path simulation and calibration against a
//! pair of volatility surfaces. Concrete models:
//!
//! - [`heston::HestonModel`]: characteristic-function pricing, Euler simulation
//! - [`rough_bergomi::RoughBergomiModel`]: hybrid-scheme simulation, Monte-Carlo pricing

pub mod heston;
pub mod quadrature;
pub mod rough_bergomi;

use std::fmt;

use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::calibration::{CalibrationConfig, FitReport};
use crate::error::SurfaceError;
use crate::market::{interpolated_dividend_yields, option_dividend_yields, Underlying};
use crate::options::{decode_symbols, OptionParameters, OptionType, PriceType, DAYS_PER_YEAR};
use crate::surface::{QuoteTable, VolatilitySurface};

pub use heston::{HestonModel, HestonParameters};
pub use quadrature::{GaussLegendre, Quadrature};
pub use rough_bergomi::{RoughBergomiModel, RoughBergomiParameters};

/// Default number of Monte-Carlo paths.
pub const NUM_PATHS: usize = 1000;
/// Default simulation seed.
pub const SEED: u64 = 343;

/// Drift applied to simulated log-prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DriftMode {
    /// Driftless (martingale) price paths.
    None,
    /// Risk-free rate minus dividend yield, from the term structures as of the start date.
    #[default]
    TermStructure,
}

/// Discretisation and sampling settings of a path simulation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    /// Simulated horizon in years.
    pub simulation_length: f64,
    pub steps_per_year: usize,
    pub num_paths: usize,
    /// Chain (monthly or weekly) used for the dividend term structure.
    pub monthly: bool,
    pub seed: u64,
    pub drift: DriftMode,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            simulation_length: 1.0,
            steps_per_year: DAYS_PER_YEAR as usize,
            num_paths: NUM_PATHS,
            monthly: true,
            seed: SEED,
            drift: DriftMode::default(),
        }
    }
}

impl SimulationSettings {
    pub fn validate(&self) -> Result<()> {
        if self.num_paths == 0 {
            return Err(SurfaceError::invalid("number of simulated paths must be positive").into());
        }
        if self.steps_per_year == 0 {
            return Err(SurfaceError::invalid("steps per year must be positive").into());
        }
        if !self.simulation_length.is_finite() || self.simulation_length <= 0.0 {
            return Err(SurfaceError::invalid(format!(
                "simulation length must be positive, got {}",
                self.simulation_length
            ))
            .into());
        }
        if self.steps() == 0 {
            return Err(SurfaceError::invalid(format!(
                "simulation length {} is shorter than one step",
                self.simulation_length
            ))
            .into());
        }
        Ok(())
    }

    /// Number of time steps covering the horizon.
    pub fn steps(&self) -> usize {
        (self.steps_per_year as f64 * self.simulation_length + 1e-9).floor() as usize
    }

    pub fn dt(&self) -> f64 {
        1.0 / self.steps_per_year as f64
    }

    /// Same settings, lengthened to cover `horizon` years if needed.
    pub fn covering(&self, horizon: f64) -> Self {
        let mut settings = *self;
        let steps = (horizon * self.steps_per_year as f64).round().max(1.0);
        settings.simulation_length = self.simulation_length.max(steps * self.dt());
        settings
    }
}

/// Price and variance paths on a uniform grid, one row per path.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedPaths {
    pub steps_per_year: usize,
    /// `num_paths` rows of `steps + 1` prices, starting at spot.
    pub prices: Vec<Vec<f64>>,
    /// `num_paths` rows of `steps + 1` instantaneous variances.
    pub variances: Vec<Vec<f64>>,
}

impl SimulatedPaths {
    pub fn num_paths(&self) -> usize {
        self.prices.len()
    }

    pub fn num_steps(&self) -> usize {
        self.prices.first().map_or(0, |row| row.len().saturating_sub(1))
    }

    /// Year fractions of the grid points.
    pub fn time_grid(&self) -> Vec<f64> {
        let dt = 1.0 / self.steps_per_year as f64;
        (0..=self.num_steps()).map(|i| i as f64 * dt).collect()
    }

    /// Grid index nearest to `tte`, clamped to the simulated horizon.
    pub fn step_index(&self, tte: f64) -> usize {
        let index = (tte * self.steps_per_year as f64).round().max(0.0) as usize;
        index.min(self.num_steps())
    }
}

/// Market inputs of one option at the valuation date.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptionInputs {
    pub option_type: OptionType,
    pub strike: f64,
    pub tte: f64,
    pub rate: f64,
    pub dividend_yield: f64,
}

/// Spot price plus per-option inputs for a pricing batch.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketInputs {
    pub spot: f64,
    pub options: Vec<OptionInputs>,
}

/// Resolves spot, tenors, rates and ATM-implied dividend yields for `options`.
pub fn market_inputs(
    underlying: &Underlying,
    time: NaiveDate,
    options: &[OptionParameters],
) -> Result<MarketInputs> {
    let spot = underlying.price(time)?;
    let ttes: Vec<f64> = options.iter().map(|o| o.time_to_expiry(time)).collect();
    let rates = underlying.market().risk_free_rates(time, &ttes)?;
    let yields = option_dividend_yields(underlying, time, options)?;

    let options = options
        .iter()
        .zip(ttes)
        .zip(rates.into_iter().zip(yields))
        .map(|((o, tte), (rate, dividend_yield))| OptionInputs {
            option_type: o.option_type,
            strike: o.strike as f64,
            tte,
            rate,
            dividend_yield,
        })
        .collect();
    Ok(MarketInputs { spot, options })
}

/// Per-step log-price drift `∫ (r - q) dt` over each simulation step.
pub fn drift_increments(
    underlying: &Underlying,
    time: NaiveDate,
    settings: &SimulationSettings,
) -> Result<Vec<f64>> {
    let steps = settings.steps();
    match settings.drift {
        DriftMode::None => Ok(vec![0.0; steps]),
        DriftMode::TermStructure => {
            let grid: Vec<f64> = (1..=steps).map(|k| k as f64 * settings.dt()).collect();
            let rates = underlying.market().risk_free_rates(time, &grid)?;
            let yields = interpolated_dividend_yields(underlying, time, &grid, settings.monthly)?;

            let mut previous = 0.0;
            Ok(grid
                .iter()
                .zip(rates.iter().zip(&yields))
                .map(|(t, (r, q))| {
                    let cumulative = (r - q) * t;
                    let increment = cumulative - previous;
                    previous = cumulative;
                    increment
                })
                .collect())
        }
    }
}

/// RNG seed of one path, independent of thread scheduling.
pub fn path_seed(seed: u64, path: usize) -> u64 {
    seed.wrapping_add((path as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

/// Discounted mean payoff at the grid point nearest each expiry.
pub fn price_from_paths(paths: &SimulatedPaths, options: &[OptionInputs]) -> Vec<f64> {
    let num_paths = paths.num_paths();
    options
        .iter()
        .map(|option| {
            if num_paths == 0 {
                return f64::NAN;
            }
            let index = paths.step_index(option.tte);
            let payoff: f64 = paths
                .prices
                .iter()
                .map(|row| option.option_type.payoff(row[index], option.strike))
                .sum();
            (-option.rate * option.tte).exp() * payoff / num_paths as f64
        })
        .collect()
}

/// Contract shared by the stochastic-volatility models.
///
/// Parameters are exchanged with the optimizer as plain vectors ordered by
/// [`parameter_names`](Self::parameter_names).
pub trait StochasticVolatilityModel: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn parameter_names(&self) -> &'static [&'static str];

    fn parameter_vector(&self) -> Vec<f64>;

    /// Replaces the parameters; rejects vectors of the wrong length or outside the model's domain.
    fn set_parameter_vector(&mut self, values: &[f64]) -> Result<()>;

    /// Finite `(min, max)` box per parameter.
    fn bounds(&self) -> Vec<(f64, f64)>;

    /// Copy sharing the model's caches.
    fn boxed_clone(&self) -> Box<dyn StochasticVolatilityModel>;

    /// `(name, value)` pairs in vector order.
    fn parameters(&self) -> Vec<(&'static str, f64)> {
        self.parameter_names()
            .iter()
            .copied()
            .zip(self.parameter_vector())
            .collect()
    }

    /// Square root of the expected average variance over `[0, horizon]` years.
    fn integrated_volatility(&self, underlying: &Underlying, time: NaiveDate, horizon: f64) -> Result<f64>;

    /// Long-run volatility level of the model.
    fn volatility(&self, underlying: &Underlying, time: NaiveDate) -> Result<f64>;

    /// One price per contract. Per-contract numerical failures are `NaN`.
    fn price(
        &self,
        underlying: &Underlying,
        time: NaiveDate,
        options: &[OptionParameters],
    ) -> Result<Vec<f64>>;

    /// Model prices for `symbols` as a single `Mid` column.
    fn price_surface(
        &self,
        underlying: &Underlying,
        time: NaiveDate,
        symbols: &[String],
    ) -> Result<QuoteTable> {
        let options = decode_symbols(underlying.ticker(), symbols)?;
        let prices = self.price(underlying, time, &options)?;
        QuoteTable::new(symbols.to_vec()).with_column(PriceType::Mid, prices)
    }

    fn simulate_path(
        &self,
        underlying: &Underlying,
        time: NaiveDate,
        settings: &SimulationSettings,
    ) -> Result<SimulatedPaths>;

    /// Calibrates the parameters in place against an index surface and its
    /// volatility-index surface, starting from the current values.
    fn fit(
        &mut self,
        index_surface: &VolatilitySurface,
        volatility_index_surface: &VolatilitySurface,
        time: NaiveDate,
        config: &CalibrationConfig,
    ) -> Result<FitReport>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_settings_validation() {
        assert!(SimulationSettings::default().validate().is_ok());
        assert_eq!(SimulationSettings::default().steps(), 365);

        let no_paths = SimulationSettings {
            num_paths: 0,
            ..Default::default()
        };
        let err = no_paths.validate().unwrap_err();
        assert!(matches!(
            SurfaceError::classify(&err),
            Some(SurfaceError::InvalidArgument(_))
        ));

        let too_short = SimulationSettings {
            simulation_length: 0.001,
            ..Default::default()
        };
        assert!(too_short.validate().is_err());
    }

    #[test]
    fn test_covering_extends_horizon() {
        let settings = SimulationSettings {
            simulation_length: 0.5,
            ..Default::default()
        };
        assert_eq!(settings.covering(0.25).steps(), settings.steps());
        assert_eq!(settings.covering(0.75).steps(), 274);
    }

    #[test]
    fn test_price_from_constant_paths() {
        let paths = SimulatedPaths {
            steps_per_year: 4,
            prices: vec![vec![100.0, 105.0, 110.0], vec![100.0, 95.0, 90.0]],
            variances: vec![vec![0.04; 3]; 2],
        };
        assert_eq!(paths.step_index(0.3), 1);
        assert_eq!(paths.step_index(5.0), 2);

        let call = OptionInputs {
            option_type: OptionType::Call,
            strike: 100.0,
            tte: 0.5,
            rate: 0.0,
            dividend_yield: 0.0,
        };
        let put = OptionInputs {
            option_type: OptionType::Put,
            ..call
        };
        let prices = price_from_paths(&paths, &[call, put]);
        assert_relative_eq!(prices[0], 5.0);
        assert_relative_eq!(prices[1], 5.0);
    }

    #[test]
    fn test_path_seeds_differ() {
        assert_ne!(path_seed(SEED, 0), path_seed(SEED, 1));
        assert_eq!(path_seed(SEED, 0), SEED);
    }
}
