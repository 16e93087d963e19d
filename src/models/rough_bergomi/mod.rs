//! Rough Bergomi model with a flat forward-variance curve.

pub mod simulation;

use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::{BatchCache, CachePolicy, CacheStats, FloatKey};
use crate::calibration::{fit_model, CalibrationConfig, FitReport};
use crate::error::SurfaceError;
use crate::market::Underlying;
use crate::model_params::{check_length, ModelParameters};
use crate::models::{
    drift_increments, market_inputs, price_from_paths, DriftMode, SimulatedPaths,
    SimulationSettings, StochasticVolatilityModel,
};
use crate::options::OptionParameters;
use crate::surface::VolatilitySurface;

/// Flat forward variance used until a term structure is supplied.
pub const DEFAULT_INITIAL_VARIANCE: f64 = 0.235 * 0.235;

/// Number of simulations kept per model.
pub const PATH_CACHE_CAPACITY: usize = 16;

/// Rough Bergomi parameters, ordered as in the optimization vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoughBergomiParameters {
    /// `H`
    pub hurst_index: f64,
    /// `η`
    pub volatility_of_volatility: f64,
    /// `ρ`
    pub wiener_correlation: f64,
}

impl ModelParameters for RoughBergomiParameters {
    const NAMES: &'static [&'static str] = &[
        "hurst_index",
        "volatility_of_volatility",
        "wiener_correlation",
    ];

    fn to_vector(&self) -> Vec<f64> {
        vec![
            self.hurst_index,
            self.volatility_of_volatility,
            self.wiener_correlation,
        ]
    }

    fn from_vector(values: &[f64]) -> Result<Self> {
        check_length(values, Self::NAMES)?;
        let parameters = Self {
            hurst_index: values[0],
            volatility_of_volatility: values[1],
            wiener_correlation: values[2],
        };
        parameters.validate()?;
        Ok(parameters)
    }

    fn bounds() -> Vec<(f64, f64)> {
        vec![(0.01, 0.99), (0.0, 5.0), (-0.999, 0.999)]
    }

    fn domain() -> Vec<(f64, f64)> {
        vec![(f64::MIN_POSITIVE, 1.0), (0.0, f64::INFINITY), (-1.0, 1.0)]
    }
}

/// Every input a simulation depends on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PathKey {
    ticker: String,
    time: NaiveDate,
    spot: FloatKey,
    initial_variance: FloatKey,
    parameters: [FloatKey; 3],
    simulation_length: FloatKey,
    steps_per_year: usize,
    num_paths: usize,
    monthly: bool,
    seed: u64,
    drift: DriftMode,
}

/// Rough Bergomi model priced by Monte-Carlo over cached simulations.
#[derive(Debug, Clone)]
pub struct RoughBergomiModel {
    parameters: RoughBergomiParameters,
    initial_variance: f64,
    settings: SimulationSettings,
    cache: Arc<BatchCache<PathKey, Arc<SimulatedPaths>>>,
}

impl RoughBergomiModel {
    pub fn new(parameters: RoughBergomiParameters) -> Result<Self> {
        parameters.validate()?;
        Ok(Self {
            parameters,
            initial_variance: DEFAULT_INITIAL_VARIANCE,
            settings: SimulationSettings::default(),
            cache: Arc::new(BatchCache::with_policy(CachePolicy::Bounded(
                PATH_CACHE_CAPACITY,
            ))),
        })
    }

    pub fn with_initial_variance(mut self, initial_variance: f64) -> Result<Self> {
        if !initial_variance.is_finite() || initial_variance <= 0.0 {
            return Err(SurfaceError::invalid(format!(
                "initial variance must be positive, got {}",
                initial_variance
            ))
            .into());
        }
        self.initial_variance = initial_variance;
        Ok(self)
    }

    /// Settings used by [`StochasticVolatilityModel::price`]; the horizon is
    /// extended automatically to cover the longest expiry.
    pub fn with_settings(mut self, settings: SimulationSettings) -> Result<Self> {
        settings.validate()?;
        self.settings = settings;
        Ok(self)
    }

    pub fn rough_bergomi_parameters(&self) -> &RoughBergomiParameters {
        &self.parameters
    }

    pub fn initial_variance(&self) -> f64 {
        self.initial_variance
    }

    pub fn settings(&self) -> &SimulationSettings {
        &self.settings
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn cached_paths(
        &self,
        underlying: &Underlying,
        time: NaiveDate,
        settings: &SimulationSettings,
    ) -> Result<Arc<SimulatedPaths>> {
        settings.validate()?;
        let spot = underlying.price(time)?;
        let key = PathKey {
            ticker: underlying.ticker().to_string(),
            time,
            spot: spot.into(),
            initial_variance: self.initial_variance.into(),
            parameters: [
                self.parameters.hurst_index.into(),
                self.parameters.volatility_of_volatility.into(),
                self.parameters.wiener_correlation.into(),
            ],
            simulation_length: settings.simulation_length.into(),
            steps_per_year: settings.steps_per_year,
            num_paths: settings.num_paths,
            monthly: settings.monthly,
            seed: settings.seed,
            drift: settings.drift,
        };
        self.cache.get_or_try_insert_with(key, || {
            let drift = drift_increments(underlying, time, settings)?;
            let paths = simulation::simulate(
                spot,
                self.initial_variance,
                &self.parameters,
                settings,
                &drift,
            )?;
            Ok(Arc::new(paths))
        })
    }
}

impl StochasticVolatilityModel for RoughBergomiModel {
    fn name(&self) -> &'static str {
        "Rough Bergomi"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        RoughBergomiParameters::NAMES
    }

    fn parameter_vector(&self) -> Vec<f64> {
        self.parameters.to_vector()
    }

    fn set_parameter_vector(&mut self, values: &[f64]) -> Result<()> {
        self.parameters = RoughBergomiParameters::from_vector(values)?;
        Ok(())
    }

    fn bounds(&self) -> Vec<(f64, f64)> {
        RoughBergomiParameters::bounds()
    }

    fn boxed_clone(&self) -> Box<dyn StochasticVolatilityModel> {
        Box::new(self.clone())
    }

    fn integrated_volatility(&self, _underlying: &Underlying, _time: NaiveDate, _horizon: f64) -> Result<f64> {
        // E[V_t] equals the flat forward variance at every horizon.
        Ok(self.initial_variance.sqrt())
    }

    fn volatility(&self, _underlying: &Underlying, _time: NaiveDate) -> Result<f64> {
        Ok(self.initial_variance.sqrt())
    }

    fn price(
        &self,
        underlying: &Underlying,
        time: NaiveDate,
        options: &[OptionParameters],
    ) -> Result<Vec<f64>> {
        if options.is_empty() {
            return Ok(Vec::new());
        }
        let inputs = market_inputs(underlying, time, options)?;
        let horizon = inputs
            .options
            .iter()
            .map(|o| o.tte)
            .fold(0.0_f64, f64::max);
        let settings = self.settings.covering(horizon);
        let paths = self.cached_paths(underlying, time, &settings)?;
        debug!(
            options = options.len(),
            steps = paths.num_steps(),
            num_paths = paths.num_paths(),
            "pricing from rough Bergomi paths"
        );
        Ok(price_from_paths(&paths, &inputs.options))
    }

    fn simulate_path(
        &self,
        underlying: &Underlying,
        time: NaiveDate,
        settings: &SimulationSettings,
    ) -> Result<SimulatedPaths> {
        let paths = self.cached_paths(underlying, time, settings)?;
        Ok(paths.as_ref().clone())
    }

    fn fit(
        &mut self,
        index_surface: &VolatilitySurface,
        volatility_index_surface: &VolatilitySurface,
        time: NaiveDate,
        config: &CalibrationConfig,
    ) -> Result<FitReport> {
        fit_model(self, index_surface, volatility_index_surface, time, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_schema() {
        let p = RoughBergomiParameters {
            hurst_index: 0.1,
            volatility_of_volatility: 1.9,
            wiener_correlation: -0.9,
        };
        assert_eq!(RoughBergomiParameters::from_vector(&p.to_vector()).unwrap(), p);
        assert!(RoughBergomiParameters::from_vector(&[1.0, 1.9, -0.9]).is_err());
        assert!(RoughBergomiParameters::from_vector(&[0.1, -0.1, -0.9]).is_err());
    }

    #[test]
    fn test_invalid_configuration_rejected() {
        let model = RoughBergomiModel::new(RoughBergomiParameters {
            hurst_index: 0.1,
            volatility_of_volatility: 1.9,
            wiener_correlation: -0.9,
        })
        .unwrap();
        assert!(model.clone().with_initial_variance(0.0).is_err());
        assert!(model
            .with_settings(SimulationSettings {
                num_paths: 0,
                ..Default::default()
            })
            .is_err());
    }
}
