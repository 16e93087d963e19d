//! Heston (1993) stochastic-volatility model.

pub mod analytic;
pub mod simulation;

use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::{BatchCache, CachePolicy, CacheStats, FloatKey};
use crate::calibration::{fit_model, CalibrationConfig, FitReport};
use crate::market::Underlying;
use crate::model_params::{check_length, ModelParameters};
use crate::models::{
    drift_increments, market_inputs, OptionInputs, Quadrature, SimulatedPaths, SimulationSettings,
    StochasticVolatilityModel,
};
use crate::options::{OptionParameters, OptionType};
use crate::surface::VolatilitySurface;

/// Maximum number of cached analytic prices per model.
pub const PRICE_CACHE_CAPACITY: usize = 100_000;

/// Heston parameters, ordered as in the optimization vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HestonParameters {
    /// `v0`
    pub initial_variance: f64,
    /// `θ`
    pub long_term_variance: f64,
    /// `η`
    pub volatility_of_volatility: f64,
    /// `κ`
    pub mean_reversion_rate: f64,
    /// `ρ`
    pub wiener_correlation: f64,
}

impl ModelParameters for HestonParameters {
    const NAMES: &'static [&'static str] = &[
        "initial_variance",
        "long_term_variance",
        "volatility_of_volatility",
        "mean_reversion_rate",
        "wiener_correlation",
    ];

    fn to_vector(&self) -> Vec<f64> {
        vec![
            self.initial_variance,
            self.long_term_variance,
            self.volatility_of_volatility,
            self.mean_reversion_rate,
            self.wiener_correlation,
        ]
    }

    fn from_vector(values: &[f64]) -> Result<Self> {
        check_length(values, Self::NAMES)?;
        let parameters = Self {
            initial_variance: values[0],
            long_term_variance: values[1],
            volatility_of_volatility: values[2],
            mean_reversion_rate: values[3],
            wiener_correlation: values[4],
        };
        parameters.validate()?;
        Ok(parameters)
    }

    fn bounds() -> Vec<(f64, f64)> {
        vec![
            (1e-4, 1.0),
            (1e-4, 1.0),
            (1e-3, 3.0),
            (1e-3, 10.0),
            (-0.999, 0.999),
        ]
    }

    fn domain() -> Vec<(f64, f64)> {
        vec![
            (0.0, f64::INFINITY),
            (0.0, f64::INFINITY),
            // The characteristic function divides by η.
            (f64::MIN_POSITIVE, f64::INFINITY),
            (0.0, f64::INFINITY),
            (-1.0, 1.0),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum QuadratureKey {
    GaussLegendre(usize),
    Adaptive(FloatKey, usize),
}

impl From<Quadrature> for QuadratureKey {
    fn from(quadrature: Quadrature) -> Self {
        match quadrature {
            Quadrature::GaussLegendre { degree } => QuadratureKey::GaussLegendre(degree),
            Quadrature::Adaptive {
                tolerance,
                max_depth,
            } => QuadratureKey::Adaptive(tolerance.into(), max_depth),
        }
    }
}

/// Exact input tuple of one analytic price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct HestonPriceKey {
    spot: FloatKey,
    option_type: OptionType,
    strike: FloatKey,
    tte: FloatKey,
    rate: FloatKey,
    dividend_yield: FloatKey,
    parameters: [FloatKey; 5],
    quadrature: QuadratureKey,
}

impl HestonPriceKey {
    fn new(spot: f64, option: &OptionInputs, parameters: &[FloatKey; 5], quadrature: QuadratureKey) -> Self {
        Self {
            spot: spot.into(),
            option_type: option.option_type,
            strike: option.strike.into(),
            tte: option.tte.into(),
            rate: option.rate.into(),
            dividend_yield: option.dividend_yield.into(),
            parameters: *parameters,
            quadrature,
        }
    }

    fn option(&self) -> OptionInputs {
        OptionInputs {
            option_type: self.option_type,
            strike: self.strike.value(),
            tte: self.tte.value(),
            rate: self.rate.value(),
            dividend_yield: self.dividend_yield.value(),
        }
    }
}

/// Heston model with a bounded cache of analytic prices.
///
/// Clones share the cache, so trial models built during calibration reuse
/// prices computed for identical inputs.
#[derive(Debug, Clone)]
pub struct HestonModel {
    parameters: HestonParameters,
    quadrature: Quadrature,
    cache: Arc<BatchCache<HestonPriceKey, f64>>,
}

impl HestonModel {
    pub fn new(parameters: HestonParameters) -> Result<Self> {
        parameters.validate()?;
        Ok(Self {
            parameters,
            quadrature: Quadrature::default(),
            cache: Arc::new(BatchCache::with_policy(CachePolicy::Bounded(
                PRICE_CACHE_CAPACITY,
            ))),
        })
    }

    pub fn with_quadrature(mut self, quadrature: Quadrature) -> Result<Self> {
        quadrature.validate()?;
        self.quadrature = quadrature;
        Ok(self)
    }

    /// Replaces the price cache with an empty one under `policy`.
    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache = Arc::new(BatchCache::with_policy(policy));
        self
    }

    pub fn heston_parameters(&self) -> &HestonParameters {
        &self.parameters
    }

    pub fn quadrature(&self) -> Quadrature {
        self.quadrature
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Analytic prices for resolved inputs. Failures become `NaN`.
    pub fn analytic_prices(&self, spot: f64, options: &[OptionInputs]) -> Result<Vec<f64>> {
        let parameter_keys: [FloatKey; 5] = [
            self.parameters.initial_variance.into(),
            self.parameters.long_term_variance.into(),
            self.parameters.volatility_of_volatility.into(),
            self.parameters.mean_reversion_rate.into(),
            self.parameters.wiener_correlation.into(),
        ];
        let quadrature_key = QuadratureKey::from(self.quadrature);
        let keys: Vec<HestonPriceKey> = options
            .iter()
            .map(|option| HestonPriceKey::new(spot, option, &parameter_keys, quadrature_key))
            .collect();

        let parameters = self.parameters;
        let quadrature = self.quadrature;
        self.cache.get_or_try_compute_batch(&keys, |missing| {
            debug!(count = missing.len(), "computing Heston analytic prices");
            Ok(missing
                .par_iter()
                .map(|key| {
                    let option = key.option();
                    match analytic::analytic_price(spot, &option, &parameters, &quadrature) {
                        Ok(price) if price.is_finite() => price,
                        Ok(price) => {
                            warn!(strike = option.strike, tte = option.tte, price, "non-finite Heston price");
                            f64::NAN
                        }
                        Err(err) => {
                            warn!(strike = option.strike, tte = option.tte, error = %err, "Heston pricing failed");
                            f64::NAN
                        }
                    }
                })
                .collect())
        })
    }
}

impl StochasticVolatilityModel for HestonModel {
    fn name(&self) -> &'static str {
        "Heston"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        HestonParameters::NAMES
    }

    fn parameter_vector(&self) -> Vec<f64> {
        self.parameters.to_vector()
    }

    fn set_parameter_vector(&mut self, values: &[f64]) -> Result<()> {
        self.parameters = HestonParameters::from_vector(values)?;
        Ok(())
    }

    fn bounds(&self) -> Vec<(f64, f64)> {
        HestonParameters::bounds()
    }

    fn boxed_clone(&self) -> Box<dyn StochasticVolatilityModel> {
        Box::new(self.clone())
    }

    fn integrated_volatility(&self, _underlying: &Underlying, _time: NaiveDate, horizon: f64) -> Result<f64> {
        let HestonParameters {
            initial_variance: v0,
            long_term_variance: theta,
            mean_reversion_rate: kappa,
            ..
        } = self.parameters;
        let kh = kappa * horizon;
        if kh <= 1e-12 {
            return Ok(v0.sqrt());
        }
        Ok((theta + (v0 - theta) * (1.0 - (-kh).exp()) / kh).sqrt())
    }

    fn volatility(&self, _underlying: &Underlying, _time: NaiveDate) -> Result<f64> {
        Ok(self.parameters.long_term_variance.sqrt())
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
        self.analytic_prices(inputs.spot, &inputs.options)
    }

    fn simulate_path(
        &self,
        underlying: &Underlying,
        time: NaiveDate,
        settings: &SimulationSettings,
    ) -> Result<SimulatedPaths> {
        settings.validate()?;
        let spot = underlying.price(time)?;
        let drift = drift_increments(underlying, time, settings)?;
        simulation::simulate(spot, &self.parameters, settings, &drift)
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
