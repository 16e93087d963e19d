//! Calibration cost and the model-fitting entry point.
//!
//! ```text
//! cost = sqrt((L(index) + w_vol * L(vol index) + w_skew * S(index)
//!              [+ w_skew * w_vol * S(vol index)]) / (1 + w_vol))
//! ```
//!
//! `L` is the surface loss of [`surface_evaluation`], `S` the ATM-skew loss of
//! [`surface_atm_skew`]. The bracketed term is enabled by
//! [`CostFunctionSettings::volatility_index_skew`]. Terms with a zero weight
//! are not evaluated.

use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::calibration::config::{CalibrationConfig, CostFunctionSettings};
use crate::calibration::evaluation::{surface_atm_skew, surface_evaluation};
use crate::calibration::pipeline::calibrate_model_adaptive;
use crate::calibration::types::{expand_bounds, ModelCalibrator};
use crate::error::SurfaceError;
use crate::model_params::clamp_to_bounds;
use crate::models::StochasticVolatilityModel;
use crate::surface::VolatilitySurface;

/// Objective value of parameter vectors that cannot be evaluated.
pub const INVALID_PARAMETERS_PENALTY: f64 = 1.0e12;

/// Weighted calibration cost of `model` against both surfaces.
pub fn cost_function(
    index_surface: &VolatilitySurface,
    volatility_index_surface: &VolatilitySurface,
    time: NaiveDate,
    model: &dyn StochasticVolatilityModel,
    settings: &CostFunctionSettings,
) -> Result<f64> {
    let weights = settings.weights;
    let mut total = surface_evaluation(index_surface, time, model, settings)?;
    if weights.volatility_index > 0.0 {
        total += weights.volatility_index
            * surface_evaluation(volatility_index_surface, time, model, settings)?;
    }
    if weights.skew > 0.0 {
        total += weights.skew * surface_atm_skew(index_surface, time, model, settings)?;
        if settings.volatility_index_skew && weights.volatility_index > 0.0 {
            total += weights.skew
                * weights.volatility_index
                * surface_atm_skew(volatility_index_surface, time, model, settings)?;
        }
    }
    Ok((total / (1.0 + weights.volatility_index)).sqrt())
}

/// Cost of a trial parameter vector, evaluated on a copy of `model`.
///
/// Vectors the model rejects, or that make the cost fail, score
/// [`INVALID_PARAMETERS_PENALTY`].
pub fn minimise_cost_function(
    parameters: &[f64],
    model: &dyn StochasticVolatilityModel,
    index_surface: &VolatilitySurface,
    volatility_index_surface: &VolatilitySurface,
    time: NaiveDate,
    settings: &CostFunctionSettings,
) -> f64 {
    let mut trial = model.boxed_clone();
    let cost = trial.set_parameter_vector(parameters).and_then(|_| {
        cost_function(index_surface, volatility_index_surface, time, trial.as_ref(), settings)
    });
    match cost {
        Ok(cost) if cost.is_finite() => {
            debug!(model = model.name(), ?parameters, cost, "cost evaluation");
            cost
        }
        Ok(cost) => {
            debug!(model = model.name(), ?parameters, cost, "non-finite cost");
            INVALID_PARAMETERS_PENALTY
        }
        Err(e) => {
            debug!(model = model.name(), ?parameters, error = %e, "cost evaluation failed");
            INVALID_PARAMETERS_PENALTY
        }
    }
}

/// [`ModelCalibrator`] over the surface cost of one stochastic-volatility model.
pub struct SurfaceCalibrator<'a> {
    model: &'a dyn StochasticVolatilityModel,
    index_surface: &'a VolatilitySurface,
    volatility_index_surface: &'a VolatilitySurface,
    time: NaiveDate,
    settings: &'a CostFunctionSettings,
    bounds: Vec<(f64, f64)>,
    limits: Vec<(f64, f64)>,
}

impl<'a> SurfaceCalibrator<'a> {
    pub fn new(
        model: &'a dyn StochasticVolatilityModel,
        index_surface: &'a VolatilitySurface,
        volatility_index_surface: &'a VolatilitySurface,
        time: NaiveDate,
        settings: &'a CostFunctionSettings,
    ) -> Self {
        let limits = model.bounds();
        Self {
            model,
            index_surface,
            volatility_index_surface,
            time,
            settings,
            bounds: limits.clone(),
            limits,
        }
    }

    /// Narrows the starting search box; each side is clipped to the model's bounds.
    pub fn with_search_bounds(mut self, bounds: &[(f64, f64)]) -> Result<Self> {
        if bounds.len() != self.limits.len() {
            return Err(SurfaceError::invalid(format!(
                "expected {} search ranges ({}), got {}",
                self.limits.len(),
                self.model.parameter_names().join(", "),
                bounds.len()
            ))
            .into());
        }
        let clipped: Vec<(f64, f64)> = bounds
            .iter()
            .zip(&self.limits)
            .map(|((lo, hi), (min, max))| (lo.max(*min), hi.min(*max)))
            .collect();
        if let Some(((lo, hi), name)) = clipped
            .iter()
            .zip(self.model.parameter_names())
            .find(|((lo, hi), _)| lo.is_nan() || hi.is_nan() || lo >= hi)
        {
            return Err(SurfaceError::invalid(format!(
                "empty search range [{}, {}] for {}",
                lo, hi, name
            ))
            .into());
        }
        self.bounds = clipped;
        Ok(self)
    }
}

impl ModelCalibrator for SurfaceCalibrator<'_> {
    fn model_name(&self) -> &str {
        self.model.name()
    }

    fn param_bounds(&self) -> &[(f64, f64)] {
        &self.bounds
    }

    fn evaluate_objective(&self, x: &[f64]) -> f64 {
        minimise_cost_function(
            x,
            self.model,
            self.index_surface,
            self.volatility_index_surface,
            self.time,
            self.settings,
        )
    }

    fn param_names(&self) -> Vec<&str> {
        self.model.parameter_names().to_vec()
    }

    fn expand_bounds_if_needed(
        &mut self,
        params: &[f64],
        proximity_threshold: f64,
        expansion_factor: f64,
    ) -> bool {
        expand_bounds(
            &mut self.bounds,
            &self.limits,
            params,
            proximity_threshold,
            expansion_factor,
        )
    }
}

/// Outcome of a calibration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitReport {
    pub model: &'static str,
    /// Fitted `(name, value)` pairs in vector order.
    pub parameters: Vec<(&'static str, f64)>,
    pub initial_cost: f64,
    pub final_cost: f64,
    /// Search box at the end of the run.
    pub bounds: Vec<(f64, f64)>,
}

impl FitReport {
    pub fn improved(&self) -> bool {
        self.final_cost < self.initial_cost
    }
}

/// Calibrates `model` in place, starting from its current parameters.
///
/// Market-data errors at the starting point abort the fit. The model keeps
/// its starting parameters when the optimizer finds nothing cheaper.
pub fn fit_model(
    model: &mut dyn StochasticVolatilityModel,
    index_surface: &VolatilitySurface,
    volatility_index_surface: &VolatilitySurface,
    time: NaiveDate,
    config: &CalibrationConfig,
) -> Result<FitReport> {
    config.validate()?;
    let settings = &config.cost;
    let initial = model.parameter_vector();
    let initial_cost = cost_function(
        index_surface,
        volatility_index_surface,
        time,
        &*model,
        settings,
    )?;
    info!(
        model = model.name(),
        ticker = index_surface.underlying().ticker(),
        %time,
        initial_cost,
        "starting calibration"
    );

    let (best_cost, best, bounds) = {
        let mut calibrator = SurfaceCalibrator::new(
            &*model,
            index_surface,
            volatility_index_surface,
            time,
            settings,
        );
        if let Some(search_bounds) = &config.search_bounds {
            calibrator = calibrator.with_search_bounds(search_bounds)?;
        }
        calibrate_model_adaptive(&mut calibrator, &config.optimization, Some(initial.clone()))
    };

    let limits = model.bounds();
    let (final_cost, fitted) = if best_cost < initial_cost && best.len() == initial.len() {
        (best_cost, clamp_to_bounds(&best, &limits))
    } else {
        warn!(
            model = model.name(),
            initial_cost,
            best_cost,
            "calibration did not improve on the starting parameters"
        );
        (initial_cost, initial)
    };
    model.set_parameter_vector(&fitted)?;

    let report = FitReport {
        model: model.name(),
        parameters: model.parameters(),
        initial_cost,
        final_cost,
        bounds,
    };
    info!(
        model = report.model,
        parameters = ?report.parameters,
        final_cost,
        "calibration finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::config::{CostFunctionWeights, QuantityKind};
    use crate::market::{InMemoryMarketData, Underlying};
    use crate::model_params::ModelParameters;
    use crate::models::{HestonModel, HestonParameters};
    use crate::options::{OptionParameters, OptionType, Quote};
    use std::sync::Arc;

    fn parameters() -> HestonParameters {
        HestonParameters {
            initial_variance: 0.04,
            long_term_variance: 0.05,
            volatility_of_volatility: 0.5,
            mean_reversion_rate: 2.0,
            wiener_correlation: -0.6,
        }
    }

    /// Surface whose quotes are the Heston prices of `parameters()`.
    fn surface(time: NaiveDate) -> VolatilitySurface {
        let expiries = [
            NaiveDate::from_ymd_opt(2022, 6, 3).unwrap(),
            NaiveDate::from_ymd_opt(2022, 9, 2).unwrap(),
        ];
        let strikes = [80, 90, 100, 110, 120];
        let mut market = InMemoryMarketData::new()
            .with_spot("TEST", time, 100.0)
            .with_discount_curve(time, vec![(1.0, 0.01), (365.0, 0.01)]);
        for &expiry in &expiries {
            for option_type in [OptionType::Call, OptionType::Put] {
                market.insert_option_quote(
                    "TEST",
                    time,
                    OptionParameters::new(option_type, 100, expiry, true),
                    Quote::new(5.0, 5.0),
                );
            }
        }
        let options: Vec<OptionParameters> = strikes
            .iter()
            .flat_map(|&k| {
                expiries.iter().flat_map(move |&e| {
                    [OptionType::Call, OptionType::Put]
                        .map(|t| OptionParameters::new(t, k, e, true))
                })
            })
            .collect();
        let seed = Underlying::new("TEST", Arc::new(market.clone()));
        let prices = HestonModel::new(parameters())
            .unwrap()
            .price(&seed, time, &options)
            .unwrap();
        for (option, price) in options.into_iter().zip(prices) {
            market.insert_option_quote("TEST", time, option, Quote::new(price, price));
        }
        VolatilitySurface::new(
            Underlying::new("TEST", Arc::new(market)),
            strikes.to_vec(),
            expiries.to_vec(),
            true,
        )
        .unwrap()
    }

    fn settings() -> CostFunctionSettings {
        CostFunctionSettings {
            weights: CostFunctionWeights {
                volatility_index: 0.0,
                skew: 0.0,
            },
            quantity: QuantityKind::Price,
            ..Default::default()
        }
    }

    #[test]
    fn test_cost_vanishes_at_generating_parameters() {
        let time = NaiveDate::from_ymd_opt(2022, 3, 3).unwrap();
        let surface = surface(time);
        let model = HestonModel::new(parameters()).unwrap();
        let cost = cost_function(&surface, &surface, time, &model, &settings()).unwrap();
        assert!(cost < 1e-6, "cost {}", cost);

        let mut shifted = parameters();
        shifted.initial_variance = 0.06;
        let other = HestonModel::new(shifted).unwrap();
        assert!(cost_function(&surface, &surface, time, &other, &settings()).unwrap() > 1e-2);
    }

    #[test]
    fn test_volatility_index_weight_normalises_cost() {
        let time = NaiveDate::from_ymd_opt(2022, 3, 3).unwrap();
        let surface = surface(time);
        let mut shifted = parameters();
        shifted.initial_variance = 0.06;
        let model = HestonModel::new(shifted).unwrap();
        let alone = cost_function(&surface, &surface, time, &model, &settings()).unwrap();
        let mut weighted = settings();
        weighted.weights.volatility_index = 1.0;
        // Same surface twice: (L + L) / 2 = L.
        let both = cost_function(&surface, &surface, time, &model, &weighted).unwrap();
        approx::assert_relative_eq!(alone, both, epsilon = 1e-12);
    }

    #[test]
    fn test_invalid_vectors_are_penalised() {
        let time = NaiveDate::from_ymd_opt(2022, 3, 3).unwrap();
        let surface = surface(time);
        let model = HestonModel::new(parameters()).unwrap();
        let settings = settings();
        let outside = [0.04, 0.05, 0.5, 2.0, 1.5];
        assert_eq!(
            minimise_cost_function(&outside, &model, &surface, &surface, time, &settings),
            INVALID_PARAMETERS_PENALTY
        );
        assert_eq!(
            minimise_cost_function(&[0.04], &model, &surface, &surface, time, &settings),
            INVALID_PARAMETERS_PENALTY
        );
        let valid = minimise_cost_function(
            &parameters().to_vector(),
            &model,
            &surface,
            &surface,
            time,
            &settings,
        );
        assert!(valid < 1e-6);
        // The model itself is untouched.
        assert_eq!(model.parameter_vector(), parameters().to_vector());
    }

    #[test]
    fn test_search_bounds_are_clipped_and_checked() {
        let time = NaiveDate::from_ymd_opt(2022, 3, 3).unwrap();
        let surface = surface(time);
        let model = HestonModel::new(parameters()).unwrap();
        let settings = settings();
        let calibrator = SurfaceCalibrator::new(&model, &surface, &surface, time, &settings)
            .with_search_bounds(&[(0.0, 0.1), (0.01, 0.1), (0.1, 1.0), (0.5, 4.0), (-0.9, 0.0)])
            .unwrap();
        assert_eq!(calibrator.param_bounds()[0], (1e-4, 0.1));
        assert_eq!(calibrator.param_count(), 5);

        let calibrator = SurfaceCalibrator::new(&model, &surface, &surface, time, &settings);
        assert!(calibrator.with_search_bounds(&[(0.0, 0.1)]).is_err());
        let calibrator = SurfaceCalibrator::new(&model, &surface, &surface, time, &settings);
        assert!(calibrator
            .with_search_bounds(&[(0.2, 0.1), (0.01, 0.1), (0.1, 1.0), (0.5, 4.0), (-0.9, 0.0)])
            .is_err());
    }
}
