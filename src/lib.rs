//! # Stochvol-Lib: Stochastic Volatility Pricing and Calibration
//!
//! `stochvol-lib` prices options under the Heston and rough Bergomi stochastic
//! volatility models and calibrates them against option volatility surfaces
//! built from market data.
//!
//! ## Core Features
//!
//! - **Heston Model**: semi-analytic characteristic-function pricing with
//!   Gauss-Legendre or adaptive quadrature, plus Euler path simulation
//! - **Rough Bergomi Model**: hybrid-scheme Monte-Carlo simulation with cached paths
//! - **Volatility Surfaces**: strike × expiry grids producing empirical or model
//!   prices and implied volatilities with an out-of-the-money selection policy
//! - **Calibration**: CMA-ES and L-BFGS-B minimisation of a weighted surface and
//!   ATM-skew cost, inside the models' parameter bounds
//! - **Market Data**: in-memory and CSV flat-file backends, discount-curve
//!   splines and ATM-implied dividend yields
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chrono::NaiveDate;
//! use stochvol_lib::{
//!     FlatFileMarketData, HestonModel, HestonParameters, StochasticVolatilityModel, Underlying,
//!     VolatilitySurface,
//! };
//!
//! let market = Arc::new(FlatFileMarketData::new("data"));
//! let time = NaiveDate::from_ymd_opt(2022, 3, 3).unwrap();
//! let expiries = vec![
//!     NaiveDate::from_ymd_opt(2022, 3, 18).unwrap(),
//!     NaiveDate::from_ymd_opt(2022, 4, 29).unwrap(),
//! ];
//! let spx = VolatilitySurface::new(Underlying::new("SPX", market.clone()), vec![4000, 4100, 4200], expiries.clone(), false)?;
//! let vix = VolatilitySurface::new(Underlying::new("VIX", market), vec![20, 25, 30], expiries, false)?;
//!
//! let mut model = HestonModel::new(HestonParameters {
//!     initial_variance: 0.04,
//!     long_term_variance: 0.04,
//!     volatility_of_volatility: 0.5,
//!     mean_reversion_rate: 1.5,
//!     wiener_correlation: -0.7,
//! })?;
//! let report = model.fit(&spx, &vix, time, &Default::default())?;
//! println!("{:?}", report.parameters);
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Configuration Presets
//!
//! The library provides several optimization configuration presets:
//! - `production()`: High accuracy for live calibration
//! - `fast()`: Balanced speed/accuracy for development
//! - `research()`: High-precision settings with adaptive bounds
//! - `minimal()`: Quick validation settings

// ================================================================================================
// MODULES
// ================================================================================================

pub mod cache;
pub mod calibration;
pub mod error;
pub mod market;
pub mod model_params;
pub mod models;
pub mod options;
pub mod pricing;
pub mod surface;

// ================================================================================================
// IMPORTS
// ================================================================================================

use anyhow::Result;
use chrono::NaiveDate;

// ================================================================================================
// PUBLIC RE-EXPORTS
// ================================================================================================

// Core types for market data and configuration
pub use calibration::{
    CalibrationConfig, CmaEsConfig, CostFunctionSettings, CostFunctionWeights, FitReport,
    LossMetric, OptimizationConfig, QuantityKind,
};
pub use error::SurfaceError;
pub use market::{CachedMarketData, FlatFileMarketData, InMemoryMarketData, MarketData, Underlying};
pub use options::{OptionParameters, OptionType, PriceType, Quote};

// Models and their parameters
pub use model_params::ModelParameters;
pub use models::{
    DriftMode, HestonModel, HestonParameters, Quadrature, RoughBergomiModel,
    RoughBergomiParameters, SimulatedPaths, SimulationSettings, StochasticVolatilityModel,
};

// Surfaces and pricing
pub use pricing::{ImpliedVolatilityFailure, PricingModel};
pub use surface::{QuantityMethod, QuantitySurface, QuoteTable, SurfaceQuery, VolatilitySurface};

// ================================================================================================
// DEFAULT CONFIGURATIONS
// ================================================================================================

/// Pre-configured optimization settings for common use cases.
///
/// - [`production()`]: Production-grade settings
/// - [`fast()`]: Development-optimized settings
/// - [`research()`]: High-precision settings for research
/// - [`minimal()`]: Quick validation settings
pub mod default_configs {
    use crate::calibration::config::OptimizationConfig;

    /// Production-grade configuration.
    ///
    /// **Characteristics:**
    /// - Population 25, 50 generations, 3 BIPOP restarts
    /// - Convergence tolerance: 1e-8
    ///
    /// # Example
    ///
    /// ```rust
    /// use stochvol_lib::default_configs;
    ///
    /// let config = default_configs::production();
    /// assert!(config.cmaes.lbfgsb_enabled);
    /// ```
    pub fn production() -> OptimizationConfig {
        OptimizationConfig::production()
    }

    /// Fast configuration for development and tests.
    ///
    /// **Characteristics:**
    /// - Population 16, 40 generations, 1 BIPOP restart
    /// - Convergence tolerance: 1e-6
    pub fn fast() -> OptimizationConfig {
        OptimizationConfig::fast()
    }

    /// High-precision configuration for research and backtesting.
    ///
    /// **Characteristics:**
    /// - Population 50, 200 generations, BIPOP and IPOP restarts
    /// - Convergence tolerance: 1e-9
    /// - Adaptive bounds expansion enabled
    ///
    /// Rough Bergomi calibrations simulate paths for every trial, so this
    /// preset is expensive for them.
    pub fn research() -> OptimizationConfig {
        OptimizationConfig::research()
    }

    /// Minimal configuration for quick validation and debugging.
    ///
    /// **Characteristics:**
    /// - Population 10, 20 generations, 500 evaluations
    /// - Convergence tolerance: 1e-4
    pub fn minimal() -> OptimizationConfig {
        OptimizationConfig::minimal()
    }
}

/// Model price and implied volatility of one contract.
#[derive(Debug, Clone, PartialEq)]
pub struct PricingResult {
    pub symbol: String,
    pub option_type: OptionType,
    pub strike: i64,
    pub expiry: NaiveDate,
    /// Time to expiration in years
    pub years_to_exp: f64,
    pub model_price: f64,
    /// `NaN` when the model price cannot be inverted.
    pub model_iv: f64,
}

/// Evaluate the calibration cost of `model` at its current parameters.
///
/// This is exactly the value [`StochasticVolatilityModel::fit`] minimises, so
/// it can be used to monitor the fit quality without re-running the optimizer.
pub fn evaluate_model(
    model: &dyn StochasticVolatilityModel,
    index_surface: &VolatilitySurface,
    volatility_index_surface: &VolatilitySurface,
    time: NaiveDate,
    settings: &CostFunctionSettings,
) -> Result<f64> {
    settings.validate()?;
    calibration::cost_function(index_surface, volatility_index_surface, time, model, settings)
}

/// Price option contracts with a model and quote them in implied volatility.
///
/// Results are sorted by strike, then expiry, calls before puts.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use chrono::NaiveDate;
/// use stochvol_lib::{price_with_model, FlatFileMarketData, HestonModel, HestonParameters, PricingModel, Underlying};
///
/// let spx = Underlying::new("SPX", Arc::new(FlatFileMarketData::new("data")));
/// let model = HestonModel::new(HestonParameters {
///     initial_variance: 0.04,
///     long_term_variance: 0.04,
///     volatility_of_volatility: 0.5,
///     mean_reversion_rate: 1.5,
///     wiener_correlation: -0.7,
/// })?;
/// let time = NaiveDate::from_ymd_opt(2022, 3, 3).unwrap();
/// let symbols = vec!["SPXW 220318C4100000".to_string(), "SPXW 220318P4100000".to_string()];
/// for result in price_with_model(&model, &spx, time, &symbols, PricingModel::BlackScholesMerton)? {
///     println!("{} {:.2} {:.1}%", result.symbol, result.model_price, result.model_iv * 100.0);
/// }
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn price_with_model(
    model: &dyn StochasticVolatilityModel,
    underlying: &Underlying,
    time: NaiveDate,
    symbols: &[String],
    pricing_model: PricingModel,
) -> Result<Vec<PricingResult>> {
    let prices = model.price_surface(underlying, time, symbols)?;
    let volatilities = pricing_model.price_implied_volatility(underlying, &prices, time)?;
    let parameters = options::decode_symbols(underlying.ticker(), symbols)?;
    let price_column = prices.column(PriceType::Mid).unwrap_or_default();
    let iv_column = volatilities.column(PriceType::Mid).unwrap_or_default();

    let mut results: Vec<PricingResult> = symbols
        .iter()
        .zip(parameters)
        .enumerate()
        .map(|(i, (symbol, p))| PricingResult {
            symbol: symbol.clone(),
            option_type: p.option_type,
            strike: p.strike,
            expiry: p.expiry,
            years_to_exp: p.time_to_expiry(time),
            model_price: price_column.get(i).copied().unwrap_or(f64::NAN),
            model_iv: iv_column.get(i).copied().unwrap_or(f64::NAN),
        })
        .collect();

    results.sort_by(|a, b| {
        (a.strike, a.expiry, a.option_type.is_put()).cmp(&(b.strike, b.expiry, b.option_type.is_put()))
    });
    Ok(results)
}
