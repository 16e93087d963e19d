use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::calibration::metrics::LossMetric;
use crate::error::SurfaceError;
use crate::pricing::{ImpliedVolatilityFailure, PricingModel};

/// CMA-ES specific configuration parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CmaEsConfig {
    /// Random seed for reproducibility
    pub seed: Option<u64>,
    /// Whether to evaluate the population in parallel
    pub parallel_eval: bool,
    /// Verbosity level passed to the optimizer (0=silent, 1=minimal, 2=normal)
    pub verbosity: u8,
    /// Number of IPOP restarts (0 = no IPOP)
    pub ipop_restarts: usize,
    /// Factor to increase population size in IPOP restarts
    pub ipop_increase_factor: f64,
    /// Number of BIPOP restarts (0 = no BIPOP)
    pub bipop_restarts: usize,
    /// Enable L-BFGS-B refinement after CMA-ES?
    pub lbfgsb_enabled: bool,
    /// Max iterations for L-BFGS-B
    pub lbfgsb_max_iterations: usize,
    /// Total function evaluations budget
    pub total_evals_budget: usize,
    /// Whether to use advanced sub-run budgeting logic
    pub use_subrun_budgeting: bool,
    /// Run a CMA-ES search around the starting parameters before L-BFGS-B;
    /// when false, L-BFGS-B starts directly from them
    pub mini_cmaes_on_refinement: bool,
}

impl Default for CmaEsConfig {
    fn default() -> Self {
        Self {
            seed: Some(123456),
            parallel_eval: true,
            verbosity: 0,
            ipop_restarts: 0,
            ipop_increase_factor: 2.0,
            bipop_restarts: 5,
            lbfgsb_enabled: true,
            lbfgsb_max_iterations: 200,
            total_evals_budget: 200000,
            use_subrun_budgeting: false,
            mini_cmaes_on_refinement: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdaptiveBoundsConfig {
    pub enabled: bool,
    pub max_iterations: usize,
    pub proximity_threshold: f64,
    pub expansion_factor: f64,
}

impl Default for AdaptiveBoundsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_iterations: 3,
            proximity_threshold: 0.1, // 10% from edge
            expansion_factor: 0.25,   // expand by 25%
        }
    }
}

/// Optimizer settings shared by every model
#[derive(Debug, Deserialize, Clone)]
pub struct OptimizationConfig {
    /// Convergence tolerance for L-BFGS-B
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    /// CMA-ES population size
    #[serde(default = "default_pop_size")]
    pub pop_size: usize,

    /// Maximum CMA-ES generations per run
    #[serde(default = "default_max_gen")]
    pub max_gen: usize,

    #[serde(default)]
    pub cmaes: CmaEsConfig,

    #[serde(default)]
    pub adaptive_bounds: AdaptiveBoundsConfig,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            tolerance: default_tolerance(),
            pop_size: default_pop_size(),
            max_gen: default_max_gen(),
            cmaes: CmaEsConfig::default(),
            adaptive_bounds: AdaptiveBoundsConfig::default(),
        }
    }
}

impl OptimizationConfig {
    /// Default configuration for production calibration with high accuracy
    pub fn production() -> Self {
        Self {
            tolerance: 1e-8,
            pop_size: 25,
            max_gen: 50,
            cmaes: CmaEsConfig {
                total_evals_budget: 20000,
                bipop_restarts: 3,
                ..CmaEsConfig::default()
            },
            adaptive_bounds: AdaptiveBoundsConfig::default(),
        }
    }

    /// Fast configuration for development and testing
    pub fn fast() -> Self {
        Self {
            tolerance: 1e-6,
            pop_size: 16,
            max_gen: 40,
            cmaes: CmaEsConfig {
                total_evals_budget: 4000,
                bipop_restarts: 1,
                lbfgsb_max_iterations: 100,
                ..CmaEsConfig::default()
            },
            adaptive_bounds: AdaptiveBoundsConfig::default(),
        }
    }

    /// High-precision configuration for research and backtesting
    pub fn research() -> Self {
        Self {
            tolerance: 1e-9,
            pop_size: 50,
            max_gen: 200,
            cmaes: CmaEsConfig {
                total_evals_budget: 200000,
                bipop_restarts: 5,
                ipop_restarts: 3,
                lbfgsb_max_iterations: 500,
                ..CmaEsConfig::default()
            },
            adaptive_bounds: AdaptiveBoundsConfig {
                enabled: true,
                ..AdaptiveBoundsConfig::default()
            },
        }
    }

    /// Minimal configuration for quick validation and debugging
    pub fn minimal() -> Self {
        Self {
            tolerance: 1e-4,
            pop_size: 10,
            max_gen: 20,
            cmaes: CmaEsConfig {
                total_evals_budget: 500,
                bipop_restarts: 0,
                lbfgsb_max_iterations: 30,
                ..CmaEsConfig::default()
            },
            adaptive_bounds: AdaptiveBoundsConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.pop_size < 2 || self.max_gen == 0 {
            return Err(SurfaceError::invalid(format!(
                "CMA-ES needs a population of at least 2 and one generation, got {} and {}",
                self.pop_size, self.max_gen
            ))
            .into());
        }
        if self.tolerance.is_nan() || self.tolerance <= 0.0 {
            return Err(SurfaceError::invalid(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            ))
            .into());
        }
        let bounds = &self.adaptive_bounds;
        let valid_threshold = (0.0..0.5).contains(&bounds.proximity_threshold);
        let valid_expansion = bounds.expansion_factor.is_finite() && bounds.expansion_factor >= 0.0;
        if bounds.enabled && !(valid_threshold && valid_expansion) {
            return Err(SurfaceError::invalid(
                "adaptive bounds need a proximity threshold in [0, 0.5) and a non-negative expansion factor",
            )
            .into());
        }
        Ok(())
    }
}

fn default_tolerance() -> f64 {
    1e-6
}

fn default_pop_size() -> usize {
    25
}

fn default_max_gen() -> usize {
    50
}

/// Weights of the terms of the calibration cost.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct CostFunctionWeights {
    /// Weight of the volatility-index surface loss.
    pub volatility_index: f64,
    /// Weight of the ATM-skew loss.
    pub skew: f64,
}

impl Default for CostFunctionWeights {
    fn default() -> Self {
        Self {
            volatility_index: 1.0,
            skew: 0.5,
        }
    }
}

impl CostFunctionWeights {
    pub fn validate(&self) -> Result<()> {
        for (name, weight) in [("volatility_index", self.volatility_index), ("skew", self.skew)] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(SurfaceError::invalid(format!(
                    "cost weight {} must be finite and non-negative, got {}",
                    name, weight
                ))
                .into());
            }
        }
        Ok(())
    }
}

/// Quantity the surfaces are compared in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantityKind {
    Price,
    #[default]
    ImpliedVolatility,
}

/// Everything the cost function needs besides the model and the surfaces.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CostFunctionSettings {
    pub weights: CostFunctionWeights,
    /// Reduction of the surface losses.
    pub metric: LossMetric,
    /// Reduction of the per-expiry ATM skews.
    pub skew_metric: LossMetric,
    pub quantity: QuantityKind,
    /// Inverts empirical prices to implied volatilities.
    pub empirical_pricing_model: PricingModel,
    /// Inverts model prices to implied volatilities.
    pub model_pricing_model: PricingModel,
    pub implied_volatility_failure: ImpliedVolatilityFailure,
    pub out_the_money: bool,
    /// Strikes taken on each side of spot for the ATM skew.
    pub skew_window: usize,
    /// Adds the ATM-skew loss of the volatility-index surface, weighted by
    /// both weights.
    pub volatility_index_skew: bool,
}

impl Default for CostFunctionSettings {
    fn default() -> Self {
        Self {
            weights: CostFunctionWeights::default(),
            metric: LossMetric::Mse,
            skew_metric: LossMetric::Rmse,
            quantity: QuantityKind::default(),
            empirical_pricing_model: PricingModel::default(),
            model_pricing_model: PricingModel::default(),
            implied_volatility_failure: ImpliedVolatilityFailure::default(),
            out_the_money: true,
            skew_window: 3,
            volatility_index_skew: false,
        }
    }
}

impl CostFunctionSettings {
    pub fn validate(&self) -> Result<()> {
        self.weights.validate()?;
        if self.skew_window == 0 {
            return Err(SurfaceError::invalid("skew window must cover at least one strike").into());
        }
        Ok(())
    }
}

/// Complete calibration configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub optimization: OptimizationConfig,
    pub cost: CostFunctionSettings,
    /// Starting search box, one `[min, max]` per parameter. Defaults to the
    /// model's bounds; adaptive expansion never leaves them.
    pub search_bounds: Option<Vec<(f64, f64)>>,
}

impl CalibrationConfig {
    pub fn new(optimization: OptimizationConfig, cost: CostFunctionSettings) -> Self {
        Self {
            optimization,
            cost,
            search_bounds: None,
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).context("failed to parse calibration config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read calibration config {}", path.display()))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        self.optimization.validate()?;
        self.cost.validate()
    }
}
