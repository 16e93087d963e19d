pub mod config;
pub mod evaluation;
pub mod metrics;
pub mod objective;
pub mod pipeline;
pub mod types;

pub use config::{
    AdaptiveBoundsConfig, CalibrationConfig, CmaEsConfig, CostFunctionSettings,
    CostFunctionWeights, OptimizationConfig, QuantityKind,
};
pub use evaluation::{atm_skew, atm_skews, surface_atm_skew, surface_evaluation};
pub use metrics::LossMetric;
pub use objective::{
    cost_function, fit_model, minimise_cost_function, FitReport, SurfaceCalibrator,
    INVALID_PARAMETERS_PENALTY,
};
pub use pipeline::{calibrate_model, calibrate_model_adaptive, CalibrationProcess};
pub use types::ModelCalibrator;

// Re-export optimization algorithms for easy access inside the library
pub use cmaes_lbfgsb::cmaes;
pub use cmaes_lbfgsb::lbfgsb_optimize;
