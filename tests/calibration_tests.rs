
use std::sync::Arc;

use approx::assert_relative_eq;
use chrono::NaiveDate;
use stochvol_lib::{
    evaluate_model, CalibrationConfig, CostFunctionSettings, CostFunctionWeights, DriftMode,
    HestonModel, HestonParameters, InMemoryMarketData, OptimizationConfig, QuantityKind,
    RoughBergomiModel, RoughBergomiParameters, SimulationSettings, StochasticVolatilityModel,
    SurfaceError, Underlying, VolatilitySurface,
};
use test_utils::{date, heston_surface, init_tracing};

fn time() -> NaiveDate {
    date(2022, 3, 3)
}

fn truth() -> HestonParameters {
    HestonParameters {
        initial_variance: 0.04,
        long_term_variance: 0.06,
        volatility_of_volatility: 0.6,
        mean_reversion_rate: 2.0,
        wiener_correlation: -0.7,
    }
}

fn start() -> HestonParameters {
    HestonParameters {
        initial_variance: 0.06,
        long_term_variance: 0.04,
        volatility_of_volatility: 1.0,
        mean_reversion_rate: 1.0,
        wiener_correlation: -0.3,
    }
}

fn price_only_settings() -> CostFunctionSettings {
    CostFunctionSettings {
        weights: CostFunctionWeights {
            volatility_index: 0.0,
            skew: 0.0,
        },
        quantity: QuantityKind::Price,
        ..Default::default()
    }
}

fn heston_config() -> CalibrationConfig {
    let mut optimization = OptimizationConfig::fast();
    optimization.tolerance = 1e-10;
    optimization.pop_size = 16;
    optimization.max_gen = 120;
    optimization.cmaes.seed = Some(42);
    optimization.cmaes.bipop_restarts = 0;
    optimization.cmaes.total_evals_budget = 6000;
    optimization.cmaes.lbfgsb_max_iterations = 300;
    CalibrationConfig::new(optimization, price_only_settings())
}

/// Recovers Heston parameters from a surface of its own prices.
#[test]
fn test_heston_fit_recovers_synthetic_surface() {
    init_tracing();
    let strikes: Vec<i64> = (70..=130).step_by(5).collect();
    let expiries = vec![
        date(2022, 4, 1),
        date(2022, 6, 3),
        date(2022, 9, 2),
        date(2023, 3, 3),
    ];
    let surface = heston_surface("TEST", time(), 100.0, &strikes, &expiries, truth());

    let mut model = HestonModel::new(start()).unwrap();
    let config = heston_config();
    let report = model.fit(&surface, &surface, time(), &config).unwrap();

    assert_eq!(report.model, "Heston");
    assert!(report.improved());
    assert!(report.final_cost < report.initial_cost);
    assert!(report.final_cost < 0.05, "final cost {}", report.final_cost);

    let truth = truth();
    let expected = [
        truth.initial_variance,
        truth.long_term_variance,
        truth.volatility_of_volatility,
        truth.mean_reversion_rate,
        truth.wiener_correlation,
    ];
    for ((name, value), target) in model.parameters().into_iter().zip(expected) {
        assert!(
            ((value - target) / target).abs() < 0.05,
            "{} = {}, generated with {}",
            name,
            value,
            target
        );
    }
    assert_eq!(report.parameters, model.parameters());

    // The reported cost is the cost of the fitted model.
    let cost = evaluate_model(&model, &surface, &surface, time(), &config.cost).unwrap();
    assert_relative_eq!(cost, report.final_cost, max_relative = 1e-6);
}

#[test]
fn test_fit_stays_inside_search_bounds() {
    let strikes: Vec<i64> = (80..=120).step_by(10).collect();
    let expiries = vec![date(2022, 6, 3), date(2022, 9, 2)];
    let surface = heston_surface("TEST", time(), 100.0, &strikes, &expiries, truth());

    let mut config = heston_config();
    config.optimization = OptimizationConfig::minimal();
    config.optimization.cmaes.seed = Some(1);
    // The true correlation lies outside this box.
    let search_bounds = vec![
        (0.01, 0.2),
        (0.01, 0.2),
        (0.1, 2.0),
        (0.5, 5.0),
        (-0.5, 0.0),
    ];
    config.search_bounds = Some(search_bounds.clone());

    let mut model = HestonModel::new(start()).unwrap();
    let report = model.fit(&surface, &surface, time(), &config).unwrap();
    assert!(report.final_cost <= report.initial_cost);
    for ((name, value), (lo, hi)) in report.parameters.iter().zip(&search_bounds) {
        assert!(*value >= *lo && *value <= *hi, "{} = {} outside [{}, {}]", name, value, lo, hi);
    }
}

#[test]
fn test_missing_volatility_index_data_aborts_fit() {
    let strikes: Vec<i64> = vec![90, 100, 110];
    let expiries = vec![date(2022, 6, 3)];
    let surface = heston_surface("TEST", time(), 100.0, &strikes, &expiries, truth());
    let vix = VolatilitySurface::new(
        Underlying::new("VIX", Arc::new(InMemoryMarketData::new())),
        vec![20, 25],
        expiries,
        true,
    )
    .unwrap();

    let mut config = heston_config();
    config.cost.weights.volatility_index = 1.0;
    let mut model = HestonModel::new(start()).unwrap();
    let err = model.fit(&surface, &vix, time(), &config).unwrap_err();
    assert!(matches!(
        SurfaceError::classify(&err),
        Some(SurfaceError::NotFound { .. })
    ));
    assert_eq!(*model.heston_parameters(), start());
}

/// Cheap rough Bergomi calibration configured from a TOML file.
#[test]
fn test_rough_bergomi_fit_from_toml_config() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("calibration.toml");
    std::fs::write(
        &path,
        r#"
            [optimization]
            tolerance = 1e-4
            pop_size = 8
            max_gen = 6
            [optimization.cmaes]
            seed = 5
            bipop_restarts = 0
            total_evals_budget = 60
            lbfgsb_max_iterations = 5

            [cost]
            quantity = "implied_volatility"
            [cost.weights]
            volatility_index = 0.0
            skew = 0.5
        "#,
    )
    .unwrap();
    let config = CalibrationConfig::from_toml_file(&path).unwrap();
    assert_eq!(config.cost.quantity, QuantityKind::ImpliedVolatility);

    let strikes: Vec<i64> = vec![90, 95, 100, 105, 110];
    let expiries = vec![date(2022, 6, 3)];
    let surface = heston_surface("TEST", time(), 100.0, &strikes, &expiries, truth());

    let mut model = RoughBergomiModel::new(RoughBergomiParameters {
        hurst_index: 0.2,
        volatility_of_volatility: 1.5,
        wiener_correlation: -0.5,
    })
    .unwrap()
    .with_initial_variance(0.05)
    .unwrap()
    .with_settings(SimulationSettings {
        simulation_length: 0.25,
        steps_per_year: 52,
        num_paths: 300,
        monthly: true,
        seed: 9,
        drift: DriftMode::TermStructure,
    })
    .unwrap();

    let report = model.fit(&surface, &surface, time(), &config).unwrap();
    assert_eq!(report.model, "Rough Bergomi");
    assert!(report.initial_cost.is_finite());
    assert!(report.final_cost <= report.initial_cost);
    for ((name, value), (lo, hi)) in report.parameters.iter().zip(model.bounds()) {
        assert!(*value >= lo && *value <= hi, "{} = {}", name, value);
    }
    assert_eq!(
        model.parameter_vector(),
        report.parameters.iter().map(|(_, v)| *v).collect::<Vec<_>>()
    );
}

/// Parallel population evaluation with simulations that themselves run on rayon.
#[test]
fn test_rough_bergomi_fit_with_parallel_population_on_a_thread_pool() {
    let strikes: Vec<i64> = vec![90, 100, 110];
    let expiries = vec![date(2022, 6, 3)];
    let surface = heston_surface("TEST", time(), 100.0, &strikes, &expiries, truth());

    let mut optimization = OptimizationConfig::minimal();
    optimization.pop_size = 8;
    optimization.max_gen = 3;
    optimization.cmaes.seed = Some(3);
    optimization.cmaes.parallel_eval = true;
    optimization.cmaes.total_evals_budget = 24;
    optimization.cmaes.lbfgsb_max_iterations = 2;
    let config = CalibrationConfig::new(optimization, price_only_settings());

    let mut model = RoughBergomiModel::new(RoughBergomiParameters {
        hurst_index: 0.15,
        volatility_of_volatility: 1.5,
        wiener_correlation: -0.6,
    })
    .unwrap()
    .with_settings(SimulationSettings {
        simulation_length: 0.25,
        steps_per_year: 252,
        num_paths: 1000,
        monthly: true,
        seed: 4,
        drift: DriftMode::None,
    })
    .unwrap();

    let pool = rayon::ThreadPoolBuilder::new().num_threads(8).build().unwrap();
    let report = pool
        .install(|| model.fit(&surface, &surface, time(), &config))
        .unwrap();
    assert!(report.final_cost <= report.initial_cost);
    assert!(model.cache_stats().misses > 1);
}
