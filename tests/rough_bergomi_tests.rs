
use std::sync::Arc;

use approx::assert_relative_eq;
use chrono::NaiveDate;
use stochvol_lib::pricing::black_scholes_merton;
use stochvol_lib::{
    DriftMode, OptionParameters, OptionType, RoughBergomiModel, RoughBergomiParameters,
    SimulatedPaths, SimulationSettings, StochasticVolatilityModel, Underlying,
};
use test_utils::{date, heston_market, init_tracing, spx_heston_parameters};

fn time() -> NaiveDate {
    date(2022, 3, 3)
}

fn expiry() -> NaiveDate {
    date(2022, 6, 3)
}

/// Spot 100, zero rate and zero implied dividend yield.
fn underlying() -> Underlying {
    let market = heston_market(
        "TEST",
        time(),
        100.0,
        0.0,
        &[90, 100, 110],
        &[expiry()],
        true,
        spx_heston_parameters(),
    );
    Underlying::new("TEST", Arc::new(market))
}

fn settings(num_paths: usize, seed: u64) -> SimulationSettings {
    SimulationSettings {
        simulation_length: 0.25,
        steps_per_year: 365,
        num_paths,
        monthly: true,
        seed,
        drift: DriftMode::None,
    }
}

fn model(hurst_index: f64, volatility_of_volatility: f64, wiener_correlation: f64) -> RoughBergomiModel {
    RoughBergomiModel::new(RoughBergomiParameters {
        hurst_index,
        volatility_of_volatility,
        wiener_correlation,
    })
    .unwrap()
}

/// Mean squared one-step increment of the log variance.
fn log_variance_roughness(paths: &SimulatedPaths) -> f64 {
    let mut total = 0.0;
    let mut count = 0usize;
    for row in &paths.variances {
        for pair in row.windows(2) {
            let increment = pair[1].ln() - pair[0].ln();
            total += increment * increment;
            count += 1;
        }
    }
    total / count as f64
}

#[test]
fn test_lower_hurst_index_gives_rougher_variance() {
    init_tracing();
    let underlying = underlying();
    let roughness: Vec<f64> = [0.1, 0.3, 0.5]
        .iter()
        .map(|&hurst| {
            let paths = model(hurst, 1.5, -0.7)
                .simulate_path(&underlying, time(), &settings(200, 11))
                .unwrap();
            log_variance_roughness(&paths)
        })
        .collect();
    assert!(
        roughness[0] > roughness[1] && roughness[1] > roughness[2],
        "roughness {:?}",
        roughness
    );
}

#[test]
fn test_paths_stay_positive_across_parameters() {
    let underlying = underlying();
    for (i, &(hurst, eta, rho)) in [
        (0.05, 3.0, -0.9),
        (0.1, 1.9, -0.9),
        (0.25, 0.5, 0.3),
        (0.45, 2.5, 0.0),
    ]
    .iter()
    .enumerate()
    {
        let model = model(hurst, eta, rho).with_initial_variance(0.04).unwrap();
        let paths = model
            .simulate_path(&underlying, time(), &settings(100, i as u64))
            .unwrap();
        assert_eq!(paths.num_paths(), 100);
        assert_eq!(paths.num_steps(), 91);
        for (prices, variances) in paths.prices.iter().zip(&paths.variances) {
            assert_eq!(prices[0], 100.0);
            assert_eq!(variances[0], 0.04);
            assert!(prices.iter().all(|p| p.is_finite() && *p > 0.0));
            assert!(variances.iter().all(|v| v.is_finite() && *v > 0.0));
        }
    }
}

#[test]
fn test_zero_vol_of_vol_prices_like_black_scholes() {
    let underlying = underlying();
    let variance = 0.235_f64 * 0.235;
    let model = model(0.1, 0.0, 0.0)
        .with_settings(settings(4000, 3))
        .unwrap();
    assert_relative_eq!(
        model.integrated_volatility(&underlying, time(), 0.5).unwrap(),
        variance.sqrt(),
        epsilon = 1e-12
    );

    let options: Vec<OptionParameters> = [90, 100, 110]
        .iter()
        .flat_map(|&strike| {
            [OptionType::Call, OptionType::Put]
                .map(|option_type| OptionParameters::new(option_type, strike, expiry(), true))
        })
        .collect();
    let prices = model.price(&underlying, time(), &options).unwrap();
    let tte = options[0].time_to_expiry(time());
    for (option, price) in options.iter().zip(prices) {
        let expected = black_scholes_merton(
            option.option_type,
            100.0,
            option.strike as f64,
            tte,
            0.0,
            0.0,
            variance.sqrt(),
        );
        assert!(
            (price - expected).abs() < 0.4,
            "{} {} simulated {} expected {}",
            option.option_type,
            option.strike,
            price,
            expected
        );
    }
}

#[test]
fn test_repeated_pricing_reuses_simulation() {
    let underlying = underlying();
    // Shorter than the expiry: the horizon is extended to cover it.
    let mut short = settings(300, 5);
    short.simulation_length = 0.1;
    let model = model(0.1, 1.9, -0.9).with_settings(short).unwrap();
    let options = vec![
        OptionParameters::new(OptionType::Call, 110, expiry(), true),
        OptionParameters::new(OptionType::Put, 90, expiry(), true),
    ];

    let first = model.price(&underlying, time(), &options).unwrap();
    assert_eq!(model.cache_stats().misses, 1);
    assert_eq!(model.cache_stats().hits, 0);

    let trial = model.boxed_clone();
    let second = trial.price(&underlying, time(), &options).unwrap();
    assert_eq!(first, second);
    assert_eq!(model.cache_stats().hits, 1);
    assert!(first.iter().all(|p| p.is_finite() && *p >= 0.0));

    // New parameters mean a new simulation.
    let mut moved = model.clone();
    moved.set_parameter_vector(&[0.2, 1.9, -0.9]).unwrap();
    moved.price(&underlying, time(), &options).unwrap();
    assert_eq!(model.cache_stats().misses, 2);
}

#[test]
fn test_invalid_parameters_are_rejected() {
    let mut model = model(0.1, 1.9, -0.9);
    assert!(model.set_parameter_vector(&[0.0, 1.9, -0.9]).is_err());
    assert!(model.set_parameter_vector(&[0.1, -1.0, -0.9]).is_err());
    assert!(model.set_parameter_vector(&[0.1, 1.9]).is_err());
    assert_eq!(model.parameter_vector(), vec![0.1, 1.9, -0.9]);
    assert!(model.clone().with_initial_variance(0.0).is_err());

    let mut bad = settings(100, 1);
    bad.num_paths = 0;
    assert!(model.clone().with_settings(bad).is_err());
}
