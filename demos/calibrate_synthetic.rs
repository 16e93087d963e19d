// demos/calibrate_synthetic.rs

//! Calibration of the Heston model to a synthetic surface
//!
//! This example shows how to:
//! 1. Quote a market with prices generated by known Heston parameters
//! 2. Calibrate a Heston model from a distant starting point
//! 3. Inspect the fit report and the cost of the fitted model

use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use stochvol_lib::{
    default_configs, evaluate_model, CalibrationConfig, CostFunctionSettings, CostFunctionWeights,
    HestonModel, HestonParameters, InMemoryMarketData, OptionParameters, OptionType, QuantityKind,
    Quote, StochasticVolatilityModel, Underlying, VolatilitySurface,
};
use tracing_subscriber::EnvFilter;

const TICKER: &str = "DEMO";
const SPOT: f64 = 100.0;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("Heston Calibration Demo");
    println!("=======================");

    let time = date(2022, 3, 3)?;
    let expiries = vec![date(2022, 4, 1)?, date(2022, 6, 3)?, date(2022, 9, 2)?];
    let strikes: Vec<i64> = (80..=120).step_by(5).collect();
    let truth = HestonParameters {
        initial_variance: 0.04,
        long_term_variance: 0.06,
        volatility_of_volatility: 0.6,
        mean_reversion_rate: 2.0,
        wiener_correlation: -0.7,
    };

    let market = synthetic_market(time, &strikes, &expiries, truth)?;
    let surface = VolatilitySurface::new(
        Underlying::new(TICKER, Arc::new(market)),
        strikes,
        expiries,
        true,
    )?;
    println!("Surface: {} contracts, generated with {:?}", surface.symbols().len(), truth);

    let cost = CostFunctionSettings {
        weights: CostFunctionWeights {
            volatility_index: 0.0,
            skew: 0.5,
        },
        quantity: QuantityKind::ImpliedVolatility,
        ..Default::default()
    };
    let config = CalibrationConfig::new(default_configs::fast(), cost);

    let mut model = HestonModel::new(HestonParameters {
        initial_variance: 0.08,
        long_term_variance: 0.03,
        volatility_of_volatility: 1.2,
        mean_reversion_rate: 0.8,
        wiener_correlation: -0.2,
    })?;

    println!("\nCalibrating (surface in implied volatility, ATM skew weight 0.5)...");
    let report = model.fit(&surface, &surface, time, &config)?;

    println!("Calibration completed!");
    println!("  Initial cost: {:.6}", report.initial_cost);
    println!("  Final cost:   {:.6}", report.final_cost);
    println!("\n{:<26} {:>10} {:>10}", "Parameter", "Fitted", "True");
    println!("{}", "-".repeat(48));
    for ((name, fitted), actual) in report.parameters.iter().zip(truth_vector(&truth)) {
        println!("{:<26} {:>10.4} {:>10.4}", name, fitted, actual);
    }

    let check = evaluate_model(&model, &surface, &surface, time, &config.cost)?;
    println!("\nCost of the fitted model: {:.6}", check);
    Ok(())
}

fn date(y: i32, m: u32, d: u32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(y, m, d).ok_or_else(|| anyhow::anyhow!("invalid date {}-{}-{}", y, m, d))
}

fn truth_vector(parameters: &HestonParameters) -> [f64; 5] {
    [
        parameters.initial_variance,
        parameters.long_term_variance,
        parameters.volatility_of_volatility,
        parameters.mean_reversion_rate,
        parameters.wiener_correlation,
    ]
}

/// Quotes every call and put at the Heston price of `parameters`.
///
/// ATM placeholders with equal call and put prices pin the implied dividend
/// yield to the rate while the Heston prices are computed.
fn synthetic_market(
    time: NaiveDate,
    strikes: &[i64],
    expiries: &[NaiveDate],
    parameters: HestonParameters,
) -> Result<InMemoryMarketData> {
    let mut market = InMemoryMarketData::new()
        .with_spot(TICKER, time, SPOT)
        .with_discount_curve(time, vec![(1.0, 0.01), (365.0, 0.01), (730.0, 0.01)]);
    for &expiry in expiries {
        for option_type in [OptionType::Call, OptionType::Put] {
            market.insert_option_quote(
                TICKER,
                time,
                OptionParameters::new(option_type, SPOT as i64, expiry, true),
                Quote::new(1.0, 1.0),
            );
        }
    }

    let options: Vec<OptionParameters> = strikes
        .iter()
        .flat_map(|&strike| {
            expiries.iter().flat_map(move |&expiry| {
                [OptionType::Call, OptionType::Put]
                    .map(|option_type| OptionParameters::new(option_type, strike, expiry, true))
            })
        })
        .collect();
    let seed = Underlying::new(TICKER, Arc::new(market.clone()));
    let prices = HestonModel::new(parameters)?.price(&seed, time, &options)?;
    for (option, price) in options.into_iter().zip(prices) {
        market.insert_option_quote(TICKER, time, option, Quote::new(price, price));
    }
    Ok(market)
}
