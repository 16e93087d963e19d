// demos/rough_bergomi_paths.rs

//! Rough Bergomi path simulation and Monte-Carlo pricing
//!
//! This example shows how to:
//! 1. Simulate price and variance paths with the hybrid scheme
//! 2. Compare the roughness of the variance for several Hurst indices
//! 3. Price options from the cached simulation

use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use stochvol_lib::{
    DriftMode, InMemoryMarketData, OptionParameters, OptionType, Quote, RoughBergomiModel,
    RoughBergomiParameters, SimulationSettings, StochasticVolatilityModel, Underlying,
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("Rough Bergomi Simulation Demo");
    println!("=============================");

    let time = date(2022, 3, 3)?;
    let expiry = date(2022, 6, 17)?;
    let underlying = Underlying::new("SPX", Arc::new(create_demo_market(time, expiry)));
    let settings = SimulationSettings {
        simulation_length: 0.5,
        steps_per_year: 252,
        num_paths: 2000,
        monthly: true,
        seed: 343,
        drift: DriftMode::TermStructure,
    };

    println!("\nStep 1: Variance roughness by Hurst index");
    println!("{:<8} {:>18} {:>16}", "H", "E[(d ln V)^2]", "E[S_T]");
    for hurst_index in [0.05, 0.1, 0.3, 0.5] {
        let model = RoughBergomiModel::new(RoughBergomiParameters {
            hurst_index,
            volatility_of_volatility: 1.9,
            wiener_correlation: -0.9,
        })?;
        let paths = model.simulate_path(&underlying, time, &settings)?;
        let increments: Vec<f64> = paths
            .variances
            .iter()
            .flat_map(|row| row.windows(2).map(|w| (w[1].ln() - w[0].ln()).powi(2)))
            .collect();
        let roughness = increments.iter().sum::<f64>() / increments.len() as f64;
        let terminal = paths
            .prices
            .iter()
            .filter_map(|row| row.last())
            .sum::<f64>()
            / paths.num_paths() as f64;
        println!("{:<8.2} {:>18.6} {:>16.2}", hurst_index, roughness, terminal);
    }

    println!("\nStep 2: Monte-Carlo prices for {}", expiry);
    let model = RoughBergomiModel::new(RoughBergomiParameters {
        hurst_index: 0.1,
        volatility_of_volatility: 1.9,
        wiener_correlation: -0.9,
    })?
    .with_settings(settings)?;
    let options: Vec<OptionParameters> = (4000..=4700)
        .step_by(100)
        .map(|strike| {
            let option_type = if strike < 4350 { OptionType::Put } else { OptionType::Call };
            OptionParameters::new(option_type, strike, expiry, true)
        })
        .collect();
    let prices = model.price(&underlying, time, &options)?;
    for (option, price) in options.iter().zip(&prices) {
        println!("  {:<22} {:>10.2}", option.symbol("SPX"), price);
    }

    // The second pricing reuses the simulated paths.
    model.price(&underlying, time, &options)?;
    let stats = model.cache_stats();
    println!("\nPath cache: {} hits, {} misses", stats.hits, stats.misses);
    Ok(())
}

fn date(y: i32, m: u32, d: u32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(y, m, d).ok_or_else(|| anyhow::anyhow!("invalid date {}-{}-{}", y, m, d))
}

/// SPX at 4350 with a flat 0.5% curve and a monthly ATM pair.
fn create_demo_market(time: NaiveDate, expiry: NaiveDate) -> InMemoryMarketData {
    InMemoryMarketData::new()
        .with_spot("SPX", time, 4350.0)
        .with_discount_curve(time, vec![(1.0, 0.005), (365.0, 0.005)])
        .with_option_quote(
            "SPX",
            time,
            OptionParameters::new(OptionType::Call, 4350, expiry, true),
            Quote::new(140.0, 142.0),
        )
        .with_option_quote(
            "SPX",
            time,
            OptionParameters::new(OptionType::Put, 4350, expiry, true),
            Quote::new(136.0, 138.0),
        )
}
