// demos/heston_surface.rs

//! Heston prices and implied volatilities over an SPX strike × expiry grid
//!
//! This example shows how to:
//! 1. Assemble an in-memory market (spot, discount curve, ATM quotes)
//! 2. Price every call and put of a volatility surface with the Heston model
//! 3. Read the out-of-the-money implied-volatility surface

use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use stochvol_lib::{
    HestonModel, HestonParameters, InMemoryMarketData, OptionParameters, OptionType, PriceType,
    PricingModel, QuantityMethod, Quote, SurfaceQuery, Underlying, VolatilitySurface,
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("Heston Volatility Surface Demo");
    println!("==============================");

    let time = date(2022, 3, 3)?;
    let expiries = vec![date(2022, 3, 18)?, date(2022, 4, 29)?, date(2022, 6, 17)?];
    let strikes: Vec<i64> = (3900..=4800).step_by(100).collect();
    let market = create_demo_market(time, &expiries);
    let spx = VolatilitySurface::new(
        Underlying::new("SPX", Arc::new(market)),
        strikes,
        expiries,
        false,
    )?;

    let model = HestonModel::new(HestonParameters {
        initial_variance: 0.04,
        long_term_variance: 0.05,
        volatility_of_volatility: 0.8,
        mean_reversion_rate: 1.5,
        wiener_correlation: -0.7,
    })?;

    println!("\nStep 1: Model prices of {} contracts", spx.symbols().len());
    let prices = spx.model_price(time, &model)?;
    for symbol in prices.symbols().iter().take(6) {
        println!(
            "  {:<22} {:>10.2}",
            symbol,
            prices.value(symbol, PriceType::Mid).unwrap_or(f64::NAN)
        );
    }

    println!("\nStep 2: Out-of-the-money implied volatilities (Black-Scholes-Merton)");
    let query = SurfaceQuery::new(QuantityMethod::ModelImpliedVolatility)
        .with_model(&model)
        .with_pricing_model(PricingModel::BlackScholesMerton);
    let surfaces = spx.surface_quantities(time, &query, &[PriceType::Mid])?;
    let vols = &surfaces[0];

    print!("{:<8}", "Strike");
    for expiry in vols.expiries() {
        print!("{:>12}", expiry.format("%Y-%m-%d").to_string());
    }
    println!();
    println!("{}", "-".repeat(8 + 12 * vols.expiries().len()));
    for (i, strike) in vols.strikes().iter().enumerate() {
        print!("{:<8}", strike);
        for vol in vols.strike_slice(i) {
            print!("{:>11.2}%", vol * 100.0);
        }
        println!();
    }

    let stats = model.cache_stats();
    println!(
        "\nPrice cache: {} entries, {} hits, {} misses",
        stats.entries, stats.hits, stats.misses
    );
    Ok(())
}

fn date(y: i32, m: u32, d: u32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(y, m, d).ok_or_else(|| anyhow::anyhow!("invalid date {}-{}-{}", y, m, d))
}

/// SPX at 4350 with a flat 0.5% curve and an ATM weekly pair per expiry.
fn create_demo_market(time: NaiveDate, expiries: &[NaiveDate]) -> InMemoryMarketData {
    let mut market = InMemoryMarketData::new()
        .with_spot("SPX", time, 4350.0)
        .with_discount_curve(
            time,
            vec![(1.0, 0.005), (30.0, 0.006), (90.0, 0.008), (365.0, 0.012)],
        );
    for &expiry in expiries {
        for option_type in [OptionType::Call, OptionType::Put] {
            market.insert_option_quote(
                "SPX",
                time,
                OptionParameters::new(option_type, 4350, expiry, false),
                Quote::new(60.0, 62.0),
            );
        }
    }
    market
}
