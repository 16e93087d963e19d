//! Pricing-model adapter: converts between option prices and implied
//! volatilities with a closed-form Black-type formula.

pub mod black;

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SurfaceError;
use crate::market::{option_dividend_yields, Underlying};
use crate::options::{decode_symbols, OptionParameters, OptionType};
use crate::surface::QuoteTable;

pub use black::{black76, black_scholes, black_scholes_merton, implied_volatility};

/// Closed-form formula used to quote options in volatility terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PricingModel {
    /// Spot-based, no dividends.
    BlackScholes,
    /// Forward-based, using the nearest futures price.
    Black76,
    /// Spot-based with ATM-implied dividend yields.
    #[default]
    BlackScholesMerton,
}

/// What an implied volatility that cannot be recovered becomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ImpliedVolatilityFailure {
    /// Not-a-number; skipped by the loss metrics.
    #[default]
    Nan,
    /// Zero, as legacy surfaces were filled.
    Zero,
}

impl ImpliedVolatilityFailure {
    pub fn fill(self) -> f64 {
        match self {
            ImpliedVolatilityFailure::Nan => f64::NAN,
            ImpliedVolatilityFailure::Zero => 0.0,
        }
    }
}

/// Per-option inputs resolved from market data.
#[derive(Debug, Clone)]
pub struct PricingInputs {
    /// Spot for the Black-Scholes variants, forward for Black-76.
    pub underlying_price: f64,
    pub parameters: Vec<OptionParameters>,
    pub ttes: Vec<f64>,
    pub rates: Vec<f64>,
    pub dividend_yields: Vec<f64>,
}

impl PricingModel {
    pub fn name(&self) -> &'static str {
        match self {
            PricingModel::BlackScholes => "Black-Scholes",
            PricingModel::Black76 => "Black-76",
            PricingModel::BlackScholesMerton => "Black-Scholes-Merton",
        }
    }

    /// Closed-form price of one option.
    #[allow(clippy::too_many_arguments)]
    pub fn price(
        &self,
        option_type: OptionType,
        underlying_price: f64,
        strike: f64,
        tte: f64,
        rate: f64,
        dividend_yield: f64,
        volatility: f64,
    ) -> f64 {
        match self {
            PricingModel::BlackScholes => {
                black_scholes(option_type, underlying_price, strike, tte, rate, volatility)
            }
            PricingModel::Black76 => {
                black76(option_type, underlying_price, strike, tte, rate, volatility)
            }
            PricingModel::BlackScholesMerton => black_scholes_merton(
                option_type,
                underlying_price,
                strike,
                tte,
                rate,
                dividend_yield,
                volatility,
            ),
        }
    }

    /// Resolves spot/forward, tenors, rates and yields for `symbols`.
    pub fn inputs(
        &self,
        underlying: &Underlying,
        time: NaiveDate,
        symbols: &[String],
    ) -> Result<PricingInputs> {
        let parameters = decode_symbols(underlying.ticker(), symbols)?;
        let ttes: Vec<f64> = parameters.iter().map(|p| p.time_to_expiry(time)).collect();
        let rates = underlying.market().risk_free_rates(time, &ttes)?;

        let (underlying_price, dividend_yields) = match self {
            PricingModel::BlackScholes => (underlying.price(time)?, vec![0.0; parameters.len()]),
            PricingModel::Black76 => (
                underlying.future_price(time, None)?,
                vec![0.0; parameters.len()],
            ),
            PricingModel::BlackScholesMerton => (
                underlying.price(time)?,
                option_dividend_yields(underlying, time, &parameters)?,
            ),
        };

        Ok(PricingInputs {
            underlying_price,
            parameters,
            ttes,
            rates,
            dividend_yields,
        })
    }

    /// Implied volatilities of every column of `prices`; failures become `NaN`.
    pub fn price_implied_volatility(
        &self,
        underlying: &Underlying,
        prices: &QuoteTable,
        time: NaiveDate,
    ) -> Result<QuoteTable> {
        self.price_implied_volatility_with(
            underlying,
            prices,
            time,
            ImpliedVolatilityFailure::default(),
        )
    }

    pub fn price_implied_volatility_with(
        &self,
        underlying: &Underlying,
        prices: &QuoteTable,
        time: NaiveDate,
        failure: ImpliedVolatilityFailure,
    ) -> Result<QuoteTable> {
        let inputs = self.inputs(underlying, time, prices.symbols())?;
        prices.map_columns(|price_type, column| {
            let volatilities: Vec<f64> = column
                .par_iter()
                .enumerate()
                .map(|(i, &price)| {
                    let p = &inputs.parameters[i];
                    if inputs.ttes[i] <= 0.0 {
                        return failure.fill();
                    }
                    implied_volatility(price, |sigma| {
                        self.price(
                            p.option_type,
                            inputs.underlying_price,
                            p.strike as f64,
                            inputs.ttes[i],
                            inputs.rates[i],
                            inputs.dividend_yields[i],
                            sigma,
                        )
                    })
                    .unwrap_or_else(|| failure.fill())
                })
                .collect();
            let failed = volatilities.iter().filter(|v| !v.is_finite() || **v == 0.0).count();
            if failed > 0 {
                debug!(
                    model = self.name(),
                    %price_type,
                    failed,
                    total = volatilities.len(),
                    "implied volatility inversion failed for some options"
                );
            }
            Ok(volatilities)
        })
    }

    /// Prices implied by every column of `volatilities`.
    pub fn volatility_implied_price(
        &self,
        underlying: &Underlying,
        volatilities: &QuoteTable,
        time: NaiveDate,
    ) -> Result<QuoteTable> {
        let inputs = self.inputs(underlying, time, volatilities.symbols())?;
        volatilities.map_columns(|_, column| {
            Ok(column
                .par_iter()
                .enumerate()
                .map(|(i, &sigma)| {
                    let p = &inputs.parameters[i];
                    self.price(
                        p.option_type,
                        inputs.underlying_price,
                        p.strike as f64,
                        inputs.ttes[i],
                        inputs.rates[i],
                        inputs.dividend_yields[i],
                        sigma,
                    )
                })
                .collect())
        })
    }
}

impl fmt::Display for PricingModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PricingModel {
    type Err = SurfaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalised: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalised.as_str() {
            "blackscholes" | "bs" => Ok(PricingModel::BlackScholes),
            "black76" | "b76" => Ok(PricingModel::Black76),
            "blackscholesmerton" | "bsm" => Ok(PricingModel::BlackScholesMerton),
            _ => Err(SurfaceError::invalid(format!("pricing model unknown: '{}'", s))),
        }
    }
}
