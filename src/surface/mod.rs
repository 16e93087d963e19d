//! Volatility surfaces: a strike × expiry grid of options on one underlying.
//!
//! A [`VolatilitySurface`] owns the grid and its call/put symbols and
//! produces four kinds of quantities for it, selected by [`QuantityMethod`]:
//! empirical prices, empirical implied volatilities, model prices and model
//! implied volatilities. [`VolatilitySurface::surface_quantities`] picks one
//! option per cell (call or put) and returns one [`QuantitySurface`] per
//! requested price type.

pub mod table;

use std::fmt;

use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SurfaceError;
use crate::market::Underlying;
use crate::models::StochasticVolatilityModel;
use crate::options::{OptionParameters, OptionType, PriceType};
use crate::pricing::{ImpliedVolatilityFailure, PricingModel};

pub use table::{QuantitySurface, QuoteTable};

/// Which quantity a surface query produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuantityMethod {
    EmpiricalPrice,
    EmpiricalImpliedVolatility,
    ModelPrice,
    ModelImpliedVolatility,
}

impl QuantityMethod {
    pub fn is_volatility(self) -> bool {
        matches!(
            self,
            QuantityMethod::EmpiricalImpliedVolatility | QuantityMethod::ModelImpliedVolatility
        )
    }

    pub fn is_model(self) -> bool {
        matches!(
            self,
            QuantityMethod::ModelPrice | QuantityMethod::ModelImpliedVolatility
        )
    }
}

impl fmt::Display for QuantityMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QuantityMethod::EmpiricalPrice => "empirical price",
            QuantityMethod::EmpiricalImpliedVolatility => "empirical implied volatility",
            QuantityMethod::ModelPrice => "model price",
            QuantityMethod::ModelImpliedVolatility => "model implied volatility",
        };
        f.write_str(name)
    }
}

/// Arguments of a surface-quantity query besides the date and price types.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceQuery<'a> {
    pub method: QuantityMethod,
    /// Pick out-of-the-money options (calls above spot, puts below).
    pub out_the_money: bool,
    /// Force every cell to calls (`Some(true)`) or puts (`Some(false)`).
    pub call: Option<bool>,
    pub pricing_model: Option<PricingModel>,
    pub model: Option<&'a dyn StochasticVolatilityModel>,
    pub failure: ImpliedVolatilityFailure,
}

impl<'a> SurfaceQuery<'a> {
    pub fn new(method: QuantityMethod) -> Self {
        Self {
            method,
            out_the_money: true,
            call: None,
            pricing_model: None,
            model: None,
            failure: ImpliedVolatilityFailure::default(),
        }
    }

    pub fn with_pricing_model(mut self, pricing_model: PricingModel) -> Self {
        self.pricing_model = Some(pricing_model);
        self
    }

    pub fn with_model(mut self, model: &'a dyn StochasticVolatilityModel) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_out_the_money(mut self, out_the_money: bool) -> Self {
        self.out_the_money = out_the_money;
        self
    }

    pub fn with_call(mut self, call: Option<bool>) -> Self {
        self.call = call;
        self
    }

    pub fn with_failure(mut self, failure: ImpliedVolatilityFailure) -> Self {
        self.failure = failure;
        self
    }
}

/// Call and put symbols of one (strike, expiry) cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceCell {
    pub strike: i64,
    pub expiry: NaiveDate,
    pub call_symbol: String,
    pub put_symbol: String,
}

/// Whether a cell is represented by its call.
pub fn select_call(strike: i64, spot: f64, out_the_money: bool, call: Option<bool>) -> bool {
    call.unwrap_or_else(|| {
        let above = strike as f64 >= spot;
        (above && out_the_money) || (!above && !out_the_money)
    })
}

/// Strike × expiry grid of options on one underlying.
#[derive(Debug, Clone)]
pub struct VolatilitySurface {
    underlying: Underlying,
    strikes: Vec<i64>,
    expiries: Vec<NaiveDate>,
    monthly: bool,
    cells: Vec<SurfaceCell>,
}

impl VolatilitySurface {
    /// Sorts and deduplicates the grid and derives the symbol table.
    pub fn new(
        underlying: Underlying,
        strikes: impl Into<Vec<i64>>,
        expiries: impl Into<Vec<NaiveDate>>,
        monthly: bool,
    ) -> Result<Self> {
        let mut strikes = strikes.into();
        let mut expiries = expiries.into();
        strikes.sort_unstable();
        strikes.dedup();
        expiries.sort_unstable();
        expiries.dedup();

        if strikes.is_empty() || expiries.is_empty() {
            return Err(SurfaceError::invalid(format!(
                "surface needs at least one strike and one expiry, got {} strikes and {} expiries",
                strikes.len(),
                expiries.len()
            ))
            .into());
        }
        if let Some(strike) = strikes.iter().find(|&&k| k <= 0) {
            return Err(SurfaceError::invalid(format!("non-positive strike {}", strike)).into());
        }

        let ticker = underlying.ticker().to_string();
        let cells = strikes
            .iter()
            .flat_map(|&strike| {
                let ticker = ticker.clone();
                expiries.iter().map(move |&expiry| SurfaceCell {
                    strike,
                    expiry,
                    call_symbol: OptionParameters::new(OptionType::Call, strike, expiry, monthly)
                        .symbol(&ticker),
                    put_symbol: OptionParameters::new(OptionType::Put, strike, expiry, monthly)
                        .symbol(&ticker),
                })
            })
            .collect();

        Ok(Self {
            underlying,
            strikes,
            expiries,
            monthly,
            cells,
        })
    }

    pub fn underlying(&self) -> &Underlying {
        &self.underlying
    }

    pub fn strikes(&self) -> &[i64] {
        &self.strikes
    }

    pub fn expiries(&self) -> &[NaiveDate] {
        &self.expiries
    }

    pub fn monthly(&self) -> bool {
        self.monthly
    }

    /// Cells in strike-major order.
    pub fn cells(&self) -> &[SurfaceCell] {
        &self.cells
    }

    /// Every call and put symbol, cell by cell.
    pub fn symbols(&self) -> Vec<String> {
        self.cells
            .iter()
            .flat_map(|cell| [cell.call_symbol.clone(), cell.put_symbol.clone()])
            .collect()
    }

    /// One symbol per cell following the OTM policy relative to spot at `time`.
    pub fn surface_symbols(
        &self,
        time: NaiveDate,
        out_the_money: bool,
        call: Option<bool>,
    ) -> Result<Vec<String>> {
        let spot = match call {
            Some(_) => f64::NAN,
            None => self.underlying.price(time)?,
        };
        Ok(self
            .cells
            .iter()
            .map(|cell| {
                if select_call(cell.strike, spot, out_the_money, call) {
                    cell.call_symbol.clone()
                } else {
                    cell.put_symbol.clone()
                }
            })
            .collect())
    }

    /// Bid, ask and mid quotes of every symbol; missing quotes are `NaN`.
    pub fn empirical_price(&self, time: NaiveDate) -> Result<QuoteTable> {
        let symbols = self.symbols();
        let quotes = self
            .underlying
            .market()
            .option_quotes(self.underlying.ticker(), time, &symbols)?;
        let missing = quotes.iter().filter(|q| q.is_none()).count();
        if missing > 0 {
            debug!(ticker = self.underlying.ticker(), %time, missing, "surface options without quotes");
        }
        QuoteTable::from_quotes(symbols, &quotes)
    }

    pub fn empirical_pricing_implied_volatility(
        &self,
        time: NaiveDate,
        pricing_model: PricingModel,
        failure: ImpliedVolatilityFailure,
    ) -> Result<QuoteTable> {
        let prices = self.empirical_price(time)?;
        pricing_model.price_implied_volatility_with(&self.underlying, &prices, time, failure)
    }

    /// Model prices of every symbol, as a `Mid` column.
    pub fn model_price(&self, time: NaiveDate, model: &dyn StochasticVolatilityModel) -> Result<QuoteTable> {
        model.price_surface(&self.underlying, time, &self.symbols())
    }

    pub fn model_pricing_implied_volatility(
        &self,
        time: NaiveDate,
        model: &dyn StochasticVolatilityModel,
        pricing_model: PricingModel,
        failure: ImpliedVolatilityFailure,
    ) -> Result<QuoteTable> {
        let prices = self.model_price(time, model)?;
        pricing_model.price_implied_volatility_with(&self.underlying, &prices, time, failure)
    }

    /// Full quantity table of every symbol for `query.method`.
    pub fn quantities(&self, time: NaiveDate, query: &SurfaceQuery<'_>) -> Result<QuoteTable> {
        let pricing_model = || {
            query.pricing_model.ok_or_else(|| {
                SurfaceError::invalid(format!("{} requires a pricing model", query.method))
            })
        };
        let model = || {
            query.model.ok_or_else(|| {
                SurfaceError::invalid(format!("{} requires a stochastic volatility model", query.method))
            })
        };

        match query.method {
            QuantityMethod::EmpiricalPrice => self.empirical_price(time),
            QuantityMethod::EmpiricalImpliedVolatility => {
                self.empirical_pricing_implied_volatility(time, pricing_model()?, query.failure)
            }
            QuantityMethod::ModelPrice => self.model_price(time, model()?),
            QuantityMethod::ModelImpliedVolatility => {
                self.model_pricing_implied_volatility(time, model()?, pricing_model()?, query.failure)
            }
        }
    }

    /// One surface per price type, each cell holding the quantity of the
    /// option selected by the OTM policy.
    pub fn surface_quantities(
        &self,
        time: NaiveDate,
        query: &SurfaceQuery<'_>,
        price_types: &[PriceType],
    ) -> Result<Vec<QuantitySurface>> {
        let selected = self.surface_symbols(time, query.out_the_money, query.call)?;
        let quantities = self.quantities(time, query)?;

        price_types
            .iter()
            .map(|&price_type| {
                let values = quantities.select(&selected, price_type)?;
                QuantitySurface::new(price_type, self.strikes.clone(), self.expiries.clone(), values)
            })
            .collect()
    }
}
