//! Market-data accessors.
//!
//! The pricing and calibration layers only see the [`MarketData`] trait:
//! spot and futures prices, option quotes, option chains and the discount
//! curve as of a date. Backends:
//!
//! - [`InMemoryMarketData`]: builder-populated store (tests, synthetic data)
//! - [`FlatFileMarketData`]: CSV files on disk
//! - [`CachedMarketData`]: memoizing wrapper around any backend
//!
//! Derived quantities (interpolated risk-free rates, ATM-implied dividend
//! yields and forwards) are computed on top of the trait.

pub mod cached;
pub mod dividends;
pub mod flat_file;
pub mod memory;
pub mod spline;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;

use crate::error::SurfaceError;
use crate::options::{deannualise, OptionParameters, OptionType, Quote};

pub use cached::CachedMarketData;
pub use dividends::{
    atm_quotes, dividend_yields, interpolated_dividend_yields, option_dividend_yields,
    option_implied_forwards, AtmQuote,
};
pub use flat_file::FlatFileMarketData;
pub use memory::InMemoryMarketData;
pub use spline::{Extrapolation, NaturalCubicSpline};

/// One quoted contract of an option chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainQuote {
    pub parameters: OptionParameters,
    pub quote: Quote,
}

/// Read-only view of the market as of a date.
///
/// Implementations must be shareable across the threads used for batch
/// pricing, hence the `Send + Sync` bound.
pub trait MarketData: Send + Sync + fmt::Debug {
    /// Closing price of `ticker` on `time`.
    fn spot(&self, ticker: &str, time: NaiveDate) -> Result<f64>;

    /// Futures price; without `expiry` the nearest future expiring after `time`.
    fn future_price(
        &self,
        ticker: &str,
        time: NaiveDate,
        expiry: Option<NaiveDate>,
        am_settlement: bool,
    ) -> Result<f64>;

    /// Quotes for `symbols`, `None` for symbols that are not quoted.
    fn option_quotes(
        &self,
        ticker: &str,
        time: NaiveDate,
        symbols: &[String],
    ) -> Result<Vec<Option<Quote>>>;

    /// Discount curve as `(days to maturity, rate)` knots.
    fn discount_curve(&self, time: NaiveDate) -> Result<Vec<(f64, f64)>>;

    /// Every quoted contract for one expiry; empty when nothing is listed.
    fn option_chain(
        &self,
        ticker: &str,
        time: NaiveDate,
        expiry: NaiveDate,
        monthly: bool,
    ) -> Result<Vec<ChainQuote>>;

    /// Expiries with at least one quote on `time`, ascending.
    fn listed_expiries(&self, ticker: &str, time: NaiveDate, monthly: bool) -> Result<Vec<NaiveDate>>;

    /// Risk-free rates for year fractions `ttes`, natural cubic spline over the curve.
    fn risk_free_rates(&self, time: NaiveDate, ttes: &[f64]) -> Result<Vec<f64>> {
        let spline = discount_spline(&self.discount_curve(time)?, time)?;
        Ok(ttes
            .iter()
            .map(|&tte| spline.evaluate(deannualise(tte)))
            .collect())
    }

    /// Strikes quoted for both calls and puts of one expiry, ascending.
    fn strikes_of_expiry(
        &self,
        ticker: &str,
        time: NaiveDate,
        expiry: NaiveDate,
        monthly: bool,
    ) -> Result<Vec<i64>> {
        let chain = self.option_chain(ticker, time, expiry, monthly)?;
        let strikes_of = |option_type: OptionType| -> BTreeSet<i64> {
            chain
                .iter()
                .filter(|q| q.parameters.option_type == option_type)
                .map(|q| q.parameters.strike)
                .collect()
        };
        let calls = strikes_of(OptionType::Call);
        let puts = strikes_of(OptionType::Put);
        if calls != puts {
            return Err(SurfaceError::invalid(format!(
                "calls and puts of {} {} have different strikes: calls {:?}, puts {:?}",
                ticker, expiry, calls, puts
            ))
            .into());
        }
        Ok(calls.into_iter().collect())
    }

    /// Expiries on which every strike in `strikes` is quoted.
    fn expiries_of_strikes(
        &self,
        ticker: &str,
        time: NaiveDate,
        strikes: &[i64],
        monthly: bool,
    ) -> Result<Vec<NaiveDate>> {
        let mut expiries = Vec::new();
        for expiry in self.listed_expiries(ticker, time, monthly)? {
            let listed = self.strikes_of_expiry(ticker, time, expiry, monthly)?;
            if strikes.iter().all(|strike| listed.binary_search(strike).is_ok()) {
                expiries.push(expiry);
            }
        }
        Ok(expiries)
    }
}

/// One listed futures contract.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FutureQuote {
    pub expiry: NaiveDate,
    pub am_settlement: bool,
    pub price: f64,
}

/// Picks the requested future, or the nearest one expiring after `time`.
pub(crate) fn resolve_future_price(
    futures: &[FutureQuote],
    ticker: &str,
    time: NaiveDate,
    expiry: Option<NaiveDate>,
    am_settlement: bool,
) -> Result<f64> {
    let mut candidates = futures.iter().filter(|f| f.am_settlement == am_settlement);
    let found = match expiry {
        Some(expiry) => candidates.find(|f| f.expiry == expiry),
        None => candidates
            .filter(|f| f.expiry > time)
            .min_by_key(|f| f.expiry),
    };
    found.map(|f| f.price).ok_or_else(|| {
        let key = match expiry {
            Some(expiry) => format!("{} expiring {} on {}", ticker, expiry, time),
            None => format!("{} on {}", ticker, time),
        };
        SurfaceError::not_found("future", key).into()
    })
}

/// Spline through a discount curve keyed by days to maturity.
pub(crate) fn discount_spline(curve: &[(f64, f64)], time: NaiveDate) -> Result<NaturalCubicSpline> {
    if curve.is_empty() {
        return Err(SurfaceError::not_found("discount curve", time).into());
    }
    let mut knots = curve.to_vec();
    knots.sort_by(|a, b| a.0.total_cmp(&b.0));
    knots.dedup_by(|a, b| a.0 == b.0);
    let (days, rates): (Vec<f64>, Vec<f64>) = knots.into_iter().unzip();
    NaturalCubicSpline::new(days, rates, Extrapolation::Polynomial)
}

/// A traded asset backed by a market-data source.
#[derive(Clone)]
pub struct Underlying {
    ticker: String,
    market: Arc<dyn MarketData>,
}

impl Underlying {
    /// The ticker is normalised to upper case.
    pub fn new(ticker: impl Into<String>, market: Arc<dyn MarketData>) -> Self {
        Self {
            ticker: ticker.into().to_uppercase(),
            market,
        }
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn market(&self) -> &dyn MarketData {
        self.market.as_ref()
    }

    pub fn price(&self, time: NaiveDate) -> Result<f64> {
        self.market.spot(&self.ticker, time)
    }

    /// AM-settled futures price, nearest expiry when `expiry` is `None`.
    pub fn future_price(&self, time: NaiveDate, expiry: Option<NaiveDate>) -> Result<f64> {
        self.market.future_price(&self.ticker, time, expiry, true)
    }
}

impl fmt::Debug for Underlying {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Underlying")
            .field("ticker", &self.ticker)
            .finish_non_exhaustive()
    }
}
