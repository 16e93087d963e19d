use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;

use super::{ChainQuote, MarketData};
use crate::cache::{BatchCache, CacheStats, FloatKey};
use crate::options::Quote;

/// Memoizing wrapper around a market-data backend.
///
/// Option quotes and risk-free rates are cached per element (one symbol, one
/// tenor) together with the remaining arguments, so overlapping batch
/// requests only hit the backend for elements not seen before.
#[derive(Debug)]
pub struct CachedMarketData<M> {
    inner: M,
    spots: BatchCache<(String, NaiveDate), f64>,
    futures: BatchCache<(String, NaiveDate, Option<NaiveDate>, bool), f64>,
    quotes: BatchCache<(String, String, NaiveDate), Option<Quote>>,
    curves: BatchCache<NaiveDate, Arc<Vec<(f64, f64)>>>,
    rates: BatchCache<(FloatKey, NaiveDate), f64>,
    chains: BatchCache<(String, NaiveDate, NaiveDate, bool), Arc<Vec<ChainQuote>>>,
    expiries: BatchCache<(String, NaiveDate, bool), Arc<Vec<NaiveDate>>>,
}

impl<M: MarketData> CachedMarketData<M> {
    pub fn new(inner: M) -> Self {
        Self {
            inner,
            spots: BatchCache::new(),
            futures: BatchCache::new(),
            quotes: BatchCache::new(),
            curves: BatchCache::new(),
            rates: BatchCache::new(),
            chains: BatchCache::new(),
            expiries: BatchCache::new(),
        }
    }

    pub fn inner(&self) -> &M {
        &self.inner
    }

    /// Counters of the per-symbol quote cache.
    pub fn quote_stats(&self) -> CacheStats {
        self.quotes.stats()
    }

    /// Counters of the per-tenor rate cache.
    pub fn rate_stats(&self) -> CacheStats {
        self.rates.stats()
    }

    /// Forgets everything fetched so far.
    pub fn clear(&self) {
        self.spots.clear();
        self.futures.clear();
        self.quotes.clear();
        self.curves.clear();
        self.rates.clear();
        self.chains.clear();
        self.expiries.clear();
    }
}

impl<M: MarketData> MarketData for CachedMarketData<M> {
    fn spot(&self, ticker: &str, time: NaiveDate) -> Result<f64> {
        self.spots
            .get_or_try_insert_with((ticker.to_uppercase(), time), || self.inner.spot(ticker, time))
    }

    fn future_price(
        &self,
        ticker: &str,
        time: NaiveDate,
        expiry: Option<NaiveDate>,
        am_settlement: bool,
    ) -> Result<f64> {
        self.futures.get_or_try_insert_with(
            (ticker.to_uppercase(), time, expiry, am_settlement),
            || self.inner.future_price(ticker, time, expiry, am_settlement),
        )
    }

    fn option_quotes(
        &self,
        ticker: &str,
        time: NaiveDate,
        symbols: &[String],
    ) -> Result<Vec<Option<Quote>>> {
        let ticker_key = ticker.to_uppercase();
        let keys: Vec<(String, String, NaiveDate)> = symbols
            .iter()
            .map(|symbol| (symbol.clone(), ticker_key.clone(), time))
            .collect();
        self.quotes.get_or_try_compute_batch(&keys, |missing| {
            let missing_symbols: Vec<String> = missing.iter().map(|k| k.0.clone()).collect();
            self.inner.option_quotes(ticker, time, &missing_symbols)
        })
    }

    fn discount_curve(&self, time: NaiveDate) -> Result<Vec<(f64, f64)>> {
        let curve = self
            .curves
            .get_or_try_insert_with(time, || Ok(Arc::new(self.inner.discount_curve(time)?)))?;
        Ok(curve.as_ref().clone())
    }

    fn option_chain(
        &self,
        ticker: &str,
        time: NaiveDate,
        expiry: NaiveDate,
        monthly: bool,
    ) -> Result<Vec<ChainQuote>> {
        let chain = self
            .chains
            .get_or_try_insert_with((ticker.to_uppercase(), time, expiry, monthly), || {
                Ok(Arc::new(self.inner.option_chain(ticker, time, expiry, monthly)?))
            })?;
        Ok(chain.as_ref().clone())
    }

    fn listed_expiries(&self, ticker: &str, time: NaiveDate, monthly: bool) -> Result<Vec<NaiveDate>> {
        let expiries = self
            .expiries
            .get_or_try_insert_with((ticker.to_uppercase(), time, monthly), || {
                Ok(Arc::new(self.inner.listed_expiries(ticker, time, monthly)?))
            })?;
        Ok(expiries.as_ref().clone())
    }

    fn risk_free_rates(&self, time: NaiveDate, ttes: &[f64]) -> Result<Vec<f64>> {
        let keys: Vec<(FloatKey, NaiveDate)> =
            ttes.iter().map(|&tte| (FloatKey::new(tte), time)).collect();
        self.rates.get_or_try_compute_batch(&keys, |missing| {
            let missing_ttes: Vec<f64> = missing.iter().map(|k| k.0.value()).collect();
            self.inner.risk_free_rates(time, &missing_ttes)
        })
    }
}
