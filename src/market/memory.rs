use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use chrono::NaiveDate;

use super::{resolve_future_price, ChainQuote, FutureQuote, MarketData};
use crate::error::SurfaceError;
use crate::options::{OptionParameters, Quote};

/// Market data held in memory, populated through builder methods.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMarketData {
    spots: HashMap<(String, NaiveDate), f64>,
    futures: HashMap<(String, NaiveDate), Vec<FutureQuote>>,
    options: HashMap<(String, NaiveDate), BTreeMap<String, ChainQuote>>,
    curves: HashMap<NaiveDate, Vec<(f64, f64)>>,
}

fn key(ticker: &str, time: NaiveDate) -> (String, NaiveDate) {
    (ticker.to_uppercase(), time)
}

impl InMemoryMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_spot(mut self, ticker: &str, time: NaiveDate, price: f64) -> Self {
        self.insert_spot(ticker, time, price);
        self
    }

    pub fn with_future(
        mut self,
        ticker: &str,
        time: NaiveDate,
        expiry: NaiveDate,
        am_settlement: bool,
        price: f64,
    ) -> Self {
        self.futures.entry(key(ticker, time)).or_default().push(FutureQuote {
            expiry,
            am_settlement,
            price,
        });
        self
    }

    pub fn with_option_quote(
        mut self,
        ticker: &str,
        time: NaiveDate,
        parameters: OptionParameters,
        quote: Quote,
    ) -> Self {
        self.insert_option_quote(ticker, time, parameters, quote);
        self
    }

    pub fn with_discount_curve(mut self, time: NaiveDate, curve: Vec<(f64, f64)>) -> Self {
        self.curves.insert(time, curve);
        self
    }

    pub fn insert_spot(&mut self, ticker: &str, time: NaiveDate, price: f64) {
        self.spots.insert(key(ticker, time), price);
    }

    /// Adds or replaces the quote of one contract.
    pub fn insert_option_quote(
        &mut self,
        ticker: &str,
        time: NaiveDate,
        parameters: OptionParameters,
        quote: Quote,
    ) {
        let (ticker, time) = key(ticker, time);
        let symbol = parameters.symbol(&ticker);
        self.options
            .entry((ticker, time))
            .or_default()
            .insert(symbol, ChainQuote { parameters, quote });
    }
}

impl MarketData for InMemoryMarketData {
    fn spot(&self, ticker: &str, time: NaiveDate) -> Result<f64> {
        self.spots
            .get(&key(ticker, time))
            .copied()
            .ok_or_else(|| SurfaceError::not_found("price", format!("{} on {}", ticker, time)).into())
    }

    fn future_price(
        &self,
        ticker: &str,
        time: NaiveDate,
        expiry: Option<NaiveDate>,
        am_settlement: bool,
    ) -> Result<f64> {
        let listed = self
            .futures
            .get(&key(ticker, time))
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        resolve_future_price(listed, ticker, time, expiry, am_settlement)
    }

    fn option_quotes(
        &self,
        ticker: &str,
        time: NaiveDate,
        symbols: &[String],
    ) -> Result<Vec<Option<Quote>>> {
        let quotes = self.options.get(&key(ticker, time));
        Ok(symbols
            .iter()
            .map(|symbol| quotes.and_then(|q| q.get(symbol)).map(|c| c.quote))
            .collect())
    }

    fn discount_curve(&self, time: NaiveDate) -> Result<Vec<(f64, f64)>> {
        self.curves
            .get(&time)
            .cloned()
            .ok_or_else(|| SurfaceError::not_found("discount curve", time).into())
    }

    fn option_chain(
        &self,
        ticker: &str,
        time: NaiveDate,
        expiry: NaiveDate,
        monthly: bool,
    ) -> Result<Vec<ChainQuote>> {
        Ok(self
            .options
            .get(&key(ticker, time))
            .map(|quotes| {
                quotes
                    .values()
                    .filter(|c| c.parameters.expiry == expiry && c.parameters.monthly == monthly)
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn listed_expiries(&self, ticker: &str, time: NaiveDate, monthly: bool) -> Result<Vec<NaiveDate>> {
        let mut expiries: Vec<NaiveDate> = self
            .options
            .get(&key(ticker, time))
            .map(|quotes| {
                quotes
                    .values()
                    .filter(|c| c.parameters.monthly == monthly)
                    .map(|c| c.parameters.expiry)
                    .collect()
            })
            .unwrap_or_default();
        expiries.sort();
        expiries.dedup();
        Ok(expiries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::OptionType;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_future_resolution() {
        let time = date(2022, 3, 3);
        let market = InMemoryMarketData::new()
            .with_future("VIX", time, date(2022, 3, 16), true, 31.0)
            .with_future("VIX", time, date(2022, 4, 20), true, 29.5)
            .with_future("VIX", time, date(2022, 3, 2), true, 33.0);

        assert_eq!(market.future_price("VIX", time, None, true).unwrap(), 31.0);
        assert_eq!(
            market
                .future_price("VIX", time, Some(date(2022, 4, 20)), true)
                .unwrap(),
            29.5
        );
        let err = market.future_price("VIX", time, None, false).unwrap_err();
        assert!(matches!(
            SurfaceError::classify(&err),
            Some(SurfaceError::NotFound { what: "future", .. })
        ));
    }

    #[test]
    fn test_missing_symbols_are_unresolved_not_errors() {
        let time = date(2022, 3, 3);
        let params = OptionParameters::new(OptionType::Call, 4100, date(2022, 3, 18), false);
        let market =
            InMemoryMarketData::new().with_option_quote("spx", time, params, Quote::new(5.0, 6.0));

        let quotes = market
            .option_quotes(
                "SPX",
                time,
                &["SPXW 220318C4100000".to_string(), "SPXW 220318P4100000".to_string()],
            )
            .unwrap();
        assert_eq!(quotes[0], Some(Quote::new(5.0, 6.0)));
        assert_eq!(quotes[1], None);
    }
}
