//! CSV-backed market data.
//!
//! Directory layout (tickers lower-cased in file names):
//!
//! ```text
//! securities/{ticker}.csv   date,close
//! futures/{ticker}.csv      date,expiry,am_settlement,price
//! options/{ticker}.csv      symbol,date,best_bid,best_offer
//! rates.csv                 date,days,rate
//! ```
//!
//! Each file is parsed on first use and kept for the lifetime of the store.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::{resolve_future_price, ChainQuote, FutureQuote, MarketData};
use crate::cache::BatchCache;
use crate::error::SurfaceError;
use crate::options::{parse_option_symbol, Quote};

#[derive(Debug, Deserialize)]
struct SpotRow {
    date: NaiveDate,
    close: f64,
}

#[derive(Debug, Deserialize)]
struct FutureRow {
    date: NaiveDate,
    expiry: NaiveDate,
    am_settlement: u8,
    price: f64,
}

#[derive(Debug, Deserialize)]
struct OptionRow {
    symbol: String,
    date: NaiveDate,
    best_bid: f64,
    best_offer: f64,
}

#[derive(Debug, Deserialize)]
struct RateRow {
    date: NaiveDate,
    days: f64,
    rate: f64,
}

type SpotTable = HashMap<NaiveDate, f64>;
type FutureTable = HashMap<NaiveDate, Vec<FutureQuote>>;
type OptionTable = HashMap<NaiveDate, BTreeMap<String, ChainQuote>>;
type RateTable = HashMap<NaiveDate, Vec<(f64, f64)>>;

/// Market data read from a directory of CSV files.
#[derive(Debug)]
pub struct FlatFileMarketData {
    root: PathBuf,
    spots: BatchCache<String, Arc<SpotTable>>,
    futures: BatchCache<String, Arc<FutureTable>>,
    options: BatchCache<String, Arc<OptionTable>>,
    rates: BatchCache<(), Arc<RateTable>>,
}

fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Err(SurfaceError::not_found("data file", path.display()).into());
    }
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let rows = reader
        .deserialize()
        .collect::<std::result::Result<Vec<T>, csv::Error>>()
        .with_context(|| format!("parsing {}", path.display()))?;
    debug!(path = %path.display(), rows = rows.len(), "loaded market data file");
    Ok(rows)
}

impl FlatFileMarketData {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            spots: BatchCache::new(),
            futures: BatchCache::new(),
            options: BatchCache::new(),
            rates: BatchCache::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ticker_file(&self, directory: &str, ticker: &str) -> PathBuf {
        self.root
            .join(directory)
            .join(format!("{}.csv", ticker.to_lowercase()))
    }

    fn spot_table(&self, ticker: &str) -> Result<Arc<SpotTable>> {
        let ticker = ticker.to_uppercase();
        self.spots.get_or_try_insert_with(ticker.clone(), || {
            let rows: Vec<SpotRow> = read_rows(&self.ticker_file("securities", &ticker))?;
            Ok(Arc::new(rows.into_iter().map(|r| (r.date, r.close)).collect()))
        })
    }

    fn future_table(&self, ticker: &str) -> Result<Arc<FutureTable>> {
        let ticker = ticker.to_uppercase();
        self.futures.get_or_try_insert_with(ticker.clone(), || {
            let rows: Vec<FutureRow> = read_rows(&self.ticker_file("futures", &ticker))?;
            let mut table = FutureTable::new();
            for row in rows {
                table.entry(row.date).or_default().push(FutureQuote {
                    expiry: row.expiry,
                    am_settlement: row.am_settlement != 0,
                    price: row.price,
                });
            }
            Ok(Arc::new(table))
        })
    }

    fn option_table(&self, ticker: &str) -> Result<Arc<OptionTable>> {
        let ticker = ticker.to_uppercase();
        self.options.get_or_try_insert_with(ticker.clone(), || {
            let path = self.ticker_file("options", &ticker);
            let rows: Vec<OptionRow> = read_rows(&path)?;
            let mut table = OptionTable::new();
            for row in rows {
                let parameters = parse_option_symbol(&ticker, &row.symbol)
                    .with_context(|| format!("in {}", path.display()))?;
                table.entry(row.date).or_default().insert(
                    row.symbol,
                    ChainQuote {
                        parameters,
                        quote: Quote::new(row.best_bid, row.best_offer),
                    },
                );
            }
            Ok(Arc::new(table))
        })
    }

    fn rate_table(&self) -> Result<Arc<RateTable>> {
        self.rates.get_or_try_insert_with((), || {
            let rows: Vec<RateRow> = read_rows(&self.root.join("rates.csv"))?;
            let mut table = RateTable::new();
            for row in rows {
                table.entry(row.date).or_default().push((row.days, row.rate));
            }
            Ok(Arc::new(table))
        })
    }
}

impl MarketData for FlatFileMarketData {
    fn spot(&self, ticker: &str, time: NaiveDate) -> Result<f64> {
        self.spot_table(ticker)?
            .get(&time)
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
        let table = self.future_table(ticker)?;
        let listed = table.get(&time).map(Vec::as_slice).unwrap_or(&[]);
        resolve_future_price(listed, ticker, time, expiry, am_settlement)
    }

    fn option_quotes(
        &self,
        ticker: &str,
        time: NaiveDate,
        symbols: &[String],
    ) -> Result<Vec<Option<Quote>>> {
        let table = self.option_table(ticker)?;
        let day = table.get(&time);
        Ok(symbols
            .iter()
            .map(|symbol| day.and_then(|d| d.get(symbol)).map(|c| c.quote))
            .collect())
    }

    fn discount_curve(&self, time: NaiveDate) -> Result<Vec<(f64, f64)>> {
        self.rate_table()?
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
        let table = self.option_table(ticker)?;
        Ok(table
            .get(&time)
            .map(|day| {
                day.values()
                    .filter(|c| c.parameters.expiry == expiry && c.parameters.monthly == monthly)
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn listed_expiries(&self, ticker: &str, time: NaiveDate, monthly: bool) -> Result<Vec<NaiveDate>> {
        let table = self.option_table(ticker)?;
        let mut expiries: Vec<NaiveDate> = table
            .get(&time)
            .map(|day| {
                day.values()
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
