//! Tabular results of surface queries.

use std::collections::HashMap;

use anyhow::Result;
use chrono::NaiveDate;

use crate::error::SurfaceError;
use crate::options::{PriceType, Quote};

/// Per-symbol values in one or more quote columns. Absent values are `NaN`.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteTable {
    symbols: Vec<String>,
    columns: Vec<(PriceType, Vec<f64>)>,
}

impl QuoteTable {
    pub fn new(symbols: Vec<String>) -> Self {
        Self {
            symbols,
            columns: Vec::new(),
        }
    }

    /// Bid, ask and mid columns from optional quotes.
    pub fn from_quotes(symbols: Vec<String>, quotes: &[Option<Quote>]) -> Result<Self> {
        let column = |price_type: PriceType| -> Vec<f64> {
            quotes
                .iter()
                .map(|q| q.map_or(f64::NAN, |q| q.value(price_type)))
                .collect()
        };
        let (bid, ask, mid) = (
            column(PriceType::Bid),
            column(PriceType::Ask),
            column(PriceType::Mid),
        );
        Self::new(symbols)
            .with_column(PriceType::Bid, bid)?
            .with_column(PriceType::Ask, ask)?
            .with_column(PriceType::Mid, mid)
    }

    /// Adds or replaces a column; its length must match the symbols.
    pub fn with_column(mut self, price_type: PriceType, values: Vec<f64>) -> Result<Self> {
        if values.len() != self.symbols.len() {
            return Err(SurfaceError::invalid(format!(
                "{} column has {} values for {} symbols",
                price_type,
                values.len(),
                self.symbols.len()
            ))
            .into());
        }
        match self.columns.iter_mut().find(|(pt, _)| *pt == price_type) {
            Some((_, existing)) => *existing = values,
            None => self.columns.push((price_type, values)),
        }
        Ok(self)
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn price_types(&self) -> Vec<PriceType> {
        self.columns.iter().map(|(pt, _)| *pt).collect()
    }

    pub fn column(&self, price_type: PriceType) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|(pt, _)| *pt == price_type)
            .map(|(_, values)| values.as_slice())
    }

    pub fn value(&self, symbol: &str, price_type: PriceType) -> Option<f64> {
        let index = self.symbols.iter().position(|s| s == symbol)?;
        self.column(price_type).map(|values| values[index])
    }

    /// Values of `price_type` for `symbols`, in that order.
    pub fn select(&self, symbols: &[String], price_type: PriceType) -> Result<Vec<f64>> {
        let values = self.column(price_type).ok_or_else(|| {
            SurfaceError::invalid(format!("table has no {} column", price_type))
        })?;
        let index: HashMap<&str, usize> = self
            .symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (s.as_str(), i))
            .collect();
        symbols
            .iter()
            .map(|symbol| {
                index.get(symbol.as_str()).map(|&i| values[i]).ok_or_else(|| {
                    anyhow::Error::from(SurfaceError::MissingOptions {
                        missing: vec![symbol.clone()],
                    })
                })
            })
            .collect()
    }

    /// New table with every column transformed by `f`.
    pub fn map_columns<F>(&self, mut f: F) -> Result<Self>
    where
        F: FnMut(PriceType, &[f64]) -> Result<Vec<f64>>,
    {
        let mut table = Self::new(self.symbols.clone());
        for (price_type, values) in &self.columns {
            table = table.with_column(*price_type, f(*price_type, values)?)?;
        }
        Ok(table)
    }
}

/// One value per (strike, expiry) cell, strikes major.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantitySurface {
    price_type: PriceType,
    strikes: Vec<i64>,
    expiries: Vec<NaiveDate>,
    values: Vec<f64>,
}

impl QuantitySurface {
    pub fn new(
        price_type: PriceType,
        strikes: Vec<i64>,
        expiries: Vec<NaiveDate>,
        values: Vec<f64>,
    ) -> Result<Self> {
        if values.len() != strikes.len() * expiries.len() {
            return Err(SurfaceError::invalid(format!(
                "{} values for a {}x{} surface",
                values.len(),
                strikes.len(),
                expiries.len()
            ))
            .into());
        }
        Ok(Self {
            price_type,
            strikes,
            expiries,
            values,
        })
    }

    pub fn price_type(&self) -> PriceType {
        self.price_type
    }

    pub fn strikes(&self) -> &[i64] {
        &self.strikes
    }

    pub fn expiries(&self) -> &[NaiveDate] {
        &self.expiries
    }

    /// Cell values, strike-major.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, strike_index: usize, expiry_index: usize) -> Option<f64> {
        if strike_index >= self.strikes.len() || expiry_index >= self.expiries.len() {
            return None;
        }
        Some(self.values[strike_index * self.expiries.len() + expiry_index])
    }

    pub fn at(&self, strike: i64, expiry: NaiveDate) -> Option<f64> {
        let i = self.strikes.binary_search(&strike).ok()?;
        let j = self.expiries.binary_search(&expiry).ok()?;
        self.get(i, j)
    }

    /// Values across strikes for one expiry.
    pub fn expiry_slice(&self, expiry_index: usize) -> Vec<f64> {
        (0..self.strikes.len())
            .filter_map(|i| self.get(i, expiry_index))
            .collect()
    }

    /// Values across expiries for one strike.
    pub fn strike_slice(&self, strike_index: usize) -> Vec<f64> {
        (0..self.expiries.len())
            .filter_map(|j| self.get(strike_index, j))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbols() -> Vec<String> {
        vec!["A".to_string(), "B".to_string()]
    }

    #[test]
    fn test_quote_table_from_quotes_marks_missing_as_nan() {
        let table = QuoteTable::from_quotes(symbols(), &[Some(Quote::new(1.0, 2.0)), None]).unwrap();
        assert_eq!(table.value("A", PriceType::Mid), Some(1.5));
        assert!(table.value("B", PriceType::Bid).unwrap().is_nan());
        assert_eq!(table.price_types(), PriceType::ALL.to_vec());
    }

    #[test]
    fn test_select_reports_unknown_symbols() {
        let table = QuoteTable::new(symbols())
            .with_column(PriceType::Mid, vec![1.0, 2.0])
            .unwrap();
        assert_eq!(
            table.select(&["B".to_string(), "A".to_string()], PriceType::Mid).unwrap(),
            vec![2.0, 1.0]
        );
        assert!(table.select(&["C".to_string()], PriceType::Mid).is_err());
        assert!(table.select(&["A".to_string()], PriceType::Bid).is_err());
        assert!(QuoteTable::new(symbols())
            .with_column(PriceType::Mid, vec![1.0])
            .is_err());
    }

    #[test]
    fn test_quantity_surface_layout() {
        let e1 = NaiveDate::from_ymd_opt(2022, 3, 18).unwrap();
        let e2 = NaiveDate::from_ymd_opt(2022, 4, 29).unwrap();
        let surface = QuantitySurface::new(
            PriceType::Mid,
            vec![4000, 4100, 4200],
            vec![e1, e2],
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
        )
        .unwrap();
        assert_eq!(surface.at(4100, e2), Some(4.0));
        assert_eq!(surface.expiry_slice(0), vec![1.0, 3.0, 5.0]);
        assert_eq!(surface.strike_slice(2), vec![5.0, 6.0]);
        assert_eq!(surface.get(3, 0), None);
    }
}
