//! Option contract identifiers, quotes and expiry arithmetic.

pub mod expiry;
pub mod symbol;

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::SurfaceError;

pub use expiry::{annualise, deannualise, time_to_expiry, DAYS_PER_YEAR};
pub use symbol::{decode_symbols, option_symbol, parse_option_symbol};

/// Call or put.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    /// Single-letter code used in option symbols.
    pub fn code(self) -> char {
        match self {
            OptionType::Call => 'C',
            OptionType::Put => 'P',
        }
    }

    pub fn from_code(code: char) -> Result<Self, SurfaceError> {
        match code {
            'C' => Ok(OptionType::Call),
            'P' => Ok(OptionType::Put),
            other => Err(SurfaceError::invalid(format!(
                "unknown option type code '{}'",
                other
            ))),
        }
    }

    pub fn is_put(self) -> bool {
        matches!(self, OptionType::Put)
    }

    /// Intrinsic payoff at `underlying`.
    pub fn payoff(self, underlying: f64, strike: f64) -> f64 {
        match self {
            OptionType::Call => (underlying - strike).max(0.0),
            OptionType::Put => (strike - underlying).max(0.0),
        }
    }
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionType::Call => write!(f, "call"),
            OptionType::Put => write!(f, "put"),
        }
    }
}

/// Quote column of a price table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PriceType {
    Bid,
    Ask,
    Mid,
}

impl PriceType {
    pub const ALL: [PriceType; 3] = [PriceType::Bid, PriceType::Ask, PriceType::Mid];
}

impl fmt::Display for PriceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriceType::Bid => write!(f, "Bid"),
            PriceType::Ask => write!(f, "Ask"),
            PriceType::Mid => write!(f, "Mid"),
        }
    }
}

impl FromStr for PriceType {
    type Err = SurfaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bid" => Ok(PriceType::Bid),
            "ask" | "offer" => Ok(PriceType::Ask),
            "mid" => Ok(PriceType::Mid),
            other => Err(SurfaceError::invalid(format!("unknown price type '{}'", other))),
        }
    }
}

/// Best bid and offer of one option.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub bid: f64,
    pub ask: f64,
}

impl Quote {
    pub fn new(bid: f64, ask: f64) -> Self {
        Self { bid, ask }
    }

    pub fn mid(&self) -> f64 {
        0.5 * (self.bid + self.ask)
    }

    pub fn value(&self, price_type: PriceType) -> f64 {
        match price_type {
            PriceType::Bid => self.bid,
            PriceType::Ask => self.ask,
            PriceType::Mid => self.mid(),
        }
    }
}

/// Contract terms of a listed European option.
///
/// `monthly` distinguishes AM-settled monthly contracts from weeklies, which
/// carry a `W` suffix on the symbol root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OptionParameters {
    pub option_type: OptionType,
    pub strike: i64,
    pub expiry: NaiveDate,
    pub monthly: bool,
}

impl OptionParameters {
    pub fn new(option_type: OptionType, strike: i64, expiry: NaiveDate, monthly: bool) -> Self {
        Self {
            option_type,
            strike,
            expiry,
            monthly,
        }
    }

    pub fn symbol(&self, ticker: &str) -> String {
        option_symbol(ticker, self)
    }

    pub fn from_symbol(ticker: &str, symbol: &str) -> Result<Self, SurfaceError> {
        parse_option_symbol(ticker, symbol)
    }

    pub fn time_to_expiry(&self, time: NaiveDate) -> f64 {
        time_to_expiry(time, self.expiry)
    }
}
