//! Option symbol codec.
//!
//! Symbols have the form `"{TICKER}{W?} {YYMMDD}{C|P}{strike * 1000}"`, e.g.
//! `"SPXW 220318C4100000"` for a weekly SPX 4100 call expiring 2022-03-18.
//! Monthly contracts omit the `W`.

use chrono::NaiveDate;

use super::{OptionParameters, OptionType};
use crate::error::SurfaceError;

const STRIKE_SCALE: i64 = 1000;

pub fn option_symbol(ticker: &str, parameters: &OptionParameters) -> String {
    format!(
        "{}{} {}{}{}",
        ticker,
        if parameters.monthly { "" } else { "W" },
        parameters.expiry.format("%y%m%d"),
        parameters.option_type.code(),
        parameters.strike * STRIKE_SCALE,
    )
}

pub fn parse_option_symbol(ticker: &str, symbol: &str) -> Result<OptionParameters, SurfaceError> {
    let invalid = |reason: &str| SurfaceError::invalid(format!("invalid option symbol '{}': {}", symbol, reason));

    let (root, suffix) = symbol
        .split_once(' ')
        .ok_or_else(|| invalid("missing separator"))?;
    let root_tail = root
        .strip_prefix(ticker)
        .ok_or_else(|| invalid("root does not start with ticker"))?;
    let monthly = !root_tail.ends_with('W');

    let date = suffix.get(0..6).ok_or_else(|| invalid("truncated expiry"))?;
    let expiry = NaiveDate::parse_from_str(&format!("20{}", date), "%Y%m%d")
        .map_err(|_| invalid("malformed expiry"))?;

    let code = suffix
        .get(6..7)
        .and_then(|s| s.chars().next())
        .ok_or_else(|| invalid("missing option type"))?;
    let option_type = OptionType::from_code(code).map_err(|_| invalid("unknown option type"))?;

    let scaled_strike: i64 = suffix
        .get(7..)
        .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
        .ok_or_else(|| invalid("missing strike"))?
        .parse()
        .map_err(|_| invalid("strike out of range"))?;
    if scaled_strike % STRIKE_SCALE != 0 {
        return Err(invalid("strike is not a whole number"));
    }

    Ok(OptionParameters {
        option_type,
        strike: scaled_strike / STRIKE_SCALE,
        expiry,
        monthly,
    })
}

/// Decodes a batch of symbols, failing on the first malformed one.
pub fn decode_symbols(ticker: &str, symbols: &[String]) -> Result<Vec<OptionParameters>, SurfaceError> {
    symbols
        .iter()
        .map(|symbol| parse_option_symbol(ticker, symbol))
        .collect()
}
