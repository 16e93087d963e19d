//! Dividend yields and forwards implied by at-the-money put-call parity.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::NaiveDate;
use tracing::debug;

use super::{ChainQuote, Extrapolation, NaturalCubicSpline, Underlying};
use crate::error::SurfaceError;
use crate::options::{time_to_expiry, OptionParameters, OptionType};

/// Call and put mid prices at the strike closest to spot for one expiry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AtmQuote {
    pub expiry: NaiveDate,
    pub strike: i64,
    pub call: f64,
    pub put: f64,
}

/// Index of the strike closest to `spot`; an exact match wins and ties go up.
fn closest_strike_index(strikes: &[i64], spot: f64) -> Option<usize> {
    if strikes.is_empty() {
        return None;
    }
    let upper = strikes.partition_point(|&k| (k as f64) < spot);
    if upper < strikes.len() && strikes[upper] as f64 == spot {
        return Some(upper);
    }
    if upper == 0 {
        return Some(0);
    }
    if upper == strikes.len() {
        return Some(strikes.len() - 1);
    }
    let lower = upper - 1;
    if (strikes[upper] + strikes[lower]) as f64 <= 2.0 * spot {
        Some(upper)
    } else {
        Some(lower)
    }
}

/// ATM call/put pair of a chain, restricted to strikes quoted on both sides.
fn atm_pair(chain: &[ChainQuote], spot: f64) -> Option<(i64, f64, f64)> {
    let mut by_strike: BTreeMap<i64, (Option<f64>, Option<f64>)> = BTreeMap::new();
    for contract in chain {
        let entry = by_strike.entry(contract.parameters.strike).or_default();
        match contract.parameters.option_type {
            OptionType::Call => entry.0 = Some(contract.quote.mid()),
            OptionType::Put => entry.1 = Some(contract.quote.mid()),
        }
    }
    let paired: Vec<(i64, f64, f64)> = by_strike
        .into_iter()
        .filter_map(|(strike, (call, put))| Some((strike, call?, put?)))
        .collect();
    let strikes: Vec<i64> = paired.iter().map(|p| p.0).collect();
    closest_strike_index(&strikes, spot).map(|i| paired[i])
}

/// ATM quotes for each requested expiry.
///
/// Fails with [`SurfaceError::MissingOptions`] naming every expiry without a
/// quoted call/put pair.
pub fn atm_quotes(
    underlying: &Underlying,
    time: NaiveDate,
    expiries: &[NaiveDate],
    monthly: bool,
) -> Result<Vec<AtmQuote>> {
    let spot = underlying.price(time)?;
    let market = underlying.market();

    let mut unique: BTreeMap<NaiveDate, Option<AtmQuote>> = BTreeMap::new();
    for &expiry in expiries {
        if unique.contains_key(&expiry) {
            continue;
        }
        let chain = market.option_chain(underlying.ticker(), time, expiry, monthly)?;
        let quote = atm_pair(&chain, spot).map(|(strike, call, put)| AtmQuote {
            expiry,
            strike,
            call,
            put,
        });
        unique.insert(expiry, quote);
    }

    let missing: Vec<String> = unique
        .iter()
        .filter(|(_, quote)| quote.is_none())
        .map(|(expiry, _)| expiry.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(SurfaceError::MissingOptions { missing }.into());
    }

    Ok(expiries
        .iter()
        .filter_map(|expiry| unique.get(expiry).copied().flatten())
        .collect())
}

fn yield_from_parity(quote: &AtmQuote, spot: f64, rate: f64, tte: f64) -> Result<f64> {
    let discounted_strike = quote.strike as f64 * (-rate * tte).exp();
    let ratio = ((quote.call - quote.put) + discounted_strike) / spot;
    if ratio <= 0.0 || !ratio.is_finite() {
        return Err(SurfaceError::numerical(format!(
            "put-call parity on {} strike {} gives non-positive forward ratio {}",
            quote.expiry, quote.strike, ratio
        ))
        .into());
    }
    Ok(-ratio.ln() / tte)
}

/// Expiries strictly after `time` with their year fractions, plus the
/// positions they occupy in `expiries`.
struct LiveExpiries {
    positions: Vec<usize>,
    expiries: Vec<NaiveDate>,
    ttes: Vec<f64>,
}

fn live_expiries(time: NaiveDate, expiries: &[NaiveDate]) -> LiveExpiries {
    let mut live = LiveExpiries {
        positions: Vec::new(),
        expiries: Vec::new(),
        ttes: Vec::new(),
    };
    for (i, &expiry) in expiries.iter().enumerate() {
        let tte = time_to_expiry(time, expiry);
        if tte > 0.0 {
            live.positions.push(i);
            live.expiries.push(expiry);
            live.ttes.push(tte);
        } else {
            debug!(%expiry, %time, "expiry not after valuation date");
        }
    }
    live
}

/// Continuous dividend yield per expiry: `q = -ln(((C - P) + K e^{-rT}) / S) / T`.
///
/// Expiries on or before `time` carry no dividend exposure and get `0.0`; they
/// need no ATM quotes.
pub fn dividend_yields(
    underlying: &Underlying,
    time: NaiveDate,
    expiries: &[NaiveDate],
    monthly: bool,
) -> Result<Vec<f64>> {
    let mut yields = vec![0.0; expiries.len()];
    let live = live_expiries(time, expiries);
    if live.positions.is_empty() {
        return Ok(yields);
    }
    let quotes = atm_quotes(underlying, time, &live.expiries, monthly)?;
    let rates = underlying.market().risk_free_rates(time, &live.ttes)?;
    let spot = underlying.price(time)?;

    for (i, (quote, (&rate, &tte))) in live
        .positions
        .iter()
        .zip(quotes.iter().zip(rates.iter().zip(&live.ttes)))
    {
        yields[*i] = yield_from_parity(quote, spot, rate, tte)?;
    }
    Ok(yields)
}

/// Dividend yields at arbitrary year fractions, splined through the ATM-implied
/// yields of every listed expiry after `time` (flat beyond the end points).
pub fn interpolated_dividend_yields(
    underlying: &Underlying,
    time: NaiveDate,
    ttes: &[f64],
    monthly: bool,
) -> Result<Vec<f64>> {
    let market = underlying.market();
    let spot = underlying.price(time)?;

    let mut knots = Vec::new();
    for expiry in market.listed_expiries(underlying.ticker(), time, monthly)? {
        let tte = time_to_expiry(time, expiry);
        if tte <= 0.0 {
            continue;
        }
        let chain = market.option_chain(underlying.ticker(), time, expiry, monthly)?;
        if let Some((strike, call, put)) = atm_pair(&chain, spot) {
            let quote = AtmQuote {
                expiry,
                strike,
                call,
                put,
            };
            let rate = market.risk_free_rates(time, &[tte])?[0];
            match yield_from_parity(&quote, spot, rate, tte) {
                Ok(q) => knots.push((tte, q)),
                Err(err) => debug!(%expiry, error = %err, "skipping expiry in dividend term structure"),
            }
        }
    }

    if knots.is_empty() {
        return Err(SurfaceError::not_found(
            "dividend yield term structure",
            format!("{} on {}", underlying.ticker(), time),
        )
        .into());
    }

    let (x, y): (Vec<f64>, Vec<f64>) = knots.into_iter().unzip();
    let spline = NaturalCubicSpline::new(x, y, Extrapolation::Flat)?;
    Ok(spline.evaluate_many(ttes))
}

/// Dividend yield for each option, grouped by monthly/weekly chain.
pub fn option_dividend_yields(
    underlying: &Underlying,
    time: NaiveDate,
    parameters: &[OptionParameters],
) -> Result<Vec<f64>> {
    let mut yields = vec![0.0; parameters.len()];
    for monthly in [true, false] {
        let indices: Vec<usize> = (0..parameters.len())
            .filter(|&i| parameters[i].monthly == monthly)
            .collect();
        if indices.is_empty() {
            continue;
        }
        let expiries: Vec<NaiveDate> = indices.iter().map(|&i| parameters[i].expiry).collect();
        let group = dividend_yields(underlying, time, &expiries, monthly)?;
        for (i, q) in indices.into_iter().zip(group) {
            yields[i] = q;
        }
    }
    Ok(yields)
}

/// Forward prices implied by ATM parity: `F = (C - P) e^{rT} + K`.
///
/// The forward of an expiry on or before `time` is the spot.
pub fn option_implied_forwards(
    underlying: &Underlying,
    time: NaiveDate,
    expiries: &[NaiveDate],
    monthly: bool,
) -> Result<Vec<f64>> {
    let spot = underlying.price(time)?;
    let mut forwards = vec![spot; expiries.len()];
    let live = live_expiries(time, expiries);
    if live.positions.is_empty() {
        return Ok(forwards);
    }
    let quotes = atm_quotes(underlying, time, &live.expiries, monthly)?;
    let rates = underlying.market().risk_free_rates(time, &live.ttes)?;

    for (i, (quote, (&rate, &tte))) in live
        .positions
        .iter()
        .zip(quotes.iter().zip(rates.iter().zip(&live.ttes)))
    {
        forwards[*i] = (quote.call - quote.put) * (rate * tte).exp() + quote.strike as f64;
    }
    Ok(forwards)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::InMemoryMarketData;
    use crate::options::Quote;
    use approx::assert_relative_eq;
    use std::sync::Arc;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn underlying_with_parity(q: f64) -> (Underlying, NaiveDate, NaiveDate) {
        let time = date(2022, 3, 3);
        let expiry = date(2022, 6, 1);
        let (spot, strike, r) = (4350.0, 4350, 0.01);
        let tte = time_to_expiry(time, expiry);
        let call = 120.0;
        let put = call - (spot * (-q * tte).exp() - strike as f64 * (-r * tte).exp());

        let mut market = InMemoryMarketData::new()
            .with_spot("SPX", time, spot)
            .with_discount_curve(time, vec![(1.0, r), (365.0, r)]);
        for (option_type, mid) in [(OptionType::Call, call), (OptionType::Put, put)] {
            market.insert_option_quote(
                "SPX",
                time,
                OptionParameters::new(option_type, strike, expiry, false),
                Quote::new(mid - 0.5, mid + 0.5),
            );
        }
        // Off-centre strike without a put must not be chosen.
        market.insert_option_quote(
            "SPX",
            time,
            OptionParameters::new(OptionType::Call, 4355, expiry, false),
            Quote::new(100.0, 101.0),
        );
        (Underlying::new("SPX", Arc::new(market)), time, expiry)
    }

    #[test]
    fn test_closest_strike_rules() {
        let strikes = [4300, 4350, 4400];
        assert_eq!(closest_strike_index(&strikes, 4350.0), Some(1));
        assert_eq!(closest_strike_index(&strikes, 4374.0), Some(1));
        assert_eq!(closest_strike_index(&strikes, 4375.0), Some(2));
        assert_eq!(closest_strike_index(&strikes, 4000.0), Some(0));
        assert_eq!(closest_strike_index(&strikes, 5000.0), Some(2));
        assert_eq!(closest_strike_index(&[], 5000.0), None);
    }

    #[test]
    fn test_dividend_yield_recovers_parity_input() {
        let (underlying, time, expiry) = underlying_with_parity(0.015);
        let yields = dividend_yields(&underlying, time, &[expiry, expiry], false).unwrap();
        assert_eq!(yields.len(), 2);
        assert_relative_eq!(yields[0], 0.015, epsilon = 1e-10);
        assert_eq!(yields[0], yields[1]);

        let interpolated = interpolated_dividend_yields(&underlying, time, &[0.1, 2.0], false).unwrap();
        assert_relative_eq!(interpolated[0], 0.015, epsilon = 1e-10);
        assert_relative_eq!(interpolated[1], 0.015, epsilon = 1e-10);
    }

    #[test]
    fn test_implied_forward() {
        let (underlying, time, expiry) = underlying_with_parity(0.015);
        let forward = option_implied_forwards(&underlying, time, &[expiry], false).unwrap()[0];
        let tte = time_to_expiry(time, expiry);
        assert_relative_eq!(forward, 4350.0 * ((0.01 - 0.015) * tte).exp(), epsilon = 1e-8);
    }

    #[test]
    fn test_expired_entries_get_zero_yield_and_spot_forward() {
        let (underlying, time, expiry) = underlying_with_parity(0.015);
        // Neither date has quotes; only live expiries need them.
        let expiries = [time, expiry, date(2022, 3, 1)];
        let yields = dividend_yields(&underlying, time, &expiries, false).unwrap();
        assert_eq!(yields[0], 0.0);
        assert_relative_eq!(yields[1], 0.015, epsilon = 1e-10);
        assert_eq!(yields[2], 0.0);

        let forwards = option_implied_forwards(&underlying, time, &[time], false).unwrap();
        assert_eq!(forwards, vec![4350.0]);
    }

    #[test]
    fn test_missing_expiries_are_listed() {
        let (underlying, time, expiry) = underlying_with_parity(0.0);
        let absent = date(2022, 9, 16);
        let err = dividend_yields(&underlying, time, &[expiry, absent], false).unwrap_err();
        match SurfaceError::classify(&err) {
            Some(SurfaceError::MissingOptions { missing }) => {
                assert_eq!(missing, &vec!["2022-09-16".to_string()]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
