//! Closed-form Black-type prices and their inversion to implied volatility.

use std::f64::consts::SQRT_2;

use roots::{find_root_brent, SimpleConvergency};

use crate::options::OptionType;

/// Volatility search bracket used by the inversion.
pub const MIN_VOLATILITY: f64 = 1e-6;
pub const MAX_VOLATILITY: f64 = 5.0;

const INVERSION_TOLERANCE: f64 = 1e-12;
const INVERSION_MAX_ITERATIONS: usize = 200;

fn norm_cdf(x: f64) -> f64 {
    0.5 * (1.0 + libm::erf(x / SQRT_2))
}

/// Black-Scholes-Merton price with continuous dividend yield `q`.
#[allow(non_snake_case)]
pub fn black_scholes_merton(
    option_type: OptionType,
    S: f64,
    K: f64,
    T: f64,
    r: f64,
    q: f64,
    sigma: f64,
) -> f64 {
    let discounted_spot = S * (-q * T).exp();
    let discounted_strike = K * (-r * T).exp();
    if T <= 0.0 || sigma <= 0.0 {
        return option_type.payoff(discounted_spot, discounted_strike);
    }
    let d1 = ((S / K).ln() + (r - q + 0.5 * sigma.powi(2)) * T) / (sigma * T.sqrt());
    let d2 = d1 - sigma * T.sqrt();
    match option_type {
        OptionType::Call => discounted_spot * norm_cdf(d1) - discounted_strike * norm_cdf(d2),
        OptionType::Put => discounted_strike * norm_cdf(-d2) - discounted_spot * norm_cdf(-d1),
    }
}

/// Black-Scholes price on a non-dividend-paying spot.
#[allow(non_snake_case)]
pub fn black_scholes(option_type: OptionType, S: f64, K: f64, T: f64, r: f64, sigma: f64) -> f64 {
    black_scholes_merton(option_type, S, K, T, r, 0.0, sigma)
}

/// Black-76 price on a forward `F`, discounted at `r`.
#[allow(non_snake_case)]
pub fn black76(option_type: OptionType, F: f64, K: f64, T: f64, r: f64, sigma: f64) -> f64 {
    (-r * T.max(0.0)).exp() * black_scholes_merton(option_type, F, K, T, 0.0, 0.0, sigma)
}

/// Volatility at which `price_fn` reproduces `target`.
///
/// Returns `None` when the target lies outside the prices attainable on
/// `[MIN_VOLATILITY, MAX_VOLATILITY]` (e.g. below intrinsic value) or the
/// root search fails.
pub fn implied_volatility<F>(target: f64, price_fn: F) -> Option<f64>
where
    F: Fn(f64) -> f64,
{
    if !target.is_finite() {
        return None;
    }
    let lower = price_fn(MIN_VOLATILITY);
    let upper = price_fn(MAX_VOLATILITY);
    if target <= lower || target > upper {
        return None;
    }
    let objective = |sigma: f64| price_fn(sigma) - target;
    let mut convergency = SimpleConvergency {
        eps: INVERSION_TOLERANCE,
        max_iter: INVERSION_MAX_ITERATIONS,
    };
    find_root_brent(MIN_VOLATILITY, MAX_VOLATILITY, &objective, &mut convergency)
    .ok()
    .filter(|sigma| sigma.is_finite() && *sigma > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_reference_black_scholes_values() {
        // Hull, Options Futures and Other Derivatives: S=42, K=40, r=10%, sigma=20%, T=0.5
        let call = black_scholes(OptionType::Call, 42.0, 40.0, 0.5, 0.1, 0.2);
        let put = black_scholes(OptionType::Put, 42.0, 40.0, 0.5, 0.1, 0.2);
        assert_relative_eq!(call, 4.76, epsilon = 5e-3);
        assert_relative_eq!(put, 0.81, epsilon = 5e-3);
    }

    #[test]
    fn test_put_call_parity_with_dividends() {
        let (s, k, t, r, q, sigma) = (100.0, 95.0, 0.75, 0.03, 0.015, 0.25);
        let call = black_scholes_merton(OptionType::Call, s, k, t, r, q, sigma);
        let put = black_scholes_merton(OptionType::Put, s, k, t, r, q, sigma);
        assert_relative_eq!(
            call - put,
            s * (-q * t).exp() - k * (-r * t).exp(),
            epsilon = 1e-10
        );
    }

    #[test]
    fn test_black76_matches_merton_on_forward() {
        let (s, k, t, r, q, sigma): (f64, f64, f64, f64, f64, f64) = (100.0, 110.0, 1.0, 0.02, 0.01, 0.3);
        let forward = s * ((r - q) * t).exp();
        assert_relative_eq!(
            black76(OptionType::Call, forward, k, t, r, sigma),
            black_scholes_merton(OptionType::Call, s, k, t, r, q, sigma),
            epsilon = 1e-10
        );
    }

    #[test]
    fn test_implied_volatility_inverts_price() {
        for sigma in [0.05, 0.2, 0.8, 2.0] {
            let pricer = |v: f64| black_scholes_merton(OptionType::Put, 100.0, 90.0, 0.5, 0.01, 0.02, v);
            let recovered = implied_volatility(pricer(sigma), pricer).unwrap();
            assert_relative_eq!(recovered, sigma, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_implied_volatility_rejects_unattainable_prices() {
        let pricer = |v: f64| black_scholes(OptionType::Call, 100.0, 90.0, 0.5, 0.01, v);
        assert!(implied_volatility(5.0, pricer).is_none()); // below intrinsic
        assert!(implied_volatility(150.0, pricer).is_none()); // above spot
        assert!(implied_volatility(f64::NAN, pricer).is_none());
    }
}
