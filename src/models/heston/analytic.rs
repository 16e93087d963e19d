//! Semi-analytic Heston prices from the characteristic function.
//!
//! Uses the Cui et al. (2017) arrangement of Gatheral's characteristic
//! function. No branch-cut correction is applied.

use anyhow::Result;
use num_complex::Complex64;

use super::HestonParameters;
use crate::models::{OptionInputs, Quadrature};

const I: Complex64 = Complex64 { re: 0.0, im: 1.0 };

/// Characteristic function of `ln(S_T / S_0)` at complex argument `u`.
pub fn characteristic_function(
    u: Complex64,
    tte: f64,
    rate: f64,
    dividend_yield: f64,
    parameters: &HestonParameters,
) -> Complex64 {
    let HestonParameters {
        initial_variance: v0,
        long_term_variance: theta,
        volatility_of_volatility: eta,
        mean_reversion_rate: kappa,
        wiener_correlation: rho,
    } = *parameters;

    let log_forward_ratio = (rate - dividend_yield) * tte;
    let iu = I * u;
    let xi = kappa - eta * rho * iu;
    let d = (xi * xi + (u * u + iu) * eta * eta).sqrt();
    // A1 / A2 with sinh/cosh folded into tanh, finite for large |u|.
    let tanh = tanh_right_half_plane(d * tte / 2.0);
    let a = v0 * (u * u + iu) * tanh / (d + xi * tanh);
    let big_d = (d / v0).ln() + (kappa - d) * tte / 2.0
        - (((d + xi) + (d - xi) * (-d * tte).exp()) / (2.0 * v0)).ln();

    (iu * log_forward_ratio - kappa * theta * rho * tte * iu / eta - a
        + 2.0 * kappa * theta * big_d / (eta * eta))
        .exp()
}

/// `tanh(z)` for `Re(z) >= 0` without overflowing `sinh`/`cosh`.
fn tanh_right_half_plane(z: Complex64) -> Complex64 {
    let decay = (-2.0 * z).exp();
    (1.0 - decay) / (1.0 + decay)
}

fn probability<F>(log_moneyness: f64, quadrature: &Quadrature, phi: F) -> Result<f64>
where
    F: Fn(Complex64) -> Complex64,
{
    let integral = quadrature.integrate_half_line(|u| {
        let uc = Complex64::new(u, 0.0);
        ((-I * uc * log_moneyness).exp() / (I * uc) * phi(uc)).re
    })?;
    Ok(integral / std::f64::consts::PI + 0.5)
}

/// Probability of exercise under the share measure.
pub fn p1_value(
    spot: f64,
    option: &OptionInputs,
    parameters: &HestonParameters,
    quadrature: &Quadrature,
) -> Result<f64> {
    let cf = |u: Complex64| {
        characteristic_function(u, option.tte, option.rate, option.dividend_yield, parameters)
    };
    let normaliser = cf(-I);
    probability((option.strike / spot).ln(), quadrature, |u| cf(u - I) / normaliser)
}

/// Probability of exercise under the risk-neutral measure.
pub fn p2_value(
    spot: f64,
    option: &OptionInputs,
    parameters: &HestonParameters,
    quadrature: &Quadrature,
) -> Result<f64> {
    probability((option.strike / spot).ln(), quadrature, |u| {
        characteristic_function(u, option.tte, option.rate, option.dividend_yield, parameters)
    })
}

/// `S e^{-qT} (P1 - 1[put]) - K e^{-rT} (P2 - 1[put])`.
pub fn analytic_price(
    spot: f64,
    option: &OptionInputs,
    parameters: &HestonParameters,
    quadrature: &Quadrature,
) -> Result<f64> {
    if option.tte <= 0.0 {
        return Ok(option.option_type.payoff(spot, option.strike));
    }
    let p1 = p1_value(spot, option, parameters, quadrature)?;
    let p2 = p2_value(spot, option, parameters, quadrature)?;
    let put = if option.option_type.is_put() { 1.0 } else { 0.0 };
    Ok(spot * (-option.dividend_yield * option.tte).exp() * (p1 - put)
        - option.strike * (-option.rate * option.tte).exp() * (p2 - put))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::OptionType;
    use crate::pricing::black_scholes_merton;
    use approx::assert_relative_eq;

    fn parameters() -> HestonParameters {
        HestonParameters {
            initial_variance: 0.04,
            long_term_variance: 0.04,
            volatility_of_volatility: 0.5,
            mean_reversion_rate: 1.5,
            wiener_correlation: -0.7,
        }
    }

    fn option(option_type: OptionType, strike: f64) -> OptionInputs {
        OptionInputs {
            option_type,
            strike,
            tte: 0.5,
            rate: 0.02,
            dividend_yield: 0.01,
        }
    }

    #[test]
    fn test_characteristic_function_is_normalised() {
        let p = parameters();
        let at_zero = characteristic_function(Complex64::new(0.0, 0.0), 0.5, 0.02, 0.01, &p);
        assert_relative_eq!(at_zero.re, 1.0, epsilon = 1e-12);
        assert_relative_eq!(at_zero.im, 0.0, epsilon = 1e-12);

        // E[S_T / S_0] is the forward ratio.
        let forward = characteristic_function(-I, 0.5, 0.02, 0.01, &p);
        assert_relative_eq!(forward.re, (0.01f64 * 0.5).exp(), epsilon = 1e-10);
    }

    #[test]
    fn test_put_call_parity() {
        let p = parameters();
        let quadrature = Quadrature::default();
        let spot = 100.0;
        for strike in [80.0, 100.0, 120.0] {
            let call = analytic_price(spot, &option(OptionType::Call, strike), &p, &quadrature).unwrap();
            let put = analytic_price(spot, &option(OptionType::Put, strike), &p, &quadrature).unwrap();
            let parity = spot * (-0.01f64 * 0.5).exp() - strike * (-0.02f64 * 0.5).exp();
            assert_relative_eq!(call - put, parity, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_small_vol_of_vol_matches_black_scholes_merton() {
        let p = HestonParameters {
            volatility_of_volatility: 0.01,
            ..parameters()
        };
        let quadrature = Quadrature::default();
        for strike in [90.0, 100.0, 110.0] {
            let heston = analytic_price(100.0, &option(OptionType::Call, strike), &p, &quadrature).unwrap();
            let bsm = black_scholes_merton(OptionType::Call, 100.0, strike, 0.5, 0.02, 0.01, 0.2);
            assert_relative_eq!(heston, bsm, epsilon = 2e-2);
        }
    }

    #[test]
    fn test_adaptive_quadrature_agrees_with_fixed_rule() {
        let p = parameters();
        let call = option(OptionType::Call, 105.0);
        let fixed = analytic_price(100.0, &call, &p, &Quadrature::default()).unwrap();
        let adaptive = analytic_price(
            100.0,
            &call,
            &p,
            &Quadrature::Adaptive {
                tolerance: 1e-9,
                max_depth: 14,
            },
        )
        .unwrap();
        assert_relative_eq!(fixed, adaptive, epsilon = 1e-4);
    }

    #[test]
    fn test_expired_option_is_intrinsic() {
        let expired = OptionInputs {
            tte: 0.0,
            ..option(OptionType::Put, 110.0)
        };
        let price = analytic_price(100.0, &expired, &parameters(), &Quadrature::default()).unwrap();
        assert_relative_eq!(price, 10.0);
    }
}
