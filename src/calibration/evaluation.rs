//! Surface losses between market quotes and a model.

use anyhow::Result;
use chrono::NaiveDate;
use statrs::statistics::Statistics;
use tracing::trace;

use crate::calibration::config::{CostFunctionSettings, QuantityKind};
use crate::models::StochasticVolatilityModel;
use crate::options::PriceType;
use crate::surface::{QuantityMethod, QuantitySurface, SurfaceQuery, VolatilitySurface};

fn mid_surface(
    surface: &VolatilitySurface,
    time: NaiveDate,
    query: SurfaceQuery<'_>,
) -> Result<QuantitySurface> {
    let mut surfaces = surface.surface_quantities(time, &query, &[PriceType::Mid])?;
    // One surface per requested price type.
    Ok(surfaces.remove(0))
}

/// Empirical and model surfaces in the quantity selected by `settings`.
pub fn compared_surfaces(
    surface: &VolatilitySurface,
    time: NaiveDate,
    model: &dyn StochasticVolatilityModel,
    settings: &CostFunctionSettings,
    quantity: QuantityKind,
) -> Result<(QuantitySurface, QuantitySurface)> {
    let (empirical, modelled) = match quantity {
        QuantityKind::Price => (
            SurfaceQuery::new(QuantityMethod::EmpiricalPrice),
            SurfaceQuery::new(QuantityMethod::ModelPrice),
        ),
        QuantityKind::ImpliedVolatility => (
            SurfaceQuery::new(QuantityMethod::EmpiricalImpliedVolatility)
                .with_pricing_model(settings.empirical_pricing_model),
            SurfaceQuery::new(QuantityMethod::ModelImpliedVolatility)
                .with_pricing_model(settings.model_pricing_model),
        ),
    };
    fn apply_policy<'a>(query: SurfaceQuery<'a>, settings: &CostFunctionSettings) -> SurfaceQuery<'a> {
        query
            .with_out_the_money(settings.out_the_money)
            .with_failure(settings.implied_volatility_failure)
    }
    let with_policy = |query| apply_policy(query, settings);
    Ok((
        mid_surface(surface, time, with_policy(empirical))?,
        mid_surface(surface, time, with_policy(modelled).with_model(model))?,
    ))
}

/// Loss between the empirical and model mid surfaces.
pub fn surface_evaluation(
    surface: &VolatilitySurface,
    time: NaiveDate,
    model: &dyn StochasticVolatilityModel,
    settings: &CostFunctionSettings,
) -> Result<f64> {
    let (empirical, modelled) = compared_surfaces(surface, time, model, settings, settings.quantity)?;
    let loss = settings.metric.evaluate(empirical.values(), modelled.values())?;
    trace!(ticker = surface.underlying().ticker(), metric = %settings.metric, loss, "surface evaluation");
    Ok(loss)
}

/// Slope of implied volatility against `ln(K / spot)` over the `window`
/// strikes on each side of spot. `NaN` with fewer than two finite points.
pub fn atm_skew(strikes: &[i64], volatilities: &[f64], spot: f64, window: usize) -> f64 {
    let crossing = strikes.partition_point(|&k| (k as f64) < spot);
    let lo = crossing.saturating_sub(window);
    let hi = (crossing + window).min(strikes.len()).min(volatilities.len());

    let (moneyness, vols): (Vec<f64>, Vec<f64>) = (lo..hi)
        .filter(|&i| volatilities[i].is_finite())
        .map(|i| ((strikes[i] as f64 / spot).ln(), volatilities[i]))
        .unzip();
    if moneyness.len() < 2 {
        return f64::NAN;
    }
    let variance = moneyness.iter().variance();
    if variance <= 0.0 {
        return f64::NAN;
    }
    moneyness.iter().covariance(vols.iter()) / variance
}

/// One ATM skew per expiry of an implied-volatility surface.
pub fn atm_skews(surface: &QuantitySurface, spot: f64, window: usize) -> Vec<f64> {
    (0..surface.expiries().len())
        .map(|j| atm_skew(surface.strikes(), &surface.expiry_slice(j), spot, window))
        .collect()
}

/// Loss between the per-expiry ATM skews of the empirical and model
/// implied-volatility surfaces.
pub fn surface_atm_skew(
    surface: &VolatilitySurface,
    time: NaiveDate,
    model: &dyn StochasticVolatilityModel,
    settings: &CostFunctionSettings,
) -> Result<f64> {
    let spot = surface.underlying().price(time)?;
    let (empirical, modelled) =
        compared_surfaces(surface, time, model, settings, QuantityKind::ImpliedVolatility)?;
    let empirical = atm_skews(&empirical, spot, settings.skew_window);
    let modelled = atm_skews(&modelled, spot, settings.skew_window);
    let loss = settings.skew_metric.evaluate(&empirical, &modelled)?;
    trace!(ticker = surface.underlying().ticker(), ?empirical, ?modelled, loss, "ATM skew evaluation");
    Ok(loss)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_atm_skew_recovers_linear_smile() {
        let strikes = [80, 90, 95, 100, 105, 110, 120, 130];
        let spot = 100.0;
        let vols: Vec<f64> = strikes
            .iter()
            .map(|&k| 0.2 - 0.15 * (k as f64 / spot).ln())
            .collect();
        assert_relative_eq!(atm_skew(&strikes, &vols, spot, 3), -0.15, epsilon = 1e-12);
    }

    #[test]
    fn test_atm_skew_uses_window_around_spot() {
        // Only the four strikes nearest spot are linear.
        let strikes = [50, 60, 98, 99, 101, 102, 150, 200];
        let vols = [9.0, 9.0, 0.21, 0.205, 0.195, 0.19, -9.0, -9.0];
        let skew = atm_skew(&strikes, &vols, 100.0, 2);
        assert!(skew < 0.0 && skew > -1.0, "skew {}", skew);
    }

    #[test]
    fn test_atm_skew_degenerate_inputs() {
        assert!(atm_skew(&[100], &[0.2], 100.0, 3).is_nan());
        assert!(atm_skew(&[90, 110], &[f64::NAN, 0.2], 100.0, 3).is_nan());
        assert!(atm_skew(&[], &[], 100.0, 3).is_nan());
    }
}
