/// Objective and search box handed to the optimizer pipeline
pub trait ModelCalibrator: Send + Sync {
    /// Returns the name of the model (e.g., "Heston")
    fn model_name(&self) -> &str;

    /// How many parameters are in the model's optimization vector
    fn param_count(&self) -> usize {
        self.param_names().len()
    }

    /// Current search box, one (min, max) per parameter
    fn param_bounds(&self) -> &[(f64, f64)];

    /// Objective value of a trial vector; invalid vectors map to a large penalty
    fn evaluate_objective(&self, x: &[f64]) -> f64;

    /// Returns parameter names in the order they appear in the optimization vector
    fn param_names(&self) -> Vec<&str>;

    /// Expand internal parameter bounds if parameters are near current bounds.
    /// Returns true if any bound was adjusted.
    fn expand_bounds_if_needed(
        &mut self,
        _params: &[f64],
        _proximity_threshold: f64,
        _expansion_factor: f64,
    ) -> bool {
        false
    }
}

/// Widens every side of `bounds` whose parameter lies within
/// `proximity_threshold` of the range from that side, without leaving `limits`.
/// Returns true if any bound moved.
pub fn expand_bounds(
    bounds: &mut [(f64, f64)],
    limits: &[(f64, f64)],
    params: &[f64],
    proximity_threshold: f64,
    expansion_factor: f64,
) -> bool {
    let mut adjusted = false;
    for ((bounds, limit), param) in bounds.iter_mut().zip(limits).zip(params) {
        let range = bounds.1 - bounds.0;
        let expansion = range * expansion_factor;
        if *param <= bounds.0 + range * proximity_threshold && bounds.0 > limit.0 {
            bounds.0 = (bounds.0 - expansion).max(limit.0);
            adjusted = true;
        }
        if *param >= bounds.1 - range * proximity_threshold && bounds.1 < limit.1 {
            bounds.1 = (bounds.1 + expansion).min(limit.1);
            adjusted = true;
        }
    }
    adjusted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_bounds_near_edges() {
        let mut bounds = vec![(0.0, 1.0), (0.0, 1.0)];
        let limits = [(-1.0, 1.2), (-1.0, 2.0)];
        assert!(expand_bounds(&mut bounds, &limits, &[0.05, 0.5], 0.1, 0.25));
        assert_eq!(bounds, vec![(-0.25, 1.0), (0.0, 1.0)]);

        assert!(expand_bounds(&mut bounds, &limits, &[0.0, 0.99], 0.1, 0.25));
        assert_eq!(bounds[1], (0.0, 1.25));
    }

    #[test]
    fn test_expand_bounds_stops_at_limits() {
        let mut bounds = vec![(0.0, 1.0)];
        let limits = [(0.0, 1.1)];
        assert!(expand_bounds(&mut bounds, &limits, &[0.99], 0.1, 0.5));
        assert_eq!(bounds[0], (0.0, 1.1));
        // Pinned against both limits: nothing left to expand.
        assert!(!expand_bounds(&mut bounds, &limits, &[0.0], 0.1, 0.5));
        assert!(!expand_bounds(&mut bounds, &limits, &[1.1], 0.1, 0.5));
    }
}
