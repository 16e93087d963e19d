use crate::calibration::config::OptimizationConfig;
use crate::calibration::types::ModelCalibrator;
use cmaes_lbfgsb::cmaes::{canonical_cmaes_optimize, CmaesCanonicalConfig};
use cmaes_lbfgsb::lbfgsb_optimize::lbfgsb_optimize;
use tracing::{debug, info, warn};

/// A calibration run over one objective
pub struct CalibrationProcess<'a> {
    model: &'a mut dyn ModelCalibrator,
    config: OptimizationConfig,
    initial_guess: Option<Vec<f64>>,
}

impl<'a> CalibrationProcess<'a> {
    pub fn new(model: &'a mut dyn ModelCalibrator, config: OptimizationConfig) -> Self {
        Self {
            model,
            config,
            initial_guess: None,
        }
    }

    /// Set initial guess for optimization
    pub fn with_initial_guess(mut self, guess: Vec<f64>) -> Self {
        self.initial_guess = Some(guess);
        self
    }

    /// Runs the (adaptive) calibration; returns the best objective, its
    /// parameters and the final search box
    pub fn run(self) -> (f64, Vec<f64>, Vec<(f64, f64)>) {
        calibrate_model_adaptive(self.model, &self.config, self.initial_guess)
    }
}

fn cmaes_config(config: &OptimizationConfig) -> CmaesCanonicalConfig {
    CmaesCanonicalConfig {
        population_size: config.pop_size,
        max_generations: config.max_gen,
        seed: config.cmaes.seed.unwrap_or(123456),
        c1: None,
        c_mu: None,
        c_sigma: None,
        d_sigma: None,
        parallel_eval: config.cmaes.parallel_eval,
        verbosity: config.cmaes.verbosity,
        ipop_restarts: config.cmaes.ipop_restarts,
        ipop_increase_factor: config.cmaes.ipop_increase_factor,
        bipop_restarts: config.cmaes.bipop_restarts,
        total_evals_budget: config.cmaes.total_evals_budget,
        use_subrun_budgeting: config.cmaes.use_subrun_budgeting,
        alpha_mu: None,
        hsig_threshold_factor: None,
        bipop_small_population_factor: None,
        bipop_small_budget_factor: None,
        bipop_large_budget_factor: None,
        bipop_large_pop_increase_factor: None,
        max_bound_iterations: None,
        eig_precision_threshold: None,
        min_eig_value: None,
        matrix_op_threshold: None,
        stagnation_limit: None,
        min_sigma: None,
    }
}

/// CMA-ES global search followed by L-BFGS-B refinement, both inside the
/// calibrator's bounds.
///
/// With an initial guess the CMA-ES search is centred on it (or skipped when
/// `mini_cmaes_on_refinement` is off). The guess itself is kept if neither
/// stage improves on it.
pub fn calibrate_model(
    model: &dyn ModelCalibrator,
    config: &OptimizationConfig,
    initial_guess: Option<Vec<f64>>,
) -> (f64, Vec<f64>) {
    let bounds = model.param_bounds();
    let obj_fn = |x: &[f64]| model.evaluate_objective(x);
    let guess = initial_guess.map(|g| {
        g.iter()
            .zip(bounds)
            .map(|(v, (lo, hi))| v.clamp(*lo, *hi))
            .collect::<Vec<f64>>()
    });

    // 1) Global search
    let (best_obj, best_sol) = match guess {
        Some(ref guess) if config.cmaes.mini_cmaes_on_refinement => {
            let guess_obj = obj_fn(guess);
            info!(
                model = model.model_name(),
                objective = guess_obj,
                "running CMA-ES around the initial guess"
            );
            let cmaes_result =
                canonical_cmaes_optimize(obj_fn, bounds, cmaes_config(config), Some(guess.clone()));
            let (_, params) = cmaes_result.best_solution;
            let obj = obj_fn(&params);
            if obj <= guess_obj {
                (obj, params)
            } else {
                (guess_obj, guess.clone())
            }
        }
        Some(ref guess) => {
            let guess_obj = obj_fn(guess);
            info!(
                model = model.model_name(),
                objective = guess_obj,
                "skipping CMA-ES, refining the initial guess"
            );
            (guess_obj, guess.clone())
        }
        None => {
            info!(
                model = model.model_name(),
                bipop_restarts = config.cmaes.bipop_restarts,
                "running full CMA-ES"
            );
            let cmaes_result = canonical_cmaes_optimize(obj_fn, bounds, cmaes_config(config), None);
            let (_, params) = cmaes_result.best_solution;
            (obj_fn(&params), params)
        }
    };
    info!(model = model.model_name(), objective = best_obj, "global search finished");

    // 2) Local refinement
    if !config.cmaes.lbfgsb_enabled {
        return (best_obj, best_sol);
    }

    let mut refined_solution = best_sol.clone();
    let refine_res = lbfgsb_optimize(
        &mut refined_solution,
        bounds,
        &obj_fn,
        config.cmaes.lbfgsb_max_iterations,
        config.tolerance,
        Some(|_current_x: &[f64], current_obj: f64| {
            debug!(objective = current_obj, "L-BFGS-B iteration");
        }),
        None,
    );

    match refine_res {
        Ok((loc_obj, loc_sol)) if loc_obj < best_obj => {
            info!(from = best_obj, to = loc_obj, "L-BFGS-B improved objective");
            (loc_obj, loc_sol)
        }
        Ok(_) => {
            debug!("L-BFGS-B did not improve objective, keeping CMA-ES solution");
            (best_obj, best_sol)
        }
        Err(e) => {
            warn!(error = ?e, "L-BFGS-B failed, keeping CMA-ES solution");
            (best_obj, best_sol)
        }
    }
}

/// Repeats [`calibrate_model`] while the optimum sits near the edge of the
/// search box, expanding the box between runs.
pub fn calibrate_model_adaptive(
    model: &mut dyn ModelCalibrator,
    config: &OptimizationConfig,
    initial_guess: Option<Vec<f64>>,
) -> (f64, Vec<f64>, Vec<(f64, f64)>) {
    if !config.adaptive_bounds.enabled {
        let (obj, params) = calibrate_model(&*model, config, initial_guess);
        return (obj, params, model.param_bounds().to_vec());
    }

    let mut best_obj = f64::MAX;
    let mut best_params = initial_guess.clone().unwrap_or_default();
    let mut guess = initial_guess;

    for iter in 0..config.adaptive_bounds.max_iterations {
        let (obj, params) = calibrate_model(&*model, config, guess.clone());
        if obj < best_obj {
            best_obj = obj;
            best_params = params.clone();
            guess = Some(params.clone());
        }
        let adjusted = model.expand_bounds_if_needed(
            &params,
            config.adaptive_bounds.proximity_threshold,
            config.adaptive_bounds.expansion_factor,
        );
        info!(
            iteration = iter + 1,
            objective = obj,
            expanded = adjusted,
            "adaptive bounds iteration"
        );
        if !adjusted {
            break;
        }
    }

    (best_obj, best_params, model.param_bounds().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::types::expand_bounds;

    /// Shifted quadratic bowl.
    struct Bowl {
        centre: Vec<f64>,
        bounds: Vec<(f64, f64)>,
        limits: Vec<(f64, f64)>,
    }

    impl ModelCalibrator for Bowl {
        fn model_name(&self) -> &str {
            "bowl"
        }

        fn param_bounds(&self) -> &[(f64, f64)] {
            &self.bounds
        }

        fn evaluate_objective(&self, x: &[f64]) -> f64 {
            x.iter().zip(&self.centre).map(|(a, b)| (a - b).powi(2)).sum()
        }

        fn param_names(&self) -> Vec<&str> {
            vec!["x", "y"]
        }

        fn expand_bounds_if_needed(&mut self, params: &[f64], proximity: f64, expansion: f64) -> bool {
            expand_bounds(&mut self.bounds, &self.limits, params, proximity, expansion)
        }
    }

    fn bowl(centre: Vec<f64>, bounds: Vec<(f64, f64)>) -> Bowl {
        Bowl {
            centre,
            bounds,
            limits: vec![(-10.0, 10.0); 2],
        }
    }

    #[test]
    fn test_refinement_finds_interior_minimum() {
        let model = bowl(vec![0.3, -0.2], vec![(-1.0, 1.0); 2]);
        let (obj, params) =
            calibrate_model(&model, &OptimizationConfig::fast(), Some(vec![0.9, 0.9]));
        assert!(obj < 1e-4, "objective {}", obj);
        assert!((params[0] - 0.3).abs() < 1e-2);
        assert!((params[1] + 0.2).abs() < 1e-2);
    }

    #[test]
    fn test_solution_respects_bounds() {
        let model = bowl(vec![3.0, 0.0], vec![(-1.0, 1.0); 2]);
        let (_, params) = calibrate_model(&model, &OptimizationConfig::fast(), None);
        assert!(params.iter().all(|p| (-1.0..=1.0).contains(p)));
        assert!(params[0] > 0.9);
    }

    #[test]
    fn test_adaptive_bounds_follow_the_minimum() {
        let mut model = bowl(vec![1.6, 0.0], vec![(-1.0, 1.0); 2]);
        let mut config = OptimizationConfig::fast();
        config.adaptive_bounds.enabled = true;
        config.adaptive_bounds.max_iterations = 5;
        let (obj, params, bounds) =
            CalibrationProcess::new(&mut model, config).with_initial_guess(vec![0.0, 0.0]).run();
        assert!(bounds[0].1 > 1.6);
        assert!(obj < 1e-3, "objective {}", obj);
        assert!((params[0] - 1.6).abs() < 5e-2);
    }
}
