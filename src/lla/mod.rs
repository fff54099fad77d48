//! Local linear approximation of non-convex penalties.
//!
//! A penalty `g(transform(x))` with `g` concave on the non-negative reals is
//! majorized at the current iterate by its linearization, which is a weighted
//! convex penalty. Each step solves the resulting convex problem.

use log::{debug, info};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use ndarray_stats::{errors::MultiInputError, DeviationExt};
use std::time::{Duration, Instant};

use crate::config::{PenaltyConfig, PenaltyUpdate};
use crate::datafits::LossConfig;
use crate::error::{GlmError, Result};
use crate::param_guard::ParamGuard;
use crate::penalties::{NonConvexFunc, NonSmoothTransform};
use crate::solvers::{GlmSolver, Solution, SolveOutput};
use crate::Float;

pub mod weighted;

pub use weighted::{Objective, WeightedGlmProblemSolver, WeightedProblemSolver};


/// A verified hyperparameter set for the LLA loop
#[derive(Debug, Clone, PartialEq)]
pub struct LlaValidParams<F> {
    n_steps: usize,
    xtol: Option<F>,
    atol: Option<F>,
    rtol: Option<F>,
    tracking_level: usize,
}

impl<F: Float> LlaValidParams<F> {
    pub fn n_steps(&self) -> usize {
        self.n_steps
    }

    pub fn xtol(&self) -> Option<F> {
        self.xtol
    }

    pub fn atol(&self) -> Option<F> {
        self.atol
    }

    pub fn rtol(&self) -> Option<F> {
        self.rtol
    }

    pub fn tracking_level(&self) -> usize {
        self.tracking_level
    }
}

/// A hyper-parameter set during construction
#[derive(Debug, Clone, PartialEq)]
pub struct LlaParams<F>(LlaValidParams<F>);

impl<F: Float> Default for LlaParams<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Float> LlaParams<F> {
    /// Create default LLA hyper parameters
    pub fn new() -> LlaParams<F> {
        Self(LlaValidParams {
            n_steps: 1,
            xtol: Some(F::cast(1e-4)),
            atol: None,
            rtol: None,
            tracking_level: 0,
        })
    }

    /// Set the maximum number of reweighting steps. A single step is the
    /// one-step LLA estimator.
    /// Defaults to `1` if not set.
    pub fn n_steps(mut self, n_steps: usize) -> Self {
        self.0.n_steps = n_steps;
        self
    }

    /// Stop when no coordinate moves by more than `xtol` in a step.
    ///
    /// Defaults to `Some(1e-4)` if not set.
    pub fn xtol(mut self, xtol: Option<F>) -> Self {
        self.0.xtol = xtol;
        self
    }

    /// Stop when the objective decreases by less than `atol` in a step.
    ///
    /// Defaults to `None` if not set.
    pub fn atol(mut self, atol: Option<F>) -> Self {
        self.0.atol = atol;
        self
    }

    /// Stop when the objective decreases by less than `rtol` times its
    /// previous value in a step.
    /// Defaults to `None` if not set.
    pub fn rtol(mut self, rtol: Option<F>) -> Self {
        self.0.rtol = rtol;
        self
    }

    /// How much of the run is recorded in [`LlaInfo`]: `0` keeps the final
    /// objective, `1` the objective of every step, `2` also the coordinate
    /// changes.
    /// Defaults to `0` if not set.
    pub fn tracking_level(mut self, tracking_level: usize) -> Self {
        self.0.tracking_level = tracking_level;
        self
    }
}

impl<F: Float> ParamGuard for LlaParams<F> {
    type Checked = LlaValidParams<F>;
    type Error = GlmError;

    /// Validate the hyper parameters
    fn check_ref(&self) -> Result<&Self::Checked> {
        if self.0.n_steps == 0 {
            return Err(GlmError::Configuration(
                "LLA needs at least one step".to_string(),
            ));
        }
        for (name, tol) in [("xtol", self.0.xtol), ("atol", self.0.atol), ("rtol", self.0.rtol)] {
            if let Some(tol) = tol {
                if !(tol >= F::zero()) || !tol.is_finite() {
                    return Err(GlmError::Configuration(format!(
                        "{} must be finite and non-negative, got {}",
                        name, tol
                    )));
                }
            }
        }
        Ok(&self.0)
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}

/// Terminal state of an LLA run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlaStatus {
    Converged,
    MaxStepsReached,
}

/// Report of an LLA run.
#[derive(Debug, Clone, PartialEq)]
pub struct LlaInfo<F> {
    pub status: LlaStatus,
    pub n_steps: usize,
    pub runtime: Duration,
    /// Objective trace. With tracking level `0` only the final objective is
    /// kept, otherwise it starts with the objective at the initial point.
    pub obj: Vec<Objective<F>>,
    /// Largest coordinate change of each step, kept at tracking level `2`.
    pub x_diffs: Vec<F>,
}

/// Output of [`solve_lla`].
#[derive(Debug, Clone)]
pub struct LlaOutput<F: Float, D> {
    pub solution: Solution<F>,
    pub other_data: Option<D>,
    pub info: LlaInfo<F>,
}

/// Starting points of an LLA run.
///
/// `init` and `init_upv` are where the first weights are computed, while
/// `sp_init`, `sp_upv_init` and `sp_other_data` warm-start the first
/// subproblem. Later subproblems are warm-started from the previous step.
#[derive(Debug, Clone)]
pub struct LlaInit<F: Float, D> {
    pub init: Array2<F>,
    pub init_upv: Option<Array1<F>>,
    pub sp_init: Option<Array2<F>>,
    pub sp_upv_init: Option<Array1<F>>,
    pub sp_other_data: Option<D>,
}

fn max_abs_diff<F: Float>(a: ArrayView2<F>, b: ArrayView2<F>) -> Result<F> {
    match a.linf_dist(&b) {
        Ok(diff) => Ok(diff),
        Err(MultiInputError::EmptyInput) => Ok(F::zero()),
        Err(err) => Err(GlmError::NumericalFailure(format!(
            "the subproblem changed the coefficient shape: {}",
            err
        ))),
    }
}

/// The weights of the next convex subproblem: the derivative of the outer
/// non-convex function at the transformed coefficient.
fn reweight<F: Float>(
    penalty_fcn: &NonConvexFunc<F>,
    transform: &NonSmoothTransform<F>,
    current: ArrayView2<F>,
) -> Result<Array1<F>> {
    let weights = penalty_fcn.grad(transform.apply(current).view());
    if let Some(w) = weights.iter().find(|w| !w.is_finite()) {
        return Err(GlmError::InvalidPenaltyState(format!(
            "{} reweighting produced the non-finite weight {}",
            penalty_fcn.kind().name(),
            w
        )));
    }
    Ok(weights)
}

/// Runs the LLA loop on a weighted subproblem.
///
/// At each step the weights are computed at the current coefficient, the
/// subproblem is solved for them and the objective is evaluated at the
/// solution. The loop stops once a set tolerance is met, or after
/// `n_steps` steps.
pub fn solve_lla<F, S>(
    sub_prob: &mut S,
    penalty_fcn: &NonConvexFunc<F>,
    transform: &NonSmoothTransform<F>,
    init: LlaInit<F, S::OtherData>,
    params: &LlaValidParams<F>,
) -> Result<LlaOutput<F, S::OtherData>>
where
    F: Float,
    S: WeightedProblemSolver<F>,
{
    let start = Instant::now();
    let tracking = params.tracking_level();
    let needs_prev_obj = params.atol().is_some() || params.rtol().is_some();

    let mut current = init.init;
    let mut current_upv = init.init_upv;
    let mut obj = Vec::new();
    let mut x_diffs = Vec::new();
    let mut prev_obj = if needs_prev_obj || tracking >= 1 {
        let initial =
            sub_prob.eval_objective(current.view(), current_upv.as_ref().map(|b| b.view()))?;
        if tracking >= 1 {
            obj.push(initial);
        }
        Some(initial)
    } else {
        None
    };

    let mut sp_init = init.sp_init;
    let mut sp_upv_init = init.sp_upv_init;
    let mut other_data = init.sp_other_data;
    let mut status = LlaStatus::MaxStepsReached;
    let mut n_steps = 0;
    let mut last_obj = prev_obj;

    for step in 1..=params.n_steps() {
        n_steps = step;
        let weights = reweight(penalty_fcn, transform, current.view())?;
        let (solution, new_other_data) = sub_prob
            .solve(
                weights,
                sp_init.as_ref().map(|c| c.view()),
                sp_upv_init.as_ref().map(|b| b.view()),
                other_data.take(),
            )
            .map_err(|err| GlmError::SubproblemFailure {
                iteration: step,
                source: Box::new(err),
            })?;

        let x_diff = max_abs_diff(solution.coef.view(), current.view())?;
        current = solution.coef;
        current_upv = solution.intercept;
        other_data = new_other_data;
        sp_init = Some(current.clone());
        sp_upv_init = current_upv.clone();

        let step_obj =
            sub_prob.eval_objective(current.view(), current_upv.as_ref().map(|b| b.view()))?;
        debug!(
            "LLA step {}: objective {} (loss {}, penalty {}), largest coefficient change {}",
            step, step_obj.total, step_obj.base_loss, step_obj.pen_loss, x_diff
        );
        if tracking >= 1 {
            obj.push(step_obj);
        }
        if tracking >= 2 {
            x_diffs.push(x_diff);
        }
        last_obj = Some(step_obj);

        let x_converged = params.xtol().map_or(false, |xtol| x_diff <= xtol);
        let (a_converged, r_converged) = match prev_obj {
            Some(prev) => {
                let decrease = (prev.total - step_obj.total).abs();
                (
                    params.atol().map_or(false, |atol| decrease <= atol),
                    params
                        .rtol()
                        .map_or(false, |rtol| decrease <= rtol * prev.total.abs()),
                )
            }
            None => (false, false),
        };
        prev_obj = Some(step_obj);

        if x_converged || a_converged || r_converged {
            status = LlaStatus::Converged;
            break;
        }
    }

    if tracking == 0 {
        obj.extend(last_obj);
    }
    info!("LLA stopped after {} steps with status {:?}", n_steps, status);

    Ok(LlaOutput {
        solution: Solution {
            coef: current,
            intercept: current_upv,
        },
        other_data,
        info: LlaInfo {
            status,
            n_steps,
            runtime: start.elapsed(),
            obj,
            x_diffs,
        },
    })
}

/// Solver of non-convex penalized problems by local linear approximation,
/// on top of a convex solver.
///
/// It has the interface of a convex solver, so it can be used wherever one
/// is expected. The penalty given to [`GlmSolver::setup`] must carry a
/// non-convex flavor.
#[derive(Debug, Clone)]
pub struct LlaSolver<F: Float, S: GlmSolver<F>> {
    params: LlaValidParams<F>,
    sub_prob: WeightedGlmProblemSolver<F, S>,
}

impl<F: Float, S: GlmSolver<F>> LlaSolver<F, S> {
    pub fn new(params: LlaValidParams<F>, solver: S) -> Self {
        LlaSolver {
            params,
            sub_prob: WeightedGlmProblemSolver::new(solver),
        }
    }

    pub fn params(&self) -> &LlaValidParams<F> {
        &self.params
    }
}

impl<F: Float, S: GlmSolver<F>> GlmSolver<F> for LlaSolver<F, S> {
    type OtherData = S::OtherData;
    type Info = LlaInfo<F>;

    fn setup(
        &mut self,
        X: ArrayView2<F>,
        y: ArrayView2<F>,
        loss: &LossConfig,
        penalty: &PenaltyConfig<F>,
        fit_intercept: bool,
        sample_weight: Option<ArrayView1<F>>,
    ) -> Result<()> {
        self.sub_prob
            .setup(X, y, loss, penalty, fit_intercept, sample_weight)
    }

    fn update_penalty(&mut self, update: PenaltyUpdate<F>) -> Result<()> {
        self.sub_prob.update_penalty(update)
    }

    /// Starts the LLA loop from the initializer declared by the penalty,
    /// falling back on `coef_init` and then on zero. `coef_init`, when
    /// given, warm-starts the first subproblem.
    fn solve(
        &mut self,
        coef_init: Option<ArrayView2<F>>,
        intercept_init: Option<ArrayView1<F>>,
        other_init: Option<S::OtherData>,
    ) -> Result<SolveOutput<F, S::OtherData, LlaInfo<F>>> {
        let penalty = self.sub_prob.penalty()?;
        let fit_intercept = self.sub_prob.fit_intercept()?;
        let (n_features, n_responses) = self.sub_prob.coef_dim()?;
        let penalty_fcn = self.sub_prob.penalty_func()?.func().clone();
        let transform = self.sub_prob.penalty_func()?.transform().clone();

        if let Some(init) = penalty.coef_init() {
            check_coef_shape(init.view(), (n_features, n_responses), "declared coef_init")?;
        }
        if let Some(init) = coef_init {
            check_coef_shape(init, (n_features, n_responses), "coef_init")?;
        }
        if fit_intercept {
            if let Some(b) = penalty.intercept_init() {
                check_intercept_len(b.view(), n_responses, "declared intercept_init")?;
            }
            if let Some(b) = intercept_init {
                check_intercept_len(b, n_responses, "intercept_init")?;
            }
        }

        let init = match (penalty.coef_init(), coef_init) {
            (Some(init), _) => init.clone(),
            (None, Some(init)) => init.to_owned(),
            (None, None) => Array2::zeros((n_features, n_responses)),
        };
        let init_upv = if fit_intercept {
            match (penalty.intercept_init(), intercept_init) {
                (Some(b), _) => Some(b.clone()),
                (None, Some(b)) => Some(b.to_owned()),
                (None, None) => Some(Array1::zeros(n_responses)),
            }
        } else {
            None
        };
        let sp_init = coef_init.map_or_else(|| init.clone(), |c| c.to_owned());
        let sp_upv_init = match intercept_init {
            Some(b) if fit_intercept => Some(b.to_owned()),
            _ => init_upv.clone(),
        };

        let output = solve_lla(
            &mut self.sub_prob,
            &penalty_fcn,
            &transform,
            LlaInit {
                init,
                init_upv,
                sp_init: Some(sp_init),
                sp_upv_init,
                sp_other_data: other_init,
            },
            &self.params,
        )?;
        Ok((output.solution, output.other_data, output.info))
    }
}

fn check_coef_shape<F: Float>(
    coef: ArrayView2<F>,
    expected: (usize, usize),
    what: &str,
) -> Result<()> {
    if coef.dim() != expected {
        return Err(GlmError::Configuration(format!(
            "{} has shape {:?}, expected {:?}",
            what,
            coef.dim(),
            expected
        )));
    }
    Ok(())
}

fn check_intercept_len<F: Float>(
    intercept: ArrayView1<F>,
    expected: usize,
    what: &str,
) -> Result<()> {
    if intercept.len() != expected {
        return Err(GlmError::Configuration(format!(
            "{} has length {}, expected {}",
            what,
            intercept.len(),
            expected
        )));
    }
    Ok(())
}
