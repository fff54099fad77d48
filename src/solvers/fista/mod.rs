use log::{debug, warn};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use std::time::{Duration, Instant};

use super::{GlmSolver, Solution, SolveOutput};
use crate::config::{PenaltyConfig, PenaltyUpdate};
use crate::datafits::{Loss, LossConfig};
use crate::error::{GlmError, Result};
use crate::factory::{penalty_func, split_smooth_and_non_smooth, wrap_intercept, CoefShape};
use crate::func::{stack_intercept, unstack_intercept, Func};
use crate::param_guard::ParamGuard;
use crate::Float;

/// A verified hyperparameter set for the accelerated proximal gradient solver
#[derive(Debug, Clone, PartialEq)]
pub struct FistaValidParams<F> {
    max_iter: usize,
    tol: F,
    restart: bool,
}

impl<F: Float> FistaValidParams<F> {
    pub fn max_iter(&self) -> usize {
        self.max_iter
    }

    pub fn tol(&self) -> F {
        self.tol
    }

    pub fn restart(&self) -> bool {
        self.restart
    }
}

/// A hyper-parameter set during construction
///
/// Configures FISTA, which minimizes
/// ```ignore
/// loss(z) + smooth_penalty(z) + non_smooth_penalty(z)
/// ```
/// with gradient steps on the smooth terms and proximal steps on the
/// non-smooth one.
#[derive(Debug, Clone, PartialEq)]
pub struct FistaParams<F>(FistaValidParams<F>);

impl<F: Float> Default for FistaParams<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Float> FistaParams<F> {
    /// Create default FISTA hyper parameters
    pub fn new() -> FistaParams<F> {
        Self(FistaValidParams {
            max_iter: 5000,
            tol: F::cast(1e-10),
            restart: true,
        })
    }

    /// Set the maximum number of proximal gradient iterations.
    ///
    /// Defaults to `5000` if not set.
    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.0.max_iter = max_iter;
        self
    }

    /// Set the stopping criterion, a bound on the largest coordinate change
    /// between two iterates relative to the largest coordinate.
    /// Defaults to `1e-10` if not set.
    pub fn tol(mut self, tol: F) -> Self {
        self.0.tol = tol;
        self
    }

    /// Enables the gradient-based adaptive restart of the momentum.
    ///
    /// Defaults to `true` if not set.
    pub fn restart(mut self, restart: bool) -> Self {
        self.0.restart = restart;
        self
    }
}

impl<F: Float> ParamGuard for FistaParams<F> {
    type Checked = FistaValidParams<F>;
    type Error = GlmError;

    /// Validate the hyper parameters
    fn check_ref(&self) -> Result<&Self::Checked> {
        if !(self.0.tol >= F::zero()) || !self.0.tol.is_finite() {
            Err(GlmError::Configuration(format!(
                "tolerance must be finite and non-negative, got {}",
                self.0.tol
            )))
        } else if self.0.max_iter == 0 {
            Err(GlmError::Configuration(
                "FISTA needs at least one iteration".to_string(),
            ))
        } else {
            Ok(&self.0)
        }
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}

/// Report of a FISTA solve.
#[derive(Debug, Clone, PartialEq)]
pub struct FistaInfo<F> {
    pub n_iter: usize,
    pub n_restarts: usize,
    pub converged: bool,
    /// Value of the full objective at the returned point.
    pub objective: F,
    pub runtime: Duration,
}

#[derive(Debug, Clone)]
struct Problem<F: Float> {
    loss: Loss<F>,
    penalty: PenaltyConfig<F>,
    shape: CoefShape,
    fit_intercept: bool,
}

/// Accelerated proximal gradient descent with adaptive restart.
///
/// The penalty is kept as a specification and assembled at every solve, so
/// that weight updates between solves take effect.
#[derive(Debug, Clone)]
pub struct FistaSolver<F: Float> {
    params: FistaValidParams<F>,
    problem: Option<Problem<F>>,
}

impl<F: Float> Default for FistaSolver<F> {
    fn default() -> Self {
        FistaSolver::new(FistaParams::new().0)
    }
}

impl<F: Float> FistaSolver<F> {
    pub fn new(params: FistaValidParams<F>) -> Self {
        FistaSolver {
            params,
            problem: None,
        }
    }

    pub fn params(&self) -> &FistaValidParams<F> {
        &self.params
    }

    /// The penalty specification the next solve will use.
    pub fn penalty(&self) -> Option<&PenaltyConfig<F>> {
        self.problem.as_ref().map(|problem| &problem.penalty)
    }

    fn problem(&self) -> Result<&Problem<F>> {
        self.problem.as_ref().ok_or_else(not_set_up)
    }

    fn initial_point(
        &self,
        problem: &Problem<F>,
        coef_init: Option<ArrayView2<F>>,
        intercept_init: Option<ArrayView1<F>>,
    ) -> Result<Array2<F>> {
        let CoefShape {
            n_features,
            n_responses,
        } = problem.shape;
        let coef = match coef_init {
            Some(coef) if coef.dim() != (n_features, n_responses) => {
                return Err(GlmError::Configuration(format!(
                    "initial coefficient has shape {:?}, expected ({}, {})",
                    coef.dim(),
                    n_features,
                    n_responses
                )))
            }
            Some(coef) => coef.to_owned(),
            None => Array2::zeros((n_features, n_responses)),
        };
        if !problem.fit_intercept {
            return Ok(coef);
        }
        let intercept = match intercept_init {
            Some(b) if b.len() != n_responses => {
                return Err(GlmError::Configuration(format!(
                    "initial intercept has length {}, expected {}",
                    b.len(),
                    n_responses
                )))
            }
            Some(b) => b.to_owned(),
            None => Array1::zeros(n_responses),
        };
        Ok(stack_intercept(Some(intercept.view()), coef.view()))
    }

    fn minimize(
        &self,
        loss: &Loss<F>,
        smooth_pen: Option<&dyn Func<F>>,
        non_smooth_pen: Option<&dyn Func<F>>,
        z0: Array2<F>,
    ) -> Result<(Array2<F>, FistaInfo<F>)> {
        let start = Instant::now();
        let smooth_grad = |z: ArrayView2<F>| -> Result<Array2<F>> {
            let mut grad = loss.grad(z)?;
            if let Some(pen) = smooth_pen {
                grad += &pen.grad(z)?;
            }
            Ok(grad)
        };

        let lip = loss.grad_lip().unwrap_or_else(F::zero)
            + smooth_pen
                .and_then(|pen| pen.grad_lip())
                .unwrap_or_else(F::zero);
        let step = if lip > F::zero() {
            F::one() / lip
        } else {
            F::one()
        };

        let mut x = z0;
        let mut y = x.clone();
        let mut t = F::one();
        let mut n_iter = 0;
        let mut n_restarts = 0;
        let mut converged = false;

        while n_iter < self.params.max_iter {
            n_iter += 1;
            let forward = &y - &(smooth_grad(y.view())? * step);
            let x_new = match non_smooth_pen {
                Some(pen) => pen.prox(forward.view(), step)?,
                None => forward,
            };
            if x_new.iter().any(|v| !v.is_finite()) {
                return Err(GlmError::NumericalFailure(format!(
                    "FISTA produced non-finite iterates at iteration {}",
                    n_iter
                )));
            }

            let delta = &x_new - &x;
            let diff = delta.fold(F::zero(), |acc, &d| acc.max(d.abs()));
            let scale = x_new.fold(F::one(), |acc, &v| acc.max(v.abs()));

            let t_new = (F::one() + (F::one() + F::cast(4.) * t * t).sqrt()) / F::cast(2.);
            let restart = self.params.restart && ((&y - &x_new) * &delta).sum() > F::zero();
            if restart {
                n_restarts += 1;
                t = F::one();
                y = x_new.clone();
            } else {
                y = &x_new + &(delta * ((t - F::one()) / t_new));
                t = t_new;
            }
            x = x_new;

            if diff <= self.params.tol * scale {
                converged = true;
                break;
            }
        }

        let objective = loss.value(x.view())
            + smooth_pen.map_or_else(F::zero, |pen| pen.value(x.view()))
            + non_smooth_pen.map_or_else(F::zero, |pen| pen.value(x.view()));
        if converged {
            debug!(
                "FISTA converged after {} iterations ({} restarts), objective {}",
                n_iter, n_restarts, objective
            );
        } else {
            warn!(
                "FISTA stopped at its budget of {} iterations without converging, objective {}",
                n_iter, objective
            );
        }

        let info = FistaInfo {
            n_iter,
            n_restarts,
            converged,
            objective,
            runtime: start.elapsed(),
        };
        Ok((x, info))
    }
}

fn not_set_up() -> GlmError {
    GlmError::NotApplicable("the solver must be set up before use".to_string())
}

impl<F: Float> GlmSolver<F> for FistaSolver<F> {
    type OtherData = ();
    type Info = FistaInfo<F>;

    /// Builds the loss and checks that the penalty can be assembled for the
    /// shape of the data.
    fn setup(
        &mut self,
        X: ArrayView2<F>,
        y: ArrayView2<F>,
        loss: &LossConfig,
        penalty: &PenaltyConfig<F>,
        fit_intercept: bool,
        sample_weight: Option<ArrayView1<F>>,
    ) -> Result<()> {
        let shape = CoefShape::new(X.ncols(), y.ncols());
        let loss = Loss::new(loss, X, y, fit_intercept, sample_weight)?;
        penalty_func(penalty, Some(shape))?;
        self.problem = Some(Problem {
            loss,
            penalty: penalty.clone(),
            shape,
            fit_intercept,
        });
        Ok(())
    }

    fn update_penalty(&mut self, update: PenaltyUpdate<F>) -> Result<()> {
        let problem = self.problem.as_mut().ok_or_else(not_set_up)?;
        problem.penalty.apply(update)
    }

    fn solve(
        &mut self,
        coef_init: Option<ArrayView2<F>>,
        intercept_init: Option<ArrayView1<F>>,
        _other_init: Option<()>,
    ) -> Result<SolveOutput<F, (), FistaInfo<F>>> {
        let problem = self.problem()?;
        let penalty = wrap_intercept(
            penalty_func(&problem.penalty, Some(problem.shape))?,
            problem.fit_intercept,
        );
        let (smooth_pen, non_smooth_pen) = split_smooth_and_non_smooth(penalty);
        if let Some(pen) = non_smooth_pen.as_deref() {
            if !pen.has_prox() {
                return Err(GlmError::Configuration(format!(
                    "the non-smooth part of the {} penalty has no proximal operator",
                    problem.penalty.family()
                )));
            }
        }

        let z0 = self.initial_point(problem, coef_init, intercept_init)?;
        let (z, info) = self.minimize(
            &problem.loss,
            smooth_pen.as_deref(),
            non_smooth_pen.as_deref(),
            z0,
        )?;
        let (coef, intercept) = unstack_intercept(z.view(), problem.fit_intercept);
        Ok((Solution { coef, intercept }, None, info))
    }
}
