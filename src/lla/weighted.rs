use ndarray::{Array1, ArrayView1, ArrayView2};
use std::fmt::Debug;

use crate::config::{PenaltyConfig, PenaltyUpdate};
use crate::datafits::{Loss, LossConfig};
use crate::error::{GlmError, Result};
use crate::factory::{composite_nonconvex, wrap_intercept, CoefShape};
use crate::func::{stack_intercept, Func};
use crate::penalties::CompositeNonConvex;
use crate::solvers::{GlmSolver, Solution};
use crate::Float;

/// Value of the non-convex objective, split into its two terms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Objective<F> {
    pub total: F,
    pub base_loss: F,
    pub pen_loss: F,
}

/// The convex subproblem solved at each LLA step: the loss plus a weighted
/// convex penalty, the weights being given by the step.
pub trait WeightedProblemSolver<F: Float> {
    type OtherData: Clone + Debug;

    /// Solves the subproblem for `weights`, warm-started from the previous
    /// solution.
    fn solve(
        &mut self,
        weights: Array1<F>,
        sp_init: Option<ArrayView2<F>>,
        sp_upv_init: Option<ArrayView1<F>>,
        sp_other_data: Option<Self::OtherData>,
    ) -> Result<(Solution<F>, Option<Self::OtherData>)>;

    /// Evaluates the non-convex objective at a coefficient and its
    /// unpenalized intercept.
    fn eval_objective(
        &self,
        value: ArrayView2<F>,
        upv: Option<ArrayView1<F>>,
    ) -> Result<Objective<F>>;
}

#[derive(Debug, Clone)]
struct Problem<F: Float, S> {
    solver: S,
    loss: Loss<F>,
    penalty: PenaltyConfig<F>,
    penalty_func: CompositeNonConvex<F>,
    n_features: usize,
    n_responses: usize,
    fit_intercept: bool,
}

/// Adapts a convex [`GlmSolver`] to the weighted subproblems of the LLA
/// algorithm.
///
/// Two penalties are kept. The convex solver holds the convex majorizer of the
/// non-convex penalty with a unit strength, whose weights are rebound before
/// every solve. The non-convex penalty itself is only used to evaluate the
/// objective.
#[derive(Debug, Clone)]
pub struct WeightedGlmProblemSolver<F: Float, S: GlmSolver<F>> {
    template: S,
    problem: Option<Problem<F, S>>,
}

impl<F: Float, S: GlmSolver<F>> WeightedGlmProblemSolver<F, S> {
    /// `solver` is a template, cloned at every [`setup`](Self::setup).
    pub fn new(solver: S) -> Self {
        WeightedGlmProblemSolver {
            template: solver,
            problem: None,
        }
    }

    fn problem(&self) -> Result<&Problem<F, S>> {
        self.problem.as_ref().ok_or_else(not_set_up)
    }

    pub fn setup(
        &mut self,
        X: ArrayView2<F>,
        y: ArrayView2<F>,
        loss: &LossConfig,
        penalty: &PenaltyConfig<F>,
        fit_intercept: bool,
        sample_weight: Option<ArrayView1<F>>,
    ) -> Result<()> {
        let mut base = penalty.base_convex()?;
        base.apply(PenaltyUpdate::PenVal(F::one()))?;
        let mut solver = self.template.clone();
        solver.setup(X, y, loss, &base, fit_intercept, sample_weight)?;

        let n_features = X.ncols();
        let shape = CoefShape::new(n_features, y.ncols());
        self.problem = Some(Problem {
            solver,
            loss: Loss::new(loss, X, y, fit_intercept, sample_weight)?,
            penalty_func: composite_nonconvex(penalty, Some(shape))?,
            penalty: penalty.clone(),
            n_features,
            n_responses: y.ncols(),
            fit_intercept,
        });
        Ok(())
    }

    /// Updates the strength or the shape parameter of the non-convex
    /// penalty. The weights of the convex subproblem are owned by the LLA
    /// loop and cannot be set here.
    pub fn update_penalty(&mut self, update: PenaltyUpdate<F>) -> Result<()> {
        if let PenaltyUpdate::Weights(_) = update {
            return Err(GlmError::Configuration(
                "the weights of a non-convex penalty are set by the LLA loop".to_string(),
            ));
        }
        let problem = self.problem.as_mut().ok_or_else(not_set_up)?;
        let mut penalty = problem.penalty.clone();
        penalty.apply(update)?;
        let shape = CoefShape::new(problem.n_features, problem.n_responses);
        problem.penalty_func = composite_nonconvex(&penalty, Some(shape))?;
        problem.penalty = penalty;
        Ok(())
    }

    /// The non-convex penalty used to evaluate the objective.
    pub fn penalty_func(&self) -> Result<&CompositeNonConvex<F>> {
        Ok(&self.problem()?.penalty_func)
    }

    pub fn penalty(&self) -> Result<&PenaltyConfig<F>> {
        Ok(&self.problem()?.penalty)
    }

    /// Shape of the coefficient, without the intercept row.
    pub fn coef_dim(&self) -> Result<(usize, usize)> {
        let problem = self.problem()?;
        Ok((problem.n_features, problem.n_responses))
    }

    pub fn fit_intercept(&self) -> Result<bool> {
        Ok(self.problem()?.fit_intercept)
    }
}

fn not_set_up() -> GlmError {
    GlmError::NotApplicable("the weighted subproblem must be set up before use".to_string())
}

impl<F: Float, S: GlmSolver<F>> WeightedProblemSolver<F> for WeightedGlmProblemSolver<F, S> {
    type OtherData = S::OtherData;

    fn solve(
        &mut self,
        weights: Array1<F>,
        sp_init: Option<ArrayView2<F>>,
        sp_upv_init: Option<ArrayView1<F>>,
        sp_other_data: Option<S::OtherData>,
    ) -> Result<(Solution<F>, Option<S::OtherData>)> {
        let problem = self.problem.as_mut().ok_or_else(not_set_up)?;
        problem
            .solver
            .update_penalty(PenaltyUpdate::Weights(weights))?;
        let (solution, other_data, _) = problem
            .solver
            .solve(sp_init, sp_upv_init, sp_other_data)?;
        Ok((solution, other_data))
    }

    /// Both terms are evaluated on the coefficient stacked under its
    /// intercept, a missing intercept counting as zero.
    fn eval_objective(
        &self,
        value: ArrayView2<F>,
        upv: Option<ArrayView1<F>>,
    ) -> Result<Objective<F>> {
        let problem = self.problem()?;
        let upv: Option<Array1<F>> = match (problem.fit_intercept, upv) {
            (true, Some(b)) => Some(b.to_owned()),
            (true, None) => Some(Array1::zeros(value.ncols())),
            (false, _) => None,
        };
        let z = stack_intercept(upv.as_ref().map(|b| b.view()), value);
        let penalty = wrap_intercept(Box::new(problem.penalty_func.clone()), problem.fit_intercept);
        let base_loss = problem.loss.value(z.view());
        let pen_loss = penalty.value(z.view());
        Ok(Objective {
            total: base_loss + pen_loss,
            base_loss,
            pen_loss,
        })
    }
}
