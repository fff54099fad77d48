use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use std::fmt::Debug;

use super::Float;
use crate::config::{PenaltyConfig, PenaltyUpdate};
use crate::datafits::LossConfig;
use crate::error::Result;

pub mod fista;

pub use fista::{FistaInfo, FistaParams, FistaSolver, FistaValidParams};

#[cfg(test)]
mod tests;

/// Coefficients returned by a solver, with the intercept when one is fitted.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution<F: Float> {
    pub coef: Array2<F>,
    pub intercept: Option<Array1<F>>,
}

/// What a solve hands back: the solution, opaque warm-start data for the
/// next solve and a solver-specific report.
pub type SolveOutput<F, D, I> = (Solution<F>, Option<D>, I);

/// This trait is the contract of solvers for penalized generalized linear
/// models.
///
/// A solver is first given the problem with [`GlmSolver::setup`], then
/// solved any number of times. Between two solves the penalty may be
/// adjusted with [`GlmSolver::update_penalty`], which is how the LLA loop
/// rebinds its weights. Cloning a solver before `setup` yields an
/// independent template.
pub trait GlmSolver<F: Float>: Clone {
    /// Warm-start data carried from one solve to the next.
    type OtherData: Clone + Debug;
    /// Report of a single solve.
    type Info: Debug;

    fn setup(
        &mut self,
        X: ArrayView2<F>,
        y: ArrayView2<F>,
        loss: &LossConfig,
        penalty: &PenaltyConfig<F>,
        fit_intercept: bool,
        sample_weight: Option<ArrayView1<F>>,
    ) -> Result<()>;

    fn update_penalty(&mut self, update: PenaltyUpdate<F>) -> Result<()>;

    fn solve(
        &mut self,
        coef_init: Option<ArrayView2<F>>,
        intercept_init: Option<ArrayView1<F>>,
        other_init: Option<Self::OtherData>,
    ) -> Result<SolveOutput<F, Self::OtherData, Self::Info>>;
}
