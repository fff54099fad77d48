use ndarray::{s, Array2, ArrayView2, Axis};
use std::fmt;

use super::Float;
use crate::error::{GlmError, Result};

pub mod block_separable;

pub use block_separable::BlockSeparable;

#[cfg(test)]
mod tests;

/// The outcome of splitting a function into its smooth and non-smooth parts.
/// A missing half contributes nothing to the objective.
pub type Split<F> = (Option<Box<dyn Func<F>>>, Option<Box<dyn Func<F>>>);

/// Conversion of a boxed concrete function into a trait object. It is
/// implemented for every [`Func`] and lets default methods hand out `self`
/// as a `Box<dyn Func<F>>`.
pub trait IntoFunc<F: Float> {
    fn into_func(self: Box<Self>) -> Box<dyn Func<F>>;
}

impl<F: Float, T: Func<F> + 'static> IntoFunc<F> for T {
    fn into_func(self: Box<Self>) -> Box<dyn Func<F>> {
        self
    }
}

/// This trait is the common contract of the scalar-valued functions of a
/// coefficient matrix: losses, penalties and their combinations.
///
/// Coefficients are `(n_features, n_responses)` matrices, or
/// `(1 + n_features, n_responses)` when the leading row holds an intercept.
pub trait Func<F: Float>: IntoFunc<F> + fmt::Debug {
    /// Human readable name used in error messages.
    fn name(&self) -> &'static str;

    /// This method evaluates the function at `x`.
    fn value(&self, x: ArrayView2<F>) -> F;

    /// This method computes the gradient at `x`. It is only defined for
    /// smooth functions.
    fn grad(&self, _x: ArrayView2<F>) -> Result<Array2<F>> {
        Err(GlmError::NotApplicable(format!(
            "{} is not smooth and has no gradient",
            self.name()
        )))
    }

    /// This method computes the proximal operator
    ///
    /// prox(x, step) = argmin_z f(z) + 1 / (2 * step) * ||z - x||_2^2
    ///
    /// Functions without a closed form do not expose it, see [`Func::has_prox`].
    fn prox(&self, _x: ArrayView2<F>, _step: F) -> Result<Array2<F>> {
        Err(GlmError::NotApplicable(format!(
            "{} does not expose a proximal operator",
            self.name()
        )))
    }

    fn is_smooth(&self) -> bool;

    fn has_prox(&self) -> bool;

    /// Lipschitz constant of the gradient, present iff the function is smooth.
    fn grad_lip(&self) -> Option<F> {
        None
    }

    /// Splits the function into a smooth and a non-smooth part. Leaves go
    /// entirely to one side, composites override this.
    fn split(self: Box<Self>) -> Split<F> {
        let smooth = self.is_smooth();
        let func = self.into_func();
        if smooth {
            (Some(func), None)
        } else {
            (None, Some(func))
        }
    }
}

/// The zero function, used when no penalty is requested.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Zero;

impl<F: Float> Func<F> for Zero {
    fn name(&self) -> &'static str {
        "Zero"
    }

    fn value(&self, _x: ArrayView2<F>) -> F {
        F::zero()
    }

    fn grad(&self, x: ArrayView2<F>) -> Result<Array2<F>> {
        Ok(Array2::zeros(x.raw_dim()))
    }

    fn prox(&self, x: ArrayView2<F>, _step: F) -> Result<Array2<F>> {
        Ok(x.to_owned())
    }

    fn is_smooth(&self) -> bool {
        true
    }

    fn has_prox(&self) -> bool {
        true
    }

    fn grad_lip(&self) -> Option<F> {
        Some(F::zero())
    }
}

/// Sum of functions sharing the same domain.
///
/// The sum is smooth iff every term is smooth. Its proximal operator is only
/// available when it wraps a single term.
#[derive(Debug)]
pub struct Sum<F: Float> {
    funcs: Vec<Box<dyn Func<F>>>,
}

impl<F: Float> Sum<F> {
    pub fn new(funcs: Vec<Box<dyn Func<F>>>) -> Self {
        Sum { funcs }
    }

    pub fn funcs(&self) -> &[Box<dyn Func<F>>] {
        &self.funcs
    }
}

impl<F: Float> Func<F> for Sum<F> {
    fn name(&self) -> &'static str {
        "Sum"
    }

    fn value(&self, x: ArrayView2<F>) -> F {
        self.funcs.iter().map(|f| f.value(x)).sum()
    }

    fn grad(&self, x: ArrayView2<F>) -> Result<Array2<F>> {
        let mut grad = Array2::<F>::zeros(x.raw_dim());
        for func in self.funcs.iter() {
            grad += &func.grad(x)?;
        }
        Ok(grad)
    }

    fn prox(&self, x: ArrayView2<F>, step: F) -> Result<Array2<F>> {
        match self.funcs.as_slice() {
            [] => Ok(x.to_owned()),
            [func] => func.prox(x, step),
            _ => Err(GlmError::NotApplicable(
                "the proximal operator of a sum of several functions is not available".to_string(),
            )),
        }
    }

    fn is_smooth(&self) -> bool {
        self.funcs.iter().all(|f| f.is_smooth())
    }

    fn has_prox(&self) -> bool {
        match self.funcs.as_slice() {
            [] => true,
            [func] => func.has_prox(),
            _ => false,
        }
    }

    fn grad_lip(&self) -> Option<F> {
        self.funcs
            .iter()
            .map(|f| f.grad_lip())
            .try_fold(F::zero(), |acc, lip| lip.map(|l| acc + l))
    }

    /// Splits every term and gathers the halves, so nested sums are
    /// flattened.
    fn split(self: Box<Self>) -> Split<F> {
        let mut smooth = Vec::new();
        let mut non_smooth = Vec::new();
        for func in self.funcs {
            let (smooth_part, non_smooth_part) = func.split();
            smooth.extend(smooth_part);
            non_smooth.extend(non_smooth_part);
        }
        (collapse(smooth), collapse(non_smooth))
    }
}

/// Turns a list of terms into a single function, or nothing when empty.
fn collapse<F: Float>(mut funcs: Vec<Box<dyn Func<F>>>) -> Option<Box<dyn Func<F>>> {
    match funcs.len() {
        0 => None,
        1 => funcs.pop(),
        _ => Some(Box::new(Sum::new(funcs))),
    }
}

/// Carries an unpenalized leading row (the intercept) alongside the
/// coefficients. The wrapped function only ever sees the rows below it.
#[derive(Debug)]
pub struct WithIntercept<F: Float> {
    func: Box<dyn Func<F>>,
}

impl<F: Float> WithIntercept<F> {
    pub fn new(func: Box<dyn Func<F>>) -> Self {
        WithIntercept { func }
    }
}

impl<F: Float> Func<F> for WithIntercept<F> {
    fn name(&self) -> &'static str {
        "WithIntercept"
    }

    fn value(&self, x: ArrayView2<F>) -> F {
        self.func.value(x.slice(s![1.., ..]))
    }

    fn grad(&self, x: ArrayView2<F>) -> Result<Array2<F>> {
        let mut grad = Array2::<F>::zeros(x.raw_dim());
        grad.slice_mut(s![1.., ..])
            .assign(&self.func.grad(x.slice(s![1.., ..]))?);
        Ok(grad)
    }

    fn prox(&self, x: ArrayView2<F>, step: F) -> Result<Array2<F>> {
        let mut out = x.to_owned();
        out.slice_mut(s![1.., ..])
            .assign(&self.func.prox(x.slice(s![1.., ..]), step)?);
        Ok(out)
    }

    fn is_smooth(&self) -> bool {
        self.func.is_smooth()
    }

    fn has_prox(&self) -> bool {
        self.func.has_prox()
    }

    fn grad_lip(&self) -> Option<F> {
        self.func.grad_lip()
    }

    fn split(self: Box<Self>) -> Split<F> {
        let (smooth, non_smooth) = self.func.split();
        let wrap = |f: Box<dyn Func<F>>| -> Box<dyn Func<F>> { Box::new(WithIntercept::new(f)) };
        (smooth.map(wrap), non_smooth.map(wrap))
    }
}

/// Concatenates the intercept row on top of the coefficients, the layout
/// expected by the losses when an intercept is fitted.
pub fn stack_intercept<F: Float>(
    intercept: Option<ndarray::ArrayView1<F>>,
    coef: ArrayView2<F>,
) -> Array2<F> {
    match intercept {
        Some(b) => {
            let mut z = Array2::<F>::zeros((coef.nrows() + 1, coef.ncols()));
            z.row_mut(0).assign(&b);
            z.slice_mut(s![1.., ..]).assign(&coef);
            z
        }
        None => coef.to_owned(),
    }
}

/// Inverse of [`stack_intercept`].
pub fn unstack_intercept<F: Float>(
    z: ArrayView2<F>,
    fit_intercept: bool,
) -> (Array2<F>, Option<ndarray::Array1<F>>) {
    if fit_intercept {
        (
            z.slice(s![1.., ..]).to_owned(),
            Some(z.index_axis(Axis(0), 0).to_owned()),
        )
    } else {
        (z.to_owned(), None)
    }
}
