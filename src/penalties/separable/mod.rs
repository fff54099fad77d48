use ndarray::{Array1, Array2, ArrayView2};

use super::{map_weighted, max_weight, sum_weighted};
use crate::error::{GlmError, Result};
use crate::func::Func;
use crate::helpers::prox::soft_thresholding;
use crate::Float;


/// The Ridge penalty
///
/// pen(x) = 0.5 * pen_val * sum_i w_i * x_i^2
///
/// The weights follow the row-major order of the coefficient entries.
#[derive(Debug, Clone, PartialEq)]
pub struct Ridge<F: Float> {
    pen_val: F,
    weights: Option<Array1<F>>,
}

impl<F: Float> Ridge<F> {
    /// Instantiates a Ridge penalty with a positive regularization
    /// hyperparameter and optional entrywise weights.
    pub fn new(pen_val: F, weights: Option<Array1<F>>) -> Self {
        Ridge { pen_val, weights }
    }

    pub fn pen_val(&self) -> F {
        self.pen_val
    }

    pub fn weights(&self) -> Option<&Array1<F>> {
        self.weights.as_ref()
    }
}

impl<F: Float> Func<F> for Ridge<F> {
    fn name(&self) -> &'static str {
        "Ridge"
    }

    fn value(&self, x: ArrayView2<F>) -> F {
        F::cast(0.5) * self.pen_val * sum_weighted(x, self.weights.as_ref(), |xi| xi * xi)
    }

    fn grad(&self, x: ArrayView2<F>) -> Result<Array2<F>> {
        map_weighted(x, self.weights.as_ref(), |xi, wi| {
            self.pen_val * wi * xi
        })
    }

    /// prox(x, step) = x / (1 + step * pen_val * w)
    fn prox(&self, x: ArrayView2<F>, step: F) -> Result<Array2<F>> {
        map_weighted(x, self.weights.as_ref(), |xi, wi| {
            xi / (F::one() + step * self.pen_val * wi)
        })
    }

    fn is_smooth(&self) -> bool {
        true
    }

    fn has_prox(&self) -> bool {
        true
    }

    fn grad_lip(&self) -> Option<F> {
        Some(self.pen_val * max_weight(self.weights.as_ref()))
    }
}

/// The L1 penalty
///
/// A widely-used penalty made popular by the LASSO model. It yields sparse
/// solutions.
///
/// pen(x) = pen_val * sum_i w_i * |x_i|
#[derive(Debug, Clone, PartialEq)]
pub struct Lasso<F: Float> {
    pen_val: F,
    weights: Option<Array1<F>>,
}

impl<F: Float> Lasso<F> {
    /// Instantiates a Lasso penalty with a positive regularization
    /// hyperparameter and optional entrywise weights.
    pub fn new(pen_val: F, weights: Option<Array1<F>>) -> Self {
        Lasso { pen_val, weights }
    }

    pub fn pen_val(&self) -> F {
        self.pen_val
    }

    pub fn weights(&self) -> Option<&Array1<F>> {
        self.weights.as_ref()
    }
}

impl<F: Float> Func<F> for Lasso<F> {
    fn name(&self) -> &'static str {
        "Lasso"
    }

    fn value(&self, x: ArrayView2<F>) -> F {
        self.pen_val * sum_weighted(x, self.weights.as_ref(), |xi| xi.abs())
    }

    /// Applies the soft-thresholding operator entrywise
    fn prox(&self, x: ArrayView2<F>, step: F) -> Result<Array2<F>> {
        map_weighted(x, self.weights.as_ref(), |xi, wi| {
            soft_thresholding(xi, step * self.pen_val * wi)
        })
    }

    fn is_smooth(&self) -> bool {
        false
    }

    fn has_prox(&self) -> bool {
        true
    }
}

/// The L1 + L2 penalty
///
/// A convex penalty used by the Elastic Net model. It is a combination of a
/// weighted Lasso and a weighted Ridge penalty:
///
/// pen(x) = pen_val * mix_val * sum_i w1_i * |x_i|
///          + 0.5 * pen_val * (1 - mix_val) * sum_i w2_i * x_i^2
///
/// It is smooth when the lasso part vanishes.
#[derive(Debug, Clone, PartialEq)]
pub struct ElasticNet<F: Float> {
    lasso: Lasso<F>,
    ridge: Ridge<F>,
}

impl<F: Float> ElasticNet<F> {
    /// Instantiates an Elastic Net penalty with a positive regularization
    /// hyperparameter and a mixing hyperparameter between 0 and 1 that weights
    /// the amount of L1 and L2 regularizations.
    pub fn new(
        pen_val: F,
        mix_val: F,
        lasso_weights: Option<Array1<F>>,
        ridge_weights: Option<Array1<F>>,
    ) -> Self {
        ElasticNet {
            lasso: Lasso::new(pen_val * mix_val, lasso_weights),
            ridge: Ridge::new(pen_val * (F::one() - mix_val), ridge_weights),
        }
    }

    pub fn lasso(&self) -> &Lasso<F> {
        &self.lasso
    }

    pub fn ridge(&self) -> &Ridge<F> {
        &self.ridge
    }
}

impl<F: Float> Func<F> for ElasticNet<F> {
    fn name(&self) -> &'static str {
        "ElasticNet"
    }

    fn value(&self, x: ArrayView2<F>) -> F {
        self.lasso.value(x) + self.ridge.value(x)
    }

    fn grad(&self, x: ArrayView2<F>) -> Result<Array2<F>> {
        if !self.is_smooth() {
            return Err(GlmError::NotApplicable(
                "ElasticNet with a lasso part is not smooth and has no gradient".to_string(),
            ));
        }
        self.ridge.grad(x)
    }

    /// Both parts are separable, so the proximal operator is computed
    /// entrywise with each entry's own weights
    ///
    /// prox(x, step) = soft(x, step * l1 * w1) / (1 + step * l2 * w2)
    fn prox(&self, x: ArrayView2<F>, step: F) -> Result<Array2<F>> {
        let soft = self.lasso.prox(x, step)?;
        self.ridge.prox(soft.view(), step)
    }

    fn is_smooth(&self) -> bool {
        self.lasso.pen_val() == F::zero()
    }

    fn has_prox(&self) -> bool {
        true
    }

    fn grad_lip(&self) -> Option<F> {
        if self.is_smooth() {
            self.ridge.grad_lip()
        } else {
            None
        }
    }
}
