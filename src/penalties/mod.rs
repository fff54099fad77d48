use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use super::Float;
use crate::error::{GlmError, Result};
use crate::func::Func;

pub mod block_separable;
pub mod nonconvex;
pub mod separable;
pub mod structured;

pub use block_separable::{
    ExclusiveGroupLasso, GroupElasticNet, GroupLasso, MultiTaskElasticNet, MultiTaskLasso,
    SparseGroupLasso,
};
pub use nonconvex::{CompositeNonConvex, NonConvexFunc, NonConvexKind, NonSmoothTransform};
pub use separable::{ElasticNet, Lasso, Ridge};
pub use structured::{GeneralizedLasso, GeneralizedRidge, NuclearNorm};


/// Maps every entry of `x` with its weight, taken in row-major order. A
/// missing weight vector stands for unit weights. Fails when the weights do
/// not have one entry per coefficient.
pub(crate) fn map_weighted<F, M>(
    x: ArrayView2<F>,
    weights: Option<&Array1<F>>,
    f: M,
) -> Result<Array2<F>>
where
    F: Float,
    M: Fn(F, F) -> F,
{
    match weights {
        Some(w) => {
            check_length(Some(w.view()), x.len(), "entrywise")?;
            let data = x.iter().zip(w.iter()).map(|(&xi, &wi)| f(xi, wi)).collect();
            Array2::from_shape_vec(x.raw_dim(), data)
                .map_err(|err| GlmError::Configuration(err.to_string()))
        }
        None => Ok(x.mapv(|xi| f(xi, F::one()))),
    }
}

/// Weighted sum of a function of the entries, weights in row-major order.
/// NaN when the weights do not have one entry per coefficient.
pub(crate) fn sum_weighted<F, M>(x: ArrayView2<F>, weights: Option<&Array1<F>>, f: M) -> F
where
    F: Float,
    M: Fn(F) -> F,
{
    match weights {
        Some(w) if w.len() != x.len() => F::nan(),
        Some(w) => x.iter().zip(w.iter()).map(|(&xi, &wi)| wi * f(xi)).sum(),
        None => x.iter().map(|&xi| f(xi)).sum(),
    }
}

/// Whether `weights` hold `expected` entries, always true when unweighted.
pub(crate) fn weights_match<F: Float>(weights: Option<&Array1<F>>, expected: usize) -> bool {
    weights.map_or(true, |w| w.len() == expected)
}

/// Weight of the `idx`-th group or entry, one when unweighted.
pub(crate) fn weight_at<F: Float>(weights: Option<&Array1<F>>, idx: usize) -> F {
    weights.map_or(F::one(), |w| w[idx])
}

/// Largest entry of a weight vector, one when unweighted.
pub(crate) fn max_weight<F: Float>(weights: Option<&Array1<F>>) -> F {
    weights.map_or(F::one(), |w| {
        w.fold(F::zero(), |max_val, &wi| F::max(max_val, wi))
    })
}

pub(crate) fn check_length<F: Float>(
    weights: Option<ArrayView1<F>>,
    expected: usize,
    what: &str,
) -> Result<()> {
    match weights {
        Some(w) if w.len() != expected => Err(GlmError::Configuration(format!(
            "{} weights have length {}, expected {}",
            what,
            w.len(),
            expected
        ))),
        _ => Ok(()),
    }
}

/// Elastic-net strategy shared by the group and multi-task variants
///
/// pen(x) = lasso(x) + 0.5 * ridge_val * ||x||_2^2
///
/// The lasso part is a norm, so the proximal operator is the one of the lasso
/// part shrunk by the ridge factor.
#[derive(Debug, Clone, PartialEq)]
pub struct ElasticNetLike<F: Float, L> {
    lasso: L,
    lasso_val: F,
    ridge: Ridge<F>,
}

impl<F: Float, L: Func<F>> ElasticNetLike<F, L> {
    /// Pairs a norm-like lasso part with an unweighted ridge part.
    pub fn from_parts(lasso: L, lasso_val: F, ridge: Ridge<F>) -> Result<Self> {
        if ridge.weights().is_some() {
            return Err(GlmError::Configuration(format!(
                "weighted ridge part is not supported with {}",
                lasso.name()
            )));
        }
        Ok(ElasticNetLike {
            lasso,
            lasso_val,
            ridge,
        })
    }

    pub fn lasso(&self) -> &L {
        &self.lasso
    }

    pub fn ridge(&self) -> &Ridge<F> {
        &self.ridge
    }
}

impl<F: Float, L: Func<F> + 'static> Func<F> for ElasticNetLike<F, L> {
    fn name(&self) -> &'static str {
        "ElasticNet"
    }

    fn value(&self, x: ArrayView2<F>) -> F {
        self.lasso.value(x) + self.ridge.value(x)
    }

    fn grad(&self, x: ArrayView2<F>) -> Result<Array2<F>> {
        if !self.is_smooth() {
            return Err(GlmError::NotApplicable(format!(
                "{} is not smooth and has no gradient",
                self.lasso.name()
            )));
        }
        self.ridge.grad(x)
    }

    fn prox(&self, x: ArrayView2<F>, step: F) -> Result<Array2<F>> {
        let shrink = F::one() + step * self.ridge.pen_val();
        Ok(self.lasso.prox(x, step)? / shrink)
    }

    fn is_smooth(&self) -> bool {
        self.lasso_val == F::zero()
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
