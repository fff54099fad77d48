use ndarray::{Array1, Array2, ArrayView2};

use super::{check_length, weight_at, weights_match, Lasso};
use crate::error::{GlmError, Result};
use crate::func::Func;
use crate::helpers::linalg::{leading_sval, singular_values, svd};
use crate::Float;


/// The generalized Ridge penalty
///
/// pen(x) = 0.5 * pen_val * ||M x||_F^2
///
/// Without a matrix it reduces to the plain Ridge penalty.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneralizedRidge<F: Float> {
    pen_val: F,
    gram: Option<Array2<F>>,
    grad_lip: F,
}

impl<F: Float> GeneralizedRidge<F> {
    pub fn new(pen_val: F, mat: Option<Array2<F>>) -> Self {
        match mat {
            Some(mat) => {
                let sval = leading_sval(mat.view());
                GeneralizedRidge {
                    pen_val,
                    gram: Some(mat.t().dot(&mat)),
                    grad_lip: pen_val * sval * sval,
                }
            }
            None => GeneralizedRidge {
                pen_val,
                gram: None,
                grad_lip: pen_val,
            },
        }
    }
}

impl<F: Float> Func<F> for GeneralizedRidge<F> {
    fn name(&self) -> &'static str {
        "GeneralizedRidge"
    }

    /// Computes 0.5 * pen_val * <x, M^T M x>
    fn value(&self, x: ArrayView2<F>) -> F {
        let quad = match &self.gram {
            Some(gram) => (&x * &gram.dot(&x)).sum(),
            None => (&x * &x).sum(),
        };
        F::cast(0.5) * self.pen_val * quad
    }

    fn grad(&self, x: ArrayView2<F>) -> Result<Array2<F>> {
        Ok(match &self.gram {
            Some(gram) => gram.dot(&x) * self.pen_val,
            None => x.to_owned() * self.pen_val,
        })
    }

    /// Only the plain Ridge case, without a matrix, has a closed form
    fn prox(&self, x: ArrayView2<F>, step: F) -> Result<Array2<F>> {
        match &self.gram {
            Some(_) => Err(GlmError::NotApplicable(
                "GeneralizedRidge with a matrix does not expose a proximal operator".to_string(),
            )),
            None => Ok(x.mapv(|xi| xi / (F::one() + step * self.pen_val))),
        }
    }

    fn is_smooth(&self) -> bool {
        true
    }

    fn has_prox(&self) -> bool {
        self.gram.is_none()
    }

    fn grad_lip(&self) -> Option<F> {
        Some(self.grad_lip)
    }
}

/// The generalized Lasso penalty
///
/// pen(x) = pen_val * sum_i w_i * |(M x)_i|
///
/// Its proximal operator has no closed form unless `M` is the identity, which
/// is what a missing matrix stands for.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneralizedLasso<F: Float> {
    mat: Option<Array2<F>>,
    lasso: Lasso<F>,
}

impl<F: Float> GeneralizedLasso<F> {
    pub fn new(pen_val: F, mat: Option<Array2<F>>, weights: Option<Array1<F>>) -> Self {
        GeneralizedLasso {
            mat,
            lasso: Lasso::new(pen_val, weights),
        }
    }

    pub fn mat(&self) -> Option<&Array2<F>> {
        self.mat.as_ref()
    }
}

impl<F: Float> Func<F> for GeneralizedLasso<F> {
    fn name(&self) -> &'static str {
        "GeneralizedLasso"
    }

    fn value(&self, x: ArrayView2<F>) -> F {
        match &self.mat {
            Some(mat) => self.lasso.value(mat.dot(&x).view()),
            None => self.lasso.value(x),
        }
    }

    fn prox(&self, x: ArrayView2<F>, step: F) -> Result<Array2<F>> {
        match &self.mat {
            Some(_) => Err(GlmError::NotApplicable(
                "GeneralizedLasso with a matrix does not expose a proximal operator".to_string(),
            )),
            None => self.lasso.prox(x, step),
        }
    }

    fn is_smooth(&self) -> bool {
        false
    }

    fn has_prox(&self) -> bool {
        self.mat.is_none()
    }
}

/// The nuclear norm penalty
///
/// pen(x) = pen_val * sum_i w_i * sigma_i(x)
///
/// where the singular values are sorted in decreasing order.
#[derive(Debug, Clone, PartialEq)]
pub struct NuclearNorm<F: Float> {
    pen_val: F,
    weights: Option<Array1<F>>,
}

impl<F: Float> NuclearNorm<F> {
    pub fn new(pen_val: F, weights: Option<Array1<F>>) -> Self {
        NuclearNorm { pen_val, weights }
    }
}

impl<F: Float> Func<F> for NuclearNorm<F> {
    fn name(&self) -> &'static str {
        "NuclearNorm"
    }

    fn value(&self, x: ArrayView2<F>) -> F {
        if !weights_match(self.weights.as_ref(), x.nrows().min(x.ncols())) {
            return F::nan();
        }
        let svals: F = singular_values(x)
            .iter()
            .enumerate()
            .map(|(i, &s)| weight_at(self.weights.as_ref(), i) * s)
            .sum();
        self.pen_val * svals
    }

    /// Soft-thresholds the singular values
    fn prox(&self, x: ArrayView2<F>, step: F) -> Result<Array2<F>> {
        let rank = x.nrows().min(x.ncols());
        check_length(self.weights.as_ref().map(|w| w.view()), rank, "singular value")?;
        if step == F::zero() || self.pen_val == F::zero() || x.is_empty() {
            return Ok(x.to_owned());
        }
        let (mut U, s, Vt) = svd(x)?;
        for (i, mut col) in U.columns_mut().into_iter().enumerate() {
            let threshold = step * self.pen_val * weight_at(self.weights.as_ref(), i);
            col *= F::max(s[i] - threshold, F::zero());
        }
        Ok(U.dot(&Vt))
    }

    fn is_smooth(&self) -> bool {
        false
    }

    fn has_prox(&self) -> bool {
        true
    }
}
