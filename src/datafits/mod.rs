use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use super::Float;
use crate::error::{GlmError, Result};
use crate::func::Func;
use crate::helpers::helpers::{log1pexp, sigmoid};
use crate::helpers::linalg::leading_sval;


/// The data-fit losses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossConfig {
    /// Squared residuals, one or several responses
    LeastSquares,
    /// Binary cross-entropy, a single response in {0, 1}
    Logistic,
}

/// Design matrix shared by the losses, with a leading column of ones when an
/// intercept is fitted and normalized sample weights summing to one.
#[derive(Debug, Clone, PartialEq)]
struct WeightedDesign<F: Float> {
    X: Array2<F>,
    y: Array2<F>,
    sample_weight: Array1<F>,
    sq_sval: F,
}

impl<F: Float> WeightedDesign<F> {
    fn new(
        X: ArrayView2<F>,
        y: ArrayView2<F>,
        fit_intercept: bool,
        sample_weight: Option<ArrayView1<F>>,
    ) -> Result<Self> {
        let n_samples = X.nrows();
        if n_samples == 0 {
            return Err(GlmError::Configuration("the design matrix is empty".to_string()));
        }
        if y.nrows() != n_samples {
            return Err(GlmError::Configuration(format!(
                "{} targets for {} samples",
                y.nrows(),
                n_samples
            )));
        }

        let sample_weight = match sample_weight {
            Some(sw) => {
                if sw.len() != n_samples {
                    return Err(GlmError::Configuration(format!(
                        "{} sample weights for {} samples",
                        sw.len(),
                        n_samples
                    )));
                }
                if sw.iter().any(|&w| !(w >= F::zero()) || !w.is_finite()) {
                    return Err(GlmError::Configuration(
                        "sample weights must be finite and non-negative".to_string(),
                    ));
                }
                let total = sw.sum();
                if total <= F::zero() {
                    return Err(GlmError::Configuration(
                        "sample weights sum to zero".to_string(),
                    ));
                }
                sw.mapv(|w| w / total)
            }
            None => Array1::from_elem(n_samples, F::one() / F::cast(n_samples)),
        };

        let X = if fit_intercept {
            let mut augmented = Array2::<F>::ones((n_samples, X.ncols() + 1));
            augmented.slice_mut(ndarray::s![.., 1..]).assign(&X);
            augmented
        } else {
            X.to_owned()
        };

        let scaled = &X * &sample_weight.mapv(|w| w.sqrt()).insert_axis(Axis(1));
        let sval = leading_sval(scaled.view());

        Ok(WeightedDesign {
            X,
            y: y.to_owned(),
            sample_weight,
            sq_sval: sval * sval,
        })
    }

    /// Applies the sample weights to every row of `r`.
    fn weigh_rows(&self, r: Array2<F>) -> Array2<F> {
        r * &self.sample_weight.view().insert_axis(Axis(1))
    }
}

/// Quadratic datafit
///
/// The squared-norm residuals datafit used in most regression settings
///
/// f(z) = 0.5 * sum_i s_i * ||y_i - X_i z||_2^2
///
/// where the sample weights `s` sum to one, so that unweighted data gives
/// the usual 1 / (2 n_samples) scaling.
#[derive(Debug, Clone, PartialEq)]
pub struct Quadratic<F: Float> {
    design: WeightedDesign<F>,
}

impl<F: Float> Quadratic<F> {
    pub fn new(
        X: ArrayView2<F>,
        y: ArrayView2<F>,
        fit_intercept: bool,
        sample_weight: Option<ArrayView1<F>>,
    ) -> Result<Self> {
        Ok(Quadratic {
            design: WeightedDesign::new(X, y, fit_intercept, sample_weight)?,
        })
    }

    fn residuals(&self, z: ArrayView2<F>) -> Array2<F> {
        &self.design.y - &self.design.X.dot(&z)
    }
}

impl<F: Float> Func<F> for Quadratic<F> {
    fn name(&self) -> &'static str {
        "Quadratic"
    }

    fn value(&self, z: ArrayView2<F>) -> F {
        let r = self.residuals(z);
        let sq_norms = r.map_axis(Axis(1), |ri| ri.dot(&ri));
        F::cast(0.5) * sq_norms.dot(&self.design.sample_weight)
    }

    fn grad(&self, z: ArrayView2<F>) -> Result<Array2<F>> {
        let r = self.design.weigh_rows(self.residuals(z));
        Ok(-self.design.X.t().dot(&r))
    }

    fn is_smooth(&self) -> bool {
        true
    }

    fn has_prox(&self) -> bool {
        false
    }

    fn grad_lip(&self) -> Option<F> {
        Some(self.design.sq_sval)
    }
}

/// Logistic datafit
///
/// The logistic datafit used in classification tasks
///
/// f(z) = sum_i s_i * (log(1 + exp(X_i z)) - y_i * X_i z)
///
/// with targets in {0, 1} and sample weights summing to one.
#[derive(Debug, Clone, PartialEq)]
pub struct Logistic<F: Float> {
    design: WeightedDesign<F>,
}

impl<F: Float> Logistic<F> {
    pub fn new(
        X: ArrayView2<F>,
        y: ArrayView2<F>,
        fit_intercept: bool,
        sample_weight: Option<ArrayView1<F>>,
    ) -> Result<Self> {
        if y.ncols() != 1 {
            return Err(GlmError::Configuration(format!(
                "the logistic loss takes a single response, got {}",
                y.ncols()
            )));
        }
        if y.iter().any(|&yi| yi != F::zero() && yi != F::one()) {
            return Err(GlmError::Configuration(
                "logistic targets must be 0 or 1".to_string(),
            ));
        }
        Ok(Logistic {
            design: WeightedDesign::new(X, y, fit_intercept, sample_weight)?,
        })
    }
}

impl<F: Float> Func<F> for Logistic<F> {
    fn name(&self) -> &'static str {
        "Logistic"
    }

    fn value(&self, z: ArrayView2<F>) -> F {
        let eta = self.design.X.dot(&z);
        eta.iter()
            .zip(self.design.y.iter())
            .zip(self.design.sample_weight.iter())
            .map(|((&e, &yi), &s)| s * (log1pexp(e) - yi * e))
            .sum()
    }

    fn grad(&self, z: ArrayView2<F>) -> Result<Array2<F>> {
        let eta = self.design.X.dot(&z);
        let r = eta.mapv(|e| sigmoid(e)) - &self.design.y;
        Ok(self.design.X.t().dot(&self.design.weigh_rows(r)))
    }

    fn is_smooth(&self) -> bool {
        true
    }

    fn has_prox(&self) -> bool {
        false
    }

    fn grad_lip(&self) -> Option<F> {
        Some(F::cast(0.25) * self.design.sq_sval)
    }
}

/// A loss built from a [`LossConfig`].
#[derive(Debug, Clone, PartialEq)]
pub enum Loss<F: Float> {
    Quadratic(Quadratic<F>),
    Logistic(Logistic<F>),
}

impl<F: Float> Loss<F> {
    /// Builds the loss of the data, over the coefficient stacked under the
    /// intercept row when `fit_intercept` is set.
    pub fn new(
        loss: &LossConfig,
        X: ArrayView2<F>,
        y: ArrayView2<F>,
        fit_intercept: bool,
        sample_weight: Option<ArrayView1<F>>,
    ) -> Result<Self> {
        Ok(match loss {
            LossConfig::LeastSquares => {
                Loss::Quadratic(Quadratic::new(X, y, fit_intercept, sample_weight)?)
            }
            LossConfig::Logistic => {
                Loss::Logistic(Logistic::new(X, y, fit_intercept, sample_weight)?)
            }
        })
    }

    fn inner(&self) -> &dyn Func<F> {
        match self {
            Loss::Quadratic(df) => df,
            Loss::Logistic(df) => df,
        }
    }
}

impl<F: Float> Func<F> for Loss<F> {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn value(&self, z: ArrayView2<F>) -> F {
        self.inner().value(z)
    }

    fn grad(&self, z: ArrayView2<F>) -> Result<Array2<F>> {
        self.inner().grad(z)
    }

    fn is_smooth(&self) -> bool {
        true
    }

    fn has_prox(&self) -> bool {
        false
    }

    fn grad_lip(&self) -> Option<F> {
        self.inner().grad_lip()
    }
}
