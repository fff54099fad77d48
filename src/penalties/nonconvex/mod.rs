use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::config::Groups;
use crate::error::{GlmError, Result};
use crate::func::Func;
use crate::helpers::linalg::{singular_values, svd};
use crate::Float;

#[cfg(test)]
mod tests;

/// The non-convex scalar penalties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonConvexKind {
    /// Smoothly Clipped Absolute Deviation, shape parameter `a > 1`
    Scad,
    /// Minimax Concave Penalty, shape parameter `gamma > 0`
    Mcp,
    /// Log penalty, shape parameter `epsilon > 0`
    Log,
}

impl NonConvexKind {
    pub fn default_second_param<F: Float>(&self) -> F {
        match self {
            NonConvexKind::Scad => F::cast(3.7),
            NonConvexKind::Mcp => F::cast(3.),
            NonConvexKind::Log => F::one(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            NonConvexKind::Scad => "SCAD",
            NonConvexKind::Mcp => "MCP",
            NonConvexKind::Log => "Log",
        }
    }
}

/// A non-convex penalty applied to non-negative inputs
///
/// pen(t) = sum_i p(t_i)
///
/// where `p` is concave and non-decreasing on `[0, inf)`. The inputs are the
/// magnitudes produced by a [`NonSmoothTransform`].
#[derive(Debug, Clone, PartialEq)]
pub struct NonConvexFunc<F: Float> {
    kind: NonConvexKind,
    pen_val: F,
    second_param: F,
}

impl<F: Float> NonConvexFunc<F> {
    /// Instantiates a non-convex penalty, the shape parameter falls back to
    /// the kind's default.
    pub fn new(kind: NonConvexKind, pen_val: F, second_param: Option<F>) -> Result<Self> {
        let second_param = second_param.unwrap_or_else(|| kind.default_second_param());
        if !(pen_val >= F::zero()) {
            return Err(GlmError::Configuration(format!(
                "penalty value must be non-negative, got {}",
                pen_val
            )));
        }
        let valid = match kind {
            NonConvexKind::Scad => second_param > F::one(),
            NonConvexKind::Mcp | NonConvexKind::Log => second_param > F::zero(),
        };
        if !valid {
            return Err(GlmError::Configuration(format!(
                "invalid shape parameter {} for the {} penalty",
                second_param,
                kind.name()
            )));
        }
        Ok(NonConvexFunc {
            kind,
            pen_val,
            second_param,
        })
    }

    pub fn kind(&self) -> NonConvexKind {
        self.kind
    }

    pub fn pen_val(&self) -> F {
        self.pen_val
    }

    pub fn second_param(&self) -> F {
        self.second_param
    }

    /// Evaluates the scalar penalty at `t >= 0`
    ///
    /// SCAD: pen_val * t                                       if t <= pen_val
    ///       (2 a pen_val t - t^2 - pen_val^2) / (2 (a - 1))   if pen_val < t <= a pen_val
    ///       pen_val^2 (a + 1) / 2                             otherwise
    ///
    /// MCP:  pen_val * t - t^2 / (2 gamma)                     if t <= gamma pen_val
    ///       gamma pen_val^2 / 2                               otherwise
    ///
    /// Log:  pen_val * log(1 + t / epsilon)
    pub fn scalar_value(&self, t: F) -> F {
        let lambda = self.pen_val;
        let two = F::cast(2.);
        match self.kind {
            NonConvexKind::Scad => {
                let a = self.second_param;
                if t <= lambda {
                    lambda * t
                } else if t <= a * lambda {
                    (two * a * lambda * t - t * t - lambda * lambda) / (two * (a - F::one()))
                } else {
                    lambda * lambda * (a + F::one()) / two
                }
            }
            NonConvexKind::Mcp => {
                let gamma = self.second_param;
                if t <= gamma * lambda {
                    lambda * t - t * t / (two * gamma)
                } else {
                    gamma * lambda * lambda / two
                }
            }
            NonConvexKind::Log => lambda * (t / self.second_param).ln_1p(),
        }
    }

    /// Derivative of the scalar penalty at `t >= 0`, the LLA weight
    pub fn scalar_grad(&self, t: F) -> F {
        let lambda = self.pen_val;
        match self.kind {
            NonConvexKind::Scad => {
                let a = self.second_param;
                if t <= lambda {
                    lambda
                } else if t <= a * lambda {
                    (a * lambda - t) / (a - F::one())
                } else {
                    F::zero()
                }
            }
            NonConvexKind::Mcp => F::max(lambda - t / self.second_param, F::zero()),
            NonConvexKind::Log => lambda / (self.second_param + t),
        }
    }

    /// Whether [`NonConvexFunc::scalar_prox`] has a closed form for `step`.
    pub fn has_prox(&self, step: F) -> bool {
        match self.kind {
            NonConvexKind::Scad => self.second_param - F::one() > step,
            NonConvexKind::Mcp => true,
            NonConvexKind::Log => false,
        }
    }

    /// Proximal operator of the scalar penalty at `t >= 0`
    ///
    /// MCP:  0                                         if t <= step pen_val
    ///       t                                         if t > gamma pen_val
    ///       (t - step pen_val) / (1 - step / gamma)   otherwise
    ///
    /// When `gamma <= step` the problem has no interior solution and the
    /// operator hard-thresholds at pen_val * sqrt(step gamma).
    ///
    /// SCAD: max(t - step pen_val, 0)                  if t <= (1 + step) pen_val
    ///       ((a - 1) t - step a pen_val)
    ///       / (a - 1 - step)                          if t <= a pen_val
    ///       t                                         otherwise
    pub fn scalar_prox(&self, t: F, step: F) -> Result<F> {
        let lambda = self.pen_val;
        match self.kind {
            NonConvexKind::Mcp => {
                let gamma = self.second_param;
                if gamma <= step {
                    let threshold = lambda * (step * gamma).sqrt();
                    return Ok(if t > threshold { t } else { F::zero() });
                }
                if t <= step * lambda {
                    Ok(F::zero())
                } else if t > gamma * lambda {
                    Ok(t)
                } else {
                    Ok((t - step * lambda) / (F::one() - step / gamma))
                }
            }
            NonConvexKind::Scad => {
                let a = self.second_param;
                if !self.has_prox(step) {
                    return Err(GlmError::NotApplicable(format!(
                        "SCAD proximal operator needs a - 1 > step, got a = {} and step = {}",
                        a, step
                    )));
                }
                if t <= (F::one() + step) * lambda {
                    Ok(F::max(t - step * lambda, F::zero()))
                } else if t <= a * lambda {
                    Ok(((a - F::one()) * t - step * a * lambda) / (a - F::one() - step))
                } else {
                    Ok(t)
                }
            }
            NonConvexKind::Log => Err(GlmError::NotApplicable(
                "the Log penalty does not expose a proximal operator".to_string(),
            )),
        }
    }

    /// Sum of the scalar penalty over non-negative inputs
    pub fn value(&self, t: ArrayView1<F>) -> F {
        t.iter().map(|&ti| self.scalar_value(ti)).sum()
    }

    /// Derivatives at every non-negative input
    pub fn grad(&self, t: ArrayView1<F>) -> Array1<F> {
        t.mapv(|ti| self.scalar_grad(ti))
    }
}

/// The map from the coefficient to the non-negative magnitudes a non-convex
/// penalty is applied to.
#[derive(Debug, Clone, PartialEq)]
pub enum NonSmoothTransform<F: Float> {
    /// Absolute values of the entries, in row-major order
    Entrywise,
    /// Euclidean norms of the row groups
    GroupNorms(Groups),
    /// Euclidean norms of the rows
    RowNorms,
    /// Singular values in decreasing order
    SingularValues,
    /// Absolute values of the entries of `M x`, in row-major order
    Linear(Array2<F>),
}

impl<F: Float> NonSmoothTransform<F> {
    pub fn apply(&self, x: ArrayView2<F>) -> Array1<F> {
        match self {
            NonSmoothTransform::Entrywise => x.iter().map(|xi| xi.abs()).collect(),
            NonSmoothTransform::GroupNorms(groups) => groups
                .resolve(x.nrows())
                .iter()
                .map(|rows| {
                    rows.iter()
                        .map(|&r| x.row(r).dot(&x.row(r)))
                        .fold(F::zero(), |acc, sq| acc + sq)
                        .sqrt()
                })
                .collect(),
            NonSmoothTransform::RowNorms => x.map_axis(Axis(1), |row| row.dot(&row).sqrt()),
            NonSmoothTransform::SingularValues => singular_values(x),
            NonSmoothTransform::Linear(mat) => mat.dot(&x).iter().map(|xi| xi.abs()).collect(),
        }
    }
}

/// A non-convex penalty composed with a norm-like transform
///
/// pen(x) = sum_i p(transform(x)_i)
///
/// The proximal operator is available for every transform but the linear
/// one: the magnitudes are replaced by their scalar proximal image and the
/// directions are kept.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeNonConvex<F: Float> {
    func: NonConvexFunc<F>,
    transform: NonSmoothTransform<F>,
}

impl<F: Float> CompositeNonConvex<F> {
    pub fn new(func: NonConvexFunc<F>, transform: NonSmoothTransform<F>) -> Self {
        CompositeNonConvex { func, transform }
    }

    pub fn func(&self) -> &NonConvexFunc<F> {
        &self.func
    }

    pub fn transform(&self) -> &NonSmoothTransform<F> {
        &self.transform
    }

    /// Rescales a block of norm `norm` to the proximal image of its norm.
    fn shrink_factor(&self, norm: F, step: F) -> Result<F> {
        if norm == F::zero() {
            return Ok(F::zero());
        }
        Ok(self.func.scalar_prox(norm, step)? / norm)
    }
}

impl<F: Float> Func<F> for CompositeNonConvex<F> {
    fn name(&self) -> &'static str {
        self.func.kind().name()
    }

    fn value(&self, x: ArrayView2<F>) -> F {
        self.func.value(self.transform.apply(x).view())
    }

    fn prox(&self, x: ArrayView2<F>, step: F) -> Result<Array2<F>> {
        if step == F::zero() || self.func.pen_val() == F::zero() {
            return Ok(x.to_owned());
        }
        match &self.transform {
            NonSmoothTransform::Entrywise => {
                let mut out = x.to_owned();
                for xi in out.iter_mut() {
                    *xi = xi.signum() * self.func.scalar_prox(xi.abs(), step)?;
                }
                Ok(out)
            }
            NonSmoothTransform::GroupNorms(groups) => {
                let mut out = x.to_owned();
                for rows in groups.resolve(x.nrows()).iter() {
                    let norm = rows
                        .iter()
                        .map(|&r| x.row(r).dot(&x.row(r)))
                        .fold(F::zero(), |acc, sq| acc + sq)
                        .sqrt();
                    let factor = self.shrink_factor(norm, step)?;
                    for &r in rows.iter() {
                        out.row_mut(r).mapv_inplace(|xi| xi * factor);
                    }
                }
                Ok(out)
            }
            NonSmoothTransform::RowNorms => {
                let mut out = x.to_owned();
                for mut row in out.axis_iter_mut(Axis(0)) {
                    let factor = self.shrink_factor(row.dot(&row).sqrt(), step)?;
                    row.mapv_inplace(|xi| xi * factor);
                }
                Ok(out)
            }
            NonSmoothTransform::SingularValues => {
                if x.is_empty() {
                    return Ok(x.to_owned());
                }
                let (mut U, s, Vt) = svd(x)?;
                for (i, mut col) in U.columns_mut().into_iter().enumerate() {
                    col *= self.func.scalar_prox(s[i], step)?;
                }
                Ok(U.dot(&Vt))
            }
            NonSmoothTransform::Linear(_) => Err(GlmError::NotApplicable(format!(
                "{} composed with a linear map does not expose a proximal operator",
                self.name()
            ))),
        }
    }

    fn is_smooth(&self) -> bool {
        false
    }

    fn has_prox(&self) -> bool {
        !matches!(self.transform, NonSmoothTransform::Linear(_))
            && self.func.kind() != NonConvexKind::Log
    }
}
