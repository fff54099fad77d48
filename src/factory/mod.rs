use ndarray::{Array1, Array2};

use super::Float;
use crate::config::{EdgeList, Groups, PenaltyConfig, PenaltyKind};
use crate::error::{GlmError, Result};
use crate::func::{BlockSeparable, Func, Split, Sum, WithIntercept, Zero};
use crate::penalties::nonconvex::{CompositeNonConvex, NonSmoothTransform};
use crate::penalties::{
    check_length, ElasticNet, ExclusiveGroupLasso, GeneralizedLasso, GeneralizedRidge,
    GroupElasticNet, GroupLasso, Lasso, MultiTaskElasticNet, MultiTaskLasso, NuclearNorm, Ridge,
    SparseGroupLasso,
};


/// Shape of the penalized coefficient, without the intercept row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoefShape {
    pub n_features: usize,
    pub n_responses: usize,
}

impl CoefShape {
    pub fn new(n_features: usize, n_responses: usize) -> Self {
        CoefShape {
            n_features,
            n_responses,
        }
    }

    fn n_entries(&self) -> usize {
        self.n_features * self.n_responses
    }
}

fn check_weights<F: Float>(
    weights: Option<&Array1<F>>,
    expected: Option<usize>,
    what: &str,
) -> Result<()> {
    if let Some(w) = weights {
        if w.iter().any(|&wi| !(wi >= F::zero()) || !wi.is_finite()) {
            return Err(GlmError::Configuration(format!(
                "{} weights must be finite and non-negative",
                what
            )));
        }
        if let Some(expected) = expected {
            check_length(Some(w.view()), expected, what)?;
        }
    }
    Ok(())
}

fn check_mix_val<F: Float>(mix_val: F) -> Result<()> {
    if !(mix_val >= F::zero() && mix_val <= F::one()) {
        return Err(GlmError::Configuration(format!(
            "mixing value must lie in [0, 1], got {}",
            mix_val
        )));
    }
    Ok(())
}

fn check_groups(groups: &Groups, shape: Option<CoefShape>) -> Result<()> {
    groups.check_disjoint()?;
    if let Some(shape) = shape {
        groups.check_bounds(shape.n_features)?;
    }
    Ok(())
}

fn check_mat<F: Float>(mat: &Array2<F>, shape: Option<CoefShape>) -> Result<()> {
    match shape {
        Some(shape) if mat.ncols() != shape.n_features => Err(GlmError::Configuration(format!(
            "transform has {} columns for {} features",
            mat.ncols(),
            shape.n_features
        ))),
        _ => Ok(()),
    }
}

fn reject_ridge_weights<F: Float>(ridge_weights: Option<&Array1<F>>, family: &str) -> Result<()> {
    if ridge_weights.is_some() {
        return Err(GlmError::Configuration(format!(
            "weighted ridge part is not supported with the {} penalty",
            family
        )));
    }
    Ok(())
}

/// Builds the function of a penalty specification
///
/// `shape` is the shape of the penalized coefficient. When known, weights and
/// groups are checked against it. The fused lasso needs it to build its
/// difference matrix.
///
/// Non-convex penalties are built as an outer non-convex function composed
/// with the norm-like transform of their convex base.
pub fn penalty_func<F: Float>(
    config: &PenaltyConfig<F>,
    shape: Option<CoefShape>,
) -> Result<Box<dyn Func<F>>> {
    if !(config.pen_val >= F::zero()) {
        return Err(GlmError::Configuration(format!(
            "penalty value must be non-negative, got {}",
            config.pen_val
        )));
    }
    if config.is_non_convex() {
        non_convex_penalty_func(config, shape)
    } else {
        convex_penalty_func(config, shape)
    }
}

fn non_convex_penalty_func<F: Float>(
    config: &PenaltyConfig<F>,
    shape: Option<CoefShape>,
) -> Result<Box<dyn Func<F>>> {
    Ok(Box::new(composite_nonconvex(config, shape)?))
}

/// Builds a non-convex penalty as its outer non-convex function composed
/// with the norm-like transform of its convex base. Fails for a convex
/// specification.
pub fn composite_nonconvex<F: Float>(
    config: &PenaltyConfig<F>,
    shape: Option<CoefShape>,
) -> Result<CompositeNonConvex<F>> {
    if config.weights().is_some() {
        return Err(GlmError::Configuration(format!(
            "weights are not supported with a non-convex {} penalty",
            config.family()
        )));
    }
    let func = config.transformed_nonconvex_penalty()?;
    let transform = config.non_smooth_transform(shape.map(|s| s.n_features))?;
    match &transform {
        NonSmoothTransform::GroupNorms(groups) => check_groups(groups, shape)?,
        NonSmoothTransform::Linear(mat) => check_mat(mat, shape)?,
        _ => {}
    }
    Ok(CompositeNonConvex::new(func, transform))
}

fn convex_penalty_func<F: Float>(
    config: &PenaltyConfig<F>,
    shape: Option<CoefShape>,
) -> Result<Box<dyn Func<F>>> {
    let pen_val = config.pen_val;
    let n_entries = shape.map(|s| s.n_entries());
    let n_features = shape.map(|s| s.n_features);

    let func: Box<dyn Func<F>> = match &config.kind {
        PenaltyKind::NoPenalty => Box::new(Zero),
        PenaltyKind::Ridge { weights } => {
            check_weights(weights.as_ref(), n_entries, "Ridge")?;
            Box::new(Ridge::new(pen_val, weights.clone()))
        }
        PenaltyKind::GeneralizedRidge { mat } => {
            if let Some(mat) = mat {
                check_mat(mat, shape)?;
            }
            Box::new(GeneralizedRidge::new(pen_val, mat.clone()))
        }
        PenaltyKind::Lasso { weights } => {
            check_weights(weights.as_ref(), n_entries, "Lasso")?;
            Box::new(Lasso::new(pen_val, weights.clone()))
        }
        PenaltyKind::GroupLasso { groups, weights } => {
            check_groups(groups, shape)?;
            check_weights(weights.as_ref(), Some(groups.n_groups()), "GroupLasso")?;
            Box::new(GroupLasso::new(pen_val, groups.clone(), weights.clone())?)
        }
        PenaltyKind::ExclusiveGroupLasso { groups, weights } => {
            check_groups(groups, shape)?;
            check_weights(weights.as_ref(), n_features, "ExclusiveGroupLasso")?;
            Box::new(ExclusiveGroupLasso::new(
                pen_val,
                groups.clone(),
                weights.clone(),
            )?)
        }
        PenaltyKind::MultiTaskLasso { weights } => {
            check_weights(weights.as_ref(), n_features, "MultiTaskLasso")?;
            Box::new(MultiTaskLasso::new(pen_val, weights.clone()))
        }
        PenaltyKind::NuclearNorm { weights } => {
            let rank = shape.map(|s| s.n_features.min(s.n_responses));
            check_weights(weights.as_ref(), rank, "NuclearNorm")?;
            Box::new(NuclearNorm::new(pen_val, weights.clone()))
        }
        PenaltyKind::FusedLasso {
            edgelist,
            order,
            weights,
        } => {
            let shape = shape.ok_or_else(|| {
                GlmError::Configuration("the fused lasso needs the number of features".to_string())
            })?;
            let mat = fused_lasso_diff_mat(edgelist, *order, shape.n_features)?;
            check_weights(
                weights.as_ref(),
                Some(mat.nrows() * shape.n_responses),
                "FusedLasso",
            )?;
            Box::new(GeneralizedLasso::new(pen_val, Some(mat), weights.clone()))
        }
        PenaltyKind::GeneralizedLasso { mat, weights } => {
            let n_outputs = match mat {
                Some(mat) => {
                    check_mat(mat, shape)?;
                    shape.map(|s| mat.nrows() * s.n_responses)
                }
                None => n_entries,
            };
            check_weights(weights.as_ref(), n_outputs, "GeneralizedLasso")?;
            Box::new(GeneralizedLasso::new(pen_val, mat.clone(), weights.clone()))
        }
        PenaltyKind::ElasticNet {
            mix_val,
            lasso_weights,
            ridge_weights,
        } => {
            check_mix_val(*mix_val)?;
            check_weights(lasso_weights.as_ref(), n_entries, "ElasticNet")?;
            check_weights(ridge_weights.as_ref(), n_entries, "ElasticNet")?;
            Box::new(ElasticNet::new(
                pen_val,
                *mix_val,
                lasso_weights.clone(),
                ridge_weights.clone(),
            ))
        }
        PenaltyKind::GroupElasticNet {
            groups,
            mix_val,
            lasso_weights,
            ridge_weights,
        } => {
            check_mix_val(*mix_val)?;
            reject_ridge_weights(ridge_weights.as_ref(), config.family())?;
            check_groups(groups, shape)?;
            check_weights(lasso_weights.as_ref(), Some(groups.n_groups()), "GroupElasticNet")?;
            Box::new(GroupElasticNet::new(
                pen_val,
                *mix_val,
                groups.clone(),
                lasso_weights.clone(),
            )?)
        }
        PenaltyKind::MultiTaskElasticNet {
            mix_val,
            lasso_weights,
            ridge_weights,
        } => {
            check_mix_val(*mix_val)?;
            reject_ridge_weights(ridge_weights.as_ref(), config.family())?;
            check_weights(lasso_weights.as_ref(), n_features, "MultiTaskElasticNet")?;
            Box::new(MultiTaskElasticNet::new(
                pen_val,
                *mix_val,
                lasso_weights.clone(),
            )?)
        }
        PenaltyKind::SparseGroupLasso {
            groups,
            mix_val,
            sparse_weights,
            group_weights,
        } => {
            check_mix_val(*mix_val)?;
            check_groups(groups, shape)?;
            check_weights(sparse_weights.as_ref(), n_entries, "SparseGroupLasso")?;
            check_weights(group_weights.as_ref(), Some(groups.n_groups()), "SparseGroupLasso")?;
            Box::new(SparseGroupLasso::new(
                pen_val,
                *mix_val,
                groups.clone(),
                sparse_weights.clone(),
                group_weights.clone(),
            )?)
        }
        PenaltyKind::SeparableSum { penalties, groups } => {
            if !penalties.keys().eq(groups.keys()) {
                return Err(GlmError::Configuration(
                    "separable sum needs exactly one group per named penalty".to_string(),
                ));
            }
            let groups_idx: Vec<Vec<usize>> = groups.values().cloned().collect();
            let groups_idx = Groups::Explicit(groups_idx);
            match shape {
                Some(shape) => groups_idx.check_partition(shape.n_features)?,
                None => groups_idx.check_disjoint()?,
            }
            let funcs = penalties
                .iter()
                .zip(groups.values())
                .map(|((_, child), rows)| {
                    let child_shape =
                        shape.map(|s| CoefShape::new(rows.len(), s.n_responses));
                    penalty_func(child, child_shape)
                })
                .collect::<Result<Vec<_>>>()?;
            Box::new(BlockSeparable::new(funcs, groups_idx)?)
        }
        PenaltyKind::OverlappingSum { penalties } => {
            let funcs = penalties
                .values()
                .map(|child| penalty_func(child, shape))
                .collect::<Result<Vec<_>>>()?;
            Box::new(Sum::new(funcs))
        }
    };
    Ok(func)
}

/// Exempts a leading intercept row from the penalty when `fit_intercept` is
/// set.
pub fn wrap_intercept<F: Float>(func: Box<dyn Func<F>>, fit_intercept: bool) -> Box<dyn Func<F>> {
    if fit_intercept {
        Box::new(WithIntercept::new(func))
    } else {
        func
    }
}

/// Splits a function into its smooth and non-smooth parts, either of which
/// may be missing.
pub fn split_smooth_and_non_smooth<F: Float>(func: Box<dyn Func<F>>) -> Split<F> {
    func.split()
}

/// First order differences of `n` consecutive nodes, a `(n - 1, n)` matrix.
fn chain_diff<F: Float>(n: usize) -> Array2<F> {
    let mut mat = Array2::<F>::zeros((n.saturating_sub(1), n));
    for i in 0..n.saturating_sub(1) {
        mat[[i, i]] = -F::one();
        mat[[i, i + 1]] = F::one();
    }
    mat
}

/// Difference matrix of the fused lasso
///
/// For a chain, row `i` of the first order matrix computes `x[i + 1] - x[i]`
/// and higher orders repeat the differencing. For a graph, each edge `(i, j)`
/// gives a row computing `x[j] - x[i]`, only first order differences are
/// supported.
pub fn fused_lasso_diff_mat<F: Float>(
    edgelist: &EdgeList,
    order: usize,
    n_nodes: usize,
) -> Result<Array2<F>> {
    if order == 0 {
        return Err(GlmError::Configuration(
            "fused lasso order must be at least 1".to_string(),
        ));
    }
    match edgelist {
        EdgeList::Chain => {
            if n_nodes <= order {
                return Err(GlmError::Configuration(format!(
                    "a chain of {} nodes has no differences of order {}",
                    n_nodes, order
                )));
            }
            let mut mat = chain_diff::<F>(n_nodes);
            for k in 1..order {
                mat = chain_diff::<F>(n_nodes - k).dot(&mat);
            }
            Ok(mat)
        }
        EdgeList::Graph(edges) => {
            if order != 1 {
                return Err(GlmError::Configuration(
                    "graph fused lasso only supports first order differences".to_string(),
                ));
            }
            let mut mat = Array2::<F>::zeros((edges.len(), n_nodes));
            for (row, &(i, j)) in edges.iter().enumerate() {
                if i >= n_nodes || j >= n_nodes || i == j {
                    return Err(GlmError::Configuration(format!(
                        "invalid edge ({}, {}) for {} nodes",
                        i, j, n_nodes
                    )));
                }
                mat[[row, i]] = -F::one();
                mat[[row, j]] = F::one();
            }
            Ok(mat)
        }
    }
}
