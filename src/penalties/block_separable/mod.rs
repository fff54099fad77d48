use ndarray::{Array1, Array2, ArrayView2, Axis};

use super::{check_length, weight_at, weights_match, ElasticNetLike, Lasso, Ridge};
use crate::config::Groups;
use crate::error::Result;
use crate::func::Func;
use crate::helpers::prox::{block_soft_thresholding, prox_squared_l1};
use crate::Float;


fn frobenius_norm<F: Float>(x: ArrayView2<F>) -> F {
    x.fold(F::zero(), |acc, &xi| acc + xi * xi).sqrt()
}

/// Writes the rows of `block` back at the positions `rows` of `out`.
fn scatter_rows<F: Float>(out: &mut Array2<F>, rows: &[usize], block: ArrayView2<F>) {
    for (k, &r) in rows.iter().enumerate() {
        out.row_mut(r).assign(&block.row(k));
    }
}

/// The Group Lasso penalty
///
/// pen(x) = pen_val * sum_g w_g * ||x[rows_g]||_F
///
/// Groups are disjoint sets of rows. Rows outside every group are left
/// unpenalized.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupLasso<F: Float> {
    pen_val: F,
    groups: Groups,
    weights: Option<Array1<F>>,
}

impl<F: Float> GroupLasso<F> {
    /// Instantiates a Group Lasso penalty with disjoint groups and optional
    /// per-group weights.
    pub fn new(pen_val: F, groups: Groups, weights: Option<Array1<F>>) -> Result<Self> {
        groups.check_disjoint()?;
        check_length(weights.as_ref().map(|w| w.view()), groups.n_groups(), "group")?;
        Ok(GroupLasso {
            pen_val,
            groups,
            weights,
        })
    }

    pub fn groups(&self) -> &Groups {
        &self.groups
    }
}

impl<F: Float> Func<F> for GroupLasso<F> {
    fn name(&self) -> &'static str {
        "GroupLasso"
    }

    fn value(&self, x: ArrayView2<F>) -> F {
        if self.groups.check_bounds(x.nrows()).is_err() {
            return F::nan();
        }
        let norms: F = self
            .groups
            .resolve(x.nrows())
            .iter()
            .enumerate()
            .map(|(g, rows)| {
                weight_at(self.weights.as_ref(), g) * frobenius_norm(x.select(Axis(0), rows).view())
            })
            .sum();
        self.pen_val * norms
    }

    /// Applies the block soft-thresholding operator to each group
    fn prox(&self, x: ArrayView2<F>, step: F) -> Result<Array2<F>> {
        self.groups.check_bounds(x.nrows())?;
        let mut out = x.to_owned();
        for (g, rows) in self.groups.resolve(x.nrows()).iter().enumerate() {
            let threshold = step * self.pen_val * weight_at(self.weights.as_ref(), g);
            let block = block_soft_thresholding(x.select(Axis(0), rows).view(), threshold);
            scatter_rows(&mut out, rows, block.view());
        }
        Ok(out)
    }

    fn is_smooth(&self) -> bool {
        false
    }

    fn has_prox(&self) -> bool {
        true
    }
}

/// The Exclusive Group Lasso penalty
///
/// pen(x) = pen_val * sum_t sum_g (sum_{i in g} w_i * |x_it|)^2
///
/// It favors one active feature per group and acts on each response column
/// separately. The weights are given per feature.
#[derive(Debug, Clone, PartialEq)]
pub struct ExclusiveGroupLasso<F: Float> {
    pen_val: F,
    groups: Groups,
    weights: Option<Array1<F>>,
}

impl<F: Float> ExclusiveGroupLasso<F> {
    pub fn new(pen_val: F, groups: Groups, weights: Option<Array1<F>>) -> Result<Self> {
        groups.check_disjoint()?;
        Ok(ExclusiveGroupLasso {
            pen_val,
            groups,
            weights,
        })
    }
}

impl<F: Float> Func<F> for ExclusiveGroupLasso<F> {
    fn name(&self) -> &'static str {
        "ExclusiveGroupLasso"
    }

    fn value(&self, x: ArrayView2<F>) -> F {
        if !weights_match(self.weights.as_ref(), x.nrows())
            || self.groups.check_bounds(x.nrows()).is_err()
        {
            return F::nan();
        }
        let mut total = F::zero();
        for rows in self.groups.resolve(x.nrows()).iter() {
            for col in x.axis_iter(Axis(1)) {
                let l1: F = rows
                    .iter()
                    .map(|&r| weight_at(self.weights.as_ref(), r) * col[r].abs())
                    .sum();
                total += l1 * l1;
            }
        }
        self.pen_val * total
    }

    fn prox(&self, x: ArrayView2<F>, step: F) -> Result<Array2<F>> {
        check_length(self.weights.as_ref().map(|w| w.view()), x.nrows(), "feature")?;
        self.groups.check_bounds(x.nrows())?;
        let mut out = x.to_owned();
        for rows in self.groups.resolve(x.nrows()).iter() {
            let group_weights = self.weights.as_ref().map(|w| w.select(Axis(0), rows));
            for (t, col) in x.axis_iter(Axis(1)).enumerate() {
                let block = col.select(Axis(0), rows);
                let prox = prox_squared_l1(
                    block.view(),
                    group_weights.as_ref().map(|w| w.view()),
                    step * self.pen_val,
                );
                for (k, &r) in rows.iter().enumerate() {
                    out[[r, t]] = prox[k];
                }
            }
        }
        Ok(out)
    }

    fn is_smooth(&self) -> bool {
        false
    }

    fn has_prox(&self) -> bool {
        true
    }
}

/// L21 penalty
///
/// The multi-task counterpart of the [`Lasso`] penalty. Each row of the
/// coefficient gathers the coefficients of a feature across responses.
///
/// pen(x) = pen_val * sum_j w_j * ||x[j, :]||_2
#[derive(Debug, Clone, PartialEq)]
pub struct MultiTaskLasso<F: Float> {
    pen_val: F,
    weights: Option<Array1<F>>,
}

impl<F: Float> MultiTaskLasso<F> {
    /// Instantiates a L21 penalty with a positive regularization
    /// hyperparameter and optional per-row weights.
    pub fn new(pen_val: F, weights: Option<Array1<F>>) -> Self {
        MultiTaskLasso { pen_val, weights }
    }
}

impl<F: Float> Func<F> for MultiTaskLasso<F> {
    fn name(&self) -> &'static str {
        "MultiTaskLasso"
    }

    fn value(&self, x: ArrayView2<F>) -> F {
        if !weights_match(self.weights.as_ref(), x.nrows()) {
            return F::nan();
        }
        let norms: F = x
            .axis_iter(Axis(0))
            .enumerate()
            .map(|(j, row)| weight_at(self.weights.as_ref(), j) * row.dot(&row).sqrt())
            .sum();
        self.pen_val * norms
    }

    /// Applies the block soft-thresholding operator to each row
    fn prox(&self, x: ArrayView2<F>, step: F) -> Result<Array2<F>> {
        check_length(self.weights.as_ref().map(|w| w.view()), x.nrows(), "row")?;
        let mut out = x.to_owned();
        for (j, mut row) in out.axis_iter_mut(Axis(0)).enumerate() {
            let threshold = step * self.pen_val * weight_at(self.weights.as_ref(), j);
            let shrunk = block_soft_thresholding(row.view(), threshold);
            row.assign(&shrunk);
        }
        Ok(out)
    }

    fn is_smooth(&self) -> bool {
        false
    }

    fn has_prox(&self) -> bool {
        true
    }
}

/// The Group L1 + L2 penalty
///
/// pen(x) = pen_val * mix_val * group_lasso(x) + 0.5 * pen_val * (1 - mix_val) * ||x||_2^2
pub type GroupElasticNet<F> = ElasticNetLike<F, GroupLasso<F>>;

/// The Block L1 + L2 penalty
///
/// pen(x) = pen_val * mix_val * l21(x) + 0.5 * pen_val * (1 - mix_val) * ||x||_2^2
pub type MultiTaskElasticNet<F> = ElasticNetLike<F, MultiTaskLasso<F>>;

impl<F: Float> ElasticNetLike<F, GroupLasso<F>> {
    pub fn new(
        pen_val: F,
        mix_val: F,
        groups: Groups,
        lasso_weights: Option<Array1<F>>,
    ) -> Result<Self> {
        let lasso_val = pen_val * mix_val;
        let lasso = GroupLasso::new(lasso_val, groups, lasso_weights)?;
        let ridge = Ridge::new(pen_val * (F::one() - mix_val), None);
        ElasticNetLike::from_parts(lasso, lasso_val, ridge)
    }
}

impl<F: Float> ElasticNetLike<F, MultiTaskLasso<F>> {
    pub fn new(pen_val: F, mix_val: F, lasso_weights: Option<Array1<F>>) -> Result<Self> {
        let lasso_val = pen_val * mix_val;
        let lasso = MultiTaskLasso::new(lasso_val, lasso_weights);
        let ridge = Ridge::new(pen_val * (F::one() - mix_val), None);
        ElasticNetLike::from_parts(lasso, lasso_val, ridge)
    }
}

/// The Sparse Group Lasso penalty
///
/// pen(x) = pen_val * mix_val * sum_i w_i * |x_i|
///          + pen_val * (1 - mix_val) * sum_g v_g * ||x[rows_g]||_F
///
/// Its proximal operator soft-thresholds the entries then block
/// soft-thresholds the groups.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseGroupLasso<F: Float> {
    sparse: Lasso<F>,
    group: GroupLasso<F>,
}

impl<F: Float> SparseGroupLasso<F> {
    pub fn new(
        pen_val: F,
        mix_val: F,
        groups: Groups,
        sparse_weights: Option<Array1<F>>,
        group_weights: Option<Array1<F>>,
    ) -> Result<Self> {
        Ok(SparseGroupLasso {
            sparse: Lasso::new(pen_val * mix_val, sparse_weights),
            group: GroupLasso::new(pen_val * (F::one() - mix_val), groups, group_weights)?,
        })
    }
}

impl<F: Float> Func<F> for SparseGroupLasso<F> {
    fn name(&self) -> &'static str {
        "SparseGroupLasso"
    }

    fn value(&self, x: ArrayView2<F>) -> F {
        self.sparse.value(x) + self.group.value(x)
    }

    fn prox(&self, x: ArrayView2<F>, step: F) -> Result<Array2<F>> {
        let soft = self.sparse.prox(x, step)?;
        self.group.prox(soft.view(), step)
    }

    fn is_smooth(&self) -> bool {
        false
    }

    fn has_prox(&self) -> bool {
        true
    }
}
