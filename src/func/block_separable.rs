use ndarray::{Array2, ArrayView2, Axis};

use super::{Func, Split};
use crate::config::Groups;
use crate::error::{GlmError, Result};
use crate::Float;

/// Terms of a block-separable function with their rows.
type Blocks<F> = (Vec<Box<dyn Func<F>>>, Vec<Vec<usize>>);

/// Block-separable function
///
/// f(x) = sum_g f_g(x[rows_g])
///
/// Each term only sees the rows of its own group. Groups are pairwise
/// disjoint; [`Groups::AllCoordinates`] stands for a single term applied to
/// every row.
#[derive(Debug)]
pub struct BlockSeparable<F: Float> {
    funcs: Vec<Box<dyn Func<F>>>,
    groups: Groups,
}

impl<F: Float> BlockSeparable<F> {
    /// Instantiates a block-separable function from parallel lists of terms
    /// and disjoint row groups.
    pub fn new(funcs: Vec<Box<dyn Func<F>>>, groups: Groups) -> Result<Self> {
        match &groups {
            Groups::AllCoordinates => {
                if funcs.len() != 1 {
                    return Err(GlmError::Configuration(format!(
                        "a block-separable function over all coordinates takes one term, got {}",
                        funcs.len()
                    )));
                }
            }
            Groups::Explicit(groups_idx) => {
                if groups_idx.len() != funcs.len() {
                    return Err(GlmError::Configuration(format!(
                        "{} terms for {} groups",
                        funcs.len(),
                        groups_idx.len()
                    )));
                }
                groups.check_disjoint()?;
            }
        }
        Ok(BlockSeparable { funcs, groups })
    }

    pub fn groups(&self) -> &Groups {
        &self.groups
    }

    fn blocks(&self, n_rows: usize) -> Vec<Vec<usize>> {
        self.groups.resolve(n_rows)
    }
}

impl<F: Float> Func<F> for BlockSeparable<F> {
    fn name(&self) -> &'static str {
        "BlockSeparable"
    }

    fn value(&self, x: ArrayView2<F>) -> F {
        self.funcs
            .iter()
            .zip(self.blocks(x.nrows()))
            .map(|(func, rows)| func.value(x.select(Axis(0), &rows).view()))
            .sum()
    }

    fn grad(&self, x: ArrayView2<F>) -> Result<Array2<F>> {
        let mut grad = Array2::<F>::zeros(x.raw_dim());
        for (func, rows) in self.funcs.iter().zip(self.blocks(x.nrows())) {
            let grad_block = func.grad(x.select(Axis(0), &rows).view())?;
            for (k, &row) in rows.iter().enumerate() {
                grad.row_mut(row).assign(&grad_block.row(k));
            }
        }
        Ok(grad)
    }

    /// Applies each term's proximal operator to its own block. Rows outside
    /// every group are left untouched.
    fn prox(&self, x: ArrayView2<F>, step: F) -> Result<Array2<F>> {
        let mut out = x.to_owned();
        for (func, rows) in self.funcs.iter().zip(self.blocks(x.nrows())) {
            let prox_block = func.prox(x.select(Axis(0), &rows).view(), step)?;
            for (k, &row) in rows.iter().enumerate() {
                out.row_mut(row).assign(&prox_block.row(k));
            }
        }
        Ok(out)
    }

    fn is_smooth(&self) -> bool {
        self.funcs.iter().all(|f| f.is_smooth())
    }

    fn has_prox(&self) -> bool {
        self.funcs.iter().all(|f| f.has_prox())
    }

    fn grad_lip(&self) -> Option<F> {
        // the blocks are decoupled, the worst block bounds the whole
        self.funcs
            .iter()
            .map(|f| f.grad_lip())
            .try_fold(F::zero(), |acc, lip| lip.map(|l| acc.max(l)))
    }

    fn split(self: Box<Self>) -> Split<F> {
        let BlockSeparable { funcs, groups } = *self;
        if let Groups::AllCoordinates = groups {
            return match funcs.into_iter().next() {
                Some(func) => func.split(),
                None => (None, None),
            };
        }

        let mut smooth = (Vec::new(), Vec::new());
        let mut non_smooth = (Vec::new(), Vec::new());
        for (func, rows) in funcs.into_iter().zip(groups.resolve(0)) {
            let (smooth_part, non_smooth_part) = func.split();
            if let Some(f) = smooth_part {
                smooth.0.push(f);
                smooth.1.push(rows.clone());
            }
            if let Some(f) = non_smooth_part {
                non_smooth.0.push(f);
                non_smooth.1.push(rows);
            }
        }

        let rebuild = |(funcs, rows): Blocks<F>| -> Option<Box<dyn Func<F>>> {
            if funcs.is_empty() {
                return None;
            }
            Some(Box::new(BlockSeparable {
                funcs,
                groups: Groups::Explicit(rows),
            }))
        };
        (rebuild(smooth), rebuild(non_smooth))
    }
}
