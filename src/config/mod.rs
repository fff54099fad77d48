use ndarray::{Array1, Array2};
use std::collections::BTreeMap;

use super::Float;
use crate::error::{GlmError, Result};
use crate::factory::fused_lasso_diff_mat;
use crate::penalties::nonconvex::{NonConvexFunc, NonConvexKind, NonSmoothTransform};


/// Row groups used by the group-structured penalties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Groups {
    /// A single group made of every row of the coefficient
    AllCoordinates,
    /// Explicit lists of row indices
    Explicit(Vec<Vec<usize>>),
}

impl Groups {
    pub fn n_groups(&self) -> usize {
        match self {
            Groups::AllCoordinates => 1,
            Groups::Explicit(groups) => groups.len(),
        }
    }

    /// Returns the row indices of every group for a coefficient with
    /// `n_rows` rows.
    pub fn resolve(&self, n_rows: usize) -> Vec<Vec<usize>> {
        match self {
            Groups::AllCoordinates => vec![(0..n_rows).collect()],
            Groups::Explicit(groups) => groups.clone(),
        }
    }

    /// Checks that no row belongs to two groups.
    pub fn check_disjoint(&self) -> Result<()> {
        if let Groups::Explicit(groups) = self {
            let mut seen = std::collections::BTreeSet::new();
            for &idx in groups.iter().flatten() {
                if !seen.insert(idx) {
                    return Err(GlmError::Configuration(format!(
                        "row {} belongs to several groups",
                        idx
                    )));
                }
            }
        }
        Ok(())
    }

    /// Checks that every index refers to one of the `n_rows` rows.
    pub fn check_bounds(&self, n_rows: usize) -> Result<()> {
        if let Groups::Explicit(groups) = self {
            if let Some(&idx) = groups.iter().flatten().find(|&&idx| idx >= n_rows) {
                return Err(GlmError::Configuration(format!(
                    "group index {} is out of bounds for {} rows",
                    idx, n_rows
                )));
            }
        }
        Ok(())
    }

    /// Checks that the groups form a partition of the `n_rows` rows.
    pub fn check_partition(&self, n_rows: usize) -> Result<()> {
        self.check_disjoint()?;
        self.check_bounds(n_rows)?;
        if let Groups::Explicit(groups) = self {
            let covered: usize = groups.iter().map(|g| g.len()).sum();
            if covered != n_rows {
                return Err(GlmError::Configuration(format!(
                    "groups cover {} of the {} rows",
                    covered, n_rows
                )));
            }
        }
        Ok(())
    }
}

/// Edges of the graph used by the fused lasso.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeList {
    /// Consecutive features are neighbours
    Chain,
    /// Explicit undirected edges between features
    Graph(Vec<(usize, usize)>),
}

/// The non-convex flavor of a penalty, solved with the LLA algorithm.
#[derive(Debug, Clone, PartialEq)]
pub struct NonConvexFlavor<F: Float> {
    pub pen_func: NonConvexKind,
    /// Shape parameter (`a` for SCAD, `gamma` for MCP, `epsilon` for Log).
    /// The kind's default is used when missing.
    pub second_param: Option<F>,
    /// Starting coefficient of the LLA algorithm
    pub coef_init: Option<Array2<F>>,
    /// Starting intercept of the LLA algorithm
    pub intercept_init: Option<Array1<F>>,
}

impl<F: Float> NonConvexFlavor<F> {
    pub fn new(pen_func: NonConvexKind) -> Self {
        NonConvexFlavor {
            pen_func,
            second_param: None,
            coef_init: None,
            intercept_init: None,
        }
    }

    pub fn second_param(mut self, second_param: F) -> Self {
        self.second_param = Some(second_param);
        self
    }

    pub fn coef_init(mut self, coef_init: Array2<F>) -> Self {
        self.coef_init = Some(coef_init);
        self
    }

    pub fn intercept_init(mut self, intercept_init: Array1<F>) -> Self {
        self.intercept_init = Some(intercept_init);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Flavor<F: Float> {
    Convex,
    NonConvex(NonConvexFlavor<F>),
}

/// The penalty families.
///
/// Entrywise weights follow the row-major order of the coefficient entries,
/// which is one weight per feature for single-response models.
#[derive(Debug, Clone, PartialEq)]
pub enum PenaltyKind<F: Float> {
    NoPenalty,
    Ridge {
        weights: Option<Array1<F>>,
    },
    GeneralizedRidge {
        mat: Option<Array2<F>>,
    },
    Lasso {
        weights: Option<Array1<F>>,
    },
    GroupLasso {
        groups: Groups,
        weights: Option<Array1<F>>,
    },
    /// Weights are given per feature and the penalty acts on each response
    /// column separately
    ExclusiveGroupLasso {
        groups: Groups,
        weights: Option<Array1<F>>,
    },
    MultiTaskLasso {
        weights: Option<Array1<F>>,
    },
    NuclearNorm {
        weights: Option<Array1<F>>,
    },
    FusedLasso {
        edgelist: EdgeList,
        order: usize,
        weights: Option<Array1<F>>,
    },
    GeneralizedLasso {
        mat: Option<Array2<F>>,
        weights: Option<Array1<F>>,
    },
    ElasticNet {
        mix_val: F,
        lasso_weights: Option<Array1<F>>,
        ridge_weights: Option<Array1<F>>,
    },
    GroupElasticNet {
        groups: Groups,
        mix_val: F,
        lasso_weights: Option<Array1<F>>,
        ridge_weights: Option<Array1<F>>,
    },
    MultiTaskElasticNet {
        mix_val: F,
        lasso_weights: Option<Array1<F>>,
        ridge_weights: Option<Array1<F>>,
    },
    SparseGroupLasso {
        groups: Groups,
        mix_val: F,
        sparse_weights: Option<Array1<F>>,
        group_weights: Option<Array1<F>>,
    },
    /// Penalties acting on disjoint row groups, matched by name
    SeparableSum {
        penalties: BTreeMap<String, PenaltyConfig<F>>,
        groups: BTreeMap<String, Vec<usize>>,
    },
    /// Penalties added over the whole coefficient
    OverlappingSum {
        penalties: BTreeMap<String, PenaltyConfig<F>>,
    },
}

/// In-place updates applied to a penalty specification.
#[derive(Debug, Clone, PartialEq)]
pub enum PenaltyUpdate<F: Float> {
    PenVal(F),
    SecondParam(F),
    /// Rebinds the weight buffer, the structure of the penalty is unchanged
    Weights(Array1<F>),
}

/// Declarative description of a penalty term.
///
/// The strength `pen_val` multiplies the whole term. Sums ignore their own
/// strength and use the ones of their children.
#[derive(Debug, Clone, PartialEq)]
pub struct PenaltyConfig<F: Float> {
    pub pen_val: F,
    pub kind: PenaltyKind<F>,
    pub flavor: Option<Flavor<F>>,
}

impl<F: Float> PenaltyConfig<F> {
    pub fn new(pen_val: F, kind: PenaltyKind<F>) -> Self {
        PenaltyConfig {
            pen_val,
            kind,
            flavor: None,
        }
    }

    pub fn no_penalty() -> Self {
        Self::new(F::zero(), PenaltyKind::NoPenalty)
    }

    pub fn ridge(pen_val: F) -> Self {
        Self::new(pen_val, PenaltyKind::Ridge { weights: None })
    }

    pub fn generalized_ridge(pen_val: F, mat: Array2<F>) -> Self {
        Self::new(pen_val, PenaltyKind::GeneralizedRidge { mat: Some(mat) })
    }

    pub fn lasso(pen_val: F) -> Self {
        Self::new(pen_val, PenaltyKind::Lasso { weights: None })
    }

    pub fn group_lasso(pen_val: F, groups: Groups) -> Self {
        Self::new(
            pen_val,
            PenaltyKind::GroupLasso {
                groups,
                weights: None,
            },
        )
    }

    pub fn exclusive_group_lasso(pen_val: F, groups: Groups) -> Self {
        Self::new(
            pen_val,
            PenaltyKind::ExclusiveGroupLasso {
                groups,
                weights: None,
            },
        )
    }

    pub fn multi_task_lasso(pen_val: F) -> Self {
        Self::new(pen_val, PenaltyKind::MultiTaskLasso { weights: None })
    }

    pub fn nuclear_norm(pen_val: F) -> Self {
        Self::new(pen_val, PenaltyKind::NuclearNorm { weights: None })
    }

    pub fn fused_lasso(pen_val: F, edgelist: EdgeList, order: usize) -> Self {
        Self::new(
            pen_val,
            PenaltyKind::FusedLasso {
                edgelist,
                order,
                weights: None,
            },
        )
    }

    pub fn generalized_lasso(pen_val: F, mat: Array2<F>) -> Self {
        Self::new(
            pen_val,
            PenaltyKind::GeneralizedLasso {
                mat: Some(mat),
                weights: None,
            },
        )
    }

    pub fn elastic_net(pen_val: F, mix_val: F) -> Self {
        Self::new(
            pen_val,
            PenaltyKind::ElasticNet {
                mix_val,
                lasso_weights: None,
                ridge_weights: None,
            },
        )
    }

    pub fn group_elastic_net(pen_val: F, mix_val: F, groups: Groups) -> Self {
        Self::new(
            pen_val,
            PenaltyKind::GroupElasticNet {
                groups,
                mix_val,
                lasso_weights: None,
                ridge_weights: None,
            },
        )
    }

    pub fn multi_task_elastic_net(pen_val: F, mix_val: F) -> Self {
        Self::new(
            pen_val,
            PenaltyKind::MultiTaskElasticNet {
                mix_val,
                lasso_weights: None,
                ridge_weights: None,
            },
        )
    }

    pub fn sparse_group_lasso(pen_val: F, mix_val: F, groups: Groups) -> Self {
        Self::new(
            pen_val,
            PenaltyKind::SparseGroupLasso {
                groups,
                mix_val,
                sparse_weights: None,
                group_weights: None,
            },
        )
    }

    pub fn separable_sum(
        penalties: BTreeMap<String, PenaltyConfig<F>>,
        groups: BTreeMap<String, Vec<usize>>,
    ) -> Self {
        Self::new(F::zero(), PenaltyKind::SeparableSum { penalties, groups })
    }

    pub fn overlapping_sum(penalties: BTreeMap<String, PenaltyConfig<F>>) -> Self {
        Self::new(F::zero(), PenaltyKind::OverlappingSum { penalties })
    }

    /// Sets the weights of the penalty, see [`PenaltyUpdate::Weights`].
    pub fn with_weights(mut self, weights: Array1<F>) -> Result<Self> {
        self.apply(PenaltyUpdate::Weights(weights))?;
        Ok(self)
    }

    pub fn with_flavor(mut self, flavor: Flavor<F>) -> Self {
        self.flavor = Some(flavor);
        self
    }

    /// Name of the penalty family, used in error messages.
    pub fn family(&self) -> &'static str {
        match &self.kind {
            PenaltyKind::NoPenalty => "NoPenalty",
            PenaltyKind::Ridge { .. } => "Ridge",
            PenaltyKind::GeneralizedRidge { .. } => "GeneralizedRidge",
            PenaltyKind::Lasso { .. } => "Lasso",
            PenaltyKind::GroupLasso { .. } => "GroupLasso",
            PenaltyKind::ExclusiveGroupLasso { .. } => "ExclusiveGroupLasso",
            PenaltyKind::MultiTaskLasso { .. } => "MultiTaskLasso",
            PenaltyKind::NuclearNorm { .. } => "NuclearNorm",
            PenaltyKind::FusedLasso { .. } => "FusedLasso",
            PenaltyKind::GeneralizedLasso { .. } => "GeneralizedLasso",
            PenaltyKind::ElasticNet { .. } => "ElasticNet",
            PenaltyKind::GroupElasticNet { .. } => "GroupElasticNet",
            PenaltyKind::MultiTaskElasticNet { .. } => "MultiTaskElasticNet",
            PenaltyKind::SparseGroupLasso { .. } => "SparseGroupLasso",
            PenaltyKind::SeparableSum { .. } => "SeparableSum",
            PenaltyKind::OverlappingSum { .. } => "OverlappingSum",
        }
    }

    pub fn non_convex_flavor(&self) -> Option<&NonConvexFlavor<F>> {
        match &self.flavor {
            Some(Flavor::NonConvex(flavor)) => Some(flavor),
            _ => None,
        }
    }

    pub fn is_non_convex(&self) -> bool {
        self.non_convex_flavor().is_some()
    }

    fn require_non_convex(&self) -> Result<&NonConvexFlavor<F>> {
        self.non_convex_flavor().ok_or_else(|| {
            GlmError::Configuration(format!("{} penalty is not non-convex", self.family()))
        })
    }

    fn unsupported_non_convex(&self) -> GlmError {
        GlmError::Configuration(format!(
            "non-convex flavor is not supported for the {} penalty",
            self.family()
        ))
    }

    /// Convex majorizer of a non-convex penalty: the same structure without
    /// the flavor and with its weights cleared. The LLA weights take their
    /// place.
    pub fn base_convex(&self) -> Result<PenaltyConfig<F>> {
        self.require_non_convex()?;
        let kind = match &self.kind {
            PenaltyKind::Lasso { .. } => PenaltyKind::Lasso { weights: None },
            PenaltyKind::GroupLasso { groups, .. } => PenaltyKind::GroupLasso {
                groups: groups.clone(),
                weights: None,
            },
            PenaltyKind::MultiTaskLasso { .. } => PenaltyKind::MultiTaskLasso { weights: None },
            PenaltyKind::NuclearNorm { .. } => PenaltyKind::NuclearNorm { weights: None },
            PenaltyKind::FusedLasso {
                edgelist, order, ..
            } => PenaltyKind::FusedLasso {
                edgelist: edgelist.clone(),
                order: *order,
                weights: None,
            },
            PenaltyKind::GeneralizedLasso { mat, .. } => PenaltyKind::GeneralizedLasso {
                mat: mat.clone(),
                weights: None,
            },
            _ => return Err(self.unsupported_non_convex()),
        };
        Ok(PenaltyConfig {
            pen_val: self.pen_val,
            kind,
            flavor: None,
        })
    }

    /// The transform applied to the coefficient before the outer non-convex
    /// function. `n_features` is needed by the fused lasso.
    pub fn non_smooth_transform(
        &self,
        n_features: Option<usize>,
    ) -> Result<NonSmoothTransform<F>> {
        match &self.kind {
            PenaltyKind::Lasso { .. } => Ok(NonSmoothTransform::Entrywise),
            PenaltyKind::GroupLasso { groups, .. } => {
                Ok(NonSmoothTransform::GroupNorms(groups.clone()))
            }
            PenaltyKind::MultiTaskLasso { .. } => Ok(NonSmoothTransform::RowNorms),
            PenaltyKind::NuclearNorm { .. } => Ok(NonSmoothTransform::SingularValues),
            PenaltyKind::FusedLasso {
                edgelist, order, ..
            } => {
                let n_nodes = n_features.ok_or_else(|| {
                    GlmError::Configuration(
                        "the fused lasso needs the number of features".to_string(),
                    )
                })?;
                Ok(NonSmoothTransform::Linear(fused_lasso_diff_mat(
                    edgelist, *order, n_nodes,
                )?))
            }
            PenaltyKind::GeneralizedLasso { mat, .. } => Ok(match mat {
                Some(mat) => NonSmoothTransform::Linear(mat.clone()),
                None => NonSmoothTransform::Entrywise,
            }),
            _ => Err(self.unsupported_non_convex()),
        }
    }

    /// The outer non-convex function applied to the transformed coefficient.
    pub fn transformed_nonconvex_penalty(&self) -> Result<NonConvexFunc<F>> {
        let flavor = self.require_non_convex()?;
        NonConvexFunc::new(flavor.pen_func, self.pen_val, flavor.second_param)
    }

    pub fn coef_init(&self) -> Option<&Array2<F>> {
        self.non_convex_flavor().and_then(|f| f.coef_init.as_ref())
    }

    pub fn intercept_init(&self) -> Option<&Array1<F>> {
        self.non_convex_flavor().and_then(|f| f.intercept_init.as_ref())
    }

    fn weights_slot_mut(&mut self) -> Option<&mut Option<Array1<F>>> {
        match &mut self.kind {
            PenaltyKind::Ridge { weights }
            | PenaltyKind::Lasso { weights }
            | PenaltyKind::GroupLasso { weights, .. }
            | PenaltyKind::ExclusiveGroupLasso { weights, .. }
            | PenaltyKind::MultiTaskLasso { weights }
            | PenaltyKind::NuclearNorm { weights }
            | PenaltyKind::FusedLasso { weights, .. }
            | PenaltyKind::GeneralizedLasso { weights, .. } => Some(weights),
            PenaltyKind::ElasticNet { lasso_weights, .. }
            | PenaltyKind::GroupElasticNet { lasso_weights, .. }
            | PenaltyKind::MultiTaskElasticNet { lasso_weights, .. } => Some(lasso_weights),
            PenaltyKind::SparseGroupLasso { sparse_weights, .. } => Some(sparse_weights),
            PenaltyKind::NoPenalty
            | PenaltyKind::GeneralizedRidge { .. }
            | PenaltyKind::SeparableSum { .. }
            | PenaltyKind::OverlappingSum { .. } => None,
        }
    }

    /// The weights rebound by [`PenaltyUpdate::Weights`], when set.
    pub fn weights(&self) -> Option<&Array1<F>> {
        match &self.kind {
            PenaltyKind::Ridge { weights }
            | PenaltyKind::Lasso { weights }
            | PenaltyKind::GroupLasso { weights, .. }
            | PenaltyKind::ExclusiveGroupLasso { weights, .. }
            | PenaltyKind::MultiTaskLasso { weights }
            | PenaltyKind::NuclearNorm { weights }
            | PenaltyKind::FusedLasso { weights, .. }
            | PenaltyKind::GeneralizedLasso { weights, .. } => weights.as_ref(),
            PenaltyKind::ElasticNet { lasso_weights, .. }
            | PenaltyKind::GroupElasticNet { lasso_weights, .. }
            | PenaltyKind::MultiTaskElasticNet { lasso_weights, .. } => lasso_weights.as_ref(),
            PenaltyKind::SparseGroupLasso { sparse_weights, .. } => sparse_weights.as_ref(),
            PenaltyKind::NoPenalty
            | PenaltyKind::GeneralizedRidge { .. }
            | PenaltyKind::SeparableSum { .. }
            | PenaltyKind::OverlappingSum { .. } => None,
        }
    }

    /// Applies an update in place. Only the strength, the shape parameter
    /// and the weights can change, the structure is fixed.
    pub fn apply(&mut self, update: PenaltyUpdate<F>) -> Result<()> {
        let family = self.family();
        match update {
            PenaltyUpdate::PenVal(pen_val) => {
                if !(pen_val >= F::zero()) {
                    return Err(GlmError::Configuration(format!(
                        "penalty value must be non-negative, got {}",
                        pen_val
                    )));
                }
                self.pen_val = pen_val;
            }
            PenaltyUpdate::SecondParam(second_param) => match &mut self.flavor {
                Some(Flavor::NonConvex(flavor)) => flavor.second_param = Some(second_param),
                _ => {
                    return Err(GlmError::Configuration(format!(
                        "{} penalty has no non-convex shape parameter",
                        family
                    )))
                }
            },
            PenaltyUpdate::Weights(new_weights) => {
                let slot = self.weights_slot_mut().ok_or_else(|| {
                    GlmError::Configuration(format!(
                        "{} penalty has no weights to rebind",
                        family
                    ))
                })?;
                if new_weights.iter().any(|&w| !(w >= F::zero()) || !w.is_finite()) {
                    return Err(GlmError::Configuration(
                        "weights must be finite and non-negative".to_string(),
                    ));
                }
                *slot = Some(new_weights);
            }
        }
        Ok(())
    }
}
