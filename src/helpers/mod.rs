#[cfg(test)]
mod tests;

/// This module implements the proximal operators shared by the penalties.
pub mod prox {
    use crate::Float;
    use ndarray::{Array, Array1, ArrayView, ArrayView1, Dimension, Zip};

    /// The soft-thresholding operator is the proximal operator of the
    /// absolute value.
    pub fn soft_thresholding<F: Float>(x: F, threshold: F) -> F {
        if x > threshold {
            x - threshold
        } else if x < -threshold {
            x + threshold
        } else {
            F::zero()
        }
    }

    /// The block soft-thresholding operator is the proximal operator of the
    /// Euclidean norm. It shrinks the whole block towards zero and returns
    /// zero when the norm of the block falls below the threshold.
    pub fn block_soft_thresholding<F: Float, D: Dimension>(
        x: ArrayView<F, D>,
        threshold: F,
    ) -> Array<F, D> {
        let norm_x = x.fold(F::zero(), |acc, &xi| acc + xi * xi).sqrt();
        if norm_x <= threshold {
            return Array::zeros(x.raw_dim());
        }
        let scale = F::one() - threshold / norm_x;
        x.mapv(|xi| xi * scale)
    }

    /// Proximal operator of the squared weighted L1 norm
    ///
    /// prox(x) = argmin_z mult * (sum_i w_i |z_i|)^2 + 0.5 * ||z - x||^2
    ///
    /// The solution soft-thresholds each entry at `w_i * tau` where `tau`
    /// depends on the active set. Entries are ranked by `|x_i| / w_i` and the
    /// active set is the largest prefix whose last entry survives its own
    /// threshold.
    pub fn prox_squared_l1<F: Float>(
        x: ArrayView1<F>,
        weights: Option<ArrayView1<F>>,
        mult: F,
    ) -> Array1<F> {
        let w = match weights {
            Some(w) => w.to_owned(),
            None => Array1::ones(x.len()),
        };
        if mult == F::zero() {
            return x.to_owned();
        }

        let mut order: Vec<usize> = (0..x.len()).filter(|&i| w[i] > F::zero()).collect();
        order.sort_unstable_by(|&i, &j| {
            let ri = x[i].abs() / w[i];
            let rj = x[j].abs() / w[j];
            rj.partial_cmp(&ri).unwrap_or(std::cmp::Ordering::Equal)
        });

        let two_mult = F::cast(2.) * mult;
        let mut tau = F::zero();
        let mut sum_wx = F::zero();
        let mut sum_ww = F::zero();
        for &i in order.iter() {
            let cand_wx = sum_wx + w[i] * x[i].abs();
            let cand_ww = sum_ww + w[i] * w[i];
            let cand_tau = two_mult * cand_wx / (F::one() + two_mult * cand_ww);
            if x[i].abs() > w[i] * cand_tau {
                sum_wx = cand_wx;
                sum_ww = cand_ww;
                tau = cand_tau;
            } else {
                break;
            }
        }

        let mut out = Array1::<F>::zeros(x.len());
        Zip::from(&mut out)
            .and(&x)
            .and(&w)
            .for_each(|o, &xi, &wi| *o = soft_thresholding(xi, wi * tau));
        out
    }
}

/// This module contains the dense linear algebra helpers. Decompositions are
/// delegated to `nalgebra` and results are converted back to `ndarray`.
pub mod linalg {
    use crate::error::{GlmError, Result};
    use crate::Float;
    use nalgebra::DMatrix;
    use ndarray::{Array1, Array2, ArrayView2};

    /// Converts an ndarray matrix to a double precision nalgebra matrix.
    pub fn to_dmatrix<F: Float>(x: ArrayView2<F>) -> DMatrix<f64> {
        DMatrix::from_fn(x.nrows(), x.ncols(), |i, j| {
            x[[i, j]].to_f64().unwrap_or(f64::NAN)
        })
    }

    /// Converts a double precision nalgebra matrix back to an ndarray matrix.
    pub fn to_array2<F: Float>(m: &DMatrix<f64>) -> Array2<F> {
        let (nrows, ncols) = m.shape();
        Array2::from_shape_fn((nrows, ncols), |(i, j)| F::cast(m[(i, j)]))
    }

    /// Singular values of a matrix, sorted in decreasing order.
    pub fn singular_values<F: Float>(x: ArrayView2<F>) -> Array1<F> {
        if x.is_empty() {
            return Array1::zeros(0);
        }
        let mut s: Vec<f64> = to_dmatrix(x).singular_values().iter().copied().collect();
        s.sort_unstable_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
        s.into_iter().map(|v| F::cast(v)).collect()
    }

    /// Largest singular value of a matrix, zero for an empty matrix.
    pub fn leading_sval<F: Float>(x: ArrayView2<F>) -> F {
        singular_values(x).iter().copied().next().unwrap_or(F::zero())
    }

    /// Thin singular value decomposition `X = U diag(s) Vt`, with the singular
    /// values sorted in decreasing order.
    pub fn svd<F: Float>(x: ArrayView2<F>) -> Result<(Array2<F>, Array1<F>, Array2<F>)> {
        let decomposition = to_dmatrix(x)
            .try_svd(true, true, f64::EPSILON, 0)
            .ok_or_else(|| GlmError::NumericalFailure("SVD did not converge".to_string()))?;
        let (u, v_t) = match (decomposition.u, decomposition.v_t) {
            (Some(u), Some(v_t)) => (u, v_t),
            _ => {
                return Err(GlmError::NumericalFailure(
                    "SVD did not return singular vectors".to_string(),
                ))
            }
        };
        let s = decomposition.singular_values;

        let mut order: Vec<usize> = (0..s.len()).collect();
        order.sort_unstable_by(|&i, &j| {
            s[j].partial_cmp(&s[i]).unwrap_or(std::cmp::Ordering::Equal)
        });

        let U = Array2::from_shape_fn((u.nrows(), order.len()), |(i, k)| F::cast(u[(i, order[k])]));
        let Vt = Array2::from_shape_fn((order.len(), v_t.ncols()), |(k, j)| {
            F::cast(v_t[(order[k], j)])
        });
        let s = order.iter().map(|&k| F::cast(s[k])).collect();
        Ok((U, s, Vt))
    }

    /// Solves `A X = B` for a symmetric positive definite `A` with a Cholesky
    /// factorization.
    #[cfg(test)]
    pub fn solve_spd<F: Float>(a: ArrayView2<F>, b: ArrayView2<F>) -> Result<Array2<F>> {
        let chol = to_dmatrix(a).cholesky().ok_or_else(|| {
            GlmError::NumericalFailure("matrix is not positive definite".to_string())
        })?;
        Ok(to_array2(&chol.solve(&to_dmatrix(b))))
    }
}

/// This module contains scalar helpers used by the datafits.
pub mod helpers {
    use crate::Float;

    /// The logistic function.
    pub fn sigmoid<F: Float>(x: F) -> F {
        F::one() / (F::one() + (-x).exp())
    }

    /// Numerically stable evaluation of `log(1 + exp(x))`.
    pub fn log1pexp<F: Float>(x: F) -> F {
        if x > F::zero() {
            x + (-x).exp().ln_1p()
        } else {
            x.exp().ln_1p()
        }
    }
}

/// This module contains helpers functions to efficiently write tests.
pub mod test_helpers {
    use crate::Float;
    use approx::AbsDiffEq;
    use ndarray::prelude::*;
    use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    pub fn assert_array_all_close<F>(x: ArrayView1<F>, y: ArrayView1<F>, delta: F)
    where
        F: Float + AbsDiffEq<Epsilon = F>,
    {
        assert_eq!(x.len(), y.len());
        for i in 0..x.len() {
            if x[i].abs_diff_ne(&y[i], delta) {
                panic!("x: {}, y: {} ; with precision level {}", x[i], y[i], delta);
            }
        }
    }

    pub fn assert_array2d_all_close<F>(x: ArrayView2<F>, y: ArrayView2<F>, delta: F)
    where
        F: Float + AbsDiffEq<Epsilon = F>,
    {
        assert_eq!(x.shape()[0], y.shape()[0]);
        assert_eq!(x.shape()[1], y.shape()[1]);
        for i in 0..x.shape()[0] {
            for j in 0..x.shape()[1] {
                if x[[i, j]].abs_diff_ne(&y[[i, j]], delta) {
                    panic!(
                        "x: {}, y: {} ; with precision level {}",
                        x[[i, j]],
                        y[[i, j]],
                        delta
                    );
                }
            }
        }
    }

    pub fn fill_random_vector(capacity: usize, seed: u64) -> Vec<f64> {
        let mut r = StdRng::seed_from_u64(seed);
        let normal = Normal::new(0., 1.).unwrap();

        let mut data_x: Vec<f64> = Vec::with_capacity(capacity);
        for _ in 0..data_x.capacity() {
            data_x.push(normal.sample(&mut r));
        }
        data_x
    }

    /// Gaussian design with a single response stored as a column.
    pub fn generate_random_data(n_samples: usize, n_features: usize) -> (Array2<f64>, Array2<f64>) {
        let data_x = fill_random_vector(n_samples * n_features, 42);
        let data_w = fill_random_vector(n_features, 43);
        let data_e = fill_random_vector(n_samples, 44);
        let X = Array2::from_shape_vec((n_samples, n_features).f(), data_x).unwrap();
        let true_w = Array1::from_shape_vec(n_features, data_w).unwrap();
        let noise = Array1::from_shape_vec(n_samples, data_e).unwrap();
        let y = X.dot(&true_w) + noise;

        (X, y.insert_axis(Axis(1)))
    }

    pub fn generate_random_data_mtl(
        n_samples: usize,
        n_features: usize,
        n_tasks: usize,
    ) -> (Array2<f64>, Array2<f64>) {
        let data_x = fill_random_vector(n_samples * n_features, 42);
        let data_w = fill_random_vector(n_features * n_tasks, 43);
        let data_e = fill_random_vector(n_samples * n_tasks, 44);
        let X = Array2::from_shape_vec((n_samples, n_features).f(), data_x).unwrap();
        let true_W = Array2::from_shape_vec((n_features, n_tasks), data_w).unwrap();
        let noise = Array2::from_shape_vec((n_samples, n_tasks), data_e).unwrap();
        let Y = X.dot(&true_W) + noise;
        (X, Y)
    }
}
