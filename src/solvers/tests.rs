use ndarray::{array, Array1, Array2, Axis};
use std::collections::BTreeMap;

use super::*;
use crate::config::{PenaltyConfig, PenaltyUpdate};
use crate::datafits::{Loss, LossConfig};
use crate::error::GlmError;
use crate::func::{stack_intercept, Func};
use crate::helpers::linalg::solve_spd;
use crate::helpers::prox::soft_thresholding;
use crate::helpers::test_helpers::{
    assert_array2d_all_close, assert_array_all_close, generate_random_data,
    generate_random_data_mtl,
};
use crate::param_guard::ParamGuard;

fn fitted(
    X: &Array2<f64>,
    y: &Array2<f64>,
    penalty: &PenaltyConfig<f64>,
    fit_intercept: bool,
) -> (Solution<f64>, FistaInfo<f64>) {
    let mut solver = FistaSolver::<f64>::default();
    solver
        .setup(
            X.view(),
            y.view(),
            &LossConfig::LeastSquares,
            penalty,
            fit_intercept,
            None,
        )
        .unwrap();
    let (solution, _, info) = solver.solve(None, None, None).unwrap();
    (solution, info)
}

#[test]
fn test_fista_lasso_fixed_point() {
    let (X, y) = generate_random_data(100, 5);
    let (solution, info) = fitted(&X, &y, &PenaltyConfig::lasso(0.1), false);
    assert!(info.converged);
    assert!(solution.intercept.is_none());

    let loss = Loss::new(&LossConfig::LeastSquares, X.view(), y.view(), false, None).unwrap();
    let step = 1. / loss.grad_lip().unwrap();
    let grad = loss.grad(solution.coef.view()).unwrap();
    let expected = (&solution.coef - &(grad * step)).mapv(|v| soft_thresholding(v, step * 0.1));
    assert_array2d_all_close(solution.coef.view(), expected.view(), 1e-8);
}

#[test]
fn test_fista_ridge_closed_form() {
    let (X, y) = generate_random_data(60, 4);
    let (solution, info) = fitted(&X, &y, &PenaltyConfig::ridge(0.5), false);
    assert!(info.converged);

    let n_samples = X.nrows() as f64;
    let gram = X.t().dot(&X) / n_samples + Array2::<f64>::eye(4) * 0.5;
    let rhs = X.t().dot(&y) / n_samples;
    let expected = solve_spd(gram.view(), rhs.view()).unwrap();
    assert_array2d_all_close(solution.coef.view(), expected.view(), 1e-8);
}

#[test]
fn test_fista_intercept_normal_equations() {
    let (X, y) = generate_random_data(50, 3);
    let y = y + 3.;
    let (solution, _) = fitted(&X, &y, &PenaltyConfig::no_penalty(), true);
    let intercept = solution.intercept.unwrap();
    assert_eq!(intercept.len(), 1);

    let loss = Loss::new(&LossConfig::LeastSquares, X.view(), y.view(), true, None).unwrap();
    let z = stack_intercept(Some(intercept.view()), solution.coef.view());
    let grad = loss.grad(z.view()).unwrap();
    assert_array2d_all_close(grad.view(), Array2::zeros((4, 1)).view(), 1e-7);
}

#[test]
fn test_fista_intercept_is_not_penalized() {
    let (X, y) = generate_random_data(40, 3);
    let y = y + 10.;
    let (solution, _) = fitted(&X, &y, &PenaltyConfig::lasso(1e3), true);
    // the coefficients vanish and the intercept fits the mean
    assert_array2d_all_close(solution.coef.view(), Array2::zeros((3, 1)).view(), 1e-12);
    let mean = y.mean_axis(Axis(0)).unwrap();
    assert_array_all_close(solution.intercept.unwrap().view(), mean.view(), 1e-8);
}

#[test]
fn test_fista_zero_weights_is_unpenalized() {
    let (X, y) = generate_random_data(50, 5);
    let (reference, _) = fitted(&X, &y, &PenaltyConfig::no_penalty(), false);

    let mut solver = FistaSolver::<f64>::default();
    solver
        .setup(
            X.view(),
            y.view(),
            &LossConfig::LeastSquares,
            &PenaltyConfig::lasso(0.1),
            false,
            None,
        )
        .unwrap();
    solver
        .update_penalty(PenaltyUpdate::Weights(Array1::zeros(5)))
        .unwrap();
    let (solution, _, _) = solver.solve(None, None, None).unwrap();
    assert_array2d_all_close(solution.coef.view(), reference.coef.view(), 1e-7);
}

#[test]
fn test_fista_warm_start() {
    let (X, y) = generate_random_data(80, 6);
    let mut solver = FistaSolver::<f64>::default();
    solver
        .setup(
            X.view(),
            y.view(),
            &LossConfig::LeastSquares,
            &PenaltyConfig::lasso(0.05),
            false,
            None,
        )
        .unwrap();
    let (cold, _, cold_info) = solver.solve(None, None, None).unwrap();
    let (warm, _, warm_info) = solver.solve(Some(cold.coef.view()), None, None).unwrap();
    assert!(warm_info.n_iter <= cold_info.n_iter);
    assert_array2d_all_close(warm.coef.view(), cold.coef.view(), 1e-8);
}

#[test]
fn test_fista_multi_task_lasso_fixed_point() {
    let (X, Y) = generate_random_data_mtl(50, 4, 3);
    let (solution, _) = fitted(&X, &Y, &PenaltyConfig::multi_task_lasso(0.2), false);
    assert_eq!(solution.coef.dim(), (4, 3));

    let loss = Loss::new(&LossConfig::LeastSquares, X.view(), Y.view(), false, None).unwrap();
    let step = 1. / loss.grad_lip().unwrap();
    let grad = loss.grad(solution.coef.view()).unwrap();
    let mut expected = &solution.coef - &(grad * step);
    for mut row in expected.rows_mut() {
        let norm = row.dot(&row).sqrt();
        let scale = if norm > step * 0.2 {
            1. - step * 0.2 / norm
        } else {
            0.
        };
        row.mapv_inplace(|v| v * scale);
    }
    assert_array2d_all_close(solution.coef.view(), expected.view(), 1e-8);
}

#[test]
fn test_fista_logistic_optimality() {
    let X = array![[1., 0.5], [-0.3, 1.2], [0.8, -1.], [-1.5, 0.2], [0.4, 0.9], [-0.7, -0.6]];
    let y = array![[1.], [0.], [1.], [0.], [0.], [1.]];
    let mut solver = FistaSolver::<f64>::default();
    solver
        .setup(
            X.view(),
            y.view(),
            &LossConfig::Logistic,
            &PenaltyConfig::ridge(0.1),
            true,
            None,
        )
        .unwrap();
    let (solution, _, info) = solver.solve(None, None, None).unwrap();
    assert!(info.converged);

    let loss = Loss::new(&LossConfig::Logistic, X.view(), y.view(), true, None).unwrap();
    let intercept = solution.intercept.unwrap();
    let z = stack_intercept(Some(intercept.view()), solution.coef.view());
    let mut grad = loss.grad(z.view()).unwrap();
    for i in 1..3 {
        grad[[i, 0]] += 0.1 * z[[i, 0]];
    }
    assert_array2d_all_close(grad.view(), Array2::zeros((3, 1)).view(), 1e-7);
}

#[test]
fn test_fista_max_iter_reached() {
    let (X, y) = generate_random_data(30, 4);
    let params = FistaParams::new().max_iter(2).check().unwrap();
    let mut solver = FistaSolver::new(params);
    solver
        .setup(
            X.view(),
            y.view(),
            &LossConfig::LeastSquares,
            &PenaltyConfig::lasso(0.01),
            false,
            None,
        )
        .unwrap();
    let (_, _, info) = solver.solve(None, None, None).unwrap();
    assert_eq!(info.n_iter, 2);
    assert!(!info.converged);
}

#[test]
fn test_fista_used_before_setup() {
    let mut solver = FistaSolver::<f64>::default();
    assert!(matches!(
        solver.solve(None, None, None),
        Err(GlmError::NotApplicable(_))
    ));
    assert!(matches!(
        solver.update_penalty(PenaltyUpdate::PenVal(1.)),
        Err(GlmError::NotApplicable(_))
    ));
}

#[test]
fn test_fista_rejects_non_smooth_part_without_prox() {
    let (X, y) = generate_random_data(20, 3);
    let mat = array![[1., -1., 0.], [0., 1., -1.]];
    let mut solver = FistaSolver::<f64>::default();
    solver
        .setup(
            X.view(),
            y.view(),
            &LossConfig::LeastSquares,
            &PenaltyConfig::generalized_lasso(0.1, mat),
            false,
            None,
        )
        .unwrap();
    assert!(matches!(
        solver.solve(None, None, None),
        Err(GlmError::Configuration(_))
    ));
}

#[test]
fn test_fista_nested_overlapping_sum() {
    let (X, y) = generate_random_data(60, 4);
    let inner = BTreeMap::from([
        ("l1".to_string(), PenaltyConfig::lasso(0.1)),
        ("l2".to_string(), PenaltyConfig::ridge(0.5)),
    ]);
    let nested = PenaltyConfig::overlapping_sum(BTreeMap::from([(
        "inner".to_string(),
        PenaltyConfig::overlapping_sum(inner),
    )]));
    let (solution, info) = fitted(&X, &y, &nested, false);
    assert!(info.converged);

    let (expected, _) = fitted(&X, &y, &PenaltyConfig::elastic_net(0.6, 0.1 / 0.6), false);
    assert_array2d_all_close(solution.coef.view(), expected.coef.view(), 1e-6);
}

#[test]
fn test_fista_rejects_bad_init() {
    let (X, y) = generate_random_data(20, 3);
    let mut solver = FistaSolver::<f64>::default();
    solver
        .setup(
            X.view(),
            y.view(),
            &LossConfig::LeastSquares,
            &PenaltyConfig::lasso(0.1),
            true,
            None,
        )
        .unwrap();
    let coef = Array2::<f64>::zeros((2, 1));
    assert!(matches!(
        solver.solve(Some(coef.view()), None, None),
        Err(GlmError::Configuration(_))
    ));
    let intercept = Array1::<f64>::zeros(2);
    assert!(matches!(
        solver.solve(None, Some(intercept.view()), None),
        Err(GlmError::Configuration(_))
    ));
}

#[test]
fn test_fista_params() {
    let params = FistaParams::<f64>::new().check().unwrap();
    assert_eq!(params.max_iter(), 5000);
    assert_eq!(params.tol(), 1e-10);
    assert!(params.restart());

    assert!(FistaParams::<f64>::new().tol(-1.).check().is_err());
    assert!(FistaParams::<f64>::new().max_iter(0).check().is_err());
}
