use approx::assert_abs_diff_eq;
use ndarray::array;

use crate::config::Groups;
use crate::func::Func;
use crate::helpers::test_helpers::{assert_array2d_all_close, assert_array_all_close};
use crate::penalties::nonconvex::*;

fn mcp(pen_val: f64, gamma: f64) -> NonConvexFunc<f64> {
    NonConvexFunc::new(NonConvexKind::Mcp, pen_val, Some(gamma)).unwrap()
}

fn scad(pen_val: f64, a: f64) -> NonConvexFunc<f64> {
    NonConvexFunc::new(NonConvexKind::Scad, pen_val, Some(a)).unwrap()
}

/// Minimizes step * p(z) + 0.5 * (z - t)^2 over a fine grid of [0, t + 1].
fn grid_prox(func: &NonConvexFunc<f64>, t: f64, step: f64) -> f64 {
    let n_points = ((t + 1.) * 1e4) as usize;
    (0..=n_points)
        .map(|k| k as f64 * 1e-4)
        .map(|z| (z, step * func.scalar_value(z) + 0.5 * (z - t).powi(2)))
        .fold((0., f64::INFINITY), |best, cand| if cand.1 < best.1 { cand } else { best })
        .0
}

#[test]
fn test_value_mcp() {
    let a = array![[3.4], [2.1], [-2.3], [-0.3], [4.5]];
    let payloads = [(3.2, 3., 33.38666666666667), (2., 3., 18.266666666666666), (1., 2.5, 5.242)];
    for &(pen_val, gamma, expected) in payloads.iter() {
        let pen = CompositeNonConvex::new(mcp(pen_val, gamma), NonSmoothTransform::Entrywise);
        assert_abs_diff_eq!(pen.value(a.view()), expected, epsilon = 1e-10);
    }
}

#[test]
fn test_prox_mcp() {
    let a = array![[0.3], [12.4], [-49.2]];
    for &(pen_val, gamma) in [(3.2, 3.), (2., 3.), (1., 2.5)].iter() {
        let pen = CompositeNonConvex::new(mcp(pen_val, gamma), NonSmoothTransform::Entrywise);
        let prox = pen.prox(a.view(), 2.).unwrap();
        assert_array2d_all_close(prox.view(), array![[0.], [12.4], [-49.2]].view(), 1e-12);
    }
}

#[test]
fn test_mcp_hard_thresholding() {
    // gamma <= step: threshold at sqrt(2)
    let func = mcp(1., 1.);
    assert_eq!(func.scalar_prox(1.2, 2.).unwrap(), 0.);
    assert_eq!(func.scalar_prox(1.5, 2.).unwrap(), 1.5);
}

#[test]
fn test_scalar_prox_minimizes() {
    let funcs = [mcp(1., 3.), scad(1., 3.7)];
    for func in funcs.iter() {
        for &t in [0.5, 1.5, 2.5, 3., 5.].iter() {
            let prox = func.scalar_prox(t, 1.).unwrap();
            assert_abs_diff_eq!(prox, grid_prox(func, t, 1.), epsilon = 1e-3);
        }
    }
}

#[test]
fn test_scad_value_and_grad() {
    let func = scad(1., 3.7);
    assert_abs_diff_eq!(func.scalar_value(0.5), 0.5, epsilon = 1e-12);
    assert_abs_diff_eq!(func.scalar_value(1.), 1., epsilon = 1e-12);
    // Continuous at a * pen_val
    assert_abs_diff_eq!(func.scalar_value(3.7), 2.35, epsilon = 1e-10);
    assert_abs_diff_eq!(func.scalar_value(10.), 2.35, epsilon = 1e-10);

    let grad = func.grad(array![0., 1., 2., 3.7, 5.].view());
    assert_array_all_close(grad.view(), array![1., 1., 1.7 / 2.7, 0., 0.].view(), 1e-12);

    assert_abs_diff_eq!(func.scalar_prox(1.5, 1.).unwrap(), 0.5, epsilon = 1e-12);
    assert_abs_diff_eq!(func.scalar_prox(3., 1.).unwrap(), 4.4 / 1.7, epsilon = 1e-12);
    assert_abs_diff_eq!(func.scalar_prox(5., 1.).unwrap(), 5., epsilon = 1e-12);
}

#[test]
fn test_scad_prox_needs_small_step() {
    let func = scad(1., 2.5);
    assert!(func.has_prox(1.));
    assert!(!func.has_prox(1.5));
    assert!(func.scalar_prox(3., 1.5).is_err());
}

#[test]
fn test_log_penalty() {
    let func = NonConvexFunc::new(NonConvexKind::Log, 2., Some(0.5)).unwrap();
    assert_abs_diff_eq!(func.scalar_value(1.), 2. * 3f64.ln(), epsilon = 1e-12);
    assert_abs_diff_eq!(func.scalar_grad(0.), 4., epsilon = 1e-12);
    assert_abs_diff_eq!(func.scalar_grad(1.5), 1., epsilon = 1e-12);
    assert!(func.scalar_prox(1., 1.).is_err());

    let pen = CompositeNonConvex::new(func, NonSmoothTransform::Entrywise);
    assert!(!pen.has_prox());
}

#[test]
fn test_default_and_invalid_params() {
    let func = NonConvexFunc::<f64>::new(NonConvexKind::Scad, 1., None).unwrap();
    assert_eq!(func.second_param(), 3.7);
    let func = NonConvexFunc::<f64>::new(NonConvexKind::Mcp, 1., None).unwrap();
    assert_eq!(func.second_param(), 3.);
    let func = NonConvexFunc::<f64>::new(NonConvexKind::Log, 1., None).unwrap();
    assert_eq!(func.second_param(), 1.);

    assert!(NonConvexFunc::<f64>::new(NonConvexKind::Scad, 1., Some(1.)).is_err());
    assert!(NonConvexFunc::<f64>::new(NonConvexKind::Mcp, 1., Some(0.)).is_err());
    assert!(NonConvexFunc::<f64>::new(NonConvexKind::Log, 1., Some(-1.)).is_err());
    assert!(NonConvexFunc::<f64>::new(NonConvexKind::Mcp, -1., None).is_err());
}

#[test]
fn test_transforms() {
    let x = array![[1., -2.], [3., -4.], [0., 0.]];

    let entrywise = NonSmoothTransform::<f64>::Entrywise.apply(x.view());
    assert_array_all_close(entrywise.view(), array![1., 2., 3., 4., 0., 0.].view(), 1e-12);

    let rows = NonSmoothTransform::<f64>::RowNorms.apply(x.view());
    assert_array_all_close(rows.view(), array![5f64.sqrt(), 5., 0.].view(), 1e-12);

    let groups = Groups::Explicit(vec![vec![0, 2], vec![1]]);
    let group_norms = NonSmoothTransform::<f64>::GroupNorms(groups).apply(x.view());
    assert_array_all_close(group_norms.view(), array![5f64.sqrt(), 5.].view(), 1e-12);

    let diag = array![[3., 0.], [0., -2.]];
    let svals = NonSmoothTransform::<f64>::SingularValues.apply(diag.view());
    assert_array_all_close(svals.view(), array![3., 2.].view(), 1e-10);

    let mat = array![[1., -1., 0.]];
    let linear = NonSmoothTransform::Linear(mat).apply(x.view());
    assert_array_all_close(linear.view(), array![2., 2.].view(), 1e-12);
}

#[test]
fn test_group_composite_prox() {
    // Group norms are 5, 1 and 2
    let x = array![[3., 4.], [0.6, 0.8], [2., 0.]];
    let groups = Groups::Explicit(vec![vec![0], vec![1], vec![2]]);
    let pen = CompositeNonConvex::new(mcp(1., 3.), NonSmoothTransform::GroupNorms(groups));
    let prox = pen.prox(x.view(), 1.).unwrap();
    let expected = array![[3., 4.], [0., 0.], [1.5, 0.]];
    assert_array2d_all_close(prox.view(), expected.view(), 1e-12);

    let rows = CompositeNonConvex::new(mcp(1., 3.), NonSmoothTransform::RowNorms);
    let prox = rows.prox(x.view(), 1.).unwrap();
    assert_array2d_all_close(prox.view(), expected.view(), 1e-12);
}

#[test]
fn test_singular_value_composite_prox() {
    let x = array![[5., 0.], [0., 2.]];
    let pen = CompositeNonConvex::new(mcp(1., 3.), NonSmoothTransform::SingularValues);
    let prox = pen.prox(x.view(), 1.).unwrap();
    assert_array2d_all_close(prox.view(), array![[5., 0.], [0., 1.5]].view(), 1e-10);
}

#[test]
fn test_linear_composite_has_no_prox() {
    let pen = CompositeNonConvex::new(
        scad(1., 3.7),
        NonSmoothTransform::Linear(array![[1., -1.]]),
    );
    assert!(!pen.has_prox());
    assert!(pen.prox(array![[1.], [2.]].view(), 1.).is_err());
    let expected = (2. * 3.7 * 2. - 4. - 1.) / 5.4;
    assert_abs_diff_eq!(pen.value(array![[1.], [3.]].view()), expected, epsilon = 1e-12);
}

#[test]
fn test_zero_step_and_zero_pen_val() {
    let x = array![[0.3, -1.2], [12.4, 0.], [-49.2, 3.3]];
    let transforms = vec![
        NonSmoothTransform::Entrywise,
        NonSmoothTransform::RowNorms,
        NonSmoothTransform::GroupNorms(Groups::AllCoordinates),
        NonSmoothTransform::SingularValues,
    ];
    for transform in transforms {
        let pen = CompositeNonConvex::new(scad(1.5, 3.7), transform.clone());
        let prox = pen.prox(x.view(), 0.).unwrap();
        assert_array2d_all_close(prox.view(), x.view(), 1e-12);

        let pen = CompositeNonConvex::new(mcp(0., 3.), transform);
        let prox = pen.prox(x.view(), 2.).unwrap();
        assert_array2d_all_close(prox.view(), x.view(), 1e-12);
    }
}
