use approx::assert_abs_diff_eq;
use ndarray::{array, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use super::*;
use crate::config::Groups;
use crate::helpers::test_helpers::assert_array2d_all_close;
use crate::penalties::{GroupLasso, Lasso, Ridge};

fn random_point(shape: (usize, usize), rng: &mut StdRng) -> Array2<f64> {
    let normal = Normal::new(0., 3.).unwrap();
    Array2::from_shape_fn(shape, |_| normal.sample(rng))
}

fn evaluate(part: &Option<Box<dyn Func<f64>>>, x: &Array2<f64>) -> f64 {
    part.as_ref().map_or(0., |f| f.value(x.view()))
}

#[test]
fn test_zero() {
    let x = array![[1., -2.], [3., 4.]];
    let zero = Zero;
    assert_eq!(Func::<f64>::value(&zero, x.view()), 0.);
    assert_eq!(zero.grad(x.view()).unwrap(), Array2::<f64>::zeros((2, 2)));
    assert_eq!(zero.prox(x.view(), 3.).unwrap(), x);
    assert_eq!(Func::<f64>::grad_lip(&zero), Some(0.));
}

#[test]
fn test_sum() {
    let x = array![[1.], [-2.], [3.]];
    let sum = Sum::new(vec![
        Box::new(Ridge::new(2., None)),
        Box::new(Lasso::new(0.5, None)),
    ]);
    assert_abs_diff_eq!(sum.value(x.view()), 14. + 3., epsilon = 1e-12);
    assert!(!sum.is_smooth());
    assert!(!sum.has_prox());
    assert!(sum.prox(x.view(), 1.).is_err());
    assert!(sum.grad(x.view()).is_err());
    assert!(sum.grad_lip().is_none());

    let smooth = Sum::<f64>::new(vec![
        Box::new(Ridge::new(2., None)),
        Box::new(Ridge::new(0.5, None)),
    ]);
    assert!(smooth.is_smooth());
    assert_eq!(smooth.grad_lip(), Some(2.5));
    let grad = smooth.grad(x.view()).unwrap();
    assert_array2d_all_close(grad.view(), (&x * 2.5).view(), 1e-12);

    let single = Sum::<f64>::new(vec![Box::new(Lasso::new(1., None))]);
    assert!(single.has_prox());
    let prox = single.prox(x.view(), 1.).unwrap();
    assert_array2d_all_close(prox.view(), array![[0.], [-1.], [2.]].view(), 1e-12);
}

#[test]
fn test_split_leaves() {
    let ridge: Box<dyn Func<f64>> = Box::new(Ridge::new(1., None));
    let (smooth, non_smooth) = ridge.split();
    assert!(smooth.is_some());
    assert!(non_smooth.is_none());

    let lasso: Box<dyn Func<f64>> = Box::new(Lasso::new(1., None));
    let (smooth, non_smooth) = lasso.split();
    assert!(smooth.is_none());
    assert_eq!(non_smooth.unwrap().name(), "Lasso");
}

#[test]
fn test_split_completeness() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..20 {
        let sum: Box<dyn Func<f64>> = Box::new(Sum::new(vec![
            Box::new(Ridge::new(0.7, None)),
            Box::new(Lasso::new(1.3, None)),
            Box::new(Ridge::new(2., Some(array![1., 0., 2., 3., 0.5, 1.]))),
            Box::new(Lasso::new(0.2, Some(array![0., 1., 1., 5., 2., 1.]))),
        ]));
        let x = random_point((3, 2), &mut rng);
        let expected = sum.value(x.view());

        let (smooth, non_smooth) = sum.split();
        assert!(smooth.as_ref().unwrap().is_smooth());
        assert!(!non_smooth.as_ref().unwrap().is_smooth());
        assert_abs_diff_eq!(
            evaluate(&smooth, &x) + evaluate(&non_smooth, &x),
            expected,
            epsilon = 1e-10
        );
    }
}

#[test]
fn test_split_nested_sums() {
    let mut rng = StdRng::seed_from_u64(7);
    let inner: Box<dyn Func<f64>> = Box::new(Sum::new(vec![
        Box::new(Lasso::new(1.3, None)),
        Box::new(Ridge::new(0.7, None)),
    ]));
    let nested: Box<dyn Func<f64>> = Box::new(Sum::new(vec![inner]));
    let x = random_point((3, 2), &mut rng);
    let expected = nested.value(x.view());
    assert!(!nested.is_smooth());

    let (smooth, non_smooth) = nested.split();
    assert_eq!(smooth.as_ref().unwrap().name(), "Ridge");
    let non_smooth_ref = non_smooth.as_ref().unwrap();
    assert_eq!(non_smooth_ref.name(), "Lasso");
    assert!(non_smooth_ref.has_prox());
    assert_abs_diff_eq!(
        evaluate(&smooth, &x) + evaluate(&non_smooth, &x),
        expected,
        epsilon = 1e-10
    );

    // Deeper nesting on both sides
    let deep: Box<dyn Func<f64>> = Box::new(Sum::new(vec![
        Box::new(Sum::new(vec![
            Box::new(Ridge::new(1., None)),
            Box::new(Sum::new(vec![Box::new(Lasso::new(0.5, None))])),
        ])),
        Box::new(Sum::new(vec![Box::new(Ridge::new(2., None))])),
    ]));
    let expected = deep.value(x.view());
    let (smooth, non_smooth) = deep.split();
    assert!(smooth.as_ref().unwrap().is_smooth());
    assert_eq!(non_smooth.as_ref().unwrap().name(), "Lasso");
    assert_abs_diff_eq!(
        evaluate(&smooth, &x) + evaluate(&non_smooth, &x),
        expected,
        epsilon = 1e-10
    );
}

#[test]
fn test_split_single_term_sums() {
    let sum: Box<dyn Func<f64>> = Box::new(Sum::new(vec![
        Box::new(Ridge::new(1., None)),
        Box::new(Lasso::new(1., None)),
    ]));
    let (smooth, non_smooth) = sum.split();
    // A single term is not wrapped in a sum
    assert_eq!(smooth.unwrap().name(), "Ridge");
    assert_eq!(non_smooth.unwrap().name(), "Lasso");
}

#[test]
fn test_with_intercept() {
    let x = array![[5., -5.], [1., -2.], [3., 0.5]];
    let wrapped = WithIntercept::new(Box::new(Lasso::new(1., None)));
    assert_abs_diff_eq!(wrapped.value(x.view()), 6.5, epsilon = 1e-12);

    let prox = wrapped.prox(x.view(), 1.).unwrap();
    assert_array2d_all_close(
        prox.view(),
        array![[5., -5.], [0., -1.], [2., 0.]].view(),
        1e-12,
    );

    let ridge = WithIntercept::new(Box::new(Ridge::new(2., None)));
    let grad = ridge.grad(x.view()).unwrap();
    assert_array2d_all_close(
        grad.view(),
        array![[0., 0.], [2., -4.], [6., 1.]].view(),
        1e-12,
    );
}

#[test]
fn test_with_intercept_split() {
    let x = array![[10.], [1.], [-2.]];
    let wrapped: Box<dyn Func<f64>> = Box::new(WithIntercept::new(Box::new(Sum::new(vec![
        Box::new(Ridge::new(1., None)),
        Box::new(Lasso::new(1., None)),
    ]))));
    let expected = wrapped.value(x.view());
    let (smooth, non_smooth) = wrapped.split();
    let smooth = smooth.unwrap();
    let non_smooth = non_smooth.unwrap();
    assert_eq!(smooth.name(), "WithIntercept");
    assert_eq!(non_smooth.name(), "WithIntercept");
    assert_abs_diff_eq!(
        smooth.value(x.view()) + non_smooth.value(x.view()),
        expected,
        epsilon = 1e-12
    );
}

#[test]
fn test_stack_intercept() {
    let coef = array![[1., 2.], [3., 4.]];
    let intercept = array![-1., -2.];
    let z = stack_intercept(Some(intercept.view()), coef.view());
    assert_eq!(z, array![[-1., -2.], [1., 2.], [3., 4.]]);

    let (coef_back, intercept_back) = unstack_intercept(z.view(), true);
    assert_eq!(coef_back, coef);
    assert_eq!(intercept_back, Some(intercept));

    let (same, none) = unstack_intercept(coef.view(), false);
    assert_eq!(same, coef);
    assert!(none.is_none());
}

#[test]
fn test_block_separable() {
    let x = array![[1.], [-2.], [3.], [4.]];
    let groups = Groups::Explicit(vec![vec![0, 2], vec![1, 3]]);
    let func = BlockSeparable::new(
        vec![
            Box::new(Ridge::new(1., None)),
            Box::new(GroupLasso::new(1., Groups::AllCoordinates, None).unwrap()),
        ],
        groups,
    )
    .unwrap();

    // 0.5 * (1 + 9) + sqrt(4 + 16)
    assert_abs_diff_eq!(func.value(x.view()), 5. + 20f64.sqrt(), epsilon = 1e-12);
    assert!(!func.is_smooth());
    assert!(func.has_prox());

    let prox = func.prox(x.view(), 1.).unwrap();
    let scale = 1. - 1. / 20f64.sqrt();
    let expected = array![[0.5], [-2. * scale], [1.5], [4. * scale]];
    assert_array2d_all_close(prox.view(), expected.view(), 1e-12);
}

#[test]
fn test_block_separable_grad_and_split() {
    let x = array![[1., 1.], [-2., 0.], [3., -1.]];
    let groups = Groups::Explicit(vec![vec![1], vec![0, 2]]);
    let func: Box<dyn Func<f64>> = Box::new(
        BlockSeparable::new(
            vec![
                Box::new(Ridge::new(3., None)),
                Box::new(Sum::new(vec![
                    Box::new(Ridge::new(1., None)),
                    Box::new(Lasso::new(2., None)),
                ])),
            ],
            groups,
        )
        .unwrap(),
    );
    let expected = func.value(x.view());

    let (smooth, non_smooth) = func.split();
    let smooth = smooth.unwrap();
    let non_smooth = non_smooth.unwrap();
    assert!(smooth.is_smooth());
    assert_eq!(smooth.grad_lip(), Some(3.));
    assert_abs_diff_eq!(
        smooth.value(x.view()) + non_smooth.value(x.view()),
        expected,
        epsilon = 1e-12
    );

    let grad = smooth.grad(x.view()).unwrap();
    let expected_grad = array![[1., 1.], [-6., 0.], [3., -1.]];
    assert_array2d_all_close(grad.view(), expected_grad.view(), 1e-12);
}

#[test]
fn test_block_separable_rejects_bad_groups() {
    let overlapping = Groups::Explicit(vec![vec![0, 1], vec![1]]);
    let funcs: Vec<Box<dyn Func<f64>>> =
        vec![Box::new(Ridge::new(1., None)), Box::new(Ridge::new(1., None))];
    assert!(BlockSeparable::new(funcs, overlapping).is_err());

    let funcs: Vec<Box<dyn Func<f64>>> =
        vec![Box::new(Ridge::new(1., None)), Box::new(Ridge::new(1., None))];
    assert!(BlockSeparable::new(funcs, Groups::AllCoordinates).is_err());
}
