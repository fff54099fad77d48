use ndarray::{array, Array2};

use super::helpers::{log1pexp, sigmoid};
use super::linalg::{leading_sval, singular_values, svd};
use super::prox::{block_soft_thresholding, prox_squared_l1, soft_thresholding};
use super::test_helpers::*;

#[test]
fn test_soft_thresholding() {
    assert_eq!(soft_thresholding(0.3, 2.), 0.);
    assert_eq!(soft_thresholding(12.4, 4.), 8.4);
    assert_eq!(soft_thresholding(-49.2, 4.), -45.2);
}

#[test]
fn test_block_soft_thresholding() {
    let a = array![1.2, -3.4, 12.];
    let b = array![0.3, 0.1, 3.2];
    let soft_a = block_soft_thresholding(a.view(), 4.);
    let soft_b = block_soft_thresholding(b.view(), 4.);

    let true_a = array![0.8169183, -2.31460184, 8.16918295];
    assert_array_all_close(soft_a.view(), true_a.view(), 1e-6);
    assert_array_all_close(soft_b.view(), array![0., 0., 0.].view(), 1e-12);
}

#[test]
fn test_block_soft_thresholding_zero_block() {
    let a = array![[0., 0.], [0., 0.]];
    let res = block_soft_thresholding(a.view(), 0.);
    assert_array2d_all_close(res.view(), a.view(), 1e-12);
}

#[test]
fn test_prox_squared_l1() {
    let x = array![3., 1.];
    let res = prox_squared_l1(x.view(), None, 0.5);
    assert_array_all_close(res.view(), array![1.5, 0.].view(), 1e-12);

    let res_zero = prox_squared_l1(x.view(), None, 0.);
    assert_array_all_close(res_zero.view(), x.view(), 1e-12);
}

#[test]
fn test_prox_squared_l1_weighted() {
    // With w = [2, 1] and mult = 0.25 only the first entry stays active:
    // tau = 0.5 * 2 * 3 / (1 + 0.5 * 4) = 1 and z_0 = 3 - 2 * 1
    let x = array![3., 0.5];
    let w = array![2., 1.];
    let res = prox_squared_l1(x.view(), Some(w.view()), 0.25);
    assert_array_all_close(res.view(), array![1., 0.].view(), 1e-12);
}

#[test]
fn test_svd_reconstruction() {
    let x = array![[3., 1., 2.], [-1., 4., 0.5]];
    let (U, s, Vt) = svd(x.view()).unwrap();
    assert!(s[0] >= s[1]);

    let mut us = U.clone();
    for (k, &sk) in s.iter().enumerate() {
        us.column_mut(k).mapv_inplace(|v| v * sk);
    }
    let rec = us.dot(&Vt);
    assert_array2d_all_close(rec.view(), x.view(), 1e-10);
}

#[test]
fn test_singular_values() {
    let x: Array2<f64> = array![[1., 0.], [0., 3.]];
    let s = singular_values(x.view());
    assert_array_all_close(s.view(), array![3., 1.].view(), 1e-12);
    assert!((leading_sval(x.view()) - 3.).abs() < 1e-12);
    assert_eq!(leading_sval(Array2::<f64>::zeros((0, 0)).view()), 0.);
}

#[test]
fn test_scalar_helpers() {
    assert_eq!(sigmoid(0.), 0.5);
    assert!((log1pexp(0.) - 2f64.ln()).abs() < 1e-12);
    assert!((log1pexp(800f64) - 800.).abs() < 1e-12);
}
