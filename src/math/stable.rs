//! Numerically stable building blocks shared by every loss.
//!
//! All of them work on plain slices so the losses can apply them row by row
//! along the class axis.

use crate::error::{LossError, Result};
use crate::math::tensor::Tensor;

/// `log(sum(exp(x_i)))` with the max shifted out.
///
/// Empty input and all `-inf` input give `-inf`; any `+inf` gives `+inf`.
pub fn logsumexp(xs: &[f64]) -> f64 {
    let m = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if m == f64::NEG_INFINITY || m == f64::INFINITY {
        return m;
    }
    m + xs.iter().map(|x| (x - m).exp()).sum::<f64>().ln()
}

/// `x_i - logsumexp(x)` for one row.
pub fn log_softmax(xs: &[f64]) -> Vec<f64> {
    let lse = logsumexp(xs);
    xs.iter().map(|x| x - lse).collect()
}

/// `exp(x_i - logsumexp(x))` for one row; entries at `-inf` come out as exactly 0.
pub fn softmax(xs: &[f64]) -> Vec<f64> {
    let lse = logsumexp(xs);
    xs.iter().map(|x| (x - lse).exp()).collect()
}

/// Row-wise `log_softmax` over the last axis.
pub fn log_softmax_rows(t: &Tensor) -> Tensor {
    apply_rows(t, log_softmax)
}

/// Row-wise `softmax` over the last axis.
pub fn softmax_rows(t: &Tensor) -> Tensor {
    apply_rows(t, softmax)
}

fn apply_rows(t: &Tensor, f: fn(&[f64]) -> Vec<f64>) -> Tensor {
    let mut out = t.clone();
    for i in 0..t.rows() {
        let row = f(t.row(i));
        out.row_mut(i).copy_from_slice(&row);
    }
    out
}

/// `ln(clamp(x, lo, hi))`.  `lo` must be strictly positive so the result is finite.
pub fn clamped_ln(x: f64, lo: f64, hi: f64) -> f64 {
    debug_assert!(lo > 0.0 && lo <= hi);
    x.clamp(lo, hi).ln()
}

pub fn relu(x: f64) -> f64 {
    if x > 0.0 { x } else { 0.0 }
}

/// Explicit outer difference: `m[i][j] = a[i] - b[j]`, shape `[n, n]`.
pub fn outer_difference(a: &[f64], b: &[f64]) -> Result<Tensor> {
    if a.len() != b.len() {
        return Err(LossError::shape("outer_difference", &[a.len()], &[b.len()]));
    }
    let n = a.len();
    let data = a.iter()
        .flat_map(|ai| b.iter().map(move |bj| ai - bj))
        .collect();
    Tensor::new(vec![n, n], data)
}
