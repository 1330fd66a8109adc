#![allow(dead_code)]

use ferrite_losses::Tensor;
use rand::prelude::*;

const STEP: f64 = 1e-6;

/// Central finite-difference gradient of `f` at `x`.
pub fn numeric_gradient<F>(x: &Tensor, f: F) -> Tensor
where
    F: Fn(&Tensor) -> f64,
{
    let mut grad = Tensor::zeros(x.shape());
    for i in 0..x.len() {
        let mut plus = x.clone();
        plus.data_mut()[i] += STEP;
        let mut minus = x.clone();
        minus.data_mut()[i] -= STEP;
        grad.data_mut()[i] = (f(&plus) - f(&minus)) / (2.0 * STEP);
    }
    grad
}

pub fn assert_gradients_close(analytic: &Tensor, numeric: &Tensor, tol: f64) {
    assert_eq!(analytic.shape(), numeric.shape());
    for (i, (a, n)) in analytic.data().iter().zip(numeric.data()).enumerate() {
        assert!(
            (a - n).abs() <= tol * (1.0 + n.abs()),
            "gradient mismatch at {i}: analytic {a} vs numeric {n}"
        );
    }
}

/// Reproducible logits scaled into [-scale, scale).
pub fn random_logits(shape: &[usize], scale: f64, seed: u64) -> Tensor {
    let mut rng = StdRng::seed_from_u64(seed);
    Tensor::random(shape, &mut rng).map(|x| x * scale)
}
