use serde::{Serialize, Deserialize};

use crate::error::{LossError, Result};
use crate::loss::reduction::Reduction;
use crate::math::stable::{log_softmax_rows, softmax_rows};
use crate::math::tensor::Tensor;

/// Target value that marks an example as excluded from the loss.
pub const DEFAULT_IGNORE_INDEX: i64 = -100;

/// Categorical cross-entropy on raw logits with integer class targets.
///
/// `logits`  — shape [..., n_classes]
/// `targets` — one class index per logits row, `ignore_index` to skip the row
///
/// The mean is taken over non-ignored rows only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossEntropyLoss {
    pub ignore_index: i64,
}

impl Default for CrossEntropyLoss {
    fn default() -> Self {
        CrossEntropyLoss { ignore_index: DEFAULT_IGNORE_INDEX }
    }
}

impl CrossEntropyLoss {
    pub fn compute(&self, logits: &Tensor, targets: &[i64]) -> Result<f64> {
        let log_probs = log_softmax_rows(logits);
        let out = nll_loss(&log_probs, targets, None, self.ignore_index, Reduction::Mean)?;
        Ok(out.item().unwrap_or(0.0))
    }

    /// Gradient w.r.t. the logits:
    ///   ∂L/∂z_ij = (softmax(z_i)_j - onehot(t_i)_j) / n_kept
    /// and zero for ignored rows.
    pub fn derivative(&self, logits: &Tensor, targets: &[i64]) -> Result<Tensor> {
        check_class_targets(logits, targets, self.ignore_index, "CrossEntropyLoss")?;
        let kept = targets.iter().filter(|&&t| t != self.ignore_index).count() as f64;
        let scale = Reduction::Mean.grad_scale(kept);
        let mut grad = softmax_rows(logits);
        for (i, &t) in targets.iter().enumerate() {
            let row = grad.row_mut(i);
            if t == self.ignore_index {
                row.fill(0.0);
                continue;
            }
            row[t as usize] -= 1.0;
            row.iter_mut().for_each(|g| *g *= scale);
        }
        Ok(grad)
    }
}

/// Negative log-likelihood over already-normalised log-probabilities.
///
/// Picks `-w[t] * log_probs[i][t]` for every non-ignored row and reduces it;
/// `Mean` divides by the summed weight of the kept rows.  Ignored rows
/// contribute 0 (and still occupy a slot under `Reduction::None`).
pub fn nll_loss(
    log_probs: &Tensor,
    targets: &[i64],
    weight: Option<&[f64]>,
    ignore_index: i64,
    reduction: Reduction,
) -> Result<Tensor> {
    let n_classes = check_class_targets(log_probs, targets, ignore_index, "nll_loss")?;
    if let Some(w) = weight {
        if w.len() != n_classes {
            return Err(LossError::shape("nll_loss weight", &[n_classes], &[w.len()]));
        }
    }

    let mut values = Vec::with_capacity(targets.len());
    let mut weights = Vec::with_capacity(targets.len());
    for (row, &t) in log_probs.iter_rows().zip(targets) {
        if t == ignore_index {
            values.push(0.0);
            weights.push(0.0);
            continue;
        }
        let w = weight.map_or(1.0, |w| w[t as usize]);
        values.push(-w * row[t as usize]);
        weights.push(w);
    }
    reduction.apply_weighted(values, &weights, log_probs.leading_shape())
}

/// Checks that `targets` has one entry per logits row and that every
/// non-ignored entry is a valid class.  Returns the class count.
pub(crate) fn check_class_targets(
    logits: &Tensor,
    targets: &[i64],
    ignore_index: i64,
    context: &'static str,
) -> Result<usize> {
    if logits.ndim() < 2 {
        return Err(LossError::shape(context, &[targets.len(), logits.cols()], logits.shape()));
    }
    if logits.rows() != targets.len() {
        return Err(LossError::shape(context, logits.leading_shape(), &[targets.len()]));
    }
    let n_classes = logits.cols();
    if let Some(bad) = targets.iter().find(|&&t| t != ignore_index && (t < 0 || t as usize >= n_classes)) {
        return Err(LossError::target(context, format!("class index {bad} outside [0, {n_classes})")));
    }
    Ok(n_classes)
}
