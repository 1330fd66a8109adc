use crate::error::{LossError, Result};
use crate::math::stable::{logsumexp, softmax};
use crate::math::tensor::Tensor;

/// Offset that pushes a logit out of its log-sum-exp group.
const MASK_OFFSET: f64 = 1e12;

/// Multi-label categorical cross-entropy with dense multi-hot targets.
///
/// Every positive score should beat every negative one, with 0 as the
/// implicit decision boundary:
///   L = log(1 + Σ_{pos} e^{-s_i}) + log(1 + Σ_{neg} e^{s_j})
/// averaged over rows.  At inference, predict the classes whose logit is > 0.
///
/// Logits must be raw scores over all reals; never feed sigmoid or softmax output.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MultilabelCategoricalCrossentropy;

impl MultilabelCategoricalCrossentropy {
    pub fn new() -> MultilabelCategoricalCrossentropy {
        MultilabelCategoricalCrossentropy
    }

    /// `y_pred`, `y_true` — same shape [..., n_classes]; `y_true` strictly 0/1.
    pub fn compute(&self, y_pred: &Tensor, y_true: &Tensor) -> Result<f64> {
        check_multi_hot(y_pred, y_true)?;
        let rows = y_pred.rows();
        if rows == 0 {
            return Ok(0.0);
        }
        let total: f64 = y_pred.iter_rows()
            .zip(y_true.iter_rows())
            .map(|(pred, truth)| {
                let (pos, neg) = masked_groups(pred, truth);
                logsumexp(&pos) + logsumexp(&neg)
            })
            .sum();
        let loss = total / rows as f64;
        tracing::trace!(loss, "multilabel categorical crossentropy");
        Ok(loss)
    }

    /// Gradient w.r.t. `y_pred`: the softmax of each group (anchor dropped),
    /// negated for positive classes, divided by the row count.
    pub fn derivative(&self, y_pred: &Tensor, y_true: &Tensor) -> Result<Tensor> {
        check_multi_hot(y_pred, y_true)?;
        let rows = y_pred.rows();
        let mut grad = Tensor::zeros(y_pred.shape());
        if rows == 0 {
            return Ok(grad);
        }
        let scale = 1.0 / rows as f64;
        for i in 0..rows {
            let truth = y_true.row(i);
            let (pos, neg) = masked_groups(y_pred.row(i), truth);
            let pos_w = softmax(&pos);
            let neg_w = softmax(&neg);
            for (j, g) in grad.row_mut(i).iter_mut().enumerate() {
                let w = if truth[j] == 1.0 { -pos_w[j] } else { neg_w[j] };
                *g = w * scale;
            }
        }
        Ok(grad)
    }
}

/// Builds the two log-sum-exp groups for one row, each with a trailing zero
/// anchor.  Sign-flipping by `(1 - 2y)` makes both groups "smaller is better".
fn masked_groups(pred: &[f64], truth: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let mut pos = Vec::with_capacity(pred.len() + 1);
    let mut neg = Vec::with_capacity(pred.len() + 1);
    for (&s, &y) in pred.iter().zip(truth) {
        let flipped = (1.0 - 2.0 * y) * s;
        pos.push(flipped - (1.0 - y) * MASK_OFFSET);
        neg.push(flipped - y * MASK_OFFSET);
    }
    pos.push(0.0);
    neg.push(0.0);
    (pos, neg)
}

fn check_multi_hot(y_pred: &Tensor, y_true: &Tensor) -> Result<()> {
    if y_pred.shape() != y_true.shape() {
        return Err(LossError::shape("MultilabelCategoricalCrossentropy", y_pred.shape(), y_true.shape()));
    }
    if let Some(bad) = y_true.data().iter().find(|&&y| y != 0.0 && y != 1.0) {
        return Err(LossError::target("MultilabelCategoricalCrossentropy", format!("multi-hot entries must be 0 or 1, got {bad}")));
    }
    Ok(())
}
