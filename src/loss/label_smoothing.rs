use serde::{Serialize, Deserialize};

use crate::error::{LossError, Result};
use crate::loss::cross_entropy::{check_class_targets, nll_loss, DEFAULT_IGNORE_INDEX};
use crate::loss::reduction::Reduction;
use crate::math::stable::log_softmax_rows;
use crate::math::tensor::Tensor;

/// Hyperparameters for [`LabelSmoothingCrossEntropy`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelSmoothingConfig {
    /// Probability mass spread uniformly over all classes, in [0, 1).
    pub eps: f64,
    pub reduction: Reduction,
    pub ignore_index: i64,
}

impl Default for LabelSmoothingConfig {
    fn default() -> Self {
        LabelSmoothingConfig { eps: 0.1, reduction: Reduction::Mean, ignore_index: DEFAULT_IGNORE_INDEX }
    }
}

/// Cross-entropy against a target distribution smoothed towards uniform:
///   L = eps/C · reduce(-Σ_c log p_c) + (1 - eps) · NLL(log p, t)
///
/// The smoothing term is summed over the class axis first and only then
/// reduced over the batch axes, so under `Mean` it averages over every row
/// (ignored rows included) while the NLL term averages over kept rows only.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelSmoothingCrossEntropy {
    config: LabelSmoothingConfig,
}

impl LabelSmoothingCrossEntropy {
    pub fn new(config: LabelSmoothingConfig) -> Result<LabelSmoothingCrossEntropy> {
        if !(0.0..1.0).contains(&config.eps) {
            return Err(LossError::config("eps", format!("must lie in [0, 1), got {}", config.eps)));
        }
        tracing::debug!(eps = config.eps, reduction = ?config.reduction, ignore_index = config.ignore_index, "label smoothing configured");
        Ok(LabelSmoothingCrossEntropy { config })
    }

    pub fn config(&self) -> &LabelSmoothingConfig {
        &self.config
    }

    /// `logits` [..., C], `targets` one index per row.  Returns a rank-0
    /// tensor for `Mean`/`Sum` and a tensor of the batch shape for `None`.
    pub fn compute(&self, logits: &Tensor, targets: &[i64]) -> Result<Tensor> {
        let LabelSmoothingConfig { eps, reduction, ignore_index } = self.config;
        let n_classes = check_class_targets(logits, targets, ignore_index, "LabelSmoothingCrossEntropy")?;
        let log_preds = log_softmax_rows(logits);

        let row_sums: Vec<f64> = log_preds.iter_rows().map(|row| -row.iter().sum::<f64>()).collect();
        let smoothing = reduction.apply(row_sums, logits.leading_shape())?;
        let confidence = nll_loss(&log_preds, targets, None, ignore_index, reduction)?;

        let scale = eps / n_classes as f64;
        let mut out = smoothing;
        for (s, c) in out.data_mut().iter_mut().zip(confidence.data()) {
            *s = *s * scale + (1.0 - eps) * c;
        }
        tracing::trace!(value = ?out.item(), "label smoothing loss");
        Ok(out)
    }

    /// Gradient w.r.t. the logits.  Under `None` every per-row output is
    /// taken with unit upstream gradient.
    pub fn derivative(&self, logits: &Tensor, targets: &[i64]) -> Result<Tensor> {
        let LabelSmoothingConfig { eps, reduction, ignore_index } = self.config;
        let n_classes = check_class_targets(logits, targets, ignore_index, "LabelSmoothingCrossEntropy")?;
        let c = n_classes as f64;
        let kept = targets.iter().filter(|&&t| t != ignore_index).count() as f64;
        let smooth_scale = eps / c * reduction.grad_scale(logits.rows() as f64);
        let nll_scale = (1.0 - eps) * reduction.grad_scale(kept);

        let log_preds = log_softmax_rows(logits);
        let mut grad = Tensor::zeros(logits.shape());
        for (i, &t) in targets.iter().enumerate() {
            let lp = log_preds.row(i);
            for (j, g) in grad.row_mut(i).iter_mut().enumerate() {
                let p = lp[j].exp();
                *g = smooth_scale * (c * p - 1.0);
                if t != ignore_index {
                    let indicator = if j as i64 == t { 1.0 } else { 0.0 };
                    *g += nll_scale * (p - indicator);
                }
            }
        }
        Ok(grad)
    }
}
