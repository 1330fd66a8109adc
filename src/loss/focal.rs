use serde::{Serialize, Deserialize};

use crate::error::{LossError, Result};
use crate::loss::cross_entropy::{check_class_targets, nll_loss, DEFAULT_IGNORE_INDEX};
use crate::loss::reduction::Reduction;
use crate::math::stable::log_softmax_rows;
use crate::math::tensor::Tensor;

/// Hyperparameters for [`FocalLoss`].
///
/// - `gamma`        — focusing exponent; `0` reduces to plain NLL on log-softmax
/// - `weight`       — optional per-class weight, length `n_classes`
/// - `ignore_index` — target value whose rows are skipped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FocalConfig {
    pub gamma: f64,
    pub weight: Option<Vec<f64>>,
    pub ignore_index: i64,
}

impl Default for FocalConfig {
    fn default() -> Self {
        FocalConfig { gamma: 2.0, weight: None, ignore_index: DEFAULT_IGNORE_INDEX }
    }
}

/// Multi-class focal loss:
///   L_i = -w[t] · (1 - p_t)^γ · log p_t
/// averaged over non-ignored rows (weighted by `w[t]`).
///
/// Confident correct predictions (p_t → 1) are down-weighted, so the
/// gradient concentrates on the hard examples.
#[derive(Debug, Clone, PartialEq)]
pub struct FocalLoss {
    config: FocalConfig,
}

impl FocalLoss {
    pub fn new(config: FocalConfig) -> Result<FocalLoss> {
        if !config.gamma.is_finite() || config.gamma < 0.0 {
            return Err(LossError::config("gamma", format!("must be finite and >= 0, got {}", config.gamma)));
        }
        if let Some(w) = &config.weight {
            if w.iter().any(|x| !x.is_finite() || *x < 0.0) {
                return Err(LossError::config("weight", "class weights must be finite and >= 0"));
            }
        }
        tracing::debug!(gamma = config.gamma, weighted = config.weight.is_some(), ignore_index = config.ignore_index, "focal loss configured");
        Ok(FocalLoss { config })
    }

    pub fn config(&self) -> &FocalConfig {
        &self.config
    }

    /// Scalar mean focal loss.
    ///
    /// `logits`  — shape [..., n_classes]
    /// `targets` — one class index per logits row
    pub fn compute(&self, logits: &Tensor, targets: &[i64]) -> Result<f64> {
        let gamma = self.config.gamma;
        let modulated = log_softmax_rows(logits)
            .map(|lp| (1.0 - lp.exp()).max(0.0).powf(gamma) * lp);
        let loss = nll_loss(
            &modulated,
            targets,
            self.config.weight.as_deref(),
            self.config.ignore_index,
            Reduction::Mean,
        )?;
        let value = loss.item().unwrap_or(0.0);
        tracing::trace!(loss = value, "focal loss");
        Ok(value)
    }

    /// Gradient w.r.t. the logits.  With p = p_t and q = 1 - p:
    ///   ∂L_i/∂z_j = -w[t] · (δ_tj - p_j) · (q^γ - γ·p·q^(γ-1)·ln p)
    /// divided by the summed weight of the kept rows.
    pub fn derivative(&self, logits: &Tensor, targets: &[i64]) -> Result<Tensor> {
        let ignore_index = self.config.ignore_index;
        let n_classes = check_class_targets(logits, targets, ignore_index, "FocalLoss")?;
        let weight = self.config.weight.as_deref();
        if let Some(w) = weight {
            if w.len() != n_classes {
                return Err(LossError::shape("FocalLoss weight", &[n_classes], &[w.len()]));
            }
        }
        let class_weight = |t: i64| weight.map_or(1.0, |w| w[t as usize]);
        let total: f64 = targets.iter()
            .filter(|&&t| t != ignore_index)
            .map(|&t| class_weight(t))
            .sum();
        let scale = Reduction::Mean.grad_scale(total);
        let gamma = self.config.gamma;

        let log_probs = log_softmax_rows(logits);
        let mut grad = Tensor::zeros(logits.shape());
        for (i, &t) in targets.iter().enumerate() {
            if t == ignore_index {
                continue;
            }
            let t = t as usize;
            let lp = log_probs.row(i);
            let p = lp[t].exp();
            let q = (1.0 - p).max(0.0);
            let focus = if gamma == 0.0 || q <= 0.0 {
                q.powf(gamma)
            } else {
                q.powf(gamma) - gamma * p * q.powf(gamma - 1.0) * lp[t]
            };
            let coef = -class_weight(t as i64) * focus * scale;
            for (j, g) in grad.row_mut(i).iter_mut().enumerate() {
                let indicator = if j == t { 1.0 } else { 0.0 };
                *g = coef * (indicator - lp[j].exp());
            }
        }
        Ok(grad)
    }
}
