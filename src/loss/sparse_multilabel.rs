use serde::{Serialize, Deserialize};

use crate::error::{LossError, Result};
use crate::math::stable::{clamped_ln, logsumexp, softmax};
use crate::math::tensor::{IndexTensor, Tensor};

/// Hyperparameters for [`SparseMultilabelCategoricalCrossentropy`].
///
/// - `mask_zero` — treat target index 0 as padding instead of a class
/// - `epsilon`   — floor for `1 - exp(b - a)` before its log; must be > 0
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SparseMultilabelConfig {
    pub mask_zero: bool,
    pub epsilon: f64,
}

impl Default for SparseMultilabelConfig {
    fn default() -> Self {
        SparseMultilabelConfig { mask_zero: false, epsilon: 1e-7 }
    }
}

/// Intermediate values of one row, exposed for inspection and logging.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SparseTerms {
    /// log(1 + Σ_pos e^{-s})
    pub pos_loss: f64,
    /// a = logsumexp over every class plus the null class
    pub all_loss: f64,
    /// clamp(1 - e^{b - a}, epsilon, 1)
    pub aux: f64,
    /// a + log(aux)
    pub neg_loss: f64,
}

impl SparseTerms {
    pub fn total(&self) -> f64 {
        self.pos_loss + self.neg_loss
    }
}

/// Multi-label categorical cross-entropy with sparse positive-class targets.
///
/// `y_true` lists the positive classes of each row instead of a multi-hot
/// vector, which is far cheaper when positives ≪ classes.  A zero logit is
/// appended as class `C` (the null class), so `y_true` values live in `[0, C]`.
/// With `mask_zero` set, index 0 is padding and rows may be padded with it.
///
/// The negative term uses log(Σ_neg e^s) = a + log(1 - e^{b - a}) with
/// a = logsumexp(all), b = logsumexp(pos), avoiding a dense negative mask.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseMultilabelCategoricalCrossentropy {
    config: SparseMultilabelConfig,
}

impl SparseMultilabelCategoricalCrossentropy {
    pub fn new(config: SparseMultilabelConfig) -> Result<SparseMultilabelCategoricalCrossentropy> {
        if !(config.epsilon > 0.0 && config.epsilon <= 1.0) {
            return Err(LossError::config("epsilon", format!("must lie in (0, 1], got {}", config.epsilon)));
        }
        tracing::debug!(mask_zero = config.mask_zero, epsilon = config.epsilon, "sparse multilabel loss configured");
        Ok(SparseMultilabelCategoricalCrossentropy { config })
    }

    pub fn config(&self) -> &SparseMultilabelConfig {
        &self.config
    }

    /// Per-example loss, shaped like the batch axes of `y_pred`.
    ///
    /// `y_pred` — [..., n_classes] raw logits
    /// `y_true` — [..., n_positive] class indices in `[0, n_classes]`
    pub fn compute(&self, y_pred: &Tensor, y_true: &IndexTensor) -> Result<Tensor> {
        let totals = self.terms(y_pred, y_true)?.iter().map(SparseTerms::total).collect();
        Tensor::new(y_pred.leading_shape().to_vec(), totals)
    }

    /// The per-row terms behind [`compute`](Self::compute).
    pub fn terms(&self, y_pred: &Tensor, y_true: &IndexTensor) -> Result<Vec<SparseTerms>> {
        check_sparse(y_pred, y_true)?;
        let terms: Vec<SparseTerms> = (0..y_pred.rows())
            .map(|i| {
                let views = self.views(y_pred.row(i));
                let idx = y_true.row(i);

                let mut pos_scores: Vec<f64> = idx.iter().map(|&k| -views.positive[k as usize]).collect();
                pos_scores.push(0.0);
                let pos_loss = logsumexp(&pos_scores);

                let all_loss = logsumexp(&views.normaliser);
                let gathered: Vec<f64> = idx.iter().map(|&k| views.normaliser[k as usize]).collect();
                let ratio = (logsumexp(&gathered) - all_loss).exp();
                SparseTerms {
                    pos_loss,
                    all_loss,
                    aux: (1.0 - ratio).clamp(self.config.epsilon, 1.0),
                    neg_loss: all_loss + clamped_ln(1.0 - ratio, self.config.epsilon, 1.0),
                }
            })
            .collect();
        tracing::trace!(rows = terms.len(), "sparse multilabel terms");
        Ok(terms)
    }

    /// Gradient of the per-example losses w.r.t. `y_pred`, each output taken
    /// with unit upstream gradient.  While the clamp on `1 - e^{b-a}` is
    /// active only the `a` term carries gradient.
    pub fn derivative(&self, y_pred: &Tensor, y_true: &IndexTensor) -> Result<Tensor> {
        check_sparse(y_pred, y_true)?;
        let n_classes = y_pred.cols();
        let mut grad = Tensor::zeros(y_pred.shape());
        for i in 0..y_pred.rows() {
            let views = self.views(y_pred.row(i));
            let idx = y_true.row(i);
            let g = grad.row_mut(i);

            let mut pos_scores: Vec<f64> = idx.iter().map(|&k| -views.positive[k as usize]).collect();
            pos_scores.push(0.0);
            let pos_w = softmax(&pos_scores);
            for (&k, w) in idx.iter().zip(&pos_w) {
                let k = k as usize;
                if k < n_classes && !(self.config.mask_zero && k == 0) {
                    g[k] -= w;
                }
            }

            let all_loss = logsumexp(&views.normaliser);
            let gathered: Vec<f64> = idx.iter().map(|&k| views.normaliser[k as usize]).collect();
            let ratio = (logsumexp(&gathered) - all_loss).exp();
            let unclamped = 1.0 - ratio >= self.config.epsilon;
            for (j, gj) in g.iter_mut().enumerate() {
                let share = (views.normaliser[j] - all_loss).exp();
                if unclamped {
                    let count = idx.iter().filter(|&&k| k as usize == j).count() as f64;
                    *gj += share * (1.0 - count) / (1.0 - ratio);
                } else {
                    *gj += share;
                }
            }
        }
        Ok(grad)
    }

    /// Two read-only views of a row extended with the null class: index 0
    /// forced to `+inf` for gathering positives and to `-inf` for the
    /// normaliser when `mask_zero` is set.
    fn views(&self, row: &[f64]) -> LogitViews {
        let mut positive = Vec::with_capacity(row.len() + 1);
        positive.extend_from_slice(row);
        positive.push(0.0);
        let mut normaliser = positive.clone();
        if self.config.mask_zero {
            positive[0] = f64::INFINITY;
            normaliser[0] = f64::NEG_INFINITY;
        }
        LogitViews { positive, normaliser }
    }
}

struct LogitViews {
    positive: Vec<f64>,
    normaliser: Vec<f64>,
}

fn check_sparse(y_pred: &Tensor, y_true: &IndexTensor) -> Result<()> {
    if y_pred.ndim() == 0 || y_pred.ndim() != y_true.ndim() || y_pred.leading_shape() != y_true.leading_shape() {
        return Err(LossError::shape("SparseMultilabelCategoricalCrossentropy", y_pred.leading_shape(), y_true.leading_shape()));
    }
    let n_classes = y_pred.cols() as i64;
    if let Some(bad) = y_true.data().iter().find(|&&k| k < 0 || k > n_classes) {
        return Err(LossError::target(
            "SparseMultilabelCategoricalCrossentropy",
            format!("positive index {bad} outside [0, {n_classes}]"),
        ));
    }
    Ok(())
}
