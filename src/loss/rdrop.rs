use std::str::FromStr;

use serde::{Serialize, Deserialize};

use crate::error::{LossError, Result};
use crate::loss::cross_entropy::CrossEntropyLoss;
use crate::math::stable::{log_softmax, softmax};
use crate::math::tensor::Tensor;

/// How the two stochastic forward passes are laid out in one batch.
///
/// - `Adjacent` — rows `2k` and `2k+1` are the two passes of example `k`
/// - `Updown`   — the first half of the batch is one pass, the second half the other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rank {
    #[default]
    Adjacent,
    Updown,
}

impl FromStr for Rank {
    type Err = LossError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "adjacent" => Ok(Rank::Adjacent),
            "updown" => Ok(Rank::Updown),
            other => Err(LossError::config("rank", format!("only 'adjacent' and 'updown' are supported, got '{other}'"))),
        }
    }
}

/// Hyperparameters for [`RDropLoss`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RDropConfig {
    /// Weight of the consistency term.
    pub alpha: f64,
    pub rank: Rank,
}

impl Default for RDropConfig {
    fn default() -> Self {
        RDropConfig { alpha: 4.0, rank: Rank::Adjacent }
    }
}

/// Both terms of an R-Drop evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RDropTerms {
    /// Cross-entropy over the whole batch.
    pub supervised: f64,
    /// Mean elementwise symmetric KL between the two passes, unscaled.
    pub kl: f64,
    /// supervised + kl / 4 · alpha
    pub total: f64,
}

/// R-Drop: cross-entropy plus a symmetric KL penalty between two dropout
/// passes over the same inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct RDropLoss {
    config: RDropConfig,
    supervised: CrossEntropyLoss,
}

impl RDropLoss {
    pub fn new(config: RDropConfig) -> Result<RDropLoss> {
        if !config.alpha.is_finite() {
            return Err(LossError::config("alpha", "must be finite"));
        }
        tracing::debug!(alpha = config.alpha, rank = ?config.rank, "r-drop loss configured");
        Ok(RDropLoss { config, supervised: CrossEntropyLoss::default() })
    }

    pub fn config(&self) -> &RDropConfig {
        &self.config
    }

    /// `logits` [2M, C] holding both passes; `labels` one class per row.
    pub fn compute(&self, logits: &Tensor, labels: &[i64]) -> Result<f64> {
        Ok(self.terms(logits, labels)?.total)
    }

    pub fn terms(&self, logits: &Tensor, labels: &[i64]) -> Result<RDropTerms> {
        let supervised = self.supervised.compute(logits, labels)?;
        let pairs = self.pairs(logits)?;
        let n_classes = logits.cols();

        let mut kl_sum = 0.0;
        for &(a, b) in &pairs {
            let (la, lb) = (log_softmax(logits.row(a)), log_softmax(logits.row(b)));
            for (x, y) in la.iter().zip(&lb) {
                // KL(pa‖pb) + KL(pb‖pa), elementwise
                kl_sum += (x.exp() - y.exp()) * (x - y);
            }
        }
        let count = (pairs.len() * n_classes) as f64;
        let kl = if count > 0.0 { kl_sum / count } else { 0.0 };
        let total = supervised + kl / 4.0 * self.config.alpha;
        tracing::trace!(supervised, kl, total, "r-drop loss");
        Ok(RDropTerms { supervised, kl, total })
    }

    /// Gradient of the total loss w.r.t. the logits.
    pub fn derivative(&self, logits: &Tensor, labels: &[i64]) -> Result<Tensor> {
        let mut grad = self.supervised.derivative(logits, labels)?;
        let pairs = self.pairs(logits)?;
        let count = (pairs.len() * logits.cols()) as f64;
        if count == 0.0 {
            return Ok(grad);
        }
        let scale = self.config.alpha / (4.0 * count);

        for &(a, b) in &pairs {
            let (la, lb) = (log_softmax(logits.row(a)), log_softmax(logits.row(b)));
            let (pa, pb) = (softmax(logits.row(a)), softmax(logits.row(b)));
            let diff: Vec<f64> = la.iter().zip(&lb).map(|(x, y)| x - y).collect();
            let mean_a: f64 = pa.iter().zip(&diff).map(|(p, d)| p * d).sum();
            let mean_b: f64 = pb.iter().zip(&diff).map(|(p, d)| p * d).sum();
            for (j, d) in diff.iter().enumerate() {
                grad.row_mut(a)[j] += scale * (pa[j] * (d - mean_a) + pa[j] - pb[j]);
                grad.row_mut(b)[j] += scale * (pb[j] * (mean_b - d) + pb[j] - pa[j]);
            }
        }
        Ok(grad)
    }

    /// Row pairs `(first pass, second pass)` according to the rank layout.
    fn pairs(&self, logits: &Tensor) -> Result<Vec<(usize, usize)>> {
        let n = logits.rows();
        if n % 2 != 0 {
            return Err(LossError::shape("RDropLoss (batch must hold two passes)", &[n + 1], &[n]));
        }
        let half = n / 2;
        Ok(match self.config.rank {
            Rank::Adjacent => (0..half).map(|k| (2 * k + 1, 2 * k)).collect(),
            Rank::Updown => (0..half).map(|k| (k, half + k)).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn rdrop(rank: Rank) -> RDropLoss {
        RDropLoss::new(RDropConfig { alpha: 4.0, rank }).unwrap()
    }

    #[test]
    fn identical_passes_leave_only_supervised_loss() {
        let z = Tensor::from_rows(vec![
            vec![1.0, 0.5, -0.5],
            vec![1.0, 0.5, -0.5],
            vec![-0.2, 0.3, 2.0],
            vec![-0.2, 0.3, 2.0],
        ]).unwrap();
        let labels = [0, 0, 2, 2];
        let terms = rdrop(Rank::Adjacent).terms(&z, &labels).unwrap();
        assert_eq!(terms.kl, 0.0);
        assert_eq!(terms.total, terms.supervised);
        assert_relative_eq!(terms.supervised, CrossEntropyLoss::default().compute(&z, &labels).unwrap());
    }

    #[test]
    fn differing_passes_add_positive_penalty() {
        let z = Tensor::from_rows(vec![vec![2.0, 0.0], vec![0.0, 2.0]]).unwrap();
        let terms = rdrop(Rank::Updown).terms(&z, &[0, 0]).unwrap();
        assert!(terms.kl > 0.0);
        assert!(terms.total > terms.supervised);
    }

    #[test]
    fn layouts_pair_rows_differently() {
        // adjacent pairs (0,1),(2,3) are identical; updown pairs (0,2),(1,3) are not
        let z = Tensor::from_rows(vec![vec![3.0, 0.0], vec![3.0, 0.0], vec![0.0, 3.0], vec![0.0, 3.0]]).unwrap();
        let labels = [0, 0, 1, 1];
        assert_eq!(rdrop(Rank::Adjacent).terms(&z, &labels).unwrap().kl, 0.0);
        assert!(rdrop(Rank::Updown).terms(&z, &labels).unwrap().kl > 0.0);
    }

    #[test]
    fn odd_batch_is_rejected() {
        let z = Tensor::zeros(&[3, 2]);
        assert!(matches!(rdrop(Rank::Adjacent).compute(&z, &[0, 1, 0]), Err(LossError::ShapeMismatch { .. })));
    }

    #[test]
    fn unknown_rank_fails_to_parse() {
        assert!(matches!("interleaved".parse::<Rank>(), Err(LossError::InvalidConfiguration { field: "rank", .. })));
    }
}
