use serde::{Serialize, Deserialize};

use crate::error::{LossError, Result};
use crate::loss::reduction::Reduction;
use crate::math::stable::relu;

/// Hyperparameters for [`ContrastiveLoss`].
///
/// - `margin`       — negatives closer than this are penalised
/// - `size_average` — mean (true) or sum (false) in offline mode
/// - `online`       — mine hard pairs instead of using every pair
/// - `pos_id`, `neg_id` — label values marking similar / dissimilar pairs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContrastiveConfig {
    pub margin: f64,
    pub size_average: bool,
    pub online: bool,
    pub pos_id: i64,
    pub neg_id: i64,
}

impl Default for ContrastiveConfig {
    fn default() -> Self {
        ContrastiveConfig { margin: 0.5, size_average: true, online: false, pos_id: 1, neg_id: 0 }
    }
}

/// Contrastive loss over precomputed pair distances.
///
/// Offline: 0.5 · (y·d² + (1 - y)·relu(m - d)²), reduced by mean or sum.
///
/// Online: only boundary-violating pairs contribute.  A negative is hard when
/// it sits closer than the farthest positive, a positive when it sits farther
/// than the nearest negative; with fewer than two pairs on the reference side
/// the mean of the own side is the threshold instead.  The result is the
/// plain sum Σ d_pos² + Σ relu(m - d_neg)², independent of `size_average`.
#[derive(Debug, Clone, PartialEq)]
pub struct ContrastiveLoss {
    config: ContrastiveConfig,
}

/// Indices of the pairs picked by online hard mining.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HardPairs {
    pub positives: Vec<usize>,
    pub negatives: Vec<usize>,
}

impl ContrastiveLoss {
    pub fn new(config: ContrastiveConfig) -> Result<ContrastiveLoss> {
        if !config.margin.is_finite() {
            return Err(LossError::config("margin", "must be finite"));
        }
        if config.pos_id == config.neg_id {
            return Err(LossError::config("pos_id", format!("must differ from neg_id ({})", config.neg_id)));
        }
        tracing::debug!(margin = config.margin, size_average = config.size_average, online = config.online, "contrastive loss configured");
        Ok(ContrastiveLoss { config })
    }

    pub fn config(&self) -> &ContrastiveConfig {
        &self.config
    }

    fn reduction(&self) -> Reduction {
        if self.config.size_average { Reduction::Mean } else { Reduction::Sum }
    }

    /// `distances` — one distance per pair; `labels` — `pos_id` or `neg_id` per pair.
    pub fn compute(&self, distances: &[f64], labels: &[i64]) -> Result<f64> {
        let positive = self.positive_mask(distances, labels)?;
        let m = self.config.margin;
        if !self.config.online {
            let losses: Vec<f64> = distances.iter().zip(&positive)
                .map(|(&d, &pos)| if pos { 0.5 * d * d } else { 0.5 * relu(m - d).powi(2) })
                .collect();
            let out = self.reduction().apply(losses, &[distances.len()])?;
            return Ok(out.item().unwrap_or(0.0));
        }

        let hard = mine_hard_pairs(distances, &positive);
        let positive_loss: f64 = hard.positives.iter().map(|&i| distances[i].powi(2)).sum();
        let negative_loss: f64 = hard.negatives.iter().map(|&i| relu(m - distances[i]).powi(2)).sum();
        tracing::trace!(hard_pos = hard.positives.len(), hard_neg = hard.negatives.len(), positive_loss, negative_loss, "online contrastive loss");
        Ok(positive_loss + negative_loss)
    }

    /// The hard pairs online mode would select for this batch.
    pub fn hard_pairs(&self, distances: &[f64], labels: &[i64]) -> Result<HardPairs> {
        let positive = self.positive_mask(distances, labels)?;
        Ok(mine_hard_pairs(distances, &positive))
    }

    /// Gradient w.r.t. the distances.  Mining thresholds are held constant.
    pub fn derivative(&self, distances: &[f64], labels: &[i64]) -> Result<Vec<f64>> {
        let positive = self.positive_mask(distances, labels)?;
        let m = self.config.margin;
        if !self.config.online {
            let scale = self.reduction().grad_scale(distances.len() as f64);
            return Ok(distances.iter().zip(&positive)
                .map(|(&d, &pos)| scale * if pos { d } else { -relu(m - d) })
                .collect());
        }

        let hard = mine_hard_pairs(distances, &positive);
        let mut grad = vec![0.0; distances.len()];
        for &i in &hard.positives {
            grad[i] = 2.0 * distances[i];
        }
        for &i in &hard.negatives {
            grad[i] = -2.0 * relu(m - distances[i]);
        }
        Ok(grad)
    }

    fn positive_mask(&self, distances: &[f64], labels: &[i64]) -> Result<Vec<bool>> {
        if distances.len() != labels.len() {
            return Err(LossError::shape("ContrastiveLoss", &[distances.len()], &[labels.len()]));
        }
        let ContrastiveConfig { pos_id, neg_id, .. } = self.config;
        labels.iter()
            .map(|&l| match l {
                l if l == pos_id => Ok(true),
                l if l == neg_id => Ok(false),
                other => Err(LossError::target("ContrastiveLoss", format!("label {other} is neither pos_id {pos_id} nor neg_id {neg_id}"))),
            })
            .collect()
    }
}

fn mine_hard_pairs(distances: &[f64], positive: &[bool]) -> HardPairs {
    let (poss, negs): (Vec<(usize, f64)>, Vec<(usize, f64)>) = distances.iter().copied()
        .enumerate()
        .partition(|&(i, _)| positive[i]);

    let max_of = |xs: &[(usize, f64)]| xs.iter().map(|&(_, d)| d).fold(f64::NEG_INFINITY, f64::max);
    let min_of = |xs: &[(usize, f64)]| xs.iter().map(|&(_, d)| d).fold(f64::INFINITY, f64::min);
    let mean_of = |xs: &[(usize, f64)]| xs.iter().map(|&(_, d)| d).sum::<f64>() / xs.len() as f64;

    let neg_threshold = if poss.len() > 1 { max_of(&poss) } else { mean_of(&negs) };
    let pos_threshold = if negs.len() > 1 { min_of(&negs) } else { mean_of(&poss) };

    let hard = HardPairs {
        negatives: negs.iter().filter(|&&(_, d)| d < neg_threshold).map(|&(i, _)| i).collect(),
        positives: poss.iter().filter(|&&(_, d)| d > pos_threshold).map(|&(i, _)| i).collect(),
    };
    if hard.positives.is_empty() && hard.negatives.is_empty() {
        tracing::warn!(pairs = distances.len(), "online contrastive mining selected no pairs");
    }
    hard
}
