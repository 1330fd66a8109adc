use serde::{Serialize, Deserialize};

use crate::error::{LossError, Result};
use crate::math::stable::{logsumexp, outer_difference, softmax};
use crate::math::tensor::Tensor;

/// Floor for embedding norms before normalising.
const NORM_FLOOR: f64 = 1e-8;

/// Hyperparameters for [`CosentLoss`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CosentConfig {
    /// Multiplier applied to the cosines before ranking.
    pub scale: f64,
}

impl Default for CosentConfig {
    fn default() -> Self {
        CosentConfig { scale: 20.0 }
    }
}

/// CoSENT ranking loss for sentence-pair similarity.
///
/// For every two pairs where `label[i] < label[j]`, the cosine of pair `i`
/// should be below the cosine of pair `j`:
///   L = log(1 + Σ_{label_i < label_j} e^{λ(cos_i - cos_j)})
///
/// Labels may be binary or graded similarity scores.
#[derive(Debug, Clone, PartialEq)]
pub struct CosentLoss {
    config: CosentConfig,
}

impl CosentLoss {
    pub fn new(config: CosentConfig) -> Result<CosentLoss> {
        if !(config.scale.is_finite() && config.scale > 0.0) {
            return Err(LossError::config("scale", format!("must be finite and > 0, got {}", config.scale)));
        }
        tracing::debug!(scale = config.scale, "cosent loss configured");
        Ok(CosentLoss { config })
    }

    pub fn config(&self) -> &CosentConfig {
        &self.config
    }

    /// `embeddings` [2N, D] with rows `2k`, `2k+1` forming pair `k`; `labels` [N].
    pub fn compute(&self, embeddings: &Tensor, labels: &[f64]) -> Result<f64> {
        if embeddings.ndim() != 2 || embeddings.rows() != 2 * labels.len() {
            return Err(LossError::shape("CosentLoss", &[2 * labels.len(), embeddings.cols()], embeddings.shape()));
        }
        self.compute_scores(&pair_cosines(embeddings), labels)
    }

    /// Same loss from already computed pair cosines.
    pub fn compute_scores(&self, cosines: &[f64], labels: &[f64]) -> Result<f64> {
        let (values, _) = self.ranked_differences(cosines, labels)?;
        let loss = logsumexp(&values);
        tracing::trace!(loss, violations = values.len() - 1, "cosent loss");
        Ok(loss)
    }

    /// Gradient w.r.t. the cosines.
    pub fn derivative_scores(&self, cosines: &[f64], labels: &[f64]) -> Result<Vec<f64>> {
        let (values, pairs) = self.ranked_differences(cosines, labels)?;
        let weights = softmax(&values);
        let mut grad = vec![0.0; cosines.len()];
        // weights[0] belongs to the zero anchor
        for (&(i, j), w) in pairs.iter().zip(&weights[1..]) {
            grad[i] += self.config.scale * w;
            grad[j] -= self.config.scale * w;
        }
        Ok(grad)
    }

    /// Zero anchor followed by λ(cos_i - cos_j) for every ordered pair with
    /// `label_i < label_j`, plus the `(i, j)` index of each entry.
    fn ranked_differences(&self, cosines: &[f64], labels: &[f64]) -> Result<(Vec<f64>, Vec<(usize, usize)>)> {
        if labels.len() != cosines.len() {
            return Err(LossError::shape("CosentLoss", &[cosines.len()], &[labels.len()]));
        }
        let scaled: Vec<f64> = cosines.iter().map(|c| c * self.config.scale).collect();
        let diff = outer_difference(&scaled, &scaled)?;
        let n = cosines.len();
        let mut values = vec![0.0];
        let mut pairs = Vec::new();
        for i in 0..n {
            for j in 0..n {
                if labels[i] < labels[j] {
                    values.push(diff.row(i)[j]);
                    pairs.push((i, j));
                }
            }
        }
        Ok((values, pairs))
    }
}

/// Cosine similarity of adjacent embedding rows.
pub fn pair_cosines(embeddings: &Tensor) -> Vec<f64> {
    let normalised: Vec<Vec<f64>> = embeddings.iter_rows()
        .map(|row| {
            let norm = row.iter().map(|x| x * x).sum::<f64>().sqrt().max(NORM_FLOOR);
            row.iter().map(|x| x / norm).collect()
        })
        .collect();
    normalised.chunks(2)
        .map(|pair| match pair {
            [a, b] => a.iter().zip(b).map(|(x, y)| x * y).sum::<f64>(),
            _ => 0.0,
        })
        .collect()
}
