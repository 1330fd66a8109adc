use std::str::FromStr;

use serde::{Serialize, Deserialize};

use crate::error::{LossError, Result};
use crate::math::tensor::Tensor;

/// How a per-example loss vector is collapsed into the returned value.
///
/// - `Mean` — (weighted) mean, returned as a rank-0 tensor
/// - `Sum`  — plain sum, returned as a rank-0 tensor
/// - `None` — the per-example values, shaped like the batch axes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reduction {
    #[default]
    Mean,
    Sum,
    None,
}

impl Reduction {
    /// Reduces `values`, each example weighing 1.
    pub fn apply(self, values: Vec<f64>, batch_shape: &[usize]) -> Result<Tensor> {
        let n = values.len() as f64;
        match self {
            Reduction::Mean => Ok(Tensor::scalar(mean_or_zero(values.iter().sum(), n))),
            Reduction::Sum => Ok(Tensor::scalar(values.iter().sum())),
            Reduction::None => Tensor::new(batch_shape.to_vec(), values),
        }
    }

    /// Reduces `values` where each entry already carries its weight; `Mean`
    /// divides by the total weight instead of the example count.
    pub fn apply_weighted(self, values: Vec<f64>, weights: &[f64], batch_shape: &[usize]) -> Result<Tensor> {
        match self {
            Reduction::Mean => {
                let total: f64 = weights.iter().sum();
                Ok(Tensor::scalar(mean_or_zero(values.iter().sum(), total)))
            }
            _ => self.apply(values, batch_shape),
        }
    }

    /// Factor applied to each example's gradient, given the normaliser that
    /// `Mean` would divide by.
    pub(crate) fn grad_scale(self, normaliser: f64) -> f64 {
        match self {
            Reduction::Mean if normaliser > 0.0 => 1.0 / normaliser,
            Reduction::Mean => 0.0,
            Reduction::Sum | Reduction::None => 1.0,
        }
    }
}

fn mean_or_zero(sum: f64, count: f64) -> f64 {
    if count > 0.0 {
        sum / count
    } else {
        tracing::warn!("mean reduction over zero total weight, returning 0");
        0.0
    }
}

impl FromStr for Reduction {
    type Err = LossError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mean" => Ok(Reduction::Mean),
            "sum" => Ok(Reduction::Sum),
            "none" => Ok(Reduction::None),
            other => Err(LossError::config("reduction", format!("unknown reduction '{other}'"))),
        }
    }
}
