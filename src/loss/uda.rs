use serde::{Serialize, Deserialize};

use crate::error::{LossError, Result};
use crate::loss::cross_entropy::{check_class_targets, CrossEntropyLoss};
use crate::math::stable::{log_softmax, softmax, softmax_rows};
use crate::math::tensor::Tensor;
use crate::train::progress::TrainingProgress;
use crate::train::tsa::TsaSchedule;

/// Hyperparameters for [`UdaLoss`].
///
/// - `tsa_schedule`    — enables Training Signal Annealing when set
/// - `total_steps`     — optional default horizon for [`UdaLoss::progress`]
/// - `start_p`, `end_p` — range the TSA threshold is rescaled into
/// - `return_all_loss` — report `(total, sup, unsup)` instead of the total alone
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UdaConfig {
    pub tsa_schedule: Option<TsaSchedule>,
    pub total_steps: Option<u64>,
    pub start_p: f64,
    pub end_p: f64,
    pub return_all_loss: bool,
}

impl Default for UdaConfig {
    fn default() -> Self {
        UdaConfig {
            tsa_schedule: None,
            total_steps: None,
            start_p: 0.0,
            end_p: 1.0,
            return_all_loss: true,
        }
    }
}

/// Result of a UDA evaluation, shaped by `return_all_loss`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UdaOutput {
    Total(f64),
    All {
        total: f64,
        supervised: f64,
        unsupervised: f64,
    },
}

impl UdaOutput {
    pub fn total(&self) -> f64 {
        match *self {
            UdaOutput::Total(total) | UdaOutput::All { total, .. } => total,
        }
    }
}

/// Unsupervised Data Augmentation loss.
///
/// The batch is laid out as `[supervised | unsup original | unsup augmented]`,
/// the supervised block being as long as the label slice and the two
/// unsupervised blocks equally long.
///
/// Supervised part: cross-entropy, optionally restricted by TSA to the rows
/// whose true-class probability is still below the current threshold (0
/// when no row qualifies).  Unsupervised part: KL(p_orig ‖ p_aug) with a
/// batch-mean reduction, where p_orig is a frozen target.
#[derive(Debug, Clone, PartialEq)]
pub struct UdaLoss {
    config: UdaConfig,
    supervised: CrossEntropyLoss,
}

/// Row ranges of the three blocks.
struct Layout {
    sup: usize,
    unsup: usize,
}

impl UdaLoss {
    pub fn new(config: UdaConfig) -> Result<UdaLoss> {
        if !config.start_p.is_finite() || !config.end_p.is_finite() {
            return Err(LossError::config("start_p", "start_p and end_p must be finite"));
        }
        if config.total_steps == Some(0) {
            return Err(LossError::config("total_steps", "must be at least 1"));
        }
        tracing::debug!(
            tsa = ?config.tsa_schedule,
            start_p = config.start_p,
            end_p = config.end_p,
            return_all_loss = config.return_all_loss,
            "uda loss configured"
        );
        Ok(UdaLoss { config, supervised: CrossEntropyLoss::default() })
    }

    pub fn config(&self) -> &UdaConfig {
        &self.config
    }

    /// Progress at `global_step` against the configured `total_steps`.
    pub fn progress(&self, global_step: u64) -> Result<TrainingProgress> {
        match self.config.total_steps {
            Some(total) => TrainingProgress::new(global_step, total),
            None => Err(LossError::config("total_steps", "no default horizon configured")),
        }
    }

    /// Current TSA threshold, `None` when annealing is off.
    pub fn threshold(&self, progress: &TrainingProgress) -> Option<f64> {
        self.config.tsa_schedule
            .map(|s| s.threshold(progress, self.config.start_p, self.config.end_p))
    }

    /// `logits` [sup + 2U, C]; `sup_labels` one class per supervised row.
    pub fn compute(&self, logits: &Tensor, sup_labels: &[i64], progress: &TrainingProgress) -> Result<UdaOutput> {
        let layout = self.layout(logits, sup_labels)?;
        let supervised = self.supervised_loss(logits, sup_labels, &layout, progress)?;
        let unsupervised = consistency_loss(logits, &layout);
        let total = supervised + unsupervised;
        tracing::trace!(supervised, unsupervised, total, step = progress.global_step, "uda loss");
        Ok(if self.config.return_all_loss {
            UdaOutput::All { total, supervised, unsupervised }
        } else {
            UdaOutput::Total(total)
        })
    }

    /// Gradient of the total w.r.t. the logits.  The original unsupervised
    /// block is detached and gets zero gradient.
    pub fn derivative(&self, logits: &Tensor, sup_labels: &[i64], progress: &TrainingProgress) -> Result<Tensor> {
        let layout = self.layout(logits, sup_labels)?;
        let mut grad = Tensor::zeros(logits.shape());

        let kept = self.selected_rows(logits, sup_labels, &layout, progress);
        if !kept.is_empty() {
            let kept_labels: Vec<i64> = kept.iter().map(|&i| sup_labels[i]).collect();
            let sub = self.supervised.derivative(&logits.select_rows(&kept), &kept_labels)?;
            for (k, &i) in kept.iter().enumerate() {
                grad.row_mut(i).copy_from_slice(sub.row(k));
            }
        }

        if layout.unsup > 0 {
            let scale = 1.0 / layout.unsup as f64;
            for k in 0..layout.unsup {
                let target = softmax(logits.row(layout.sup + k));
                let aug_row = layout.sup + layout.unsup + k;
                let q = softmax(logits.row(aug_row));
                for (j, g) in grad.row_mut(aug_row).iter_mut().enumerate() {
                    *g = scale * (q[j] - target[j]);
                }
            }
        }
        Ok(grad)
    }

    fn layout(&self, logits: &Tensor, sup_labels: &[i64]) -> Result<Layout> {
        let n = logits.rows();
        let sup = sup_labels.len();
        if logits.ndim() != 2 || sup > n || (n - sup) % 2 != 0 {
            return Err(LossError::shape("UdaLoss (sup + 2·unsup rows)", &[sup, logits.cols()], logits.shape()));
        }
        check_class_targets(&logits.slice_rows(0, sup), sup_labels, self.supervised.ignore_index, "UdaLoss")?;
        Ok(Layout { sup, unsup: (n - sup) / 2 })
    }

    /// Supervised rows that take part in the loss: every non-ignored row
    /// without TSA, otherwise those below the threshold.
    fn selected_rows(&self, logits: &Tensor, sup_labels: &[i64], layout: &Layout, progress: &TrainingProgress) -> Vec<usize> {
        let ignore = self.supervised.ignore_index;
        let threshold = self.threshold(progress);
        let probs = softmax_rows(&logits.slice_rows(0, layout.sup));
        sup_labels.iter()
            .enumerate()
            .filter(|&(_, &t)| t != ignore)
            .filter(|&(i, &t)| threshold.map_or(true, |tau| probs.row(i)[t as usize] < tau))
            .map(|(i, _)| i)
            .collect()
    }

    fn supervised_loss(&self, logits: &Tensor, sup_labels: &[i64], layout: &Layout, progress: &TrainingProgress) -> Result<f64> {
        if self.config.tsa_schedule.is_none() {
            return self.supervised.compute(&logits.slice_rows(0, layout.sup), sup_labels);
        }
        let kept = self.selected_rows(logits, sup_labels, layout, progress);
        if kept.is_empty() {
            tracing::debug!(threshold = ?self.threshold(progress), "tsa filtered out every supervised row");
            return Ok(0.0);
        }
        let kept_labels: Vec<i64> = kept.iter().map(|&i| sup_labels[i]).collect();
        self.supervised.compute(&logits.select_rows(&kept), &kept_labels)
    }
}

/// Σ p_orig · (log p_orig - log p_aug) / U
fn consistency_loss(logits: &Tensor, layout: &Layout) -> f64 {
    if layout.unsup == 0 {
        return 0.0;
    }
    let total: f64 = (0..layout.unsup)
        .map(|k| {
            let orig = log_softmax(logits.row(layout.sup + k));
            let aug = log_softmax(logits.row(layout.sup + layout.unsup + k));
            orig.iter().zip(&aug).map(|(lo, la)| lo.exp() * (lo - la)).sum::<f64>()
        })
        .sum();
    total / layout.unsup as f64
}
