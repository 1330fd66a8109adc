use serde::{Serialize, Deserialize};

use crate::error::{LossError, Result};

/// Externally owned training counters, passed in per call.
///
/// The losses never advance these; the training loop does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingProgress {
    pub global_step: u64,
    pub total_steps: u64,
}

impl TrainingProgress {
    pub fn new(global_step: u64, total_steps: u64) -> Result<TrainingProgress> {
        if total_steps == 0 {
            return Err(LossError::config("total_steps", "must be at least 1"));
        }
        Ok(TrainingProgress { global_step, total_steps })
    }

    /// `global_step / total_steps`.  Not clamped: a run that overshoots its
    /// planned horizon reports a fraction above 1.
    pub fn fraction(&self) -> f64 {
        self.global_step as f64 / self.total_steps as f64
    }
}
