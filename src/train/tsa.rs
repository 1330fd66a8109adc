use std::str::FromStr;

use serde::{Serialize, Deserialize};

use crate::error::{LossError, Result};
use crate::train::progress::TrainingProgress;

/// Steepness of the `Exp` and `Log` schedules.
const SCHEDULE_SCALE: f64 = 5.0;

/// Training Signal Annealing schedule: how fast the confidence threshold
/// rises from `start` to `end` as training progresses.
///
/// - `Linear` — τ = progress
/// - `Exp`    — τ = exp((progress - 1)·5), slow start, late release
/// - `Log`    — τ = 1 - exp(-progress·5), fast start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TsaSchedule {
    #[serde(alias = "linear_schedule")]
    Linear,
    #[serde(alias = "exp_schedule")]
    Exp,
    #[serde(alias = "log_schedule")]
    Log,
}

impl TsaSchedule {
    /// Raw schedule value for a progress fraction, before rescaling.
    pub fn threshold_at(self, progress: f64) -> f64 {
        match self {
            TsaSchedule::Linear => progress,
            TsaSchedule::Exp => ((progress - 1.0) * SCHEDULE_SCALE).exp(),
            TsaSchedule::Log => 1.0 - (-progress * SCHEDULE_SCALE).exp(),
        }
    }

    /// Threshold rescaled into `[start, end]`.
    pub fn threshold(self, progress: &TrainingProgress, start: f64, end: f64) -> f64 {
        self.threshold_at(progress.fraction()) * (end - start) + start
    }
}

impl FromStr for TsaSchedule {
    type Err = LossError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "linear" | "linear_schedule" => Ok(TsaSchedule::Linear),
            "exp" | "exp_schedule" => Ok(TsaSchedule::Exp),
            "log" | "log_schedule" => Ok(TsaSchedule::Log),
            other => Err(LossError::config("tsa_schedule", format!("unknown schedule '{other}'"))),
        }
    }
}
