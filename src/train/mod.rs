pub mod progress;
pub mod tsa;

pub use progress::TrainingProgress;
pub use tsa::TsaSchedule;
