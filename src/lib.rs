pub mod error;
pub mod math;
pub mod loss;
pub mod train;

// Convenience re-exports
pub use error::{LossError, Result};
pub use math::tensor::{IndexTensor, Tensor};
pub use loss::{
    ContrastiveLoss, CosentLoss, CrossEntropyLoss, FocalLoss, LabelSmoothingCrossEntropy,
    LossFunction, LossSpec, LossType, MultilabelCategoricalCrossentropy, RDropLoss, Reduction,
    SparseMultilabelCategoricalCrossentropy, UdaLoss, UdaOutput,
};
pub use train::{TrainingProgress, TsaSchedule};
