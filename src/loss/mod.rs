pub mod reduction;
pub mod cross_entropy;
pub mod focal;
pub mod label_smoothing;
pub mod multilabel;
pub mod sparse_multilabel;
pub mod contrastive;
pub mod cosent;
pub mod rdrop;
pub mod uda;
pub mod loss_type;
pub mod spec;

pub use reduction::Reduction;
pub use cross_entropy::{nll_loss, CrossEntropyLoss, DEFAULT_IGNORE_INDEX};
pub use focal::{FocalConfig, FocalLoss};
pub use label_smoothing::{LabelSmoothingConfig, LabelSmoothingCrossEntropy};
pub use multilabel::MultilabelCategoricalCrossentropy;
pub use sparse_multilabel::{SparseMultilabelConfig, SparseMultilabelCategoricalCrossentropy, SparseTerms};
pub use contrastive::{ContrastiveConfig, ContrastiveLoss, HardPairs};
pub use cosent::{pair_cosines, CosentConfig, CosentLoss};
pub use rdrop::{Rank, RDropConfig, RDropLoss, RDropTerms};
pub use uda::{UdaConfig, UdaLoss, UdaOutput};
pub use loss_type::LossType;
pub use spec::{LossFunction, LossSpec};
