use serde::{Serialize, Deserialize};

/// Names every loss the crate provides.
///
/// - `CrossEntropy`                — plain categorical cross-entropy on logits
/// - `Focal`                       — focal-reweighted NLL
/// - `LabelSmoothing`              — cross-entropy against a smoothed target
/// - `MultilabelCategorical`       — multi-label ranking loss, dense multi-hot targets
/// - `SparseMultilabelCategorical` — same objective, sparse positive indices
/// - `Contrastive`                 — pair-distance contrastive loss
/// - `Cosent`                      — cosine ranking loss over sentence pairs
/// - `RDrop`                       — cross-entropy + symmetric KL between two passes
/// - `Uda`                         — supervised CE (+ TSA) + unsupervised consistency KL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossType {
    CrossEntropy,
    Focal,
    LabelSmoothing,
    MultilabelCategorical,
    SparseMultilabelCategorical,
    Contrastive,
    Cosent,
    #[serde(rename = "rdrop")]
    RDrop,
    Uda,
}

impl LossType {
    pub fn name(self) -> &'static str {
        match self {
            LossType::CrossEntropy => "cross_entropy",
            LossType::Focal => "focal",
            LossType::LabelSmoothing => "label_smoothing",
            LossType::MultilabelCategorical => "multilabel_categorical",
            LossType::SparseMultilabelCategorical => "sparse_multilabel_categorical",
            LossType::Contrastive => "contrastive",
            LossType::Cosent => "cosent",
            LossType::RDrop => "rdrop",
            LossType::Uda => "uda",
        }
    }
}

impl std::fmt::Display for LossType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
