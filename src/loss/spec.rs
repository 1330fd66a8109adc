use std::path::Path;

use serde::{Serialize, Deserialize};

use crate::error::Result;
use crate::loss::contrastive::{ContrastiveConfig, ContrastiveLoss};
use crate::loss::cosent::{CosentConfig, CosentLoss};
use crate::loss::cross_entropy::CrossEntropyLoss;
use crate::loss::focal::{FocalConfig, FocalLoss};
use crate::loss::label_smoothing::{LabelSmoothingConfig, LabelSmoothingCrossEntropy};
use crate::loss::loss_type::LossType;
use crate::loss::multilabel::MultilabelCategoricalCrossentropy;
use crate::loss::rdrop::{RDropConfig, RDropLoss};
use crate::loss::sparse_multilabel::{SparseMultilabelConfig, SparseMultilabelCategoricalCrossentropy};
use crate::loss::uda::{UdaConfig, UdaLoss};

/// A fully serializable choice of loss plus its hyperparameters.
///
/// Stored as JSON with a `"type"` tag next to the config fields, e.g.
/// `{"type": "focal", "gamma": 2.0}`.  Missing fields take their defaults.
/// Numeric ranges are validated by [`build`](LossSpec::build) and fail with
/// `LossError::InvalidConfiguration`.  Enumerated options (`rank`,
/// `tsa_schedule`, `reduction`) are checked while parsing: an unknown name
/// fails in `from_json_str`/`load_json` with `LossError::Json`, the same
/// way an unknown `"type"` does.  Their `FromStr` impls report
/// `InvalidConfiguration` for callers parsing names directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LossSpec {
    CrossEntropy(CrossEntropyLoss),
    Focal(FocalConfig),
    LabelSmoothing(LabelSmoothingConfig),
    MultilabelCategorical,
    SparseMultilabelCategorical(SparseMultilabelConfig),
    Contrastive(ContrastiveConfig),
    Cosent(CosentConfig),
    #[serde(rename = "rdrop")]
    RDrop(RDropConfig),
    Uda(UdaConfig),
}

/// A validated, ready-to-call loss built from a [`LossSpec`].
#[derive(Debug, Clone, PartialEq)]
pub enum LossFunction {
    CrossEntropy(CrossEntropyLoss),
    Focal(FocalLoss),
    LabelSmoothing(LabelSmoothingCrossEntropy),
    MultilabelCategorical(MultilabelCategoricalCrossentropy),
    SparseMultilabelCategorical(SparseMultilabelCategoricalCrossentropy),
    Contrastive(ContrastiveLoss),
    Cosent(CosentLoss),
    RDrop(RDropLoss),
    Uda(UdaLoss),
}

impl LossSpec {
    pub fn loss_type(&self) -> LossType {
        match self {
            LossSpec::CrossEntropy(_) => LossType::CrossEntropy,
            LossSpec::Focal(_) => LossType::Focal,
            LossSpec::LabelSmoothing(_) => LossType::LabelSmoothing,
            LossSpec::MultilabelCategorical => LossType::MultilabelCategorical,
            LossSpec::SparseMultilabelCategorical(_) => LossType::SparseMultilabelCategorical,
            LossSpec::Contrastive(_) => LossType::Contrastive,
            LossSpec::Cosent(_) => LossType::Cosent,
            LossSpec::RDrop(_) => LossType::RDrop,
            LossSpec::Uda(_) => LossType::Uda,
        }
    }

    /// Validates the hyperparameters and constructs the loss.
    pub fn build(self) -> Result<LossFunction> {
        tracing::debug!(loss = %self.loss_type(), "building loss from spec");
        Ok(match self {
            LossSpec::CrossEntropy(ce) => LossFunction::CrossEntropy(ce),
            LossSpec::Focal(c) => LossFunction::Focal(FocalLoss::new(c)?),
            LossSpec::LabelSmoothing(c) => LossFunction::LabelSmoothing(LabelSmoothingCrossEntropy::new(c)?),
            LossSpec::MultilabelCategorical => {
                LossFunction::MultilabelCategorical(MultilabelCategoricalCrossentropy::new())
            }
            LossSpec::SparseMultilabelCategorical(c) => {
                LossFunction::SparseMultilabelCategorical(SparseMultilabelCategoricalCrossentropy::new(c)?)
            }
            LossSpec::Contrastive(c) => LossFunction::Contrastive(ContrastiveLoss::new(c)?),
            LossSpec::Cosent(c) => LossFunction::Cosent(CosentLoss::new(c)?),
            LossSpec::RDrop(c) => LossFunction::RDrop(RDropLoss::new(c)?),
            LossSpec::Uda(c) => LossFunction::Uda(UdaLoss::new(c)?),
        })
    }

    pub fn from_json_str(json: &str) -> Result<LossSpec> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes the spec to a pretty-printed JSON file.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Deserializes a `LossSpec` from a JSON file written by `save_json`.
    pub fn load_json(path: impl AsRef<Path>) -> Result<LossSpec> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}

impl LossFunction {
    pub fn loss_type(&self) -> LossType {
        self.spec().loss_type()
    }

    /// The spec this loss was (or could have been) built from.
    pub fn spec(&self) -> LossSpec {
        match self {
            LossFunction::CrossEntropy(ce) => LossSpec::CrossEntropy(*ce),
            LossFunction::Focal(l) => LossSpec::Focal(l.config().clone()),
            LossFunction::LabelSmoothing(l) => LossSpec::LabelSmoothing(*l.config()),
            LossFunction::MultilabelCategorical(_) => LossSpec::MultilabelCategorical,
            LossFunction::SparseMultilabelCategorical(l) => LossSpec::SparseMultilabelCategorical(*l.config()),
            LossFunction::Contrastive(l) => LossSpec::Contrastive(*l.config()),
            LossFunction::Cosent(l) => LossSpec::Cosent(*l.config()),
            LossFunction::RDrop(l) => LossSpec::RDrop(*l.config()),
            LossFunction::Uda(l) => LossSpec::Uda(*l.config()),
        }
    }
}
