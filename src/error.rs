/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, LossError>;

/// Everything that can go wrong when configuring or evaluating a loss.
///
/// None of these are transient: they always point at a programming or
/// configuration mistake on the caller's side.
#[derive(Debug, thiserror::Error)]
pub enum LossError {
    /// Predictions and targets (or two inputs that must agree) disagree on shape.
    #[error("shape mismatch in {context}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        context: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// A hyperparameter was rejected at construction time.
    #[error("invalid configuration '{field}': {reason}")]
    InvalidConfiguration {
        field: &'static str,
        reason: String,
    },

    /// A target value lies outside the domain the loss accepts.
    #[error("invalid target in {context}: {reason}")]
    InvalidTarget {
        context: &'static str,
        reason: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LossError {
    pub(crate) fn shape(context: &'static str, expected: &[usize], actual: &[usize]) -> Self {
        LossError::ShapeMismatch {
            context,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }

    pub(crate) fn config(field: &'static str, reason: impl Into<String>) -> Self {
        LossError::InvalidConfiguration { field, reason: reason.into() }
    }

    pub(crate) fn target(context: &'static str, reason: impl Into<String>) -> Self {
        LossError::InvalidTarget { context, reason: reason.into() }
    }
}
