//! Error taxonomy shared by inference, synthesis and the async builder.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetaFaceError {
    /// Inference requested before the model was loaded. The caller may retry.
    #[error("inference model is not loaded")]
    ModelNotReady,
    /// A phoneme's symbol is not exactly one character. Aborts the whole build.
    #[error("phoneme {index} has invalid symbol {symbol:?} (expected a single character)")]
    InvalidPhonemeSymbol { index: usize, symbol: String },
    #[error("phoneme timeline is empty")]
    EmptyInput,
    /// Cooperative cancellation was observed; not a user-facing failure.
    #[error("build interrupted")]
    Interrupted,
    /// A declared channel has no raw value for a phoneme index. The sample is skipped.
    #[error("channel '{channel}' has no raw value at phoneme {index}")]
    CurveMismatch { channel: String, index: usize },
    #[error("model returned {got} values, expected {expected}")]
    OutputSizeMismatch { expected: usize, got: usize },
    #[error("model evaluation failed: {0}")]
    Inference(String),
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

impl MetaFaceError {
    pub fn is_interrupted(&self) -> bool {
        matches!(self, MetaFaceError::Interrupted)
    }

    /// Errors that abandon the request outright rather than degrading.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MetaFaceError::ModelNotReady | MetaFaceError::InvalidPhonemeSymbol { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, MetaFaceError>;
