//! Error and warning types.
//!
//! Fatal conditions are [`EngineError`] values and abort the build before any
//! bytes are produced. Recoverable conditions are recorded as [`Warning`]s on
//! the document and the build continues with a substitute (placeholder image,
//! overflowing word, coerced colour value).

use thiserror::Error;

/// Result type alias used across the engine.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Fatal engine errors.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no font could be resolved for family '{family}' (style '{style}')")]
    FontNotFound { family: String, style: String },

    #[error("failed to parse font '{family}': {reason}")]
    FontParse { family: String, reason: String },

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("invalid engine state: {0}")]
    InvalidState(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF serialisation error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    pub(crate) fn geometry(msg: impl Into<String>) -> Self {
        EngineError::InvalidGeometry(msg.into())
    }
}

/// Non-fatal conditions recorded while building a document.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Warning {
    #[error("image not found: {src}")]
    ImageNotFound { src: String },

    #[error("image '{src}' could not be decoded: {reason}")]
    ImageDecodeFailure { src: String, reason: String },

    #[error("word '{word}' is wider than the available width of {available:.2} mm")]
    WordTooWideForCell { word: String, available: f32 },

    #[error("compliance violation: {0}")]
    ComplianceViolation(String),
}
