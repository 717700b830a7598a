//! Error handling for Driftwave
//!
//! Layer-level failures are swallowed at the graph-assembler boundary and
//! converted to events; everything surfaced through this type is either a
//! caller mistake or a lifecycle-level failure.

use thiserror::Error;

use crate::timeline::LayerKey;

/// Result type alias for Driftwave operations
pub type Result<T> = std::result::Result<T, DriftwaveError>;

/// Main error type for Driftwave operations
#[derive(Error, Debug)]
pub enum DriftwaveError {
    // Context / graph construction
    #[error("Rendering context creation failed: {reason}")]
    ContextCreation { reason: String },

    #[error("Unconditional layer '{layer}' failed to construct: {reason}")]
    CoreLayerFailed { layer: &'static str, reason: String },

    #[error("Layer '{layer}' could not be constructed: {reason}")]
    LayerConstruction { layer: LayerKey, reason: String },

    #[error("Pre-render budget exceeded: requested {requested} frames, {available} available")]
    PrerenderBudget { requested: u64, available: u64 },

    // Control plane
    #[error("Engine is busy: another lifecycle operation is in flight ({operation})")]
    Busy { operation: &'static str },

    #[error("A render job is already active")]
    RenderActive,

    #[error("Session is closed")]
    SessionClosed,

    // Validation
    #[error("Invalid session timeline: {reason}")]
    InvalidTimeline { reason: String },

    #[error("Invalid parameter {param}: got {value}, expected {expected}")]
    InvalidParameter {
        param: &'static str,
        value: String,
        expected: &'static str,
    },

    // Encoding
    #[error("Sample encoding failed: {reason}")]
    Encode { reason: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DriftwaveError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            DriftwaveError::ContextCreation { .. } => "CONTEXT_CREATION",
            DriftwaveError::CoreLayerFailed { .. } => "CORE_LAYER_FAILED",
            DriftwaveError::LayerConstruction { .. } => "LAYER_CONSTRUCTION",
            DriftwaveError::PrerenderBudget { .. } => "PRERENDER_BUDGET",
            DriftwaveError::Busy { .. } => "BUSY",
            DriftwaveError::RenderActive => "RENDER_ACTIVE",
            DriftwaveError::SessionClosed => "SESSION_CLOSED",
            DriftwaveError::InvalidTimeline { .. } => "INVALID_TIMELINE",
            DriftwaveError::InvalidParameter { .. } => "INVALID_PARAMETER",
            DriftwaveError::Encode { .. } => "ENCODE",
            DriftwaveError::Io(_) => "IO_ERROR",
            DriftwaveError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if this error leaves the engine usable
    ///
    /// Recoverable errors reject a single operation; unrecoverable ones mean
    /// the session (or job) has been torn down.
    pub fn is_recoverable(&self) -> bool {
        match self {
            DriftwaveError::Busy { .. } => true,
            DriftwaveError::RenderActive => true,
            DriftwaveError::LayerConstruction { .. } => true,
            DriftwaveError::PrerenderBudget { .. } => true,
            DriftwaveError::InvalidTimeline { .. } => true,
            DriftwaveError::InvalidParameter { .. } => true,
            _ => false,
        }
    }
}
