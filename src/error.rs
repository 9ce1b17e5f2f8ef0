//! Error types for the CleanData pipeline.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`CsvError`] - CSV decoding and parsing errors
//! - [`UsageError`] - Plan limit and quota admission errors
//! - [`AiError`] - Transform gateway (AI client) errors
//! - [`StoreError`] - Session store persistence errors
//! - [`PipelineError`] - Top-level orchestration errors
//! - [`ServerError`] - HTTP server errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

// =============================================================================
// CSV Errors
// =============================================================================

/// Errors during CSV decoding and parsing.
#[derive(Debug, Error)]
pub enum CsvError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to decode bytes into text.
    #[error("Failed to decode file content: {0}")]
    EncodingError(String),

    /// Empty file (no header line).
    #[error("CSV file is empty")]
    EmptyFile,
}

// =============================================================================
// Usage / Quota Errors
// =============================================================================

/// Errors from plan limits and quota admission.
#[derive(Debug, Error)]
pub enum UsageError {
    /// File byte size exceeds the plan's upload cap.
    #[error("File too large. Maximum size is {max}.")]
    FileTooLarge { max: String },

    /// Dataset has more columns than the plan allows.
    #[error("Too many columns. Your plan allows up to {max} columns.")]
    TooManyColumns { max: usize },

    /// Monthly row quota would be exceeded and no rows remain.
    #[error("Row limit exceeded. Your plan allows {quota} rows per month.")]
    QuotaExhausted { quota: u64 },

    /// Monthly row quota would be exceeded; a truncated import is possible.
    #[error("Row limit exceeded. {remaining} of {quota} monthly rows remain; re-submit accepting a partial import to load the first {remaining} rows.")]
    QuotaExceeded { remaining: u64, quota: u64 },
}

// =============================================================================
// AI Gateway Errors
// =============================================================================

/// Errors from the transform gateway.
#[derive(Debug, Error)]
pub enum AiError {
    /// Missing API key.
    #[error("Missing API key: {0}")]
    MissingApiKey(String),

    /// HTTP request failed (network, timeout, connection).
    #[error("AI service unreachable: {0}")]
    Unreachable(String),

    /// Service responded with a non-success status.
    #[error("AI service error: {0}")]
    ServiceError(String),

    /// Service responded successfully but the payload was not the
    /// expected JSON array of rows.
    #[error("AI returned invalid JSON. Try a simpler prompt.")]
    InvalidResponse,

    /// Requested model is not available on the session's plan.
    #[error("Model '{0}' requires a Pro subscription")]
    ModelNotEntitled(String),
}

// =============================================================================
// Store Errors
// =============================================================================

/// Errors from session store persistence.
#[derive(Debug, Error)]
pub enum StoreError {
    /// IO error reading or writing the session blob.
    #[error("Session store IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON error serializing the session blob.
    #[error("Session store JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline orchestration errors.
///
/// This is the main error type returned by the import, transform and
/// export operations. It wraps all lower-level errors and adds
/// pipeline-specific variants.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// CSV error.
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),

    /// Usage or quota error.
    #[error("{0}")]
    Usage(#[from] UsageError),

    /// AI gateway error.
    #[error("{0}")]
    Ai(#[from] AiError),

    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// No dataset loaded.
    #[error("Please import a dataset first.")]
    EmptyDataset,

    /// Empty transform instruction.
    #[error("Missing required fields: prompt and data")]
    EmptyInstruction,

    /// The dataset was replaced while a transform was in flight.
    #[error("Dataset changed while the transform was running; result discarded. Re-submit the instruction.")]
    StaleDataset,
}

impl PipelineError {
    /// True for the input-rejected class: reported before any external
    /// call is made.
    pub fn is_input_rejection(&self) -> bool {
        matches!(
            self,
            PipelineError::Usage(_)
                | PipelineError::EmptyDataset
                | PipelineError::EmptyInstruction
        )
    }
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Server internal error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for CSV operations.
pub type CsvResult<T> = Result<T, CsvError>;

/// Result type for usage operations.
pub type UsageResult<T> = Result<T, UsageError>;

/// Result type for AI operations.
pub type AiResult<T> = Result<T, AiError>;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        // CsvError -> PipelineError
        let csv_err = CsvError::EmptyFile;
        let pipeline_err: PipelineError = csv_err.into();
        assert!(pipeline_err.to_string().contains("empty"));

        // AiError -> PipelineError
        let ai_err = AiError::ModelNotEntitled("openai/gpt-4".into());
        let pipeline_err: PipelineError = ai_err.into();
        assert!(pipeline_err.to_string().contains("openai/gpt-4"));
    }

    #[test]
    fn test_quota_error_format() {
        let err = UsageError::QuotaExceeded {
            remaining: 10,
            quota: 1000,
        };
        let msg = err.to_string();
        assert!(msg.contains("10"));
        assert!(msg.contains("1000"));
    }

    #[test]
    fn test_input_rejection_class() {
        assert!(PipelineError::EmptyDataset.is_input_rejection());
        assert!(PipelineError::from(UsageError::QuotaExhausted { quota: 1000 })
            .is_input_rejection());
        assert!(!PipelineError::from(AiError::InvalidResponse).is_input_rejection());
        assert!(!PipelineError::StaleDataset.is_input_rejection());
    }
}
