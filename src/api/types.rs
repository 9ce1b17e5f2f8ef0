//! REST API types for frontend integration.
//!
//! Responses are camelCase JSON envelopes carrying a per-request job id
//! and a status string, so a client can correlate uploads and tell a
//! ready dataset from a quota-blocked one at a glance.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AiError, PipelineError, UsageError};
use crate::meter::{self, Capacity};
use crate::pipeline::{ImportOutcome, ImportSummary, TransformSummary};
use crate::store::SessionStore;

// =============================================================================
// Import
// =============================================================================

/// Response for an import attempt.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResponse {
    /// Unique job identifier.
    pub job_id: String,

    /// Status: "ready" or "quotaBlocked".
    pub status: String,

    /// Present when rows were admitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<ImportSummary>,

    /// Present when the file exceeds remaining capacity; describes the
    /// partial import available on confirmation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial: Option<PartialOffer>,
}

/// A partial-admission offer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialOffer {
    /// Rows that can still be admitted this period.
    pub admissible: u64,
    /// Rows in the uploaded file.
    pub total_rows: usize,
}

impl From<ImportOutcome> for ImportResponse {
    fn from(outcome: ImportOutcome) -> Self {
        match outcome {
            ImportOutcome::Admitted(summary) => ImportResponse {
                job_id: Uuid::new_v4().to_string(),
                status: "ready".to_string(),
                summary: Some(summary),
                partial: None,
            },
            ImportOutcome::PartialAvailable {
                admissible,
                total_rows,
            } => ImportResponse {
                job_id: Uuid::new_v4().to_string(),
                status: "quotaBlocked".to_string(),
                summary: None,
                partial: Some(PartialOffer {
                    admissible,
                    total_rows,
                }),
            },
        }
    }
}

// =============================================================================
// Transform
// =============================================================================

/// Body of a transform request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformBody {
    /// The cleaning instruction.
    pub prompt: String,
    /// Model override; the session's selected model when absent.
    #[serde(default)]
    pub model: Option<String>,
}

/// Response for a successful transform.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformResponse {
    pub job_id: String,
    pub status: String,
    pub summary: TransformSummary,
}

impl From<TransformSummary> for TransformResponse {
    fn from(summary: TransformSummary) -> Self {
        TransformResponse {
            job_id: Uuid::new_v4().to_string(),
            status: "ready".to_string(),
            summary,
        }
    }
}

// =============================================================================
// Usage
// =============================================================================

/// Usage and plan snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageResponse {
    pub plan: String,
    pub rows_processed: u64,
    pub ai_calls_made: u64,
    /// Monthly quota; `null` means unlimited.
    pub monthly_rows: Option<u64>,
    /// Remaining capacity; `null` means unlimited.
    pub remaining_rows: Option<u64>,
    pub usage_percentage: f64,
    pub max_file_size: u64,
    pub max_columns: usize,
}

impl UsageResponse {
    pub fn snapshot(store: &SessionStore) -> Self {
        let usage = store.usage();
        let limits = store.plan().limits();
        let remaining = match meter::remaining_capacity(usage.rows_processed, limits.monthly_rows)
        {
            Capacity::Rows(n) => Some(n),
            Capacity::Unlimited => None,
        };

        UsageResponse {
            plan: store.plan().as_str().to_string(),
            rows_processed: usage.rows_processed,
            ai_calls_made: usage.ai_calls_made,
            monthly_rows: match limits.monthly_rows {
                crate::plan::RowQuota::Limited(n) => Some(n),
                crate::plan::RowQuota::Unlimited => None,
            },
            remaining_rows: remaining,
            usage_percentage: meter::usage_percentage(usage.rows_processed, limits.monthly_rows),
            max_file_size: limits.max_file_size,
            max_columns: limits.max_columns,
        }
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Create an error response body.
pub fn error_response(error: &str) -> Value {
    json!({
        "jobId": Uuid::new_v4().to_string(),
        "status": "error",
        "error": error,
    })
}

/// HTTP status for a pipeline error.
pub fn status_for(error: &PipelineError) -> StatusCode {
    match error {
        PipelineError::Usage(UsageError::FileTooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
        PipelineError::Usage(UsageError::TooManyColumns { .. }) => StatusCode::BAD_REQUEST,
        PipelineError::Usage(_) => StatusCode::CONFLICT,
        PipelineError::Ai(AiError::ModelNotEntitled(_)) => StatusCode::FORBIDDEN,
        PipelineError::Ai(AiError::MissingApiKey(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        PipelineError::Ai(_) => StatusCode::BAD_GATEWAY,
        PipelineError::EmptyDataset | PipelineError::EmptyInstruction => StatusCode::BAD_REQUEST,
        PipelineError::StaleDataset => StatusCode::CONFLICT,
        PipelineError::Csv(_) => StatusCode::BAD_REQUEST,
        PipelineError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::import_bytes;

    #[test]
    fn test_import_response_ready() {
        let mut store = SessionStore::in_memory();
        let outcome =
            import_bytes(&mut store, b"a,b\n1,2", "t.csv", false).unwrap();
        let response = ImportResponse::from(outcome);

        assert_eq!(response.status, "ready");
        assert_eq!(response.summary.as_ref().unwrap().admitted_rows, 1);
        assert!(response.partial.is_none());
    }

    #[test]
    fn test_import_response_quota_blocked() {
        let response = ImportResponse::from(ImportOutcome::PartialAvailable {
            admissible: 10,
            total_rows: 1000,
        });

        assert_eq!(response.status, "quotaBlocked");
        assert_eq!(response.partial.as_ref().unwrap().admissible, 10);
        assert!(response.summary.is_none());
    }

    #[test]
    fn test_usage_snapshot_standard() {
        let mut store = SessionStore::in_memory();
        store.record_import(250).unwrap();

        let snapshot = UsageResponse::snapshot(&store);
        assert_eq!(snapshot.plan, "standard");
        assert_eq!(snapshot.rows_processed, 250);
        assert_eq!(snapshot.monthly_rows, Some(1000));
        assert_eq!(snapshot.remaining_rows, Some(750));
        assert_eq!(snapshot.usage_percentage, 25.0);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&PipelineError::from(AiError::InvalidResponse)),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&PipelineError::from(AiError::ModelNotEntitled("m".into()))),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_for(&PipelineError::from(UsageError::QuotaExhausted {
                quota: 1000
            })),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&PipelineError::EmptyDataset),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_camel_case_serialization() {
        let mut store = SessionStore::in_memory();
        let outcome =
            import_bytes(&mut store, b"a,b\n1,2", "t.csv", false).unwrap();
        let body = serde_json::to_value(ImportResponse::from(outcome)).unwrap();

        assert!(body.get("jobId").is_some());
        assert!(body["summary"].get("admittedRows").is_some());
        assert!(body["summary"].get("byteSize").is_some());
    }
}
