//! # CleanData - plan-metered CSV cleaning pipeline
//!
//! CleanData imports CSV files, lets an external AI service transform a
//! bounded sample of the rows, and exports the cleaned result - all
//! metered against a subscription plan's monthly row quota.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   CSV File  │────▶│    Codec    │────▶│    Meter    │────▶│   Session   │
//! │   (bytes)   │     │ (parse/ser) │     │ (quota gate)│     │    Store    │
//! └─────────────┘     └─────────────┘     └─────────────┘     └──────┬──────┘
//!                                                                    │
//!                     ┌─────────────┐     ┌─────────────┐            │
//!                     │  Cleaned    │◀────│  Transform  │◀───────────┘
//!                     │    CSV      │     │   Gateway   │  (first ≤20 rows)
//!                     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cleandata::pipeline::{import_bytes, run_transform, export};
//! use cleandata::store::SessionStore;
//! use cleandata::ai::AiClient;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut store = SessionStore::load(".");
//!     import_bytes(&mut store, &csv_bytes, "people.csv", false).unwrap();
//!
//!     let client = AiClient::from_env().unwrap();
//!     run_transform(&mut store, &client, "normalize email addresses").await.unwrap();
//!
//!     println!("{}", export(&store).unwrap().content);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`codec`] - CSV parsing and serialization
//! - [`plan`] - Subscription tiers, limits and the model catalog
//! - [`meter`] - Usage counters and quota admission
//! - [`store`] - Persisted session state (dataset, transcript, usage)
//! - [`ai`] - Transform gateway HTTP client
//! - [`pipeline`] - Import / transform / export orchestration
//! - [`api`] - HTTP API server

// Core modules
pub mod error;

// CSV
pub mod codec;

// Plans and metering
pub mod meter;
pub mod plan;

// Session state
pub mod store;

// AI
pub mod ai;

// Orchestration
pub mod pipeline;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{AiError, CsvError, PipelineError, ServerError, StoreError, UsageError};

// =============================================================================
// Re-exports - Codec
// =============================================================================

pub use codec::{decode, estimated_size, format_size, parse, serialize, SEQ_FIELD};

// =============================================================================
// Re-exports - Plans
// =============================================================================

pub use plan::{models_for_tier, ModelOption, PlanLimits, PlanTier, RowQuota, DEFAULT_MODEL};

// =============================================================================
// Re-exports - Meter
// =============================================================================

pub use meter::{can_admit, check_admission, remaining_capacity, Admission, Capacity, Usage};

// =============================================================================
// Re-exports - Store
// =============================================================================

pub use store::{ChatMessage, Role, SessionStore};

// =============================================================================
// Re-exports - AI Client
// =============================================================================

pub use ai::{AiClient, MAX_ROWS_PER_CALL};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use pipeline::{
    apply_transform, clear, export, import_bytes, merge_rows, prepare_transform, run_transform,
    ExportPayload, ImportOutcome, ImportSummary, TransformRequest, TransformSummary,
};

// Server
pub mod server {
    pub use crate::api::server::start_server;
}
