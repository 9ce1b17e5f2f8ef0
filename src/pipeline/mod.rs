//! Pipeline orchestration: usage-metered import, AI transform and
//! export against the session store.
//!
//! Every operation leaves the dataset and usage counters untouched on
//! failure; error reports are appended to the chat transcript, which is
//! append-only and exempt from that guarantee.
//!
//! # Example
//!
//! ```rust,ignore
//! use cleandata::pipeline::{import_bytes, ImportOutcome};
//! use cleandata::store::SessionStore;
//!
//! let mut store = SessionStore::load(".");
//! match import_bytes(&mut store, csv_bytes, "people.csv", false)? {
//!     ImportOutcome::Admitted(summary) => println!("{} rows", summary.admitted_rows),
//!     ImportOutcome::PartialAvailable { admissible, .. } => {
//!         // ask the user, then re-run with accept_partial = true
//!     }
//! }
//! ```

use serde::Serialize;
use serde_json::Value;

use crate::ai::{AiClient, MAX_ROWS_PER_CALL};
use crate::api::events;
use crate::codec::{self, SEQ_FIELD};
use crate::error::{AiError, PipelineError, PipelineResult, UsageError};
use crate::meter::{self, Admission};
use crate::plan::RowQuota;
use crate::store::{ChatMessage, SessionStore};

// =============================================================================
// Transcript helpers
// =============================================================================

/// Append a transcript entry and publish it to SSE subscribers.
fn note(store: &mut SessionStore, message: ChatMessage) -> PipelineResult<()> {
    events::publish(&message);
    store.push_message(message)?;
    Ok(())
}

/// Append an error report for a failed operation.
pub fn report_failure(store: &mut SessionStore, error: &PipelineError) {
    let message = ChatMessage::error(error.to_string());
    events::publish(&message);
    // A transcript write failure must not mask the original error.
    let _ = store.push_message(message);
}

// =============================================================================
// Import
// =============================================================================

/// Result of an admitted import.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    /// Rows admitted into the dataset.
    pub admitted_rows: usize,
    /// Rows in the uploaded file.
    pub total_rows: usize,
    /// True when quota capacity truncated the import.
    pub truncated: bool,
    /// Column names of the dataset.
    pub columns: Vec<String>,
    /// Byte-size estimate of the admitted dataset.
    pub byte_size: usize,
}

/// Outcome of an import attempt.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum ImportOutcome {
    /// Rows were admitted and the dataset replaced.
    Admitted(ImportSummary),
    /// The file exceeds remaining quota capacity. Nothing was admitted;
    /// re-submitting with partial acceptance admits the first
    /// `admissible` rows.
    PartialAvailable { admissible: u64, total_rows: usize },
}

/// Import a CSV upload into the session.
///
/// Gates run in order: file byte size, decode, parse, column count,
/// row-count quota. An upload that exceeds remaining capacity is not
/// admitted unless `accept_partial` is set, in which case exactly the
/// first N rows (N = remaining capacity) are admitted, in file order,
/// and the row counter advances by N.
pub fn import_bytes(
    store: &mut SessionStore,
    bytes: &[u8],
    file_name: &str,
    accept_partial: bool,
) -> PipelineResult<ImportOutcome> {
    let limits = store.plan().limits();

    if let Err(e) = meter::check_file_size(bytes.len() as u64, limits) {
        let err = PipelineError::from(e);
        report_failure(store, &err);
        return Err(err);
    }

    let text = codec::decode(bytes).map_err(PipelineError::from)?;
    let mut rows = codec::parse(&text);
    let total_rows = rows.len();

    if let Err(e) = meter::check_columns(codec::columns(&rows).len(), limits) {
        let err = PipelineError::from(e);
        report_failure(store, &err);
        return Err(err);
    }

    let usage = store.usage();
    let admission =
        match meter::check_admission(usage.rows_processed, limits.monthly_rows, total_rows as u64)
        {
            Ok(a) => a,
            Err(e) => {
                let err = PipelineError::from(e);
                report_failure(store, &err);
                return Err(err);
            }
        };

    let truncated = match admission {
        Admission::Full => false,
        Admission::Partial { admissible } => {
            if !accept_partial {
                // Partial admissions only arise from limited quotas.
                let RowQuota::Limited(quota) = limits.monthly_rows else {
                    unreachable!("partial admission on an unlimited quota");
                };
                let offer = UsageError::QuotaExceeded {
                    remaining: admissible,
                    quota,
                };
                report_failure(store, &PipelineError::from(offer));
                return Ok(ImportOutcome::PartialAvailable {
                    admissible,
                    total_rows,
                });
            }
            rows.truncate(admissible as usize);
            true
        }
    };

    let admitted_rows = rows.len();
    let columns = codec::columns(&rows);
    let byte_size = codec::estimated_size(&rows);

    store.replace_dataset(rows, Some(file_name.to_string()))?;
    store.record_import(admitted_rows as u64)?;

    let message = if truncated {
        format!(
            "Loaded the first {admitted_rows} of {total_rows} rows from {file_name} (monthly row limit)."
        )
    } else {
        format!("Loaded {file_name} with {admitted_rows} rows.")
    };
    note(store, ChatMessage::system(message))?;

    Ok(ImportOutcome::Admitted(ImportSummary {
        admitted_rows,
        total_rows,
        truncated,
        columns,
        byte_size,
    }))
}

// =============================================================================
// Transform
// =============================================================================

/// A prepared transform call: everything needed for the gateway round
/// trip, captured before any network I/O.
#[derive(Debug, Clone)]
pub struct TransformRequest {
    /// Model the call will run on.
    pub model: String,
    /// User instruction.
    pub instruction: String,
    /// First ≤20 rows of the dataset.
    pub sample: Vec<Value>,
    /// Dataset version at capture time, for stale-merge fencing.
    pub version: u64,
}

/// Result of an applied transform.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformSummary {
    /// Rows returned by the AI and merged.
    pub rows_returned: usize,
    /// Model that ran the transform.
    pub model: String,
}

/// Validate a transform and capture its request.
///
/// Rejects an empty instruction or dataset, appends the user message to
/// the transcript, then checks model entitlement, all before any
/// external call. On entitlement denial nothing but the transcript has
/// changed.
pub fn prepare_transform(
    store: &mut SessionStore,
    instruction: &str,
) -> PipelineResult<TransformRequest> {
    let instruction = instruction.trim();
    if instruction.is_empty() {
        return Err(PipelineError::EmptyInstruction);
    }
    if store.dataset().is_empty() {
        let err = PipelineError::EmptyDataset;
        report_failure(store, &err);
        return Err(err);
    }

    note(store, ChatMessage::user(instruction))?;

    let model = store.selected_model().to_string();
    if !store.plan().can_use_model(&model) {
        let err = PipelineError::from(AiError::ModelNotEntitled(model));
        report_failure(store, &err);
        return Err(err);
    }

    let sample: Vec<Value> = store
        .dataset()
        .iter()
        .take(MAX_ROWS_PER_CALL)
        .cloned()
        .collect();

    Ok(TransformRequest {
        model,
        instruction: instruction.to_string(),
        sample,
        version: store.version(),
    })
}

/// Merge AI-returned rows into the dataset by position.
///
/// Element `i` of `patches` shallow-merges into row `i`: patch fields
/// overwrite, absent fields stay, and the sequence field is never
/// overwritten. Patches beyond the dataset length are dropped.
pub fn merge_rows(dataset: &[Value], patches: &[Value]) -> Vec<Value> {
    let mut merged = dataset.to_vec();
    for (i, patch) in patches.iter().enumerate() {
        let Some(patch_obj) = patch.as_object() else {
            continue;
        };
        let Some(row) = merged.get_mut(i).and_then(|r| r.as_object_mut()) else {
            continue;
        };
        for (key, value) in patch_obj {
            if key == SEQ_FIELD {
                continue;
            }
            row.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// Apply a gateway response to the session.
///
/// The merge is fenced on the dataset version captured at submission:
/// if the dataset was replaced while the call was in flight, the result
/// is discarded and no counter moves. On success `ai_calls_made`
/// increments by exactly one; `rows_processed` is never touched by a
/// transform.
pub fn apply_transform(
    store: &mut SessionStore,
    request: &TransformRequest,
    patches: &[Value],
) -> PipelineResult<TransformSummary> {
    if store.version() != request.version {
        let err = PipelineError::StaleDataset;
        report_failure(store, &err);
        return Err(err);
    }

    let merged = merge_rows(store.dataset(), patches);
    store.merge_dataset(merged)?;
    store.record_ai_call()?;

    let summary = TransformSummary {
        rows_returned: patches.len(),
        model: request.model.clone(),
    };
    note(
        store,
        ChatMessage::assistant(format!(
            "Processed {} rows successfully.",
            summary.rows_returned
        )),
    )?;
    Ok(summary)
}

/// Run a complete transform: prepare, call the gateway, merge.
///
/// Gateway failures are reported on the transcript and leave the
/// dataset and counters untouched; there is no automatic retry.
pub async fn run_transform(
    store: &mut SessionStore,
    client: &AiClient,
    instruction: &str,
) -> PipelineResult<TransformSummary> {
    let request = prepare_transform(store, instruction)?;

    let patches = match client
        .transform_rows(&request.model, &request.instruction, &request.sample)
        .await
    {
        Ok(patches) => patches,
        Err(e) => {
            let err = PipelineError::from(e);
            report_failure(store, &err);
            return Err(err);
        }
    };

    apply_transform(store, &request, &patches)
}

// =============================================================================
// Export / clear
// =============================================================================

/// An exportable CSV payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportPayload {
    /// Suggested download name: `cleaned_<source>`.
    pub file_name: String,
    /// CSV text.
    pub content: String,
}

/// Serialize the current dataset for download.
pub fn export(store: &SessionStore) -> PipelineResult<ExportPayload> {
    if store.dataset().is_empty() {
        return Err(PipelineError::EmptyDataset);
    }
    Ok(ExportPayload {
        file_name: format!("cleaned_{}", store.file_name().unwrap_or("data.csv")),
        content: codec::serialize(store.dataset()),
    })
}

/// Clear the dataset and its file name.
pub fn clear(store: &mut SessionStore) -> PipelineResult<()> {
    store.clear_dataset()?;
    note(store, ChatMessage::system("Dataset cleared."))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::PlanTier;
    use serde_json::json;

    fn csv_of(rows: usize) -> String {
        let mut text = String::from("name,email\n");
        for i in 0..rows {
            text.push_str(&format!("user{i},user{i}@example.com\n"));
        }
        text
    }

    fn loaded_store(rows: usize) -> SessionStore {
        let mut store = SessionStore::in_memory();
        import_bytes(&mut store, csv_of(rows).as_bytes(), "test.csv", false).unwrap();
        store
    }

    // -------------------------------------------------------------------------
    // Import
    // -------------------------------------------------------------------------

    #[test]
    fn test_import_admits_and_counts() {
        let mut store = SessionStore::in_memory();
        let outcome =
            import_bytes(&mut store, csv_of(3).as_bytes(), "people.csv", false).unwrap();

        let ImportOutcome::Admitted(summary) = outcome else {
            panic!("expected admission");
        };
        assert_eq!(summary.admitted_rows, 3);
        assert!(!summary.truncated);
        assert_eq!(summary.columns, vec!["name", "email"]);
        assert_eq!(store.dataset().len(), 3);
        assert_eq!(store.usage().rows_processed, 3);
        assert_eq!(store.file_name(), Some("people.csv"));
    }

    #[test]
    fn test_import_exact_quota_boundary() {
        // 950 rows used of 1000: a 50-row file fits exactly...
        let mut store = SessionStore::in_memory();
        store.record_import(950).unwrap();
        import_bytes(&mut store, csv_of(50).as_bytes(), "a.csv", false).unwrap();
        assert_eq!(store.usage().rows_processed, 1000);

        // ...but a 51-row file is rejected outright, not truncated.
        let mut store = SessionStore::in_memory();
        store.record_import(950).unwrap();
        let outcome =
            import_bytes(&mut store, csv_of(51).as_bytes(), "b.csv", false).unwrap();
        assert!(matches!(
            outcome,
            ImportOutcome::PartialAvailable {
                admissible: 50,
                total_rows: 51
            }
        ));
        assert!(store.dataset().is_empty());
        assert_eq!(store.usage().rows_processed, 950);
    }

    #[test]
    fn test_partial_admission_determinism() {
        let mut store = SessionStore::in_memory();
        store.record_import(990).unwrap();

        let outcome =
            import_bytes(&mut store, csv_of(1000).as_bytes(), "big.csv", true).unwrap();

        let ImportOutcome::Admitted(summary) = outcome else {
            panic!("expected partial admission");
        };
        assert_eq!(summary.admitted_rows, 10);
        assert_eq!(summary.total_rows, 1000);
        assert!(summary.truncated);

        // Exactly the first 10 rows of the file, in file order.
        assert_eq!(store.dataset().len(), 10);
        for (i, row) in store.dataset().iter().enumerate() {
            assert_eq!(row["id"], i);
            assert_eq!(row["name"], format!("user{i}"));
        }
        // Counter advances by the admitted count, not the file's size.
        assert_eq!(store.usage().rows_processed, 1000);
    }

    #[test]
    fn test_exhausted_quota_rejects() {
        let mut store = SessionStore::in_memory();
        store.record_import(1000).unwrap();

        let err =
            import_bytes(&mut store, csv_of(5).as_bytes(), "c.csv", true).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Usage(UsageError::QuotaExhausted { .. })
        ));
        assert!(store.dataset().is_empty());
        assert_eq!(store.usage().rows_processed, 1000);
    }

    #[test]
    fn test_unlimited_quota_admits_everything() {
        let mut store = SessionStore::in_memory();
        store.set_plan(PlanTier::Pro).unwrap();
        store.record_import(10_000_000).unwrap();

        let outcome =
            import_bytes(&mut store, csv_of(500).as_bytes(), "d.csv", false).unwrap();
        assert!(matches!(outcome, ImportOutcome::Admitted(_)));
    }

    #[test]
    fn test_file_size_gate_runs_before_parse() {
        let mut store = SessionStore::in_memory();
        let max = store.plan().limits().max_file_size as usize;
        // Not even valid CSV: the gate must fire on byte length alone.
        let blob = vec![b'x'; max + 1];

        let err = import_bytes(&mut store, &blob, "huge.csv", false).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Usage(UsageError::FileTooLarge { .. })
        ));
        assert!(store.dataset().is_empty());
        assert_eq!(store.usage().rows_processed, 0);
    }

    #[test]
    fn test_column_gate() {
        let mut store = SessionStore::in_memory();
        let header: Vec<String> = (0..21).map(|i| format!("c{i}")).collect();
        let line: Vec<&str> = (0..21).map(|_| "v").collect();
        let csv = format!("{}\n{}\n", header.join(","), line.join(","));

        let err = import_bytes(&mut store, csv.as_bytes(), "wide.csv", false).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Usage(UsageError::TooManyColumns { max: 20 })
        ));
        assert!(store.dataset().is_empty());
    }

    #[test]
    fn test_import_replaces_wholesale() {
        let mut store = loaded_store(3);
        import_bytes(&mut store, csv_of(2).as_bytes(), "second.csv", false).unwrap();

        assert_eq!(store.dataset().len(), 2);
        assert_eq!(store.file_name(), Some("second.csv"));
        assert_eq!(store.usage().rows_processed, 5);
        assert_eq!(store.version(), 2);
    }

    // -------------------------------------------------------------------------
    // Transform preparation
    // -------------------------------------------------------------------------

    #[test]
    fn test_prepare_rejects_empty_instruction() {
        let mut store = loaded_store(2);
        let err = prepare_transform(&mut store, "   ").unwrap_err();
        assert!(matches!(err, PipelineError::EmptyInstruction));
    }

    #[test]
    fn test_prepare_rejects_empty_dataset() {
        let mut store = SessionStore::in_memory();
        let err = prepare_transform(&mut store, "tidy up").unwrap_err();
        assert!(matches!(err, PipelineError::EmptyDataset));
    }

    #[test]
    fn test_prepare_rejects_unentitled_model_before_any_call() {
        let mut store = loaded_store(2);
        store.set_model("openai/gpt-4").unwrap();

        let usage_before = store.usage();
        let err = prepare_transform(&mut store, "tidy up").unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Ai(AiError::ModelNotEntitled(_))
        ));
        assert_eq!(store.usage(), usage_before);
        assert_eq!(store.dataset().len(), 2);
    }

    #[test]
    fn test_prepare_bounds_sample_to_twenty_rows() {
        let mut store = loaded_store(50);
        let request = prepare_transform(&mut store, "dedupe").unwrap();

        assert_eq!(request.sample.len(), 20);
        assert_eq!(request.sample[0]["id"], 0);
        assert_eq!(request.sample[19]["id"], 19);
    }

    // -------------------------------------------------------------------------
    // Merge
    // -------------------------------------------------------------------------

    #[test]
    fn test_merge_scoping() {
        let dataset = codec::parse("name,email\na,a@x\nb,b@x\nc,c@x\nd,d@x\ne,e@x");
        let patches = vec![
            json!({"id": 42, "name": "A", "extra": "new"}),
            json!({"name": "B"}),
        ];

        let merged = merge_rows(&dataset, &patches);

        // Rows 0-1: patched fields overwrite, absent fields untouched,
        // sequence field protected even against a conflicting value.
        assert_eq!(merged[0]["name"], "A");
        assert_eq!(merged[0]["email"], "a@x");
        assert_eq!(merged[0]["extra"], "new");
        assert_eq!(merged[0]["id"], 0);
        assert_eq!(merged[1]["name"], "B");
        assert_eq!(merged[1]["email"], "b@x");
        assert_eq!(merged[1]["id"], 1);

        // Rows 2-4: byte-for-byte unchanged.
        for i in 2..5 {
            assert_eq!(merged[i], dataset[i]);
        }
    }

    #[test]
    fn test_merge_drops_excess_patches() {
        let dataset = codec::parse("a\n1\n2");
        let patches = vec![
            json!({"a": "x"}),
            json!({"a": "y"}),
            json!({"a": "overflow"}),
        ];

        let merged = merge_rows(&dataset, &patches);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[1]["a"], "y");
    }

    // -------------------------------------------------------------------------
    // Apply
    // -------------------------------------------------------------------------

    #[test]
    fn test_apply_counter_asymmetry() {
        let mut store = loaded_store(5);
        let rows_before = store.usage().rows_processed;

        let request = prepare_transform(&mut store, "uppercase names").unwrap();
        let patches = vec![json!({"name": "USER0"})];
        apply_transform(&mut store, &request, &patches).unwrap();

        assert_eq!(store.usage().ai_calls_made, 1);
        assert_eq!(store.usage().rows_processed, rows_before);
        assert_eq!(store.dataset()[0]["name"], "USER0");
    }

    #[test]
    fn test_apply_discards_stale_merge() {
        let mut store = loaded_store(3);
        let request = prepare_transform(&mut store, "tidy").unwrap();

        // Dataset replaced while the call was in flight.
        import_bytes(&mut store, csv_of(2).as_bytes(), "other.csv", false).unwrap();
        let usage_before = store.usage();
        let dataset_before = store.dataset().to_vec();

        let err =
            apply_transform(&mut store, &request, &[json!({"name": "X"})]).unwrap_err();

        assert!(matches!(err, PipelineError::StaleDataset));
        assert_eq!(store.usage(), usage_before);
        assert_eq!(store.dataset(), dataset_before.as_slice());
    }

    // -------------------------------------------------------------------------
    // Export / clear
    // -------------------------------------------------------------------------

    #[test]
    fn test_export_names_and_serializes() {
        let store = loaded_store(2);
        let payload = export(&store).unwrap();

        assert_eq!(payload.file_name, "cleaned_test.csv");
        assert!(payload.content.starts_with("name,email\n"));
        assert!(!payload.content.contains("id"));
    }

    #[test]
    fn test_export_empty_dataset_is_error() {
        let store = SessionStore::in_memory();
        assert!(matches!(
            export(&store).unwrap_err(),
            PipelineError::EmptyDataset
        ));
    }

    #[test]
    fn test_clear() {
        let mut store = loaded_store(2);
        clear(&mut store).unwrap();
        assert!(store.dataset().is_empty());
        assert_eq!(store.file_name(), None);
    }
}
