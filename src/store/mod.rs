//! Session store: the single application-state container.
//!
//! Owns everything a client session persists: the dataset (with its
//! source file name and version stamp), the selected AI model, the plan
//! tier, usage counters and the chat transcript. State is loaded from a
//! JSON blob at startup and written back on every mutation; a missing or
//! corrupt blob yields fresh default state.
//!
//! The store is an explicit injectable container, so the meter and the
//! transform gateway can be unit-tested against fixture state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::StoreResult;
use crate::meter::Usage;
use crate::plan::{PlanTier, DEFAULT_MODEL};

/// Directory holding the session blob (relative to the state root).
const STORE_DIR: &str = ".cleandata";

/// Session blob file name.
const STORE_FILE: &str = "session.json";

// =============================================================================
// Chat transcript
// =============================================================================

/// Author of a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Error,
}

/// One transcript entry. The transcript is append-only for the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::new(Role::Error, content)
    }
}

// =============================================================================
// Persisted state
// =============================================================================

/// The persisted session state.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionState {
    dataset: Vec<Value>,
    file_name: Option<String>,
    /// Monotonic stamp, bumped on every wholesale dataset replacement.
    version: u64,
    selected_model: String,
    plan: PlanTier,
    usage: Usage,
    messages: Vec<ChatMessage>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            dataset: Vec::new(),
            file_name: None,
            version: 0,
            selected_model: DEFAULT_MODEL.to_string(),
            plan: PlanTier::default(),
            usage: Usage::default(),
            messages: vec![ChatMessage::system(
                "Ready to analyze your data. Import a file to get started.",
            )],
        }
    }
}

// =============================================================================
// Store
// =============================================================================

/// The session store.
pub struct SessionStore {
    /// Blob path; `None` keeps the store purely in memory.
    path: Option<PathBuf>,
    state: SessionState,
}

impl SessionStore {
    /// Load the session from `<root>/.cleandata/session.json`, falling
    /// back to default state if the blob is missing or unreadable.
    pub fn load(root: impl AsRef<Path>) -> Self {
        let path = root.as_ref().join(STORE_DIR).join(STORE_FILE);
        let state = fs::read_to_string(&path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default();
        Self {
            path: Some(path),
            state,
        }
    }

    /// An in-memory store for tests and one-shot commands.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: SessionState::default(),
        }
    }

    /// Write the current state back to disk.
    fn persist(&self) -> StoreResult<()> {
        let Some(ref path) = self.path else {
            return Ok(());
        };
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, serde_json::to_string(&self.state)?)?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn dataset(&self) -> &[Value] {
        &self.state.dataset
    }

    pub fn file_name(&self) -> Option<&str> {
        self.state.file_name.as_deref()
    }

    /// Current dataset version stamp.
    pub fn version(&self) -> u64 {
        self.state.version
    }

    pub fn usage(&self) -> Usage {
        self.state.usage
    }

    pub fn plan(&self) -> PlanTier {
        self.state.plan
    }

    pub fn selected_model(&self) -> &str {
        &self.state.selected_model
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.state.messages
    }

    // -------------------------------------------------------------------------
    // Mutations (persist on write)
    // -------------------------------------------------------------------------

    /// Replace the dataset wholesale with a freshly imported one.
    pub fn replace_dataset(
        &mut self,
        rows: Vec<Value>,
        file_name: Option<String>,
    ) -> StoreResult<()> {
        self.state.dataset = rows;
        self.state.file_name = file_name;
        self.state.version += 1;
        self.persist()
    }

    /// Replace the dataset with a merged copy, keeping the file name.
    pub fn merge_dataset(&mut self, rows: Vec<Value>) -> StoreResult<()> {
        self.state.dataset = rows;
        self.state.version += 1;
        self.persist()
    }

    /// Clear the dataset and its file name.
    pub fn clear_dataset(&mut self) -> StoreResult<()> {
        self.state.dataset.clear();
        self.state.file_name = None;
        self.state.version += 1;
        self.persist()
    }

    /// Append a transcript entry.
    pub fn push_message(&mut self, message: ChatMessage) -> StoreResult<()> {
        self.state.messages.push(message);
        self.persist()
    }

    pub fn set_model(&mut self, model: impl Into<String>) -> StoreResult<()> {
        self.state.selected_model = model.into();
        self.persist()
    }

    pub fn set_plan(&mut self, plan: PlanTier) -> StoreResult<()> {
        self.state.plan = plan;
        self.persist()
    }

    /// Record rows admitted by an import.
    pub fn record_import(&mut self, count: u64) -> StoreResult<()> {
        self.state.usage.record_import(count);
        self.persist()
    }

    /// Record one successful AI call.
    pub fn record_ai_call(&mut self) -> StoreResult<()> {
        self.state.usage.record_ai_call();
        self.persist()
    }

    /// Reset usage counters for a new billing period.
    pub fn reset_usage(&mut self) -> StoreResult<()> {
        self.state.usage.reset();
        self.persist()
    }
}
