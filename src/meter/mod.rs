//! Usage meter: admission decisions against plan quotas.
//!
//! Tracks cumulative rows processed and AI calls made within a billing
//! period and decides whether a new batch of rows may be admitted. When
//! a batch exceeds remaining capacity, the meter offers a deterministic
//! truncated alternative (the first N rows in file order) instead of
//! silently dropping rows; admitting it requires explicit confirmation.
//!
//! Counter asymmetry: imports increment `rows_processed` by the admitted
//! row count; transforms increment `ai_calls_made` by exactly one and
//! never touch `rows_processed`.

use serde::{Deserialize, Serialize};

use crate::codec::format_size;
use crate::error::{UsageError, UsageResult};
use crate::plan::{PlanLimits, RowQuota};

// =============================================================================
// Usage counters
// =============================================================================

/// Per-period usage counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Rows admitted by imports this period.
    pub rows_processed: u64,
    /// Successful AI transform calls this period.
    pub ai_calls_made: u64,
}

impl Usage {
    /// Record an import that admitted `count` rows.
    pub fn record_import(&mut self, count: u64) {
        self.rows_processed += count;
    }

    /// Record one successful AI call. Rows processed is unchanged.
    pub fn record_ai_call(&mut self) {
        self.ai_calls_made += 1;
    }

    /// Reset both counters. Period rollover is driven externally.
    pub fn reset(&mut self) {
        *self = Usage::default();
    }
}

// =============================================================================
// Capacity
// =============================================================================

/// Remaining capacity within a quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacity {
    Rows(u64),
    Unlimited,
}

/// Whether `incoming` rows fit within the quota given rows already
/// processed this period.
pub fn can_admit(rows_processed: u64, quota: RowQuota, incoming: u64) -> bool {
    match quota {
        RowQuota::Unlimited => true,
        RowQuota::Limited(limit) => rows_processed + incoming <= limit,
    }
}

/// Rows that may still be admitted this period.
pub fn remaining_capacity(rows_processed: u64, quota: RowQuota) -> Capacity {
    match quota {
        RowQuota::Unlimited => Capacity::Unlimited,
        RowQuota::Limited(limit) => Capacity::Rows(limit.saturating_sub(rows_processed)),
    }
}

/// Percentage of the quota consumed, for display. Unlimited plans are 0.
pub fn usage_percentage(rows_processed: u64, quota: RowQuota) -> f64 {
    match quota {
        RowQuota::Unlimited => 0.0,
        RowQuota::Limited(0) => 100.0,
        RowQuota::Limited(limit) => {
            (rows_processed as f64 / limit as f64 * 100.0).min(100.0)
        }
    }
}

// =============================================================================
// Admission
// =============================================================================

/// Outcome of a row-count admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The full batch fits.
    Full,
    /// The batch does not fit; the first `admissible` rows could be
    /// admitted with explicit confirmation.
    Partial { admissible: u64 },
}

/// Decide whether `incoming` rows may be admitted.
///
/// Returns [`Admission::Partial`] when the batch exceeds remaining
/// capacity but some rows remain; the caller must obtain explicit
/// confirmation before admitting the truncated subset. A batch that
/// exceeds an exhausted quota is rejected outright.
pub fn check_admission(
    rows_processed: u64,
    quota: RowQuota,
    incoming: u64,
) -> UsageResult<Admission> {
    if can_admit(rows_processed, quota, incoming) {
        return Ok(Admission::Full);
    }

    // Only Limited quotas can reach this point.
    let RowQuota::Limited(limit) = quota else {
        return Ok(Admission::Full);
    };

    match remaining_capacity(rows_processed, quota) {
        Capacity::Rows(0) => Err(UsageError::QuotaExhausted { quota: limit }),
        Capacity::Rows(remaining) => Ok(Admission::Partial {
            admissible: remaining,
        }),
        Capacity::Unlimited => Ok(Admission::Full),
    }
}

/// Reject uploads whose raw byte size exceeds the plan cap.
///
/// This gate runs before any decode or parse attempt.
pub fn check_file_size(byte_len: u64, limits: &PlanLimits) -> UsageResult<()> {
    if byte_len > limits.max_file_size {
        return Err(UsageError::FileTooLarge {
            max: format_size(limits.max_file_size),
        });
    }
    Ok(())
}

/// Reject datasets with more columns than the plan allows.
pub fn check_columns(column_count: usize, limits: &PlanLimits) -> UsageResult<()> {
    if column_count > limits.max_columns {
        return Err(UsageError::TooManyColumns {
            max: limits.max_columns,
        });
    }
    Ok(())
}
