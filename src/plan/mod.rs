//! Subscription plan configuration.
//!
//! Tier tables are explicit configuration data loaded once at startup,
//! not scattered conditional literals:
//!
//! - [`PlanTier`] - the closed set of subscription tiers
//! - [`RowQuota`] - monthly row quota, limited or unlimited
//! - [`PlanLimits`] - per-tier quota, upload size and column caps
//! - [`ModelOption`] - an entry in the AI model catalog

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

// =============================================================================
// Tiers
// =============================================================================

/// Subscription tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    /// Standard plan: metered rows, standard models.
    #[default]
    Standard,
    /// Pro plan: unlimited rows, all models.
    Pro,
}

impl PlanTier {
    /// Parse a tier from its identifier.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_lowercase().as_str() {
            "standard" => Some(Self::Standard),
            "pro" => Some(Self::Pro),
            _ => None,
        }
    }

    /// Tier identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Pro => "pro",
        }
    }

    /// Display name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Standard => "Standard",
            Self::Pro => "Pro",
        }
    }

    /// Limits for this tier.
    pub fn limits(&self) -> &'static PlanLimits {
        match self {
            Self::Standard => &PLAN_LIMITS[0],
            Self::Pro => &PLAN_LIMITS[1],
        }
    }

    /// Whether this tier may use the given model.
    pub fn can_use_model(&self, model_id: &str) -> bool {
        match self {
            Self::Pro => true,
            Self::Standard => MODEL_CATALOG
                .iter()
                .any(|m| m.id == model_id && m.tier == PlanTier::Standard),
        }
    }
}

// =============================================================================
// Quota
// =============================================================================

/// Monthly row quota. `Unlimited` is the sentinel for plans without a cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowQuota {
    Limited(u64),
    Unlimited,
}

impl RowQuota {
    pub fn is_unlimited(&self) -> bool {
        matches!(self, RowQuota::Unlimited)
    }
}

impl std::fmt::Display for RowQuota {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RowQuota::Limited(n) => write!(f, "{}", n),
            RowQuota::Unlimited => write!(f, "unlimited"),
        }
    }
}

// =============================================================================
// Limits
// =============================================================================

/// Per-tier usage limits.
#[derive(Debug, Clone, Serialize)]
pub struct PlanLimits {
    /// Tier these limits belong to.
    pub tier: PlanTier,
    /// Monthly price in USD.
    pub price: u32,
    /// Rows admitted per billing period.
    pub monthly_rows: RowQuota,
    /// Upload size cap in bytes.
    pub max_file_size: u64,
    /// Maximum column count per dataset.
    pub max_columns: usize,
}

/// Plan limit table, one entry per tier.
static PLAN_LIMITS: Lazy<Vec<PlanLimits>> = Lazy::new(|| {
    vec![
        PlanLimits {
            tier: PlanTier::Standard,
            price: 0,
            monthly_rows: RowQuota::Limited(1000),
            max_file_size: 5 * 1024 * 1024,
            max_columns: 20,
        },
        PlanLimits {
            tier: PlanTier::Pro,
            price: 29,
            monthly_rows: RowQuota::Unlimited,
            max_file_size: 50 * 1024 * 1024,
            max_columns: 100,
        },
    ]
});

// =============================================================================
// Model catalog
// =============================================================================

/// An AI model available for transforms.
#[derive(Debug, Clone, Serialize)]
pub struct ModelOption {
    /// Provider-qualified model identifier.
    pub id: &'static str,
    /// Display name.
    pub name: &'static str,
    /// Short description.
    pub description: &'static str,
    /// Lowest tier entitled to this model.
    pub tier: PlanTier,
}

/// Default model for new sessions.
pub const DEFAULT_MODEL: &str = "openai/gpt-3.5-turbo";

/// The model catalog.
pub static MODEL_CATALOG: Lazy<Vec<ModelOption>> = Lazy::new(|| {
    vec![
        ModelOption {
            id: "openai/gpt-3.5-turbo",
            name: "GPT-3.5 Turbo",
            description: "Fast and efficient for most tasks",
            tier: PlanTier::Standard,
        },
        ModelOption {
            id: "mistralai/mixtral-8x7b-instruct",
            name: "Mixtral 8x7B",
            description: "Open source, great for general tasks",
            tier: PlanTier::Standard,
        },
        ModelOption {
            id: "openai/gpt-4",
            name: "GPT-4",
            description: "Most capable, best for complex transformations",
            tier: PlanTier::Pro,
        },
        ModelOption {
            id: "openai/gpt-4-turbo",
            name: "GPT-4 Turbo",
            description: "Latest GPT-4 with improved speed",
            tier: PlanTier::Pro,
        },
        ModelOption {
            id: "anthropic/claude-3-opus",
            name: "Claude 3 Opus",
            description: "Best for nuanced understanding",
            tier: PlanTier::Pro,
        },
        ModelOption {
            id: "anthropic/claude-3-sonnet",
            name: "Claude 3 Sonnet",
            description: "Balanced performance and speed",
            tier: PlanTier::Pro,
        },
    ]
});

/// Models a tier is entitled to use.
pub fn models_for_tier(tier: PlanTier) -> Vec<&'static ModelOption> {
    MODEL_CATALOG
        .iter()
        .filter(|m| m.tier == PlanTier::Standard || tier == PlanTier::Pro)
        .collect()
}
