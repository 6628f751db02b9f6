//! Core types for Mnemon

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{MnemonError, Result};

/// Unique identifier for a memory record (`mem-<uuid-v4>`)
pub type MemoryId = String;

/// Strict identifier format: `mem-` followed by a lowercase hyphenated UUID.
///
/// Ids and categories are interpolated into query predicates by callers of the
/// store, so both must pass validation before any SQL executes.
static ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^mem-[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
        .expect("id pattern is valid")
});

/// Validate a memory id against the strict identifier format
pub fn validate_id(id: &str) -> Result<()> {
    if ID_PATTERN.is_match(id) {
        Ok(())
    } else {
        Err(MnemonError::InvalidId(id.to_string()))
    }
}

/// Generate a fresh memory id
pub fn new_memory_id() -> MemoryId {
    format!("mem-{}", uuid::Uuid::new_v4())
}

/// Merge policy attached to each category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// One record per store; new candidates always fold into it
    AlwaysMerge,
    /// Dedup engine decides create/merge/skip per candidate
    MergeSupported,
    /// Distinct entries are never combined; merge verdicts are not honored
    AppendOnly,
}

/// Memory category classification
///
/// A closed set of six tags, each carrying its merge policy. Open string
/// unions are rejected at the store boundary with `InvalidCategory`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Long-lived identity facts about the user (singleton per store)
    Profile,
    /// Stated likes, dislikes, and settings
    Preferences,
    /// Domain facts the agent has learned
    Knowledge,
    /// Abilities and workflows the user demonstrated
    Skills,
    /// Things that happened at a point in time
    Events,
    /// Conversation summaries
    Conversations,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Profile => "profile",
            Category::Preferences => "preferences",
            Category::Knowledge => "knowledge",
            Category::Skills => "skills",
            Category::Events => "events",
            Category::Conversations => "conversations",
        }
    }

    /// Merge policy for this category
    pub fn merge_policy(&self) -> MergePolicy {
        match self {
            Category::Profile => MergePolicy::AlwaysMerge,
            Category::Preferences | Category::Knowledge | Category::Skills => {
                MergePolicy::MergeSupported
            }
            Category::Events | Category::Conversations => MergePolicy::AppendOnly,
        }
    }

    pub fn all() -> &'static [Category] {
        &[
            Category::Profile,
            Category::Preferences,
            Category::Knowledge,
            Category::Skills,
            Category::Events,
            Category::Conversations,
        ]
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = MnemonError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "profile" => Ok(Category::Profile),
            "preferences" => Ok(Category::Preferences),
            "knowledge" => Ok(Category::Knowledge),
            "skills" => Ok(Category::Skills),
            "events" => Ok(Category::Events),
            "conversations" => Ok(Category::Conversations),
            other => Err(MnemonError::InvalidCategory(other.to_string())),
        }
    }
}

/// A persisted memory record
///
/// Three granularity tiers: `abstract_` (L0, one-line index text),
/// `overview` (L1, structured summary, may be empty), `content` (L2, full
/// narrative). The vector embeds `abstract + " " + content`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Unique identifier, immutable once assigned
    pub id: MemoryId,
    /// Category, immutable once assigned
    pub category: Category,
    /// L0 one-line abstract
    #[serde(rename = "abstract")]
    pub abstract_: String,
    /// L1 structured overview, may be empty
    #[serde(default)]
    pub overview: String,
    /// L2 full narrative content
    pub content: String,
    /// Fixed-dimension embedding of `abstract + " " + content`
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub vector: Vec<f32>,
    /// Provenance tag, immutable once assigned
    pub source_session: String,
    /// Usage counter, bumped only by recall
    #[serde(default)]
    pub active_count: i64,
    /// When the record was created (immutable)
    pub created_at: DateTime<Utc>,
    /// Bumped on every mutation
    pub updated_at: DateTime<Utc>,
}

impl MemoryRecord {
    /// The text that gets embedded for this record
    pub fn embedding_text(&self) -> String {
        format!("{} {}", self.abstract_, self.content)
    }
}

/// Raw extraction output, not persisted directly
///
/// Lifecycle: produced per extraction call, then promoted to a record, merged
/// into one, or discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateMemory {
    pub category: Category,
    #[serde(rename = "abstract")]
    pub abstract_: String,
    #[serde(default)]
    pub overview: String,
    pub content: String,
}

impl CandidateMemory {
    /// The text that gets embedded for this candidate
    pub fn embedding_text(&self) -> String {
        format!("{} {}", self.abstract_, self.content)
    }
}

/// Input for creating a record (the store assigns id, timestamps, and
/// the zeroed active count)
#[derive(Debug, Clone)]
pub struct CreateRecordInput {
    pub category: Category,
    pub abstract_: String,
    pub overview: String,
    pub content: String,
    pub vector: Vec<f32>,
    pub source_session: String,
}

impl CreateRecordInput {
    /// Build a create input from a candidate plus its embedding
    pub fn from_candidate(
        candidate: &CandidateMemory,
        vector: Vec<f32>,
        source_session: &str,
    ) -> Self {
        Self {
            category: candidate.category,
            abstract_: candidate.abstract_.clone(),
            overview: candidate.overview.clone(),
            content: candidate.content.clone(),
            vector,
            source_session: source_session.to_string(),
        }
    }
}

/// Partial update for a record
///
/// Only mutable fields are expressible here. `id`, `created_at`, and
/// `source_session` are write-once and have no corresponding field, which
/// enforces their immutability at the store boundary by construction.
#[derive(Debug, Clone, Default)]
pub struct UpdateRecordInput {
    pub abstract_: Option<String>,
    pub overview: Option<String>,
    pub content: Option<String>,
    pub vector: Option<Vec<f32>>,
}

/// Dedup verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupDecision {
    Create,
    Merge,
    Skip,
}

/// How a dedup verdict was reached
///
/// Tests assert on this instead of relying on incidental logging: `Defaulted`
/// means arbitration failed or returned something unusable and the engine
/// fell back to the safe default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionPath {
    /// The vector pre-filter found nothing; arbitration was never invoked
    NoSimilar,
    /// The arbitration capability produced a usable verdict
    Arbitrated,
    /// Arbitration failed or was unparseable; defaulted to create
    Defaulted,
}

/// Output of the dedup decision engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupOutcome {
    pub decision: DedupDecision,
    pub path: DecisionPath,
    pub reason: String,
    /// Present iff decision is `Merge`
    pub match_id: Option<MemoryId>,
}

/// Per-batch extraction statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub created: u32,
    pub merged: u32,
    pub skipped: u32,
}

/// Decay scoring parameters, fixed per store instance at construction
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DecayConfig {
    /// Days for the time component to halve
    #[serde(default = "default_half_life")]
    pub half_life_days: f64,
    /// Weight of the usage boost term
    #[serde(default = "default_active_weight")]
    pub active_weight: f64,
}

fn default_half_life() -> f64 {
    30.0
}

fn default_active_weight() -> f64 {
    0.1
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            half_life_days: default_half_life(),
            active_weight: default_active_weight(),
        }
    }
}

/// Configuration for the memory store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database (`:memory:` for tests)
    pub db_path: String,
    /// Embedding dimension, fixed for the life of the store
    pub dimensions: usize,
    /// Decay-adjusted scoring; `None` disables decay entirely
    #[serde(default)]
    pub decay: Option<DecayConfig>,
}

impl StoreConfig {
    /// In-memory store configuration (useful for testing)
    pub fn in_memory(dimensions: usize) -> Self {
        Self {
            db_path: ":memory:".to_string(),
            dimensions,
            decay: None,
        }
    }
}

/// A search hit: record plus its (possibly decay-adjusted) score
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub record: MemoryRecord,
    pub score: f64,
}
