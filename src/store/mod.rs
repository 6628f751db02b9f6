//! Embedded vector store
//!
//! Category-aware CRUD over fixed-dimension vectors with nearest-neighbor
//! search and optional decay-adjusted ranking. The store exclusively owns
//! record persistence: every other component holds at most a transient,
//! read-only copy of a row.

mod connection;
mod migrations;
mod queries;

pub use migrations::SCHEMA_VERSION;
pub use queries::{blob_to_vector, vector_to_blob, CATEGORY_SCAN_CAP};

use chrono::Utc;
use tracing::debug;

use crate::decay;
use crate::embedding::{distance_to_score, l2_distance};
use crate::error::{MnemonError, Result};
use crate::types::{
    validate_id, Category, CreateRecordInput, DecayConfig, MemoryRecord, ScoredRecord,
    StoreConfig, UpdateRecordInput,
};
use connection::StoreConnection;

/// Over-fetch multiplier for decay re-ranking
const DECAY_OVERFETCH_FACTOR: usize = 3;
/// Over-fetch floor for decay re-ranking
const DECAY_OVERFETCH_MIN: usize = 20;

/// The embedded memory store
///
/// Construct once and share by reference (`Arc`) across the dedup engine,
/// the extractor, and recall. Each instance owns its own connection mutex,
/// so all mutating operations against one instance are strictly serialized.
#[derive(Debug)]
pub struct MemoryStore {
    conn: StoreConnection,
    config: StoreConfig,
}

impl MemoryStore {
    /// Open or create a store with the given configuration
    ///
    /// Fails with `DimensionMismatch` when the database was created with a
    /// different embedding dimension; that is a configuration error, not
    /// something to recover from at runtime.
    pub fn open(config: StoreConfig) -> Result<Self> {
        if config.dimensions == 0 {
            return Err(MnemonError::Config(
                "embedding dimension must be non-zero".to_string(),
            ));
        }
        let conn = StoreConnection::open(&config)?;
        conn.with_transaction(|c| queries::ensure_dimensions(c, config.dimensions))?;
        debug!(
            db_path = %config.db_path,
            dimensions = config.dimensions,
            decay = config.decay.is_some(),
            "memory store opened"
        );
        Ok(Self { conn, config })
    }

    /// In-memory store (useful for testing)
    pub fn in_memory(dimensions: usize) -> Result<Self> {
        Self::open(StoreConfig::in_memory(dimensions))
    }

    /// Embedding dimension this store enforces
    pub fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    /// Decay configuration, if ranking adjustment is enabled
    pub fn decay_config(&self) -> Option<&DecayConfig> {
        self.config.decay.as_ref()
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.config.dimensions {
            return Err(MnemonError::DimensionMismatch {
                expected: self.config.dimensions,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// Persist a new record, assigning a fresh id, timestamps, and a zeroed
    /// usage counter
    pub fn store(&self, input: CreateRecordInput) -> Result<MemoryRecord> {
        self.check_dimensions(&input.vector)?;
        self.conn
            .with_transaction(|c| queries::insert_record(c, &input))
    }

    /// Nearest-neighbor search, optionally restricted to one category
    ///
    /// Raw L2 distance becomes `1 / (1 + distance)`. With decay enabled the
    /// raw top candidates are over-fetched (3x the limit, minimum 20) and
    /// re-ranked by decay-adjusted score, since decay can reorder beyond the
    /// raw top-K. Results are filtered by `min_score` and sorted descending.
    pub fn search(
        &self,
        query: &[f32],
        limit: usize,
        min_score: f64,
        category: Option<Category>,
    ) -> Result<Vec<ScoredRecord>> {
        self.check_dimensions(query)?;

        let records = self
            .conn
            .with_connection(|c| queries::list_for_search(c, category))?;

        let mut scored: Vec<ScoredRecord> = records
            .into_iter()
            .map(|record| {
                let score = distance_to_score(l2_distance(query, &record.vector));
                ScoredRecord { record, score }
            })
            .collect();
        sort_by_score(&mut scored);

        if let Some(decay_cfg) = self.config.decay {
            let overfetch = (limit * DECAY_OVERFETCH_FACTOR).max(DECAY_OVERFETCH_MIN);
            scored.truncate(overfetch);

            let now = Utc::now();
            for hit in &mut scored {
                hit.score = decay::decay_score(
                    hit.score,
                    hit.record.created_at,
                    hit.record.active_count,
                    now,
                    &decay_cfg,
                );
            }
            sort_by_score(&mut scored);
        }

        scored.retain(|hit| hit.score >= min_score);
        scored.truncate(limit);
        Ok(scored)
    }

    /// Bounded full scan of one category, oldest record first
    pub fn find_by_category(&self, category: Category) -> Result<Vec<MemoryRecord>> {
        self.conn
            .with_connection(|c| queries::list_by_category(c, category))
    }

    /// Fetch one record by id
    pub fn get_by_id(&self, id: &str) -> Result<Option<MemoryRecord>> {
        validate_id(id)?;
        self.conn.with_connection(|c| queries::get_record(c, id))
    }

    /// Merge partial fields into an existing record, bumping `updated_at`
    ///
    /// No-ops when the id does not exist. Write-once fields are not
    /// expressible in `UpdateRecordInput`.
    pub fn update(&self, id: &str, input: UpdateRecordInput) -> Result<()> {
        validate_id(id)?;
        if let Some(ref vector) = input.vector {
            self.check_dimensions(vector)?;
        }
        self.conn
            .with_transaction(|c| queries::update_record(c, id, &input))
    }

    /// Bump the usage counter by one
    ///
    /// Runs as a single SQL update inside the write lock, so N concurrent
    /// increments against the same id always land as exactly N.
    pub fn increment_active_count(&self, id: &str) -> Result<()> {
        validate_id(id)?;
        self.conn
            .with_transaction(|c| queries::increment_active_count(c, id))
    }

    /// Bulk read for projection and reporting, newest first, capped
    pub fn get_all(&self, max_limit: usize) -> Result<Vec<MemoryRecord>> {
        self.conn
            .with_connection(|c| queries::list_all(c, max_limit as i64))
    }
}

fn sort_by_score(hits: &mut [ScoredRecord]) {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}
