//! Recall scoring over the memory store
//!
//! A read-side consumer: embeds the query, ranks hits through the store's
//! search (decay-adjusted when the store has decay enabled), and bumps the
//! usage counter of every record it returns. Recall is the only writer of
//! `active_count`.

use std::sync::Arc;
use tracing::warn;

use crate::embedding::Embedder;
use crate::error::Result;
use crate::store::MemoryStore;
use crate::types::ScoredRecord;

/// Default recall result cap
pub const DEFAULT_RECALL_LIMIT: usize = 10;
/// Default score floor for recall results
pub const DEFAULT_RECALL_MIN_SCORE: f64 = 0.3;

/// Query-time recall scorer
pub struct Recaller {
    store: Arc<MemoryStore>,
    embedder: Arc<dyn Embedder>,
    limit: usize,
    min_score: f64,
}

impl Recaller {
    pub fn new(store: Arc<MemoryStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            store,
            embedder,
            limit: DEFAULT_RECALL_LIMIT,
            min_score: DEFAULT_RECALL_MIN_SCORE,
        }
    }

    /// Override the result cap and score floor
    pub fn with_options(mut self, limit: usize, min_score: f64) -> Self {
        self.limit = limit;
        self.min_score = min_score;
        self
    }

    /// Recall the memories most relevant to a free-text query
    ///
    /// Every returned record gets its usage counter bumped; a failed bump is
    /// logged but never fails the recall itself.
    pub fn recall(&self, query: &str) -> Result<Vec<ScoredRecord>> {
        let vector = self.embedder.embed(query)?;
        let hits = self.store.search(&vector, self.limit, self.min_score, None)?;

        for hit in &hits {
            if let Err(e) = self.store.increment_active_count(&hit.record.id) {
                warn!(id = %hit.record.id, error = %e, "failed to bump usage counter");
            }
        }

        Ok(hits)
    }
}
