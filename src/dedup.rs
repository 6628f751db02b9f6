//! Deduplication decision engine
//!
//! Two-stage pipeline: a cheap vector pre-filter against the candidate's own
//! category, then LLM arbitration over the surviving hits. Any failure or
//! ambiguity on the arbitration side defaults to `Create`: a false negative
//! costs some storage, a false positive silently destroys information.

use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::completion::{complete_json, Completion};
use crate::error::Result;
use crate::store::MemoryStore;
use crate::types::{
    CandidateMemory, DecisionPath, DedupDecision, DedupOutcome, ScoredRecord,
};

/// Minimum similarity for a stored record to count as a near-duplicate
pub const SIMILARITY_THRESHOLD: f64 = 0.7;
/// Pre-filter result cap
pub const PREFILTER_LIMIT: usize = 5;
/// How many hits are shown to the arbitration capability
pub const ARBITRATION_TOP: usize = 3;

/// Structured arbitration reply
#[derive(Debug, Deserialize)]
struct ArbitrationReply {
    decision: String,
    /// 1-based index into the presented hit list
    #[serde(default)]
    match_index: Option<usize>,
    #[serde(default)]
    reason: Option<String>,
}

/// The dedup decision engine
///
/// Holds shared references to the store and the arbitration capability; the
/// store reference must be the same instance the orchestrator writes to.
pub struct DedupEngine {
    store: Arc<MemoryStore>,
    completion: Arc<dyn Completion>,
}

impl DedupEngine {
    pub fn new(store: Arc<MemoryStore>, completion: Arc<dyn Completion>) -> Self {
        Self { store, completion }
    }

    /// Decide whether a candidate creates, merges, or gets skipped
    ///
    /// Never fails on arbitration problems; only store errors propagate.
    pub fn deduplicate(
        &self,
        candidate: &CandidateMemory,
        candidate_vector: &[f32],
    ) -> Result<DedupOutcome> {
        let hits = self.store.search(
            candidate_vector,
            PREFILTER_LIMIT,
            SIMILARITY_THRESHOLD,
            Some(candidate.category),
        )?;

        if hits.is_empty() {
            return Ok(DedupOutcome {
                decision: DedupDecision::Create,
                path: DecisionPath::NoSimilar,
                reason: "no similar memories found".to_string(),
                match_id: None,
            });
        }

        let top: Vec<&ScoredRecord> = hits.iter().take(ARBITRATION_TOP).collect();
        let prompt = build_arbitration_prompt(candidate, &top);

        let reply = match complete_json::<ArbitrationReply>(self.completion.as_ref(), &prompt) {
            Ok(Some(reply)) => reply,
            Ok(None) => {
                warn!(category = %candidate.category, "arbitration reply unparseable, defaulting to create");
                return Ok(defaulted("arbitration reply was not parseable JSON"));
            }
            Err(e) => {
                warn!(category = %candidate.category, error = %e, "arbitration call failed, defaulting to create");
                return Ok(defaulted(&format!("arbitration call failed: {e}")));
            }
        };

        let reason = reply
            .reason
            .unwrap_or_else(|| "arbitration verdict".to_string());

        let decision = match reply.decision.to_lowercase().as_str() {
            "create" => DedupDecision::Create,
            "merge" => DedupDecision::Merge,
            "skip" => DedupDecision::Skip,
            other => {
                debug!(verdict = other, "unknown arbitration decision, defaulting to create");
                return Ok(defaulted(&format!("unknown arbitration decision: {other}")));
            }
        };

        let match_id = if decision == DedupDecision::Merge {
            // 1-based index into the presented list; anything out of range
            // falls back to the best-scoring hit
            let resolved = reply
                .match_index
                .and_then(|idx| idx.checked_sub(1))
                .and_then(|idx| top.get(idx))
                .unwrap_or(&top[0]);
            Some(resolved.record.id.clone())
        } else {
            None
        };

        Ok(DedupOutcome {
            decision,
            path: DecisionPath::Arbitrated,
            reason,
            match_id,
        })
    }
}

fn defaulted(reason: &str) -> DedupOutcome {
    DedupOutcome {
        decision: DedupDecision::Create,
        path: DecisionPath::Defaulted,
        reason: reason.to_string(),
        match_id: None,
    }
}

fn build_arbitration_prompt(candidate: &CandidateMemory, hits: &[&ScoredRecord]) -> String {
    let mut listing = String::new();
    for (i, hit) in hits.iter().enumerate() {
        listing.push_str(&format!(
            "{}. [{}] {} - {} (similarity {:.2})\n",
            i + 1,
            hit.record.category,
            hit.record.abstract_,
            hit.record.overview,
            hit.score,
        ));
    }

    format!(
        "A new candidate memory may duplicate existing memories.\n\
         \n\
         Candidate ({category}):\n\
         abstract: {abstract_}\n\
         overview: {overview}\n\
         content: {content}\n\
         \n\
         Existing similar memories:\n\
         {listing}\
         \n\
         Decide how to handle the candidate. Respond with a single JSON object:\n\
         {{\"decision\": \"create\" | \"merge\" | \"skip\", \"match_index\": <1-based index if merge>, \"reason\": \"...\"}}\n\
         Use \"merge\" when the candidate adds detail to an existing memory, \
         \"skip\" when it adds nothing new, and \"create\" otherwise.",
        category = candidate.category,
        abstract_ = candidate.abstract_,
        overview = candidate.overview,
        content = candidate.content,
    )
}
