//! Extraction orchestrator
//!
//! Drives candidate generation from raw conversation text, applies the
//! per-category merge policy, consults the dedup engine for non-exempt
//! candidates, and persists outcomes. Batches are checkpointed so an
//! interrupted run resumes from the last fully processed candidate.

mod checkpoint;

pub use checkpoint::{CheckpointStore, ExtractionCheckpoint};

use serde::Deserialize;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::completion::{complete_json, Completion};
use crate::dedup::DedupEngine;
use crate::embedding::Embedder;
use crate::error::{MnemonError, Result};
use crate::store::MemoryStore;
use crate::types::{
    CandidateMemory, Category, CreateRecordInput, DedupDecision, ExtractionStats, MemoryRecord,
    MergePolicy, UpdateRecordInput,
};

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Directory for in-progress batch checkpoints
    pub checkpoint_dir: PathBuf,
}

/// What happened to one candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CandidateOutcome {
    Created,
    Merged,
    Skipped,
}

/// Raw extraction reply; categories arrive as free strings and are validated
/// per candidate so one bad tag cannot sink the batch
#[derive(Debug, Deserialize)]
struct ExtractionReply {
    memories: Vec<RawCandidate>,
}

#[derive(Debug, Deserialize)]
struct RawCandidate {
    category: String,
    #[serde(rename = "abstract")]
    abstract_: String,
    #[serde(default)]
    overview: String,
    content: String,
}

/// Merged tier output from the merge-arbitration capability
#[derive(Debug, Deserialize)]
struct MergedTiers {
    #[serde(rename = "abstract")]
    abstract_: String,
    #[serde(default)]
    overview: String,
    content: String,
}

/// The extraction orchestrator
pub struct MemoryExtractor {
    store: Arc<MemoryStore>,
    embedder: Arc<dyn Embedder>,
    completion: Arc<dyn Completion>,
    dedup: DedupEngine,
    checkpoints: CheckpointStore,
}

impl MemoryExtractor {
    pub fn new(
        store: Arc<MemoryStore>,
        embedder: Arc<dyn Embedder>,
        completion: Arc<dyn Completion>,
        config: ExtractorConfig,
    ) -> Self {
        let dedup = DedupEngine::new(store.clone(), completion.clone());
        Self {
            store,
            embedder,
            completion,
            dedup,
            checkpoints: CheckpointStore::new(config.checkpoint_dir),
        }
    }

    /// Extract candidates from conversation text and persist each according
    /// to its category policy
    ///
    /// One failing candidate never aborts the batch; it is logged and counted
    /// as skipped. Returns per-batch statistics.
    pub fn extract_and_persist(
        &self,
        conversation: &str,
        session_key: &str,
        user_tag: &str,
    ) -> Result<ExtractionStats> {
        CheckpointStore::validate_session_key(session_key)?;

        let candidates = self.extract_candidates(conversation, user_tag)?;
        if candidates.is_empty() {
            debug!(session = session_key, "no candidates extracted");
            return Ok(ExtractionStats::default());
        }

        let checkpoint = ExtractionCheckpoint::new(session_key, user_tag, candidates);
        self.checkpoints.save(&checkpoint)?;
        self.run_batch(checkpoint)
    }

    /// Resume every interrupted batch found in the checkpoint directory
    ///
    /// Returns the session key and resumed-portion statistics per batch.
    pub fn resume_pending(&self) -> Result<Vec<(String, ExtractionStats)>> {
        let pending = self.checkpoints.scan_pending()?;
        let mut results = Vec::with_capacity(pending.len());

        for checkpoint in pending {
            let session_key = checkpoint.session_key.clone();
            info!(
                session = %session_key,
                cursor = checkpoint.cursor,
                total = checkpoint.candidates.len(),
                "resuming interrupted extraction batch"
            );
            let stats = self.run_batch(checkpoint)?;
            results.push((session_key, stats));
        }

        Ok(results)
    }

    /// Process candidates from `cursor + 1` onward, advancing the checkpoint
    /// after each one and deleting it on completion
    fn run_batch(&self, mut checkpoint: ExtractionCheckpoint) -> Result<ExtractionStats> {
        let mut stats = ExtractionStats::default();
        let start = (checkpoint.cursor + 1) as usize;

        for index in start..checkpoint.candidates.len() {
            let candidate = checkpoint.candidates[index].clone();
            let outcome = match self.process_candidate(&candidate, &checkpoint.session_key) {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(
                        session = %checkpoint.session_key,
                        index,
                        category = %candidate.category,
                        error = %e,
                        "candidate failed, counting as skipped"
                    );
                    CandidateOutcome::Skipped
                }
            };

            match outcome {
                CandidateOutcome::Created => stats.created += 1,
                CandidateOutcome::Merged => stats.merged += 1,
                CandidateOutcome::Skipped => stats.skipped += 1,
            }

            checkpoint.cursor = index as i64;
            self.checkpoints.save(&checkpoint)?;
        }

        self.checkpoints.delete(&checkpoint.session_key)?;
        info!(
            session = %checkpoint.session_key,
            created = stats.created,
            merged = stats.merged,
            skipped = stats.skipped,
            "extraction batch complete"
        );
        Ok(stats)
    }

    /// Apply the category policy to a single candidate
    fn process_candidate(
        &self,
        candidate: &CandidateMemory,
        session_key: &str,
    ) -> Result<CandidateOutcome> {
        match candidate.category.merge_policy() {
            // The singleton category bypasses the dedup engine entirely
            MergePolicy::AlwaysMerge => {
                let existing = self.store.find_by_category(candidate.category)?;
                match existing.first() {
                    None => {
                        self.store_candidate(candidate, session_key)?;
                        Ok(CandidateOutcome::Created)
                    }
                    Some(target) => {
                        self.merge_into(target, candidate)?;
                        Ok(CandidateOutcome::Merged)
                    }
                }
            }
            MergePolicy::MergeSupported | MergePolicy::AppendOnly => {
                let vector = self.embedder.embed(&candidate.embedding_text())?;
                let outcome = self.dedup.deduplicate(candidate, &vector)?;

                match outcome.decision {
                    DedupDecision::Create => {
                        self.store_embedded(candidate, vector, session_key)?;
                        Ok(CandidateOutcome::Created)
                    }
                    DedupDecision::Merge => {
                        if candidate.category.merge_policy() == MergePolicy::AppendOnly {
                            // Append-only categories structurally forbid
                            // combining entries; the candidate is stored as
                            // an independent record instead of being dropped
                            self.store_embedded(candidate, vector, session_key)?;
                            return Ok(CandidateOutcome::Created);
                        }
                        match outcome.match_id {
                            Some(ref id) => {
                                let target = self.store.get_by_id(id)?.ok_or_else(|| {
                                    MnemonError::NotFound(id.clone())
                                })?;
                                self.merge_into(&target, candidate)?;
                                Ok(CandidateOutcome::Merged)
                            }
                            None => {
                                self.store_embedded(candidate, vector, session_key)?;
                                Ok(CandidateOutcome::Created)
                            }
                        }
                    }
                    DedupDecision::Skip => {
                        debug!(category = %candidate.category, reason = %outcome.reason, "candidate skipped");
                        Ok(CandidateOutcome::Skipped)
                    }
                }
            }
        }
    }

    fn store_candidate(&self, candidate: &CandidateMemory, session_key: &str) -> Result<()> {
        let vector = self.embedder.embed(&candidate.embedding_text())?;
        self.store_embedded(candidate, vector, session_key)
    }

    fn store_embedded(
        &self,
        candidate: &CandidateMemory,
        vector: Vec<f32>,
        session_key: &str,
    ) -> Result<()> {
        self.store
            .store(CreateRecordInput::from_candidate(candidate, vector, session_key))?;
        Ok(())
    }

    /// Fold a candidate's tiers into an existing record
    ///
    /// Merge arbitration produces unified tiers; malformed or missing output
    /// falls back to the candidate's own tiers so the merge never fails and
    /// the candidate's content is never lost. The merged text is re-embedded
    /// before the update.
    fn merge_into(&self, target: &MemoryRecord, candidate: &CandidateMemory) -> Result<()> {
        let prompt = build_merge_prompt(target, candidate);

        let tiers = match complete_json::<MergedTiers>(self.completion.as_ref(), &prompt) {
            Ok(Some(tiers)) => tiers,
            Ok(None) => {
                warn!(target = %target.id, "merge arbitration unparseable, keeping candidate tiers");
                candidate_tiers(candidate)
            }
            Err(e) => {
                warn!(target = %target.id, error = %e, "merge arbitration failed, keeping candidate tiers");
                candidate_tiers(candidate)
            }
        };

        let vector = self
            .embedder
            .embed(&format!("{} {}", tiers.abstract_, tiers.content))?;

        self.store.update(
            &target.id,
            UpdateRecordInput {
                abstract_: Some(tiers.abstract_),
                overview: Some(tiers.overview),
                content: Some(tiers.content),
                vector: Some(vector),
            },
        )
    }

    /// Ask the completion capability for structured candidates
    fn extract_candidates(
        &self,
        conversation: &str,
        user_tag: &str,
    ) -> Result<Vec<CandidateMemory>> {
        let prompt = build_extraction_prompt(conversation, user_tag);
        let reply = complete_json::<ExtractionReply>(self.completion.as_ref(), &prompt)?;

        let raw = match reply {
            Some(reply) => reply.memories,
            None => {
                warn!("extraction reply was not parseable JSON, nothing to persist");
                return Ok(Vec::new());
            }
        };

        let mut candidates = Vec::with_capacity(raw.len());
        for item in raw {
            match Category::from_str(&item.category) {
                Ok(category) => candidates.push(CandidateMemory {
                    category,
                    abstract_: item.abstract_,
                    overview: item.overview,
                    content: item.content,
                }),
                Err(_) => {
                    warn!(category = %item.category, "dropping candidate with unknown category");
                }
            }
        }
        Ok(candidates)
    }
}

fn candidate_tiers(candidate: &CandidateMemory) -> MergedTiers {
    MergedTiers {
        abstract_: candidate.abstract_.clone(),
        overview: candidate.overview.clone(),
        content: candidate.content.clone(),
    }
}

fn build_extraction_prompt(conversation: &str, user_tag: &str) -> String {
    format!(
        "Extract long-term memories about {user_tag} from the conversation below.\n\
         \n\
         Each memory has a category (one of: profile, preferences, knowledge, \
         skills, events, conversations), a one-line abstract, an optional \
         structured overview, and full narrative content.\n\
         \n\
         Respond with a single JSON object:\n\
         {{\"memories\": [{{\"category\": \"...\", \"abstract\": \"...\", \
         \"overview\": \"...\", \"content\": \"...\"}}]}}\n\
         Return {{\"memories\": []}} if nothing is worth remembering.\n\
         \n\
         Conversation:\n{conversation}"
    )
}

fn build_merge_prompt(target: &MemoryRecord, candidate: &CandidateMemory) -> String {
    format!(
        "Merge a new memory into an existing one of the same category \
         ({category}). Combine them without losing information from either.\n\
         \n\
         Existing:\n\
         abstract: {e_abstract}\n\
         overview: {e_overview}\n\
         content: {e_content}\n\
         \n\
         New:\n\
         abstract: {c_abstract}\n\
         overview: {c_overview}\n\
         content: {c_content}\n\
         \n\
         Respond with a single JSON object:\n\
         {{\"abstract\": \"...\", \"overview\": \"...\", \"content\": \"...\"}}",
        category = target.category,
        e_abstract = target.abstract_,
        e_overview = target.overview,
        e_content = target.content,
        c_abstract = candidate.abstract_,
        c_overview = candidate.overview,
        c_content = candidate.content,
    )
}
