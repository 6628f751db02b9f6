//! Mnemon - memory deduplication and tiered-merge engine
//!
//! Decides whether each LLM-extracted candidate memory creates a new record,
//! merges into an existing one, or gets discarded, on top of an embedded
//! category-aware vector store with decay-adjusted recall.

pub mod completion;
pub mod decay;
pub mod dedup;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod recall;
pub mod store;
pub mod types;

pub use completion::Completion;
pub use dedup::DedupEngine;
pub use embedding::Embedder;
pub use error::{MnemonError, Result};
pub use extract::{ExtractorConfig, MemoryExtractor};
pub use recall::Recaller;
pub use store::MemoryStore;
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
