//! Shared test doubles for the capability interfaces
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, Once};

/// Route library tracing to the test harness; set RUST_LOG to see it
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

use mnemon::error::{MnemonError, Result};
use mnemon::{Completion, Embedder};

/// Deterministic embedder driven by an explicit text-to-vector table
///
/// Unmapped texts embed to the zero vector; texts registered as failing
/// return a capability error.
pub struct FakeEmbedder {
    dimensions: usize,
    mappings: Mutex<HashMap<String, Vec<f32>>>,
    failing: Mutex<HashSet<String>>,
}

impl FakeEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            mappings: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
        }
    }

    pub fn map(&self, text: &str, vector: Vec<f32>) {
        assert_eq!(vector.len(), self.dimensions);
        self.mappings.lock().unwrap().insert(text.to_string(), vector);
    }

    pub fn fail_on(&self, text: &str) {
        self.failing.lock().unwrap().insert(text.to_string());
    }
}

impl Embedder for FakeEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.failing.lock().unwrap().contains(text) {
            return Err(MnemonError::Capability(format!(
                "embedding backend unavailable for: {text}"
            )));
        }
        Ok(self
            .mappings
            .lock()
            .unwrap()
            .get(text)
            .cloned()
            .unwrap_or_else(|| vec![0.0; self.dimensions]))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Completion double backed by a closure, recording every prompt it sees
pub struct FakeCompletion {
    respond: Box<dyn Fn(&str) -> Result<String> + Send + Sync>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl FakeCompletion {
    pub fn new(respond: impl Fn(&str) -> Result<String> + Send + Sync + 'static) -> Self {
        Self {
            respond: Box::new(respond),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Always return the same reply text
    pub fn fixed(reply: &str) -> Self {
        let reply = reply.to_string();
        Self::new(move |_| Ok(reply.clone()))
    }

    /// Always fail with a capability error
    pub fn failing() -> Self {
        Self::new(|_| Err(MnemonError::Capability("completion backend down".to_string())))
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl Completion for FakeCompletion {
    fn complete(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        (self.respond)(prompt)
    }
}

/// A query-relative vector: `base` offset along the first axis so its L2
/// distance from `base` is exactly `distance`
pub fn offset_vector(base: &[f32], distance: f32) -> Vec<f32> {
    let mut v = base.to_vec();
    v[0] += distance;
    v
}

/// Distance that yields the given `1 / (1 + d)` similarity score
pub fn distance_for_score(score: f64) -> f32 {
    ((1.0 - score) / score) as f32
}
