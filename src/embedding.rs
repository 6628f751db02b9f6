//! Embedding capability interface
//!
//! The embedding backend lives outside this crate (plugin host wires in an
//! OpenAI-compatible client or a local model). This module only defines the
//! contract plus the distance math the store ranks with.

use crate::error::Result;

/// Trait for embedding generators
///
/// Implementations must produce vectors of a fixed dimension for the life of
/// the store they feed. Backend failures surface as
/// `MnemonError::Capability`; callers must not assume retries.
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embedding dimension
    fn dimensions(&self) -> usize;
}

/// Euclidean distance between two vectors
///
/// Mismatched lengths never reach this point in practice (the store enforces
/// the dimension at every write); if they do, only the shared prefix counts.
pub fn l2_distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = (*x - *y) as f64;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

/// Convert a raw distance to a similarity score in (0, 1]
pub fn distance_to_score(distance: f64) -> f64 {
    1.0 / (1.0 + distance)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_distance() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!(l2_distance(&a, &b).abs() < 1e-9);

        let c = vec![0.0, 1.0, 0.0];
        assert!((l2_distance(&a, &c) - std::f64::consts::SQRT_2).abs() < 1e-6);
    }

    #[test]
    fn test_distance_to_score() {
        assert!((distance_to_score(0.0) - 1.0).abs() < 1e-9);
        assert!((distance_to_score(1.0) - 0.5).abs() < 1e-9);
        assert!(distance_to_score(100.0) < 0.01);
    }

    #[test]
    fn test_score_monotone_in_distance() {
        let mut last = 2.0;
        for d in [0.0, 0.1, 0.5, 1.0, 3.0, 10.0] {
            let s = distance_to_score(d);
            assert!(s < last);
            last = s;
        }
    }
}
