//! Decay-adjusted scoring for recall ranking
//!
//! Raw vector similarity is adjusted by an exponential time decay and a
//! logarithmic usage boost:
//!
//! ```text
//! decay_score = vector_score * 2^(-age_days / half_life_days)
//!                            * (1 + active_weight * ln(1 + active_count))
//! ```
//!
//! With decay disabled the adjusted score equals the raw score exactly.

use chrono::{DateTime, Utc};

use crate::types::DecayConfig;

/// Milliseconds in a day
const DAY_MS: f64 = 86_400_000.0;

/// Age of a record in fractional days at `now`
pub fn age_days(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let elapsed_ms = (now - created_at).num_milliseconds() as f64;
    (elapsed_ms / DAY_MS).max(0.0)
}

/// Adjust a raw vector score by age and usage
pub fn decay_score(
    vector_score: f64,
    created_at: DateTime<Utc>,
    active_count: i64,
    now: DateTime<Utc>,
    config: &DecayConfig,
) -> f64 {
    let age = age_days(created_at, now);
    let time_decay = 2.0_f64.powf(-age / config.half_life_days);
    let active_boost = 1.0 + config.active_weight * (1.0 + active_count.max(0) as f64).ln();
    vector_score * time_decay * active_boost
}

/// Apply decay when configured, otherwise return the raw score unchanged
pub fn effective_score(
    vector_score: f64,
    created_at: DateTime<Utc>,
    active_count: i64,
    now: DateTime<Utc>,
    config: Option<&DecayConfig>,
) -> f64 {
    match config {
        Some(cfg) => decay_score(vector_score, created_at, active_count, now, cfg),
        None => vector_score,
    }
}
