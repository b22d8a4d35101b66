//! Shared guardrails for input length, prompt size, and cache lifetimes.

use tracing::debug;

// Input guards
pub const MAX_QUERY_LENGTH: usize = 512;

// Confidence bounds for display
pub const MIN_CONFIDENCE: f64 = 0.0;
pub const MAX_CONFIDENCE: f64 = 1.0;

// Cache lifetime policy (seconds)
pub const MIN_CACHE_TTL_SECS: i64 = 30 * 60;
pub const MAX_CACHE_TTL_SECS: i64 = 24 * 60 * 60;
pub const DEFAULT_CACHE_TTL_SECS: i64 = MIN_CACHE_TTL_SECS;

// Prompt guards for the AI collaborator
pub const MAX_PROMPT_FIELDS_PER_TYPE: usize = 10;
pub const MAX_PROMPT_ALLOWED_VALUES: usize = 5;
pub const MAX_PROMPT_TEAM_MEMBERS: usize = 10;
pub const MAX_PROMPT_ITERATIONS: usize = 5;

// Backend guards
pub const MAX_AREA_DEPTH: i64 = 10;

pub fn clamp_int(value: i64, minimum: i64, maximum: i64) -> i64 {
    value.max(minimum).min(maximum)
}

pub fn clamp_cache_ttl(value: i64) -> i64 {
    clamp_int(value, MIN_CACHE_TTL_SECS, MAX_CACHE_TTL_SECS)
}

/// Confidence is accumulated without an upper bound; clamp it before it
/// leaves the crate.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        return MIN_CONFIDENCE;
    }
    value.max(MIN_CONFIDENCE).min(MAX_CONFIDENCE)
}

/// Trim and cap raw input at [`MAX_QUERY_LENGTH`] bytes on a char boundary.
pub fn truncate_query(query: &str) -> String {
    let stripped = query.trim();
    if stripped.len() <= MAX_QUERY_LENGTH {
        return stripped.to_string();
    }
    let mut end = MAX_QUERY_LENGTH;
    while !stripped.is_char_boundary(end) {
        end -= 1;
    }
    debug!(
        original_len = stripped.len(),
        kept_len = end,
        "truncated query input"
    );
    stripped[..end].trim_end().to_string()
}
