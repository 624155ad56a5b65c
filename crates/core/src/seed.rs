//! Submission seeds and correlation keys.
//!
//! Each job embeds a random ten-digit seed in the text it submits. The
//! seed has no meaning to the renderer beyond making the resulting
//! artifact findable again; the job polls for it by its correlation key.

use rand::Rng;

/// Smallest seed value (inclusive).
pub const SEED_MIN: u64 = 1_000_000_000;

/// Largest seed value (inclusive).
pub const SEED_MAX: u64 = 9_999_999_999;

/// Generate a fresh ten-digit seed.
pub fn generate_seed() -> u64 {
    rand::rng().random_range(SEED_MIN..=SEED_MAX)
}

/// The substring a rendered artifact carries when it belongs to `seed`.
pub fn correlation_key(seed: u64) -> String {
    format!("--seed {seed}")
}

/// Build the text submitted for a prompt: the prompt text, the seed
/// parameter, then an optional trailing parameter suffix.
pub fn seeded_text(text: &str, seed: u64, suffix: Option<&str>) -> String {
    let base = format!("{} {}", text.trim(), correlation_key(seed));
    match suffix.map(str::trim).filter(|s| !s.is_empty()) {
        Some(suffix) => format!("{base} {suffix}"),
        None => base,
    }
}
