//! One-time codes mailed to a principal: device changes and registration.

use rand::Rng;

/// Lifetime of every emailed code.
pub const CHALLENGE_TTL_MINUTES: i64 = 10;

/// Six decimal digits, never with a leading zero.
pub(crate) fn generate_code() -> String {
    rand::rng().random_range(100_000..1_000_000u32).to_string()
}

/// Equal-length comparison without early exit.
pub(crate) fn codes_match(expected: &str, submitted: &str) -> bool {
    let (a, b) = (expected.as_bytes(), submitted.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
