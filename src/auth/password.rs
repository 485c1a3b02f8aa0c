//! Passwords arrive as client-side SHA-256 hex digests and are stored as is.

use subtle::ConstantTimeEq;

/// Constant-time comparison of two digests. Lengths are public, so a length
/// mismatch returns early.
pub fn digests_match(given: &str, stored: &str) -> bool {
    given.as_bytes().ct_eq(stored.as_bytes()).into()
}
