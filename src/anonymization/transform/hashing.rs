//! Salted SHA-256 pseudonyms

use sha2::{Digest, Sha256};

/// `SHA-256(value ++ field_name ++ salt)`, lower-case hex
///
/// Deterministic for a given salt; irreversible without it.
pub fn salted_hash(value: &str, field_name: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hasher.update(field_name.as_bytes());
    hasher.update(salt.as_bytes());
    format!("{:x}", hasher.finalize())
}
