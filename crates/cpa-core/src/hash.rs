//! Canonical hashing helpers for configs, plans and field data.

use num_complex::Complex64;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::errors::CpaError;
use crate::serde::to_canonical_json_bytes;

/// Computes a stable SHA-256 hash for the provided serializable value.
pub fn stable_hash_string<T: Serialize>(value: &T) -> Result<String, CpaError> {
    let bytes = to_canonical_json_bytes(value)?;
    let digest = Sha256::digest(&bytes);
    Ok(format!("{digest:x}"))
}

/// Computes a canonical hash for a complex field buffer.
///
/// Length-prefixed little-endian bit patterns so the hash is stable across
/// platforms and distinguishes e.g. `[1.0]` from `[1.0, 0.0]`.
pub fn field_hash(field: &[Complex64]) -> String {
    let mut hasher = Sha256::new();
    hasher.update((field.len() as u64).to_le_bytes());
    for sample in field {
        hasher.update(sample.re.to_bits().to_le_bytes());
        hasher.update(sample.im.to_bits().to_le_bytes());
    }
    let digest = hasher.finalize();
    format!("{digest:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_hash_distinguishes_length() {
        let one = vec![Complex64::new(1.0, 0.0)];
        let two = vec![Complex64::new(1.0, 0.0), Complex64::new(0.0, 0.0)];
        assert_ne!(field_hash(&one), field_hash(&two));
    }

    #[test]
    fn stable_hash_ignores_map_insertion_order() {
        use std::collections::BTreeMap;
        let mut a = BTreeMap::new();
        a.insert("x", 1.0);
        a.insert("y", 2.0);
        let mut b = BTreeMap::new();
        b.insert("y", 2.0);
        b.insert("x", 1.0);
        assert_eq!(
            stable_hash_string(&a).unwrap(),
            stable_hash_string(&b).unwrap()
        );
    }
}
