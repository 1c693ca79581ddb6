//! Deterministic hashing.
//!
//! The standard library's `HashMap` seeds its hasher randomly per process, which would make any
//! iteration over a map vary between runs. Everything in the engine that hashes uses the
//! `rustc-hash` Fx hasher instead so that a fixed random seed reproduces a run exactly.
//!
//! `HashMap::new` is not available for a non-default hasher; use `HashMap::default()`.
use std::hash::Hasher;

use rustc_hash::FxHasher;

pub use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};

/// Hashes a string to a stable `u64`. Used to derive per-stream RNG seeds from stream names.
#[must_use]
pub fn hash_str(data: &str) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write(data.as_bytes());
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_strings_stably() {
        assert_eq!(hash_str("TransmissionRng"), hash_str("TransmissionRng"));
        assert_ne!(hash_str("TransmissionRng"), hash_str("VaccinationRng"));
    }
}
