//! Per-key integer accumulators
//!
//! Most deferred calculators count events against an entity key (a method
//! signature, a module name, a file type label) and only turn the counts
//! into metric values once the whole traversal has finished. The bucket map
//! distinguishes "present with value 0" from "absent": an entity with no
//! contributing events must still appear with value 0, so buckets are
//! created explicitly when the entity is first seen.

use std::collections::HashMap;
use std::hash::Hash;

/// A per-key integer counter with explicit zero-creation.
///
/// Not thread-safe; a `BucketedCount` is owned by exactly one calculator
/// instance for exactly one run. No iteration order is guaranteed.
#[derive(Debug, Clone)]
pub struct BucketedCount<K> {
    buckets: HashMap<K, i64>,
}

impl<K> Default for BucketedCount<K> {
    fn default() -> Self {
        Self {
            buckets: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash> BucketedCount<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure a bucket exists for `key`, with value 0 when newly created.
    ///
    /// An existing bucket's value is left unchanged.
    pub fn create_bucket(&mut self, key: K) {
        self.buckets.entry(key).or_insert(0);
    }

    /// Add 1 to the bucket for `key`, creating it at 0 first if absent.
    pub fn increment_bucket(&mut self, key: K) {
        self.increment_bucket_by(key, 1);
    }

    /// Add `delta` to the bucket for `key`, creating it at 0 first if absent.
    pub fn increment_bucket_by(&mut self, key: K, delta: i64) {
        *self.buckets.entry(key).or_insert(0) += delta;
    }

    /// The bucket's value, or 0 when no bucket exists for `key`.
    pub fn bucket_value(&self, key: &K) -> i64 {
        self.buckets.get(key).copied().unwrap_or(0)
    }

    /// Whether a bucket has been created for `key`.
    pub fn has_bucket(&self, key: &K) -> bool {
        self.buckets.contains_key(key)
    }

    /// Iterate over all (key, value) pairs.
    pub fn buckets(&self) -> impl Iterator<Item = (&K, i64)> {
        self.buckets.iter().map(|(k, v)| (k, *v))
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_created_bucket_reads_zero() {
        let mut counts: BucketedCount<String> = BucketedCount::new();
        counts.create_bucket("a".to_string());
        assert_eq!(counts.bucket_value(&"a".to_string()), 0);
        assert!(counts.has_bucket(&"a".to_string()));
    }

    #[test]
    fn test_absent_key_is_not_a_bucket() {
        let counts: BucketedCount<String> = BucketedCount::new();
        assert_eq!(counts.bucket_value(&"missing".to_string()), 0);
        assert!(!counts.has_bucket(&"missing".to_string()));
        assert!(counts.is_empty());
    }

    #[test]
    fn test_create_does_not_reset() {
        let mut counts: BucketedCount<&str> = BucketedCount::new();
        counts.increment_bucket_by("a", 5);
        counts.create_bucket("a");
        assert_eq!(counts.bucket_value(&"a"), 5);
    }

    #[test]
    fn test_increment_creates_then_adds() {
        let mut counts: BucketedCount<&str> = BucketedCount::new();
        counts.increment_bucket("a");
        counts.increment_bucket("a");
        counts.increment_bucket_by("b", 3);
        assert_eq!(counts.bucket_value(&"a"), 2);
        assert_eq!(counts.bucket_value(&"b"), 3);
        assert_eq!(counts.len(), 2);
    }

    #[test]
    fn test_bucket_iteration() {
        let mut counts: BucketedCount<&str> = BucketedCount::new();
        counts.create_bucket("zero");
        counts.increment_bucket("one");
        let mut seen: Vec<(&str, i64)> = counts.buckets().map(|(k, v)| (*k, v)).collect();
        seen.sort();
        assert_eq!(seen, vec![("one", 1), ("zero", 0)]);
    }
}
