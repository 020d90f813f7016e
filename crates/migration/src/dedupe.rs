use std::collections::HashSet;
use std::hash::Hash;

#[derive(Debug, Clone, PartialEq)]
pub struct Deduped<T> {
    pub unique: Vec<T>,
    pub dropped: usize,
}

/// Keeps the first record seen for each key, preserving input order.
pub fn dedupe_by_key<T, K, F>(records: impl IntoIterator<Item = T>, mut key_fn: F) -> Deduped<T>
where
    K: Eq + Hash,
    F: FnMut(&T) -> K,
{
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    let mut dropped = 0;

    for record in records {
        if seen.insert(key_fn(&record)) {
            unique.push(record);
        } else {
            dropped += 1;
        }
    }

    Deduped { unique, dropped }
}
