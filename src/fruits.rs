//! Lookup-by-rank over a named collection (exercise 1).
//!
//! The defect: iterating a `HashSet` and counting positions. Hash sets have no defined
//! iteration order (and `std`'s default hasher is randomly seeded per process), so the element
//! returned for a given id changes from run to run.
//!
//! The fix: impose a total order first. [`RankedSet`] sorts (lexicographically, via `Ord`) and
//! deduplicates once; ranks are positions in that order.

use std::collections::HashSet;

use crate::{Error, Result};

/// A collection with a deterministic rank for every element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedSet<T> {
    items: Vec<T>,
}

impl<T: Ord> RankedSet<T> {
    /// Sort and deduplicate `items`. Input order is irrelevant.
    pub fn new(items: impl IntoIterator<Item = T>) -> Self {
        let mut items: Vec<T> = items.into_iter().collect();
        items.sort();
        items.dedup();
        Self { items }
    }

    /// Element at rank `id`.
    pub fn get(&self, id: i64) -> Result<&T> {
        let len = self.items.len();
        usize::try_from(id)
            .ok()
            .and_then(|i| self.items.get(i))
            .ok_or(Error::OutOfRange { id, len })
    }

    /// Rank of `item`, if present.
    pub fn rank_of(&self, item: &T) -> Option<usize> {
        self.items.binary_search(item).ok()
    }
}

impl<T> RankedSet<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Elements in rank order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }
}

impl<T: Ord> FromIterator<T> for RankedSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// Fixed variant: rank `fruit_id` in the lexicographically sorted set.
pub fn id_to_fruit(fruit_id: i64, fruits: &HashSet<String>) -> Result<String> {
    let ranked: RankedSet<&String> = fruits.iter().collect();
    ranked.get(fruit_id).map(|s| (*s).clone())
}

/// Buggy variant: rank `fruit_id` in whatever order the hash set yields.
///
/// The range check is the same as the fixed variant; only the order is wrong.
pub fn id_to_fruit_unordered(fruit_id: i64, fruits: &HashSet<String>) -> Result<String> {
    usize::try_from(fruit_id)
        .ok()
        .and_then(|i| fruits.iter().nth(i))
        .cloned()
        .ok_or(Error::OutOfRange {
            id: fruit_id,
            len: fruits.len(),
        })
}

/// The set used by the exercise.
pub fn sample_fruits() -> HashSet<String> {
    ["apple", "orange", "melon", "kiwi", "strawberry"]
        .into_iter()
        .map(String::from)
        .collect()
}
