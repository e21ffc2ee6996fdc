use std::cmp::Ordering as CmpOrdering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Result of comparing two [`Clock`]s. `Concurrent` is the conflict trigger:
/// neither clock causally dominates the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Less,
    Equal,
    Greater,
    Concurrent,
}

/// A vector clock: one counter per location id. Missing keys read as zero.
///
/// A peer only ever increments its own component (`tick`); every other
/// mutation (`join`) is a pure component-wise max and never decreases an
/// existing value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clock {
    #[serde(default)]
    values: BTreeMap<String, u64>,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, location: &str) -> u64 {
        self.values.get(location).copied().unwrap_or(0)
    }

    pub fn set(&mut self, location: &str, value: u64) {
        self.values.insert(location.to_string(), value);
    }

    pub fn locations(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Component-wise comparison. `Concurrent` when neither side dominates.
    pub fn compare(&self, other: &Clock) -> Comparison {
        let mut self_smaller = false;
        let mut other_smaller = false;
        let mut keys: Vec<&str> = self.values.keys().map(String::as_str).collect();
        for k in other.values.keys() {
            if !self.values.contains_key(k) {
                keys.push(k.as_str());
            }
        }
        for k in keys {
            match self.get(k).cmp(&other.get(k)) {
                CmpOrdering::Less => self_smaller = true,
                CmpOrdering::Greater => other_smaller = true,
                CmpOrdering::Equal => {}
            }
        }
        match (self_smaller, other_smaller) {
            (false, false) => Comparison::Equal,
            (true, false) => Comparison::Less,
            (false, true) => Comparison::Greater,
            (true, true) => Comparison::Concurrent,
        }
    }

    pub fn comparable(&self, other: &Clock) -> bool {
        self.compare(other) != Comparison::Concurrent
    }

    /// Component-wise maximum of `self` and `other`.
    pub fn join(&self, other: &Clock) -> Clock {
        let mut out = self.clone();
        for (k, v) in &other.values {
            let entry = out.values.entry(k.clone()).or_insert(0);
            if *v > *entry {
                *entry = *v;
            }
        }
        out
    }

    /// `self` with `location`'s component incremented by one.
    pub fn tick(&self, location: &str) -> Clock {
        let mut out = self.clone();
        let entry = out.values.entry(location.to_string()).or_insert(0);
        *entry += 1;
        out
    }
}
