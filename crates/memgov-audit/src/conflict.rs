//! Semantic conflict detection between memory items.
//!
//! Two items conflict when they fill the same slot (topic + key) with
//! different values, for scopes that intersect, during validity windows that
//! overlap. The pairwise scan is quadratic in the number of items it looks
//! at; callers depend only on [`ConflictScanner`], so an index keyed by
//! topic + key can replace [`PairwiseScanner`] without touching them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use memgov_types::{Env, MemoryItem, Scope, Status};

/// Which statuses take part in a conflict scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConflictMode {
    /// Only `active` items (the audit gate).
    ActiveOnly,
    /// `active` and `pending` items (merge eligibility and listings).
    ActiveAndPending,
}

impl ConflictMode {
    /// Returns `true` if items with `status` are considered by this mode.
    pub fn admits(&self, status: Status) -> bool {
        match self {
            Self::ActiveOnly => status == Status::Active,
            Self::ActiveAndPending => matches!(status, Status::Active | Status::Pending),
        }
    }
}

/// An unordered pair of conflicting items, canonicalized so `left < right`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConflictPair {
    pub pair_id: String,
    pub left: String,
    pub right: String,
    pub topic: String,
    pub key: String,
}

impl ConflictPair {
    /// Build the canonical pair for two conflicting items.
    pub fn new(a: &MemoryItem, b: &MemoryItem) -> Self {
        let (left, right) = ordered(&a.id, &b.id);
        Self {
            pair_id: pair_id(&a.id, &b.id),
            left: left.to_string(),
            right: right.to_string(),
            topic: a.topic.clone(),
            key: a.key.clone(),
        }
    }
}

/// Finds conflicting pairs in a set of items.
pub trait ConflictScanner: Send + Sync {
    /// Return every conflicting pair among the items admitted by `mode`,
    /// sorted by pair id.
    fn scan(&self, items: &[MemoryItem], mode: ConflictMode) -> Vec<ConflictPair>;
}

/// Compares every admitted item against every other one in the same slot.
#[derive(Clone, Copy, Debug, Default)]
pub struct PairwiseScanner;

impl ConflictScanner for PairwiseScanner {
    fn scan(&self, items: &[MemoryItem], mode: ConflictMode) -> Vec<ConflictPair> {
        let scoped: Vec<&MemoryItem> = items.iter().filter(|i| mode.admits(i.status)).collect();

        let mut pairs = BTreeMap::new();
        for (i, a) in scoped.iter().enumerate() {
            for b in &scoped[i + 1..] {
                if a.id != b.id && conflicts(a, b) {
                    let pair = ConflictPair::new(a, b);
                    pairs.entry(pair.pair_id.clone()).or_insert(pair);
                }
            }
        }
        pairs.into_values().collect()
    }
}

/// Returns `true` if `a` and `b` are a semantic conflict.
///
/// Status is not considered here; scanners filter by [`ConflictMode`].
pub fn conflicts(a: &MemoryItem, b: &MemoryItem) -> bool {
    a.topic == b.topic
        && a.key == b.key
        && a.value != b.value
        && scopes_intersect(&a.scope, &b.scope)
        && windows_overlap(a, b)
}

/// Scopes intersect when env, service, and region are each compatible.
/// `Env::All` and unset service/region are wildcards.
pub fn scopes_intersect(a: &Scope, b: &Scope) -> bool {
    let env = a.env == b.env || a.env == Env::All || b.env == Env::All;
    env && wildcard_eq(&a.service, &b.service) && wildcard_eq(&a.region, &b.region)
}

/// Closed-interval overlap of `[effective_from, expires]`.
pub fn windows_overlap(a: &MemoryItem, b: &MemoryItem) -> bool {
    a.effective_from <= b.expires && b.effective_from <= a.expires
}

/// Canonical pair id: the two ids sorted and joined with `::`.
pub fn pair_id(a: &str, b: &str) -> String {
    let (lo, hi) = ordered(a, b);
    format!("{lo}::{hi}")
}

fn ordered<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn wildcard_eq(a: &Option<String>, b: &Option<String>) -> bool {
    match (a, b) {
        (Some(x), Some(y)) => x == y,
        _ => true,
    }
}
