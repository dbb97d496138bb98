use std::collections::HashMap;

use crate::common::{Capacity, NodeId};

/// Matched pairs with the number of units flowing between them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matches<U: NodeId, V: NodeId>(HashMap<(U, V), Capacity>);

impl<U: NodeId, V: NodeId> Matches<U, V> {
    pub fn new() -> Matches<U, V> {
        Matches(HashMap::new())
    }
    pub fn get(&self, u: &U, v: &V) -> Option<Capacity> {
        // todo: avoid cloning the key, needs a borrowed (&U, &V) lookup
        self.0.get(&(u.clone(), v.clone())).copied()
    }
    pub fn contains(&self, u: &U, v: &V) -> bool {
        self.get(u, v).is_some()
    }
    /// Number of distinct matched pairs.
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    /// Sum of the counts over all pairs.
    pub fn total(&self) -> Capacity {
        self.0.values().fold(0, |total, count| total.saturating_add(*count))
    }
    pub fn iter(&self) -> impl Iterator<Item = (&U, &V, Capacity)> + '_ {
        self.0.iter().map(|((u, v), count)| (u, v, *count))
    }
    pub fn matches_of<'a>(&'a self, u: &'a U) -> impl Iterator<Item = (&'a V, Capacity)> + 'a {
        self.0
            .iter()
            .filter(move |((key, _), _)| key == u)
            .map(|((_, v), count)| (v, *count))
    }
}

impl<U: NodeId, V: NodeId> FromIterator<((U, V), Capacity)> for Matches<U, V> {
    fn from_iter<I: IntoIterator<Item = ((U, V), Capacity)>>(iter: I) -> Self {
        Matches(HashMap::from_iter(iter))
    }
}

impl<U: NodeId, V: NodeId> Default for Matches<U, V> {
    fn default() -> Self {
        Self::new()
    }
}
