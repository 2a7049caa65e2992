//! Fact storage backends for the mutable index
//!
//! `IncrementalIndex` talks to a `FactStore` and never branches on which
//! backend it got. Both backends yield identical sorted output.

use crate::aggregation::AggState;
use crate::index::schema::IndexType;
use crate::storage::DimValue;
use std::collections::{BTreeMap, HashMap};

/// Key of a fact: truncated timestamp, dimension tuple, and an arrival
/// sequence number that is always 0 under rollup.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FactKey {
    pub timestamp: i64,
    pub dims: Vec<DimValue>,
    pub seq: u64,
}

/// Storage strategy for aggregated facts
pub trait FactStore: Send {
    /// Number of facts
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// States of an existing fact
    fn get_mut(&mut self, key: &FactKey) -> Option<&mut Vec<AggState>>;

    /// Insert a new fact
    fn insert(&mut self, key: FactKey, metrics: Vec<AggState>);

    /// Visit every fact in unspecified order
    fn for_each(&self, visit: &mut dyn FnMut(&FactKey, &[AggState]));

    /// All facts ordered by key
    fn sorted(&self) -> Vec<(&FactKey, &[AggState])>;

    /// Drop all facts and give their memory back
    fn release(&mut self);
}

/// Create the store for a backend variant
pub fn new_store(index_type: IndexType) -> Box<dyn FactStore> {
    match index_type {
        IndexType::OnHeap => Box::<OnHeapStore>::default(),
        IndexType::Sorted => Box::<SortedStore>::default(),
    }
}

/// Hash map store; sorting is deferred to persist time
#[derive(Debug, Default)]
pub struct OnHeapStore {
    facts: HashMap<FactKey, Vec<AggState>>,
}

impl FactStore for OnHeapStore {
    fn len(&self) -> usize {
        self.facts.len()
    }

    fn get_mut(&mut self, key: &FactKey) -> Option<&mut Vec<AggState>> {
        self.facts.get_mut(key)
    }

    fn insert(&mut self, key: FactKey, metrics: Vec<AggState>) {
        self.facts.insert(key, metrics);
    }

    fn for_each(&self, visit: &mut dyn FnMut(&FactKey, &[AggState])) {
        for (key, metrics) in &self.facts {
            visit(key, metrics);
        }
    }

    fn sorted(&self) -> Vec<(&FactKey, &[AggState])> {
        let mut facts: Vec<_> = self
            .facts
            .iter()
            .map(|(k, v)| (k, v.as_slice()))
            .collect();
        facts.sort_unstable_by(|a, b| a.0.cmp(b.0));
        facts
    }

    fn release(&mut self) {
        self.facts = HashMap::new();
    }
}

/// Ordered tree store
#[derive(Debug, Default)]
pub struct SortedStore {
    facts: BTreeMap<FactKey, Vec<AggState>>,
}

impl FactStore for SortedStore {
    fn len(&self) -> usize {
        self.facts.len()
    }

    fn get_mut(&mut self, key: &FactKey) -> Option<&mut Vec<AggState>> {
        self.facts.get_mut(key)
    }

    fn insert(&mut self, key: FactKey, metrics: Vec<AggState>) {
        self.facts.insert(key, metrics);
    }

    fn for_each(&self, visit: &mut dyn FnMut(&FactKey, &[AggState])) {
        for (key, metrics) in &self.facts {
            visit(key, metrics);
        }
    }

    fn sorted(&self) -> Vec<(&FactKey, &[AggState])> {
        self.facts.iter().map(|(k, v)| (k, v.as_slice())).collect()
    }

    fn release(&mut self) {
        self.facts = BTreeMap::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(ts: i64, dim: &str, seq: u64) -> FactKey {
        FactKey {
            timestamp: ts,
            dims: vec![DimValue::from(dim)],
            seq,
        }
    }

    fn fill(store: &mut dyn FactStore) {
        for (ts, dim, seq) in [(20, "b", 0), (10, "z", 0), (20, "a", 1), (20, "a", 0)] {
            store.insert(key(ts, dim, seq), vec![AggState::Count(1)]);
        }
    }

    #[test]
    fn test_backends_sort_identically() {
        let mut heap = new_store(IndexType::OnHeap);
        let mut tree = new_store(IndexType::Sorted);
        fill(heap.as_mut());
        fill(tree.as_mut());

        let expected = vec![key(10, "z", 0), key(20, "a", 0), key(20, "a", 1), key(20, "b", 0)];
        for store in [&heap, &tree] {
            let keys: Vec<FactKey> = store.sorted().into_iter().map(|(k, _)| k.clone()).collect();
            assert_eq!(keys, expected);
        }
    }

    #[test]
    fn test_get_mut_and_release() {
        let mut store = new_store(IndexType::OnHeap);
        fill(store.as_mut());

        if let Some(states) = store.get_mut(&key(10, "z", 0)) {
            states[0] = AggState::Count(5);
        }
        let mut total = 0.0;
        store.for_each(&mut |_, states| total += states[0].finalize());
        assert_eq!(total, 8.0);

        store.release();
        assert!(store.is_empty());
    }
}
