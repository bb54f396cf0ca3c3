//! Structural diff of two [`MemoryModel`]s (spec.md §4.3).
//!
//! Grounded on the teacher's `HeapStats::diff` (`ouros/src/heap.rs`): a
//! pure function producing a delta struct, here specialised to the
//! address/binding granularity spec.md §4.3 asks for rather than the
//! teacher's type-count-bucket granularity.

use serde::{Deserialize, Serialize};

use crate::{
    model::MemoryModel,
    value::{Address, EnvId},
};

/// A binding is identified by the environment it lives in plus its name
/// (spec.md §4.3).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BindingKey {
    pub env: EnvId,
    pub name: String,
}

/// `diff(before, after) -> MemoryDiff` (spec.md §4.3). Every list is sorted
/// lexicographically (spec.md §8 **Sort laws**).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryDiff {
    pub added_heap: Vec<Address>,
    pub removed_heap: Vec<Address>,
    pub changed_heap: Vec<Address>,
    pub added_bindings: Vec<BindingKey>,
    pub removed_bindings: Vec<BindingKey>,
    pub changed_bindings: Vec<BindingKey>,
}

impl MemoryDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added_heap.is_empty()
            && self.removed_heap.is_empty()
            && self.changed_heap.is_empty()
            && self.added_bindings.is_empty()
            && self.removed_bindings.is_empty()
            && self.changed_bindings.is_empty()
    }
}

/// `diffModels(before, after) -> diff` (spec.md §6).
#[must_use]
pub fn diff(before: &MemoryModel, after: &MemoryModel) -> MemoryDiff {
    let mut added_heap = Vec::new();
    let mut removed_heap = Vec::new();
    let mut changed_heap = Vec::new();

    for (addr, node) in &after.heap {
        match before.heap_node(*addr) {
            None => added_heap.push(*addr),
            Some(before_node) if before_node != node => changed_heap.push(*addr),
            Some(_) => {}
        }
    }
    for (addr, _) in &before.heap {
        if after.heap_node(*addr).is_none() {
            removed_heap.push(*addr);
        }
    }

    let mut added_bindings = Vec::new();
    let mut removed_bindings = Vec::new();
    let mut changed_bindings = Vec::new();

    for env in &after.environments {
        let before_env = before.environment(env.id);
        for (name, addr) in &env.bindings {
            match before_env.and_then(|e| e.get(name)) {
                None => added_bindings.push(BindingKey { env: env.id, name: name.clone() }),
                Some(before_addr) if before_addr != *addr => {
                    changed_bindings.push(BindingKey { env: env.id, name: name.clone() });
                }
                Some(_) => {}
            }
        }
    }
    for env in &before.environments {
        let after_env = after.environment(env.id);
        for (name, _) in &env.bindings {
            if after_env.and_then(|e| e.get(name)).is_none() {
                removed_bindings.push(BindingKey { env: env.id, name: name.clone() });
            }
        }
    }

    added_heap.sort();
    removed_heap.sort();
    changed_heap.sort();
    added_bindings.sort();
    removed_bindings.sort();
    changed_bindings.sort();

    MemoryDiff { added_heap, removed_heap, changed_heap, added_bindings, removed_bindings, changed_bindings }
}
