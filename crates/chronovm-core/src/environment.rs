//! Lexical environment store.
//!
//! Kept as a keyed store distinct from the heap (spec.md §3), mirroring the
//! teacher's separation between `Heap` and `Namespaces`
//! (`ouros/src/namespace.rs`) — variable scopes and heap objects are minted
//! from the same monotonic discipline but never share a map, so closures
//! (a function's captured environment) and ordinary heap collection can be
//! reasoned about independently.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::value::{Address, EnvId};

/// A single lexical scope: an optional parent plus ordered bindings.
///
/// Bindings use an `IndexMap` so insertion order is preserved for the VM's
/// own bookkeeping, while every externally observable projection
/// (`MemoryModel`, events) re-sorts by name (spec.md §4.2).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    pub parent: Option<EnvId>,
    pub bindings: IndexMap<String, Address>,
}

impl Environment {
    #[must_use]
    pub fn new(parent: Option<EnvId>) -> Self {
        Self { parent, bindings: IndexMap::new() }
    }
}

/// Storage for all environments created during a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvStore {
    entries: BTreeMap<EnvId, Environment>,
    next_id: u64,
}

impl EnvStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new environment parented on `parent` and returns its id.
    pub fn allocate(&mut self, parent: Option<EnvId>) -> EnvId {
        let id = EnvId(self.next_id);
        self.next_id += 1;
        self.entries.insert(id, Environment::new(parent));
        id
    }

    #[must_use]
    pub fn get(&self, id: EnvId) -> Option<&Environment> {
        self.entries.get(&id)
    }

    pub fn get_mut(&mut self, id: EnvId) -> Option<&mut Environment> {
        self.entries.get_mut(&id)
    }

    /// Resolves `name` by walking the parent chain starting at `start`.
    #[must_use]
    pub fn resolve(&self, start: EnvId, name: &str) -> Option<Address> {
        let mut current = Some(start);
        while let Some(id) = current {
            let env = self.entries.get(&id)?;
            if let Some(addr) = env.bindings.get(name) {
                return Some(*addr);
            }
            current = env.parent;
        }
        None
    }

    /// Binds `name` in `env` (create or rebind), returning the previous
    /// address if this was a rebind rather than a fresh binding.
    pub fn bind(&mut self, env: EnvId, name: &str, addr: Address) -> Option<Address> {
        self.entries
            .get_mut(&env)
            .and_then(|e| e.bindings.insert(name.to_owned(), addr))
    }

    pub fn retain_only(&mut self, reachable: &std::collections::BTreeSet<EnvId>) {
        self.entries.retain(|id, _| reachable.contains(id));
    }

    pub fn ids(&self) -> impl Iterator<Item = EnvId> + '_ {
        self.entries.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EnvId, &Environment)> {
        self.entries.iter().map(|(id, e)| (*id, e))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_walks_parent_chain() {
        let mut store = EnvStore::new();
        let global = store.allocate(None);
        let child = store.allocate(Some(global));
        store.bind(global, "x", Address(1));
        assert_eq!(store.resolve(child, "x"), Some(Address(1)));
        assert_eq!(store.resolve(child, "y"), None);
    }

    #[test]
    fn rebind_returns_previous_address() {
        let mut store = EnvStore::new();
        let env = store.allocate(None);
        assert_eq!(store.bind(env, "x", Address(1)), None);
        assert_eq!(store.bind(env, "x", Address(2)), Some(Address(1)));
        assert_eq!(store.resolve(env, "x"), Some(Address(2)));
    }
}
