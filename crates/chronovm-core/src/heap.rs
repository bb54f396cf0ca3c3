//! The address-keyed heap store.
//!
//! Mirrors the teacher's `Heap` (see `ouros/src/heap.rs`): a single
//! monotonic counter mints addresses, entries are never reused within a
//! run, and collection simply removes entries from the map rather than
//! recycling slots — ChronoVM has no allocator-level reuse to model,
//! only the presence/absence of an address (spec.md §3).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::{Address, HeapObject};

/// Heap + environment address counter and storage.
///
/// `BTreeMap` keeps iteration order address-sorted for free, which is the
/// canonicalisation spec.md §4.2 requires at every observable boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Heap {
    entries: BTreeMap<Address, HeapObject>,
    next_addr: u64,
}

impl Heap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates `object` at a freshly minted address and returns it.
    pub fn allocate(&mut self, object: HeapObject) -> Address {
        let addr = Address(self.next_addr);
        self.next_addr += 1;
        self.entries.insert(addr, object);
        addr
    }

    #[must_use]
    pub fn get(&self, addr: Address) -> Option<&HeapObject> {
        self.entries.get(&addr)
    }

    pub fn get_mut(&mut self, addr: Address) -> Option<&mut HeapObject> {
        self.entries.get_mut(&addr)
    }

    /// Removes every address not in `reachable`. Used only by the
    /// deterministic mark-sweep GC (spec.md §4.1).
    pub fn retain_only(&mut self, reachable: &std::collections::BTreeSet<Address>) {
        self.entries.retain(|addr, _| reachable.contains(addr));
    }

    /// All live addresses, sorted (spec.md §4.2).
    pub fn addresses(&self) -> impl Iterator<Item = Address> + '_ {
        self.entries.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Address, &HeapObject)> {
        self.entries.iter().map(|(a, o)| (*a, o))
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

/// Value-stringifies the heap object at `addr` per spec.md §4.8's rules:
/// primitives render their repr, objects/lists/functions render a fixed
/// placeholder. Used by `PRINT`'s output log and by the compressor's
/// variable-diff rendering so both agree on the same textual form.
#[must_use]
pub fn stringify(heap: &Heap, addr: Address) -> String {
    match heap.get(addr) {
        Some(HeapObject::Primitive(p)) => p.repr(),
        Some(HeapObject::Object(_)) => "{object}".to_owned(),
        Some(HeapObject::List(_)) => "[list]".to_owned(),
        Some(HeapObject::Function { .. }) => "<function>".to_owned(),
        None => "unknown".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Primitive;

    #[test]
    fn addresses_are_never_reused() {
        let mut heap = Heap::new();
        let a = heap.allocate(HeapObject::Primitive(Primitive::Int(1)));
        let b = heap.allocate(HeapObject::Primitive(Primitive::Int(2)));
        assert_ne!(a, b);
        let mut reachable = std::collections::BTreeSet::new();
        reachable.insert(b);
        heap.retain_only(&reachable);
        let c = heap.allocate(HeapObject::Primitive(Primitive::Int(3)));
        assert_ne!(c, a);
        assert_ne!(c, b);
        assert!(heap.get(a).is_none());
    }

    #[test]
    fn iteration_is_address_sorted() {
        let mut heap = Heap::new();
        for n in 0..5 {
            heap.allocate(HeapObject::Primitive(Primitive::Int(n)));
        }
        let addrs: Vec<_> = heap.addresses().collect();
        let mut sorted = addrs.clone();
        sorted.sort();
        assert_eq!(addrs, sorted);
    }
}
