//! Memory model builder (spec.md §4.2).
//!
//! Projects a [`VmState`] into a canonical, fully ordered, comparable
//! value. Grounded on the teacher's `HeapStats`
//! (`ouros/src/heap.rs`): a snapshot struct built purely from sorted
//! collections so two snapshots can be compared field-by-field without any
//! further normalisation step.

use serde::{Deserialize, Serialize};

use crate::{
    environment::Environment,
    value::{Address, EnvId, HeapObject, Primitive},
    vm::state::VmState,
};

/// Canonical form of a heap node: identical cases to [`HeapObject`], but
/// `Object` properties are sorted by key rather than kept in insertion
/// order (spec.md §4.2: "Object properties sorted by key").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HeapNodeModel {
    Primitive(Primitive),
    Object(Vec<(String, Address)>),
    List(Vec<Address>),
    Function { entry_pc: usize, captured_env: EnvId },
}

impl HeapNodeModel {
    fn from_heap_object(obj: &HeapObject) -> Self {
        match obj {
            HeapObject::Primitive(p) => Self::Primitive(p.clone()),
            HeapObject::Object(props) => {
                let mut sorted: Vec<_> = props.iter().map(|(k, v)| (k.clone(), *v)).collect();
                sorted.sort_by(|a, b| a.0.cmp(&b.0));
                Self::Object(sorted)
            }
            HeapObject::List(items) => Self::List(items.clone()),
            HeapObject::Function { entry_pc, captured_env } => {
                Self::Function { entry_pc: *entry_pc, captured_env: *captured_env }
            }
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Primitive(_) => "primitive",
            Self::Object(_) => "object",
            Self::List(_) => "list",
            Self::Function { .. } => "function",
        }
    }

    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Primitive(p) => p.repr(),
            Self::Object(_) => "{object}".to_owned(),
            Self::List(_) => "[list]".to_owned(),
            Self::Function { entry_pc, .. } => format!("<function @{entry_pc}>"),
        }
    }

    /// Every address this node directly references, already in the sorted
    /// order the graph builder emits edges in (spec.md §4.4).
    #[must_use]
    pub fn outgoing(&self) -> Vec<(String, Address)> {
        match self {
            Self::Primitive(_) => Vec::new(),
            Self::Object(props) => props.clone(),
            Self::List(items) => items.iter().enumerate().map(|(i, v)| (format!("[{i}]"), *v)).collect(),
            Self::Function { .. } => Vec::new(),
        }
    }
}

/// One environment as it appears in a [`MemoryModel`]: bindings sorted by
/// name (spec.md §4.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvModel {
    pub id: EnvId,
    pub parent: Option<EnvId>,
    pub bindings: Vec<(String, Address)>,
}

impl EnvModel {
    fn from_environment(id: EnvId, env: &Environment) -> Self {
        let mut bindings: Vec<_> = env.bindings.iter().map(|(k, v)| (k.clone(), *v)).collect();
        bindings.sort_by(|a, b| a.0.cmp(&b.0));
        Self { id, parent: env.parent, bindings }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Address> {
        self.bindings.iter().find(|(n, _)| n == name).map(|(_, a)| *a)
    }
}

/// A canonicalised, order-independent projection of a [`VmState`]
/// (spec.md §4.2). Two states that differ only in unreferenced heap
/// entries still diff as different unless GC was applied — the model does
/// not itself garbage-collect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryModel {
    /// Heap nodes sorted by address.
    pub heap: Vec<(Address, HeapNodeModel)>,
    /// Environments sorted by address; bindings within each sorted by name.
    pub environments: Vec<EnvModel>,
    /// Copied verbatim — operand stack order is observable, not sorted.
    pub operand_stack: Vec<Address>,
    pub current_env: EnvId,
    pub global_env: EnvId,
    pub pc: usize,
    pub is_running: bool,
}

impl MemoryModel {
    #[must_use]
    pub fn heap_node(&self, addr: Address) -> Option<&HeapNodeModel> {
        self.heap.binary_search_by_key(&addr, |(a, _)| *a).ok().map(|i| &self.heap[i].1)
    }

    #[must_use]
    pub fn environment(&self, id: EnvId) -> Option<&EnvModel> {
        self.environments.binary_search_by_key(&id, |e| e.id).ok().map(|i| &self.environments[i])
    }
}

/// `buildModel(state) -> MemoryModel` (spec.md §6).
#[must_use]
pub fn build_model(state: &VmState) -> MemoryModel {
    let mut heap: Vec<_> =
        state.heap.iter().map(|(a, o)| (a, HeapNodeModel::from_heap_object(o))).collect();
    heap.sort_by_key(|(addr, _)| *addr);

    let mut environments: Vec<_> =
        state.envs.iter().map(|(id, env)| EnvModel::from_environment(id, env)).collect();
    environments.sort_by_key(|e| e.id);

    MemoryModel {
        heap,
        environments,
        operand_stack: state.operand_stack.clone(),
        current_env: state.current_env,
        global_env: state.global_env,
        pc: state.pc,
        is_running: state.is_running,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Primitive;
    use crate::vm::{Instruction, Opcode, Operand, Program, step::step};

    #[test]
    fn model_is_heap_address_sorted_regardless_of_insertion_order() {
        let program = Program::new(vec![Instruction::simple(Opcode::Halt)]);
        let state = VmState::initial(&program);
        let model = build_model(&state);
        let addrs: Vec<_> = model.heap.iter().map(|(a, _)| *a).collect();
        let mut sorted = addrs.clone();
        sorted.sort();
        assert_eq!(addrs, sorted);
    }

    #[test]
    fn object_properties_are_sorted_by_key_in_the_model() {
        let program = Program::new(vec![Instruction::simple(Opcode::Halt)]);
        let mut state = VmState::initial(&program);
        let obj = state.heap.allocate(HeapObject::Object({
            let mut m = indexmap::IndexMap::new();
            m.insert("zeta".to_owned(), Address(0));
            m.insert("alpha".to_owned(), Address(0));
            m
        }));
        let _ = obj;
        let model = build_model(&state);
        let (_, node) = model.heap.iter().find(|(_, n)| n.kind() == "object").unwrap();
        let HeapNodeModel::Object(props) = node else { unreachable!() };
        assert_eq!(props.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(), vec!["alpha", "zeta"]);
    }

    #[test]
    fn diffing_a_state_with_itself_is_empty_model_equality() {
        let program = Program::new(vec![
            Instruction::new(Opcode::LoadConst, Operand::Const(Primitive::Int(1))),
            Instruction::new(Opcode::Store, Operand::Name("x".to_owned())),
            Instruction::simple(Opcode::Halt),
        ]);
        let mut state = VmState::initial(&program);
        state = step(&program, &state).unwrap();
        let a = build_model(&state);
        let b = build_model(&state);
        assert_eq!(a, b);
    }
}
