//! Deterministic mark-sweep garbage collection (spec.md §4.1 **Garbage
//! collection**).
//!
//! The teacher interpreter has no GC of its own (values are reference
//! counted), so this module is grounded directly on spec.md's own
//! algorithm description rather than on a teacher file: mark every address
//! reachable from the roots it names, sweep everything else. Invoked only
//! at the deterministic points `trace.rs` calls it from — never from a
//! timer, allocation counter, or other non-deterministic signal.

use std::collections::BTreeSet;

use crate::value::{Address, EnvId};
use crate::vm::state::VmState;

/// Runs one mark-sweep pass over `state` in place. Roots are exactly those
/// named in spec.md §4.1: the current environment, every environment on the
/// call stack, the operand stack, and the global environment.
pub fn collect(state: &mut VmState) {
    let mut reachable_envs: BTreeSet<EnvId> = BTreeSet::new();
    let mut reachable_heap: BTreeSet<Address> = BTreeSet::new();

    let mut env_worklist: Vec<EnvId> = vec![state.current_env, state.global_env];
    for frame in &state.call_stack {
        env_worklist.push(frame.return_env);
    }

    let mut heap_worklist: Vec<Address> = state.operand_stack.clone();

    while !env_worklist.is_empty() || !heap_worklist.is_empty() {
        while let Some(env_id) = env_worklist.pop() {
            if !reachable_envs.insert(env_id) {
                continue;
            }
            let Some(env) = state.envs.get(env_id) else { continue };
            if let Some(parent) = env.parent {
                env_worklist.push(parent);
            }
            for addr in env.bindings.values() {
                heap_worklist.push(*addr);
            }
        }

        while let Some(addr) = heap_worklist.pop() {
            if !reachable_heap.insert(addr) {
                continue;
            }
            let Some(obj) = state.heap.get(addr) else { continue };
            match obj {
                crate::value::HeapObject::Primitive(_) => {}
                crate::value::HeapObject::Object(props) => {
                    heap_worklist.extend(props.values().copied());
                }
                crate::value::HeapObject::List(items) => {
                    heap_worklist.extend(items.iter().copied());
                }
                crate::value::HeapObject::Function { captured_env, .. } => {
                    env_worklist.push(*captured_env);
                }
            }
        }
    }

    state.heap.retain_only(&reachable_heap);
    state.envs.retain_only(&reachable_envs);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::HeapObject;
    use crate::value::Primitive;
    use crate::vm::{Instruction, Opcode, Program};

    #[test]
    fn unreferenced_primitive_is_collected() {
        let program = Program::new(vec![Instruction::simple(Opcode::Halt)]);
        let mut state = VmState::initial(&program);
        state.heap.allocate(HeapObject::Primitive(Primitive::Int(99)));
        assert_eq!(state.heap.len(), 1);
        collect(&mut state);
        assert_eq!(state.heap.len(), 0);
    }

    #[test]
    fn binding_keeps_its_target_alive() {
        let program = Program::new(vec![Instruction::simple(Opcode::Halt)]);
        let mut state = VmState::initial(&program);
        let addr = state.heap.allocate(HeapObject::Primitive(Primitive::Int(99)));
        state.envs.bind(state.global_env, "kept", addr);
        collect(&mut state);
        assert_eq!(state.heap.len(), 1);
        assert!(state.heap.get(addr).is_some());
    }

    #[test]
    fn closure_keeps_captured_environment_alive() {
        let program = Program::new(vec![Instruction::simple(Opcode::Halt)]);
        let mut state = VmState::initial(&program);
        let inner_env = state.envs.allocate(Some(state.global_env));
        let captured = state.heap.allocate(HeapObject::Primitive(Primitive::Int(7)));
        state.envs.bind(inner_env, "x", captured);
        let func = state.heap.allocate(HeapObject::Function { entry_pc: 0, captured_env: inner_env });
        state.envs.bind(state.global_env, "f", func);
        collect(&mut state);
        assert!(state.envs.get(inner_env).is_some());
        assert!(state.heap.get(captured).is_some());
    }

    #[test]
    fn rebinding_a_name_lets_gc_collect_the_old_target() {
        // `trash = {}; trash = 0` — scenario 6 of spec.md §8.
        let program = Program::new(vec![Instruction::simple(Opcode::Halt)]);
        let mut state = VmState::initial(&program);
        let obj = state.heap.allocate(HeapObject::Object(indexmap::IndexMap::new()));
        state.envs.bind(state.global_env, "trash", obj);
        let zero = state.heap.allocate(HeapObject::Primitive(Primitive::Int(0)));
        state.envs.bind(state.global_env, "trash", zero);

        collect(&mut state);

        assert!(state.heap.get(obj).is_none(), "original object must be collected once unreferenced");
        assert!(state.heap.get(zero).is_some());
    }
}
