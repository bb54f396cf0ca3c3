//! Turns a diff + before/after graphs into sorted, typed event records
//! (spec.md §4.5).
//!
//! New relative to the teacher; grounded directly on spec.md §4.5's event
//! catalogue. The ordering discipline ("sorted by event-kind name then by
//! canonical serialisation of payload") is implemented literally: no
//! temporal information survives into the output, matching spec.md's
//! explicit warning that event order carries no meaning beyond the sort.

use serde::{Deserialize, Serialize};

use crate::{
    diff::MemoryDiff,
    graph::{Graph, NodeId},
    value::{Address, EnvId},
    vm::Opcode,
};

/// Every event class named in spec.md §4.5.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ObjectAllocated { address: Address, kind: String },
    ObjectCollected { address: Address, kind: String },
    VariableBound { env: EnvId, name: String, address: Address },
    VariableUnbound { env: EnvId, name: String },
    VariableRebound { env: EnvId, name: String, from: Address, to: Address },
    PropertyAdded { object: Address, property: String },
    PropertyRemoved { object: Address, property: String },
    PropertyChanged { object: Address, property: String },
    ClosureCaptured { function: Address, environment: EnvId },
    EnvironmentCreated { address: EnvId },
    EnvironmentDestroyed { address: EnvId },
    ListCreated { address: Address },
    ListAppended { list: Address, value: Address },
    ListIndexUpdated { list: Address, index: usize, value: Address },
    ControlFlowDecision { from_pc: usize, to_pc: usize, condition: Option<bool>, label: String },
}

impl Event {
    /// The exact variant name, used as the primary sort key (spec.md
    /// §4.5's "sorted by event-kind name").
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::ObjectAllocated { .. } => "ObjectAllocated",
            Self::ObjectCollected { .. } => "ObjectCollected",
            Self::VariableBound { .. } => "VariableBound",
            Self::VariableUnbound { .. } => "VariableUnbound",
            Self::VariableRebound { .. } => "VariableRebound",
            Self::PropertyAdded { .. } => "PropertyAdded",
            Self::PropertyRemoved { .. } => "PropertyRemoved",
            Self::PropertyChanged { .. } => "PropertyChanged",
            Self::ClosureCaptured { .. } => "ClosureCaptured",
            Self::EnvironmentCreated { .. } => "EnvironmentCreated",
            Self::EnvironmentDestroyed { .. } => "EnvironmentDestroyed",
            Self::ListCreated { .. } => "ListCreated",
            Self::ListAppended { .. } => "ListAppended",
            Self::ListIndexUpdated { .. } => "ListIndexUpdated",
            Self::ControlFlowDecision { .. } => "ControlFlowDecision",
        }
    }

    /// Canonical payload serialisation used as the secondary sort key.
    /// Deterministic across runs for identical events; not meant as a
    /// stable external wire format.
    fn canonical_payload(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// The pre-step instruction context needed to synthesise
/// `ControlFlowDecision` (spec.md §4.5). `explainDiff` in spec.md §6 is
/// described as taking exactly `(diff, graphBefore, graphAfter)`; this
/// extra, optional argument is the recorded decision — see DESIGN.md for
/// why the three-argument contract alone cannot reconstruct it (the pre-
/// and post-step program counters and dispatched opcode live on the VM
/// state/trace, not in a memory model or graph).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlFlowContext {
    pub from_pc: usize,
    pub to_pc: usize,
    pub opcode: Opcode,
}

fn control_flow_event(cf: &ControlFlowContext) -> Option<Event> {
    match cf.opcode {
        Opcode::Jump => Some(Event::ControlFlowDecision {
            from_pc: cf.from_pc,
            to_pc: cf.to_pc,
            condition: None,
            label: "jump".to_owned(),
        }),
        Opcode::JumpIfFalse => {
            let fell_through = cf.to_pc == cf.from_pc + 1;
            Some(Event::ControlFlowDecision {
                from_pc: cf.from_pc,
                to_pc: cf.to_pc,
                condition: Some(fell_through),
                label: "jump_if_false".to_owned(),
            })
        }
        Opcode::JumpIfTrue => {
            let fell_through = cf.to_pc == cf.from_pc + 1;
            Some(Event::ControlFlowDecision {
                from_pc: cf.from_pc,
                to_pc: cf.to_pc,
                condition: Some(!fell_through),
                label: "jump_if_true".to_owned(),
            })
        }
        _ => None,
    }
}

/// `explainDiff(diff, graphBefore, graphAfter) -> events[]` (spec.md §4.5,
/// §6), extended with the control-flow context described above. Total:
/// never fails on well-formed graphs (spec.md §4.9); a dangling reference
/// resolves its kind to `"unknown"` rather than raising.
#[must_use]
pub fn explain_diff(
    diff: &MemoryDiff,
    graph_before: &Graph,
    graph_after: &Graph,
    control_flow: Option<&ControlFlowContext>,
) -> Vec<Event> {
    let mut events = Vec::new();

    for addr in &diff.added_heap {
        let kind = graph_after.kind_of(NodeId::Heap(*addr)).to_owned();
        events.push(Event::ObjectAllocated { address: *addr, kind: kind.clone() });
        if kind == "list" {
            events.push(Event::ListCreated { address: *addr });
        }
        if kind == "function" {
            if let Some(env) = closure_target(graph_after, *addr) {
                events.push(Event::ClosureCaptured { function: *addr, environment: env });
            }
        }
    }
    for addr in &diff.removed_heap {
        let kind = graph_before.kind_of(NodeId::Heap(*addr)).to_owned();
        events.push(Event::ObjectCollected { address: *addr, kind });
    }

    for key in &diff.added_bindings {
        if let Some(addr) = edge_target(graph_after, NodeId::Env(key.env), &key.name) {
            events.push(Event::VariableBound { env: key.env, name: key.name.clone(), address: addr });
        }
    }
    for key in &diff.removed_bindings {
        events.push(Event::VariableUnbound { env: key.env, name: key.name.clone() });
    }
    for key in &diff.changed_bindings {
        let from = edge_target(graph_before, NodeId::Env(key.env), &key.name);
        let to = edge_target(graph_after, NodeId::Env(key.env), &key.name);
        if let (Some(from), Some(to)) = (from, to) {
            events.push(Event::VariableRebound { env: key.env, name: key.name.clone(), from, to });
        }
    }

    for addr in &diff.changed_heap {
        let id = NodeId::Heap(*addr);
        let is_object = graph_before.kind_of(id) == "object" && graph_after.kind_of(id) == "object";
        let is_list = graph_before.kind_of(id) == "list" && graph_after.kind_of(id) == "list";
        if is_object {
            diff_properties(graph_before, graph_after, *addr, &mut events);
        }
        if is_list {
            diff_list_indices(graph_before, graph_after, *addr, &mut events);
        }
    }
    // Newly-created-and-populated lists never appear in `changed_heap`
    // (they are `added_heap` instead) but can still have elements, which
    // must still be reported as appends (spec.md §4.5).
    for addr in &diff.added_heap {
        if graph_after.kind_of(NodeId::Heap(*addr)) == "list" {
            diff_list_indices(graph_before, graph_after, *addr, &mut events);
        }
    }

    let before_envs = environment_ids(graph_before);
    let after_envs = environment_ids(graph_after);
    for env in &after_envs {
        if !before_envs.contains(env) {
            events.push(Event::EnvironmentCreated { address: *env });
        }
    }
    for env in &before_envs {
        if !after_envs.contains(env) {
            events.push(Event::EnvironmentDestroyed { address: *env });
        }
    }

    if let Some(cf) = control_flow {
        events.extend(control_flow_event(cf));
    }

    events.sort_by(|a, b| a.kind_name().cmp(b.kind_name()).then_with(|| a.canonical_payload().cmp(&b.canonical_payload())));
    events
}

fn edge_target(graph: &Graph, from: NodeId, label: &str) -> Option<Address> {
    graph.outgoing(from).into_iter().find(|e| e.label == label).and_then(|e| match e.to {
        NodeId::Heap(addr) => Some(addr),
        NodeId::Env(_) => None,
    })
}

fn closure_target(graph: &Graph, function: Address) -> Option<EnvId> {
    graph.outgoing(NodeId::Heap(function)).into_iter().find(|e| e.label == "closure").and_then(|e| match e.to {
        NodeId::Env(id) => Some(id),
        NodeId::Heap(_) => None,
    })
}

fn environment_ids(graph: &Graph) -> std::collections::BTreeSet<EnvId> {
    graph
        .nodes
        .iter()
        .filter_map(|n| match n.id {
            NodeId::Env(id) if n.kind == "environment" => Some(id),
            _ => None,
        })
        .collect()
}

fn diff_properties(before: &Graph, after: &Graph, object: Address, events: &mut Vec<Event>) {
    let id = NodeId::Heap(object);
    let before_props: std::collections::BTreeMap<_, _> =
        before.outgoing(id).into_iter().map(|e| (e.label.clone(), e.to)).collect();
    let after_props: std::collections::BTreeMap<_, _> =
        after.outgoing(id).into_iter().map(|e| (e.label.clone(), e.to)).collect();

    for (name, target) in &after_props {
        match before_props.get(name) {
            None => events.push(Event::PropertyAdded { object, property: name.clone() }),
            Some(prev) if prev != target => {
                events.push(Event::PropertyChanged { object, property: name.clone() });
            }
            Some(_) => {}
        }
    }
    for name in before_props.keys() {
        if !after_props.contains_key(name) {
            events.push(Event::PropertyRemoved { object, property: name.clone() });
        }
    }
}

fn diff_list_indices(before: &Graph, after: &Graph, list: Address, events: &mut Vec<Event>) {
    let id = NodeId::Heap(list);
    let before_items: std::collections::BTreeMap<_, _> =
        before.outgoing(id).into_iter().map(|e| (e.label.clone(), e.to)).collect();
    let after_items: std::collections::BTreeMap<_, _> =
        after.outgoing(id).into_iter().map(|e| (e.label.clone(), e.to)).collect();

    for (label, target) in &after_items {
        let Some(index) = parse_index(label) else { continue };
        let NodeId::Heap(value) = *target else { continue };
        match before_items.get(label) {
            None => events.push(Event::ListAppended { list, value }),
            Some(NodeId::Heap(prev)) if *prev != value => {
                events.push(Event::ListIndexUpdated { list, index, value });
            }
            _ => {}
        }
    }
}

fn parse_index(label: &str) -> Option<usize> {
    label.strip_prefix('[')?.strip_suffix(']')?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{diff::diff, graph::build_graph, model::build_model, value::Primitive};
    use crate::vm::{Instruction, Opcode as Op, Operand, Program, state::VmState, step::step};

    #[test]
    fn simple_assignment_reports_one_allocation_and_one_binding() {
        let program = Program::new(vec![
            Instruction::new(Op::LoadConst, Operand::Const(Primitive::Int(2))),
            Instruction::new(Op::Store, Operand::Name("x".to_owned())),
            Instruction::simple(Op::Halt),
        ]);
        let before = VmState::initial(&program);
        let mut after = before.clone();
        for _ in 0..2 {
            after = step(&program, &after).unwrap();
        }
        let (mb, ma) = (build_model(&before), build_model(&after));
        let (gb, ga) = (build_graph(&mb), build_graph(&ma));
        let d = diff(&mb, &ma);
        let events = explain_diff(&d, &gb, &ga, None);

        let allocated = events.iter().filter(|e| matches!(e, Event::ObjectAllocated { kind, .. } if kind == "primitive")).count();
        let bound = events.iter().filter(|e| matches!(e, Event::VariableBound { name, .. } if name == "x")).count();
        assert_eq!(allocated, 1);
        assert_eq!(bound, 1);
    }

    #[test]
    fn events_are_sorted_by_kind_then_payload() {
        let program = Program::new(vec![
            Instruction::new(Op::LoadConst, Operand::Const(Primitive::Int(1))),
            Instruction::new(Op::Store, Operand::Name("a".to_owned())),
            Instruction::new(Op::LoadConst, Operand::Const(Primitive::Int(2))),
            Instruction::new(Op::Store, Operand::Name("b".to_owned())),
            Instruction::simple(Op::Halt),
        ]);
        let before = VmState::initial(&program);
        let mut after = before.clone();
        for _ in 0..4 {
            after = step(&program, &after).unwrap();
        }
        let (mb, ma) = (build_model(&before), build_model(&after));
        let (gb, ga) = (build_graph(&mb), build_graph(&ma));
        let events = explain_diff(&diff(&mb, &ma), &gb, &ga, None);
        let mut sorted = events.clone();
        sorted.sort_by(|a, b| a.kind_name().cmp(b.kind_name()).then_with(|| a.canonical_payload().cmp(&b.canonical_payload())));
        assert_eq!(events, sorted);
    }
}
