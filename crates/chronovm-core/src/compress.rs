//! Folds a micro-step trace into source-line-aligned semantic steps
//! (spec.md §4.8).
//!
//! New relative to the teacher; grounded on spec.md §3's semantic-step
//! record and §4.8's grouping/classification/iteration rules. The only
//! piece of the teacher's idiom reused directly is the `Display`/
//! `EnumString` derive on the classification enum, matching `Opcode`
//! (`vm/mod.rs`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{
    heap,
    vm::{Opcode, Program, state::VmState},
    trace::Trace,
};

/// `sourceMap[pc]` — a 1-based source line for the instruction at `pc`
/// (spec.md §4.8). Line `0` denotes a compiler-internal instruction and
/// never cuts a group.
pub type SourceMap = BTreeMap<usize, usize>;

/// Every semantic type named in spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
pub enum SemanticType {
    Assignment,
    Print,
    BranchDecision,
    LoopCheck,
    LoopIteration,
    LoopExit,
    FunctionDef,
    FunctionCall,
    FunctionReturn,
    ListCreate,
    ListMutate,
    ObjectCreate,
    PropertyAccess,
    ClassDef,
    Expression,
    Halt,
}

/// Control-flow metadata attached to `branch_decision`/`loop_check`/
/// `loop_exit` steps (spec.md §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlFlowMeta {
    pub condition: bool,
    pub label: String,
}

/// One source-line-aligned group of micro-steps (spec.md §3, §4.8).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticStep {
    pub index: usize,
    pub source_line: usize,
    pub semantic_type: SemanticType,
    pub summary: String,
    pub start: usize,
    pub end: usize,
    pub final_state: VmState,
    /// Visible bindings that changed within the group: name → (before,
    /// after) value strings.
    pub variable_changes: Vec<(String, (String, String))>,
    pub new_output: Vec<String>,
    pub control_flow: Option<ControlFlowMeta>,
    pub iteration: Option<usize>,
}

struct RawGroup {
    start: usize,
    end: usize,
    first_line: usize,
    opcodes: Vec<Opcode>,
}

fn group_trace(trace: &Trace, program: &Program, source_map: &SourceMap) -> Vec<RawGroup> {
    let mut groups = Vec::new();
    let mut current: Option<RawGroup> = None;

    for i in 0..trace.micro_step_count() {
        let pc = trace.states[i].pc;
        let line = source_map.get(&pc).copied().unwrap_or(0);
        let opcode = trace.opcode_at(program, i);

        let starts_new_group = match &current {
            None => true,
            Some(g) => line != 0 && line != g.first_line,
        };
        if starts_new_group {
            if let Some(finished) = current.take() {
                groups.push(finished);
            }
            current = Some(RawGroup { start: i, end: i, first_line: line, opcodes: Vec::new() });
        }
        let group = current.as_mut().expect("just ensured Some");
        group.end = i + 1;
        group.opcodes.push(opcode);
    }
    if let Some(finished) = current.take() {
        groups.push(finished);
    }
    groups
}

/// Classifies a group's opcode set (spec.md §4.8's ordered cascade). One
/// deliberate generalisation of the literal order: `STORE` is checked
/// before the bare `NEW_LIST`/`NEW_OBJECT` rules, not after, extending the
/// same precedent the cascade already sets for `MAKE_FUNCTION + STORE` —
/// a constructor immediately bound to a name is an assignment, not a bare
/// construction (see `obj = {}` in DESIGN.md).
fn classify(trace: &Trace, program: &Program, group: &RawGroup) -> SemanticType {
    let has = |op: Opcode| group.opcodes.contains(&op);
    if has(Opcode::Halt) {
        SemanticType::Halt
    } else if has(Opcode::Ret) {
        SemanticType::FunctionReturn
    } else if has(Opcode::MakeFunction) && has(Opcode::Store) {
        SemanticType::FunctionDef
    } else if has(Opcode::Call) {
        SemanticType::FunctionCall
    } else if has(Opcode::Print) {
        SemanticType::Print
    } else if has(Opcode::ListAppend) || has(Opcode::ListSet) {
        SemanticType::ListMutate
    } else if has(Opcode::SetProperty) || has(Opcode::GetProperty) {
        SemanticType::PropertyAccess
    } else if has(Opcode::Store) {
        SemanticType::Assignment
    } else if has(Opcode::NewList) {
        SemanticType::ListCreate
    } else if has(Opcode::NewObject) {
        SemanticType::ObjectCreate
    } else if has(Opcode::JumpIfFalse) || has(Opcode::JumpIfTrue) {
        if loop_head_pc(trace, program, group).is_some() {
            SemanticType::LoopCheck
        } else {
            SemanticType::BranchDecision
        }
    } else {
        SemanticType::Expression
    }
}

/// The loop head's program counter within `group`, if any. A back-edge
/// jump sharing the loop head's source line (the common case for a
/// `while`/`for` condition re-checked each lap) merges into the *next*
/// lap's check group under the line-based grouping rule above, so the
/// loop head itself may sit anywhere in `group.start..group.end`, not
/// only at `group.start`. Used both to classify the group and, by the
/// caller, as the stable per-loop key for iteration counting (a raw
/// trace index would shift from lap to lap as the merge varies).
fn loop_head_pc(trace: &Trace, program: &Program, group: &RawGroup) -> Option<usize> {
    (group.start..group.end).map(|i| trace.states[i].pc).find(|pc| program.is_loop_head(*pc))
}

/// Fell-through vs jumped outcome of the conditional jump ending `group`,
/// combined with opcode polarity into the logical condition (spec.md
/// §4.8 **Branch outcome**).
fn branch_condition(trace: &Trace, program: &Program, group: &RawGroup) -> Option<(bool, &'static str)> {
    let last_index = group.end - 1;
    let op = trace.opcode_at(program, last_index);
    if !op.is_conditional_jump() {
        return None;
    }
    let pre_pc = trace.states[last_index].pc;
    let post_pc = trace.states[group.end].pc;
    let fell_through = post_pc == pre_pc + 1;
    let condition = match op {
        Opcode::JumpIfFalse => fell_through,
        Opcode::JumpIfTrue => !fell_through,
        _ => unreachable!("guarded by is_conditional_jump"),
    };
    let label = if op == Opcode::JumpIfFalse { "jump_if_false" } else { "jump_if_true" };
    Some((condition, label))
}

fn is_visible(name: &str) -> bool {
    !name.starts_with("__") && !name.starts_with("arg")
}

fn stringify_binding(state: &VmState, env: crate::value::EnvId, name: &str) -> String {
    state
        .envs
        .get(env)
        .and_then(|e| e.bindings.get(name))
        .map_or_else(|| "None".to_owned(), |addr| heap::stringify(&state.heap, *addr))
}

fn variable_changes(before: &VmState, after: &VmState) -> Vec<(String, (String, String))> {
    let env = before.current_env;
    let mut names: std::collections::BTreeSet<&str> = std::collections::BTreeSet::new();
    if let Some(e) = before.envs.get(env) {
        names.extend(e.bindings.keys().map(String::as_str));
    }
    if let Some(e) = after.envs.get(env) {
        names.extend(e.bindings.keys().map(String::as_str));
    }

    let mut changes = Vec::new();
    for name in names {
        if !is_visible(name) {
            continue;
        }
        let before_str = stringify_binding(before, env, name);
        let after_str = stringify_binding(after, env, name);
        if before_str != after_str {
            changes.push((name.to_owned(), (before_str, after_str)));
        }
    }
    changes.sort_by(|a, b| a.0.cmp(&b.0));
    changes
}

fn summary_for(
    semantic_type: SemanticType,
    line: usize,
    variable_changes: &[(String, (String, String))],
    new_output: &[String],
    control_flow: Option<&ControlFlowMeta>,
    iteration: Option<usize>,
) -> String {
    match semantic_type {
        SemanticType::Assignment => variable_changes
            .iter()
            .map(|(name, (_, after))| format!("{name} = {after}"))
            .collect::<Vec<_>>()
            .join("; "),
        SemanticType::Print => format!("print({})", new_output.join(", ")),
        SemanticType::BranchDecision => {
            let cond = control_flow.map_or(false, |cf| cf.condition);
            format!("Branch condition {cond} (line {line})")
        }
        SemanticType::LoopCheck => {
            format!("Loop check, iteration {} (line {line})", iteration.unwrap_or(0))
        }
        SemanticType::LoopIteration => format!("Loop iteration {} (line {line})", iteration.unwrap_or(0)),
        SemanticType::LoopExit => format!("Loop exit (line {line})"),
        SemanticType::FunctionDef => format!("Function defined (line {line})"),
        SemanticType::FunctionCall => format!("Function call (line {line})"),
        SemanticType::FunctionReturn => format!("Function return (line {line})"),
        SemanticType::ListCreate => format!("List created (line {line})"),
        SemanticType::ListMutate => format!("List mutated (line {line})"),
        SemanticType::ObjectCreate => format!("Object created (line {line})"),
        SemanticType::PropertyAccess => format!("Property access (line {line})"),
        SemanticType::ClassDef => format!("Class defined (line {line})"),
        SemanticType::Expression => format!("Expression (line {line})"),
        SemanticType::Halt => "Halt".to_owned(),
    }
}

/// `compressTrace(trace, sourceMap) -> steps[]` (spec.md §4.8, §6).
#[must_use]
pub fn compress_trace(trace: &Trace, program: &Program, source_map: &SourceMap) -> Vec<SemanticStep> {
    let raw_groups = group_trace(trace, program, source_map);
    let mut loop_counters: BTreeMap<usize, usize> = BTreeMap::new();
    let mut steps = Vec::with_capacity(raw_groups.len());

    for (index, group) in raw_groups.iter().enumerate() {
        let mut semantic_type = classify(trace, program, group);
        let before = &trace.states[group.start];
        let after = &trace.states[group.end];

        let mut control_flow = None;
        let mut iteration = None;
        if matches!(semantic_type, SemanticType::LoopCheck | SemanticType::BranchDecision) {
            if let Some((condition, label)) = branch_condition(trace, program, group) {
                control_flow = Some(ControlFlowMeta { condition, label: label.to_owned() });
                if semantic_type == SemanticType::LoopCheck {
                    if condition {
                        let head = loop_head_pc(trace, program, group).expect("LoopCheck implies a loop head");
                        let counter = loop_counters.entry(head).or_insert(0);
                        *counter += 1;
                        iteration = Some(*counter);
                    } else {
                        semantic_type = SemanticType::LoopExit;
                    }
                }
            }
        }

        let changes = variable_changes(before, after);
        let new_output = after.output[before.output.len().min(after.output.len())..].to_vec();
        let summary = summary_for(semantic_type, group.first_line, &changes, &new_output, control_flow.as_ref(), iteration);

        steps.push(SemanticStep {
            index,
            source_line: group.first_line,
            semantic_type,
            summary,
            start: group.start,
            end: group.end,
            final_state: after.clone(),
            variable_changes: changes,
            new_output,
            control_flow,
            iteration,
        });
    }
    steps
}
