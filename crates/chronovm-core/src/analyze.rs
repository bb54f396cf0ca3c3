//! `analyseStep`, the convenience aggregate over a single trace index
//! (spec.md §6), plus the pipeline's programming-error taxonomy (spec.md
//! §7).
//!
//! New relative to the teacher; grounded on spec.md §6's aggregate
//! contract. `PipelineError` is hand-rolled with a manual `Display` +
//! `std::error::Error` impl, the same idiom as [`crate::vm::state::VmError`]
//! (in turn grounded on the teacher's `ResourceError`) — these are
//! programming errors (bad index, malformed program), distinct in kind
//! from `VmError`'s execution errors.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    diff::{diff, MemoryDiff},
    explain::{explain_diff, ControlFlowContext, Event},
    graph::{build_graph, Graph},
    insight::{analyse, Insight},
    model::{build_model, MemoryModel},
    plan::{make_plans, Plan},
    trace::Trace,
    vm::Program,
};

/// Programming errors raised by the analysis aggregate (spec.md §7).
/// Distinct from [`crate::vm::state::VmError`], which is an execution
/// error the VM itself terminates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    OutOfRange { index: usize, len: usize },
    InvalidProgram(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfRange { index, len } => write!(f, "step index {index} out of range (trace has {len} states)"),
            Self::InvalidProgram(reason) => write!(f, "invalid program: {reason}"),
        }
    }
}

impl std::error::Error for PipelineError {}

/// Everything derivable from a single trace index (spec.md §6's
/// `analyseStep`): the model and graph at that index, the diff from the
/// previous index (`None` at index 0), and the events/insights/plans that
/// diff produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepAnalysis {
    pub memory_model: MemoryModel,
    pub graph: Graph,
    pub diff_from_previous: Option<MemoryDiff>,
    pub events: Vec<Event>,
    pub insights: Vec<Insight>,
    pub plans: Vec<Plan>,
}

/// `analyseStep(trace, stepIndex) -> {...}` (spec.md §6). `step_index`
/// indexes `trace.states`; `0` yields empty events/insights/plans and a
/// `None` diff. Out-of-range raises [`PipelineError::OutOfRange`].
pub fn analyse_step(trace: &Trace, program: &Program, step_index: usize) -> Result<StepAnalysis, PipelineError> {
    if step_index >= trace.states.len() {
        return Err(PipelineError::OutOfRange { index: step_index, len: trace.states.len() });
    }

    let model = build_model(&trace.states[step_index]);
    let graph = build_graph(&model);

    if step_index == 0 {
        return Ok(StepAnalysis {
            memory_model: model,
            graph,
            diff_from_previous: None,
            events: Vec::new(),
            insights: Vec::new(),
            plans: Vec::new(),
        });
    }

    let previous_model = build_model(&trace.states[step_index - 1]);
    let previous_graph = build_graph(&previous_model);
    let d = diff(&previous_model, &model);

    let control_flow = ControlFlowContext {
        from_pc: trace.states[step_index - 1].pc,
        to_pc: trace.states[step_index].pc,
        opcode: trace.opcode_at(program, step_index - 1),
    };
    let events = explain_diff(&d, &previous_graph, &graph, Some(&control_flow));
    let insights = analyse(&events);
    let plans = make_plans(&insights);

    Ok(StepAnalysis { memory_model: model, graph, diff_from_previous: Some(d), events, insights, plans })
}
