//! ChronoVM's deterministic execution-and-explanation pipeline: a
//! stack-based virtual machine, a memory-snapshot/diff/graph layer, and
//! the explain/insight/plan/compress stages built on top of it.
//!
//! Every public function here is a pure transformation of plain data
//! (spec.md §1, §5): no I/O, no shared state, no front-end parser. Callers
//! supply a [`vm::Program`] (an instruction array) and, for the
//! compressor, a `pc -> source line` map; this crate does not compile
//! source text itself.
//!
//! Pipeline, leaves first:
//!
//! ```text
//! Program ──► step* ──► Trace
//!                         │
//!                         ├──► SourceMap ──► compress_trace ──► SemanticStep[]
//!                         │
//!                         └──► build_model, build_graph ──► diff ──► explain_diff
//!                                                                       │
//!                                                                       ├──► analyse ──► make_plans
//!                                                                       └──► (narration: external)
//! ```

pub mod analyze;
pub mod compress;
pub mod diff;
pub mod environment;
pub mod explain;
pub mod graph;
pub mod heap;
pub mod insight;
pub mod model;
pub mod plan;
pub mod resource;
pub mod trace;
pub mod tracer;
pub mod value;
pub mod vm;

pub use analyze::{analyse_step, PipelineError, StepAnalysis};
pub use compress::{compress_trace, SemanticStep, SemanticType, SourceMap};
pub use diff::{diff, BindingKey, MemoryDiff};
pub use explain::{explain_diff, ControlFlowContext, Event};
pub use graph::{build_graph, Graph, GraphEdge, GraphNode, NodeId};
pub use insight::{analyse, Insight};
pub use model::{build_model, EnvModel, HeapNodeModel, MemoryModel};
pub use plan::{make_plans, Plan};
pub use resource::{GcPolicy, RunLimits};
pub use trace::{run_to_halt, run_to_halt_with_tracer, Trace};
pub use value::{Address, EnvId, HeapObject, Primitive};
pub use vm::{
    state::{VmError, VmState},
    step::step,
    Instruction, Opcode, Operand, Program,
};
