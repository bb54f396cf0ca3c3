//! VM state and the execution-error taxonomy.
//!
//! `VmError` is hand-rolled with a manual `Display` + `std::error::Error`
//! impl rather than a derive macro, matching the teacher's own
//! `ResourceError` (`ouros/src/resource.rs`) — these are terminal execution
//! errors (spec.md §7), not programming errors, so they carry exactly the
//! fields spec.md §4.1 names and nothing more.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    environment::EnvStore,
    heap::Heap,
    value::{Address, EnvId},
    vm::Program,
};

/// A call-stack frame: everything needed to resume the caller on `RET`
/// (spec.md §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub return_pc: usize,
    pub return_env: EnvId,
    /// Operand-stack depth at call time, so `RET` knows where to truncate
    /// back to before pushing the return value.
    pub stack_depth: usize,
}

/// The complete VM state (spec.md §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmState {
    pub pc: usize,
    pub operand_stack: Vec<Address>,
    pub call_stack: Vec<Frame>,
    pub heap: Heap,
    pub envs: EnvStore,
    pub current_env: EnvId,
    pub global_env: EnvId,
    pub output: Vec<String>,
    pub is_running: bool,
}

impl VmState {
    /// `createInitialState(program)` (spec.md §6). The program itself is
    /// not stored on `VmState` — `step` takes it alongside the state so the
    /// state stays a plain, serializable value independent of the
    /// instruction array it is being driven by.
    #[must_use]
    pub fn initial(_program: &Program) -> Self {
        let mut envs = EnvStore::new();
        let global_env = envs.allocate(None);
        Self {
            pc: 0,
            operand_stack: Vec::new(),
            call_stack: Vec::new(),
            heap: Heap::new(),
            envs,
            current_env: global_env,
            global_env,
            output: Vec::new(),
            is_running: true,
        }
    }
}

/// Execution errors (spec.md §4.1, §7). Terminal for a trace; the pipeline
/// still accepts the truncated trace produced up to the failing step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VmError {
    StackUnderflow,
    UnknownBinding(String),
    TypeMismatch(String),
    DivisionByZero,
    InvalidPc(usize),
    ExecutionLimitExceeded { limit: usize },
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StackUnderflow => write!(f, "operand stack underflow"),
            Self::UnknownBinding(name) => write!(f, "unknown binding: {name}"),
            Self::TypeMismatch(op) => write!(f, "type mismatch in {op}"),
            Self::DivisionByZero => write!(f, "division by zero"),
            Self::InvalidPc(pc) => write!(f, "invalid program counter: {pc}"),
            Self::ExecutionLimitExceeded { limit } => write!(f, "execution limit exceeded: {limit} steps"),
        }
    }
}

impl std::error::Error for VmError {}
