//! Drives a [`Program`] to completion, producing the full state trace
//! (spec.md §4.1 **Step function**, §5, §6's `runToHalt`).
//!
//! Grounded on the teacher's `ouros/src/run.rs` `Runner`, which plays the
//! same "drive to completion, return trace/snapshot" role, but ChronoVM's
//! version has no resumable external-call protocol to model (spec.md §1:
//! "no file or network I/O from the core") — it is a single straight-line
//! loop bounded only by the step cap in [`RunLimits`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{
    resource::{GcPolicy, RunLimits},
    tracer::{NoopTracer, VmTracer},
    vm::{
        Opcode, Program,
        gc,
        state::{VmError, VmState},
        step::step,
    },
};

/// The full sequence of VM states from the initial state through the final
/// one (spec.md Glossary: **Trace**). `states[i]` is the state *before*
/// executing micro-step `i`; `states.len() - 1` is the number of
/// micro-steps actually executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub states: Vec<VmState>,
}

impl Trace {
    #[must_use]
    pub fn micro_step_count(&self) -> usize {
        self.states.len().saturating_sub(1)
    }

    /// The opcode dispatched to turn `states[index]` into `states[index +
    /// 1]`. Panics if `index` is out of range — callers only ever index
    /// within `0..micro_step_count()`.
    #[must_use]
    pub fn opcode_at(&self, program: &Program, index: usize) -> Opcode {
        program.get(self.states[index].pc).expect("trace indices are always in-program").op
    }
}

/// Runs `program` from its initial state until `HALT`, an execution error,
/// or the step cap is hit. Execution errors are terminal but not fatal to
/// the pipeline: the partial trace up to the failing step is always
/// returned alongside the error (spec.md §7).
pub fn run_to_halt(program: &Program, limits: RunLimits) -> (Trace, Option<VmError>) {
    run_to_halt_with_tracer(program, limits, &mut NoopTracer)
}

/// Same as [`run_to_halt`] but notifies `tracer` of each dispatched
/// instruction and each heap allocation/collection observed between
/// consecutive states.
pub fn run_to_halt_with_tracer(program: &Program, limits: RunLimits, tracer: &mut impl VmTracer) -> (Trace, Option<VmError>) {
    let mut states = vec![VmState::initial(program)];
    let mut error = None;

    loop {
        let current = states.last().expect("states is never empty");
        if !current.is_running {
            break;
        }
        if states.len() - 1 >= limits.max_steps {
            error = Some(VmError::ExecutionLimitExceeded { limit: limits.max_steps });
            break;
        }

        let Some(instr) = program.get(current.pc) else {
            error = Some(VmError::InvalidPc(current.pc));
            break;
        };
        tracer.on_instruction(current.pc, instr.op, current.operand_stack.len());

        let mut next = match step(program, current) {
            Ok(next) => next,
            Err(err) => {
                error = Some(err);
                break;
            }
        };

        let should_gc = limits.gc == GcPolicy::AfterReturnAndHalt
            && (instr.op == Opcode::Ret || instr.op == Opcode::Halt);
        if should_gc {
            gc::collect(&mut next);
        }

        notify_heap_delta(current, &next, tracer);
        states.push(next);
    }

    (Trace { states }, error)
}

fn notify_heap_delta(before: &VmState, after: &VmState, tracer: &mut impl VmTracer) {
    let before_addrs: BTreeSet<_> = before.heap.addresses().collect();
    let after_addrs: BTreeSet<_> = after.heap.addresses().collect();
    for addr in after_addrs.difference(&before_addrs) {
        tracer.on_allocated(*addr);
    }
    for addr in before_addrs.difference(&after_addrs) {
        tracer.on_collected(*addr);
    }
}
