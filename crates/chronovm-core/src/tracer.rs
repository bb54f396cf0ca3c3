//! Execution observation hooks.
//!
//! Architecture copied directly from the teacher's `ouros/src/tracer.rs`:
//! a trait with default no-op methods, parameterized generically (not as a
//! trait object) so the production `NoopTracer` path monomorphizes away to
//! nothing. The hooks here are adapted to ChronoVM's micro-step shape
//! (spec.md §4.1, §4.8) rather than the teacher's byte-packed dispatch
//! loop, but the intent is identical: give embedders a way to watch
//! execution without the deterministic pipeline itself depending on, or
//! being affected by, what a tracer does with what it sees.

use crate::value::Address;
use crate::vm::Opcode;

/// One observed event, used by [`RecordingTracer`] for post-mortem
/// inspection. Never consumed by the deterministic pipeline itself —
/// `compress.rs` and `explain.rs` work from the `Trace`/`Event` types, not
/// from `TraceEvent`.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceEvent {
    Instruction { pc: usize, opcode: Opcode, stack_depth: usize },
    Allocated { addr: Address },
    Collected { addr: Address },
}

/// Trait for observing VM execution. All methods default to no-ops so
/// [`NoopTracer`] compiles to nothing once monomorphized.
pub trait VmTracer {
    #[inline(always)]
    fn on_instruction(&mut self, _pc: usize, _opcode: Opcode, _stack_depth: usize) {}

    #[inline(always)]
    fn on_allocated(&mut self, _addr: Address) {}

    #[inline(always)]
    fn on_collected(&mut self, _addr: Address) {}
}

/// Zero-cost production default.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTracer;

impl VmTracer for NoopTracer {}

/// Human-readable tracer for local debugging of embedding code. Writes to
/// stderr; never used by the deterministic pipeline and never affects its
/// output (spec.md §5 — the core exposes no shared handles and makes no
/// concurrency assumptions about callers, so this tracer is purely an
/// opt-in observational convenience).
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrTracer;

impl VmTracer for StderrTracer {
    fn on_instruction(&mut self, pc: usize, opcode: Opcode, stack_depth: usize) {
        eprintln!("pc={pc:<4} op={opcode:<14} stack_depth={stack_depth}");
    }

    fn on_allocated(&mut self, addr: Address) {
        eprintln!("  + {addr}");
    }

    fn on_collected(&mut self, addr: Address) {
        eprintln!("  - {addr}");
    }
}

/// Records every observed event for later inspection.
#[derive(Debug, Default, Clone)]
pub struct RecordingTracer {
    pub events: Vec<TraceEvent>,
}

impl VmTracer for RecordingTracer {
    fn on_instruction(&mut self, pc: usize, opcode: Opcode, stack_depth: usize) {
        self.events.push(TraceEvent::Instruction { pc, opcode, stack_depth });
    }

    fn on_allocated(&mut self, addr: Address) {
        self.events.push(TraceEvent::Allocated { addr });
    }

    fn on_collected(&mut self, addr: Address) {
        self.events.push(TraceEvent::Collected { addr });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_tracer_captures_instructions_in_order() {
        let mut tracer = RecordingTracer::default();
        tracer.on_instruction(0, Opcode::LoadConst, 0);
        tracer.on_instruction(1, Opcode::Halt, 1);
        assert_eq!(tracer.events.len(), 2);
    }
}
