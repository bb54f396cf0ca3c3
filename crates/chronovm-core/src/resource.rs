//! Execution limits and GC scheduling policy.
//!
//! Grounded on the teacher's `ouros/src/resource.rs` `ResourceTracker`
//! pattern — an explicit, per-call configuration value rather than global
//! state (spec.md §9: "no module-level singletons"). ChronoVM needs far
//! less of the teacher's machinery (no wall-clock/memory tracking is
//! permitted at all — spec.md §5 requires the step count to be the *only*
//! timeout), so this is a small, from-scratch struct rather than a trimmed
//! copy of `ResourceTracker`.

use serde::{Deserialize, Serialize};

/// Caps and GC scheduling for a single `run_to_halt` call.
///
/// The step cap is spec.md §5's "only timeout in the system": it is
/// step-counted, never wall-clock. `Default` matches the recommended
/// default of 5 000 named there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLimits {
    pub max_steps: usize,
    pub gc: GcPolicy,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self { max_steps: 5_000, gc: GcPolicy::Disabled }
    }
}

impl RunLimits {
    #[must_use]
    pub fn with_max_steps(max_steps: usize) -> Self {
        Self { max_steps, ..Self::default() }
    }

    #[must_use]
    pub fn with_gc(gc: GcPolicy) -> Self {
        Self { gc, ..Self::default() }
    }
}

/// When the deterministic mark-sweep GC (spec.md §4.1) runs.
///
/// Both variants are fixed program points, never triggered by time, memory
/// pressure, or any other non-deterministic signal (spec.md §4.1, §5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GcPolicy {
    /// Never collect; heap entries are retained forever (the default —
    /// spec.md §4.1's "otherwise retained forever").
    Disabled,
    /// Collect immediately after every `RET` and after `HALT`.
    AfterReturnAndHalt,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_spec_recommendation() {
        assert_eq!(RunLimits::default().max_steps, 5_000);
        assert_eq!(RunLimits::default().gc, GcPolicy::Disabled);
    }
}
