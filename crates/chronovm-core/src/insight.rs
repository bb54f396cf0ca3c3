//! Pattern detection over an event list (spec.md §4.6).
//!
//! New relative to the teacher; grounded on spec.md §4.6's four fixed
//! patterns. Each pattern is a pure fold over the event list — no pattern
//! looks outside the events it's given, so `analyse` composes cleanly with
//! any window of a trace's events (spec.md §6's `analyseStep`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    explain::Event,
    value::{Address, EnvId},
};

/// Every pattern named in spec.md §4.6.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Insight {
    RepeatedRebinding { env: EnvId, variable: String, count: usize },
    ObjectAllocatedAndCollected { address: Address },
    ClosureRetainsEnvironment { function: Address, environment: EnvId },
    PropertyMutatedAfterAllocation { address: Address, property: String },
}

impl Insight {
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::RepeatedRebinding { .. } => "RepeatedRebinding",
            Self::ObjectAllocatedAndCollected { .. } => "ObjectAllocatedAndCollected",
            Self::ClosureRetainsEnvironment { .. } => "ClosureRetainsEnvironment",
            Self::PropertyMutatedAfterAllocation { .. } => "PropertyMutatedAfterAllocation",
        }
    }

    fn canonical_payload(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// `analyseEvents(events) -> insights[]` (spec.md §4.6, §6). Sorted by kind
/// then by canonical payload serialisation, same discipline as
/// [`crate::explain::explain_diff`].
#[must_use]
pub fn analyse(events: &[Event]) -> Vec<Insight> {
    let mut insights = Vec::new();

    let mut rebind_counts: BTreeMap<(EnvId, String), usize> = BTreeMap::new();
    for event in events {
        if let Event::VariableRebound { env, name, .. } = event {
            *rebind_counts.entry((*env, name.clone())).or_insert(0) += 1;
        }
    }
    for ((env, variable), count) in rebind_counts {
        if count > 1 {
            insights.push(Insight::RepeatedRebinding { env, variable, count });
        }
    }

    let allocated: std::collections::BTreeSet<Address> = events
        .iter()
        .filter_map(|e| if let Event::ObjectAllocated { address, .. } = e { Some(*address) } else { None })
        .collect();
    let collected: std::collections::BTreeSet<Address> = events
        .iter()
        .filter_map(|e| if let Event::ObjectCollected { address, .. } = e { Some(*address) } else { None })
        .collect();
    for address in allocated.intersection(&collected) {
        insights.push(Insight::ObjectAllocatedAndCollected { address: *address });
    }

    for event in events {
        if let Event::ClosureCaptured { function, environment } = event {
            insights.push(Insight::ClosureRetainsEnvironment { function: *function, environment: *environment });
        }
    }

    let mut mutated: std::collections::BTreeSet<(Address, String)> = std::collections::BTreeSet::new();
    for event in events {
        let (address, property) = match event {
            Event::PropertyAdded { object, property } | Event::PropertyChanged { object, property } => {
                (*object, property.clone())
            }
            _ => continue,
        };
        if allocated.contains(&address) {
            mutated.insert((address, property));
        }
    }
    for (address, property) in mutated {
        insights.push(Insight::PropertyMutatedAfterAllocation { address, property });
    }

    insights.sort_by(|a, b| a.kind_name().cmp(b.kind_name()).then_with(|| a.canonical_payload().cmp(&b.canonical_payload())));
    insights
}
