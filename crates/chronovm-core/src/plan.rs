//! Projects insights into stable `{category, key, data}` tuples (spec.md
//! §4.7).
//!
//! New relative to the teacher; grounded on spec.md §4.7's fixed total
//! mapping. `data` carries whatever fields the source insight had, encoded
//! as JSON so a `Plan` stays a plain, category/key/data record regardless
//! of which insight produced it — this is the shape spec.md §6 describes
//! downstream consumers as expecting.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::insight::Insight;

/// One `(category, key, data)` projection (spec.md §4.7).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub category: &'static str,
    pub key: &'static str,
    pub data: Value,
}

fn to_plan(insight: &Insight) -> Plan {
    match insight {
        Insight::RepeatedRebinding { env, variable, count } => Plan {
            category: "PerformancePattern",
            key: "RepeatedRebinding",
            data: json!({ "env": env.to_string(), "variable": variable, "count": count }),
        },
        Insight::ObjectAllocatedAndCollected { address } => Plan {
            category: "MemoryLifecycle",
            key: "ShortLivedObject",
            data: json!({ "address": address.to_string() }),
        },
        Insight::ClosureRetainsEnvironment { function, environment } => Plan {
            category: "ClosureBehavior",
            key: "ClosureCapture",
            data: json!({ "function": function.to_string(), "environment": environment.to_string() }),
        },
        Insight::PropertyMutatedAfterAllocation { address, property } => Plan {
            category: "MutationPattern",
            key: "PostAllocationMutation",
            data: json!({ "address": address.to_string(), "property": property }),
        },
    }
}

/// `makePlans(insights) -> plans[]` (spec.md §4.7, §6). Sorted
/// lexicographically by `(category, key, serialised data)`.
#[must_use]
pub fn make_plans(insights: &[Insight]) -> Vec<Plan> {
    let mut plans: Vec<_> = insights.iter().map(to_plan).collect();
    plans.sort_by(|a, b| {
        a.category
            .cmp(b.category)
            .then_with(|| a.key.cmp(b.key))
            .then_with(|| a.data.to_string().cmp(&b.data.to_string()))
    });
    plans
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Address, EnvId};

    #[test]
    fn every_insight_kind_maps_to_its_fixed_category_and_key() {
        let insights = vec![
            Insight::RepeatedRebinding { env: EnvId(0), variable: "x".to_owned(), count: 2 },
            Insight::ObjectAllocatedAndCollected { address: Address(1) },
            Insight::ClosureRetainsEnvironment { function: Address(2), environment: EnvId(1) },
            Insight::PropertyMutatedAfterAllocation { address: Address(3), property: "a".to_owned() },
        ];
        let plans = make_plans(&insights);
        let pairs: Vec<_> = plans.iter().map(|p| (p.category, p.key)).collect();
        assert!(pairs.contains(&("PerformancePattern", "RepeatedRebinding")));
        assert!(pairs.contains(&("MemoryLifecycle", "ShortLivedObject")));
        assert!(pairs.contains(&("ClosureBehavior", "ClosureCapture")));
        assert!(pairs.contains(&("MutationPattern", "PostAllocationMutation")));
    }

    #[test]
    fn plans_are_sorted_by_category_then_key_then_data() {
        let insights = vec![
            Insight::ObjectAllocatedAndCollected { address: Address(9) },
            Insight::ClosureRetainsEnvironment { function: Address(2), environment: EnvId(1) },
        ];
        let plans = make_plans(&insights);
        let mut sorted = plans.clone();
        sorted.sort_by(|a, b| {
            a.category.cmp(b.category).then_with(|| a.key.cmp(b.key)).then_with(|| a.data.to_string().cmp(&b.data.to_string()))
        });
        assert_eq!(plans, sorted);
    }
}
