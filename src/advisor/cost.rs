// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Monthly cost estimate from a profile's pricing and a project's usage.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::profiles::{PricingModel, UsageUnits};
use super::requirements::ProjectRequirements;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostEstimate {
    pub monthly: f64,
    pub yearly: f64,
    pub currency: String,
    /// Per-category monthly cost: auth, storage, functions, notifications
    /// (plus base when the plan has a fixed fee)
    pub breakdown: BTreeMap<String, f64>,
}

/// Usage in billing units. Every request is counted as one function call.
#[must_use]
pub fn usage_of(requirements: &ProjectRequirements) -> UsageUnits {
    UsageUnits {
        auth_users: requirements.users as f64,
        storage_gb: requirements.data_volume_gb,
        function_millions: requirements.traffic as f64 / 1_000_000.0,
        notification_thousands: requirements.notifications_per_month as f64 / 1000.0,
    }
}

fn billable(used: f64, free: f64, unit_cost: f64) -> f64 {
    (used - free).max(0.0) * unit_cost
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[must_use]
pub fn estimate_cost(pricing: &PricingModel, requirements: &ProjectRequirements) -> CostEstimate {
    let usage = usage_of(requirements);
    let free = pricing.free_tier;
    let unit = pricing.unit_costs;

    let mut breakdown = BTreeMap::new();
    breakdown.insert(
        "auth".to_string(),
        round_cents(billable(usage.auth_users, free.auth_users, unit.auth_users)),
    );
    breakdown.insert(
        "storage".to_string(),
        round_cents(billable(usage.storage_gb, free.storage_gb, unit.storage_gb)),
    );
    breakdown.insert(
        "functions".to_string(),
        round_cents(billable(usage.function_millions, free.function_millions, unit.function_millions)),
    );
    breakdown.insert(
        "notifications".to_string(),
        round_cents(billable(
            usage.notification_thousands,
            free.notification_thousands,
            unit.notification_thousands,
        )),
    );
    if pricing.base_monthly > 0.0 {
        breakdown.insert("base".to_string(), round_cents(pricing.base_monthly));
    }

    let monthly = round_cents(breakdown.values().sum());
    CostEstimate {
        monthly,
        yearly: round_cents(monthly * 12.0),
        currency: "USD".to_string(),
        breakdown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisor::profiles::PricingKind;

    fn pricing() -> PricingModel {
        PricingModel {
            model: PricingKind::Tiered,
            base_monthly: 0.0,
            free_tier: UsageUnits {
                auth_users: 1000.0,
                storage_gb: 1.0,
                function_millions: 1.0,
                notification_thousands: 0.0,
            },
            unit_costs: UsageUnits {
                auth_users: 0.01,
                storage_gb: 0.5,
                function_millions: 2.0,
                notification_thousands: 1.0,
            },
        }
    }

    #[test]
    fn test_free_tier_covers_small_usage() {
        let req = ProjectRequirements {
            users: 500,
            traffic: 50_000,
            ..Default::default()
        };
        let cost = estimate_cost(&pricing(), &req);
        assert_eq!(cost.monthly, 0.0);
        assert_eq!(cost.breakdown.len(), 4);
    }

    #[test]
    fn test_usage_above_allowance_is_billed() {
        let req = ProjectRequirements {
            users: 3000,
            traffic: 3_000_000,
            data_volume_gb: 11.0,
            notifications_per_month: 5000,
            ..Default::default()
        };
        let cost = estimate_cost(&pricing(), &req);

        assert_eq!(cost.breakdown["auth"], 20.0);
        assert_eq!(cost.breakdown["storage"], 5.0);
        assert_eq!(cost.breakdown["functions"], 4.0);
        assert_eq!(cost.breakdown["notifications"], 5.0);
        assert_eq!(cost.monthly, 34.0);
        assert_eq!(cost.yearly, 408.0);
        assert_eq!(cost.currency, "USD");
    }

    #[test]
    fn test_base_fee_is_its_own_line() {
        let mut pricing = pricing();
        pricing.base_monthly = 25.0;
        let cost = estimate_cost(&pricing, &ProjectRequirements::new(10));

        assert_eq!(cost.breakdown["base"], 25.0);
        assert_eq!(cost.monthly, 25.0);
    }
}
