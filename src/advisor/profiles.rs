// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Capability profiles: static feature, pricing and compliance data per backend.
//!
//! The built-in set is compiled in from `profiles.json` and validated when
//! loaded. Callers may supply their own profiles instead.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::requirements::Feature;
use crate::config::ConfigError;
use crate::provider::BackendKind;

const BUILTIN_PROFILES: &str = include_str!("profiles.json");

/// Scale band a backend is most comfortable in, by monthly active users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleTier {
    /// Up to 100 users
    Prototype,
    /// Up to 10k
    Small,
    /// Up to 100k
    Medium,
    /// Up to 1M
    Large,
    Enterprise,
}

impl ScaleTier {
    #[must_use]
    pub fn for_users(users: u64) -> Self {
        match users {
            0..=100 => Self::Prototype,
            101..=10_000 => Self::Small,
            10_001..=100_000 => Self::Medium,
            100_001..=1_000_000 => Self::Large,
            _ => Self::Enterprise,
        }
    }

    /// How many bands apart two tiers are.
    #[must_use]
    pub fn distance(self, other: Self) -> u32 {
        (self as i32 - other as i32).unsigned_abs()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseModel {
    Document,
    Relational,
    KeyValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PricingKind {
    Free,
    PayAsYouGo,
    Tiered,
}

/// Usage figures in billing units. Used both for free-tier allowances and
/// for per-unit prices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageUnits {
    /// Monthly active users
    pub auth_users: f64,
    pub storage_gb: f64,
    /// Millions of function invocations
    pub function_millions: f64,
    /// Thousands of notifications
    pub notification_thousands: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingModel {
    pub model: PricingKind,
    /// Fixed monthly cost before any usage
    #[serde(default)]
    pub base_monthly: f64,
    #[serde(default)]
    pub free_tier: UsageUnits,
    pub unit_costs: UsageUnits,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityProfile {
    pub backend: BackendKind,
    pub display_name: String,
    /// Project types this backend typically serves
    #[serde(default)]
    pub project_types: Vec<String>,
    /// Scale sweet spot
    pub scale: ScaleTier,
    #[serde(default)]
    pub auth_methods: Vec<String>,
    pub database_model: DatabaseModel,
    #[serde(default)]
    pub realtime_protocol: Option<String>,
    #[serde(default)]
    pub function_runtimes: Vec<String>,
    /// Features not implied by the fields above
    #[serde(default)]
    pub extra_features: BTreeSet<Feature>,
    pub pricing: PricingModel,
    #[serde(default)]
    pub compliance: BTreeSet<String>,
    #[serde(default)]
    pub regions: BTreeSet<String>,
    #[serde(default)]
    pub pros: Vec<String>,
    #[serde(default)]
    pub cons: Vec<String>,
}

impl CapabilityProfile {
    #[must_use]
    pub fn supports(&self, feature: Feature) -> bool {
        match feature {
            Feature::Auth => !self.auth_methods.is_empty(),
            Feature::Database => true,
            Feature::SqlQueries => self.database_model == DatabaseModel::Relational,
            Feature::Realtime => self.realtime_protocol.is_some(),
            Feature::Functions => !self.function_runtimes.is_empty(),
            other => self.extra_features.contains(&other),
        }
    }

    /// Certification lookup, case-insensitive.
    #[must_use]
    pub fn is_certified(&self, certification: &str) -> bool {
        self.compliance
            .iter()
            .any(|c| c.eq_ignore_ascii_case(certification))
    }

    #[must_use]
    pub fn covers_region(&self, region: &str) -> bool {
        self.regions.iter().any(|r| r.eq_ignore_ascii_case(region))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let name = self.backend.as_str().to_string();
        let units = [self.pricing.free_tier, self.pricing.unit_costs];
        let negative = units.iter().any(|u| {
            u.auth_users < 0.0
                || u.storage_gb < 0.0
                || u.function_millions < 0.0
                || u.notification_thousands < 0.0
        });
        if negative || self.pricing.base_monthly < 0.0 {
            return Err(ConfigError::Profile {
                name,
                reason: "pricing figures must not be negative".into(),
            });
        }
        if self.display_name.trim().is_empty() {
            return Err(ConfigError::Profile {
                name,
                reason: "display name is empty".into(),
            });
        }
        Ok(())
    }
}

/// Parse and validate a JSON array of profiles. Backends must be unique.
pub fn load_profiles(json: &str) -> Result<Vec<CapabilityProfile>, ConfigError> {
    let profiles: Vec<CapabilityProfile> = serde_json::from_str(json)?;

    let mut seen = BTreeSet::new();
    for profile in &profiles {
        profile.validate()?;
        if !seen.insert(profile.backend) {
            return Err(ConfigError::Profile {
                name: profile.backend.as_str().to_string(),
                reason: "duplicate profile for backend".into(),
            });
        }
    }
    Ok(profiles)
}

/// The profiles compiled into the crate.
pub fn builtin_profiles() -> Result<Vec<CapabilityProfile>, ConfigError> {
    load_profiles(BUILTIN_PROFILES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_profiles_load() {
        let profiles = builtin_profiles().unwrap();
        let kinds: Vec<BackendKind> = profiles.iter().map(|p| p.backend).collect();
        assert_eq!(kinds, vec![BackendKind::Firebase, BackendKind::Aws, BackendKind::Local]);
    }

    #[test]
    fn test_feature_support_derives_from_fields() {
        let profiles = builtin_profiles().unwrap();
        let aws = profiles.iter().find(|p| p.backend == BackendKind::Aws).unwrap();
        let firebase = profiles.iter().find(|p| p.backend == BackendKind::Firebase).unwrap();

        assert!(aws.supports(Feature::SqlQueries));
        assert!(!firebase.supports(Feature::SqlQueries));
        assert!(firebase.supports(Feature::OfflineSync));
        assert!(firebase.supports(Feature::Realtime));
        assert!(aws.is_certified("hipaa"));
        assert!(!firebase.is_certified("HIPAA"));
    }

    #[test]
    fn test_scale_tiers() {
        assert_eq!(ScaleTier::for_users(50), ScaleTier::Prototype);
        assert_eq!(ScaleTier::for_users(500), ScaleTier::Small);
        assert_eq!(ScaleTier::for_users(2_000_000), ScaleTier::Enterprise);
        assert_eq!(ScaleTier::Small.distance(ScaleTier::Enterprise), 3);
        assert_eq!(ScaleTier::Large.distance(ScaleTier::Large), 0);
    }

    #[test]
    fn test_duplicate_backends_rejected() {
        let one = serde_json::to_value(&builtin_profiles().unwrap()[0]).unwrap();
        let json = serde_json::to_string(&vec![one.clone(), one]).unwrap();

        let err = load_profiles(&json).unwrap_err();
        assert!(matches!(err, ConfigError::Profile { .. }));
    }

    #[test]
    fn test_negative_pricing_rejected() {
        let mut profile = builtin_profiles().unwrap().remove(0);
        profile.pricing.unit_costs.storage_gb = -1.0;
        let json = serde_json::to_string(&vec![profile]).unwrap();

        assert!(load_profiles(&json).is_err());
    }
}
