// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! What a project needs from a backend.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use crate::provider::BackendKind;

/// Capabilities a project can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Feature {
    Auth,
    Database,
    SqlQueries,
    Storage,
    Realtime,
    Functions,
    Notifications,
    OfflineSync,
    FullTextSearch,
    Analytics,
}

impl Feature {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Database => "database",
            Self::SqlQueries => "sqlQueries",
            Self::Storage => "storage",
            Self::Realtime => "realtime",
            Self::Functions => "functions",
            Self::Notifications => "notifications",
            Self::OfflineSync => "offlineSync",
            Self::FullTextSearch => "fullTextSearch",
            Self::Analytics => "analytics",
        }
    }
}

/// Caller-supplied description of the project being placed.
///
/// # Example
///
/// ```
/// use backend_bridge::advisor::{Feature, ProjectRequirements};
///
/// let req: ProjectRequirements = serde_json::from_str(r#"{
///     "users": 500,
///     "traffic": "50000",
///     "features": { "realtime": true },
///     "compliance": []
/// }"#).unwrap();
/// assert_eq!(req.traffic, 50_000);
/// assert_eq!(req.required_features(), vec![Feature::Realtime]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRequirements {
    /// Expected monthly active users
    #[serde(alias = "expectedUsers")]
    pub users: u64,

    /// Expected requests per month. Accepts a number or a numeric string.
    #[serde(default, deserialize_with = "number_or_string")]
    pub traffic: u64,

    /// Stored data in GB
    #[serde(default)]
    pub data_volume_gb: f64,

    /// Notifications sent per month
    #[serde(default)]
    pub notifications_per_month: u64,

    /// Features the project needs (`true`) or explicitly doesn't (`false`)
    #[serde(default)]
    pub features: BTreeMap<Feature, bool>,

    /// Required certifications (e.g., "SOC2", "HIPAA")
    #[serde(default)]
    pub compliance: Vec<String>,

    /// Monthly budget in USD
    #[serde(default)]
    pub budget: Option<f64>,

    #[serde(default)]
    pub preferred_regions: Vec<String>,

    /// Backend the project runs on today, if migrating
    #[serde(default)]
    pub existing_backend: Option<BackendKind>,

    /// Free-form project type (e.g., "mobile", "web", "enterprise")
    #[serde(default)]
    pub project_type: Option<String>,
}

impl ProjectRequirements {
    pub fn new(users: u64) -> Self {
        Self {
            users,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn require(mut self, feature: Feature) -> Self {
        self.features.insert(feature, true);
        self
    }

    /// Features asked for, in a stable order.
    #[must_use]
    pub fn required_features(&self) -> Vec<Feature> {
        self.features
            .iter()
            .filter(|(_, wanted)| **wanted)
            .map(|(feature, _)| *feature)
            .collect()
    }
}

fn number_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s
            .trim()
            .replace(['_', ','], "")
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("traffic '{}' is not a number", s))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_traffic_accepts_numbers_and_strings() {
        let numeric: ProjectRequirements = serde_json::from_str(r#"{"users": 1, "traffic": 1200}"#).unwrap();
        assert_eq!(numeric.traffic, 1200);

        let text: ProjectRequirements =
            serde_json::from_str(r#"{"users": 1, "traffic": "1,000,000"}"#).unwrap();
        assert_eq!(text.traffic, 1_000_000);

        let bad = serde_json::from_str::<ProjectRequirements>(r#"{"users": 1, "traffic": "lots"}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_false_features_are_not_required() {
        let req: ProjectRequirements = serde_json::from_str(
            r#"{"users": 10, "features": {"realtime": true, "sqlQueries": false, "auth": true}}"#,
        )
        .unwrap();
        assert_eq!(req.required_features(), vec![Feature::Auth, Feature::Realtime]);
    }

    #[test]
    fn test_builder() {
        let req = ProjectRequirements::new(100).require(Feature::Storage);
        assert_eq!(req.users, 100);
        assert_eq!(req.required_features(), vec![Feature::Storage]);
    }
}
