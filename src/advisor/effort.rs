// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Static migration effort matrix, shared by the advisor and the planner.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::provider::BackendKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationEffort {
    Low,
    Medium,
    High,
}

impl MigrationEffort {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for MigrationEffort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Effort of moving a project from `from` to `to`. Same backend is always low.
#[must_use]
pub fn migration_effort(from: BackendKind, to: BackendKind) -> MigrationEffort {
    use BackendKind::{Aws, Firebase, Local};

    match (from, to) {
        (a, b) if a == b => MigrationEffort::Low,
        // Local mode mirrors the document model
        (Local, Firebase) | (Firebase, Local) => MigrationEffort::Low,
        (Local, Aws) | (Aws, Local) => MigrationEffort::Medium,
        (Firebase, Aws) | (Aws, Firebase) => MigrationEffort::High,
        _ => MigrationEffort::High,
    }
}

/// Risks every migration between `from` and `to` carries, before any
/// pair-specific warnings.
#[must_use]
pub fn baseline_risks(from: BackendKind, to: BackendKind) -> Vec<String> {
    if from == to {
        return vec!["Data written during the migration window may be missed".to_string()];
    }

    let mut risks = vec![
        "Data written during the migration window may be missed".to_string(),
        "Users must re-authenticate after the switch".to_string(),
    ];
    if migration_effort(from, to) >= MigrationEffort::Medium {
        risks.push("Security rules and access policies must be rewritten by hand".to_string());
    }
    if migration_effort(from, to) == MigrationEffort::High {
        risks.push("Vendor-specific SDK calls in client code must be replaced".to_string());
    }
    risks
}

/// Warnings that only apply to a particular direction of travel.
#[must_use]
pub fn pair_warnings(from: BackendKind, to: BackendKind) -> Vec<String> {
    use BackendKind::{Aws, Firebase, Local};

    match (from, to) {
        (Aws, Firebase) | (Aws, Local) => vec![
            "Complex queries may need redesign for a document database".to_string(),
            "Joins and multi-table transactions have no direct equivalent".to_string(),
        ],
        (Firebase, Aws) | (Local, Aws) => vec![
            "Offline sync needs custom implementation".to_string(),
            "Realtime listeners must be rebuilt on a separate pub/sub service".to_string(),
        ],
        (Firebase, Local) => vec!["Local mode has no delivery for email, SMS or push".to_string()],
        _ => Vec::new(),
    }
}
