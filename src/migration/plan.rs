// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Migration planning.
//!
//! A plan is an ordered list of steps between two backends, with an effort
//! rating, known risks and a rollback recipe. Plans are immutable once
//! created; execution results are reported separately by the executor.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::advisor::effort::{baseline_risks, migration_effort, pair_warnings, MigrationEffort};
use crate::provider::BackendKind;

pub const STEP_USERS: &str = "migrate-users";
pub const STEP_DATA: &str = "migrate-data";
pub const STEP_FILES: &str = "migrate-files";
pub const STEP_FUNCTIONS: &str = "migrate-functions";
pub const STEP_CONFIG: &str = "update-config";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("duplicate step '{0}'")]
    DuplicateStep(String),

    #[error("step '{step}' depends on '{dependency}', which is not an earlier step")]
    UnknownDependency { step: String, dependency: String },

    #[error("plan expects {expected} as the {role} backend, got {actual}")]
    BackendMismatch {
        role: &'static str,
        expected: BackendKind,
        actual: BackendKind,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationStep {
    pub name: String,
    pub description: String,
    /// Can run unattended
    pub automated: bool,
    pub estimated_time: String,
    /// Names of steps that must finish first
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// How to check the step succeeded
    pub validation: String,
}

impl MigrationStep {
    fn new(
        name: &str,
        description: impl Into<String>,
        automated: bool,
        estimated_time: &str,
        dependencies: &[&str],
        validation: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            description: description.into(),
            automated,
            estimated_time: estimated_time.to_string(),
            dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
            validation: validation.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationPlan {
    pub from_backend: BackendKind,
    pub to_backend: BackendKind,
    pub effort: MigrationEffort,
    /// Rough wall-clock estimate for the whole migration
    pub estimated_time: String,
    pub steps: Vec<MigrationStep>,
    pub risks: Vec<String>,
    pub rollback_plan: String,
}

impl MigrationPlan {
    /// Step names must be unique and every dependency must name an
    /// earlier step.
    pub fn validate(&self) -> Result<(), PlanError> {
        let mut earlier: HashSet<&str> = HashSet::with_capacity(self.steps.len());
        for step in &self.steps {
            if let Some(dependency) = step
                .dependencies
                .iter()
                .find(|d| !earlier.contains(d.as_str()))
            {
                return Err(PlanError::UnknownDependency {
                    step: step.name.clone(),
                    dependency: dependency.clone(),
                });
            }
            if !earlier.insert(step.name.as_str()) {
                return Err(PlanError::DuplicateStep(step.name.clone()));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn step(&self, name: &str) -> Option<&MigrationStep> {
        self.steps.iter().find(|s| s.name == name)
    }

    #[must_use]
    pub fn automated_steps(&self) -> usize {
        self.steps.iter().filter(|s| s.automated).count()
    }
}

/// Builds [`MigrationPlan`]s from the static effort matrix.
#[derive(Debug, Clone, Copy, Default)]
pub struct MigrationPlanner;

impl MigrationPlanner {
    pub fn new() -> Self {
        Self
    }

    #[must_use]
    pub fn create_plan(&self, from: BackendKind, to: BackendKind) -> MigrationPlan {
        let effort = migration_effort(from, to);

        let mut steps = vec![
            MigrationStep::new(
                STEP_USERS,
                format!("Export user accounts from {} and import them into {}, keeping password hashes where supported", from, to),
                true,
                "1-2 hours",
                &[],
                "User counts match and a sample of accounts can sign in on the target",
            ),
            MigrationStep::new(
                STEP_DATA,
                data_description(from, to),
                true,
                match effort {
                    MigrationEffort::Low => "2-4 hours",
                    MigrationEffort::Medium => "1-2 days",
                    MigrationEffort::High => "3-5 days",
                },
                &[],
                "Record counts match per collection and spot-checked records are identical",
            ),
            MigrationStep::new(
                STEP_FILES,
                format!("Copy stored files from {} to {} with their content types and metadata", from, to),
                true,
                "2-6 hours",
                &[],
                "File counts match and checksums of copied files are unchanged",
            ),
        ];

        if !from.is_local() && !to.is_local() {
            steps.push(MigrationStep::new(
                STEP_FUNCTIONS,
                format!("Port serverless functions and their triggers from {} to {}", from, to),
                false,
                "1-2 weeks",
                &[],
                "Each function returns the same output for a recorded set of inputs",
            ));
        }

        steps.push(MigrationStep::new(
            STEP_CONFIG,
            format!("Point application configuration at {} and retire {} credentials", to, from),
            false,
            "30 minutes",
            &[STEP_DATA, STEP_FILES],
            "Smoke tests pass against the new configuration",
        ));

        let mut risks = baseline_risks(from, to);
        risks.extend(pair_warnings(from, to));

        MigrationPlan {
            from_backend: from,
            to_backend: to,
            effort,
            estimated_time: match effort {
                MigrationEffort::Low => "1-3 days",
                MigrationEffort::Medium => "1-2 weeks",
                MigrationEffort::High => "3-6 weeks",
            }
            .to_string(),
            steps,
            risks,
            rollback_plan: rollback_plan(from, to),
        }
    }
}

fn data_description(from: BackendKind, to: BackendKind) -> String {
    use BackendKind::{Aws, Firebase, Local};

    match (from, to) {
        (Firebase | Local, Aws) => format!(
            "Flatten {} documents into relational rows on {}, one table per collection",
            from, to
        ),
        (Aws, Firebase | Local) => format!(
            "Denormalize {} tables into {} documents, embedding joined data where queries need it",
            from, to
        ),
        _ => format!("Copy every collection from {} to {} in batches, preserving record ids", from, to),
    }
}

fn rollback_plan(from: BackendKind, to: BackendKind) -> String {
    format!(
        "Keep {from} as the source of truth until every validation passes. \
         To roll back, point configuration back at {from}, replay any writes accepted by {to} \
         since cutover, then delete the migrated users, records and files from {to}."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(plan: &MigrationPlan) -> Vec<&str> {
        plan.steps.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn test_same_backend_plan() {
        let plan = MigrationPlanner::new().create_plan(BackendKind::Local, BackendKind::Local);

        assert_eq!(plan.effort, MigrationEffort::Low);
        assert_eq!(names(&plan), vec![STEP_USERS, STEP_DATA, STEP_FILES, STEP_CONFIG]);
        assert!(plan.step(STEP_FUNCTIONS).is_none());
        plan.validate().unwrap();
    }

    #[test]
    fn test_functions_step_only_between_cloud_backends() {
        let planner = MigrationPlanner::new();

        let cloud = planner.create_plan(BackendKind::Firebase, BackendKind::Aws);
        assert!(cloud.step(STEP_FUNCTIONS).is_some());
        assert!(!cloud.step(STEP_FUNCTIONS).unwrap().automated);

        let to_local = planner.create_plan(BackendKind::Aws, BackendKind::Local);
        assert!(to_local.step(STEP_FUNCTIONS).is_none());
    }

    #[test]
    fn test_config_update_is_last_and_waits_for_data_and_files() {
        let plan = MigrationPlanner::new().create_plan(BackendKind::Firebase, BackendKind::Aws);
        let last = plan.steps.last().unwrap();

        assert_eq!(last.name, STEP_CONFIG);
        assert_eq!(last.dependencies, vec![STEP_DATA.to_string(), STEP_FILES.to_string()]);
        plan.validate().unwrap();
    }

    #[test]
    fn test_risks_include_pair_warnings() {
        let planner = MigrationPlanner::new();

        let down = planner.create_plan(BackendKind::Aws, BackendKind::Firebase);
        assert_eq!(down.effort, MigrationEffort::High);
        assert!(down.risks.iter().any(|r| r.contains("Complex queries")));

        let up = planner.create_plan(BackendKind::Firebase, BackendKind::Aws);
        assert!(up.risks.iter().any(|r| r.contains("Offline sync")));
    }

    #[test]
    fn test_validate_rejects_forward_dependencies() {
        let mut plan = MigrationPlanner::new().create_plan(BackendKind::Local, BackendKind::Local);
        plan.steps[0].dependencies.push(STEP_CONFIG.to_string());

        assert_eq!(
            plan.validate(),
            Err(PlanError::UnknownDependency {
                step: STEP_USERS.to_string(),
                dependency: STEP_CONFIG.to_string(),
            })
        );
    }

    #[test]
    fn test_validate_rejects_duplicate_steps() {
        let mut plan = MigrationPlanner::new().create_plan(BackendKind::Local, BackendKind::Local);
        let copy = plan.steps[0].clone();
        plan.steps.push(copy);

        assert_eq!(plan.validate(), Err(PlanError::DuplicateStep(STEP_USERS.to_string())));
    }

    #[test]
    fn test_plan_serializes_camel_case() {
        let plan = MigrationPlanner::new().create_plan(BackendKind::Firebase, BackendKind::Local);
        let json = serde_json::to_value(&plan).unwrap();

        assert_eq!(json["fromBackend"], "firebase");
        assert_eq!(json["toBackend"], "local");
        assert_eq!(json["effort"], "low");
        assert!(json["steps"][0].get("estimatedTime").is_some());
        assert!(json.get("rollbackPlan").is_some());

        let back: MigrationPlan = serde_json::from_value(json).unwrap();
        assert_eq!(back, plan);
    }
}
