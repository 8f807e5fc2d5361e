// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Backend recommendation.
//!
//! Every profile is scored against the project's requirements and the
//! results are ranked best first. Scoring is pure: the same profiles and
//! requirements always give the same ranking.
//!
//! # Scoring
//!
//! | Rule | Adjustment |
//! |------|------------|
//! | Start | 50 |
//! | Project type is typical for the backend | +10 |
//! | User count in the backend's scale tier / one tier off | +20 / +10 |
//! | Each required feature supported / missing | +5 / −10 |
//! | Each required certification held / missing | +10 / −20 |
//! | Estimated cost within budget / over double budget | +10 / −20 |
//! | A preferred region is covered | +5 |
//!
//! The result is clamped to 0..=100.
//!
//! # Example
//!
//! ```
//! use backend_bridge::advisor::{Feature, ProjectRequirements, ProviderAdvisor};
//! use backend_bridge::provider::BackendKind;
//!
//! let advisor = ProviderAdvisor::builtin().unwrap();
//! let requirements = ProjectRequirements::new(500).require(Feature::Realtime);
//!
//! let ranked = advisor.recommend(&requirements);
//! assert_eq!(ranked[0].backend, BackendKind::Firebase);
//! ```

pub mod cost;
pub mod effort;
pub mod profiles;
pub mod requirements;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use cost::{estimate_cost, CostEstimate};
pub use effort::{migration_effort, MigrationEffort};
pub use profiles::{
    builtin_profiles, load_profiles, CapabilityProfile, DatabaseModel, PricingKind, PricingModel,
    ScaleTier, UsageUnits,
};
pub use requirements::{Feature, ProjectRequirements};

use crate::config::ConfigError;
use crate::provider::BackendKind;

const BASE_SCORE: i32 = 50;
/// How many other backends each recommendation lists as alternatives.
const MAX_ALTERNATIVES: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alternative {
    pub backend: BackendKind,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub backend: BackendKind,
    /// 0..=100
    pub score: u8,
    pub reasoning: Vec<String>,
    pub pros: Vec<String>,
    pub cons: Vec<String>,
    pub estimated_cost: CostEstimate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migration_effort: Option<MigrationEffort>,
    pub alternatives: Vec<Alternative>,
}

pub struct ProviderAdvisor {
    profiles: Vec<CapabilityProfile>,
}

impl ProviderAdvisor {
    pub fn new(profiles: Vec<CapabilityProfile>) -> Self {
        Self { profiles }
    }

    /// Advisor over the profiles compiled into the crate.
    pub fn builtin() -> Result<Self, ConfigError> {
        Ok(Self::new(builtin_profiles()?))
    }

    #[must_use]
    pub fn profiles(&self) -> &[CapabilityProfile] {
        &self.profiles
    }

    /// One recommendation per profile, highest score first.
    ///
    /// Ties keep the backend order of [`BackendKind`].
    pub fn recommend(&self, requirements: &ProjectRequirements) -> Vec<Recommendation> {
        let mut ranked: Vec<Recommendation> = self
            .profiles
            .iter()
            .map(|profile| {
                let estimated_cost = estimate_cost(&profile.pricing, requirements);
                let (score, reasoning) = score_profile(profile, requirements, &estimated_cost);
                debug!(backend = %profile.backend, score, "Scored backend");

                Recommendation {
                    backend: profile.backend,
                    score,
                    reasoning,
                    pros: profile.pros.clone(),
                    cons: profile.cons.clone(),
                    estimated_cost,
                    migration_effort: requirements
                        .existing_backend
                        .map(|from| migration_effort(from, profile.backend)),
                    alternatives: Vec::new(),
                }
            })
            .collect();

        ranked.sort_by(|a, b| b.score.cmp(&a.score).then(a.backend.cmp(&b.backend)));

        let summary: Vec<(BackendKind, u8, Option<String>)> = ranked
            .iter()
            .map(|r| (r.backend, r.score, r.pros.first().cloned()))
            .collect();
        for recommendation in &mut ranked {
            recommendation.alternatives = summary
                .iter()
                .filter(|(backend, _, _)| *backend != recommendation.backend)
                .take(MAX_ALTERNATIVES)
                .map(|(backend, score, pro)| Alternative {
                    backend: *backend,
                    reason: match pro {
                        Some(pro) => format!("Scores {}: {}", score, pro),
                        None => format!("Scores {}", score),
                    },
                })
                .collect();
        }

        ranked
    }
}

/// Score one profile. Returns the clamped score and one line of reasoning
/// per adjustment made.
pub fn score_profile(
    profile: &CapabilityProfile,
    requirements: &ProjectRequirements,
    estimated_cost: &CostEstimate,
) -> (u8, Vec<String>) {
    let mut score = BASE_SCORE;
    let mut reasoning = Vec::new();

    if let Some(project_type) = &requirements.project_type {
        if profile
            .project_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(project_type))
        {
            score += 10;
            reasoning.push(format!("Well suited to {} projects", project_type));
        }
    }

    let tier = ScaleTier::for_users(requirements.users);
    match tier.distance(profile.scale) {
        0 => {
            score += 20;
            reasoning.push(format!("{} users is this backend's sweet spot", requirements.users));
        }
        1 => {
            score += 10;
            reasoning.push(format!("{} users is close to this backend's typical scale", requirements.users));
        }
        _ => {}
    }

    for feature in requirements.required_features() {
        if profile.supports(feature) {
            score += 5;
            reasoning.push(format!("Supports {}", feature.as_str()));
        } else {
            score -= 10;
            reasoning.push(format!("Missing {}", feature.as_str()));
        }
    }

    for certification in &requirements.compliance {
        if profile.is_certified(certification) {
            score += 10;
            reasoning.push(format!("{} certified", certification));
        } else {
            score -= 20;
            reasoning.push(format!("Not {} certified", certification));
        }
    }

    if let Some(budget) = requirements.budget {
        if estimated_cost.monthly <= budget {
            score += 10;
            reasoning.push(format!(
                "Estimated ${:.2}/month fits the ${:.2} budget",
                estimated_cost.monthly, budget
            ));
        } else if estimated_cost.monthly > budget * 2.0 {
            score -= 20;
            reasoning.push(format!(
                "Estimated ${:.2}/month is more than double the ${:.2} budget",
                estimated_cost.monthly, budget
            ));
        }
    }

    if requirements
        .preferred_regions
        .iter()
        .any(|region| profile.covers_region(region))
    {
        score += 5;
        reasoning.push("Available in a preferred region".to_string());
    }

    (score.clamp(0, 100) as u8, reasoning)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn advisor() -> ProviderAdvisor {
        ProviderAdvisor::builtin().unwrap()
    }

    fn find(ranked: &[Recommendation], backend: BackendKind) -> &Recommendation {
        ranked.iter().find(|r| r.backend == backend).unwrap()
    }

    #[test]
    fn test_small_realtime_project_prefers_document_backend() {
        let req: ProjectRequirements = serde_json::from_str(
            r#"{"users": 500, "traffic": "50000", "features": {"realtime": true}, "compliance": []}"#,
        )
        .unwrap();
        let ranked = advisor().recommend(&req);

        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].backend, BackendKind::Firebase);
        assert!(find(&ranked, BackendKind::Firebase).score > find(&ranked, BackendKind::Aws).score);
        assert_eq!(ranked[0].estimated_cost.monthly, 0.0);
    }

    #[test]
    fn test_compliance_gap_outweighs_features() {
        let req = ProjectRequirements {
            compliance: vec!["HIPAA".into()],
            ..ProjectRequirements::new(500_000).require(Feature::SqlQueries)
        };
        let ranked = advisor().recommend(&req);

        assert_eq!(ranked[0].backend, BackendKind::Aws);
        assert!(ranked[0].reasoning.iter().any(|r| r == "HIPAA certified"));
        let firebase = find(&ranked, BackendKind::Firebase);
        assert!(firebase.reasoning.iter().any(|r| r == "Not HIPAA certified"));
    }

    #[test]
    fn test_scores_are_clamped() {
        let req = ProjectRequirements {
            compliance: vec!["A".into(), "B".into(), "C".into()],
            ..ProjectRequirements::new(5_000_000)
                .require(Feature::SqlQueries)
                .require(Feature::FullTextSearch)
        };
        let ranked = advisor().recommend(&req);
        assert_eq!(find(&ranked, BackendKind::Local).score, 0);
    }

    #[test]
    fn test_budget_adjustments() {
        let within = ProjectRequirements {
            budget: Some(100.0),
            ..ProjectRequirements::new(500)
        };
        let aws = find(&advisor().recommend(&within), BackendKind::Aws).clone();
        assert!(aws.reasoning.iter().any(|r| r.contains("fits")));

        let tight = ProjectRequirements {
            budget: Some(10.0),
            ..ProjectRequirements::new(500)
        };
        let aws_tight = find(&advisor().recommend(&tight), BackendKind::Aws).clone();
        assert!(aws_tight.reasoning.iter().any(|r| r.contains("more than double")));
        assert_eq!(aws.score - aws_tight.score, 30);
    }

    #[test]
    fn test_migration_effort_only_when_migrating() {
        let fresh = advisor().recommend(&ProjectRequirements::new(500));
        assert!(fresh.iter().all(|r| r.migration_effort.is_none()));

        let req = ProjectRequirements {
            existing_backend: Some(BackendKind::Firebase),
            ..ProjectRequirements::new(500)
        };
        let ranked = advisor().recommend(&req);
        assert_eq!(find(&ranked, BackendKind::Firebase).migration_effort, Some(MigrationEffort::Low));
        assert_eq!(find(&ranked, BackendKind::Aws).migration_effort, Some(MigrationEffort::High));
    }

    #[test]
    fn test_alternatives_name_other_backends() {
        let ranked = advisor().recommend(&ProjectRequirements::new(500));
        for recommendation in &ranked {
            assert_eq!(recommendation.alternatives.len(), 2);
            assert!(recommendation
                .alternatives
                .iter()
                .all(|a| a.backend != recommendation.backend));
        }
    }

    #[test]
    fn test_recommendation_serializes_camel_case() {
        let ranked = advisor().recommend(&ProjectRequirements::new(500));
        let json = serde_json::to_value(&ranked[0]).unwrap();

        assert!(json.get("estimatedCost").is_some());
        assert!(json["estimatedCost"].get("breakdown").is_some());
        assert!(json.get("migrationEffort").is_none());
    }
}
