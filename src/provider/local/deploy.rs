// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Local deployment history. At most one deployment per service is live.

use async_trait::async_trait;
use tracing::info;

use super::{new_id, require_non_empty, LocalBackend};
use crate::provider::traits::{DeploymentProvider, ProviderError, ProviderResult};
use crate::provider::types::{
    now_millis, Deployment, DeploymentRequest, DeploymentStatus, Operation,
};

#[derive(Debug, Clone)]
pub(super) struct DeploymentEntry {
    deployment: Deployment,
    logs: Vec<String>,
}

impl DeploymentEntry {
    fn transition(&mut self, status: DeploymentStatus) {
        self.logs.push(format!(
            "{} status {:?} -> {:?}",
            now_millis(),
            self.deployment.status,
            status
        ));
        self.deployment.status = status;
    }
}

fn find_mut<'a>(entries: &'a mut [DeploymentEntry], id: &str) -> ProviderResult<&'a mut DeploymentEntry> {
    entries
        .iter_mut()
        .find(|e| e.deployment.id == id)
        .ok_or_else(|| ProviderError::not_found(format!("deployment '{}'", id)))
}

#[async_trait]
impl DeploymentProvider for LocalBackend {
    async fn deploy(&self, request: &DeploymentRequest) -> ProviderResult<Deployment> {
        self.enter(Operation::Deploy)?;
        require_non_empty("service", &request.service)?;
        require_non_empty("version", &request.version)?;
        require_non_empty("artifact", &request.artifact)?;

        let mut entries = self.deployments.lock();
        for entry in entries.iter_mut().filter(|e| {
            e.deployment.service == request.service && e.deployment.status == DeploymentStatus::Live
        }) {
            entry.transition(DeploymentStatus::Superseded);
        }

        let mut entry = DeploymentEntry {
            deployment: Deployment {
                id: new_id(),
                service: request.service.clone(),
                version: request.version.clone(),
                artifact: request.artifact.clone(),
                status: DeploymentStatus::Pending,
                created_at: now_millis(),
            },
            logs: vec![format!(
                "{} deploying {} {} from {}",
                now_millis(),
                request.service,
                request.version,
                request.artifact
            )],
        };
        entry.transition(DeploymentStatus::Live);
        info!(service = %request.service, version = %request.version, "Local deployment live");

        let deployment = entry.deployment.clone();
        entries.push(entry);
        Ok(deployment)
    }

    async fn deployment_status(&self, deployment_id: &str) -> ProviderResult<DeploymentStatus> {
        self.enter(Operation::DeploymentStatus)?;
        let mut entries = self.deployments.lock();
        Ok(find_mut(&mut entries, deployment_id)?.deployment.status)
    }

    async fn rollback(&self, service: &str) -> ProviderResult<Deployment> {
        self.enter(Operation::Rollback)?;

        let mut entries = self.deployments.lock();
        let live = entries
            .iter()
            .rposition(|e| e.deployment.service == service && e.deployment.status == DeploymentStatus::Live)
            .ok_or_else(|| ProviderError::not_found(format!("live deployment of '{}'", service)))?;
        let previous = entries
            .iter()
            .rposition(|e| {
                e.deployment.service == service && e.deployment.status == DeploymentStatus::Superseded
            })
            .ok_or_else(|| {
                ProviderError::invalid_argument(format!("'{}' has no earlier deployment", service))
            })?;

        entries[live].transition(DeploymentStatus::RolledBack);
        entries[previous].transition(DeploymentStatus::Live);
        info!(service, version = %entries[previous].deployment.version, "Rolled back local deployment");
        Ok(entries[previous].deployment.clone())
    }

    async fn deployment_logs(&self, deployment_id: &str) -> ProviderResult<Vec<String>> {
        self.enter(Operation::DeploymentLogs)?;
        let mut entries = self.deployments.lock();
        Ok(find_mut(&mut entries, deployment_id)?.logs.clone())
    }

    async fn delete_deployment(&self, deployment_id: &str) -> ProviderResult<()> {
        self.enter(Operation::DeleteDeployment)?;
        let mut entries = self.deployments.lock();
        find_mut(&mut entries, deployment_id)?.transition(DeploymentStatus::Deleted);
        Ok(())
    }
}
