// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Migration execution against two live providers.
//!
//! Users, data and files are independent sub-tasks. Each one pages through
//! the source in batches, writes to the target and accumulates its own
//! success count and error list. Nothing is rolled back automatically: a
//! failed run returns the partial counts together with the plan's rollback
//! recipe.
//!
//! Cancellation is checked between batches. A cancelled sub-task stops where
//! it is and records a `cancelled` error, so the run reports failure.

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::plan::{MigrationPlan, PlanError};
use crate::provider::{
    BackendProvider, Page, ProviderResult, Record, StoredObject, UploadOptions, WriteOp,
};

/// Files copied at once within one page
const FILE_COPY_CONCURRENCY: usize = 8;

fn default_batch_size() -> usize {
    500
}

fn default_true() -> bool {
    true
}

/// What to migrate and how. Loaded as the `migration` section of
/// [`BridgeConfig`](crate::BridgeConfig).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationOptions {
    /// Read the source and count, but write nothing to the target
    #[serde(default)]
    pub dry_run: bool,

    /// Items per source page and per target write (default: 500, the
    /// document-store batch ceiling)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_true")]
    pub migrate_users: bool,

    #[serde(default = "default_true")]
    pub migrate_data: bool,

    #[serde(default = "default_true")]
    pub migrate_files: bool,

    /// Collections to copy; every source collection when `None`
    #[serde(default)]
    pub collections: Option<Vec<String>>,

    /// Run the sub-tasks concurrently (default: true)
    #[serde(default = "default_true")]
    pub concurrent: bool,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            batch_size: default_batch_size(),
            migrate_users: true,
            migrate_data: true,
            migrate_files: true,
            collections: None,
            concurrent: true,
        }
    }
}

impl MigrationOptions {
    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationTask {
    Users,
    Data,
    Files,
}

impl MigrationTask {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Data => "data",
            Self::Files => "files",
        }
    }
}

impl fmt::Display for MigrationTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One item that could not be migrated.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{task} migration failed for {item}: {message}")]
pub struct MigrationStepError {
    pub task: MigrationTask,
    /// User email, `collection/id`, file path, or the page that failed
    pub item: String,
    pub message: String,
}

/// Outcome of one sub-task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskReport {
    /// Items written, or items that would be written in a dry run
    pub migrated: usize,
    pub errors: Vec<MigrationStepError>,
    pub cancelled: bool,
}

impl TaskReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    fn fail(&mut self, task: MigrationTask, item: impl Into<String>, message: impl fmt::Display) {
        let error = MigrationStepError {
            task,
            item: item.into(),
            message: message.to_string(),
        };
        warn!(task = %task, item = %error.item, error = %error.message, "Migration item failed");
        self.errors.push(error);
    }

    fn cancel(&mut self, task: MigrationTask) {
        self.cancelled = true;
        self.fail(task, "remaining items", "cancelled before completion");
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationResult {
    /// No errors in any requested sub-task
    pub success: bool,
    pub dry_run: bool,
    /// `None` when the sub-task was not requested
    pub users: Option<TaskReport>,
    pub data: Option<TaskReport>,
    pub files: Option<TaskReport>,
    pub duration_ms: u64,
    /// Copied from the plan for the operator
    pub rollback_plan: String,
}

impl MigrationResult {
    pub fn errors(&self) -> impl Iterator<Item = &MigrationStepError> {
        [&self.users, &self.data, &self.files]
            .into_iter()
            .flatten()
            .flat_map(|report| report.errors.iter())
    }

    #[must_use]
    pub fn total_migrated(&self) -> usize {
        [&self.users, &self.data, &self.files]
            .into_iter()
            .flatten()
            .map(|report| report.migrated)
            .sum()
    }
}

fn page_label(cursor: Option<&str>) -> String {
    match cursor {
        Some(cursor) => format!("page after '{}'", cursor),
        None => "first page".to_string(),
    }
}

/// Runs a [`MigrationPlan`] from one provider to another.
pub struct MigrationExecutor {
    source: Arc<dyn BackendProvider>,
    target: Arc<dyn BackendProvider>,
}

impl MigrationExecutor {
    pub fn new(source: Arc<dyn BackendProvider>, target: Arc<dyn BackendProvider>) -> Self {
        Self { source, target }
    }

    /// Execute `plan`. Only an invalid plan, or one written for other
    /// backends, is an error; item failures are reported in the result.
    #[tracing::instrument(
        skip(self, plan, options, cancel),
        fields(from = %plan.from_backend, to = %plan.to_backend, dry_run = options.dry_run)
    )]
    pub async fn execute(
        &self,
        plan: &MigrationPlan,
        options: &MigrationOptions,
        cancel: &CancellationToken,
    ) -> Result<MigrationResult, PlanError> {
        plan.validate()?;
        for (role, expected, actual) in [
            ("source", plan.from_backend, self.source.kind()),
            ("target", plan.to_backend, self.target.kind()),
        ] {
            if expected != actual {
                return Err(PlanError::BackendMismatch { role, expected, actual });
            }
        }

        let started = Instant::now();
        let batch_size = options.batch_size.max(1);
        let dry_run = options.dry_run;

        let users = async {
            if options.migrate_users {
                Some(self.migrate_users(batch_size, dry_run, cancel).await)
            } else {
                None
            }
        };
        let data = async {
            if options.migrate_data {
                Some(
                    self.migrate_data(options.collections.as_deref(), batch_size, dry_run, cancel)
                        .await,
                )
            } else {
                None
            }
        };
        let files = async {
            if options.migrate_files {
                Some(self.migrate_files(batch_size, dry_run, cancel).await)
            } else {
                None
            }
        };

        let (users, data, files) = if options.concurrent {
            tokio::join!(users, data, files)
        } else {
            (users.await, data.await, files.await)
        };

        let success = [&users, &data, &files]
            .into_iter()
            .flatten()
            .all(TaskReport::is_clean);

        let result = MigrationResult {
            success,
            dry_run,
            users,
            data,
            files,
            duration_ms: started.elapsed().as_millis() as u64,
            rollback_plan: plan.rollback_plan.clone(),
        };

        if success {
            info!(migrated = result.total_migrated(), "Migration completed");
        } else {
            warn!(
                migrated = result.total_migrated(),
                errors = result.errors().count(),
                "Migration finished with errors"
            );
        }
        Ok(result)
    }

    async fn migrate_users(
        &self,
        batch_size: usize,
        dry_run: bool,
        cancel: &CancellationToken,
    ) -> TaskReport {
        let task = MigrationTask::Users;
        let mut report = TaskReport::default();
        let mut cursor: Option<String> = None;

        loop {
            if cancel.is_cancelled() {
                report.cancel(task);
                break;
            }

            let page = match self.source.export_users(cursor.as_deref(), batch_size).await {
                Ok(page) => page,
                Err(e) => {
                    report.fail(task, page_label(cursor.as_deref()), e);
                    break;
                }
            };

            if !page.items.is_empty() {
                if dry_run {
                    report.migrated += page.items.len();
                    crate::metrics::record_migration_items(task.as_str(), "planned", page.items.len());
                } else {
                    match self.target.import_users(&page.items).await {
                        Ok(imported) => {
                            report.migrated += imported.imported;
                            crate::metrics::record_migration_items(task.as_str(), "migrated", imported.imported);
                            crate::metrics::record_migration_items(task.as_str(), "failed", imported.failures.len());
                            for (item, reason) in imported.failures {
                                report.fail(task, item, reason);
                            }
                        }
                        Err(e) => {
                            crate::metrics::record_migration_items(task.as_str(), "failed", page.items.len());
                            for export in &page.items {
                                report.fail(task, export.user.email.clone(), &e);
                            }
                        }
                    }
                }
            }
            info!(task = %task, migrated = report.migrated, errors = report.errors.len(), "Migration progress");

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        report
    }

    async fn migrate_data(
        &self,
        collections: Option<&[String]>,
        batch_size: usize,
        dry_run: bool,
        cancel: &CancellationToken,
    ) -> TaskReport {
        let task = MigrationTask::Data;
        let mut report = TaskReport::default();

        let collections = match collections {
            Some(names) => names.to_vec(),
            None => match self.source.list_collections().await {
                Ok(names) => names,
                Err(e) => {
                    report.fail(task, "collection list", e);
                    return report;
                }
            },
        };

        'collections: for collection in &collections {
            let mut cursor: Option<String> = None;
            loop {
                if cancel.is_cancelled() {
                    report.cancel(task);
                    break 'collections;
                }

                let page = match self
                    .source
                    .list_records(collection, cursor.as_deref(), batch_size)
                    .await
                {
                    Ok(page) => page,
                    Err(e) => {
                        report.fail(
                            task,
                            format!("{} {}", collection, page_label(cursor.as_deref())),
                            e,
                        );
                        break;
                    }
                };

                if !page.items.is_empty() {
                    self.write_records(collection, &page, dry_run, &mut report).await;
                }
                info!(
                    task = %task,
                    collection = %collection,
                    migrated = report.migrated,
                    errors = report.errors.len(),
                    "Migration progress"
                );

                match page.next_cursor {
                    Some(next) => cursor = Some(next),
                    None => break,
                }
            }
        }
        report
    }

    async fn write_records(
        &self,
        collection: &str,
        page: &Page<Record>,
        dry_run: bool,
        report: &mut TaskReport,
    ) {
        let task = MigrationTask::Data;
        let count = page.items.len();

        if dry_run {
            report.migrated += count;
            crate::metrics::record_migration_items(task.as_str(), "planned", count);
            return;
        }

        let ops: Vec<WriteOp> = page
            .items
            .iter()
            .map(|record| WriteOp::Upsert {
                collection: collection.to_string(),
                id: record.id.clone(),
                data: record.data.clone(),
            })
            .collect();

        // Pages may be larger than the target accepts in one write
        let ceiling = self.target.max_batch_size().max(1);
        for (ops, records) in ops.chunks(ceiling).zip(page.items.chunks(ceiling)) {
            match self.target.batch_write(ops).await {
                Ok(written) => {
                    report.migrated += written.written;
                    crate::metrics::record_migration_items(task.as_str(), "migrated", written.written);
                }
                Err(e) => {
                    crate::metrics::record_migration_items(task.as_str(), "failed", records.len());
                    for record in records {
                        report.fail(task, format!("{}/{}", collection, record.id), &e);
                    }
                }
            }
        }
    }

    async fn migrate_files(
        &self,
        batch_size: usize,
        dry_run: bool,
        cancel: &CancellationToken,
    ) -> TaskReport {
        let task = MigrationTask::Files;
        let mut report = TaskReport::default();
        let mut cursor: Option<String> = None;

        loop {
            if cancel.is_cancelled() {
                report.cancel(task);
                break;
            }

            let page = match self.source.list_files("", cursor.as_deref(), batch_size).await {
                Ok(page) => page,
                Err(e) => {
                    report.fail(task, page_label(cursor.as_deref()), e);
                    break;
                }
            };

            if dry_run {
                report.migrated += page.items.len();
                crate::metrics::record_migration_items(task.as_str(), "planned", page.items.len());
            } else {
                let outcomes: Vec<(String, ProviderResult<()>)> = stream::iter(&page.items)
                    .map(|object| async move {
                        (object.path.clone(), self.copy_object(object).await)
                    })
                    .buffer_unordered(FILE_COPY_CONCURRENCY)
                    .collect()
                    .await;

                let mut copied = 0;
                for (path, outcome) in outcomes {
                    match outcome {
                        Ok(()) => copied += 1,
                        Err(e) => report.fail(task, path, e),
                    }
                }
                report.migrated += copied;
                crate::metrics::record_migration_items(task.as_str(), "migrated", copied);
                crate::metrics::record_migration_items(task.as_str(), "failed", page.items.len() - copied);
            }
            info!(task = %task, migrated = report.migrated, errors = report.errors.len(), "Migration progress");

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        report
    }

    async fn copy_object(&self, object: &StoredObject) -> ProviderResult<()> {
        let content = self.source.download_file(&object.path).await?;
        let options = UploadOptions {
            content_type: Some(object.content_type.clone()),
            metadata: object.metadata.clone(),
        };
        self.target
            .upload_file(&object.path, &content, &options)
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::plan::MigrationPlanner;
    use crate::provider::{
        AuthProvider, BackendKind, DataProvider, ErrorCode, LocalBackend, Operation, Query,
        SignUpRequest, StorageProvider,
    };
    use serde_json::json;

    async fn seeded_source() -> Arc<LocalBackend> {
        let source = Arc::new(LocalBackend::default());
        for email in ["ada@example.com", "grace@example.com", "linus@example.com"] {
            source
                .sign_up(&SignUpRequest {
                    email: email.to_string(),
                    password: "hunter22".to_string(),
                    display_name: None,
                })
                .await
                .unwrap();
        }
        for id in ["p1", "p2", "p3"] {
            source
                .create_record("posts", Some(id), json!({"title": id}))
                .await
                .unwrap();
        }
        source
            .create_record("tags", Some("t1"), json!({"name": "rust"}))
            .await
            .unwrap();
        source
            .upload_file("avatars/ada.png", b"png-bytes", &UploadOptions::default())
            .await
            .unwrap();
        source
            .upload_file("docs/readme.txt", b"hello", &UploadOptions::default())
            .await
            .unwrap();
        source
    }

    fn local_plan() -> MigrationPlan {
        MigrationPlanner::new().create_plan(BackendKind::Local, BackendKind::Local)
    }

    #[tokio::test]
    async fn test_full_migration_copies_everything() {
        let source = seeded_source().await;
        let target = Arc::new(LocalBackend::default());
        let executor = MigrationExecutor::new(source.clone(), target.clone());
        let options = MigrationOptions {
            batch_size: 2,
            ..MigrationOptions::default()
        };

        let result = executor
            .execute(&local_plan(), &options, &CancellationToken::new())
            .await
            .unwrap();

        assert!(result.success, "errors: {:?}", result.errors().collect::<Vec<_>>());
        assert_eq!(result.users.as_ref().unwrap().migrated, 3);
        assert_eq!(result.data.as_ref().unwrap().migrated, 4);
        assert_eq!(result.files.as_ref().unwrap().migrated, 2);
        assert_eq!(result.total_migrated(), 9);
        assert_eq!(result.rollback_plan, local_plan().rollback_plan);

        let post = target.get_record("posts", "p2").await.unwrap().unwrap();
        assert_eq!(post.data, json!({"title": "p2"}));
        assert_eq!(target.download_file("docs/readme.txt").await.unwrap(), b"hello");
        target.sign_in("grace@example.com", "hunter22").await.unwrap();
    }

    #[tokio::test]
    async fn test_dry_run_counts_without_writing() {
        let source = seeded_source().await;
        let target = Arc::new(LocalBackend::default());
        let executor = MigrationExecutor::new(source, target.clone());

        let result = executor
            .execute(&local_plan(), &MigrationOptions::dry_run(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.dry_run);
        assert_eq!(result.total_migrated(), 9);
        assert!(target.list_collections().await.unwrap().is_empty());
        assert!(target.get_user("anything").await.unwrap().is_none());
        assert_eq!(target.call_count(Operation::BatchWrite), 0);
        assert_eq!(target.call_count(Operation::UploadFile), 0);
    }

    #[tokio::test]
    async fn test_failed_batch_is_reported_per_record() {
        let source = seeded_source().await;
        let target = Arc::new(LocalBackend::default());
        target.inject_fault(Operation::BatchWrite, ErrorCode::InvalidArgument, 1);
        let executor = MigrationExecutor::new(source, target.clone());
        let options = MigrationOptions {
            batch_size: 2,
            migrate_users: false,
            migrate_files: false,
            ..MigrationOptions::default()
        };

        let result = executor
            .execute(&local_plan(), &options, &CancellationToken::new())
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result.users.is_none());
        let data = result.data.as_ref().unwrap();
        assert_eq!(data.migrated, 2);
        let failed: Vec<&str> = data.errors.iter().map(|e| e.item.as_str()).collect();
        assert_eq!(failed, vec!["posts/p1", "posts/p2"]);
        assert!(data.errors.iter().all(|e| e.task == MigrationTask::Data));
    }

    #[tokio::test]
    async fn test_pages_larger_than_target_batch_limit_are_split() {
        let source = Arc::new(LocalBackend::default());
        let ops: Vec<WriteOp> = (0..600)
            .map(|i| WriteOp::Upsert {
                collection: "events".to_string(),
                id: format!("e{:04}", i),
                data: json!({"seq": i}),
            })
            .collect();
        for chunk in ops.chunks(300) {
            source.batch_write(chunk).await.unwrap();
        }
        let target = Arc::new(LocalBackend::default());
        assert_eq!(target.max_batch_size(), 500);
        let executor = MigrationExecutor::new(source, target.clone());
        let options = MigrationOptions {
            batch_size: 600,
            migrate_users: false,
            migrate_files: false,
            ..MigrationOptions::default()
        };

        let result = executor
            .execute(&local_plan(), &options, &CancellationToken::new())
            .await
            .unwrap();

        assert!(result.success, "errors: {:?}", result.errors().take(3).collect::<Vec<_>>());
        assert_eq!(result.data.as_ref().unwrap().migrated, 600);
        // One page of 600 written as 500 + 100
        assert_eq!(target.call_count(Operation::BatchWrite), 2);
        assert_eq!(target.count_records(&Query::new("events")).await.unwrap(), 600);
    }

    #[tokio::test]
    async fn test_collection_filter() {
        let source = seeded_source().await;
        let target = Arc::new(LocalBackend::default());
        let executor = MigrationExecutor::new(source, target.clone());
        let options = MigrationOptions {
            collections: Some(vec!["tags".to_string()]),
            migrate_users: false,
            migrate_files: false,
            concurrent: false,
            ..MigrationOptions::default()
        };

        let result = executor
            .execute(&local_plan(), &options, &CancellationToken::new())
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.data.unwrap().migrated, 1);
        assert_eq!(target.list_collections().await.unwrap(), vec!["tags".to_string()]);
    }

    #[tokio::test]
    async fn test_cancelled_run_is_partial_failure() {
        let source = seeded_source().await;
        let target = Arc::new(LocalBackend::default());
        let executor = MigrationExecutor::new(source, target);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = executor
            .execute(&local_plan(), &MigrationOptions::default(), &cancel)
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.total_migrated(), 0);
        assert!(result.users.as_ref().unwrap().cancelled);
        assert_eq!(result.errors().count(), 3);
    }

    #[tokio::test]
    async fn test_plan_for_other_backends_is_rejected() {
        let executor = MigrationExecutor::new(
            Arc::new(LocalBackend::default()),
            Arc::new(LocalBackend::default()),
        );
        let plan = MigrationPlanner::new().create_plan(BackendKind::Firebase, BackendKind::Local);

        let err = executor
            .execute(&plan, &MigrationOptions::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PlanError::BackendMismatch { role: "source", .. }));
    }

    #[test]
    fn test_options_defaults_from_json() {
        let options: MigrationOptions = serde_json::from_str(r#"{"dry_run": true}"#).unwrap();
        assert!(options.dry_run);
        assert_eq!(options.batch_size, 500);
        assert!(options.migrate_users && options.migrate_data && options.migrate_files);
        assert!(options.concurrent);
    }
}
