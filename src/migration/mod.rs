// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Moving a project between backends.
//!
//! [`MigrationPlanner`] turns a (from, to) pair into an ordered
//! [`MigrationPlan`]; [`MigrationExecutor`] runs the automated parts of a
//! plan against two live providers.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use backend_bridge::migration::{MigrationExecutor, MigrationOptions, MigrationPlanner};
//! use backend_bridge::provider::{BackendKind, LocalBackend};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let plan = MigrationPlanner::new().create_plan(BackendKind::Local, BackendKind::Local);
//! let executor = MigrationExecutor::new(
//!     Arc::new(LocalBackend::default()),
//!     Arc::new(LocalBackend::default()),
//! );
//!
//! let result = executor
//!     .execute(&plan, &MigrationOptions::dry_run(), &CancellationToken::new())
//!     .await?;
//! if !result.success {
//!     eprintln!("{}", result.rollback_plan);
//! }
//! # Ok(())
//! # }
//! ```

pub mod executor;
pub mod plan;

pub use executor::{
    MigrationExecutor, MigrationOptions, MigrationResult, MigrationStepError, MigrationTask,
    TaskReport,
};
pub use plan::{MigrationPlan, MigrationPlanner, MigrationStep, PlanError};
