// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-process backend for local development and offline mode.
//!
//! Implements the whole provider contract against in-memory state. It is
//! also the backend the test suites run against, so it supports fault
//! injection per operation and counts how often each operation was entered.
//!
//! # Module Structure
//!
//! ```text
//! local/
//! ├── mod.rs        # LocalBackend struct, config, fault injection
//! ├── auth.rs       # Accounts, sessions, user export/import
//! ├── data.rs       # Collections, queries, batches, transactions
//! ├── storage.rs    # Object store and signed URLs
//! ├── realtime.rs   # Broadcast channels and presence
//! ├── functions.rs  # Registered handlers, logs, schedules
//! ├── notify.rs     # Outbox for email/SMS/push, templates, topics
//! └── deploy.rs     # Deployment history with rollback
//! ```

mod auth;
mod data;
mod deploy;
mod functions;
mod notify;
mod realtime;
mod storage;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use super::traits::{BackendProvider, ErrorCode, ProviderError, ProviderResult};
use super::types::{BackendKind, Operation, Record};

pub use notify::{EmailTemplate, OutboxEntry};

/// A registered function body. Errors become `internal` provider errors.
pub type FunctionHandler = Arc<dyn Fn(Value) -> Result<Value, String> + Send + Sync>;

/// Configuration for the local backend
#[derive(Debug, Clone, Deserialize)]
pub struct LocalBackendConfig {
    /// Most writes accepted in one batch or transaction (default: 500)
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,

    /// Access token lifetime (default: 1 hour)
    #[serde(
        rename = "token_ttl_ms",
        default = "default_token_ttl",
        with = "crate::config::serde_millis"
    )]
    pub token_ttl: Duration,

    /// Refresh token lifetime (default: 30 days)
    #[serde(
        rename = "refresh_token_ttl_ms",
        default = "default_refresh_token_ttl",
        with = "crate::config::serde_millis"
    )]
    pub refresh_token_ttl: Duration,

    /// Key for signed storage URLs
    #[serde(default = "default_signing_secret")]
    pub signing_secret: String,

    /// Base of generated storage URLs
    #[serde(default = "default_storage_base_url")]
    pub storage_base_url: String,

    /// Stable instance name; a fresh one is generated when unset. Backends
    /// meant to share cached results across processes must set the same name.
    #[serde(default)]
    pub instance_id: Option<String>,
}

fn default_batch_limit() -> usize { 500 }
fn default_token_ttl() -> Duration { Duration::from_secs(3600) }
fn default_refresh_token_ttl() -> Duration { Duration::from_secs(30 * 24 * 3600) }
fn default_signing_secret() -> String { "local-development-secret".to_string() }
fn default_storage_base_url() -> String { "http://localhost:9199/storage".to_string() }

impl Default for LocalBackendConfig {
    fn default() -> Self {
        Self {
            batch_limit: default_batch_limit(),
            token_ttl: default_token_ttl(),
            refresh_token_ttl: default_refresh_token_ttl(),
            signing_secret: default_signing_secret(),
            storage_base_url: default_storage_base_url(),
            instance_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Fault {
    code: ErrorCode,
    remaining: u32,
}

pub struct LocalBackend {
    config: LocalBackendConfig,
    instance_id: String,
    auth: RwLock<auth::AuthState>,
    collections: RwLock<BTreeMap<String, BTreeMap<String, Record>>>,
    objects: RwLock<BTreeMap<String, storage::StoredBlob>>,
    realtime: Mutex<realtime::RealtimeState>,
    functions: functions::FunctionState,
    notifications: Mutex<notify::NotificationState>,
    deployments: Mutex<Vec<deploy::DeploymentEntry>>,
    faults: Mutex<HashMap<Operation, Fault>>,
    calls: DashMap<Operation, u64>,
}

impl LocalBackend {
    pub fn new(config: LocalBackendConfig) -> Self {
        let instance_id = config
            .instance_id
            .clone()
            .unwrap_or_else(|| format!("local-{}", new_id()));
        Self {
            config,
            instance_id,
            auth: RwLock::new(auth::AuthState::default()),
            collections: RwLock::new(BTreeMap::new()),
            objects: RwLock::new(BTreeMap::new()),
            realtime: Mutex::new(realtime::RealtimeState::default()),
            functions: functions::FunctionState::default(),
            notifications: Mutex::new(notify::NotificationState::default()),
            deployments: Mutex::new(Vec::new()),
            faults: Mutex::new(HashMap::new()),
            calls: DashMap::new(),
        }
    }

    /// Default backend under a fixed instance name.
    pub fn named(instance_id: impl Into<String>) -> Self {
        Self::new(LocalBackendConfig {
            instance_id: Some(instance_id.into()),
            ..LocalBackendConfig::default()
        })
    }

    #[must_use]
    pub fn config(&self) -> &LocalBackendConfig {
        &self.config
    }

    /// Make the next `times` calls of `operation` fail with `code`.
    pub fn inject_fault(&self, operation: Operation, code: ErrorCode, times: u32) {
        debug!(%operation, %code, times, "Injecting local backend fault");
        self.faults.lock().insert(operation, Fault { code, remaining: times });
    }

    pub fn clear_faults(&self) {
        self.faults.lock().clear();
    }

    /// How many times `operation` was entered, failed or not.
    #[must_use]
    pub fn call_count(&self, operation: Operation) -> u64 {
        self.calls.get(&operation).map(|c| *c).unwrap_or(0)
    }

    /// Count the call and apply any pending injected fault.
    fn enter(&self, operation: Operation) -> ProviderResult<()> {
        *self.calls.entry(operation).or_insert(0) += 1;

        let mut faults = self.faults.lock();
        if let Some(fault) = faults.get_mut(&operation) {
            if fault.remaining > 0 {
                fault.remaining -= 1;
                return Err(ProviderError::new(
                    fault.code,
                    format!("injected fault in {}", operation),
                ));
            }
            faults.remove(&operation);
        }
        Ok(())
    }
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::new(LocalBackendConfig::default())
    }
}

impl BackendProvider for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn instance_id(&self) -> &str {
        &self.instance_id
    }
}

fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn sha256_hex(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hex::encode(hasher.finalize())
}

fn require_non_empty(what: &str, value: &str) -> ProviderResult<()> {
    if value.trim().is_empty() {
        return Err(ProviderError::invalid_argument(format!("{} must not be empty", what)));
    }
    Ok(())
}
