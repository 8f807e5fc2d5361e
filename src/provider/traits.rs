// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The provider contract every backend implements.
//!
//! The contract is split by capability so a wrapper or test double can be
//! built one concern at a time; [`BackendProvider`] ties them together.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

use super::types::{
    AuthSession, BackendKind, BatchWriteResult, DeliveryReceipt, Deployment, DeploymentRequest,
    DeploymentStatus, EmailMessage, FunctionLogEntry, FunctionResult, ImportResult, Page,
    PresenceEntry, PushMessage, Query, RealtimeConnection, Record, ScheduledFunction,
    SignUpRequest, SignedUrlMethod, StoredObject, Subscription, TokenClaims, Transaction,
    TransactionResult, UploadOptions, User, UserExport, WriteOp,
};
use crate::resilience::RetryableError;

/// Batch ceiling assumed for backends that don't declare one (the
/// document-store limit).
pub const DEFAULT_MAX_BATCH_SIZE: usize = 500;

/// Machine-readable error codes shared by all backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Unavailable,
    DeadlineExceeded,
    ResourceExhausted,
    Internal,
    InvalidArgument,
    NotFound,
    AlreadyExists,
    Conflict,
    PermissionDenied,
    Unauthenticated,
    Unimplemented,
    Cancelled,
}

impl ErrorCode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unavailable => "unavailable",
            Self::DeadlineExceeded => "deadline-exceeded",
            Self::ResourceExhausted => "resource-exhausted",
            Self::Internal => "internal",
            Self::InvalidArgument => "invalid-argument",
            Self::NotFound => "not-found",
            Self::AlreadyExists => "already-exists",
            Self::Conflict => "conflict",
            Self::PermissionDenied => "permission-denied",
            Self::Unauthenticated => "unauthenticated",
            Self::Unimplemented => "unimplemented",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the code describes a condition that may clear on its own.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Unavailable | Self::DeadlineExceeded | Self::ResourceExhausted | Self::Internal
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Retryable backend failure
    #[error("{code}: {message}")]
    Transient { code: ErrorCode, message: String },

    /// Failure that retrying cannot fix
    #[error("{code}: {message}")]
    Permanent { code: ErrorCode, message: String },

    /// Rejected without calling the backend
    #[error("circuit open for '{operation}'")]
    CircuitOpen { operation: String },

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ProviderError {
    /// Build an error, classifying it by code.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        let message = message.into();
        if code.is_transient() {
            Self::Transient { code, message }
        } else {
            Self::Permanent { code, message }
        }
    }

    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::new(ErrorCode::NotFound, format!("{} not found", what))
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unavailable, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthenticated, message)
    }

    /// The taxonomy code, if the error carries one.
    #[must_use]
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Transient { code, .. } | Self::Permanent { code, .. } => Some(*code),
            Self::CircuitOpen { .. } | Self::Serialization(_) => None,
        }
    }

    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    #[must_use]
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl RetryableError for ProviderError {
    fn error_code(&self) -> Option<&str> {
        match self {
            Self::Transient { code, .. } | Self::Permanent { code, .. } => Some(code.as_str()),
            Self::CircuitOpen { .. } => Some("circuit-open"),
            Self::Serialization(_) => Some("serialization"),
        }
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_up(&self, request: &SignUpRequest) -> ProviderResult<AuthSession>;
    async fn sign_in(&self, email: &str, password: &str) -> ProviderResult<AuthSession>;
    async fn sign_out(&self, access_token: &str) -> ProviderResult<()>;
    async fn verify_token(&self, access_token: &str) -> ProviderResult<TokenClaims>;
    async fn refresh_token(&self, refresh_token: &str) -> ProviderResult<AuthSession>;
    async fn send_password_reset(&self, email: &str) -> ProviderResult<()>;
    async fn get_user(&self, user_id: &str) -> ProviderResult<Option<User>>;

    /// Page through all accounts, for migration.
    async fn export_users(&self, cursor: Option<&str>, limit: usize)
        -> ProviderResult<Page<UserExport>>;

    /// Create accounts from another backend's export. Per-user failures
    /// are reported in the result, not as an error.
    async fn import_users(&self, users: &[UserExport]) -> ProviderResult<ImportResult>;
}

#[async_trait]
pub trait DataProvider: Send + Sync {
    /// Create a record; a generated id is used when `id` is `None`.
    async fn create_record(&self, collection: &str, id: Option<&str>, data: Value)
        -> ProviderResult<Record>;
    async fn get_record(&self, collection: &str, id: &str) -> ProviderResult<Option<Record>>;

    /// Shallow-merge `data` into the record.
    async fn update_record(
        &self,
        collection: &str,
        id: &str,
        data: Value,
        expected_version: Option<u64>,
    ) -> ProviderResult<Record>;
    async fn delete_record(&self, collection: &str, id: &str) -> ProviderResult<()>;
    async fn query_records(&self, query: &Query) -> ProviderResult<Vec<Record>>;

    /// Count matching records; limit/offset are ignored.
    async fn count_records(&self, query: &Query) -> ProviderResult<u64>;
    async fn batch_write(&self, ops: &[WriteOp]) -> ProviderResult<BatchWriteResult>;
    async fn transaction(&self, transaction: &Transaction) -> ProviderResult<TransactionResult>;

    async fn list_collections(&self) -> ProviderResult<Vec<String>>;

    /// Native cursor pagination, ordered by id.
    async fn list_records(&self, collection: &str, cursor: Option<&str>, limit: usize)
        -> ProviderResult<Page<Record>>;

    /// Most writes one `batch_write` or transaction accepts.
    fn max_batch_size(&self) -> usize {
        DEFAULT_MAX_BATCH_SIZE
    }
}

#[async_trait]
pub trait StorageProvider: Send + Sync {
    async fn upload_file(&self, path: &str, content: &[u8], options: &UploadOptions)
        -> ProviderResult<StoredObject>;
    async fn download_file(&self, path: &str) -> ProviderResult<Vec<u8>>;
    async fn delete_file(&self, path: &str) -> ProviderResult<()>;
    async fn list_files(&self, prefix: &str, cursor: Option<&str>, limit: usize)
        -> ProviderResult<Page<StoredObject>>;
    async fn signed_url(&self, path: &str, method: SignedUrlMethod, expires_in: Duration)
        -> ProviderResult<String>;
    async fn copy_file(&self, from: &str, to: &str) -> ProviderResult<StoredObject>;
}

#[async_trait]
pub trait RealtimeProvider: Send + Sync {
    async fn connect(&self, client_id: &str) -> ProviderResult<RealtimeConnection>;
    async fn disconnect(&self, connection_id: &str) -> ProviderResult<()>;
    async fn subscribe(&self, channel: &str) -> ProviderResult<Subscription>;

    /// Returns how many subscribers received the message.
    async fn publish(&self, channel: &str, event: &str, payload: Value) -> ProviderResult<usize>;
    async fn set_presence(&self, channel: &str, client_id: &str, state: Value) -> ProviderResult<()>;
    async fn get_presence(&self, channel: &str) -> ProviderResult<Vec<PresenceEntry>>;
}

#[async_trait]
pub trait FunctionProvider: Send + Sync {
    async fn invoke_function(&self, name: &str, payload: Value) -> ProviderResult<FunctionResult>;

    /// Fire and forget; returns the invocation id.
    async fn invoke_function_async(&self, name: &str, payload: Value) -> ProviderResult<String>;
    async fn schedule_function(&self, name: &str, schedule: &str, payload: Value)
        -> ProviderResult<ScheduledFunction>;
    async fn get_function_logs(&self, name: &str, limit: usize)
        -> ProviderResult<Vec<FunctionLogEntry>>;
}

#[async_trait]
pub trait NotificationProvider: Send + Sync {
    async fn send_email(&self, message: &EmailMessage) -> ProviderResult<DeliveryReceipt>;
    async fn send_sms(&self, to: &str, body: &str) -> ProviderResult<DeliveryReceipt>;
    async fn send_push(&self, message: &PushMessage) -> ProviderResult<DeliveryReceipt>;
    async fn send_templated_email(
        &self,
        to: &[String],
        template: &str,
        variables: &BTreeMap<String, String>,
    ) -> ProviderResult<DeliveryReceipt>;
    async fn subscribe_to_topic(&self, device_token: &str, topic: &str) -> ProviderResult<()>;
    async fn unsubscribe_from_topic(&self, device_token: &str, topic: &str) -> ProviderResult<()>;
}

#[async_trait]
pub trait DeploymentProvider: Send + Sync {
    async fn deploy(&self, request: &DeploymentRequest) -> ProviderResult<Deployment>;
    async fn deployment_status(&self, deployment_id: &str) -> ProviderResult<DeploymentStatus>;

    /// Re-activate the previous live version of `service`.
    async fn rollback(&self, service: &str) -> ProviderResult<Deployment>;
    async fn deployment_logs(&self, deployment_id: &str) -> ProviderResult<Vec<String>>;
    async fn delete_deployment(&self, deployment_id: &str) -> ProviderResult<()>;
}

/// A complete backend.
pub trait BackendProvider:
    AuthProvider
    + DataProvider
    + StorageProvider
    + RealtimeProvider
    + FunctionProvider
    + NotificationProvider
    + DeploymentProvider
{
    fn kind(&self) -> BackendKind;

    /// Identity of the data behind this provider. Cache entries are scoped
    /// by it, so two providers share cached results only when they name the
    /// same instance. Defaults to the backend kind.
    fn instance_id(&self) -> &str {
        self.kind().as_str()
    }
}
