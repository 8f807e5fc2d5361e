// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Value types shared by every backend provider.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;
use tokio::sync::broadcast;

pub(crate) use crate::metrics::collector::now_millis;

/// The interchangeable backend implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Document-oriented serverless platform
    Firebase,
    /// Broad IaaS cloud
    Aws,
    /// In-process / offline
    Local,
}

impl BackendKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Firebase => "firebase",
            Self::Aws => "aws",
            Self::Local => "local",
        }
    }

    #[must_use]
    pub fn all() -> [BackendKind; 3] {
        [Self::Firebase, Self::Aws, Self::Local]
    }

    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local)
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "firebase" => Ok(Self::Firebase),
            "aws" => Ok(Self::Aws),
            "local" => Ok(Self::Local),
            other => Err(format!("unknown backend '{}'", other)),
        }
    }
}

/// Every contract operation, named explicitly.
///
/// Breakers, cache keys and metrics are keyed by [`Operation::as_str`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    SignUp,
    SignIn,
    SignOut,
    VerifyToken,
    RefreshToken,
    SendPasswordReset,
    GetUser,
    ExportUsers,
    ImportUsers,
    CreateRecord,
    GetRecord,
    UpdateRecord,
    DeleteRecord,
    QueryRecords,
    CountRecords,
    BatchWrite,
    Transaction,
    ListCollections,
    ListRecords,
    UploadFile,
    DownloadFile,
    DeleteFile,
    ListFiles,
    SignedUrl,
    CopyFile,
    Connect,
    Disconnect,
    Subscribe,
    Publish,
    SetPresence,
    GetPresence,
    InvokeFunction,
    InvokeFunctionAsync,
    ScheduleFunction,
    GetFunctionLogs,
    SendEmail,
    SendSms,
    SendPush,
    SendTemplatedEmail,
    SubscribeToTopic,
    UnsubscribeFromTopic,
    Deploy,
    DeploymentStatus,
    Rollback,
    DeploymentLogs,
    DeleteDeployment,
}

impl Operation {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SignUp => "sign_up",
            Self::SignIn => "sign_in",
            Self::SignOut => "sign_out",
            Self::VerifyToken => "verify_token",
            Self::RefreshToken => "refresh_token",
            Self::SendPasswordReset => "send_password_reset",
            Self::GetUser => "get_user",
            Self::ExportUsers => "export_users",
            Self::ImportUsers => "import_users",
            Self::CreateRecord => "create_record",
            Self::GetRecord => "get_record",
            Self::UpdateRecord => "update_record",
            Self::DeleteRecord => "delete_record",
            Self::QueryRecords => "query_records",
            Self::CountRecords => "count_records",
            Self::BatchWrite => "batch_write",
            Self::Transaction => "transaction",
            Self::ListCollections => "list_collections",
            Self::ListRecords => "list_records",
            Self::UploadFile => "upload_file",
            Self::DownloadFile => "download_file",
            Self::DeleteFile => "delete_file",
            Self::ListFiles => "list_files",
            Self::SignedUrl => "signed_url",
            Self::CopyFile => "copy_file",
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::Subscribe => "subscribe",
            Self::Publish => "publish",
            Self::SetPresence => "set_presence",
            Self::GetPresence => "get_presence",
            Self::InvokeFunction => "invoke_function",
            Self::InvokeFunctionAsync => "invoke_function_async",
            Self::ScheduleFunction => "schedule_function",
            Self::GetFunctionLogs => "get_function_logs",
            Self::SendEmail => "send_email",
            Self::SendSms => "send_sms",
            Self::SendPush => "send_push",
            Self::SendTemplatedEmail => "send_templated_email",
            Self::SubscribeToTopic => "subscribe_to_topic",
            Self::UnsubscribeFromTopic => "unsubscribe_from_topic",
            Self::Deploy => "deploy",
            Self::DeploymentStatus => "deployment_status",
            Self::Rollback => "rollback",
            Self::DeploymentLogs => "deployment_logs",
            Self::DeleteDeployment => "delete_deployment",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Opaque cursor for the next page; `None` on the last page
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_cursor: None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Structured data
// ═══════════════════════════════════════════════════════════════════════════

/// A stored document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub collection: String,
    pub data: Value,
    /// Starts at 1, bumped on every write
    pub version: u64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    /// Field value is one of the given array
    In,
    NotIn,
    /// String contains substring, or array contains element
    Contains,
    /// String starts with
    Prefix,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Dot-separated path into the record data (e.g., "profile.age")
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

/// Backend-neutral query: filters are ANDed, then sorted, then offset/limit.
///
/// # Example
///
/// ```
/// use backend_bridge::provider::{FilterOp, Query, SortDirection};
/// use serde_json::json;
///
/// let query = Query::new("users")
///     .filter("age", FilterOp::Gte, json!(18))
///     .order_by("name", SortDirection::Asc)
///     .limit(20)
///     .offset(40);
/// assert_eq!(query.filters.len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub collection: String,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub sort: Vec<Sort>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl Query {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn filter(mut self, field: impl Into<String>, op: FilterOp, value: Value) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            op,
            value,
        });
        self
    }

    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort.push(Sort {
            field: field.into(),
            direction,
        });
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// The same query without limit/offset, as used for counting.
    #[must_use]
    pub fn unbounded(&self) -> Self {
        Self {
            limit: None,
            offset: None,
            ..self.clone()
        }
    }
}

/// One write inside a batch or transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WriteOp {
    Create {
        collection: String,
        id: Option<String>,
        data: Value,
    },
    /// Shallow merge into an existing record
    Update {
        collection: String,
        id: String,
        data: Value,
        /// Fail with a conflict unless the stored version matches
        expected_version: Option<u64>,
    },
    /// Create or fully replace
    Upsert {
        collection: String,
        id: String,
        data: Value,
    },
    Delete {
        collection: String,
        id: String,
    },
}

impl WriteOp {
    #[must_use]
    pub fn collection(&self) -> &str {
        match self {
            Self::Create { collection, .. }
            | Self::Update { collection, .. }
            | Self::Upsert { collection, .. }
            | Self::Delete { collection, .. } => collection,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchWriteResult {
    pub written: usize,
    /// Ids touched, in op order
    pub ids: Vec<String>,
}

/// Reference to a single record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordRef {
    pub collection: String,
    pub id: String,
}

impl RecordRef {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

/// Declarative transaction: reads and writes applied atomically.
///
/// Optimistic concurrency comes from `expected_version` on updates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub reads: Vec<RecordRef>,
    pub writes: Vec<WriteOp>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionResult {
    /// One entry per read, in order
    pub reads: Vec<Option<Record>>,
    pub written: usize,
}

// ═══════════════════════════════════════════════════════════════════════════
// Authentication
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub email_verified: bool,
    pub disabled: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
    /// Access token expiry, ms since epoch
    pub expires_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub user_id: String,
    pub email: String,
    pub issued_at: i64,
    pub expires_at: i64,
}

/// A user account as moved between backends.
///
/// The password hash is opaque and only meaningful to a backend using the
/// same hashing scheme; importers without it must force a reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserExport {
    pub user: User,
    pub password_hash: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportResult {
    pub imported: usize,
    /// (email or id, reason)
    pub failures: Vec<(String, String)>,
}

// ═══════════════════════════════════════════════════════════════════════════
// Binary storage
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadOptions {
    pub content_type: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredObject {
    pub path: String,
    pub size: u64,
    pub content_type: String,
    /// Hex SHA-256 of the content
    pub checksum: String,
    pub updated_at: i64,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignedUrlMethod {
    Get,
    Put,
}

impl SignedUrlMethod {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Realtime
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeConnection {
    pub connection_id: String,
    pub client_id: String,
    pub connected_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeMessage {
    pub channel: String,
    pub event: String,
    pub payload: Value,
    pub sent_at: i64,
}

/// A live channel subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    pub channel: String,
    pub receiver: broadcast::Receiver<RealtimeMessage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceEntry {
    pub client_id: String,
    pub state: Value,
    pub updated_at: i64,
}

// ═══════════════════════════════════════════════════════════════════════════
// Functions
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResult {
    pub output: Value,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledFunction {
    pub id: String,
    pub function: String,
    /// Cron expression or rate ("every 5 minutes"); stored verbatim
    pub schedule: String,
    pub payload: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionLogEntry {
    pub function: String,
    pub invocation_id: String,
    pub level: LogLevel,
    pub message: String,
    pub timestamp: i64,
}

// ═══════════════════════════════════════════════════════════════════════════
// Notifications
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: Vec<String>,
    pub subject: String,
    pub text: String,
    pub html: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum PushTarget {
    Token(String),
    Topic(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    pub target: PushTarget,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannel {
    Email,
    Sms,
    Push,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub id: String,
    pub channel: NotificationChannel,
    /// Recipients the message was accepted for
    pub recipients: usize,
    pub accepted_at: i64,
}

// ═══════════════════════════════════════════════════════════════════════════
// Deployment
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRequest {
    pub service: String,
    pub version: String,
    /// Artifact location (image, bundle path, ...)
    pub artifact: String,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Pending,
    Live,
    Superseded,
    Failed,
    RolledBack,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: String,
    pub service: String,
    pub version: String,
    pub artifact: String,
    pub status: DeploymentStatus,
    pub created_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_backend_kind_round_trips_through_str() {
        for kind in BackendKind::all() {
            assert_eq!(kind.as_str().parse::<BackendKind>().unwrap(), kind);
        }
        assert!("azure".parse::<BackendKind>().is_err());
        assert_eq!(serde_json::to_value(BackendKind::Aws).unwrap(), json!("aws"));
    }

    #[test]
    fn test_query_unbounded_drops_window() {
        let q = Query::new("users").limit(10).offset(5);
        let u = q.unbounded();
        assert_eq!(u.limit, None);
        assert_eq!(u.offset, None);
        assert_eq!(u.collection, "users");
    }

    #[test]
    fn test_write_op_tagged_json() {
        let op: WriteOp = serde_json::from_value(json!({
            "type": "update",
            "collection": "users",
            "id": "u1",
            "data": {"name": "ada"},
            "expected_version": 3
        }))
        .unwrap();

        assert_eq!(op.collection(), "users");
        assert!(matches!(op, WriteOp::Update { expected_version: Some(3), .. }));
    }
}
