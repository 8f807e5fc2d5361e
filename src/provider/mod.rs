// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Provider contract, backends and the resilience pipeline around them.
//!
//! # Module Structure
//!
//! ```text
//! provider/
//! ├── types.rs       # Backend kinds, operations, records, queries, DTOs
//! ├── traits.rs      # ProviderError + the seven capability traits
//! ├── query.rs       # In-process filter/sort/window evaluation
//! ├── translate.rs   # Query → document structured query + in-process remainder
//! ├── pagination.rs  # Offset emulation over cursor pagination
//! ├── local/         # LocalBackend (offline, in-memory)
//! ├── runtime.rs     # Shared breakers/cache/metrics
//! └── resilient.rs   # ResilientProvider: cache → breaker → retry → metrics
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use backend_bridge::provider::{
//!     DataProvider, LocalBackend, ProviderRuntime, ResilientProvider,
//! };
//! use backend_bridge::BridgeConfig;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), backend_bridge::provider::ProviderError> {
//! let runtime = ProviderRuntime::in_process(&BridgeConfig::default());
//! let provider = ResilientProvider::new(LocalBackend::default(), runtime);
//!
//! let record = provider.create_record("users", None, json!({ "name": "Ada" })).await?;
//! let cached = provider.get_record("users", &record.id).await?;
//! assert!(cached.is_some());
//! # Ok(())
//! # }
//! ```

pub mod local;
pub mod pagination;
pub mod query;
pub mod resilient;
pub mod runtime;
pub mod traits;
pub mod translate;
pub mod types;

pub use local::{EmailTemplate, FunctionHandler, LocalBackend, LocalBackendConfig, OutboxEntry};
pub use pagination::{fetch_all, fetch_with_offset, CursorSource};
pub use resilient::ResilientProvider;
pub use runtime::ProviderRuntime;
pub use traits::{
    AuthProvider, BackendProvider, DataProvider, DeploymentProvider, ErrorCode, FunctionProvider,
    NotificationProvider, ProviderError, ProviderResult, RealtimeProvider, StorageProvider,
    DEFAULT_MAX_BATCH_SIZE,
};
pub use translate::{DocumentTranslator, Translated};
pub use types::*;
