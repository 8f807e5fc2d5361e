// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Resilience pipeline around any provider.
//!
//! Every contract call is composed the same way:
//!
//! ```text
//! cache lookup (reads only)
//!   → circuit breaker for (provider, operation)
//!     → retry with backoff
//!       → one attempt: raw backend call + success/error/latency metrics
//! cache store (reads) or prefix invalidation (writes)
//! ```
//!
//! A rejected call never reaches the backend and surfaces as
//! [`ProviderError::CircuitOpen`]. Any other error comes back exactly as the
//! backend produced it, after the retry budget is spent.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use super::runtime::ProviderRuntime;
use super::traits::{
    AuthProvider, BackendProvider, DataProvider, DeploymentProvider, FunctionProvider,
    NotificationProvider, ProviderError, ProviderResult, RealtimeProvider, StorageProvider,
};
use super::types::{
    AuthSession, BackendKind, BatchWriteResult, DeliveryReceipt, Deployment, DeploymentRequest,
    DeploymentStatus, EmailMessage, FunctionLogEntry, FunctionResult, ImportResult, Operation,
    Page, PresenceEntry, PushMessage, Query, RealtimeConnection, Record, ScheduledFunction,
    SignUpRequest, SignedUrlMethod, StoredObject, Subscription, TokenClaims, Transaction,
    TransactionResult, UploadOptions, User, UserExport, WriteOp,
};
use crate::cache::keys;
use crate::metrics::dimensions;
use crate::resilience::{retry, CircuitError};

/// Cache resource name for binary objects.
const OBJECTS: &str = "objects";
/// Cache resource name for user accounts.
const USERS: &str = "users";

pub struct ResilientProvider<P: ?Sized> {
    inner: Arc<P>,
    runtime: ProviderRuntime,
}

impl<P: BackendProvider> ResilientProvider<P> {
    pub fn new(inner: P, runtime: ProviderRuntime) -> Self {
        Self::from_arc(Arc::new(inner), runtime)
    }
}

impl<P: BackendProvider + ?Sized> ResilientProvider<P> {
    pub fn from_arc(inner: Arc<P>, runtime: ProviderRuntime) -> Self {
        Self { inner, runtime }
    }

    /// The wrapped backend, bypassing the pipeline.
    #[must_use]
    pub fn inner(&self) -> &Arc<P> {
        &self.inner
    }

    #[must_use]
    pub fn runtime(&self) -> &ProviderRuntime {
        &self.runtime
    }

    fn provider(&self) -> &'static str {
        self.inner.kind().as_str()
    }

    /// Breaker → retry → attempt, with metrics for every attempt.
    async fn run<T, F, Fut>(&self, operation: Operation, mut call: F) -> ProviderResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        let provider = self.provider();
        let name = operation.as_str();
        let breaker = self.runtime.breakers.breaker(provider, name);
        let collector = &self.runtime.metrics;
        let dims = dimensions(&[("provider", provider)]);

        let attempt = || {
            let pending = call();
            let dims = dims.clone();
            async move {
                let started = Instant::now();
                let result = pending.await;
                let elapsed = started.elapsed();

                collector.record_latency(name, elapsed, dims.clone());
                crate::metrics::record_latency(provider, name, elapsed);
                match &result {
                    Ok(_) => {
                        collector.record_success(name, dims);
                        crate::metrics::record_operation(provider, name, "success");
                    }
                    Err(e) => {
                        collector.record_error(name, e, dims);
                        crate::metrics::record_operation(provider, name, "error");
                    }
                }
                result
            }
        };

        let outcome = breaker
            .call(|| retry(name, &self.runtime.retry, attempt))
            .await;

        match outcome {
            Ok(value) => Ok(value),
            Err(CircuitError::Inner(e)) => Err(e),
            Err(CircuitError::Rejected) => {
                let err = ProviderError::CircuitOpen {
                    operation: name.to_string(),
                };
                collector.record_error(name, &err, dims);
                crate::metrics::record_operation(provider, name, "rejected");
                Err(err)
            }
        }
    }

    /// Serve from cache, or run the call and cache its result.
    async fn cached<T, F, Fut>(&self, operation: Operation, key: String, call: F) -> ProviderResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut() -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        if let Some(hit) = self.runtime.cache.get_json::<T>(&key).await {
            debug!(%operation, "Served from cache");
            return Ok(hit);
        }

        let value = self.run(operation, call).await?;
        if let Err(e) = self.runtime.cache.set_json(&key, &value, None).await {
            debug!(%operation, error = %e, "Result not cached");
        }
        Ok(value)
    }

    /// Cache resource scoped to the wrapped backend instance.
    fn scoped(&self, resource: &str) -> String {
        format!("{}/{}", self.inner.instance_id(), resource)
    }

    fn key<A: Serialize + ?Sized>(&self, operation: Operation, resource: &str, args: &A) -> String {
        keys::point(operation.as_str(), &self.scoped(resource), args)
    }

    fn wildcard(&self, operation: Operation, resource: &str) -> String {
        keys::wildcard(operation.as_str(), &self.scoped(resource))
    }

    async fn invalidate_collection(&self, collection: &str) {
        for operation in [Operation::GetRecord, Operation::QueryRecords, Operation::CountRecords] {
            self.runtime.cache.delete(&self.wildcard(operation, collection)).await;
        }
    }

    async fn invalidate_object(&self, path: &str) {
        let cache = &self.runtime.cache;
        cache.delete(&self.key(Operation::DownloadFile, OBJECTS, path)).await;
        cache.delete(&self.wildcard(Operation::ListFiles, OBJECTS)).await;
    }

    async fn invalidate_users(&self) {
        self.runtime
            .cache
            .delete(&self.wildcard(Operation::GetUser, USERS))
            .await;
    }
}

impl<P: BackendProvider + ?Sized> BackendProvider for ResilientProvider<P> {
    fn kind(&self) -> BackendKind {
        self.inner.kind()
    }

    fn instance_id(&self) -> &str {
        self.inner.instance_id()
    }
}

#[async_trait]
impl<P: BackendProvider + ?Sized> AuthProvider for ResilientProvider<P> {
    async fn sign_up(&self, request: &SignUpRequest) -> ProviderResult<AuthSession> {
        let inner = &*self.inner;
        let session = self.run(Operation::SignUp, || inner.sign_up(request)).await?;
        // get_user may have cached a miss for this id
        self.invalidate_users().await;
        Ok(session)
    }

    async fn sign_in(&self, email: &str, password: &str) -> ProviderResult<AuthSession> {
        let inner = &*self.inner;
        self.run(Operation::SignIn, || inner.sign_in(email, password)).await
    }

    async fn sign_out(&self, access_token: &str) -> ProviderResult<()> {
        let inner = &*self.inner;
        self.run(Operation::SignOut, || inner.sign_out(access_token)).await
    }

    async fn verify_token(&self, access_token: &str) -> ProviderResult<TokenClaims> {
        let inner = &*self.inner;
        self.run(Operation::VerifyToken, || inner.verify_token(access_token)).await
    }

    async fn refresh_token(&self, refresh_token: &str) -> ProviderResult<AuthSession> {
        let inner = &*self.inner;
        self.run(Operation::RefreshToken, || inner.refresh_token(refresh_token)).await
    }

    async fn send_password_reset(&self, email: &str) -> ProviderResult<()> {
        let inner = &*self.inner;
        self.run(Operation::SendPasswordReset, || inner.send_password_reset(email)).await
    }

    async fn get_user(&self, user_id: &str) -> ProviderResult<Option<User>> {
        let inner = &*self.inner;
        let key = self.key(Operation::GetUser, USERS, user_id);
        self.cached(Operation::GetUser, key, || inner.get_user(user_id)).await
    }

    async fn export_users(&self, cursor: Option<&str>, limit: usize) -> ProviderResult<Page<UserExport>> {
        let inner = &*self.inner;
        self.run(Operation::ExportUsers, || inner.export_users(cursor, limit)).await
    }

    async fn import_users(&self, users: &[UserExport]) -> ProviderResult<ImportResult> {
        let inner = &*self.inner;
        let result = self.run(Operation::ImportUsers, || inner.import_users(users)).await?;
        self.invalidate_users().await;
        Ok(result)
    }
}

#[async_trait]
impl<P: BackendProvider + ?Sized> DataProvider for ResilientProvider<P> {
    async fn create_record(&self, collection: &str, id: Option<&str>, data: Value) -> ProviderResult<Record> {
        let inner = &*self.inner;
        let record = self
            .run(Operation::CreateRecord, || inner.create_record(collection, id, data.clone()))
            .await?;
        self.invalidate_collection(collection).await;
        Ok(record)
    }

    async fn get_record(&self, collection: &str, id: &str) -> ProviderResult<Option<Record>> {
        let inner = &*self.inner;
        let key = self.key(Operation::GetRecord, collection, id);
        self.cached(Operation::GetRecord, key, || inner.get_record(collection, id)).await
    }

    async fn update_record(
        &self,
        collection: &str,
        id: &str,
        data: Value,
        expected_version: Option<u64>,
    ) -> ProviderResult<Record> {
        let inner = &*self.inner;
        let record = self
            .run(Operation::UpdateRecord, || {
                inner.update_record(collection, id, data.clone(), expected_version)
            })
            .await?;
        self.invalidate_collection(collection).await;
        Ok(record)
    }

    async fn delete_record(&self, collection: &str, id: &str) -> ProviderResult<()> {
        let inner = &*self.inner;
        self.run(Operation::DeleteRecord, || inner.delete_record(collection, id)).await?;
        self.invalidate_collection(collection).await;
        Ok(())
    }

    async fn query_records(&self, query: &Query) -> ProviderResult<Vec<Record>> {
        let inner = &*self.inner;
        let key = self.key(Operation::QueryRecords, &query.collection, query);
        self.cached(Operation::QueryRecords, key, || inner.query_records(query)).await
    }

    async fn count_records(&self, query: &Query) -> ProviderResult<u64> {
        let inner = &*self.inner;
        let unbounded = query.unbounded();
        let key = self.key(Operation::CountRecords, &query.collection, &unbounded);
        self.cached(Operation::CountRecords, key, || inner.count_records(query)).await
    }

    async fn batch_write(&self, ops: &[WriteOp]) -> ProviderResult<BatchWriteResult> {
        let inner = &*self.inner;
        let result = self.run(Operation::BatchWrite, || inner.batch_write(ops)).await?;
        let touched: BTreeSet<&str> = ops.iter().map(WriteOp::collection).collect();
        for collection in touched {
            self.invalidate_collection(collection).await;
        }
        Ok(result)
    }

    async fn transaction(&self, transaction: &Transaction) -> ProviderResult<TransactionResult> {
        let inner = &*self.inner;
        let result = self.run(Operation::Transaction, || inner.transaction(transaction)).await?;
        let touched: BTreeSet<&str> = transaction.writes.iter().map(WriteOp::collection).collect();
        for collection in touched {
            self.invalidate_collection(collection).await;
        }
        Ok(result)
    }

    async fn list_collections(&self) -> ProviderResult<Vec<String>> {
        let inner = &*self.inner;
        self.run(Operation::ListCollections, || inner.list_collections()).await
    }

    async fn list_records(&self, collection: &str, cursor: Option<&str>, limit: usize) -> ProviderResult<Page<Record>> {
        let inner = &*self.inner;
        self.run(Operation::ListRecords, || inner.list_records(collection, cursor, limit)).await
    }

    fn max_batch_size(&self) -> usize {
        self.inner.max_batch_size()
    }
}

#[async_trait]
impl<P: BackendProvider + ?Sized> StorageProvider for ResilientProvider<P> {
    async fn upload_file(&self, path: &str, content: &[u8], options: &UploadOptions) -> ProviderResult<StoredObject> {
        let inner = &*self.inner;
        let object = self
            .run(Operation::UploadFile, || inner.upload_file(path, content, options))
            .await?;
        self.invalidate_object(path).await;
        Ok(object)
    }

    async fn download_file(&self, path: &str) -> ProviderResult<Vec<u8>> {
        let inner = &*self.inner;
        let key = self.key(Operation::DownloadFile, OBJECTS, path);
        if let Some(content) = self.runtime.cache.get(&key).await {
            return Ok(content);
        }

        let content = self.run(Operation::DownloadFile, || inner.download_file(path)).await?;
        self.runtime.cache.set(&key, content.clone(), None).await;
        Ok(content)
    }

    async fn delete_file(&self, path: &str) -> ProviderResult<()> {
        let inner = &*self.inner;
        self.run(Operation::DeleteFile, || inner.delete_file(path)).await?;
        self.invalidate_object(path).await;
        Ok(())
    }

    async fn list_files(&self, prefix: &str, cursor: Option<&str>, limit: usize) -> ProviderResult<Page<StoredObject>> {
        let inner = &*self.inner;
        let key = self.key(Operation::ListFiles, OBJECTS, &(prefix, cursor, limit));
        self.cached(Operation::ListFiles, key, || inner.list_files(prefix, cursor, limit)).await
    }

    async fn signed_url(&self, path: &str, method: SignedUrlMethod, expires_in: Duration) -> ProviderResult<String> {
        let inner = &*self.inner;
        self.run(Operation::SignedUrl, || inner.signed_url(path, method, expires_in)).await
    }

    async fn copy_file(&self, from: &str, to: &str) -> ProviderResult<StoredObject> {
        let inner = &*self.inner;
        let object = self.run(Operation::CopyFile, || inner.copy_file(from, to)).await?;
        self.invalidate_object(to).await;
        Ok(object)
    }
}

#[async_trait]
impl<P: BackendProvider + ?Sized> RealtimeProvider for ResilientProvider<P> {
    async fn connect(&self, client_id: &str) -> ProviderResult<RealtimeConnection> {
        let inner = &*self.inner;
        self.run(Operation::Connect, || inner.connect(client_id)).await
    }

    async fn disconnect(&self, connection_id: &str) -> ProviderResult<()> {
        let inner = &*self.inner;
        self.run(Operation::Disconnect, || inner.disconnect(connection_id)).await
    }

    async fn subscribe(&self, channel: &str) -> ProviderResult<Subscription> {
        let inner = &*self.inner;
        self.run(Operation::Subscribe, || inner.subscribe(channel)).await
    }

    async fn publish(&self, channel: &str, event: &str, payload: Value) -> ProviderResult<usize> {
        let inner = &*self.inner;
        self.run(Operation::Publish, || inner.publish(channel, event, payload.clone())).await
    }

    async fn set_presence(&self, channel: &str, client_id: &str, state: Value) -> ProviderResult<()> {
        let inner = &*self.inner;
        self.run(Operation::SetPresence, || inner.set_presence(channel, client_id, state.clone()))
            .await
    }

    async fn get_presence(&self, channel: &str) -> ProviderResult<Vec<PresenceEntry>> {
        let inner = &*self.inner;
        self.run(Operation::GetPresence, || inner.get_presence(channel)).await
    }
}

#[async_trait]
impl<P: BackendProvider + ?Sized> FunctionProvider for ResilientProvider<P> {
    async fn invoke_function(&self, name: &str, payload: Value) -> ProviderResult<FunctionResult> {
        let inner = &*self.inner;
        self.run(Operation::InvokeFunction, || inner.invoke_function(name, payload.clone())).await
    }

    async fn invoke_function_async(&self, name: &str, payload: Value) -> ProviderResult<String> {
        let inner = &*self.inner;
        self.run(Operation::InvokeFunctionAsync, || {
            inner.invoke_function_async(name, payload.clone())
        })
        .await
    }

    async fn schedule_function(&self, name: &str, schedule: &str, payload: Value) -> ProviderResult<ScheduledFunction> {
        let inner = &*self.inner;
        self.run(Operation::ScheduleFunction, || {
            inner.schedule_function(name, schedule, payload.clone())
        })
        .await
    }

    async fn get_function_logs(&self, name: &str, limit: usize) -> ProviderResult<Vec<FunctionLogEntry>> {
        let inner = &*self.inner;
        self.run(Operation::GetFunctionLogs, || inner.get_function_logs(name, limit)).await
    }
}

#[async_trait]
impl<P: BackendProvider + ?Sized> NotificationProvider for ResilientProvider<P> {
    async fn send_email(&self, message: &EmailMessage) -> ProviderResult<DeliveryReceipt> {
        let inner = &*self.inner;
        self.run(Operation::SendEmail, || inner.send_email(message)).await
    }

    async fn send_sms(&self, to: &str, body: &str) -> ProviderResult<DeliveryReceipt> {
        let inner = &*self.inner;
        self.run(Operation::SendSms, || inner.send_sms(to, body)).await
    }

    async fn send_push(&self, message: &PushMessage) -> ProviderResult<DeliveryReceipt> {
        let inner = &*self.inner;
        self.run(Operation::SendPush, || inner.send_push(message)).await
    }

    async fn send_templated_email(
        &self,
        to: &[String],
        template: &str,
        variables: &BTreeMap<String, String>,
    ) -> ProviderResult<DeliveryReceipt> {
        let inner = &*self.inner;
        self.run(Operation::SendTemplatedEmail, || {
            inner.send_templated_email(to, template, variables)
        })
        .await
    }

    async fn subscribe_to_topic(&self, device_token: &str, topic: &str) -> ProviderResult<()> {
        let inner = &*self.inner;
        self.run(Operation::SubscribeToTopic, || inner.subscribe_to_topic(device_token, topic))
            .await
    }

    async fn unsubscribe_from_topic(&self, device_token: &str, topic: &str) -> ProviderResult<()> {
        let inner = &*self.inner;
        self.run(Operation::UnsubscribeFromTopic, || {
            inner.unsubscribe_from_topic(device_token, topic)
        })
        .await
    }
}

#[async_trait]
impl<P: BackendProvider + ?Sized> DeploymentProvider for ResilientProvider<P> {
    async fn deploy(&self, request: &DeploymentRequest) -> ProviderResult<Deployment> {
        let inner = &*self.inner;
        self.run(Operation::Deploy, || inner.deploy(request)).await
    }

    async fn deployment_status(&self, deployment_id: &str) -> ProviderResult<DeploymentStatus> {
        let inner = &*self.inner;
        self.run(Operation::DeploymentStatus, || inner.deployment_status(deployment_id)).await
    }

    async fn rollback(&self, service: &str) -> ProviderResult<Deployment> {
        let inner = &*self.inner;
        self.run(Operation::Rollback, || inner.rollback(service)).await
    }

    async fn deployment_logs(&self, deployment_id: &str) -> ProviderResult<Vec<String>> {
        let inner = &*self.inner;
        self.run(Operation::DeploymentLogs, || inner.deployment_logs(deployment_id)).await
    }

    async fn delete_deployment(&self, deployment_id: &str) -> ProviderResult<()> {
        let inner = &*self.inner;
        self.run(Operation::DeleteDeployment, || inner.delete_deployment(deployment_id)).await
    }
}
