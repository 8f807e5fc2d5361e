// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Local serverless functions: registered closures, invocation log, schedules.
//!
//! Schedules are stored, not run. There is no scheduler locally.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, warn};

use super::{new_id, require_non_empty, FunctionHandler, LocalBackend};
use crate::provider::traits::{ErrorCode, FunctionProvider, ProviderError, ProviderResult};
use crate::provider::types::{
    now_millis, FunctionLogEntry, FunctionResult, LogLevel, Operation, ScheduledFunction,
};

/// Log entries kept across all functions.
const MAX_LOG_ENTRIES: usize = 1000;

#[derive(Default)]
pub(super) struct FunctionState {
    handlers: RwLock<HashMap<String, FunctionHandler>>,
    logs: Mutex<Vec<FunctionLogEntry>>,
    schedules: Mutex<Vec<ScheduledFunction>>,
}

impl LocalBackend {
    /// Register (or replace) the body of a function.
    pub fn register_function<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(function = %name, "Registered local function");
        self.functions
            .handlers
            .write()
            .insert(name, std::sync::Arc::new(handler));
    }

    /// Stored schedules, in creation order.
    #[must_use]
    pub fn scheduled_functions(&self) -> Vec<ScheduledFunction> {
        self.functions.schedules.lock().clone()
    }

    fn log_invocation(&self, function: &str, invocation_id: &str, level: LogLevel, message: String) {
        let mut logs = self.functions.logs.lock();
        logs.push(FunctionLogEntry {
            function: function.to_string(),
            invocation_id: invocation_id.to_string(),
            level,
            message,
            timestamp: now_millis(),
        });
        if logs.len() > MAX_LOG_ENTRIES {
            let excess = logs.len() - MAX_LOG_ENTRIES;
            logs.drain(..excess);
        }
    }

    fn run_function(&self, name: &str, invocation_id: &str, payload: Value) -> ProviderResult<FunctionResult> {
        let handler = self
            .functions
            .handlers
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ProviderError::not_found(format!("function '{}'", name)))?;

        let started = Instant::now();
        let outcome = handler(payload);
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(output) => {
                self.log_invocation(
                    name,
                    invocation_id,
                    LogLevel::Info,
                    format!("completed in {}ms", duration_ms),
                );
                Ok(FunctionResult { output, duration_ms })
            }
            Err(message) => {
                warn!(function = name, error = %message, "Local function failed");
                self.log_invocation(name, invocation_id, LogLevel::Error, message.clone());
                Err(ProviderError::new(ErrorCode::Internal, message))
            }
        }
    }
}

#[async_trait]
impl FunctionProvider for LocalBackend {
    async fn invoke_function(&self, name: &str, payload: Value) -> ProviderResult<FunctionResult> {
        self.enter(Operation::InvokeFunction)?;
        self.run_function(name, &new_id(), payload)
    }

    async fn invoke_function_async(&self, name: &str, payload: Value) -> ProviderResult<String> {
        self.enter(Operation::InvokeFunctionAsync)?;

        // Runs inline; the caller only learns the invocation id and reads
        // the outcome from the logs
        let invocation_id = new_id();
        if let Err(e) = self.run_function(name, &invocation_id, payload) {
            if e.code() == Some(ErrorCode::NotFound) {
                return Err(e);
            }
        }
        Ok(invocation_id)
    }

    async fn schedule_function(
        &self,
        name: &str,
        schedule: &str,
        payload: Value,
    ) -> ProviderResult<ScheduledFunction> {
        self.enter(Operation::ScheduleFunction)?;
        require_non_empty("schedule", schedule)?;
        if !self.functions.handlers.read().contains_key(name) {
            return Err(ProviderError::not_found(format!("function '{}'", name)));
        }

        let scheduled = ScheduledFunction {
            id: new_id(),
            function: name.to_string(),
            schedule: schedule.to_string(),
            payload,
        };
        self.functions.schedules.lock().push(scheduled.clone());
        Ok(scheduled)
    }

    async fn get_function_logs(&self, name: &str, limit: usize) -> ProviderResult<Vec<FunctionLogEntry>> {
        self.enter(Operation::GetFunctionLogs)?;

        let logs = self.functions.logs.lock();
        let mut entries: Vec<FunctionLogEntry> = logs
            .iter()
            .rev()
            .filter(|e| e.function == name)
            .take(limit)
            .cloned()
            .collect();
        entries.reverse();
        Ok(entries)
    }
}
