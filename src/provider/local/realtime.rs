// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Local realtime channels over `tokio::sync::broadcast`.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::broadcast;
use tracing::debug;

use super::{new_id, require_non_empty, LocalBackend};
use crate::provider::traits::{ProviderError, ProviderResult, RealtimeProvider};
use crate::provider::types::{
    now_millis, Operation, PresenceEntry, RealtimeConnection, RealtimeMessage, Subscription,
};

/// Messages a slow subscriber may fall behind before it starts lagging.
const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Default)]
pub(super) struct RealtimeState {
    connections: HashMap<String, RealtimeConnection>,
    channels: HashMap<String, broadcast::Sender<RealtimeMessage>>,
    /// channel → client id → entry
    presence: HashMap<String, BTreeMap<String, PresenceEntry>>,
}

#[async_trait]
impl RealtimeProvider for LocalBackend {
    async fn connect(&self, client_id: &str) -> ProviderResult<RealtimeConnection> {
        self.enter(Operation::Connect)?;
        require_non_empty("client id", client_id)?;

        let connection = RealtimeConnection {
            connection_id: new_id(),
            client_id: client_id.to_string(),
            connected_at: now_millis(),
        };
        self.realtime
            .lock()
            .connections
            .insert(connection.connection_id.clone(), connection.clone());
        Ok(connection)
    }

    async fn disconnect(&self, connection_id: &str) -> ProviderResult<()> {
        self.enter(Operation::Disconnect)?;

        let mut state = self.realtime.lock();
        let connection = state
            .connections
            .remove(connection_id)
            .ok_or_else(|| ProviderError::not_found(format!("connection '{}'", connection_id)))?;

        // A client may hold several connections; presence goes with the last one
        let still_connected = state
            .connections
            .values()
            .any(|c| c.client_id == connection.client_id);
        if !still_connected {
            for members in state.presence.values_mut() {
                members.remove(&connection.client_id);
            }
        }
        debug!(client_id = %connection.client_id, "Realtime client disconnected");
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> ProviderResult<Subscription> {
        self.enter(Operation::Subscribe)?;
        require_non_empty("channel", channel)?;

        let mut state = self.realtime.lock();
        let sender = state
            .channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        Ok(Subscription {
            channel: channel.to_string(),
            receiver: sender.subscribe(),
        })
    }

    async fn publish(&self, channel: &str, event: &str, payload: Value) -> ProviderResult<usize> {
        self.enter(Operation::Publish)?;
        require_non_empty("channel", channel)?;

        let state = self.realtime.lock();
        let Some(sender) = state.channels.get(channel) else {
            return Ok(0);
        };
        let message = RealtimeMessage {
            channel: channel.to_string(),
            event: event.to_string(),
            payload,
            sent_at: now_millis(),
        };
        // Err only means nobody is listening
        Ok(sender.send(message).unwrap_or(0))
    }

    async fn set_presence(&self, channel: &str, client_id: &str, state: Value) -> ProviderResult<()> {
        self.enter(Operation::SetPresence)?;
        require_non_empty("channel", channel)?;
        require_non_empty("client id", client_id)?;

        self.realtime
            .lock()
            .presence
            .entry(channel.to_string())
            .or_default()
            .insert(
                client_id.to_string(),
                PresenceEntry {
                    client_id: client_id.to_string(),
                    state,
                    updated_at: now_millis(),
                },
            );
        Ok(())
    }

    async fn get_presence(&self, channel: &str) -> ProviderResult<Vec<PresenceEntry>> {
        self.enter(Operation::GetPresence)?;
        Ok(self
            .realtime
            .lock()
            .presence
            .get(channel)
            .map(|members| members.values().cloned().collect())
            .unwrap_or_default())
    }
}
