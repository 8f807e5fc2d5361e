// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Local notifications.
//!
//! Nothing leaves the process: every accepted message lands in an outbox
//! that tests and development tooling can inspect.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

use super::{new_id, require_non_empty, LocalBackend};
use crate::provider::traits::{NotificationProvider, ProviderError, ProviderResult};
use crate::provider::types::{
    now_millis, DeliveryReceipt, EmailMessage, NotificationChannel, Operation, PushMessage,
    PushTarget,
};

/// Email template with `{{variable}}` placeholders in subject and body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailTemplate {
    pub subject: String,
    pub body: String,
}

/// A message accepted by the local backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub id: String,
    pub channel: NotificationChannel,
    pub recipients: Vec<String>,
    pub subject: Option<String>,
    pub body: String,
    pub accepted_at: i64,
}

#[derive(Debug, Default)]
pub(super) struct NotificationState {
    templates: HashMap<String, EmailTemplate>,
    outbox: Vec<OutboxEntry>,
    /// topic → device tokens
    topics: HashMap<String, BTreeSet<String>>,
}

fn validate_email(address: &str) -> ProviderResult<()> {
    match address.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(ProviderError::invalid_argument(format!("invalid email address '{}'", address))),
    }
}

/// E.164: a '+' then 8 to 15 digits.
fn validate_phone(number: &str) -> ProviderResult<()> {
    let digits = number.strip_prefix('+').unwrap_or("");
    if (8..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ProviderError::invalid_argument(format!(
            "'{}' is not an E.164 phone number",
            number
        )))
    }
}

/// Substitute `{{name}}` placeholders. Unknown placeholders are an error.
fn render(template: &str, variables: &BTreeMap<String, String>) -> ProviderResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| ProviderError::invalid_argument("unterminated template placeholder"))?;
        let name = after[..end].trim();
        let value = variables.get(name).ok_or_else(|| {
            ProviderError::invalid_argument(format!("missing template variable '{}'", name))
        })?;
        out.push_str(value);
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

impl LocalBackend {
    pub fn register_template(&self, name: impl Into<String>, template: EmailTemplate) {
        self.notifications.lock().templates.insert(name.into(), template);
    }

    /// Everything accepted so far, oldest first.
    #[must_use]
    pub fn outbox(&self) -> Vec<OutboxEntry> {
        self.notifications.lock().outbox.clone()
    }

    fn push_outbox(
        &self,
        channel: NotificationChannel,
        recipients: Vec<String>,
        subject: Option<String>,
        body: String,
    ) -> DeliveryReceipt {
        let entry = OutboxEntry {
            id: new_id(),
            channel,
            recipients,
            subject,
            body,
            accepted_at: now_millis(),
        };
        let receipt = DeliveryReceipt {
            id: entry.id.clone(),
            channel,
            recipients: entry.recipients.len(),
            accepted_at: entry.accepted_at,
        };
        debug!(?channel, recipients = receipt.recipients, "Queued local notification");
        self.notifications.lock().outbox.push(entry);
        receipt
    }

    pub(super) fn record_outbox_email(&self, to: Vec<String>, subject: String, body: String) {
        self.push_outbox(NotificationChannel::Email, to, Some(subject), body);
    }
}

#[async_trait]
impl NotificationProvider for LocalBackend {
    async fn send_email(&self, message: &EmailMessage) -> ProviderResult<DeliveryReceipt> {
        self.enter(Operation::SendEmail)?;
        if message.to.is_empty() {
            return Err(ProviderError::invalid_argument("email needs at least one recipient"));
        }
        for address in &message.to {
            validate_email(address)?;
        }

        Ok(self.push_outbox(
            NotificationChannel::Email,
            message.to.clone(),
            Some(message.subject.clone()),
            message.text.clone(),
        ))
    }

    async fn send_sms(&self, to: &str, body: &str) -> ProviderResult<DeliveryReceipt> {
        self.enter(Operation::SendSms)?;
        validate_phone(to)?;
        require_non_empty("sms body", body)?;

        Ok(self.push_outbox(NotificationChannel::Sms, vec![to.to_string()], None, body.to_string()))
    }

    async fn send_push(&self, message: &PushMessage) -> ProviderResult<DeliveryReceipt> {
        self.enter(Operation::SendPush)?;

        let recipients = match &message.target {
            PushTarget::Token(token) => {
                require_non_empty("device token", token)?;
                vec![token.clone()]
            }
            PushTarget::Topic(topic) => self
                .notifications
                .lock()
                .topics
                .get(topic)
                .map(|tokens| tokens.iter().cloned().collect())
                .unwrap_or_default(),
        };

        Ok(self.push_outbox(
            NotificationChannel::Push,
            recipients,
            Some(message.title.clone()),
            message.body.clone(),
        ))
    }

    async fn send_templated_email(
        &self,
        to: &[String],
        template: &str,
        variables: &BTreeMap<String, String>,
    ) -> ProviderResult<DeliveryReceipt> {
        self.enter(Operation::SendTemplatedEmail)?;
        if to.is_empty() {
            return Err(ProviderError::invalid_argument("email needs at least one recipient"));
        }
        for address in to {
            validate_email(address)?;
        }

        let stored = self
            .notifications
            .lock()
            .templates
            .get(template)
            .cloned()
            .ok_or_else(|| ProviderError::not_found(format!("template '{}'", template)))?;
        let subject = render(&stored.subject, variables)?;
        let body = render(&stored.body, variables)?;

        Ok(self.push_outbox(NotificationChannel::Email, to.to_vec(), Some(subject), body))
    }

    async fn subscribe_to_topic(&self, device_token: &str, topic: &str) -> ProviderResult<()> {
        self.enter(Operation::SubscribeToTopic)?;
        require_non_empty("device token", device_token)?;
        require_non_empty("topic", topic)?;

        self.notifications
            .lock()
            .topics
            .entry(topic.to_string())
            .or_default()
            .insert(device_token.to_string());
        Ok(())
    }

    async fn unsubscribe_from_topic(&self, device_token: &str, topic: &str) -> ProviderResult<()> {
        self.enter(Operation::UnsubscribeFromTopic)?;
        if let Some(tokens) = self.notifications.lock().topics.get_mut(topic) {
            tokens.remove(device_token);
        }
        Ok(())
    }
}
