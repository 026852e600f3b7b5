// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Webhook event log
//!
//! A bounded in-memory ring buffer of received provider webhooks. The oldest event is
//! dropped once the buffer is full.

use std::{
    collections::VecDeque,
    fmt,
    net::IpAddr,
    str::FromStr,
    sync::{Arc, Mutex, PoisonError},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

/// Providers that may deliver webhooks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum WebhookProvider {
    /// Alchemy Notify
    Alchemy,
    /// Moralis Streams
    Moralis,
    /// Helius webhooks
    Helius,
}

impl WebhookProvider {
    /// Lowercase name used in paths and labels
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Alchemy => "alchemy",
            Self::Moralis => "moralis",
            Self::Helius => "helius",
        }
    }

    /// Event type as each provider labels it, if present
    fn event_type(self, body: &Value) -> Option<String> {
        let label = match self {
            Self::Alchemy => body.pointer("/event/type").or_else(|| body.get("type")),
            Self::Moralis => body.get("tag"),
            Self::Helius => body.pointer("/0/type").or_else(|| body.get("type")),
        };
        label.and_then(Value::as_str).map(ToString::to_string)
    }

    /// Provider timestamp, if the body carries one
    fn provider_timestamp(self, body: &Value) -> Option<Value> {
        let value = match self {
            Self::Alchemy => body.get("createdAt").or_else(|| body.get("timestamp")),
            Self::Moralis => body.get("createdAt"),
            Self::Helius => body.pointer("/0/timestamp"),
        };
        value.filter(|v| !v.is_null()).cloned()
    }
}

impl fmt::Display for WebhookProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WebhookProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "alchemy" => Ok(Self::Alchemy),
            "moralis" => Ok(Self::Moralis),
            "helius" => Ok(Self::Helius),
            other => Err(format!("unknown webhook provider: {other}")),
        }
    }
}

/// One received webhook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WebhookEvent {
    /// Event id assigned on receipt
    #[schema(value_type = String)]
    pub id: Uuid,
    /// Delivering provider
    pub source: WebhookProvider,
    /// Provider's event label (`event.type`, `tag`, ...)
    pub event_type: Option<String>,
    /// Time of receipt
    #[schema(value_type = String, format = DateTime)]
    pub received_at: DateTime<Utc>,
    /// Provider's own timestamp, as sent
    #[schema(value_type = Object)]
    pub provider_timestamp: Option<Value>,
    /// Client IP of the delivery
    #[schema(value_type = String)]
    pub ip: IpAddr,
    /// Body as received
    #[schema(value_type = Object)]
    pub data: Value,
}

/// A page of recent events
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RecentEvents {
    /// Events, oldest first
    pub events: Vec<WebhookEvent>,
    /// Events currently retained
    pub total: usize,
    /// Buffer capacity
    pub max_events: usize,
}

/// Bounded ring buffer of webhook events
#[derive(Debug, Clone)]
pub struct EventLog {
    capacity: usize,
    events: Arc<Mutex<VecDeque<WebhookEvent>>>,
}

impl EventLog {
    /// Create a log retaining at most `capacity` events
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            events: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(1024)))),
        }
    }

    /// Buffer capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Events currently retained
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no event is retained
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Append an event, evicting the oldest when full
    pub fn record_event(&self, source: WebhookProvider, ip: IpAddr, data: Value) -> WebhookEvent {
        let event = WebhookEvent {
            id: Uuid::new_v4(),
            source,
            event_type: source.event_type(&data),
            received_at: Utc::now(),
            provider_timestamp: source.provider_timestamp(&data),
            ip,
            data,
        };

        let mut events = self.lock();
        if events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event.clone());
        drop(events);

        info!(
            id = %event.id,
            source = %source,
            event_type = event.event_type.as_deref().unwrap_or("unknown"),
            ip = %ip,
            "webhook received"
        );
        event
    }

    /// The `limit` most recent events, oldest first
    pub fn recent(&self, limit: usize) -> RecentEvents {
        let events = self.lock();
        let skip = events.len().saturating_sub(limit);
        RecentEvents {
            events: events.iter().skip(skip).cloned().collect(),
            total: events.len(),
            max_events: self.capacity,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<WebhookEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
