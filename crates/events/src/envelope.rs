use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockline_core::TenantId;

use crate::event::Event;

/// Envelope for a published event: `{event_type, tenant_id, timestamp, data}`.
///
/// This is the unit handed to [`crate::EventPublisher`] after a commit.
/// External dispatchers (webhooks) consume envelopes; signing and HTTP
/// retry/backoff are their concern, not the engine's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    tenant_id: TenantId,
    event_type: String,
    event_version: u32,
    occurred_at: DateTime<Utc>,
    data: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        tenant_id: TenantId,
        event_type: impl Into<String>,
        event_version: u32,
        occurred_at: DateTime<Utc>,
        data: E,
    ) -> Self {
        Self {
            event_id,
            tenant_id,
            event_type: event_type.into(),
            event_version,
            occurred_at,
            data,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn event_version(&self) -> u32 {
        self.event_version
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn data(&self) -> &E {
        &self.data
    }

    pub fn into_data(self) -> E {
        self.data
    }
}

impl<E: Event> EventEnvelope<E> {
    /// Wrap a typed event, capturing its metadata into the envelope.
    pub fn wrap(tenant_id: TenantId, event: E) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            tenant_id,
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            data: event,
        }
    }
}
