//! Operation envelope model.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::types::{EnvelopeId, OpKind, TimestampMs};

/// Keys reserved for envelope metadata in the flat stored form.
pub const METADATA_KEYS: [&str; 3] = ["id", "kind", "createdAt"];

/// Opaque domain write body produced by the caller.
pub type Payload = Map<String, Value>;

/// Immutable write operation awaiting delivery.
///
/// Stored as one flat JSON object: `{id, kind, ...payload, createdAt}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    id: EnvelopeId,
    kind: OpKind,
    #[serde(flatten)]
    payload: Payload,
    #[serde(rename = "createdAt")]
    created_at: TimestampMs,
}

impl Envelope {
    /// Wraps `payload` with a fresh id and the current timestamp.
    pub fn new(kind: OpKind, payload: Payload) -> Self {
        let created_at = now_ms();
        Self::with_id(generate_id(created_at), kind, payload, created_at)
    }

    /// Builds an envelope with explicit metadata.
    ///
    /// Payload keys that collide with [`METADATA_KEYS`] are dropped.
    pub fn with_id(
        id: impl Into<EnvelopeId>,
        kind: OpKind,
        mut payload: Payload,
        created_at: TimestampMs,
    ) -> Self {
        for key in METADATA_KEYS {
            payload.remove(key);
        }
        Self {
            id: id.into(),
            kind,
            payload,
            created_at,
        }
    }

    /// Envelope id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Operation kind.
    pub fn kind(&self) -> &OpKind {
        &self.kind
    }

    /// Domain write body.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Enqueue timestamp in milliseconds.
    pub fn created_at(&self) -> TimestampMs {
        self.created_at
    }
}

/// Time-based id with a random suffix: `<ms hex>-<8 hex>`.
pub fn generate_id(ts_ms: TimestampMs) -> EnvelopeId {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{ts_ms:x}-{}", &suffix[..8])
}

pub(crate) fn now_ms() -> TimestampMs {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
