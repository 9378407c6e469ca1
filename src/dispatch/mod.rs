//! Mapping of envelopes to remote write requests.

/// HTTP implementation of [`Remote`].
pub mod http;

use std::future::Future;

use serde_json::{Map, Value};

use crate::{
    envelope::{Envelope, METADATA_KEYS},
    types::{EnvelopeId, OpKind},
};

/// Fields forwarded to the top-up endpoint.
const TOPUP_FIELDS: [&str; 3] = ["amount", "method", "reference"];

/// Remote write target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Generic transaction submission.
    Transactions,
    /// Balance top-up for one customer.
    CustomerTopup {
        /// Target customer.
        customer_id: String,
    },
}

impl Endpoint {
    /// Path segments relative to the API base URL, unencoded.
    pub fn segments(&self) -> Vec<&str> {
        match self {
            Self::Transactions => vec!["transactions"],
            Self::CustomerTopup { customer_id } => vec!["customers", customer_id.as_str(), "topup"],
        }
    }

    /// Path relative to the API base URL.
    pub fn path(&self) -> String {
        self.segments()
            .iter()
            .fold(String::new(), |path, segment| format!("{path}/{segment}"))
    }
}

/// A resolved write, free of envelope metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRequest {
    pub endpoint: Endpoint,
    pub body: Value,
}

/// Whether a failed delivery is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Connectivity or server trouble; may succeed later.
    Transient,
    /// The request itself is rejected; retrying will not help.
    Terminal,
}

/// Failed delivery of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The request never got a response.
    Network(String),
    /// Non-success, non-4xx response status.
    Server(u16),
    /// 4xx response status.
    Client(u16),
    /// The envelope cannot be mapped to a request.
    Malformed(String),
}

impl DispatchError {
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Network(_) | Self::Server(_) => FailureClass::Transient,
            Self::Client(_) | Self::Malformed(_) => FailureClass::Terminal,
        }
    }

    /// Maps a response status to a delivery outcome.
    pub fn from_status(status: u16) -> Result<(), Self> {
        match status {
            200..=299 => Ok(()),
            400..=499 => Err(Self::Client(status)),
            _ => Err(Self::Server(status)),
        }
    }
}

impl std::fmt::Display for DispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network(msg) => write!(f, "network error: {msg}"),
            Self::Server(status) => write!(f, "server error: {status}"),
            Self::Client(status) => write!(f, "rejected by server: {status}"),
            Self::Malformed(msg) => write!(f, "malformed envelope: {msg}"),
        }
    }
}

/// The remote write service.
pub trait Remote: Send + Sync + 'static {
    /// Submits one request. `idempotency_key` is set only when the host opted in.
    fn submit(
        &self,
        request: RemoteRequest,
        idempotency_key: Option<EnvelopeId>,
    ) -> impl Future<Output = Result<(), DispatchError>> + Send;
}

/// Maps `envelope` to its endpoint and request body.
///
/// Top-ups go to the customer's top-up endpoint; every other kind is submitted
/// as a transaction.
pub fn resolve(envelope: &Envelope) -> Result<RemoteRequest, DispatchError> {
    let payload = envelope.payload();
    match envelope.kind() {
        OpKind::Topup => {
            let customer_id = customer_id(payload).ok_or_else(|| {
                DispatchError::Malformed(format!("top-up {} has no customerId", envelope.id()))
            })?;
            if !is_plain_segment(&customer_id) {
                return Err(DispatchError::Malformed(format!(
                    "top-up {} has an unusable customerId {customer_id:?}",
                    envelope.id()
                )));
            }
            let body: Map<String, Value> = TOPUP_FIELDS
                .iter()
                .filter_map(|key| payload.get(*key).map(|v| (key.to_string(), v.clone())))
                .collect();
            Ok(RemoteRequest {
                endpoint: Endpoint::CustomerTopup { customer_id },
                body: Value::Object(body),
            })
        }
        OpKind::Sale | OpKind::Other(_) => {
            let body: Map<String, Value> = payload
                .iter()
                .filter(|(key, _)| !METADATA_KEYS.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            Ok(RemoteRequest {
                endpoint: Endpoint::Transactions,
                body: Value::Object(body),
            })
        }
    }
}

fn customer_id(payload: &Map<String, Value>) -> Option<String> {
    match payload.get("customerId")? {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

/// A single path segment that cannot escape the per-customer route.
fn is_plain_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment
            .chars()
            .any(|c| matches!(c, '/' | '\\' | '?' | '#' | '%') || c.is_whitespace() || c.is_control())
}
