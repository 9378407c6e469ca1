//! Shared primitive IDs and operation kinds.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Client-generated envelope identifier.
pub type EnvelopeId = String;
/// Milliseconds since the Unix epoch.
pub type TimestampMs = u64;

/// Operation discriminator used to pick a remote endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OpKind {
    /// Generic transaction submission.
    Sale,
    /// Customer balance top-up.
    Topup,
    /// Any kind this client does not recognize; routed as a transaction.
    Other(String),
}

impl OpKind {
    /// Wire name of the kind.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Sale => "sale",
            Self::Topup => "topup",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for OpKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "sale" => Self::Sale,
            "topup" => Self::Topup,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for OpKind {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<OpKind> for String {
    fn from(value: OpKind) -> Self {
        match value {
            OpKind::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

