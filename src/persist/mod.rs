//! Persistent key-value slots backing the queue.

/// Shared in-memory slot, mainly for tests and ephemeral sessions.
pub mod memory;
/// SQLite-backed slot.
pub mod sqlite;

/// Errors raised while reading or writing a slot.
#[derive(Debug)]
pub enum PersistError {
    /// SQLite driver error.
    Sqlite(rusqlite::Error),
    /// Encoding or decoding failure.
    Serde(serde_json::Error),
    /// Any other failure.
    Message(String),
}

impl From<rusqlite::Error> for PersistError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<serde_json::Error> for PersistError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}

/// Result alias for persistence calls.
pub type PersistResult<T> = Result<T, PersistError>;

/// A named-key storage slot holding one serialized value per key.
///
/// `write` must replace the whole value atomically.
pub trait KvSlot: Send {
    /// Reads the value under `key`, if any.
    fn read(&self, key: &str) -> PersistResult<Option<String>>;
    /// Replaces the value under `key`.
    fn write(&mut self, key: &str, value: &str) -> PersistResult<()>;
}

