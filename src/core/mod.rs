//! Durable queue storage.

/// Ordered envelope queue with quarantine.
pub mod queue;
