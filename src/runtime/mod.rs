//! Sync engine runtime, handle and event stream APIs.

/// Event stream types emitted by the engine.
pub mod events;
/// Handle and engine loop implementation.
pub mod handle;
