//! Offline-first operation queue with an ordered, single-flight sync engine.
//!
//! Writes are wrapped in [`envelope::Envelope`]s, persisted through a
//! [`persist::KvSlot`], and delivered to a [`dispatch::Remote`] one at a time,
//! head first, whenever the [`network::NetworkMonitor`] reports connectivity.
//!
//! # Examples
//!
//! Queue operations directly:
//! ```
//! use serde_json::json;
//! use tillsync::{
//!     core::queue::{QueueKeys, QueueStore},
//!     envelope::Envelope,
//!     persist::memory::MemoryKvSlot,
//!     types::OpKind,
//! };
//!
//! let slot = MemoryKvSlot::new();
//! let mut queue = QueueStore::load(Box::new(slot.clone()), QueueKeys::default()).expect("load");
//! let payload = json!({"paymentMethod": "cash", "customerId": 7, "items": []});
//! let env = Envelope::new(OpKind::Sale, payload.as_object().cloned().unwrap_or_default());
//! queue.append(env.clone()).expect("append");
//!
//! let reloaded = QueueStore::load(Box::new(slot), QueueKeys::default()).expect("reload");
//! assert_eq!(reloaded.snapshot(), vec![env]);
//! ```
//!
//! Engine usage with a SQLite slot and the HTTP remote:
//! ```no_run
//! use serde_json::json;
//! use tillsync::{
//!     dispatch::http::{HttpConfig, HttpRemote},
//!     network::NetworkMonitor,
//!     persist::sqlite::SqliteKvSlot,
//!     runtime::handle::{open_sync_engine, SyncConfig},
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let slot = SqliteKvSlot::open("till.db").expect("open sqlite");
//! let remote = HttpRemote::new(HttpConfig::default()).expect("http client");
//! let monitor = NetworkMonitor::new(false);
//! let handle = open_sync_engine(Box::new(slot), remote, monitor.clone(), SyncConfig::default())
//!     .expect("engine");
//! let payload = json!({"amount": 20, "method": "cash", "reference": "desk", "customerId": 7});
//! let _id = handle
//!     .enqueue("topup", payload.as_object().cloned().unwrap_or_default())
//!     .await
//!     .expect("enqueue");
//! monitor.set_online(true);
//! handle.shutdown().await.expect("shutdown");
//! # }
//! ```

/// Durable queue storage.
pub mod core;
/// Envelope-to-request mapping and the remote seam.
pub mod dispatch;
/// Operation envelope model.
pub mod envelope;
/// Connectivity monitor.
pub mod network;
/// Persistence abstraction and slot implementations.
pub mod persist;
/// Single-flight sync engine handle and events.
pub mod runtime;
/// Shared primitive types.
pub mod types;
