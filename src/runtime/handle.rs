use std::sync::Arc;

use hashbrown::HashMap;
use serde::Deserialize;
use tokio::{
    sync::{broadcast, mpsc, oneshot},
    time::{Duration, Instant, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use crate::{
    core::queue::{QueueKeys, QueueStore},
    dispatch::{self, DispatchError, FailureClass, Remote},
    envelope::{Envelope, Payload},
    network::NetworkMonitor,
    persist::{KvSlot, PersistError},
    types::{EnvelopeId, OpKind},
};

use super::events::SyncEvent;

#[derive(Debug)]
pub enum SyncError {
    Persist(PersistError),
    NotFound(EnvelopeId),
    ChannelClosed,
}

impl From<PersistError> for SyncError {
    fn from(value: PersistError) -> Self {
        Self::Persist(value)
    }
}

/// What to do with an envelope the remote rejected as invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientErrorPolicy {
    /// Move it to the quarantine sequence and continue with the next one.
    Quarantine,
    /// Leave it at the head and retry on every trigger.
    Retry,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub tick_interval_ms: u64,
    pub command_queue_bound: usize,
    pub events_capacity: usize,
    pub storage_key: String,
    pub quarantine_key: String,
    pub client_error_policy: ClientErrorPolicy,
    pub send_idempotency_key: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        let keys = QueueKeys::default();
        Self {
            tick_interval_ms: 60_000,
            command_queue_bound: 256,
            events_capacity: 1024,
            storage_key: keys.active,
            quarantine_key: keys.quarantine,
            client_error_policy: ClientErrorPolicy::Quarantine,
            send_idempotency_key: false,
        }
    }
}

impl SyncConfig {
    pub fn queue_keys(&self) -> QueueKeys {
        QueueKeys {
            active: self.storage_key.clone(),
            quarantine: self.quarantine_key.clone(),
        }
    }
}

/// Point-in-time view of the engine for status displays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
    pub online: bool,
    pub syncing: bool,
    pub pending: usize,
    pub quarantined: usize,
    /// Failed attempts on the current head since this process started.
    pub head_attempts: u32,
}

#[derive(Debug, Clone, Copy)]
enum Trigger {
    Enqueue,
    WentOnline,
    PeriodicTick,
    Manual,
    Delivered,
    Quarantined,
}

pub struct SyncHandle {
    cmd_tx: mpsc::Sender<Command>,
    events_tx: broadcast::Sender<SyncEvent>,
    monitor: NetworkMonitor,
}

impl Clone for SyncHandle {
    fn clone(&self) -> Self {
        Self {
            cmd_tx: self.cmd_tx.clone(),
            events_tx: self.events_tx.clone(),
            monitor: self.monitor.clone(),
        }
    }
}

enum Command {
    Enqueue {
        kind: OpKind,
        payload: Payload,
        resp: oneshot::Sender<Result<EnvelopeId, SyncError>>,
    },
    Snapshot {
        resp: oneshot::Sender<Vec<Envelope>>,
    },
    Quarantined {
        resp: oneshot::Sender<Vec<Envelope>>,
    },
    Release {
        id: EnvelopeId,
        resp: oneshot::Sender<Result<(), SyncError>>,
    },
    Discard {
        id: EnvelopeId,
        resp: oneshot::Sender<Result<Envelope, SyncError>>,
    },
    SyncNow {
        resp: oneshot::Sender<()>,
    },
    Status {
        resp: oneshot::Sender<SyncStatus>,
    },
    Shutdown {
        resp: oneshot::Sender<Result<(), SyncError>>,
    },
}

struct AttemptDone {
    id: EnvelopeId,
    outcome: Result<(), DispatchError>,
}

/// Loads the queue from `slot` and starts the engine.
pub fn open_sync_engine<R: Remote>(
    slot: Box<dyn KvSlot>,
    remote: R,
    monitor: NetworkMonitor,
    config: SyncConfig,
) -> Result<SyncHandle, SyncError> {
    let store = QueueStore::load(slot, config.queue_keys())?;
    info!(pending = store.len(), quarantined = store.quarantined_len(), "queue loaded");
    Ok(spawn_sync_engine(store, remote, monitor, config))
}

/// Starts the engine task. It exclusively owns `store` from here on.
pub fn spawn_sync_engine<R: Remote>(
    store: QueueStore,
    remote: R,
    monitor: NetworkMonitor,
    config: SyncConfig,
) -> SyncHandle {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(config.command_queue_bound.max(1));
    let (events_tx, _) = broadcast::channel::<SyncEvent>(config.events_capacity.max(1));
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<AttemptDone>();
    let mut net_rx = monitor.subscribe();
    let period = Duration::from_millis(config.tick_interval_ms.max(1));

    let mut engine = Engine {
        store,
        remote: Arc::new(remote),
        monitor: monitor.clone(),
        config,
        events_tx: events_tx.clone(),
        done_tx,
        in_flight: None,
        attempts: HashMap::new(),
        closing: false,
    };

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut net_open = true;
        let mut shutdown: Option<oneshot::Sender<Result<(), SyncError>>> = None;

        // Catch up with anything queued before the engine existed.
        engine.trigger(Trigger::Manual);

        loop {
            tokio::select! {
                cmd = cmd_rx.recv(), if shutdown.is_none() => {
                    let Some(cmd) = cmd else { break; };
                    if let Some(resp) = engine.handle_command(cmd) {
                        shutdown = Some(resp);
                        if engine.in_flight.is_none() {
                            break;
                        }
                    }
                }
                changed = net_rx.changed(), if net_open => {
                    if changed.is_err() {
                        net_open = false;
                        continue;
                    }
                    let online = *net_rx.borrow_and_update();
                    engine.on_connectivity(online);
                }
                _ = ticker.tick() => {
                    engine.on_tick();
                }
                Some(done) = done_rx.recv() => {
                    engine.on_attempt_done(done);
                    if shutdown.is_some() {
                        break;
                    }
                }
            }
        }

        let result = engine.store.flush().map_err(SyncError::from);
        debug!(pending = engine.store.len(), "sync engine stopped");
        if let Some(resp) = shutdown {
            let _ = resp.send(result);
        }
    });

    SyncHandle {
        cmd_tx,
        events_tx,
        monitor,
    }
}

impl SyncHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events_tx.subscribe()
    }

    /// Connectivity monitor the engine listens to.
    pub fn monitor(&self) -> &NetworkMonitor {
        &self.monitor
    }

    /// Queues a write and returns once it is durable.
    pub async fn enqueue(
        &self,
        kind: impl Into<OpKind>,
        payload: Payload,
    ) -> Result<EnvelopeId, SyncError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Enqueue {
                kind: kind.into(),
                payload,
                resp: tx,
            })
            .await
            .map_err(|_| SyncError::ChannelClosed)?;
        rx.await.map_err(|_| SyncError::ChannelClosed)?
    }

    pub async fn snapshot(&self) -> Result<Vec<Envelope>, SyncError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Snapshot { resp: tx })
            .await
            .map_err(|_| SyncError::ChannelClosed)?;
        rx.await.map_err(|_| SyncError::ChannelClosed)
    }

    pub async fn quarantined(&self) -> Result<Vec<Envelope>, SyncError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Quarantined { resp: tx })
            .await
            .map_err(|_| SyncError::ChannelClosed)?;
        rx.await.map_err(|_| SyncError::ChannelClosed)
    }

    /// Puts a quarantined envelope back at the tail of the active queue.
    pub async fn release(&self, id: impl Into<EnvelopeId>) -> Result<(), SyncError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Release {
                id: id.into(),
                resp: tx,
            })
            .await
            .map_err(|_| SyncError::ChannelClosed)?;
        rx.await.map_err(|_| SyncError::ChannelClosed)?
    }

    /// Drops an envelope from the active or quarantined queue undelivered.
    pub async fn discard(&self, id: impl Into<EnvelopeId>) -> Result<Envelope, SyncError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Discard {
                id: id.into(),
                resp: tx,
            })
            .await
            .map_err(|_| SyncError::ChannelClosed)?;
        rx.await.map_err(|_| SyncError::ChannelClosed)?
    }

    /// Re-evaluates the drain guard now instead of waiting for the next tick.
    pub async fn sync_now(&self) -> Result<(), SyncError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::SyncNow { resp: tx })
            .await
            .map_err(|_| SyncError::ChannelClosed)?;
        rx.await.map_err(|_| SyncError::ChannelClosed)
    }

    pub async fn status(&self) -> Result<SyncStatus, SyncError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Status { resp: tx })
            .await
            .map_err(|_| SyncError::ChannelClosed)?;
        rx.await.map_err(|_| SyncError::ChannelClosed)
    }

    /// Stops the engine after any in-flight attempt has resolved.
    pub async fn shutdown(&self) -> Result<(), SyncError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Shutdown { resp: tx })
            .await
            .map_err(|_| SyncError::ChannelClosed)?;
        rx.await.map_err(|_| SyncError::ChannelClosed)?
    }
}

struct Engine<R: Remote> {
    store: QueueStore,
    remote: Arc<R>,
    monitor: NetworkMonitor,
    config: SyncConfig,
    events_tx: broadcast::Sender<SyncEvent>,
    done_tx: mpsc::UnboundedSender<AttemptDone>,
    /// Single-flight slot: the id currently being delivered.
    in_flight: Option<EnvelopeId>,
    attempts: HashMap<EnvelopeId, u32>,
    closing: bool,
}

impl<R: Remote> Engine<R> {
    fn handle_command(&mut self, cmd: Command) -> Option<oneshot::Sender<Result<(), SyncError>>> {
        match cmd {
            Command::Enqueue {
                kind,
                payload,
                resp,
            } => {
                let envelope = Envelope::new(kind, payload);
                let id = envelope.id().to_string();
                let res = self.store.append(envelope).map_err(SyncError::from);
                if res.is_ok() {
                    debug!(id = %id, pending = self.store.len(), "envelope queued");
                    self.emit(SyncEvent::Enqueued { id: id.clone() });
                    self.emit_pending();
                }
                let _ = resp.send(res.map(|()| id));
                self.trigger(Trigger::Enqueue);
            }
            Command::Snapshot { resp } => {
                let _ = resp.send(self.store.snapshot());
            }
            Command::Quarantined { resp } => {
                let _ = resp.send(self.store.quarantined());
            }
            Command::Release { id, resp } => {
                let res = match self.store.release(&id) {
                    Ok(true) => Ok(()),
                    Ok(false) => Err(SyncError::NotFound(id.clone())),
                    Err(err) => Err(SyncError::from(err)),
                };
                if res.is_ok() {
                    info!(id = %id, "quarantined envelope released");
                    self.emit_pending();
                }
                let _ = resp.send(res);
                self.trigger(Trigger::Manual);
            }
            Command::Discard { id, resp } => {
                let res = match self.store.discard(&id) {
                    Ok(Some(env)) => Ok(env),
                    Ok(None) => Err(SyncError::NotFound(id.clone())),
                    Err(err) => Err(SyncError::from(err)),
                };
                if res.is_ok() {
                    warn!(id = %id, "envelope discarded undelivered");
                    self.attempts.remove(&id);
                    self.emit_pending();
                }
                let _ = resp.send(res);
                self.trigger(Trigger::Manual);
            }
            Command::SyncNow { resp } => {
                self.trigger(Trigger::Manual);
                let _ = resp.send(());
            }
            Command::Status { resp } => {
                let head_attempts = self
                    .store
                    .head()
                    .and_then(|env| self.attempts.get(env.id()).copied())
                    .unwrap_or(0);
                let _ = resp.send(SyncStatus {
                    online: self.monitor.is_online(),
                    syncing: self.in_flight.is_some(),
                    pending: self.store.len(),
                    quarantined: self.store.quarantined_len(),
                    head_attempts,
                });
            }
            Command::Shutdown { resp } => {
                self.closing = true;
                return Some(resp);
            }
        }
        None
    }

    fn on_connectivity(&mut self, online: bool) {
        self.emit(SyncEvent::Connectivity { online });
        if online {
            self.trigger(Trigger::WentOnline);
        }
    }

    fn on_tick(&mut self) {
        if let Err(err) = self.store.flush() {
            error!(error = ?err, "queue rewrite failed");
        }
        self.trigger(Trigger::PeriodicTick);
    }

    /// Starts delivery of the head when the queue is non-empty, the monitor
    /// reports online and no attempt is in flight.
    fn trigger(&mut self, trigger: Trigger) {
        if self.closing {
            return;
        }
        if let Some(id) = &self.in_flight {
            debug!(?trigger, in_flight = %id, "attempt already in flight");
            return;
        }
        if !self.monitor.is_online() {
            debug!(?trigger, pending = self.store.len(), "offline, not draining");
            return;
        }
        let Some(envelope) = self.store.head().cloned() else {
            return;
        };

        let id = envelope.id().to_string();
        debug!(?trigger, id = %id, kind = %envelope.kind(), "attempting delivery");
        self.in_flight = Some(id.clone());
        self.emit(SyncEvent::AttemptStarted { id: id.clone() });

        let request = dispatch::resolve(&envelope);
        let key = self.config.send_idempotency_key.then(|| id.clone());
        let remote = Arc::clone(&self.remote);
        let done_tx = self.done_tx.clone();
        tokio::spawn(async move {
            let outcome = match request {
                Ok(request) => {
                    let attempt = tokio::spawn(async move { remote.submit(request, key).await });
                    match attempt.await {
                        Ok(outcome) => outcome,
                        Err(e) => Err(DispatchError::Network(format!("attempt aborted: {e}"))),
                    }
                }
                Err(err) => Err(err),
            };
            let _ = done_tx.send(AttemptDone { id, outcome });
        });
    }

    fn on_attempt_done(&mut self, done: AttemptDone) {
        let AttemptDone { id, outcome } = done;
        if self.in_flight.as_deref() == Some(id.as_str()) {
            self.in_flight = None;
        }

        let err = match outcome {
            Ok(()) => {
                self.attempts.remove(&id);
                let removed = match self.store.remove_by_id(&id) {
                    Ok(removed) => removed.is_some(),
                    Err(err) => {
                        // The removal still holds in memory; only the rewrite failed.
                        error!(id = %id, error = ?err, "delivered envelope removal not persisted");
                        true
                    }
                };
                if removed {
                    info!(id = %id, pending = self.store.len(), "envelope delivered");
                    self.emit(SyncEvent::Delivered { id });
                    self.emit_pending();
                } else {
                    debug!(id = %id, "delivered envelope was already discarded");
                }
                self.trigger(Trigger::Delivered);
                return;
            }
            Err(err) => err,
        };

        let class = err.class();
        if class == FailureClass::Terminal
            && self.config.client_error_policy == ClientErrorPolicy::Quarantine
        {
            self.attempts.remove(&id);
            match self.store.quarantine(&id) {
                Ok(true) => {}
                Ok(false) => return,
                Err(persist_err) => {
                    error!(id = %id, error = ?persist_err, "quarantine not persisted");
                }
            }
            warn!(id = %id, error = %err, "envelope rejected, quarantined");
            self.emit(SyncEvent::Quarantined { id });
            self.emit_pending();
            self.trigger(Trigger::Quarantined);
            return;
        }

        let still_queued = self.store.head().is_some_and(|head| head.id() == id);
        let attempts = if still_queued {
            let count = self.attempts.entry(id.clone()).or_insert(0);
            *count += 1;
            *count
        } else {
            0
        };
        warn!(id = %id, attempts, error = %err, "delivery failed, waiting for next trigger");
        self.emit(SyncEvent::AttemptFailed {
            id,
            transient: class == FailureClass::Transient,
        });
    }

    fn emit(&self, event: SyncEvent) {
        let _ = self.events_tx.send(event);
    }

    fn emit_pending(&self) {
        self.emit(SyncEvent::PendingChanged {
            pending: self.store.len(),
        });
    }
}
