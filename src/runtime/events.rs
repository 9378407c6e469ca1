//! Runtime event stream payloads.

use crate::types::EnvelopeId;

/// Events emitted from the sync engine loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// An envelope was durably queued.
    Enqueued {
        /// Queued envelope id.
        id: EnvelopeId,
    },
    /// A delivery attempt for the queue head began.
    AttemptStarted {
        /// Envelope being delivered.
        id: EnvelopeId,
    },
    /// The remote confirmed the envelope and it left the queue.
    Delivered {
        /// Delivered envelope id.
        id: EnvelopeId,
    },
    /// A delivery attempt failed; the envelope stays at the head.
    AttemptFailed {
        /// Envelope that failed.
        id: EnvelopeId,
        /// False when the remote rejected the request outright.
        transient: bool,
    },
    /// The envelope was moved out of the active queue after a terminal failure.
    Quarantined {
        /// Quarantined envelope id.
        id: EnvelopeId,
    },
    /// Connectivity flipped.
    Connectivity {
        /// New state.
        online: bool,
    },
    /// Active queue length changed.
    PendingChanged {
        /// Envelopes awaiting delivery.
        pending: usize,
    },
}
