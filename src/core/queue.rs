use tracing::{error, warn};

use crate::{
    envelope::Envelope,
    persist::{KvSlot, PersistResult},
};

/// Storage keys for the active and quarantined sequences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueKeys {
    pub active: String,
    pub quarantine: String,
}

impl Default for QueueKeys {
    fn default() -> Self {
        Self {
            active: "offline_queue".to_string(),
            quarantine: "offline_queue_quarantine".to_string(),
        }
    }
}

/// Ordered, durable FIFO of pending envelopes.
///
/// Insertion order is delivery order. Every mutation rewrites the whole
/// persisted sequence.
pub struct QueueStore {
    slot: Box<dyn KvSlot>,
    keys: QueueKeys,
    active: Vec<Envelope>,
    quarantine: Vec<Envelope>,
    dirty: bool,
}

impl QueueStore {
    /// Reconstructs the queue from `slot`.
    ///
    /// A missing key is an empty queue. Stored data that fails to decode is
    /// also treated as empty; read failures from the slot itself are returned.
    pub fn load(slot: Box<dyn KvSlot>, keys: QueueKeys) -> PersistResult<Self> {
        let active = read_sequence(slot.as_ref(), &keys.active)?;
        let quarantine = read_sequence(slot.as_ref(), &keys.quarantine)?;
        Ok(Self {
            slot,
            keys,
            active,
            quarantine,
            dirty: false,
        })
    }

    /// Adds `envelope` to the tail and persists before returning.
    ///
    /// If the write fails the envelope is not kept.
    pub fn append(&mut self, envelope: Envelope) -> PersistResult<()> {
        self.active.push(envelope);
        if let Err(err) = self.persist(&[Section::Active]) {
            self.active.pop();
            return Err(err);
        }
        Ok(())
    }

    /// Removes the envelope with `id` from the active sequence.
    ///
    /// On a failed write the removal stays in effect and the next mutation
    /// (or [`QueueStore::flush`]) rewrites the full state.
    pub fn remove_by_id(&mut self, id: &str) -> PersistResult<Option<Envelope>> {
        let Some(pos) = position(&self.active, id) else {
            return Ok(None);
        };
        let removed = self.active.remove(pos);
        self.persist(&[Section::Active])?;
        Ok(Some(removed))
    }

    /// Moves an active envelope to the tail of the quarantine sequence.
    ///
    /// The quarantine key is written before the active key, so a partial
    /// failure can only leave the envelope stored twice.
    pub fn quarantine(&mut self, id: &str) -> PersistResult<bool> {
        let Some(pos) = position(&self.active, id) else {
            return Ok(false);
        };
        let env = self.active.remove(pos);
        self.quarantine.push(env);
        self.persist(&[Section::Quarantine, Section::Active])?;
        Ok(true)
    }

    /// Moves a quarantined envelope back to the tail of the active sequence.
    pub fn release(&mut self, id: &str) -> PersistResult<bool> {
        let Some(pos) = position(&self.quarantine, id) else {
            return Ok(false);
        };
        let env = self.quarantine.remove(pos);
        self.active.push(env);
        self.persist(&[Section::Active, Section::Quarantine])?;
        Ok(true)
    }

    /// Deletes an envelope from either sequence without delivering it.
    pub fn discard(&mut self, id: &str) -> PersistResult<Option<Envelope>> {
        if let Some(pos) = position(&self.active, id) {
            let removed = self.active.remove(pos);
            self.persist(&[Section::Active])?;
            return Ok(Some(removed));
        }
        if let Some(pos) = position(&self.quarantine, id) {
            let removed = self.quarantine.remove(pos);
            self.persist(&[Section::Quarantine])?;
            return Ok(Some(removed));
        }
        Ok(None)
    }

    /// Rewrites persisted state if an earlier write failed.
    pub fn flush(&mut self) -> PersistResult<()> {
        if self.dirty {
            self.persist(&[Section::Quarantine, Section::Active])?;
        }
        Ok(())
    }

    /// Copy of the active sequence in delivery order.
    pub fn snapshot(&self) -> Vec<Envelope> {
        self.active.clone()
    }

    /// Copy of the quarantined sequence.
    pub fn quarantined(&self) -> Vec<Envelope> {
        self.quarantine.clone()
    }

    pub fn head(&self) -> Option<&Envelope> {
        self.active.first()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn quarantined_len(&self) -> usize {
        self.quarantine.len()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Writes `sections` in order. After an earlier failure the other
    /// section is written first as well, so the listed ones still land last.
    fn persist(&mut self, sections: &[Section]) -> PersistResult<()> {
        let mut order: Vec<Section> = Vec::with_capacity(2);
        if self.dirty {
            for section in [Section::Quarantine, Section::Active] {
                if !sections.contains(&section) {
                    order.push(section);
                }
            }
        }
        order.extend_from_slice(sections);

        let mut result = Ok(());
        for section in order {
            let (key, seq) = match section {
                Section::Active => (&self.keys.active, &self.active),
                Section::Quarantine => (&self.keys.quarantine, &self.quarantine),
            };
            result = write_sequence(self.slot.as_mut(), key, seq);
            if result.is_err() {
                break;
            }
        }
        if let Err(err) = &result {
            error!(error = ?err, pending = self.active.len(), "queue persistence failed");
        }
        self.dirty = result.is_err();
        result
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Active,
    Quarantine,
}

fn position(seq: &[Envelope], id: &str) -> Option<usize> {
    seq.iter().position(|env| env.id() == id)
}

fn read_sequence(slot: &dyn KvSlot, key: &str) -> PersistResult<Vec<Envelope>> {
    let Some(raw) = slot.read(key)? else {
        return Ok(Vec::new());
    };
    match serde_json::from_str::<Vec<Envelope>>(&raw) {
        Ok(seq) => Ok(seq),
        Err(err) => {
            warn!(key, error = %err, "stored queue is unreadable, starting empty");
            Ok(Vec::new())
        }
    }
}

fn write_sequence(slot: &mut dyn KvSlot, key: &str, seq: &[Envelope]) -> PersistResult<()> {
    let encoded = serde_json::to_string(seq)?;
    slot.write(key, &encoded)
}
