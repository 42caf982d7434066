//! Client move history: pooled records awaiting acknowledgement, the held
//! pending move, and the three outgoing move-data slots.
//!
//! Records are kept in tick order. Acknowledging a tick retires every record
//! up to it; the newest retired record becomes the baseline for importance
//! checks. The queue is bounded and evicts the oldest record when full.

use std::collections::VecDeque;

use crate::record::{MoveRecord, RecordPhase};
use crate::wire::{RequestPayload, ServerMovePacket};

/// Default number of unacknowledged records kept.
pub const DEFAULT_HISTORY_SIZE: usize = 96;

// ---------------------------------------------------------------------------
// MoveDataSlots
// ---------------------------------------------------------------------------

/// Slot of an outgoing move in [`MoveDataSlots`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MoveSlot {
    /// The newest move.
    New = 0,
    /// A held move that could not be combined with the newest.
    Pending = 1,
    /// The oldest unacknowledged important move, resent.
    Old = 2,
}

/// Fixed ring of three outgoing move payloads, indexed by [`MoveSlot`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MoveDataSlots {
    slots: [Option<RequestPayload>; 3],
}

impl MoveDataSlots {
    /// Stores `payload` in `slot`, replacing any previous payload.
    pub fn fill(&mut self, slot: MoveSlot, payload: RequestPayload) {
        self.slots[slot as usize] = Some(payload);
    }

    /// Payload in `slot`.
    pub fn get(&self, slot: MoveSlot) -> Option<&RequestPayload> {
        self.slots[slot as usize].as_ref()
    }

    /// Empties every slot.
    pub fn clear(&mut self) {
        self.slots = Default::default();
    }

    /// Moves the filled slots into a packet, leaving the ring empty.
    pub fn take_packet(&mut self) -> ServerMovePacket {
        let [new, pending, old] = std::mem::take(&mut self.slots);
        ServerMovePacket {
            new,
            pending,
            old,
            correction_seen: None,
        }
    }
}

// ---------------------------------------------------------------------------
// MoveHistory
// ---------------------------------------------------------------------------

/// Saved moves of a predicting client.
#[derive(Debug, Clone)]
pub struct MoveHistory {
    saved: VecDeque<MoveRecord>,
    pending: Option<MoveRecord>,
    last_acked: Option<MoveRecord>,
    pool: Vec<MoveRecord>,
    slots: MoveDataSlots,
    max_saved: usize,
    resend_important_only: bool,
}

impl Default for MoveHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_SIZE, true)
    }
}

impl MoveHistory {
    /// Creates a history holding at most `max_saved` unacknowledged records.
    ///
    /// With `resend_important_only`, only records whose `wanted` differs from
    /// the last acknowledged record are resent in the old slot.
    pub fn new(max_saved: usize, resend_important_only: bool) -> Self {
        let max_saved = max_saved.max(1);
        Self {
            saved: VecDeque::with_capacity(max_saved),
            pending: None,
            last_acked: None,
            pool: Vec::new(),
            slots: MoveDataSlots::default(),
            max_saved,
            resend_important_only,
        }
    }

    /// Number of sent, unacknowledged records.
    pub fn len(&self) -> usize {
        self.saved.len()
    }

    /// Returns `true` if nothing awaits acknowledgement.
    pub fn is_empty(&self) -> bool {
        self.saved.is_empty()
    }

    /// The newest acknowledged record.
    pub fn last_acked(&self) -> Option<&MoveRecord> {
        self.last_acked.as_ref()
    }

    /// The held, unsent move.
    pub fn pending(&self) -> Option<&MoveRecord> {
        self.pending.as_ref()
    }

    /// A cleared record, reused from the pool when possible.
    pub fn allocate(&mut self) -> MoveRecord {
        self.pool.pop().unwrap_or_default()
    }

    /// Returns a record to the pool.
    pub fn recycle(&mut self, mut record: MoveRecord) {
        record.clear();
        self.pool.push(record);
    }

    /// Removes and returns the held move.
    pub fn take_pending(&mut self) -> Option<MoveRecord> {
        self.pending.take()
    }

    /// Holds `record` for one tick so the next move may combine with it.
    pub fn hold(&mut self, record: MoveRecord) {
        if let Some(previous) = self.pending.replace(record) {
            tracing::warn!(tick = previous.tick(), "replacing unsent pending move");
            self.recycle(previous);
        }
    }

    /// Sends `pending` (if any) and `new`, plus the oldest unacknowledged
    /// record worth resending, and returns the packet.
    pub fn send(&mut self, pending: Option<MoveRecord>, new: MoveRecord) -> ServerMovePacket {
        for record in &mut self.saved {
            if record.phase() == RecordPhase::Sent {
                record.advance(RecordPhase::Unacked);
            }
        }

        let last_acked = self.last_acked.as_ref();
        let resend_important_only = self.resend_important_only;
        if let Some(old) = self.saved.iter_mut().find(|r| {
            matches!(r.phase(), RecordPhase::Unacked | RecordPhase::Resent)
                && (!resend_important_only || r.is_important(last_acked))
        }) {
            old.advance(RecordPhase::Resent);
            self.slots.fill(MoveSlot::Old, old.to_request());
        }

        if let Some(mut pending) = pending {
            pending.advance(RecordPhase::Sent);
            self.slots.fill(MoveSlot::Pending, pending.to_request());
            self.push_saved(pending);
        }
        let mut new = new;
        new.advance(RecordPhase::Sent);
        self.slots.fill(MoveSlot::New, new.to_request());
        self.push_saved(new);

        self.slots.take_packet()
    }

    fn push_saved(&mut self, record: MoveRecord) {
        if let Some(last) = self.saved.back()
            && last.tick() >= record.tick()
        {
            tracing::warn!(
                last = last.tick(),
                tick = record.tick(),
                "dropping out-of-order move record"
            );
            self.recycle(record);
            return;
        }
        self.saved.push_back(record);
        while self.saved.len() > self.max_saved {
            if let Some(evicted) = self.saved.pop_front() {
                tracing::warn!(tick = evicted.tick(), "move history full, evicting oldest record");
                self.recycle(evicted);
            }
        }
    }

    /// Retires every record with a tick at or before `tick`. Returns how
    /// many were retired.
    pub fn ack(&mut self, tick: u64) -> usize {
        let mut retired = 0;
        while self.saved.front().is_some_and(|r| r.tick() <= tick) {
            let Some(mut record) = self.saved.pop_front() else {
                break;
            };
            record.advance(RecordPhase::Acked);
            if let Some(previous) = self.last_acked.replace(record) {
                self.recycle(previous);
            }
            retired += 1;
        }
        if retired > 0 {
            tracing::trace!(tick, retired, remaining = self.saved.len(), "acknowledged moves");
        }
        retired
    }

    /// Unacknowledged records in tick order, followed by the held move.
    pub fn unacked(&self) -> impl Iterator<Item = &MoveRecord> {
        self.saved.iter().chain(self.pending.iter())
    }

    /// Mutable [`unacked`](Self::unacked), for resimulation.
    pub fn unacked_mut(&mut self) -> impl Iterator<Item = &mut MoveRecord> {
        self.saved.iter_mut().chain(self.pending.iter_mut())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
