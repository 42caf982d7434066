//! Server reconciliation protocol.
//!
//! The client captures a [`MoveRecord`] per tick, reconciles, and sends moves
//! carrying its client-authored `wanted` and resulting correctable `active`.
//! The server writes the client-predicted tiers, lets game logic override
//! them, reconciles with its own eligibility, and answers with an ack or,
//! when any correctable `active` differs from the claim, a correction. On a
//! correction the client applies the authoritative levels and replays every
//! unacknowledged move, keeping its local-predicted intent exactly as
//! captured.

use crate::bitset::Level;
use crate::category::{Authority, Predicting, Proxy, TierLevels};
use crate::eligibility::MotionEligibility;
use crate::history::MoveHistory;
use crate::reconcile::{ChangeKind, ModifierEvent, ModifierEventBuffer};
use crate::record::MoveRecord;
use crate::set::ModifierSet;
use crate::wire::{
    CorrectionPayload, ReplicatedLevels, RequestPayload, ServerMovePacket, WireMessage,
};

/// Client ticks the server waits for a correction to be applied before
/// correcting again.
pub const CORRECTION_TIMEOUT_TICKS: u64 = 64;

// ---------------------------------------------------------------------------
// ClientSync
// ---------------------------------------------------------------------------

/// Predicting client: modifier set, move history and pending events.
#[derive(Debug, Clone)]
pub struct ClientSync {
    set: ModifierSet<Predicting>,
    history: MoveHistory,
    events: ModifierEventBuffer,
    last_server_tick: Option<u64>,
    last_correction: Option<u64>,
}

impl ClientSync {
    /// Wraps `set` with an empty history.
    pub fn new(set: ModifierSet<Predicting>, history: MoveHistory) -> Self {
        Self {
            set,
            history,
            events: ModifierEventBuffer::new(),
            last_server_tick: None,
            last_correction: None,
        }
    }

    /// Modifier set.
    pub fn set(&self) -> &ModifierSet<Predicting> {
        &self.set
    }

    /// Modifier set, for game logic mutating predicted tiers.
    pub fn set_mut(&mut self) -> &mut ModifierSet<Predicting> {
        &mut self.set
    }

    /// Move history.
    pub fn history(&self) -> &MoveHistory {
        &self.history
    }

    /// Tick of the newest correction applied.
    pub fn last_correction(&self) -> Option<u64> {
        self.last_correction
    }

    /// Level-change events raised since the last drain.
    pub fn events(&self) -> &ModifierEventBuffer {
        &self.events
    }

    /// Level-change events, mutable.
    pub fn events_mut(&mut self) -> &mut ModifierEventBuffer {
        &mut self.events
    }

    /// Runs one client tick: capture, combine with the held move when
    /// possible, reconcile, and record the resulting `active`.
    ///
    /// Returns the packet to send, or `None` when the move is held to be
    /// combined with the next one.
    pub fn tick(&mut self, tick: u64, eligibility: &impl MotionEligibility) -> Option<ServerMovePacket> {
        let mut new = self.history.allocate();
        new.capture(tick, &self.set);

        let mut combined = false;
        let pending = match self.history.take_pending() {
            Some(mut pending) if new.can_combine_with(&pending) => {
                new.combine_with(&mut pending, &mut self.set);
                self.history.recycle(pending);
                combined = true;
                None
            }
            other => other,
        };

        new.restore_initial_position(&self.set);
        self.set.reconcile(eligibility, &mut self.events);
        new.post_update(&self.set);

        if pending.is_none() && !combined && !new.is_important(self.history.last_acked()) {
            tracing::trace!(tick, "holding move for combining");
            self.history.hold(new);
            return None;
        }
        let mut packet = self.history.send(pending, new);
        packet.correction_seen = self.last_correction;
        Some(packet)
    }

    /// Handles an acknowledgement. Returns the number of records retired.
    pub fn on_ack(&mut self, tick: u64) -> usize {
        self.last_server_tick = self.last_server_tick.max(Some(tick));
        self.history.ack(tick)
    }

    /// Applies a correction and replays every unacknowledged move.
    ///
    /// `replay` resimulates one move and returns the eligibility that move
    /// ended with. Local-predicted `wanted` is taken from each record during
    /// the replay and restored to its live value afterwards. Events are
    /// raised only for net changes across the whole correction. Returns the
    /// number of moves replayed.
    ///
    /// A correction older than the newest ack or correction already handled
    /// is dropped without replaying anything.
    pub fn on_correction<E, F>(&mut self, mut payload: CorrectionPayload, mut replay: F) -> usize
    where
        E: MotionEligibility,
        F: FnMut(&MoveRecord) -> E,
    {
        if let Some(last) = self.last_server_tick
            && payload.tick < last
        {
            tracing::trace!(tick = payload.tick, last, "dropping stale correction");
            return 0;
        }
        self.last_server_tick = Some(payload.tick);
        self.last_correction = Some(payload.tick);
        payload.sanitize(self.set.len());
        let before: Vec<(Level, TierLevels)> = self
            .set
            .iter()
            .map(|c| (c.effective_level(), c.tier_levels()))
            .collect();

        self.history.ack(payload.tick);
        let changed = self.set.apply_correction(&payload);
        tracing::debug!(tick = payload.tick, changed, "applying modifier correction");

        let live = self.set.snapshot_local_wanted();
        let mut scratch = ModifierEventBuffer::new();
        let mut replayed = 0;
        for record in self.history.unacked_mut() {
            record.replay_local_wanted(&mut self.set);
            record.restore_initial_position(&self.set);
            let eligibility = replay(record);
            self.set.reconcile(&eligibility, &mut scratch);
            record.post_update(&self.set);
            replayed += 1;
        }
        self.set.restore_local_wanted(&live);

        for (category, (old_level, old_tiers)) in self.set.iter().zip(before) {
            let new_level = category.effective_level();
            if new_level != old_level {
                self.events.send(ModifierEvent {
                    category: category.id(),
                    kind: ChangeKind::classify(old_level, new_level, category.spec().invalid_level),
                    new_level,
                    old_level,
                    new_tiers: category.tier_levels(),
                    old_tiers,
                });
            }
        }
        tracing::debug!(tick = payload.tick, replayed, "resimulated after correction");
        replayed
    }

    /// Dispatches a server message. Moves and replication snapshots are not
    /// addressed to a predicting client and are ignored.
    pub fn handle_message<E, F>(&mut self, msg: WireMessage, replay: F)
    where
        E: MotionEligibility,
        F: FnMut(&MoveRecord) -> E,
    {
        match msg {
            WireMessage::Ack { tick } => {
                self.on_ack(tick);
            }
            WireMessage::Correction(payload) => {
                self.on_correction(payload, replay);
            }
            WireMessage::Moves(_) | WireMessage::Replicated(_) => {
                tracing::warn!("predicting client ignoring unexpected message");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ServerSync
// ---------------------------------------------------------------------------

/// The server's answer to a packet of moves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerResponse {
    /// Every processed move up to `tick` agreed.
    Ack {
        /// Newest processed client tick.
        tick: u64,
    },
    /// The newest processed move diverged.
    Correction(CorrectionPayload),
}

impl From<ServerResponse> for WireMessage {
    fn from(response: ServerResponse) -> Self {
        match response {
            ServerResponse::Ack { tick } => WireMessage::Ack { tick },
            ServerResponse::Correction(payload) => WireMessage::Correction(payload),
        }
    }
}

/// Authority for one client's entity.
#[derive(Debug, Clone)]
pub struct ServerSync {
    set: ModifierSet<Authority>,
    events: ModifierEventBuffer,
    last_processed: Option<u64>,
    awaiting_correction: Option<u64>,
    corrections_sent: u64,
    corrections_suppressed: u64,
}

impl ServerSync {
    /// Wraps `set`.
    pub fn new(set: ModifierSet<Authority>) -> Self {
        Self {
            set,
            events: ModifierEventBuffer::new(),
            last_processed: None,
            awaiting_correction: None,
            corrections_sent: 0,
            corrections_suppressed: 0,
        }
    }

    /// Modifier set.
    pub fn set(&self) -> &ModifierSet<Authority> {
        &self.set
    }

    /// Modifier set, for server game logic.
    pub fn set_mut(&mut self) -> &mut ModifierSet<Authority> {
        &mut self.set
    }

    /// Level-change events, mutable.
    pub fn events_mut(&mut self) -> &mut ModifierEventBuffer {
        &mut self.events
    }

    /// Newest client tick processed.
    pub fn last_processed(&self) -> Option<u64> {
        self.last_processed
    }

    /// Number of corrections produced so far.
    pub fn corrections_sent(&self) -> u64 {
        self.corrections_sent
    }

    /// Divergent moves answered with an ack because the client had not yet
    /// applied the previous correction.
    pub fn corrections_suppressed(&self) -> u64 {
        self.corrections_suppressed
    }

    /// Processes the packet's moves in tick order, skipping ticks already
    /// processed. Returns `None` if every move was stale.
    pub fn receive(
        &mut self,
        packet: ServerMovePacket,
        eligibility: &impl MotionEligibility,
    ) -> Option<ServerResponse> {
        self.receive_with(packet, eligibility, |_, _| {})
    }

    /// Like [`receive`](Self::receive), running `authority` after each move's
    /// client-predicted levels are written and before it is reconciled.
    ///
    /// Server game logic uses the hook to override the with-correction tier
    /// or to author server-only levels for that move.
    ///
    /// While a correction is in flight, moves the client sent before
    /// applying it still carry the old claim. Such moves are acked rather
    /// than corrected again, until the client reports the correction or
    /// [`CORRECTION_TIMEOUT_TICKS`] pass.
    pub fn receive_with<F>(
        &mut self,
        packet: ServerMovePacket,
        eligibility: &impl MotionEligibility,
        mut authority: F,
    ) -> Option<ServerResponse>
    where
        F: FnMut(&mut ModifierSet<Authority>, &RequestPayload),
    {
        let seen = packet.correction_seen;
        let mut newest = None;
        let mut diverged = false;
        for mut request in packet.into_ordered() {
            if self.last_processed.is_some_and(|last| request.tick <= last) {
                tracing::trace!(tick = request.tick, "skipping already processed move");
                continue;
            }
            request.sanitize(self.set.len());
            self.set.apply_request(&request);
            authority(&mut self.set, &request);
            self.set.reconcile(eligibility, &mut self.events);
            diverged = self.set.server_disagrees(&request);
            self.last_processed = Some(request.tick);
            newest = Some(request.tick);
        }

        let tick = newest?;
        if diverged && self.correction_in_flight(seen, tick) {
            self.corrections_suppressed += 1;
            tracing::trace!(tick, "client has not applied the last correction yet");
            return Some(ServerResponse::Ack { tick });
        }
        if diverged {
            self.awaiting_correction = Some(tick);
            self.corrections_sent += 1;
            tracing::debug!(tick, "client modifier state diverged, queueing correction");
            Some(ServerResponse::Correction(self.set.build_correction(tick)))
        } else {
            Some(ServerResponse::Ack { tick })
        }
    }

    fn correction_in_flight(&self, seen: Option<u64>, tick: u64) -> bool {
        let Some(sent) = self.awaiting_correction else {
            return false;
        };
        seen.is_none_or(|seen| seen < sent) && tick < sent + CORRECTION_TIMEOUT_TICKS
    }

    /// Snapshot of effective levels for simulated proxies.
    pub fn replicate(&self, tick: u64) -> ReplicatedLevels {
        ReplicatedLevels {
            tick,
            levels: self.set.replicated_levels(),
        }
    }
}

// ---------------------------------------------------------------------------
// ProxySync
// ---------------------------------------------------------------------------

/// Simulated proxy mirroring another entity's effective levels.
#[derive(Debug, Clone)]
pub struct ProxySync {
    set: ModifierSet<Proxy>,
    events: ModifierEventBuffer,
    last_tick: Option<u64>,
}

impl ProxySync {
    /// Wraps `set`.
    pub fn new(set: ModifierSet<Proxy>) -> Self {
        Self {
            set,
            events: ModifierEventBuffer::new(),
            last_tick: None,
        }
    }

    /// Modifier set.
    pub fn set(&self) -> &ModifierSet<Proxy> {
        &self.set
    }

    /// Level-change events, mutable.
    pub fn events_mut(&mut self) -> &mut ModifierEventBuffer {
        &mut self.events
    }

    /// Adopts a replication snapshot. Snapshots older than the last one
    /// adopted are ignored. Returns the number of events raised.
    pub fn on_replicated(&mut self, snapshot: &ReplicatedLevels) -> usize {
        if self.last_tick.is_some_and(|last| snapshot.tick < last) {
            tracing::trace!(tick = snapshot.tick, "ignoring stale replication snapshot");
            return 0;
        }
        self.last_tick = Some(snapshot.tick);
        self.set.adopt_replicated(&snapshot.levels, &mut self.events)
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
