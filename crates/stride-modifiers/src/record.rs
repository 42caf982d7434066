//! Per-tick move record.
//!
//! A record snapshots every tier's `wanted` (and, for correctable tiers,
//! `active`) for one client tick. The history uses it to merge identical
//! consecutive ticks, pick moves worth resending, and restore client intent
//! during resimulation.

use crate::category::{CategoryId, Predicting};
use crate::levels::PackedLevels;
use crate::set::ModifierSet;
use crate::tier::TierContainer;
use crate::wire::{CategoryRequest, RequestPayload};

// ---------------------------------------------------------------------------
// RecordPhase
// ---------------------------------------------------------------------------

/// Lifecycle of a [`MoveRecord`].
///
/// `Cleared -> Captured -> (CombinedAway | Sent -> Acked | Sent -> Unacked -> Resent -> Acked)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RecordPhase {
    /// Pooled, holds nothing.
    #[default]
    Cleared,
    /// Holds a tick's snapshot, not yet sent.
    Captured,
    /// Merged into a newer record and discarded.
    CombinedAway,
    /// Sent once, awaiting acknowledgement.
    Sent,
    /// A newer move went out without this one being acknowledged.
    Unacked,
    /// Sent again as the packet's old move.
    Resent,
    /// Acknowledged by the server. Terminal.
    Acked,
}

impl RecordPhase {
    /// Returns `true` if `self -> next` is a legal transition.
    pub fn can_advance(self, next: RecordPhase) -> bool {
        use RecordPhase::*;
        matches!(
            (self, next),
            (_, Cleared)
                | (Cleared, Captured)
                | (Captured, CombinedAway | Sent)
                | (Sent, Acked | Unacked)
                | (Unacked, Resent | Acked)
                | (Resent, Resent | Acked)
        )
    }

    /// Returns `true` while the server has not acknowledged the record.
    pub fn awaiting_ack(self) -> bool {
        matches!(self, Self::Sent | Self::Unacked | Self::Resent)
    }
}

// ---------------------------------------------------------------------------
// MoveRecord
// ---------------------------------------------------------------------------

/// One category's captured levels. `None` marks a disabled tier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryRecord {
    /// Category index.
    pub category: CategoryId,
    /// Local-predicted `wanted`.
    pub local_wanted: Option<PackedLevels>,
    /// With-correction `wanted`.
    pub correction_wanted: Option<PackedLevels>,
    /// Mirror of the server-authoritative `wanted`.
    pub server_wanted: Option<PackedLevels>,
    /// With-correction `active` after the tick's update.
    pub correction_active: Option<PackedLevels>,
    /// Server-authoritative `active` after the tick's update.
    pub server_active: Option<PackedLevels>,
}

impl CategoryRecord {
    fn wanted_eq(&self, other: &CategoryRecord) -> bool {
        self.category == other.category
            && self.local_wanted == other.local_wanted
            && self.correction_wanted == other.correction_wanted
            && self.server_wanted == other.server_wanted
    }

    fn wanted_is_empty(&self) -> bool {
        [&self.local_wanted, &self.correction_wanted, &self.server_wanted]
            .into_iter()
            .flatten()
            .all(PackedLevels::is_empty)
    }
}

/// Snapshot of an entity's modifier tiers for one client tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MoveRecord {
    tick: u64,
    phase: RecordPhase,
    categories: Vec<CategoryRecord>,
}

impl MoveRecord {
    /// Creates a cleared record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tick the record was captured on.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> RecordPhase {
        self.phase
    }

    /// Captured categories.
    pub fn categories(&self) -> &[CategoryRecord] {
        &self.categories
    }

    /// Moves to `next` if legal. Illegal transitions are logged and ignored.
    pub fn advance(&mut self, next: RecordPhase) -> bool {
        if !self.phase.can_advance(next) {
            tracing::warn!(tick = self.tick, from = ?self.phase, to = ?next, "illegal move record transition");
            return false;
        }
        self.phase = next;
        true
    }

    /// Resets to empty for pooled reuse. Keeps the allocation.
    pub fn clear(&mut self) {
        self.tick = 0;
        self.phase = RecordPhase::Cleared;
        self.categories.clear();
    }

    /// Captures every tier's `wanted` and every correctable tier's `active`.
    pub fn capture(&mut self, tick: u64, set: &ModifierSet<Predicting>) {
        self.clear();
        self.tick = tick;
        self.categories.extend(set.iter().map(|c| CategoryRecord {
            category: c.id(),
            local_wanted: c.local().map(TierContainer::packed_wanted),
            correction_wanted: c.correction().map(TierContainer::packed_wanted),
            server_wanted: c.server().map(TierContainer::packed_wanted),
            correction_active: c.correction().map(TierContainer::packed_active),
            server_active: c.server().map(TierContainer::packed_active),
        }));
        self.advance(RecordPhase::Captured);
    }

    /// Returns `true` if every tier's `wanted` is identical, so merging the
    /// two ticks cannot change the observable sequence of states.
    pub fn can_combine_with(&self, other: &MoveRecord) -> bool {
        self.categories.len() == other.categories.len()
            && self
                .categories
                .iter()
                .zip(&other.categories)
                .all(|(a, b)| a.wanted_eq(b))
    }

    /// Absorbs `older`, which is being discarded, and resets the entity's
    /// live client-authored `wanted` to the older record's so the merged
    /// move replays from the same intent.
    pub fn combine_with(&mut self, older: &mut MoveRecord, set: &mut ModifierSet<Predicting>) {
        restore_client_wanted(&older.categories, set);
        older.advance(RecordPhase::CombinedAway);
        tracing::debug!(older = older.tick, newer = self.tick, "combined identical moves");
    }

    /// Re-reads the entity's live `wanted` into the record before a
    /// resimulation pass.
    pub fn restore_initial_position(&mut self, set: &ModifierSet<Predicting>) {
        for (record, category) in self.categories.iter_mut().zip(set.iter()) {
            record.local_wanted = category.local().map(TierContainer::packed_wanted);
            record.correction_wanted = category.correction().map(TierContainer::packed_wanted);
            record.server_wanted = category.server().map(TierContainer::packed_wanted);
        }
    }

    /// Returns `true` if `wanted` differs from the last acknowledged record.
    /// With nothing acknowledged yet, any non-empty `wanted` is important.
    pub fn is_important(&self, last_acked: Option<&MoveRecord>) -> bool {
        match last_acked {
            Some(acked) => !self.can_combine_with(acked),
            None => !self.categories.iter().all(CategoryRecord::wanted_is_empty),
        }
    }

    /// Captures the `active` levels the tick's update ended with.
    pub fn post_update(&mut self, set: &ModifierSet<Predicting>) {
        for (record, category) in self.categories.iter_mut().zip(set.iter()) {
            record.correction_active = category.correction().map(TierContainer::packed_active);
            record.server_active = category.server().map(TierContainer::packed_active);
        }
    }

    /// Puts the record's local-predicted `wanted` back on the entity, as
    /// resimulation requires.
    pub fn replay_local_wanted(&self, set: &mut ModifierSet<Predicting>) {
        for record in &self.categories {
            if let (Some(category), Some(levels)) = (set.get_mut(record.category), &record.local_wanted)
                && let Some(tier) = category.local.as_mut()
            {
                tier.restore_wanted(levels);
            }
        }
    }

    /// Builds the wire request. The server-authoritative `wanted` mirror is
    /// never sent.
    pub fn to_request(&self) -> RequestPayload {
        RequestPayload {
            tick: self.tick,
            categories: self
                .categories
                .iter()
                .map(|c| CategoryRequest {
                    category: c.category,
                    local_wanted: c.local_wanted.clone(),
                    correction_wanted: c.correction_wanted.clone(),
                    correction_active: c.correction_active.clone(),
                    server_active: c.server_active.clone(),
                })
                .collect(),
        }
    }
}

fn restore_client_wanted(records: &[CategoryRecord], set: &mut ModifierSet<Predicting>) {
    for record in records {
        let Some(category) = set.get_mut(record.category) else {
            continue;
        };
        if let (Some(tier), Some(levels)) = (category.local.as_mut(), &record.local_wanted) {
            tier.restore_wanted(levels);
        }
        if let (Some(tier), Some(levels)) = (category.correction.as_mut(), &record.correction_wanted) {
            tier.restore_wanted(levels);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::eligibility::MotionState;
    use crate::reconcile::ModifierEventBuffer;
    use crate::set::ModifierCatalog;
    use crate::tier::PredictedTier;

    fn client() -> ModifierSet<Predicting> {
        ModifierSet::new(Arc::new(ModifierCatalog::with_defaults().unwrap()))
    }

    fn boost(set: &ModifierSet<Predicting>) -> CategoryId {
        set.catalog().id_of("Boost").unwrap()
    }

    #[test]
    fn test_phase_transitions() {
        use RecordPhase::*;
        assert!(Cleared.can_advance(Captured));
        assert!(Captured.can_advance(Sent));
        assert!(Captured.can_advance(CombinedAway));
        assert!(Sent.can_advance(Unacked));
        assert!(Unacked.can_advance(Resent));
        assert!(Resent.can_advance(Acked));
        assert!(Acked.can_advance(Cleared));
        assert!(!Cleared.can_advance(Sent));
        assert!(!Acked.can_advance(Resent));
        assert!(!CombinedAway.can_advance(Sent));
    }

    #[test]
    fn test_illegal_advance_is_refused() {
        let mut record = MoveRecord::new();
        assert!(!record.advance(RecordPhase::Acked));
        assert_eq!(record.phase(), RecordPhase::Cleared);
    }

    #[test]
    fn test_capture_and_clear() {
        let mut set = client();
        let id = boost(&set);
        set.add(id, PredictedTier::LocalPredicted, 1);
        let mut record = MoveRecord::new();
        record.capture(4, &set);
        assert_eq!(record.phase(), RecordPhase::Captured);
        assert_eq!(record.tick(), 4);
        assert_eq!(record.categories().len(), set.len());
        assert!(!record.categories()[0].local_wanted.as_ref().unwrap().is_empty());

        record.clear();
        assert_eq!(record, MoveRecord::new());
    }

    #[test]
    fn test_combine_requires_identical_wanted() {
        let mut set = client();
        let id = boost(&set);
        let mut a = MoveRecord::new();
        a.capture(1, &set);
        let mut b = MoveRecord::new();
        b.capture(2, &set);
        assert!(a.can_combine_with(&b));

        set.add(id, PredictedTier::LocalPredicted, 1);
        let mut c = MoveRecord::new();
        c.capture(3, &set);
        assert!(!b.can_combine_with(&c));
    }

    #[test]
    fn test_combined_replay_matches_individual_replay() {
        let mut set = client();
        let id = boost(&set);
        set.add(id, PredictedTier::LocalPredicted, 2);
        let mut older = MoveRecord::new();
        older.capture(1, &set);
        let mut newer = MoveRecord::new();
        newer.capture(2, &set);
        assert!(newer.can_combine_with(&older));

        let individual = set.snapshot_local_wanted();
        newer.combine_with(&mut older, &mut set);
        assert_eq!(older.phase(), RecordPhase::CombinedAway);
        assert_eq!(set.snapshot_local_wanted(), individual);
    }

    #[test]
    fn test_importance_against_last_acked() {
        let mut set = client();
        let id = boost(&set);
        let mut idle = MoveRecord::new();
        idle.capture(1, &set);
        assert!(!idle.is_important(None));

        set.add(id, PredictedTier::LocalPredicted, 1);
        let mut boosted = MoveRecord::new();
        boosted.capture(2, &set);
        assert!(boosted.is_important(None));
        assert!(boosted.is_important(Some(&idle)));
        assert!(!boosted.is_important(Some(&boosted.clone())));
    }

    #[test]
    fn test_post_update_captures_resulting_active() {
        let mut set = client();
        let slow = set.catalog().id_of("Slow").unwrap();
        set.add(slow, PredictedTier::WithCorrection, 1);
        let mut record = MoveRecord::new();
        record.capture(1, &set);
        assert!(record.categories()[1].correction_active.as_ref().unwrap().is_empty());

        set.reconcile(&MotionState::grounded(), &mut ModifierEventBuffer::new());
        record.post_update(&set);
        assert!(!record.categories()[1].correction_active.as_ref().unwrap().is_empty());
        let request = record.to_request();
        assert_eq!(request.tick, 1);
        assert_eq!(request.categories[1].correction_active, record.categories()[1].correction_active);
    }

    #[test]
    fn test_restore_initial_position_rereads_live_wanted() {
        let mut set = client();
        let id = boost(&set);
        let mut record = MoveRecord::new();
        record.capture(1, &set);
        set.add(id, PredictedTier::LocalPredicted, 3);
        record.restore_initial_position(&set);
        let mut fresh = MoveRecord::new();
        fresh.capture(1, &set);
        assert!(record.can_combine_with(&fresh));
    }
}
