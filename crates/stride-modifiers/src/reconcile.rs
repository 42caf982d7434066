//! Per-tick reconciliation step and level-change notifications.
//!
//! Each tick, every tier refreshes `active` from `wanted` through the
//! eligibility gate. Only when some tier's `active` changed are the per-tier
//! and effective levels recomputed, and only when the effective level moves
//! is a [`ModifierEvent`] raised.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

use crate::aggregate::{combine_tiers, reduce};
use crate::bitset::Level;
use crate::category::{CategoryId, ModifierCategory, Proxy, Reconciling, Role, TierLevels};
use crate::tier::TierContainer;
use crate::tier::TierKind;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// What happened to a category's effective level, judged by crossing the
/// "no modifier" level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    /// From no modifier to some level.
    Added,
    /// From one level to another.
    Changed,
    /// From some level to no modifier.
    Removed,
}

impl ChangeKind {
    /// Classifies a transition from `old` to `new`.
    pub fn classify(old: Level, new: Level, invalid: Level) -> Self {
        if new == invalid {
            Self::Removed
        } else if old == invalid {
            Self::Added
        } else {
            Self::Changed
        }
    }
}

/// Effective-level change for one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifierEvent {
    /// Category that changed.
    pub category: CategoryId,
    /// Added, changed or removed.
    pub kind: ChangeKind,
    /// Effective level after the change.
    pub new_level: Level,
    /// Effective level before the change.
    pub old_level: Level,
    /// Per-tier levels after the change.
    pub new_tiers: TierLevels,
    /// Per-tier levels before the change.
    pub old_tiers: TierLevels,
}

/// Per-entity queue of [`ModifierEvent`]s, drained by game logic.
#[derive(Component, Debug, Clone, Default)]
pub struct ModifierEventBuffer {
    events: Vec<ModifierEvent>,
}

impl ModifierEventBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an event.
    pub fn send(&mut self, event: ModifierEvent) {
        self.events.push(event);
    }

    /// Events queued since the last drain, oldest first.
    pub fn read(&self) -> &[ModifierEvent] {
        &self.events
    }

    /// Removes and returns every queued event.
    pub fn drain(&mut self) -> std::vec::Drain<'_, ModifierEvent> {
        self.events.drain(..)
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Drops every queued event.
    pub fn clear(&mut self) {
        self.events.clear();
    }
}

// ---------------------------------------------------------------------------
// ReconciliationStep
// ---------------------------------------------------------------------------

impl<R: Reconciling> ModifierCategory<R> {
    /// Runs one reconciliation step.
    ///
    /// Returns the level-change event, if the effective level moved.
    pub fn reconcile(&mut self, eligible: bool) -> Option<ModifierEvent> {
        let mut changed = false;
        if let Some(tier) = self.local.as_mut() {
            changed |= tier.refresh_active(eligible);
        }
        if let Some(tier) = self.correction.as_mut() {
            changed |= tier.refresh_active(eligible);
        }
        if let Some(tier) = self.server.as_mut() {
            changed |= tier.refresh_active(eligible);
        }
        if !changed {
            return None;
        }

        let old_tiers = self.tier_levels;
        let old_level = self.effective;
        self.tier_levels = TierLevels {
            local_predicted: self.tier_level(self.local.as_ref()),
            with_correction: self.tier_level(self.correction.as_ref()),
            server_authoritative: self.tier_level(self.server.as_ref()),
        };
        self.effective = combine_tiers(
            self.spec.method,
            self.tier_levels.to_array(),
            self.spec.max_level(),
            self.spec.invalid_level,
        );

        if self.effective == old_level {
            tracing::trace!(category = %self.spec.name, level = old_level, "tiers moved, effective level unchanged");
            return None;
        }
        let event = self.event(old_level, old_tiers);
        tracing::debug!(
            category = %self.spec.name,
            old = old_level,
            new = self.effective,
            kind = ?event.kind,
            "modifier level changed"
        );
        Some(event)
    }

    fn tier_level<K: TierKind>(&self, tier: Option<&TierContainer<K>>) -> Level {
        tier.map_or(self.spec.invalid_level, |tier| {
            reduce(
                self.spec.method,
                tier.active().as_slice(),
                self.spec.max_level(),
                self.spec.invalid_level,
            )
        })
    }
}

impl ModifierCategory<Proxy> {
    /// Adopts an effective level replicated from the authority.
    ///
    /// Levels above the category maximum are clamped. Returns the
    /// level-change event, if the level moved.
    pub fn adopt_replicated_level(&mut self, level: Level) -> Option<ModifierEvent> {
        let level = if level == self.spec.invalid_level {
            level
        } else {
            level.min(self.spec.max_level())
        };
        if level == self.effective {
            return None;
        }
        let old_level = self.effective;
        self.effective = level;
        Some(self.event(old_level, self.tier_levels))
    }
}

impl<R: Role> ModifierCategory<R> {
    fn event(&self, old_level: Level, old_tiers: TierLevels) -> ModifierEvent {
        ModifierEvent {
            category: self.id,
            kind: ChangeKind::classify(old_level, self.effective, self.spec.invalid_level),
            new_level: self.effective,
            old_level,
            new_tiers: self.tier_levels,
            old_tiers,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
