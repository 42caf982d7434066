//! ECS systems driving modifier reconciliation each fixed tick.

use bevy_ecs::prelude::*;

use crate::bitset::Level;
use crate::category::{Proxy, Reconciling};
use crate::eligibility::MotionState;
use crate::reconcile::ModifierEventBuffer;
use crate::set::ModifierSet;

/// Latest replicated effective levels for a simulated proxy, written by the
/// network layer and consumed by [`adopt_replicated_levels`].
#[derive(Component, Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicatedModifierLevels {
    /// Server tick of the snapshot.
    pub tick: u64,
    /// Effective level per category, in catalog order.
    pub levels: Vec<Level>,
    /// Set by the network layer when a new snapshot lands.
    pub dirty: bool,
}

/// Reconciles every entity of role `R` against its [`MotionState`].
///
/// Runs after game logic has mutated wanted levels and before the motion
/// solver reads effective levels.
pub fn reconcile_modifiers<R: Reconciling>(
    mut query: Query<(&mut ModifierSet<R>, &MotionState, &mut ModifierEventBuffer)>,
) {
    for (mut set, motion, mut events) in query.iter_mut() {
        let raised = set.reconcile(motion, &mut events);
        if raised > 0 {
            tracing::trace!(raised, "modifier levels changed");
        }
    }
}

/// Applies fresh replication snapshots to simulated proxies.
pub fn adopt_replicated_levels(
    mut query: Query<(
        &mut ModifierSet<Proxy>,
        &mut ReplicatedModifierLevels,
        &mut ModifierEventBuffer,
    )>,
) {
    for (mut set, mut replicated, mut events) in query.iter_mut() {
        if !replicated.dirty {
            continue;
        }
        replicated.dirty = false;
        set.adopt_replicated(&replicated.levels, &mut events);
    }
}
