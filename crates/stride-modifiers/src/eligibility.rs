//! Movement eligibility gate supplied by the motion solver.
//!
//! A tier's active levels are only applied while its category is eligible.
//! The stock predicate allows modifiers while grounded or falling, and never
//! while the body is driven by free physics simulation.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

use crate::category::CategoryId;

/// Answers whether a category's modifiers may apply this tick.
pub trait MotionEligibility {
    /// Returns `true` if `category` may apply its active levels.
    fn is_eligible(&self, category: CategoryId) -> bool;
}

impl MotionEligibility for bool {
    fn is_eligible(&self, _category: CategoryId) -> bool {
        *self
    }
}

impl<F> MotionEligibility for F
where
    F: Fn(CategoryId) -> bool,
{
    fn is_eligible(&self, category: CategoryId) -> bool {
        self(category)
    }
}

/// Locomotion mode reported by the motion solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MovementMode {
    /// No movement (disabled or not yet spawned).
    #[default]
    None,
    /// Walking on a surface.
    Walking,
    /// Walking on a navigation mesh.
    NavWalking,
    /// Airborne under gravity.
    Falling,
    /// In a fluid volume.
    Swimming,
    /// Ignoring gravity.
    Flying,
    /// Game-defined mode.
    Custom(u8),
}

impl MovementMode {
    /// Returns `true` for modes that stand on the ground.
    pub const fn is_grounded(self) -> bool {
        matches!(self, Self::Walking | Self::NavWalking)
    }
}

/// Per-entity movement snapshot used by the default predicate.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MotionState {
    /// Current locomotion mode.
    pub mode: MovementMode,
    /// The body is driven by rigid-body simulation.
    pub simulating_physics: bool,
}

impl MotionState {
    /// Walking, not physics driven.
    pub const fn grounded() -> Self {
        Self {
            mode: MovementMode::Walking,
            simulating_physics: false,
        }
    }

    /// Returns `true` if modifiers may apply in this state.
    pub const fn allows_modifiers(&self) -> bool {
        !self.simulating_physics
            && (self.mode.is_grounded() || matches!(self.mode, MovementMode::Falling))
    }
}

impl MotionEligibility for MotionState {
    fn is_eligible(&self, _category: CategoryId) -> bool {
        self.allows_modifiers()
    }
}
