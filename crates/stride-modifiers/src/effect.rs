//! Per-level motion scalars read by the external motion solver.

use serde::{Deserialize, Serialize};

/// Multipliers one level applies to the motion solver's base parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelEffect {
    /// Max walk / fly / swim speed multiplier.
    pub max_speed: f32,
    /// Max acceleration multiplier.
    pub max_acceleration: f32,
    /// Braking deceleration multiplier.
    pub braking_deceleration: f32,
    /// Ground friction multiplier.
    pub ground_friction: f32,
    /// Gravity multiplier (slow fall).
    pub gravity: f32,
}

impl LevelEffect {
    /// No change to any parameter.
    pub const IDENTITY: Self = Self {
        max_speed: 1.0,
        max_acceleration: 1.0,
        braking_deceleration: 1.0,
        ground_friction: 1.0,
        gravity: 1.0,
    };

    /// Scales speed and acceleration together, as boosts and slows do.
    pub const fn speed(scalar: f32) -> Self {
        Self {
            max_speed: scalar,
            max_acceleration: scalar,
            ..Self::IDENTITY
        }
    }
}

impl Default for LevelEffect {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Combined multipliers across every category of an entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionScalars {
    /// Product of all active [`LevelEffect`]s.
    pub effect: LevelEffect,
    /// Whether root motion should be scaled by `effect.max_speed`.
    pub scale_root_motion: bool,
}

impl MotionScalars {
    /// No modifiers applied.
    pub const IDENTITY: Self = Self {
        effect: LevelEffect::IDENTITY,
        scale_root_motion: false,
    };

    /// Multiplies `effect` into the running product.
    pub fn apply(&mut self, effect: &LevelEffect, scale_root_motion: bool) {
        self.effect.max_speed *= effect.max_speed;
        self.effect.max_acceleration *= effect.max_acceleration;
        self.effect.braking_deceleration *= effect.braking_deceleration;
        self.effect.ground_friction *= effect.ground_friction;
        self.effect.gravity *= effect.gravity;
        self.scale_root_motion |= scale_root_motion;
    }

    /// Multiplier for root-motion velocity.
    pub fn root_motion_scale(&self) -> f32 {
        if self.scale_root_motion {
            self.effect.max_speed
        } else {
            1.0
        }
    }
}

impl Default for MotionScalars {
    fn default() -> Self {
        Self::IDENTITY
    }
}
