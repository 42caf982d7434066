//! Tiered modifier state synchronization: leveled movement modifiers kept
//! consistent between a predicting client and an authoritative server.
//!
//! Each category (Boost, Snare, ...) holds up to three trust tiers. Every
//! tick the tiers' active levels are refreshed through an eligibility gate
//! and aggregated into one effective level for the motion solver. Move
//! records feed a combine/resend history, and divergence on correctable
//! tiers triggers a server correction followed by client replay.

pub mod aggregate;
pub mod bitset;
pub mod category;
pub mod effect;
pub mod eligibility;
pub mod error;
pub mod history;
pub mod levels;
pub mod protocol;
pub mod reconcile;
pub mod record;
pub mod set;
pub mod state;
pub mod systems;
pub mod tier;
pub mod wire;

pub use aggregate::{AggregationMethod, combine_tiers, reduce};
pub use bitset::{Level, LevelMask, MaskWidth, decode, encode};
pub use category::{
    Authority, CategoryId, CategorySpec, ModifierCategory, Predicting, Proxy, Reconciling, Role,
    TierLevels, TierSet,
};
pub use effect::{LevelEffect, MotionScalars};
pub use eligibility::{MotionEligibility, MotionState, MovementMode};
pub use error::ModifierError;
pub use history::{MoveDataSlots, MoveHistory, MoveSlot};
pub use levels::{LevelCounting, LevelRules, LevelStack, Multiplicity, PackedLevels};
pub use protocol::{CORRECTION_TIMEOUT_TICKS, ClientSync, ProxySync, ServerResponse, ServerSync};
pub use reconcile::{ChangeKind, ModifierEvent, ModifierEventBuffer};
pub use record::{CategoryRecord, MoveRecord, RecordPhase};
pub use set::{LocalWantedSnapshot, ModifierCatalog, ModifierSet};
pub use state::ModifierState;
pub use systems::{ReplicatedModifierLevels, adopt_replicated_levels, reconcile_modifiers};
pub use tier::{
    AuthoritativeOnly, Correctable, LocalPredicted, PredictedTier, ServerAuthoritative, Tier,
    TierContainer, TierKind, WithCorrection,
};
pub use wire::{
    CategoryCorrection, CategoryRequest, CorrectionPayload, ReplicatedLevels, RequestPayload,
    ServerMovePacket, WIRE_VERSION, WireMessage, deserialize_message, serialize_message,
};
