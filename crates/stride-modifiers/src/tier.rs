//! Trust tiers.
//!
//! Every tier is the same [`ModifierState`] wrapped in a [`TierContainer`]
//! tagged with a zero-sized kind. Capabilities are traits implemented per
//! kind: only correctable kinds can be compared against a peer's claim or
//! overwritten by a correction.

use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

use crate::bitset::Level;
use crate::levels::{LevelRules, LevelStack, PackedLevels};
use crate::state::ModifierState;

// ---------------------------------------------------------------------------
// Tier identifiers
// ---------------------------------------------------------------------------

/// Trust classification governing who authors a tier's active levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    /// Client-driven and never corrected.
    LocalPredicted,
    /// Client-predicted, overridable by the server.
    WithCorrection,
    /// Server-driven; clients hold a read-only mirror.
    ServerAuthoritative,
}

impl Tier {
    /// All tiers in aggregation order.
    pub const ALL: [Tier; 3] = [
        Tier::LocalPredicted,
        Tier::WithCorrection,
        Tier::ServerAuthoritative,
    ];
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tier::LocalPredicted => "local_predicted",
            Tier::WithCorrection => "with_correction",
            Tier::ServerAuthoritative => "server_authoritative",
        };
        f.write_str(name)
    }
}

/// Tiers a predicting client may mutate directly.
///
/// There is deliberately no variant for [`Tier::ServerAuthoritative`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PredictedTier {
    /// See [`Tier::LocalPredicted`].
    LocalPredicted,
    /// See [`Tier::WithCorrection`].
    WithCorrection,
}

impl From<PredictedTier> for Tier {
    fn from(tier: PredictedTier) -> Self {
        match tier {
            PredictedTier::LocalPredicted => Tier::LocalPredicted,
            PredictedTier::WithCorrection => Tier::WithCorrection,
        }
    }
}

// ---------------------------------------------------------------------------
// Kinds and capabilities
// ---------------------------------------------------------------------------

mod sealed {
    pub trait Sealed {}
}

/// Zero-sized tag selecting a tier's capabilities.
pub trait TierKind: sealed::Sealed + fmt::Debug + Send + Sync + 'static {
    /// Tier this kind represents.
    const TIER: Tier;
}

/// Kind tag for [`LocalPredicted`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalKind;

/// Kind tag for [`WithCorrection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrectionKind;

/// Kind tag for [`ServerAuthoritative`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerKind;

impl sealed::Sealed for LocalKind {}
impl sealed::Sealed for CorrectionKind {}
impl sealed::Sealed for ServerKind {}

impl TierKind for LocalKind {
    const TIER: Tier = Tier::LocalPredicted;
}
impl TierKind for CorrectionKind {
    const TIER: Tier = Tier::WithCorrection;
}
impl TierKind for ServerKind {
    const TIER: Tier = Tier::ServerAuthoritative;
}

/// Marker for kinds whose wanted levels only the authority may author.
pub trait AuthoritativeOnly: TierKind {}
impl AuthoritativeOnly for ServerKind {}

// ---------------------------------------------------------------------------
// TierContainer
// ---------------------------------------------------------------------------

/// A [`ModifierState`] tagged with its trust tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierContainer<K: TierKind> {
    state: ModifierState,
    _kind: PhantomData<K>,
}

/// Client-predicted, never corrected.
pub type LocalPredicted = TierContainer<LocalKind>;
/// Client-predicted, server-correctable.
pub type WithCorrection = TierContainer<CorrectionKind>;
/// Server-authored; mirrored read-only on clients.
pub type ServerAuthoritative = TierContainer<ServerKind>;

impl<K: TierKind> TierContainer<K> {
    /// Creates an empty container following `rules`.
    pub fn new(rules: LevelRules) -> Self {
        Self {
            state: ModifierState::new(rules),
            _kind: PhantomData,
        }
    }

    /// Tier of this container.
    pub const fn tier(&self) -> Tier {
        K::TIER
    }

    /// Underlying state, read-only.
    pub fn state(&self) -> &ModifierState {
        &self.state
    }

    /// Requested levels.
    pub fn wanted(&self) -> &LevelStack {
        self.state.wanted()
    }

    /// Applied levels.
    pub fn active(&self) -> &LevelStack {
        self.state.active()
    }

    /// See [`ModifierState::add`].
    pub fn add(&mut self, level: Level) -> bool {
        self.state.add(level)
    }

    /// See [`ModifierState::remove`].
    pub fn remove(&mut self, level: Level) -> bool {
        self.state.remove(level)
    }

    /// See [`ModifierState::remove_all`].
    pub fn remove_all(&mut self, level: Level) -> bool {
        self.state.remove_all(level)
    }

    /// See [`ModifierState::reset`].
    pub fn reset(&mut self) -> bool {
        self.state.reset()
    }

    /// See [`ModifierState::refresh_active`].
    pub fn refresh_active(&mut self, eligible: bool) -> bool {
        self.state.refresh_active(eligible)
    }

    /// See [`ModifierState::wanted_level`].
    pub fn wanted_level(&self) -> u8 {
        self.state.wanted_level()
    }

    /// See [`ModifierState::active_level`].
    pub fn active_level(&self) -> u8 {
        self.state.active_level()
    }

    /// Packed `wanted`.
    pub fn packed_wanted(&self) -> PackedLevels {
        self.state.packed_wanted()
    }

    /// Packed `active`.
    pub fn packed_active(&self) -> PackedLevels {
        self.state.packed_active()
    }

    /// Restores `wanted` from a saved move. Returns whether it changed.
    pub(crate) fn restore_wanted(&mut self, packed: &PackedLevels) -> bool {
        self.state.overwrite_wanted(packed)
    }

    pub(crate) fn state_mut(&mut self) -> &mut ModifierState {
        &mut self.state
    }
}

/// Tiers the server may override after detecting divergence.
pub trait Correctable {
    /// Returns `true` if this container's active levels differ from the
    /// peer's claimed active levels.
    fn server_disagrees(&self, claimed_active: &PackedLevels) -> bool;

    /// Overwrites `wanted` with the authoritative active levels. The next
    /// refresh derives `active` from them. Returns whether `wanted` changed.
    fn apply_correction(&mut self, corrected_active: &PackedLevels) -> bool;
}

impl Correctable for WithCorrection {
    fn server_disagrees(&self, claimed_active: &PackedLevels) -> bool {
        disagrees(&self.state, claimed_active)
    }

    fn apply_correction(&mut self, corrected_active: &PackedLevels) -> bool {
        self.state.overwrite_wanted(corrected_active)
    }
}

impl Correctable for ServerAuthoritative {
    fn server_disagrees(&self, claimed_active: &PackedLevels) -> bool {
        disagrees(&self.state, claimed_active)
    }

    fn apply_correction(&mut self, corrected_active: &PackedLevels) -> bool {
        self.state.overwrite_wanted(corrected_active)
    }
}

fn disagrees(state: &ModifierState, claimed_active: &PackedLevels) -> bool {
    state.rules().unpack(claimed_active) != *state.active()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
