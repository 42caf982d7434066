//! Modifier categories: read-only configuration plus the per-entity tier
//! containers and effective level for one category.
//!
//! The entity's network role is a type parameter. Mutable access to the
//! server-authoritative tier only exists on [`ModifierCategory<Authority>`],
//! so a predicting client cannot author it.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::aggregate::AggregationMethod;
use crate::bitset::{Level, MaskWidth};
use crate::effect::LevelEffect;
use crate::error::ModifierError;
use crate::levels::{LevelCounting, LevelRules, Multiplicity};
use crate::state::ModifierState;
use crate::tier::{LocalPredicted, ServerAuthoritative, Tier, WithCorrection};

// ---------------------------------------------------------------------------
// CategoryId
// ---------------------------------------------------------------------------

/// Index of a category within its catalog.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct CategoryId(pub u8);

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// CategorySpec
// ---------------------------------------------------------------------------

/// Which trust tiers a category uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierSet {
    /// Client-driven tier.
    pub local_predicted: bool,
    /// Client-predicted, server-correctable tier.
    pub with_correction: bool,
    /// Server-driven tier.
    pub server_authoritative: bool,
}

impl TierSet {
    /// Every tier enabled.
    pub const ALL: Self = Self {
        local_predicted: true,
        with_correction: true,
        server_authoritative: true,
    };

    /// Returns `true` if `tier` is enabled.
    pub const fn contains(&self, tier: Tier) -> bool {
        match tier {
            Tier::LocalPredicted => self.local_predicted,
            Tier::WithCorrection => self.with_correction,
            Tier::ServerAuthoritative => self.server_authoritative,
        }
    }

    /// Returns `true` if no tier is enabled.
    pub const fn is_empty(&self) -> bool {
        !(self.local_predicted || self.with_correction || self.server_authoritative)
    }
}

impl Default for TierSet {
    fn default() -> Self {
        Self::ALL
    }
}

/// Configuration of one modifier category. Read-only at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategorySpec {
    /// Unique name, e.g. `"Boost"`.
    pub name: String,
    /// Mask width bounding representable levels.
    pub width: MaskWidth,
    /// Number of configured levels. Level indices run `0..level_count`.
    pub level_count: u8,
    /// Reduction used per tier and across tiers.
    pub method: AggregationMethod,
    /// Whether a level may be applied more than once per tier.
    pub multiplicity: Multiplicity,
    /// How wanted/active level counts are reported.
    pub counting: LevelCounting,
    /// Effective level meaning "no modifier".
    pub invalid_level: Level,
    /// Largest number of entries a packed stack may carry.
    pub max_serialized: u8,
    /// Enabled tiers.
    pub tiers: TierSet,
    /// Scale root-motion velocity along with max speed.
    pub scale_root_motion: bool,
    /// Per-level motion scalars, indexed by level. Empty means no effect.
    pub effects: Vec<LevelEffect>,
}

impl Default for CategorySpec {
    fn default() -> Self {
        Self {
            name: String::new(),
            width: MaskWidth::W8,
            level_count: 2,
            method: AggregationMethod::Max,
            multiplicity: Multiplicity::Set,
            counting: LevelCounting::Cardinality,
            invalid_level: 0,
            max_serialized: 8,
            tiers: TierSet::ALL,
            scale_root_motion: false,
            effects: Vec::new(),
        }
    }
}

impl CategorySpec {
    /// Highest configured level.
    pub fn max_level(&self) -> Level {
        self.level_count.saturating_sub(1)
    }

    /// Rules handed to each tier container.
    pub fn rules(&self) -> LevelRules {
        LevelRules {
            width: self.width,
            level_count: self.level_count,
            multiplicity: self.multiplicity,
            counting: self.counting,
            max_serialized: self.max_serialized,
        }
    }

    /// Motion scalars for `level`, if configured.
    pub fn effect(&self, level: Level) -> Option<&LevelEffect> {
        self.effects.get(usize::from(level))
    }

    /// Checks the category is internally consistent.
    pub fn validate(&self) -> Result<(), ModifierError> {
        let invalid = |reason: &str| ModifierError::InvalidCategory {
            name: self.name.clone(),
            reason: reason.to_owned(),
        };
        if self.name.is_empty() {
            return Err(invalid("name is empty"));
        }
        if self.level_count == 0 {
            return Err(invalid("level_count must be at least 1"));
        }
        if self.level_count > self.width.bits() {
            return Err(ModifierError::LevelCountExceedsWidth {
                name: self.name.clone(),
                level_count: self.level_count,
                bits: self.width.bits(),
            });
        }
        if self.invalid_level != 0 && self.invalid_level < self.level_count {
            return Err(invalid("invalid_level collides with a configured level"));
        }
        if self.multiplicity == Multiplicity::Stack && self.max_serialized == 0 {
            return Err(invalid("stack categories need max_serialized >= 1"));
        }
        if !self.effects.is_empty() && self.effects.len() != usize::from(self.level_count) {
            return Err(invalid("effects must list one entry per level"));
        }
        if self.tiers.is_empty() {
            return Err(invalid("no tier enabled"));
        }
        Ok(())
    }

    /// Stock category set: Boost, Slow, Haste, SlowFall and Snare.
    ///
    /// Level 0 is the "no modifier" level on every stock category.
    pub fn defaults() -> Vec<CategorySpec> {
        vec![
            CategorySpec {
                name: "Boost".into(),
                level_count: 4,
                effects: vec![
                    LevelEffect::IDENTITY,
                    LevelEffect::speed(1.25),
                    LevelEffect::speed(1.5),
                    LevelEffect::speed(2.0),
                ],
                scale_root_motion: true,
                ..Default::default()
            },
            CategorySpec {
                name: "Slow".into(),
                level_count: 4,
                method: AggregationMethod::Max,
                tiers: TierSet {
                    server_authoritative: false,
                    ..TierSet::ALL
                },
                effects: vec![
                    LevelEffect::IDENTITY,
                    LevelEffect::speed(0.75),
                    LevelEffect::speed(0.5),
                    LevelEffect::speed(0.25),
                ],
                ..Default::default()
            },
            CategorySpec {
                name: "Haste".into(),
                level_count: 2,
                tiers: TierSet {
                    local_predicted: true,
                    with_correction: false,
                    server_authoritative: false,
                },
                effects: vec![LevelEffect::IDENTITY, LevelEffect::speed(1.1)],
                ..Default::default()
            },
            CategorySpec {
                name: "SlowFall".into(),
                level_count: 3,
                tiers: TierSet {
                    server_authoritative: false,
                    ..TierSet::ALL
                },
                effects: vec![
                    LevelEffect::IDENTITY,
                    LevelEffect {
                        gravity: 0.5,
                        ..LevelEffect::IDENTITY
                    },
                    LevelEffect {
                        gravity: 0.25,
                        ..LevelEffect::IDENTITY
                    },
                ],
                ..Default::default()
            },
            CategorySpec {
                name: "Snare".into(),
                level_count: 4,
                method: AggregationMethod::Stack,
                multiplicity: Multiplicity::Stack,
                max_serialized: 8,
                tiers: TierSet {
                    local_predicted: false,
                    with_correction: false,
                    server_authoritative: true,
                },
                effects: vec![
                    LevelEffect::IDENTITY,
                    LevelEffect::speed(0.9),
                    LevelEffect::speed(0.8),
                    LevelEffect::speed(0.7),
                ],
                ..Default::default()
            },
        ]
    }
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

mod sealed {
    pub trait Sealed {}
}

/// Network role of the entity owning a modifier set.
pub trait Role: sealed::Sealed + fmt::Debug + Send + Sync + 'static {
    /// Whether this role runs the reconciliation step itself.
    const RECONCILES: bool;
}

/// Server side. Authors correctable and authoritative tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Authority;

/// Owning client. Predicts locally and consumes corrections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Predicting;

/// Simulated proxy. Adopts the replicated effective level verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Proxy;

impl sealed::Sealed for Authority {}
impl sealed::Sealed for Predicting {}
impl sealed::Sealed for Proxy {}

impl Role for Authority {
    const RECONCILES: bool = true;
}
impl Role for Predicting {
    const RECONCILES: bool = true;
}
impl Role for Proxy {
    const RECONCILES: bool = false;
}

/// Roles that run the per-tick reconciliation step.
pub trait Reconciling: Role {}
impl Reconciling for Authority {}
impl Reconciling for Predicting {}

// ---------------------------------------------------------------------------
// ModifierCategory
// ---------------------------------------------------------------------------

/// Per-tier levels after the first reduction. Absent or empty tiers hold
/// the category's invalid level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TierLevels {
    /// Local-predicted tier level.
    pub local_predicted: Level,
    /// With-correction tier level.
    pub with_correction: Level,
    /// Server-authoritative tier level.
    pub server_authoritative: Level,
}

impl TierLevels {
    /// All tiers at `invalid`.
    pub const fn empty(invalid: Level) -> Self {
        Self {
            local_predicted: invalid,
            with_correction: invalid,
            server_authoritative: invalid,
        }
    }

    /// Level of `tier`.
    pub const fn get(&self, tier: Tier) -> Level {
        match tier {
            Tier::LocalPredicted => self.local_predicted,
            Tier::WithCorrection => self.with_correction,
            Tier::ServerAuthoritative => self.server_authoritative,
        }
    }

    /// Levels in [`Tier::ALL`] order.
    pub const fn to_array(&self) -> [Level; 3] {
        [
            self.local_predicted,
            self.with_correction,
            self.server_authoritative,
        ]
    }
}

/// Tier containers and effective level of one category on one entity.
#[derive(Debug, Clone)]
pub struct ModifierCategory<R: Role> {
    pub(crate) id: CategoryId,
    pub(crate) spec: Arc<CategorySpec>,
    pub(crate) local: Option<LocalPredicted>,
    pub(crate) correction: Option<WithCorrection>,
    pub(crate) server: Option<ServerAuthoritative>,
    pub(crate) effective: Level,
    pub(crate) tier_levels: TierLevels,
    _role: PhantomData<R>,
}

impl<R: Role> ModifierCategory<R> {
    /// Creates the containers `spec` enables. Proxies hold no containers.
    pub fn new(id: CategoryId, spec: Arc<CategorySpec>) -> Self {
        let rules = spec.rules();
        let enabled = |tier| R::RECONCILES && spec.tiers.contains(tier);
        Self {
            id,
            local: enabled(Tier::LocalPredicted).then(|| LocalPredicted::new(rules)),
            correction: enabled(Tier::WithCorrection).then(|| WithCorrection::new(rules)),
            server: enabled(Tier::ServerAuthoritative).then(|| ServerAuthoritative::new(rules)),
            effective: spec.invalid_level,
            tier_levels: TierLevels::empty(spec.invalid_level),
            spec,
            _role: PhantomData,
        }
    }

    /// Catalog index.
    pub fn id(&self) -> CategoryId {
        self.id
    }

    /// Configuration.
    pub fn spec(&self) -> &CategorySpec {
        &self.spec
    }

    /// Category name.
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Effective level consumed by the motion solver.
    pub fn effective_level(&self) -> Level {
        self.effective
    }

    /// Per-tier levels from the last recomputation.
    pub fn tier_levels(&self) -> TierLevels {
        self.tier_levels
    }

    /// Returns `true` if a modifier is in effect.
    pub fn is_active(&self) -> bool {
        self.effective != self.spec.invalid_level
    }

    /// Motion scalars for the effective level.
    pub fn current_effect(&self) -> Option<&LevelEffect> {
        if self.is_active() {
            self.spec.effect(self.effective)
        } else {
            None
        }
    }

    /// Local-predicted tier, read-only.
    pub fn local(&self) -> Option<&LocalPredicted> {
        self.local.as_ref()
    }

    /// With-correction tier, read-only.
    pub fn correction(&self) -> Option<&WithCorrection> {
        self.correction.as_ref()
    }

    /// Server-authoritative tier, read-only.
    pub fn server(&self) -> Option<&ServerAuthoritative> {
        self.server.as_ref()
    }

    /// Read-only state of `tier`, if enabled.
    pub fn tier_state(&self, tier: Tier) -> Option<&ModifierState> {
        match tier {
            Tier::LocalPredicted => self.local.as_ref().map(|t| t.state()),
            Tier::WithCorrection => self.correction.as_ref().map(|t| t.state()),
            Tier::ServerAuthoritative => self.server.as_ref().map(|t| t.state()),
        }
    }

    /// Mutable state of `tier`. Callers gate access by role.
    pub(crate) fn tier_state_mut(&mut self, tier: Tier) -> Option<&mut ModifierState> {
        match tier {
            Tier::LocalPredicted => self.local.as_mut().map(|t| t.state_mut()),
            Tier::WithCorrection => self.correction.as_mut().map(|t| t.state_mut()),
            Tier::ServerAuthoritative => self.server.as_mut().map(|t| t.state_mut()),
        }
    }
}

impl<R: Reconciling> ModifierCategory<R> {
    /// With-correction tier. The client predicts it; the server authors it.
    pub fn correction_mut(&mut self) -> Option<&mut WithCorrection> {
        self.correction.as_mut()
    }
}

impl ModifierCategory<Predicting> {
    /// Local-predicted tier, driven by client input.
    pub fn local_mut(&mut self) -> Option<&mut LocalPredicted> {
        self.local.as_mut()
    }
}

impl ModifierCategory<Authority> {
    /// Server-authoritative tier. Only the authority may author it.
    pub fn server_mut(&mut self) -> Option<&mut ServerAuthoritative> {
        self.server.as_mut()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn boost() -> CategorySpec {
        CategorySpec {
            name: "Boost".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        let defaults = CategorySpec::defaults();
        assert_eq!(defaults.len(), 5);
        for spec in &defaults {
            spec.validate().unwrap();
        }
    }

    #[test]
    fn test_level_count_must_fit_width() {
        let spec = CategorySpec {
            level_count: 9,
            ..boost()
        };
        assert!(matches!(
            spec.validate(),
            Err(ModifierError::LevelCountExceedsWidth { bits: 8, .. })
        ));
        let wide = CategorySpec {
            width: MaskWidth::W16,
            ..spec
        };
        wide.validate().unwrap();
    }

    #[test]
    fn test_invalid_level_cannot_shadow_real_level() {
        let spec = CategorySpec {
            level_count: 4,
            invalid_level: 2,
            ..boost()
        };
        assert!(spec.validate().is_err());
        let spec = CategorySpec {
            invalid_level: 255,
            ..spec
        };
        spec.validate().unwrap();
    }

    #[test]
    fn test_effects_must_cover_every_level() {
        let spec = CategorySpec {
            effects: vec![LevelEffect::IDENTITY],
            ..boost()
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_proxy_holds_no_containers() {
        let spec = Arc::new(boost());
        let proxy = ModifierCategory::<Proxy>::new(CategoryId(0), spec.clone());
        assert!(proxy.local().is_none());
        assert!(proxy.server().is_none());
        let client = ModifierCategory::<Predicting>::new(CategoryId(0), spec);
        assert!(client.local().is_some());
        assert!(client.server().is_some());
        assert!(!client.is_active());
    }

    #[test]
    fn test_disabled_tiers_are_absent() {
        let spec = CategorySpec {
            tiers: TierSet {
                local_predicted: false,
                with_correction: false,
                server_authoritative: true,
            },
            ..boost()
        };
        let mut server = ModifierCategory::<Authority>::new(CategoryId(3), Arc::new(spec));
        assert!(server.correction_mut().is_none());
        assert!(server.server_mut().is_some());
    }

    #[test]
    fn test_spec_ron_roundtrip_with_defaults() {
        let spec: CategorySpec = ron::from_str(r#"(name: "Haste", level_count: 3)"#).unwrap();
        assert_eq!(spec.name, "Haste");
        assert_eq!(spec.level_count, 3);
        assert_eq!(spec.tiers, TierSet::ALL);
        assert_eq!(spec.max_level(), 2);
    }
}
