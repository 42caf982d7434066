//! Catalog of categories and the per-entity modifier set.
//!
//! A [`ModifierCatalog`] is validated once and shared. Each entity owns a
//! [`ModifierSet`] holding one [`ModifierCategory`] per catalog entry, with
//! role-specific operations: predicting clients build requests and consume
//! corrections, the authority consumes requests and builds corrections, and
//! proxies adopt replicated levels.

use std::sync::Arc;

use bevy_ecs::prelude::*;
use rustc_hash::FxHashMap;

use crate::bitset::Level;
use crate::category::{
    Authority, CategoryId, CategorySpec, ModifierCategory, Predicting, Proxy, Reconciling, Role,
};
use crate::effect::MotionScalars;
use crate::eligibility::MotionEligibility;
use crate::error::ModifierError;
use crate::levels::PackedLevels;
use crate::reconcile::ModifierEventBuffer;
use crate::state::ModifierState;
use crate::tier::{Correctable, PredictedTier, Tier, TierContainer, TierKind};
use crate::wire::{CategoryCorrection, CorrectionPayload, RequestPayload};

// ---------------------------------------------------------------------------
// ModifierCatalog
// ---------------------------------------------------------------------------

/// Validated, immutable list of categories.
#[derive(Debug, Clone)]
pub struct ModifierCatalog {
    specs: Vec<Arc<CategorySpec>>,
    by_name: FxHashMap<String, CategoryId>,
}

impl ModifierCatalog {
    /// Validates `specs` and builds the name index.
    pub fn new(specs: Vec<CategorySpec>) -> Result<Self, ModifierError> {
        if specs.len() > usize::from(u8::MAX) + 1 {
            return Err(ModifierError::TooManyCategories {
                count: specs.len(),
                max: usize::from(u8::MAX) + 1,
            });
        }
        let mut by_name = FxHashMap::default();
        for (index, spec) in specs.iter().enumerate() {
            spec.validate()?;
            let id = CategoryId(index as u8);
            if by_name.insert(spec.name.clone(), id).is_some() {
                return Err(ModifierError::InvalidCategory {
                    name: spec.name.clone(),
                    reason: "duplicate category name".into(),
                });
            }
        }
        Ok(Self {
            specs: specs.into_iter().map(Arc::new).collect(),
            by_name,
        })
    }

    /// Catalog of [`CategorySpec::defaults`].
    pub fn with_defaults() -> Result<Self, ModifierError> {
        Self::new(CategorySpec::defaults())
    }

    /// Number of categories.
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Returns `true` if the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Spec for `id`.
    pub fn get(&self, id: CategoryId) -> Option<&CategorySpec> {
        self.specs.get(usize::from(id.0)).map(|s| s.as_ref())
    }

    /// Looks up a category by name.
    pub fn id_of(&self, name: &str) -> Result<CategoryId, ModifierError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| ModifierError::UnknownCategory(name.to_owned()))
    }

    /// Categories in index order.
    pub fn iter(&self) -> impl Iterator<Item = (CategoryId, &CategorySpec)> {
        self.specs
            .iter()
            .enumerate()
            .map(|(i, s)| (CategoryId(i as u8), s.as_ref()))
    }
}

// ---------------------------------------------------------------------------
// ModifierSet
// ---------------------------------------------------------------------------

/// Every category of one entity, in catalog order.
#[derive(Component, Debug, Clone)]
pub struct ModifierSet<R: Role> {
    catalog: Arc<ModifierCatalog>,
    categories: Vec<ModifierCategory<R>>,
}

impl<R: Role> ModifierSet<R> {
    /// Creates empty tiers for every category in `catalog`.
    pub fn new(catalog: Arc<ModifierCatalog>) -> Self {
        let categories = catalog
            .specs
            .iter()
            .enumerate()
            .map(|(i, spec)| ModifierCategory::new(CategoryId(i as u8), Arc::clone(spec)))
            .collect();
        Self {
            catalog,
            categories,
        }
    }

    /// Shared catalog.
    pub fn catalog(&self) -> &Arc<ModifierCatalog> {
        &self.catalog
    }

    /// Number of categories.
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    /// Returns `true` if the set has no categories.
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Category `id`.
    pub fn get(&self, id: CategoryId) -> Option<&ModifierCategory<R>> {
        self.categories.get(usize::from(id.0))
    }

    /// Category named `name`.
    pub fn by_name(&self, name: &str) -> Option<&ModifierCategory<R>> {
        let id = self.catalog.id_of(name).ok()?;
        self.get(id)
    }

    /// Categories in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = &ModifierCategory<R>> {
        self.categories.iter()
    }

    /// Effective level of `id`, the value the motion solver scales by.
    pub fn effective_level(&self, id: CategoryId) -> Option<Level> {
        self.get(id).map(ModifierCategory::effective_level)
    }

    /// Product of the effects of every active category.
    pub fn motion_scalars(&self) -> MotionScalars {
        let mut scalars = MotionScalars::IDENTITY;
        for category in &self.categories {
            if let Some(effect) = category.current_effect() {
                scalars.apply(effect, category.spec().scale_root_motion);
            }
        }
        scalars
    }
}

impl<R: Reconciling> ModifierSet<R> {
    /// Category `id`, mutable.
    pub fn get_mut(&mut self, id: CategoryId) -> Option<&mut ModifierCategory<R>> {
        self.categories.get_mut(usize::from(id.0))
    }

    /// Runs the reconciliation step for every category, queueing events.
    /// Returns the number of events raised.
    pub fn reconcile(
        &mut self,
        eligibility: &impl MotionEligibility,
        events: &mut ModifierEventBuffer,
    ) -> usize {
        let mut raised = 0;
        for category in &mut self.categories {
            if let Some(event) = category.reconcile(eligibility.is_eligible(category.id)) {
                events.send(event);
                raised += 1;
            }
        }
        raised
    }

    fn mutate(
        &mut self,
        id: CategoryId,
        tier: Tier,
        f: impl FnOnce(&mut ModifierState) -> bool,
    ) -> bool {
        self.get_mut(id)
            .and_then(|c| c.tier_state_mut(tier))
            .is_some_and(f)
    }
}

// ---------------------------------------------------------------------------
// Predicting
// ---------------------------------------------------------------------------

/// Local-predicted `wanted` of every category, saved around a resimulation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalWantedSnapshot(Vec<Option<PackedLevels>>);

impl ModifierSet<Predicting> {
    /// Requests `level` on a client-mutable tier.
    pub fn add(&mut self, id: CategoryId, tier: PredictedTier, level: Level) -> bool {
        self.mutate(id, tier.into(), |s| s.add(level))
    }

    /// Removes one occurrence of `level`.
    pub fn remove(&mut self, id: CategoryId, tier: PredictedTier, level: Level) -> bool {
        self.mutate(id, tier.into(), |s| s.remove(level))
    }

    /// Removes every occurrence of `level`.
    pub fn remove_all(&mut self, id: CategoryId, tier: PredictedTier, level: Level) -> bool {
        self.mutate(id, tier.into(), |s| s.remove_all(level))
    }

    /// Clears a tier's `wanted`.
    pub fn reset(&mut self, id: CategoryId, tier: PredictedTier) -> bool {
        self.mutate(id, tier.into(), |s| s.reset())
    }

    /// Applies a correction to every correctable tier it names. Returns
    /// whether any `wanted` changed.
    pub fn apply_correction(&mut self, payload: &CorrectionPayload) -> bool {
        let mut changed = false;
        for entry in &payload.categories {
            let Some(category) = self.get_mut(entry.category) else {
                continue;
            };
            if let (Some(tier), Some(levels)) = (category.correction.as_mut(), &entry.correction_active) {
                changed |= tier.apply_correction(levels);
            }
            if let (Some(tier), Some(levels)) = (category.server.as_mut(), &entry.server_active) {
                changed |= tier.apply_correction(levels);
            }
        }
        changed
    }

    /// Saves every local-predicted `wanted`.
    pub fn snapshot_local_wanted(&self) -> LocalWantedSnapshot {
        LocalWantedSnapshot(
            self.categories
                .iter()
                .map(|c| c.local.as_ref().map(TierContainer::packed_wanted))
                .collect(),
        )
    }

    /// Restores local-predicted `wanted` saved by
    /// [`snapshot_local_wanted`](Self::snapshot_local_wanted).
    pub fn restore_local_wanted(&mut self, snapshot: &LocalWantedSnapshot) {
        for (category, saved) in self.categories.iter_mut().zip(&snapshot.0) {
            if let (Some(tier), Some(levels)) = (category.local.as_mut(), saved) {
                tier.restore_wanted(levels);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Authority
// ---------------------------------------------------------------------------

impl ModifierSet<Authority> {
    /// Requests `level` on any tier.
    pub fn add(&mut self, id: CategoryId, tier: Tier, level: Level) -> bool {
        self.mutate(id, tier, |s| s.add(level))
    }

    /// Removes one occurrence of `level`.
    pub fn remove(&mut self, id: CategoryId, tier: Tier, level: Level) -> bool {
        self.mutate(id, tier, |s| s.remove(level))
    }

    /// Removes every occurrence of `level`.
    pub fn remove_all(&mut self, id: CategoryId, tier: Tier, level: Level) -> bool {
        self.mutate(id, tier, |s| s.remove_all(level))
    }

    /// Clears a tier's `wanted`.
    pub fn reset(&mut self, id: CategoryId, tier: Tier) -> bool {
        self.mutate(id, tier, |s| s.reset())
    }

    /// Writes the client-predicted `wanted` of both predicted tiers from a
    /// move.
    ///
    /// Server game logic may still rewrite the with-correction tier before
    /// the next reconcile; whatever `active` results is what the client's
    /// claim is checked against.
    pub fn apply_request(&mut self, request: &RequestPayload) {
        for entry in &request.categories {
            let Some(category) = self.get_mut(entry.category) else {
                continue;
            };
            if let (Some(tier), Some(levels)) = (category.local.as_mut(), &entry.local_wanted) {
                tier.restore_wanted(levels);
            }
            if let (Some(tier), Some(levels)) =
                (category.correction.as_mut(), &entry.correction_wanted)
            {
                tier.restore_wanted(levels);
            }
        }
    }

    /// Returns `true` if any correctable tier's `active` differs from what
    /// the client claims. A tier the client did not report counts as an
    /// empty claim.
    pub fn server_disagrees(&self, request: &RequestPayload) -> bool {
        self.categories.iter().any(|category| {
            let entry = request.category(category.id);
            let correction = entry.and_then(|e| e.correction_active.as_ref());
            let server = entry.and_then(|e| e.server_active.as_ref());
            tier_disagrees(category.correction.as_ref(), correction)
                || tier_disagrees(category.server.as_ref(), server)
        })
    }

    /// Builds the correction carrying every authoritative `active`.
    pub fn build_correction(&self, tick: u64) -> CorrectionPayload {
        CorrectionPayload {
            tick,
            categories: self
                .categories
                .iter()
                .filter(|c| c.correction.is_some() || c.server.is_some())
                .map(|c| CategoryCorrection {
                    category: c.id,
                    correction_active: c.correction.as_ref().map(TierContainer::packed_active),
                    server_active: c.server.as_ref().map(TierContainer::packed_active),
                })
                .collect(),
        }
    }

    /// Effective level of every category, for proxy replication.
    pub fn replicated_levels(&self) -> Vec<Level> {
        self.categories.iter().map(|c| c.effective).collect()
    }
}

fn tier_disagrees<K: TierKind>(tier: Option<&TierContainer<K>>, claimed: Option<&PackedLevels>) -> bool
where
    TierContainer<K>: Correctable,
{
    match (tier, claimed) {
        (None, _) => false,
        (Some(tier), Some(claimed)) => tier.server_disagrees(claimed),
        (Some(tier), None) => !tier.active().is_empty(),
    }
}

// ---------------------------------------------------------------------------
// Proxy
// ---------------------------------------------------------------------------

impl ModifierSet<Proxy> {
    /// Adopts replicated effective levels, queueing events for every
    /// category that moved. Extra or missing levels are ignored.
    pub fn adopt_replicated(&mut self, levels: &[Level], events: &mut ModifierEventBuffer) -> usize {
        if levels.len() != self.categories.len() {
            tracing::warn!(
                expected = self.categories.len(),
                received = levels.len(),
                "replicated level count does not match catalog"
            );
        }
        let mut raised = 0;
        for (category, &level) in self.categories.iter_mut().zip(levels) {
            if let Some(event) = category.adopt_replicated_level(level) {
                events.send(event);
                raised += 1;
            }
        }
        raised
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitset::{LevelMask, MaskWidth, encode};
    use crate::eligibility::MotionState;
    use crate::wire::CategoryRequest;

    fn catalog() -> Arc<ModifierCatalog> {
        Arc::new(ModifierCatalog::with_defaults().unwrap())
    }

    #[test]
    fn test_catalog_rejects_duplicates() {
        let spec = CategorySpec {
            name: "Boost".into(),
            ..Default::default()
        };
        let err = ModifierCatalog::new(vec![spec.clone(), spec]).unwrap_err();
        assert!(matches!(err, ModifierError::InvalidCategory { .. }));
    }

    #[test]
    fn test_catalog_lookup() {
        let catalog = catalog();
        assert_eq!(catalog.id_of("Boost").unwrap(), CategoryId(0));
        assert_eq!(catalog.id_of("Snare").unwrap(), CategoryId(4));
        assert!(matches!(
            catalog.id_of("Teleport"),
            Err(ModifierError::UnknownCategory(_))
        ));
    }

    #[test]
    fn test_client_cannot_touch_disabled_tier() {
        let mut client = ModifierSet::<Predicting>::new(catalog());
        let haste = client.catalog().id_of("Haste").unwrap();
        assert!(client.add(haste, PredictedTier::LocalPredicted, 1));
        assert!(!client.add(haste, PredictedTier::WithCorrection, 1));
    }

    #[test]
    fn test_level_beyond_width_is_noop() {
        let mut client = ModifierSet::<Predicting>::new(catalog());
        let boost = client.catalog().id_of("Boost").unwrap();
        assert!(!client.add(boost, PredictedTier::LocalPredicted, 9));
        let wanted = client.get(boost).unwrap().local().unwrap().wanted();
        assert!(wanted.is_empty());
    }

    #[test]
    fn test_motion_scalars_multiply_active_effects() {
        let mut client = ModifierSet::<Predicting>::new(catalog());
        let boost = client.catalog().id_of("Boost").unwrap();
        let slow = client.catalog().id_of("Slow").unwrap();
        client.add(boost, PredictedTier::LocalPredicted, 2);
        client.add(slow, PredictedTier::WithCorrection, 2);
        client.reconcile(&MotionState::grounded(), &mut ModifierEventBuffer::new());

        let scalars = client.motion_scalars();
        assert!((scalars.effect.max_speed - 0.75).abs() < 1e-6);
        assert!(scalars.scale_root_motion);
    }

    #[test]
    fn test_snapshot_restores_local_wanted() {
        let mut client = ModifierSet::<Predicting>::new(catalog());
        let boost = client.catalog().id_of("Boost").unwrap();
        client.add(boost, PredictedTier::LocalPredicted, 1);
        let saved = client.snapshot_local_wanted();
        client.reset(boost, PredictedTier::LocalPredicted);
        client.add(boost, PredictedTier::LocalPredicted, 3);
        client.restore_local_wanted(&saved);
        assert_eq!(client.get(boost).unwrap().local().unwrap().wanted().as_slice(), &[1]);
    }

    #[test]
    fn test_server_disagrees_on_missing_claim_only_when_active() {
        let mut server = ModifierSet::<Authority>::new(catalog());
        let empty = RequestPayload {
            tick: 1,
            categories: Vec::new(),
        };
        server.reconcile(&true, &mut ModifierEventBuffer::new());
        assert!(!server.server_disagrees(&empty));

        let snare = server.catalog().id_of("Snare").unwrap();
        server.add(snare, Tier::ServerAuthoritative, 2);
        server.reconcile(&true, &mut ModifierEventBuffer::new());
        assert!(server.server_disagrees(&empty));

        let claim = RequestPayload {
            tick: 1,
            categories: vec![CategoryRequest {
                category: snare,
                local_wanted: None,
                correction_wanted: None,
                correction_active: None,
                server_active: Some(PackedLevels::Stack(vec![2])),
            }],
        };
        assert!(!server.server_disagrees(&claim));
    }

    #[test]
    fn test_apply_request_writes_both_predicted_tiers() {
        let mut server = ModifierSet::<Authority>::new(catalog());
        let slow = server.catalog().id_of("Slow").unwrap();
        let request = RequestPayload {
            tick: 5,
            categories: vec![CategoryRequest {
                category: slow,
                local_wanted: Some(PackedLevels::Mask(encode(MaskWidth::W8, [1]))),
                correction_wanted: Some(PackedLevels::Mask(LevelMask(0b1000))),
                correction_active: None,
                server_active: None,
            }],
        };
        server.apply_request(&request);
        let category = server.get(slow).unwrap();
        assert_eq!(category.local().unwrap().wanted().as_slice(), &[1]);
        assert_eq!(category.correction().unwrap().wanted().as_slice(), &[3]);
    }

    #[test]
    fn test_apply_request_leaves_server_tier_alone() {
        let mut server = ModifierSet::<Authority>::new(catalog());
        let snare = server.catalog().id_of("Snare").unwrap();
        server.add(snare, Tier::ServerAuthoritative, 2);
        let request = RequestPayload {
            tick: 5,
            categories: vec![CategoryRequest {
                category: snare,
                local_wanted: None,
                correction_wanted: None,
                correction_active: None,
                server_active: Some(PackedLevels::Stack(Vec::new())),
            }],
        };
        server.apply_request(&request);
        let category = server.get(snare).unwrap();
        assert_eq!(category.server().unwrap().wanted().as_slice(), &[2]);
    }

    #[test]
    fn test_catalog_rejects_too_many_categories() {
        let specs = (0..257)
            .map(|i| CategorySpec {
                name: format!("C{i}"),
                ..Default::default()
            })
            .collect();
        assert!(matches!(
            ModifierCatalog::new(specs),
            Err(ModifierError::TooManyCategories { count: 257, max: 256 })
        ));
    }

    #[test]
    fn test_proxy_adopts_levels() {
        let mut proxy = ModifierSet::<Proxy>::new(catalog());
        let mut events = ModifierEventBuffer::new();
        assert_eq!(proxy.adopt_replicated(&[1, 0, 0, 0, 3], &mut events), 2);
        assert_eq!(proxy.effective_level(CategoryId(4)), Some(3));
        assert_eq!(proxy.adopt_replicated(&[1, 0], &mut events), 0);
    }
}
