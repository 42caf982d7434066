//! Scripted gameplay driving the loopback: modifier changes issued by the
//! client and the server at fixed ticks, plus windows where each side sees
//! the pawn as ineligible.

use std::ops::Range;

use stride_modifiers::{
    Authority, CategoryId, Level, ModifierCatalog, ModifierSet, MotionState, MovementMode,
    PredictedTier, Predicting, Tier,
};

/// A single mutation of one tier's wanted levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add(Level),
    Remove(Level),
    Reset,
}

/// Which peer issues a cue, and on which tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    /// Predicted by the client on its own tick.
    Client(PredictedTier),
    /// Issued by server game logic at the server's wall tick.
    Server(Tier),
}

/// A scripted modifier change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cue {
    pub tick: u64,
    pub category: &'static str,
    pub actor: Actor,
    pub op: Op,
}

/// A cue with its category resolved against the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedCue {
    pub tick: u64,
    pub category: CategoryId,
    pub actor: Actor,
    pub op: Op,
}

/// An area where server game logic holds a with-correction level on the
/// pawn. The client never predicts it, so entering and leaving are both
/// corrected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zone {
    pub category: &'static str,
    pub level: Level,
    pub ticks: Range<u64>,
}

/// A zone with its category resolved against the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedZone {
    pub category: CategoryId,
    pub level: Level,
    pub ticks: Range<u64>,
}

impl ResolvedZone {
    /// Rewrites the with-correction tier for a move simulated on `tick`.
    pub fn apply(&self, set: &mut ModifierSet<Authority>, tick: u64) {
        if self.ticks.contains(&tick) {
            set.add(self.category, Tier::WithCorrection, self.level);
        } else {
            set.remove(self.category, Tier::WithCorrection, self.level);
        }
    }
}

/// Cues plus the ticks during which each side sees the pawn flying.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub cues: Vec<Cue>,
    pub server_zones: Vec<Zone>,
    pub client_airborne: Vec<Range<u64>>,
    pub server_airborne: Vec<Range<u64>>,
}

impl Script {
    /// Demo session over the stock categories.
    ///
    /// Boost and Haste are purely client predicted. Slow is predicted by the
    /// client and adopted by the server, except inside the tar zone where
    /// the server forces level 2. Snare is server authoritative and only
    /// reaches the client through corrections. Around tick 400 the server
    /// keeps the pawn flying a few ticks longer than the client predicted.
    pub fn demo() -> Self {
        use Actor::{Client, Server};
        let cue = |tick, category, actor, op| Cue {
            tick,
            category,
            actor,
            op,
        };
        Self {
            cues: vec![
                cue(30, "Boost", Client(PredictedTier::LocalPredicted), Op::Add(2)),
                cue(90, "Boost", Client(PredictedTier::LocalPredicted), Op::Remove(2)),
                cue(120, "Slow", Client(PredictedTier::WithCorrection), Op::Add(1)),
                cue(180, "Snare", Server(Tier::ServerAuthoritative), Op::Add(2)),
                cue(200, "Snare", Server(Tier::ServerAuthoritative), Op::Add(2)),
                cue(240, "Snare", Server(Tier::ServerAuthoritative), Op::Remove(2)),
                cue(260, "Slow", Client(PredictedTier::WithCorrection), Op::Reset),
                cue(300, "Haste", Client(PredictedTier::LocalPredicted), Op::Add(1)),
                cue(330, "Snare", Server(Tier::ServerAuthoritative), Op::Reset),
                cue(360, "Haste", Client(PredictedTier::LocalPredicted), Op::Remove(1)),
                cue(380, "Slow", Client(PredictedTier::WithCorrection), Op::Add(3)),
                cue(450, "Slow", Client(PredictedTier::WithCorrection), Op::Remove(3)),
            ],
            server_zones: vec![Zone {
                category: "Slow",
                level: 2,
                ticks: 500..540,
            }],
            client_airborne: vec![400..420],
            server_airborne: vec![400..426],
        }
    }

    /// Resolves category names, dropping cues for categories the catalog
    /// does not define.
    pub fn resolve(&self, catalog: &ModifierCatalog) -> Vec<ResolvedCue> {
        let mut resolved: Vec<ResolvedCue> = self
            .cues
            .iter()
            .filter_map(|cue| match catalog.id_of(cue.category) {
                Ok(category) => Some(ResolvedCue {
                    tick: cue.tick,
                    category,
                    actor: cue.actor,
                    op: cue.op,
                }),
                Err(err) => {
                    tracing::warn!(tick = cue.tick, %err, "dropping scripted cue");
                    None
                }
            })
            .collect();
        resolved.sort_by_key(|cue| cue.tick);
        resolved
    }

    /// Resolves zone categories, dropping zones the catalog cannot host.
    pub fn resolve_zones(&self, catalog: &ModifierCatalog) -> Vec<ResolvedZone> {
        self.server_zones
            .iter()
            .filter_map(|zone| match catalog.id_of(zone.category) {
                Ok(category) => Some(ResolvedZone {
                    category,
                    level: zone.level,
                    ticks: zone.ticks.clone(),
                }),
                Err(err) => {
                    tracing::warn!(%err, "dropping scripted zone");
                    None
                }
            })
            .collect()
    }

    /// Motion state the client predicts for `tick`.
    pub fn client_motion(&self, tick: u64) -> MotionState {
        motion_at(&self.client_airborne, tick)
    }

    /// Motion state the server simulates for `tick`.
    pub fn server_motion(&self, tick: u64) -> MotionState {
        motion_at(&self.server_airborne, tick)
    }
}

fn motion_at(airborne: &[Range<u64>], tick: u64) -> MotionState {
    if airborne.iter().any(|window| window.contains(&tick)) {
        MotionState {
            mode: MovementMode::Flying,
            simulating_physics: false,
        }
    } else {
        MotionState::grounded()
    }
}

/// Applies a client cue. Server cues are ignored.
pub fn apply_client(set: &mut ModifierSet<Predicting>, cue: &ResolvedCue) -> bool {
    let Actor::Client(tier) = cue.actor else {
        return false;
    };
    match cue.op {
        Op::Add(level) => set.add(cue.category, tier, level),
        Op::Remove(level) => set.remove(cue.category, tier, level),
        Op::Reset => set.reset(cue.category, tier),
    }
}

/// Applies a server cue. Client cues are ignored.
pub fn apply_server(set: &mut ModifierSet<Authority>, cue: &ResolvedCue) -> bool {
    let Actor::Server(tier) = cue.actor else {
        return false;
    };
    match cue.op {
        Op::Add(level) => set.add(cue.category, tier, level),
        Op::Remove(level) => set.remove(cue.category, tier, level),
        Op::Reset => set.reset(cue.category, tier),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use stride_modifiers::CategorySpec;

    use super::*;

    fn catalog() -> ModifierCatalog {
        ModifierCatalog::with_defaults().unwrap()
    }

    #[test]
    fn test_demo_resolves_against_defaults() {
        let script = Script::demo();
        let resolved = script.resolve(&catalog());
        assert_eq!(resolved.len(), script.cues.len());
        assert!(resolved.windows(2).all(|w| w[0].tick <= w[1].tick));
    }

    #[test]
    fn test_unknown_category_dropped() {
        let catalog = ModifierCatalog::new(vec![CategorySpec {
            name: "Boost".into(),
            ..Default::default()
        }])
        .unwrap();
        let resolved = Script::demo().resolve(&catalog);
        assert!(resolved.iter().all(|cue| cue.category == CategoryId(0)));
        assert_eq!(resolved.len(), 2);
    }

    #[test]
    fn test_airborne_window_blocks_modifiers() {
        let script = Script::demo();
        assert!(script.client_motion(399).allows_modifiers());
        assert!(!script.client_motion(400).allows_modifiers());
        assert!(script.client_motion(420).allows_modifiers());
        assert!(!script.server_motion(425).allows_modifiers());
    }

    #[test]
    fn test_zone_holds_level_only_inside_window() {
        let catalog = Arc::new(catalog());
        let zones = Script::demo().resolve_zones(&catalog);
        assert_eq!(zones.len(), 1);
        let zone = &zones[0];

        let mut server = ModifierSet::<Authority>::new(catalog);
        let wanted = |set: &ModifierSet<Authority>| {
            set.get(zone.category).unwrap().correction().unwrap().wanted().as_slice().to_vec()
        };
        zone.apply(&mut server, 499);
        assert!(wanted(&server).is_empty());
        zone.apply(&mut server, 500);
        assert_eq!(wanted(&server), vec![2]);
        zone.apply(&mut server, 540);
        assert!(wanted(&server).is_empty());
    }

    #[test]
    fn test_cues_only_touch_their_own_peer() {
        let catalog = Arc::new(catalog());
        let mut client = ModifierSet::<Predicting>::new(catalog.clone());
        let mut server = ModifierSet::<Authority>::new(catalog);
        let cue = ResolvedCue {
            tick: 0,
            category: CategoryId(0),
            actor: Actor::Client(PredictedTier::LocalPredicted),
            op: Op::Add(2),
        };
        assert!(apply_client(&mut client, &cue));
        assert!(!apply_server(&mut server, &cue));
        assert!(server.get(CategoryId(0)).unwrap().local().unwrap().wanted().is_empty());
    }
}
