//! Per-tier wanted/active level container.
//!
//! `wanted` is what the owning side requests. `active` is the subset of
//! `wanted` currently permitted by movement eligibility, and is only ever
//! rewritten wholesale by [`ModifierState::refresh_active`].

use crate::bitset::Level;
use crate::levels::{LevelRules, LevelStack, Multiplicity, PackedLevels};

/// Wanted and active levels for one category in one tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifierState {
    rules: LevelRules,
    wanted: LevelStack,
    active: LevelStack,
}

impl ModifierState {
    /// Creates an empty container following `rules`.
    pub fn new(rules: LevelRules) -> Self {
        Self {
            rules,
            wanted: LevelStack::new(),
            active: LevelStack::new(),
        }
    }

    /// Rules this container enforces.
    pub fn rules(&self) -> &LevelRules {
        &self.rules
    }

    /// Requested levels.
    pub fn wanted(&self) -> &LevelStack {
        &self.wanted
    }

    /// Levels applied as of the last refresh.
    pub fn active(&self) -> &LevelStack {
        &self.active
    }

    // -- Mutation ----------------------------------------------------------

    /// Requests `level`. Returns whether `wanted` changed.
    ///
    /// Invalid levels are ignored. Set categories ignore a level already
    /// present; stack categories refuse to grow past `max_serialized` so a
    /// saved move can always carry the full stack.
    pub fn add(&mut self, level: Level) -> bool {
        if !self.rules.is_valid(level) {
            tracing::trace!(level, "ignoring add of invalid modifier level");
            return false;
        }
        match self.rules.multiplicity {
            Multiplicity::Set if self.wanted.contains(level) => false,
            Multiplicity::Stack if self.wanted.len() >= usize::from(self.rules.max_serialized) => {
                tracing::trace!(level, "modifier stack full, ignoring add");
                false
            }
            _ => {
                self.wanted.insert(level);
                true
            }
        }
    }

    /// Removes one occurrence of `level`. Returns whether `wanted` changed.
    pub fn remove(&mut self, level: Level) -> bool {
        self.rules.is_valid(level) && self.wanted.remove_one(level)
    }

    /// Removes every occurrence of `level`. Returns whether `wanted` changed.
    pub fn remove_all(&mut self, level: Level) -> bool {
        self.rules.is_valid(level) && self.wanted.remove_all(level)
    }

    /// Clears `wanted`. Returns whether anything was removed.
    pub fn reset(&mut self) -> bool {
        let changed = !self.wanted.is_empty();
        self.wanted.clear();
        changed
    }

    /// Recomputes `active` from `wanted`: everything when eligible, nothing
    /// otherwise. Returns whether `active` changed.
    pub fn refresh_active(&mut self, eligible: bool) -> bool {
        let next = if eligible {
            self.wanted.clone()
        } else {
            LevelStack::new()
        };
        if next == self.active {
            return false;
        }
        self.active = next;
        true
    }

    // -- Counting ----------------------------------------------------------

    /// Level count of `wanted` under the category's counting rule.
    pub fn wanted_level(&self) -> u8 {
        self.rules.count(&self.wanted)
    }

    /// Level count of `active` under the category's counting rule.
    pub fn active_level(&self) -> u8 {
        self.rules.count(&self.active)
    }

    // -- Packing -----------------------------------------------------------

    /// `wanted` in saved-move / wire form.
    pub fn packed_wanted(&self) -> PackedLevels {
        self.rules.pack(&self.wanted)
    }

    /// `active` in saved-move / wire form.
    pub fn packed_active(&self) -> PackedLevels {
        self.rules.pack(&self.active)
    }

    /// Replaces `wanted` with unpacked levels. Returns whether it changed.
    pub(crate) fn overwrite_wanted(&mut self, packed: &PackedLevels) -> bool {
        let next = self.rules.unpack(packed);
        if next == self.wanted {
            return false;
        }
        self.wanted = next;
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitset::MaskWidth;
    use crate::levels::LevelCounting;

    fn rules(multiplicity: Multiplicity) -> LevelRules {
        LevelRules {
            width: MaskWidth::W8,
            level_count: 8,
            multiplicity,
            counting: LevelCounting::Cardinality,
            max_serialized: 4,
        }
    }

    #[test]
    fn test_add_out_of_range_is_noop() {
        let mut state = ModifierState::new(rules(Multiplicity::Set));
        assert!(state.add(2));
        assert!(!state.add(9));
        assert!(!state.add(8));
        assert_eq!(state.wanted().as_slice(), &[2]);
    }

    #[test]
    fn test_set_add_is_idempotent() {
        let mut state = ModifierState::new(rules(Multiplicity::Set));
        assert!(state.add(1));
        assert!(!state.add(1));
        assert_eq!(state.wanted_level(), 1);
    }

    #[test]
    fn test_stack_accepts_duplicates_up_to_bound() {
        let mut state = ModifierState::new(rules(Multiplicity::Stack));
        for _ in 0..4 {
            assert!(state.add(3));
        }
        assert!(!state.add(3));
        assert_eq!(state.wanted_level(), 4);
        assert!(state.remove(3));
        assert_eq!(state.wanted_level(), 3);
        assert!(state.remove_all(3));
        assert!(state.wanted().is_empty());
    }

    #[test]
    fn test_reset_clears_wanted_only() {
        let mut state = ModifierState::new(rules(Multiplicity::Set));
        state.add(0);
        state.refresh_active(true);
        assert!(state.reset());
        assert!(!state.reset());
        assert!(state.wanted().is_empty());
        assert_eq!(state.active().as_slice(), &[0]);
    }

    #[test]
    fn test_refresh_reports_change_once() {
        let mut state = ModifierState::new(rules(Multiplicity::Set));
        state.add(1);
        assert!(state.refresh_active(true));
        assert!(!state.refresh_active(true));
        assert!(state.refresh_active(false));
        assert!(state.active().is_empty());
        assert!(!state.refresh_active(false));
    }

    #[test]
    fn test_active_is_subset_of_wanted_after_refresh() {
        let mut state = ModifierState::new(rules(Multiplicity::Stack));
        let script: [(&[Level], &[Level], bool); 4] = [
            (&[1, 1, 2], &[], true),
            (&[], &[1], false),
            (&[5], &[], true),
            (&[], &[2, 5], true),
        ];
        for (adds, removes, eligible) in script {
            for &level in adds {
                state.add(level);
            }
            for &level in removes {
                state.remove(level);
            }
            state.refresh_active(eligible);
            assert!(state.active().is_subset_of(state.wanted()));
        }
    }

    #[test]
    fn test_overwrite_wanted_unpacks_and_reports_change() {
        let mut state = ModifierState::new(rules(Multiplicity::Set));
        state.add(1);
        let packed = PackedLevels::Mask(crate::bitset::LevelMask(0b01));
        assert!(state.overwrite_wanted(&packed));
        assert!(!state.overwrite_wanted(&packed));
        assert_eq!(state.wanted().as_slice(), &[0]);
    }
}
