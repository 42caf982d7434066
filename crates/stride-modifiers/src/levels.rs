//! Level collections and their packed (wire / saved-move) representation.
//!
//! A tier holds its wanted and active levels as a [`LevelStack`]: a sorted
//! multiset of levels. Whether duplicates are allowed is a per-category
//! [`Multiplicity`] choice. Set categories pack to a [`LevelMask`]; stack
//! categories pack to a counted list bounded by `max_serialized`.

use serde::{Deserialize, Serialize};

use crate::bitset::{self, Level, LevelMask, MaskWidth};

// ---------------------------------------------------------------------------
// Category semantics
// ---------------------------------------------------------------------------

/// How many times the same level may appear in one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Multiplicity {
    /// Each level at most once. Packs as a bitmask.
    #[default]
    Set,
    /// A level may be applied several times (e.g. three stacked snares).
    /// Packs as a counted list.
    Stack,
}

/// How `wanted_level` / `active_level` turn a level collection into a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LevelCounting {
    /// Number of entries in the collection.
    #[default]
    Cardinality,
    /// One-based position of the highest level present (0 when empty).
    HighestBit,
}

// ---------------------------------------------------------------------------
// LevelStack
// ---------------------------------------------------------------------------

/// Sorted collection of levels. Kept in ascending order so two stacks with
/// the same contents always compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct LevelStack(Vec<Level>);

impl LevelStack {
    /// Creates an empty stack.
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Builds a stack from arbitrary levels, sorting them.
    pub fn from_levels<I: IntoIterator<Item = Level>>(levels: I) -> Self {
        let mut v: Vec<Level> = levels.into_iter().collect();
        v.sort_unstable();
        Self(v)
    }

    /// Levels in ascending order.
    pub fn as_slice(&self) -> &[Level] {
        &self.0
    }

    /// Iterates levels in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = Level> + '_ {
        self.0.iter().copied()
    }

    /// Number of entries (duplicates included).
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` if `level` appears at least once.
    pub fn contains(&self, level: Level) -> bool {
        self.0.binary_search(&level).is_ok()
    }

    /// Number of times `level` appears.
    pub fn count_of(&self, level: Level) -> usize {
        self.0.iter().filter(|&&l| l == level).count()
    }

    /// Highest level present.
    pub fn highest(&self) -> Option<Level> {
        self.0.last().copied()
    }

    /// Inserts one occurrence of `level`, keeping order.
    pub fn insert(&mut self, level: Level) {
        let at = self.0.partition_point(|&l| l <= level);
        self.0.insert(at, level);
    }

    /// Removes one occurrence of `level`. Returns whether one was present.
    pub fn remove_one(&mut self, level: Level) -> bool {
        match self.0.binary_search(&level) {
            Ok(at) => {
                self.0.remove(at);
                true
            }
            Err(_) => false,
        }
    }

    /// Removes every occurrence of `level`. Returns whether any was present.
    pub fn remove_all(&mut self, level: Level) -> bool {
        let before = self.0.len();
        self.0.retain(|&l| l != level);
        self.0.len() != before
    }

    /// Removes everything.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Returns `true` if every entry of `self` is also in `other`, counting
    /// multiplicity.
    pub fn is_subset_of(&self, other: &LevelStack) -> bool {
        let mut rest = other.0.iter().peekable();
        'outer: for &level in &self.0 {
            while let Some(&&candidate) = rest.peek() {
                rest.next();
                if candidate == level {
                    continue 'outer;
                }
                if candidate > level {
                    return false;
                }
            }
            return false;
        }
        true
    }
}

// ---------------------------------------------------------------------------
// PackedLevels
// ---------------------------------------------------------------------------

/// Compact form of a [`LevelStack`] used in saved moves and wire payloads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PackedLevels {
    /// One bit per level ([`Multiplicity::Set`]).
    Mask(LevelMask),
    /// Counted list of levels ([`Multiplicity::Stack`]).
    Stack(Vec<Level>),
}

impl PackedLevels {
    /// Returns `true` if no level is present.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Mask(mask) => mask.is_empty(),
            Self::Stack(levels) => levels.is_empty(),
        }
    }
}

// ---------------------------------------------------------------------------
// LevelRules
// ---------------------------------------------------------------------------

/// Per-category rules every tier container follows. Derived from the
/// category configuration and copied into each container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelRules {
    /// Mask width bounding valid level indices.
    pub width: MaskWidth,
    /// Number of configured levels (`<= width.bits()`).
    pub level_count: u8,
    /// Set or stack semantics.
    pub multiplicity: Multiplicity,
    /// How level counts are reported.
    pub counting: LevelCounting,
    /// Maximum entries a packed stack may carry.
    pub max_serialized: u8,
}

impl LevelRules {
    /// Returns `true` if `level` is a configured level that fits the mask.
    pub fn is_valid(&self, level: Level) -> bool {
        level < self.level_count && self.width.is_valid_level(level)
    }

    /// Reports the level count of `stack` according to [`LevelCounting`].
    pub fn count(&self, stack: &LevelStack) -> u8 {
        match self.counting {
            LevelCounting::Cardinality => u8::try_from(stack.len()).unwrap_or(u8::MAX),
            LevelCounting::HighestBit => stack.highest().map_or(0, |l| l.saturating_add(1)),
        }
    }

    /// Packs `stack` for a saved move or the wire.
    ///
    /// Stack categories are truncated to `max_serialized` entries, keeping
    /// the lowest levels.
    pub fn pack(&self, stack: &LevelStack) -> PackedLevels {
        match self.multiplicity {
            Multiplicity::Set => PackedLevels::Mask(bitset::encode(self.width, stack.iter())),
            Multiplicity::Stack => {
                let keep = stack.len().min(usize::from(self.max_serialized));
                PackedLevels::Stack(stack.as_slice()[..keep].to_vec())
            }
        }
    }

    /// Unpacks levels received from a saved move or a peer.
    ///
    /// Never fails: bits or entries outside the configured bounds are
    /// dropped, an over-long stack is clamped to `max_serialized`, and each
    /// adjustment is logged.
    pub fn unpack(&self, packed: &PackedLevels) -> LevelStack {
        match packed {
            PackedLevels::Mask(mask) => {
                let valid = mask.truncate(self.width).bits() & self.configured_bits();
                if valid != mask.bits() {
                    tracing::warn!(
                        received = mask.bits(),
                        kept = valid,
                        "dropping modifier mask bits beyond configured levels"
                    );
                }
                let stack = LevelStack::from_levels(LevelMask(valid).levels());
                self.enforce_multiplicity(stack)
            }
            PackedLevels::Stack(levels) => {
                let max = usize::from(self.max_serialized);
                let mut clamped = levels.as_slice();
                if clamped.len() > max {
                    tracing::warn!(
                        received = levels.len(),
                        max,
                        "modifier stack exceeds serialization bound, clamping"
                    );
                    clamped = &clamped[..max];
                }
                let before = clamped.len();
                let stack =
                    LevelStack::from_levels(clamped.iter().copied().filter(|&l| self.is_valid(l)));
                if stack.len() != before {
                    tracing::warn!(
                        dropped = before - stack.len(),
                        "dropping invalid levels from modifier stack"
                    );
                }
                self.enforce_multiplicity(stack)
            }
        }
    }

    /// Bits for every configured level.
    fn configured_bits(&self) -> u32 {
        if self.level_count >= 32 {
            u32::MAX
        } else {
            (1u32 << self.level_count) - 1
        }
    }

    fn enforce_multiplicity(&self, mut stack: LevelStack) -> LevelStack {
        if self.multiplicity == Multiplicity::Set {
            stack.0.dedup();
        }
        stack
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn set_rules(level_count: u8) -> LevelRules {
        LevelRules {
            width: MaskWidth::W8,
            level_count,
            multiplicity: Multiplicity::Set,
            counting: LevelCounting::Cardinality,
            max_serialized: level_count,
        }
    }

    fn stack_rules(max_serialized: u8) -> LevelRules {
        LevelRules {
            multiplicity: Multiplicity::Stack,
            max_serialized,
            ..set_rules(4)
        }
    }

    #[test]
    fn test_stack_stays_sorted() {
        let mut stack = LevelStack::new();
        for level in [3, 1, 2, 1] {
            stack.insert(level);
        }
        assert_eq!(stack.as_slice(), &[1, 1, 2, 3]);
        assert_eq!(stack.count_of(1), 2);
        assert!(stack.remove_one(1));
        assert_eq!(stack.as_slice(), &[1, 2, 3]);
        assert!(stack.remove_all(2));
        assert!(!stack.remove_all(2));
        assert_eq!(stack.as_slice(), &[1, 3]);
    }

    #[test]
    fn test_subset_respects_multiplicity() {
        let big = LevelStack::from_levels([0, 1, 1, 4]);
        assert!(LevelStack::from_levels([1, 1]).is_subset_of(&big));
        assert!(LevelStack::from_levels([0, 4]).is_subset_of(&big));
        assert!(LevelStack::new().is_subset_of(&big));
        assert!(!LevelStack::from_levels([1, 1, 1]).is_subset_of(&big));
        assert!(!LevelStack::from_levels([2]).is_subset_of(&big));
        assert!(!LevelStack::from_levels([5]).is_subset_of(&big));
    }

    #[test]
    fn test_counting_modes() {
        let stack = LevelStack::from_levels([0, 2]);
        let mut rules = set_rules(4);
        assert_eq!(rules.count(&stack), 2);
        rules.counting = LevelCounting::HighestBit;
        assert_eq!(rules.count(&stack), 3);
        assert_eq!(rules.count(&LevelStack::new()), 0);
    }

    #[test]
    fn test_set_packs_as_mask() {
        let rules = set_rules(4);
        let packed = rules.pack(&LevelStack::from_levels([0, 3]));
        assert_eq!(packed, PackedLevels::Mask(LevelMask(0b1001)));
        assert_eq!(rules.unpack(&packed), LevelStack::from_levels([0, 3]));
    }

    #[test]
    fn test_unpack_mask_drops_unconfigured_levels() {
        let rules = set_rules(2);
        let stack = rules.unpack(&PackedLevels::Mask(LevelMask(0b1111_0110)));
        assert_eq!(stack.as_slice(), &[1]);
    }

    #[test]
    fn test_stack_pack_truncates_to_bound() {
        let rules = stack_rules(2);
        let packed = rules.pack(&LevelStack::from_levels([1, 1, 3]));
        assert_eq!(packed, PackedLevels::Stack(vec![1, 1]));
    }

    #[test]
    fn test_stack_unpack_clamps_oversized_input() {
        let rules = stack_rules(3);
        let stack = rules.unpack(&PackedLevels::Stack(vec![2, 2, 2, 2, 2, 2]));
        assert_eq!(stack.as_slice(), &[2, 2, 2]);
    }

    #[test]
    fn test_stack_unpack_drops_invalid_levels() {
        let rules = stack_rules(8);
        let stack = rules.unpack(&PackedLevels::Stack(vec![9, 1, 250, 0]));
        assert_eq!(stack.as_slice(), &[0, 1]);
    }

    #[test]
    fn test_set_rules_accept_stack_payload_without_duplicates() {
        let rules = set_rules(4);
        let stack = rules.unpack(&PackedLevels::Stack(vec![1, 1, 2]));
        assert_eq!(stack.as_slice(), &[1, 2]);
    }
}
