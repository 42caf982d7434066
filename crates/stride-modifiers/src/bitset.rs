//! Compact bitmask encoding for modifier levels.
//!
//! A level is a small index into a category's level table. On the wire and
//! in saved moves a set of levels is a single unsigned word with bit `i`
//! set for every level `i` present. The word width is fixed per category at
//! configuration time through [`MaskWidth`]; one codec serves all widths.

use serde::{Deserialize, Serialize};

/// Discrete intensity index of a modifier within its category (0 = weakest).
pub type Level = u8;

// ---------------------------------------------------------------------------
// MaskWidth
// ---------------------------------------------------------------------------

/// Bit width of a category's level mask. Bounds the number of representable
/// levels to 8, 16 or 32.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MaskWidth {
    /// 8 representable levels.
    #[default]
    W8,
    /// 16 representable levels.
    W16,
    /// 32 representable levels.
    W32,
}

impl MaskWidth {
    /// Number of bits (and therefore levels) this width can represent.
    pub const fn bits(self) -> u8 {
        match self {
            Self::W8 => 8,
            Self::W16 => 16,
            Self::W32 => 32,
        }
    }

    /// Mask with every representable bit set.
    pub const fn full_mask(self) -> u32 {
        match self {
            Self::W8 => u8::MAX as u32,
            Self::W16 => u16::MAX as u32,
            Self::W32 => u32::MAX,
        }
    }

    /// Smallest width able to hold `level_count` levels, or `None` if more
    /// than 32 are requested.
    pub const fn for_level_count(level_count: u8) -> Option<Self> {
        match level_count {
            0..=8 => Some(Self::W8),
            9..=16 => Some(Self::W16),
            17..=32 => Some(Self::W32),
            _ => None,
        }
    }

    /// Returns `true` if `level` is a valid bit position for this width.
    pub const fn is_valid_level(self, level: Level) -> bool {
        level < self.bits()
    }
}

// ---------------------------------------------------------------------------
// LevelMask
// ---------------------------------------------------------------------------

/// A set of levels packed one bit per level.
///
/// Stored as a `u32` regardless of the category width; the width only bounds
/// which bits may be set. Serialized transparently as the bare integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LevelMask(pub u32);

impl LevelMask {
    /// The empty mask.
    pub const EMPTY: Self = Self(0);

    /// Mask containing only `level`, or `None` if `level` does not fit in `width`.
    pub const fn single(width: MaskWidth, level: Level) -> Option<Self> {
        if width.is_valid_level(level) {
            Some(Self(1u32 << level))
        } else {
            None
        }
    }

    /// Raw bits.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns `true` if no level is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if `level` is set.
    pub const fn contains(self, level: Level) -> bool {
        level < 32 && self.0 & (1u32 << level) != 0
    }

    /// Number of levels set.
    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }

    /// Highest level set, if any.
    pub const fn highest(self) -> Option<Level> {
        if self.0 == 0 {
            None
        } else {
            Some((31 - self.0.leading_zeros()) as Level)
        }
    }

    /// Clears every bit that `width` cannot represent.
    pub const fn truncate(self, width: MaskWidth) -> Self {
        Self(self.0 & width.full_mask())
    }

    /// Iterates the set levels in ascending order.
    pub fn levels(self) -> impl Iterator<Item = Level> {
        let mut remaining = self.0;
        std::iter::from_fn(move || {
            if remaining == 0 {
                return None;
            }
            let level = remaining.trailing_zeros() as Level;
            remaining &= remaining - 1;
            Some(level)
        })
    }
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// Packs `levels` into a mask of the given width.
///
/// Levels that do not fit in `width` are ignored. Duplicates collapse.
pub fn encode<I>(width: MaskWidth, levels: I) -> LevelMask
where
    I: IntoIterator<Item = Level>,
{
    let mut bits = 0u32;
    for level in levels {
        if width.is_valid_level(level) {
            bits |= 1u32 << level;
        }
    }
    LevelMask(bits)
}

/// Unpacks `mask` into its levels in ascending order.
///
/// Bits above `width` are ignored, so a decoded set always satisfies the
/// width bound even if the mask came from an untrusted peer.
pub fn decode(width: MaskWidth, mask: LevelMask) -> Vec<Level> {
    mask.truncate(width).levels().collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
