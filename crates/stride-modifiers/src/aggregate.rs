//! Level aggregation.
//!
//! One reduction is applied twice per category per tick: first over a
//! tier's active levels, then over the per-tier results. The method is a
//! single per-category setting.

use serde::{Deserialize, Serialize};

use crate::bitset::Level;

/// How several levels collapse into one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AggregationMethod {
    /// Largest level wins.
    #[default]
    Max,
    /// Smallest level wins.
    Min,
    /// Levels add up, saturating at the category maximum.
    Stack,
    /// Integer mean, truncated toward zero.
    Average,
}

/// Reduces `levels` to a single level.
///
/// Returns `invalid` when `levels` is empty. Any other result is clamped to
/// `[0, max_level]`.
pub fn reduce(method: AggregationMethod, levels: &[Level], max_level: Level, invalid: Level) -> Level {
    if levels.is_empty() {
        return invalid;
    }
    let raw: u32 = match method {
        AggregationMethod::Max => levels.iter().copied().max().map_or(0, u32::from),
        AggregationMethod::Min => levels.iter().copied().min().map_or(0, u32::from),
        AggregationMethod::Stack => levels.iter().map(|&l| u32::from(l)).sum(),
        AggregationMethod::Average => {
            let sum: u32 = levels.iter().map(|&l| u32::from(l)).sum();
            sum / levels.len() as u32
        }
    };
    u8::try_from(raw.min(u32::from(max_level))).unwrap_or(max_level)
}

/// Reduces per-tier levels to a category's effective level.
///
/// Tiers reporting `invalid` carry no modifier and are skipped, so an
/// empty tier never drags a `Min` or `Average` result down.
pub fn combine_tiers(
    method: AggregationMethod,
    tier_levels: impl IntoIterator<Item = Level>,
    max_level: Level,
    invalid: Level,
) -> Level {
    let present: Vec<Level> = tier_levels.into_iter().filter(|&l| l != invalid).collect();
    reduce(method, &present, max_level, invalid)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [AggregationMethod; 4] = [
        AggregationMethod::Max,
        AggregationMethod::Min,
        AggregationMethod::Stack,
        AggregationMethod::Average,
    ];

    #[test]
    fn test_methods() {
        let levels = [1, 4, 2];
        assert_eq!(reduce(AggregationMethod::Max, &levels, 9, 0), 4);
        assert_eq!(reduce(AggregationMethod::Min, &levels, 9, 0), 1);
        assert_eq!(reduce(AggregationMethod::Stack, &levels, 9, 0), 7);
        assert_eq!(reduce(AggregationMethod::Average, &levels, 9, 0), 2);
    }

    #[test]
    fn test_empty_yields_sentinel() {
        for method in ALL {
            assert_eq!(reduce(method, &[], 5, 255), 255);
            assert_eq!(reduce(method, &[], 5, 0), 0);
        }
    }

    #[test]
    fn test_stack_saturates_at_max() {
        assert_eq!(reduce(AggregationMethod::Stack, &[200, 200, 200], 7, 0), 7);
    }

    #[test]
    fn test_result_is_clamped() {
        for method in ALL {
            let level = reduce(method, &[12, 30], 10, 255);
            assert!(level <= 10, "{method:?} gave {level}");
        }
    }

    #[test]
    fn test_reduce_is_deterministic() {
        for method in ALL {
            let a = reduce(method, &[3, 1, 2], 8, 0);
            let b = reduce(method, &[3, 1, 2], 8, 0);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_combine_skips_empty_tiers() {
        let invalid = 255;
        assert_eq!(
            combine_tiers(AggregationMethod::Min, [invalid, 3, invalid], 8, invalid),
            3
        );
        assert_eq!(
            combine_tiers(AggregationMethod::Average, [invalid, 4, 2], 8, invalid),
            3
        );
        assert_eq!(
            combine_tiers(AggregationMethod::Max, [invalid; 3], 8, invalid),
            invalid
        );
    }
}
