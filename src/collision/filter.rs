use crate::keys::ShapeKey;

/// Collision filtering data attached to each shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-types", serde(default))]
pub struct Filter {
    /// The categories this shape belongs to. Usually a single bit.
    pub category_bits: u64,
    /// The categories this shape accepts collisions with.
    pub mask_bits: u64,
    /// Shapes sharing a non-zero group always collide if the group is positive
    /// and never collide if it is negative, overriding the bit masks.
    pub group_index: i32,
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            category_bits: 1,
            mask_bits: u64::MAX,
            group_index: 0,
        }
    }
}

/// Check whether two filters allow their shapes to collide.
#[inline]
pub fn should_shapes_collide(a: Filter, b: Filter) -> bool {
    if a.group_index == b.group_index && a.group_index != 0 {
        return a.group_index > 0;
    }
    (a.mask_bits & b.category_bits) != 0 && (a.category_bits & b.mask_bits) != 0
}

/// A user callback that can veto pairs found by the broad phase.
///
/// Called from worker threads during the pair search,
/// only for pairs where at least one shape has custom filtering enabled.
/// Return `false` to prevent a contact from being created.
pub type CustomFilter = Box<dyn Fn(ShapeKey, ShapeKey) -> bool + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_must_match_both_ways() {
        let a = Filter {
            category_bits: 0b01,
            mask_bits: 0b10,
            group_index: 0,
        };
        let b = Filter {
            category_bits: 0b10,
            mask_bits: 0b01,
            group_index: 0,
        };
        let c = Filter {
            category_bits: 0b10,
            mask_bits: 0b10,
            group_index: 0,
        };
        assert!(should_shapes_collide(a, b));
        assert!(!should_shapes_collide(a, c));
        assert!(should_shapes_collide(Filter::default(), Filter::default()));
    }

    #[test]
    fn groups_override_masks() {
        let never = Filter {
            group_index: -3,
            ..Default::default()
        };
        let always = Filter {
            category_bits: 0b01,
            mask_bits: 0,
            group_index: 4,
        };
        assert!(!should_shapes_collide(never, never));
        assert!(should_shapes_collide(always, always));
        // different groups fall back to masks
        assert!(!should_shapes_collide(never, always));
    }
}
