//! Graph coloring of touching contacts and joints.
//!
//! Constraints in the same color never share a dynamic body,
//! so a solver can process all constraints of a color in parallel.
//! Constraints that find no free color go to the overflow color,
//! which has no such guarantee and has to be solved serially.

use super::{contact::ContactSim, joint::JointSim};
use crate::{
    bitset::BitSet,
    keys::{BodyKey, ContactKey, JointKey},
};

pub const GRAPH_COLOR_COUNT: usize = 24;
/// The last color, used for constraints that did not fit anywhere else.
pub const OVERFLOW_INDEX: usize = GRAPH_COLOR_COUNT - 1;
/// Colors `0..DYNAMIC_COLOR_COUNT` take constraints between two dynamic bodies.
/// Constraints involving a static or kinematic body are colored from the top down
/// so that they are solved last and get the final say on penetration.
pub const DYNAMIC_COLOR_COUNT: usize = GRAPH_COLOR_COUNT - 4;

/// One color of the constraint graph.
#[derive(Clone, Debug, Default)]
pub struct GraphColor {
    // slots of the dynamic bodies used by constraints in this color.
    // always empty in the overflow color
    pub(crate) body_set: BitSet,
    pub(crate) contact_sims: Vec<ContactSim>,
    pub(crate) joint_sims: Vec<JointSim>,
}

impl GraphColor {
    #[inline]
    pub fn body_set(&self) -> &BitSet {
        &self.body_set
    }

    #[inline]
    pub fn contact_sims(&self) -> &[ContactSim] {
        &self.contact_sims
    }

    #[inline]
    pub fn joint_sims(&self) -> &[JointSim] {
        &self.joint_sims
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.contact_sims.is_empty() && self.joint_sims.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct ConstraintGraph {
    colors: [GraphColor; GRAPH_COLOR_COUNT],
}

impl ConstraintGraph {
    pub fn new(body_capacity: usize) -> Self {
        let body_capacity = body_capacity.max(8);
        let colors = std::array::from_fn(|idx| GraphColor {
            body_set: if idx == OVERFLOW_INDEX {
                BitSet::default()
            } else {
                BitSet::with_capacity(body_capacity)
            },
            ..Default::default()
        });
        Self { colors }
    }

    #[inline]
    pub fn colors(&self) -> &[GraphColor] {
        &self.colors
    }

    #[inline]
    pub fn color(&self, color_index: usize) -> &GraphColor {
        &self.colors[color_index]
    }

    #[inline]
    pub fn overflow(&self) -> &GraphColor {
        &self.colors[OVERFLOW_INDEX]
    }

    pub fn contact_count(&self) -> usize {
        self.colors.iter().map(|c| c.contact_sims.len()).sum()
    }

    pub fn joint_count(&self) -> usize {
        self.colors.iter().map(|c| c.joint_sims.len()).sum()
    }

    /// Pick the color for a constraint between two bodies and claim the bodies in it.
    /// `static_x` means the body is not dynamic; at least one of the two must be.
    fn assign_color(
        &mut self,
        body_a: usize,
        body_b: usize,
        static_a: bool,
        static_b: bool,
    ) -> usize {
        debug_assert!(
            !static_a || !static_b,
            "constraint between two non-dynamic bodies"
        );

        if !static_a && !static_b {
            for (color_idx, color) in self.colors[..DYNAMIC_COLOR_COUNT].iter_mut().enumerate() {
                let set = &mut color.body_set;
                if set.get(body_a) || set.get(body_b) {
                    continue;
                }
                set.set_grow(body_a);
                set.set_grow(body_b);
                return color_idx;
            }
        } else {
            let dynamic_body = if static_a { body_b } else { body_a };
            // color 0 is left to dynamic pairs
            for color_idx in (1..OVERFLOW_INDEX).rev() {
                let set = &mut self.colors[color_idx].body_set;
                if set.get(dynamic_body) {
                    continue;
                }
                set.set_grow(dynamic_body);
                return color_idx;
            }
        }

        OVERFLOW_INDEX
    }

    /// Release the color bits of a constraint's bodies.
    /// Bits of non-dynamic bodies were never set, so clearing them does nothing.
    fn release_color(&mut self, body_a: BodyKey, body_b: BodyKey, color_index: usize) {
        if color_index != OVERFLOW_INDEX {
            let set = &mut self.colors[color_index].body_set;
            set.clear_bit(body_a.slot() as usize);
            set.clear_bit(body_b.slot() as usize);
        }
    }

    /// Add a touching contact. Returns the color and the index of the contact within it.
    pub(crate) fn add_contact(
        &mut self,
        sim: ContactSim,
        static_a: bool,
        static_b: bool,
    ) -> (usize, usize) {
        let color_index = self.assign_color(
            sim.body_a.slot() as usize,
            sim.body_b.slot() as usize,
            static_a,
            static_b,
        );
        let color = &mut self.colors[color_index];
        color.contact_sims.push(sim);
        (color_index, color.contact_sims.len() - 1)
    }

    /// Remove a contact from its color by swapping the last contact into its place.
    /// Returns the removed sim and the key of the contact that was moved, if any,
    /// whose local index is now `local_index`.
    pub(crate) fn remove_contact(
        &mut self,
        body_a: BodyKey,
        body_b: BodyKey,
        color_index: usize,
        local_index: usize,
    ) -> (ContactSim, Option<ContactKey>) {
        self.release_color(body_a, body_b, color_index);
        let sims = &mut self.colors[color_index].contact_sims;
        let removed = sims.swap_remove(local_index);
        let moved = sims.get(local_index).map(|sim| sim.contact);
        (removed, moved)
    }

    pub(crate) fn contact_sim_mut(
        &mut self,
        color_index: usize,
        local_index: usize,
    ) -> &mut ContactSim {
        &mut self.colors[color_index].contact_sims[local_index]
    }

    /// Add a joint. Returns the color and the index of the joint within it.
    pub(crate) fn add_joint(
        &mut self,
        sim: JointSim,
        static_a: bool,
        static_b: bool,
    ) -> (usize, usize) {
        let color_index = self.assign_color(
            sim.body_a.slot() as usize,
            sim.body_b.slot() as usize,
            static_a,
            static_b,
        );
        let color = &mut self.colors[color_index];
        color.joint_sims.push(sim);
        (color_index, color.joint_sims.len() - 1)
    }

    /// Joint counterpart of [`remove_contact`][Self::remove_contact].
    pub(crate) fn remove_joint(
        &mut self,
        body_a: BodyKey,
        body_b: BodyKey,
        color_index: usize,
        local_index: usize,
    ) -> (JointSim, Option<JointKey>) {
        self.release_color(body_a, body_b, color_index);
        let sims = &mut self.colors[color_index].joint_sims;
        let removed = sims.swap_remove(local_index);
        let moved = sims.get(local_index).map(|sim| sim.joint);
        (removed, moved)
    }

    /// Check that the overflow color has no body bits
    /// and that no dynamic body is used twice within a color.
    /// `is_dynamic` tells which bodies claim color bits.
    /// Does nothing without debug assertions.
    pub fn validate(&self, is_dynamic: impl Fn(BodyKey) -> bool) {
        if !cfg!(debug_assertions) {
            return;
        }
        assert!(self.colors[OVERFLOW_INDEX].body_set.is_empty());

        for (color_idx, color) in self.colors[..OVERFLOW_INDEX].iter().enumerate() {
            let mut used = BitSet::with_capacity(color.body_set.capacity());
            let bodies = color
                .contact_sims
                .iter()
                .map(|s| [s.body_a, s.body_b])
                .chain(color.joint_sims.iter().map(|s| [s.body_a, s.body_b]));
            for body in bodies.flatten().filter(|b| is_dynamic(*b)) {
                let slot = body.slot() as usize;
                assert!(
                    !used.get(slot),
                    "body {body:?} used twice in color {color_idx}"
                );
                used.set_grow(slot);
                assert!(color.body_set.get(slot), "color {color_idx} missing body bit");
            }
            assert_eq!(
                used.count_ones(),
                color.body_set.count_ones(),
                "color {color_idx} has stale body bits"
            );
        }
    }
}
