//! Islands are connected components of dynamic bodies,
//! linked together by touching contacts and joints.
//! An island is the unit that falls asleep and wakes up.
//!
//! Islands merge eagerly when a new constraint connects them.
//! Removing a constraint only bumps a counter, because finding out
//! whether the island actually came apart takes a full traversal.
//! That traversal happens in [`World::split_island`],
//! which the sleep update calls for islands that are about to fall asleep.

use super::World;
use crate::{
    collision::BodyType,
    error::WorldError,
    keys::{BodyKey, ContactKey, IslandKey, JointKey, SetIndex},
};

/// Intrusive lists of the bodies, contacts and joints in one island.
#[derive(Clone, Copy, Debug, Default)]
pub struct Island {
    pub(crate) set_index: SetIndex,
    pub(crate) local_index: usize,

    pub(crate) body_head: Option<BodyKey>,
    pub(crate) body_tail: Option<BodyKey>,
    pub(crate) body_count: usize,

    pub(crate) contact_head: Option<ContactKey>,
    pub(crate) contact_tail: Option<ContactKey>,
    pub(crate) contact_count: usize,

    pub(crate) joint_head: Option<JointKey>,
    pub(crate) joint_tail: Option<JointKey>,
    pub(crate) joint_count: usize,

    /// Constraints removed since the island was last split.
    /// Non-zero means the island may have come apart.
    pub(crate) constraint_remove_count: usize,
}

impl Island {
    #[inline]
    pub fn set_index(&self) -> SetIndex {
        self.set_index
    }

    #[inline]
    pub fn body_count(&self) -> usize {
        self.body_count
    }

    #[inline]
    pub fn contact_count(&self) -> usize {
        self.contact_count
    }

    #[inline]
    pub fn joint_count(&self) -> usize {
        self.joint_count
    }

    #[inline]
    pub fn constraint_remove_count(&self) -> usize {
        self.constraint_remove_count
    }

    fn is_empty(&self) -> bool {
        self.body_count == 0 && self.contact_count == 0 && self.joint_count == 0
    }
}

/// The record of an island in its solver set.
#[derive(Clone, Copy, Debug)]
pub struct IslandSim {
    pub island: IslandKey,
}

impl World {
    pub(crate) fn create_island(&mut self, set_index: SetIndex) -> IslandKey {
        let local_index = self.set(set_index).island_sims.len();
        let key = IslandKey(self.islands.insert(Island {
            set_index,
            local_index,
            ..Default::default()
        }));
        self.set_mut(set_index).island_sims.push(IslandSim { island: key });
        key
    }

    pub(crate) fn destroy_island(&mut self, key: IslandKey) {
        let island = self.islands[key.0];
        assert!(island.is_empty(), "destroyed island {key:?} still has members");
        self.remove_island_sim(island.set_index, island.local_index);
        self.islands.remove(key.0);
    }

    /// Swap-remove an island sim from a set, fixing the index of the island moved into its place.
    pub(crate) fn remove_island_sim(
        &mut self,
        set_index: SetIndex,
        local_index: usize,
    ) -> IslandSim {
        let sims = &mut self.set_mut(set_index).island_sims;
        let removed = sims.swap_remove(local_index);
        if let Some(moved) = sims.get(local_index) {
            let moved_key = moved.island;
            self.islands[moved_key.0].local_index = local_index;
        }
        removed
    }

    pub(crate) fn push_island_sim(&mut self, set_index: SetIndex, sim: IslandSim) {
        let sims = &mut self.set_mut(set_index).island_sims;
        let local_index = sims.len();
        sims.push(sim);
        let island = &mut self.islands[sim.island.0];
        island.set_index = set_index;
        island.local_index = local_index;
    }

    pub(crate) fn create_island_for_body(&mut self, body_key: BodyKey) {
        let set_index = self.bodies[body_key.0].set_index;
        let island_key = self.create_island(set_index);
        let island = &mut self.islands[island_key.0];
        island.body_head = Some(body_key);
        island.body_tail = Some(body_key);
        island.body_count = 1;

        let body = &mut self.bodies[body_key.0];
        body.island = Some(island_key);
        body.island_prev = None;
        body.island_next = None;
    }

    /// Take a body out of its island, destroying the island if it was the last body.
    /// The body's constraints must already be gone.
    pub(crate) fn remove_body_from_island(&mut self, body_key: BodyKey) {
        let body = &mut self.bodies[body_key.0];
        let Some(island_key) = body.island.take() else {
            return;
        };
        let (prev, next) = (body.island_prev.take(), body.island_next.take());

        if let Some(prev) = prev {
            self.bodies[prev.0].island_next = next;
        }
        if let Some(next) = next {
            self.bodies[next.0].island_prev = prev;
        }
        let island = &mut self.islands[island_key.0];
        if island.body_head == Some(body_key) {
            island.body_head = next;
        }
        if island.body_tail == Some(body_key) {
            island.body_tail = prev;
        }
        island.body_count -= 1;

        if island.body_count == 0 {
            self.destroy_island(island_key);
        } else {
            self.validate_island(island_key);
        }
    }

    /// Merge two islands, returning the one that survives.
    ///
    /// The island with more bodies survives and the other one is relabeled into it.
    /// If either island is `None` the other one is returned as is.
    /// Both islands must be awake.
    pub(crate) fn merge_islands(
        &mut self,
        island_a: Option<IslandKey>,
        island_b: Option<IslandKey>,
    ) -> Option<IslandKey> {
        let (key_a, key_b) = match (island_a, island_b) {
            (Some(a), Some(b)) if a != b => (a, b),
            (Some(a), _) => return Some(a),
            (None, b) => return b,
        };
        let (big_key, small_key) =
            if self.islands[key_a.0].body_count >= self.islands[key_b.0].body_count {
                (key_a, key_b)
            } else {
                (key_b, key_a)
            };
        let big = self.islands[big_key.0];
        let small = self.islands[small_key.0];
        debug_assert_eq!(big.set_index, SetIndex::AWAKE);
        debug_assert_eq!(small.set_index, SetIndex::AWAKE);

        // relabel
        let mut next = small.body_head;
        while let Some(key) = next {
            let body = &mut self.bodies[key.0];
            body.island = Some(big_key);
            next = body.island_next;
        }
        let mut next = small.contact_head;
        while let Some(key) = next {
            let contact = &mut self.contacts[key.0];
            contact.island = Some(big_key);
            next = contact.island_next;
        }
        let mut next = small.joint_head;
        while let Some(key) = next {
            let joint = &mut self.joints[key.0];
            joint.island = Some(big_key);
            next = joint.island_next;
        }

        // splice small's lists onto the tails of big's
        let mut merged = big;
        if let Some(head) = small.body_head {
            let tail = big.body_tail.expect("island without bodies");
            self.bodies[tail.0].island_next = Some(head);
            self.bodies[head.0].island_prev = Some(tail);
            merged.body_tail = small.body_tail;
        }
        if let Some(head) = small.contact_head {
            match big.contact_tail {
                Some(tail) => {
                    self.contacts[tail.0].island_next = Some(head);
                    self.contacts[head.0].island_prev = Some(tail);
                }
                None => merged.contact_head = Some(head),
            }
            merged.contact_tail = small.contact_tail;
        }
        if let Some(head) = small.joint_head {
            match big.joint_tail {
                Some(tail) => {
                    self.joints[tail.0].island_next = Some(head);
                    self.joints[head.0].island_prev = Some(tail);
                }
                None => merged.joint_head = Some(head),
            }
            merged.joint_tail = small.joint_tail;
        }
        merged.body_count += small.body_count;
        merged.contact_count += small.contact_count;
        merged.joint_count += small.joint_count;
        merged.constraint_remove_count += small.constraint_remove_count;
        self.islands[big_key.0] = merged;

        let small = &mut self.islands[small_key.0];
        *small = Island {
            set_index: small.set_index,
            local_index: small.local_index,
            ..Default::default()
        };
        self.destroy_island(small_key);

        self.validate_island(big_key);
        Some(big_key)
    }

    /// Wake a sleeping body if the other body is awake.
    fn wake_for_link(&mut self, body_a: BodyKey, body_b: BodyKey) {
        let set_a = self.bodies[body_a.0].set_index;
        let set_b = self.bodies[body_b.0].set_index;
        if set_a.is_sleeping() && set_b == SetIndex::AWAKE {
            self.wake_solver_set(set_a);
        } else if set_b.is_sleeping() && set_a == SetIndex::AWAKE {
            self.wake_solver_set(set_b);
        }
    }

    /// Add a contact that started touching to the island of its bodies,
    /// merging their islands if they differ.
    pub(crate) fn link_contact(&mut self, key: ContactKey) {
        let contact = &self.contacts[key.0];
        debug_assert!(contact.is_touching && contact.island.is_none());
        let (body_a, body_b) = (contact.body_a(), contact.body_b());
        self.wake_for_link(body_a, body_b);

        let island_key = self
            .merge_islands(self.bodies[body_a.0].island, self.bodies[body_b.0].island)
            .expect("linked a contact with no dynamic body");

        let island = &mut self.islands[island_key.0];
        let tail = island.contact_tail.replace(key);
        if island.contact_head.is_none() {
            island.contact_head = Some(key);
        }
        island.contact_count += 1;
        if let Some(tail) = tail {
            self.contacts[tail.0].island_next = Some(key);
        }
        let contact = &mut self.contacts[key.0];
        contact.island = Some(island_key);
        contact.island_prev = tail;
        contact.island_next = None;

        self.validate_island(island_key);
    }

    /// Remove a contact from its island. The island is only split later.
    pub(crate) fn unlink_contact(&mut self, key: ContactKey) {
        let contact = &mut self.contacts[key.0];
        let island_key = contact.island.take().expect("unlinked a contact with no island");
        let (prev, next) = (contact.island_prev.take(), contact.island_next.take());

        if let Some(prev) = prev {
            self.contacts[prev.0].island_next = next;
        }
        if let Some(next) = next {
            self.contacts[next.0].island_prev = prev;
        }
        let island = &mut self.islands[island_key.0];
        if island.contact_head == Some(key) {
            island.contact_head = next;
        }
        if island.contact_tail == Some(key) {
            island.contact_tail = prev;
        }
        island.contact_count -= 1;
        island.constraint_remove_count += 1;

        self.validate_island(island_key);
    }

    pub(crate) fn link_joint(&mut self, key: JointKey) {
        let joint = &self.joints[key.0];
        debug_assert!(joint.island.is_none());
        let (body_a, body_b) = (joint.body_a(), joint.body_b());
        self.wake_for_link(body_a, body_b);

        let island_key = self
            .merge_islands(self.bodies[body_a.0].island, self.bodies[body_b.0].island)
            .expect("linked a joint with no dynamic body");

        let island = &mut self.islands[island_key.0];
        let tail = island.joint_tail.replace(key);
        if island.joint_head.is_none() {
            island.joint_head = Some(key);
        }
        island.joint_count += 1;
        if let Some(tail) = tail {
            self.joints[tail.0].island_next = Some(key);
        }
        let joint = &mut self.joints[key.0];
        joint.island = Some(island_key);
        joint.island_prev = tail;
        joint.island_next = None;

        self.validate_island(island_key);
    }

    pub(crate) fn unlink_joint(&mut self, key: JointKey) {
        let joint = &mut self.joints[key.0];
        let island_key = joint.island.take().expect("unlinked a joint with no island");
        let (prev, next) = (joint.island_prev.take(), joint.island_next.take());

        if let Some(prev) = prev {
            self.joints[prev.0].island_next = next;
        }
        if let Some(next) = next {
            self.joints[next.0].island_prev = prev;
        }
        let island = &mut self.islands[island_key.0];
        if island.joint_head == Some(key) {
            island.joint_head = next;
        }
        if island.joint_tail == Some(key) {
            island.joint_tail = prev;
        }
        island.joint_count -= 1;
        island.constraint_remove_count += 1;

        self.validate_island(island_key);
    }

    /// Split an island into its connected components if constraints were removed from it.
    ///
    /// Does nothing unless the island is awake and has removed constraints.
    /// The island itself is destroyed and replaced by one new island per component.
    pub fn split_island(&mut self, key: IslandKey) -> Result<(), WorldError> {
        self.island(key)?;
        self.split_island_internal(key);
        Ok(())
    }

    pub(crate) fn split_island_internal(&mut self, base_key: IslandKey) {
        let base = self.islands[base_key.0];
        if base.set_index != SetIndex::AWAKE || base.constraint_remove_count == 0 {
            return;
        }
        let _span = tracy_span!("split island", "split_island");
        self.validate_island(base_key);

        let body_keys: Vec<BodyKey> =
            std::iter::successors(base.body_head, |b| self.bodies[b.0].island_next).collect();
        for key in &body_keys {
            self.bodies[key.0].is_marked = false;
        }
        let mut next = base.contact_head;
        while let Some(key) = next {
            let contact = &mut self.contacts[key.0];
            contact.is_marked = false;
            next = contact.island_next;
        }
        let mut next = base.joint_head;
        while let Some(key) = next {
            let joint = &mut self.joints[key.0];
            joint.is_marked = false;
            next = joint.island_next;
        }

        let mut stack: Vec<BodyKey> = Vec::with_capacity(body_keys.len());
        let mut piece_count = 0;
        for &seed in &body_keys {
            if self.bodies[seed.0].is_marked {
                continue;
            }
            self.bodies[seed.0].is_marked = true;
            stack.push(seed);

            let island_key = self.create_island(SetIndex::AWAKE);
            piece_count += 1;
            let mut island = self.islands[island_key.0];

            while let Some(body_key) = stack.pop() {
                debug_assert_eq!(self.bodies[body_key.0].body_type, BodyType::Dynamic);
                {
                    let body = &mut self.bodies[body_key.0];
                    body.island = Some(island_key);
                    body.island_prev = island.body_tail;
                    body.island_next = None;
                }
                match island.body_tail {
                    Some(tail) => self.bodies[tail.0].island_next = Some(body_key),
                    None => island.body_head = Some(body_key),
                }
                island.body_tail = Some(body_key);
                island.body_count += 1;

                let mut next_edge = self.bodies[body_key.0].contact_head;
                while let Some(edge) = next_edge {
                    let contact = &self.contacts[edge.key.0];
                    next_edge = contact.edges[edge.edge].next;
                    if contact.is_marked || !contact.is_touching {
                        continue;
                    }
                    let other = contact.edges[edge.edge ^ 1].body;

                    let contact = &mut self.contacts[edge.key.0];
                    contact.is_marked = true;
                    contact.island = Some(island_key);
                    contact.island_prev = island.contact_tail;
                    contact.island_next = None;
                    match island.contact_tail {
                        Some(tail) => self.contacts[tail.0].island_next = Some(edge.key),
                        None => island.contact_head = Some(edge.key),
                    }
                    island.contact_tail = Some(edge.key);
                    island.contact_count += 1;

                    let other_body = &mut self.bodies[other.0];
                    if !other_body.is_marked && other_body.body_type == BodyType::Dynamic {
                        other_body.is_marked = true;
                        stack.push(other);
                    }
                }

                let mut next_edge = self.bodies[body_key.0].joint_head;
                while let Some(edge) = next_edge {
                    let joint = &self.joints[edge.key.0];
                    next_edge = joint.edges[edge.edge].next;
                    if joint.is_marked {
                        continue;
                    }
                    let other = joint.edges[edge.edge ^ 1].body;

                    let joint = &mut self.joints[edge.key.0];
                    joint.is_marked = true;
                    joint.island = Some(island_key);
                    joint.island_prev = island.joint_tail;
                    joint.island_next = None;
                    match island.joint_tail {
                        Some(tail) => self.joints[tail.0].island_next = Some(edge.key),
                        None => island.joint_head = Some(edge.key),
                    }
                    island.joint_tail = Some(edge.key);
                    island.joint_count += 1;

                    let other_body = &mut self.bodies[other.0];
                    if !other_body.is_marked && other_body.body_type == BodyType::Dynamic {
                        other_body.is_marked = true;
                        stack.push(other);
                    }
                }
            }

            self.islands[island_key.0] = island;
            self.validate_island(island_key);
        }

        // every member has been moved to a new island
        let base = &mut self.islands[base_key.0];
        *base = Island {
            set_index: base.set_index,
            local_index: base.local_index,
            ..Default::default()
        };
        self.destroy_island(base_key);

        log::debug!("split island {base_key:?} into {piece_count} islands");
    }

    //
    // Queries
    //

    /// Bodies of an island in list order.
    pub fn island_bodies(&self, key: IslandKey) -> Result<Vec<BodyKey>, WorldError> {
        let island = self.island(key)?;
        Ok(std::iter::successors(island.body_head, |b| self.bodies[b.0].island_next).collect())
    }

    pub fn island_contacts(&self, key: IslandKey) -> Result<Vec<ContactKey>, WorldError> {
        let island = self.island(key)?;
        Ok(
            std::iter::successors(island.contact_head, |c| self.contacts[c.0].island_next)
                .collect(),
        )
    }

    pub fn island_joints(&self, key: IslandKey) -> Result<Vec<JointKey>, WorldError> {
        let island = self.island(key)?;
        Ok(std::iter::successors(island.joint_head, |j| self.joints[j.0].island_next).collect())
    }

    #[inline]
    pub fn awake_island_count(&self) -> usize {
        self.set(SetIndex::AWAKE).island_sims.len()
    }

    /// Walk an island's lists and check them against its counts, head and tail.
    /// Does nothing without debug assertions.
    pub(crate) fn validate_island(&self, key: IslandKey) {
        if !cfg!(debug_assertions) {
            return;
        }
        let island = &self.islands[key.0];
        assert_eq!(
            self.set(island.set_index).island_sims[island.local_index].island,
            key
        );
        assert!(island.body_count > 0, "island {key:?} has no bodies");

        let mut count = 0;
        let mut prev = None;
        let mut next = island.body_head;
        while let Some(body_key) = next {
            let body = &self.bodies[body_key.0];
            assert_eq!(body.island, Some(key));
            assert_eq!(body.island_prev, prev);
            assert_eq!(body.set_index, island.set_index);
            count += 1;
            assert!(count <= island.body_count);
            prev = Some(body_key);
            next = body.island_next;
        }
        assert_eq!(count, island.body_count);
        assert_eq!(prev, island.body_tail);

        let mut count = 0;
        let mut prev = None;
        let mut next = island.contact_head;
        while let Some(contact_key) = next {
            let contact = &self.contacts[contact_key.0];
            assert_eq!(contact.island, Some(key));
            assert_eq!(contact.island_prev, prev);
            assert!(contact.is_touching);
            count += 1;
            assert!(count <= island.contact_count);
            prev = Some(contact_key);
            next = contact.island_next;
        }
        assert_eq!(count, island.contact_count);
        assert_eq!(prev, island.contact_tail);

        let mut count = 0;
        let mut prev = None;
        let mut next = island.joint_head;
        while let Some(joint_key) = next {
            let joint = &self.joints[joint_key.0];
            assert_eq!(joint.island, Some(key));
            assert_eq!(joint.island_prev, prev);
            count += 1;
            assert!(count <= island.joint_count);
            prev = Some(joint_key);
            next = joint.island_next;
        }
        assert_eq!(count, island.joint_count);
        assert_eq!(prev, island.joint_tail);
    }
}
