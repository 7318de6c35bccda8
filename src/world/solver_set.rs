//! Solver sets partition the simulation records of bodies, contacts, joints and islands.
//!
//! Every record lives in exactly one set:
//! static bodies in the static set, non-touching contacts between bodies that are
//! not awake in the disabled set, everything that is simulated in the awake set
//! (touching awake constraints are in the constraint graph instead),
//! and each group of islands that fell asleep together in a sleeping set of its own.

use super::{body::BodySim, contact::ContactSim, island::IslandSim, joint::JointSim, World};
use crate::{
    collision::BodyType,
    keys::{BodyKey, IslandKey, SetIndex},
};

use thunderdome as td;

#[derive(Clone, Debug, Default)]
pub struct SolverSet {
    pub(crate) body_sims: Vec<BodySim>,
    // non-touching contacts in the awake and disabled sets, touching ones in sleeping sets
    pub(crate) contact_sims: Vec<ContactSim>,
    pub(crate) joint_sims: Vec<JointSim>,
    pub(crate) island_sims: Vec<IslandSim>,
}

impl SolverSet {
    #[inline]
    pub fn body_sims(&self) -> &[BodySim] {
        &self.body_sims
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
    pub fn island_sims(&self) -> &[IslandSim] {
        &self.island_sims
    }
}

#[inline]
pub(crate) fn get_set(sets: &td::Arena<SolverSet>, index: SetIndex) -> &SolverSet {
    sets.get_by_slot(index.0)
        .map(|(_, set)| set)
        .expect("solver set does not exist")
}

#[inline]
pub(crate) fn get_set_mut(sets: &mut td::Arena<SolverSet>, index: SetIndex) -> &mut SolverSet {
    sets.get_by_slot_mut(index.0)
        .map(|(_, set)| set)
        .expect("solver set does not exist")
}

impl World {
    #[inline]
    pub fn set(&self, index: SetIndex) -> &SolverSet {
        get_set(&self.solver_sets, index)
    }

    #[inline]
    pub(crate) fn set_mut(&mut self, index: SetIndex) -> &mut SolverSet {
        get_set_mut(&mut self.solver_sets, index)
    }

    /// Advance the sleep timers of awake bodies and put resting islands to sleep.
    ///
    /// At most one island is split per call: the one holding the sleepiest body
    /// among islands that have had constraints removed.
    pub fn update_sleep(&mut self, dt: f64) {
        if !self.config.enable_sleep {
            return;
        }
        let _span = tracy_span!("update sleep", "update_sleep");

        let tolerance_sq = self.config.linear_sleep_tolerance * self.config.linear_sleep_tolerance;
        let awake = get_set(&self.solver_sets, SetIndex::AWAKE);
        let mut moving_kinematic: Vec<BodyKey> = Vec::new();
        for sim in &awake.body_sims {
            let body = &mut self.bodies[sim.body.0];
            if !body.enable_sleep || sim.linear_velocity.mag_sq() > tolerance_sq {
                body.sleep_time = 0.0;
                if body.body_type == BodyType::Kinematic {
                    moving_kinematic.push(sim.body);
                }
            } else {
                body.sleep_time += dt;
            }
        }

        // a moving kinematic body keeps everything it touches awake
        for kinematic in moving_kinematic {
            let body = &self.bodies[kinematic.0];
            let touching: Vec<BodyKey> = self
                .contact_edges(body)
                .filter(|e| self.contacts[e.key.0].is_touching)
                .map(|e| self.contacts[e.key.0].edges[e.edge ^ 1].body)
                .chain(
                    self.joint_edges(body)
                        .map(|e| self.joints[e.key.0].edges[e.edge ^ 1].body),
                )
                .collect();
            for other in touching {
                self.bodies[other.0].sleep_time = 0.0;
                self.wake_body_set(other);
            }
        }

        let time_to_sleep = self.config.time_to_sleep;
        let mut split_candidate: Option<(IslandKey, f64)> = None;
        for sim in &self.set(SetIndex::AWAKE).island_sims {
            let island = &self.islands[sim.island.0];
            if island.constraint_remove_count == 0 {
                continue;
            }
            let sleepiest = std::iter::successors(island.body_head, |b| {
                self.bodies[b.0].island_next
            })
            .map(|b| self.bodies[b.0].sleep_time)
            .fold(0.0, f64::max);
            if sleepiest >= time_to_sleep
                && split_candidate.map_or(true, |(_, best)| sleepiest > best)
            {
                split_candidate = Some((sim.island, sleepiest));
            }
        }
        if let Some((island, _)) = split_candidate {
            self.split_island_internal(island);
        }

        // backwards, because sleeping an island swap-removes it from the awake set
        for local_index in (0..self.set(SetIndex::AWAKE).island_sims.len()).rev() {
            let island_key = self.set(SetIndex::AWAKE).island_sims[local_index].island;
            if self.island_sleep_time(island_key) >= time_to_sleep {
                self.try_sleep_island(island_key);
            }
        }
    }

    /// The sleep time of the island's least sleepy body.
    fn island_sleep_time(&self, key: IslandKey) -> f64 {
        std::iter::successors(self.islands[key.0].body_head, |b| {
            self.bodies[b.0].island_next
        })
        .map(|b| self.bodies[b.0].sleep_time)
        .fold(f64::INFINITY, f64::min)
    }

    /// Move an awake island into a new sleeping set.
    ///
    /// Does nothing and returns `false` if the island has had constraints removed,
    /// because it might need to be split first.
    pub(crate) fn try_sleep_island(&mut self, island_key: IslandKey) -> bool {
        let island = self.islands[island_key.0];
        debug_assert_eq!(island.set_index, SetIndex::AWAKE);
        if island.constraint_remove_count > 0 {
            return false;
        }
        let _span = tracy_span!("sleep island", "try_sleep_island");

        let sleep_set = SetIndex(self.solver_sets.insert(SolverSet::default()).slot());
        debug_assert!(sleep_set.is_sleeping());

        let mut next = island.body_head;
        while let Some(body_key) = next {
            let body = &self.bodies[body_key.0];
            next = body.island_next;
            debug_assert_eq!(body.set_index, SetIndex::AWAKE);

            let local_index = body.local_index;
            let sim = self.remove_body_sim(SetIndex::AWAKE, local_index);
            let sims = &mut self.set_mut(sleep_set).body_sims;
            let local_index = sims.len();
            sims.push(sim);
            let body = &mut self.bodies[body_key.0];
            body.set_index = sleep_set;
            body.local_index = local_index;

            // non-touching contacts go to the disabled set once neither body is awake.
            // while the other body is awake, it is responsible for moving the contact
            // when it falls asleep itself
            let mut next_edge = self.bodies[body_key.0].contact_head;
            while let Some(edge) = next_edge {
                let contact = &self.contacts[edge.key.0];
                next_edge = contact.edges[edge.edge].next;
                if contact.set_index == SetIndex::DISABLED || contact.color_index.is_some() {
                    continue;
                }
                let other = contact.edges[edge.edge ^ 1].body;
                if self.bodies[other.0].set_index == SetIndex::AWAKE {
                    continue;
                }
                debug_assert!(!contact.is_touching);
                let local_index = contact.local_index;
                let sim = self.remove_contact_sim(SetIndex::AWAKE, local_index);
                self.push_contact_sim(SetIndex::DISABLED, sim);
            }
        }

        let mut next = island.contact_head;
        while let Some(contact_key) = next {
            next = self.contacts[contact_key.0].island_next;
            let sim = self.remove_contact_from_graph(contact_key);
            self.push_contact_sim(sleep_set, sim);
        }

        let mut next = island.joint_head;
        while let Some(joint_key) = next {
            next = self.joints[joint_key.0].island_next;
            let sim = self.remove_joint_from_graph(joint_key);
            self.push_joint_sim(sleep_set, sim);
        }

        let sim = self.remove_island_sim(SetIndex::AWAKE, island.local_index);
        self.push_island_sim(sleep_set, sim);

        log::debug!(
            "island {island_key:?} fell asleep with {} bodies in set {}",
            island.body_count,
            sleep_set.0
        );
        true
    }

    /// Wake the set holding `key` if it is sleeping. Returns whether anything woke up.
    pub(crate) fn wake_body_set(&mut self, key: BodyKey) -> bool {
        let set_index = self.bodies[key.0].set_index;
        if set_index.is_sleeping() {
            self.wake_solver_set(set_index);
            true
        } else {
            false
        }
    }

    /// Move everything in a sleeping set back to the awake set and destroy the set.
    pub(crate) fn wake_solver_set(&mut self, set_index: SetIndex) {
        assert!(set_index.is_sleeping(), "woke a set that is not sleeping");
        let _span = tracy_span!("wake set", "wake_solver_set");

        let (_, set) = self
            .solver_sets
            .remove_by_slot(set_index.0)
            .expect("woke a solver set that does not exist");

        for sim in set.body_sims {
            let body_key = sim.body;
            let sims = &mut self.set_mut(SetIndex::AWAKE).body_sims;
            let local_index = sims.len();
            sims.push(sim);
            let body = &mut self.bodies[body_key.0];
            body.set_index = SetIndex::AWAKE;
            body.local_index = local_index;
            body.sleep_time = 0.0;

            let mut next_edge = self.bodies[body_key.0].contact_head;
            while let Some(edge) = next_edge {
                let contact = &self.contacts[edge.key.0];
                next_edge = contact.edges[edge.edge].next;
                if contact.set_index != SetIndex::DISABLED {
                    continue;
                }
                let local_index = contact.local_index;
                let sim = self.remove_contact_sim(SetIndex::DISABLED, local_index);
                self.push_contact_sim(SetIndex::AWAKE, sim);
            }
        }

        // bodies are all awake now, so constraints can be colored
        for sim in set.contact_sims {
            debug_assert!(self.contacts[sim.contact.0].is_touching);
            self.add_contact_to_graph(sim);
        }
        for sim in set.joint_sims {
            self.add_joint_to_graph(sim);
        }
        let island_count = set.island_sims.len();
        for sim in set.island_sims {
            self.push_island_sim(SetIndex::AWAKE, sim);
        }

        log::debug!("woke set {} with {island_count} islands", set_index.0);
    }

    /// Check that every record's set, color and index point at where its sim actually is.
    /// Does nothing without debug assertions.
    pub(crate) fn validate_solver_sets(&self) {
        if !cfg!(debug_assertions) {
            return;
        }
        let (mut body_total, mut contact_total, mut joint_total, mut island_total) = (0, 0, 0, 0);

        for (idx, set) in self.solver_sets.iter() {
            let set_index = SetIndex(idx.slot());
            if set_index.is_sleeping() {
                assert!(!set.island_sims.is_empty(), "sleeping set without islands");
            }
            if set_index == SetIndex::STATIC {
                assert!(set.contact_sims.is_empty() && set.joint_sims.is_empty());
                assert!(set.island_sims.is_empty());
            }

            for (local_index, sim) in set.body_sims.iter().enumerate() {
                let body = &self.bodies[sim.body.0];
                assert_eq!(body.set_index, set_index);
                assert_eq!(body.local_index, local_index);
                assert_eq!(body.body_type == BodyType::Static, set_index == SetIndex::STATIC);
            }
            for (local_index, sim) in set.contact_sims.iter().enumerate() {
                let contact = &self.contacts[sim.contact.0];
                assert_eq!(contact.set_index, set_index);
                assert_eq!(contact.local_index, local_index);
                assert_eq!(contact.color_index, None);
                assert_eq!(contact.is_touching, set_index.is_sleeping());
            }
            for (local_index, sim) in set.joint_sims.iter().enumerate() {
                let joint = &self.joints[sim.joint.0];
                assert_eq!(joint.set_index, set_index);
                assert_eq!(joint.local_index, local_index);
                assert_eq!(joint.color_index, None);
            }
            for (local_index, sim) in set.island_sims.iter().enumerate() {
                let island = &self.islands[sim.island.0];
                assert_eq!(island.set_index, set_index);
                assert_eq!(island.local_index, local_index);
            }

            body_total += set.body_sims.len();
            contact_total += set.contact_sims.len();
            joint_total += set.joint_sims.len();
            island_total += set.island_sims.len();
        }

        for (color_index, color) in self.constraint_graph.colors().iter().enumerate() {
            for (local_index, sim) in color.contact_sims.iter().enumerate() {
                let contact = &self.contacts[sim.contact.0];
                assert_eq!(contact.set_index, SetIndex::AWAKE);
                assert_eq!(contact.color_index, Some(color_index));
                assert_eq!(contact.local_index, local_index);
                assert!(contact.is_touching);
            }
            for (local_index, sim) in color.joint_sims.iter().enumerate() {
                let joint = &self.joints[sim.joint.0];
                assert_eq!(joint.set_index, SetIndex::AWAKE);
                assert_eq!(joint.color_index, Some(color_index));
                assert_eq!(joint.local_index, local_index);
            }
            contact_total += color.contact_sims.len();
            joint_total += color.joint_sims.len();
        }

        assert_eq!(body_total, self.bodies.len());
        assert_eq!(contact_total, self.contacts.len());
        assert_eq!(joint_total, self.joints.len());
        assert_eq!(island_total, self.islands.len());
    }
}
