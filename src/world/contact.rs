//! Contacts between pairs of shapes: creation from broad phase pairs,
//! destruction, and the per-step update that tracks which contacts are touching.

use super::World;
use crate::{
    bitset::BitSet,
    collision::{should_shapes_collide, BodyType, Manifold, PairQuery},
    keys::{BodyKey, ContactKey, Edge, EdgeKey, IslandKey, SetIndex, ShapeKey},
};

use itertools::izip;
use std::sync::OnceLock;

/// Result of updating a contact, applied serially after the parallel update.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum TouchChange {
    #[default]
    None,
    /// The fat AABBs stopped overlapping, so the contact is destroyed.
    Disjoint,
    StartedTouching,
    StoppedTouching,
}

/// A potential contact between two shapes whose fat AABBs overlap.
///
/// Touching contacts are constraints: they link their bodies into one island
/// and, while awake, live in a color of the constraint graph.
#[derive(Clone, Debug)]
pub struct Contact {
    pub(crate) shape_a: ShapeKey,
    pub(crate) shape_b: ShapeKey,
    pub(crate) edges: [Edge<ContactKey>; 2],
    pub(crate) set_index: SetIndex,
    // Some while touching and awake
    pub(crate) color_index: Option<usize>,
    // index of the sim in the color if colored, in the solver set otherwise
    pub(crate) local_index: usize,
    pub(crate) island: Option<IslandKey>,
    pub(crate) island_prev: Option<ContactKey>,
    pub(crate) island_next: Option<ContactKey>,
    pub(crate) is_touching: bool,
    pub(crate) is_marked: bool,
}

impl Contact {
    #[inline]
    pub fn shape_a(&self) -> ShapeKey {
        self.shape_a
    }

    #[inline]
    pub fn shape_b(&self) -> ShapeKey {
        self.shape_b
    }

    #[inline]
    pub fn body_a(&self) -> BodyKey {
        self.edges[0].body
    }

    #[inline]
    pub fn body_b(&self) -> BodyKey {
        self.edges[1].body
    }

    #[inline]
    pub fn set_index(&self) -> SetIndex {
        self.set_index
    }

    #[inline]
    pub fn color_index(&self) -> Option<usize> {
        self.color_index
    }

    #[inline]
    pub fn island(&self) -> Option<IslandKey> {
        self.island
    }

    #[inline]
    pub fn is_touching(&self) -> bool {
        self.is_touching
    }
}

/// Solver data of a contact, stored in a graph color while touching and awake
/// and in a solver set otherwise.
#[derive(Clone, Copy, Debug)]
pub struct ContactSim {
    pub contact: ContactKey,
    pub body_a: BodyKey,
    pub body_b: BodyKey,
    pub shape_a: ShapeKey,
    pub shape_b: ShapeKey,
    /// Inverse masses are only filled in while the contact is in the graph.
    /// They are zero for non-dynamic bodies.
    pub inv_mass_a: f64,
    pub inv_inertia_a: f64,
    pub inv_mass_b: f64,
    pub inv_inertia_b: f64,
    pub manifold: Manifold,
    pub(crate) change: TouchChange,
}

impl PairQuery for World {
    fn should_create_pair(&self, shape_a: ShapeKey, shape_b: ShapeKey) -> bool {
        let (Some(a), Some(b)) = (self.shapes.get(shape_a.0), self.shapes.get(shape_b.0)) else {
            return false;
        };
        if a.body == b.body {
            return false;
        }
        if a.is_sensor || b.is_sensor {
            return false;
        }
        if !should_shapes_collide(a.filter, b.filter) {
            return false;
        }
        if !self.should_bodies_collide(a.body, b.body) {
            return false;
        }
        if a.enable_custom_filtering || b.enable_custom_filtering {
            if let Some(filter) = &self.custom_filter {
                return filter(shape_a, shape_b);
            }
        }
        true
    }
}

impl World {
    /// Bodies collide unless neither is dynamic
    /// or a joint between them has collision turned off.
    pub(crate) fn should_bodies_collide(&self, key_a: BodyKey, key_b: BodyKey) -> bool {
        let body_a = &self.bodies[key_a.0];
        let body_b = &self.bodies[key_b.0];
        if body_a.body_type != BodyType::Dynamic && body_b.body_type != BodyType::Dynamic {
            return false;
        }

        // walk the shorter joint list
        let (body, other) = if body_a.joint_count < body_b.joint_count {
            (body_a, key_b)
        } else {
            (body_b, key_a)
        };
        !self.joint_edges(body).any(|e| {
            let joint = &self.joints[e.key.0];
            !joint.collide_connected && joint.edges[e.edge ^ 1].body == other
        })
    }

    /// Create a contact for a new pair from the broad phase.
    ///
    /// Nothing happens if no manifold function exists for the shapes' kinds.
    /// The shapes are swapped if the function is registered for the opposite order.
    pub(crate) fn create_contact(&mut self, shape_a: ShapeKey, shape_b: ShapeKey) {
        let kind_a = self.shapes[shape_a.0].kind;
        let kind_b = self.shapes[shape_b.0].kind;
        if !self.manifolds.has_function(&kind_a, &kind_b) {
            return;
        }
        if !self.manifolds.is_primary(&kind_a, &kind_b) {
            self.create_contact(shape_b, shape_a);
            return;
        }

        let body_a = self.shapes[shape_a.0].body;
        let body_b = self.shapes[shape_b.0].body;
        let set_index = if self.bodies[body_a.0].set_index == SetIndex::AWAKE
            || self.bodies[body_b.0].set_index == SetIndex::AWAKE
        {
            SetIndex::AWAKE
        } else {
            // non-touching contacts between sleeping or static bodies
            // are parked in the disabled set
            SetIndex::DISABLED
        };

        let mut edges = [Edge::new(body_a), Edge::new(body_b)];
        edges[0].next = self.bodies[body_a.0].contact_head;
        edges[1].next = self.bodies[body_b.0].contact_head;
        let key = ContactKey(self.contacts.insert(Contact {
            shape_a,
            shape_b,
            edges,
            set_index,
            color_index: None,
            local_index: 0,
            island: None,
            island_prev: None,
            island_next: None,
            is_touching: false,
            is_marked: false,
        }));

        // prepend to both bodies' contact lists
        for (edge_idx, body_key) in [body_a, body_b].into_iter().enumerate() {
            let edge_key = EdgeKey::new(key, edge_idx);
            let body = &mut self.bodies[body_key.0];
            if let Some(head) = body.contact_head {
                self.contacts[head.key.0].edges[head.edge].prev = Some(edge_key);
            }
            body.contact_head = Some(edge_key);
            body.contact_count += 1;
        }

        self.push_contact_sim(
            set_index,
            ContactSim {
                contact: key,
                body_a,
                body_b,
                shape_a,
                shape_b,
                inv_mass_a: 0.0,
                inv_inertia_a: 0.0,
                inv_mass_b: 0.0,
                inv_inertia_b: 0.0,
                manifold: Manifold::default(),
                change: TouchChange::None,
            },
        );

        let already_paired = self.broad_phase.add_pair(shape_a, shape_b);
        debug_assert!(!already_paired, "second contact for one shape pair");
        log::trace!("created contact {key:?} between {shape_a:?} and {shape_b:?}");
    }

    /// Destroy a contact, removing it from its bodies, its island and its storage.
    pub(crate) fn destroy_contact(&mut self, key: ContactKey, wake_bodies: bool) {
        let contact = &self.contacts[key.0];
        let (shape_a, shape_b) = (contact.shape_a, contact.shape_b);
        let (body_a, body_b) = (contact.body_a(), contact.body_b());
        self.broad_phase.remove_pair(shape_a, shape_b);

        for edge_idx in 0..2 {
            self.unlink_contact_edge(key, edge_idx);
        }

        if self.contacts[key.0].island.is_some() {
            self.unlink_contact(key);
        }

        let contact = &self.contacts[key.0];
        if contact.color_index.is_some() {
            debug_assert_eq!(contact.set_index, SetIndex::AWAKE);
            self.remove_contact_from_graph(key);
        } else {
            let (set_index, local_index) = (contact.set_index, contact.local_index);
            self.remove_contact_sim(set_index, local_index);
        }
        self.contacts.remove(key.0);
        log::trace!("destroyed contact {key:?}");

        if wake_bodies {
            self.wake_body_set(body_a);
            self.wake_body_set(body_b);
        }
    }

    fn unlink_contact_edge(&mut self, key: ContactKey, edge_idx: usize) {
        let edge = self.contacts[key.0].edges[edge_idx];
        if let Some(prev) = edge.prev {
            self.contacts[prev.key.0].edges[prev.edge].next = edge.next;
        }
        if let Some(next) = edge.next {
            self.contacts[next.key.0].edges[next.edge].prev = edge.prev;
        }
        let body = &mut self.bodies[edge.body.0];
        if body.contact_head == Some(EdgeKey::new(key, edge_idx)) {
            body.contact_head = edge.next;
        }
        body.contact_count -= 1;
    }

    pub(crate) fn destroy_body_contacts(&mut self, body: BodyKey, wake_bodies: bool) {
        while let Some(edge) = self.bodies[body.0].contact_head {
            self.destroy_contact(edge.key, wake_bodies);
        }
    }

    /// Destroy every contact between two bodies, used when a joint turns off their collision.
    pub(crate) fn destroy_contacts_between(&mut self, key_a: BodyKey, key_b: BodyKey) {
        let (body, other) =
            if self.bodies[key_a.0].contact_count < self.bodies[key_b.0].contact_count {
                (key_a, key_b)
            } else {
                (key_b, key_a)
            };
        let doomed: Vec<ContactKey> = self
            .contact_edges(&self.bodies[body.0])
            .filter(|e| self.contacts[e.key.0].edges[e.edge ^ 1].body == other)
            .map(|e| e.key)
            .collect();
        for key in doomed {
            self.destroy_contact(key, false);
        }
    }

    //
    // Storage
    //

    /// Inverse mass and inertia of a body as the solver sees it,
    /// and whether it counts as static for coloring.
    pub(crate) fn body_solver_data(&self, key: BodyKey) -> (bool, f64, f64) {
        if self.bodies[key.0].body_type != BodyType::Dynamic {
            return (true, 0.0, 0.0);
        }
        let sim = self.body_sim(key);
        (false, sim.inv_mass, sim.inv_inertia)
    }

    /// Color a touching contact. Both bodies' sims must already be where they belong.
    pub(crate) fn add_contact_to_graph(&mut self, mut sim: ContactSim) {
        let (static_a, inv_mass_a, inv_inertia_a) = self.body_solver_data(sim.body_a);
        let (static_b, inv_mass_b, inv_inertia_b) = self.body_solver_data(sim.body_b);
        sim.inv_mass_a = inv_mass_a;
        sim.inv_inertia_a = inv_inertia_a;
        sim.inv_mass_b = inv_mass_b;
        sim.inv_inertia_b = inv_inertia_b;

        let key = sim.contact;
        let (color_index, local_index) = self.constraint_graph.add_contact(sim, static_a, static_b);
        let contact = &mut self.contacts[key.0];
        contact.set_index = SetIndex::AWAKE;
        contact.color_index = Some(color_index);
        contact.local_index = local_index;
    }

    /// Take a contact out of the graph. The caller decides where its sim goes next.
    pub(crate) fn remove_contact_from_graph(&mut self, key: ContactKey) -> ContactSim {
        let contact = &self.contacts[key.0];
        let color_index = contact
            .color_index
            .expect("removed a contact that is not in the graph");
        let (removed, moved) = self.constraint_graph.remove_contact(
            contact.body_a(),
            contact.body_b(),
            color_index,
            contact.local_index,
        );
        let local_index = contact.local_index;
        if let Some(moved) = moved {
            self.contacts[moved.0].local_index = local_index;
        }
        self.contacts[key.0].color_index = None;
        removed
    }

    /// Append a sim to a solver set's contacts and point the contact at it.
    pub(crate) fn push_contact_sim(&mut self, set_index: SetIndex, mut sim: ContactSim) {
        sim.change = TouchChange::None;
        let key = sim.contact;
        let sims = &mut self.set_mut(set_index).contact_sims;
        let local_index = sims.len();
        sims.push(sim);
        let contact = &mut self.contacts[key.0];
        contact.set_index = set_index;
        contact.color_index = None;
        contact.local_index = local_index;
    }

    /// Swap-remove a sim from a solver set's contacts,
    /// fixing the index of the contact moved into its place.
    pub(crate) fn remove_contact_sim(
        &mut self,
        set_index: SetIndex,
        local_index: usize,
    ) -> ContactSim {
        let sims = &mut self.set_mut(set_index).contact_sims;
        let removed = sims.swap_remove(local_index);
        if let Some(moved) = sims.get(local_index) {
            let moved_key = moved.contact;
            self.contacts[moved_key.0].local_index = local_index;
        }
        removed
    }

    pub(crate) fn contact_sim_mut(&mut self, key: ContactKey) -> &mut ContactSim {
        let contact = &self.contacts[key.0];
        let (set_index, color_index, local_index) =
            (contact.set_index, contact.color_index, contact.local_index);
        match color_index {
            Some(color_index) => self.constraint_graph.contact_sim_mut(color_index, local_index),
            None => &mut self.set_mut(set_index).contact_sims[local_index],
        }
    }

    //
    // Per-step update
    //

    /// Update every awake contact: destroy contacts whose bounds no longer overlap,
    /// compute manifolds for the rest and move contacts that started or stopped touching
    /// in or out of the graph and their islands.
    pub fn collide(&mut self) {
        let _span = tracy_span!("collide", "collide");

        let mut keys: Vec<ContactKey> = self
            .set(SetIndex::AWAKE)
            .contact_sims
            .iter()
            .map(|s| s.contact)
            .collect();
        for color in self.constraint_graph.colors() {
            keys.extend(color.contact_sims.iter().map(|s| s.contact));
        }
        if keys.is_empty() {
            return;
        }

        let results: Vec<OnceLock<(Manifold, TouchChange)>> =
            keys.iter().map(|_| OnceLock::new()).collect();
        {
            let _span = tracy_span!("update contacts", "collide");
            let world = &*self;
            world.scheduler().parallel_for(
                keys.len(),
                world.config.min_range_per_task,
                &|range, _worker| {
                    for idx in range {
                        if results[idx].set(world.update_contact(keys[idx])).is_err() {
                            unreachable!("contact {idx} updated twice");
                        }
                    }
                },
            );
        }

        let mut changed = BitSet::with_capacity(self.contacts.capacity());
        for (key, result) in izip!(&keys, results) {
            let (manifold, change) = result
                .into_inner()
                .expect("contact skipped by the update");
            let sim = self.contact_sim_mut(*key);
            sim.manifold = manifold;
            sim.change = change;
            if change != TouchChange::None {
                changed.set_grow(key.slot() as usize);
            }
        }

        // ascending slot order keeps island and graph changes deterministic
        for slot in changed.iter() {
            let Some((idx, _)) = self.contacts.get_by_slot(slot as u32) else {
                continue;
            };
            let key = ContactKey(idx);
            let change = std::mem::take(&mut self.contact_sim_mut(key).change);
            match change {
                TouchChange::None => {}
                TouchChange::Disjoint => self.destroy_contact(key, false),
                TouchChange::StartedTouching => {
                    debug_assert!(self.contacts[key.0].island.is_none());
                    self.contacts[key.0].is_touching = true;
                    // linking first wakes a sleeping body, which must be awake to be colored
                    self.link_contact(key);
                    let local_index = self.contacts[key.0].local_index;
                    let sim = self.remove_contact_sim(SetIndex::AWAKE, local_index);
                    self.add_contact_to_graph(sim);
                }
                TouchChange::StoppedTouching => {
                    self.contacts[key.0].is_touching = false;
                    self.unlink_contact(key);
                    let sim = self.remove_contact_from_graph(key);
                    self.push_contact_sim(SetIndex::AWAKE, sim);
                }
            }
        }
    }

    /// Compute the new state of one contact. Only reads the world.
    fn update_contact(&self, key: ContactKey) -> (Manifold, TouchChange) {
        let contact = &self.contacts[key.0];
        let shape_a = &self.shapes[contact.shape_a.0];
        let shape_b = &self.shapes[contact.shape_b.0];
        if !shape_a.fat_aabb.overlaps(&shape_b.fat_aabb) {
            return (Manifold::default(), TouchChange::Disjoint);
        }

        let manifold = self.manifolds.compute(
            &shape_a.kind,
            self.body_sim(shape_a.body).position,
            &shape_b.kind,
            self.body_sim(shape_b.body).position,
        );
        let change = match (contact.is_touching, manifold.is_touching()) {
            (false, true) => TouchChange::StartedTouching,
            (true, false) => TouchChange::StoppedTouching,
            _ => TouchChange::None,
        };
        (manifold, change)
    }

    /// Check the pair set and every body's contact list. Debug builds only.
    pub(crate) fn validate_contacts(&self) {
        if !cfg!(debug_assertions) {
            return;
        }
        assert_eq!(self.broad_phase.pair_count(), self.contacts.len());
        for (idx, contact) in self.contacts.iter() {
            assert!(
                self.broad_phase.contains_pair(contact.shape_a, contact.shape_b),
                "contact {idx:?} missing from the pair set"
            );
            assert_eq!(contact.is_touching, contact.island.is_some());
        }

        let mut edge_total = 0;
        for (idx, body) in self.bodies.iter() {
            let mut count = 0;
            let mut prev = None;
            for edge in self.contact_edges(body) {
                let contact_edge = &self.contacts[edge.key.0].edges[edge.edge];
                assert_eq!(contact_edge.body, BodyKey(idx));
                assert_eq!(contact_edge.prev, prev);
                prev = Some(edge);
                count += 1;
            }
            assert_eq!(count, body.contact_count);
            edge_total += count;
        }
        assert_eq!(edge_total, 2 * self.contacts.len());
    }
}
