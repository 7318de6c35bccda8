use super::World;
use crate::{
    collision::BodyType,
    error::WorldError,
    keys::{BodyKey, Edge, EdgeKey, IslandKey, JointKey, SetIndex},
};

/// Parameters for creating a joint.
#[derive(Clone, Copy, Debug)]
pub struct JointDef {
    pub body_a: BodyKey,
    pub body_b: BodyKey,
    /// Whether shapes of the two bodies still collide with each other.
    pub collide_connected: bool,
}

impl JointDef {
    pub fn new(body_a: BodyKey, body_b: BodyKey) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
        }
    }

    pub fn with_collide_connected(mut self, collide_connected: bool) -> Self {
        self.collide_connected = collide_connected;
        self
    }
}

/// A joint as stored in the world.
///
/// Joints are always constraints: they link their bodies into one island,
/// and while awake they live in a color of the constraint graph.
#[derive(Clone, Debug)]
pub struct Joint {
    pub(crate) edges: [Edge<JointKey>; 2],
    pub(crate) set_index: SetIndex,
    pub(crate) color_index: Option<usize>,
    pub(crate) local_index: usize,
    pub(crate) island: Option<IslandKey>,
    pub(crate) island_prev: Option<JointKey>,
    pub(crate) island_next: Option<JointKey>,
    pub(crate) collide_connected: bool,
    pub(crate) is_marked: bool,
}

impl Joint {
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
    pub fn collide_connected(&self) -> bool {
        self.collide_connected
    }
}

/// Solver data of a joint.
#[derive(Clone, Copy, Debug)]
pub struct JointSim {
    pub joint: JointKey,
    pub body_a: BodyKey,
    pub body_b: BodyKey,
    pub inv_mass_a: f64,
    pub inv_inertia_a: f64,
    pub inv_mass_b: f64,
    pub inv_inertia_b: f64,
}

impl World {
    /// Connect two bodies with a joint.
    ///
    /// Sleeping bodies are woken up and the islands of the two bodies are merged.
    /// Unless `collide_connected` is set, existing contacts between the bodies are destroyed
    /// and no new ones are created while the joint exists.
    pub fn create_joint(&mut self, def: JointDef) -> Result<JointKey, WorldError> {
        if def.body_a == def.body_b {
            return Err(WorldError::SelfJoint);
        }
        let type_a = self.body(def.body_a)?.body_type;
        let type_b = self.body(def.body_b)?.body_type;
        if type_a != BodyType::Dynamic && type_b != BodyType::Dynamic {
            return Err(WorldError::NoDynamicBody);
        }

        // joints are only created awake
        self.wake_body(def.body_a)?;
        self.wake_body(def.body_b)?;

        let mut edges = [Edge::new(def.body_a), Edge::new(def.body_b)];
        edges[0].next = self.bodies[def.body_a.0].joint_head;
        edges[1].next = self.bodies[def.body_b.0].joint_head;
        let key = JointKey(self.joints.insert(Joint {
            edges,
            set_index: SetIndex::AWAKE,
            color_index: None,
            local_index: 0,
            island: None,
            island_prev: None,
            island_next: None,
            collide_connected: def.collide_connected,
            is_marked: false,
        }));

        for (edge_idx, body_key) in [def.body_a, def.body_b].into_iter().enumerate() {
            let edge_key = EdgeKey::new(key, edge_idx);
            let body = &mut self.bodies[body_key.0];
            if let Some(head) = body.joint_head {
                self.joints[head.key.0].edges[head.edge].prev = Some(edge_key);
            }
            body.joint_head = Some(edge_key);
            body.joint_count += 1;
        }

        self.add_joint_to_graph(JointSim {
            joint: key,
            body_a: def.body_a,
            body_b: def.body_b,
            inv_mass_a: 0.0,
            inv_inertia_a: 0.0,
            inv_mass_b: 0.0,
            inv_inertia_b: 0.0,
        });
        self.link_joint(key);

        if !def.collide_connected {
            self.destroy_contacts_between(def.body_a, def.body_b);
        }

        log::trace!("created joint {key:?} between {:?} and {:?}", def.body_a, def.body_b);
        Ok(key)
    }

    /// Destroy a joint and wake its bodies.
    ///
    /// The island the joint was in is not split right away;
    /// it gets split when it is about to fall asleep.
    pub fn destroy_joint(&mut self, key: JointKey) -> Result<(), WorldError> {
        self.joint(key)?;
        self.destroy_joint_internal(key, true);
        Ok(())
    }

    pub(crate) fn destroy_joint_internal(&mut self, key: JointKey, wake_bodies: bool) {
        let (body_a, body_b) = {
            let joint = &self.joints[key.0];
            (joint.body_a(), joint.body_b())
        };

        for edge_idx in 0..2 {
            let edge = self.joints[key.0].edges[edge_idx];
            if let Some(prev) = edge.prev {
                self.joints[prev.key.0].edges[prev.edge].next = edge.next;
            }
            if let Some(next) = edge.next {
                self.joints[next.key.0].edges[next.edge].prev = edge.prev;
            }
            let body = &mut self.bodies[edge.body.0];
            if body.joint_head == Some(EdgeKey::new(key, edge_idx)) {
                body.joint_head = edge.next;
            }
            body.joint_count -= 1;
        }

        if self.joints[key.0].island.is_some() {
            self.unlink_joint(key);
        }

        let joint = &self.joints[key.0];
        if joint.color_index.is_some() {
            self.remove_joint_from_graph(key);
        } else {
            let (set_index, local_index) = (joint.set_index, joint.local_index);
            self.remove_joint_sim(set_index, local_index);
        }
        self.joints.remove(key.0);
        log::trace!("destroyed joint {key:?}");

        if wake_bodies {
            self.wake_body_set(body_a);
            self.wake_body_set(body_b);
        }
    }

    pub(crate) fn add_joint_to_graph(&mut self, mut sim: JointSim) {
        let (static_a, inv_mass_a, inv_inertia_a) = self.body_solver_data(sim.body_a);
        let (static_b, inv_mass_b, inv_inertia_b) = self.body_solver_data(sim.body_b);
        sim.inv_mass_a = inv_mass_a;
        sim.inv_inertia_a = inv_inertia_a;
        sim.inv_mass_b = inv_mass_b;
        sim.inv_inertia_b = inv_inertia_b;

        let key = sim.joint;
        let (color_index, local_index) = self.constraint_graph.add_joint(sim, static_a, static_b);
        let joint = &mut self.joints[key.0];
        joint.set_index = SetIndex::AWAKE;
        joint.color_index = Some(color_index);
        joint.local_index = local_index;
    }

    pub(crate) fn remove_joint_from_graph(&mut self, key: JointKey) -> JointSim {
        let joint = &self.joints[key.0];
        let color_index = joint
            .color_index
            .expect("removed a joint that is not in the graph");
        let local_index = joint.local_index;
        let (removed, moved) = self.constraint_graph.remove_joint(
            joint.body_a(),
            joint.body_b(),
            color_index,
            local_index,
        );
        if let Some(moved) = moved {
            self.joints[moved.0].local_index = local_index;
        }
        self.joints[key.0].color_index = None;
        removed
    }

    pub(crate) fn push_joint_sim(&mut self, set_index: SetIndex, sim: JointSim) {
        let key = sim.joint;
        let sims = &mut self.set_mut(set_index).joint_sims;
        let local_index = sims.len();
        sims.push(sim);
        let joint = &mut self.joints[key.0];
        joint.set_index = set_index;
        joint.color_index = None;
        joint.local_index = local_index;
    }

    pub(crate) fn remove_joint_sim(&mut self, set_index: SetIndex, local_index: usize) -> JointSim {
        let sims = &mut self.set_mut(set_index).joint_sims;
        let removed = sims.swap_remove(local_index);
        if let Some(moved) = sims.get(local_index) {
            let moved_key = moved.joint;
            self.joints[moved_key.0].local_index = local_index;
        }
        removed
    }
}
