use super::World;
use crate::{
    collision::{BodyType, Shape, ShapeDef},
    error::WorldError,
    keys::{BodyKey, ContactKey, EdgeKey, IslandKey, JointKey, SetIndex, ShapeKey},
    math::Vec2,
};

/// Parameters for creating a body.
#[derive(Clone, Copy, Debug)]
pub struct BodyDef {
    pub body_type: BodyType,
    pub position: Vec2,
    pub linear_velocity: Vec2,
    /// Mass of a dynamic body. Ignored for other body types.
    pub mass: f64,
    /// Moment of inertia of a dynamic body. Ignored for other body types.
    pub moment_of_inertia: f64,
    /// Set to false to keep the body and everything touching it from ever falling asleep.
    pub enable_sleep: bool,
}

impl Default for BodyDef {
    fn default() -> Self {
        Self {
            body_type: BodyType::Static,
            position: Vec2::zero(),
            linear_velocity: Vec2::zero(),
            mass: 1.0,
            moment_of_inertia: 1.0,
            enable_sleep: true,
        }
    }
}

impl BodyDef {
    pub fn new_static(position: Vec2) -> Self {
        Self {
            body_type: BodyType::Static,
            position,
            ..Default::default()
        }
    }

    pub fn new_kinematic(position: Vec2) -> Self {
        Self {
            body_type: BodyType::Kinematic,
            position,
            ..Default::default()
        }
    }

    pub fn new_dynamic(position: Vec2) -> Self {
        Self {
            body_type: BodyType::Dynamic,
            position,
            ..Default::default()
        }
    }

    /// Set the velocity of the body in a builder-like chain.
    pub fn with_velocity(mut self, linear_velocity: Vec2) -> Self {
        self.linear_velocity = linear_velocity;
        self
    }

    pub fn with_mass(mut self, mass: f64, moment_of_inertia: f64) -> Self {
        self.mass = mass;
        self.moment_of_inertia = moment_of_inertia;
        self
    }

    pub fn with_sleep(mut self, enable_sleep: bool) -> Self {
        self.enable_sleep = enable_sleep;
        self
    }
}

/// A body as stored in the world.
///
/// The simulation state lives in a [`BodySim`] in the solver set named by `set_index`.
#[derive(Clone, Debug)]
pub struct Body {
    pub(crate) body_type: BodyType,
    pub(crate) set_index: SetIndex,
    pub(crate) local_index: usize,
    pub(crate) shapes: Vec<ShapeKey>,
    pub(crate) contact_head: Option<EdgeKey<ContactKey>>,
    pub(crate) contact_count: usize,
    pub(crate) joint_head: Option<EdgeKey<JointKey>>,
    pub(crate) joint_count: usize,
    // only dynamic bodies are in islands
    pub(crate) island: Option<IslandKey>,
    pub(crate) island_prev: Option<BodyKey>,
    pub(crate) island_next: Option<BodyKey>,
    pub(crate) sleep_time: f64,
    pub(crate) enable_sleep: bool,
    // visited flag of the island split search
    pub(crate) is_marked: bool,
}

impl Body {
    #[inline]
    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    #[inline]
    pub fn set_index(&self) -> SetIndex {
        self.set_index
    }

    #[inline]
    pub fn island(&self) -> Option<IslandKey> {
        self.island
    }

    #[inline]
    pub fn shapes(&self) -> &[ShapeKey] {
        &self.shapes
    }

    #[inline]
    pub fn contact_count(&self) -> usize {
        self.contact_count
    }

    #[inline]
    pub fn joint_count(&self) -> usize {
        self.joint_count
    }

    /// Seconds the body has been moving slower than the sleep tolerance.
    #[inline]
    pub fn sleep_time(&self) -> f64 {
        self.sleep_time
    }
}

/// Simulation state of a body, stored in the solver set the body currently belongs to.
#[derive(Clone, Copy, Debug)]
pub struct BodySim {
    pub body: BodyKey,
    pub position: Vec2,
    pub linear_velocity: Vec2,
    /// Zero for non-dynamic bodies.
    pub inv_mass: f64,
    pub inv_inertia: f64,
}

#[inline]
fn recip_or_zero(x: f64) -> f64 {
    if x > 0.0 {
        1.0 / x
    } else {
        0.0
    }
}

impl World {
    pub fn create_body(&mut self, def: BodyDef) -> BodyKey {
        let set_index = if def.body_type == BodyType::Static {
            SetIndex::STATIC
        } else {
            SetIndex::AWAKE
        };
        let (inv_mass, inv_inertia) = if def.body_type == BodyType::Dynamic {
            (recip_or_zero(def.mass), recip_or_zero(def.moment_of_inertia))
        } else {
            (0.0, 0.0)
        };
        let local_index = self.set(set_index).body_sims.len();

        let key = BodyKey(self.bodies.insert(Body {
            body_type: def.body_type,
            set_index,
            local_index,
            shapes: Vec::new(),
            contact_head: None,
            contact_count: 0,
            joint_head: None,
            joint_count: 0,
            island: None,
            island_prev: None,
            island_next: None,
            sleep_time: 0.0,
            enable_sleep: def.enable_sleep,
            is_marked: false,
        }));
        self.set_mut(set_index).body_sims.push(BodySim {
            body: key,
            position: def.position,
            linear_velocity: if def.body_type == BodyType::Static {
                Vec2::zero()
            } else {
                def.linear_velocity
            },
            inv_mass,
            inv_inertia,
        });

        if def.body_type == BodyType::Dynamic {
            self.create_island_for_body(key);
        }
        key
    }

    /// Destroy a body along with its shapes, contacts and joints.
    /// Bodies that were touching it are woken up.
    pub fn destroy_body(&mut self, key: BodyKey) -> Result<(), WorldError> {
        self.body(key)?;
        self.wake_body_set(key);

        while let Some(edge) = self.bodies[key.0].joint_head {
            self.destroy_joint_internal(edge.key, true);
        }
        self.destroy_body_contacts(key, true);

        let shapes = std::mem::take(&mut self.bodies[key.0].shapes);
        for shape_key in shapes {
            if let Some(shape) = self.shapes.remove(shape_key.0) {
                self.broad_phase.destroy_proxy(shape.proxy_key);
            }
        }

        self.remove_body_from_island(key);

        if let Some(body) = self.bodies.remove(key.0) {
            self.remove_body_sim(body.set_index, body.local_index);
        }
        Ok(())
    }

    pub fn body(&self, key: BodyKey) -> Result<&Body, WorldError> {
        self.bodies.get(key.0).ok_or(WorldError::InvalidBody(key))
    }

    pub fn body_type(&self, key: BodyKey) -> Result<BodyType, WorldError> {
        Ok(self.body(key)?.body_type)
    }

    pub fn body_island(&self, key: BodyKey) -> Result<Option<IslandKey>, WorldError> {
        Ok(self.body(key)?.island)
    }

    pub fn body_set(&self, key: BodyKey) -> Result<SetIndex, WorldError> {
        Ok(self.body(key)?.set_index)
    }

    /// Whether the body is in the awake set.
    /// Static bodies are never awake, kinematic bodies always are.
    pub fn is_awake(&self, key: BodyKey) -> Result<bool, WorldError> {
        Ok(self.body(key)?.set_index == SetIndex::AWAKE)
    }

    /// Wake the sleeping set a body is in, along with every other island in that set.
    /// Returns `true` if the body was asleep.
    pub fn wake_body(&mut self, key: BodyKey) -> Result<bool, WorldError> {
        self.body(key)?;
        Ok(self.wake_body_set(key))
    }

    pub fn position(&self, key: BodyKey) -> Result<Vec2, WorldError> {
        self.body(key)?;
        Ok(self.body_sim(key).position)
    }

    /// Teleport a body. Non-static bodies are woken up.
    pub fn set_position(&mut self, key: BodyKey, position: Vec2) -> Result<(), WorldError> {
        if self.body(key)?.body_type != BodyType::Static {
            self.wake_body(key)?;
        }
        self.body_sim_mut(key).position = position;

        let margin = self.config.aabb_margin;
        let body = &self.bodies[key.0];
        for shape_key in &body.shapes {
            let shape = &mut self.shapes[shape_key.0];
            shape.aabb = shape.kind.compute_aabb(position);
            shape.fat_aabb = if body.body_type == BodyType::Static {
                shape.aabb
            } else {
                shape.aabb.padded(margin)
            };
            self.broad_phase.move_proxy(shape.proxy_key, shape.fat_aabb);
        }
        Ok(())
    }

    pub fn linear_velocity(&self, key: BodyKey) -> Result<Vec2, WorldError> {
        self.body(key)?;
        Ok(self.body_sim(key).linear_velocity)
    }

    /// Set a body's velocity. A non-zero velocity wakes the body.
    /// Static bodies can't move, so they are left alone.
    pub fn set_linear_velocity(&mut self, key: BodyKey, velocity: Vec2) -> Result<(), WorldError> {
        if self.body(key)?.body_type == BodyType::Static {
            return Ok(());
        }
        if velocity.mag_sq() > 0.0 {
            self.wake_body(key)?;
        }
        self.body_sim_mut(key).linear_velocity = velocity;
        Ok(())
    }

    /// Keys of every contact the body is part of.
    pub fn body_contacts(&self, key: BodyKey) -> Result<Vec<ContactKey>, WorldError> {
        let body = self.body(key)?;
        Ok(self.contact_edges(body).map(|e| e.key).collect())
    }

    /// Keys of every joint attached to the body.
    pub fn body_joints(&self, key: BodyKey) -> Result<Vec<JointKey>, WorldError> {
        let body = self.body(key)?;
        Ok(self.joint_edges(body).map(|e| e.key).collect())
    }

    pub(crate) fn contact_edges<'a>(
        &'a self,
        body: &Body,
    ) -> impl 'a + Iterator<Item = EdgeKey<ContactKey>> {
        std::iter::successors(body.contact_head, move |e| {
            self.contacts[e.key.0].edges[e.edge].next
        })
    }

    pub(crate) fn joint_edges<'a>(
        &'a self,
        body: &Body,
    ) -> impl 'a + Iterator<Item = EdgeKey<JointKey>> {
        std::iter::successors(body.joint_head, move |e| {
            self.joints[e.key.0].edges[e.edge].next
        })
    }

    #[inline]
    pub(crate) fn body_sim(&self, key: BodyKey) -> &BodySim {
        let body = &self.bodies[key.0];
        &self.set(body.set_index).body_sims[body.local_index]
    }

    #[inline]
    pub(crate) fn body_sim_mut(&mut self, key: BodyKey) -> &mut BodySim {
        let body = &self.bodies[key.0];
        let (set_index, local_index) = (body.set_index, body.local_index);
        &mut self.set_mut(set_index).body_sims[local_index]
    }

    /// Swap-remove a body sim from a set, fixing the index of the body moved into its place.
    pub(crate) fn remove_body_sim(&mut self, set_index: SetIndex, local_index: usize) -> BodySim {
        let sims = &mut self.set_mut(set_index).body_sims;
        let removed = sims.swap_remove(local_index);
        if let Some(moved) = sims.get(local_index) {
            let moved_key = moved.body;
            self.bodies[moved_key.0].local_index = local_index;
        }
        removed
    }

    /// Move the shapes of awake bodies by their velocities,
    /// growing the broad phase bounds of shapes that left them.
    pub(crate) fn finalize_bodies(&mut self, dt: f64) {
        let _span = tracy_span!("finalize bodies", "finalize_bodies");
        let margin = self.config.aabb_margin;
        let awake = super::solver_set::get_set_mut(&mut self.solver_sets, SetIndex::AWAKE);
        for sim in &mut awake.body_sims {
            if sim.linear_velocity == Vec2::zero() {
                continue;
            }
            sim.position += sim.linear_velocity * dt;
            for shape_key in &self.bodies[sim.body.0].shapes {
                let shape = &mut self.shapes[shape_key.0];
                shape.aabb = shape.kind.compute_aabb(sim.position);
                if !shape.fat_aabb.contains(&shape.aabb) {
                    shape.fat_aabb = shape.aabb.padded(margin);
                    self.broad_phase.enlarge_proxy(shape.proxy_key, shape.fat_aabb);
                }
            }
        }
    }

    //
    // Shapes
    //

    /// Attach a shape to a body. It gets paired on the next step.
    pub fn create_shape(
        &mut self,
        body_key: BodyKey,
        def: ShapeDef,
    ) -> Result<ShapeKey, WorldError> {
        let body_type = self.body(body_key)?.body_type;
        let position = self.body_sim(body_key).position;
        let aabb = def.kind.compute_aabb(position);
        let fat_aabb = if body_type == BodyType::Static {
            aabb
        } else {
            aabb.padded(self.config.aabb_margin)
        };

        let key = ShapeKey(self.shapes.insert(Shape {
            body: body_key,
            kind: def.kind,
            filter: def.filter,
            is_sensor: def.is_sensor,
            enable_custom_filtering: def.enable_custom_filtering,
            // replaced as soon as the proxy exists
            proxy_key: crate::collision::ProxyKey::new(0, body_type),
            aabb,
            fat_aabb,
        }));
        let proxy_key = self.broad_phase.create_proxy(
            fat_aabb,
            body_type,
            def.filter.category_bits,
            key,
            def.force_pair_creation,
        );
        self.shapes[key.0].proxy_key = proxy_key;
        self.bodies[body_key.0].shapes.push(key);
        Ok(key)
    }

    /// Destroy a shape and its contacts. Bodies it was touching are woken up.
    pub fn destroy_shape(&mut self, key: ShapeKey) -> Result<(), WorldError> {
        let shape = self.shapes.get(key.0).ok_or(WorldError::InvalidShape(key))?;
        let body_key = shape.body;
        let proxy_key = shape.proxy_key;

        let doomed: Vec<ContactKey> = self
            .contact_edges(&self.bodies[body_key.0])
            .map(|e| e.key)
            .filter(|ck| {
                let contact = &self.contacts[ck.0];
                contact.shape_a == key || contact.shape_b == key
            })
            .collect();
        for contact_key in doomed {
            self.destroy_contact(contact_key, true);
        }

        self.broad_phase.destroy_proxy(proxy_key);
        self.bodies[body_key.0].shapes.retain(|s| *s != key);
        self.shapes.remove(key.0);
        Ok(())
    }
}
