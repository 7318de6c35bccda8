//! The world owns every body, shape, contact, joint and island,
//! and drives the broad phase, the constraint graph and the islands through a step.

use crate::{
    collision::{broad_phase::PairSearch, BroadPhase, CustomFilter, ManifoldRegistry, Shape},
    config::WorldConfig,
    error::{ConfigError, WorldError},
    keys::{BodyKey, ContactKey, IslandKey, JointKey, SetIndex, ShapeKey},
    task::TaskScheduler,
};

use thunderdome as td;

pub mod body;
pub use body::{Body, BodyDef, BodySim};

pub mod contact;
pub use contact::{Contact, ContactSim};

pub mod joint;
pub use joint::{Joint, JointDef, JointSim};

pub mod constraint_graph;
pub use constraint_graph::{
    ConstraintGraph, GraphColor, DYNAMIC_COLOR_COUNT, GRAPH_COLOR_COUNT, OVERFLOW_INDEX,
};

pub mod island;
pub use island::{Island, IslandSim};

pub mod solver_set;
pub use solver_set::SolverSet;

#[cfg(test)]
mod tests;

pub struct World {
    pub(crate) config: WorldConfig,
    pub(crate) bodies: td::Arena<Body>,
    pub(crate) shapes: td::Arena<Shape>,
    pub(crate) contacts: td::Arena<Contact>,
    pub(crate) joints: td::Arena<Joint>,
    pub(crate) islands: td::Arena<Island>,
    pub(crate) solver_sets: td::Arena<SolverSet>,
    pub(crate) broad_phase: BroadPhase,
    pub(crate) constraint_graph: ConstraintGraph,
    pub(crate) manifolds: ManifoldRegistry,
    pub(crate) custom_filter: Option<CustomFilter>,
    scheduler: Box<dyn TaskScheduler>,
}

impl World {
    /// Create a world that runs its parallel passes on the default scheduler:
    /// rayon's global pool if the `parallel` feature is enabled, the calling thread otherwise.
    pub fn new(config: WorldConfig) -> Result<Self, ConfigError> {
        #[cfg(feature = "parallel")]
        let scheduler: Box<dyn TaskScheduler> = Box::new(crate::task::RayonScheduler::new());
        #[cfg(not(feature = "parallel"))]
        let scheduler: Box<dyn TaskScheduler> = Box::new(crate::task::SerialScheduler);
        Self::with_scheduler(config, scheduler)
    }

    pub fn with_scheduler(
        config: WorldConfig,
        scheduler: Box<dyn TaskScheduler>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut solver_sets = td::Arena::with_capacity(4);
        // the first three sets always exist and are never removed
        for expected in [SetIndex::STATIC, SetIndex::DISABLED, SetIndex::AWAKE] {
            let idx = solver_sets.insert(SolverSet::default());
            debug_assert_eq!(idx.slot(), expected.slot());
        }

        Ok(Self {
            bodies: td::Arena::with_capacity(config.body_capacity),
            shapes: td::Arena::with_capacity(config.body_capacity),
            contacts: td::Arena::new(),
            joints: td::Arena::new(),
            islands: td::Arena::new(),
            solver_sets,
            broad_phase: BroadPhase::new(),
            constraint_graph: ConstraintGraph::new(config.body_capacity),
            manifolds: ManifoldRegistry::default(),
            custom_filter: None,
            scheduler,
            config,
        })
    }

    #[inline]
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Replace the narrow phase functions. Existing contacts are kept.
    pub fn set_manifold_registry(&mut self, registry: ManifoldRegistry) {
        self.manifolds = registry;
    }

    /// Set a filter consulted for new pairs of shapes
    /// where at least one has custom filtering enabled.
    pub fn set_custom_filter(&mut self, filter: Option<CustomFilter>) {
        self.custom_filter = filter;
    }

    pub fn set_scheduler(&mut self, scheduler: Box<dyn TaskScheduler>) {
        self.scheduler = scheduler;
    }

    #[inline]
    pub(crate) fn scheduler(&self) -> &dyn TaskScheduler {
        self.scheduler.as_ref()
    }

    /// Advance the world by `dt` seconds:
    /// create contacts for new pairs, update every awake contact,
    /// move bodies by their velocities and let resting islands fall asleep.
    pub fn step(&mut self, dt: f64) {
        let _span = tracy_span!("step", "step");
        self.update_pairs();
        self.collide();
        self.finalize_bodies(dt);
        self.update_sleep(dt);
        self.validate();
    }

    /// Create contacts for the new pairs among the proxies that moved since the last update.
    pub fn update_pairs(&mut self) {
        let _span = tracy_span!("update pairs", "update_pairs");
        self.broad_phase.rebuild_trees();

        let move_count = self.broad_phase.move_count();
        if move_count == 0 {
            return;
        }

        let params = PairSearch {
            pool_factor: self.config.pair_pool_factor,
            min_range: self.config.min_range_per_task,
        };
        let pairs = self
            .broad_phase
            .find_new_pairs(&*self, self.scheduler(), params);

        // serial and in move order, so contacts are created in the same order
        // regardless of how the search was split between threads
        let contacts_before = self.contacts.len();
        {
            let _span = tracy_span!("create contacts", "update_pairs");
            for pair in &pairs {
                self.create_contact(pair.shape_a, pair.shape_b);
            }
        }
        self.broad_phase.clear_moves();

        log::debug!(
            "pair update: {move_count} moved proxies, {} candidate pairs, {} new contacts",
            pairs.len(),
            self.contacts.len() - contacts_before,
        );
    }

    //
    // Queries
    //

    #[inline]
    pub fn broad_phase(&self) -> &BroadPhase {
        &self.broad_phase
    }

    #[inline]
    pub fn constraint_graph(&self) -> &ConstraintGraph {
        &self.constraint_graph
    }

    #[inline]
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn bodies(&self) -> impl '_ + Iterator<Item = (BodyKey, &Body)> {
        self.bodies.iter().map(|(idx, body)| (BodyKey(idx), body))
    }

    #[inline]
    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    pub fn shape(&self, key: ShapeKey) -> Result<&Shape, WorldError> {
        self.shapes.get(key.0).ok_or(WorldError::InvalidShape(key))
    }

    #[inline]
    pub fn contact_count(&self) -> usize {
        self.contacts.len()
    }

    /// Every contact in creation slot order.
    pub fn contacts(&self) -> impl '_ + Iterator<Item = (ContactKey, &Contact)> {
        self.contacts.iter().map(|(idx, c)| (ContactKey(idx), c))
    }

    pub fn contact(&self, key: ContactKey) -> Option<&Contact> {
        self.contacts.get(key.0)
    }

    /// The graph color of a contact, or `None` if it is not touching or not awake.
    pub fn contact_color(&self, key: ContactKey) -> Option<usize> {
        self.contacts.get(key.0).and_then(|c| c.color_index)
    }

    #[inline]
    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    pub fn joint(&self, key: JointKey) -> Result<&Joint, WorldError> {
        self.joints.get(key.0).ok_or(WorldError::InvalidJoint(key))
    }

    #[inline]
    pub fn island_count(&self) -> usize {
        self.islands.len()
    }

    pub fn islands(&self) -> impl '_ + Iterator<Item = (IslandKey, &Island)> {
        self.islands.iter().map(|(idx, i)| (IslandKey(idx), i))
    }

    pub fn island(&self, key: IslandKey) -> Result<&Island, WorldError> {
        self.islands.get(key.0).ok_or(WorldError::InvalidIsland(key))
    }

    /// Number of sets holding sleeping islands.
    pub fn sleeping_set_count(&self) -> usize {
        self.solver_sets.len() - 3
    }

    /// Run every consistency check: the broad phase, the constraint graph,
    /// every island and every solver set.
    /// Does nothing without debug assertions.
    pub fn validate(&self) {
        if !cfg!(debug_assertions) {
            return;
        }
        self.broad_phase.validate();
        self.validate_contacts();
        self.constraint_graph.validate(|body| {
            self.bodies
                .get(body.0)
                .map_or(false, |b| b.body_type == crate::collision::BodyType::Dynamic)
        });
        for (idx, _) in self.islands.iter() {
            self.validate_island(IslandKey(idx));
        }
        self.validate_solver_sets();
    }
}
