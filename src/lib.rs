#[macro_use]
mod util;

pub mod math;
pub use math::{Aabb, Vec2};

pub mod keys;
pub use keys::{BodyKey, ContactKey, IslandKey, JointKey, SetIndex, ShapeKey};

pub mod bitset;
pub mod key_set;

pub mod collision;
pub use collision::{
    BodyType, BroadPhase, CustomFilter, Filter, Manifold, ManifoldRegistry, ProxyKey, ShapeDef,
    ShapeKind,
};

pub mod task;
#[cfg(feature = "parallel")]
pub use task::RayonScheduler;
pub use task::{SerialScheduler, TaskScheduler};

pub mod config;
pub use config::WorldConfig;

pub mod error;
pub use error::{ConfigError, WorldError};

pub mod world;
pub use world::{
    BodyDef, ConstraintGraph, JointDef, World, DYNAMIC_COLOR_COUNT, GRAPH_COLOR_COUNT,
    OVERFLOW_INDEX,
};
