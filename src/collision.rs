//! Broad phase collision detection and the collaborators it relies on:
//! proxy keys, the spatial tree, collision filters, shapes and the
//! narrow phase manifold registry.

pub mod proxy;
pub use proxy::{BodyType, ProxyKey};

pub mod tree;
pub use tree::DynamicTree;

pub mod filter;
pub use filter::{should_shapes_collide, CustomFilter, Filter};

pub mod shape;
pub use shape::{Shape, ShapeDef, ShapeKind};

pub mod manifold;
pub use manifold::{Manifold, ManifoldFn, ManifoldPoint, ManifoldRegistry};

pub mod broad_phase;
pub use broad_phase::{BroadPhase, MovePair, PairQuery};
