use crate::keys::{BodyKey, IslandKey, JointKey, ShapeKey};

/// Errors from world operations given handles that can be stale or otherwise unusable.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldError {
    #[error("Body {0:?} does not exist")]
    InvalidBody(BodyKey),
    #[error("Shape {0:?} does not exist")]
    InvalidShape(ShapeKey),
    #[error("Joint {0:?} does not exist")]
    InvalidJoint(JointKey),
    #[error("Island {0:?} does not exist")]
    InvalidIsland(IslandKey),
    #[error("A joint must connect two different bodies")]
    SelfJoint,
    #[error("A joint needs at least one dynamic body")]
    NoDynamicBody,
}

/// Errors from validating a [`WorldConfig`][crate::WorldConfig].
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
pub enum ConfigError {
    #[error("Pair pool factor must be at least 1")]
    ZeroPairPoolFactor,
    #[error("Minimum range per task must be at least 1")]
    ZeroMinRange,
    #[error("AABB margin must not be negative, got {0}")]
    NegativeMargin(f64),
    #[error("Time to sleep must be positive, got {0}")]
    NonPositiveTimeToSleep(f64),
}
