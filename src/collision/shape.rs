use super::{Filter, ProxyKey};
use crate::{
    keys::BodyKey,
    math::{Aabb, Vec2},
};

/// The geometric shape of a collider, relative to its body's position.
///
/// Boxes are axis-aligned; bodies in this crate only translate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ShapeKind {
    Circle { center: Vec2, radius: f64 },
    /// The box stores its side lengths halved because this makes
    /// intersection tests easier.
    Box { center: Vec2, half_extents: Vec2 },
}

impl ShapeKind {
    /// Number of variants, used to size the manifold registry.
    pub const COUNT: usize = 2;

    /// Dense index of the variant.
    #[inline]
    pub fn type_index(&self) -> usize {
        match self {
            ShapeKind::Circle { .. } => 0,
            ShapeKind::Box { .. } => 1,
        }
    }

    /// Bounds of the shape when its body is at `position`.
    pub fn compute_aabb(&self, position: Vec2) -> Aabb {
        match *self {
            ShapeKind::Circle { center, radius } => {
                Aabb::from_center_half_extents(position + center, Vec2::new(radius, radius))
            }
            ShapeKind::Box {
                center,
                half_extents,
            } => Aabb::from_center_half_extents(position + center, half_extents),
        }
    }
}

/// Parameters for creating a shape.
#[derive(Clone, Copy, Debug)]
pub struct ShapeDef {
    pub kind: ShapeKind,
    pub filter: Filter,
    /// Sensors detect overlap but never create contacts.
    pub is_sensor: bool,
    /// Consult the world's custom filter for pairs involving this shape.
    pub enable_custom_filtering: bool,
    /// Put the proxy in the move buffer on creation even if the body is static,
    /// so that the shape is paired on the next update.
    pub force_pair_creation: bool,
}

impl ShapeDef {
    pub fn circle(radius: f64) -> Self {
        Self::new(ShapeKind::Circle {
            center: Vec2::zero(),
            radius,
        })
    }

    /// Create a box shape with the given side lengths.
    pub fn rect(width: f64, height: f64) -> Self {
        Self::new(ShapeKind::Box {
            center: Vec2::zero(),
            half_extents: Vec2::new(width / 2.0, height / 2.0),
        })
    }

    pub fn new(kind: ShapeKind) -> Self {
        Self {
            kind,
            filter: Filter::default(),
            is_sensor: false,
            enable_custom_filtering: false,
            force_pair_creation: false,
        }
    }

    /// Offset the shape from its body's position in a builder-like chain.
    pub fn with_offset(mut self, offset: Vec2) -> Self {
        match &mut self.kind {
            ShapeKind::Circle { center, .. } | ShapeKind::Box { center, .. } => *center = offset,
        }
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn sensor(mut self) -> Self {
        self.is_sensor = true;
        self
    }

    pub fn with_custom_filtering(mut self) -> Self {
        self.enable_custom_filtering = true;
        self
    }

    pub fn force_pair_creation(mut self) -> Self {
        self.force_pair_creation = true;
        self
    }
}

/// A shape attached to a body, as stored in the world.
#[derive(Clone, Copy, Debug)]
pub struct Shape {
    pub(crate) body: BodyKey,
    pub(crate) kind: ShapeKind,
    pub(crate) filter: Filter,
    pub(crate) is_sensor: bool,
    pub(crate) enable_custom_filtering: bool,
    pub(crate) proxy_key: ProxyKey,
    /// Tight bounds at the body's current position.
    pub(crate) aabb: Aabb,
    /// Bounds stored in the broad phase, grown by the world's margin for moving bodies.
    pub(crate) fat_aabb: Aabb,
}

impl Shape {
    #[inline]
    pub fn body(&self) -> BodyKey {
        self.body
    }

    #[inline]
    pub fn kind(&self) -> &ShapeKind {
        &self.kind
    }

    #[inline]
    pub fn filter(&self) -> Filter {
        self.filter
    }

    #[inline]
    pub fn is_sensor(&self) -> bool {
        self.is_sensor
    }

    #[inline]
    pub fn proxy_key(&self) -> ProxyKey {
        self.proxy_key
    }

    #[inline]
    pub fn aabb(&self) -> Aabb {
        self.aabb
    }

    #[inline]
    pub fn fat_aabb(&self) -> Aabb {
        self.fat_aabb
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aabbs_follow_offset_and_position() {
        let circle = ShapeDef::circle(0.5).with_offset(Vec2::new(1.0, 0.0));
        assert_eq!(
            circle.kind.compute_aabb(Vec2::new(2.0, 2.0)),
            Aabb::new(Vec2::new(2.5, 1.5), Vec2::new(3.5, 2.5))
        );

        let rect = ShapeDef::rect(4.0, 2.0);
        assert_eq!(
            rect.kind.compute_aabb(Vec2::new(0.0, 1.0)),
            Aabb::new(Vec2::new(-2.0, 0.0), Vec2::new(2.0, 2.0))
        );
    }
}
