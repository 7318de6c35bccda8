//! Contact manifolds and the table of functions that compute them.
//!
//! The table is an ordinary value owned by the world,
//! so worlds can be built with different narrow phase functions
//! and no global state is ever initialized.

use super::ShapeKind;
use crate::math::{left_normal, Vec2};

/// Contact points closer than this are kept even if the shapes are not yet
/// overlapping, so that a contact starts touching slightly before impact.
pub const SPECULATIVE_DISTANCE: f64 = 0.02;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ManifoldPoint {
    /// World space location of the contact point.
    pub point: Vec2,
    /// Negative when the shapes overlap.
    pub separation: f64,
}

/// The contact points between two shapes. 0-2 points can occur between two 2D objects.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Manifold {
    /// Unit normal pointing from shape A to shape B.
    pub normal: Vec2,
    pub points: [ManifoldPoint; 2],
    pub point_count: usize,
}

impl Manifold {
    #[inline]
    pub fn is_touching(&self) -> bool {
        self.point_count > 0
    }

    #[inline]
    pub fn points(&self) -> &[ManifoldPoint] {
        &self.points[..self.point_count]
    }

    fn push(&mut self, point: Vec2, separation: f64) {
        if separation < SPECULATIVE_DISTANCE && self.point_count < 2 {
            self.points[self.point_count] = ManifoldPoint { point, separation };
            self.point_count += 1;
        }
    }
}

/// Computes the manifold of shape A at position A against shape B at position B.
pub type ManifoldFn = fn(&ShapeKind, Vec2, &ShapeKind, Vec2) -> Manifold;

#[derive(Clone, Copy, Debug)]
struct Register {
    func: ManifoldFn,
    // if false, contacts for this pair are created with the shapes swapped
    // so that the registered function of the opposite order applies
    primary: bool,
}

/// Table of manifold functions indexed by the shape kinds of a pair.
///
/// A missing entry means shapes of those kinds never get a contact.
#[derive(Clone, Debug)]
pub struct ManifoldRegistry {
    table: [[Option<Register>; ShapeKind::COUNT]; ShapeKind::COUNT],
}

impl Default for ManifoldRegistry {
    fn default() -> Self {
        let mut reg = Self::empty();
        let circle = ShapeKind::Circle {
            center: Vec2::zero(),
            radius: 0.0,
        }
        .type_index();
        let rect = ShapeKind::Box {
            center: Vec2::zero(),
            half_extents: Vec2::zero(),
        }
        .type_index();
        reg.register(circle, circle, circle_circle);
        reg.register(rect, circle, box_circle);
        reg.register(rect, rect, box_box);
        reg
    }
}

impl ManifoldRegistry {
    /// A registry without any functions, in which no shapes collide.
    pub fn empty() -> Self {
        Self {
            table: [[None; ShapeKind::COUNT]; ShapeKind::COUNT],
        }
    }

    /// Register a function for shape kinds `a` and `b` in that order.
    /// The reverse order is marked non-primary unless it already has its own function.
    pub fn register(&mut self, a: usize, b: usize, func: ManifoldFn) {
        self.table[a][b] = Some(Register {
            func,
            primary: true,
        });
        if a != b && self.table[b][a].map_or(true, |r| !r.primary) {
            self.table[b][a] = Some(Register {
                func,
                primary: false,
            });
        }
    }

    /// Whether shapes of these kinds can get a contact at all.
    #[inline]
    pub fn has_function(&self, a: &ShapeKind, b: &ShapeKind) -> bool {
        self.table[a.type_index()][b.type_index()].is_some()
    }

    /// Whether a contact between these kinds should be created in this order.
    /// Only meaningful if [`has_function`][Self::has_function] is true.
    #[inline]
    pub fn is_primary(&self, a: &ShapeKind, b: &ShapeKind) -> bool {
        self.table[a.type_index()][b.type_index()].map_or(false, |r| r.primary)
    }

    /// Compute the manifold for a pair in primary order.
    pub fn compute(&self, a: &ShapeKind, pos_a: Vec2, b: &ShapeKind, pos_b: Vec2) -> Manifold {
        match self.table[a.type_index()][b.type_index()] {
            Some(reg) => {
                debug_assert!(reg.primary, "manifold requested in non-primary order");
                (reg.func)(a, pos_a, b, pos_b)
            }
            None => Manifold::default(),
        }
    }
}

//
// CIRCLE <-> CIRCLE
//

fn circle_circle(a: &ShapeKind, pos_a: Vec2, b: &ShapeKind, pos_b: Vec2) -> Manifold {
    let (
        ShapeKind::Circle {
            center: ca,
            radius: ra,
        },
        ShapeKind::Circle {
            center: cb,
            radius: rb,
        },
    ) = (*a, *b)
    else {
        unreachable!("circle_circle called with non-circles")
    };
    let ca = pos_a + ca;
    let cb = pos_b + cb;

    let dist = cb - ca;
    let dist_mag = dist.mag();
    let normal = if dist_mag < 1e-9 {
        // same position, consider penetration to be on x axis
        Vec2::unit_x()
    } else {
        dist / dist_mag
    };
    let separation = dist_mag - ra - rb;

    let mut manifold = Manifold {
        normal,
        ..Default::default()
    };
    let surface_a = ca + normal * ra;
    let surface_b = cb - normal * rb;
    manifold.push((surface_a + surface_b) * 0.5, separation);
    manifold
}

//
// BOX <-> CIRCLE
//

fn box_circle(a: &ShapeKind, pos_a: Vec2, b: &ShapeKind, pos_b: Vec2) -> Manifold {
    let (
        ShapeKind::Box {
            center: box_center,
            half_extents: he,
        },
        ShapeKind::Circle {
            center: circ_center,
            radius: r,
        },
    ) = (*a, *b)
    else {
        unreachable!("box_circle called with wrong shapes")
    };
    let box_center = pos_a + box_center;
    let circ_center = pos_b + circ_center;
    let local = circ_center - box_center;

    let inside = local.x.abs() <= he.x && local.y.abs() <= he.y;
    let (normal, surface_point, separation) = if inside {
        // push out along the axis of least penetration
        let pen_x = he.x - local.x.abs();
        let pen_y = he.y - local.y.abs();
        if pen_x < pen_y {
            let n = Vec2::new(local.x.signum(), 0.0);
            let surface = box_center + Vec2::new(n.x * he.x, local.y);
            (n, surface, -pen_x - r)
        } else {
            let n = Vec2::new(0.0, local.y.signum());
            let surface = box_center + Vec2::new(local.x, n.y * he.y);
            (n, surface, -pen_y - r)
        }
    } else {
        let clamped = Vec2::new(local.x.clamp(-he.x, he.x), local.y.clamp(-he.y, he.y));
        let diff = local - clamped;
        let dist = diff.mag();
        (diff / dist, box_center + clamped, dist - r)
    };

    let mut manifold = Manifold {
        normal,
        ..Default::default()
    };
    let circle_surface = circ_center - normal * r;
    manifold.push((surface_point + circle_surface) * 0.5, separation);
    manifold
}

//
// BOX <-> BOX
//

fn box_box(a: &ShapeKind, pos_a: Vec2, b: &ShapeKind, pos_b: Vec2) -> Manifold {
    let (
        ShapeKind::Box {
            center: ca,
            half_extents: hea,
        },
        ShapeKind::Box {
            center: cb,
            half_extents: heb,
        },
    ) = (*a, *b)
    else {
        unreachable!("box_box called with non-boxes")
    };
    let ca = pos_a + ca;
    let cb = pos_b + cb;
    let d = cb - ca;

    // separation along each axis, negative when overlapping
    let sep_x = d.x.abs() - hea.x - heb.x;
    let sep_y = d.y.abs() - hea.y - heb.y;

    let (normal, separation) = if sep_x > sep_y {
        (Vec2::new(if d.x >= 0.0 { 1.0 } else { -1.0 }, 0.0), sep_x)
    } else {
        (Vec2::new(0.0, if d.y >= 0.0 { 1.0 } else { -1.0 }), sep_y)
    };

    let mut manifold = Manifold {
        normal,
        ..Default::default()
    };
    if separation >= SPECULATIVE_DISTANCE {
        return manifold;
    }

    // the two ends of the shared face segment, midway between the faces
    let tangent = left_normal(normal);
    let tangent_a = tangent.x.abs() * hea.x + tangent.y.abs() * hea.y;
    let tangent_b = tangent.x.abs() * heb.x + tangent.y.abs() * heb.y;
    let offset_b = d.dot(tangent);
    let lo = (-tangent_a).max(offset_b - tangent_b);
    let hi = tangent_a.min(offset_b + tangent_b);
    let face_a = normal.x.abs() * hea.x + normal.y.abs() * hea.y;
    let mid_face = ca + normal * (face_a + 0.5 * separation);
    manifold.push(mid_face + tangent * lo, separation);
    if hi > lo {
        manifold.push(mid_face + tangent * hi, separation);
    }
    manifold
}

#[cfg(test)]
mod tests {
    use super::*;

    fn circle(radius: f64) -> ShapeKind {
        ShapeKind::Circle {
            center: Vec2::zero(),
            radius,
        }
    }

    fn rect(hw: f64, hh: f64) -> ShapeKind {
        ShapeKind::Box {
            center: Vec2::zero(),
            half_extents: Vec2::new(hw, hh),
        }
    }

    #[test]
    fn circles() {
        let reg = ManifoldRegistry::default();
        let m = reg.compute(&circle(1.0), Vec2::zero(), &circle(1.0), Vec2::new(1.5, 0.0));
        assert_eq!(m.point_count, 1);
        assert_eq!(m.normal, Vec2::unit_x());
        assert!((m.points[0].separation + 0.5).abs() < 1e-12);

        let m = reg.compute(&circle(1.0), Vec2::zero(), &circle(1.0), Vec2::new(3.0, 0.0));
        assert!(!m.is_touching());
    }

    #[test]
    fn box_on_box_has_two_points() {
        let reg = ManifoldRegistry::default();
        let ground = rect(5.0, 0.5);
        let crate_box = rect(0.5, 0.5);
        let m = reg.compute(&ground, Vec2::zero(), &crate_box, Vec2::new(1.0, 0.95));
        assert_eq!(m.point_count, 2);
        assert_eq!(m.normal, Vec2::unit_y());
        for p in m.points() {
            assert!((p.separation + 0.05).abs() < 1e-12);
        }

        let apart = reg.compute(&ground, Vec2::zero(), &crate_box, Vec2::new(1.0, 2.0));
        assert!(!apart.is_touching());
    }

    #[test]
    fn box_circle_inside_and_outside() {
        let reg = ManifoldRegistry::default();
        let m = reg.compute(&rect(1.0, 1.0), Vec2::zero(), &circle(0.5), Vec2::new(0.0, 1.25));
        assert!(m.is_touching());
        assert_eq!(m.normal, Vec2::unit_y());

        let m = reg.compute(&rect(1.0, 1.0), Vec2::zero(), &circle(0.5), Vec2::new(0.2, 0.9));
        assert!(m.is_touching());
        assert!(m.points[0].separation < -0.5);

        let m = reg.compute(&rect(1.0, 1.0), Vec2::zero(), &circle(0.5), Vec2::new(3.0, 3.0));
        assert!(!m.is_touching());
    }

    #[test]
    fn circle_box_is_not_primary() {
        let reg = ManifoldRegistry::default();
        assert!(reg.has_function(&circle(1.0), &rect(1.0, 1.0)));
        assert!(!reg.is_primary(&circle(1.0), &rect(1.0, 1.0)));
        assert!(reg.is_primary(&rect(1.0, 1.0), &circle(1.0)));

        let empty = ManifoldRegistry::empty();
        assert!(!empty.has_function(&circle(1.0), &circle(1.0)));
    }
}
