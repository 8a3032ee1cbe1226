use serde::{Serialize, Deserialize};

// Basic 2D vector type. f64 throughout: correlation sums over many snapshots
// accumulate too much rounding error in single precision.
#[derive(Copy, Clone, Default, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    #[inline(always)]
    pub fn new(x: f64, y: f64) -> Self { Self { x, y } }
    #[inline(always)]
    pub fn zero() -> Self { Self::new(0.0, 0.0) }
    #[inline(always)]
    pub fn length_squared(self) -> f64 { self.x * self.x + self.y * self.y }
    #[inline(always)]
    pub fn length(self) -> f64 { self.length_squared().sqrt() }
    #[inline(always)]
    pub fn add(self, other: Self) -> Self { Self::new(self.x + other.x, self.y + other.y) }
    #[inline(always)]
    pub fn sub(self, other: Self) -> Self { Self::new(self.x - other.x, self.y - other.y) }
    #[inline(always)]
    pub fn scale(self, scalar: f64) -> Self { Self::new(self.x * scalar, self.y * scalar) }
    /// Polar angle of the vector in (-pi, pi].
    #[inline(always)]
    pub fn angle(self) -> f64 { self.y.atan2(self.x) }
}

/// Minimum-image fold of a single displacement component for box length `l`.
#[inline(always)]
fn mic_delta(d: f64, l: f64) -> f64 {
    d - l * (d / l).round()
}

/// Wraps a coordinate into the primary cell [0, l).
#[inline(always)]
fn wrap_coord(x: f64, l: f64) -> f64 {
    let y = x % l;
    if y < 0.0 { y + l } else { y }
}

/// Periodicity descriptor for the analysis domain. `Periodic` carries the box
/// edge lengths; non-positive lengths are rejected at configuration time in
/// `config.rs`, so every `Boundary` reaching the pipeline is valid.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Boundary {
    Open,
    Periodic { box_x: f64, box_y: f64 },
}

impl Boundary {
    #[inline(always)]
    pub fn is_periodic(&self) -> bool {
        matches!(self, Boundary::Periodic { .. })
    }

    /// Folds a displacement through the minimum-image convention.
    /// Open boundaries return the displacement unchanged.
    #[inline(always)]
    pub fn min_image(&self, d: Vec2) -> Vec2 {
        match *self {
            Boundary::Open => d,
            Boundary::Periodic { box_x, box_y } => {
                Vec2::new(mic_delta(d.x, box_x), mic_delta(d.y, box_y))
            }
        }
    }

    /// Minimum-image displacement from `a` to `b`.
    #[inline(always)]
    pub fn pair_delta(&self, a: Vec2, b: Vec2) -> Vec2 {
        self.min_image(b.sub(a))
    }

    /// Minimum-image distance between `a` and `b`.
    #[inline(always)]
    pub fn pair_distance(&self, a: Vec2, b: Vec2) -> f64 {
        self.pair_delta(a, b).length()
    }

    /// Folds a position into the primary cell. No-op for open boundaries.
    #[inline(always)]
    pub fn wrap(&self, p: Vec2) -> Vec2 {
        match *self {
            Boundary::Open => p,
            Boundary::Periodic { box_x, box_y } => {
                Vec2::new(wrap_coord(p.x, box_x), wrap_coord(p.y, box_y))
            }
        }
    }

    /// Half the smaller box edge: the largest radius at which periodic radial
    /// statistics are reliable. `None` for open boundaries (no cutoff).
    pub fn half_min_extent(&self) -> Option<f64> {
        match *self {
            Boundary::Open => None,
            Boundary::Periodic { box_x, box_y } => Some(0.5 * box_x.min(box_y)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn min_image_folds_across_the_boundary() {
        let b = Boundary::Periodic { box_x: 10.0, box_y: 10.0 };
        let d = b.pair_delta(Vec2::new(0.1, 0.0), Vec2::new(9.9, 0.0));
        assert_abs_diff_eq!(d.x, -0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(d.y, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn min_image_is_identity_inside_the_half_box() {
        let b = Boundary::Periodic { box_x: 10.0, box_y: 10.0 };
        let d = b.min_image(Vec2::new(3.0, -4.0));
        assert_abs_diff_eq!(d.x, 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(d.y, -4.0, epsilon = 1e-12);
    }

    #[test]
    fn open_boundary_leaves_displacements_raw() {
        let b = Boundary::Open;
        let d = b.pair_delta(Vec2::new(0.1, 0.0), Vec2::new(9.9, 0.0));
        assert_abs_diff_eq!(d.x, 9.8, epsilon = 1e-12);
        assert!(b.half_min_extent().is_none());
    }

    #[test]
    fn wrap_maps_into_the_primary_cell() {
        let b = Boundary::Periodic { box_x: 10.0, box_y: 5.0 };
        let p = b.wrap(Vec2::new(-0.5, 12.5));
        assert_abs_diff_eq!(p.x, 9.5, epsilon = 1e-12);
        assert_abs_diff_eq!(p.y, 2.5, epsilon = 1e-12);
        // Exactly one box length wraps to zero, not to l.
        assert_abs_diff_eq!(b.wrap(Vec2::new(10.0, 5.0)).x, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn half_min_extent_uses_the_smaller_edge() {
        let b = Boundary::Periodic { box_x: 8.0, box_y: 20.0 };
        assert_abs_diff_eq!(b.half_min_extent().unwrap(), 4.0, epsilon = 1e-12);
    }
}
