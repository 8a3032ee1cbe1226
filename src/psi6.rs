use num_complex::Complex64;

use crate::vecmath::{Boundary, Vec2};

/// Hexatic bond-orientational order parameter per point:
/// psi6(i) = (1/k) * sum_j exp(i 6 theta_ij) over the k neighbors of i,
/// with bond angles taken from minimum-image displacements. A point with no
/// neighbors gets 0+0i.
pub fn compute_psi6(
    coms: &[Vec2],
    neighbors: &[Vec<usize>],
    boundary: Boundary,
) -> Vec<Complex64> {
    coms.iter()
        .enumerate()
        .map(|(i, &p)| {
            let nbrs = &neighbors[i];
            if nbrs.is_empty() {
                return Complex64::new(0.0, 0.0);
            }
            let mut sum = Complex64::new(0.0, 0.0);
            for &j in nbrs {
                let theta = boundary.pair_delta(p, coms[j]).angle();
                sum += Complex64::from_polar(1.0, 6.0 * theta);
            }
            sum / nbrs.len() as f64
        })
        .collect()
}

/// Global lattice orientation: the angle of the plain (not renormalized)
/// average of psi6 over all points, divided by 6. Only meaningful modulo 60
/// degrees; used downstream purely as a reference axis.
pub fn global_orientation_angle(psi6: &[Complex64]) -> f64 {
    if psi6.is_empty() {
        return 0.0;
    }
    let mean = psi6.iter().sum::<Complex64>() / psi6.len() as f64;
    mean.im.atan2(mean.re) / 6.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;

    /// Center point plus 6 neighbors at unit distance, 60 degrees apart,
    /// the whole arrangement rotated by `phi`.
    fn hexagon(phi: f64) -> (Vec<Vec2>, Vec<Vec<usize>>) {
        let mut points = vec![Vec2::zero()];
        for k in 0..6 {
            let ang = phi + k as f64 * PI / 3.0;
            points.push(Vec2::new(ang.cos(), ang.sin()));
        }
        let mut neighbors = vec![Vec::new(); 7];
        neighbors[0] = (1..7).collect();
        (points, neighbors)
    }

    #[test]
    fn perfect_hexagon_center_has_unit_magnitude() {
        let (points, neighbors) = hexagon(0.0);
        let psi = compute_psi6(&points, &neighbors, Boundary::Open);
        assert_abs_diff_eq!(psi[0].norm(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(psi[0].re, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn rotation_shows_up_in_the_phase() {
        let phi = 10.0 * PI / 180.0;
        let (points, neighbors) = hexagon(phi);
        let psi = compute_psi6(&points, &neighbors, Boundary::Open);
        assert_abs_diff_eq!(psi[0].norm(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(psi[0].arg(), 6.0 * phi, epsilon = 1e-12);
    }

    #[test]
    fn isolated_point_gets_zero() {
        let (points, neighbors) = hexagon(0.0);
        let psi = compute_psi6(&points, &neighbors, Boundary::Open);
        // Ring points have no neighbor lists of their own here.
        assert_eq!(psi[1], Complex64::new(0.0, 0.0));
    }

    #[test]
    fn global_orientation_recovers_the_lattice_rotation() {
        let phi = 10.0 * PI / 180.0;
        let (points, neighbors) = hexagon(phi);
        let psi = compute_psi6(&points, &neighbors, Boundary::Open);
        // The center is the only ordered point; the mean inherits its phase.
        assert_abs_diff_eq!(global_orientation_angle(&psi), phi, epsilon = 1e-12);
    }

    #[test]
    fn empty_field_has_zero_orientation() {
        assert_abs_diff_eq!(global_orientation_angle(&[]), 0.0);
    }

    #[test]
    fn bond_angles_fold_through_the_minimum_image() {
        // Two points straddling the seam of a periodic box: the bond from 0
        // to 1 points in -x under the minimum image, not +x.
        let b = Boundary::Periodic { box_x: 10.0, box_y: 10.0 };
        let points = vec![Vec2::new(0.5, 5.0), Vec2::new(9.5, 5.0)];
        let neighbors = vec![vec![1], vec![0]];
        let psi = compute_psi6(&points, &neighbors, b);
        // theta = pi, so psi6 = exp(i 6 pi) = 1.
        assert_abs_diff_eq!(psi[0].re, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(psi[0].im, 0.0, epsilon = 1e-12);
    }
}
