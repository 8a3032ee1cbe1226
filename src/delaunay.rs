use anyhow::{bail, Result};
use delaunator::{triangulate, Point, EMPTY};

use crate::vecmath::{Boundary, Vec2};

/// Tolerance for matching a triangulated edge against the true minimum-image
/// displacement of its endpoints. Absolute, not scaled: for boxes many orders
/// of magnitude larger than unity, or spacings far below it, this constant
/// would need to scale with the coordinate magnitude.
const EDGE_TOL: f64 = 1e-9;

/// Planar straight-line triangulation service. Any conforming triangulator
/// works; the neighbor-graph builder only needs a valid set of undirected
/// edges over the given point set.
pub trait Triangulator {
    /// Returns the undirected index-pair edges of a triangulation of
    /// `points`, or an error for degenerate input (fewer than 3 points,
    /// collinear sets, or anything else yielding zero edges).
    fn triangulate(&self, points: &[Vec2]) -> Result<Vec<(usize, usize)>>;
}

/// Default backend: Delaunay triangulation via the `delaunator` crate.
pub struct DelaunayBackend;

impl Triangulator for DelaunayBackend {
    fn triangulate(&self, points: &[Vec2]) -> Result<Vec<(usize, usize)>> {
        let input: Vec<Point> = points.iter().map(|p| Point { x: p.x, y: p.y }).collect();
        let tri = triangulate(&input);
        if tri.triangles.is_empty() {
            bail!("triangulation produced no triangles ({} points, degenerate?)", points.len());
        }

        // One undirected edge per half-edge pair: keep the half-edge with no
        // twin (hull) or with the smaller index.
        let mut edges = Vec::with_capacity(tri.triangles.len());
        for e in 0..tri.triangles.len() {
            let twin = tri.halfedges[e];
            if twin == EMPTY || e < twin {
                edges.push((tri.triangles[e], tri.triangles[next_halfedge(e)]));
            }
        }
        Ok(edges)
    }
}

#[inline]
fn next_halfedge(e: usize) -> usize {
    if e % 3 == 2 { e - 2 } else { e + 1 }
}

/// Image shifts for the 3x3 periodic tiling, in box-length units.
const IMAGE_SHIFTS: [(i32, i32); 8] = [
    (-1, -1), (-1, 0), (-1, 1),
    (0, -1), (0, 1),
    (1, -1), (1, 0), (1, 1),
];

fn push_unique(neighbors: &mut [Vec<usize>], a: usize, b: usize) {
    // Linear membership scan; expected degree is ~6.
    if !neighbors[a].contains(&b) {
        neighbors[a].push(b);
    }
    if !neighbors[b].contains(&a) {
        neighbors[b].push(a);
    }
}

/// Builds the symmetric, deduplicated neighbor graph of `coms` approximating
/// the Delaunay neighbor relation under the given boundary.
///
/// Open boundaries triangulate the points directly. Periodic boundaries
/// triangulate the 9x tiled point set (originals first, then one image per
/// compass shift) and post-filter the edges:
///   1. drop edges touching no central-copy endpoint,
///   2. map endpoints back to original indices modulo M,
///   3. drop wraparound self-edges,
///   4. drop edges whose tiled displacement disagrees with the true
///      minimum-image displacement of the mapped originals — those connect a
///      point to a non-nearest periodic copy, and keeping them manufactures
///      spurious long-range neighbors.
///
/// Fails (no partial graph) for fewer than 3 points or degenerate sets.
pub fn build_neighbor_graph(
    coms: &[Vec2],
    boundary: Boundary,
    tri: &dyn Triangulator,
) -> Result<Vec<Vec<usize>>> {
    let m = coms.len();
    if m < 3 {
        bail!("neighbor graph needs at least 3 points, got {}", m);
    }

    let mut neighbors = vec![Vec::new(); m];

    match boundary {
        Boundary::Open => {
            for (a, b) in tri.triangulate(coms)? {
                if a == b {
                    continue;
                }
                push_unique(&mut neighbors, a, b);
            }
        }
        Boundary::Periodic { box_x, box_y } => {
            let mut tiled = Vec::with_capacity(9 * m);
            tiled.extend_from_slice(coms);
            for (sx, sy) in IMAGE_SHIFTS {
                let shift = Vec2::new(sx as f64 * box_x, sy as f64 * box_y);
                tiled.extend(coms.iter().map(|p| p.add(shift)));
            }

            for (p1, p2) in tri.triangulate(&tiled)? {
                // Edges entirely between image tiles say nothing about the
                // base point set and would fold back into fake long bonds.
                if p1 >= m && p2 >= m {
                    continue;
                }

                let o1 = p1 % m;
                let o2 = p2 % m;
                if o1 == o2 {
                    continue; // point linked to its own image
                }

                let tiled_delta = tiled[p2].sub(tiled[p1]);
                let mic_delta = boundary.min_image(coms[o2].sub(coms[o1]));
                if (tiled_delta.x - mic_delta.x).abs() > EDGE_TOL
                    || (tiled_delta.y - mic_delta.y).abs() > EDGE_TOL
                {
                    continue; // linked to a non-nearest periodic copy
                }

                push_unique(&mut neighbors, o1, o2);
            }
        }
    }

    Ok(neighbors)
}
