use log::warn;

use crate::vecmath::{Boundary, Vec2};

/// Computes one representative coordinate (geometric centroid) per cluster,
/// robust to periodic wraparound.
///
/// The first member is the reference: all member displacements relative to it
/// are folded through the minimum image, averaged, and added back, and the
/// result is wrapped into the primary cell. A naive coordinate average breaks
/// for clusters straddling a periodic boundary; this does not.
///
/// Index-aligned with the cluster ids in `members`. An empty cluster (cannot
/// be produced by `clusters::find_clusters`, handled for hand-built input)
/// yields the origin; an out-of-range member index is skipped. Both are
/// reported per occurrence.
pub fn cluster_centers(
    positions: &[Vec2],
    members: &[Vec<usize>],
    boundary: Boundary,
) -> Vec<Vec2> {
    let n = positions.len();
    let mut centers = Vec::with_capacity(members.len());

    for (cid, cluster) in members.iter().enumerate() {
        if cluster.is_empty() {
            warn!("cluster {} is empty; using origin as its center", cid);
            centers.push(Vec2::zero());
            continue;
        }

        let reference = cluster[0];
        if reference >= n {
            warn!("cluster {}: reference member index {} out of range (N={}); using origin", cid, reference, n);
            centers.push(Vec2::zero());
            continue;
        }
        let origin = positions[reference];

        let mut sum = Vec2::zero();
        for &idx in cluster {
            if idx >= n {
                warn!("cluster {}: member index {} out of range (N={}); skipped", cid, idx, n);
                continue;
            }
            sum = sum.add(boundary.min_image(positions[idx].sub(origin)));
        }

        let center = origin.add(sum.scale(1.0 / cluster.len() as f64));
        centers.push(boundary.wrap(center));
    }

    centers
}
