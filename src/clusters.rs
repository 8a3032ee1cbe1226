use anyhow::Result;
use rayon::prelude::*;

use crate::vecmath::{Boundary, Vec2};

/// Union-find over particle indices with path compression and union by rank.
/// Plain index arrays, no pointer graph.
struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, i: usize) -> usize {
        // First walk to the root, then compress the path behind us.
        let mut root = i;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut cur = i;
        while cur != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return;
        }
        if self.rank[ra] < self.rank[rb] {
            self.parent[ra] = rb;
        } else if self.rank[ra] > self.rank[rb] {
            self.parent[rb] = ra;
        } else {
            self.parent[rb] = ra;
            self.rank[ra] += 1;
        }
    }
}

/// Result of connectivity clustering: a dense cluster id per particle.
///
/// Ids are assigned in order of first occurrence among union-find roots while
/// scanning particles in input order, so they are a deterministic function of
/// the input ordering. They carry no identity across snapshots.
#[derive(Debug, Clone)]
pub struct ClusterAssignment {
    /// Particle index -> cluster id in [0, nclusters).
    pub ids: Vec<usize>,
    pub nclusters: usize,
}

impl ClusterAssignment {
    /// Member particle indices per cluster id. The lists partition [0, N).
    pub fn members(&self) -> Vec<Vec<usize>> {
        let mut members = vec![Vec::new(); self.nclusters];
        for (i, &cid) in self.ids.iter().enumerate() {
            members[cid].push(i);
        }
        members
    }
}

/// Partitions particles into clusters: two particles share a cluster iff they
/// are connected by a chain of pairwise distances each <= `lbond`, with
/// distances folded through the minimum image when `boundary` is periodic.
///
/// The pair scan is exhaustive O(N^2); that is the scalability ceiling of
/// this stage, and a spatial cell list is the natural upgrade once snapshots
/// outgrow it. The scan runs in parallel and only the union-find mutation is
/// serial.
pub fn find_clusters(
    positions: &[Vec2],
    lbond: f64,
    boundary: Boundary,
) -> Result<ClusterAssignment> {
    if lbond <= 0.0 {
        anyhow::bail!("bonding cutoff must be positive (got {})", lbond);
    }

    let n = positions.len();
    if n == 0 {
        return Ok(ClusterAssignment { ids: Vec::new(), nclusters: 0 });
    }

    let lb2 = lbond * lbond;
    let bonded: Vec<(usize, usize)> = (0..n)
        .into_par_iter()
        .flat_map_iter(|i| {
            let pi = positions[i];
            (i + 1..n).filter_map(move |j| {
                let d = boundary.min_image(positions[j].sub(pi));
                (d.length_squared() <= lb2).then_some((i, j))
            })
        })
        .collect();

    let mut uf = UnionFind::new(n);
    for (i, j) in bonded {
        uf.union(i, j);
    }

    // Map distinct roots to compact ids, first root seen gets id 0.
    let mut root_to_id = vec![usize::MAX; n];
    let mut ids = vec![0usize; n];
    let mut nclusters = 0;
    for i in 0..n {
        let root = uf.find(i);
        if root_to_id[root] == usize::MAX {
            root_to_id[root] = nclusters;
            nclusters += 1;
        }
        ids[i] = root_to_id[root];
    }

    Ok(ClusterAssignment { ids, nclusters })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn v(x: f64, y: f64) -> Vec2 {
        Vec2::new(x, y)
    }

    /// Canonical partition representation: set of sets of point coordinates
    /// (bit patterns), independent of input order and id assignment.
    fn partition(positions: &[Vec2], assignment: &ClusterAssignment) -> BTreeSet<BTreeSet<(u64, u64)>> {
        assignment
            .members()
            .iter()
            .map(|cluster| {
                cluster
                    .iter()
                    .map(|&i| (positions[i].x.to_bits(), positions[i].y.to_bits()))
                    .collect()
            })
            .collect()
    }

    #[test]
    fn empty_input_yields_zero_clusters() {
        let assignment = find_clusters(&[], 1.0, Boundary::Open).unwrap();
        assert_eq!(assignment.nclusters, 0);
        assert!(assignment.ids.is_empty());
    }

    #[test]
    fn non_positive_cutoff_is_rejected() {
        assert!(find_clusters(&[v(0.0, 0.0)], 0.0, Boundary::Open).is_err());
    }

    #[test]
    fn chains_merge_through_intermediate_particles() {
        // 0-1 and 1-2 bonded, 3 isolated.
        let positions = [v(0.0, 0.0), v(0.9, 0.0), v(1.8, 0.0), v(10.0, 10.0)];
        let assignment = find_clusters(&positions, 1.0, Boundary::Open).unwrap();
        assert_eq!(assignment.nclusters, 2);
        assert_eq!(assignment.ids[0], assignment.ids[1]);
        assert_eq!(assignment.ids[1], assignment.ids[2]);
        assert_ne!(assignment.ids[0], assignment.ids[3]);
    }

    #[test]
    fn ids_are_dense_and_cover_every_particle() {
        let positions = [v(5.0, 5.0), v(0.0, 0.0), v(5.1, 5.0), v(9.0, 1.0)];
        let assignment = find_clusters(&positions, 0.5, Boundary::Open).unwrap();
        assert_eq!(assignment.ids.len(), positions.len());
        for &cid in &assignment.ids {
            assert!(cid < assignment.nclusters);
        }
        // members() is a partition of [0, N).
        let members = assignment.members();
        let total: usize = members.iter().map(|m| m.len()).sum();
        assert_eq!(total, positions.len());
        let all: BTreeSet<usize> = members.into_iter().flatten().collect();
        assert_eq!(all.len(), positions.len());
        // First-seen ordering: particle 0 belongs to cluster 0.
        assert_eq!(assignment.ids[0], 0);
    }

    #[test]
    fn periodic_wrap_bonds_across_the_boundary() {
        let positions = [v(0.1, 0.0), v(9.9, 0.0)];
        let periodic = Boundary::Periodic { box_x: 10.0, box_y: 10.0 };

        let wrapped = find_clusters(&positions, 0.3, periodic).unwrap();
        assert_eq!(wrapped.nclusters, 1);

        let open = find_clusters(&positions, 0.3, Boundary::Open).unwrap();
        assert_eq!(open.nclusters, 2);
    }

    #[test]
    fn grouping_is_invariant_under_input_permutation() {
        let positions = vec![
            v(0.0, 0.0), v(0.4, 0.0), v(3.0, 3.0), v(3.4, 3.1),
            v(7.0, 1.0), v(0.2, 0.3), v(3.2, 2.8),
        ];
        let mut reversed = positions.clone();
        reversed.reverse();

        let a = find_clusters(&positions, 0.6, Boundary::Open).unwrap();
        let b = find_clusters(&reversed, 0.6, Boundary::Open).unwrap();

        assert_eq!(partition(&positions, &a), partition(&reversed, &b));
    }
}
