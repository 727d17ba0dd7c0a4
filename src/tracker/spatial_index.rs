//! KD-tree over 3D points for nearest-neighbor and radius queries.
//!
//! Results are ordered by distance, ties by the point's original index, so a
//! query against a fixed point set always returns the same neighbors in the
//! same order.

use std::cmp::Ordering;

use nalgebra::Point3;

use crate::error::{Error, Result};

/// A neighbor returned by a query: original point index and Euclidean distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub index: usize,
    pub distance: f32,
}

impl Neighbor {
    #[inline]
    fn order(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.index.cmp(&other.index))
    }
}

#[derive(Debug, Clone)]
struct Node {
    point: usize,
    axis: usize,
    left: Option<usize>,
    right: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct SpatialIndex {
    points: Vec<Point3<f32>>,
    nodes: Vec<Node>,
    root: Option<usize>,
}

impl SpatialIndex {
    /// Build the index. Point indices in query results refer to positions in `points`.
    pub fn new(points: Vec<Point3<f32>>) -> Self {
        let mut order: Vec<usize> = (0..points.len()).collect();
        let mut nodes = Vec::with_capacity(points.len());
        let root = build(&points, &mut order, 0, &mut nodes);
        Self {
            points,
            nodes,
            root,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn point(&self, index: usize) -> Option<&Point3<f32>> {
        self.points.get(index)
    }

    /// The `k` nearest points to `query`, closest first.
    ///
    /// Fails with [`Error::InsufficientPoints`] when `k` exceeds the number of
    /// indexed points.
    pub fn nearest(&self, query: &Point3<f32>, k: usize) -> Result<Vec<Neighbor>> {
        if k > self.points.len() {
            return Err(Error::InsufficientPoints {
                requested: k,
                available: self.points.len(),
            });
        }
        let mut best = Vec::with_capacity(k + 1);
        if k > 0 {
            self.search_nearest(self.root, query, k, &mut best);
        }
        Ok(best)
    }

    /// All points within `radius` of `query` (inclusive), closest first.
    pub fn within_radius(&self, query: &Point3<f32>, radius: f32) -> Vec<Neighbor> {
        let mut found = Vec::new();
        if radius >= 0.0 {
            self.search_radius(self.root, query, radius, &mut found);
        }
        found.sort_by(Neighbor::order);
        found
    }

    fn search_nearest(
        &self,
        node: Option<usize>,
        query: &Point3<f32>,
        k: usize,
        best: &mut Vec<Neighbor>,
    ) {
        let Some(slot) = node else {
            return;
        };
        let node = &self.nodes[slot];
        let point = &self.points[node.point];

        let candidate = Neighbor {
            index: node.point,
            distance: nalgebra::distance(query, point),
        };
        let pos = best
            .binary_search_by(|n| n.order(&candidate))
            .unwrap_or_else(|p| p);
        if pos < k {
            best.insert(pos, candidate);
            best.truncate(k);
        }

        let diff = query.coords[node.axis] - point.coords[node.axis];
        let (near, far) = if diff < 0.0 {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };
        self.search_nearest(near, query, k, best);

        // Equal distances must still be visited so index tie-breaks stay exact
        if best.len() < k || diff.abs() <= best[best.len() - 1].distance {
            self.search_nearest(far, query, k, best);
        }
    }

    fn search_radius(
        &self,
        node: Option<usize>,
        query: &Point3<f32>,
        radius: f32,
        found: &mut Vec<Neighbor>,
    ) {
        let Some(slot) = node else {
            return;
        };
        let node = &self.nodes[slot];
        let point = &self.points[node.point];

        let distance = nalgebra::distance(query, point);
        if distance <= radius {
            found.push(Neighbor {
                index: node.point,
                distance,
            });
        }

        let diff = query.coords[node.axis] - point.coords[node.axis];
        let (near, far) = if diff < 0.0 {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };
        self.search_radius(near, query, radius, found);
        if diff.abs() <= radius {
            self.search_radius(far, query, radius, found);
        }
    }
}

fn build(
    points: &[Point3<f32>],
    order: &mut [usize],
    depth: usize,
    nodes: &mut Vec<Node>,
) -> Option<usize> {
    if order.is_empty() {
        return None;
    }

    let axis = depth % 3;
    order.sort_unstable_by(|&a, &b| {
        points[a].coords[axis]
            .total_cmp(&points[b].coords[axis])
            .then(a.cmp(&b))
    });

    let mid = order.len() / 2;
    let slot = nodes.len();
    nodes.push(Node {
        point: order[mid],
        axis,
        left: None,
        right: None,
    });

    let (lower, rest) = order.split_at_mut(mid);
    let left = build(points, lower, depth + 1, nodes);
    let right = build(points, &mut rest[1..], depth + 1, nodes);
    nodes[slot].left = left;
    nodes[slot].right = right;

    Some(slot)
}
