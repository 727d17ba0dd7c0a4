//! Association of the current frame's clusters with the previous frame.

use log::trace;
use ndarray::Array2;

use crate::error::Result;
use crate::tracker::cluster::{Cluster, InstanceId};
use crate::tracker::config::{AssignmentSolver, MatchConfig};
use crate::tracker::matching::{self, AssignmentResult};
use crate::tracker::spatial_index::SpatialIndex;

/// A cluster of the previous frame together with the id it was given.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedCluster {
    pub id: InstanceId,
    pub cluster: Cluster,
}

/// Outcome of previous-frame association.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameMatches {
    /// Inherited id per current cluster, `None` when unmatched.
    pub assigned: Vec<Option<InstanceId>>,
    /// Indices of current clusters left unmatched, ascending.
    pub unmatched: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct FrameAssociator {
    config: MatchConfig,
    solver: AssignmentSolver,
}

impl FrameAssociator {
    pub fn new(config: MatchConfig, solver: AssignmentSolver) -> Self {
        Self { config, solver }
    }

    /// Match `current` clusters against `previous` ones; matched clusters inherit
    /// the previous id.
    pub fn associate(
        &self,
        previous: &[TrackedCluster],
        current: &[Cluster],
    ) -> Result<FrameMatches> {
        let costs = self.cost_matrix(previous, current)?;
        let AssignmentResult {
            matches,
            unmatched_current,
            ..
        } = matching::linear_assignment(&costs, self.solver);

        let mut assigned = vec![None; current.len()];
        for (iprev, icur) in matches {
            trace!(
                "frame match: cluster {} -> id {} (cost {:.3})",
                icur, previous[iprev].id, costs[[iprev, icur]]
            );
            assigned[icur] = Some(previous[iprev].id);
        }

        Ok(FrameMatches {
            assigned,
            unmatched: unmatched_current,
        })
    }

    /// `previous x current` costs; pairs outside the gate are infinite.
    pub fn cost_matrix(
        &self,
        previous: &[TrackedCluster],
        current: &[Cluster],
    ) -> Result<Array2<f32>> {
        let mut costs = Array2::from_elem((previous.len(), current.len()), f32::INFINITY);
        if previous.is_empty() || current.is_empty() {
            return Ok(costs);
        }

        let index = SpatialIndex::new(previous.iter().map(|t| t.cluster.centroid).collect());
        for (icur, cluster) in current.iter().enumerate() {
            for neighbor in index.within_radius(&cluster.centroid, self.config.max_distance) {
                let prev = &previous[neighbor.index].cluster;
                let feature_distance =
                    matching::cosine_distance(prev.feature.view(), cluster.feature.view())?;
                if let Some(cost) = matching::gated_cost(
                    &self.config,
                    neighbor.distance,
                    prev.class == cluster.class,
                    feature_distance,
                    0.0,
                ) {
                    costs[[neighbor.index, icur]] = cost;
                }
            }
        }
        Ok(costs)
    }
}
