//! Identity recovery from the object cache.
//!
//! Clusters that found no partner in the previous frame are matched against
//! objects the cache still remembers, which recovers identities lost to
//! occlusion, sensor gaps or a missed clustering. Candidates are gathered with
//! a radius query over cached centroids, restricted to records seen within the
//! recovery window and not already claimed in this frame, and ranked by
//! distance, feature dissimilarity and age.

use std::collections::BTreeSet;

use log::trace;
use ndarray::Array2;

use crate::error::Result;
use crate::tracker::cluster::{Cluster, InstanceId};
use crate::tracker::config::{AssignmentSolver, LongRangeConfig};
use crate::tracker::matching::{self, AssignmentResult};
use crate::tracker::object_cache::{ObjectCache, ObjectRecord};
use crate::tracker::spatial_index::SpatialIndex;

/// Resolves clusters left over by previous-frame association.
pub trait RecoveryStrategy {
    /// `(cluster index, recovered id)` pairs for a subset of `unmatched`.
    fn recover(
        &self,
        cache: &ObjectCache,
        clusters: &[Cluster],
        unmatched: &[usize],
        claimed: &BTreeSet<InstanceId>,
        frame: u64,
    ) -> Result<Vec<(usize, InstanceId)>>;
}

/// Short association: leftovers are always new objects.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRecovery;

impl RecoveryStrategy for NoRecovery {
    fn recover(
        &self,
        _cache: &ObjectCache,
        _clusters: &[Cluster],
        _unmatched: &[usize],
        _claimed: &BTreeSet<InstanceId>,
        _frame: u64,
    ) -> Result<Vec<(usize, InstanceId)>> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Clone)]
pub struct LongRangeAssociator {
    config: LongRangeConfig,
    solver: AssignmentSolver,
}

impl LongRangeAssociator {
    pub fn new(config: LongRangeConfig, solver: AssignmentSolver) -> Self {
        Self { config, solver }
    }

    /// Cache records eligible at `frame`, in ascending id order.
    fn candidates<'a>(
        &self,
        cache: &'a ObjectCache,
        claimed: &BTreeSet<InstanceId>,
        frame: u64,
    ) -> Vec<&'a ObjectRecord> {
        cache
            .records()
            .filter(|record| record.age(frame) <= self.config.max_age)
            .filter(|record| !claimed.contains(&record.id))
            .collect()
    }

    fn position(&self, record: &ObjectRecord, frame: u64) -> nalgebra::Point3<f32> {
        if self.config.use_motion {
            record.predicted_centroid(frame)
        } else {
            record.centroid
        }
    }

    /// `candidate x unmatched` costs; pairs outside the gate are infinite.
    fn cost_matrix(
        &self,
        candidates: &[&ObjectRecord],
        clusters: &[Cluster],
        unmatched: &[usize],
        frame: u64,
    ) -> Result<Array2<f32>> {
        let gate = &self.config.gate;
        let mut costs = Array2::from_elem((candidates.len(), unmatched.len()), f32::INFINITY);

        let index = SpatialIndex::new(
            candidates
                .iter()
                .map(|record| self.position(record, frame))
                .collect(),
        );
        for (col, &icluster) in unmatched.iter().enumerate() {
            let cluster = &clusters[icluster];
            let nearby = index
                .within_radius(&cluster.centroid, gate.max_distance)
                .into_iter()
                .filter(|n| {
                    gate.class_mismatch_penalty.is_some()
                        || candidates[n.index].class == cluster.class
                })
                .take(self.config.max_candidates);

            for neighbor in nearby {
                let record = candidates[neighbor.index];
                let feature_distance =
                    matching::cosine_distance(record.feature.view(), cluster.feature.view())?;
                let age_cost = self.config.age_weight * record.age(frame) as f32;
                if let Some(cost) = matching::gated_cost(
                    gate,
                    neighbor.distance,
                    record.class == cluster.class,
                    feature_distance,
                    age_cost,
                ) {
                    costs[[neighbor.index, col]] = cost;
                }
            }
        }
        Ok(costs)
    }
}

impl RecoveryStrategy for LongRangeAssociator {
    fn recover(
        &self,
        cache: &ObjectCache,
        clusters: &[Cluster],
        unmatched: &[usize],
        claimed: &BTreeSet<InstanceId>,
        frame: u64,
    ) -> Result<Vec<(usize, InstanceId)>> {
        if unmatched.is_empty() {
            return Ok(Vec::new());
        }
        let candidates = self.candidates(cache, claimed, frame);
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let costs = self.cost_matrix(&candidates, clusters, unmatched, frame)?;
        let AssignmentResult { matches, .. } = matching::linear_assignment(&costs, self.solver);

        Ok(matches
            .into_iter()
            .map(|(irecord, col)| {
                let record = candidates[irecord];
                trace!(
                    "recovered id {} for cluster {} after {} frames (cost {:.3})",
                    record.id,
                    unmatched[col],
                    record.age(frame),
                    costs[[irecord, col]]
                );
                (unmatched[col], record.id)
            })
            .collect())
    }
}
