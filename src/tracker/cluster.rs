//! Per-frame inputs: labeled points and the clusters reduced from them.

use std::collections::BTreeMap;

use nalgebra::{Point3, Vector3};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Temporally stable instance identifier.
pub type InstanceId = u32;

/// Id reported for points that belong to no cluster.
pub const NO_INSTANCE: InstanceId = 0;

/// Identifies a scene: a run of frames sharing one coordinate frame and id space.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SceneId {
    /// Opaque token compared to detect scene changes.
    pub token: String,
    /// Human-readable name.
    pub name: String,
}

impl SceneId {
    pub fn new(token: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            name: name.into(),
        }
    }

    /// Scene whose display name is its token.
    pub fn from_token(token: impl Into<String>) -> Self {
        let token = token.into();
        Self {
            name: token.clone(),
            token,
        }
    }
}

/// An object candidate of the current frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    /// Semantic class shared by the cluster's points.
    pub class: u32,
    /// Mean ego-compensated position.
    pub centroid: Point3<f32>,
    /// Mean per-point feature.
    pub feature: Array1<f32>,
    pub num_points: usize,
}

impl Cluster {
    pub fn new(class: u32, centroid: Point3<f32>, feature: Array1<f32>) -> Self {
        Self {
            class,
            centroid,
            feature,
            num_points: 1,
        }
    }

    pub fn feature_dim(&self) -> usize {
        self.feature.len()
    }
}

/// Ego-compensated points of one frame with their semantic and cluster labels.
#[derive(Debug, Clone)]
pub struct LabeledFrame {
    pub scene: SceneId,
    pub sample: String,
    pub positions: Vec<Point3<f32>>,
    /// One feature row per point.
    pub features: Array2<f32>,
    pub classes: Vec<u32>,
    /// Within-frame cluster label, `None` for background or unclustered points.
    pub cluster_labels: Vec<Option<u32>>,
}

/// Clusters of a frame and the cluster each point was reduced into.
#[derive(Debug, Clone, Default)]
pub struct ClusterSet {
    pub clusters: Vec<Cluster>,
    pub point_cluster: Vec<Option<usize>>,
}

struct Accumulator {
    position_sum: Vector3<f64>,
    feature_sum: Array1<f32>,
    class_votes: BTreeMap<u32, usize>,
    members: Vec<usize>,
}

impl LabeledFrame {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn feature_dim(&self) -> usize {
        self.features.ncols()
    }

    pub fn validate(&self) -> Result<()> {
        let expected = self.positions.len();
        let lengths = [
            ("features", self.features.nrows()),
            ("classes", self.classes.len()),
            ("cluster_labels", self.cluster_labels.len()),
        ];
        for (field, found) in lengths {
            if found != expected {
                return Err(Error::LengthMismatch {
                    field,
                    expected,
                    found,
                });
            }
        }
        Ok(())
    }

    /// Reduce points into clusters, ordered by cluster label.
    ///
    /// Clusters with fewer than `min_points` points are dropped and their
    /// points left unassigned.
    pub fn clusters(&self, min_points: usize) -> Result<ClusterSet> {
        self.validate()?;

        let dim = self.feature_dim();
        let mut groups: BTreeMap<u32, Accumulator> = BTreeMap::new();
        for (i, label) in self.cluster_labels.iter().enumerate() {
            let Some(label) = label else {
                continue;
            };
            let acc = groups.entry(*label).or_insert_with(|| Accumulator {
                position_sum: Vector3::zeros(),
                feature_sum: Array1::zeros(dim),
                class_votes: BTreeMap::new(),
                members: Vec::new(),
            });
            acc.position_sum += self.positions[i].coords.cast::<f64>();
            acc.feature_sum.scaled_add(1.0, &self.features.row(i));
            *acc.class_votes.entry(self.classes[i]).or_insert(0) += 1;
            acc.members.push(i);
        }

        let mut set = ClusterSet {
            clusters: Vec::with_capacity(groups.len()),
            point_cluster: vec![None; self.len()],
        };
        for acc in groups.into_values() {
            let count = acc.members.len();
            if count < min_points.max(1) {
                continue;
            }

            // Majority vote, ties to the smaller class
            let class = acc
                .class_votes
                .iter()
                .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
                .map(|(class, _)| *class)
                .unwrap_or_default();

            let centroid = Point3::from((acc.position_sum / count as f64).cast::<f32>());
            let feature = acc.feature_sum / count as f32;

            let index = set.clusters.len();
            for &i in &acc.members {
                set.point_cluster[i] = Some(index);
            }
            set.clusters.push(Cluster {
                class,
                centroid,
                feature,
                num_points: count,
            });
        }

        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn frame() -> LabeledFrame {
        LabeledFrame {
            scene: SceneId::from_token("scene-0001"),
            sample: "000000".into(),
            positions: vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(2.0, 0.0, 0.0),
                Point3::new(10.0, 10.0, 0.0),
                Point3::new(50.0, 50.0, 0.0),
                Point3::new(11.0, 10.0, 0.0),
                Point3::new(12.0, 10.0, 0.0),
            ],
            features: array![
                [1.0, 0.0],
                [0.0, 1.0],
                [1.0, 1.0],
                [9.0, 9.0],
                [1.0, 1.0],
                [1.0, 1.0]
            ],
            classes: vec![1, 1, 2, 0, 3, 3],
            cluster_labels: vec![Some(4), Some(4), Some(1), None, Some(1), Some(1)],
        }
    }

    #[test]
    fn test_reduce_clusters() {
        let set = frame().clusters(1).unwrap();

        assert_eq!(set.clusters.len(), 2);
        // Ordered by label: label 1 first
        let first = &set.clusters[0];
        assert_eq!(first.class, 3);
        assert_eq!(first.num_points, 3);
        assert!((first.centroid - Point3::new(11.0, 10.0, 0.0)).norm() < 1e-5);

        let second = &set.clusters[1];
        assert_eq!(second.class, 1);
        assert_eq!(second.centroid, Point3::new(1.0, 0.0, 0.0));
        assert_eq!(second.feature, array![0.5f32, 0.5]);

        assert_eq!(
            set.point_cluster,
            vec![Some(1), Some(1), Some(0), None, Some(0), Some(0)]
        );
    }

    #[test]
    fn test_class_vote_tie_prefers_smaller_class() {
        let set = frame().clusters(1).unwrap();
        let mut tied = frame();
        tied.classes = vec![7, 5, 2, 0, 3, 3];
        let tied_set = tied.clusters(1).unwrap();
        assert_eq!(set.clusters[1].class, 1);
        assert_eq!(tied_set.clusters[1].class, 5);
    }

    #[test]
    fn test_min_points_drops_small_clusters() {
        let set = frame().clusters(3).unwrap();
        assert_eq!(set.clusters.len(), 1);
        assert_eq!(set.point_cluster[0], None);
        assert_eq!(set.point_cluster[2], Some(0));
    }

    #[test]
    fn test_length_mismatch() {
        let mut bad = frame();
        bad.classes.pop();
        assert_eq!(
            bad.clusters(1).unwrap_err(),
            Error::LengthMismatch {
                field: "classes",
                expected: 6,
                found: 5
            }
        );
    }
}
