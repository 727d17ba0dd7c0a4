//! Per-scene association state machine.

use std::collections::{BTreeSet, HashMap};

use log::{debug, info};

use crate::error::{Error, Result};
use crate::tracker::cluster::{Cluster, InstanceId, LabeledFrame, NO_INSTANCE, SceneId};
use crate::tracker::config::{AssociationMode, TrackerConfig};
use crate::tracker::frame_associator::{FrameAssociator, FrameMatches, TrackedCluster};
use crate::tracker::long_range::{LongRangeAssociator, NoRecovery, RecoveryStrategy};
use crate::tracker::object_cache::ObjectCache;

/// Lifecycle of a [`TrackState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackPhase {
    /// No frame has been processed yet
    #[default]
    Uninitialized,
    /// A scene is in progress
    Active,
}

/// How a cluster obtained its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOrigin {
    /// Inherited from a cluster of the previous frame
    PreviousFrame,
    /// Recovered from the object cache
    Cache,
    /// Freshly allocated
    New,
}

/// Ids assigned to the clusters of one frame, index-aligned with the input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameAssociationResult {
    pub ids: Vec<InstanceId>,
    pub origins: Vec<MatchOrigin>,
}

impl FrameAssociationResult {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn count(&self, origin: MatchOrigin) -> usize {
        self.origins.iter().filter(|&&o| o == origin).count()
    }
}

/// Point-level result of [`TrackState::process_frame`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameOutput {
    pub sample: String,
    /// One id per input point, [`NO_INSTANCE`] for unclustered points.
    pub instance_ids: Vec<InstanceId>,
    pub association: FrameAssociationResult,
}

/// Assigns temporally stable instance ids to clusters, frame after frame.
///
/// Frames must be fed in order. A frame whose scene token differs from the
/// active one starts a new scene: the cache and previous-frame context are
/// cleared before association.
pub struct TrackState {
    config: TrackerConfig,
    phase: TrackPhase,
    scene: Option<SceneId>,
    /// Index of the next frame within the active scene.
    frame_index: u64,
    previous: Vec<TrackedCluster>,
    cache: ObjectCache,
    frame_associator: FrameAssociator,
    long_range: LongRangeAssociator,
    feature_dim: Option<usize>,
    max_id: InstanceId,
}

impl TrackState {
    pub fn new(config: TrackerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            phase: TrackPhase::Uninitialized,
            scene: None,
            frame_index: 0,
            previous: Vec::new(),
            cache: ObjectCache::new(config.id_scope, config.cache.history_len),
            frame_associator: FrameAssociator::new(config.frame, config.solver),
            long_range: LongRangeAssociator::new(config.long_range, config.solver),
            feature_dim: None,
            max_id: 0,
            config,
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn phase(&self) -> TrackPhase {
        self.phase
    }

    pub fn scene(&self) -> Option<&SceneId> {
        self.scene.as_ref()
    }

    /// Frames committed in the active scene.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Largest id issued in the current id scope.
    pub fn max_id(&self) -> InstanceId {
        self.max_id
    }

    pub fn cache(&self) -> &ObjectCache {
        &self.cache
    }

    /// Clusters and ids of the last committed frame.
    pub fn previous(&self) -> &[TrackedCluster] {
        &self.previous
    }

    /// Reduce a labeled frame into clusters, associate them and map the ids
    /// back onto the points.
    pub fn process_frame(&mut self, frame: &LabeledFrame) -> Result<FrameOutput> {
        let set = frame.clusters(self.config.min_cluster_points)?;
        let association = self.associate(&frame.scene, &set.clusters)?;

        let instance_ids = set
            .point_cluster
            .iter()
            .map(|cluster| cluster.map_or(NO_INSTANCE, |c| association.ids[c]))
            .collect();

        Ok(FrameOutput {
            sample: frame.sample.clone(),
            instance_ids,
            association,
        })
    }

    /// Assign an id to every cluster of the next frame of `scene`.
    pub fn associate(
        &mut self,
        scene: &SceneId,
        clusters: &[Cluster],
    ) -> Result<FrameAssociationResult> {
        if self.scene.as_ref().map(|s| &s.token) != Some(&scene.token) {
            self.enter_scene(scene);
        }
        let frame = self.frame_index;

        if clusters.is_empty() {
            self.previous.clear();
            self.frame_index += 1;
            debug!("scene {} frame {frame}: no clusters", scene.name);
            return Ok(FrameAssociationResult::default());
        }

        let dim = self.check_feature_dim(clusters)?;

        let FrameMatches {
            mut assigned,
            unmatched,
        } = self.frame_associator.associate(&self.previous, clusters)?;
        let mut origins: Vec<Option<MatchOrigin>> = assigned
            .iter()
            .map(|id| id.map(|_| MatchOrigin::PreviousFrame))
            .collect();

        let claimed: BTreeSet<InstanceId> = assigned.iter().flatten().copied().collect();
        let recovered = self
            .recovery()
            .recover(&self.cache, clusters, &unmatched, &claimed, frame)?;
        for (icluster, id) in recovered {
            assigned[icluster] = Some(id);
            origins[icluster] = Some(MatchOrigin::Cache);
        }
        check_unique(&assigned)?;

        // Nothing below can fail; the frame is committed from here on
        let ids: Vec<InstanceId> = assigned
            .into_iter()
            .map(|id| id.unwrap_or_else(|| self.cache.allocate_id()))
            .collect();
        let origins: Vec<MatchOrigin> = origins
            .into_iter()
            .map(|o| o.unwrap_or(MatchOrigin::New))
            .collect();

        for (cluster, &id) in clusters.iter().zip(&ids) {
            self.cache.observe(id, cluster, frame);
        }
        let evicted = self.cache.evict_stale(frame, self.config.cache.max_age)
            + self.cache.enforce_capacity(self.config.cache.max_records);

        self.previous = clusters
            .iter()
            .zip(&ids)
            .map(|(cluster, &id)| TrackedCluster {
                id,
                cluster: cluster.clone(),
            })
            .collect();
        let frame_max = ids.iter().copied().max().unwrap_or(NO_INSTANCE);
        self.max_id = self.max_id.max(self.cache.max_id()).max(frame_max);
        self.feature_dim = Some(dim);
        self.frame_index += 1;

        let result = FrameAssociationResult { ids, origins };
        debug!(
            "scene {} frame {frame}: {} clusters, {} from previous frame, {} recovered, {} new, {} evicted, max id {}",
            scene.name,
            result.len(),
            result.count(MatchOrigin::PreviousFrame),
            result.count(MatchOrigin::Cache),
            result.count(MatchOrigin::New),
            evicted,
            self.max_id,
        );
        Ok(result)
    }

    fn recovery(&self) -> &dyn RecoveryStrategy {
        match self.config.mode {
            AssociationMode::Short => &NoRecovery,
            AssociationMode::Long => &self.long_range,
        }
    }

    fn enter_scene(&mut self, scene: &SceneId) {
        match &self.scene {
            Some(previous) => info!(
                "scene change {} -> {}, resetting association state",
                previous.name, scene.name
            ),
            None => info!("starting scene {}", scene.name),
        }
        self.cache.reset();
        self.previous.clear();
        self.frame_index = 0;
        self.feature_dim = None;
        self.max_id = self.cache.max_id();
        self.scene = Some(scene.clone());
        self.phase = TrackPhase::Active;
    }

    /// All clusters of a scene must share one feature dimension.
    fn check_feature_dim(&self, clusters: &[Cluster]) -> Result<usize> {
        let expected = self
            .feature_dim
            .unwrap_or_else(|| clusters[0].feature_dim());
        for cluster in clusters {
            if cluster.feature_dim() != expected {
                return Err(Error::FeatureDimension {
                    expected,
                    found: cluster.feature_dim(),
                });
            }
        }
        Ok(expected)
    }
}

fn check_unique(assigned: &[Option<InstanceId>]) -> Result<()> {
    let mut owners: HashMap<InstanceId, usize> = HashMap::new();
    for (index, id) in assigned.iter().enumerate() {
        let Some(id) = *id else {
            continue;
        };
        if let Some(&first) = owners.get(&id) {
            return Err(Error::AssignmentConflict {
                id,
                first,
                second: index,
            });
        }
        owners.insert(id, index);
    }
    Ok(())
}
