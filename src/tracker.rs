mod cluster;
mod config;
mod frame_associator;
mod long_range;
mod matching;
mod object_cache;
mod spatial_index;
mod track_state;

pub use cluster::{Cluster, ClusterSet, InstanceId, LabeledFrame, NO_INSTANCE, SceneId};
pub use config::{
    AssignmentSolver, AssociationMode, CacheConfig, IdScope, LongRangeConfig, MatchConfig,
    TrackerConfig,
};
pub use frame_associator::{FrameAssociator, FrameMatches, TrackedCluster};
pub use long_range::{LongRangeAssociator, NoRecovery, RecoveryStrategy};
pub use matching::{AssignmentResult, cosine_distance, linear_assignment};
pub use object_cache::{ObjectCache, ObjectRecord};
pub use spatial_index::{Neighbor, SpatialIndex};
pub use track_state::{FrameAssociationResult, FrameOutput, MatchOrigin, TrackPhase, TrackState};
