//! Temporal instance association for streaming 4D panoptic segmentation.
//!
//! Per-frame point clouds arrive already labeled by a semantic network and
//! grouped into object candidates by a clustering stage. This crate assigns
//! each candidate a temporally stable instance id: first against the previous
//! frame, then (optionally) against a cache of recently seen objects so that
//! identities survive occlusions and clustering gaps.
//!
//! The association engine lives in [`tracker`]; [`integration`] connects it to
//! external segmentation and clustering backends.

pub mod error;
pub mod integration;
pub mod tracker;

pub use error::{Error, Result};
pub use integration::{Clusterer, Embedder, FrameInput, PanopticPipeline, PipelineError};
pub use tracker::{
    AssociationMode, Cluster, FrameAssociationResult, FrameOutput, InstanceId, LabeledFrame,
    NO_INSTANCE, SceneId, TrackState, TrackerConfig,
};
