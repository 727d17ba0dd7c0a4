//! PanopticPipeline for combining segmentation and clustering with association.

use std::time::{Duration, Instant};

use log::debug;
use nalgebra::{Matrix4, Point3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ego::transform_points;
use super::{Clusterer, Embedder};
use crate::error::Error;
use crate::tracker::{InstanceId, LabeledFrame, SceneId, TrackState, TrackerConfig};

/// One raw frame as delivered by the data source.
#[derive(Debug, Clone)]
pub struct FrameInput {
    /// Points in the sensor frame.
    pub points: Vec<Point3<f32>>,
    /// Sensor-to-world pose of this frame.
    pub ego: Matrix4<f32>,
    pub scene: SceneId,
    pub sample: String,
}

/// Per-point panoptic labels of one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PanopticOutput {
    pub sample: String,
    pub classes: Vec<u32>,
    pub instance_ids: Vec<InstanceId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub tracker: TrackerConfig,
    /// Log per-stage timings at debug level.
    pub verbose: bool,
}

/// Failure of one of the pipeline stages.
#[derive(Debug, Error)]
pub enum PipelineError<E, C> {
    #[error("semantic segmentation failed: {0}")]
    Embed(E),
    #[error("clustering failed: {0}")]
    Cluster(C),
    #[error(transparent)]
    Track(#[from] Error),
}

/// A combined pipeline that bundles segmentation, clustering and association.
///
/// Clustering runs on sensor-frame points; association on ego-compensated
/// points so that static objects keep their position across frames.
pub struct PanopticPipeline<E: Embedder, C: Clusterer> {
    embedder: E,
    clusterer: C,
    tracker: TrackState,
    verbose: bool,
}

impl<E: Embedder, C: Clusterer> PanopticPipeline<E, C> {
    /// Create a new pipeline with the given backends and configuration.
    pub fn new(embedder: E, clusterer: C, config: PipelineConfig) -> Result<Self, Error> {
        Ok(Self {
            embedder,
            clusterer,
            tracker: TrackState::new(config.tracker)?,
            verbose: config.verbose,
        })
    }

    /// Create a new pipeline with default configuration.
    pub fn with_default_config(embedder: E, clusterer: C) -> Result<Self, Error> {
        Self::new(embedder, clusterer, PipelineConfig::default())
    }

    /// Process a single frame and return per-point classes and instance ids.
    pub fn process_frame(
        &mut self,
        input: &FrameInput,
    ) -> Result<PanopticOutput, PipelineError<E::Error, C::Error>> {
        let start = Instant::now();

        let embedding = self
            .embedder
            .embed(&input.points)
            .map_err(PipelineError::Embed)?;
        let embedded = Instant::now();

        let labels = self
            .clusterer
            .cluster(&input.points, &embedding.classes)
            .map_err(PipelineError::Cluster)?;
        let clustered = Instant::now();

        let frame = LabeledFrame {
            scene: input.scene.clone(),
            sample: input.sample.clone(),
            positions: transform_points(&input.points, &input.ego),
            features: embedding.features,
            classes: embedding.classes,
            cluster_labels: labels,
        };
        let output = self.tracker.process_frame(&frame)?;
        let associated = Instant::now();

        if self.verbose {
            log_timings(
                &input.sample,
                embedded - start,
                clustered - embedded,
                associated - clustered,
            );
        }

        Ok(PanopticOutput {
            sample: output.sample,
            classes: frame.classes,
            instance_ids: output.instance_ids,
        })
    }

    /// Get a reference to the underlying tracker.
    pub fn tracker(&self) -> &TrackState {
        &self.tracker
    }

    /// Get a mutable reference to the underlying tracker.
    pub fn tracker_mut(&mut self) -> &mut TrackState {
        &mut self.tracker
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    pub fn clusterer(&self) -> &C {
        &self.clusterer
    }
}

fn log_timings(sample: &str, embed: Duration, cluster: Duration, associate: Duration) {
    debug!(
        "{sample}: total {:.3}s | segmentation {:.3}s | clustering {:.3}s | association {:.3}s",
        (embed + cluster + associate).as_secs_f64(),
        embed.as_secs_f64(),
        cluster.as_secs_f64(),
        associate.as_secs_f64(),
    );
}
