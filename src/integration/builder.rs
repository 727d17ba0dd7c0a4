//! Builder for assembling a [`LabeledFrame`] point by point.

use nalgebra::Point3;
use ndarray::Array2;

use crate::error::{Error, Result};
use crate::tracker::{LabeledFrame, SceneId};

/// Builder for creating a `LabeledFrame` from individual points.
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    scene: SceneId,
    sample: String,
    positions: Vec<Point3<f32>>,
    features: Vec<f32>,
    feature_dim: Option<usize>,
    /// Feature length of the first point that disagreed with `feature_dim`.
    ragged: Option<usize>,
    classes: Vec<u32>,
    cluster_labels: Vec<Option<u32>>,
}

impl FrameBuilder {
    /// Create a new builder for a frame of `scene`.
    pub fn new(scene: SceneId) -> Self {
        Self {
            scene,
            sample: String::new(),
            positions: Vec::new(),
            features: Vec::new(),
            feature_dim: None,
            ragged: None,
            classes: Vec::new(),
            cluster_labels: Vec::new(),
        }
    }

    /// Set the sample identifier.
    pub fn sample(mut self, sample: impl Into<String>) -> Self {
        self.sample = sample.into();
        self
    }

    /// Add a point belonging to cluster `label`.
    pub fn point(self, position: [f32; 3], class: u32, feature: &[f32], label: u32) -> Self {
        self.push(position, class, feature, Some(label))
    }

    /// Add a point that belongs to no cluster.
    pub fn background(self, position: [f32; 3], class: u32, feature: &[f32]) -> Self {
        self.push(position, class, feature, None)
    }

    fn push(mut self, position: [f32; 3], class: u32, feature: &[f32], label: Option<u32>) -> Self {
        self.positions.push(Point3::from(position));
        let dim = *self.feature_dim.get_or_insert(feature.len());
        if dim != feature.len() && self.ragged.is_none() {
            self.ragged = Some(feature.len());
        }
        self.features.extend_from_slice(feature);
        self.classes.push(class);
        self.cluster_labels.push(label);
        self
    }

    /// Build the final `LabeledFrame`.
    ///
    /// Fails if points were given features of different lengths.
    pub fn build(self) -> Result<LabeledFrame> {
        let rows = self.positions.len();
        let dim = self.feature_dim.unwrap_or(0);
        if let Some(found) = self.ragged {
            return Err(Error::FeatureDimension {
                expected: dim,
                found,
            });
        }
        let found = self.features.len();
        let features = Array2::from_shape_vec((rows, dim), self.features).map_err(|_| {
            Error::LengthMismatch {
                field: "features",
                expected: rows * dim,
                found,
            }
        })?;

        Ok(LabeledFrame {
            scene: self.scene,
            sample: self.sample,
            positions: self.positions,
            features,
            classes: self.classes,
            cluster_labels: self.cluster_labels,
        })
    }
}
