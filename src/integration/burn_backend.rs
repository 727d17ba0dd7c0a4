//! Burn inference backend for the semantic segmentation network.
//!
//! This module provides a `BurnEmbedder` that implements `Embedder` for
//! segmentation models built with the Burn framework.
//!
//! # Example
//!
//! ```ignore
//! use panoptrack::integration::{BurnEmbedder, BurnSegmentationModel};
//! use burn::backend::NdArray;
//!
//! // Implement BurnSegmentationModel for your network
//! struct MyPointNetwork { /* ... */ }
//!
//! impl BurnSegmentationModel<NdArray> for MyPointNetwork {
//!     fn forward(&self, points: Tensor<NdArray, 3>) -> (Tensor<NdArray, 3>, Tensor<NdArray, 3>) {
//!         // Run inference
//!     }
//! }
//!
//! let model = MyPointNetwork::load("model.bin");
//! let embedder = BurnEmbedder::new(model, Default::default());
//! ```

use burn::prelude::*;
use burn::tensor::Tensor;
use nalgebra::Point3;
use ndarray::Array2;
use thiserror::Error;

use super::{Embedder, Embedding};

/// Error type for Burn inference failures.
#[derive(Debug, Clone, Error)]
pub enum BurnEmbedderError {
    /// The model returned a tensor of unexpected shape.
    #[error("unexpected {tensor} shape: expected {expected:?}, got {got:?}")]
    InvalidOutputShape {
        tensor: &'static str,
        expected: [usize; 3],
        got: [usize; 3],
    },
    /// Reading the model output back to the host failed.
    #[error("postprocessing error: {0}")]
    PostprocessingError(String),
}

/// Trait for Burn-based point segmentation models.
///
/// Implement this trait for your specific model architecture.
pub trait BurnSegmentationModel<B: Backend>: Send + Sync {
    /// Run forward pass on the input points.
    ///
    /// # Arguments
    /// * `points` - Input tensor of shape [1, 3, num_points]
    ///
    /// # Returns
    /// Class logits of shape [1, num_classes, num_points] and point features
    /// of shape [1, channels, num_points].
    fn forward(&self, points: Tensor<B, 3>) -> (Tensor<B, 3>, Tensor<B, 3>);
}

/// Burn-based segmentation network implementing `Embedder`.
pub struct BurnEmbedder<B: Backend, M: BurnSegmentationModel<B>> {
    model: M,
    device: B::Device,
}

impl<B: Backend, M: BurnSegmentationModel<B>> BurnEmbedder<B, M> {
    /// Create a new embedder with the given model and device.
    pub fn new(model: M, device: B::Device) -> Self {
        Self { model, device }
    }

    /// Pack points into a [1, 3, N] tensor.
    pub fn preprocess(&self, points: &[Point3<f32>]) -> Tensor<B, 3> {
        let n = points.len();
        let mut data = vec![0.0f32; 3 * n];
        for (i, p) in points.iter().enumerate() {
            data[i] = p.x;
            data[n + i] = p.y;
            data[2 * n + i] = p.z;
        }
        Tensor::<B, 1>::from_floats(data.as_slice(), &self.device).reshape([1, 3, n])
    }

    /// Convert logits and features into per-point classes and feature rows.
    fn postprocess(
        &self,
        logits: Tensor<B, 3>,
        tokens: Tensor<B, 3>,
        num_points: usize,
    ) -> Result<Embedding, BurnEmbedderError> {
        let [batch, num_classes, n] = logits.dims();
        if batch != 1 || n != num_points {
            return Err(BurnEmbedderError::InvalidOutputShape {
                tensor: "logits",
                expected: [1, num_classes, num_points],
                got: logits.dims(),
            });
        }
        let [batch, channels, n] = tokens.dims();
        if batch != 1 || n != num_points {
            return Err(BurnEmbedderError::InvalidOutputShape {
                tensor: "features",
                expected: [1, channels, num_points],
                got: tokens.dims(),
            });
        }

        let classes = logits
            .argmax(1)
            .into_data()
            .convert::<i64>()
            .to_vec::<i64>()
            .map_err(|e| BurnEmbedderError::PostprocessingError(format!("{e:?}")))?
            .into_iter()
            .map(|c| c.max(0) as u32)
            .collect();

        // [1, C, N] -> [N, C]
        let features = tokens
            .reshape([channels, num_points])
            .transpose()
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| BurnEmbedderError::PostprocessingError(format!("{e:?}")))?;
        let features = Array2::from_shape_vec((num_points, channels), features)
            .map_err(|e| BurnEmbedderError::PostprocessingError(e.to_string()))?;

        Ok(Embedding { classes, features })
    }
}

impl<B: Backend, M: BurnSegmentationModel<B>> Embedder for BurnEmbedder<B, M> {
    type Error = BurnEmbedderError;

    fn embed(&mut self, points: &[Point3<f32>]) -> Result<Embedding, Self::Error> {
        let input = self.preprocess(points);
        let (logits, tokens) = self.model.forward(input);
        self.postprocess(logits, tokens, points.len())
    }
}
