//! Traits for the semantic segmentation and clustering backends.

use nalgebra::Point3;
use ndarray::Array2;

/// Per-point output of the semantic network.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    /// Predicted semantic class per point.
    pub classes: Vec<u32>,
    /// Feature descriptor per point, one row each.
    pub features: Array2<f32>,
}

impl Embedding {
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// Semantic segmentation backend.
///
/// Implementations own their preprocessing (voxelization, cropping, neighbor
/// search) and must return exactly one class and one feature row per input
/// point.
///
/// # Example
///
/// ```ignore
/// use panoptrack::integration::{Embedder, Embedding};
///
/// struct MyNetwork {
///     // Your model here
/// }
///
/// impl Embedder for MyNetwork {
///     type Error = std::io::Error;
///
///     fn embed(&mut self, points: &[Point3<f32>]) -> Result<Embedding, Self::Error> {
///         // Run inference and return per-point classes and features
///     }
/// }
/// ```
pub trait Embedder {
    /// Error type for inference failures.
    type Error;

    fn embed(&mut self, points: &[Point3<f32>]) -> Result<Embedding, Self::Error>;
}

/// Per-frame spatial clustering backend.
///
/// Groups points sharing a semantic class into object candidates. Returns one
/// label per point, `None` for points that belong to no object.
pub trait Clusterer {
    /// Error type for clustering failures.
    type Error;

    fn cluster(
        &mut self,
        points: &[Point3<f32>],
        classes: &[u32],
    ) -> Result<Vec<Option<u32>>, Self::Error>;
}
