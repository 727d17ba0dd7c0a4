//! Integration of the association engine with external backends.
//!
//! The semantic network and the per-frame clustering stage are black boxes
//! behind the [`Embedder`] and [`Clusterer`] traits; [`PanopticPipeline`]
//! chains them with ego-motion compensation and a [`TrackState`](crate::TrackState).

mod builder;
mod collaborator;
mod ego;
mod pipeline;

pub use builder::FrameBuilder;
pub use collaborator::{Clusterer, Embedder, Embedding};
pub use ego::transform_points;
pub use pipeline::{FrameInput, PanopticOutput, PanopticPipeline, PipelineConfig, PipelineError};

#[cfg(feature = "burn-backend")]
mod burn_backend;

#[cfg(feature = "burn-backend")]
pub use burn_backend::{BurnEmbedder, BurnEmbedderError, BurnSegmentationModel};
