//! Shared application state threaded through every handler via [`axum::extract::State`].

use std::sync::Arc;

use imageflow_blobstore::S3BlobStore;
use imageflow_core::{orchestrator::Orchestrator, Config};
use imageflow_synth::ImageSynthesisPipeline;
use imageflow_vision::ChatVisionClient;

/// Concrete orchestrator wiring: the S3-compatible blob store, the
/// chat-completions vision/text client, and the Vertex-primary /
/// fal-fallback synthesis pipeline.
pub type PipelineOrchestrator = Orchestrator<S3BlobStore, ChatVisionClient, ImageSynthesisPipeline>;

pub struct AppState {
    pub config: Arc<Config>,
    pub orchestrator: Arc<PipelineOrchestrator>,
}
