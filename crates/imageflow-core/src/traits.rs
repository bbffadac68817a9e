//! Collaborator interfaces used by the [`crate::orchestrator::Orchestrator`].
//!
//! All trait methods use `impl Future` in their signatures (stable since
//! Rust 1.75) so no extra `async-trait` crate is required. Concrete
//! implementations live in sibling crates (`imageflow-blobstore`,
//! `imageflow-vision`, `imageflow-synth`) so that `imageflow-core` has no
//! dependency on any particular HTTP provider or storage SDK.

use crate::error::PipelineError;
use crate::models::{AspectRatio, PromptOutcome, StoredAsset};

/// Uploads raw bytes to an S3-compatible bucket under a namespaced key.
pub trait BlobStore: Send + Sync + 'static {
    /// `prefix` is `"inputs"` or `"outputs"`. `ext` defaults to the
    /// substring after `image/` in `mime` when absent.
    fn upload(
        &self,
        bytes: Vec<u8>,
        mime: &str,
        prefix: &str,
        ext: Option<&str>,
    ) -> impl std::future::Future<Output = Result<StoredAsset, PipelineError>> + Send;
}

/// Reconstructs and rewrites textual prompts from images and instructions.
pub trait VisionTextClient: Send + Sync + 'static {
    /// Reconstruct a detailed description of an image.
    fn reconstruct_prompt(
        &self,
        image_bytes: &[u8],
        mime: &str,
    ) -> impl std::future::Future<Output = Result<PromptOutcome, PipelineError>> + Send;

    /// Rewrite `base_prompt` according to `instructions`, optionally
    /// grounded by `references` (each an image payload with MIME type).
    fn apply_instructions(
        &self,
        base_prompt: &str,
        instructions: &str,
        references: &[(Vec<u8>, String)],
    ) -> impl std::future::Future<Output = Result<PromptOutcome, PipelineError>> + Send;
}

/// Generates an image from text, with automatic provider fallback.
pub trait SynthesisClient: Send + Sync + 'static {
    fn generate(
        &self,
        prompt: &str,
        aspect_ratio: AspectRatio,
    ) -> impl std::future::Future<Output = Result<Vec<u8>, PipelineError>> + Send;
}
