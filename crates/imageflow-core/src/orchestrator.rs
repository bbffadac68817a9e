//! Pipeline Orchestrator: wires the Validator's output through the Vision,
//! Apply-Instructions, and Synthesis stages, enforcing the strict
//! short-circuit semantics of the state machine:
//!
//! `Validating → UploadingInputs → Stage1 → (Stage2 | SkipStage2) → Stage3
//! → UploadingOutput → Done`, any state → `Failed<state>`.
//!
//! The Validator itself runs before this orchestrator is invoked (its
//! failures are HTTP 400s handled at the route layer). Everything from
//! `UploadingInputs` onward lives here.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::PipelineError;
use crate::models::{AssetPrefix, PipelineRequest, PipelineResponse};
use crate::traits::{BlobStore, SynthesisClient, VisionTextClient};

/// Minimum trimmed-prompt length below which a Prompt Outcome is treated as
/// a failure regardless of the model's own `generated` flag.
const MIN_PROMPT_LEN: usize = 3;

pub struct Orchestrator<B, V, S> {
    blob_store: Arc<B>,
    vision_client: Arc<V>,
    synth_client: Arc<S>,
    output_format: String,
}

impl<B, V, S> Orchestrator<B, V, S>
where
    B: BlobStore,
    V: VisionTextClient,
    S: SynthesisClient,
{
    pub fn new(blob_store: Arc<B>, vision_client: Arc<V>, synth_client: Arc<S>, output_format: String) -> Self {
        Self {
            blob_store,
            vision_client,
            synth_client,
            output_format,
        }
    }

    /// Run the full pipeline for a validated request.
    ///
    /// Returns `Err` only for the one step the spec treats as fully fatal
    /// (uploading the inputs); every other failure short-circuits into an
    /// `Ok(PipelineResponse)` carrying partial state and a populated
    /// `error` field, per spec.md §4.6 and §7.
    pub async fn run(&self, request: PipelineRequest) -> Result<PipelineResponse, PipelineError> {
        // Step 2: upload inputs. Base image first, then references, fanned
        // out concurrently. Any failure aborts with a fatal (5xx) error.
        let base_ext = mime_ext(&request.base_image.mime);
        let base_upload = self.blob_store.upload(
            request.base_image.bytes.clone(),
            &request.base_image.mime,
            AssetPrefix::Inputs.as_str(),
            Some(&base_ext),
        );

        let reference_uploads = request.reference_images.iter().map(|img| {
            let ext = mime_ext(&img.mime);
            self.blob_store
                .upload(img.bytes.clone(), &img.mime, AssetPrefix::Inputs.as_str(), Some(&ext))
        });

        let (base_asset, reference_assets) = tokio::try_join!(
            base_upload,
            futures::future::try_join_all(reference_uploads),
        )?;

        info!(key = %base_asset.key, "uploaded base image");

        let reference_image_urls: Vec<String> = reference_assets.iter().map(|a| a.public_url.clone()).collect();
        let reference_image_keys: Vec<String> = reference_assets.iter().map(|a| a.key.clone()).collect();

        let mut response = PipelineResponse {
            base_image_url: base_asset.public_url.clone(),
            base_image_key: base_asset.key.clone(),
            reference_image_urls,
            reference_image_keys,
            prompt1: None,
            prompt2: None,
            output_image_url: None,
            output_image_key: None,
            step2_executed: false,
            prompt_generated: false,
            error: None,
        };

        // Step 3: Stage 1 — reconstruct.
        let outcome = match self
            .vision_client
            .reconstruct_prompt(&request.base_image.bytes, &request.base_image.mime)
            .await
        {
            Ok(outcome) => outcome,
            Err(PipelineError::Transport(msg)) => {
                response.error = Some(msg);
                return Ok(response);
            }
            Err(e) => {
                response.error = Some(e.to_string());
                return Ok(response);
            }
        };

        let prompt1 = outcome.prompt.trim().to_owned();
        if !outcome.generated {
            response.prompt1 = Some(outcome.prompt);
            response.error = Some("the vision model declined to describe the image".into());
            return Ok(response);
        }
        if prompt1.len() < MIN_PROMPT_LEN {
            response.prompt1 = Some(prompt1);
            response.error = Some("invalid prompt: reconstruction was too short".into());
            return Ok(response);
        }
        response.prompt1 = Some(prompt1.clone());

        // Step 4: Stage 2 — apply instructions, iff present.
        let prompt2 = match &request.user_instructions {
            None => {
                response.prompt2 = response.prompt1.clone();
                response.step2_executed = false;
                prompt1.clone()
            }
            Some(instructions) => {
                response.step2_executed = true;
                let references: Vec<(Vec<u8>, String)> = request
                    .reference_images
                    .iter()
                    .map(|img| (img.bytes.clone(), img.mime.clone()))
                    .collect();

                let outcome = match self
                    .vision_client
                    .apply_instructions(&prompt1, instructions, &references)
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        response.error = Some(e.to_string());
                        return Ok(response);
                    }
                };

                let trimmed = outcome.prompt.trim().to_owned();
                if !outcome.generated {
                    response.prompt2 = Some(outcome.prompt);
                    response.error = Some("the vision model declined to apply instructions".into());
                    return Ok(response);
                }
                if trimmed.len() < MIN_PROMPT_LEN {
                    response.prompt2 = Some(trimmed);
                    response.error = Some("invalid prompt: edited prompt was too short".into());
                    return Ok(response);
                }
                response.prompt2 = Some(trimmed.clone());
                trimmed
            }
        };

        // Step 5: Stage 3 — synthesize.
        let image_bytes = match self.synth_client.generate(&prompt2, request.aspect_ratio).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "synthesis stage failed");
                response.prompt_generated = true;
                response.error = Some(e.to_string());
                return Ok(response);
            }
        };

        // Step 6: upload output.
        let output_mime = format!("image/{}", self.output_format);
        let output_asset = self
            .blob_store
            .upload(image_bytes, &output_mime, AssetPrefix::Outputs.as_str(), Some(&self.output_format))
            .await?;

        response.output_image_url = Some(output_asset.public_url);
        response.output_image_key = Some(output_asset.key);
        response.prompt_generated = true;

        info!(key = %response.output_image_key.as_deref().unwrap_or(""), "pipeline completed");
        Ok(response)
    }
}

/// Extension derived from a MIME type: the substring after `image/`.
fn mime_ext(mime: &str) -> String {
    mime.split('/').next_back().unwrap_or("bin").to_owned()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::models::{AspectRatio, ImagePayload, StoredAsset};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeBlobStore {
        calls: AtomicUsize,
    }

    impl BlobStore for FakeBlobStore {
        async fn upload(
            &self,
            _bytes: Vec<u8>,
            _mime: &str,
            prefix: &str,
            ext: Option<&str>,
        ) -> Result<StoredAsset, PipelineError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let ext = ext.unwrap_or("bin");
            let key = format!("internaluse/{prefix}/fake-{n}.{ext}");
            Ok(StoredAsset {
                public_url: format!("https://cdn.example.test/{key}"),
                key,
            })
        }
    }

    struct FakeVision {
        refuse_stage1: bool,
        refuse_stage2: bool,
    }

    impl VisionTextClient for FakeVision {
        async fn reconstruct_prompt(&self, _b: &[u8], _m: &str) -> Result<crate::models::PromptOutcome, PipelineError> {
            if self.refuse_stage1 {
                Ok(crate::models::PromptOutcome { prompt: "I'm sorry, I can't assist with that.".into(), generated: false })
            } else {
                Ok(crate::models::PromptOutcome { prompt: "a red mug on a wooden table".into(), generated: true })
            }
        }

        async fn apply_instructions(
            &self,
            base_prompt: &str,
            instructions: &str,
            _references: &[(Vec<u8>, String)],
        ) -> Result<crate::models::PromptOutcome, PipelineError> {
            if self.refuse_stage2 {
                Ok(crate::models::PromptOutcome { prompt: "cannot comply with that request".into(), generated: false })
            } else {
                Ok(crate::models::PromptOutcome {
                    prompt: format!("{base_prompt}, {instructions}"),
                    generated: true,
                })
            }
        }
    }

    struct FakeSynth;
    impl SynthesisClient for FakeSynth {
        async fn generate(&self, _prompt: &str, _ar: AspectRatio) -> Result<Vec<u8>, PipelineError> {
            Ok(vec![1, 2, 3, 4])
        }
    }

    fn req(instructions: Option<&str>) -> PipelineRequest {
        PipelineRequest {
            base_image: ImagePayload { bytes: vec![0; 10], mime: "image/png".into() },
            reference_images: vec![],
            user_instructions: instructions.map(str::to_owned),
            aspect_ratio: AspectRatio::R1x1,
        }
    }

    #[tokio::test]
    async fn s1_happy_path_without_instructions() {
        let orch = Orchestrator::new(
            Arc::new(FakeBlobStore { calls: AtomicUsize::new(0) }),
            Arc::new(FakeVision { refuse_stage1: false, refuse_stage2: false }),
            Arc::new(FakeSynth),
            "png".into(),
        );
        let resp = orch.run(req(None)).await.unwrap();
        assert!(!resp.step2_executed);
        assert_eq!(resp.prompt1, resp.prompt2);
        assert!(resp.output_image_url.is_some());
        assert!(resp.prompt_generated);
        assert!(resp.error.is_none());
    }

    #[tokio::test]
    async fn s2_happy_path_with_instructions() {
        let orch = Orchestrator::new(
            Arc::new(FakeBlobStore { calls: AtomicUsize::new(0) }),
            Arc::new(FakeVision { refuse_stage1: false, refuse_stage2: false }),
            Arc::new(FakeSynth),
            "png".into(),
        );
        let resp = orch.run(req(Some("move the cup to her right hand"))).await.unwrap();
        assert!(resp.step2_executed);
        assert_ne!(resp.prompt1, resp.prompt2);
        assert!(resp.output_image_url.is_some());
    }

    #[tokio::test]
    async fn s3_stage1_refusal_short_circuits() {
        let orch = Orchestrator::new(
            Arc::new(FakeBlobStore { calls: AtomicUsize::new(0) }),
            Arc::new(FakeVision { refuse_stage1: true, refuse_stage2: false }),
            Arc::new(FakeSynth),
            "png".into(),
        );
        let resp = orch.run(req(None)).await.unwrap();
        assert!(resp.prompt1.is_some());
        assert!(resp.prompt2.is_none());
        assert!(resp.output_image_url.is_none());
        assert!(resp.error.is_some());
        assert!(!resp.prompt_generated);
    }

    #[tokio::test]
    async fn s4_stage2_refusal_short_circuits() {
        let orch = Orchestrator::new(
            Arc::new(FakeBlobStore { calls: AtomicUsize::new(0) }),
            Arc::new(FakeVision { refuse_stage1: false, refuse_stage2: true }),
            Arc::new(FakeSynth),
            "png".into(),
        );
        let resp = orch.run(req(Some("change the background"))).await.unwrap();
        assert!(resp.prompt1.is_some());
        assert!(resp.prompt2.is_some());
        assert!(resp.output_image_url.is_none());
        assert!(resp.step2_executed);
    }
}
