//! Domain types shared by the validator, the orchestrator, and the HTTP layer.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;

/// One of the ten aspect ratios the pipeline accepts on input.
///
/// Any value outside this enumeration is rejected by the validator at the
/// HTTP boundary; the synthesis client, by contrast, silently coerces an
/// unrecognized ratio to the default when speaking to the fallback provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema)]
pub enum AspectRatio {
    #[strum(serialize = "21:9")]
    #[serde(rename = "21:9")]
    R21x9,
    #[strum(serialize = "16:9")]
    #[serde(rename = "16:9")]
    R16x9,
    #[strum(serialize = "3:2")]
    #[serde(rename = "3:2")]
    R3x2,
    #[strum(serialize = "4:3")]
    #[serde(rename = "4:3")]
    R4x3,
    #[strum(serialize = "5:4")]
    #[serde(rename = "5:4")]
    R5x4,
    #[strum(serialize = "1:1")]
    #[serde(rename = "1:1")]
    R1x1,
    #[strum(serialize = "4:5")]
    #[serde(rename = "4:5")]
    R4x5,
    #[strum(serialize = "3:4")]
    #[serde(rename = "3:4")]
    R3x4,
    #[strum(serialize = "2:3")]
    #[serde(rename = "2:3")]
    R2x3,
    #[strum(serialize = "9:16")]
    #[serde(rename = "9:16")]
    R9x16,
}

impl Default for AspectRatio {
    fn default() -> Self {
        AspectRatio::R1x1
    }
}

/// A raw image payload together with its declared MIME type, as submitted
/// in a multipart field.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub mime: String,
}

/// A validated Pipeline Request, ready to be handed to the orchestrator.
///
/// Constructed only by the Request Validator; every field here has already
/// passed MIME, size, and aggregate-size checks.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub base_image: ImagePayload,
    pub reference_images: Vec<ImagePayload>,
    /// Already trimmed; `None` when the trimmed value was empty.
    pub user_instructions: Option<String>,
    pub aspect_ratio: AspectRatio,
}

/// An object durably written to the blob store.
#[derive(Debug, Clone)]
pub struct StoredAsset {
    pub key: String,
    pub public_url: String,
}

/// Which namespace an upload belongs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetPrefix {
    Inputs,
    Outputs,
}

impl AssetPrefix {
    pub fn as_str(self) -> &'static str {
        match self {
            AssetPrefix::Inputs => "inputs",
            AssetPrefix::Outputs => "outputs",
        }
    }
}

/// The structured result of a vision/text model call.
#[derive(Debug, Clone)]
pub struct PromptOutcome {
    /// May be empty or a refusal message.
    pub prompt: String,
    /// `true` iff the model actually produced a usable prompt.
    pub generated: bool,
}

/// Returned to the caller after a full or partial pipeline run.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PipelineResponse {
    pub base_image_url: String,
    pub base_image_key: String,
    pub reference_image_urls: Vec<String>,
    pub reference_image_keys: Vec<String>,
    pub prompt1: Option<String>,
    pub prompt2: Option<String>,
    pub output_image_url: Option<String>,
    pub output_image_key: Option<String>,
    pub step2_executed: bool,
    #[serde(rename = "isPromptGenerated")]
    pub prompt_generated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
