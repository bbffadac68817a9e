//! `POST /api/image-flow` — the multipart entry point into the Pipeline
//! Orchestrator.

use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use imageflow_core::error::PipelineError;
use imageflow_core::models::ImagePayload;
use imageflow_core::validate::{self, RawPipelineRequest};
use tracing::{info, warn};
use utoipa::OpenApi;

use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(post_image_flow))]
pub struct ImageFlowApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api/image-flow", post(post_image_flow))
}

/// Validate, orchestrate, and respond with a Pipeline Response.
///
/// A 200 means the pipeline ran to full completion; a 502 means it
/// short-circuited after accepting the request (the JSON body's `error`
/// field, via [`imageflow_core::error::PipelineError::into_response`]'s
/// sibling path, carries the diagnostic). A 400 means validation rejected
/// the submission before anything was uploaded or called.
#[utoipa::path(
    post,
    path = "/api/image-flow",
    tag = "image-flow",
    responses(
        (status = 200, description = "Pipeline completed", body = imageflow_core::models::PipelineResponse),
        (status = 502, description = "Pipeline short-circuited"),
        (status = 400, description = "Validation error"),
    )
)]
pub async fn post_image_flow(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<axum::response::Response, PipelineError> {
    let mut base_image: Option<ImagePayload> = None;
    let mut reference_images = Vec::new();
    let mut user_prompt: Option<String> = None;
    let mut aspect_ratio: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| PipelineError::validation(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or("").to_owned();
        match name.as_str() {
            "baseImage" => {
                let mime = field.content_type().unwrap_or("application/octet-stream").to_owned();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| PipelineError::validation(format!("failed to read baseImage: {e}")))?;
                base_image = Some(ImagePayload { bytes: data.to_vec(), mime });
            }
            "referenceImages" => {
                let mime = field.content_type().unwrap_or("application/octet-stream").to_owned();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| PipelineError::validation(format!("failed to read referenceImages: {e}")))?;
                reference_images.push(ImagePayload { bytes: data.to_vec(), mime });
            }
            "userPrompt" => {
                user_prompt = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| PipelineError::validation(format!("failed to read userPrompt: {e}")))?,
                );
            }
            "aspectRatio" => {
                aspect_ratio = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| PipelineError::validation(format!("failed to read aspectRatio: {e}")))?,
                );
            }
            other => {
                warn!(field = other, "ignoring unrecognized multipart field");
            }
        }
    }

    let raw = RawPipelineRequest {
        base_image,
        reference_images,
        user_prompt,
        aspect_ratio,
    };

    let request = validate::validate(raw, state.config.max_reference_images)?;
    info!(aspect_ratio = %request.aspect_ratio, references = request.reference_images.len(), "validated image-flow request");

    let response = state.orchestrator.run(request).await?;

    let status = if response.error.is_none() {
        axum::http::StatusCode::OK
    } else {
        axum::http::StatusCode::BAD_GATEWAY
    };

    Ok((status, Json(response)).into_response())
}
