//! imageflow-server – entry point.
//!
//! Startup order:
//! 1. Parse configuration from environment variables.
//! 2. Initialise structured tracing (JSON in production, pretty in dev).
//! 3. Validate required credentials; fail fast if any are missing.
//! 4. Build the pipeline collaborators (blob store, vision client, synthesis client).
//! 5. Build the Axum router and start the HTTP server with graceful shutdown.

mod middleware;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use imageflow_blobstore::S3BlobStore;
use imageflow_core::models::AspectRatio;
use imageflow_core::{Config, Orchestrator};
use imageflow_synth::{FallbackImageClient, ImageSynthesisPipeline, VertexImagenClient};
use imageflow_vision::ChatVisionClient;
use std::str::FromStr;
use tracing::{info, warn};

use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Configuration ───────────────────────────────────────────────────
    let cfg = Config::from_env();

    // ── 2. Tracing ─────────────────────────────────────────────────────────
    let env_filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match cfg.log_level.parse::<tracing_subscriber::EnvFilter>() {
            Ok(f) => f,
            Err(e) => {
                eprintln!(
                    "WARN: IMAGEFLOW_LOG='{}' is not a valid tracing filter ({}); \
                     falling back to 'info'",
                    cfg.log_level, e
                );
                tracing_subscriber::EnvFilter::new("info")
            }
        },
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true);

    if cfg.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!(version = env!("CARGO_PKG_VERSION"), "imageflow-server starting");

    // ── 3. Required credentials ──────────────────────────────────────────────
    if let Err(missing) = cfg.validate_required() {
        anyhow::bail!("configuration error: {missing}");
    }

    // ── 4. Pipeline collaborators ─────────────────────────────────────────────
    let blob_store = Arc::new(S3BlobStore::new(
        &cfg.s3_endpoint_url,
        "auto",
        &cfg.s3_access_key,
        &cfg.s3_secret_key,
        &cfg.s3_bucket_name,
        &cfg.s3_folder,
        &cfg.s3_public_link,
    ));

    let vision_client = Arc::new(ChatVisionClient::new(
        "https://api.openai.com/v1",
        "gpt-4o",
        cfg.vision_model_api_key.clone(),
        cfg.system_prompt_image_understand.clone(),
        cfg.system_prompt_prompt_editor.clone(),
    ));

    let primary = VertexImagenClient::new(
        cfg.google_vertex_project_id.clone(),
        cfg.google_vertex_location.clone(),
        &cfg.google_application_credentials,
    )
    .await?;
    let fallback = FallbackImageClient::new(
        cfg.fal_gemini_endpoint.clone(),
        cfg.fal_gemini_model_id.clone(),
        cfg.fal_api_key.clone(),
        cfg.output_format.clone(),
    );
    let default_aspect_ratio = AspectRatio::from_str(&cfg.fal_gemini_aspect_ratio).unwrap_or_default();
    let synth_client = Arc::new(ImageSynthesisPipeline::new(primary, fallback, default_aspect_ratio));

    let orchestrator = Arc::new(Orchestrator::new(
        blob_store,
        vision_client,
        synth_client,
        cfg.output_format.clone(),
    ));

    info!("pipeline collaborators ready");

    // ── 5. Shared application state + HTTP server ─────────────────────────────
    let state = Arc::new(AppState {
        config: Arc::new(cfg.clone()),
        orchestrator,
    });

    let app = routes::build(Arc::clone(&state));
    let addr: SocketAddr = ([0, 0, 0, 0], cfg.port).into();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("imageflow-server stopped");
    Ok(())
}

/// Returns a future that resolves when SIGINT (Ctrl-C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received; starting graceful shutdown");
}
