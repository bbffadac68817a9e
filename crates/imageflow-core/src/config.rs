//! Pipeline configuration, loaded from environment variables at startup.

/// Runtime configuration for the image pipeline.
///
/// Every optional field has a documented default; required credentials
/// have no default and their absence is a fatal startup error (checked by
/// the caller via [`Config::validate_required`], not by this struct itself).
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP port to bind (default: `4000`).
    pub port: u16,

    /// API key for the vision/text model provider.
    pub vision_model_api_key: String,

    /// Primary image-synthesis provider: Google Cloud project id.
    pub google_vertex_project_id: String,

    /// Primary image-synthesis provider: Vertex AI region, e.g. `"us-central1"`.
    pub google_vertex_location: String,

    /// Path to a Google service-account credentials JSON file, resolved to
    /// an absolute path at startup.
    pub google_application_credentials: String,

    /// Fallback image-synthesis provider API key. Its absence is not a
    /// startup failure: the key is only needed if the primary provider's
    /// quota is exhausted, so absence is a lazy failure inside the client.
    pub fal_api_key: Option<String>,

    /// Fallback image-synthesis provider endpoint URL.
    pub fal_gemini_endpoint: String,

    /// Fallback image-synthesis provider model id.
    pub fal_gemini_model_id: String,

    /// Fallback image-synthesis provider default aspect ratio, used when
    /// the caller omitted one.
    pub fal_gemini_aspect_ratio: String,

    /// S3-compatible object store access key id.
    pub s3_access_key: String,

    /// S3-compatible object store secret access key.
    pub s3_secret_key: String,

    /// S3-compatible object store bucket name.
    pub s3_bucket_name: String,

    /// S3-compatible object store endpoint URL.
    pub s3_endpoint_url: String,

    /// Folder prefix under which objects are written (default `internaluse`).
    pub s3_folder: String,

    /// Public base URL used to resolve a key into a canonical URL.
    pub s3_public_link: String,

    /// Output image format requested from the synthesis provider, e.g. `"png"`.
    pub output_format: String,

    /// Maximum number of reference images accepted per request (default `2`).
    pub max_reference_images: usize,

    /// System prompt used by stage 1 (image reconstruction). Defaults to a
    /// built-in literal that must be preserved verbatim as it encodes part
    /// of the product's behavior contract.
    pub system_prompt_image_understand: String,

    /// System prompt used by stage 2 (instruction-guided rewriting). Same
    /// verbatim-default requirement as above.
    pub system_prompt_prompt_editor: String,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// When `true`, serve the Swagger UI at `/swagger-ui` and the OpenAPI
    /// spec at `/api-docs/openapi.json`.
    pub enable_swagger: bool,

    /// Comma-separated list of allowed CORS origins. `None` allows all
    /// origins (`*`), which is convenient for development but should be
    /// restricted in production.
    pub cors_allowed_origins: Option<String>,
}

const DEFAULT_SYSTEM_PROMPT_IMAGE_UNDERSTAND: &str = "Describe this marketing image in exhaustive, literal visual detail: composition, subjects, text overlays, color palette, lighting, and style. Do not interpret intent, only describe what is visible.";
const DEFAULT_SYSTEM_PROMPT_PROMPT_EDITOR: &str = "You rewrite image descriptions according to user instructions while preserving any detail the user did not ask to change.";

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults
    /// for everything that isn't a required credential.
    pub fn from_env() -> Self {
        Self {
            port: parse_env("PORT", 4000),
            vision_model_api_key: env_or("OPENAI_API_KEY", ""),
            google_vertex_project_id: env_or("GOOGLE_VERTEX_PROJECT_ID", ""),
            google_vertex_location: env_or("GOOGLE_VERTEX_LOCATION", "us-central1"),
            google_application_credentials: resolve_credentials_path(),
            fal_api_key: std::env::var("FAL_API_KEY").ok(),
            fal_gemini_endpoint: env_or(
                "FAL_GEMINI_ENDPOINT",
                "https://fal.run/fal-ai/gemini-25-flash-image",
            ),
            fal_gemini_model_id: env_or("FAL_GEMINI_MODEL_ID", "fal-ai/gemini-25-flash-image"),
            fal_gemini_aspect_ratio: env_or("FAL_GEMINI_ASPECT_RATIO", "1:1"),
            s3_access_key: env_or("S3_ACCESS_KEY", ""),
            s3_secret_key: env_or("S3_SECRET_KEY", ""),
            s3_bucket_name: env_or("S3_BUCKET_NAME", ""),
            s3_endpoint_url: env_or("S3_ENDPOINT_URL", ""),
            s3_folder: env_or("S3_FOLDER", "internaluse"),
            s3_public_link: env_or("S3_PUBLIC_LINK", ""),
            output_format: env_or("IMAGE_OUTPUT_FORMAT", "png"),
            max_reference_images: parse_env("MAX_REFERENCE_IMAGES", 2),
            system_prompt_image_understand: env_or(
                "SYSTEM_PROMPT_IMAGE_UNDERSTAND",
                DEFAULT_SYSTEM_PROMPT_IMAGE_UNDERSTAND,
            ),
            system_prompt_prompt_editor: env_or(
                "SYSTEM_PROMPT_PROMPT_EDITOR",
                DEFAULT_SYSTEM_PROMPT_PROMPT_EDITOR,
            ),
            log_level: env_or("IMAGEFLOW_LOG", "info"),
            log_json: std::env::var("IMAGEFLOW_LOG_JSON")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            enable_swagger: std::env::var("IMAGEFLOW_ENABLE_SWAGGER")
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .unwrap_or(true),
            cors_allowed_origins: std::env::var("IMAGEFLOW_CORS_ORIGINS").ok(),
        }
    }

    /// Validate that the credentials required for the happy path are present.
    ///
    /// The fallback provider's key is intentionally not checked here.
    pub fn validate_required(&self) -> Result<(), String> {
        let mut missing: Vec<String> = Vec::new();
        if self.vision_model_api_key.is_empty() {
            missing.push("OPENAI_API_KEY".to_owned());
        }
        if self.google_vertex_project_id.is_empty() {
            missing.push("GOOGLE_VERTEX_PROJECT_ID".to_owned());
        }
        if self.google_application_credentials.is_empty() {
            missing.push("GOOGLE_APPLICATION_CREDENTIALS".to_owned());
        } else if !std::path::Path::new(&self.google_application_credentials).is_file() {
            missing.push(format!(
                "GOOGLE_APPLICATION_CREDENTIALS (no such file: {})",
                self.google_application_credentials
            ));
        }
        if self.s3_endpoint_url.is_empty() {
            missing.push("S3_ENDPOINT_URL".to_owned());
        }
        if self.s3_bucket_name.is_empty() {
            missing.push("S3_BUCKET_NAME".to_owned());
        }
        if self.s3_access_key.is_empty() {
            missing.push("S3_ACCESS_KEY".to_owned());
        }
        if self.s3_secret_key.is_empty() {
            missing.push("S3_SECRET_KEY".to_owned());
        }
        if self.s3_public_link.is_empty() {
            missing.push("S3_PUBLIC_LINK".to_owned());
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            ))
        }
    }
}

/// Resolve `GOOGLE_APPLICATION_CREDENTIALS` to an absolute path at startup,
/// independent of the working directory the server was launched from. The
/// resolved (or, if canonicalization fails, original) value is what gets
/// handed to `VertexImagenClient::new` — `validate_required` is what turns
/// an unresolvable path into a fatal startup error; this function itself
/// never fails.
fn resolve_credentials_path() -> String {
    let raw = env_or("GOOGLE_APPLICATION_CREDENTIALS", "");
    if raw.is_empty() {
        return raw;
    }
    std::fs::canonicalize(&raw)
        .map(|abs| abs.to_string_lossy().into_owned())
        .unwrap_or(raw)
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn validate_required_reports_all_missing() {
        let cfg = Config {
            vision_model_api_key: String::new(),
            google_vertex_project_id: String::new(),
            s3_endpoint_url: String::new(),
            s3_bucket_name: String::new(),
            s3_access_key: String::new(),
            s3_secret_key: String::new(),
            s3_public_link: String::new(),
            ..Config::from_env()
        };
        let err = cfg.validate_required().unwrap_err();
        assert!(err.contains("OPENAI_API_KEY"));
        assert!(err.contains("S3_BUCKET_NAME"));
    }

    #[test]
    fn defaults_match_documented_values() {
        std::env::remove_var("PORT");
        std::env::remove_var("MAX_REFERENCE_IMAGES");
        let cfg = Config::from_env();
        assert_eq!(cfg.port, 4000);
        assert_eq!(cfg.max_reference_images, 2);
        assert_eq!(cfg.s3_folder, "internaluse");
    }
}
