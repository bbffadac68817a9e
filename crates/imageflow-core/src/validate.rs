//! Request Validator: turns raw multipart fields into a validated
//! [`PipelineRequest`] or a structured rejection.

use std::str::FromStr;

use image::ImageFormat;

use crate::error::{PipelineError, ValidationIssue};
use crate::models::{AspectRatio, ImagePayload, PipelineRequest};

/// Per-file size ceiling (50 MB), per spec.md §4.1.
pub const MAX_FILE_BYTES: usize = 50 * 1024 * 1024;
/// Aggregate ceiling across base + reference images combined (50 MB).
pub const MAX_AGGREGATE_BYTES: usize = 50 * 1024 * 1024;

const ACCEPTED_FORMATS: &[ImageFormat] = &[
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::WebP,
    ImageFormat::Gif,
];

/// Raw, not-yet-validated multipart fields.
pub struct RawPipelineRequest {
    pub base_image: Option<ImagePayload>,
    pub reference_images: Vec<ImagePayload>,
    pub user_prompt: Option<String>,
    pub aspect_ratio: Option<String>,
}

/// Validate a raw multipart submission into a [`PipelineRequest`].
///
/// `max_reference_images` is the configured ceiling; this check is the
/// validator's "soft" enforcement layer — the multipart parser at the HTTP
/// boundary may also reject earlier with a less structured error, per
/// spec.md §9.
///
/// Every field-level problem is collected into a single
/// [`PipelineError::Validation`] so the caller gets the full `issues` list
/// in one round trip rather than one-field-at-a-time rejections.
pub fn validate(
    raw: RawPipelineRequest,
    max_reference_images: usize,
) -> Result<PipelineRequest, PipelineError> {
    let mut issues: Vec<ValidationIssue> = Vec::new();

    if raw.base_image.is_none() {
        issues.push(ValidationIssue {
            field: "baseImage".into(),
            message: "is required".into(),
        });
    }

    if raw.reference_images.len() > max_reference_images {
        issues.push(ValidationIssue {
            field: "referenceImages".into(),
            message: format!(
                "got {}, max {max_reference_images}",
                raw.reference_images.len()
            ),
        });
    }

    if let Some(base_image) = &raw.base_image {
        validate_image("baseImage", base_image, &mut issues);
    }
    for (idx, img) in raw.reference_images.iter().enumerate() {
        validate_image(&format!("referenceImages[{idx}]"), img, &mut issues);
    }

    let aggregate: usize = raw.base_image.as_ref().map(|i| i.bytes.len()).unwrap_or(0)
        + raw.reference_images.iter().map(|i| i.bytes.len()).sum::<usize>();
    if aggregate > MAX_AGGREGATE_BYTES {
        issues.push(ValidationIssue {
            field: "baseImage+referenceImages".into(),
            message: format!(
                "aggregate payload size {aggregate} bytes exceeds the {MAX_AGGREGATE_BYTES}-byte ceiling"
            ),
        });
    }

    let aspect_ratio = match raw.aspect_ratio.as_deref().map(str::trim) {
        None | Some("") => Some(AspectRatio::default()),
        Some(s) => match AspectRatio::from_str(s) {
            Ok(ratio) => Some(ratio),
            Err(_) => {
                issues.push(ValidationIssue {
                    field: "aspectRatio".into(),
                    message: format!("unsupported aspectRatio: {s}"),
                });
                None
            }
        },
    };

    if !issues.is_empty() {
        return Err(PipelineError::validation_issues(issues));
    }

    Ok(PipelineRequest {
        base_image: raw.base_image.expect("checked above"),
        reference_images: raw.reference_images,
        user_instructions: raw
            .user_prompt
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned),
        aspect_ratio: aspect_ratio.expect("checked above"),
    })
}

/// Sniff the actual image format from the byte content (not the
/// client-declared MIME type) and reject anything unsupported or
/// unrecognizable, appending to `issues` rather than failing fast.
fn validate_image(field: &str, img: &ImagePayload, issues: &mut Vec<ValidationIssue>) {
    match image::guess_format(&img.bytes) {
        Ok(format) if ACCEPTED_FORMATS.contains(&format) => {}
        Ok(format) => issues.push(ValidationIssue {
            field: field.into(),
            message: format!("detected image format {format:?} is not supported"),
        }),
        Err(_) => issues.push(ValidationIssue {
            field: field.into(),
            message: "could not recognize image data (unsupported or corrupt file)".into(),
        }),
    }

    if img.bytes.len() > MAX_FILE_BYTES {
        issues.push(ValidationIssue {
            field: field.into(),
            message: format!(
                "size {} bytes exceeds the {MAX_FILE_BYTES}-byte per-file ceiling",
                img.bytes.len()
            ),
        });
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
    const BMP_MAGIC: &[u8] = &[b'B', b'M'];

    /// A byte buffer that `image::guess_format` recognizes as `format`,
    /// padded to at least `len` bytes.
    fn image_bytes(magic: &[u8], len: usize) -> ImagePayload {
        let mut bytes = magic.to_vec();
        bytes.resize(len.max(magic.len()), 0u8);
        ImagePayload {
            bytes,
            mime: "image/png".into(),
        }
    }

    fn png(len: usize) -> ImagePayload {
        image_bytes(PNG_MAGIC, len)
    }

    fn raw(base: Option<ImagePayload>, refs: Vec<ImagePayload>) -> RawPipelineRequest {
        RawPipelineRequest {
            base_image: base,
            reference_images: refs,
            user_prompt: None,
            aspect_ratio: None,
        }
    }

    #[test]
    fn missing_base_image_is_rejected() {
        let err = validate(raw(None, vec![]), 2).unwrap_err();
        assert!(matches!(err, PipelineError::Validation { .. }));
    }

    #[test]
    fn unrecognized_format_is_rejected() {
        let req = raw(Some(image_bytes(BMP_MAGIC, 10)), vec![]);
        let err = validate(req, 2).unwrap_err();
        match err {
            PipelineError::Validation { issues, .. } => {
                assert!(issues.iter().any(|i| i.field == "baseImage"));
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn oversize_file_is_rejected() {
        let req = raw(Some(png(MAX_FILE_BYTES + 1)), vec![]);
        let err = validate(req, 2).unwrap_err();
        match err {
            PipelineError::Validation { issues, .. } => {
                assert!(issues.iter().any(|i| i.message.contains("per-file")));
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn oversize_aggregate_is_rejected() {
        let req = raw(Some(png(MAX_FILE_BYTES)), vec![png(1)]);
        let err = validate(req, 2).unwrap_err();
        match err {
            PipelineError::Validation { issues, .. } => {
                assert!(issues.iter().any(|i| i.message.contains("aggregate")));
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn too_many_reference_images_is_rejected() {
        let req = raw(Some(png(10)), vec![png(10), png(10), png(10)]);
        let err = validate(req, 2).unwrap_err();
        match err {
            PipelineError::Validation { issues, .. } => {
                assert!(issues.iter().any(|i| i.field == "referenceImages"));
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn unknown_aspect_ratio_is_rejected() {
        let mut req = raw(Some(png(10)), vec![]);
        req.aspect_ratio = Some("auto".into());
        let err = validate(req, 2).unwrap_err();
        match err {
            PipelineError::Validation { issues, .. } => {
                assert!(issues.iter().any(|i| i.field == "aspectRatio"));
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn whitespace_only_prompt_is_treated_as_absent() {
        let mut req = raw(Some(png(10)), vec![]);
        req.user_prompt = Some("   ".into());
        let validated = validate(req, 2).unwrap();
        assert_eq!(validated.user_instructions, None);
    }

    #[test]
    fn default_aspect_ratio_is_one_to_one() {
        let req = raw(Some(png(10)), vec![]);
        let validated = validate(req, 2).unwrap();
        assert_eq!(validated.aspect_ratio, AspectRatio::R1x1);
    }

    #[test]
    fn multiple_problems_are_all_reported() {
        let mut req = raw(None, vec![png(10), png(10), png(10)]);
        req.aspect_ratio = Some("auto".into());
        let err = validate(req, 2).unwrap_err();
        match err {
            PipelineError::Validation { issues, .. } => {
                let fields: Vec<&str> = issues.iter().map(|i| i.field.as_str()).collect();
                assert!(fields.contains(&"baseImage"));
                assert!(fields.contains(&"referenceImages"));
                assert!(fields.contains(&"aspectRatio"));
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn boundary_fifty_mb_base_image_alone_succeeds() {
        let req = raw(Some(png(MAX_FILE_BYTES)), vec![]);
        assert!(validate(req, 2).is_ok());
    }
}
