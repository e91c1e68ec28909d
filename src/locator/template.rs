// Template image references recorded with a step: local paths or inline data URIs.
use std::path::Path;

use base64::Engine as _;
use image::DynamicImage;

use crate::errors::{ReplayError, ReplayResult};

/// Load the image a step refers to.
///
/// Accepts a filesystem path or a `data:image/...;base64,` URI. Remote
/// object-store or HTTP references are reported as unavailable.
pub fn load_template(reference: &str) -> ReplayResult<DynamicImage> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(ReplayError::TemplateUnavailable("empty template reference".into()));
    }

    if let Some(rest) = reference.strip_prefix("data:") {
        return decode_data_uri(rest);
    }

    if let Some((scheme, _)) = reference.split_once("://") {
        if scheme != "file" {
            return Err(ReplayError::TemplateUnavailable(format!(
                "unsupported template scheme '{scheme}': {reference}"
            )));
        }
    }

    let path = reference.strip_prefix("file://").unwrap_or(reference);
    if !Path::new(path).exists() {
        return Err(ReplayError::TemplateUnavailable(format!("file not found: {path}")));
    }
    image::open(path)
        .map_err(|e| ReplayError::TemplateUnavailable(format!("{path}: {e}")))
}

fn decode_data_uri(rest: &str) -> ReplayResult<DynamicImage> {
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| ReplayError::TemplateUnavailable("malformed data URI".into()))?;
    if !meta.ends_with(";base64") {
        return Err(ReplayError::TemplateUnavailable(format!(
            "data URI must be base64 encoded, got '{meta}'"
        )));
    }
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| ReplayError::TemplateUnavailable(format!("data URI decode: {e}")))?;
    image::load_from_memory(&bytes)
        .map_err(|e| ReplayError::TemplateUnavailable(format!("data URI image: {e}")))
}
