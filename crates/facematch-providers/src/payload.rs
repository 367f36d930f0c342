//! Image payload materialization and normalization.
//!
//! Providers accept images as remote URLs, `data:` URIs, inline bytes or
//! local paths; backends want a bounded-size byte payload. Everything that
//! can fail here surfaces as a [`ProviderError`] and soft-fails at the
//! engine boundary.

use std::time::Duration;

use base64::Engine;
use facematch_core::{ImageInput, ProviderError};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;

use crate::http::request_err;

/// Longest edge shipped to a backend. Phone uploads routinely exceed
/// vendor payload caps; anything larger is downscaled first.
const MAX_DIMENSION: u32 = 1280;
const JPEG_QUALITY: u8 = 85;

/// Materialize the raw bytes behind an image reference.
pub(crate) async fn load_bytes(
    client: &reqwest::Client,
    timeout: Duration,
    image: &ImageInput,
) -> Result<Vec<u8>, ProviderError> {
    match image {
        ImageInput::Inline(bytes) => Ok(bytes.clone()),
        ImageInput::DataUri(uri) => decode_data_uri(uri),
        ImageInput::Url(url) => {
            let resp = client
                .get(url)
                .timeout(timeout)
                .send()
                .await
                .map_err(request_err)?;
            if !resp.status().is_success() {
                return Err(ProviderError::Payload(format!(
                    "image fetch returned HTTP {}",
                    resp.status()
                )));
            }
            let bytes = resp.bytes().await.map_err(request_err)?;
            tracing::debug!(url = %url, len = bytes.len(), "fetched remote image");
            Ok(bytes.to_vec())
        }
        ImageInput::Path(path) => tokio::fs::read(path)
            .await
            .map_err(|e| ProviderError::Payload(format!("{}: {e}", path.display()))),
    }
}

pub(crate) fn decode_data_uri(uri: &str) -> Result<Vec<u8>, ProviderError> {
    let (_, payload) = uri
        .split_once(',')
        .ok_or_else(|| ProviderError::Payload("data URI has no payload".into()))?;
    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| ProviderError::Payload(format!("data URI base64: {e}")))
}

/// Downscale oversized images and re-encode as JPEG.
///
/// Payloads that do not decode locally are shipped unchanged; the backend
/// gets to make the final call on whether the bytes are an image.
pub(crate) fn normalize_jpeg(bytes: &[u8]) -> Vec<u8> {
    let Ok(img) = image::load_from_memory(bytes) else {
        tracing::debug!(len = bytes.len(), "payload not locally decodable; shipping as-is");
        return bytes.to_vec();
    };
    let img = if img.width().max(img.height()) > MAX_DIMENSION {
        img.resize(MAX_DIMENSION, MAX_DIMENSION, FilterType::Triangle)
    } else {
        img
    };
    let rgb = img.to_rgb8();
    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
    if encoder.encode_image(&rgb).is_err() {
        return bytes.to_vec();
    }
    out
}

/// Base64 form used in JSON request bodies.
pub(crate) fn to_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}
