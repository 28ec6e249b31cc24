//! Image encoding for transport to the model.
//!
//! Images reach us either as raw upload bytes with a Content-Type, or as the `data:` URL a browser
//! `FileReader` produces. Both end up as an `EncodedImage` (bare base64 + MIME type).

use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;

use crate::domain::EncodedImage;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImageError {
  #[error("image payload is empty")]
  Empty,
  #[error("unsupported image type: {0}")]
  UnsupportedMime(String),
  #[error("malformed data URL")]
  MalformedDataUrl,
  #[error("image payload is not valid base64")]
  InvalidBase64,
  #[error("image is {size} bytes; the limit is {max}")]
  TooLarge { size: usize, max: usize },
}

/// Reject images whose decoded size exceeds `max` bytes.
pub fn ensure_size(size: usize, max: usize) -> Result<(), ImageError> {
  if size > max {
    return Err(ImageError::TooLarge { size, max });
  }
  Ok(())
}

/// Lower-case the type and drop parameters (`image/JPEG; q=1` -> `image/jpeg`).
fn normalize_mime(raw: &str) -> Result<String, ImageError> {
  let mime = raw.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
  match mime.strip_prefix("image/") {
    Some(sub) if !sub.is_empty() => Ok(mime),
    _ => Err(ImageError::UnsupportedMime(raw.trim().to_string())),
  }
}

/// Encode raw image bytes.
pub fn encode_bytes(bytes: &[u8], mime_type: &str) -> Result<EncodedImage, ImageError> {
  if bytes.is_empty() {
    return Err(ImageError::Empty);
  }
  let mime_type = normalize_mime(mime_type)?;
  Ok(EncodedImage { data: STANDARD.encode(bytes), mime_type })
}

/// Parse `data:<mime>;base64,<payload>`. The payload after the first comma is kept as is.
pub fn from_data_url(url: &str) -> Result<EncodedImage, ImageError> {
  let rest = url.trim().strip_prefix("data:").ok_or(ImageError::MalformedDataUrl)?;
  let (header, payload) = rest.split_once(',').ok_or(ImageError::MalformedDataUrl)?;
  let mime = header.strip_suffix(";base64").ok_or(ImageError::MalformedDataUrl)?;
  let mime_type = normalize_mime(mime)?;

  if payload.is_empty() {
    return Err(ImageError::Empty);
  }
  STANDARD.decode(payload).map_err(|_| ImageError::InvalidBase64)?;

  Ok(EncodedImage { data: payload.to_string(), mime_type })
}
