//! Avatar image normalization.
//!
//! Uploaded avatars are accepted in JPEG or PNG form, decoded, resized to a
//! fixed square raster and re-encoded as PNG, so the read endpoint can serve
//! one format regardless of what was uploaded.

use image::imageops::FilterType;
use image::ImageFormat;
use lazy_static::lazy_static;
use regex::Regex;
use std::io::Cursor;

use crate::error::AppError;

/// Edge length of the stored avatar raster.
pub const AVATAR_SIZE: u32 = 250;

/// Upload size ceiling, in bytes, enforced while the multipart stream is
/// still being read.
pub const MAX_AVATAR_BYTES: usize = 1_000_000;

lazy_static! {
    // Accepted upload filename extensions
    static ref IMAGE_EXTENSION: Regex = Regex::new(r"\.(jpg|jpeg|png)$").unwrap();
}

pub fn has_image_extension(filename: &str) -> bool {
    IMAGE_EXTENSION.is_match(filename)
}

/// Decodes an uploaded image and re-encodes it as a 250x250 PNG.
///
/// Bytes that do not decode as a supported image are a client error; a
/// failure to encode the resized raster is not.
pub fn normalize(data: &[u8]) -> Result<Vec<u8>, AppError> {
    let img = image::load_from_memory(data)
        .map_err(|e| AppError::BadRequest(format!("Unable to decode image: {}", e)))?;

    let img = img.resize_exact(AVATAR_SIZE, AVATAR_SIZE, FilterType::Triangle);

    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)
        .map_err(|e| AppError::InternalServerError(format!("Failed to encode avatar: {}", e)))?;

    Ok(out.into_inner())
}
