/// Photo normalization: bounded resize + JPEG re-encode
///
/// Every photo attached to a project goes through [`ImageCodec::normalize`]
/// before it is stored, so the catalog never holds camera-sized originals.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{imageops::FilterType, DynamicImage, ImageDecoder, ImageError, ImageReader};
use log::debug;
use serde::{Deserialize, Serialize};

use super::source::{data_url, RawImage};
use crate::error::{CatalogError, CatalogResult};

/// Default bounding box for stored photos
pub const DEFAULT_MAX_WIDTH: u32 = 800;
pub const DEFAULT_MAX_HEIGHT: u32 = 800;
/// Default JPEG quality (0.0 - 1.0)
pub const DEFAULT_QUALITY: f32 = 0.7;

/// Media type of every normalized payload
pub const OUTPUT_MEDIA_TYPE: &str = "image/jpeg";

/// Resize bounds and encoder quality
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageLimits {
    pub max_width: u32,
    pub max_height: u32,
    /// Lossy quality in (0.0, 1.0]
    pub quality: f32,
}

impl Default for ImageLimits {
    fn default() -> Self {
        Self {
            max_width: DEFAULT_MAX_WIDTH,
            max_height: DEFAULT_MAX_HEIGHT,
            quality: DEFAULT_QUALITY,
        }
    }
}

impl ImageLimits {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_width == 0 || self.max_height == 0 {
            return Err("image bounds must be non-zero".to_string());
        }
        if !(self.quality > 0.0 && self.quality <= 1.0) {
            return Err(format!("image quality {} is outside (0, 1]", self.quality));
        }
        Ok(())
    }

    /// Quality as the 1-100 scale the JPEG encoder expects
    pub fn jpeg_quality(&self) -> u8 {
        (self.quality * 100.0).round().clamp(1.0, 100.0) as u8
    }
}

/// Output of the pipeline: a JPEG payload and its pixel size
#[derive(Clone, PartialEq, Eq)]
pub struct CompressedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl CompressedImage {
    pub fn media_type(&self) -> &'static str {
        OUTPUT_MEDIA_TYPE
    }

    /// Displayable form of the payload.
    ///
    /// The inline backend stores exactly this string, so what the user
    /// previewed is what gets persisted.
    pub fn to_data_url(&self) -> String {
        data_url(OUTPUT_MEDIA_TYPE, &self.bytes)
    }
}

impl std::fmt::Debug for CompressedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressedImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Compute the target size for an image so it fits inside the bounds.
///
/// The longer side is the binding axis (height wins ties) and is only
/// scaled down when it exceeds its bound. A second pass catches the
/// other axis for non-square bounds. Never upscales.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    let mut w = width as f64;
    let mut h = height as f64;
    let (max_w, max_h) = (max_width as f64, max_height as f64);

    if w > h {
        if w > max_w {
            h *= max_w / w;
            w = max_w;
        }
    } else if h > max_h {
        w *= max_h / h;
        h = max_h;
    }

    if w > max_w {
        h *= max_w / w;
        w = max_w;
    }
    if h > max_h {
        w *= max_h / h;
        h = max_h;
    }

    let w = (w.round() as u32).clamp(1, max_width.max(1));
    let h = (h.round() as u32).clamp(1, max_height.max(1));
    (w, h)
}

/// Decodes user photos and re-encodes them inside fixed bounds
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCodec {
    limits: ImageLimits,
}

impl ImageCodec {
    pub fn new(limits: ImageLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> ImageLimits {
        self.limits
    }

    /// Preview of a raw selection, shown before anything is processed
    pub fn preview(&self, raw: &RawImage) -> CatalogResult<String> {
        raw.ensure_image()?;
        Ok(raw.to_data_url())
    }

    /// Decode, bound and re-encode one photo.
    ///
    /// Runs on the blocking pool; the media type check happens first so
    /// a non-image never reaches the decoder.
    pub async fn normalize(&self, raw: &RawImage) -> CatalogResult<CompressedImage> {
        raw.ensure_image()?;

        let bytes = raw.bytes.clone();
        let limits = self.limits;

        // Spawn blocking because decode + resize is CPU-intensive
        tokio::task::spawn_blocking(move || normalize_blocking(&bytes, limits))
            .await
            .map_err(CatalogError::ImageWorker)?
    }
}

/// Blocking implementation of the pipeline
pub fn normalize_blocking(bytes: &[u8], limits: ImageLimits) -> CatalogResult<CompressedImage> {
    let img = decode_upright(bytes)?;

    let (width, height) = fit_within(img.width(), img.height(), limits.max_width, limits.max_height);

    let scaled = if (width, height) == (img.width(), img.height()) {
        img
    } else {
        debug!(
            "Resizing {}x{} -> {}x{}",
            img.width(),
            img.height(),
            width,
            height
        );
        img.resize_exact(width, height, FilterType::Triangle)
    };

    let bytes = encode_jpeg(&scaled, limits.jpeg_quality())?;

    Ok(CompressedImage {
        bytes,
        width,
        height,
    })
}

/// Decode and turn the pixels the way the camera's EXIF tag says.
///
/// The re-encoded JPEG carries no EXIF, so the rotation has to be baked in.
fn decode_upright(bytes: &[u8]) -> CatalogResult<DynamicImage> {
    let mut decoder = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| CatalogError::DecodeFailed(ImageError::IoError(e)))?
        .into_decoder()
        .map_err(CatalogError::DecodeFailed)?;
    let orientation = decoder.orientation().map_err(CatalogError::DecodeFailed)?;

    let mut img = DynamicImage::from_decoder(decoder).map_err(CatalogError::DecodeFailed)?;
    img.apply_orientation(orientation);
    Ok(img)
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> CatalogResult<Vec<u8>> {
    // JPEG has no alpha channel
    let rgb = img.to_rgb8();

    let mut buffer = Cursor::new(Vec::new());
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
        encoder
            .encode_image(&rgb)
            .map_err(|e| CatalogError::EncodeFailed {
                reason: "JPEG encoder rejected the image".to_string(),
                source: Some(e),
            })?;
    }

    let bytes = buffer.into_inner();
    if bytes.is_empty() {
        return Err(CatalogError::EncodeFailed {
            reason: "encoder produced no output".to_string(),
            source: None,
        });
    }

    Ok(bytes)
}
