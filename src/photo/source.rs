/// Raw image selections handed over by the display layer

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::ImageFormat;

use crate::error::{CatalogError, CatalogResult};

/// One user-selected file: raw bytes plus the media type it declared
#[derive(Clone, PartialEq, Eq)]
pub struct RawImage {
    pub bytes: Vec<u8>,
    pub media_type: String,
    /// Original file name, if the picker supplied one
    pub name: Option<String>,
}

impl RawImage {
    pub fn new(bytes: Vec<u8>, media_type: impl Into<String>) -> Self {
        Self {
            bytes,
            media_type: media_type.into(),
            name: None,
        }
    }

    /// Load a file from disk.
    ///
    /// The media type comes from the extension; files without a known
    /// image extension are sniffed, and anything unrecognised is tagged
    /// `application/octet-stream` so [`RawImage::ensure_image`] rejects it.
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;

        let media_type = ImageFormat::from_path(path)
            .or_else(|_| image::guess_format(&bytes))
            .map(|format| format.to_mime_type().to_string())
            .unwrap_or_else(|_| "application/octet-stream".to_string());

        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string());

        Ok(Self {
            bytes,
            media_type,
            name,
        })
    }

    pub fn is_image(&self) -> bool {
        self.media_type.starts_with("image/")
    }

    /// Reject non-image selections before any decode or network work
    pub fn ensure_image(&self) -> CatalogResult<()> {
        if self.is_image() {
            Ok(())
        } else {
            Err(CatalogError::InvalidInputKind(self.media_type.clone()))
        }
    }

    /// Render the selection as-is for the immediate preview
    pub fn to_data_url(&self) -> String {
        data_url(&self.media_type, &self.bytes)
    }
}

// Raw bytes are noise in logs
impl std::fmt::Debug for RawImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawImage")
            .field("media_type", &self.media_type)
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

pub(crate) fn data_url(media_type: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", media_type, STANDARD.encode(bytes))
}
