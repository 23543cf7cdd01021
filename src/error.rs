use thiserror::Error;

use crate::state::data::ImageSlot;
use crate::store::StoreError;

/// Errors surfaced by the catalog to its display layer.
///
/// Every variant keeps the originating cause as its `source()` so the
/// caller can render a message and still log the full chain.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A non-image file was selected. Raised before any I/O happens.
    #[error("selected file is not an image (media type `{0}`)")]
    InvalidInputKind(String),

    #[error("failed to decode image")]
    DecodeFailed(#[source] image::ImageError),

    #[error("failed to encode image: {reason}")]
    EncodeFailed {
        reason: String,
        #[source]
        source: Option<image::ImageError>,
    },

    #[error("failed to upload {slot} image")]
    UploadFailed {
        slot: ImageSlot,
        #[source]
        source: StoreError,
    },

    #[error("failed to write project record")]
    BackendWriteFailed(#[source] StoreError),

    #[error("failed to read project records")]
    BackendReadFailed(#[source] StoreError),

    #[error("project `{0}` not found")]
    NotFound(String),

    #[error("invalid project: {0}")]
    InvalidDraft(String),

    #[error("another edit session is already open")]
    SessionBusy,

    /// The blocking image worker panicked or was cancelled.
    #[error("image worker stopped unexpectedly")]
    ImageWorker(#[source] tokio::task::JoinError),
}

pub type CatalogResult<T> = Result<T, CatalogError>;
