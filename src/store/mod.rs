/// Persistence backends
///
/// This module handles:
/// - The local SQLite document store with inline photos (local.rs)
/// - The remote record + object store pair (remote.rs)
/// - An in-process realtime hub serving the remote traits (hub.rs)

pub mod hub;
pub mod local;
pub mod remote;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

pub use hub::RealtimeHub;
pub use local::LocalStore;
pub use remote::{ObjectService, RecordService, RemoteEvent, RemoteStore};

use crate::photo::CompressedImage;
use crate::state::data::{ImageRef, ImageSlot, Project};

/// Backend-level failures, wrapped by the repository into catalog errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("malformed record document: {0}")]
    Document(#[from] serde_json::Error),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("record `{0}` does not exist")]
    MissingRecord(String),

    #[error("record `{0}` already exists")]
    DuplicateRecord(String),

    #[error("object `{0}` does not exist")]
    MissingObject(String),

    #[error("remote service unavailable: {0}")]
    Unavailable(String),
}

/// Which backend variant a catalog runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Local,
    Remote,
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(BackendKind::Local),
            "remote" => Ok(BackendKind::Remote),
            other => Err(format!("unknown backend `{other}` (expected local or remote)")),
        }
    }
}

/// The two interchangeable persistence variants
#[derive(Debug)]
pub enum Backend {
    Local(LocalStore),
    Remote(RemoteStore),
}

impl Backend {
    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Local(_) => BackendKind::Local,
            Backend::Remote(_) => BackendKind::Remote,
        }
    }

    pub async fn read_all(&self) -> Result<Vec<Project>, StoreError> {
        match self {
            Backend::Local(store) => store.read_all(),
            Backend::Remote(store) => store.read_all().await,
        }
    }

    pub async fn read_one(&self, id: &str) -> Result<Option<Project>, StoreError> {
        match self {
            Backend::Local(store) => store.read_one(id),
            Backend::Remote(store) => store.read_one(id).await,
        }
    }

    pub async fn create(&self, project: &Project) -> Result<(), StoreError> {
        match self {
            Backend::Local(store) => store.create(project),
            Backend::Remote(store) => store.write(project).await,
        }
    }

    pub async fn update(&self, project: &Project) -> Result<(), StoreError> {
        match self {
            Backend::Local(store) => store.update(project),
            Backend::Remote(store) => store.write(project).await,
        }
    }

    /// Delete a record; the remote variant also cleans up its photos
    pub async fn delete(&self, project: &Project) -> Result<(), StoreError> {
        match self {
            Backend::Local(store) => store.delete(&project.id),
            Backend::Remote(store) => store.delete(project).await,
        }
    }

    /// Turn a normalized photo into the form this backend stores.
    ///
    /// Local: the data URL itself, no I/O. Remote: an uploaded object.
    pub async fn store_image(
        &self,
        project_id: &str,
        slot: ImageSlot,
        image: &CompressedImage,
    ) -> Result<ImageRef, StoreError> {
        match self {
            Backend::Local(_) => Ok(ImageRef::Inline(image.to_data_url())),
            Backend::Remote(store) => store.upload(project_id, slot, image).await,
        }
    }

    /// Backend-assigned key for a new record, if the backend issues them
    pub fn mint_id(&self) -> Option<String> {
        match self {
            Backend::Local(_) => None,
            Backend::Remote(store) => Some(store.mint_id()),
        }
    }

    /// Realtime pushes (remote only)
    pub fn subscribe(&self) -> Option<broadcast::Receiver<RemoteEvent>> {
        match self {
            Backend::Local(_) => None,
            Backend::Remote(store) => Some(store.subscribe()),
        }
    }
}
