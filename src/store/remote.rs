/// Remote backend: realtime record service + separate object storage
///
/// Records are addressed by project id. Each photo is its own object at
/// `projects/{project-id}/{slot}.jpg` and the record only carries the
/// URL the object service hands back.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use log::{debug, warn};
use tokio::sync::broadcast;

use super::StoreError;
use crate::photo::CompressedImage;
use crate::state::data::{ImageRef, ImageSlot, Project};

/// One push from the realtime listener
#[derive(Debug, Clone)]
pub enum RemoteEvent {
    /// The full current collection, in no particular order
    Snapshot(Vec<Project>),
    /// The listener itself failed
    Failed(String),
}

/// Realtime document service holding project records by id
#[async_trait]
pub trait RecordService: Send + Sync {
    /// Allocate a fresh, never-used record key
    fn push_key(&self) -> String;

    async fn get_all(&self) -> Result<Vec<Project>, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<Project>, StoreError>;

    /// Write the record at `projects/{id}`, replacing any previous value
    async fn set(&self, project: &Project) -> Result<(), StoreError>;

    async fn remove(&self, id: &str) -> Result<(), StoreError>;

    /// Receive a full snapshot after every change made by any client
    fn listen(&self) -> broadcast::Receiver<RemoteEvent>;
}

/// Binary object storage for photos
#[async_trait]
pub trait ObjectService: Send + Sync {
    /// Store bytes at `path` and return a durable download URL
    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, StoreError>;

    /// Delete the object a download URL points at
    async fn delete(&self, url: &str) -> Result<(), StoreError>;
}

/// Object path of a project photo
pub fn object_path(project_id: &str, slot: ImageSlot) -> String {
    format!("projects/{}/{}.jpg", project_id, slot.as_str())
}

/// The RemoteStore pairs a record service with an object service
#[derive(Clone)]
pub struct RemoteStore {
    records: Arc<dyn RecordService>,
    objects: Arc<dyn ObjectService>,
}

impl RemoteStore {
    pub fn new(records: Arc<dyn RecordService>, objects: Arc<dyn ObjectService>) -> Self {
        Self { records, objects }
    }

    pub fn mint_id(&self) -> String {
        self.records.push_key()
    }

    pub async fn read_all(&self) -> Result<Vec<Project>, StoreError> {
        self.records.get_all().await
    }

    pub async fn read_one(&self, id: &str) -> Result<Option<Project>, StoreError> {
        self.records.get(id).await
    }

    /// Write a record. Any photo URL it carries must already be uploaded.
    pub async fn write(&self, project: &Project) -> Result<(), StoreError> {
        self.records.set(project).await
    }

    /// Upload a normalized photo and return its reference URL
    pub async fn upload(
        &self,
        project_id: &str,
        slot: ImageSlot,
        image: &CompressedImage,
    ) -> Result<ImageRef, StoreError> {
        let path = object_path(project_id, slot);
        debug!("Uploading {} ({} bytes)", path, image.bytes.len());

        let url = self
            .objects
            .put(&path, image.bytes.clone(), image.media_type())
            .await?;
        Ok(ImageRef::Url(url))
    }

    /// Remove a record and, best effort, its photos.
    ///
    /// Object deletes may fail (already gone, service hiccup); those are
    /// logged and dropped. The record delete always runs and its error
    /// is the only one returned.
    pub async fn delete(&self, project: &Project) -> Result<(), StoreError> {
        let deletes = ImageSlot::ALL.iter().filter_map(|&slot| match project.image(slot) {
            Some(ImageRef::Url(url)) => Some(async move {
                if let Err(e) = self.objects.delete(url).await {
                    warn!(
                        "⚠️  Failed to delete {} image of project {}: {}",
                        slot, project.id, e
                    );
                }
            }),
            _ => None,
        });
        join_all(deletes).await;

        self.records.remove(&project.id).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RemoteEvent> {
        self.records.listen()
    }
}

impl std::fmt::Debug for RemoteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteStore").finish_non_exhaustive()
    }
}
