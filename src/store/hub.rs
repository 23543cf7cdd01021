/// In-process realtime hub
///
/// A document service and an object service behind the remote traits.
/// Several [`RemoteStore`]s built from clones of one hub behave like
/// several clients of the same remote project: every write is pushed to
/// every listener as a full snapshot.
///
/// With a root folder the hub survives restarts: records live in
/// `{root}/projects.json` and objects under `{root}/objects/`.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use tokio::sync::{broadcast, Mutex};

use super::remote::{ObjectService, RecordService, RemoteEvent, RemoteStore};
use super::StoreError;
use crate::state::data::Project;

/// Scheme + host of every object URL the hub issues
pub const URL_PREFIX: &str = "hub://objects/";

const RECORDS_FILE: &str = "projects.json";
const RECORDS_STAGING: &str = "projects.json.tmp";

/// Capacity of the push channel before slow listeners lag
const EVENT_CAPACITY: usize = 64;

#[derive(Default)]
struct HubState {
    records: BTreeMap<String, Project>,
    /// Only used when the hub has no root folder
    objects: BTreeMap<String, Vec<u8>>,
}

struct HubInner {
    state: Mutex<HubState>,
    events: broadcast::Sender<RemoteEvent>,
    root: Option<PathBuf>,
}

#[derive(Clone)]
pub struct RealtimeHub {
    inner: Arc<HubInner>,
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}

impl RealtimeHub {
    /// A memory-only hub
    pub fn new() -> Self {
        Self::with_state(HubState::default(), None)
    }

    /// A hub persisted under `root`, loading whatever is already there
    pub async fn open(root: &Path) -> Result<Self, StoreError> {
        tokio::fs::create_dir_all(root.join("objects")).await?;

        let records_path = root.join(RECORDS_FILE);
        let records: BTreeMap<String, Project> = match tokio::fs::read(&records_path).await {
            Ok(body) => serde_json::from_slice(&body)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        info!(
            "🛰️  Realtime hub opened at {} with {} records",
            root.display(),
            records.len()
        );

        let state = HubState {
            records,
            objects: BTreeMap::new(),
        };
        Ok(Self::with_state(state, Some(root.to_path_buf())))
    }

    fn with_state(state: HubState, root: Option<PathBuf>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(HubInner {
                state: Mutex::new(state),
                events,
                root,
            }),
        }
    }

    /// A client connection to this hub
    pub fn store(&self) -> RemoteStore {
        RemoteStore::new(Arc::new(self.clone()), Arc::new(self.clone()))
    }

    /// Drop every listener connection with an error
    pub fn shutdown(&self, reason: &str) {
        let _ = self.inner.events.send(RemoteEvent::Failed(reason.to_string()));
    }

    pub async fn object_count(&self) -> usize {
        match &self.inner.root {
            Some(root) => count_files(&root.join("objects")).await,
            None => self.inner.state.lock().await.objects.len(),
        }
    }

    /// Fetch an object by its download URL
    pub async fn object(&self, url: &str) -> Result<Vec<u8>, StoreError> {
        let path = path_from_url(url)?;
        match &self.inner.root {
            Some(root) => match tokio::fs::read(object_file(root, &path)?).await {
                Ok(bytes) => Ok(bytes),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    Err(StoreError::MissingObject(path))
                }
                Err(e) => Err(e.into()),
            },
            None => self
                .inner
                .state
                .lock()
                .await
                .objects
                .get(&path)
                .cloned()
                .ok_or(StoreError::MissingObject(path)),
        }
    }

    pub async fn delete_object(&self, url: &str) -> Result<(), StoreError> {
        ObjectService::delete(self, url).await
    }

    /// Persist (when rooted) and push the new collection to listeners.
    /// Called with the state lock held so pushes go out in write order.
    async fn publish(&self, state: &HubState) -> Result<(), StoreError> {
        if let Some(root) = &self.inner.root {
            let body = serde_json::to_vec_pretty(&state.records)?;
            // Readers only ever see a complete document
            let staged = root.join(RECORDS_STAGING);
            tokio::fs::write(&staged, body).await?;
            tokio::fs::rename(&staged, root.join(RECORDS_FILE)).await?;
        }

        let snapshot: Vec<Project> = state.records.values().cloned().collect();
        // No listeners is fine
        let _ = self.inner.events.send(RemoteEvent::Snapshot(snapshot));
        Ok(())
    }
}

#[async_trait]
impl RecordService for RealtimeHub {
    fn push_key(&self) -> String {
        // Time-ordered prefix, random suffix
        let millis = Utc::now().timestamp_millis();
        let random = uuid::Uuid::new_v4().simple().to_string();
        format!("{:012x}{}", millis, &random[..8])
    }

    async fn get_all(&self) -> Result<Vec<Project>, StoreError> {
        Ok(self.inner.state.lock().await.records.values().cloned().collect())
    }

    async fn get(&self, id: &str) -> Result<Option<Project>, StoreError> {
        Ok(self.inner.state.lock().await.records.get(id).cloned())
    }

    async fn set(&self, project: &Project) -> Result<(), StoreError> {
        let mut state = self.inner.state.lock().await;
        let previous = state.records.insert(project.id.clone(), project.clone());

        if let Err(e) = self.publish(&state).await {
            // Keep memory and disk in step
            match previous {
                Some(previous) => state.records.insert(project.id.clone(), previous),
                None => state.records.remove(&project.id),
            };
            return Err(e);
        }

        debug!("Record {} written", project.id);
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), StoreError> {
        let mut state = self.inner.state.lock().await;
        let previous = state
            .records
            .remove(id)
            .ok_or_else(|| StoreError::MissingRecord(id.to_string()))?;

        if let Err(e) = self.publish(&state).await {
            state.records.insert(id.to_string(), previous);
            return Err(e);
        }

        debug!("Record {} removed", id);
        Ok(())
    }

    fn listen(&self) -> broadcast::Receiver<RemoteEvent> {
        self.inner.events.subscribe()
    }
}

#[async_trait]
impl ObjectService for RealtimeHub {
    async fn put(&self, path: &str, bytes: Vec<u8>, _content_type: &str) -> Result<String, StoreError> {
        match &self.inner.root {
            Some(root) => {
                let file = object_file(root, path)?;
                if let Some(parent) = file.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&file, bytes).await?;
            }
            None => {
                self.inner
                    .state
                    .lock()
                    .await
                    .objects
                    .insert(path.to_string(), bytes);
            }
        }

        Ok(format!("{}{}", URL_PREFIX, path))
    }

    async fn delete(&self, url: &str) -> Result<(), StoreError> {
        let path = path_from_url(url)?;
        match &self.inner.root {
            Some(root) => match tokio::fs::remove_file(object_file(root, &path)?).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    Err(StoreError::MissingObject(path))
                }
                Err(e) => Err(e.into()),
            },
            None => self
                .inner
                .state
                .lock()
                .await
                .objects
                .remove(&path)
                .map(|_| ())
                .ok_or(StoreError::MissingObject(path)),
        }
    }
}

fn path_from_url(url: &str) -> Result<String, StoreError> {
    url.strip_prefix(URL_PREFIX)
        .map(str::to_string)
        .ok_or_else(|| StoreError::MissingObject(url.to_string()))
}

/// Map an object path into the objects folder, refusing anything that
/// could climb out of it
fn object_file(root: &Path, path: &str) -> Result<PathBuf, StoreError> {
    let relative = Path::new(path);
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Err(StoreError::MissingObject(path.to_string()));
    }
    Ok(root.join("objects").join(relative))
}

async fn count_files(dir: &Path) -> usize {
    let mut count = 0;
    let mut pending = vec![dir.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let Ok(mut entries) = tokio::fs::read_dir(&dir).await else {
            continue;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            match entry.file_type().await {
                Ok(kind) if kind.is_dir() => pending.push(entry.path()),
                Ok(_) => count += 1,
                Err(_) => {}
            }
        }
    }

    count
}
