use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::broadcast::{self, error::{RecvError, TryRecvError}};
use tokio::task::JoinHandle;

use super::data::{ImageRef, ImageSlot, Project};
use super::edit::{EditSession, ImageEdit, SessionPhase};
use super::feed::{ChangeEvent, ChangeFeed};
use crate::error::{CatalogError, CatalogResult};
use crate::photo::ImageCodec;
use crate::store::{Backend, BackendKind, RemoteEvent};

/// A save that did not go through.
///
/// Hands the session back untouched so the caller can fix the input (or
/// just try again) without re-entering the form.
#[derive(Debug, Error)]
#[error("failed to save project")]
pub struct SaveFailure {
    pub session: EditSession,
    #[source]
    pub error: CatalogError,
}

/// The ProjectRepository owns the in-memory catalog.
///
/// It sequences photo normalization, uploads and record writes against
/// one [`Backend`], keeps the project list in step with it, and tells
/// subscribers whenever that list changes.
pub struct ProjectRepository {
    backend: Backend,
    codec: ImageCodec,
    projects: Mutex<Vec<Project>>,
    feed: ChangeFeed,
    session: Arc<Mutex<SessionPhase>>,
}

impl ProjectRepository {
    pub fn new(backend: Backend, codec: ImageCodec) -> Self {
        Self {
            backend,
            codec,
            projects: Mutex::new(Vec::new()),
            feed: ChangeFeed::new(),
            session: Arc::new(Mutex::new(SessionPhase::Idle)),
        }
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn codec(&self) -> &ImageCodec {
        &self.codec
    }

    /// Replace the in-memory list with what the backend holds
    pub async fn load(&self) -> CatalogResult<()> {
        let projects = self
            .backend
            .read_all()
            .await
            .map_err(CatalogError::BackendReadFailed)?;

        info!("📚 Loaded {} projects", projects.len());
        self.apply_snapshot(projects);
        Ok(())
    }

    /// Start following realtime pushes (remote backend only).
    ///
    /// The task lives as long as the backend keeps its channel open.
    /// Each push replaces the whole list.
    pub fn start_sync(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let mut events = self.backend.subscribe()?;
        let repo = Arc::clone(self);

        Some(tokio::spawn(async move {
            // A push queued since subscribing is at least as new as a fresh read
            match events.try_recv() {
                Ok(RemoteEvent::Snapshot(projects)) => repo.apply_snapshot(projects),
                Ok(event) => {
                    repo.apply_event(event);
                    repo.refresh().await;
                }
                Err(TryRecvError::Closed) => return,
                Err(TryRecvError::Empty) | Err(TryRecvError::Lagged(_)) => repo.refresh().await,
            }

            loop {
                match events.recv().await {
                    Ok(event) => repo.apply_event(event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Realtime listener skipped {} pushes, re-reading", skipped);
                        repo.refresh().await;
                    }
                    Err(RecvError::Closed) => {
                        debug!("Realtime channel closed");
                        break;
                    }
                }
            }
        }))
    }

    fn apply_event(&self, event: RemoteEvent) {
        match event {
            RemoteEvent::Snapshot(projects) => self.apply_snapshot(projects),
            RemoteEvent::Failed(reason) => {
                error!("❌ Realtime listener failed: {}", reason);
                self.feed.emit(ChangeEvent::ReadFailed(reason));
            }
        }
    }

    async fn refresh(&self) {
        match self.backend.read_all().await {
            Ok(projects) => self.apply_snapshot(projects),
            Err(e) => {
                error!("❌ Failed to read projects: {}", e);
                self.feed
                    .emit(ChangeEvent::ReadFailed(CatalogError::BackendReadFailed(e).to_string()));
            }
        }
    }

    /// Re-derive the list from a full collection
    fn apply_snapshot(&self, mut projects: Vec<Project>) {
        let mut seen = HashSet::new();
        projects.retain(|p| seen.insert(p.id.clone()));

        // Local order is insertion order; remote order is unspecified
        if self.backend.kind() == BackendKind::Remote {
            projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        }

        let snapshot = Arc::new(projects.clone());
        *self.projects.lock() = projects;
        self.feed.emit(ChangeEvent::Updated(snapshot));
    }

    /// Current projects in display order
    pub fn list(&self) -> Vec<Project> {
        self.projects.lock().clone()
    }

    pub fn get(&self, id: &str) -> Option<Project> {
        self.projects.lock().iter().find(|p| p.id == id).cloned()
    }

    pub fn on_change<F>(&self, callback: F)
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.feed.on_change(callback);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.feed.subscribe()
    }

    pub fn session_phase(&self) -> SessionPhase {
        *self.session.lock()
    }

    /// Open the form for a brand-new project
    pub fn open_new(&self) -> CatalogResult<EditSession> {
        EditSession::open(Arc::clone(&self.session), None)
    }

    /// Open the form prefilled from an existing project
    pub fn open_edit(&self, id: &str) -> CatalogResult<EditSession> {
        let project = self
            .get(id)
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))?;
        EditSession::open(Arc::clone(&self.session), Some(project))
    }

    /// Store the session's draft and photos.
    ///
    /// Photos are normalized and (remote) uploaded first, strictly before
    /// the record that references them is written. On failure nothing in
    /// memory changes and the session comes back for a retry.
    pub async fn save(&self, mut session: EditSession) -> Result<Project, SaveFailure> {
        session.set_phase(SessionPhase::Saving);

        match self.commit(&mut session).await {
            Ok(project) => {
                info!("💾 Saved project {} ({})", project.id, project.name);
                Ok(project)
            }
            Err(error) => {
                error!("❌ Failed to save project: {}", error);
                session.set_phase(SessionPhase::Editing);
                Err(SaveFailure { session, error })
            }
        }
    }

    async fn commit(&self, session: &mut EditSession) -> CatalogResult<Project> {
        session
            .draft
            .validate()
            .map_err(CatalogError::InvalidDraft)?;

        // Reject bad selections before anything is decoded or uploaded
        for slot in ImageSlot::ALL {
            if let ImageEdit::Replaced(raw) = session.images().get(slot) {
                raw.ensure_image()?;
            }
        }

        let id = match session.project_id() {
            Some(id) => id.to_string(),
            None => {
                let id = self.mint_id().await?;
                session.assign_id(id.clone());
                id
            }
        };

        let main_image = self.resolve_image(&id, ImageSlot::Main, session).await?;
        let yarn_image = self.resolve_image(&id, ImageSlot::Yarn, session).await?;

        let now = Utc::now();
        let draft = &session.draft;
        let project = Project {
            id,
            name: draft.name.trim().to_string(),
            kind: draft.kind,
            needle_size: draft.needle_size.trim().to_string(),
            yarn_name: draft.yarn_name.trim().to_string(),
            yarn_color: draft.yarn_color.trim().to_string(),
            notes: draft.notes.trim().to_string(),
            youtube_url: draft.youtube_url.trim().to_string(),
            main_image,
            yarn_image,
            created_at: session.original().map(|p| p.created_at).unwrap_or(now),
            updated_at: match self.backend.kind() {
                BackendKind::Remote => Some(now),
                BackendKind::Local => None,
            },
        };

        let written = if session.is_new() {
            self.backend.create(&project).await
        } else {
            self.backend.update(&project).await
        };
        written.map_err(CatalogError::BackendWriteFailed)?;

        // The remote listener will push the new collection on its own
        if self.backend.kind() == BackendKind::Local {
            self.merge(project.clone());
        }

        Ok(project)
    }

    /// Settle one photo slot into its stored form
    async fn resolve_image(
        &self,
        project_id: &str,
        slot: ImageSlot,
        session: &EditSession,
    ) -> CatalogResult<Option<ImageRef>> {
        match session.images().get(slot) {
            ImageEdit::Unchanged => Ok(session.original().and_then(|p| p.image(slot)).cloned()),
            ImageEdit::Cleared => Ok(None),
            ImageEdit::Replaced(raw) => {
                let compressed = self.codec.normalize(raw).await?;
                debug!(
                    "Normalized {} image to {}x{} ({} bytes)",
                    slot,
                    compressed.width,
                    compressed.height,
                    compressed.bytes.len()
                );

                let image = self
                    .backend
                    .store_image(project_id, slot, &compressed)
                    .await
                    .map_err(|source| CatalogError::UploadFailed { slot, source })?;
                Ok(Some(image))
            }
        }
    }

    /// Fresh id for a new project.
    ///
    /// Remote keys come from the backend. Local ids are the current time
    /// in milliseconds, bumped past any id already stored.
    async fn mint_id(&self) -> CatalogResult<String> {
        if let Some(id) = self.backend.mint_id() {
            return Ok(id);
        }

        let stored = self
            .backend
            .read_all()
            .await
            .map_err(CatalogError::BackendReadFailed)?;
        let taken: HashSet<String> = stored
            .into_iter()
            .map(|p| p.id)
            .chain(self.projects.lock().iter().map(|p| p.id.clone()))
            .collect();

        let mut candidate = Utc::now().timestamp_millis();
        while taken.contains(&candidate.to_string()) {
            candidate += 1;
        }
        Ok(candidate.to_string())
    }

    /// Replace by id, or prepend a new project
    fn merge(&self, project: Project) {
        let snapshot = {
            let mut projects = self.projects.lock();
            match projects.iter_mut().find(|p| p.id == project.id) {
                Some(existing) => *existing = project,
                None => projects.insert(0, project),
            }
            Arc::new(projects.clone())
        };
        self.feed.emit(ChangeEvent::Updated(snapshot));
    }

    /// Delete a project and (remote) its photos.
    ///
    /// The record must still exist in the backend. Photo cleanup is best
    /// effort; only a failed record delete is reported, and in that case
    /// the project stays in the list.
    pub async fn delete(&self, id: &str) -> CatalogResult<()> {
        let project = self
            .backend
            .read_one(id)
            .await
            .map_err(CatalogError::BackendReadFailed)?
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))?;

        self.backend
            .delete(&project)
            .await
            .map_err(CatalogError::BackendWriteFailed)?;

        let snapshot = {
            let mut projects = self.projects.lock();
            projects.retain(|p| p.id != id);
            Arc::new(projects.clone())
        };
        self.feed.emit(ChangeEvent::Updated(snapshot));

        info!("🗑️  Deleted project {}", id);
        Ok(())
    }
}

impl std::fmt::Debug for ProjectRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectRepository")
            .field("backend", &self.backend)
            .field("projects", &self.projects.lock().len())
            .field("session", &*self.session.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::photo::{ImageLimits, RawImage};
    use crate::state::data::{Draft, ProjectKind};
    use crate::store::{LocalStore, ObjectService, RealtimeHub, RecordService, RemoteStore, StoreError};
    use async_trait::async_trait;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn photo(width: u32, height: u32) -> RawImage {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([90, 140, 110])));
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, ImageFormat::Png).unwrap();
        RawImage::new(buffer.into_inner(), "image/png")
    }

    fn local_repo() -> ProjectRepository {
        let store = LocalStore::in_memory().unwrap();
        ProjectRepository::new(Backend::Local(store), ImageCodec::default())
    }

    fn remote_repo(store: RemoteStore) -> Arc<ProjectRepository> {
        Arc::new(ProjectRepository::new(
            Backend::Remote(store),
            ImageCodec::default(),
        ))
    }

    fn inline_dimensions(image: &ImageRef) -> (u32, u32) {
        let ImageRef::Inline(data) = image else {
            panic!("expected an inline image, got {image:?}");
        };
        let payload = data.strip_prefix("data:image/jpeg;base64,").unwrap();
        let decoded = image::load_from_memory(&STANDARD.decode(payload).unwrap()).unwrap();
        (decoded.width(), decoded.height())
    }

    async fn object_dimensions(hub: &RealtimeHub, image: &ImageRef) -> (u32, u32) {
        let decoded = image::load_from_memory(&hub.object(image.as_str()).await.unwrap()).unwrap();
        (decoded.width(), decoded.height())
    }

    /// Wait until the repository list satisfies `ready`
    async fn wait_for<F>(
        repo: &ProjectRepository,
        changes: &mut broadcast::Receiver<ChangeEvent>,
        ready: F,
    ) where
        F: Fn(&[Project]) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(10), async {
            while !ready(&repo.list()) {
                match changes.recv().await {
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => panic!("change feed closed"),
                }
            }
        })
        .await
        .expect("repository never reached the expected state");
    }

    async fn create(repo: &ProjectRepository, name: &str, main: Option<RawImage>) -> Project {
        let mut session = repo.open_new().unwrap();
        session.draft = Draft::new(name, ProjectKind::Knit);
        if let Some(raw) = main {
            session.select_image(ImageSlot::Main, raw).unwrap();
        }
        repo.save(session).await.unwrap()
    }

    // ---------- local backend ----------

    #[tokio::test]
    async fn test_create_without_images() {
        let repo = local_repo();
        let created = create(&repo, "Baby Blanket", None).await;

        let list = repo.list();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0], created);
        assert_eq!(list[0].kind, ProjectKind::Knit);
        assert!(list[0].main_image.is_none());
        assert!(list[0].yarn_image.is_none());
        assert!(list[0].updated_at.is_none());
        assert!(created.id.parse::<i64>().is_ok());
        assert_eq!(repo.session_phase(), SessionPhase::Idle);
    }

    #[tokio::test]
    async fn test_edit_keeps_id_and_created_at() {
        let repo = local_repo();
        let created = create(&repo, "Baby Blanket", None).await;

        let mut session = repo.open_edit(&created.id).unwrap();
        session.draft.yarn_color = "  sage green ".to_string();
        let edited = repo.save(session).await.unwrap();

        let list = repo.list();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].yarn_color, "sage green");
        assert_eq!(edited.id, created.id);
        assert_eq!(edited.created_at, created.created_at);
    }

    #[tokio::test]
    async fn test_new_projects_are_prepended() {
        let repo = local_repo();
        let first = create(&repo, "Hat", None).await;
        let second = create(&repo, "Scarf", None).await;

        assert_ne!(first.id, second.id);
        let ids: Vec<_> = repo.list().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![second.id.clone(), first.id.clone()]);

        // A fresh repository over the same store sees the same order
        let stored = repo.backend.read_all().await.unwrap();
        assert_eq!(stored[0].id, second.id);
    }

    #[tokio::test]
    async fn test_large_photo_is_stored_inline_at_800() {
        let repo = local_repo();
        let created = create(&repo, "Cardigan", Some(photo(4000, 3000))).await;

        let stored = repo.backend.read_one(&created.id).await.unwrap().unwrap();
        let main = stored.main_image.as_ref().unwrap();
        assert!(main.is_inline());
        assert_eq!(inline_dimensions(main), (800, 600));
    }

    #[tokio::test]
    async fn test_clearing_and_keeping_photos() {
        let repo = local_repo();
        let mut session = repo.open_new().unwrap();
        session.draft = Draft::new("Socks", ProjectKind::Crochet);
        session.select_image(ImageSlot::Main, photo(40, 30)).unwrap();
        session.select_image(ImageSlot::Yarn, photo(30, 40)).unwrap();
        let created = repo.save(session).await.unwrap();

        let mut session = repo.open_edit(&created.id).unwrap();
        session.clear_image(ImageSlot::Yarn);
        let edited = repo.save(session).await.unwrap();

        assert_eq!(edited.main_image, created.main_image);
        assert!(edited.yarn_image.is_none());
    }

    #[tokio::test]
    async fn test_failed_save_leaves_list_alone_and_can_retry() {
        let repo = local_repo();
        let events = Arc::new(AtomicUsize::new(0));
        let counter = events.clone();
        repo.on_change(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let mut session = repo.open_new().unwrap();
        session.draft = Draft::new("Shawl", ProjectKind::Knit);
        session
            .select_image(ImageSlot::Main, RawImage::new(b"not a png".to_vec(), "image/png"))
            .unwrap();

        let failure = repo.save(session).await.unwrap_err();
        assert!(matches!(failure.error, CatalogError::DecodeFailed(_)));
        // Reported once as the cause, not repeated as the headline
        assert_eq!(failure.to_string(), "failed to save project");
        let cause = std::error::Error::source(&failure).unwrap();
        assert_eq!(cause.to_string(), failure.error.to_string());
        assert!(repo.list().is_empty());
        assert_eq!(events.load(Ordering::SeqCst), 0);
        assert_eq!(repo.session_phase(), SessionPhase::Editing);

        // Same session, better photo
        let mut session = failure.session;
        let minted = session.project_id().map(str::to_string);
        session.select_image(ImageSlot::Main, photo(20, 20)).unwrap();
        let saved = repo.save(session).await.unwrap();

        assert_eq!(Some(saved.id), minted);
        assert_eq!(repo.list().len(), 1);
        assert_eq!(events.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_name_is_rejected_before_io() {
        let repo = local_repo();
        let session = repo.open_new().unwrap();
        let failure = repo.save(session).await.unwrap_err();
        assert!(matches!(failure.error, CatalogError::InvalidDraft(_)));
        assert!(failure.session.project_id().is_none());
    }

    #[tokio::test]
    async fn test_one_session_at_a_time() {
        let repo = local_repo();
        let session = repo.open_new().unwrap();
        assert!(matches!(repo.open_new(), Err(CatalogError::SessionBusy)));

        drop(session);
        assert_eq!(repo.session_phase(), SessionPhase::Idle);
        assert!(repo.open_new().is_ok());
    }

    #[tokio::test]
    async fn test_delete_local() {
        let repo = local_repo();
        let created = create(&repo, "Hat", Some(photo(10, 10))).await;

        repo.delete(&created.id).await.unwrap();
        assert!(repo.list().is_empty());
        assert!(repo.backend.read_all().await.unwrap().is_empty());

        assert!(matches!(
            repo.delete(&created.id).await,
            Err(CatalogError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_load_reads_stored_order() {
        let store = LocalStore::in_memory().unwrap();
        let repo = ProjectRepository::new(Backend::Local(store), ImageCodec::default());
        create(&repo, "One", None).await;
        create(&repo, "Two", None).await;

        *repo.projects.lock() = Vec::new();
        repo.load().await.unwrap();
        let names: Vec<_> = repo.list().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["Two", "One"]);
    }

    // ---------- remote backend ----------

    #[tokio::test]
    async fn test_remote_save_uploads_then_pushes() {
        let hub = RealtimeHub::new();
        let repo = remote_repo(hub.store());
        let mut changes = repo.subscribe();
        repo.start_sync().unwrap();

        let created = create(&repo, "Pullover", Some(photo(1600, 1200))).await;
        wait_for(&repo, &mut changes, |list| list.len() == 1).await;

        let listed = &repo.list()[0];
        assert_eq!(listed.id, created.id);
        assert!(listed.updated_at.is_some());

        let main = listed.main_image.as_ref().unwrap();
        assert_eq!(
            main.as_str(),
            format!("hub://objects/projects/{}/main.jpg", created.id)
        );
        assert_eq!(object_dimensions(&hub, main).await, (800, 600));
    }

    #[tokio::test]
    async fn test_remote_list_is_newest_first() {
        let hub = RealtimeHub::new();
        let repo = remote_repo(hub.store());
        let mut changes = repo.subscribe();
        repo.start_sync().unwrap();

        let older = create(&repo, "Older", None).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        let newer = create(&repo, "Newer", None).await;

        wait_for(&repo, &mut changes, |list| list.len() == 2).await;
        let ids: Vec<_> = repo.list().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }

    #[tokio::test]
    async fn test_remote_edit_keeps_created_at() {
        let hub = RealtimeHub::new();
        let repo = remote_repo(hub.store());
        let mut changes = repo.subscribe();
        repo.start_sync().unwrap();

        let created = create(&repo, "Baby Blanket", None).await;
        wait_for(&repo, &mut changes, |list| list.len() == 1).await;

        let mut session = repo.open_edit(&created.id).unwrap();
        session.draft.yarn_color = "sage green".to_string();
        repo.save(session).await.unwrap();

        wait_for(&repo, &mut changes, |list| {
            list.first().map(|p| p.yarn_color.as_str()) == Some("sage green")
        })
        .await;
        let listed = &repo.list()[0];
        assert_eq!(listed.id, created.id);
        assert_eq!(listed.created_at, created.created_at);
    }

    #[tokio::test]
    async fn test_sync_start_never_rolls_back() {
        let hub = RealtimeHub::new();
        let writer = hub.store();
        let repo = remote_repo(hub.store());
        let mut changes = repo.subscribe();
        repo.start_sync().unwrap();

        // Both pushes are queued before the sync task gets to run
        for name in ["First", "Second"] {
            let project = Project {
                id: writer.mint_id(),
                name: name.to_string(),
                kind: ProjectKind::Knit,
                needle_size: String::new(),
                yarn_name: String::new(),
                yarn_color: String::new(),
                notes: String::new(),
                youtube_url: String::new(),
                main_image: None,
                yarn_image: None,
                created_at: Utc::now(),
                updated_at: Some(Utc::now()),
            };
            writer.write(&project).await.unwrap();
        }

        let mut sizes = Vec::new();
        tokio::time::timeout(Duration::from_secs(10), async {
            while sizes.last() != Some(&2) {
                if let ChangeEvent::Updated(list) = changes.recv().await.unwrap() {
                    sizes.push(list.len());
                }
            }
        })
        .await
        .unwrap();

        assert!(sizes.windows(2).all(|pair| pair[0] <= pair[1]), "list shrank: {sizes:?}");
    }

    #[tokio::test]
    async fn test_changes_from_other_clients_arrive() {
        let hub = RealtimeHub::new();
        let writer = remote_repo(hub.store());
        let reader = remote_repo(hub.store());
        let mut changes = reader.subscribe();
        reader.start_sync().unwrap();

        let created = create(&writer, "Beanie", None).await;

        wait_for(&reader, &mut changes, |list| list.len() == 1).await;
        assert_eq!(reader.list()[0].id, created.id);
        // The writer never synced, so relies on its own listener only
        assert!(writer.list().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_saves_keep_their_own_photos() {
        let hub = RealtimeHub::new();
        let a = remote_repo(hub.store());
        let b = remote_repo(hub.store());

        let mut wide = a.open_new().unwrap();
        wide.draft = Draft::new("Wide", ProjectKind::Knit);
        wide.select_image(ImageSlot::Main, photo(120, 60)).unwrap();

        let mut tall = b.open_new().unwrap();
        tall.draft = Draft::new("Tall", ProjectKind::Crochet);
        tall.select_image(ImageSlot::Main, photo(60, 120)).unwrap();

        let (wide, tall) = tokio::join!(a.save(wide), b.save(tall));
        let (wide, tall) = (wide.unwrap(), tall.unwrap());
        assert_ne!(wide.id, tall.id);

        let stored_wide = hub.get(&wide.id).await.unwrap().unwrap();
        let stored_tall = hub.get(&tall.id).await.unwrap().unwrap();
        let wide_main = stored_wide.main_image.unwrap();
        let tall_main = stored_tall.main_image.unwrap();

        assert!(wide_main.as_str().contains(&wide.id));
        assert!(tall_main.as_str().contains(&tall.id));
        assert_eq!(object_dimensions(&hub, &wide_main).await, (120, 60));
        assert_eq!(object_dimensions(&hub, &tall_main).await, (60, 120));
    }

    #[tokio::test]
    async fn test_delete_with_missing_object_still_succeeds() {
        let hub = RealtimeHub::new();
        let repo = remote_repo(hub.store());
        let mut changes = repo.subscribe();
        repo.start_sync().unwrap();

        let created = create(&repo, "Mittens", Some(photo(50, 50))).await;
        wait_for(&repo, &mut changes, |list| list.len() == 1).await;

        hub.delete_object(created.main_image.as_ref().unwrap().as_str())
            .await
            .unwrap();

        repo.delete(&created.id).await.unwrap();
        assert!(repo.list().iter().all(|p| p.id != created.id));
        assert!(hub.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_photos() {
        let hub = RealtimeHub::new();
        let repo = remote_repo(hub.store());

        let mut session = repo.open_new().unwrap();
        session.draft = Draft::new("Gloves", ProjectKind::Knit);
        session.select_image(ImageSlot::Main, photo(20, 20)).unwrap();
        session.select_image(ImageSlot::Yarn, photo(20, 20)).unwrap();
        let created = repo.save(session).await.unwrap();
        assert_eq!(hub.object_count().await, 2);

        repo.delete(&created.id).await.unwrap();
        assert_eq!(hub.object_count().await, 0);
        assert!(matches!(
            repo.delete(&created.id).await,
            Err(CatalogError::NotFound(_))
        ));
    }

    /// Records that refuse to be removed
    struct StuckRecords(RealtimeHub);

    #[async_trait]
    impl RecordService for StuckRecords {
        fn push_key(&self) -> String {
            self.0.push_key()
        }
        async fn get_all(&self) -> Result<Vec<Project>, StoreError> {
            self.0.get_all().await
        }
        async fn get(&self, id: &str) -> Result<Option<Project>, StoreError> {
            self.0.get(id).await
        }
        async fn set(&self, project: &Project) -> Result<(), StoreError> {
            self.0.set(project).await
        }
        async fn remove(&self, _id: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("permission denied".to_string()))
        }
        fn listen(&self) -> broadcast::Receiver<RemoteEvent> {
            self.0.listen()
        }
    }

    /// Object storage that is down
    struct BrokenObjects;

    #[async_trait]
    impl ObjectService for BrokenObjects {
        async fn put(&self, _path: &str, _bytes: Vec<u8>, _content_type: &str) -> Result<String, StoreError> {
            Err(StoreError::Unavailable("quota exceeded".to_string()))
        }
        async fn delete(&self, _url: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("quota exceeded".to_string()))
        }
    }

    #[tokio::test]
    async fn test_failed_record_delete_keeps_project() {
        let hub = RealtimeHub::new();
        let store = RemoteStore::new(Arc::new(StuckRecords(hub.clone())), Arc::new(hub.clone()));
        let repo = remote_repo(store);

        let created = create(&repo, "Blanket", Some(photo(20, 20))).await;
        repo.load().await.unwrap();

        let result = repo.delete(&created.id).await;
        assert!(matches!(result, Err(CatalogError::BackendWriteFailed(_))));
        assert_eq!(repo.list().len(), 1);
        assert!(hub.get(&created.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_upload_failure_writes_nothing() {
        let hub = RealtimeHub::new();
        let store = RemoteStore::new(Arc::new(hub.clone()), Arc::new(BrokenObjects));
        let repo = remote_repo(store);

        let mut session = repo.open_new().unwrap();
        session.draft = Draft::new("Vest", ProjectKind::Knit);
        session.select_image(ImageSlot::Main, photo(20, 20)).unwrap();

        let failure = repo.save(session).await.unwrap_err();
        assert!(matches!(
            failure.error,
            CatalogError::UploadFailed { slot: ImageSlot::Main, .. }
        ));
        assert!(hub.get_all().await.unwrap().is_empty());
        assert!(repo.list().is_empty());
    }

    #[tokio::test]
    async fn test_listener_failure_is_reported_once() {
        let hub = RealtimeHub::new();
        let repo = remote_repo(hub.store());
        let mut changes = repo.subscribe();
        repo.start_sync().unwrap();

        // initial refresh
        assert!(matches!(changes.recv().await.unwrap(), ChangeEvent::Updated(_)));

        hub.shutdown("permission denied");
        match changes.recv().await.unwrap() {
            ChangeEvent::ReadFailed(reason) => assert_eq!(reason, "permission denied"),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_custom_limits_apply() {
        let store = LocalStore::in_memory().unwrap();
        let codec = ImageCodec::new(ImageLimits {
            max_width: 64,
            max_height: 64,
            quality: 0.9,
        });
        let repo = ProjectRepository::new(Backend::Local(store), codec);

        let created = create(&repo, "Swatch", Some(photo(256, 128))).await;
        assert_eq!(inline_dimensions(created.main_image.as_ref().unwrap()), (64, 32));
    }
}
