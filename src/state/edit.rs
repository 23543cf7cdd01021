/// Edit sessions and pending photo edits
///
/// An [`EditSession`] is the open "project form": a draft of the field
/// values plus, per photo slot, what the user did to the photo. Nothing
/// is stored until the session is handed to
/// [`ProjectRepository::save`](super::repository::ProjectRepository::save);
/// dropping the session is the cancel path and releases the
/// repository's single session slot.

use std::sync::Arc;

use parking_lot::Mutex;

use super::data::{Draft, ImageRef, ImageSlot, Project};
use crate::error::{CatalogError, CatalogResult};
use crate::photo::RawImage;

/// What the user did to one photo slot during a session
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ImageEdit {
    /// Keep whatever is stored
    #[default]
    Unchanged,
    /// Remove the stored photo
    Cleared,
    /// Replace with a newly selected file (normalized on save)
    Replaced(RawImage),
}

/// Pending edits for both photo slots
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PendingImageEdits {
    pub main: ImageEdit,
    pub yarn: ImageEdit,
}

impl PendingImageEdits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, slot: ImageSlot) -> &ImageEdit {
        match slot {
            ImageSlot::Main => &self.main,
            ImageSlot::Yarn => &self.yarn,
        }
    }

    pub fn set(&mut self, slot: ImageSlot, edit: ImageEdit) {
        match slot {
            ImageSlot::Main => self.main = edit,
            ImageSlot::Yarn => self.yarn = edit,
        }
    }

    /// Check if neither slot has been touched
    pub fn is_unedited(&self) -> bool {
        *self == Self::default()
    }

    /// Forget every pending edit, including held file bytes
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Where the repository's single edit slot currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    Editing,
    Saving,
}

/// One open create/edit form
#[derive(Debug)]
pub struct EditSession {
    /// Minted on the first save attempt of a new project, then reused
    project_id: Option<String>,
    /// Stored state of the project being edited; None when creating
    original: Option<Project>,
    pub draft: Draft,
    images: PendingImageEdits,
    gate: Arc<Mutex<SessionPhase>>,
}

impl EditSession {
    /// Claim the repository's edit slot
    pub(crate) fn open(gate: Arc<Mutex<SessionPhase>>, original: Option<Project>) -> CatalogResult<Self> {
        {
            let mut phase = gate.lock();
            if *phase != SessionPhase::Idle {
                return Err(CatalogError::SessionBusy);
            }
            *phase = SessionPhase::Editing;
        }

        let draft = original.as_ref().map(Draft::from_project).unwrap_or_default();

        Ok(Self {
            project_id: original.as_ref().map(|p| p.id.clone()),
            original,
            draft,
            images: PendingImageEdits::new(),
            gate,
        })
    }

    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    /// True until the project has been created once
    pub fn is_new(&self) -> bool {
        self.original.is_none()
    }

    pub fn original(&self) -> Option<&Project> {
        self.original.as_ref()
    }

    pub fn images(&self) -> &PendingImageEdits {
        &self.images
    }

    /// Attach a newly picked photo to a slot.
    ///
    /// Non-image files are rejected here, before anything is decoded or
    /// sent anywhere. Returns the preview to show right away.
    pub fn select_image(&mut self, slot: ImageSlot, raw: RawImage) -> CatalogResult<String> {
        raw.ensure_image()?;
        let preview = raw.to_data_url();
        self.images.set(slot, ImageEdit::Replaced(raw));
        Ok(preview)
    }

    pub fn clear_image(&mut self, slot: ImageSlot) {
        self.images.set(slot, ImageEdit::Cleared);
    }

    /// The stored photo the form should keep showing, if the slot is untouched
    pub fn current_image(&self, slot: ImageSlot) -> Option<&ImageRef> {
        match self.images.get(slot) {
            ImageEdit::Unchanged => self.original.as_ref().and_then(|p| p.image(slot)),
            _ => None,
        }
    }

    /// Close without saving
    pub fn cancel(mut self) {
        self.images.reset();
    }

    pub(crate) fn set_phase(&self, phase: SessionPhase) {
        *self.gate.lock() = phase;
    }

    pub(crate) fn assign_id(&mut self, id: String) {
        self.project_id = Some(id);
    }
}

impl Drop for EditSession {
    fn drop(&mut self) {
        *self.gate.lock() = SessionPhase::Idle;
    }
}
