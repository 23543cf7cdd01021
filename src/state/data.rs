/// Shared data structures for the catalog state
///
/// These structs represent the data model that flows between
/// the storage backends and the display layer.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Craft technique of a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProjectKind {
    #[default]
    Knit,
    Crochet,
}

impl ProjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectKind::Knit => "knit",
            ProjectKind::Crochet => "crochet",
        }
    }

    /// Human-readable label for list rendering
    pub fn label(&self) -> &'static str {
        match self {
            ProjectKind::Knit => "Knitting",
            ProjectKind::Crochet => "Crochet",
        }
    }
}

impl fmt::Display for ProjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProjectKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "knit" => Ok(ProjectKind::Knit),
            "crochet" => Ok(ProjectKind::Crochet),
            other => Err(format!("unknown project type `{other}` (expected knit or crochet)")),
        }
    }
}

/// The two photo slots a project carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageSlot {
    /// Finished-object photo
    Main,
    /// Yarn / material photo
    Yarn,
}

impl ImageSlot {
    pub const ALL: [ImageSlot; 2] = [ImageSlot::Main, ImageSlot::Yarn];

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageSlot::Main => "main",
            ImageSlot::Yarn => "yarn",
        }
    }
}

impl fmt::Display for ImageSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved image field.
///
/// Stored as a single string in the record document: `data:` URLs are
/// inline payloads, anything else is a reference URL issued by the
/// object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ImageRef {
    /// Compressed bytes embedded as a base64 data URL
    Inline(String),
    /// Locator of a durably stored object
    Url(String),
}

impl ImageRef {
    pub fn as_str(&self) -> &str {
        match self {
            ImageRef::Inline(data) => data,
            ImageRef::Url(url) => url,
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, ImageRef::Inline(_))
    }
}

impl From<String> for ImageRef {
    fn from(value: String) -> Self {
        if value.starts_with("data:") {
            ImageRef::Inline(value)
        } else {
            ImageRef::Url(value)
        }
    }
}

impl From<ImageRef> for String {
    fn from(value: ImageRef) -> Self {
        match value {
            ImageRef::Inline(data) => data,
            ImageRef::Url(url) => url,
        }
    }
}

/// Represents a single craft project in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Stable identifier, never changes after creation
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ProjectKind,
    #[serde(default)]
    pub needle_size: String,
    #[serde(default)]
    pub yarn_name: String,
    #[serde(default)]
    pub yarn_color: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub youtube_url: String,
    /// Finished-object photo (`mainImageUrl` in older remote documents)
    #[serde(default, alias = "mainImageUrl")]
    pub main_image: Option<ImageRef>,
    /// Yarn photo (`yarnImageUrl` in older remote documents)
    #[serde(default, alias = "yarnImageUrl")]
    pub yarn_image: Option<ImageRef>,
    pub created_at: DateTime<Utc>,
    /// Only stamped by the remote backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Project {
    pub fn image(&self, slot: ImageSlot) -> Option<&ImageRef> {
        match slot {
            ImageSlot::Main => self.main_image.as_ref(),
            ImageSlot::Yarn => self.yarn_image.as_ref(),
        }
    }

    pub fn set_image(&mut self, slot: ImageSlot, image: Option<ImageRef>) {
        match slot {
            ImageSlot::Main => self.main_image = image,
            ImageSlot::Yarn => self.yarn_image = image,
        }
    }
}

/// Editable field values of a project, as typed by the user.
///
/// Values are trimmed when the record is built; an empty string means
/// the field is absent.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Draft {
    pub name: String,
    pub kind: ProjectKind,
    pub needle_size: String,
    pub yarn_name: String,
    pub yarn_color: String,
    pub notes: String,
    pub youtube_url: String,
}

impl Draft {
    pub fn new(name: impl Into<String>, kind: ProjectKind) -> Self {
        Self {
            name: name.into(),
            kind,
            ..Self::default()
        }
    }

    /// Prefill a draft from a stored project (edit session)
    pub fn from_project(project: &Project) -> Self {
        Self {
            name: project.name.clone(),
            kind: project.kind,
            needle_size: project.needle_size.clone(),
            yarn_name: project.yarn_name.clone(),
            yarn_color: project.yarn_color.clone(),
            notes: project.notes.clone(),
            youtube_url: project.youtube_url.clone(),
        }
    }

    /// Name is the only required text field
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("project name is required".to_string());
        }
        Ok(())
    }
}
