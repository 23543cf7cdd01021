use std::path::{Path, PathBuf};

use chrono::Utc;
use log::info;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};

use super::StoreError;
use crate::state::data::Project;

/// Key of the single document holding every project
pub const DOCUMENT_KEY: &str = "knittingProjects";

/// The LocalStore keeps the whole catalog in one SQLite row.
///
/// Records and their inline image payloads are serialized together as a
/// JSON array under [`DOCUMENT_KEY`]. Every mutation is a
/// read-modify-write inside one transaction, so callers never observe a
/// half-written catalog.
pub struct LocalStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl LocalStore {
    /// Open (or create) the catalog database at `db_path`.
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        // Ensure the parent directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        info!("📁 Database initialized at: {}", db_path.display());

        let store = LocalStore {
            conn: Mutex::new(conn),
            db_path: Some(db_path.to_path_buf()),
        };
        store.init_schema()?;

        Ok(store)
    }

    /// A throwaway store that lives as long as the value
    pub fn in_memory() -> Result<Self, StoreError> {
        let store = LocalStore {
            conn: Mutex::new(Connection::open_in_memory()?),
            db_path: None,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        // Key/value table; the catalog only ever uses one key
        self.conn.lock().execute(
            "CREATE TABLE IF NOT EXISTS documents (
                key             TEXT PRIMARY KEY,
                body            TEXT NOT NULL,
                updated_at      INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    /// Get the path to the database file (None for in-memory stores)
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// All projects in stored order (newest insertions first)
    pub fn read_all(&self) -> Result<Vec<Project>, StoreError> {
        let conn = self.conn.lock();
        load_document(&conn)
    }

    pub fn read_one(&self, id: &str) -> Result<Option<Project>, StoreError> {
        Ok(self.read_all()?.into_iter().find(|p| p.id == id))
    }

    pub fn project_count(&self) -> Result<usize, StoreError> {
        Ok(self.read_all()?.len())
    }

    /// Prepend a new project and rewrite the document
    pub fn create(&self, project: &Project) -> Result<(), StoreError> {
        self.modify(|projects| {
            if projects.iter().any(|p| p.id == project.id) {
                return Err(StoreError::DuplicateRecord(project.id.clone()));
            }
            projects.insert(0, project.clone());
            Ok(())
        })
    }

    /// Replace a project by id and rewrite the document
    pub fn update(&self, project: &Project) -> Result<(), StoreError> {
        self.modify(|projects| {
            let slot = projects
                .iter_mut()
                .find(|p| p.id == project.id)
                .ok_or_else(|| StoreError::MissingRecord(project.id.clone()))?;
            *slot = project.clone();
            Ok(())
        })
    }

    /// Remove a project by id and rewrite the document
    pub fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.modify(|projects| {
            let before = projects.len();
            projects.retain(|p| p.id != id);
            if projects.len() == before {
                return Err(StoreError::MissingRecord(id.to_string()));
            }
            Ok(())
        })
    }

    fn modify<F>(&self, change: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Vec<Project>) -> Result<(), StoreError>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let mut projects = load_document(&tx)?;
        change(&mut projects)?;

        let body = serde_json::to_string(&projects)?;
        tx.execute(
            "INSERT INTO documents (key, body, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
            rusqlite::params![DOCUMENT_KEY, body, Utc::now().timestamp()],
        )?;
        tx.commit()?;

        Ok(())
    }
}

fn load_document(conn: &Connection) -> Result<Vec<Project>, StoreError> {
    let body: Option<String> = conn
        .query_row(
            "SELECT body FROM documents WHERE key = ?1",
            [DOCUMENT_KEY],
            |row| row.get(0),
        )
        .optional()?;

    match body {
        Some(body) => Ok(serde_json::from_str(&body)?),
        None => Ok(Vec::new()),
    }
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("db_path", &self.db_path)
            .finish()
    }
}
