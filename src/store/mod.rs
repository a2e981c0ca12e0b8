// Metadata store - SQLite persistence for images, tags and their join table
mod error;
pub mod images;
mod schema;
pub mod tags;
mod types;

pub use error::StoreError;
pub use types::*;

use rusqlite::{Connection, OpenFlags};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub type StoreResult<T> = Result<T, StoreError>;

/// Handle describing where the gallery database lives.
///
/// Cloning is cheap. Nothing is held open between requests: every request
/// or ingestion run calls [`Database::session`] and drops the session when
/// it is done.
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    /// Opens the database file, creating it and the schema if absent.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let db = Self { path };
        let session = db.session()?;
        session.execute_batch(schema::INIT_SCHEMA)?;
        info!("Database ready at {:?}", db.path);

        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn session(&self) -> StoreResult<Session> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )?;
        conn.execute_batch(schema::CONNECTION_PRAGMAS)?;
        debug!("Opened database session on {:?}", self.path);
        Ok(Session { conn })
    }
}

/// One connection, scoped to a single request or batch run.
pub struct Session {
    conn: Connection,
}

impl Session {
    /// Runs `f` inside a transaction, committing only if it succeeds.
    pub fn transaction<F, T, E>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
        E: From<StoreError>,
    {
        let tx = self.conn.transaction().map_err(StoreError::from)?;
        let result = f(&tx)?;
        tx.commit().map_err(StoreError::from)?;
        Ok(result)
    }

    pub fn counts(&self) -> StoreResult<StoreCounts> {
        let count = |table: &str| -> StoreResult<i64> {
            Ok(self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get(0)
                })?)
        };

        Ok(StoreCounts {
            images: count("images")?,
            tags: count("tags")?,
            links: count("image_tags")?,
        })
    }
}

impl Deref for Session {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreCounts {
    pub images: i64,
    pub tags: i64,
    pub links: i64,
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use tempfile::TempDir;

    pub fn temp_database() -> (TempDir, Database) {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::open(temp_dir.path().join("gallery.db")).unwrap();
        (temp_dir, db)
    }

    pub fn record(filename: &str, title: &str) -> ImageRecord {
        ImageRecord {
            slug: crate::slug::image_slug(title),
            title: title.to_string(),
            filename: filename.to_string(),
            prompt: format!("a prompt for {}", title.to_lowercase()),
            model: "sdxl".to_string(),
            seed: "42".to_string(),
            preset: String::new(),
            width: 64,
            height: 48,
            palette: Palette(vec!["#112233".to_string()]),
        }
    }
}
