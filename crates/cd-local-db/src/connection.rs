//! Database connection management.

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const APP_DIR: &str = "crewdeck";
const DB_FILE: &str = "state.db";

/// Shared SQLite connection.
#[derive(Debug, Clone)]
pub struct Database {
    connection: Arc<std::sync::Mutex<Connection>>,
}

impl Database {
    /// Default database location.
    ///
    /// `CREWDECK_HOME` wins when set; otherwise
    /// `${XDG_STATE_HOME:-~/.local/state}/crewdeck/state.db` on Linux and
    /// the platform's application data directory elsewhere.
    pub fn default_path() -> crate::Result<PathBuf> {
        if let Ok(home) = std::env::var("CREWDECK_HOME") {
            return Ok(PathBuf::from(home).join(DB_FILE));
        }

        #[cfg(target_os = "linux")]
        {
            let state_home = match std::env::var("XDG_STATE_HOME") {
                Ok(dir) => PathBuf::from(dir),
                Err(_) => home_dir()?.join(".local").join("state"),
            };
            Ok(state_home.join(APP_DIR).join(DB_FILE))
        }

        #[cfg(target_os = "macos")]
        {
            Ok(home_dir()?
                .join("Library")
                .join("Application Support")
                .join(APP_DIR)
                .join(DB_FILE))
        }

        #[cfg(target_os = "windows")]
        {
            let local_appdata = std::env::var("LOCALAPPDATA")
                .map_err(|_| crate::Error::generic("LOCALAPPDATA environment variable not set"))?;
            Ok(PathBuf::from(local_appdata).join(APP_DIR).join(DB_FILE))
        }

        #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
        {
            Ok(home_dir()?.join(".crewdeck").join(DB_FILE))
        }
    }

    /// Open the database at the default path, creating parent directories.
    pub fn open_default() -> crate::Result<Self> {
        let path = Self::default_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(&path)
    }

    /// Open a database file, creating it if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        tracing::debug!(path = %path.as_ref().display(), "opening local state database");
        let conn = Connection::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            connection: Arc::new(std::sync::Mutex::new(conn)),
        })
    }

    /// Open an in-memory database for testing.
    pub fn open_in_memory() -> crate::Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            connection: Arc::new(std::sync::Mutex::new(conn)),
        })
    }

    fn initialize_schema(conn: &Connection) -> crate::Result<()> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        crate::migrations::MigrationManager::migrate(conn)?;
        Ok(())
    }

    /// Run `f` with exclusive access to the connection.
    pub fn with_connection<F, T>(&self, f: F) -> crate::Result<T>
    where
        F: FnOnce(&Connection) -> crate::Result<T>,
    {
        let conn = self.connection.lock().map_err(|e| {
            crate::Error::generic(format!("Failed to acquire database lock: {}", e))
        })?;
        f(&conn)
    }
}

#[allow(dead_code)]
fn home_dir() -> crate::Result<PathBuf> {
    std::env::var("HOME")
        .map(PathBuf::from)
        .map_err(|_| crate::Error::generic("HOME environment variable not set"))
}
