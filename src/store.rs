use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use tracing::warn;
use uuid::Uuid;

use crate::config::WidgetConfig;
use crate::error::Result;
use crate::model::Session;

/// Storage key for the serialized session snapshot.
const SESSION_KEY: &str = "chatbot-session";

/// Local key/value store holding the persisted session snapshot.
///
/// Stands in for browser-local storage: a single row keyed `chatbot-session`
/// carrying the session JSON. Write failures degrade to a non-persistent
/// session; they are logged and never surfaced to the reader.
pub struct SessionStore {
    conn: Connection,
}

impl SessionStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS storage (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;
        Ok(SessionStore { conn })
    }

    pub fn default_path() -> PathBuf {
        WidgetConfig::config_dir().join("session.sqlite")
    }

    /// Restore the persisted session, or synthesize a fresh one for the given
    /// page when no structurally valid snapshot exists.
    ///
    /// Malformed snapshots are discarded with a logged warning, never an
    /// error. Fails only when a fresh session cannot be built (bad page URL).
    pub fn load_or_create(&self, page_url: &str) -> Result<Session> {
        match self.load_snapshot() {
            Ok(Some(session)) => return Ok(session),
            Ok(None) => {}
            Err(e) => warn!("failed to restore saved session, creating new one: {}", e),
        }
        Session::new(format!("session_{}", Uuid::new_v4()), page_url)
    }

    fn load_snapshot(&self) -> Result<Option<Session>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM storage WHERE key = ?1")?;
        let mut rows = stmt.query(params![SESSION_KEY])?;
        match rows.next()? {
            Some(row) => {
                let raw: String = row.get(0)?;
                let value = serde_json::from_str(&raw)?;
                Ok(Some(Session::from_plain(value)?))
            }
            None => Ok(None),
        }
    }

    /// Overwrite the persisted snapshot with the full session. Failures are
    /// logged and swallowed.
    pub fn save(&self, session: &Session) {
        if let Err(e) = self.try_save(session) {
            warn!("failed to save session snapshot: {}", e);
        }
    }

    fn try_save(&self, session: &Session) -> Result<()> {
        let value = serde_json::to_string(&session.to_plain()?)?;
        self.conn.execute(
            "INSERT INTO storage (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![SESSION_KEY, value],
        )?;
        Ok(())
    }

    /// Discard the persisted snapshot.
    pub fn clear(&self) {
        if let Err(e) = self
            .conn
            .execute("DELETE FROM storage WHERE key = ?1", params![SESSION_KEY])
        {
            warn!("failed to clear session snapshot: {}", e);
        }
    }
}
