use crate::domain::countdown::PauseLedger;
use crate::domain::models::PomodoroSession;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::open_database;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Last reconciled copy of the open session. Never authoritative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedSession {
    pub session: PomodoroSession,
    pub ledger: Option<PauseLedger>,
    pub reconciled_at: DateTime<Utc>,
}

pub trait SessionCacheRepository: Send + Sync {
    fn load(&self) -> Result<Option<CachedSession>, InfraError>;
    fn save(&self, cached: &CachedSession) -> Result<(), InfraError>;
    fn clear(&self) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct SqliteSessionCache {
    db_path: PathBuf,
}

impl SqliteSessionCache {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        open_database(&self.db_path)
    }
}

impl SessionCacheRepository for SqliteSessionCache {
    fn load(&self) -> Result<Option<CachedSession>, InfraError> {
        let connection = self.connect()?;
        let row: Option<(String, Option<String>, String)> = connection
            .query_row(
                "SELECT session_json, ledger_json, reconciled_at FROM session_cache WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let Some((session_json, ledger_json, reconciled_at_raw)) = row else {
            return Ok(None);
        };

        let reconciled_at = DateTime::parse_from_rfc3339(&reconciled_at_raw).map_err(|error| {
            InfraError::InvalidConfig(format!(
                "invalid session_cache.reconciled_at '{}': {error}",
                reconciled_at_raw
            ))
        })?;
        let session = serde_json::from_str::<PomodoroSession>(&session_json)?;
        let ledger = ledger_json
            .as_deref()
            .map(|raw| serde_json::from_str::<PauseLedger>(raw))
            .transpose()?;

        Ok(Some(CachedSession {
            session,
            ledger,
            reconciled_at: reconciled_at.with_timezone(&Utc),
        }))
    }

    fn save(&self, cached: &CachedSession) -> Result<(), InfraError> {
        let session_json = serde_json::to_string(&cached.session)?;
        let ledger_json = cached
            .ledger
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO session_cache (id, session_json, ledger_json, reconciled_at)
             VALUES (1, ?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET
               session_json = excluded.session_json,
               ledger_json = excluded.ledger_json,
               reconciled_at = excluded.reconciled_at",
            params![session_json, ledger_json, cached.reconciled_at.to_rfc3339()],
        )?;
        Ok(())
    }

    fn clear(&self) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute("DELETE FROM session_cache WHERE id = 1", [])?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemorySessionCache {
    cached: Mutex<Option<CachedSession>>,
}

impl SessionCacheRepository for InMemorySessionCache {
    fn load(&self) -> Result<Option<CachedSession>, InfraError> {
        let cached = self
            .cached
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("session cache lock poisoned: {error}")))?;
        Ok(cached.clone())
    }

    fn save(&self, value: &CachedSession) -> Result<(), InfraError> {
        let mut cached = self
            .cached
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("session cache lock poisoned: {error}")))?;
        *cached = Some(value.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), InfraError> {
        let mut cached = self
            .cached
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("session cache lock poisoned: {error}")))?;
        *cached = None;
        Ok(())
    }
}
