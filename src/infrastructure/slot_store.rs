use crate::infrastructure::error::InfraError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const TIMER_NAMESPACE: &str = "timer-storage";
pub const TASKS_NAMESPACE: &str = "pomdo_todos";
pub const FOCUS_SESSIONS_NAMESPACE: &str = "pomdo_pomodoro_sessions";

pub trait SlotStore: Send + Sync {
    fn load(&self, namespace: &str) -> Result<Option<String>, InfraError>;
    fn save(&self, namespace: &str, payload: &str) -> Result<(), InfraError>;
    fn remove(&self, namespace: &str) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct SqliteSlotStore {
    db_path: PathBuf,
}

impl SqliteSlotStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        Connection::open(&self.db_path).map_err(InfraError::from)
    }
}

impl SlotStore for SqliteSlotStore {
    fn load(&self, namespace: &str) -> Result<Option<String>, InfraError> {
        let connection = self.connect()?;
        let payload = connection
            .query_row(
                "SELECT payload FROM local_slots WHERE namespace = ?1",
                params![namespace],
                |row| row.get(0),
            )
            .optional()?;
        Ok(payload)
    }

    fn save(&self, namespace: &str, payload: &str) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO local_slots (namespace, payload, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(namespace) DO UPDATE SET
               payload = excluded.payload,
               updated_at = excluded.updated_at",
            params![namespace, payload, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn remove(&self, namespace: &str) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute(
            "DELETE FROM local_slots WHERE namespace = ?1",
            params![namespace],
        )?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemorySlotStore {
    slots: Mutex<HashMap<String, String>>,
}

impl InMemorySlotStore {
    fn slots(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, InfraError> {
        self.slots
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("slot store lock poisoned: {error}")))
    }
}

impl SlotStore for InMemorySlotStore {
    fn load(&self, namespace: &str) -> Result<Option<String>, InfraError> {
        Ok(self.slots()?.get(namespace).cloned())
    }

    fn save(&self, namespace: &str, payload: &str) -> Result<(), InfraError> {
        self.slots()?
            .insert(namespace.to_string(), payload.to_string());
        Ok(())
    }

    fn remove(&self, namespace: &str) -> Result<(), InfraError> {
        self.slots()?.remove(namespace);
        Ok(())
    }
}
