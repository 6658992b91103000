//! SQLite-backed record store.
//!
//! Used as the document store when running the CLI against a local database.
//! Every update replaces the whole document (last write wins); the
//! `updated_at` column records when that happened.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use super::{AccessGrant, RecordStore, SerializedRecord};
use crate::error::SyncError;

/// SQLite document store for student records.
pub struct SqliteRecordStore {
  conn: Mutex<Connection>,
}

impl SqliteRecordStore {
  /// Open the store at `path`, or at the default location when `None`.
  pub fn open(path: Option<&Path>) -> Result<Self> {
    let path = match path {
      Some(p) => p.to_path_buf(),
      None => Self::default_path()?,
    };

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create store directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open record store at {}: {}", path.display(), e))?;

    Self::from_connection(conn)
  }

  /// Open a throwaway in-memory store.
  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory store: {}", e))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    conn
      .execute_batch(STORE_SCHEMA)
      .map_err(|e| eyre!("Failed to run store migrations: {}", e))?;

    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  /// Get the default database path.
  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("vocab-sync").join("records.db"))
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>, SyncError> {
    self
      .conn
      .lock()
      .map_err(|e| SyncError::transient(format!("Lock poisoned: {}", e)))
  }

  /// Users granted `permission` on a record.
  #[cfg(test)]
  pub fn grantees(&self, student_id: &str, permission: &str) -> Result<Vec<String>, SyncError> {
    let conn = self.lock()?;
    let mut stmt = conn.prepare(
      "SELECT user_id FROM record_grants
       WHERE student_id = ? AND permission = ?
       ORDER BY user_id",
    )?;
    let users = stmt
      .query_map(params![student_id, permission], |row| row.get(0))?
      .collect::<Result<Vec<String>, _>>()?;
    Ok(users)
  }
}

/// Schema for the record store.
const STORE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS student_records (
    student_id TEXT PRIMARY KEY,
    round_attempts TEXT NOT NULL,
    offline_grades TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS record_grants (
    student_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    permission TEXT NOT NULL,
    PRIMARY KEY (student_id, user_id, permission),
    FOREIGN KEY (student_id) REFERENCES student_records(student_id) ON DELETE CASCADE
);
"#;

#[async_trait]
impl RecordStore for SqliteRecordStore {
  async fn get_record(&self, student_id: &str) -> Result<SerializedRecord, SyncError> {
    let conn = self.lock()?;
    conn
      .query_row(
        "SELECT round_attempts, offline_grades FROM student_records WHERE student_id = ?",
        params![student_id],
        |row| {
          Ok(SerializedRecord {
            round_attempts: row.get(0)?,
            offline_grades: row.get(1)?,
          })
        },
      )
      .optional()?
      .ok_or_else(|| SyncError::RecordNotFound(student_id.to_string()))
  }

  async fn list_all_records(&self) -> Result<Vec<(String, SerializedRecord)>, SyncError> {
    let conn = self.lock()?;
    let mut stmt = conn.prepare(
      "SELECT student_id, round_attempts, offline_grades FROM student_records
       ORDER BY student_id",
    )?;
    let records = stmt
      .query_map([], |row| {
        Ok((
          row.get(0)?,
          SerializedRecord {
            round_attempts: row.get(1)?,
            offline_grades: row.get(2)?,
          },
        ))
      })?
      .collect::<Result<Vec<_>, _>>()?;
    Ok(records)
  }

  async fn create_record(
    &self,
    student_id: &str,
    record: SerializedRecord,
    grants: &[AccessGrant],
  ) -> Result<(), SyncError> {
    let mut conn = self.lock()?;
    let tx = conn.transaction()?;

    tx.execute(
      "INSERT OR REPLACE INTO student_records (student_id, round_attempts, offline_grades, created_at, updated_at)
       VALUES (?, ?, ?, datetime('now'), datetime('now'))",
      params![student_id, record.round_attempts, record.offline_grades],
    )?;

    for grant in grants {
      tx.execute(
        "INSERT OR IGNORE INTO record_grants (student_id, user_id, permission) VALUES (?, ?, ?)",
        params![student_id, grant.user_id, grant.permission.as_str()],
      )?;
    }

    tx.commit()?;
    debug!(student_id, grants = grants.len(), "Created student record");
    Ok(())
  }

  async fn update_record(
    &self,
    student_id: &str,
    record: SerializedRecord,
  ) -> Result<(), SyncError> {
    let conn = self.lock()?;
    let changed = conn.execute(
      "UPDATE student_records
       SET round_attempts = ?, offline_grades = ?, updated_at = datetime('now')
       WHERE student_id = ?",
      params![record.round_attempts, record.offline_grades, student_id],
    )?;

    if changed == 0 {
      return Err(SyncError::RecordNotFound(student_id.to_string()));
    }
    debug!(student_id, "Updated student record");
    Ok(())
  }
}
