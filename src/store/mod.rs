//! Remote student-record store.
//!
//! The store is a document collection keyed by student id. Each document
//! carries two text fields holding JSON-encoded collections:
//! - `roundAttempts`: map of round key to attempt
//! - `offlineGrades`: list of grades in insertion order
//!
//! Encoding and decoding happen here, at the adapter boundary, so the sync
//! engine only ever sees `StudentRecord`.

mod codec;
#[cfg(test)]
pub mod memory;
mod sqlite;

use async_trait::async_trait;

use crate::error::SyncError;

pub use codec::{decode_record, encode_record};
pub use sqlite::SqliteRecordStore;

/// Document shape as persisted by the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedRecord {
  pub round_attempts: String,
  pub offline_grades: String,
}

/// What a grantee may do with a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
  Read,
  Update,
}

impl Permission {
  pub fn as_str(&self) -> &'static str {
    match self {
      Permission::Read => "read",
      Permission::Update => "update",
    }
  }
}

/// Per-user access grant attached to a record when it is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGrant {
  pub user_id: String,
  pub permission: Permission,
}

impl AccessGrant {
  /// Read and update access for each of `user_ids`.
  pub fn read_write(user_ids: &[&str]) -> Vec<AccessGrant> {
    user_ids
      .iter()
      .flat_map(|id| {
        [Permission::Read, Permission::Update].map(|permission| AccessGrant {
          user_id: id.to_string(),
          permission,
        })
      })
      .collect()
  }
}

/// Contract for the remote document store holding student records.
#[async_trait]
pub trait RecordStore: Send + Sync {
  /// Fetch one student's document.
  ///
  /// Returns `SyncError::RecordNotFound` when no document exists.
  async fn get_record(&self, student_id: &str) -> Result<SerializedRecord, SyncError>;

  /// Fetch every student document (teacher-only capability).
  async fn list_all_records(&self) -> Result<Vec<(String, SerializedRecord)>, SyncError>;

  /// Create a document with the given access grants.
  async fn create_record(
    &self,
    student_id: &str,
    record: SerializedRecord,
    grants: &[AccessGrant],
  ) -> Result<(), SyncError>;

  /// Replace an existing document.
  ///
  /// Returns `SyncError::RecordNotFound` when no document exists.
  async fn update_record(&self, student_id: &str, record: SerializedRecord)
    -> Result<(), SyncError>;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_read_write_grants_cover_both_permissions() {
    let grants = AccessGrant::read_write(&["s1", "t1"]);
    assert_eq!(grants.len(), 4);
    assert!(grants.contains(&AccessGrant {
      user_id: "t1".to_string(),
      permission: Permission::Update,
    }));
    assert_eq!(grants[0].permission.as_str(), "read");
  }
}
