use thiserror::Error;

/// Errors surfaced by the sync layer and its collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum SyncError {
  /// A teacher-only or owner-only write was attempted by someone else
  #[error("permission denied: {0}")]
  PermissionDenied(String),

  /// The remote store has no document for this student
  #[error("record not found: {0}")]
  RecordNotFound(String),

  /// Any other remote I/O failure during load or save
  #[error("sync failed: {0}")]
  TransientSyncFailure(String),

  #[error("invalid username or password")]
  InvalidCredentials,

  #[error("invalid input: {0}")]
  InvalidInput(String),
}

impl SyncError {
  pub fn transient(e: impl std::fmt::Display) -> Self {
    SyncError::TransientSyncFailure(e.to_string())
  }
}

impl From<rusqlite::Error> for SyncError {
  fn from(e: rusqlite::Error) -> Self {
    SyncError::transient(e)
  }
}
