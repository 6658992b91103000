//! Identity provider: authenticates users and keeps the current session.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::config::UserConfig;
use crate::error::SyncError;
use crate::model::Identity;

/// Contract for whatever authenticates users.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
  /// Check a username/secret pair and start a session.
  async fn authenticate(&self, username: &str, secret: &str) -> Result<Identity, SyncError>;

  /// The identity of the active session, if any.
  async fn current_session(&self) -> Result<Option<Identity>, SyncError>;

  /// End the active session. Ending when no session exists is not an error.
  async fn end_session(&self) -> Result<(), SyncError>;
}

/// Hex-encoded SHA-256 digest of a password, as stored in the config file.
pub fn password_digest(secret: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(secret.as_bytes());
  hex::encode(hasher.finalize())
}

/// Persisted session marker
#[derive(Debug, Serialize, Deserialize)]
struct SessionFile {
  user_id: String,
  started_at: DateTime<Utc>,
}

/// Identity provider backed by the configured user list.
///
/// The active session is persisted as a small JSON file so a later process can
/// restore it.
pub struct LocalIdentityProvider {
  users: Vec<UserConfig>,
  session_path: PathBuf,
}

impl LocalIdentityProvider {
  pub fn new(users: Vec<UserConfig>, session_path: PathBuf) -> Self {
    Self {
      users,
      session_path,
    }
  }

  fn find_by_id(&self, id: &str) -> Option<&UserConfig> {
    self.users.iter().find(|u| u.id == id)
  }

  fn write_session(&self, user_id: &str) -> Result<(), SyncError> {
    if let Some(parent) = self.session_path.parent() {
      std::fs::create_dir_all(parent).map_err(SyncError::transient)?;
    }
    let session = SessionFile {
      user_id: user_id.to_string(),
      started_at: Utc::now(),
    };
    let json = serde_json::to_string(&session).map_err(SyncError::transient)?;
    std::fs::write(&self.session_path, json).map_err(SyncError::transient)
  }

  fn remove_session(&self) -> Result<(), SyncError> {
    match std::fs::remove_file(&self.session_path) {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(SyncError::transient(e)),
    }
  }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
  async fn authenticate(&self, username: &str, secret: &str) -> Result<Identity, SyncError> {
    let digest = password_digest(secret);
    let user = self
      .users
      .iter()
      .find(|u| u.username == username && u.password_sha256.eq_ignore_ascii_case(&digest))
      .ok_or(SyncError::InvalidCredentials)?;

    self.write_session(&user.id)?;
    info!(user = %user.id, "Session started");
    Ok(user.identity())
  }

  async fn current_session(&self) -> Result<Option<Identity>, SyncError> {
    let contents = match std::fs::read_to_string(&self.session_path) {
      Ok(contents) => contents,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(SyncError::transient(e)),
    };

    let session: SessionFile = match serde_json::from_str(&contents) {
      Ok(session) => session,
      Err(e) => {
        warn!(error = %e, "Discarding unreadable session file");
        self.remove_session()?;
        return Ok(None);
      }
    };

    match self.find_by_id(&session.user_id) {
      Some(user) => {
        debug!(user = %user.id, started_at = %session.started_at, "Restored session");
        Ok(Some(user.identity()))
      }
      None => {
        warn!(user = %session.user_id, "Session user is no longer configured, ending session");
        self.remove_session()?;
        Ok(None)
      }
    }
  }

  async fn end_session(&self) -> Result<(), SyncError> {
    self.remove_session()
  }
}
