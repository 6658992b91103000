//! Session lifecycle: wires identity transitions into the sync engine.

use std::sync::Arc;
use tracing::{info, warn};

use crate::error::SyncError;
use crate::identity::IdentityProvider;
use crate::model::Identity;
use crate::store::RecordStore;
use crate::sync::SyncEngine;

/// Owns the identity provider and the sync engine for one client.
pub struct Session<P, S: RecordStore> {
  provider: P,
  engine: Arc<SyncEngine<S>>,
}

impl<P: IdentityProvider, S: RecordStore + 'static> Session<P, S> {
  pub fn new(provider: P, engine: Arc<SyncEngine<S>>) -> Self {
    Self { provider, engine }
  }

  pub fn engine(&self) -> &SyncEngine<S> {
    &self.engine
  }

  pub fn current(&self) -> Option<Identity> {
    self.engine.identity()
  }

  /// Authenticate and load the new identity's records.
  pub async fn login(&self, username: &str, secret: &str) -> Result<Identity, SyncError> {
    let identity = self.provider.authenticate(username, secret).await?;
    info!(user = %identity.id, role = ?identity.role, "Logged in");
    self.engine.on_identity_change(Some(identity.clone())).await;
    Ok(identity)
  }

  /// Pick up a session left by an earlier run, if there is one.
  pub async fn restore(&self) -> Result<Option<Identity>, SyncError> {
    let identity = self.provider.current_session().await?;
    if let Some(identity) = &identity {
      info!(user = %identity.id, "Restoring session");
    }
    self.engine.on_identity_change(identity.clone()).await;
    Ok(identity)
  }

  /// Flush pending saves, clear the cache and end the provider session.
  ///
  /// Failing to end the provider session does not stop the local teardown.
  pub async fn logout(&self) {
    self.engine.on_identity_change(None).await;
    if let Err(e) = self.provider.end_session().await {
      warn!(error = %e, "Failed to end session, continuing with local logout");
    }
    info!("Logged out");
  }
}
