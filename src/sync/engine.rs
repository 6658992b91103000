//! Sync engine: in-memory student-record cache with debounced persistence.

use chrono::Utc;
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::debounce::{DebounceError, Debouncer};
use crate::error::SyncError;
use crate::model::{
  round_key, Attempt, Grade, GradeInput, Identity, Scope, StudentRecord, GRADE_RANGE,
};
use crate::store::{decode_record, encode_record, AccessGrant, RecordStore, SerializedRecord};

/// Tunables for the sync engine.
#[derive(Debug, Clone)]
pub struct SyncSettings {
  /// Quiescence window before a remote save is attempted
  pub debounce: Duration,
  /// Teacher granted access to every record the engine creates
  pub designated_teacher: String,
}

#[derive(Default)]
struct EngineState {
  identity: Option<Identity>,
  scope: Scope,
  cache: HashMap<String, StudentRecord>,
  loading: bool,
  /// Whether `cache` reflects a successful load of the current scope
  loaded: bool,
  /// Bumped on every identity change; a load only applies if it still matches
  epoch: u64,
}

type Saver = Debouncer<StudentRecord, SyncError>;

/// Mediates every read and write of student records.
///
/// Writes update the cache synchronously and schedule a debounced save of the
/// student's full record. There is one coalescer per student, so the store
/// always receives the latest snapshot of each record.
pub struct SyncEngine<S: RecordStore> {
  store: Arc<S>,
  settings: SyncSettings,
  state: Mutex<EngineState>,
  savers: Mutex<HashMap<String, Saver>>,
}

impl<S: RecordStore + 'static> SyncEngine<S> {
  pub fn new(store: Arc<S>, settings: SyncSettings) -> Self {
    Self {
      store,
      settings,
      state: Mutex::new(EngineState::default()),
      savers: Mutex::new(HashMap::new()),
    }
  }

  /// Populate the cache for `identity`, replacing whatever was there.
  ///
  /// Teachers get every record; students get their own, created remotely if
  /// it does not exist yet. Fetch failures are logged and leave the cache as
  /// it was for the same identity.
  pub async fn load_for_identity(
    &self,
    identity: Option<&Identity>,
  ) -> HashMap<String, StudentRecord> {
    let scope = Scope::for_identity(identity);
    let epoch = {
      let mut state = self.lock_state();
      state.epoch += 1;
      if state.scope != scope {
        state.cache.clear();
        state.loaded = false;
      }
      state.identity = identity.cloned();
      state.scope = scope.clone();
      state.loading = identity.is_some();
      state.epoch
    };

    let fetched = match &scope {
      Scope::Anonymous => Ok(HashMap::new()),
      Scope::Teacher => self.fetch_all().await,
      Scope::Student(student_id) => self.fetch_or_create(student_id).await,
    };

    let mut state = self.lock_state();
    if state.epoch != epoch {
      debug!("Discarding load result for a superseded identity");
      return state.cache.clone();
    }
    state.loading = false;
    match fetched {
      Ok(records) => {
        info!(records = records.len(), scope = ?scope, "Loaded student records");
        state.cache = records;
        state.loaded = true;
      }
      Err(e) => {
        error!(error = %e, scope = ?scope, "Failed to load student records");
      }
    }
    state.cache.clone()
  }

  async fn fetch_all(&self) -> Result<HashMap<String, StudentRecord>, SyncError> {
    let docs = self.store.list_all_records().await?;
    Ok(
      docs
        .into_iter()
        .map(|(id, doc)| {
          let record = decode_record(&id, &doc);
          (id, record)
        })
        .collect(),
    )
  }

  async fn fetch_or_create(
    &self,
    student_id: &str,
  ) -> Result<HashMap<String, StudentRecord>, SyncError> {
    let record = match self.store.get_record(student_id).await {
      Ok(doc) => decode_record(student_id, &doc),
      Err(SyncError::RecordNotFound(_)) => {
        info!(student_id, "No remote record yet, creating an empty one");
        let empty = StudentRecord::default();
        let doc = encode_record(&empty).map_err(SyncError::transient)?;
        let grants = self.grants_for(student_id);
        if let Err(e) = self.store.create_record(student_id, doc, &grants).await {
          // The next save retries creation through the update fallback
          warn!(student_id, error = %e, "Failed to create empty student record");
        }
        empty
      }
      Err(e) => return Err(e),
    };

    Ok(HashMap::from([(student_id.to_string(), record)]))
  }

  /// Cached attempt for one unit/round pair.
  pub fn get_attempt(&self, student_id: &str, unit_id: &str, round_id: &str) -> Option<Attempt> {
    let state = self.lock_state();
    state
      .cache
      .get(student_id)
      .and_then(|record| record.round_attempts.get(&round_key(unit_id, round_id)))
      .cloned()
  }

  /// Every cached attempt of a student, ordered by round key.
  pub fn get_attempts(&self, student_id: &str) -> Vec<Attempt> {
    let state = self.lock_state();
    let Some(record) = state.cache.get(student_id) else {
      return Vec::new();
    };
    let mut attempts: Vec<(&String, &Attempt)> = record.round_attempts.iter().collect();
    attempts.sort_by(|a, b| a.0.cmp(b.0));
    attempts.into_iter().map(|(_, a)| a.clone()).collect()
  }

  /// Store an attempt for the signed-in student and schedule a save.
  ///
  /// A later attempt for the same unit/round replaces the earlier one.
  pub fn save_attempt(&self, student_id: &str, attempt: Attempt) -> Result<(), SyncError> {
    if attempt.score > 100 {
      return Err(SyncError::InvalidInput(format!(
        "score {} is outside 0-100",
        attempt.score
      )));
    }

    let snapshot = {
      let mut state = self.lock_state();
      match &state.identity {
        Some(identity) if identity.id == student_id => {}
        _ => {
          warn!(student_id, "Rejected attempt save for another user's record");
          return Err(SyncError::PermissionDenied(format!(
            "only {} may save their own attempts",
            student_id
          )));
        }
      }
      ensure_loaded(&state, student_id)?;
      let record = state
        .cache
        .get(student_id)
        .cloned()
        .unwrap_or_default()
        .with_attempt(attempt);
      state.cache.insert(student_id.to_string(), record.clone());
      record
    };

    self.schedule_save(student_id, snapshot);
    Ok(())
  }

  /// Cached offline grades of a student, most recent first.
  pub fn get_offline_grades(&self, student_id: &str) -> Vec<Grade> {
    let state = self.lock_state();
    let mut grades = state
      .cache
      .get(student_id)
      .map(|record| record.offline_grades.clone())
      .unwrap_or_default();
    grades.sort_by(|a, b| b.assigned_at.cmp(&a.assigned_at));
    grades
  }

  /// Record an offline grade on behalf of `acting`, who must be a teacher.
  pub fn add_offline_grade(
    &self,
    input: GradeInput,
    acting: &Identity,
  ) -> Result<Grade, SyncError> {
    if !acting.is_teacher() {
      warn!(user = %acting.id, "Rejected grade from a non-teacher");
      return Err(SyncError::PermissionDenied(
        "only a teacher can add grades".to_string(),
      ));
    }
    if !GRADE_RANGE.contains(&input.grade) {
      return Err(SyncError::InvalidInput(format!(
        "grade {} is outside {}-{}",
        input.grade,
        GRADE_RANGE.start(),
        GRADE_RANGE.end()
      )));
    }
    if input.student_id.trim().is_empty() || input.test_name.trim().is_empty() {
      return Err(SyncError::InvalidInput(
        "student and test name are required".to_string(),
      ));
    }

    let grade = Grade {
      id: Uuid::new_v4().to_string(),
      student_id: input.student_id,
      test_name: input.test_name.trim().to_string(),
      grade: input.grade,
      assigned_at: Utc::now(),
      assigned_by: acting.id.clone(),
    };

    let snapshot = {
      let mut state = self.lock_state();
      ensure_loaded(&state, &grade.student_id)?;
      let record = state
        .cache
        .get(&grade.student_id)
        .cloned()
        .unwrap_or_default()
        .with_grade(grade.clone());
      state.cache.insert(grade.student_id.clone(), record.clone());
      record
    };

    self.schedule_save(&grade.student_id, snapshot);
    Ok(grade)
  }

  /// Write every pending save now.
  ///
  /// All students are flushed even if one fails; the first failure is
  /// returned.
  pub async fn flush_pending_saves(&self) -> Result<(), SyncError> {
    let savers: Vec<(String, Saver)> = self
      .lock_savers()
      .iter()
      .map(|(id, saver)| (id.clone(), saver.clone()))
      .collect();

    let mut first_error = None;
    for (student_id, saver) in savers {
      if let Err(e) = saver.flush().await {
        warn!(student_id, error = %e, "Flush failed");
        first_error.get_or_insert(e);
      }
    }

    match first_error {
      Some(e) => Err(e),
      None => Ok(()),
    }
  }

  /// React to the acting identity changing.
  ///
  /// Pending saves of the outgoing identity are flushed before the cache is
  /// reset, so a final mutation is never lost to teardown.
  pub async fn on_identity_change(&self, next: Option<Identity>) {
    let previous = self.lock_state().identity.clone();
    if previous == next {
      // Same identity keeps its cache and pending saves
      return;
    }

    if previous.is_some() {
      if let Err(e) = self.flush_pending_saves().await {
        warn!(error = %e, "Pending saves failed during identity change");
      }
      for (_, saver) in self.lock_savers().drain() {
        saver.cancel();
      }
    }

    match next {
      Some(identity) => {
        self.load_for_identity(Some(&identity)).await;
      }
      None => {
        let mut state = self.lock_state();
        state.epoch += 1;
        state.cache.clear();
        state.identity = None;
        state.scope = Scope::Anonymous;
        state.loading = false;
        state.loaded = false;
        if let Some(previous) = previous {
          info!(user = %previous.id, "Cleared cache after logout");
        }
      }
    }
  }

  pub fn identity(&self) -> Option<Identity> {
    self.lock_state().identity.clone()
  }

  pub fn scope(&self) -> Scope {
    self.lock_state().scope.clone()
  }

  /// Snapshot of every cached record.
  pub fn records(&self) -> HashMap<String, StudentRecord> {
    self.lock_state().cache.clone()
  }

  pub fn is_loading(&self) -> bool {
    self.lock_state().loading
  }

  /// Whether any save is currently being written.
  pub fn is_saving(&self) -> bool {
    self.lock_savers().values().any(Saver::is_writing)
  }

  /// Whether any save is still waiting for its window.
  pub fn has_pending_saves(&self) -> bool {
    self.lock_savers().values().any(Saver::is_pending)
  }

  fn schedule_save(&self, student_id: &str, record: StudentRecord) {
    let pending = self.saver_for(student_id).call(record);
    let student_id = student_id.to_string();

    tokio::spawn(async move {
      match pending.await {
        Ok(()) => debug!(student_id, "Saved student record"),
        Err(DebounceError::Cancelled) => debug!(student_id, "Save superseded"),
        Err(DebounceError::Failed(e)) => {
          error!(student_id, error = %e, "Failed to save student record");
        }
      }
    });
  }

  fn saver_for(&self, student_id: &str) -> Saver {
    self
      .lock_savers()
      .entry(student_id.to_string())
      .or_insert_with(|| self.new_saver(student_id))
      .clone()
  }

  fn new_saver(&self, student_id: &str) -> Saver {
    let store = Arc::clone(&self.store);
    let student_id = student_id.to_string();
    let grants = self.grants_for(&student_id);

    Debouncer::new(self.settings.debounce, move |record: StudentRecord| {
      let store = Arc::clone(&store);
      let student_id = student_id.clone();
      let grants = grants.clone();
      async move { persist(store.as_ref(), &student_id, &grants, &record).await }.boxed()
    })
  }

  fn grants_for(&self, student_id: &str) -> Vec<AccessGrant> {
    let teacher = self.settings.designated_teacher.as_str();
    if teacher.is_empty() || teacher == student_id {
      AccessGrant::read_write(&[student_id])
    } else {
      AccessGrant::read_write(&[student_id, teacher])
    }
  }

  fn lock_state(&self) -> MutexGuard<'_, EngineState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn lock_savers(&self) -> MutexGuard<'_, HashMap<String, Saver>> {
    self.savers.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

/// Writes replace the whole remote document, so they are only allowed once the
/// student's record has been loaded. A student missing from a successful
/// load has no remote document yet.
fn ensure_loaded(state: &EngineState, student_id: &str) -> Result<(), SyncError> {
  if state.loaded && state.scope.covers(student_id) {
    return Ok(());
  }
  warn!(student_id, "Rejected write before the record was loaded");
  Err(SyncError::TransientSyncFailure(format!(
    "record of {} has not been loaded",
    student_id
  )))
}

/// Write a full record, creating the document if the store has none.
async fn persist<S: RecordStore + ?Sized>(
  store: &S,
  student_id: &str,
  grants: &[AccessGrant],
  record: &StudentRecord,
) -> Result<(), SyncError> {
  let doc: SerializedRecord = encode_record(record).map_err(SyncError::transient)?;

  match store.update_record(student_id, doc.clone()).await {
    Ok(()) => Ok(()),
    Err(SyncError::RecordNotFound(_)) => {
      info!(student_id, "Record missing on save, creating it");
      store.create_record(student_id, doc, grants).await
    }
    Err(e) => Err(e),
  }
}
