//! In-memory record store with a call journal, for tests.

use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use super::{AccessGrant, RecordStore, SerializedRecord};
use crate::error::SyncError;

/// One call observed by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
  Get(String),
  List,
  Create(String, SerializedRecord, Vec<AccessGrant>),
  Update(String, SerializedRecord),
}

#[derive(Default)]
struct Inner {
  docs: BTreeMap<String, SerializedRecord>,
  calls: Vec<StoreCall>,
  /// Errors returned (in order) by the next calls, before touching `docs`
  failures: VecDeque<SyncError>,
}

#[derive(Default)]
pub struct MemoryRecordStore {
  inner: Mutex<Inner>,
}

impl MemoryRecordStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_doc(self, student_id: &str, doc: SerializedRecord) -> Self {
    self
      .inner
      .lock()
      .unwrap()
      .docs
      .insert(student_id.to_string(), doc);
    self
  }

  /// Make the next call fail with `err`.
  pub fn fail_next(&self, err: SyncError) {
    self.inner.lock().unwrap().failures.push_back(err);
  }

  pub fn calls(&self) -> Vec<StoreCall> {
    self.inner.lock().unwrap().calls.clone()
  }

  pub fn writes(&self) -> Vec<StoreCall> {
    self
      .calls()
      .into_iter()
      .filter(|c| matches!(c, StoreCall::Create(..) | StoreCall::Update(..)))
      .collect()
  }

  pub fn doc(&self, student_id: &str) -> Option<SerializedRecord> {
    self.inner.lock().unwrap().docs.get(student_id).cloned()
  }

  fn record(&self, call: StoreCall) -> Result<std::sync::MutexGuard<'_, Inner>, SyncError> {
    let mut inner = self.inner.lock().unwrap();
    inner.calls.push(call);
    match inner.failures.pop_front() {
      Some(err) => Err(err),
      None => Ok(inner),
    }
  }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
  async fn get_record(&self, student_id: &str) -> Result<SerializedRecord, SyncError> {
    let inner = self.record(StoreCall::Get(student_id.to_string()))?;
    inner
      .docs
      .get(student_id)
      .cloned()
      .ok_or_else(|| SyncError::RecordNotFound(student_id.to_string()))
  }

  async fn list_all_records(&self) -> Result<Vec<(String, SerializedRecord)>, SyncError> {
    let inner = self.record(StoreCall::List)?;
    Ok(
      inner
        .docs
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect(),
    )
  }

  async fn create_record(
    &self,
    student_id: &str,
    record: SerializedRecord,
    grants: &[AccessGrant],
  ) -> Result<(), SyncError> {
    let mut inner = self.record(StoreCall::Create(
      student_id.to_string(),
      record.clone(),
      grants.to_vec(),
    ))?;
    inner.docs.insert(student_id.to_string(), record);
    Ok(())
  }

  async fn update_record(
    &self,
    student_id: &str,
    record: SerializedRecord,
  ) -> Result<(), SyncError> {
    let mut inner = self.record(StoreCall::Update(student_id.to_string(), record.clone()))?;
    match inner.docs.get_mut(student_id) {
      Some(doc) => {
        *doc = record;
        Ok(())
      }
      None => Err(SyncError::RecordNotFound(student_id.to_string())),
    }
  }
}
