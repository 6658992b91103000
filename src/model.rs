//! Domain types shared by the sync engine, the stores and the CLI.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Role of an authenticated user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  Student,
  Teacher,
}

/// An authenticated user as seen by the sync layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
  pub id: String,
  pub role: Role,
  pub name: String,
}

impl Identity {
  pub fn is_teacher(&self) -> bool {
    self.role == Role::Teacher
  }
}

/// A word the student got wrong during a quiz
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordError {
  pub word_id: String,
  pub incorrect_answer: String,
}

/// A completed quiz result for one student on one round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
  pub unit_id: String,
  pub round_id: String,
  /// Percentage 0-100
  pub score: u8,
  /// Only wrong answers, in the order they were encountered
  pub errors: Vec<WordError>,
  pub completed_at: DateTime<Utc>,
}

impl Attempt {
  /// Key of this attempt inside `StudentRecord::round_attempts`.
  pub fn key(&self) -> String {
    round_key(&self.unit_id, &self.round_id)
  }
}

/// Composite key for a unit/round pair.
pub fn round_key(unit_id: &str, round_id: &str) -> String {
  format!("{}-{}", unit_id, round_id)
}

/// Offline test grades are on the 2..=5 scale.
pub const GRADE_RANGE: std::ops::RangeInclusive<u8> = 2..=5;

/// A manually assigned offline-test grade
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
  pub id: String,
  pub student_id: String,
  pub test_name: String,
  pub grade: u8,
  pub assigned_at: DateTime<Utc>,
  /// Id of the assigning teacher
  pub assigned_by: String,
}

/// What a teacher supplies when recording a grade
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradeInput {
  pub student_id: String,
  pub test_name: String,
  pub grade: u8,
}

/// Everything stored for one student
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudentRecord {
  pub round_attempts: HashMap<String, Attempt>,
  pub offline_grades: Vec<Grade>,
}

impl StudentRecord {
  /// Copy of this record with `attempt` stored under its round key.
  pub fn with_attempt(&self, attempt: Attempt) -> Self {
    let mut next = self.clone();
    next.round_attempts.insert(attempt.key(), attempt);
    next
  }

  /// Copy of this record with `grade` appended.
  pub fn with_grade(&self, grade: Grade) -> Self {
    let mut next = self.clone();
    next.offline_grades.push(grade);
    next
  }
}

/// Which student records the current viewer may see.
///
/// Resolved once when an identity is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Scope {
  #[default]
  Anonymous,
  Student(String),
  Teacher,
}

impl Scope {
  pub fn for_identity(identity: Option<&Identity>) -> Self {
    match identity {
      None => Scope::Anonymous,
      Some(i) if i.is_teacher() => Scope::Teacher,
      Some(i) => Scope::Student(i.id.clone()),
    }
  }

  /// Whether records of `student_id` are visible in this scope.
  pub fn covers(&self, student_id: &str) -> bool {
    match self {
      Scope::Anonymous => false,
      Scope::Student(id) => id == student_id,
      Scope::Teacher => true,
    }
  }
}
