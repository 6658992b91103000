//! JSON-in-document encoding for student records.

use std::collections::HashMap;

use tracing::warn;

use super::SerializedRecord;
use crate::model::{Attempt, Grade, StudentRecord};

/// Encode a record into the two text fields the store persists.
pub fn encode_record(record: &StudentRecord) -> Result<SerializedRecord, serde_json::Error> {
  Ok(SerializedRecord {
    round_attempts: serde_json::to_string(&record.round_attempts)?,
    offline_grades: serde_json::to_string(&record.offline_grades)?,
  })
}

/// Decode a stored document.
///
/// Empty or unparseable fields fall back to the empty collection so a single
/// corrupt field never hides the rest of the record.
pub fn decode_record(student_id: &str, raw: &SerializedRecord) -> StudentRecord {
  let round_attempts = parse_or_default::<HashMap<String, Attempt>>(
    student_id,
    "roundAttempts",
    &raw.round_attempts,
  );
  let offline_grades =
    parse_or_default::<Vec<Grade>>(student_id, "offlineGrades", &raw.offline_grades);

  StudentRecord {
    round_attempts,
    offline_grades,
  }
}

fn parse_or_default<T>(student_id: &str, field: &str, text: &str) -> T
where
  T: serde::de::DeserializeOwned + Default,
{
  if text.trim().is_empty() {
    return T::default();
  }
  match serde_json::from_str(text) {
    Ok(value) => value,
    Err(e) => {
      warn!(student_id, field, error = %e, "Discarding unparseable record field");
      T::default()
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::WordError;
  use chrono::{TimeZone, Utc};

  fn sample_record() -> StudentRecord {
    let attempt = Attempt {
      unit_id: "unit1".to_string(),
      round_id: "round1-1".to_string(),
      score: 80,
      errors: vec![WordError {
        word_id: "w3".to_string(),
        incorrect_answer: "cow".to_string(),
      }],
      completed_at: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
    };
    StudentRecord::default().with_attempt(attempt)
  }

  #[test]
  fn test_encode_produces_json_text_fields() {
    let encoded = encode_record(&sample_record()).unwrap();
    assert!(encoded.round_attempts.contains("\"unit1-round1-1\""));
    assert!(encoded.round_attempts.contains("\"incorrectAnswer\":\"cow\""));
    assert_eq!(encoded.offline_grades, "[]");
  }

  #[test]
  fn test_decode_reads_encoded_record() {
    let record = sample_record();
    let encoded = encode_record(&record).unwrap();
    assert_eq!(decode_record("s1", &encoded), record);
  }

  #[test]
  fn test_decode_empty_fields_default() {
    let raw = SerializedRecord {
      round_attempts: String::new(),
      offline_grades: "  ".to_string(),
    };
    assert_eq!(decode_record("s1", &raw), StudentRecord::default());
  }

  #[test]
  fn test_decode_corrupt_field_keeps_the_other() {
    let good = encode_record(&sample_record()).unwrap();
    let raw = SerializedRecord {
      round_attempts: good.round_attempts,
      offline_grades: "{not json".to_string(),
    };
    let decoded = decode_record("s1", &raw);
    assert_eq!(decoded.round_attempts.len(), 1);
    assert!(decoded.offline_grades.is_empty());
  }
}
