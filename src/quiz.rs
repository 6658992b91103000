//! Quiz scoring and progress summaries.

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::curriculum::{Curriculum, Round};
use crate::model::{Attempt, WordError};

/// Whether a typed answer matches the expected term.
///
/// Surrounding whitespace and letter case are ignored.
pub fn is_correct(answer: &str, term: &str) -> bool {
  answer.trim().to_lowercase() == term.trim().to_lowercase()
}

/// Grade typed answers for `round` into an attempt.
///
/// Answers are matched to words by position; a missing answer counts as
/// wrong. The score is the rounded percentage of correct answers.
pub fn grade_round(
  unit_id: &str,
  round: &Round,
  answers: &[String],
  completed_at: DateTime<Utc>,
) -> Attempt {
  let errors: Vec<WordError> = round
    .words
    .iter()
    .enumerate()
    .filter_map(|(i, word)| {
      let answer = answers.get(i).map(String::as_str).unwrap_or("");
      (!is_correct(answer, &word.term)).then(|| WordError {
        word_id: word.id.clone(),
        incorrect_answer: answer.trim().to_string(),
      })
    })
    .collect();

  Attempt {
    unit_id: unit_id.to_string(),
    round_id: round.id.clone(),
    score: percentage(round.words.len() - errors.len(), round.words.len()),
    errors,
    completed_at,
  }
}

/// Share of curriculum rounds with at least one attempt, as a percentage.
pub fn overall_progress(attempts: &[Attempt], curriculum: &Curriculum) -> u8 {
  let completed: HashSet<String> = attempts.iter().map(Attempt::key).collect();
  percentage(completed.len(), curriculum.total_rounds())
}

fn percentage(part: usize, whole: usize) -> u8 {
  if whole == 0 {
    return 0;
  }
  let pct = (part as f64 / whole as f64 * 100.0).round();
  pct.clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::curriculum::tests::sample;

  fn answers(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
  }

  #[test]
  fn test_one_wrong_word_scores_80() {
    let curriculum = sample();
    let round = curriculum.round("unit1", "round1-1").unwrap();

    let attempt = grade_round(
      "unit1",
      round,
      &answers(&["hi", "Hello ", "cow", "good morning", "GOOD NIGHT"]),
      Utc::now(),
    );

    assert_eq!(attempt.score, 80);
    assert_eq!(attempt.key(), "unit1-round1-1");
    assert_eq!(
      attempt.errors,
      vec![WordError {
        word_id: "w3".to_string(),
        incorrect_answer: "cow".to_string(),
      }]
    );
  }

  #[test]
  fn test_missing_answers_count_as_wrong() {
    let curriculum = sample();
    let round = curriculum.round("unit1", "round1-1").unwrap();

    let attempt = grade_round("unit1", round, &answers(&["hi", "  "]), Utc::now());

    assert_eq!(attempt.score, 20);
    let missed: Vec<&str> = attempt.errors.iter().map(|e| e.word_id.as_str()).collect();
    assert_eq!(missed, vec!["w2", "w3", "w4", "w5"]);
    assert_eq!(attempt.errors[0].incorrect_answer, "");
  }

  #[test]
  fn test_empty_round_scores_zero() {
    let round = Round {
      id: "r".to_string(),
      name: "Empty".to_string(),
      words: Vec::new(),
    };
    assert_eq!(grade_round("u", &round, &[], Utc::now()).score, 0);
  }

  #[test]
  fn test_overall_progress_counts_unique_rounds() {
    let curriculum = sample();
    let round = curriculum.round("unit1", "round1-1").unwrap();
    let a = grade_round("unit1", round, &[], Utc::now());
    let b = grade_round("unit1", round, &answers(&["hi"]), Utc::now());

    // 1 of 3 rounds
    assert_eq!(overall_progress(&[a, b], &curriculum), 33);
    assert_eq!(overall_progress(&[], &curriculum), 0);
    assert_eq!(overall_progress(&[], &Curriculum::default()), 0);
  }
}
