//! Command-line subcommands
use clap::Subcommand;

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
  /// Sign in and load your records
  Login {
    #[arg(short, long)]
    username: String,
    /// Password (falls back to VOCAB_SYNC_PASSWORD)
    #[arg(short, long)]
    password: Option<String>,
  },
  /// Save pending changes and sign out
  Logout,
  /// Show the signed-in user and sync status
  Whoami,
  /// Take a round's typed-translation quiz
  Quiz {
    #[arg(long)]
    unit: String,
    #[arg(long)]
    round: String,
    /// Answers in word order; repeat once per word
    #[arg(short, long = "answer")]
    answers: Vec<String>,
  },
  /// List quiz attempts
  Attempts {
    /// Student id (teachers only; students see their own)
    #[arg(long)]
    student: Option<String>,
  },
  /// List offline grades, most recent first
  Grades {
    #[arg(long)]
    student: Option<String>,
  },
  /// Record an offline grade (teachers only)
  Grade {
    #[arg(long)]
    student: String,
    #[arg(long = "test")]
    test_name: String,
    /// 2, 3, 4 or 5
    #[arg(long)]
    grade: u8,
  },
  /// Show curriculum progress
  Progress,
}

impl Command {
  /// Whether the command starts from an existing session.
  pub fn needs_session(&self) -> bool {
    !matches!(self, Command::Login { .. })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use clap::Parser;

  #[derive(Parser, Debug)]
  struct TestArgs {
    #[command(subcommand)]
    command: Command,
  }

  fn parse(args: &[&str]) -> Command {
    TestArgs::try_parse_from(std::iter::once("vocab-sync").chain(args.iter().copied()))
      .unwrap()
      .command
  }

  #[test]
  fn test_quiz_collects_repeated_answers() {
    let command = parse(&[
      "quiz", "--unit", "unit1", "--round", "round1-1", "-a", "hi", "-a", "good night",
    ]);
    assert_eq!(
      command,
      Command::Quiz {
        unit: "unit1".to_string(),
        round: "round1-1".to_string(),
        answers: vec!["hi".to_string(), "good night".to_string()],
      }
    );
  }

  #[test]
  fn test_grade_args() {
    let command = parse(&[
      "grade", "--student", "s1", "--test", "Quiz 1", "--grade", "4",
    ]);
    assert_eq!(
      command,
      Command::Grade {
        student: "s1".to_string(),
        test_name: "Quiz 1".to_string(),
        grade: 4,
      }
    );
  }

  #[test]
  fn test_login_does_not_need_session() {
    assert!(!parse(&["login", "-u", "Oksana"]).needs_session());
    assert!(parse(&["whoami"]).needs_session());
  }

  #[test]
  fn test_grade_requires_number() {
    let result = TestArgs::try_parse_from([
      "vocab-sync", "grade", "--student", "s1", "--test", "Q", "--grade", "five",
    ]);
    assert!(result.is_err());
  }
}
