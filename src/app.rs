use crate::commands::Command;
use crate::config::Config;
use crate::curriculum::Curriculum;
use crate::error::SyncError;
use crate::identity::LocalIdentityProvider;
use crate::model::{GradeInput, Identity, Role, Scope};
use crate::quiz;
use crate::session::Session;
use crate::store::SqliteRecordStore;
use crate::sync::SyncEngine;
use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

/// Main application state
pub struct App {
  /// Application configuration
  config: Config,

  /// Identity provider plus sync engine
  session: Session<LocalIdentityProvider, SqliteRecordStore>,

  /// Words to quiz on, if a curriculum file is configured
  curriculum: Option<Curriculum>,
}

impl App {
  pub async fn new(config: Config) -> Result<Self> {
    let store = SqliteRecordStore::open(config.store.path.as_deref())?;
    let session_path = Config::data_dir()?.join("session.json");
    let curriculum = match &config.curriculum {
      Some(path) => Some(Curriculum::load(path)?),
      None => None,
    };

    Ok(Self::with_parts(config, store, session_path, curriculum))
  }

  fn with_parts(
    config: Config,
    store: SqliteRecordStore,
    session_path: PathBuf,
    curriculum: Option<Curriculum>,
  ) -> Self {
    let engine = SyncEngine::new(Arc::new(store), config.sync_settings());
    let provider = LocalIdentityProvider::new(config.users.clone(), session_path);

    Self {
      config,
      session: Session::new(provider, Arc::new(engine)),
      curriculum,
    }
  }

  /// Run one command and print its report.
  ///
  /// Pending saves are flushed before returning, whether or not the command
  /// succeeded.
  pub async fn run(&mut self, command: Command) -> Result<()> {
    let result = self.execute(command).await;

    if let Err(e) = self.session.engine().flush_pending_saves().await {
      warn!(error = %e, "Changes could not be saved");
      eprintln!("Warning: changes could not be saved: {}", e);
    }

    print!("{}", result?);
    Ok(())
  }

  async fn execute(&mut self, command: Command) -> Result<String> {
    if command.needs_session() {
      self.session.restore().await?;
    }

    match command {
      Command::Login { username, password } => self.login(&username, password).await,
      Command::Logout => self.logout().await,
      Command::Whoami => self.whoami(),
      Command::Quiz {
        unit,
        round,
        answers,
      } => self.quiz(&unit, &round, &answers),
      Command::Attempts { student } => self.attempts(student.as_deref()),
      Command::Grades { student } => self.grades(student.as_deref()),
      Command::Grade {
        student,
        test_name,
        grade,
      } => self.grade(student, test_name, grade),
      Command::Progress => self.progress(),
    }
  }

  async fn login(&self, username: &str, password: Option<String>) -> Result<String> {
    let password = match password {
      Some(p) => p,
      None => Config::get_password()?,
    };

    match self.session.login(username, &password).await {
      Ok(identity) => Ok(format!("Welcome, {}!\n", identity.name)),
      Err(SyncError::InvalidCredentials) => Err(eyre!("Login failed: invalid username or password")),
      Err(e) => Err(e.into()),
    }
  }

  async fn logout(&self) -> Result<String> {
    if self.session.current().is_none() {
      return Ok("Not logged in.\n".to_string());
    }
    self.session.logout().await;
    Ok("You have been logged out.\n".to_string())
  }

  fn whoami(&self) -> Result<String> {
    let identity = self.require_identity()?;
    let engine = self.session.engine();
    let role = match identity.role {
      Role::Student => "student",
      Role::Teacher => "teacher",
    };

    let mut out = String::new();
    writeln!(out, "{} ({}, {})", identity.name, identity.id, role)?;
    let scope = match engine.scope() {
      Scope::Teacher => "all students".to_string(),
      Scope::Student(id) => format!("own record ({})", id),
      Scope::Anonymous => "none".to_string(),
    };
    writeln!(out, "Access: {}", scope)?;
    writeln!(out, "Records loaded: {}", engine.records().len())?;
    if engine.is_loading() {
      writeln!(out, "Loading...")?;
    }
    if engine.is_saving() || engine.has_pending_saves() {
      writeln!(out, "Saving...")?;
    }
    Ok(out)
  }

  fn quiz(&self, unit_id: &str, round_id: &str, answers: &[String]) -> Result<String> {
    let identity = self.require_identity()?;
    if identity.role != Role::Student {
      return Err(eyre!("Only students take quizzes"));
    }
    let curriculum = self.require_curriculum()?;
    let round = curriculum
      .round(unit_id, round_id)
      .ok_or_else(|| eyre!("Unknown round {} in unit {}", round_id, unit_id))?;

    let attempt = quiz::grade_round(unit_id, round, answers, Utc::now());
    self
      .session
      .engine()
      .save_attempt(&identity.id, attempt.clone())?;

    let unit_name = curriculum
      .units
      .iter()
      .find(|u| u.id == unit_id)
      .map(|u| u.name.as_str())
      .unwrap_or(unit_id);

    let mut out = String::new();
    writeln!(out, "{}, {}: you scored {}%", unit_name, round.name, attempt.score)?;
    if attempt.errors.is_empty() {
      writeln!(out, "Perfect score! No errors.")?;
    } else {
      writeln!(out, "You made {} mistake(s):", attempt.errors.len())?;
      for error in &attempt.errors {
        if let Some(word) = round.words.iter().find(|w| w.id == error.word_id) {
          write!(
            out,
            "  {}: you wrote '{}', expected '{}'",
            word.gloss, error.incorrect_answer, word.term
          )?;
          if word.pronunciation.is_empty() {
            writeln!(out)?;
          } else {
            writeln!(out, " {}", word.pronunciation)?;
          }
        }
      }
    }
    Ok(out)
  }

  fn attempts(&self, requested: Option<&str>) -> Result<String> {
    self.require_identity()?;
    let student_id = resolve_student(&self.session.engine().scope(), requested)?;
    let attempts = self.session.engine().get_attempts(&student_id);

    if attempts.is_empty() {
      return Ok(format!("No attempts recorded for {}.\n", student_id));
    }

    let mut out = String::new();
    for attempt in attempts {
      writeln!(
        out,
        "{:<20} {:>3}%  errors: {:<3} {}",
        attempt.key(),
        attempt.score,
        attempt.errors.len(),
        attempt.completed_at.format("%Y-%m-%d %H:%M")
      )?;
    }
    Ok(out)
  }

  fn grades(&self, requested: Option<&str>) -> Result<String> {
    self.require_identity()?;
    let student_id = resolve_student(&self.session.engine().scope(), requested)?;
    let grades = self.session.engine().get_offline_grades(&student_id);

    if grades.is_empty() {
      return Ok(format!("No offline grades found for {}.\n", student_id));
    }

    let mut out = String::new();
    for grade in grades {
      writeln!(
        out,
        "{:<30} {}  {}",
        grade.test_name,
        grade.grade,
        grade.assigned_at.format("%Y-%m-%d")
      )?;
    }
    Ok(out)
  }

  fn grade(&self, student_id: String, test_name: String, grade: u8) -> Result<String> {
    let identity = self.require_identity()?;
    if !self.config.students().any(|s| s.id == student_id) {
      return Err(eyre!("Unknown student: {}", student_id));
    }

    let recorded = self.session.engine().add_offline_grade(
      GradeInput {
        student_id,
        test_name,
        grade,
      },
      &identity,
    )?;

    Ok(format!(
      "Grade {} for {} assigned to {}.\n",
      recorded.grade, recorded.test_name, recorded.student_id
    ))
  }

  fn progress(&self) -> Result<String> {
    let identity = self.require_identity()?;
    let curriculum = self.require_curriculum()?;
    let engine = self.session.engine();

    let students: Vec<(String, String)> = match identity.role {
      Role::Teacher => self
        .config
        .students()
        .map(|s| (s.id.clone(), s.name.clone()))
        .collect(),
      Role::Student => vec![(identity.id.clone(), identity.name.clone())],
    };

    let mut out = String::new();
    for (id, name) in students {
      let attempts = engine.get_attempts(&id);
      writeln!(
        out,
        "{:<30} {:>3}%  ({} rounds attempted)",
        name,
        quiz::overall_progress(&attempts, curriculum),
        attempts.len()
      )?;
    }
    Ok(out)
  }

  fn require_identity(&self) -> Result<Identity> {
    self
      .session
      .current()
      .ok_or_else(|| eyre!("Not logged in. Run `vocab-sync login` first."))
  }

  fn require_curriculum(&self) -> Result<&Curriculum> {
    self
      .curriculum
      .as_ref()
      .ok_or_else(|| eyre!("No curriculum configured. Set `curriculum` in the config file."))
  }
}

/// Whose records a command should show.
///
/// Students may only look at their own; teachers must name a student.
fn resolve_student(scope: &Scope, requested: Option<&str>) -> Result<String> {
  match (scope, requested) {
    (Scope::Student(id), None) => Ok(id.clone()),
    (Scope::Student(own), Some(id)) if own == id => Ok(id.to_string()),
    (Scope::Student(_), Some(_)) => Err(eyre!("Students can only view their own records")),
    (Scope::Teacher, Some(id)) => Ok(id.to_string()),
    (Scope::Teacher, None) => Err(eyre!("--student is required")),
    (Scope::Anonymous, _) => Err(eyre!("Not logged in. Run `vocab-sync login` first.")),
  }
}
