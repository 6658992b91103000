use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::model::{Identity, Role};
use crate::sync::SyncSettings;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Teacher granted access to every student record created by the client
  pub designated_teacher: String,
  pub users: Vec<UserConfig>,
  /// Path to the curriculum file (units, rounds, words)
  pub curriculum: Option<PathBuf>,
  #[serde(default)]
  pub store: StoreConfig,
  #[serde(default)]
  pub sync: SyncConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserConfig {
  pub id: String,
  pub username: String,
  pub name: String,
  pub role: Role,
  /// Hex SHA-256 of the password
  pub password_sha256: String,
}

impl UserConfig {
  pub fn identity(&self) -> Identity {
    Identity {
      id: self.id.clone(),
      role: self.role,
      name: self.name.clone(),
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
  /// Record database path (defaults to $XDG_DATA_HOME/vocab-sync/records.db)
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
  /// Quiet period after the last change before a record is saved
  #[serde(default = "default_debounce_ms")]
  pub debounce_ms: u64,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      debounce_ms: default_debounce_ms(),
    }
  }
}

fn default_debounce_ms() -> u64 {
  1500
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./vocab-sync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/vocab-sync/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/vocab-sync/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("vocab-sync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("vocab-sync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    let teacher = self
      .users
      .iter()
      .find(|u| u.id == self.designated_teacher)
      .ok_or_else(|| eyre!("designated_teacher '{}' is not a configured user", self.designated_teacher))?;
    if teacher.role != Role::Teacher {
      return Err(eyre!(
        "designated_teacher '{}' does not have the teacher role",
        self.designated_teacher
      ));
    }
    Ok(())
  }

  /// Settings for the sync engine.
  pub fn sync_settings(&self) -> SyncSettings {
    SyncSettings {
      debounce: Duration::from_millis(self.sync.debounce_ms),
      designated_teacher: self.designated_teacher.clone(),
    }
  }

  /// Students known to the configuration, in file order.
  pub fn students(&self) -> impl Iterator<Item = &UserConfig> {
    self.users.iter().filter(|u| u.role == Role::Student)
  }

  /// Directory for the session file and logs.
  pub fn data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("vocab-sync"))
  }

  /// Get the login password from environment variables.
  ///
  /// Checks VOCAB_SYNC_PASSWORD.
  pub fn get_password() -> Result<String> {
    std::env::var("VOCAB_SYNC_PASSWORD").map_err(|_| {
      eyre!("Password not given. Pass --password or set VOCAB_SYNC_PASSWORD environment variable.")
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const SAMPLE: &str = r#"
designated_teacher: teacher-1
users:
  - id: teacher-1
    username: Teacher
    name: Teacher One
    role: teacher
    password_sha256: "00"
  - id: s1
    username: Oksana
    name: Oksana
    role: student
    password_sha256: "11"
"#;

  #[test]
  fn test_parse_applies_defaults() {
    let config = Config::parse(SAMPLE).unwrap();
    assert_eq!(config.sync.debounce_ms, 1500);
    assert!(config.store.path.is_none());
    assert!(config.curriculum.is_none());
    assert_eq!(config.sync_settings().debounce, Duration::from_millis(1500));
    assert_eq!(config.sync_settings().designated_teacher, "teacher-1");
    assert_eq!(config.students().count(), 1);
  }

  #[test]
  fn test_parse_reads_overrides() {
    let yaml = format!("{}sync:\n  debounce_ms: 200\nstore:\n  path: /tmp/r.db\n", SAMPLE);
    let config = Config::parse(&yaml).unwrap();
    assert_eq!(config.sync.debounce_ms, 200);
    assert_eq!(config.store.path, Some(PathBuf::from("/tmp/r.db")));
  }

  #[test]
  fn test_designated_teacher_must_be_a_teacher() {
    let yaml = SAMPLE.replace("designated_teacher: teacher-1", "designated_teacher: s1");
    assert!(Config::parse(&yaml).is_err());

    let yaml = SAMPLE.replace("designated_teacher: teacher-1", "designated_teacher: ghost");
    assert!(Config::parse(&yaml).is_err());
  }
}
