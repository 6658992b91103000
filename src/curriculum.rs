//! Static curriculum: units contain rounds, rounds contain words.

use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Word {
  pub id: String,
  /// Target-language term the student must type
  pub term: String,
  /// Native-language gloss shown as the prompt
  pub gloss: String,
  /// Pronunciation hint
  #[serde(default)]
  pub pronunciation: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Round {
  pub id: String,
  pub name: String,
  pub words: Vec<Word>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Unit {
  pub id: String,
  pub name: String,
  pub rounds: Vec<Round>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Curriculum {
  pub units: Vec<Unit>,
}

impl Curriculum {
  pub fn load(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read curriculum {}: {}", path.display(), e))?;

    serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse curriculum {}: {}", path.display(), e))
  }

  pub fn round(&self, unit_id: &str, round_id: &str) -> Option<&Round> {
    self
      .units
      .iter()
      .find(|u| u.id == unit_id)?
      .rounds
      .iter()
      .find(|r| r.id == round_id)
  }

  pub fn total_rounds(&self) -> usize {
    self.units.iter().map(|u| u.rounds.len()).sum()
  }
}
