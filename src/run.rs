use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::StatsError;

/// Playable character. Anything unrecognized (modded characters) maps to `Other`.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Character {
    Ironclad,
    Silent,
    Defect,
    Watcher,
    #[serde(other)]
    Other,
}

impl Character {
    /// The four characters that have their own stat slot.
    pub const NAMED: [Character; 4] = [
        Character::Ironclad,
        Character::Silent,
        Character::Defect,
        Character::Watcher,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ironclad => "ironclad",
            Self::Silent => "silent",
            Self::Defect => "defect",
            Self::Watcher => "watcher",
            Self::Other => "other",
        }
    }

    /// Slot index into per-character tables. `None` for `Other`.
    pub fn slot(&self) -> Option<usize> {
        match self {
            Self::Ironclad => Some(0),
            Self::Silent => Some(1),
            Self::Defect => Some(2),
            Self::Watcher => Some(3),
            Self::Other => None,
        }
    }

    /// Parses the names used in save files (`IRONCLAD`, `THE_SILENT`, `DEFECT`, `WATCHER`).
    pub fn from_save_name(name: &str) -> Self {
        match name.to_ascii_uppercase().trim_start_matches("THE_") {
            "IRONCLAD" => Self::Ironclad,
            "SILENT" => Self::Silent,
            "DEFECT" => Self::Defect,
            "WATCHER" => Self::Watcher,
            _ => Self::Other,
        }
    }
}

/// A completed run. Immutable once ingested.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Run {
    pub id: String,
    pub timestamp: NaiveDateTime,
    pub character: Character,
    pub won: bool,
    #[serde(default)]
    pub ascension: u8,
    #[serde(default)]
    pub modded: bool,
    #[serde(default)]
    pub modifiers: BTreeSet<String>,
    /// Seconds.
    #[serde(default)]
    pub playtime: u32,
}

impl Run {
    pub fn meets_ascension(&self, min_ascension: u8) -> bool {
        self.ascension >= min_ascension
    }

    /// False for modded runs and runs below the ranked ascension threshold.
    pub fn is_ranked(&self, min_ascension: u8) -> bool {
        !self.modded && self.meets_ascension(min_ascension)
    }
}

/// Supplies the run log for a save profile, newest run first.
pub trait RunSource: Send + Sync {
    fn runs(&self, profile: usize) -> Result<Vec<Run>, StatsError>;
}

/// Reads `profile<N>.jsonl` files: one serialized [`Run`] per line, in append order.
pub struct JsonlRunSource {
    root: PathBuf,
}

impl JsonlRunSource {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn profile_path(&self, profile: usize) -> PathBuf {
        self.root.join(format!("profile{profile}.jsonl"))
    }
}

impl RunSource for JsonlRunSource {
    fn runs(&self, profile: usize) -> Result<Vec<Run>, StatsError> {
        let path = self.profile_path(profile);
        let content = match std::fs::read(&path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StatsError::SourceUnavailable(format!(
                    "{} not found",
                    path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let mut runs = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Run>(line) {
                Ok(run) => runs.push(run),
                Err(e) => {
                    tracing::warn!(
                        "source: skipping malformed line {} in {}: {e}",
                        lineno + 1,
                        path.display()
                    );
                }
            }
        }
        runs.reverse();
        Ok(runs)
    }
}

/// In-process append-only source. Profiles are ignored.
#[derive(Default)]
pub struct MemoryRunSource {
    runs: Mutex<Vec<Run>>,
}

impl MemoryRunSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_runs(runs: Vec<Run>) -> Self {
        Self {
            runs: Mutex::new(runs),
        }
    }

    /// Append a run at the end of the log.
    pub fn push(&self, run: Run) {
        if let Ok(mut runs) = self.runs.lock() {
            runs.push(run);
        }
    }

    pub fn len(&self) -> usize {
        self.runs.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RunSource for MemoryRunSource {
    fn runs(&self, _profile: usize) -> Result<Vec<Run>, StatsError> {
        let runs = self
            .runs
            .lock()
            .map_err(|_| StatsError::SourceUnavailable("run log lock poisoned".to_string()))?;
        Ok(runs.iter().rev().cloned().collect())
    }
}
