use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;

use crate::range::DATE_FORMAT;
use crate::stats::StatsPolicy;

/// Default config file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "spirestats.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding `profile<N>.jsonl` run logs.
    pub runs_dir: PathBuf,
    pub profile: usize,
    /// Persisted date window.
    pub range_file: PathBuf,
    /// Only runs after this date (`YYYY/MM/DD`) take part in streaks.
    pub streak_epoch: Option<String>,
    pub refresh_interval_secs: u64,
    pub source_timeout_ms: u64,
    pub policy: StatsPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            runs_dir: PathBuf::from("runs"),
            profile: 0,
            range_file: PathBuf::from(".spirestats/range.json"),
            streak_epoch: None,
            refresh_interval_secs: 30,
            source_timeout_ms: 5_000,
            policy: StatsPolicy::default(),
        }
    }
}

impl Config {
    /// Load from `$SPIRESTATS_CONFIG` (or `spirestats.toml`), then apply env overrides.
    pub fn load() -> Self {
        let path = env::var("SPIRESTATS_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        let mut config = Self::load_from(&path);
        config.apply_env();
        config
    }

    /// Missing file → defaults. Malformed file → defaults with a warning.
    pub fn load_from(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("config: {} not found, using defaults", path.display());
                return Self::default();
            }
            Err(e) => {
                tracing::warn!("config: failed to read {}: {e}", path.display());
                return Self::default();
            }
        };
        match Self::from_toml_str(&content) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("config: malformed {}: {e}", path.display());
                Self::default()
            }
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    fn apply_env(&mut self) {
        if let Ok(dir) = env::var("SPIRESTATS_RUNS_DIR") {
            self.runs_dir = PathBuf::from(dir);
        }
        if let Ok(profile) = env::var("SPIRESTATS_PROFILE") {
            match profile.parse() {
                Ok(p) => self.profile = p,
                Err(_) => tracing::warn!("config: ignoring non-numeric SPIRESTATS_PROFILE={profile}"),
            }
        }
        if let Ok(file) = env::var("SPIRESTATS_RANGE_FILE") {
            self.range_file = PathBuf::from(file);
        }
    }

    /// Parsed streak cutoff. An unparseable value disables the cutoff.
    pub fn streak_since(&self) -> Option<NaiveDateTime> {
        let raw = self.streak_epoch.as_deref()?;
        match NaiveDate::parse_from_str(raw, DATE_FORMAT) {
            Ok(date) => date.and_hms_opt(0, 0, 0),
            Err(e) => {
                tracing::warn!("config: invalid streak_epoch {raw:?}: {e}; streaks use every run");
                None
            }
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.source_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_is_default() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.profile, 0);
        assert_eq!(config.refresh_interval(), Duration::from_secs(30));
        assert_eq!(config.policy, StatsPolicy::default());
        assert_eq!(config.streak_since(), None);
    }

    #[test]
    fn full_toml() {
        let config = Config::from_toml_str(
            r#"
runs_dir = "/data/runs"
profile = 2
range_file = "/data/range.json"
streak_epoch = "2023/09/01"
refresh_interval_secs = 10
source_timeout_ms = 250

[policy]
include_modded = true
min_ascension = 20
"#,
        )
        .unwrap();
        assert_eq!(config.runs_dir, PathBuf::from("/data/runs"));
        assert_eq!(config.profile, 2);
        assert_eq!(config.source_timeout(), Duration::from_millis(250));
        assert!(config.policy.include_modded);
        assert_eq!(config.policy.min_ascension, 20);
        assert_eq!(
            config.streak_since(),
            NaiveDate::from_ymd_opt(2023, 9, 1).unwrap().and_hms_opt(0, 0, 0)
        );
    }

    #[test]
    fn bad_epoch_disables_cutoff() {
        let config = Config::from_toml_str(r#"streak_epoch = "yesterday""#).unwrap();
        assert_eq!(config.streak_since(), None);
    }

    #[test]
    fn missing_file_is_default() {
        let config = Config::load_from(Path::new("/nonexistent/spirestats-test.toml"));
        assert_eq!(config.profile, 0);
    }

    #[test]
    fn malformed_file_is_default() {
        let dir = std::env::temp_dir().join("spirestats-test-config-malformed");
        let _ = std::fs::create_dir_all(&dir);
        let path = dir.join("spirestats.toml");
        std::fs::write(&path, "profile = [not valid").unwrap();
        let config = Config::load_from(&path);
        assert_eq!(config.profile, 0);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
