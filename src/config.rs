//! Pipeline configuration
//!
//! Configuration is an explicit value threaded through every stage that needs
//! it. It is resolved in three layers: an optional TOML file, then environment
//! overrides (`ENDURANCE_HR_MAX`, `ENDURANCE_DB`), then whatever the caller sets
//! directly (the CLI applies its flags last).

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default maximum heart rate (bpm)
pub const DEFAULT_HR_MAX: f64 = 194.0;

/// Default database location, relative to the working directory
pub const DEFAULT_DB_PATH: &str = "data/endurance.db";

/// Environment variable overriding `hr_max`
pub const ENV_HR_MAX: &str = "ENDURANCE_HR_MAX";

/// Environment variable overriding `database_path`
pub const ENV_DB_PATH: &str = "ENDURANCE_DB";

/// How runs without a known effort zone enter the easy/hard split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownZonePolicy {
    /// Runs without heart rate are booked as easy volume
    #[default]
    CountAsEasy,
    /// Runs without heart rate are left out of both buckets
    Exclude,
}

impl UnknownZonePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnknownZonePolicy::CountAsEasy => "count_as_easy",
            UnknownZonePolicy::Exclude => "exclude",
        }
    }
}

/// Configuration consumed by the extractor and aggregators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum heart rate used for zone and load math (bpm)
    pub hr_max: f64,
    /// Easy/hard split policy for runs without heart rate
    pub unknown_zone: UnknownZonePolicy,
    /// SQLite database file
    pub database_path: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            hr_max: DEFAULT_HR_MAX,
            unknown_zone: UnknownZonePolicy::default(),
            database_path: PathBuf::from(DEFAULT_DB_PATH),
        }
    }
}

impl PipelineConfig {
    /// Create a configuration with a specific maximum heart rate
    pub fn with_hr_max(hr_max: f64) -> Self {
        Self {
            hr_max,
            ..Default::default()
        }
    }

    /// Parse a configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self, PipelineError> {
        let config: PipelineConfig =
            toml::from_str(content).map_err(|e| PipelineError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Serialize the configuration to TOML
    pub fn to_toml(&self) -> Result<String, PipelineError> {
        toml::to_string_pretty(self).map_err(|e| PipelineError::ConfigError(e.to_string()))
    }

    /// Apply `ENDURANCE_HR_MAX` and `ENDURANCE_DB` from the process environment
    pub fn apply_env(self) -> Result<Self, PipelineError> {
        self.apply_overrides(
            std::env::var(ENV_HR_MAX).ok().as_deref(),
            std::env::var(ENV_DB_PATH).ok().as_deref(),
        )
    }

    fn apply_overrides(
        mut self,
        hr_max: Option<&str>,
        db_path: Option<&str>,
    ) -> Result<Self, PipelineError> {
        if let Some(raw) = hr_max {
            self.hr_max = raw.trim().parse::<f64>().map_err(|e| {
                PipelineError::ConfigError(format!("{ENV_HR_MAX}={raw:?} is not a number: {e}"))
            })?;
        }
        if let Some(path) = db_path {
            self.database_path = PathBuf::from(path);
        }
        self.validate()?;
        Ok(self)
    }

    /// Check that the heart-rate ceiling is usable as a divisor
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !self.hr_max.is_finite() || self.hr_max <= 0.0 {
            return Err(PipelineError::ConfigError(format!(
                "hr_max must be a positive number, got {}",
                self.hr_max
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.hr_max, 194.0);
        assert_eq!(config.unknown_zone, UnknownZonePolicy::CountAsEasy);
        assert_eq!(config.database_path, PathBuf::from("data/endurance.db"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml("hr_max = 188\n").unwrap();
        assert_eq!(config.hr_max, 188.0);
        assert_eq!(config.unknown_zone, UnknownZonePolicy::CountAsEasy);
    }

    #[test]
    fn test_policy_from_toml() {
        let config = PipelineConfig::from_toml("unknown_zone = \"exclude\"\n").unwrap();
        assert_eq!(config.unknown_zone, UnknownZonePolicy::Exclude);
    }

    #[test]
    fn test_invalid_hr_max_rejected() {
        assert!(PipelineConfig::from_toml("hr_max = 0\n").is_err());
        assert!(PipelineConfig::from_toml("hr_max = -5.0\n").is_err());
    }

    #[test]
    fn test_overrides() {
        let config = PipelineConfig::default()
            .apply_overrides(Some(" 201 "), Some("/tmp/load.db"))
            .unwrap();
        assert_eq!(config.hr_max, 201.0);
        assert_eq!(config.database_path, PathBuf::from("/tmp/load.db"));

        let err = PipelineConfig::default().apply_overrides(Some("fast"), None);
        assert!(matches!(err, Err(PipelineError::ConfigError(_))));
    }

    #[test]
    fn test_load_from_file_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert_eq!(PipelineConfig::load(&missing).unwrap(), PipelineConfig::default());

        let path = dir.path().join("endurance.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "hr_max = 190.5").unwrap();
        writeln!(file, "database_path = \"runs.db\"").unwrap();

        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.hr_max, 190.5);
        assert_eq!(config.database_path, PathBuf::from("runs.db"));
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = PipelineConfig {
            hr_max: 185.0,
            unknown_zone: UnknownZonePolicy::Exclude,
            database_path: PathBuf::from("x.db"),
        };
        let text = config.to_toml().unwrap();
        assert_eq!(PipelineConfig::from_toml(&text).unwrap(), config);
    }
}
