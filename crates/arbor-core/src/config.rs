//! Core configuration, loaded from TOML.
//!
//! ```toml
//! repositories = ["snomed"]
//!
//! [clock]
//! kind = "logical"
//! start = 100
//!
//! [review]
//! keep_current_mins = 30
//!
//! [lock]
//! default_timeout_ms = 5000
//! ```

use std::path::Path;

use arbor_commit::DEFAULT_MAX_APPEND_RETRIES;
use arbor_lock::LockConfig;
use arbor_merge::DetectorOptions;
use arbor_review::ReviewConfig;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Where commit timestamps come from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockKind {
    /// Milliseconds since the UNIX epoch.
    #[default]
    Wall,
    /// A counter; deterministic, for replays and tests.
    Logical,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    pub kind: ClockKind,
    /// Head of `MAIN` for logical clocks. Ignored by the wall clock.
    pub start: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitConfig {
    /// Optimistic append attempts before giving up.
    pub max_append_retries: u32,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            max_append_retries: DEFAULT_MAX_APPEND_RETRIES,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Repositories created at startup.
    pub repositories: Vec<String>,
    pub clock: ClockConfig,
    pub commit: CommitConfig,
    pub review: ReviewConfig,
    pub lock: LockConfig,
    pub conflicts: DetectorOptions,
}

impl CoreConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: CoreConfig = toml::from_str(raw).map_err(|e| CoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| CoreError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.commit.max_append_retries == 0 {
            return Err(CoreError::Config("commit.max_append_retries must be at least 1".into()));
        }
        if self.review.keep_current().is_none() {
            return Err(CoreError::Config(format!(
                "review.keep_current_mins is out of range: {}",
                self.review.keep_current_mins
            )));
        }
        if self.review.keep_other().is_none() {
            return Err(CoreError::Config(format!(
                "review.keep_other_mins is out of range: {}",
                self.review.keep_other_mins
            )));
        }
        if self.review.sweep_interval_secs == 0 {
            return Err(CoreError::Config("review.sweep_interval_secs must be at least 1".into()));
        }
        if self.lock.notification_capacity == 0 {
            return Err(CoreError::Config("lock.notification_capacity must be at least 1".into()));
        }
        if let Some(id) = self.repositories.iter().find(|id| id.trim().is_empty()) {
            return Err(CoreError::Config(format!("invalid repository id '{id}'")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let config = CoreConfig::from_toml_str("").unwrap();
        assert_eq!(config, CoreConfig::default());
        assert_eq!(config.commit.max_append_retries, 5);
        assert_eq!(config.review.keep_current_mins, 15);
        assert_eq!(config.lock.default_timeout_ms, 60_000);
        assert_eq!(config.clock.kind, ClockKind::Wall);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = CoreConfig::from_toml_str(
            r#"
            repositories = ["snomed", "loinc"]

            [clock]
            kind = "logical"
            start = 100

            [review]
            keep_current_mins = 30

            [lock]
            default_timeout_ms = 500

            [conflicts]
            attribute_values = true
            "#,
        )
        .unwrap();
        assert_eq!(config.repositories, vec!["snomed", "loinc"]);
        assert_eq!(config.clock, ClockConfig { kind: ClockKind::Logical, start: 100 });
        assert_eq!(config.review.keep_current_mins, 30);
        assert_eq!(config.review.keep_other_mins, 5);
        assert_eq!(config.lock.default_timeout_ms, 500);
        assert_eq!(config.lock.notification_capacity, 1024);
        assert!(config.conflicts.attribute_values);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            CoreConfig::from_toml_str("[commit]\nmax_append_retries = 0"),
            Err(CoreError::Config(_))
        ));
        assert!(matches!(
            CoreConfig::from_toml_str("repositories = [\" \"]"),
            Err(CoreError::Config(_))
        ));
        assert!(matches!(
            CoreConfig::from_toml_str("[clock]\nkind = \"sundial\""),
            Err(CoreError::Config(_))
        ));
    }

    #[test]
    fn oversized_retention_is_rejected() {
        let err = CoreConfig::from_toml_str("[review]\nkeep_current_mins = 1000000000000000").unwrap_err();
        assert!(err.to_string().contains("review.keep_current_mins"));

        let config = CoreConfig {
            review: ReviewConfig {
                keep_other_mins: u64::MAX,
                ..ReviewConfig::default()
            },
            ..CoreConfig::default()
        };
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));
    }

    #[test]
    fn load_reports_missing_files() {
        let err = CoreConfig::load("/nonexistent/arbor.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/arbor.toml"));
    }
}
