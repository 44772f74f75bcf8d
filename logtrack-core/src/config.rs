use logtrack_activity::{Source, SourceType};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_SOURCE_NAME: &str = "logtrack";
pub const DEFAULT_SIGIL: char = '#';

fn true_default() -> bool {
    true
}

fn metrics_frequency_default() -> u64 {
    60
}

fn max_activity_size_default() -> usize {
    100
}

fn sigil_default() -> char {
    DEFAULT_SIGIL
}

fn snapshot_category_default() -> String {
    "Log".to_string()
}

/// Tuning knobs of a [`Tracker`](crate::Tracker).
///
/// ```yaml
/// sourceName: orders
/// sourceType: APPL
/// metricsOnException: true
/// metricsFrequency: 60
/// maxActivitySize: 100
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TrackerConfig {
    /// Logical source name. Falls back to `logtrack` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
    #[serde(default)]
    pub source_type: SourceType,
    /// Wrap datagrams that carry an error into a usage-sampling activity.
    #[serde(default = "true_default")]
    pub metrics_on_exception: bool,
    /// Seconds between periodic usage samples.
    #[serde(default = "metrics_frequency_default")]
    pub metrics_frequency: u64,
    /// Child count at which an open activity is force-closed.
    #[serde(default = "max_activity_size_default")]
    pub max_activity_size: usize,
    #[serde(default = "sigil_default")]
    pub sigil: char,
    /// Category of snapshots built from unrecognized annotations.
    #[serde(default = "snapshot_category_default")]
    pub snapshot_category: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            source_name: None,
            source_type: SourceType::default(),
            metrics_on_exception: true_default(),
            metrics_frequency: metrics_frequency_default(),
            max_activity_size: max_activity_size_default(),
            sigil: sigil_default(),
            snapshot_category: snapshot_category_default(),
        }
    }
}

impl TrackerConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_activity_size == 0 {
            return Err(ConfigError::Invalid(
                "maxActivitySize must be greater than zero".to_string(),
            ));
        }
        if self.sigil.is_whitespace() || matches!(self.sigil, '=' | '\'' | '%') {
            return Err(ConfigError::Invalid(format!(
                "'{}' cannot be used as annotation sigil",
                self.sigil
            )));
        }
        Ok(())
    }

    pub fn source_name(&self) -> &str {
        self.source_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_SOURCE_NAME)
    }

    /// Default source of activities opened by this tracker.
    pub fn source(&self) -> Source {
        Source::new(self.source_name(), self.source_type)
    }

    pub fn metrics_frequency(&self) -> Duration {
        Duration::from_secs(self.metrics_frequency)
    }

    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = Some(name.into());
        self
    }

    pub fn with_max_activity_size(mut self, size: usize) -> Self {
        self.max_activity_size = size;
        self
    }

    pub fn with_metrics_frequency(mut self, seconds: u64) -> Self {
        self.metrics_frequency = seconds;
        self
    }

    pub fn with_metrics_on_exception(mut self, enabled: bool) -> Self {
        self.metrics_on_exception = enabled;
        self
    }
}
