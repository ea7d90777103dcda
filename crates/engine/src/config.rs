use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use voxedit_history::HistoryConfig;
use voxedit_persist::CaptureOptions;

/// Errors from loading or validating an [`EngineConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported config format: {0:?}")]
    UnsupportedFormat(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Process-wide settings, read once at startup.
///
/// Change limits use `-1` for "unlimited".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Time the job pump may spend per host tick.
    pub async_time_budget_ms: u64,
    /// Committed records kept per session.
    pub max_history_size: usize,
    /// Change limit new sessions start with.
    pub default_change_limit: i64,
    /// Highest change limit a session may set.
    pub max_change_limit: i64,
    /// Ticks a departed session's history is kept for a rejoin.
    pub ticks_to_delete_session: u64,
    /// Keep snapshots as compressed CBOR instead of in memory as-is.
    pub compress_snapshots: bool,
    /// Chunk columns the host loads per tick.
    pub chunk_loads_per_tick: usize,
    /// Include entities in box snapshots.
    pub capture_entities: bool,
    /// Largest region, in blocks, a single fill may cover.
    pub max_region_volume: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            async_time_budget_ms: 32,
            max_history_size: 20,
            default_change_limit: -1,
            max_change_limit: -1,
            ticks_to_delete_session: 12_000,
            compress_snapshots: false,
            chunk_loads_per_tick: 4,
            capture_entities: false,
            max_region_volume: 1 << 24,
        }
    }
}

impl EngineConfig {
    /// Load from a `.yaml`/`.yml` or `.json` file and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let config = match ext.as_str() {
            "yaml" | "yml" => Self::from_yaml_str(&text)?,
            "json" => Self::from_json_str(&text)?,
            other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
        };
        tracing::info!(path = %path.display(), "loaded engine config");
        Ok(config)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_history_size == 0 {
            return Err(ConfigError::Invalid("max_history_size must be at least 1".into()));
        }
        if self.max_region_volume == 0 {
            return Err(ConfigError::Invalid("max_region_volume must be at least 1".into()));
        }
        for (name, value) in [
            ("default_change_limit", self.default_change_limit),
            ("max_change_limit", self.max_change_limit),
        ] {
            if value != -1 && value <= 0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be -1 or positive, got {value}"
                )));
            }
        }
        if let (Some(default), Some(max)) = (
            limit_from(self.default_change_limit),
            limit_from(self.max_change_limit),
        ) {
            if default > max {
                return Err(ConfigError::Invalid(format!(
                    "default_change_limit {default} exceeds max_change_limit {max}"
                )));
            }
        }
        Ok(())
    }

    pub fn time_budget(&self) -> Duration {
        Duration::from_millis(self.async_time_budget_ms)
    }

    pub fn history_config(&self) -> HistoryConfig {
        HistoryConfig {
            max_size: self.max_history_size,
            change_limit: limit_from(self.default_change_limit),
            capture: CaptureOptions {
                include_entities: self.capture_entities,
            },
        }
    }

    pub fn max_change_limit(&self) -> Option<u64> {
        limit_from(self.max_change_limit)
    }
}

/// `-1` (or any negative value) is unlimited.
pub(crate) fn limit_from(value: i64) -> Option<u64> {
    u64::try_from(value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let c = EngineConfig::default();
        assert_eq!(c.time_budget(), Duration::from_millis(32));
        assert_eq!(c.max_history_size, 20);
        assert_eq!(c.history_config().change_limit, None);
        assert_eq!(c.max_change_limit(), None);
        assert_eq!(c.max_region_volume, 256 * 256 * 256);
        c.validate().unwrap();
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let c = EngineConfig::from_yaml_str("max_history_size: 5\ncompress_snapshots: true\n").unwrap();
        assert_eq!(c.max_history_size, 5);
        assert!(c.compress_snapshots);
        assert_eq!(c.async_time_budget_ms, 32);
    }

    #[test]
    fn load_json_file() {
        let mut tmp = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(tmp, r#"{{"async_time_budget_ms": 8, "default_change_limit": 1000}}"#).unwrap();
        let c = EngineConfig::load(tmp.path()).unwrap();
        assert_eq!(c.time_budget(), Duration::from_millis(8));
        assert_eq!(c.history_config().change_limit, Some(1000));
    }

    #[test]
    fn load_yaml_file() {
        let mut tmp = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        writeln!(tmp, "ticks_to_delete_session: 40").unwrap();
        let c = EngineConfig::load(tmp.path()).unwrap();
        assert_eq!(c.ticks_to_delete_session, 40);
    }

    #[test]
    fn unknown_extension_rejected() {
        let tmp = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        assert!(matches!(
            EngineConfig::load(tmp.path()),
            Err(ConfigError::UnsupportedFormat(ext)) if ext == "toml"
        ));
    }

    #[test]
    fn invalid_values_rejected() {
        assert!(matches!(
            EngineConfig::from_yaml_str("max_history_size: 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_yaml_str("default_change_limit: 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_yaml_str("max_region_volume: 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_yaml_str("default_change_limit: 500\nmax_change_limit: 100"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_json_str("{\"max_history_size\": \"many\"}"),
            Err(ConfigError::Json(_))
        ));
    }
}
