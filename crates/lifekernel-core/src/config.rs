//! TOML-based kernel configuration.
//!
//! Parameterises the kernels without giving them I/O:
//! - habit grace period before a scheduled habit reads as missed
//! - check-in trend window
//! - review summary and intention limits
//! - Hard Mode rationale cap
//! - suggestion windows and thresholds
//!
//! Configuration is stored at `~/.config/lifekernel/config.toml`.

use std::path::{Path, PathBuf};

use chrono::Weekday;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, CoreError, Result};

/// Hard ceiling on suggestions shown at once. Config may lower it, never raise it.
pub const SUGGESTION_CAP: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HabitConfig {
    /// Hours after the end of a UTC day before an unlogged habit reads as missed.
    #[serde(default)]
    pub missed_grace_hours: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckinConfig {
    #[serde(default = "default_trend_window_days")]
    pub trend_window_days: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewConfig {
    #[serde(default = "default_summary_max_chars")]
    pub summary_max_chars: usize,
    #[serde(default = "default_max_intentions")]
    pub max_intentions: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardModeConfig {
    #[serde(default = "default_rationale_max_chars")]
    pub rationale_max_chars: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionConfig {
    #[serde(default = "default_max_suggestions")]
    pub max_suggestions: usize,
    #[serde(default = "default_morning_start_hour")]
    pub morning_start_hour: u32,
    #[serde(default = "default_morning_end_hour")]
    pub morning_end_hour: u32,
    /// Local offset used for the morning window and review day.
    #[serde(default)]
    pub utc_offset_minutes: i32,
    #[serde(default = "default_rest_energy_threshold")]
    pub rest_energy_threshold: u8,
    #[serde(default = "default_pattern_min_confidence")]
    pub pattern_min_confidence: f64,
    #[serde(default = "default_review_weekday")]
    pub review_weekday: String,
    #[serde(default = "default_envelope_warn_ratio")]
    pub envelope_warn_ratio: f64,
    #[serde(default = "default_checkin_gap_hours")]
    pub checkin_gap_hours: u32,
}

/// Kernel configuration.
///
/// Serialized to/from TOML at `~/.config/lifekernel/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KernelConfig {
    #[serde(default)]
    pub habits: HabitConfig,
    #[serde(default)]
    pub checkin: CheckinConfig,
    #[serde(default)]
    pub review: ReviewConfig,
    #[serde(default)]
    pub hard_mode: HardModeConfig,
    #[serde(default)]
    pub suggestions: SuggestionConfig,
}

fn default_trend_window_days() -> u32 {
    14
}
fn default_summary_max_chars() -> usize {
    2000
}
fn default_max_intentions() -> usize {
    3
}
fn default_rationale_max_chars() -> usize {
    280
}
fn default_max_suggestions() -> usize {
    SUGGESTION_CAP
}
fn default_morning_start_hour() -> u32 {
    6
}
fn default_morning_end_hour() -> u32 {
    11
}
fn default_rest_energy_threshold() -> u8 {
    3
}
fn default_pattern_min_confidence() -> f64 {
    0.6
}
fn default_review_weekday() -> String {
    "sun".into()
}
fn default_envelope_warn_ratio() -> f64 {
    0.85
}
fn default_checkin_gap_hours() -> u32 {
    24
}

impl Default for HabitConfig {
    fn default() -> Self {
        Self {
            missed_grace_hours: 0,
        }
    }
}

impl Default for CheckinConfig {
    fn default() -> Self {
        Self {
            trend_window_days: default_trend_window_days(),
        }
    }
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            summary_max_chars: default_summary_max_chars(),
            max_intentions: default_max_intentions(),
        }
    }
}

impl Default for HardModeConfig {
    fn default() -> Self {
        Self {
            rationale_max_chars: default_rationale_max_chars(),
        }
    }
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        Self {
            max_suggestions: default_max_suggestions(),
            morning_start_hour: default_morning_start_hour(),
            morning_end_hour: default_morning_end_hour(),
            utc_offset_minutes: 0,
            rest_energy_threshold: default_rest_energy_threshold(),
            pattern_min_confidence: default_pattern_min_confidence(),
            review_weekday: default_review_weekday(),
            envelope_warn_ratio: default_envelope_warn_ratio(),
            checkin_gap_hours: default_checkin_gap_hours(),
        }
    }
}

impl SuggestionConfig {
    /// Effective cap: the configured value, never above [`SUGGESTION_CAP`].
    pub fn cap(&self) -> usize {
        self.max_suggestions.min(SUGGESTION_CAP)
    }

    pub fn review_day(&self) -> Option<Weekday> {
        self.review_weekday.parse().ok()
    }
}

/// Returns `~/.config/lifekernel[-dev]/` based on LIFEKERNEL_ENV.
///
/// Set LIFEKERNEL_ENV=dev to use the development directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn config_dir() -> Result<PathBuf> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("LIFEKERNEL_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("lifekernel-dev")
    } else {
        base_dir.join("lifekernel")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

impl KernelConfig {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_some() {
                current = current.get_mut(part).ok_or_else(unknown)?;
                continue;
            }

            let obj = current.as_object_mut().ok_or_else(unknown)?;
            let existing = obj.get(part).ok_or_else(unknown)?;

            let new_value = match existing {
                serde_json::Value::Bool(_) => value
                    .parse::<bool>()
                    .map(serde_json::Value::Bool)
                    .map_err(|e| invalid(e.to_string()))?,
                serde_json::Value::Number(n) if n.is_f64() => value
                    .parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(serde_json::Value::Number)
                    .ok_or_else(|| invalid(format!("cannot parse '{value}' as number")))?,
                serde_json::Value::Number(_) => value
                    .parse::<i64>()
                    .map(|n| serde_json::Value::Number(n.into()))
                    .map_err(|_| invalid(format!("cannot parse '{value}' as integer")))?,
                serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                    return Err(invalid("not a leaf key".to_string()));
                }
                _ => serde_json::Value::String(value.into()),
            };

            obj.insert(part.to_string(), new_value);
            return Ok(());
        }

        Err(unknown())
    }

    pub fn path() -> Result<PathBuf> {
        Ok(config_dir()?.join("config.toml"))
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let cfg: KernelConfig = toml::from_str(content)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from `path`, or return the default when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml_str(&content).map_err(|e| {
                CoreError::from(ConfigError::LoadFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: err.to_string(),
            }
            .into()),
        }
    }

    /// Load from disk or return default, writing the default out on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self> {
        let path = Self::path()?;
        let exists = path.exists();
        let cfg = Self::load_from(&path)?;
        if !exists {
            cfg.save_to(&path)?;
        }
        Ok(cfg)
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|err| {
            tracing::warn!(error = %err, "falling back to default configuration");
            Self::default()
        })
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path()?)
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key. The result is validated before it replaces
    /// `self`; call [`KernelConfig::save`] to persist.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the resulting configuration is invalid.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: KernelConfig =
            serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, message: &str| ConfigError::InvalidValue {
            key: key.to_string(),
            message: message.to_string(),
        };

        if self.checkin.trend_window_days == 0 {
            return Err(invalid("checkin.trend_window_days", "must be at least 1"));
        }
        if self.review.summary_max_chars < 4 {
            return Err(invalid("review.summary_max_chars", "must be at least 4"));
        }
        if self.hard_mode.rationale_max_chars < 4 {
            return Err(invalid("hard_mode.rationale_max_chars", "must be at least 4"));
        }
        let s = &self.suggestions;
        if s.morning_start_hour >= s.morning_end_hour || s.morning_end_hour > 24 {
            return Err(invalid(
                "suggestions.morning_start_hour",
                "morning window must satisfy start < end <= 24",
            ));
        }
        if s.utc_offset_minutes.abs() >= 24 * 60 {
            return Err(invalid("suggestions.utc_offset_minutes", "must be within one day"));
        }
        if !(0.0..=1.0).contains(&s.pattern_min_confidence) {
            return Err(invalid("suggestions.pattern_min_confidence", "must be within 0..=1"));
        }
        if !(s.envelope_warn_ratio > 0.0 && s.envelope_warn_ratio < 1.0) {
            return Err(invalid("suggestions.envelope_warn_ratio", "must be within (0, 1)"));
        }
        if s.review_day().is_none() {
            return Err(invalid("suggestions.review_weekday", "expected a weekday such as 'sun'"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = KernelConfig::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed = KernelConfig::from_toml_str(&toml_str).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn missing_sections_take_defaults() {
        let cfg = KernelConfig::from_toml_str("[checkin]\ntrend_window_days = 7\n").unwrap();
        assert_eq!(cfg.checkin.trend_window_days, 7);
        assert_eq!(cfg.review.summary_max_chars, 2000);
        assert_eq!(cfg.hard_mode.rationale_max_chars, 280);
        assert_eq!(cfg.suggestions.review_day(), Some(Weekday::Sun));
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = KernelConfig::default();
        assert_eq!(cfg.get("checkin.trend_window_days").as_deref(), Some("14"));
        assert_eq!(cfg.get("suggestions.review_weekday").as_deref(), Some("sun"));
        assert_eq!(cfg.get("suggestions.envelope_warn_ratio").as_deref(), Some("0.85"));
        assert!(cfg.get("checkin.missing_key").is_none());
        assert!(cfg.get("").is_none());
    }

    #[test]
    fn set_updates_nested_values() {
        let mut cfg = KernelConfig::default();
        cfg.set("hard_mode.rationale_max_chars", "140").unwrap();
        cfg.set("suggestions.pattern_min_confidence", "0.75").unwrap();
        cfg.set("suggestions.review_weekday", "fri").unwrap();
        cfg.set("suggestions.utc_offset_minutes", "-300").unwrap();
        assert_eq!(cfg.hard_mode.rationale_max_chars, 140);
        assert_eq!(cfg.suggestions.pattern_min_confidence, 0.75);
        assert_eq!(cfg.suggestions.review_day(), Some(Weekday::Fri));
        assert_eq!(cfg.suggestions.utc_offset_minutes, -300);
    }

    #[test]
    fn set_rejects_unknown_key() {
        let mut cfg = KernelConfig::default();
        assert!(matches!(
            cfg.set("review.nonexistent", "1"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(matches!(cfg.set("nope.deeper", "1"), Err(ConfigError::UnknownKey(_))));
    }

    #[test]
    fn low_energy_threshold_is_not_configurable() {
        let mut cfg = KernelConfig::default();
        assert!(matches!(
            cfg.set("hard_mode.low_energy_threshold", "0"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert_eq!(cfg, KernelConfig::default());

        // Old config files that still carry the key load with it ignored.
        let cfg = KernelConfig::from_toml_str("[hard_mode]\nlow_energy_threshold = 0\n").unwrap();
        assert_eq!(cfg, KernelConfig::default());
    }

    #[test]
    fn set_rejects_invalid_type_and_leaves_config_untouched() {
        let mut cfg = KernelConfig::default();
        assert!(cfg.set("checkin.trend_window_days", "two weeks").is_err());
        assert!(cfg.set("checkin.trend_window_days", "0").is_err());
        assert!(cfg.set("suggestions.review_weekday", "someday").is_err());
        assert!(cfg.set("checkin", "3").is_err());
        assert!(cfg.set("review.summary_max_chars", "2").is_err());
        assert_eq!(cfg, KernelConfig::default());
    }

    #[test]
    fn suggestion_cap_never_exceeds_three() {
        let mut cfg = KernelConfig::default();
        cfg.set("suggestions.max_suggestions", "10").unwrap();
        assert_eq!(cfg.suggestions.cap(), SUGGESTION_CAP);
        cfg.set("suggestions.max_suggestions", "1").unwrap();
        assert_eq!(cfg.suggestions.cap(), 1);
    }

    #[test]
    fn inverted_morning_window_is_invalid() {
        let err = KernelConfig::from_toml_str(
            "[suggestions]\nmorning_start_hour = 11\nmorning_end_hour = 6\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn save_and_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        assert_eq!(KernelConfig::load_from(&path).unwrap(), KernelConfig::default());

        let mut cfg = KernelConfig::default();
        cfg.set("review.max_intentions", "5").unwrap();
        cfg.save_to(&path).unwrap();
        assert_eq!(KernelConfig::load_from(&path).unwrap().review.max_intentions, 5);
    }

    #[test]
    fn load_reports_parse_failures() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[review\nmax_intentions = ").unwrap();
        assert!(KernelConfig::load_from(&path).is_err());
    }
}
