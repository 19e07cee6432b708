//! Cache configuration types

use crate::error::{ConfigError, RecallResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default sliding window for cached query results.
pub const DEFAULT_SLIDING_TTL_SECS: u64 = 10;

/// Default interval between expired-entry sweeps.
pub const DEFAULT_PURGE_INTERVAL_SECS: u64 = 60;

/// Advisory eviction priority. Stored with each entry and reported; it never
/// changes what a lookup returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePriority {
    Low,
    #[default]
    Normal,
    High,
    NeverRemove,
}

impl CachePriority {
    pub fn as_str(self) -> &'static str {
        match self {
            CachePriority::Low => "low",
            CachePriority::Normal => "normal",
            CachePriority::High => "high",
            CachePriority::NeverRemove => "never_remove",
        }
    }
}

impl fmt::Display for CachePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CachePriority {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "low" => Ok(CachePriority::Low),
            "normal" => Ok(CachePriority::Normal),
            "high" => Ok(CachePriority::High),
            "never_remove" | "neverremove" => Ok(CachePriority::NeverRemove),
            _ => Err(ConfigError::InvalidValue {
                field: "priority".to_string(),
                value: s.to_string(),
                reason: "expected one of low, normal, high, never_remove".to_string(),
            }),
        }
    }
}

/// Per-call caching policy: a sliding expiration window plus a priority
/// hint. A zero window disables caching for the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    pub sliding: Duration,
    pub priority: CachePriority,
}

impl TtlPolicy {
    pub fn new(sliding: Duration, priority: CachePriority) -> Self {
        Self { sliding, priority }
    }

    pub fn sliding_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs), CachePriority::Normal)
    }

    /// A policy that bypasses the store on both read and write.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, CachePriority::Normal)
    }

    pub fn is_disabled(&self) -> bool {
        self.sliding.is_zero()
    }

    pub fn with_priority(mut self, priority: CachePriority) -> Self {
        self.priority = priority;
        self
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self::sliding_secs(DEFAULT_SLIDING_TTL_SECS)
    }
}

/// Cache settings as loaded from the environment or a TOML document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub sliding_ttl_secs: u64,
    pub priority: CachePriority,
    /// Minimum time between automatic expired-entry sweeps of the in-memory
    /// store.
    pub purge_interval_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            sliding_ttl_secs: DEFAULT_SLIDING_TTL_SECS,
            priority: CachePriority::Normal,
            purge_interval_secs: DEFAULT_PURGE_INTERVAL_SECS,
        }
    }
}

impl CacheSettings {
    /// Create CacheSettings from environment variables.
    ///
    /// # Environment Variables
    /// - `RECALL_CACHE_ENABLED`: Whether results are cached (default: true)
    /// - `RECALL_CACHE_TTL_SECS`: Sliding expiration window (default: 10)
    /// - `RECALL_CACHE_PRIORITY`: Priority hint (default: normal)
    /// - `RECALL_CACHE_PURGE_INTERVAL_SECS`: Expired-entry sweep interval (default: 60)
    pub fn from_env() -> RecallResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a caller-supplied variable
    /// lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> RecallResult<Self> {
        let defaults = Self::default();

        let enabled = match lookup("RECALL_CACHE_ENABLED") {
            Some(raw) => parse_flag("enabled", &raw)?,
            None => defaults.enabled,
        };

        let sliding_ttl_secs = match lookup("RECALL_CACHE_TTL_SECS") {
            Some(raw) => parse_secs("sliding_ttl_secs", &raw)?,
            None => defaults.sliding_ttl_secs,
        };

        let priority = match lookup("RECALL_CACHE_PRIORITY") {
            Some(raw) => raw.parse()?,
            None => defaults.priority,
        };

        let purge_interval_secs = match lookup("RECALL_CACHE_PURGE_INTERVAL_SECS") {
            Some(raw) => parse_secs("purge_interval_secs", &raw)?,
            None => defaults.purge_interval_secs,
        };

        let settings = Self {
            enabled,
            sliding_ttl_secs,
            priority,
            purge_interval_secs,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from a TOML document. Missing keys take defaults.
    pub fn from_toml_str(source: &str) -> RecallResult<Self> {
        let settings: Self = toml::from_str(source).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> RecallResult<()> {
        if self.purge_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "purge_interval_secs".to_string(),
                value: self.purge_interval_secs.to_string(),
                reason: "purge_interval_secs must be positive".to_string(),
            }
            .into());
        }

        Ok(())
    }

    /// The policy to pass to `get_or_compute`. Disabled settings and a zero
    /// TTL both map to a zero window.
    pub fn to_policy(&self) -> TtlPolicy {
        if !self.enabled || self.sliding_ttl_secs == 0 {
            return TtlPolicy::disabled();
        }
        TtlPolicy::new(Duration::from_secs(self.sliding_ttl_secs), self.priority)
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs)
    }
}

fn parse_flag(field: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: raw.to_string(),
            reason: "expected one of true, false, 1, 0".to_string(),
        }),
    }
}

fn parse_secs(field: &str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        field: field.to_string(),
        value: raw.to_string(),
        reason: "expected a whole number of seconds".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecallError;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_without_environment() {
        let settings = CacheSettings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings, CacheSettings::default());
        assert_eq!(settings.to_policy(), TtlPolicy::sliding_secs(10));
    }

    #[test]
    fn test_environment_overrides() {
        let settings = CacheSettings::from_lookup(lookup(&[
            ("RECALL_CACHE_TTL_SECS", "30"),
            ("RECALL_CACHE_PRIORITY", "High"),
        ]))
        .unwrap();
        assert_eq!(settings.sliding_ttl_secs, 30);
        assert_eq!(settings.priority, CachePriority::High);
        assert_eq!(
            settings.to_policy(),
            TtlPolicy::new(Duration::from_secs(30), CachePriority::High)
        );
    }

    #[test]
    fn test_disabled_maps_to_zero_window() {
        let settings = CacheSettings::from_lookup(lookup(&[
            ("RECALL_CACHE_ENABLED", "false"),
            ("RECALL_CACHE_TTL_SECS", "0"),
        ]))
        .unwrap();
        assert!(settings.to_policy().is_disabled());
    }

    #[test]
    fn test_invalid_ttl_rejected() {
        let err = CacheSettings::from_lookup(lookup(&[("RECALL_CACHE_TTL_SECS", "ten")]))
            .unwrap_err();
        assert!(matches!(
            err,
            RecallError::Config(ConfigError::InvalidValue { ref field, .. }) if field == "sliding_ttl_secs"
        ));

    }

    #[test]
    fn test_zero_ttl_disables_caching() {
        let settings =
            CacheSettings::from_lookup(lookup(&[("RECALL_CACHE_TTL_SECS", "0")])).unwrap();
        assert!(settings.enabled);
        assert!(settings.to_policy().is_disabled());

        let settings = CacheSettings::from_toml_str("sliding_ttl_secs = 0").unwrap();
        assert!(settings.to_policy().is_disabled());
    }

    #[test]
    fn test_enabled_flag_parsing() {
        for (raw, expected) in [("true", true), (" TRUE ", true), ("1", true), ("False", false), ("0", false)] {
            let settings =
                CacheSettings::from_lookup(lookup(&[("RECALL_CACHE_ENABLED", raw)])).unwrap();
            assert_eq!(settings.enabled, expected, "RECALL_CACHE_ENABLED={:?}", raw);
        }

        for raw in ["no", "off", "flase", ""] {
            let err = CacheSettings::from_lookup(lookup(&[("RECALL_CACHE_ENABLED", raw)]))
                .unwrap_err();
            assert!(matches!(
                err,
                RecallError::Config(ConfigError::InvalidValue { ref field, .. }) if field == "enabled"
            ));
        }
    }

    #[test]
    fn test_zero_purge_interval_rejected() {
        let err = CacheSettings::from_lookup(lookup(&[("RECALL_CACHE_PURGE_INTERVAL_SECS", "0")]))
            .unwrap_err();
        assert!(matches!(
            err,
            RecallError::Config(ConfigError::InvalidValue { ref field, .. }) if field == "purge_interval_secs"
        ));
    }

    #[test]
    fn test_invalid_priority_rejected() {
        let err = "urgent".parse::<CachePriority>().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
        assert_eq!("never-remove".parse::<CachePriority>(), Ok(CachePriority::NeverRemove));
    }

    #[test]
    fn test_from_toml() {
        let settings = CacheSettings::from_toml_str(
            r#"
            sliding_ttl_secs = 120
            priority = "never_remove"
            "#,
        )
        .unwrap();
        assert!(settings.enabled);
        assert_eq!(settings.sliding_ttl_secs, 120);
        assert_eq!(settings.priority, CachePriority::NeverRemove);
        assert_eq!(settings.purge_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_from_toml_parse_error() {
        let err = CacheSettings::from_toml_str("sliding_ttl_secs = \"soon\"").unwrap_err();
        assert!(matches!(err, RecallError::Config(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_ttl_policy_helpers() {
        assert!(TtlPolicy::disabled().is_disabled());
        assert!(!TtlPolicy::default().is_disabled());
        assert_eq!(
            TtlPolicy::sliding_secs(5).with_priority(CachePriority::Low).priority,
            CachePriority::Low
        );
    }
}
