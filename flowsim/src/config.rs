//! Engine configuration.
//!
//! [`EngineConfig`] holds engine-wide defaults; [`ExecutionOptions`] carries
//! per-run overrides from the request envelope.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::env;
use std::time::Duration;

const fn default_time_scale() -> f64 {
    1.0
}

const fn default_retention_secs() -> u64 {
    300
}

/// Engine-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Run seed used when a run does not supply one. `None` draws a fresh
    /// seed per run.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Multiplier applied to simulated durations before sleeping. `0`
    /// disables sleeping.
    #[serde(default = "default_time_scale")]
    pub time_scale: f64,

    /// How long a finished run stays queryable.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    /// Heartbeat interval; `None` disables heartbeats.
    #[serde(default)]
    pub heartbeat_interval_ms: Option<u64>,

    /// Advisory timeout for whole runs.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: None,
            time_scale: default_time_scale(),
            retention_secs: default_retention_secs(),
            heartbeat_interval_ms: None,
            timeout_ms: None,
        }
    }
}

impl EngineConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads overrides from the environment.
    ///
    /// - `FLOWSIM_SEED`
    /// - `FLOWSIM_TIME_SCALE`
    /// - `FLOWSIM_RETENTION_SECS`
    /// - `FLOWSIM_HEARTBEAT_MS`
    ///
    /// Unparseable values are ignored with a warning.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            seed: env_parse("FLOWSIM_SEED").or(defaults.seed),
            time_scale: env_parse("FLOWSIM_TIME_SCALE")
                .filter(|scale: &f64| scale.is_finite() && *scale >= 0.0)
                .unwrap_or(defaults.time_scale),
            retention_secs: env_parse("FLOWSIM_RETENTION_SECS").unwrap_or(defaults.retention_secs),
            heartbeat_interval_ms: env_parse("FLOWSIM_HEARTBEAT_MS")
                .filter(|ms| *ms > 0)
                .or(defaults.heartbeat_interval_ms),
            timeout_ms: defaults.timeout_ms,
        }
    }

    /// Sets the default run seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Sets the time scale.
    #[must_use]
    pub const fn with_time_scale(mut self, scale: f64) -> Self {
        self.time_scale = scale;
        self
    }

    /// Sets the retention period for finished runs.
    #[must_use]
    pub const fn with_retention(mut self, retention: Duration) -> Self {
        self.retention_secs = retention.as_secs();
        self
    }

    /// Enables heartbeats.
    #[must_use]
    pub const fn with_heartbeat_ms(mut self, interval_ms: u64) -> Self {
        self.heartbeat_interval_ms = Some(interval_ms);
        self
    }

    /// Sets the advisory run timeout.
    #[must_use]
    pub const fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Retention as a [`Duration`].
    #[must_use]
    pub const fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    let parsed = raw.trim().parse().ok();
    if parsed.is_none() {
        tracing::warn!(key, value = %raw, "Ignoring unparseable environment override");
    }
    parsed
}

/// Per-run overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOptions {
    /// Run seed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Time scale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_scale: Option<f64>,
    /// Heartbeat interval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_interval_ms: Option<u64>,
    /// Advisory run timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Initial context variables.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub context_variables: Map<String, Value>,
}

impl ExecutionOptions {
    /// Creates empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Sets the time scale.
    #[must_use]
    pub fn with_time_scale(mut self, scale: f64) -> Self {
        self.time_scale = Some(scale);
        self
    }

    /// Enables heartbeats.
    #[must_use]
    pub fn with_heartbeat_ms(mut self, interval_ms: u64) -> Self {
        self.heartbeat_interval_ms = Some(interval_ms);
        self
    }

    /// Sets the advisory timeout.
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Adds an initial context variable.
    #[must_use]
    pub fn with_context_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.context_variables.insert(name.into(), value);
        self
    }

    /// Merges these options over the engine defaults.
    #[must_use]
    pub fn effective(&self, config: &EngineConfig) -> EffectiveOptions {
        EffectiveOptions {
            seed: self.seed.or(config.seed).unwrap_or_else(rand::random),
            time_scale: self
                .time_scale
                .filter(|s| s.is_finite() && *s >= 0.0)
                .unwrap_or(config.time_scale),
            heartbeat_interval_ms: self
                .heartbeat_interval_ms
                .or(config.heartbeat_interval_ms)
                .filter(|ms| *ms > 0),
            timeout_ms: self.timeout_ms.or(config.timeout_ms),
        }
    }
}

/// Resolved settings for one run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectiveOptions {
    /// Run seed.
    pub seed: u64,
    /// Time scale.
    pub time_scale: f64,
    /// Heartbeat interval.
    pub heartbeat_interval_ms: Option<u64>,
    /// Advisory timeout.
    pub timeout_ms: Option<u64>,
}

impl EffectiveOptions {
    /// Wall-clock sleep for a simulated duration. Saturates at
    /// [`Duration::MAX`] when the scaled value is out of range.
    #[must_use]
    pub fn scaled(&self, simulated_ms: u64) -> Duration {
        if self.time_scale <= 0.0 || simulated_ms == 0 {
            return Duration::ZERO;
        }
        #[allow(clippy::cast_precision_loss)]
        let ms = simulated_ms as f64 * self.time_scale;
        Duration::try_from_secs_f64(ms / 1000.0).unwrap_or(Duration::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_defaults_from_empty_json() {
        let config: EngineConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.retention(), Duration::from_secs(300));
    }

    #[test]
    fn test_options_override_engine() {
        let config = EngineConfig::new()
            .with_seed(1)
            .with_time_scale(0.5)
            .with_heartbeat_ms(100);
        let options = ExecutionOptions::new().with_seed(9).with_time_scale(0.0);

        let effective = options.effective(&config);
        assert_eq!(effective.seed, 9);
        assert_eq!(effective.time_scale, 0.0);
        assert_eq!(effective.heartbeat_interval_ms, Some(100));
        assert_eq!(effective.timeout_ms, None);
    }

    #[test]
    fn test_invalid_time_scale_falls_back() {
        let config = EngineConfig::new().with_time_scale(2.0);
        let effective = ExecutionOptions::new().with_time_scale(-1.0).effective(&config);
        assert_eq!(effective.time_scale, 2.0);
    }

    #[test]
    fn test_scaled_duration() {
        let mut effective = ExecutionOptions::new().with_seed(0).effective(&EngineConfig::new());
        assert_eq!(effective.scaled(250), Duration::from_millis(250));

        effective.time_scale = 0.5;
        assert_eq!(effective.scaled(1000), Duration::from_millis(500));

        effective.time_scale = 0.0;
        assert_eq!(effective.scaled(1000), Duration::ZERO);

        effective.time_scale = 1e300;
        assert_eq!(effective.scaled(2), Duration::MAX);
    }

    #[test]
    fn test_options_wire_format() {
        let options: ExecutionOptions = serde_json::from_value(json!({
            "seed": 42,
            "timeScale": 0.0,
            "contextVariables": { "region": "eu" }
        }))
        .unwrap();

        assert_eq!(options.seed, Some(42));
        assert_eq!(options.context_variables["region"], json!("eu"));
    }
}
