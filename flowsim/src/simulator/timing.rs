//! Simulated duration models.

use rand::Rng;
use serde_json::{Map, Value};

/// Config key that pins a step's simulated duration.
pub const DURATION_OVERRIDE_KEY: &str = "simulatedDurationMs";

/// Latency band for components without a model.
pub const NORMAL: TimingModel = TimingModel::Range { min: 100, max: 500 };

/// How long a component pretends to take.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimingModel {
    /// Always the same duration.
    Fixed(u64),
    /// A fraction of a numeric config value, e.g. 20% of `timeoutMs`.
    ConfigFraction {
        /// Config key to read.
        key: &'static str,
        /// Multiplier applied to the config value.
        fraction: f64,
        /// Duration when the key is absent or not a number.
        fallback_ms: u64,
    },
    /// Uniformly drawn from `min..=max`.
    Range {
        /// Lower bound in ms.
        min: u64,
        /// Upper bound in ms.
        max: u64,
    },
}

impl TimingModel {
    /// Draws a duration in milliseconds.
    ///
    /// A numeric `simulatedDurationMs` in `config` wins over the model.
    pub fn sample<R: Rng + ?Sized>(&self, config: &Map<String, Value>, rng: &mut R) -> u64 {
        if let Some(ms) = config.get(DURATION_OVERRIDE_KEY).and_then(as_millis) {
            return ms;
        }

        match *self {
            Self::Fixed(ms) => ms,
            Self::ConfigFraction {
                key,
                fraction,
                fallback_ms,
            } => config
                .get(key)
                .and_then(Value::as_f64)
                .filter(|v| v.is_finite() && *v >= 0.0)
                .map_or(fallback_ms, |v| scale(v, fraction)),
            Self::Range { min, max } if min >= max => min,
            Self::Range { min, max } => rng.gen_range(min..=max),
        }
    }
}

fn as_millis(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|v| v.is_finite() && *v >= 0.0).map(|v| scale(v, 1.0)))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scale(value: f64, fraction: f64) -> u64 {
    (value * fraction).round().max(0.0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    fn config(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_fixed() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(TimingModel::Fixed(20).sample(&Map::new(), &mut rng), 20);
    }

    #[test]
    fn test_config_fraction() {
        let mut rng = StdRng::seed_from_u64(1);
        let model = TimingModel::ConfigFraction {
            key: "timeoutMs",
            fraction: 0.2,
            fallback_ms: 300,
        };
        assert_eq!(model.sample(&config(json!({ "timeoutMs": 1000 })), &mut rng), 200);
        assert_eq!(model.sample(&config(json!({ "timeoutMs": "soon" })), &mut rng), 300);
        assert_eq!(model.sample(&Map::new(), &mut rng), 300);
    }

    #[test]
    fn test_range_is_bounded_and_seeded() {
        let draw = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..20).map(|_| NORMAL.sample(&Map::new(), &mut rng)).collect::<Vec<_>>()
        };
        let first = draw(42);
        assert!(first.iter().all(|ms| (100..=500).contains(ms)));
        assert_eq!(first, draw(42));
    }

    #[test]
    fn test_override_wins() {
        let mut rng = StdRng::seed_from_u64(1);
        let cfg = config(json!({ "simulatedDurationMs": 7 }));
        assert_eq!(NORMAL.sample(&cfg, &mut rng), 7);
    }

    #[test]
    fn test_degenerate_range() {
        let mut rng = StdRng::seed_from_u64(1);
        let model = TimingModel::Range { min: 50, max: 10 };
        assert_eq!(model.sample(&Map::new(), &mut rng), 50);
    }
}
