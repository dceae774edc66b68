use crate::device::{DeviceChannel, EntityId};
use crate::error::ConfigError;
use crate::scheduler::MIN_TICK_PERIOD;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

pub const ENV_PREFIX: &str = "AQUABUS";
pub const DEFAULT_API_URL: &str = "http://localhost:8080";

/// Where the broker lives and which entity backs each channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub ws_url: String,
    pub token: String,
    pub api_url: String,
    /// Blank ids in a config file mean "not configured" and are dropped.
    #[serde(deserialize_with = "configured_ids")]
    pub entity_ids: BTreeMap<DeviceChannel, EntityId>,
}

fn configured_ids<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BTreeMap<DeviceChannel, EntityId>, D::Error> {
    let raw = BTreeMap::<DeviceChannel, String>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|(channel, id)| EntityId::new(id).map(|id| (channel, id)))
        .collect())
}

impl LinkConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let setting = |name: &str| {
            lookup(&format!("{}_{}", ENV_PREFIX, name))
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let entity_ids = DeviceChannel::ALL
            .iter()
            .filter_map(|&channel| {
                let raw = setting(&format!("{}_ID", channel.env_key()))?;
                EntityId::new(raw).map(|id| (channel, id))
            })
            .collect();

        Self {
            ws_url: setting("WS_URL").unwrap_or_default(),
            token: setting("TOKEN").unwrap_or_default(),
            api_url: setting("API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            entity_ids,
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: LinkConfig = serde_json::from_str(&text).map_err(|source| ConfigError::InvalidJson {
            path: path.to_path_buf(),
            source,
        })?;
        if config.api_url.is_empty() {
            config.api_url = DEFAULT_API_URL.to_string();
        }
        Ok(config)
    }

    /// A live broker connection needs at least a websocket URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ws_url.is_empty() {
            return Err(ConfigError::Missing("ws_url"));
        }
        Ok(())
    }
}

/// Tank sizes, flow rates and tick cadence of the hydraulic model.
///
/// Rates are in volume units per minute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub underground_capacity: f64,
    pub overhead_capacity: f64,
    pub initial_underground_level: f64,
    pub initial_overhead_level: f64,
    pub pump_rate: f64,
    pub washbasin_rate: f64,
    pub kitchen_sink_rate: f64,
    pub shower_rate: f64,
    #[serde(with = "millis")]
    pub tick_period: Duration,
}

impl SimulationConfig {
    /// `tick_period`, raised to [`MIN_TICK_PERIOD`] if shorter.
    pub fn effective_tick_period(&self) -> Duration {
        self.tick_period.max(MIN_TICK_PERIOD)
    }

    pub fn ticks_per_minute(&self) -> f64 {
        60.0 / self.effective_tick_period().as_secs_f64()
    }

    pub fn per_tick(&self, rate_per_minute: f64) -> f64 {
        rate_per_minute / self.ticks_per_minute()
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            underground_capacity: 1000.0,
            overhead_capacity: 500.0,
            initial_underground_level: 500.0,
            initial_overhead_level: 250.0,
            pump_rate: 50.0,
            washbasin_rate: 8.0,
            kitchen_sink_rate: 10.0,
            shower_rate: 15.0,
            tick_period: Duration::from_secs(1),
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
