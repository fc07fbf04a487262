use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{
    topics::topic_segment,
    types::Coordinate,
    zone::{Window, Zone},
};

pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid coordinate lat={latitude} long={longitude}")]
    InvalidCoordinate { latitude: f64, longitude: f64 },
    #[error("zone `{zone}` trigger {trigger} has a non-finite bound")]
    NonFiniteBound { zone: String, trigger: usize },
    #[error("zone name `{0}` is declared more than once or shares its topic with another zone")]
    DuplicateZone(String),
    #[error("zone `{zone}` has {count} triggers, at most {max} are supported", max = u16::MAX)]
    TooManyTriggers { zone: String, count: usize },
    #[error("zone name cannot be empty")]
    EmptyZoneName,
    #[error("failed to parse accessory config")]
    Parse(#[from] serde_json::Error),
}

/// Flat trigger shape: a single named window that becomes its own zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedTrigger {
    pub name: String,
    #[serde(flatten)]
    pub window: Window,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneConfig {
    pub name: String,
    #[serde(default)]
    pub triggers: Vec<Window>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
    pub topic_prefix: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 1883,
            user: String::new(),
            pass: String::new(),
            topic_prefix: "sunprotect".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessoryConfig {
    pub name: String,
    pub location: Coordinate,
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    #[serde(default)]
    pub zones: Vec<ZoneConfig>,
    #[serde(default)]
    pub triggers: Vec<NamedTrigger>,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

fn default_refresh_interval_secs() -> u64 {
    DEFAULT_REFRESH_INTERVAL_SECS
}

fn default_http_port() -> u16 {
    8080
}

impl AccessoryConfig {
    pub fn from_json(raw: &[u8]) -> Result<Self, ConfigError> {
        let mut config: Self = serde_json::from_slice(raw)?;
        config.sanitize();
        Ok(config)
    }

    pub fn sanitize(&mut self) {
        self.refresh_interval_secs = self.refresh_interval_secs.clamp(1, 3_600);
        self.mqtt.topic_prefix = self.mqtt.topic_prefix.trim_matches('/').to_string();
        if self.mqtt.topic_prefix.is_empty() {
            self.mqtt.topic_prefix = MqttConfig::default().topic_prefix;
        }
    }

    /// Validated coordinate; evaluating with an invalid one would only yield NaN.
    pub fn coordinate(&self) -> Result<Coordinate, ConfigError> {
        if self.location.is_valid() {
            Ok(self.location)
        } else {
            Err(ConfigError::InvalidCoordinate {
                latitude: self.location.latitude,
                longitude: self.location.longitude,
            })
        }
    }

    /// Canonical zone list: declared zones in order, then every flat trigger
    /// as a single-trigger zone.
    pub fn normalized_zones(&self) -> Result<Vec<Zone>, ConfigError> {
        let declared = self
            .zones
            .iter()
            .map(|zone| (zone.name.as_str(), zone.triggers.clone()));
        let legacy = self
            .triggers
            .iter()
            .map(|trigger| (trigger.name.as_str(), vec![trigger.window]));

        let mut seen = HashSet::new();
        let mut zones = Vec::with_capacity(self.zones.len() + self.triggers.len());

        for (name, windows) in declared.chain(legacy) {
            let name = name.trim();
            if name.is_empty() {
                return Err(ConfigError::EmptyZoneName);
            }
            if !seen.insert(topic_segment(name)) {
                return Err(ConfigError::DuplicateZone(name.to_string()));
            }
            if windows.len() > usize::from(u16::MAX) {
                return Err(ConfigError::TooManyTriggers {
                    zone: name.to_string(),
                    count: windows.len(),
                });
            }
            if let Some(index) = windows
                .iter()
                .position(|window| window.bounds().iter().flatten().any(|b| !b.is_finite()))
            {
                return Err(ConfigError::NonFiniteBound {
                    zone: name.to_string(),
                    trigger: index + 1,
                });
            }
            zones.push(Zone::new(name, windows));
        }

        Ok(zones)
    }
}
