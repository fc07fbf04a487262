use serde::{Deserialize, Serialize};

/// Wire value for a zone whose output is "none".
pub const NO_TRIGGER: u16 = 0;

/// Observer location in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    #[serde(alias = "lat")]
    pub latitude: f64,
    #[serde(alias = "long", alias = "lon")]
    pub longitude: f64,
}

impl Coordinate {
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Instantaneous sun position in degrees. Azimuth is in [0, 360).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    pub altitude: f64,
    pub azimuth: f64,
}

impl Sample {
    pub fn new(altitude: f64, azimuth: f64) -> Self {
        Self { altitude, azimuth }
    }
}

/// A zone output moved from `old` to `new`. `None` is the "no trigger matches" state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub zone: String,
    pub old: Option<u16>,
    pub new: Option<u16>,
}

impl StateChange {
    pub fn wire_value(&self) -> u16 {
        self.new.unwrap_or(NO_TRIGGER)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ZoneStatus {
    pub name: String,
    pub output: u16,
    #[serde(rename = "triggerCount")]
    pub trigger_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccessoryStatus {
    pub name: String,
    pub active: bool,
    pub altitude: Option<f64>,
    pub azimuth: Option<f64>,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(rename = "sampledAtEpoch")]
    pub sampled_at_epoch: Option<i64>,
    pub zones: Vec<ZoneStatus>,
}
