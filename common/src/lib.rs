pub mod config;
pub mod engine;
pub mod sampler;
pub mod topics;
pub mod types;
pub mod zone;

pub use config::{AccessoryConfig, ConfigError, MqttConfig, NamedTrigger, ZoneConfig};
pub use engine::{EngineAction, SunProtectEngine};
pub use sampler::{Ephemeris, PositionSampler, RawPosition, SampleError, SpaEphemeris};
pub use topics::Topics;
pub use types::{AccessoryStatus, Coordinate, Sample, StateChange, ZoneStatus, NO_TRIGGER};
pub use zone::{Evaluation, SystemState, Trigger, Window, Zone, ZoneMatcher};
