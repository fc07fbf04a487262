/// MQTT topic layout under a configurable prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub altitude: String,
    pub azimuth: String,
    pub active: String,
    pub state: String,
    pub cmd_active: String,
    zone_prefix: String,
}

impl Topics {
    pub fn new(prefix: &str) -> Self {
        Self {
            altitude: format!("{prefix}/state/altitude"),
            azimuth: format!("{prefix}/state/azimuth"),
            active: format!("{prefix}/state/active"),
            state: format!("{prefix}/state"),
            cmd_active: format!("{prefix}/cmnd/active"),
            zone_prefix: format!("{prefix}/zone"),
        }
    }

    pub fn zone(&self, name: &str) -> String {
        format!("{}/{}", self.zone_prefix, topic_segment(name))
    }
}

/// Zone name as a single topic level.
///
/// '+', '#' and '/' would turn the name into a wildcard or a sub-level.
pub fn topic_segment(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '+' | '#' | '/' => '_',
            c => c,
        })
        .collect()
}
