use serde::{Deserialize, Serialize};

use crate::types::{Sample, StateChange};

/// Angular box a sample must fall into. Absent bounds leave that side open.
///
/// Every present bound is a strict inequality. Inverted bounds (min >= max on
/// one axis) are accepted as-is: such a window simply never matches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Window {
    #[serde(default)]
    pub azimuth_min: Option<f64>,
    #[serde(default)]
    pub azimuth_max: Option<f64>,
    #[serde(default)]
    pub altitude_min: Option<f64>,
    #[serde(default)]
    pub altitude_max: Option<f64>,
}

impl Window {
    pub fn matches(&self, sample: &Sample) -> bool {
        self.azimuth_min.is_none_or(|min| sample.azimuth > min)
            && self.azimuth_max.is_none_or(|max| sample.azimuth < max)
            && self.altitude_min.is_none_or(|min| sample.altitude > min)
            && self.altitude_max.is_none_or(|max| sample.altitude < max)
    }

    /// True when some axis has `min >= max`, so the window can never match.
    pub fn is_degenerate(&self) -> bool {
        fn inverted(min: Option<f64>, max: Option<f64>) -> bool {
            matches!((min, max), (Some(min), Some(max)) if min >= max)
        }

        inverted(self.azimuth_min, self.azimuth_max)
            || inverted(self.altitude_min, self.altitude_max)
    }

    pub fn is_unbounded(&self) -> bool {
        self.bounds().iter().all(Option::is_none)
    }

    pub(crate) fn bounds(&self) -> [Option<f64>; 4] {
        [
            self.azimuth_min,
            self.azimuth_max,
            self.altitude_min,
            self.altitude_max,
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    /// 1-based position within the zone.
    pub id: u16,
    pub window: Window,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Zone {
    pub name: String,
    pub triggers: Vec<Trigger>,
}

impl Zone {
    /// Ids run from 1 to `u16::MAX`; windows past that are dropped.
    pub fn new(name: impl Into<String>, windows: impl IntoIterator<Item = Window>) -> Self {
        let triggers = windows
            .into_iter()
            .zip(1..=u16::MAX)
            .map(|(window, id)| Trigger { id, window })
            .collect();
        Self {
            name: name.into(),
            triggers,
        }
    }

    /// Id of the first trigger in declared order whose window matches.
    pub fn first_match(&self, sample: &Sample) -> Option<u16> {
        self.triggers
            .iter()
            .find(|trigger| trigger.window.matches(sample))
            .map(|trigger| trigger.id)
    }
}

/// Activation flag plus the current output of every zone, indexed like the zones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemState {
    pub active: bool,
    pub outputs: Vec<Option<u16>>,
    /// Set on re-arm: the next evaluation reports every zone, changed or not.
    pub resync: bool,
}

impl SystemState {
    pub fn idle(zone_count: usize) -> Self {
        Self {
            active: false,
            outputs: vec![None; zone_count],
            resync: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub state: SystemState,
    pub changes: Vec<StateChange>,
    pub auto_disabled: bool,
}

/// Past solar noon and below the horizon.
pub fn is_end_of_day(sample: &Sample) -> bool {
    sample.altitude < 0.0 && sample.azimuth > 180.0
}

#[derive(Debug, Clone)]
pub struct ZoneMatcher {
    zones: Vec<Zone>,
}

impl ZoneMatcher {
    pub fn new(zones: Vec<Zone>) -> Self {
        Self { zones }
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn initial_state(&self) -> SystemState {
        SystemState::idle(self.zones.len())
    }

    /// Derive the next state for `sample` and the transitions that lead to it.
    ///
    /// An inactive state is returned untouched. When the end-of-day rule fires
    /// the system deactivates and every zone is forced to "none" without being
    /// scanned.
    pub fn evaluate(&self, state: &SystemState, sample: &Sample) -> Evaluation {
        if !state.active {
            return Evaluation {
                state: state.clone(),
                changes: Vec::new(),
                auto_disabled: false,
            };
        }

        let auto_disabled = is_end_of_day(sample);
        let mut next = SystemState {
            active: !auto_disabled,
            outputs: Vec::with_capacity(self.zones.len()),
            resync: false,
        };
        let mut changes = Vec::new();

        for (index, zone) in self.zones.iter().enumerate() {
            let old = state.outputs.get(index).copied().flatten();
            let new = if auto_disabled {
                None
            } else {
                zone.first_match(sample)
            };

            let report = old != new || (state.resync && !auto_disabled);
            if report {
                changes.push(StateChange {
                    zone: zone.name.clone(),
                    old,
                    new,
                });
            }
            next.outputs.push(new);
        }

        Evaluation {
            state: next,
            changes,
            auto_disabled,
        }
    }

    /// Force every zone to "none", reporting the zones that were asserted.
    pub fn clear(&self, state: &SystemState) -> (SystemState, Vec<StateChange>) {
        let changes = self
            .zones
            .iter()
            .zip(&state.outputs)
            .filter_map(|(zone, old)| {
                old.map(|old| StateChange {
                    zone: zone.name.clone(),
                    old: Some(old),
                    new: None,
                })
            })
            .collect();

        let next = SystemState {
            active: state.active,
            outputs: vec![None; self.zones.len()],
            resync: state.resync,
        };
        (next, changes)
    }
}
