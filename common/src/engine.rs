use chrono::{DateTime, Utc};

use crate::{
    sampler::{Ephemeris, PositionSampler, SampleError},
    types::{AccessoryStatus, Coordinate, Sample, StateChange, ZoneStatus, NO_TRIGGER},
    zone::{SystemState, Zone, ZoneMatcher},
};

#[derive(Debug, Clone, PartialEq)]
pub enum EngineAction {
    /// Fresh altitude/azimuth readout, emitted every cycle.
    PublishPosition(Sample),
    ZoneChanged(StateChange),
    /// Manual activation flag change.
    ActiveChanged(bool),
    /// End-of-day rule switched the accessory off.
    AutoDisabled,
}

#[derive(Debug, Clone)]
pub struct SunProtectEngine<E> {
    name: String,
    coordinate: Coordinate,
    sampler: PositionSampler<E>,
    matcher: ZoneMatcher,
    state: SystemState,
    last_sample: Option<(DateTime<Utc>, Sample)>,
}

impl<E: Ephemeris> SunProtectEngine<E> {
    pub fn new(
        name: impl Into<String>,
        coordinate: Coordinate,
        zones: Vec<Zone>,
        ephemeris: E,
    ) -> Self {
        let matcher = ZoneMatcher::new(zones);
        let state = matcher.initial_state();
        Self {
            name: name.into(),
            coordinate,
            sampler: PositionSampler::new(ephemeris),
            matcher,
            state,
            last_sample: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn coordinate(&self) -> Coordinate {
        self.coordinate
    }

    pub fn zones(&self) -> &[Zone] {
        self.matcher.zones()
    }

    pub fn is_active(&self) -> bool {
        self.state.active
    }

    pub fn zone_outputs(&self) -> &[Option<u16>] {
        &self.state.outputs
    }

    pub fn last_sample(&self) -> Option<Sample> {
        self.last_sample.map(|(_, sample)| sample)
    }

    /// One evaluation cycle: sample the sun, then match zones when active.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Result<Vec<EngineAction>, SampleError> {
        let sample = self.sampler.sample(now, self.coordinate)?;
        self.last_sample = Some((now, sample));

        let mut actions = vec![EngineAction::PublishPosition(sample)];
        if !self.state.active {
            return Ok(actions);
        }

        let evaluation = self.matcher.evaluate(&self.state, &sample);
        self.state = evaluation.state;
        actions.extend(evaluation.changes.into_iter().map(EngineAction::ZoneChanged));
        if evaluation.auto_disabled {
            actions.push(EngineAction::AutoDisabled);
        }

        Ok(actions)
    }

    /// Manual activation signal.
    ///
    /// Arming resets every zone to "none" and schedules a full resync on the
    /// next tick. Disarming clears asserted zones right away.
    pub fn set_active(&mut self, active: bool) -> Vec<EngineAction> {
        let mut actions = Vec::new();

        if active {
            self.state = SystemState {
                active: true,
                outputs: vec![None; self.matcher.zones().len()],
                resync: true,
            };
        } else {
            let (mut cleared, changes) = self.matcher.clear(&self.state);
            cleared.active = false;
            self.state = cleared;
            actions.extend(changes.into_iter().map(EngineAction::ZoneChanged));
        }

        actions.push(EngineAction::ActiveChanged(active));
        actions
    }

    pub fn status(&self) -> AccessoryStatus {
        let zones = self
            .matcher
            .zones()
            .iter()
            .zip(&self.state.outputs)
            .map(|(zone, output)| ZoneStatus {
                name: zone.name.clone(),
                output: output.unwrap_or(NO_TRIGGER),
                trigger_count: zone.triggers.len(),
            })
            .collect();

        AccessoryStatus {
            name: self.name.clone(),
            active: self.state.active,
            altitude: self.last_sample.map(|(_, sample)| sample.altitude),
            azimuth: self.last_sample.map(|(_, sample)| sample.azimuth),
            latitude: self.coordinate.latitude,
            longitude: self.coordinate.longitude,
            sampled_at_epoch: self.last_sample.map(|(at, _)| at.timestamp()),
            zones,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{sampler::RawPosition, zone::Window};

    /// Ephemeris whose output is driven by the test, in output degrees.
    #[derive(Debug, Default)]
    struct ScriptedSun {
        altitude: Cell<f64>,
        azimuth: Cell<f64>,
    }

    impl ScriptedSun {
        fn put(&self, altitude: f64, azimuth: f64) {
            self.altitude.set(altitude);
            self.azimuth.set(azimuth);
        }
    }

    impl Ephemeris for &ScriptedSun {
        fn position(&self, _: DateTime<Utc>, _: Coordinate) -> Result<RawPosition, SampleError> {
            Ok(RawPosition {
                altitude: self.altitude.get().to_radians(),
                azimuth: (self.azimuth.get() - 180.0).to_radians(),
            })
        }
    }

    const HOME: Coordinate = Coordinate {
        latitude: 45.0,
        longitude: 5.0,
    };

    fn west_zone() -> Zone {
        Zone::new(
            "West",
            [Window {
                azimuth_min: Some(200.0),
                azimuth_max: Some(260.0),
                ..Window::default()
            }],
        )
    }

    fn zone_changes(actions: &[EngineAction]) -> Vec<(String, Option<u16>, Option<u16>)> {
        actions
            .iter()
            .filter_map(|action| match action {
                EngineAction::ZoneChanged(change) => {
                    Some((change.zone.clone(), change.old, change.new))
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn inactive_tick_only_publishes_position() {
        let sun = ScriptedSun::default();
        sun.put(10.0, 230.0);
        let mut engine = SunProtectEngine::new("Sun", HOME, vec![west_zone()], &sun);

        let actions = engine.tick(Utc::now()).unwrap();

        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], EngineAction::PublishPosition(_)));
        assert_eq!(engine.zone_outputs(), &[None]);
        assert!(engine.last_sample().is_some());
    }

    #[test]
    fn west_zone_lifecycle() {
        let sun = ScriptedSun::default();
        let mut engine = SunProtectEngine::new("Sun", HOME, vec![west_zone()], &sun);
        engine.set_active(true);

        sun.put(10.0, 230.0);
        let entered = engine.tick(Utc::now()).unwrap();
        assert_eq!(
            zone_changes(&entered),
            vec![("West".to_string(), None, Some(1))]
        );

        let held = engine.tick(Utc::now()).unwrap();
        assert!(zone_changes(&held).is_empty());

        sun.put(10.0, 100.0);
        let left = engine.tick(Utc::now()).unwrap();
        assert_eq!(
            zone_changes(&left),
            vec![("West".to_string(), Some(1), None)]
        );
    }

    #[test]
    fn vacuous_legacy_trigger_fires_on_activation() {
        let sun = ScriptedSun::default();
        sun.put(5.0, 120.0);
        let zones = vec![Zone::new("South", [Window::default()])];
        let mut engine = SunProtectEngine::new("Sun", HOME, zones, &sun);

        engine.set_active(true);
        let actions = engine.tick(Utc::now()).unwrap();

        assert_eq!(
            zone_changes(&actions),
            vec![("South".to_string(), None, Some(1))]
        );
    }

    #[test]
    fn auto_disable_clears_and_stops_matching() {
        let sun = ScriptedSun::default();
        let zones = vec![Zone::new("Always", [Window::default()])];
        let mut engine = SunProtectEngine::new("Sun", HOME, zones, &sun);
        engine.set_active(true);

        sun.put(20.0, 150.0);
        engine.tick(Utc::now()).unwrap();
        assert_eq!(engine.zone_outputs(), &[Some(1)]);

        sun.put(-1.0, 181.0);
        let actions = engine.tick(Utc::now()).unwrap();

        assert!(!engine.is_active());
        assert_eq!(engine.zone_outputs(), &[None]);
        assert_eq!(
            zone_changes(&actions),
            vec![("Always".to_string(), Some(1), None)]
        );
        assert_eq!(actions.last(), Some(&EngineAction::AutoDisabled));

        // Stays off until manually re-armed.
        sun.put(20.0, 150.0);
        let later = engine.tick(Utc::now()).unwrap();
        assert!(zone_changes(&later).is_empty());
        assert!(!engine.is_active());
    }

    #[test]
    fn deactivation_clears_immediately() {
        let sun = ScriptedSun::default();
        sun.put(10.0, 230.0);
        let mut engine = SunProtectEngine::new("Sun", HOME, vec![west_zone()], &sun);
        engine.set_active(true);
        engine.tick(Utc::now()).unwrap();

        let actions = engine.set_active(false);

        assert_eq!(
            actions,
            vec![
                EngineAction::ZoneChanged(StateChange {
                    zone: "West".to_string(),
                    old: Some(1),
                    new: None,
                }),
                EngineAction::ActiveChanged(false),
            ]
        );
        assert_eq!(engine.zone_outputs(), &[None]);
    }

    #[test]
    fn reactivation_reports_fresh_none() {
        let sun = ScriptedSun::default();
        let zones = vec![Zone::new(
            "West",
            [
                Window {
                    azimuth_min: Some(260.0),
                    ..Window::default()
                },
                Window {
                    azimuth_min: Some(200.0),
                    ..Window::default()
                },
            ],
        )];
        let mut engine = SunProtectEngine::new("Sun", HOME, zones, &sun);
        engine.set_active(true);
        sun.put(10.0, 230.0);
        engine.tick(Utc::now()).unwrap();
        assert_eq!(engine.zone_outputs(), &[Some(2)]);

        engine.set_active(false);
        engine.set_active(true);
        sun.put(10.0, 100.0);
        let actions = engine.tick(Utc::now()).unwrap();

        assert_eq!(engine.zone_outputs(), &[None]);
        assert_eq!(
            zone_changes(&actions),
            vec![("West".to_string(), None, None)]
        );
    }

    #[test]
    fn status_reflects_outputs() {
        let sun = ScriptedSun::default();
        sun.put(10.0, 230.0);
        let mut engine = SunProtectEngine::new(
            "Sun",
            HOME,
            vec![west_zone(), Zone::new("Never", Vec::<Window>::new())],
            &sun,
        );
        engine.set_active(true);
        let now = Utc::now();
        engine.tick(now).unwrap();

        let status = engine.status();

        assert!(status.active);
        assert_eq!(status.sampled_at_epoch, Some(now.timestamp()));
        assert_eq!(status.zones[0].output, 1);
        assert_eq!(status.zones[1].output, NO_TRIGGER);
        assert_eq!(status.zones[1].trigger_count, 0);
        let azimuth = status.azimuth.unwrap();
        assert!((azimuth - 230.0).abs() < 1e-9);
    }
}
