use chrono::{DateTime, Datelike, Utc};
use solar_positioning::{spa, time::DeltaT};

use crate::types::{Coordinate, Sample};

#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("solar position computation failed")]
    Spa(#[from] solar_positioning::Error),
}

/// Ephemeris output in the collaborator convention: radians, azimuth measured
/// from south and positive towards west.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawPosition {
    pub altitude: f64,
    pub azimuth: f64,
}

pub trait Ephemeris {
    fn position(
        &self,
        at: DateTime<Utc>,
        coordinate: Coordinate,
    ) -> Result<RawPosition, SampleError>;
}

/// NREL SPA backed ephemeris, without refraction correction.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpaEphemeris;

impl Ephemeris for SpaEphemeris {
    fn position(
        &self,
        at: DateTime<Utc>,
        coordinate: Coordinate,
    ) -> Result<RawPosition, SampleError> {
        let delta_t = DeltaT::estimate_from_date(at.year(), at.month())?;
        let position = spa::solar_position_no_refraction(
            at,
            coordinate.latitude,
            coordinate.longitude,
            0.0,
            delta_t,
        )?;

        // SPA reports azimuth clockwise from north.
        Ok(RawPosition {
            altitude: position.elevation_angle().to_radians(),
            azimuth: (position.azimuth() - 180.0).to_radians(),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct PositionSampler<E> {
    ephemeris: E,
}

impl<E: Ephemeris> PositionSampler<E> {
    pub fn new(ephemeris: E) -> Self {
        Self { ephemeris }
    }

    /// Sun position in degrees with azimuth shifted by 180° into [0, 360).
    ///
    /// Zone windows are authored against this azimuth reference.
    pub fn sample(
        &self,
        at: DateTime<Utc>,
        coordinate: Coordinate,
    ) -> Result<Sample, SampleError> {
        let raw = self.ephemeris.position(at, coordinate)?;
        Ok(Sample {
            altitude: raw.altitude.to_degrees(),
            azimuth: (raw.azimuth.to_degrees() + 180.0).rem_euclid(360.0),
        })
    }
}
