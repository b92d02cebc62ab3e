//! Normalized aircraft state as reported by one fetch cycle.

use serde::Serialize;

/// Map location in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    pub longitude: f64,
    pub latitude: f64,
}

impl Position {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Position { longitude, latitude }
    }

    /// GeoJSON coordinate order.
    pub fn lng_lat(&self) -> [f64; 2] {
        [self.longitude, self.latitude]
    }
}

/// Origin of the position fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PositionSource {
    AdsB,
    Asterix,
    Mlat,
    Flarm,
    Other(i64),
}

impl From<i64> for PositionSource {
    fn from(code: i64) -> Self {
        match code {
            0 => PositionSource::AdsB,
            1 => PositionSource::Asterix,
            2 => PositionSource::Mlat,
            3 => PositionSource::Flarm,
            other => PositionSource::Other(other),
        }
    }
}

/// One aircraft's state. `None` always means "unknown", never zero or empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AircraftRecord {
    /// transponder address, unique within one fetch result
    pub icao24: String,
    pub callsign: Option<String>,
    pub origin_country: String,
    /// only set if both coordinates were reported
    pub position: Option<Position>,
    /// meters
    pub baro_altitude: Option<f64>,
    /// meters
    pub geo_altitude: Option<f64>,
    pub on_ground: bool,
    /// m/s
    pub velocity: Option<f64>,
    /// degrees clockwise from north
    pub true_track: Option<f64>,
    /// m/s
    pub vertical_rate: Option<f64>,
    pub squawk: Option<String>,
    pub spi: Option<bool>,
    pub position_source: Option<PositionSource>,
    pub category: Option<i64>,
    pub sensors: Option<Vec<i64>>,
    /// unix seconds
    pub time_position: Option<i64>,
    /// unix seconds
    pub last_contact: Option<i64>,
}

impl AircraftRecord {
    pub fn has_position(&self) -> bool {
        self.position.is_some()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Airborne record with position and the rendered fields set.
    pub fn aircraft(icao24: &str, lon: f64, lat: f64) -> AircraftRecord {
        AircraftRecord {
            icao24: icao24.to_string(),
            callsign: Some(format!("{}1", icao24.to_uppercase())),
            origin_country: "United States".to_string(),
            position: Some(Position::new(lon, lat)),
            baro_altitude: Some(3000.0),
            geo_altitude: Some(3100.0),
            on_ground: false,
            velocity: Some(200.0),
            true_track: Some(90.0),
            vertical_rate: None,
            squawk: None,
            spi: Some(false),
            position_source: Some(PositionSource::AdsB),
            category: None,
            sensors: None,
            time_position: Some(1690000000),
            last_contact: Some(1690000005),
        }
    }
}
