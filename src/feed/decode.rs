//! Decoder for the positional state vector format of the feed.
//!
//! Every state vector is a JSON array without field names. All knowledge about which
//! index holds which value lives in [`Slot`]; the rest of the crate only ever sees
//! [`AircraftRecord`]s.

use std::collections::HashSet;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::aircraft::{AircraftRecord, Position, PositionSource};
use crate::errors::StateVectorError;

/// Slots of a state vector, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Icao24,
    Callsign,
    OriginCountry,
    TimePosition,
    LastContact,
    Longitude,
    Latitude,
    BaroAltitude,
    OnGround,
    Velocity,
    TrueTrack,
    VerticalRate,
    Sensors,
    GeoAltitude,
    Squawk,
    Spi,
    PositionSource,
    Category,
}

impl Slot {
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Slot::Icao24 => "icao24",
            Slot::Callsign => "callsign",
            Slot::OriginCountry => "origin_country",
            Slot::TimePosition => "time_position",
            Slot::LastContact => "last_contact",
            Slot::Longitude => "longitude",
            Slot::Latitude => "latitude",
            Slot::BaroAltitude => "baro_altitude",
            Slot::OnGround => "on_ground",
            Slot::Velocity => "velocity",
            Slot::TrueTrack => "true_track",
            Slot::VerticalRate => "vertical_rate",
            Slot::Sensors => "sensors",
            Slot::GeoAltitude => "geo_altitude",
            Slot::Squawk => "squawk",
            Slot::Spi => "spi",
            Slot::PositionSource => "position_source",
            Slot::Category => "category",
        }
    }
}

static NULL: Value = Value::Null;

/// `category` is only sent for extended requests, so the last slot may be missing.
pub const MIN_SLOTS: usize = 17;

/// Body of a states response.
#[derive(Debug, Deserialize)]
pub struct StatesResponse {
    pub time: i64,
    pub states: Option<Vec<Vec<Value>>>,
}

/// Number of state vectors left out of a decoded response, by reason.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SkipCounts {
    pub no_position: usize,
    pub malformed: usize,
    pub duplicate: usize,
}

impl SkipCounts {
    pub fn total(&self) -> usize {
        self.no_position + self.malformed + self.duplicate
    }
}

/// Decoded result of one successful fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSnapshot {
    /// server timestamp, unix seconds
    pub server_time: i64,
    pub aircraft: Vec<AircraftRecord>,
    pub skipped: SkipCounts,
}

pub fn decode_response(body: &[u8]) -> Result<FeedSnapshot, serde_json::Error> {
    let response: StatesResponse = serde_json::from_slice(body)?;
    let (aircraft, skipped) = match response.states.as_deref() {
        Some(states) => decode_states(states),
        None => (Vec::new(), SkipCounts::default()),
    };

    if skipped.total() > 0 {
        debug!(
            "skipped {} state vectors (no position: {}, malformed: {}, duplicate: {})",
            skipped.total(),
            skipped.no_position,
            skipped.malformed,
            skipped.duplicate
        );
    }

    Ok(FeedSnapshot { server_time: response.time, aircraft, skipped })
}

/// Decodes all displayable state vectors. The first state vector of each icao24 wins,
/// even when it has no position or is otherwise unusable.
pub fn decode_states(states: &[Vec<Value>]) -> (Vec<AircraftRecord>, SkipCounts) {
    let mut skipped = SkipCounts::default();
    let mut seen = HashSet::new();
    let mut aircraft = Vec::with_capacity(states.len());

    for slots in states {
        let (sv, icao24) = match StateVector::new(slots).and_then(|sv| Ok((sv, sv.icao24()?))) {
            Ok(decoded) => decoded,
            Err(e) => {
                debug!("skipping state vector: {}", e);
                skipped.malformed += 1;
                continue;
            }
        };

        if !seen.insert(icao24.clone()) {
            warn!("dropping duplicate state vector for {}", icao24);
            skipped.duplicate += 1;
            continue;
        }

        match sv.to_record() {
            Ok(Some(record)) => aircraft.push(record),
            Ok(None) => skipped.no_position += 1,
            Err(e) => {
                debug!("skipping state vector: {}", e);
                skipped.malformed += 1;
            }
        }
    }

    (aircraft, skipped)
}

/// Named, type checked view of one positional state vector.
#[derive(Debug, Clone, Copy)]
pub struct StateVector<'a> {
    slots: &'a [Value],
}

impl<'a> StateVector<'a> {
    pub fn new(slots: &'a [Value]) -> Result<Self, StateVectorError> {
        if slots.len() < MIN_SLOTS {
            return Err(StateVectorError::Length(slots.len()));
        }
        Ok(StateVector { slots })
    }

    fn slot(&self, slot: Slot) -> &'a Value {
        self.slots.get(slot.index()).unwrap_or(&NULL)
    }

    fn mismatch(&self, slot: Slot) -> StateVectorError {
        StateVectorError::FieldType { field: slot.name(), value: self.slot(slot).clone() }
    }

    fn opt_f64(&self, slot: Slot) -> Result<Option<f64>, StateVectorError> {
        match self.slot(slot) {
            Value::Null => Ok(None),
            Value::Number(n) => n.as_f64().map(Some).ok_or_else(|| self.mismatch(slot)),
            _ => Err(self.mismatch(slot)),
        }
    }

    fn opt_i64(&self, slot: Slot) -> Result<Option<i64>, StateVectorError> {
        match self.slot(slot) {
            Value::Null => Ok(None),
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                .map(Some)
                .ok_or_else(|| self.mismatch(slot)),
            _ => Err(self.mismatch(slot)),
        }
    }

    fn opt_bool(&self, slot: Slot) -> Result<Option<bool>, StateVectorError> {
        match self.slot(slot) {
            Value::Null => Ok(None),
            Value::Bool(b) => Ok(Some(*b)),
            _ => Err(self.mismatch(slot)),
        }
    }

    fn opt_string(&self, slot: Slot) -> Result<Option<String>, StateVectorError> {
        match self.slot(slot) {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s.clone())),
            _ => Err(self.mismatch(slot)),
        }
    }

    fn required<T>(&self, slot: Slot, value: Option<T>) -> Result<T, StateVectorError> {
        value.ok_or_else(|| self.mismatch(slot))
    }

    fn opt_sensors(&self) -> Result<Option<Vec<i64>>, StateVectorError> {
        match self.slot(Slot::Sensors) {
            Value::Null => Ok(None),
            Value::Array(ids) => ids
                .iter()
                .map(|id| id.as_i64().ok_or_else(|| self.mismatch(Slot::Sensors)))
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            _ => Err(self.mismatch(Slot::Sensors)),
        }
    }

    pub fn icao24(&self) -> Result<String, StateVectorError> {
        self.required(Slot::Icao24, self.opt_string(Slot::Icao24)?)
    }

    pub fn callsign(&self) -> Result<Option<String>, StateVectorError> {
        self.opt_string(Slot::Callsign)
    }

    pub fn origin_country(&self) -> Result<String, StateVectorError> {
        self.required(Slot::OriginCountry, self.opt_string(Slot::OriginCountry)?)
    }

    /// `None` unless both coordinates are reported.
    pub fn position(&self) -> Result<Option<Position>, StateVectorError> {
        if self.slot(Slot::Longitude).is_null() || self.slot(Slot::Latitude).is_null() {
            return Ok(None);
        }
        let longitude = self.required(Slot::Longitude, self.opt_f64(Slot::Longitude)?)?;
        let latitude = self.required(Slot::Latitude, self.opt_f64(Slot::Latitude)?)?;
        Ok(Some(Position::new(longitude, latitude)))
    }

    pub fn on_ground(&self) -> Result<bool, StateVectorError> {
        self.required(Slot::OnGround, self.opt_bool(Slot::OnGround)?)
    }

    pub fn position_source(&self) -> Result<Option<PositionSource>, StateVectorError> {
        Ok(self.opt_i64(Slot::PositionSource)?.map(PositionSource::from))
    }

    /// Full record, or `None` if the aircraft has no displayable position.
    pub fn to_record(&self) -> Result<Option<AircraftRecord>, StateVectorError> {
        let Some(position) = self.position()? else {
            return Ok(None);
        };

        Ok(Some(AircraftRecord {
            icao24: self.icao24()?,
            callsign: self.callsign()?,
            origin_country: self.origin_country()?,
            position: Some(position),
            baro_altitude: self.opt_f64(Slot::BaroAltitude)?,
            geo_altitude: self.opt_f64(Slot::GeoAltitude)?,
            on_ground: self.on_ground()?,
            velocity: self.opt_f64(Slot::Velocity)?,
            true_track: self.opt_f64(Slot::TrueTrack)?,
            vertical_rate: self.opt_f64(Slot::VerticalRate)?,
            squawk: self.opt_string(Slot::Squawk)?,
            spi: self.opt_bool(Slot::Spi)?,
            position_source: self.position_source()?,
            category: self.opt_i64(Slot::Category)?,
            sensors: self.opt_sensors()?,
            time_position: self.opt_i64(Slot::TimePosition)?,
            last_contact: self.opt_i64(Slot::LastContact)?,
        }))
    }
}
