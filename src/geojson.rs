//! The GeoJSON subset handed to the rendering surface.

use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "type")]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn find(&self, icao24: &str) -> Option<&Feature> {
        self.features.iter().find(|f| f.properties.icao24 == icao24)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub struct Feature {
    pub geometry: Point,
    pub properties: AircraftProperties,
}

/// Coordinates are `[longitude, latitude]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type")]
pub struct Point {
    pub coordinates: [f64; 2],
}

/// Flat property map of one aircraft feature. Unknown values serialize as `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AircraftProperties {
    pub icao24: String,
    pub callsign: String,
    pub origin_country: String,
    pub altitude: Option<f64>,
    pub on_ground: bool,
    pub velocity: Option<f64>,
    pub heading: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serializes_as_geojson() {
        let collection = FeatureCollection {
            features: vec![Feature {
                geometry: Point { coordinates: [-77.01, 38.9] },
                properties: AircraftProperties {
                    icao24: "abc123".to_string(),
                    callsign: "Unknown".to_string(),
                    origin_country: "United States".to_string(),
                    altitude: None,
                    on_ground: true,
                    velocity: Some(12.5),
                    heading: None,
                },
            }],
        };

        assert_eq!(
            serde_json::to_value(&collection).unwrap(),
            json!({
                "type": "FeatureCollection",
                "features": [{
                    "type": "Feature",
                    "geometry": { "type": "Point", "coordinates": [-77.01, 38.9] },
                    "properties": {
                        "icao24": "abc123",
                        "callsign": "Unknown",
                        "origin_country": "United States",
                        "altitude": null,
                        "on_ground": true,
                        "velocity": 12.5,
                        "heading": null
                    }
                }]
            })
        );
    }

    #[test]
    fn test_empty_collection() {
        assert_eq!(
            serde_json::to_value(FeatureCollection::default()).unwrap(),
            json!({ "type": "FeatureCollection", "features": [] })
        );
    }
}
