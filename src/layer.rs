//! Projection of the tracked aircraft onto a map layer, and reconciliation of that layer
//! against a [`MapSurface`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use crate::aircraft::AircraftRecord;
use crate::errors::SurfaceError;
use crate::geojson::{AircraftProperties, Feature, FeatureCollection, Point};
use crate::icon;
use crate::poller::{CycleObserver, Snapshot};
use crate::surface::{Cursor, Interaction, LayerEvent, MapSurface, PointerEvent, Popup};

pub const SOURCE_ID: &str = "aircraft";
pub const LAYER_ID: &str = "aircraft-icons";
pub const ICON_NAME: &str = "aircraft-icon";

pub const UNKNOWN_CALLSIGN: &str = "Unknown";
const UNKNOWN_FLIGHT: &str = "Unknown Flight";
const UNKNOWN: &str = "Unknown";

const MS_TO_KMH: f64 = 3.6;

/// MapLibre style spec of a symbol layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolLayer {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub source: String,
    pub layout: SymbolLayout,
    pub paint: SymbolPaint,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct SymbolLayout {
    pub icon_image: String,
    pub icon_size: f64,
    pub icon_rotation_alignment: &'static str,
    pub icon_rotate: Value,
    pub icon_allow_overlap: bool,
    pub text_field: Value,
    pub text_font: Vec<String>,
    pub text_offset: [f64; 2],
    pub text_anchor: &'static str,
    pub text_size: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct SymbolPaint {
    pub text_color: String,
    pub text_halo_color: String,
    pub text_halo_width: f64,
}

/// Icons rotated by heading (0 when unknown), labelled with the callsign.
pub fn aircraft_layer() -> SymbolLayer {
    SymbolLayer {
        id: LAYER_ID.to_string(),
        kind: "symbol",
        source: SOURCE_ID.to_string(),
        layout: SymbolLayout {
            icon_image: ICON_NAME.to_string(),
            icon_size: 0.8,
            icon_rotation_alignment: "map",
            icon_rotate: json!(["case", ["!=", ["get", "heading"], null], ["get", "heading"], 0]),
            icon_allow_overlap: true,
            text_field: json!(["get", "callsign"]),
            text_font: vec!["Open Sans Regular".to_string()],
            text_offset: [0.0, 2.0],
            text_anchor: "top",
            text_size: 12.0,
        },
        paint: SymbolPaint {
            text_color: "#000".to_string(),
            text_halo_color: "#fff".to_string(),
            text_halo_width: 1.0,
        },
    }
}

/// Point features for all aircraft with a known position, in input order.
pub fn project(aircraft: &[AircraftRecord]) -> FeatureCollection {
    let features = aircraft
        .iter()
        .filter_map(|plane| {
            let position = plane.position?;
            Some(Feature {
                geometry: Point { coordinates: position.lng_lat() },
                properties: AircraftProperties {
                    icao24: plane.icao24.clone(),
                    callsign: plane
                        .callsign
                        .clone()
                        .filter(|c| !c.trim().is_empty())
                        .unwrap_or_else(|| UNKNOWN_CALLSIGN.to_string()),
                    origin_country: plane.origin_country.clone(),
                    altitude: plane.baro_altitude,
                    on_ground: plane.on_ground,
                    velocity: plane.velocity,
                    heading: plane.true_track,
                },
            })
        })
        .collect();

    FeatureCollection { features }
}

/// Display values of the detail popup.
#[derive(Debug, Clone, PartialEq)]
pub struct PopupContent {
    pub title: String,
    pub country: String,
    pub altitude: String,
    pub speed: String,
    pub status: &'static str,
}

impl PopupContent {
    pub fn new(properties: &AircraftProperties) -> Self {
        let title = if properties.callsign.trim().is_empty() {
            UNKNOWN_FLIGHT.to_string()
        } else {
            properties.callsign.clone()
        };

        PopupContent {
            title,
            country: properties.origin_country.clone(),
            altitude: properties
                .altitude
                .map(|m| format!("{:.0} m", m.round()))
                .unwrap_or_else(|| UNKNOWN.to_string()),
            speed: properties
                .velocity
                .map(|v| format!("{:.0} km/h", (v * MS_TO_KMH).round()))
                .unwrap_or_else(|| UNKNOWN.to_string()),
            status: if properties.on_ground { "On Ground" } else { "In Flight" },
        }
    }

    pub fn to_html(&self) -> String {
        format!(
            r#"<div class="aircraft-popup">
  <h3>{title}</h3>
  <p><strong>Country:</strong> {country}</p>
  <p><strong>Altitude:</strong> {altitude}</p>
  <p><strong>Speed:</strong> {speed}</p>
  <p><strong>Status:</strong> {status}</p>
</div>"#,
            title = escape_html(&self.title),
            country = escape_html(&self.country),
            altitude = self.altitude,
            speed = self.speed,
            status = self.status
        )
    }
}

fn escape_html(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn on_click(event: &LayerEvent) -> Option<Interaction> {
    let feature = event.features.first()?;
    let content = PopupContent::new(&feature.properties);
    Some(Interaction::OpenPopup(Popup { lng_lat: feature.geometry.coordinates, html: content.to_html() }))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// Source, layer and handlers were created.
    Created,
    /// The existing source data was replaced.
    Updated,
    /// The surface is not ready, the data is held until it is.
    Deferred,
}

/// Keeps the aircraft layer of a surface in line with the latest snapshot.
#[derive(Debug, Default)]
pub struct LayerReconciler {
    pending: Option<FeatureCollection>,
}

impl LayerReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn reconcile(
        &mut self,
        surface: &mut dyn MapSurface,
        aircraft: &[AircraftRecord],
    ) -> Result<Reconciled, SurfaceError> {
        let collection = project(aircraft);

        if !surface.is_style_loaded() {
            debug!("surface not ready, deferring {} aircraft", collection.len());
            self.pending = Some(collection);
            return Ok(Reconciled::Deferred);
        }

        self.pending = None;
        apply(surface, collection)
    }

    /// Applies the deferred collection, if any, once the surface reports it is ready.
    pub fn style_ready(&mut self, surface: &mut dyn MapSurface) -> Result<Option<Reconciled>, SurfaceError> {
        if !surface.is_style_loaded() {
            return Ok(None);
        }
        match self.pending.take() {
            Some(collection) => apply(surface, collection).map(Some),
            None => Ok(None),
        }
    }
}

fn apply(surface: &mut dyn MapSurface, collection: FeatureCollection) -> Result<Reconciled, SurfaceError> {
    let count = collection.len();
    if surface.has_source(SOURCE_ID) {
        surface.set_source_data(SOURCE_ID, collection)?;
    } else {
        surface.add_source(SOURCE_ID, collection)?;
    }

    // a source without its layer is left over from an earlier failed creation
    if surface.has_layer(LAYER_ID) {
        return Ok(Reconciled::Updated);
    }

    if !surface.has_image(ICON_NAME) {
        match icon::aircraft_icon() {
            Ok(image) => surface.add_image(ICON_NAME, image),
            Err(e) => warn!("cannot render aircraft icon, layer shows labels only: {}", e),
        }
    }

    surface.add_layer(aircraft_layer())?;

    surface.on(PointerEvent::Click, LAYER_ID, Box::new(on_click));
    surface.on(
        PointerEvent::MouseEnter,
        LAYER_ID,
        Box::new(|_: &LayerEvent| Some(Interaction::SetCursor(Cursor::Pointer))),
    );
    surface.on(
        PointerEvent::MouseLeave,
        LAYER_ID,
        Box::new(|_: &LayerEvent| Some(Interaction::SetCursor(Cursor::Default))),
    );

    info!("created layer {} with {} aircraft", LAYER_ID, count);
    Ok(Reconciled::Created)
}

/// A surface together with the reconciler that owns its aircraft layer. Clones share
/// the same surface.
pub struct LiveLayer<S> {
    inner: Arc<Mutex<LayerState<S>>>,
}

struct LayerState<S> {
    surface: S,
    reconciler: LayerReconciler,
}

impl<S> Clone for LiveLayer<S> {
    fn clone(&self) -> Self {
        LiveLayer { inner: self.inner.clone() }
    }
}

impl<S: MapSurface> LiveLayer<S> {
    pub fn new(surface: S) -> Self {
        LiveLayer { inner: Arc::new(Mutex::new(LayerState { surface, reconciler: LayerReconciler::new() })) }
    }

    fn lock(&self) -> MutexGuard<'_, LayerState<S>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn reconcile(&self, aircraft: &[AircraftRecord]) -> Result<Reconciled, SurfaceError> {
        let mut state = self.lock();
        let LayerState { surface, reconciler } = &mut *state;
        reconciler.reconcile(surface, aircraft)
    }

    /// To be called whenever the surface signals that its style finished loading.
    pub fn style_ready(&self) -> Result<Option<Reconciled>, SurfaceError> {
        let mut state = self.lock();
        let LayerState { surface, reconciler } = &mut *state;
        reconciler.style_ready(surface)
    }

    /// Runs `f` with exclusive access to the surface.
    pub fn with_surface<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(&mut self.lock().surface)
    }
}

impl<S: MapSurface + 'static> CycleObserver for LiveLayer<S> {
    fn snapshot_published(&mut self, snapshot: &Snapshot) {
        match self.reconcile(&snapshot.aircraft) {
            Ok(outcome) => debug!("cycle {}: layer {:?}", snapshot.sequence, outcome),
            Err(e) => error!("cycle {}: failed to reconcile layer: {}", snapshot.sequence, e),
        }
    }
}
