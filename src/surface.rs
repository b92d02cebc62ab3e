//! The rendering surface the aircraft layer is drawn on.
//!
//! [`MapSurface`] is the narrow contract the layer needs from a map: named GeoJSON
//! sources, symbol layers, registered images and per-layer pointer handlers. Handlers do
//! not touch the surface directly, they return an [`Interaction`] which the surface then
//! applies (open a popup, change the cursor).

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::errors::SurfaceError;
use crate::geojson::{Feature, FeatureCollection};
use crate::icon::IconImage;
use crate::layer::SymbolLayer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerEvent {
    Click,
    MouseEnter,
    MouseLeave,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cursor {
    #[default]
    Default,
    Pointer,
}

impl Cursor {
    /// Value for the canvas `style.cursor` property.
    pub fn as_css(&self) -> &'static str {
        match self {
            Cursor::Default => "",
            Cursor::Pointer => "pointer",
        }
    }
}

/// Pointer event on a layer, with the features under the pointer (topmost first).
#[derive(Debug, Clone, PartialEq)]
pub struct LayerEvent {
    pub lng_lat: [f64; 2],
    pub features: Vec<Feature>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Popup {
    pub lng_lat: [f64; 2],
    pub html: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Interaction {
    OpenPopup(Popup),
    SetCursor(Cursor),
}

pub type LayerHandler = Box<dyn Fn(&LayerEvent) -> Option<Interaction> + Send + Sync>;

pub trait MapSurface: Send {
    fn is_style_loaded(&self) -> bool;

    fn has_source(&self, id: &str) -> bool;

    fn add_source(&mut self, id: &str, data: FeatureCollection) -> Result<(), SurfaceError>;

    /// Replaces the data of an existing source.
    fn set_source_data(&mut self, id: &str, data: FeatureCollection) -> Result<(), SurfaceError>;

    fn has_layer(&self, id: &str) -> bool;

    fn add_layer(&mut self, layer: SymbolLayer) -> Result<(), SurfaceError>;

    fn has_image(&self, name: &str) -> bool;

    fn add_image(&mut self, name: &str, image: IconImage);

    fn on(&mut self, event: PointerEvent, layer_id: &str, handler: LayerHandler);
}

/// In-process surface that keeps its state in memory so it can be served or inspected.
pub struct MemorySurface {
    style_loaded: bool,
    sources: HashMap<String, FeatureCollection>,
    layers: Vec<SymbolLayer>,
    images: HashMap<String, IconImage>,
    handlers: Vec<(PointerEvent, String, LayerHandler)>,
    cursor: Cursor,
    popup: Option<Popup>,
}

impl Default for MemorySurface {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemorySurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySurface")
            .field("style_loaded", &self.style_loaded)
            .field("sources", &self.sources.keys().collect::<Vec<_>>())
            .field("layers", &self.layers.iter().map(|l| &l.id).collect::<Vec<_>>())
            .field("images", &self.images.keys().collect::<Vec<_>>())
            .field("handlers", &self.handlers.len())
            .field("cursor", &self.cursor)
            .finish()
    }
}

impl MemorySurface {
    /// A surface whose style has not finished loading yet.
    pub fn new() -> Self {
        MemorySurface {
            style_loaded: false,
            sources: HashMap::new(),
            layers: Vec::new(),
            images: HashMap::new(),
            handlers: Vec::new(),
            cursor: Cursor::Default,
            popup: None,
        }
    }

    /// Returns true if this call completed a not-loaded to loaded transition.
    pub fn set_style_loaded(&mut self, loaded: bool) -> bool {
        let transition = loaded && !self.style_loaded;
        self.style_loaded = loaded;
        transition
    }

    pub fn source(&self, id: &str) -> Option<&FeatureCollection> {
        self.sources.get(id)
    }

    pub fn layers(&self) -> &[SymbolLayer] {
        &self.layers
    }

    pub fn layer(&self, id: &str) -> Option<&SymbolLayer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn image(&self, name: &str) -> Option<&IconImage> {
        self.images.get(name)
    }

    pub fn images(&self) -> impl Iterator<Item = (&str, &IconImage)> {
        self.images.iter().map(|(name, image)| (name.as_str(), image))
    }

    pub fn handler_count(&self, event: PointerEvent, layer_id: &str) -> usize {
        self.handlers.iter().filter(|(e, l, _)| *e == event && l == layer_id).count()
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn popup(&self) -> Option<&Popup> {
        self.popup.as_ref()
    }

    pub fn close_popup(&mut self) {
        self.popup = None;
    }

    /// Runs all handlers registered for `event` on `layer_id` and applies their
    /// interactions. Returns the number of handlers invoked.
    pub fn dispatch(&mut self, event: PointerEvent, layer_id: &str, layer_event: &LayerEvent) -> usize {
        let interactions: Vec<Option<Interaction>> = self
            .handlers
            .iter()
            .filter(|(e, l, _)| *e == event && l == layer_id)
            .map(|(_, _, handler)| handler(layer_event))
            .collect();

        let invoked = interactions.len();
        for interaction in interactions.into_iter().flatten() {
            match interaction {
                Interaction::OpenPopup(popup) => self.popup = Some(popup),
                Interaction::SetCursor(cursor) => self.cursor = cursor,
            }
        }
        invoked
    }

    /// Simulates a click on the feature of `icao24` in the layer `layer_id`.
    pub fn click_feature(&mut self, layer_id: &str, icao24: &str) -> Option<&Popup> {
        let source_id = &self.layer(layer_id)?.source;
        let feature = self.sources.get(source_id)?.find(icao24)?.clone();

        let layer_event = LayerEvent { lng_lat: feature.geometry.coordinates, features: vec![feature] };
        self.popup = None;
        self.dispatch(PointerEvent::Click, layer_id, &layer_event);
        self.popup.as_ref()
    }
}

impl MapSurface for MemorySurface {
    fn is_style_loaded(&self) -> bool {
        self.style_loaded
    }

    fn has_source(&self, id: &str) -> bool {
        self.sources.contains_key(id)
    }

    fn add_source(&mut self, id: &str, data: FeatureCollection) -> Result<(), SurfaceError> {
        if self.sources.contains_key(id) {
            return Err(SurfaceError::DuplicateSource(id.to_string()));
        }
        self.sources.insert(id.to_string(), data);
        Ok(())
    }

    fn set_source_data(&mut self, id: &str, data: FeatureCollection) -> Result<(), SurfaceError> {
        match self.sources.get_mut(id) {
            Some(current) => {
                *current = data;
                Ok(())
            }
            None => Err(SurfaceError::UnknownSource(id.to_string())),
        }
    }

    fn has_layer(&self, id: &str) -> bool {
        self.layer(id).is_some()
    }

    fn add_layer(&mut self, layer: SymbolLayer) -> Result<(), SurfaceError> {
        if self.layer(&layer.id).is_some() {
            return Err(SurfaceError::DuplicateLayer(layer.id));
        }
        if !self.sources.contains_key(&layer.source) {
            return Err(SurfaceError::MissingLayerSource { layer: layer.id, source_id: layer.source });
        }
        self.layers.push(layer);
        Ok(())
    }

    fn has_image(&self, name: &str) -> bool {
        self.images.contains_key(name)
    }

    fn add_image(&mut self, name: &str, image: IconImage) {
        self.images.insert(name.to_string(), image);
    }

    fn on(&mut self, event: PointerEvent, layer_id: &str, handler: LayerHandler) {
        self.handlers.push((event, layer_id.to_string(), handler));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geojson::{AircraftProperties, Point};

    fn feature(icao24: &str) -> Feature {
        Feature {
            geometry: Point { coordinates: [-77.0, 38.9] },
            properties: AircraftProperties {
                icao24: icao24.to_string(),
                callsign: "TEST1".to_string(),
                origin_country: "United States".to_string(),
                altitude: None,
                on_ground: false,
                velocity: None,
                heading: None,
            },
        }
    }

    #[test]
    fn test_style_transition() {
        let mut surface = MemorySurface::new();
        assert!(!surface.is_style_loaded());
        assert!(surface.set_style_loaded(true));
        assert!(!surface.set_style_loaded(true));
        assert!(!surface.set_style_loaded(false));
        assert!(surface.set_style_loaded(true));
    }

    #[test]
    fn test_sources() {
        let mut surface = MemorySurface::new();
        assert_eq!(
            surface.set_source_data("aircraft", FeatureCollection::default()),
            Err(SurfaceError::UnknownSource("aircraft".to_string()))
        );

        surface.add_source("aircraft", FeatureCollection::default()).unwrap();
        assert!(surface.has_source("aircraft"));
        assert!(surface.add_source("aircraft", FeatureCollection::default()).is_err());

        let data = FeatureCollection { features: vec![feature("abc123")] };
        surface.set_source_data("aircraft", data.clone()).unwrap();
        assert_eq!(surface.source("aircraft"), Some(&data));
    }

    #[test]
    fn test_dispatch_applies_interactions() {
        let mut surface = MemorySurface::new();
        surface.on(PointerEvent::MouseEnter, "planes", Box::new(|_: &LayerEvent| Some(Interaction::SetCursor(Cursor::Pointer))));
        surface.on(PointerEvent::MouseLeave, "planes", Box::new(|_: &LayerEvent| Some(Interaction::SetCursor(Cursor::Default))));

        let event = LayerEvent { lng_lat: [0.0, 0.0], features: vec![] };
        assert_eq!(surface.dispatch(PointerEvent::MouseEnter, "planes", &event), 1);
        assert_eq!(surface.cursor(), Cursor::Pointer);
        assert_eq!(surface.dispatch(PointerEvent::MouseEnter, "other", &event), 0);
        assert_eq!(surface.cursor(), Cursor::Pointer);
        surface.dispatch(PointerEvent::MouseLeave, "planes", &event);
        assert_eq!(surface.cursor().as_css(), "");
    }
}
