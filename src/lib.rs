//! Live aircraft tracking for a fixed region: periodic acquisition of state vectors from
//! the feed, normalization into [`aircraft::AircraftRecord`]s, and reconciliation of the
//! tracked set into a symbol layer of a map surface.

pub mod aircraft;
pub mod config;
pub mod errors;
pub mod feed;
pub mod geojson;
pub mod icon;
pub mod layer;
pub mod poller;
pub mod status;
pub mod surface;

pub use aircraft::{AircraftRecord, Position};
pub use config::{BoundingBox, TrackerConfig};
pub use feed::{AircraftSource, FeedClient};
pub use layer::{LayerReconciler, LiveLayer};
pub use poller::{CycleObserver, PollingController, Snapshot};
pub use status::{AircraftStatus, StatusReporter};
pub use surface::{MapSurface, MemorySurface};
