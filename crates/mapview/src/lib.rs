//! Map visualization core: owns the rendering surface and keeps clusters,
//! markers and popups in sync with a filtered set of business records.

pub mod camera;
pub mod cluster;
pub mod cluster_index;
pub mod config;
pub mod engine;
pub mod error;
pub mod markers;
pub mod popup;
pub mod style;
pub mod surface;
pub mod view;

pub use camera::CameraPose;
pub use config::MapConfig;
pub use engine::{EngineEvent, MapEngine};
pub use error::{Diagnostic, MapError};
pub use style::MapStyle;
pub use view::{MapNotification, MapView, RenderMode};
