use tracing::{info, warn};

use crate::camera::CameraPose;
use crate::engine::{ContainerHandle, Control, EngineEvent, MapEngine, SurfaceOptions};
use crate::error::MapError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceState {
    Uninitialized,
    Initializing,
    Ready,
    Failed(String),
    Destroyed,
}

/// Identifies one initialization of the surface.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SurfaceHandle(u64);

#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceSettings {
    pub style_url: String,
    pub min_zoom: f64,
    pub max_zoom: f64,
}

/// The single state change an engine event caused, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceTransition {
    Ready,
    Failed(String),
}

/// Owns the engine instance and gates every rendering call on readiness.
///
/// `Uninitialized → Initializing → Ready | Failed`, then `Destroyed`.
pub struct MapSurface<E: MapEngine> {
    engine: E,
    settings: SurfaceSettings,
    state: SurfaceState,
    handle: Option<SurfaceHandle>,
    next_handle: u64,
}

impl<E: MapEngine> MapSurface<E> {
    pub fn new(engine: E, settings: SurfaceSettings) -> Self {
        Self {
            engine,
            settings,
            state: SurfaceState::Uninitialized,
            handle: None,
            next_handle: 1,
        }
    }

    pub fn state(&self) -> &SurfaceState {
        &self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == SurfaceState::Ready
    }

    pub fn handle(&self) -> Option<SurfaceHandle> {
        self.handle
    }

    pub fn settings(&self) -> &SurfaceSettings {
        &self.settings
    }

    /// Creates the engine surface with a flat camera and the standard
    /// controls. Readiness arrives later through `Load`.
    pub fn initialize(
        &mut self,
        container: ContainerHandle,
        initial_camera: CameraPose,
    ) -> Result<SurfaceHandle, MapError> {
        if self.state != SurfaceState::Uninitialized {
            return Err(MapError::AlreadyInitialized);
        }

        let options = SurfaceOptions {
            container,
            style_url: self.settings.style_url.clone(),
            camera: CameraPose::flat(
                initial_camera.center,
                initial_camera
                    .zoom
                    .clamp(self.settings.min_zoom, self.settings.max_zoom),
            ),
            min_zoom: self.settings.min_zoom,
            max_zoom: self.settings.max_zoom,
            controls: vec![Control::Navigation, Control::Fullscreen, Control::Scale],
        };

        if let Err(e) = self.engine.create(&options) {
            warn!("map engine creation failed: {e}");
            self.state = SurfaceState::Failed(e.to_string());
            return Err(MapError::Engine(e));
        }

        let handle = SurfaceHandle(self.next_handle);
        self.next_handle += 1;
        self.handle = Some(handle);
        self.state = SurfaceState::Initializing;
        info!(container = %options.container.0, "map surface initializing");
        Ok(handle)
    }

    /// Applies lifecycle events. Only the first `Load` or `Error` while
    /// initializing changes state.
    pub fn on_event(&mut self, event: &EngineEvent) -> Option<SurfaceTransition> {
        if self.state != SurfaceState::Initializing {
            return None;
        }
        match event {
            EngineEvent::Load => {
                info!("map surface ready");
                self.state = SurfaceState::Ready;
                Some(SurfaceTransition::Ready)
            }
            EngineEvent::Error(msg) => {
                warn!("map surface failed to initialize: {msg}");
                self.state = SurfaceState::Failed(msg.clone());
                Some(SurfaceTransition::Failed(msg.clone()))
            }
            _ => None,
        }
    }

    pub fn engine(&self) -> Result<&E, MapError> {
        self.check_ready()?;
        Ok(&self.engine)
    }

    pub fn engine_mut(&mut self) -> Result<&mut E, MapError> {
        self.check_ready()?;
        Ok(&mut self.engine)
    }

    fn check_ready(&self) -> Result<(), MapError> {
        match &self.state {
            SurfaceState::Ready => Ok(()),
            SurfaceState::Destroyed => Err(MapError::Destroyed),
            SurfaceState::Failed(msg) => Err(MapError::Failed(msg.clone())),
            SurfaceState::Uninitialized | SurfaceState::Initializing => Err(MapError::NotReady),
        }
    }

    /// Pending engine events. Empty once destroyed.
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        match self.state {
            SurfaceState::Uninitialized | SurfaceState::Destroyed => Vec::new(),
            _ => self.engine.drain_events(),
        }
    }

    /// Unchecked access for hosts and tests that inspect the engine directly.
    pub fn raw_engine(&self) -> &E {
        &self.engine
    }

    pub fn raw_engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Releases the engine surface. Safe to call repeatedly.
    pub fn destroy(&mut self) {
        match self.state {
            SurfaceState::Destroyed => {}
            SurfaceState::Uninitialized => {
                self.state = SurfaceState::Destroyed;
            }
            _ => {
                self.engine.remove();
                self.state = SurfaceState::Destroyed;
                self.handle = None;
                info!("map surface destroyed");
            }
        }
    }
}
