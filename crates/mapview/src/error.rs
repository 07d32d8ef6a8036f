use crate::engine::EngineError;

#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("map surface is not ready")]
    NotReady,
    #[error("map surface was destroyed")]
    Destroyed,
    #[error("map surface failed to initialize: {0}")]
    Failed(String),
    #[error("map surface is already initialized")]
    AlreadyInitialized,
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Non-fatal condition worth surfacing to the host (skipped customization,
/// ignored teardown miss, engine error after load).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: &'static str,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}
