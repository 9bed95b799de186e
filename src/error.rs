use thiserror::Error;

/// Errors reported by a rendering engine implementation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Viewport {0} is not enabled")]
    UnknownViewport(String),

    #[error("Viewport {0} is already enabled")]
    DuplicateViewport(String),

    #[error("Volume {0} is not loaded")]
    UnknownVolume(String),

    #[error("Engine error: {0}")]
    Backend(String),
}

/// Errors reported by the layout surface (the element tree hosting viewports).
#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("Layout container is missing")]
    MissingContainer,

    #[error("Element {0} was not attached")]
    NotAttached(String),
}

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("Viewport manager is not initialized")]
    NotInitialized,

    #[error("Invalid grid layout: {rows}x{cols}")]
    InvalidGrid { rows: usize, cols: usize },

    #[error("Surface error: {0}")]
    Surface(#[from] SurfaceError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}
