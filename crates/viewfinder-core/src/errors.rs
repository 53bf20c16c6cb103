use thiserror::Error;

#[derive(Error, Debug)]
pub enum ViewfinderError {
    #[error("Configuration invalid: {reason}")]
    ConfigurationInvalid { reason: String },

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SinkError {
    #[error("Sink element '{element}' unavailable: {reason}")]
    ElementUnavailable { element: String, reason: String },

    #[error("Sink element '{element}' is not a {expected}")]
    WrongElementType { element: String, expected: &'static str },

    #[error("Media framework initialisation failed: {0}")]
    Init(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("Shader compile failed: {0}")]
    ShaderCompile(String),

    #[error("Program link failed: {0}")]
    ShaderLink(String),

    #[error("Failed to acquire frame: {reason}")]
    AcquireFailed { reason: String },

    #[error("Failed to import frame as texture: {reason}")]
    ImportFailed { reason: String },

    #[error("Unsupported pixel format: {0}")]
    UnsupportedFormat(crate::PixelFormat),
}
