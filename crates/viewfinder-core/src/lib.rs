pub mod config;
pub mod errors;
pub mod types;

pub use config::{SinkConfig, ViewfinderConfig};
pub use errors::{RenderError, SinkError, ViewfinderError};
pub use types::*;
