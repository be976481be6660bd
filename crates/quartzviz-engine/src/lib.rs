//! Product visualization engine: uploads, workflow compilation, job polling and result files.

pub mod client;
pub mod clock;
pub mod compiler;
pub mod config;
pub mod error;
pub mod materializer;
pub mod orchestrator;
pub mod rewrite;
pub mod runner;
pub mod size;
pub mod transport;
pub mod uploader;

#[cfg(test)]
mod testing;

pub use clock::{CancelToken, Clock, SystemClock};
pub use compiler::RegionLabel;
pub use config::{ConfigError, EngineSettings, ServiceConfig};
pub use error::{EngineError, ErrorKind};
pub use materializer::{GeneratedImage, Materializer};
pub use orchestrator::{
    FlowFailure, FlowOutcome, ImageToImageRequest, Orchestrator, TextToImageRequest,
};
pub use size::{Resolution, SizeChoice, CUSTOM_SIZE_CHOICE, SIZE_PRESETS};
