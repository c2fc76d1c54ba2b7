pub mod core;
pub mod engine;
pub mod error;
pub mod logging;
pub mod observability;
pub mod processes;
pub mod registry;

pub use error::{PipelineError, PipelineResult};
