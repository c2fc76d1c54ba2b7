pub mod lifecycle;
pub mod pipeline;
pub mod state;

pub use lifecycle::ManagedProcess;
pub use pipeline::{Connection, Pipeline, PipelineConfig, PortAddress};
pub use state::{PipelineState, ProcessState};
