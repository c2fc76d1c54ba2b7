use crate::core::{ConfigBlock, Payload, PortFlags, PortSet, Process, ProcessIo, StepOutcome};
use crate::error::PipelineResult;
use crate::registry::port_types::TYPE_ANY;
use async_trait::async_trait;
use framepipe_macros::ProcessMeta;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub const PORT_INPUT: &str = "input";

#[derive(ProcessMeta)]
#[process_meta(name = "debug_sink", category = "Sinks")]
pub struct DebugSinkProcess {
    #[config(default = "debug", description = "Label prefixed to every log line")]
    pub label: String,

    received: Arc<AtomicU64>,
}

impl Default for DebugSinkProcess {
    fn default() -> Self {
        Self {
            label: "debug".to_string(),
            received: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl DebugSinkProcess {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter of datums received; stays readable after the process is
    /// moved into a pipeline.
    pub fn counter(&self) -> Arc<AtomicU64> {
        self.received.clone()
    }

    fn describe(payload: &Payload) -> String {
        match payload {
            Payload::Timestamp(ts) => format!("timestamp frame={:?} time_usec={:?}", ts.frame, ts.time_usec),
            Payload::FrameRate(rate) => format!("frame_rate {}", rate),
            Payload::Image(img) => format!("image {}x{}x{}", img.width, img.height, img.depth),
            Payload::DetectedObjectSet(set) => format!("{} detections", set.len()),
            Payload::ObjectTrackSet(set) => format!("{} tracks", set.len()),
            Payload::FileName(name) => format!("file {}", name),
            Payload::Generic(value) => format!("generic {}", value),
        }
    }
}

#[async_trait]
impl Process for DebugSinkProcess {
    fn type_name(&self) -> &'static str {
        "debug_sink"
    }

    fn make_ports(&self, ports: &mut PortSet) -> PipelineResult<()> {
        ports.declare_input(PORT_INPUT, TYPE_ANY, PortFlags::optional(), "Data in")
    }

    async fn configure(&mut self, config: &ConfigBlock) -> PipelineResult<()> {
        self.label = config.value_or("label", "debug".to_string())?;
        Ok(())
    }

    async fn step(&mut self, io: &mut ProcessIo) -> PipelineResult<StepOutcome> {
        let Some(datum) = io.pull_if_connected(PORT_INPUT).await? else {
            return Ok(StepOutcome::Complete);
        };

        match datum.payload() {
            Some(payload) => {
                let count = self.received.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::info!(label = %self.label, count, "{}", Self::describe(payload));
                Ok(StepOutcome::Continue)
            }
            None => Ok(StepOutcome::Complete),
        }
    }
}
