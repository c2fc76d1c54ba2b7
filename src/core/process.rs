use super::config::ConfigBlock;
use super::datum::{Datum, Payload, PayloadKind};
use super::edge::{EdgeError, EdgeReceiver, EdgeSender};
use super::port::{PortInfo, PortSet};
use crate::error::{PipelineError, PipelineResult};
use crate::observability::ProcessMetrics;
use crate::registry::port_types;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Result of a single `step` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Step again.
    Continue,
    /// The process is done; outputs still open are completed by the runner.
    Complete,
}

/// Base trait for all pipeline processes
#[async_trait]
pub trait Process: Send {
    /// Registered type name, e.g. "downsample"
    fn type_name(&self) -> &'static str;

    /// Declare input and output ports. Called once when the process is
    /// added to a pipeline.
    fn make_ports(&self, ports: &mut PortSet) -> PipelineResult<()>;

    /// Validate and store configuration. No run-scoped state yet.
    async fn configure(&mut self, config: &ConfigBlock) -> PipelineResult<()>;

    /// Allocate run-scoped state. Errors abort pipeline start.
    async fn init(&mut self) -> PipelineResult<()> {
        Ok(())
    }

    /// One bounded decision cycle.
    async fn step(&mut self, io: &mut ProcessIo) -> PipelineResult<StepOutcome>;

    /// Release run-scoped state after completion.
    async fn finish(&mut self) -> PipelineResult<()> {
        Ok(())
    }
}

struct OutputPort {
    name: String,
    kind: Option<PayloadKind>,
    shared: bool,
    edges: Vec<EdgeSender>,
    completed: bool,
}

/// A process's view of the edges attached to its ports.
pub struct ProcessIo {
    process: String,
    inputs: HashMap<String, EdgeReceiver>,
    outputs: Vec<OutputPort>,
    metrics: Arc<ProcessMetrics>,
}

impl ProcessIo {
    pub fn new(ports: &PortSet, metrics: Arc<ProcessMetrics>) -> Self {
        let outputs = ports
            .outputs()
            .iter()
            .map(|info: &PortInfo| OutputPort {
                name: info.name.clone(),
                kind: port_types::lookup(&info.port_type),
                shared: info.flags.shared,
                edges: Vec::new(),
                completed: false,
            })
            .collect();

        Self {
            process: ports.process().to_string(),
            inputs: HashMap::new(),
            outputs,
            metrics,
        }
    }

    pub(crate) fn attach_input(&mut self, port: &str, edge: EdgeReceiver) {
        self.inputs.insert(port.to_string(), edge);
    }

    pub(crate) fn attach_output(&mut self, port: &str, edge: EdgeSender) {
        if let Some(output) = self.outputs.iter_mut().find(|o| o.name == port) {
            output.edges.push(edge);
        }
    }

    pub fn process_name(&self) -> &str {
        &self.process
    }

    pub fn metrics(&self) -> &Arc<ProcessMetrics> {
        &self.metrics
    }

    pub fn has_input_edge(&self, port: &str) -> bool {
        self.inputs.contains_key(port)
    }

    pub fn count_output_edges(&self, port: &str) -> usize {
        self.outputs
            .iter()
            .find(|o| o.name == port)
            .map(|o| o.edges.len())
            .unwrap_or(0)
    }

    /// Take the next datum from the edge connected to `port`.
    pub async fn pull(&mut self, port: &str) -> PipelineResult<Datum> {
        let edge = self
            .inputs
            .get_mut(port)
            .ok_or_else(|| PipelineError::UnknownPort {
                process: self.process.clone(),
                port: port.to_string(),
                direction: "connected input",
            })?;

        let datum = edge.pull().await?;
        self.metrics.record_pulled();
        Ok(datum)
    }

    /// Pull from `port` if it has an edge; `None` for unconnected ports.
    pub async fn pull_if_connected(&mut self, port: &str) -> PipelineResult<Option<Datum>> {
        if self.has_input_edge(port) {
            self.pull(port).await.map(Some)
        } else {
            Ok(None)
        }
    }

    /// Push `datum` to every edge connected to output `port`. Unconnected
    /// outputs accept and drop the datum.
    pub async fn push(&mut self, port: &str, datum: Datum) -> PipelineResult<()> {
        let process = &self.process;
        let output = self
            .outputs
            .iter_mut()
            .find(|o| o.name == port)
            .ok_or_else(|| PipelineError::UnknownPort {
                process: process.clone(),
                port: port.to_string(),
                direction: "output",
            })?;

        if output.completed {
            return Err(EdgeError::Closed.into());
        }

        if let (Some(expected), Some(payload)) = (output.kind, datum.payload()) {
            if payload.kind() != expected {
                return Err(PipelineError::data(
                    process.clone(),
                    format!(
                        "pushed {} on port '{}' declared as {}",
                        payload.kind(),
                        port,
                        expected
                    ),
                ));
            }
        }

        let is_end = datum.is_end_of_stream();
        let fan_out = output.edges.len();

        for (i, edge) in output.edges.iter_mut().enumerate() {
            let item = if output.shared || i + 1 == fan_out {
                datum.clone()
            } else {
                datum.deep_clone()
            };

            match edge.push(item).await {
                Ok(()) => {}
                Err(EdgeError::Disconnected) => {
                    tracing::trace!(process = %process, port, "consumer gone, datum dropped");
                }
                Err(e) => return Err(e.into()),
            }
        }

        if is_end {
            output.completed = true;
        } else if fan_out > 0 {
            self.metrics.record_pushed();
        }
        Ok(())
    }

    pub async fn push_value(&mut self, port: &str, payload: impl Into<Payload>) -> PipelineResult<()> {
        self.push(port, Datum::new(payload)).await
    }

    pub fn is_output_complete(&self, port: &str) -> bool {
        self.outputs
            .iter()
            .find(|o| o.name == port)
            .map(|o| o.completed)
            .unwrap_or(false)
    }

    pub fn all_outputs_complete(&self) -> bool {
        self.outputs.iter().all(|o| o.completed)
    }

    /// Push end of stream on every output that has not received it yet.
    pub async fn complete_outputs(&mut self) -> PipelineResult<()> {
        let pending: Vec<String> = self
            .outputs
            .iter()
            .filter(|o| !o.completed)
            .map(|o| o.name.clone())
            .collect();

        for port in pending {
            self.push(&port, Datum::EndOfStream).await?;
        }
        Ok(())
    }
}
