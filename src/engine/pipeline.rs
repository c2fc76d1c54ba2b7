use super::lifecycle::ManagedProcess;
use super::state::{PipelineState, ProcessState};
use crate::core::{edge, CancelSignal, ConfigBlock, EdgeReceiver, EdgeSender, PortSet, Process, ProcessIo};
use crate::error::{PipelineError, PipelineResult};
use crate::observability::{MetricsCollector, PipelineMonitor, ProcessMetrics};
use crate::registry::{port_types, ProcessRegistry};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::Instrument;

const PIPELINE: &str = "pipeline";

fn default_channel_capacity() -> usize {
    100
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Datums an edge holds before its producer suspends
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PipelineDescription {
    #[serde(default)]
    pipeline_config: PipelineConfig,
    #[serde(default)]
    processes: Vec<ProcessDescription>,
    #[serde(default)]
    connections: Vec<ConnectionDescription>,
}

#[derive(Debug, Deserialize)]
struct ProcessDescription {
    name: String,
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default)]
    config: Value,
}

#[derive(Debug, Deserialize)]
struct ConnectionDescription {
    from: String,
    to: String,
}

/// `process.port` address of one port
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortAddress {
    pub process: String,
    pub port: String,
}

impl PortAddress {
    pub fn parse(address: &str) -> PipelineResult<Self> {
        match address.rsplit_once('.') {
            Some((process, port)) if !process.is_empty() && !port.is_empty() => Ok(Self {
                process: process.to_string(),
                port: port.to_string(),
            }),
            _ => Err(PipelineError::config(
                PIPELINE,
                format!("'{}' is not a process.port address", address),
            )),
        }
    }
}

impl std::fmt::Display for PortAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.process, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Connection {
    pub from: PortAddress,
    pub to: PortAddress,
}

struct ProcessSlot {
    managed: ManagedProcess,
    io: ProcessIo,
}

/// A graph of processes joined by bounded edges, one tokio task per process.
pub struct Pipeline {
    config: PipelineConfig,
    registry: ProcessRegistry,
    slots: Vec<ProcessSlot>,
    names: Vec<String>,
    connections: Vec<Connection>,
    cancel: CancelSignal,
    state: PipelineState,
    handles: Vec<(String, JoinHandle<PipelineResult<()>>)>,
    metrics: MetricsCollector,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> PipelineResult<Self> {
        if config.channel_capacity == 0 {
            return Err(PipelineError::config(
                PIPELINE,
                "channel_capacity must be greater than zero",
            ));
        }

        Ok(Self {
            config,
            registry: ProcessRegistry::from_inventory(),
            slots: Vec::new(),
            names: Vec::new(),
            connections: Vec::new(),
            cancel: CancelSignal::new(),
            state: PipelineState::Idle,
            handles: Vec::new(),
            metrics: MetricsCollector::new(),
        })
    }

    /// Assemble a pipeline from its JSON description:
    ///
    /// ```json
    /// {
    ///   "pipeline_config": { "channel_capacity": 100 },
    ///   "processes": [ { "name": "ds", "type": "downsample", "config": {} } ],
    ///   "connections": [ { "from": "src.timestamp", "to": "ds.timestamp" } ]
    /// }
    /// ```
    pub async fn from_json(description: Value) -> PipelineResult<Self> {
        let description: PipelineDescription = serde_json::from_value(description)
            .map_err(|e| PipelineError::config(PIPELINE, e.to_string()))?;

        let mut pipeline = Self::new(description.pipeline_config)?;

        for process in description.processes {
            pipeline
                .add_process(&process.name, &process.type_name, process.config)
                .await?;
        }

        for connection in description.connections {
            pipeline.connect(&connection.from, &connection.to)?;
        }

        tracing::info!(
            processes = pipeline.names.len(),
            connections = pipeline.connections.len(),
            "pipeline assembled"
        );
        Ok(pipeline)
    }

    /// Instantiate a registered process type and configure it.
    pub async fn add_process(
        &mut self,
        name: &str,
        type_name: &str,
        config: Value,
    ) -> PipelineResult<()> {
        let process = self.registry.create(type_name)?;
        let config = ConfigBlock::from_json(name, config)?;
        self.add_process_instance(name, process, config).await
    }

    /// Add an already constructed process. Registered schema defaults are
    /// merged into `config` before `configure` runs.
    pub async fn add_process_instance(
        &mut self,
        name: &str,
        process: Box<dyn Process>,
        mut config: ConfigBlock,
    ) -> PipelineResult<()> {
        self.ensure_idle("add a process")?;

        if name.is_empty() {
            return Err(PipelineError::config(PIPELINE, "process name is empty"));
        }
        if self.names.iter().any(|n| n == name) {
            return Err(PipelineError::config(
                PIPELINE,
                format!("duplicate process name '{}'", name),
            ));
        }

        if let Some(metadata) = self.registry.get(process.type_name()) {
            config.merge_defaults(&metadata.config);
        }
        config.set_process_name(name);

        let mut managed = ManagedProcess::new(name, process)?;
        managed.configure(&config).await?;

        let metrics = Arc::new(ProcessMetrics::new(name));
        self.metrics.register(name, metrics.clone());
        let io = ProcessIo::new(managed.ports(), metrics);

        tracing::debug!(process = name, kind = managed.type_name(), "process configured");
        self.names.push(name.to_string());
        self.slots.push(ProcessSlot { managed, io });
        Ok(())
    }

    /// Connect `from` (an output, `process.port`) to `to` (an input).
    pub fn connect(&mut self, from: &str, to: &str) -> PipelineResult<()> {
        let from = PortAddress::parse(from)?;
        let to = PortAddress::parse(to)?;
        self.connect_ports(from, to)
    }

    pub fn connect_ports(&mut self, from: PortAddress, to: PortAddress) -> PipelineResult<()> {
        self.ensure_idle("connect ports")?;

        let from_index = self.slot_index(&from.process)?;
        let to_index = self.slot_index(&to.process)?;

        let from_type = self.slots[from_index]
            .managed
            .ports()
            .output(&from.port)
            .ok_or_else(|| PipelineError::UnknownPort {
                process: from.process.clone(),
                port: from.port.clone(),
                direction: "output",
            })?
            .port_type
            .clone();

        let to_type = self.check_free_input(to_index, &to)?;

        if !port_types::compatible(&from_type, &to_type) {
            return Err(PipelineError::TypeMismatch {
                from: from.to_string(),
                from_type,
                to: to.to_string(),
                to_type,
            });
        }

        let (tx, rx) = edge(self.config.channel_capacity, &self.cancel);
        self.slots[from_index].io.attach_output(&from.port, tx);
        self.slots[to_index].io.attach_input(&to.port, rx);

        tracing::debug!(from = %from, to = %to, "connected");
        self.connections.push(Connection { from, to });
        Ok(())
    }

    /// Edge into an unconnected input, driven by the caller.
    pub fn feed(&mut self, process: &str, port: &str) -> PipelineResult<EdgeSender> {
        self.ensure_idle("attach a feed")?;

        let address = PortAddress {
            process: process.to_string(),
            port: port.to_string(),
        };
        let index = self.slot_index(process)?;
        self.check_free_input(index, &address)?;

        let (tx, rx) = edge(self.config.channel_capacity, &self.cancel);
        self.slots[index].io.attach_input(port, rx);
        Ok(tx)
    }

    /// Extra edge out of an output, drained by the caller.
    pub fn tap(&mut self, process: &str, port: &str) -> PipelineResult<EdgeReceiver> {
        self.ensure_idle("attach a tap")?;

        let index = self.slot_index(process)?;
        if self.slots[index].managed.ports().output(port).is_none() {
            return Err(PipelineError::UnknownPort {
                process: process.to_string(),
                port: port.to_string(),
                direction: "output",
            });
        }

        let (tx, rx) = edge(self.config.channel_capacity, &self.cancel);
        self.slots[index].io.attach_output(port, tx);
        Ok(rx)
    }

    /// Validate wiring, initialize every process and spawn the process tasks.
    pub async fn start(&mut self) -> PipelineResult<()> {
        self.transition_to(PipelineState::Initializing)?;

        if let Err(e) = self.prepare().await {
            tracing::error!(error = %e, "pipeline failed to start");
            self.state = PipelineState::Error {
                error_msg: e.to_string(),
            };
            return Err(e);
        }

        for ProcessSlot { mut managed, mut io } in self.slots.drain(..) {
            let name = managed.name().to_string();
            let span = tracing::info_span!("process", name = %name, kind = managed.type_name());
            let cancel = self.cancel.clone();

            let handle = tokio::spawn(
                async move {
                    let result = managed.run(&mut io).await;
                    if result.is_err() {
                        cancel.cancel();
                    }
                    drop(io);
                    result
                }
                .instrument(span),
            );
            self.handles.push((name, handle));
        }

        self.transition_to(PipelineState::Running {
            start_time: Some(Instant::now()),
        })?;
        tracing::info!(processes = self.handles.len(), "pipeline running");
        Ok(())
    }

    async fn prepare(&mut self) -> PipelineResult<()> {
        for slot in &self.slots {
            check_required_ports(slot.managed.ports(), &slot.io)?;
        }
        for slot in &mut self.slots {
            slot.managed.init().await?;
        }
        Ok(())
    }

    /// Abort the run. Every blocked push and pull returns promptly.
    pub fn cancel(&self) {
        tracing::info!("pipeline cancel requested");
        self.cancel.cancel();
    }

    pub fn cancel_signal(&self) -> &CancelSignal {
        &self.cancel
    }

    /// Wait for every process task. Returns the first process failure.
    pub async fn wait(&mut self) -> PipelineResult<()> {
        let mut first_error: Option<PipelineError> = None;

        for (name, handle) in self.handles.drain(..) {
            let outcome = match handle.await {
                Ok(result) => result,
                Err(join_error) => {
                    tracing::error!(process = %name, error = %join_error, "process task failed");
                    self.cancel.cancel();
                    Err(PipelineError::TaskFailed(name))
                }
            };
            if let Err(e) = outcome {
                first_error.get_or_insert(e);
            }
        }

        let final_state = match (&first_error, &self.state) {
            (Some(e), _) => PipelineState::Error {
                error_msg: e.to_string(),
            },
            (None, _) if self.cancel.is_cancelled() => PipelineState::Cancelled,
            (None, PipelineState::Running { start_time }) => PipelineState::Completed {
                duration: start_time.map(|t| t.elapsed()),
            },
            (None, _) => PipelineState::Completed { duration: None },
        };

        if self.state.can_transition_to(&final_state) {
            tracing::info!(state = final_state.name(), "pipeline finished");
            self.state = final_state;
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// `start` followed by `wait`.
    pub async fn run(&mut self) -> PipelineResult<()> {
        self.start().await?;
        self.wait().await
    }

    /// Cancel and wait for every task to exit.
    pub async fn stop(&mut self) -> PipelineResult<()> {
        self.cancel();
        self.wait().await
    }

    /// Get current pipeline state
    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// Transition to a new state with validation
    pub fn transition_to(&mut self, new_state: PipelineState) -> PipelineResult<()> {
        if !self.state.can_transition_to(&new_state) {
            return Err(PipelineError::InvalidTransition {
                process: PIPELINE.to_string(),
                from: self.state.name(),
                to: new_state.name(),
            });
        }
        self.state = new_state;
        Ok(())
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    pub fn process_names(&self) -> &[String] {
        &self.names
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Declared ports of a process; available until the pipeline starts.
    pub fn ports(&self, process: &str) -> Option<&PortSet> {
        self.slots
            .iter()
            .find(|s| s.managed.name() == process)
            .map(|s| s.managed.ports())
    }

    pub fn process_state(&self, process: &str) -> Option<ProcessState> {
        self.slots
            .iter()
            .find(|s| s.managed.name() == process)
            .map(|s| s.managed.state())
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub fn monitor(&self) -> PipelineMonitor {
        PipelineMonitor::new(self.metrics.clone())
    }

    fn ensure_idle(&self, action: &str) -> PipelineResult<()> {
        if self.state != PipelineState::Idle {
            return Err(PipelineError::config(
                PIPELINE,
                format!("cannot {} while {}", action, self.state.name()),
            ));
        }
        Ok(())
    }

    fn slot_index(&self, process: &str) -> PipelineResult<usize> {
        self.slots
            .iter()
            .position(|s| s.managed.name() == process)
            .ok_or_else(|| PipelineError::UnknownProcess(process.to_string()))
    }

    /// Type of input `address`, failing if it is unknown or already has an edge.
    fn check_free_input(&self, index: usize, address: &PortAddress) -> PipelineResult<String> {
        let slot = &self.slots[index];
        let info = slot
            .managed
            .ports()
            .input(&address.port)
            .ok_or_else(|| PipelineError::UnknownPort {
                process: address.process.clone(),
                port: address.port.clone(),
                direction: "input",
            })?;

        if slot.io.has_input_edge(&address.port) {
            return Err(PipelineError::PortAlreadyConnected(address.to_string()));
        }
        Ok(info.port_type.clone())
    }
}

fn check_required_ports(ports: &PortSet, io: &ProcessIo) -> PipelineResult<()> {
    for input in ports.inputs().iter().filter(|p| p.flags.required) {
        if !io.has_input_edge(&input.name) {
            return Err(PipelineError::UnconnectedRequiredPort(format!(
                "{}.{}",
                ports.process(),
                input.name
            )));
        }
    }
    for output in ports.outputs().iter().filter(|p| p.flags.required) {
        if io.count_output_edges(&output.name) == 0 {
            return Err(PipelineError::UnconnectedRequiredPort(format!(
                "{}.{}",
                ports.process(),
                output.name
            )));
        }
    }
    Ok(())
}
