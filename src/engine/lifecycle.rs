use super::state::ProcessState;
use crate::core::{ConfigBlock, PortSet, Process, ProcessIo, StepOutcome};
use crate::error::{PipelineError, PipelineResult};

/// Drives a process through its lifecycle with checked state transitions
pub struct ManagedProcess {
    name: String,
    inner: Box<dyn Process>,
    ports: PortSet,
    state: ProcessState,
}

impl ManagedProcess {
    /// Wrap `process` and collect its port declarations.
    pub fn new(name: impl Into<String>, process: Box<dyn Process>) -> PipelineResult<Self> {
        let name = name.into();
        let mut ports = PortSet::new(name.clone());
        process.make_ports(&mut ports)?;

        Ok(Self {
            name,
            inner: process,
            ports,
            state: ProcessState::Created,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &'static str {
        self.inner.type_name()
    }

    pub fn ports(&self) -> &PortSet {
        &self.ports
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    fn transition(&mut self, target: ProcessState) -> PipelineResult<()> {
        if !self.state.can_transition_to(target) {
            return Err(PipelineError::InvalidTransition {
                process: self.name.clone(),
                from: self.state.name(),
                to: target.name(),
            });
        }
        self.state = target;
        Ok(())
    }

    pub async fn configure(&mut self, config: &ConfigBlock) -> PipelineResult<()> {
        if self.state != ProcessState::Created {
            return Err(PipelineError::InvalidTransition {
                process: self.name.clone(),
                from: self.state.name(),
                to: ProcessState::Configured.name(),
            });
        }
        self.inner.configure(config).await?;
        self.transition(ProcessState::Configured)
    }

    pub async fn init(&mut self) -> PipelineResult<()> {
        if self.state != ProcessState::Configured {
            return Err(PipelineError::InvalidTransition {
                process: self.name.clone(),
                from: self.state.name(),
                to: ProcessState::Initialized.name(),
            });
        }
        self.inner.init().await?;
        self.transition(ProcessState::Initialized)
    }

    /// Run one step. A `Complete` outcome ends the output streams and
    /// moves the process to `Completed`; no further steps are allowed.
    pub async fn step(&mut self, io: &mut ProcessIo) -> PipelineResult<StepOutcome> {
        match self.state {
            ProcessState::Initialized => self.transition(ProcessState::Running)?,
            ProcessState::Running => {}
            other => {
                return Err(PipelineError::InvalidTransition {
                    process: self.name.clone(),
                    from: other.name(),
                    to: ProcessState::Running.name(),
                })
            }
        }

        let start = io.metrics().start_step();
        let outcome = self.inner.step(io).await;
        io.metrics().finish_step(start);

        match outcome {
            Ok(StepOutcome::Continue)
                if !self.ports.outputs().is_empty() && io.all_outputs_complete() =>
            {
                // every consumer has seen end of stream; nothing left to do
                self.complete(io).await?;
                Ok(StepOutcome::Complete)
            }
            Ok(StepOutcome::Continue) => Ok(StepOutcome::Continue),
            Ok(StepOutcome::Complete) => {
                self.complete(io).await?;
                Ok(StepOutcome::Complete)
            }
            Err(e) => {
                if !e.is_cancelled() {
                    io.metrics().record_error();
                }
                Err(e)
            }
        }
    }

    /// Step until the process completes, the pipeline is cancelled or a
    /// step fails. Cancellation is a clean stop.
    pub async fn run(&mut self, io: &mut ProcessIo) -> PipelineResult<()> {
        loop {
            match self.step(io).await {
                Ok(StepOutcome::Continue) => {}
                Ok(StepOutcome::Complete) => return Ok(()),
                Err(e) if e.is_cancelled() => {
                    tracing::debug!(process = %self.name, "cancelled");
                    self.abandon().await;
                    return Ok(());
                }
                Err(e) => {
                    tracing::error!(process = %self.name, error = %e, "process failed");
                    self.abandon().await;
                    return Err(e);
                }
            }
        }
    }

    async fn complete(&mut self, io: &mut ProcessIo) -> PipelineResult<()> {
        match io.complete_outputs().await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {}
            Err(e) => return Err(e),
        }
        self.transition(ProcessState::Completed)?;
        self.inner.finish().await?;
        tracing::debug!(process = %self.name, "completed");
        Ok(())
    }

    async fn abandon(&mut self) {
        if self.state == ProcessState::Completed {
            return;
        }
        self.state = ProcessState::Completed;
        if let Err(e) = self.inner.finish().await {
            tracing::warn!(process = %self.name, error = %e, "finish failed");
        }
    }
}
