//! Port declarations.
//!
//! Each process declares its ports once, while it is added to a pipeline.
//! The pipeline uses the declared types to validate edge connections before
//! any data flows.

use crate::error::{PipelineError, PipelineResult};
use crate::registry::port_types::{self, TYPE_ANY};

/// Whether a port is an input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
}

impl PortDirection {
    pub fn name(&self) -> &'static str {
        match self {
            PortDirection::Input => "input",
            PortDirection::Output => "output",
        }
    }
}

/// Cardinality and sharing flags of a port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PortFlags {
    /// Pipeline start fails if a required port has no edge.
    pub required: bool,
    /// Consumers of a shared output receive the same payload instance.
    pub shared: bool,
}

impl PortFlags {
    pub const fn optional() -> Self {
        Self {
            required: false,
            shared: false,
        }
    }

    pub const fn required() -> Self {
        Self {
            required: true,
            shared: false,
        }
    }

    pub const fn shared(mut self) -> Self {
        self.shared = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub name: String,
    pub port_type: String,
    pub direction: PortDirection,
    pub flags: PortFlags,
    pub description: String,
}

impl PortInfo {
    pub fn is_any(&self) -> bool {
        self.port_type == TYPE_ANY
    }
}

/// All ports of one process.
#[derive(Debug, Clone)]
pub struct PortSet {
    process: String,
    inputs: Vec<PortInfo>,
    outputs: Vec<PortInfo>,
}

impl PortSet {
    pub fn new(process: impl Into<String>) -> Self {
        Self {
            process: process.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn declare_input(
        &mut self,
        name: &str,
        port_type: &str,
        flags: PortFlags,
        description: &str,
    ) -> PipelineResult<()> {
        self.declare_port(PortDirection::Input, name, port_type, flags, description)
    }

    pub fn declare_output(
        &mut self,
        name: &str,
        port_type: &str,
        flags: PortFlags,
        description: &str,
    ) -> PipelineResult<()> {
        self.declare_port(PortDirection::Output, name, port_type, flags, description)
    }

    /// Register a named, typed endpoint. Inputs and outputs have separate
    /// namespaces, so a process may echo an input port name on its outputs.
    pub fn declare_port(
        &mut self,
        direction: PortDirection,
        name: &str,
        port_type: &str,
        flags: PortFlags,
        description: &str,
    ) -> PipelineResult<()> {
        let declaration_error = |reason: String| PipelineError::Declaration {
            process: self.process.clone(),
            port: name.to_string(),
            reason,
        };

        if name.is_empty() {
            return Err(declaration_error("port name is empty".to_string()));
        }
        if !port_types::is_registered(port_type) {
            return Err(declaration_error(format!("unknown port type '{}'", port_type)));
        }
        if self.get(direction, name).is_some() {
            return Err(declaration_error(format!(
                "{} port already declared",
                direction.name()
            )));
        }

        let info = PortInfo {
            name: name.to_string(),
            port_type: port_type.to_string(),
            direction,
            flags,
            description: description.to_string(),
        };

        match direction {
            PortDirection::Input => self.inputs.push(info),
            PortDirection::Output => self.outputs.push(info),
        }
        Ok(())
    }

    pub fn process(&self) -> &str {
        &self.process
    }

    pub fn get(&self, direction: PortDirection, name: &str) -> Option<&PortInfo> {
        let ports = match direction {
            PortDirection::Input => &self.inputs,
            PortDirection::Output => &self.outputs,
        };
        ports.iter().find(|p| p.name == name)
    }

    pub fn input(&self, name: &str) -> Option<&PortInfo> {
        self.get(PortDirection::Input, name)
    }

    pub fn output(&self, name: &str) -> Option<&PortInfo> {
        self.get(PortDirection::Output, name)
    }

    pub fn inputs(&self) -> &[PortInfo] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[PortInfo] {
        &self.outputs
    }
}
