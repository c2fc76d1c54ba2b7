use crate::core::Process;
use crate::error::{PipelineError, PipelineResult};
use serde::Serialize;
use std::collections::BTreeMap;

/// Schema for one configuration key of a process type
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigSchema {
    pub key: String,
    #[serde(rename = "type")]
    pub value_type: String,
    /// Default as configuration text; merged into a block before `configure`
    pub default: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

/// Factory function type for creating process instances
pub type ProcessFactory = fn() -> Box<dyn Process>;

/// Complete metadata for a process type
#[derive(Clone, Serialize)]
pub struct ProcessMetadata {
    pub type_name: String,
    pub category: String,
    pub description: String,
    pub config: Vec<ConfigSchema>,
    #[serde(skip)]
    pub factory: ProcessFactory,
}

impl ProcessMetadata {
    /// Create a new, unconfigured instance of this process type
    pub fn create_instance(&self) -> Box<dyn Process> {
        (self.factory)()
    }

    pub fn config_entry(&self, key: &str) -> Option<&ConfigSchema> {
        self.config.iter().find(|c| c.key == key)
    }
}

impl std::fmt::Debug for ProcessMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessMetadata")
            .field("type_name", &self.type_name)
            .field("category", &self.category)
            .field("config", &self.config)
            .finish()
    }
}

// Factory type for creating process metadata at runtime
pub type ProcessMetadataFactory = fn() -> ProcessMetadata;

// Wrapper for inventory collection
pub struct ProcessMetadataFactoryWrapper(pub ProcessMetadataFactory);

inventory::collect!(ProcessMetadataFactoryWrapper);

/// Every process type linked into the binary, keyed by type name.
#[derive(Debug, Clone)]
pub struct ProcessRegistry {
    types: BTreeMap<String, ProcessMetadata>,
}

impl ProcessRegistry {
    /// Collect all `#[derive(ProcessMeta)]` registrations.
    pub fn from_inventory() -> Self {
        let types = inventory::iter::<ProcessMetadataFactoryWrapper>
            .into_iter()
            .map(|wrapper| {
                let metadata = (wrapper.0)();
                (metadata.type_name.clone(), metadata)
            })
            .collect();
        Self { types }
    }

    pub fn get(&self, type_name: &str) -> Option<&ProcessMetadata> {
        self.types.get(type_name)
    }

    pub fn create(&self, type_name: &str) -> PipelineResult<Box<dyn Process>> {
        self.get(type_name)
            .map(ProcessMetadata::create_instance)
            .ok_or_else(|| PipelineError::UnknownProcessType(type_name.to_string()))
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl Default for ProcessRegistry {
    fn default() -> Self {
        Self::from_inventory()
    }
}
