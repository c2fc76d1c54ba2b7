pub mod metadata;
pub mod port_types;

pub use metadata::{
    ConfigSchema, ProcessFactory, ProcessMetadata, ProcessMetadataFactory,
    ProcessMetadataFactoryWrapper, ProcessRegistry,
};
pub use port_types::{PortTypeRegistration, TYPE_ANY};
