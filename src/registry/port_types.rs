//! Port-type registry.
//!
//! Maps a port-type name to the payload kind carried on ports of that type.
//! Built-in types are submitted through `inventory` at link time; more can
//! be added with [`register`] before ports using them are declared.

use crate::core::PayloadKind;
use crate::error::{PipelineError, PipelineResult};
use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

/// Wildcard type: compatible with every other port type.
pub const TYPE_ANY: &str = "any";

pub const TYPE_TIMESTAMP: &str = "timestamp";
pub const TYPE_FRAME_RATE: &str = "frame_rate";
pub const TYPE_IMAGE: &str = "image";
pub const TYPE_DETECTED_OBJECT_SET: &str = "detected_object_set";
pub const TYPE_OBJECT_TRACK_SET: &str = "object_track_set";
pub const TYPE_FILE_NAME: &str = "file_name";
pub const TYPE_GENERIC: &str = "generic";

pub struct PortTypeRegistration {
    pub name: &'static str,
    pub kind: PayloadKind,
    pub description: &'static str,
}

impl PortTypeRegistration {
    pub const fn new(name: &'static str, kind: PayloadKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            description,
        }
    }
}

inventory::collect!(PortTypeRegistration);

inventory::submit! {
    PortTypeRegistration::new(TYPE_TIMESTAMP, PayloadKind::Timestamp, "Frame id and media time")
}
inventory::submit! {
    PortTypeRegistration::new(TYPE_FRAME_RATE, PayloadKind::FrameRate, "Frames per second")
}
inventory::submit! {
    PortTypeRegistration::new(TYPE_IMAGE, PayloadKind::Image, "Decoded image")
}
inventory::submit! {
    PortTypeRegistration::new(TYPE_DETECTED_OBJECT_SET, PayloadKind::DetectedObjectSet, "Detections on one frame")
}
inventory::submit! {
    PortTypeRegistration::new(TYPE_OBJECT_TRACK_SET, PayloadKind::ObjectTrackSet, "Object tracks")
}
inventory::submit! {
    PortTypeRegistration::new(TYPE_FILE_NAME, PayloadKind::FileName, "File path or name")
}
inventory::submit! {
    PortTypeRegistration::new(TYPE_GENERIC, PayloadKind::Generic, "Free-form JSON value")
}

fn table() -> &'static RwLock<HashMap<String, PayloadKind>> {
    static TABLE: OnceLock<RwLock<HashMap<String, PayloadKind>>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let builtin = inventory::iter::<PortTypeRegistration>
            .into_iter()
            .map(|reg| (reg.name.to_string(), reg.kind))
            .collect();
        RwLock::new(builtin)
    })
}

/// Register `name` as carrying `kind`. Re-registering the same pair is a
/// no-op; rebinding a name to a different kind is an error.
pub fn register(name: &str, kind: PayloadKind) -> PipelineResult<()> {
    if name.is_empty() || name == TYPE_ANY {
        return Err(PipelineError::config(
            "port_types",
            format!("'{}' cannot be registered as a port type", name),
        ));
    }

    let mut table = table().write().unwrap_or_else(|poisoned| poisoned.into_inner());
    match table.get(name) {
        Some(existing) if *existing != kind => Err(PipelineError::config(
            "port_types",
            format!(
                "port type '{}' already registered as {}, not {}",
                name, existing, kind
            ),
        )),
        Some(_) => Ok(()),
        None => {
            table.insert(name.to_string(), kind);
            Ok(())
        }
    }
}

/// Payload kind for a registered type. `None` for `any` and unknown names.
pub fn lookup(name: &str) -> Option<PayloadKind> {
    let table = table().read().unwrap_or_else(|poisoned| poisoned.into_inner());
    table.get(name).copied()
}

pub fn is_registered(name: &str) -> bool {
    name == TYPE_ANY || lookup(name).is_some()
}

/// Whether an output of type `from` may feed an input of type `to`.
pub fn compatible(from: &str, to: &str) -> bool {
    if from == TYPE_ANY || to == TYPE_ANY {
        return true;
    }
    from == to && is_registered(from)
}

pub fn registered_types() -> Vec<String> {
    let table = table().read().unwrap_or_else(|poisoned| poisoned.into_inner());
    let mut names: Vec<String> = table.keys().cloned().collect();
    names.sort();
    names
}
