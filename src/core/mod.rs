pub mod config;
pub mod datum;
pub mod edge;
pub mod port;
pub mod process;
pub mod time_str;
pub mod types;

pub use config::{ConfigBlock, ConfigValue};
pub use datum::{Datum, FromPayload, Payload, PayloadKind};
pub use edge::{edge, CancelSignal, CancelWatch, EdgeError, EdgeReceiver, EdgeSender};
pub use port::{PortDirection, PortFlags, PortInfo, PortSet};
pub use process::{Process, ProcessIo, StepOutcome};
pub use types::{
    BoundingBox, DetectedObject, DetectedObjectSet, FrameId, ImageContainer, ObjectTrackSet,
    TimeUsec, Timestamp, Track, TrackState,
};
