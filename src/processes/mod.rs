pub mod debug_sink;
pub mod downsample;
pub mod frame_list;
pub mod write_object_track;

pub use debug_sink::DebugSinkProcess;
pub use downsample::{Decimator, DecimatorSettings, DownsampleProcess};
pub use frame_list::{resolve_entry, FrameListProcess};
pub use write_object_track::WriteObjectTrackProcess;
