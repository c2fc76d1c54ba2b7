//! Frame-rate decimation.
//!
//! `downsample` thins a synchronized set of streams to a target frame rate,
//! optionally keeping only bursts of frames, only a time window, or only
//! frames that carry detections. Up to five payload streams pass through
//! alongside the timestamp and are forwarded or dropped together.

use crate::core::time_str::time_str_to_seconds;
use crate::core::{
    ConfigBlock, Datum, DetectedObjectSet, FrameId, ObjectTrackSet, PortFlags, PortSet, Process,
    ProcessIo, StepOutcome, Timestamp,
};
use crate::error::{PipelineError, PipelineResult};
use crate::registry::port_types::{TYPE_ANY, TYPE_FRAME_RATE, TYPE_TIMESTAMP};
use async_trait::async_trait;
use framepipe_macros::ProcessMeta;
use std::collections::BTreeMap;

pub const PORT_TIMESTAMP: &str = "timestamp";
pub const PORT_ORIGINAL_TIMESTAMP: &str = "original_timestamp";
pub const PORT_RATE: &str = "rate";
pub const INPUT_PORTS: [&str; 5] = ["input_1", "input_2", "input_3", "input_4", "input_5"];
pub const OUTPUT_PORTS: [&str; 5] = ["output_1", "output_2", "output_3", "output_4", "output_5"];

/// Slack so times that land exactly on a frame boundary are not floored
/// into the previous frame.
const BOUNDARY_EPSILON: f64 = 1e-10;

/// Decimation parameters, resolved from configuration
#[derive(Debug, Clone, PartialEq)]
pub struct DecimatorSettings {
    /// Frames per second to keep; non-positive disables rate decimation
    pub target_frame_rate: f64,
    pub burst_frame_count: u32,
    pub burst_frame_break: u32,
    /// Window start in seconds
    pub start_time: Option<f64>,
    /// Window length in seconds, counted from `start_time`
    pub duration: Option<f64>,
}

impl Default for DecimatorSettings {
    fn default() -> Self {
        Self {
            target_frame_rate: -1.0,
            burst_frame_count: 0,
            burst_frame_break: 0,
            start_time: None,
            duration: None,
        }
    }
}

impl DecimatorSettings {
    fn burst_enabled(&self) -> bool {
        self.burst_frame_count != 0 && self.burst_frame_break != 0
    }
}

/// Accept/reject state machine for the time-based gates.
#[derive(Debug, Clone)]
pub struct Decimator {
    settings: DecimatorSettings,
    /// Time of the most recent resolved frame
    frame_time: f64,
    /// Time of the last frame accepted by the rate gate; `None` before the first
    last_sent_time: Option<f64>,
    burst_counter: u64,
}

impl Decimator {
    pub fn new(settings: DecimatorSettings) -> Self {
        Self {
            settings,
            frame_time: 0.0,
            last_sent_time: None,
            burst_counter: 0,
        }
    }

    pub fn settings(&self) -> &DecimatorSettings {
        &self.settings
    }

    /// Index of the output frame slot that `time_seconds` falls into.
    pub fn target_frame_index(&self, time_seconds: f64) -> i64 {
        (time_seconds * self.settings.target_frame_rate + BOUNDARY_EPSILON).floor() as i64
    }

    /// Current frame time: the explicit time when present, otherwise the
    /// previous frame time advanced by one input frame period.
    pub fn resolve_time(&mut self, explicit: Option<f64>, input_rate: Option<f64>) -> Option<f64> {
        let resolved = match (explicit, input_rate) {
            (Some(t), _) => Some(t),
            (None, Some(rate)) if rate > 0.0 => Some(self.frame_time + 1.0 / rate),
            _ => None,
        };
        if let Some(t) = resolved {
            self.frame_time = t;
        }
        resolved
    }

    /// Run the rate, duty-cycle and time-window gates for one frame.
    /// Unresolved frames pass every gate.
    pub fn admit(&mut self, time: Option<f64>) -> bool {
        let Some(t) = time else {
            return true;
        };

        if self.settings.target_frame_rate > 0.0 && !self.admit_rate(t) {
            return false;
        }

        self.in_window(t)
    }

    fn admit_rate(&mut self, t: f64) -> bool {
        let current = self.target_frame_index(t);

        // the first frame always opens a new slot
        let elapsed = match self.last_sent_time {
            None => 1,
            Some(last) => current.saturating_sub(self.target_frame_index(last)),
        };
        if elapsed <= 0 {
            return false;
        }
        self.last_sent_time = Some(t);

        if self.settings.burst_enabled() {
            let period =
                u64::from(self.settings.burst_frame_count) + u64::from(self.settings.burst_frame_break);
            self.burst_counter = (self.burst_counter + elapsed as u64) % period;
            if self.burst_counter == 0 || self.burst_counter > u64::from(self.settings.burst_frame_count) {
                return false;
            }
        }
        true
    }

    pub fn in_window(&self, t: f64) -> bool {
        match self.settings.start_time {
            Some(start) if t < start => false,
            Some(start) => match self.settings.duration {
                Some(duration) if duration > 0.0 => t <= start + duration,
                _ => true,
            },
            None => true,
        }
    }
}

/// Renumbering state for accepted frames
#[derive(Debug, Default)]
struct FrameRenumbering {
    next_frame: FrameId,
    frame_map: BTreeMap<FrameId, FrameId>,
}

impl FrameRenumbering {
    fn assign(&mut self, original: Option<FrameId>) -> FrameId {
        let frame = self.next_frame;
        self.next_frame += 1;
        if let Some(original) = original {
            self.frame_map.insert(original, frame);
        }
        frame
    }
}

#[derive(Debug)]
struct RunState {
    decimator: Decimator,
    renumbering: FrameRenumbering,
    first_cycle: bool,
}

#[derive(ProcessMeta)]
#[process_meta(
    name = "downsample",
    category = "Filters",
    description = "Drop frames to reach a target frame rate"
)]
pub struct DownsampleProcess {
    #[config(default = "-1.0", description = "Output frame rate; non-positive passes every frame")]
    pub target_frame_rate: f64,

    #[config(default = "0", description = "Frames kept per burst", min = 0.0)]
    pub burst_frame_count: u32,

    #[config(default = "0", description = "Frames dropped between bursts", min = 0.0)]
    pub burst_frame_break: u32,

    #[config(default = "false", description = "Renumber kept frames from 0")]
    pub renumber_frames: bool,

    #[config(default = "false", description = "Drop frames whose detection set is empty")]
    pub only_frames_with_dets: bool,

    #[config(default = "", description = "Window start, HH:MM:SS.sss")]
    pub start_time: String,

    #[config(default = "", description = "Window length, HH:MM:SS.sss")]
    pub duration: String,

    settings: DecimatorSettings,
    run: Option<RunState>,
}

impl Default for DownsampleProcess {
    fn default() -> Self {
        Self {
            target_frame_rate: -1.0,
            burst_frame_count: 0,
            burst_frame_break: 0,
            renumber_frames: false,
            only_frames_with_dets: false,
            start_time: String::new(),
            duration: String::new(),
            settings: DecimatorSettings::default(),
            run: None,
        }
    }
}

impl DownsampleProcess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn settings(&self) -> &DecimatorSettings {
        &self.settings
    }

    fn parse_time(config: &ConfigBlock, key: &str, text: &str) -> PipelineResult<Option<f64>> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        time_str_to_seconds(text)
            .map(Some)
            .map_err(|e| PipelineError::config(config.process_name(), format!("{}: {}", key, e)))
    }

    /// Track set with every state moved to its renumbered frame. States of
    /// dropped frames are removed.
    fn patch_tracks(tracks: &ObjectTrackSet, map: &BTreeMap<FrameId, FrameId>) -> ObjectTrackSet {
        let mut patched = tracks.clone();
        patched.remap_frames(map);
        patched
    }
}

#[async_trait]
impl Process for DownsampleProcess {
    fn type_name(&self) -> &'static str {
        "downsample"
    }

    fn make_ports(&self, ports: &mut PortSet) -> PipelineResult<()> {
        let optional = PortFlags::optional();

        ports.declare_input(PORT_TIMESTAMP, TYPE_TIMESTAMP, optional, "Timestamp of the current frame")?;
        ports.declare_input(PORT_RATE, TYPE_FRAME_RATE, optional, "Input frame rate")?;
        for port in INPUT_PORTS {
            ports.declare_input(port, TYPE_ANY, optional, "Input data")?;
        }

        ports.declare_output(PORT_TIMESTAMP, TYPE_TIMESTAMP, optional, "Timestamp of kept frames")?;
        ports.declare_output(
            PORT_ORIGINAL_TIMESTAMP,
            TYPE_TIMESTAMP,
            optional,
            "Unmodified timestamp of kept frames",
        )?;
        ports.declare_output(PORT_RATE, TYPE_FRAME_RATE, optional, "Target frame rate")?;
        for port in OUTPUT_PORTS {
            ports.declare_output(port, TYPE_ANY, optional.shared(), "Output data")?;
        }
        Ok(())
    }

    async fn configure(&mut self, config: &ConfigBlock) -> PipelineResult<()> {
        self.target_frame_rate = config.value_or("target_frame_rate", -1.0)?;
        self.burst_frame_count = config.value_or("burst_frame_count", 0)?;
        self.burst_frame_break = config.value_or("burst_frame_break", 0)?;
        self.renumber_frames = config.value_or("renumber_frames", false)?;
        self.only_frames_with_dets = config.value_or("only_frames_with_dets", false)?;
        self.start_time = config.value_or("start_time", String::new())?;
        self.duration = config.value_or("duration", String::new())?;

        if !self.target_frame_rate.is_finite() {
            return Err(PipelineError::config(
                config.process_name(),
                "target_frame_rate must be a finite number",
            ));
        }

        let mut start_time = Self::parse_time(config, "start_time", &self.start_time)?;
        let duration = Self::parse_time(config, "duration", &self.duration)?;
        if duration.map_or(false, |d| d > 0.0) && start_time.is_none() {
            start_time = Some(0.0);
        }

        self.settings = DecimatorSettings {
            target_frame_rate: self.target_frame_rate,
            burst_frame_count: self.burst_frame_count,
            burst_frame_break: self.burst_frame_break,
            start_time,
            duration,
        };
        Ok(())
    }

    async fn init(&mut self) -> PipelineResult<()> {
        self.run = Some(RunState {
            decimator: Decimator::new(self.settings.clone()),
            renumbering: FrameRenumbering::default(),
            first_cycle: true,
        });
        Ok(())
    }

    async fn step(&mut self, io: &mut ProcessIo) -> PipelineResult<StepOutcome> {
        let run = self
            .run
            .as_mut()
            .ok_or_else(|| PipelineError::data(io.process_name(), "stepped before init"))?;

        let timestamp = io.pull_if_connected(PORT_TIMESTAMP).await?;
        let frame_rate = io.pull_if_connected(PORT_RATE).await?;
        let mut payloads = Vec::new();
        for (index, port) in INPUT_PORTS.iter().enumerate() {
            if let Some(datum) = io.pull_if_connected(port).await? {
                payloads.push((index, datum));
            }
        }

        if run.first_cycle {
            run.first_cycle = false;
            io.push(PORT_RATE, Datum::frame_rate(self.target_frame_rate))
                .await?;
        }

        if timestamp.is_none() && frame_rate.is_none() && payloads.is_empty() {
            tracing::debug!(process = io.process_name(), "no inputs connected");
            return Ok(StepOutcome::Complete);
        }

        let finished = timestamp.as_ref().map_or(false, Datum::is_end_of_stream)
            || frame_rate.as_ref().map_or(false, Datum::is_end_of_stream)
            || payloads.iter().any(|(_, d)| d.is_end_of_stream());
        if finished {
            tracing::debug!(process = io.process_name(), "end of stream");
            return Ok(StepOutcome::Complete);
        }

        let original_ts = match &timestamp {
            Some(datum) => *datum.try_as::<Timestamp>().ok_or_else(|| {
                PipelineError::data(io.process_name(), "timestamp port carried a non-timestamp")
            })?,
            None => Timestamp::default(),
        };
        let input_rate = match &frame_rate {
            Some(datum) => Some(*datum.try_as::<f64>().ok_or_else(|| {
                PipelineError::data(io.process_name(), "frame_rate port carried a non-rate")
            })?),
            None => None,
        };

        let time = run
            .decimator
            .resolve_time(original_ts.time_seconds(), input_rate);
        let mut send = run.decimator.admit(time);

        if send && self.only_frames_with_dets {
            send = !payloads.iter().any(|(_, datum)| {
                datum
                    .try_as::<DetectedObjectSet>()
                    .map_or(false, DetectedObjectSet::is_empty)
            });
        }

        if !send {
            tracing::trace!(process = io.process_name(), time = ?time, "frame dropped");
            return Ok(StepOutcome::Continue);
        }

        let mut ts = original_ts;
        if !ts.has_valid_time() {
            if let Some(t) = time {
                ts.set_time_seconds(t);
            }
        }
        if self.renumber_frames {
            ts.frame = Some(run.renumbering.assign(original_ts.frame));
        }
        if let Some(frame) = ts.frame {
            tracing::debug!(process = io.process_name(), frame, "sending frame");
        }

        io.push_value(PORT_TIMESTAMP, ts).await?;
        io.push_value(PORT_ORIGINAL_TIMESTAMP, original_ts).await?;

        let patch = self.renumber_frames
            && self.only_frames_with_dets
            && !run.renumbering.frame_map.is_empty();

        for (index, datum) in payloads {
            let datum = match datum.try_as::<ObjectTrackSet>() {
                Some(tracks) if patch => {
                    Datum::new(Self::patch_tracks(tracks, &run.renumbering.frame_map))
                }
                _ => datum,
            };
            io.push(OUTPUT_PORTS[index], datum).await?;
        }

        Ok(StepOutcome::Continue)
    }

    async fn finish(&mut self) -> PipelineResult<()> {
        self.run = None;
        Ok(())
    }
}
