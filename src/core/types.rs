use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Frame identifier as carried in timestamps and track states
pub type FrameId = i64;

/// Time in microseconds
pub type TimeUsec = i64;

/// Frame id and/or media time of a single frame. Either part may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
    pub frame: Option<FrameId>,
    pub time_usec: Option<TimeUsec>,
}

impl Timestamp {
    pub fn new(time_usec: TimeUsec, frame: FrameId) -> Self {
        Self {
            frame: Some(frame),
            time_usec: Some(time_usec),
        }
    }

    pub fn from_frame(frame: FrameId) -> Self {
        Self {
            frame: Some(frame),
            time_usec: None,
        }
    }

    pub fn from_seconds(seconds: f64) -> Self {
        Self {
            frame: None,
            time_usec: Some(seconds_to_usec(seconds)),
        }
    }

    pub fn with_frame(mut self, frame: FrameId) -> Self {
        self.frame = Some(frame);
        self
    }

    pub fn has_valid_time(&self) -> bool {
        self.time_usec.is_some()
    }

    pub fn has_valid_frame(&self) -> bool {
        self.frame.is_some()
    }

    pub fn time_seconds(&self) -> Option<f64> {
        self.time_usec.map(|t| t as f64 / 1e6)
    }

    pub fn set_time_seconds(&mut self, seconds: f64) {
        self.time_usec = Some(seconds_to_usec(seconds));
    }
}

pub fn seconds_to_usec(seconds: f64) -> TimeUsec {
    (seconds * 1e6).round() as TimeUsec
}

/// Decoded image. Pixel data is interleaved, row major.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageContainer {
    pub width: usize,
    pub height: usize,
    pub depth: usize,
    pub data: Vec<u8>,
}

impl ImageContainer {
    pub fn new(width: usize, height: usize, depth: usize) -> Self {
        Self {
            width,
            height,
            depth,
            data: vec![0; width * height * depth],
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.min_x + self.max_x) / 2.0, (self.min_y + self.max_y) / 2.0)
    }

    pub fn area(&self) -> f64 {
        (self.max_x - self.min_x).max(0.0) * (self.max_y - self.min_y).max(0.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    pub bbox: BoundingBox,
    pub confidence: f64,
    pub class_name: Option<String>,
}

impl DetectedObject {
    pub fn new(bbox: BoundingBox, confidence: f64) -> Self {
        Self {
            bbox,
            confidence,
            class_name: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectedObjectSet {
    pub detections: Vec<DetectedObject>,
}

impl DetectedObjectSet {
    pub fn new(detections: Vec<DetectedObject>) -> Self {
        Self { detections }
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

/// One observation of a tracked object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackState {
    pub frame: FrameId,
    pub time_usec: Option<TimeUsec>,
    pub detection: Option<DetectedObject>,
}

impl TrackState {
    pub fn new(frame: FrameId) -> Self {
        Self {
            frame,
            time_usec: None,
            detection: None,
        }
    }

    pub fn with_detection(mut self, detection: DetectedObject) -> Self {
        self.detection = Some(detection);
        self
    }
}

/// Ordered sequence of states belonging to one object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: u64,
    pub states: Vec<TrackState>,
}

impl Track {
    pub fn new(id: u64, states: Vec<TrackState>) -> Self {
        Self { id, states }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn frames(&self) -> Vec<FrameId> {
        self.states.iter().map(|s| s.frame).collect()
    }

    /// Rewrite every state's frame through `map`, dropping states whose frame
    /// has no entry.
    pub fn remap_frames(&mut self, map: &BTreeMap<FrameId, FrameId>) {
        self.states.retain_mut(|state| match map.get(&state.frame) {
            Some(&mapped) => {
                state.frame = mapped;
                true
            }
            None => false,
        });
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectTrackSet {
    pub tracks: Vec<Track>,
}

impl ObjectTrackSet {
    pub fn new(tracks: Vec<Track>) -> Self {
        Self { tracks }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn remap_frames(&mut self, map: &BTreeMap<FrameId, FrameId>) {
        for track in &mut self.tracks {
            track.remap_frames(map);
        }
    }
}
