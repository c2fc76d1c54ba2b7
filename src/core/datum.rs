use super::types::{DetectedObjectSet, ImageContainer, ObjectTrackSet, Timestamp};
use std::fmt;
use std::sync::Arc;

/// Semantic kind of a payload, as referenced by the port-type registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    Timestamp,
    FrameRate,
    Image,
    DetectedObjectSet,
    ObjectTrackSet,
    FileName,
    Generic,
}

impl PayloadKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Timestamp => "timestamp",
            Self::FrameRate => "frame_rate",
            Self::Image => "image",
            Self::DetectedObjectSet => "detected_object_set",
            Self::ObjectTrackSet => "object_track_set",
            Self::FileName => "file_name",
            Self::Generic => "generic",
        }
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Value carried by a datum. Large payloads are reference counted so a
/// datum can be handed to several consumers without copying.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Timestamp(Timestamp),
    FrameRate(f64),
    Image(Arc<ImageContainer>),
    DetectedObjectSet(Arc<DetectedObjectSet>),
    ObjectTrackSet(Arc<ObjectTrackSet>),
    FileName(String),
    Generic(Arc<serde_json::Value>),
}

impl Payload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Self::Timestamp(_) => PayloadKind::Timestamp,
            Self::FrameRate(_) => PayloadKind::FrameRate,
            Self::Image(_) => PayloadKind::Image,
            Self::DetectedObjectSet(_) => PayloadKind::DetectedObjectSet,
            Self::ObjectTrackSet(_) => PayloadKind::ObjectTrackSet,
            Self::FileName(_) => PayloadKind::FileName,
            Self::Generic(_) => PayloadKind::Generic,
        }
    }

    /// Interpret this payload as a specific kind. A mismatch is `None`.
    pub fn try_as<T: FromPayload + ?Sized>(&self) -> Option<&T> {
        T::from_payload(self)
    }

    /// Copy that shares no heap data with `self`.
    pub fn deep_clone(&self) -> Self {
        match self {
            Self::Image(img) => Self::Image(Arc::new(img.as_ref().clone())),
            Self::DetectedObjectSet(set) => Self::DetectedObjectSet(Arc::new(set.as_ref().clone())),
            Self::ObjectTrackSet(set) => Self::ObjectTrackSet(Arc::new(set.as_ref().clone())),
            Self::Generic(value) => Self::Generic(Arc::new(value.as_ref().clone())),
            other => other.clone(),
        }
    }
}

/// Typed accessor into a [`Payload`]
pub trait FromPayload {
    const KIND: PayloadKind;

    fn from_payload(payload: &Payload) -> Option<&Self>;
}

macro_rules! impl_from_payload {
    ($ty:ty, $variant:ident, |$v:ident| $access:expr) => {
        impl FromPayload for $ty {
            const KIND: PayloadKind = PayloadKind::$variant;

            fn from_payload(payload: &Payload) -> Option<&Self> {
                match payload {
                    Payload::$variant($v) => Some($access),
                    _ => None,
                }
            }
        }
    };
}

impl_from_payload!(Timestamp, Timestamp, |v| v);
impl_from_payload!(f64, FrameRate, |v| v);
impl_from_payload!(ImageContainer, Image, |v| v.as_ref());
impl_from_payload!(DetectedObjectSet, DetectedObjectSet, |v| v.as_ref());
impl_from_payload!(ObjectTrackSet, ObjectTrackSet, |v| v.as_ref());
impl_from_payload!(str, FileName, |v| v.as_str());
impl_from_payload!(serde_json::Value, Generic, |v| v.as_ref());

impl From<Timestamp> for Payload {
    fn from(value: Timestamp) -> Self {
        Self::Timestamp(value)
    }
}

impl From<ImageContainer> for Payload {
    fn from(value: ImageContainer) -> Self {
        Self::Image(Arc::new(value))
    }
}

impl From<DetectedObjectSet> for Payload {
    fn from(value: DetectedObjectSet) -> Self {
        Self::DetectedObjectSet(Arc::new(value))
    }
}

impl From<ObjectTrackSet> for Payload {
    fn from(value: ObjectTrackSet) -> Self {
        Self::ObjectTrackSet(Arc::new(value))
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Self::Generic(Arc::new(value))
    }
}

/// Unit of data on an edge: a payload or the terminal completion sentinel
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Value(Payload),
    EndOfStream,
}

impl Datum {
    pub fn new(payload: impl Into<Payload>) -> Self {
        Self::Value(payload.into())
    }

    pub fn frame_rate(rate: f64) -> Self {
        Self::Value(Payload::FrameRate(rate))
    }

    pub fn file_name(name: impl Into<String>) -> Self {
        Self::Value(Payload::FileName(name.into()))
    }

    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Self::EndOfStream)
    }

    pub fn payload(&self) -> Option<&Payload> {
        match self {
            Self::Value(payload) => Some(payload),
            Self::EndOfStream => None,
        }
    }

    pub fn try_as<T: FromPayload + ?Sized>(&self) -> Option<&T> {
        self.payload().and_then(|p| p.try_as::<T>())
    }

    pub fn deep_clone(&self) -> Self {
        match self {
            Self::Value(payload) => Self::Value(payload.deep_clone()),
            Self::EndOfStream => Self::EndOfStream,
        }
    }
}
