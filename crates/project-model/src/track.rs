//! Descriptions of probed source media.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::clip::MediaLocator;
use crate::geometry::{Size, Transform2D};

/// The primary video track of a source, as declared by its container.
///
/// Nothing here is validated; geometry checks happen when a
/// [`TrackFormat`] is derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaTrack {
    /// Codec identifier (e.g. `h264`, `hevc`).
    pub codec: String,

    /// Stored (pre-orientation) frame size.
    pub natural_size: Size,

    /// Orientation transform; `None` means identity.
    #[serde(default)]
    pub orientation: Option<Transform2D>,

    /// Nominal frame rate, when the container declares one.
    #[serde(default)]
    pub nominal_frame_rate: Option<f64>,
}

impl MediaTrack {
    pub fn orientation_or_identity(&self) -> Transform2D {
        self.orientation.unwrap_or(Transform2D::IDENTITY)
    }
}

/// The primary audio track of a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioTrack {
    pub codec: String,
    pub sample_rate: u32,
    pub channels: u32,
}

/// Everything the engine needs to know about one source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMedia {
    pub locator: MediaLocator,

    /// Primary video track, if any.
    pub video: Option<MediaTrack>,

    /// Primary audio track, if any.
    pub audio: Option<AudioTrack>,

    /// Container duration, when known.
    #[serde(default, with = "optional_secs")]
    pub duration: Option<Duration>,
}

impl SourceMedia {
    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }
}

/// Validated presentation format of a video track.
///
/// `dimensions` is the post-orientation size; both components are finite
/// and positive. The only way to obtain one is [`TrackFormat::new`], which
/// refuses degenerate geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackFormat {
    codec: String,
    dimensions: Size,
    frame_rate: f64,
}

impl TrackFormat {
    /// Returns `None` when `dimensions` is not finite and positive or the
    /// frame rate is not finite and positive.
    pub fn new(codec: impl Into<String>, dimensions: Size, frame_rate: f64) -> Option<Self> {
        if !dimensions.is_valid() || !frame_rate.is_finite() || frame_rate <= 0.0 {
            return None;
        }
        Some(Self {
            codec: codec.into(),
            dimensions,
            frame_rate,
        })
    }

    pub fn codec(&self) -> &str {
        &self.codec
    }

    pub fn dimensions(&self) -> Size {
        self.dimensions
    }

    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }
}

mod optional_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        let secs = Option::<f64>::deserialize(deserializer)?;
        secs.map(|s| Duration::try_from_secs_f64(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
