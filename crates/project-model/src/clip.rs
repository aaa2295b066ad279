//! Clip model: a trimmed, optionally filtered reference into a source file.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Location of a media file, local or remote.
///
/// Plain filesystem paths and `file://` URLs are treated as local; any
/// other `scheme://` form is handed to the media tools unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaLocator(String);

impl MediaLocator {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn from_path(path: impl AsRef<Path>) -> Self {
        Self(path.as_ref().display().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the locator names a file on the local filesystem.
    pub fn is_local(&self) -> bool {
        self.0.starts_with("file://") || !self.0.contains("://")
    }

    /// Filesystem path for local locators.
    pub fn local_path(&self) -> Option<PathBuf> {
        if let Some(stripped) = self.0.strip_prefix("file://") {
            return Some(PathBuf::from(stripped));
        }
        if self.is_local() {
            return Some(PathBuf::from(&self.0));
        }
        None
    }

    /// The string passed to ffmpeg/ffprobe as an input.
    pub fn tool_input(&self) -> String {
        match self.local_path() {
            Some(path) => path.display().to_string(),
            None => self.0.clone(),
        }
    }
}

impl fmt::Display for MediaLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MediaLocator {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// Half-open time interval `[start, start + duration)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TimeRange {
    pub start: Duration,
    pub duration: Duration,
}

impl TimeRange {
    pub const fn new(start: Duration, duration: Duration) -> Self {
        Self { start, duration }
    }

    /// Saturates at `Duration::MAX`.
    pub fn end(&self) -> Duration {
        self.start.saturating_add(self.duration)
    }

    pub fn contains(&self, t: Duration) -> bool {
        t >= self.start && t < self.end()
    }
}

/// A single visual adjustment with one scalar parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Filter {
    /// Additive offset in `[-1, 1]`.
    Brightness(f64),
    /// Gain in `[0, 2]`, 1 is neutral.
    Contrast(f64),
    /// Gain in `[0, 2]`, 1 is neutral.
    Saturation(f64),
    /// Gain in `[-1, 1]`, 0 is neutral.
    Vibrance(f64),
    /// White balance in Kelvin, `[3000, 9000]`.
    Temperature(f64),
}

impl Filter {
    /// Declared parameter range, inclusive.
    pub fn range(&self) -> (f64, f64) {
        match self {
            Filter::Brightness(_) | Filter::Vibrance(_) => (-1.0, 1.0),
            Filter::Contrast(_) | Filter::Saturation(_) => (0.0, 2.0),
            Filter::Temperature(_) => (3000.0, 9000.0),
        }
    }

    pub fn value(&self) -> f64 {
        match *self {
            Filter::Brightness(v)
            | Filter::Contrast(v)
            | Filter::Saturation(v)
            | Filter::Vibrance(v)
            | Filter::Temperature(v) => v,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Filter::Brightness(_) => "brightness",
            Filter::Contrast(_) => "contrast",
            Filter::Saturation(_) => "saturation",
            Filter::Vibrance(_) => "vibrance",
            Filter::Temperature(_) => "temperature",
        }
    }

    fn with_value(&self, v: f64) -> Filter {
        match self {
            Filter::Brightness(_) => Filter::Brightness(v),
            Filter::Contrast(_) => Filter::Contrast(v),
            Filter::Saturation(_) => Filter::Saturation(v),
            Filter::Vibrance(_) => Filter::Vibrance(v),
            Filter::Temperature(_) => Filter::Temperature(v),
        }
    }

    pub fn is_in_range(&self) -> bool {
        let (lo, hi) = self.range();
        let v = self.value();
        v.is_finite() && v >= lo && v <= hi
    }

    /// Same variant with its parameter clamped into the declared range.
    /// Non-finite values collapse to the neutral setting.
    pub fn clamped(&self) -> Filter {
        let (lo, hi) = self.range();
        let v = self.value();
        if !v.is_finite() {
            return self.with_value(self.neutral_value());
        }
        self.with_value(v.clamp(lo, hi))
    }

    fn neutral_value(&self) -> f64 {
        match self {
            Filter::Brightness(_) | Filter::Vibrance(_) => 0.0,
            Filter::Contrast(_) | Filter::Saturation(_) => 1.0,
            Filter::Temperature(_) => 6500.0,
        }
    }
}

/// One segment of source media placed on the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    /// Where the source media lives.
    pub source: MediaLocator,

    /// Offset into the source where the clip begins.
    #[serde(with = "duration_secs")]
    pub trim_start: Duration,

    /// Length of the clip. Always positive.
    #[serde(with = "duration_secs")]
    pub trim_duration: Duration,

    /// At most one visual adjustment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,
}

impl Clip {
    pub fn new(source: MediaLocator, trim_start: Duration, trim_duration: Duration) -> Self {
        Self {
            source,
            trim_start,
            trim_duration,
            filter: None,
        }
    }

    /// Copy of this clip with `filter` replacing any prior one.
    pub fn with_filter(mut self, filter: Option<Filter>) -> Self {
        self.filter = filter;
        self
    }

    /// Saturates at `Duration::MAX`; see [`checked_trim_end`](Self::checked_trim_end).
    pub fn trim_end(&self) -> Duration {
        self.trim_start.saturating_add(self.trim_duration)
    }

    /// End of the trim window, or `None` if it is not representable.
    pub fn checked_trim_end(&self) -> Option<Duration> {
        self.trim_start.checked_add(self.trim_duration)
    }

    /// The source interval this clip covers.
    pub fn source_range(&self) -> TimeRange {
        TimeRange::new(self.trim_start, self.trim_duration)
    }
}

/// Serialize [`Duration`] as fractional seconds.
pub mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
