//! Composition building: lay clips out back to back on one timeline.
//!
//! Every clip becomes exactly one [`Segment`], whether the sequence holds one
//! clip or fifty. Each segment carries its own transform and adjustment so
//! the render backend never has to look back at the clip list.

use std::time::Duration;

use montage_common::error::{EngineError, EngineResult};
use montage_project_model::{Clip, MediaLocator, Size, TimeRange, TrackFormat};

use crate::cancel::CancelFlag;
use crate::filter::{apply_filter, Adjustment};
use crate::normalize::{normalize, NormalizedTransform};
use crate::probe::{probe_source, MediaProbe, ProbedSource};

/// Slack allowed when comparing a trim against a probed source duration.
/// Container durations are rounded by most muxers.
const SOURCE_DURATION_TOLERANCE: Duration = Duration::from_millis(10);

/// One clip placed on the composition timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Position of the originating clip in the input sequence.
    pub index: usize,

    pub source: MediaLocator,

    /// Range read from the source.
    pub source_range: TimeRange,

    /// Range occupied on the composition timeline.
    pub timeline_range: TimeRange,

    pub format: TrackFormat,

    pub transform: NormalizedTransform,

    /// Filter adjustment, scoped to `timeline_range`.
    pub adjustment: Adjustment,

    /// Whether the source contributes an audio track.
    pub has_audio: bool,
}

/// An immutable, fully resolved timeline ready to render.
#[derive(Debug, Clone, PartialEq)]
pub struct Composition {
    anchor: Size,
    segments: Vec<Segment>,
    duration: Duration,
}

impl Composition {
    /// Render frame size, taken from the first probeable clip.
    pub fn anchor(&self) -> Size {
        self.anchor
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Sum of every segment's duration.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Whether any segment carries audio.
    pub fn has_audio(&self) -> bool {
        self.segments.iter().any(|s| s.has_audio)
    }

    /// The segment on screen at timeline position `t`.
    pub fn segment_at(&self, t: Duration) -> Option<&Segment> {
        self.segments.iter().find(|s| s.timeline_range.contains(t))
    }
}

/// Builds [`Composition`]s from clip sequences.
pub struct CompositionBuilder<'a> {
    probe: &'a dyn MediaProbe,
}

impl<'a> CompositionBuilder<'a> {
    pub fn new(probe: &'a dyn MediaProbe) -> Self {
        Self { probe }
    }

    /// Build a composition from `clips`, in order.
    pub fn build(&self, clips: &[Clip]) -> EngineResult<Composition> {
        self.build_cancellable(clips, &CancelFlag::new())
    }

    /// As [`build`](Self::build), checking `cancel` before each probe.
    ///
    /// Every clip is probed once. The anchor comes from the first clip that
    /// probes successfully; if none does the result is `NoValidClip`.
    /// Otherwise the first failing clip fails the whole build.
    pub fn build_cancellable(
        &self,
        clips: &[Clip],
        cancel: &CancelFlag,
    ) -> EngineResult<Composition> {
        if clips.is_empty() {
            return Err(EngineError::EmptyInput);
        }

        let mut probed = Vec::with_capacity(clips.len());
        for clip in clips {
            cancel.check()?;
            probed.push(probe_source(self.probe, &clip.source));
        }

        let anchor = probed
            .iter()
            .find_map(|p| p.as_ref().ok())
            .map(|p| p.format.dimensions())
            .ok_or(EngineError::NoValidClip)?;

        let mut segments = Vec::with_capacity(clips.len());
        let mut cursor = Duration::ZERO;
        for (index, (clip, probed_source)) in clips.iter().zip(probed).enumerate() {
            let source = probed_source?;
            validate_trim(index, clip, &source)?;

            let timeline_range = TimeRange::new(cursor, clip.trim_duration);
            let segment = Segment {
                index,
                source: clip.source.clone(),
                source_range: clip.source_range(),
                timeline_range,
                transform: normalize(&source.track, &source.format, anchor),
                adjustment: apply_filter(clip.filter.as_ref(), timeline_range),
                has_audio: source.media.has_audio(),
                format: source.format,
            };

            tracing::debug!(
                index,
                source = %segment.source,
                at_secs = cursor.as_secs_f64(),
                duration_secs = clip.trim_duration.as_secs_f64(),
                scale = segment.transform.scale,
                audio = segment.has_audio,
                "Placed segment"
            );

            cursor = cursor
                .checked_add(clip.trim_duration)
                .ok_or_else(|| EngineError::InvalidTrim {
                    index,
                    message: "timeline duration out of range".to_string(),
                })?;
            segments.push(segment);
        }

        tracing::info!(
            segments = segments.len(),
            width = anchor.width,
            height = anchor.height,
            duration_secs = cursor.as_secs_f64(),
            "Composition built"
        );

        Ok(Composition {
            anchor,
            segments,
            duration: cursor,
        })
    }
}

fn validate_trim(index: usize, clip: &Clip, source: &ProbedSource) -> EngineResult<()> {
    if clip.trim_duration.is_zero() {
        return Err(EngineError::InvalidTrim {
            index,
            message: "duration must be positive".to_string(),
        });
    }

    let end = clip.checked_trim_end().ok_or_else(|| EngineError::InvalidTrim {
        index,
        message: "trim window out of range".to_string(),
    })?;

    if let Some(available) = source.media.duration {
        if end > available.saturating_add(SOURCE_DURATION_TOLERANCE) {
            return Err(EngineError::InvalidTrim {
                index,
                message: format!(
                    "ends at {:.3}s but source is {:.3}s long",
                    end.as_secs_f64(),
                    available.as_secs_f64()
                ),
            });
        }
    }

    Ok(())
}
