//! Per-segment placement of a source frame inside the render frame.

use montage_project_model::{MediaTrack, Rect, Size, TrackFormat, Transform2D};

/// Where and how big a source frame lands in the render frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedTransform {
    /// Orientation followed by uniform scaling. Maps the natural-size frame
    /// onto `[0, render_size]`.
    pub matrix: Transform2D,

    /// Uniform scale factor applied after orientation.
    pub scale: f64,

    /// Displayed size after orientation and scaling. Never exceeds the
    /// anchor size on either axis.
    pub render_size: Size,
}

impl NormalizedTransform {
    /// Offset that centers `render_size` inside `frame`.
    pub fn letterbox_offset(&self, frame: Size) -> (f64, f64) {
        (
            ((frame.width - self.render_size.width) / 2.0).max(0.0),
            ((frame.height - self.render_size.height) / 2.0).max(0.0),
        )
    }
}

/// Orient `track` upright, then scale it uniformly to fit `anchor`.
///
/// The scale compares the oriented (display) dimensions against the anchor,
/// so a portrait source with a quarter-turn orientation composed into a
/// landscape anchor of the same display size is not shrunk.
pub fn normalize(track: &MediaTrack, format: &TrackFormat, anchor: Size) -> NormalizedTransform {
    let orientation = track.orientation_or_identity();
    let oriented = orientation.apply_to_rect(Rect::from_size(track.natural_size));
    let upright = orientation.then(&Transform2D::translation(-oriented.x, -oriented.y));

    let display = format.dimensions();
    let scale = (anchor.width / display.width).min(anchor.height / display.height);

    NormalizedTransform {
        matrix: upright.then(&Transform2D::scale(scale, scale)),
        scale,
        render_size: display.scaled(scale),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::probe_track_format;
    use montage_project_model::MediaLocator;

    fn track(width: f64, height: f64, rotation: Option<f64>) -> MediaTrack {
        MediaTrack {
            codec: "h264".to_string(),
            natural_size: Size::new(width, height),
            orientation: rotation.map(Transform2D::rotation_degrees),
            nominal_frame_rate: Some(30.0),
        }
    }

    fn format_of(track: &MediaTrack) -> TrackFormat {
        probe_track_format(&MediaLocator::new("t.mp4"), track).unwrap()
    }

    #[test]
    fn test_rotated_portrait_fills_landscape_anchor() {
        let t = track(1080.0, 1920.0, Some(90.0));
        let n = normalize(&t, &format_of(&t), Size::new(1920.0, 1080.0));
        assert_eq!(n.scale, 1.0);
        assert_eq!(n.render_size, Size::new(1920.0, 1080.0));

        let placed = n.matrix.apply_to_rect(Rect::from_size(t.natural_size));
        assert_eq!(placed, Rect::new(0.0, 0.0, 1920.0, 1080.0));
    }

    #[test]
    fn test_smaller_source_scales_up_to_fit() {
        let t = track(1280.0, 720.0, None);
        let n = normalize(&t, &format_of(&t), Size::new(1920.0, 1080.0));
        assert_eq!(n.scale, 1.5);
        assert_eq!(n.render_size, Size::new(1920.0, 1080.0));
        assert_eq!(n.letterbox_offset(Size::new(1920.0, 1080.0)), (0.0, 0.0));
    }

    #[test]
    fn test_portrait_in_landscape_is_pillarboxed() {
        let t = track(1080.0, 1920.0, None);
        let anchor = Size::new(1920.0, 1080.0);
        let n = normalize(&t, &format_of(&t), anchor);
        assert_eq!(n.scale, 0.5625);
        assert_eq!(n.render_size, Size::new(607.5, 1080.0));
        assert!(n.render_size.width <= anchor.width);
        assert_eq!(n.letterbox_offset(anchor), (656.25, 0.0));
    }

    #[test]
    fn test_half_turn_stays_in_positive_quadrant() {
        let t = track(640.0, 480.0, Some(180.0));
        let n = normalize(&t, &format_of(&t), Size::new(640.0, 480.0));
        let placed = n.matrix.apply_to_rect(Rect::from_size(t.natural_size));
        assert_eq!(placed, Rect::new(0.0, 0.0, 640.0, 480.0));
    }
}
