//! Mapping from user-facing filters to render adjustments.

use montage_project_model::{Filter, TimeRange};

/// A concrete per-frame color operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AdjustmentOp {
    Identity,
    /// Additive luma offset in `[-1, 1]`.
    BrightnessOffset(f64),
    /// Contrast gain around mid-grey, 1 is neutral.
    ContrastGain(f64),
    /// Chroma gain, 1 is neutral.
    SaturationGain(f64),
    /// Saturation boost weighted toward muted colors, 0 is neutral.
    VibranceGain(f64),
    /// Target color temperature in Kelvin.
    WhiteBalance { kelvin: f64 },
}

impl AdjustmentOp {
    pub fn is_identity(&self) -> bool {
        matches!(self, AdjustmentOp::Identity)
    }
}

/// An adjustment scoped to one segment's time range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adjustment {
    pub op: AdjustmentOp,
    pub time_range: TimeRange,
}

/// Translate a clip's filter into an adjustment over `time_range`.
///
/// No filter maps to [`AdjustmentOp::Identity`]. Parameters pass through
/// as given; range enforcement belongs to whoever edits the clip.
pub fn apply_filter(filter: Option<&Filter>, time_range: TimeRange) -> Adjustment {
    let op = match filter.copied() {
        None => AdjustmentOp::Identity,
        Some(Filter::Brightness(v)) => AdjustmentOp::BrightnessOffset(v),
        Some(Filter::Contrast(v)) => AdjustmentOp::ContrastGain(v),
        Some(Filter::Saturation(v)) => AdjustmentOp::SaturationGain(v),
        Some(Filter::Vibrance(v)) => AdjustmentOp::VibranceGain(v),
        Some(Filter::Temperature(k)) => AdjustmentOp::WhiteBalance { kelvin: k },
    };
    Adjustment { op, time_range }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn range() -> TimeRange {
        TimeRange::new(Duration::from_secs(2), Duration::from_secs(3))
    }

    #[test]
    fn test_no_filter_is_identity() {
        let adj = apply_filter(None, range());
        assert!(adj.op.is_identity());
        assert_eq!(adj.time_range, range());
    }

    #[test]
    fn test_each_filter_maps_to_its_op() {
        let cases = [
            (Filter::Brightness(0.2), AdjustmentOp::BrightnessOffset(0.2)),
            (Filter::Contrast(1.3), AdjustmentOp::ContrastGain(1.3)),
            (Filter::Saturation(0.0), AdjustmentOp::SaturationGain(0.0)),
            (Filter::Vibrance(0.5), AdjustmentOp::VibranceGain(0.5)),
            (
                Filter::Temperature(4500.0),
                AdjustmentOp::WhiteBalance { kelvin: 4500.0 },
            ),
        ];
        for (filter, expected) in cases {
            assert_eq!(apply_filter(Some(&filter), range()).op, expected);
        }
    }

    #[test]
    fn test_parameter_passes_through_unchanged() {
        let adj = apply_filter(Some(&Filter::Brightness(-0.35)), range());
        assert_eq!(adj.op, AdjustmentOp::BrightnessOffset(-0.35));
    }
}
