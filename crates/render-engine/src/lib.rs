//! Montage Render Engine
//!
//! Turns an ordered clip list into a single rendered video file.
//!
//! # Pipeline Architecture
//!
//! ```text
//! clips ──► probe (ffprobe) ──► TrackFormat per clip
//!                                   │
//!                                   ├── anchor size (first valid clip)
//!                                   ▼
//!                  normalize: orientation + uniform scale
//!                                   │
//!                  filters: per-segment adjustment
//!                                   ▼
//!                              Composition
//!                                   │
//!                                   ▼
//!               ExportPipeline ──► RenderBackend (ffmpeg)
//!                                   │
//!                                   ▼
//!                           verify ──► output.mp4
//! ```

pub mod cancel;
pub mod composition;
pub mod export;
pub mod ffmpeg;
pub mod filter;
pub mod normalize;
pub mod probe;

pub use cancel::CancelFlag;
pub use composition::{Composition, CompositionBuilder, Segment};
pub use export::*;
pub use ffmpeg::FfmpegBackend;
pub use filter::{apply_filter, Adjustment, AdjustmentOp};
pub use normalize::{normalize, NormalizedTransform};
pub use probe::{
    probe_source, probe_track_format, FfprobeProbe, MediaProbe, ProbedSource, DEFAULT_FRAME_RATE,
};
