//! Montage Project Model
//!
//! Defines the value types shared by the composition engine:
//! - **Clip:** source locator, trim window, optional filter
//! - **Geometry:** sizes, rectangles, affine transforms
//! - **Track:** probed source descriptions and the validated `TrackFormat`
//! - **Edit list:** JSON manifest of a clip sequence for tooling

pub mod clip;
pub mod edit_list;
pub mod geometry;
pub mod track;

pub use clip::*;
pub use edit_list::*;
pub use geometry::*;
pub use track::*;
