//! Mapping of UI touches into hardware metering regions.
//!
//! The pipeline is build → transform → rank/truncate:
//! [`MeteringRegions::from_point`] or [`MeteringRegions::from_area`] in view
//! coordinates, [`MeteringRegions::transform`] through a [`MeteringTransform`],
//! and [`MeteringRegions::get`] to obtain at most N hardware rectangles,
//! heaviest first.

mod camera2;
mod legacy;
mod region;

pub use camera2::{Camera2MeteringTransform, MeteringGeometry};
pub use legacy::{LegacyArea, LegacyMeteringTransform};
pub use region::{MeteringRegion, MeteringRegions, MeteringTransform};
