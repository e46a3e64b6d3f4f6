//! skyprep - headless image-quality processing for astronomical viewers
//!
//! Utilities for preparing science frames for display and measurement:
//! decoding per-pixel data-quality (DQ) bitmasks against instrument flag
//! catalogs, robust sigma-clipped statistics, filling flagged pixels by
//! scattered interpolation or kernel smoothing, and spline resampling that
//! keeps the image WCS consistent with the new pixel grid.

pub mod dq;
pub mod gapfill;
pub mod header;
pub mod masks;
pub mod resample;
pub mod smooth;
pub mod stats;
pub mod wcs;

pub use dq::{CatalogCache, DqCatalog, DqTableError, FlagDef};
pub use gapfill::{
    compose_repair, fill_by_interpolation, fill_by_smoothing, FillMethod, GapFillError,
};
pub use header::{Header, Value, INHERITED_KEYS};
pub use masks::{annulus_mask, clear_border, disk_mask};
pub use resample::{
    resample_image, resample_image_with_dq, zoom_array, DqRepairOptions, ResampleError,
    SplineOrder,
};
pub use smooth::{smooth, SmoothKind};
pub use stats::{biweight_location, calc_stat, sigma_clip, Estimator, StatConfig, StatsError};
pub use wcs::{CelestialTransform, LinearMatrix, WcsError};
