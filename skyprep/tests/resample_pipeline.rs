//! End-to-end checks of the DQ-aware resampling pipeline: flag decode,
//! pixel repair, spline zoom, and WCS/header bookkeeping in one pass.

use approx::assert_relative_eq;
use ndarray::Array2;
use skyprep::{
    resample_image_with_dq, DqCatalog, DqRepairOptions, Header, ResampleError, SplineOrder,
};

fn science_header() -> Header {
    let mut hdr = Header::new();
    hdr.insert("CRPIX1", 4.5);
    hdr.insert("CRPIX2", 4.5);
    hdr.insert("CRVAL1", 5.0);
    hdr.insert("CRVAL2", 15.0);
    hdr.insert("CTYPE1", "RA---TAN");
    hdr.insert("CTYPE2", "DEC--TAN");
    hdr.insert("CD1_1", 1e-5);
    hdr.insert("CD1_2", -1e-8);
    hdr.insert("CD2_1", 1.5e-8);
    hdr.insert("CD2_2", 1.2e-5);
    hdr
}

fn primary_header() -> Header {
    let mut hdr = Header::new();
    hdr.insert("ROOTNAME", "jw00001001001_01101_00001");
    hdr.insert("INSTRUME", "NIRCAM");
    hdr.insert("DETECTOR", "NRCA1");
    hdr.insert("FILTER", "F200W");
    hdr.insert("DATE-OBS", "2024-03-14");
    hdr.insert("EXPTIME", 483.2);
    hdr
}

/// A bilinear ramp, so both the box repair of an interior pixel and linear
/// resampling reproduce exact values.
fn ramp() -> Array2<f64> {
    Array2::from_shape_fn((10, 10), |(i, j)| (i * 10 + j) as f64)
}

#[test]
fn test_full_pipeline_shrink_with_repair() {
    let catalog = DqCatalog::jwst();
    let mut image = ramp();
    image[[5, 5]] = 10_000.0;
    let mut dq = Array2::<u32>::zeros((10, 10));
    dq[[5, 5]] = 1; // DO_NOT_USE
    dq[[0, 0]] = 1; // on the border, stays as-is

    let options = DqRepairOptions {
        bad_flag: 1,
        kernel_width: 5,
        ignore_border: 1,
    };
    let (out, header) = resample_image_with_dq(
        image.view().into_dyn(),
        dq.view().into_dyn(),
        &catalog,
        &science_header(),
        Some(&primary_header()),
        0.5,
        SplineOrder::Linear,
        &options,
    )
    .unwrap();

    assert_eq!(out.dim(), (5, 5));

    // The repaired pixel is the box average of its ramp neighbors, which
    // for a symmetric neighborhood equals the ramp value itself, so the
    // linear zoom of the repaired frame is exact everywhere.
    assert_relative_eq!(out[[0, 0]], 0.0);
    assert_relative_eq!(out[[4, 4]], 99.0);
    assert_relative_eq!(out[[2, 2]], 49.5, epsilon = 1e-9);

    // WCS follows the new grid.
    assert_relative_eq!(header.get_f64("CRPIX1").unwrap(), 2.5);
    assert_relative_eq!(header.get_f64("CRPIX2").unwrap(), 2.5);
    assert_relative_eq!(header.get_f64("CD1_1").unwrap(), 2e-5);
    assert_relative_eq!(header.get_f64("CD1_2").unwrap(), -2e-8);
    assert_relative_eq!(header.get_f64("CD2_1").unwrap(), 3e-8);
    assert_relative_eq!(header.get_f64("CD2_2").unwrap(), 2.4e-5);
    assert_relative_eq!(header.get_f64("CRVAL1").unwrap(), 5.0);

    // Bookkeeping keys come over from the primary header, nothing else.
    assert_eq!(header.get_str("INSTRUME").unwrap(), "NIRCAM");
    assert_eq!(header.get_str("DETECTOR").unwrap(), "NRCA1");
    assert_eq!(header.get_str("DATE-OBS").unwrap(), "2024-03-14");
    assert!(!header.contains("EXPTIME"));
}

#[test]
fn test_shrink_then_grow_restores_wcs() {
    let catalog = DqCatalog::jwst();
    let image = ramp();
    let dq = Array2::<u32>::zeros((10, 10));
    let options = DqRepairOptions::default();

    let (small, small_hdr) = resample_image_with_dq(
        image.view().into_dyn(),
        dq.view().into_dyn(),
        &catalog,
        &science_header(),
        None,
        0.5,
        SplineOrder::Linear,
        &options,
    )
    .unwrap();

    let small_dq = Array2::<u32>::zeros(small.dim());
    let (big, big_hdr) = resample_image_with_dq(
        small.view().into_dyn(),
        small_dq.view().into_dyn(),
        &catalog,
        &small_hdr,
        None,
        2.0,
        SplineOrder::Linear,
        &options,
    )
    .unwrap();

    assert_eq!(big.dim(), (10, 10));
    assert_relative_eq!(big_hdr.get_f64("CRPIX1").unwrap(), 4.5, epsilon = 1e-12);
    assert_relative_eq!(big_hdr.get_f64("CD1_1").unwrap(), 1e-5, epsilon = 1e-18);
    // Corner samples survive both trips exactly.
    assert_relative_eq!(big[[0, 0]], 0.0);
    assert_relative_eq!(big[[9, 9]], 99.0);
}

#[test]
fn test_unrepairable_region_aborts() {
    let catalog = DqCatalog::jwst();
    let image = ramp();
    let mut dq = Array2::<u32>::zeros((10, 10));
    for i in 2..8 {
        for j in 2..8 {
            dq[[i, j]] = 1;
        }
    }

    let options = DqRepairOptions {
        bad_flag: 1,
        kernel_width: 3,
        ignore_border: 0,
    };
    let err = resample_image_with_dq(
        image.view().into_dyn(),
        dq.view().into_dyn(),
        &catalog,
        &science_header(),
        None,
        0.5,
        SplineOrder::Linear,
        &options,
    )
    .unwrap_err();

    match err {
        ResampleError::RepairFailed { count } => assert_eq!(count, 16),
        other => panic!("expected RepairFailed, got {other:?}"),
    }
}
