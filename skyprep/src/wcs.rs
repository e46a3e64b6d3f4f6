//! Linear world-coordinate-system transforms and their rescaling.
//!
//! Handles the 2x2 linear part of a celestial coordinate mapping in either
//! of its two interchangeable header spellings: a PC rotation matrix with
//! per-axis CDELT scales, or a single CD matrix (`CD = PC . diag(CDELT)`).
//! Distorted (e.g. SIP) solutions are out of scope and rejected up front.

use nalgebra::{Matrix2, Vector2};
use thiserror::Error;

use crate::header::Header;

/// Errors for WCS extraction and rescaling.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WcsError {
    #[error("header carries neither a CD nor a PC/CDELT linear transform")]
    MissingMatrix,
    #[error("non-linear WCS is not supported (CTYPE {0:?} encodes a distortion)")]
    Distorted(String),
    #[error("zoom factor must be positive and finite, got {0}")]
    BadZoom(f64),
}

/// The authoritative spelling of the 2x2 linear term. Exactly one
/// representation is carried; the other is never written alongside it.
#[derive(Debug, Clone, PartialEq)]
pub enum LinearMatrix {
    /// Rotation/skew matrix plus per-axis scales.
    Pc {
        pc: Matrix2<f64>,
        cdelt: Vector2<f64>,
    },
    /// Combined scale-and-rotation matrix.
    Cd(Matrix2<f64>),
}

/// The linear part of a celestial WCS: matrix, reference pixel, reference
/// world coordinate, axis types and units.
#[derive(Debug, Clone, PartialEq)]
pub struct CelestialTransform {
    pub matrix: LinearMatrix,
    /// Reference pixel (1-based, FITS convention).
    pub crpix: Vector2<f64>,
    /// World coordinate at the reference pixel.
    pub crval: Vector2<f64>,
    pub ctype: [String; 2],
    pub cunit: [String; 2],
}

impl CelestialTransform {
    /// Extract the linear transform from a header.
    ///
    /// A CD matrix wins when any `CDi_j` key is present; otherwise PC/CDELT
    /// keys are read with identity/unity defaults for whichever are missing.
    /// Headers with neither spelling fail with [`WcsError::MissingMatrix`];
    /// a `CTYPE` ending in `-SIP` fails with [`WcsError::Distorted`].
    pub fn from_header(header: &Header) -> Result<Self, WcsError> {
        let ctype = [
            header.get_str("CTYPE1").unwrap_or_default().to_string(),
            header.get_str("CTYPE2").unwrap_or_default().to_string(),
        ];
        for axis_type in &ctype {
            if axis_type.ends_with("-SIP") {
                return Err(WcsError::Distorted(axis_type.clone()));
            }
        }

        let cd_keys = ["CD1_1", "CD1_2", "CD2_1", "CD2_2"];
        let pc_keys = ["PC1_1", "PC1_2", "PC2_1", "PC2_2"];
        let matrix = if cd_keys.iter().any(|k| header.contains(k)) {
            LinearMatrix::Cd(Matrix2::new(
                header.get_f64("CD1_1").unwrap_or(0.0),
                header.get_f64("CD1_2").unwrap_or(0.0),
                header.get_f64("CD2_1").unwrap_or(0.0),
                header.get_f64("CD2_2").unwrap_or(0.0),
            ))
        } else if pc_keys.iter().any(|k| header.contains(k))
            || header.contains("CDELT1")
            || header.contains("CDELT2")
        {
            LinearMatrix::Pc {
                pc: Matrix2::new(
                    header.get_f64("PC1_1").unwrap_or(1.0),
                    header.get_f64("PC1_2").unwrap_or(0.0),
                    header.get_f64("PC2_1").unwrap_or(0.0),
                    header.get_f64("PC2_2").unwrap_or(1.0),
                ),
                cdelt: Vector2::new(
                    header.get_f64("CDELT1").unwrap_or(1.0),
                    header.get_f64("CDELT2").unwrap_or(1.0),
                ),
            }
        } else {
            return Err(WcsError::MissingMatrix);
        };

        Ok(Self {
            matrix,
            crpix: Vector2::new(
                header.get_f64("CRPIX1").unwrap_or(0.0),
                header.get_f64("CRPIX2").unwrap_or(0.0),
            ),
            crval: Vector2::new(
                header.get_f64("CRVAL1").unwrap_or(0.0),
                header.get_f64("CRVAL2").unwrap_or(0.0),
            ),
            ctype,
            cunit: [
                header.get_str("CUNIT1").unwrap_or_default().to_string(),
                header.get_str("CUNIT2").unwrap_or_default().to_string(),
            ],
        })
    }

    /// Produce the transform for an image resampled by `zoom`.
    ///
    /// Scale terms grow by `1/zoom` (CDELT for the PC form, the matrix
    /// entries for the CD form); rotation, skew, and the reference world
    /// coordinate are untouched. The reference pixel follows array-slicing
    /// semantics: shrinking by an integer stride `s = floor(1/zoom)` maps
    /// `crpix` to `(crpix - 0.5)/s + 0.5`, and growing applies the exact
    /// inverse, so shrink/grow by reciprocal integer factors round-trips.
    pub fn rescale(&self, zoom: f64) -> Result<Self, WcsError> {
        if !(zoom > 0.0) || !zoom.is_finite() {
            return Err(WcsError::BadZoom(zoom));
        }

        let crpix = if zoom < 1.0 {
            let stride = (1.0 / zoom).floor().max(1.0);
            self.crpix.map(|p| (p - 0.5) / stride + 0.5)
        } else {
            let stride = zoom.floor().max(1.0);
            self.crpix.map(|p| (p - 0.5) * stride + 0.5)
        };

        let matrix = match &self.matrix {
            LinearMatrix::Pc { pc, cdelt } => LinearMatrix::Pc {
                pc: *pc,
                cdelt: cdelt / zoom,
            },
            LinearMatrix::Cd(cd) => LinearMatrix::Cd(cd / zoom),
        };

        Ok(Self {
            matrix,
            crpix,
            crval: self.crval,
            ctype: self.ctype.clone(),
            cunit: self.cunit.clone(),
        })
    }

    /// Write the transform keys into a header, replacing any previous linear
    /// spelling so PC and CD entries can never coexist.
    pub fn write_to(&self, header: &mut Header) {
        header.insert("CRPIX1", self.crpix.x);
        header.insert("CRPIX2", self.crpix.y);
        header.insert("CRVAL1", self.crval.x);
        header.insert("CRVAL2", self.crval.y);
        for (i, axis_type) in self.ctype.iter().enumerate() {
            if !axis_type.is_empty() {
                header.insert(&format!("CTYPE{}", i + 1), axis_type.as_str());
            }
        }
        for (i, unit) in self.cunit.iter().enumerate() {
            if !unit.is_empty() {
                header.insert(&format!("CUNIT{}", i + 1), unit.as_str());
            }
        }

        match &self.matrix {
            LinearMatrix::Pc { pc, cdelt } => {
                header.insert("CDELT1", cdelt.x);
                header.insert("CDELT2", cdelt.y);
                for i in 0..2 {
                    for j in 0..2 {
                        header.insert(&format!("PC{}_{}", i + 1, j + 1), pc[(i, j)]);
                        header.remove(&format!("CD{}_{}", i + 1, j + 1));
                    }
                }
            }
            LinearMatrix::Cd(cd) => {
                for i in 0..2 {
                    for j in 0..2 {
                        header.insert(&format!("CD{}_{}", i + 1, j + 1), cd[(i, j)]);
                        header.remove(&format!("PC{}_{}", i + 1, j + 1));
                    }
                }
                header.remove("CDELT1");
                header.remove("CDELT2");
            }
        }
    }
}
