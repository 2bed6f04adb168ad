//! Unit conversion and page geometry.
//!
//! User space is millimetres with the origin at the top-left corner of the
//! page; PDF operators are written in points with the origin at the
//! bottom-left. Font sizes are always points.

use serde::{Deserialize, Serialize};

/// Points per millimetre (the scale factor `k`).
pub const PT_PER_MM: f32 = 72.0 / 25.4;

pub fn mm_to_pt(mm: f32) -> f32 {
    mm * PT_PER_MM
}

pub fn pt_to_mm(pt: f32) -> f32 {
    pt / PT_PER_MM
}

/// Page orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageOrientation {
    /// Portrait mode: height > width (default).
    #[default]
    Portrait,
    /// Landscape mode: width > height.
    Landscape,
}

/// Standard paper sizes plus a custom size, all in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum PageSize {
    A3,
    #[default]
    A4,
    A5,
    Letter,
    Legal,
    Custom { width: f32, height: f32 },
}

impl PageSize {
    /// Portrait dimensions `(width, height)` in millimetres.
    pub fn dimensions(&self) -> (f32, f32) {
        match *self {
            PageSize::A3 => (297.0, 420.0),
            PageSize::A4 => (210.0, 297.0),
            PageSize::A5 => (148.0, 210.0),
            PageSize::Letter => (215.9, 279.4),
            PageSize::Legal => (215.9, 355.6),
            PageSize::Custom { width, height } => (width.min(height), width.max(height)),
        }
    }

    /// Dimensions after applying `orientation`.
    pub fn oriented(&self, orientation: PageOrientation) -> (f32, f32) {
        let (w, h) = self.dimensions();
        match orientation {
            PageOrientation::Portrait => (w, h),
            PageOrientation::Landscape => (h, w),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mm_point_round_trip() {
        assert!((mm_to_pt(25.4) - 72.0).abs() < 1e-4);
        assert!((pt_to_mm(mm_to_pt(123.45)) - 123.45).abs() < 1e-3);
    }

    #[test]
    fn landscape_swaps_dimensions() {
        assert_eq!(PageSize::A4.oriented(PageOrientation::Landscape), (297.0, 210.0));
        let custom = PageSize::Custom { width: 300.0, height: 100.0 };
        assert_eq!(custom.dimensions(), (100.0, 300.0));
    }
}
