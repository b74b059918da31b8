// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page geometry derived from a printer profile.

use htmlprint_core::{Orientation, PrinterProfile, mm_to_points};

/// Page rotation written as the `/Rotate` entry of every page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rotation(pub i64);

impl From<Orientation> for Rotation {
    fn from(orientation: Orientation) -> Self {
        Self(orientation.rotation_degrees())
    }
}

/// Margins in PDF points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarginsPt {
    pub left: f64,
    pub right: f64,
    pub top: f64,
    pub bottom: f64,
}

/// Final page box, margins, and rotation for one render.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub width_pt: f64,
    pub height_pt: f64,
    pub margins: MarginsPt,
    pub rotation: Rotation,
}

impl PageGeometry {
    /// Compute the geometry for `profile`. Landscape and seascape swap the
    /// page axes.
    pub fn for_profile(profile: &PrinterProfile) -> Self {
        let mut width_pt = mm_to_points(profile.paper_width);
        let mut height_pt = mm_to_points(profile.paper_height);
        if profile.page_orientation.swaps_axes() {
            std::mem::swap(&mut width_pt, &mut height_pt);
        }

        let m = profile.margins;
        Self {
            width_pt,
            height_pt,
            margins: MarginsPt {
                left: mm_to_points(m.left),
                right: mm_to_points(m.right),
                top: mm_to_points(m.top),
                bottom: mm_to_points(m.bottom),
            },
            rotation: profile.page_orientation.into(),
        }
    }

    /// Width available for content between the left and right margins.
    pub fn content_width(&self) -> f64 {
        self.width_pt - self.margins.left - self.margins.right
    }

    /// Height available for content between the top and bottom margins.
    pub fn content_height(&self) -> f64 {
        self.height_pt - self.margins.top - self.margins.bottom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a4(orientation: Orientation) -> PageGeometry {
        PageGeometry::for_profile(&PrinterProfile::new("P1", "lp").with_orientation(orientation))
    }

    #[test]
    fn portrait_family_keeps_axes() {
        let portrait = a4(Orientation::Portrait);
        assert!(portrait.width_pt < portrait.height_pt);
        assert_eq!(portrait.rotation, Rotation(0));

        let inverted = a4(Orientation::InvertedPortrait);
        assert!(inverted.width_pt < inverted.height_pt);
        assert_eq!(inverted.rotation, Rotation(180));
    }

    #[test]
    fn landscape_family_swaps_axes() {
        let landscape = a4(Orientation::Landscape);
        assert!(landscape.width_pt > landscape.height_pt);
        assert_eq!(landscape.rotation, Rotation(90));

        let seascape = a4(Orientation::Seascape);
        assert!(seascape.width_pt > seascape.height_pt);
        assert_eq!(seascape.rotation, Rotation(270));
    }

    #[test]
    fn a4_in_points() {
        let g = a4(Orientation::Portrait);
        assert!((g.width_pt - 595.27).abs() < 0.01);
        assert!((g.height_pt - 841.89).abs() < 0.01);
    }

    #[test]
    fn negative_margins_widen_the_content_box() {
        let mut profile = PrinterProfile::new("P1", "lp");
        profile.margins.left = -5.0;
        let g = PageGeometry::for_profile(&profile);
        assert!(g.content_width() > g.width_pt);
    }
}
