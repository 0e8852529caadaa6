// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Driver capabilities and printer defaults (`*-supported` / `*-default`).

use serde::{Deserialize, Serialize};

use crate::media::MediaCol;
use crate::types::{
    ColorMode, ContentOptimize, Dither, Finishings, Orientation, Quality, RasterType,
    Resolution, Scaling, Sides,
};

/// Everything a driver declares about a printer, plus the printer's
/// configurable defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverData {
    pub make_and_model: String,
    /// MIME type the device consumes natively (`image/pwg-raster`, ...).
    pub format: String,
    pub ppm: u32,
    pub ppm_color: u32,

    // -- Raster capabilities --
    pub resolutions: Vec<Resolution>,
    pub resolution_default: Resolution,
    pub raster_types: RasterType,
    /// Single raster type the driver always wants, or empty.
    pub force_raster_type: RasterType,
    /// Dither table for graphics/text content; `None` selects the built-in
    /// clustered-dot matrix.
    pub gdither: Option<Dither>,
    /// Dither table for photos; `None` selects the built-in Bayer matrix.
    pub pdither: Option<Dither>,

    // -- Job template capabilities and defaults --
    pub color_supported: ColorMode,
    pub color_default: ColorMode,
    pub content_default: ContentOptimize,
    pub quality_default: Quality,
    pub scaling_default: Scaling,
    pub sides_supported: Sides,
    pub sides_default: Sides,
    pub finishings: Finishings,
    pub orient_default: Orientation,
    /// Hardware copy limit; `1` means the engine repeats the document.
    pub copies_supported: u32,
    pub copies_default: u32,

    // -- Media --
    /// Supported PWG media size names.
    pub media: Vec<String>,
    pub media_default: MediaCol,
    pub left_right: i32,
    pub bottom_top: i32,
    pub borderless: bool,
    pub sources: Vec<String>,
    pub types: Vec<String>,

    // -- Marking --
    /// Number of darkness levels, 0 when not adjustable.
    pub darkness_supported: u32,
    pub darkness_default: i32,
    /// Operator trim applied on top of `print-darkness`.
    pub darkness_configured: i32,
    /// `print-speed` range (lower, upper), `(0, 0)` when not adjustable.
    pub speed_supported: (i32, i32),
    pub speed_default: i32,

    /// Driver-specific attribute names passed through to callbacks.
    pub vendor: Vec<String>,
    /// Keep the device open between jobs.
    pub keep_device_open: bool,
}

impl DriverData {
    /// Whether any supported raster type carries colour.
    pub fn supports_color(&self) -> bool {
        self.raster_types.intersects(RasterType::COLOR_TYPES)
    }

    /// Whether `name` is a supported media size.
    pub fn supports_media(&self, name: &str) -> bool {
        self.media.iter().any(|m| m == name)
    }
}

impl Default for DriverData {
    fn default() -> Self {
        let media_default = MediaCol::default();
        Self {
            make_and_model: "Generic PWG Raster".into(),
            format: "image/pwg-raster".into(),
            ppm: 10,
            ppm_color: 0,
            resolutions: vec![Resolution::new(300, 300)],
            resolution_default: Resolution::new(300, 300),
            raster_types: RasterType::BLACK_1 | RasterType::SGRAY_8,
            force_raster_type: RasterType::empty(),
            gdither: None,
            pdither: None,
            color_supported: ColorMode::AUTO | ColorMode::MONOCHROME,
            color_default: ColorMode::MONOCHROME,
            content_default: ContentOptimize::AUTO,
            quality_default: Quality::Normal,
            scaling_default: Scaling::AUTO,
            sides_supported: Sides::ONE_SIDED,
            sides_default: Sides::ONE_SIDED,
            finishings: Finishings::empty(),
            orient_default: Orientation::None,
            copies_supported: 1,
            copies_default: 1,
            media: vec![
                "iso_a4_210x297mm".into(),
                "na_letter_8.5x11in".into(),
                "na_legal_8.5x14in".into(),
                "iso_a5_148x210mm".into(),
            ],
            left_right: media_default.left_margin,
            bottom_top: media_default.bottom_margin,
            media_default,
            borderless: false,
            sources: vec!["main".into()],
            types: vec!["stationery".into()],
            darkness_supported: 0,
            darkness_default: 0,
            darkness_configured: 0,
            speed_supported: (0, 0),
            speed_default: 0,
            vendor: Vec::new(),
            keep_device_open: false,
        }
    }
}
