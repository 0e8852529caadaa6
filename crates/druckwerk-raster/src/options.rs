// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Concrete rendering configuration consumed by the engine and by drivers.

use druckwerk_core::{
    ColorMode, ContentOptimize, Dither, Finishings, MediaCol, Orientation, Quality, RasterType,
    Resolution, Scaling, Sides,
};

use crate::dither;
use crate::header::PageHeader;

/// Flattened job options for one document (or one streamed page).
///
/// Built by the options resolver; the only change after construction is
/// swapping in a client-supplied raster header via [`Options::with_header`].
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    pub copies: u32,
    pub finishings: Finishings,
    pub media: MediaCol,
    pub orientation: Orientation,
    pub color_mode: ColorMode,
    pub content_optimize: ContentOptimize,
    pub quality: Quality,
    /// Effective darkness (-100..=100), already folded into `dither`.
    pub darkness: i32,
    pub speed: i32,
    pub resolution: Resolution,
    pub scaling: Scaling,
    pub sides: Sides,
    /// First page to print, 1-based.
    pub first_page: u32,
    /// Last page to print, inclusive. `first_page > last_page` selects nothing.
    pub last_page: u32,
    /// Raster type of `header`.
    pub raster_type: RasterType,
    /// Raster types the driver accepts.
    pub raster_types_supported: RasterType,
    pub dither: Dither,
    pub header: PageHeader,
    pub mono_header: PageHeader,
    /// Driver-declared extension attributes as name/value pairs.
    pub vendor: Vec<(String, String)>,
    pub num_pages: u32,
    /// `job-pages-per-set`, 0 when unset.
    pub pages_per_set: u32,
}

impl Options {
    /// Defaults for one page of `media` in `raster_type`: single copy,
    /// portrait fit, clustered dither, all pages.
    pub fn new(media: MediaCol, resolution: Resolution, raster_type: RasterType) -> Self {
        let header = PageHeader::pwg(&media, resolution, raster_type);
        let mono_type = if raster_type.intersects(RasterType::COLOR_TYPES) {
            RasterType::SGRAY_8
        } else {
            raster_type
        };
        let mono_header = PageHeader::pwg(&media, resolution, mono_type);
        Self {
            copies: 1,
            finishings: Finishings::empty(),
            media,
            orientation: Orientation::Portrait,
            color_mode: if mono_type == raster_type {
                ColorMode::MONOCHROME
            } else {
                ColorMode::COLOR
            },
            content_optimize: ContentOptimize::AUTO,
            quality: Quality::Normal,
            darkness: 0,
            speed: 0,
            resolution,
            scaling: Scaling::FIT,
            sides: Sides::ONE_SIDED,
            first_page: 1,
            last_page: u32::MAX,
            raster_type,
            raster_types_supported: raster_type | mono_type,
            dither: dither::clustered(),
            header,
            mono_header,
            vendor: Vec::new(),
            num_pages: 1,
            pages_per_set: 0,
        }
    }

    /// Replace the output header with one supplied by the client stream.
    pub fn with_header(mut self, header: PageHeader) -> Self {
        self.header = header;
        self
    }

    /// Options whose `header` matches the actual page content.
    pub fn for_content(&self, is_color: bool) -> Options {
        if is_color || self.header == self.mono_header {
            self.clone()
        } else {
            self.clone().with_header(self.mono_header.clone())
        }
    }

    /// Copies the engine must produce by repeating the document.
    pub fn software_copies(&self) -> u32 {
        if self.header.num_copies >= self.copies {
            1
        } else {
            self.copies.max(1)
        }
    }

    /// Whether `page` (1-based) falls inside the requested range.
    pub fn includes_page(&self, page: u32) -> bool {
        page >= self.first_page && page <= self.last_page
    }

    /// Look up a vendor attribute value.
    pub fn vendor_value(&self, name: &str) -> Option<&str> {
        self.vendor
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// 1in x 1in at 72 dpi, no margins: a 72x72 pixel page.
    pub fn tiny_options(raster_type: RasterType) -> Options {
        let media = MediaCol {
            size_name: "custom_1x1in".into(),
            size_width: 2540,
            size_length: 2540,
            bottom_margin: 0,
            left_margin: 0,
            right_margin: 0,
            top_margin: 0,
            source: String::new(),
            media_type: String::new(),
        };
        Options::new(media, Resolution::new(72, 72), raster_type)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::tiny_options;
    use super::*;

    #[test]
    fn software_copies_cover_what_hardware_cannot() {
        let mut options = tiny_options(RasterType::SGRAY_8);
        options.copies = 3;
        assert_eq!(options.software_copies(), 3);

        options.header.num_copies = 3;
        assert_eq!(options.software_copies(), 1);
    }

    #[test]
    fn mono_content_selects_mono_header() {
        let options = tiny_options(RasterType::SRGB_8);
        assert!(options.header.is_color());
        assert!(!options.for_content(false).header.is_color());
        assert!(options.for_content(true).header.is_color());
    }

    #[test]
    fn empty_page_range_includes_nothing() {
        let mut options = tiny_options(RasterType::SGRAY_8);
        options.first_page = 6;
        options.last_page = 5;
        assert!((1..=5).all(|p| !options.includes_page(p)));
    }
}
