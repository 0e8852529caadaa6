// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PWG raster page header (the 1796-byte `cups_page_header2_t` layout) and the
// 32-byte Apple raster page header.

use druckwerk_core::{DruckwerkError, MediaCol, Quality, RasterType, Resolution, Result, Sides};

/// Size of an encoded PWG page header.
pub const PWG_HEADER_LEN: usize = 1796;
/// Size of an encoded Apple raster page header.
pub const APPLE_HEADER_LEN: usize = 32;

/// Index of the total page count in `integer`.
pub const INT_TOTAL_PAGE_COUNT: usize = 0;
pub const INT_CROSS_FEED_TRANSFORM: usize = 1;
pub const INT_FEED_TRANSFORM: usize = 2;
/// Index of `print-quality` in `integer`.
pub const INT_PRINT_QUALITY: usize = 8;

/// `cupsColorSpace` values used by PWG and Apple raster.
pub mod color_space {
    pub const W: u32 = 0;
    pub const RGB: u32 = 1;
    pub const K: u32 = 3;
    pub const CMYK: u32 = 6;
    pub const CIELAB: u32 = 15;
    pub const SW: u32 = 18;
    pub const SRGB: u32 = 19;
    pub const ADOBE_RGB: u32 = 20;
}

/// Chunky pixels (CCC MMM YYY ...).
pub const COLOR_ORDER_CHUNKED: u32 = 0;

/// One page header. Fields mirror the on-wire record; strings are
/// NUL-padded to 64 bytes when encoded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageHeader {
    pub media_class: String,
    pub media_color: String,
    pub media_type: String,
    pub output_type: String,
    pub advance_distance: u32,
    pub advance_media: u32,
    pub collate: bool,
    pub cut_media: u32,
    pub duplex: bool,
    pub hw_resolution: [u32; 2],
    pub imaging_bbox: [u32; 4],
    pub insert_sheet: bool,
    pub jog: u32,
    pub leading_edge: u32,
    pub margins: [u32; 2],
    pub manual_feed: bool,
    pub media_position: u32,
    pub media_weight: u32,
    pub mirror_print: bool,
    pub negative_print: bool,
    pub num_copies: u32,
    pub orientation: u32,
    pub output_face_up: bool,
    /// Page size in points.
    pub page_size: [u32; 2],
    pub separations: bool,
    pub tray_switch: bool,
    pub tumble: bool,
    /// Width in pixels.
    pub width: u32,
    /// Height in lines.
    pub height: u32,
    pub media_type_num: u32,
    pub bits_per_color: u32,
    pub bits_per_pixel: u32,
    pub bytes_per_line: u32,
    pub color_order: u32,
    pub color_space: u32,
    pub compression: u32,
    pub row_count: u32,
    pub row_feed: u32,
    pub row_step: u32,
    pub num_colors: u32,
    pub borderless_scaling_factor: f32,
    pub cups_page_size: [f32; 2],
    pub cups_imaging_bbox: [f32; 4],
    pub integer: [u32; 16],
    pub real: [f32; 16],
    pub string: [String; 16],
    pub marker_type: String,
    pub rendering_intent: String,
    pub page_size_name: String,
}

impl PageHeader {
    /// Header for one page of `media` at `resolution` in `raster_type`.
    pub fn pwg(media: &MediaCol, resolution: Resolution, raster_type: RasterType) -> Self {
        let (bits_per_color, num_colors, color_space) = pixel_format(raster_type);

        let width = scale(media.size_width, resolution.x);
        let height = scale(media.size_length, resolution.y);
        let bits_per_pixel = bits_per_color * num_colors;
        let page_size = [media.width_points(), media.length_points()];

        let mut header = Self {
            media_class: "PwgRaster".into(),
            media_type: media.media_type.clone(),
            hw_resolution: [resolution.x, resolution.y],
            num_copies: 1,
            page_size,
            width,
            height,
            bits_per_color,
            bits_per_pixel,
            bytes_per_line: (width * bits_per_pixel).div_ceil(8),
            color_order: COLOR_ORDER_CHUNKED,
            color_space,
            num_colors,
            cups_page_size: [page_size[0] as f32, page_size[1] as f32],
            page_size_name: media.size_name.clone(),
            rendering_intent: "auto".into(),
            ..Self::default()
        };
        header.integer[INT_CROSS_FEED_TRANSFORM] = 1;
        header.integer[INT_FEED_TRANSFORM] = 1;
        header.integer[INT_PRINT_QUALITY] = Quality::Normal.ipp_enum() as u32;
        header
    }

    /// Copy of this header re-described as `raster_type`, keeping geometry.
    pub fn with_raster_type(&self, raster_type: RasterType) -> Self {
        let (bits_per_color, num_colors, color_space) = pixel_format(raster_type);
        Self {
            bits_per_color,
            bits_per_pixel: bits_per_color * num_colors,
            bytes_per_line: (self.width * bits_per_color * num_colors).div_ceil(8),
            color_space,
            num_colors,
            ..self.clone()
        }
    }

    /// Apply `sides` to the duplex/tumble fields.
    pub fn set_sides(&mut self, sides: Sides) {
        self.duplex = sides != Sides::ONE_SIDED && !sides.is_empty();
        self.tumble = sides == Sides::TWO_SIDED_SHORT_EDGE;
    }

    pub fn total_page_count(&self) -> u32 {
        self.integer[INT_TOTAL_PAGE_COUNT]
    }

    pub fn set_total_page_count(&mut self, pages: u32) {
        self.integer[INT_TOTAL_PAGE_COUNT] = pages;
    }

    pub fn set_quality(&mut self, quality: Quality) {
        self.integer[INT_PRINT_QUALITY] = quality.ipp_enum() as u32;
    }

    /// Bytes per pixel as the run-length codec counts them (at least one).
    pub fn bytes_per_pixel(&self) -> usize {
        (self.bits_per_pixel as usize).div_ceil(8).max(1)
    }

    /// Whether pixels carry colour.
    pub fn is_color(&self) -> bool {
        self.num_colors > 1
    }

    /// Byte value of a blank (unmarked) sample in this colour space.
    pub fn blank_byte(&self) -> u8 {
        match self.color_space {
            color_space::W
            | color_space::RGB
            | color_space::SW
            | color_space::SRGB
            | color_space::ADOBE_RGB => 0xFF,
            _ => 0x00,
        }
    }

    /// Raster type this header describes, if it is a PWG type.
    pub fn raster_type(&self) -> Option<RasterType> {
        let t = match (self.color_space, self.bits_per_color, self.num_colors) {
            (color_space::K, 1, 1) => RasterType::BLACK_1,
            (color_space::K, 8, 1) => RasterType::BLACK_8,
            (color_space::K, 16, 1) => RasterType::BLACK_16,
            (color_space::SW | color_space::W, 8, 1) => RasterType::SGRAY_8,
            (color_space::SW | color_space::W, 16, 1) => RasterType::SGRAY_16,
            (color_space::SRGB, 8, 3) => RasterType::SRGB_8,
            (color_space::SRGB, 16, 3) => RasterType::SRGB_16,
            (color_space::ADOBE_RGB, 8, 3) => RasterType::ADOBE_RGB_8,
            (color_space::ADOBE_RGB, 16, 3) => RasterType::ADOBE_RGB_16,
            (color_space::RGB, 8, 3) => RasterType::RGB_8,
            (color_space::RGB, 16, 3) => RasterType::RGB_16,
            (color_space::CMYK, 8, 4) => RasterType::CMYK_8,
            (color_space::CMYK, 16, 4) => RasterType::CMYK_16,
            _ => return None,
        };
        Some(t)
    }

    /// Check the fields the pipeline relies on.
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.bits_per_color, 1 | 8 | 16) {
            return Err(DruckwerkError::DocumentFormat(format!(
                "unsupported bits per color {}",
                self.bits_per_color
            )));
        }
        if self.color_order != COLOR_ORDER_CHUNKED {
            return Err(DruckwerkError::DocumentFormat(format!(
                "unsupported color order {}",
                self.color_order
            )));
        }
        if self.width == 0 || self.height == 0 {
            return Err(DruckwerkError::DocumentFormat("empty page".into()));
        }
        let expected = (u64::from(self.width) * u64::from(self.bits_per_pixel)).div_ceil(8);
        if u64::from(self.bytes_per_line) != expected {
            return Err(DruckwerkError::DocumentFormat(format!(
                "bytes per line {} does not match {} pixels at {} bits",
                self.bytes_per_line, self.width, self.bits_per_pixel
            )));
        }
        Ok(())
    }

    // -- PWG encoding ---------------------------------------------------------

    /// Encode as a big-endian PWG page header.
    pub fn encode_pwg(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(PWG_HEADER_LEN);
        put_str(&mut out, &self.media_class);
        put_str(&mut out, &self.media_color);
        put_str(&mut out, &self.media_type);
        put_str(&mut out, &self.output_type);
        put_u32(&mut out, self.advance_distance);
        put_u32(&mut out, self.advance_media);
        put_bool(&mut out, self.collate);
        put_u32(&mut out, self.cut_media);
        put_bool(&mut out, self.duplex);
        self.hw_resolution.iter().for_each(|v| put_u32(&mut out, *v));
        self.imaging_bbox.iter().for_each(|v| put_u32(&mut out, *v));
        put_bool(&mut out, self.insert_sheet);
        put_u32(&mut out, self.jog);
        put_u32(&mut out, self.leading_edge);
        self.margins.iter().for_each(|v| put_u32(&mut out, *v));
        put_bool(&mut out, self.manual_feed);
        put_u32(&mut out, self.media_position);
        put_u32(&mut out, self.media_weight);
        put_bool(&mut out, self.mirror_print);
        put_bool(&mut out, self.negative_print);
        put_u32(&mut out, self.num_copies);
        put_u32(&mut out, self.orientation);
        put_bool(&mut out, self.output_face_up);
        self.page_size.iter().for_each(|v| put_u32(&mut out, *v));
        put_bool(&mut out, self.separations);
        put_bool(&mut out, self.tray_switch);
        put_bool(&mut out, self.tumble);
        for v in [
            self.width,
            self.height,
            self.media_type_num,
            self.bits_per_color,
            self.bits_per_pixel,
            self.bytes_per_line,
            self.color_order,
            self.color_space,
            self.compression,
            self.row_count,
            self.row_feed,
            self.row_step,
            self.num_colors,
        ] {
            put_u32(&mut out, v);
        }
        put_f32(&mut out, self.borderless_scaling_factor);
        self.cups_page_size.iter().for_each(|v| put_f32(&mut out, *v));
        self.cups_imaging_bbox.iter().for_each(|v| put_f32(&mut out, *v));
        self.integer.iter().for_each(|v| put_u32(&mut out, *v));
        self.real.iter().for_each(|v| put_f32(&mut out, *v));
        self.string.iter().for_each(|s| put_str(&mut out, s));
        put_str(&mut out, &self.marker_type);
        put_str(&mut out, &self.rendering_intent);
        put_str(&mut out, &self.page_size_name);
        debug_assert_eq!(out.len(), PWG_HEADER_LEN);
        out
    }

    /// Decode a big-endian PWG page header.
    pub fn decode_pwg(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < PWG_HEADER_LEN {
            return Err(DruckwerkError::DocumentFormat(format!(
                "page header truncated at {} bytes",
                bytes.len()
            )));
        }
        let mut r = Cursor { bytes, pos: 0 };
        let mut h = Self {
            media_class: r.str(),
            media_color: r.str(),
            media_type: r.str(),
            output_type: r.str(),
            advance_distance: r.u32(),
            advance_media: r.u32(),
            collate: r.bool(),
            cut_media: r.u32(),
            duplex: r.bool(),
            hw_resolution: [r.u32(), r.u32()],
            imaging_bbox: [r.u32(), r.u32(), r.u32(), r.u32()],
            insert_sheet: r.bool(),
            jog: r.u32(),
            leading_edge: r.u32(),
            margins: [r.u32(), r.u32()],
            manual_feed: r.bool(),
            media_position: r.u32(),
            media_weight: r.u32(),
            mirror_print: r.bool(),
            negative_print: r.bool(),
            num_copies: r.u32(),
            orientation: r.u32(),
            output_face_up: r.bool(),
            page_size: [r.u32(), r.u32()],
            separations: r.bool(),
            tray_switch: r.bool(),
            tumble: r.bool(),
            width: r.u32(),
            height: r.u32(),
            media_type_num: r.u32(),
            bits_per_color: r.u32(),
            bits_per_pixel: r.u32(),
            bytes_per_line: r.u32(),
            color_order: r.u32(),
            color_space: r.u32(),
            compression: r.u32(),
            row_count: r.u32(),
            row_feed: r.u32(),
            row_step: r.u32(),
            num_colors: r.u32(),
            borderless_scaling_factor: r.f32(),
            cups_page_size: [r.f32(), r.f32()],
            cups_imaging_bbox: [r.f32(), r.f32(), r.f32(), r.f32()],
            ..Self::default()
        };
        for v in h.integer.iter_mut() {
            *v = r.u32();
        }
        for v in h.real.iter_mut() {
            *v = r.f32();
        }
        for s in h.string.iter_mut() {
            *s = r.str();
        }
        h.marker_type = r.str();
        h.rendering_intent = r.str();
        h.page_size_name = r.str();
        Ok(h)
    }

    // -- Apple raster ---------------------------------------------------------

    /// Encode as a 32-byte Apple raster page header.
    pub fn encode_apple(&self) -> [u8; APPLE_HEADER_LEN] {
        let mut out = [0u8; APPLE_HEADER_LEN];
        out[0] = self.bits_per_pixel as u8;
        out[1] = match self.color_space {
            color_space::SRGB => 1,
            color_space::CIELAB => 2,
            color_space::ADOBE_RGB => 3,
            color_space::W => 4,
            color_space::RGB => 5,
            color_space::CMYK => 6,
            _ => 0,
        };
        out[2] = match (self.duplex, self.tumble) {
            (false, _) => 1,
            (true, true) => 2,
            (true, false) => 3,
        };
        out[3] = self.integer[INT_PRINT_QUALITY] as u8;
        out[5] = self.media_position as u8;
        out[12..16].copy_from_slice(&self.width.to_be_bytes());
        out[16..20].copy_from_slice(&self.height.to_be_bytes());
        out[20..24].copy_from_slice(&self.hw_resolution[0].to_be_bytes());
        out
    }

    /// Decode a 32-byte Apple raster page header into PWG terms.
    pub fn decode_apple(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < APPLE_HEADER_LEN {
            return Err(DruckwerkError::DocumentFormat(
                "Apple raster page header truncated".into(),
            ));
        }
        let be = |at: usize| u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);

        let bits_per_pixel = u32::from(bytes[0]);
        let (color_space, num_colors) = match bytes[1] {
            0 => (color_space::SW, 1),
            1 => (color_space::SRGB, 3),
            2 => (color_space::CIELAB, 3),
            3 => (color_space::ADOBE_RGB, 3),
            4 => (color_space::W, 1),
            5 => (color_space::RGB, 3),
            6 => (color_space::CMYK, 4),
            other => {
                return Err(DruckwerkError::DocumentFormat(format!(
                    "unknown Apple raster color space {other}"
                )));
            }
        };
        let width = be(12);
        let height = be(16);
        let resolution = be(20);
        if resolution == 0 {
            return Err(DruckwerkError::DocumentFormat(
                "Apple raster resolution is zero".into(),
            ));
        }

        let mut h = Self {
            media_class: "PwgRaster".into(),
            duplex: bytes[2] >= 2,
            tumble: bytes[2] == 2,
            hw_resolution: [resolution, resolution],
            media_position: u32::from(bytes[5]),
            num_copies: 1,
            page_size: [width * 72 / resolution, height * 72 / resolution],
            width,
            height,
            bits_per_color: bits_per_pixel / num_colors,
            bits_per_pixel,
            bytes_per_line: (width * bits_per_pixel).div_ceil(8),
            color_order: COLOR_ORDER_CHUNKED,
            color_space,
            num_colors,
            ..Self::default()
        };
        h.cups_page_size = [h.page_size[0] as f32, h.page_size[1] as f32];
        h.integer[INT_PRINT_QUALITY] = u32::from(bytes[3]);
        Ok(h)
    }
}

/// `(bits per color, colors, color space)` of a single raster type.
/// An empty or combined value describes 8-bit gray.
fn pixel_format(raster_type: RasterType) -> (u32, u32, u32) {
    match raster_type {
        t if t == RasterType::BLACK_1 => (1, 1, color_space::K),
        t if t == RasterType::BLACK_8 => (8, 1, color_space::K),
        t if t == RasterType::BLACK_16 => (16, 1, color_space::K),
        t if t == RasterType::SGRAY_16 => (16, 1, color_space::SW),
        t if t == RasterType::SRGB_8 => (8, 3, color_space::SRGB),
        t if t == RasterType::SRGB_16 => (16, 3, color_space::SRGB),
        t if t == RasterType::ADOBE_RGB_8 => (8, 3, color_space::ADOBE_RGB),
        t if t == RasterType::ADOBE_RGB_16 => (16, 3, color_space::ADOBE_RGB),
        t if t == RasterType::RGB_8 => (8, 3, color_space::RGB),
        t if t == RasterType::RGB_16 => (16, 3, color_space::RGB),
        t if t == RasterType::CMYK_8 => (8, 4, color_space::CMYK),
        t if t == RasterType::CMYK_16 => (16, 4, color_space::CMYK),
        _ => (8, 1, color_space::SW),
    }
}

/// Hundredths of millimetres to device pixels.
fn scale(hundredths: i32, dpi: u32) -> u32 {
    (i64::from(hundredths.max(0)) * i64::from(dpi) / 2540) as u32
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn put_bool(out: &mut Vec<u8>, v: bool) {
    put_u32(out, u32::from(v));
}

fn put_f32(out: &mut Vec<u8>, v: f32) {
    out.extend_from_slice(&v.to_bits().to_be_bytes());
}

fn put_str(out: &mut Vec<u8>, s: &str) {
    let mut field = [0u8; 64];
    let bytes = s.as_bytes();
    // Always leave room for the terminating NUL.
    let n = bytes.len().min(63);
    field[..n].copy_from_slice(&bytes[..n]);
    out.extend_from_slice(&field);
}

/// Sequential big-endian reader over a buffer already checked for length.
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Cursor<'_> {
    fn u32(&mut self) -> u32 {
        let b = &self.bytes[self.pos..self.pos + 4];
        self.pos += 4;
        u32::from_be_bytes([b[0], b[1], b[2], b[3]])
    }

    fn bool(&mut self) -> bool {
        self.u32() != 0
    }

    fn f32(&mut self) -> f32 {
        f32::from_bits(self.u32())
    }

    fn str(&mut self) -> String {
        let field = &self.bytes[self.pos..self.pos + 64];
        self.pos += 64;
        let end = field.iter().position(|b| *b == 0).unwrap_or(64);
        String::from_utf8_lossy(&field[..end]).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a4_header(raster_type: RasterType) -> PageHeader {
        PageHeader::pwg(&MediaCol::default(), Resolution::new(300, 300), raster_type)
    }

    #[test]
    fn a4_at_300dpi_geometry() {
        let h = a4_header(RasterType::BLACK_1);
        assert_eq!(h.width, 2480);
        assert_eq!(h.height, 3507);
        assert_eq!(h.bytes_per_line, 310);
        assert_eq!(h.page_size, [595, 842]);
        assert_eq!(h.blank_byte(), 0x00);
        assert_eq!(h.raster_type(), Some(RasterType::BLACK_1));
    }

    #[test]
    fn srgb_header_is_color_and_white_blank() {
        let h = a4_header(RasterType::SRGB_8);
        assert!(h.is_color());
        assert_eq!(h.bits_per_pixel, 24);
        assert_eq!(h.bytes_per_line, 2480 * 3);
        assert_eq!(h.blank_byte(), 0xFF);
    }

    #[test]
    fn pwg_layout_offsets() {
        let mut h = a4_header(RasterType::SGRAY_8);
        h.num_copies = 2;
        h.set_total_page_count(5);
        let bytes = h.encode_pwg();
        assert_eq!(bytes.len(), PWG_HEADER_LEN);

        let at = |off: usize| u32::from_be_bytes([bytes[off], bytes[off + 1], bytes[off + 2], bytes[off + 3]]);
        assert_eq!(at(276), 300, "HWResolution[0]");
        assert_eq!(at(340), 2, "NumCopies");
        assert_eq!(at(372), 2480, "cupsWidth");
        assert_eq!(at(392), 2480, "cupsBytesPerLine");
        assert_eq!(at(400), color_space::SW, "cupsColorSpace");
        assert_eq!(at(452), 5, "TotalPageCount");
        assert_eq!(&bytes[1732..1748], b"iso_a4_210x297mm");
        assert_eq!(&bytes[0..9], b"PwgRaster");
    }

    #[test]
    fn pwg_decode_restores_fields() {
        let mut h = a4_header(RasterType::SRGB_8);
        h.set_sides(Sides::TWO_SIDED_SHORT_EDGE);
        h.string[3] = "vendor".into();
        let decoded = PageHeader::decode_pwg(&h.encode_pwg()).expect("decode");
        assert_eq!(decoded, h);
        assert!(decoded.duplex && decoded.tumble);
    }

    #[test]
    fn apple_header_maps_to_pwg_fields() {
        let mut h = a4_header(RasterType::SRGB_8);
        h.set_quality(Quality::High);
        let bytes = h.encode_apple();
        assert_eq!(bytes[0], 24);
        assert_eq!(bytes[1], 1);

        let decoded = PageHeader::decode_apple(&bytes).expect("decode");
        assert_eq!(decoded.width, h.width);
        assert_eq!(decoded.color_space, color_space::SRGB);
        assert_eq!(decoded.bits_per_color, 8);
        assert_eq!(decoded.bytes_per_line, h.bytes_per_line);
        assert_eq!(decoded.integer[INT_PRINT_QUALITY], 5);
    }

    #[test]
    fn stride_mismatch_is_a_format_error() {
        let mut h = a4_header(RasterType::SGRAY_8);
        h.bytes_per_line += 1;
        assert!(matches!(h.validate(), Err(DruckwerkError::DocumentFormat(_))));

        let mut h = a4_header(RasterType::SGRAY_8);
        h.bits_per_color = 4;
        assert!(h.validate().is_err());
    }
}
