// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Media collection (`media-col`) and PWG 5101.1 self-describing size names.

use serde::{Deserialize, Serialize};

/// Hundredths of a millimetre per inch.
pub const HUNDREDTHS_MM_PER_INCH: i32 = 2540;

/// A resolved `media-col`: size, margins, source, and type.
///
/// All lengths are in hundredths of millimetres, as IPP transports them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaCol {
    /// PWG self-describing name (`iso_a4_210x297mm`).
    pub size_name: String,
    pub size_width: i32,
    pub size_length: i32,
    pub bottom_margin: i32,
    pub left_margin: i32,
    pub right_margin: i32,
    pub top_margin: i32,
    /// `media-source` keyword, empty when unspecified.
    pub source: String,
    /// `media-type` keyword, empty when unspecified.
    pub media_type: String,
}

impl MediaCol {
    /// Build a media record from a PWG self-describing name.
    ///
    /// The size is taken from the last `_<W>x<H><unit>` segment; margins are
    /// the caller's defaults. Returns `None` when the name carries no
    /// parsable dimensions.
    pub fn from_pwg_name(name: &str, left_right: i32, bottom_top: i32) -> Option<Self> {
        let (width, length) = parse_pwg_dimensions(name)?;
        Some(Self {
            size_name: name.to_string(),
            size_width: width,
            size_length: length,
            bottom_margin: bottom_top,
            left_margin: left_right,
            right_margin: left_right,
            top_margin: bottom_top,
            source: String::new(),
            media_type: String::new(),
        })
    }

    /// Whether all four margins are zero.
    pub fn is_borderless(&self) -> bool {
        self.bottom_margin == 0
            && self.left_margin == 0
            && self.right_margin == 0
            && self.top_margin == 0
    }

    /// Width in points (1/72 inch), rounded.
    pub fn width_points(&self) -> u32 {
        hundredths_to_points(self.size_width)
    }

    /// Length in points (1/72 inch), rounded.
    pub fn length_points(&self) -> u32 {
        hundredths_to_points(self.size_length)
    }
}

impl Default for MediaCol {
    fn default() -> Self {
        // 1/6" margins.
        Self::from_pwg_name("iso_a4_210x297mm", 423, 423).unwrap_or(Self {
            size_name: "iso_a4_210x297mm".into(),
            size_width: 21000,
            size_length: 29700,
            bottom_margin: 423,
            left_margin: 423,
            right_margin: 423,
            top_margin: 423,
            source: String::new(),
            media_type: String::new(),
        })
    }
}

fn hundredths_to_points(value: i32) -> u32 {
    ((i64::from(value.max(0)) * 72 + 1270) / 2540) as u32
}

/// Parse `<W>x<H>mm` / `<W>x<H>in` from the final segment of a PWG name.
///
/// Returns `(width, length)` in hundredths of millimetres.
pub fn parse_pwg_dimensions(name: &str) -> Option<(i32, i32)> {
    let segment = name.rsplit('_').next()?;
    let (numbers, scale) = if let Some(n) = segment.strip_suffix("mm") {
        (n, 100.0)
    } else if let Some(n) = segment.strip_suffix("in") {
        (n, f64::from(HUNDREDTHS_MM_PER_INCH))
    } else {
        return None;
    };

    let (w, h) = numbers.split_once('x')?;
    let w: f64 = w.parse().ok()?;
    let h: f64 = h.parse().ok()?;
    if !(w > 0.0 && h > 0.0) {
        return None;
    }
    Some(((w * scale).round() as i32, (h * scale).round() as i32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_names_parse() {
        assert_eq!(parse_pwg_dimensions("iso_a4_210x297mm"), Some((21000, 29700)));
        assert_eq!(parse_pwg_dimensions("iso_a6_105x148mm"), Some((10500, 14800)));
    }

    #[test]
    fn imperial_names_parse() {
        assert_eq!(parse_pwg_dimensions("na_letter_8.5x11in"), Some((21590, 27940)));
        assert_eq!(parse_pwg_dimensions("oe_4x6-label_4x6in"), Some((10160, 15240)));
    }

    #[test]
    fn names_without_dimensions_are_rejected() {
        assert_eq!(parse_pwg_dimensions("letter"), None);
        assert_eq!(parse_pwg_dimensions("custom_0x0mm"), None);
        assert!(MediaCol::from_pwg_name("roll_main", 0, 0).is_none());
    }

    #[test]
    fn default_media_is_a4_with_margins() {
        let media = MediaCol::default();
        assert_eq!(media.size_name, "iso_a4_210x297mm");
        assert_eq!(media.left_margin, 423);
        assert!(!media.is_borderless());
        assert_eq!(media.width_points(), 595);
        assert_eq!(media.length_points(), 842);
    }
}
