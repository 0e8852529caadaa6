// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types: job/printer states, state-reason bitsets, and the IPP
// keyword-valued capability sets shared by the resolver and the drivers.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Implements keyword conversion for a bitflags type from a static table.
///
/// Each flag maps to exactly one IPP keyword. A value holding several flags
/// converts to the list of their keywords.
macro_rules! keyword_flags {
    ($ty:ty, [$(($flag:ident, $kw:literal)),+ $(,)?]) => {
        impl $ty {
            const KEYWORDS: &'static [($ty, &'static str)] = &[$((<$ty>::$flag, $kw)),+];

            /// IPP keyword of a single-flag value.
            pub fn keyword(self) -> Option<&'static str> {
                Self::KEYWORDS
                    .iter()
                    .find(|(flag, _)| *flag == self)
                    .map(|(_, kw)| *kw)
            }

            /// Parse one IPP keyword.
            pub fn from_keyword(keyword: &str) -> Option<Self> {
                Self::KEYWORDS
                    .iter()
                    .find(|(_, kw)| *kw == keyword)
                    .map(|(flag, _)| *flag)
            }

            /// Keywords of every flag set in this value, in table order.
            pub fn keywords(self) -> Vec<&'static str> {
                Self::KEYWORDS
                    .iter()
                    .filter(|(flag, _)| self.contains(*flag))
                    .map(|(_, kw)| *kw)
                    .collect()
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Job state
// ---------------------------------------------------------------------------

/// Lifecycle states of a print job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    /// Queued, waiting for the printer.
    Pending,
    /// Waiting for a release trigger (job-hold-until, authorization).
    Held,
    /// Owned by the printer's processing thread.
    Processing,
    /// Paused while pending or processing.
    Stopped,
    /// Canceled by a user or operator.
    Canceled,
    /// Stopped by the system because of an error.
    Aborted,
    /// Printed successfully.
    Completed,
}

impl JobState {
    /// IPP `job-state` enum value (RFC 8011 §5.3.7).
    pub fn ipp_enum(self) -> i32 {
        match self {
            Self::Pending => 3,
            Self::Held => 4,
            Self::Processing => 5,
            Self::Stopped => 6,
            Self::Canceled => 7,
            Self::Aborted => 8,
            Self::Completed => 9,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Held => "pending-held",
            Self::Processing => "processing",
            Self::Stopped => "processing-stopped",
            Self::Canceled => "canceled",
            Self::Aborted => "aborted",
            Self::Completed => "completed",
        }
    }

    /// Terminal states never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Canceled | Self::Aborted | Self::Completed)
    }

    /// Whether the state machine permits moving from `self` to `to`.
    pub fn can_transition(self, to: JobState) -> bool {
        use JobState::*;

        if self.is_terminal() {
            return false;
        }
        match (self, to) {
            (Held, Pending) | (Pending, Held) => true,
            (Pending, Processing) => true,
            // Requeue when the system shuts down before the device opened.
            (Processing, Pending) => true,
            (Pending | Processing, Stopped) => true,
            (Stopped, Pending | Processing) => true,
            (_, Canceled | Aborted) => true,
            (Processing, Completed) => true,
            _ => false,
        }
    }
}

/// Printer state (RFC 8011 §5.4.12).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrinterState {
    Idle,
    Processing,
    Stopped,
}

impl PrinterState {
    pub fn ipp_enum(self) -> i32 {
        match self {
            Self::Idle => 3,
            Self::Processing => 4,
            Self::Stopped => 5,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Processing => "processing",
            Self::Stopped => "stopped",
        }
    }
}

// ---------------------------------------------------------------------------
// State reasons
// ---------------------------------------------------------------------------

bitflags! {
    /// `job-state-reasons` values.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct JobReasons: u32 {
        const ABORTED_BY_SYSTEM = 1 << 0;
        const COMPRESSION_ERROR = 1 << 1;
        const DOCUMENT_ACCESS_ERROR = 1 << 2;
        const DOCUMENT_FORMAT_ERROR = 1 << 3;
        const DOCUMENT_PASSWORD_ERROR = 1 << 4;
        const DOCUMENT_PERMISSION_ERROR = 1 << 5;
        const DOCUMENT_SECURITY_ERROR = 1 << 6;
        const DOCUMENT_UNPRINTABLE_ERROR = 1 << 7;
        const ERRORS_DETECTED = 1 << 8;
        const JOB_CANCELED_AT_DEVICE = 1 << 9;
        const JOB_CANCELED_BY_USER = 1 << 10;
        const JOB_COMPLETED_SUCCESSFULLY = 1 << 11;
        const JOB_COMPLETED_WITH_ERRORS = 1 << 12;
        const JOB_COMPLETED_WITH_WARNINGS = 1 << 13;
        const JOB_DATA_INSUFFICIENT = 1 << 14;
        const JOB_HOLD_UNTIL_SPECIFIED = 1 << 15;
        const JOB_INCOMING = 1 << 16;
        const JOB_PRINTING = 1 << 17;
        const JOB_QUEUED = 1 << 18;
        const JOB_SPOOLING = 1 << 19;
        const JOB_STOPPED = 1 << 20;
        const JOB_TRANSFORMING = 1 << 21;
        const PRINTER_STOPPED = 1 << 22;
        const PRINTER_STOPPED_PARTLY = 1 << 23;
        const PROCESSING_TO_STOP_POINT = 1 << 24;
        const QUEUED_IN_DEVICE = 1 << 25;
        const WARNINGS_DETECTED = 1 << 26;
    }
}

keyword_flags!(JobReasons, [
    (ABORTED_BY_SYSTEM, "aborted-by-system"),
    (COMPRESSION_ERROR, "compression-error"),
    (DOCUMENT_ACCESS_ERROR, "document-access-error"),
    (DOCUMENT_FORMAT_ERROR, "document-format-error"),
    (DOCUMENT_PASSWORD_ERROR, "document-password-error"),
    (DOCUMENT_PERMISSION_ERROR, "document-permission-error"),
    (DOCUMENT_SECURITY_ERROR, "document-security-error"),
    (DOCUMENT_UNPRINTABLE_ERROR, "document-unprintable-error"),
    (ERRORS_DETECTED, "errors-detected"),
    (JOB_CANCELED_AT_DEVICE, "job-canceled-at-device"),
    (JOB_CANCELED_BY_USER, "job-canceled-by-user"),
    (JOB_COMPLETED_SUCCESSFULLY, "job-completed-successfully"),
    (JOB_COMPLETED_WITH_ERRORS, "job-completed-with-errors"),
    (JOB_COMPLETED_WITH_WARNINGS, "job-completed-with-warnings"),
    (JOB_DATA_INSUFFICIENT, "job-data-insufficient"),
    (JOB_HOLD_UNTIL_SPECIFIED, "job-hold-until-specified"),
    (JOB_INCOMING, "job-incoming"),
    (JOB_PRINTING, "job-printing"),
    (JOB_QUEUED, "job-queued"),
    (JOB_SPOOLING, "job-spooling"),
    (JOB_STOPPED, "job-stopped"),
    (JOB_TRANSFORMING, "job-transforming"),
    (PRINTER_STOPPED, "printer-stopped"),
    (PRINTER_STOPPED_PARTLY, "printer-stopped-partly"),
    (PROCESSING_TO_STOP_POINT, "processing-to-stop-point"),
    (QUEUED_IN_DEVICE, "queued-in-device"),
    (WARNINGS_DETECTED, "warnings-detected"),
]);

bitflags! {
    /// `printer-state-reasons` values.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct PrinterReasons: u32 {
        const OTHER = 1 << 0;
        const COVER_OPEN = 1 << 1;
        const INPUT_TRAY_MISSING = 1 << 2;
        const MARKER_SUPPLY_EMPTY = 1 << 3;
        const MARKER_SUPPLY_LOW = 1 << 4;
        const MARKER_WASTE_ALMOST_FULL = 1 << 5;
        const MARKER_WASTE_FULL = 1 << 6;
        const MEDIA_EMPTY = 1 << 7;
        const MEDIA_JAM = 1 << 8;
        const MEDIA_LOW = 1 << 9;
        const MEDIA_NEEDED = 1 << 10;
        const MOVING_TO_PAUSED = 1 << 11;
        const OFFLINE_REPORT = 1 << 12;
        const PAUSED = 1 << 13;
        const SPOOL_AREA_FULL = 1 << 14;
        const TONER_EMPTY = 1 << 15;
        const TONER_LOW = 1 << 16;
        const DELETING = 1 << 17;
        const IDENTIFY_PRINTER_REQUESTED = 1 << 18;
    }
}

keyword_flags!(PrinterReasons, [
    (OTHER, "other"),
    (COVER_OPEN, "cover-open"),
    (INPUT_TRAY_MISSING, "input-tray-missing"),
    (MARKER_SUPPLY_EMPTY, "marker-supply-empty"),
    (MARKER_SUPPLY_LOW, "marker-supply-low"),
    (MARKER_WASTE_ALMOST_FULL, "marker-waste-almost-full"),
    (MARKER_WASTE_FULL, "marker-waste-full"),
    (MEDIA_EMPTY, "media-empty"),
    (MEDIA_JAM, "media-jam"),
    (MEDIA_LOW, "media-low"),
    (MEDIA_NEEDED, "media-needed"),
    (MOVING_TO_PAUSED, "moving-to-paused"),
    (OFFLINE_REPORT, "offline-report"),
    (PAUSED, "paused"),
    (SPOOL_AREA_FULL, "spool-area-full"),
    (TONER_EMPTY, "toner-empty"),
    (TONER_LOW, "toner-low"),
    (DELETING, "deleting"),
    (IDENTIFY_PRINTER_REQUESTED, "identify-printer-requested"),
]);

// ---------------------------------------------------------------------------
// Capability sets
// ---------------------------------------------------------------------------

bitflags! {
    /// `print-color-mode` values.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ColorMode: u32 {
        const AUTO = 1 << 0;
        const AUTO_MONOCHROME = 1 << 1;
        const BI_LEVEL = 1 << 2;
        const COLOR = 1 << 3;
        const MONOCHROME = 1 << 4;
        const PROCESS_MONOCHROME = 1 << 5;
    }
}

keyword_flags!(ColorMode, [
    (AUTO, "auto"),
    (AUTO_MONOCHROME, "auto-monochrome"),
    (BI_LEVEL, "bi-level"),
    (COLOR, "color"),
    (MONOCHROME, "monochrome"),
    (PROCESS_MONOCHROME, "process-monochrome"),
]);

bitflags! {
    /// `print-content-optimize` values.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ContentOptimize: u32 {
        const AUTO = 1 << 0;
        const GRAPHIC = 1 << 1;
        const PHOTO = 1 << 2;
        const TEXT = 1 << 3;
        const TEXT_AND_GRAPHIC = 1 << 4;
    }
}

keyword_flags!(ContentOptimize, [
    (AUTO, "auto"),
    (GRAPHIC, "graphic"),
    (PHOTO, "photo"),
    (TEXT, "text"),
    (TEXT_AND_GRAPHIC, "text-and-graphic"),
]);

bitflags! {
    /// `print-scaling` values.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct Scaling: u32 {
        const AUTO = 1 << 0;
        const AUTO_FIT = 1 << 1;
        const FILL = 1 << 2;
        const FIT = 1 << 3;
        const NONE = 1 << 4;
    }
}

keyword_flags!(Scaling, [
    (AUTO, "auto"),
    (AUTO_FIT, "auto-fit"),
    (FILL, "fill"),
    (FIT, "fit"),
    (NONE, "none"),
]);

bitflags! {
    /// `sides` values.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct Sides: u32 {
        const ONE_SIDED = 1 << 0;
        const TWO_SIDED_LONG_EDGE = 1 << 1;
        const TWO_SIDED_SHORT_EDGE = 1 << 2;
    }
}

keyword_flags!(Sides, [
    (ONE_SIDED, "one-sided"),
    (TWO_SIDED_LONG_EDGE, "two-sided-long-edge"),
    (TWO_SIDED_SHORT_EDGE, "two-sided-short-edge"),
]);

bitflags! {
    /// Supported `finishings`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct Finishings: u32 {
        const PUNCH = 1 << 0;
        const STAPLE = 1 << 1;
        const TRIM = 1 << 2;
    }
}

keyword_flags!(Finishings, [
    (PUNCH, "punch"),
    (STAPLE, "staple"),
    (TRIM, "trim"),
]);

impl Finishings {
    /// IPP `finishings` enum value of a single flag.
    pub fn ipp_enum(self) -> Option<i32> {
        match self {
            f if f == Self::STAPLE => Some(4),
            f if f == Self::PUNCH => Some(5),
            f if f == Self::TRIM => Some(60),
            _ => None,
        }
    }

    pub fn from_ipp_enum(value: i32) -> Option<Self> {
        match value {
            4 => Some(Self::STAPLE),
            5 => Some(Self::PUNCH),
            60 => Some(Self::TRIM),
            _ => None,
        }
    }
}

bitflags! {
    /// Raster types a driver can consume (`pwg-raster-document-type-supported`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct RasterType: u32 {
        const ADOBE_RGB_8 = 1 << 0;
        const ADOBE_RGB_16 = 1 << 1;
        const BLACK_1 = 1 << 2;
        const BLACK_8 = 1 << 3;
        const BLACK_16 = 1 << 4;
        const CMYK_8 = 1 << 5;
        const CMYK_16 = 1 << 6;
        const RGB_8 = 1 << 7;
        const RGB_16 = 1 << 8;
        const SGRAY_8 = 1 << 9;
        const SGRAY_16 = 1 << 10;
        const SRGB_8 = 1 << 11;
        const SRGB_16 = 1 << 12;
    }
}

keyword_flags!(RasterType, [
    (ADOBE_RGB_8, "adobe-rgb_8"),
    (ADOBE_RGB_16, "adobe-rgb_16"),
    (BLACK_1, "black_1"),
    (BLACK_8, "black_8"),
    (BLACK_16, "black_16"),
    (CMYK_8, "cmyk_8"),
    (CMYK_16, "cmyk_16"),
    (RGB_8, "rgb_8"),
    (RGB_16, "rgb_16"),
    (SGRAY_8, "sgray_8"),
    (SGRAY_16, "sgray_16"),
    (SRGB_8, "srgb_8"),
    (SRGB_16, "srgb_16"),
]);

impl RasterType {
    /// All colour types.
    pub const COLOR_TYPES: RasterType = RasterType::ADOBE_RGB_8
        .union(RasterType::ADOBE_RGB_16)
        .union(RasterType::CMYK_8)
        .union(RasterType::CMYK_16)
        .union(RasterType::RGB_8)
        .union(RasterType::RGB_16)
        .union(RasterType::SRGB_8)
        .union(RasterType::SRGB_16);

    /// Bits per colour component of a single-flag value.
    pub fn bits_per_color(self) -> u32 {
        if self == Self::BLACK_1 {
            1
        } else if self.intersects(
            Self::ADOBE_RGB_16
                | Self::BLACK_16
                | Self::CMYK_16
                | Self::RGB_16
                | Self::SGRAY_16
                | Self::SRGB_16,
        ) {
            16
        } else {
            8
        }
    }
}

// ---------------------------------------------------------------------------
// Enumerated job template values
// ---------------------------------------------------------------------------

/// `print-quality` (RFC 8011 §5.2.13).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Quality {
    Draft,
    #[default]
    Normal,
    High,
}

impl Quality {
    pub fn ipp_enum(self) -> i32 {
        match self {
            Self::Draft => 3,
            Self::Normal => 4,
            Self::High => 5,
        }
    }

    pub fn from_ipp_enum(value: i32) -> Option<Self> {
        match value {
            3 => Some(Self::Draft),
            4 => Some(Self::Normal),
            5 => Some(Self::High),
            _ => None,
        }
    }
}

/// `orientation-requested` (RFC 8011 §5.2.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Orientation {
    /// Let the renderer choose from the content aspect ratio.
    #[default]
    None,
    Portrait,
    Landscape,
    ReverseLandscape,
    ReversePortrait,
}

impl Orientation {
    pub fn ipp_enum(self) -> i32 {
        match self {
            Self::Portrait => 3,
            Self::Landscape => 4,
            Self::ReverseLandscape => 5,
            Self::ReversePortrait => 6,
            Self::None => 7,
        }
    }

    pub fn from_ipp_enum(value: i32) -> Option<Self> {
        match value {
            3 => Some(Self::Portrait),
            4 => Some(Self::Landscape),
            5 => Some(Self::ReverseLandscape),
            6 => Some(Self::ReversePortrait),
            7 => Some(Self::None),
            _ => None,
        }
    }
}

/// Device resolution in dots per inch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub x: u32,
    pub y: u32,
}

impl Resolution {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::new(300, 300)
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.x == self.y {
            write!(f, "{}dpi", self.x)
        } else {
            write!(f, "{}x{}dpi", self.x, self.y)
        }
    }
}

/// A 16x16 ordered-dither threshold matrix, indexed `[y & 15][x & 15]`.
pub type Dither = [[u8; 16]; 16];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_sticky() {
        for terminal in [JobState::Canceled, JobState::Aborted, JobState::Completed] {
            for to in [
                JobState::Pending,
                JobState::Held,
                JobState::Processing,
                JobState::Stopped,
                JobState::Completed,
            ] {
                assert!(!terminal.can_transition(to), "{terminal:?} -> {to:?}");
            }
        }
    }

    #[test]
    fn completion_only_from_processing() {
        assert!(JobState::Processing.can_transition(JobState::Completed));
        assert!(!JobState::Pending.can_transition(JobState::Completed));
        assert!(!JobState::Held.can_transition(JobState::Processing));
    }

    #[test]
    fn reasons_render_keywords_in_table_order() {
        let reasons = JobReasons::JOB_PRINTING | JobReasons::ABORTED_BY_SYSTEM;
        assert_eq!(reasons.keywords(), vec!["aborted-by-system", "job-printing"]);
        assert!(JobReasons::empty().keywords().is_empty());
    }

    #[test]
    fn raster_type_keywords_roundtrip() {
        assert_eq!(
            RasterType::from_keyword("adobe-rgb_8"),
            Some(RasterType::ADOBE_RGB_8)
        );
        assert_eq!(RasterType::SGRAY_8.keyword(), Some("sgray_8"));
        assert_eq!(RasterType::BLACK_1.bits_per_color(), 1);
        assert_eq!(RasterType::SRGB_16.bits_per_color(), 16);
        assert!(RasterType::COLOR_TYPES.contains(RasterType::SRGB_8));
        assert!(!RasterType::COLOR_TYPES.contains(RasterType::SGRAY_8));
    }

    #[test]
    fn unknown_keyword_is_none() {
        assert_eq!(ColorMode::from_keyword("sepia"), None);
        assert_eq!(ColorMode::COLOR.keyword(), Some("color"));
        assert_eq!((ColorMode::COLOR | ColorMode::AUTO).keyword(), None);
    }

    #[test]
    fn orientation_enum_values() {
        assert_eq!(Orientation::from_ipp_enum(4), Some(Orientation::Landscape));
        assert_eq!(Orientation::ReversePortrait.ipp_enum(), 6);
        assert_eq!(Orientation::from_ipp_enum(42), None);
    }
}
