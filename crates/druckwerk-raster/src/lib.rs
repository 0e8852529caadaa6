// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// druckwerk-raster — Raster generation for the Druckwerk printer framework.
//
// Turns decoded bitmaps and incoming PWG/Apple raster streams into printer
// scanlines: placement, rotation, integer resampling, ordered dithering, and
// bit packing, delivered through the `RasterTarget` callbacks.

pub mod dither;
pub mod engine;
pub mod header;
pub mod options;
pub mod stream;
pub mod writer;

pub use engine::{ImageRef, RasterTarget, RenderOutcome, filter_image};
pub use header::PageHeader;
pub use options::Options;
pub use stream::{PageLimits, RasterReader, Replay, process_raster_stream};
pub use writer::{RasterFormat, RasterWriter};
