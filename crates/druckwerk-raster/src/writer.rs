// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PWG and Apple raster encoder.
//
// Line encoding: one line-repeat byte (n + 1 identical lines), then pixel
// runs. A run byte 0..=127 repeats the next pixel n + 1 times; 129..=255
// introduces 257 - n literal pixels.

use std::io::Write;

use druckwerk_core::{DruckwerkError, Result};

use crate::header::PageHeader;

/// PWG raster sync word.
pub const PWG_SYNC: &[u8; 4] = b"RaS2";
/// Apple raster file magic.
pub const APPLE_SYNC: &[u8; 8] = b"UNIRAST\0";

/// Wire flavour of a raster stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterFormat {
    Pwg,
    Apple,
}

impl RasterFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Pwg => "image/pwg-raster",
            Self::Apple => "image/urf",
        }
    }

    pub fn from_mime_type(mime: &str) -> Option<Self> {
        match mime {
            "image/pwg-raster" => Some(Self::Pwg),
            "image/urf" => Some(Self::Apple),
            _ => None,
        }
    }
}

/// Streaming raster encoder over any `Write`.
pub struct RasterWriter<W: Write> {
    out: W,
    format: RasterFormat,
    bpp: usize,
    bytes_per_line: usize,
    blank: u8,
    lines_left: u32,
    /// Last line written, waiting for its repeat count.
    pending: Option<Vec<u8>>,
    repeats: u8,
    encoded: Vec<u8>,
}

impl<W: Write> RasterWriter<W> {
    /// Write the stream preamble. `page_count` is only recorded by Apple
    /// raster.
    pub fn new(mut out: W, format: RasterFormat, page_count: u32) -> Result<Self> {
        match format {
            RasterFormat::Pwg => out.write_all(PWG_SYNC)?,
            RasterFormat::Apple => {
                out.write_all(APPLE_SYNC)?;
                out.write_all(&page_count.to_be_bytes())?;
            }
        }
        Ok(Self {
            out,
            format,
            bpp: 1,
            bytes_per_line: 0,
            blank: 0,
            lines_left: 0,
            pending: None,
            repeats: 0,
            encoded: Vec::new(),
        })
    }

    pub fn start_page(&mut self, header: &PageHeader) -> Result<()> {
        if self.lines_left > 0 {
            self.end_page()?;
        }
        header.validate()?;
        match self.format {
            RasterFormat::Pwg => self.out.write_all(&header.encode_pwg())?,
            RasterFormat::Apple => self.out.write_all(&header.encode_apple())?,
        }
        self.bpp = header.bytes_per_pixel();
        self.bytes_per_line = header.bytes_per_line as usize;
        self.blank = header.blank_byte();
        self.lines_left = header.height;
        Ok(())
    }

    pub fn write_line(&mut self, line: &[u8]) -> Result<()> {
        if line.len() != self.bytes_per_line {
            return Err(DruckwerkError::DocumentFormat(format!(
                "line of {} bytes, page expects {}",
                line.len(),
                self.bytes_per_line
            )));
        }
        if self.lines_left == 0 {
            return Err(DruckwerkError::DocumentFormat(
                "more lines than the page header declares".into(),
            ));
        }

        match &self.pending {
            Some(prev) if prev.as_slice() == line && self.repeats < u8::MAX => {
                self.repeats += 1;
            }
            _ => {
                self.flush_pending()?;
                self.pending = Some(line.to_vec());
                self.repeats = 0;
            }
        }
        self.lines_left -= 1;
        if self.lines_left == 0 {
            self.flush_pending()?;
        }
        Ok(())
    }

    /// Pad the page to its declared height with blank lines.
    pub fn end_page(&mut self) -> Result<()> {
        if self.lines_left > 0 {
            let blank = vec![self.blank; self.bytes_per_line];
            while self.lines_left > 0 {
                self.write_line(&blank)?;
            }
        }
        self.flush_pending()
    }

    /// Flush buffered lines and return the sink. An unfinished page is left
    /// short.
    pub fn finish(mut self) -> Result<W> {
        self.flush_pending()?;
        self.out.flush()?;
        Ok(self.out)
    }

    fn flush_pending(&mut self) -> Result<()> {
        if let Some(line) = self.pending.take() {
            self.encoded.clear();
            self.encoded.push(self.repeats);
            encode_line(&line, self.bpp, &mut self.encoded);
            self.out.write_all(&self.encoded)?;
            self.repeats = 0;
        }
        Ok(())
    }
}

/// Append the pixel runs of one line.
pub fn encode_line(line: &[u8], bpp: usize, out: &mut Vec<u8>) {
    let count = line.len() / bpp;
    let px = |i: usize| &line[i * bpp..(i + 1) * bpp];

    let mut i = 0;
    while i < count {
        let mut run = 1;
        while i + run < count && run < 128 && px(i + run) == px(i) {
            run += 1;
        }
        if run > 1 {
            out.push((run - 1) as u8);
            out.extend_from_slice(px(i));
            i += run;
            continue;
        }

        let start = i;
        let mut literal = 1;
        i += 1;
        while i < count && literal < 128 {
            if i + 1 < count && px(i) == px(i + 1) {
                break;
            }
            literal += 1;
            i += 1;
        }
        if literal == 1 {
            out.push(0);
        } else {
            out.push((257 - literal) as u8);
        }
        out.extend_from_slice(&line[start * bpp..(start + literal) * bpp]);
    }
}
