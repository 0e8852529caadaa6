// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Streaming PWG/Apple raster input: decode pages from a reader and feed
// them, line by line, to a raster target.

use std::io::{BufReader, ErrorKind, Read};

use druckwerk_core::{CancelToken, Dither, DruckwerkError, RasterType, Result};
use tracing::{debug, info, instrument, warn};

use crate::engine::{RasterTarget, RenderOutcome, gray_of};
use crate::header::{APPLE_HEADER_LEN, PWG_HEADER_LEN, PageHeader, color_space};
use crate::options::Options;
use crate::writer::{APPLE_SYNC, PWG_SYNC, RasterFormat};

/// Largest page a client stream may declare, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub max_width: u32,
    pub max_height: u32,
}

impl PageLimits {
    pub fn new(max_width: u32, max_height: u32) -> Self {
        Self {
            max_width,
            max_height,
        }
    }

    /// Only the limits of the header format itself.
    pub fn unbounded() -> Self {
        Self::new(u32::MAX, u32::MAX)
    }

    fn check(&self, header: &PageHeader) -> Result<()> {
        if header.width > self.max_width || header.height > self.max_height {
            return Err(DruckwerkError::DocumentUnprintable(format!(
                "raster page is {}x{}, limit {}x{}",
                header.width, header.height, self.max_width, self.max_height
            )));
        }
        Ok(())
    }
}

impl Default for PageLimits {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// Decoder for a PWG or Apple raster stream.
pub struct RasterReader<R: Read> {
    inner: BufReader<R>,
    format: RasterFormat,
    limits: PageLimits,
    /// Page count from the Apple preamble.
    declared_pages: Option<u32>,
    lines_left: u32,
    repeat: u32,
    line: Vec<u8>,
    bpp: usize,
    blank: u8,
    apple_fill: bool,
    eof: bool,
}

impl<R: Read> RasterReader<R> {
    /// Read the sync word and detect the format.
    pub fn open(reader: R) -> Result<Self> {
        let mut inner = BufReader::new(reader);
        let mut sync = [0u8; 4];
        if read_full(&mut inner, &mut sync)? < sync.len() {
            return Err(DruckwerkError::DocumentFormat("raster stream is empty".into()));
        }

        let (format, declared_pages) = if &sync == PWG_SYNC {
            (RasterFormat::Pwg, None)
        } else if sync == APPLE_SYNC[..4] {
            let mut rest = [0u8; 8];
            if read_full(&mut inner, &mut rest)? < rest.len() || rest[..4] != APPLE_SYNC[4..] {
                return Err(DruckwerkError::DocumentFormat("bad Apple raster preamble".into()));
            }
            let pages = u32::from_be_bytes([rest[4], rest[5], rest[6], rest[7]]);
            (RasterFormat::Apple, Some(pages))
        } else {
            return Err(DruckwerkError::DocumentFormat(format!(
                "unknown raster sync word {sync:02x?}"
            )));
        };

        Ok(Self {
            inner,
            format,
            limits: PageLimits::unbounded(),
            declared_pages,
            lines_left: 0,
            repeat: 0,
            line: Vec::new(),
            bpp: 1,
            blank: 0,
            apple_fill: format == RasterFormat::Apple,
            eof: false,
        })
    }

    /// Reject pages larger than `limits` before their lines are buffered.
    pub fn with_limits(mut self, limits: PageLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn format(&self) -> RasterFormat {
        self.format
    }

    pub fn declared_pages(&self) -> Option<u32> {
        self.declared_pages
    }

    /// Next page header, or `None` at a clean end of stream. Unread lines of
    /// the current page are skipped.
    pub fn next_page(&mut self) -> Result<Option<PageHeader>> {
        self.skip_page()?;
        if self.eof {
            return Ok(None);
        }

        let len = match self.format {
            RasterFormat::Pwg => PWG_HEADER_LEN,
            RasterFormat::Apple => APPLE_HEADER_LEN,
        };
        let mut bytes = vec![0u8; len];
        let got = read_full(&mut self.inner, &mut bytes)?;
        if got == 0 {
            self.eof = true;
            return Ok(None);
        }
        if got < len {
            return Err(DruckwerkError::DocumentFormat(format!(
                "page header truncated at {got} of {len} bytes"
            )));
        }

        let header = match self.format {
            RasterFormat::Pwg => PageHeader::decode_pwg(&bytes)?,
            RasterFormat::Apple => PageHeader::decode_apple(&bytes)?,
        };
        header.validate()?;
        self.limits.check(&header)?;

        self.lines_left = header.height;
        self.repeat = 0;
        self.bpp = header.bytes_per_pixel();
        self.blank = header.blank_byte();
        self.line = vec![self.blank; header.bytes_per_line as usize];
        Ok(Some(header))
    }

    /// Decode the next line into `buf`. Returns `false` when the stream
    /// ended early; `buf` then holds a blank line.
    pub fn read_line(&mut self, buf: &mut [u8]) -> Result<bool> {
        if self.lines_left == 0 || self.eof {
            self.lines_left = self.lines_left.saturating_sub(1);
            buf.fill(self.blank);
            return Ok(false);
        }
        self.lines_left -= 1;

        if self.repeat > 0 {
            self.repeat -= 1;
            buf.copy_from_slice(&self.line);
            return Ok(true);
        }

        let Some(repeat) = self.read_byte()? else {
            buf.fill(self.blank);
            return Ok(false);
        };
        if !self.decode_pixels()? {
            buf.fill(self.blank);
            return Ok(false);
        }
        self.repeat = u32::from(repeat);
        buf.copy_from_slice(&self.line);
        Ok(true)
    }

    /// Discard the rest of the current page.
    pub fn skip_page(&mut self) -> Result<()> {
        let mut scratch = vec![0u8; self.line.len()];
        while self.lines_left > 0 && !self.eof {
            self.read_line(&mut scratch)?;
        }
        self.lines_left = 0;
        Ok(())
    }

    fn decode_pixels(&mut self) -> Result<bool> {
        let bpl = self.line.len();
        let bpp = self.bpp;
        let mut filled = 0;
        let mut pixel = vec![0u8; bpp];

        while filled < bpl {
            let Some(code) = self.read_byte()? else {
                return Ok(false);
            };
            if code == 128 && self.apple_fill {
                self.line[filled..].fill(self.blank);
                break;
            }
            if code < 128 {
                if read_full(&mut self.inner, &mut pixel)? < bpp {
                    self.eof = true;
                    return Ok(false);
                }
                let count = ((usize::from(code) + 1) * bpp).min(bpl - filled);
                for chunk in self.line[filled..filled + count].chunks_mut(bpp) {
                    chunk.copy_from_slice(&pixel[..chunk.len()]);
                }
                filled += count;
            } else {
                let count = ((257 - usize::from(code)) * bpp).min(bpl - filled);
                let got = read_full(&mut self.inner, &mut self.line[filled..filled + count])?;
                if got < count {
                    self.eof = true;
                    return Ok(false);
                }
                filled += count;
            }
        }
        Ok(true)
    }

    fn read_byte(&mut self) -> Result<Option<u8>> {
        let mut b = [0u8; 1];
        if read_full(&mut self.inner, &mut b)? == 0 {
            self.eof = true;
            return Ok(None);
        }
        Ok(Some(b[0]))
    }
}

/// Fill `buf` as far as the reader allows; returns the bytes read.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
    let mut got = 0;
    while got < buf.len() {
        match reader.read(&mut buf[got..]) {
            Ok(0) => break,
            Ok(n) => got += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(got)
}

/// How incoming lines become output lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Conversion {
    Copy,
    /// 8-bit gray or RGB to 1-bit black.
    Dither,
    /// 8-bit RGB to 8-bit sGray or black.
    Gray,
}

struct LinePlan {
    conversion: Conversion,
    input: PageHeader,
    output: PageHeader,
    dither: Dither,
}

impl LinePlan {
    fn new(options: &Options, input: &PageHeader) -> Result<Self> {
        let input_type = input.raster_type();
        let eight_bit_source =
            input.bits_per_color == 8 && matches!(input.num_colors, 1 | 3);
        let supported = options.raster_types_supported;

        let (conversion, output) = if options.raster_type == RasterType::BLACK_1
            && input_type != Some(RasterType::BLACK_1)
        {
            if !eight_bit_source {
                return Err(unsupported(input));
            }
            (Conversion::Dither, input.with_raster_type(RasterType::BLACK_1))
        } else if input_type.is_some_and(|t| supported.contains(t)) {
            (Conversion::Copy, input.clone())
        } else if input.bits_per_color == 8 && input.num_colors == 3 {
            let gray = if supported.contains(RasterType::SGRAY_8) {
                RasterType::SGRAY_8
            } else if supported.contains(RasterType::BLACK_8) {
                RasterType::BLACK_8
            } else {
                return Err(unsupported(input));
            };
            (Conversion::Gray, input.with_raster_type(gray))
        } else {
            return Err(unsupported(input));
        };

        Ok(Self {
            conversion,
            input: input.clone(),
            output,
            dither: options.dither,
        })
    }

    fn gray_at(&self, src: &[u8], x: usize) -> u8 {
        if self.input.num_colors == 3 {
            gray_of([src[x * 3], src[x * 3 + 1], src[x * 3 + 2]])
        } else if self.input.color_space == color_space::K {
            255 - src[x]
        } else {
            src[x]
        }
    }

    fn convert<'a>(&self, src: &'a [u8], y: u32, out: &'a mut Vec<u8>) -> &'a [u8] {
        match self.conversion {
            Conversion::Copy => src,
            Conversion::Dither => {
                out.clear();
                out.resize(self.output.bytes_per_line as usize, 0);
                let row = &self.dither[(y & 15) as usize];
                for x in 0..self.input.width as usize {
                    if self.gray_at(src, x) <= row[x & 15] {
                        out[x / 8] |= 0x80 >> (x & 7);
                    }
                }
                out
            }
            Conversion::Gray => {
                out.clear();
                let invert = self.output.color_space == color_space::K;
                out.extend((0..self.input.width as usize).map(|x| {
                    let g = self.gray_at(src, x);
                    if invert { 255 - g } else { g }
                }));
                out
            }
        }
    }
}

fn unsupported(header: &PageHeader) -> DruckwerkError {
    DruckwerkError::DocumentFormat(format!(
        "raster of {} colors at {} bits (color space {}) is not supported by this printer",
        header.num_colors, header.bits_per_color, header.color_space
    ))
}

/// Reopens a spooled document from its first byte.
pub type Replay<'a> = dyn FnMut() -> Result<Box<dyn Read>> + 'a;

/// Feed a PWG/Apple raster stream to `target`, page by page.
///
/// `resolve` is called per page with the 1-based page number and the
/// client's header, so output can follow per-page colour. Lines missing
/// from a short stream are sent as blank lines. Copies are counted per
/// `job-pages-per-set` pages, or as one copy per pass over the document.
///
/// Copies the device cannot make are produced by reading the document
/// again through `replay`; without it the document prints once.
#[instrument(skip_all)]
pub fn process_raster_stream<R: Read>(
    target: &mut dyn RasterTarget,
    reader: R,
    replay: Option<&mut Replay<'_>>,
    limits: PageLimits,
    resolve: &mut dyn FnMut(u32, &PageHeader) -> Result<Options>,
    cancel: &CancelToken,
) -> Result<RenderOutcome> {
    let raster = RasterReader::open(reader)?.with_limits(limits);
    debug!(format = ?raster.format(), declared_pages = ?raster.declared_pages(), "raster stream opened");

    let mut progress = Progress::default();
    let result = stream_document(target, raster, replay, limits, resolve, cancel, &mut progress);

    let Some(options) = progress.job_options else {
        result?;
        return Err(DruckwerkError::DocumentFormat(
            "raster stream contains no pages".into(),
        ));
    };
    let outcome = progress.outcome;
    match result {
        Ok(()) => {
            target.end_job(&options)?;
            info!(pages = outcome.pages, copies = outcome.copies, canceled = outcome.canceled, "raster stream processed");
            Ok(outcome)
        }
        Err(err) => {
            if let Err(end_err) = target.end_job(&options) {
                warn!(error = %end_err, "end_job failed after stream error");
            }
            Err(err)
        }
    }
}

#[derive(Default)]
struct Progress {
    outcome: RenderOutcome,
    /// Options of the first page; set once `start_job` has run.
    job_options: Option<Options>,
}

fn stream_document<R: Read>(
    target: &mut dyn RasterTarget,
    raster: RasterReader<R>,
    replay: Option<&mut Replay<'_>>,
    limits: PageLimits,
    resolve: &mut dyn FnMut(u32, &PageHeader) -> Result<Options>,
    cancel: &CancelToken,
    progress: &mut Progress,
) -> Result<()> {
    stream_pages(target, raster, resolve, cancel, progress)?;
    let Some(replay) = replay else {
        return Ok(());
    };
    let copies = progress
        .job_options
        .as_ref()
        .map_or(1, Options::software_copies);

    for copy in 2..=copies {
        if progress.outcome.canceled || cancel.is_canceled() {
            progress.outcome.canceled = true;
            break;
        }
        debug!(copy, copies, "reading raster document again");
        let raster = RasterReader::open(replay()?)?.with_limits(limits);
        stream_pages(target, raster, resolve, cancel, progress)?;
    }
    Ok(())
}

fn stream_pages<R: Read>(
    target: &mut dyn RasterTarget,
    mut raster: RasterReader<R>,
    resolve: &mut dyn FnMut(u32, &PageHeader) -> Result<Options>,
    cancel: &CancelToken,
    progress: &mut Progress,
) -> Result<()> {
    let mut page = 0u32;
    let first_impression = progress.outcome.pages;
    let mut input = Vec::new();
    let mut converted = Vec::new();

    while let Some(client) = raster.next_page()? {
        page += 1;
        if cancel.is_canceled() {
            progress.outcome.canceled = true;
            return Ok(());
        }

        let resolved = resolve(page, &client)?;
        let plan = LinePlan::new(&resolved, &client)?;
        let mut output = plan.output.clone();
        output.num_copies = resolved.header.num_copies;
        let options = resolved.with_header(output);
        if progress.job_options.is_none() {
            target.start_job(&options)?;
            progress.job_options = Some(options.clone());
        }
        let pages_per_set = progress
            .job_options
            .as_ref()
            .map_or(0, |o| o.pages_per_set);
        if !options.includes_page(page) {
            debug!(page, "page outside page-ranges skipped");
            continue;
        }

        let outcome = &mut progress.outcome;
        let impression = outcome.pages + 1;
        target.start_page(&options, impression)?;
        input.resize(client.bytes_per_line as usize, 0);
        let mut complete = true;
        for y in 0..client.height {
            if cancel.is_canceled() {
                outcome.canceled = true;
                break;
            }
            if !raster.read_line(&mut input)? && complete {
                warn!(page, line = y, declared = client.height, "raster data ended early, padding with blank lines");
                complete = false;
            }
            let line = plan.convert(&input, y, &mut converted);
            target.write_line(&options, y, line)?;
        }
        target.end_page(&options, impression)?;
        outcome.pages = impression;

        if outcome.canceled {
            return Ok(());
        }
        if pages_per_set > 0 && impression % pages_per_set == 0 {
            outcome.copies += 1;
            target.end_copy(outcome.copies)?;
        }
        if !complete {
            break;
        }
    }

    let outcome = &mut progress.outcome;
    let pages_per_set = progress
        .job_options
        .as_ref()
        .map_or(0, |o| o.pages_per_set);
    if pages_per_set == 0 && outcome.pages > first_impression {
        outcome.copies += 1;
        target.end_copy(outcome.copies)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use crate::engine::test_support::{Call, RecordingTarget};
    use crate::options::test_support::tiny_options;
    use crate::writer::RasterWriter;

    fn encode_pages(format: RasterFormat, header: &PageHeader, pages: u32, lines: u32) -> Vec<u8> {
        let mut writer = RasterWriter::new(Vec::new(), format, pages).expect("writer");
        for p in 0..pages {
            writer.start_page(header).expect("start");
            for y in 0..lines {
                let line: Vec<u8> = (0..header.bytes_per_line)
                    .map(|x| ((x + y + p) % 200) as u8)
                    .collect();
                writer.write_line(&line).expect("line");
            }
            if lines == header.height {
                writer.end_page().expect("end");
            }
        }
        writer.finish().expect("finish")
    }

    fn resolver(raster_type: RasterType) -> impl FnMut(u32, &PageHeader) -> Result<Options> {
        move |_, _| Ok(tiny_options(raster_type))
    }

    #[test]
    fn pwg_stream_passes_lines_through() {
        let header = tiny_options(RasterType::SGRAY_8).header;
        let bytes = encode_pages(RasterFormat::Pwg, &header, 2, header.height);

        let mut target = RecordingTarget::default();
        let mut resolve = resolver(RasterType::SGRAY_8);
        let outcome =
            process_raster_stream(&mut target, bytes.as_slice(), None, PageLimits::unbounded(), &mut resolve, &CancelToken::new())
                .expect("stream");

        assert_eq!(outcome, RenderOutcome { pages: 2, copies: 1, canceled: false });
        assert_eq!(target.lines.len(), 144);
        let expected: Vec<u8> = (0..72u32).map(|x| ((x + 5) % 200) as u8).collect();
        assert_eq!(target.lines[5], expected);
    }

    #[test]
    fn apple_stream_decodes_the_same_pixels() {
        let header = tiny_options(RasterType::SRGB_8).header;
        let bytes = encode_pages(RasterFormat::Apple, &header, 1, header.height);

        let mut target = RecordingTarget::default();
        let mut resolve = resolver(RasterType::SRGB_8);
        process_raster_stream(&mut target, bytes.as_slice(), None, PageLimits::unbounded(), &mut resolve, &CancelToken::new())
            .expect("stream");

        assert_eq!(target.lines.len(), 72);
        let expected: Vec<u8> = (0..216u32).map(|x| ((x + 3) % 200) as u8).collect();
        assert_eq!(target.lines[3], expected);
    }

    #[test]
    fn short_stream_is_padded_with_blank_lines() {
        // 500-line page, client stops after 200 lines.
        let mut header = tiny_options(RasterType::SGRAY_8).header;
        header.height = 500;
        let bytes = encode_pages(RasterFormat::Pwg, &header, 1, 200);

        let mut target = RecordingTarget::default();
        let mut resolve = resolver(RasterType::SGRAY_8);
        let outcome =
            process_raster_stream(&mut target, bytes.as_slice(), None, PageLimits::unbounded(), &mut resolve, &CancelToken::new())
                .expect("short stream is not an error");

        assert_eq!(outcome.pages, 1);
        assert_eq!(target.lines.len(), 500);
        assert!(target.lines[199].iter().any(|b| *b != 0xFF));
        assert!(target.lines[200..].iter().all(|l| l.iter().all(|b| *b == 0xFF)));
        assert_eq!(
            target.calls,
            vec![Call::StartJob, Call::StartPage(1), Call::EndPage(1), Call::EndCopy(1), Call::EndJob]
        );
    }

    #[test]
    fn gray_input_is_dithered_for_bilevel_drivers() {
        let header = tiny_options(RasterType::SGRAY_8).header;
        let bytes = encode_pages(RasterFormat::Pwg, &header, 1, header.height);

        let mut target = RecordingTarget::default();
        let mut resolve = resolver(RasterType::BLACK_1);
        process_raster_stream(&mut target, bytes.as_slice(), None, PageLimits::unbounded(), &mut resolve, &CancelToken::new())
            .expect("stream");

        assert_eq!(target.lines.len(), 72);
        assert!(target.lines.iter().all(|l| l.len() == 9));
        assert!(target.lines.iter().flatten().any(|b| *b != 0));
    }

    #[test]
    fn unsupported_depth_is_a_format_error() {
        let header = tiny_options(RasterType::CMYK_8).header;
        let bytes = encode_pages(RasterFormat::Pwg, &header, 1, header.height);

        let mut target = RecordingTarget::default();
        let mut resolve = resolver(RasterType::SGRAY_8);
        let err =
            process_raster_stream(&mut target, bytes.as_slice(), None, PageLimits::unbounded(), &mut resolve, &CancelToken::new())
                .unwrap_err();
        assert!(matches!(err, DruckwerkError::DocumentFormat(_)));
        assert!(target.calls.is_empty());
    }

    #[test]
    fn pages_per_set_counts_copies() {
        let header = tiny_options(RasterType::SGRAY_8).header;
        let bytes = encode_pages(RasterFormat::Pwg, &header, 4, header.height);

        let mut target = RecordingTarget::default();
        let mut resolve = |_: u32, _: &PageHeader| {
            let mut options = tiny_options(RasterType::SGRAY_8);
            options.pages_per_set = 2;
            Ok(options)
        };
        let outcome =
            process_raster_stream(&mut target, bytes.as_slice(), None, PageLimits::unbounded(), &mut resolve, &CancelToken::new())
                .expect("stream");
        assert_eq!(outcome.copies, 2);
        assert!(target.calls.contains(&Call::EndCopy(2)));
    }

    #[test]
    fn garbage_is_rejected() {
        let mut target = RecordingTarget::default();
        let mut resolve = resolver(RasterType::SGRAY_8);
        let err = process_raster_stream(
            &mut target,
            &b"%PDF-1.7"[..],
            None,
            PageLimits::unbounded(),
            &mut resolve,
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, DruckwerkError::DocumentFormat(_)));
    }

    #[test]
    fn software_copies_read_the_document_again() {
        let header = tiny_options(RasterType::SGRAY_8).header;
        let bytes = encode_pages(RasterFormat::Pwg, &header, 2, header.height);

        let mut target = RecordingTarget::default();
        let mut resolve = |_: u32, _: &PageHeader| {
            let mut options = tiny_options(RasterType::SGRAY_8);
            options.copies = 3;
            Ok(options)
        };
        let mut reopened = 0;
        let mut replay = || -> Result<Box<dyn Read>> {
            reopened += 1;
            Ok(Box::new(Cursor::new(bytes.clone())))
        };
        let outcome = process_raster_stream(
            &mut target,
            bytes.as_slice(),
            Some(&mut replay as &mut Replay<'_>),
            PageLimits::unbounded(),
            &mut resolve,
            &CancelToken::new(),
        )
        .expect("stream");

        assert_eq!(outcome, RenderOutcome { pages: 6, copies: 3, canceled: false });
        assert_eq!(reopened, 2);
        let mut expected = vec![Call::StartJob];
        for copy in 0..3 {
            for page in [copy * 2 + 1, copy * 2 + 2] {
                expected.push(Call::StartPage(page));
                expected.push(Call::EndPage(page));
            }
            expected.push(Call::EndCopy(copy + 1));
        }
        expected.push(Call::EndJob);
        assert_eq!(target.calls, expected);
    }

    #[test]
    fn hardware_copies_are_declared_in_the_output_header() {
        let header = tiny_options(RasterType::SGRAY_8).header;
        let bytes = encode_pages(RasterFormat::Pwg, &header, 1, header.height);

        let mut target = RecordingTarget::default();
        let mut resolve = |_: u32, _: &PageHeader| {
            let mut options = tiny_options(RasterType::SGRAY_8);
            options.copies = 3;
            options.header.num_copies = 3;
            Ok(options)
        };
        let mut replay = || -> Result<Box<dyn Read>> { panic!("hardware copies need no second pass") };
        let outcome = process_raster_stream(
            &mut target,
            bytes.as_slice(),
            Some(&mut replay as &mut Replay<'_>),
            PageLimits::unbounded(),
            &mut resolve,
            &CancelToken::new(),
        )
        .expect("stream");

        assert_eq!(outcome.pages, 1);
        assert_eq!(target.headers.last().map(|h| h.num_copies), Some(3));
    }

    #[test]
    fn oversized_page_is_unprintable() {
        let mut header = tiny_options(RasterType::SGRAY_8).header;
        header.height = 50_000;
        let bytes = encode_pages(RasterFormat::Pwg, &header, 1, 10);

        let mut target = RecordingTarget::default();
        let mut resolve = resolver(RasterType::SGRAY_8);
        let err = process_raster_stream(
            &mut target,
            bytes.as_slice(),
            None,
            PageLimits::new(1_000, 100),
            &mut resolve,
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, DruckwerkError::DocumentUnprintable(_)));
        assert!(target.calls.is_empty());
    }
}
