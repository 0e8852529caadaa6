// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raster engine: scale, rotate, dither, and pack a decoded bitmap into
// printer scanlines.
//
// Resampling uses integer error accumulators in both axes so the same input
// always yields byte-identical output.

use druckwerk_core::{CancelToken, Dither, DruckwerkError, Orientation, Result, Scaling};
use tracing::{debug, instrument, warn};

use crate::header::PageHeader;
use crate::options::Options;

/// Receiver of rendered pages. Drivers sit behind this.
pub trait RasterTarget {
    fn start_job(&mut self, options: &Options) -> Result<()>;

    /// `page` is the 1-based impression number within the job.
    fn start_page(&mut self, options: &Options, page: u32) -> Result<()>;

    /// `line` is exactly `options.header.bytes_per_line` bytes.
    fn write_line(&mut self, options: &Options, y: u32, line: &[u8]) -> Result<()>;

    fn end_page(&mut self, options: &Options, page: u32) -> Result<()>;

    fn end_job(&mut self, options: &Options) -> Result<()>;

    /// Called after each complete copy of the document.
    fn end_copy(&mut self, _copies_done: u32) -> Result<()> {
        Ok(())
    }
}

/// A decoded bitmap: 8-bit gray (`depth == 1`) or 8-bit RGB (`depth == 3`),
/// rows top to bottom with no padding.
#[derive(Debug, Clone, Copy)]
pub struct ImageRef<'a> {
    pixels: &'a [u8],
    width: u32,
    height: u32,
    depth: u32,
    ppi: u32,
}

impl<'a> ImageRef<'a> {
    /// `ppi` is the image's native resolution, 0 when unknown.
    pub fn new(pixels: &'a [u8], width: u32, height: u32, depth: u32, ppi: u32) -> Result<Self> {
        if depth != 1 && depth != 3 {
            return Err(DruckwerkError::DocumentFormat(format!(
                "unsupported image depth {depth}"
            )));
        }
        if width == 0 || height == 0 {
            return Err(DruckwerkError::DocumentFormat("empty image".into()));
        }
        let expected = width as usize * height as usize * depth as usize;
        if pixels.len() != expected {
            return Err(DruckwerkError::DocumentFormat(format!(
                "image buffer holds {} bytes, expected {expected}",
                pixels.len()
            )));
        }
        Ok(Self {
            pixels,
            width,
            height,
            depth,
            ppi,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_color(&self) -> bool {
        self.depth == 3
    }

    fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let i = (y as usize * self.width as usize + x as usize) * self.depth as usize;
        if self.depth == 1 {
            let g = self.pixels[i];
            [g, g, g]
        } else {
            [self.pixels[i], self.pixels[i + 1], self.pixels[i + 2]]
        }
    }
}

/// What a render pass produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOutcome {
    /// Pages whose `end_page` ran.
    pub pages: u32,
    /// Complete copies produced.
    pub copies: u32,
    pub canceled: bool,
}

/// Placement of the image on the page, in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Layout {
    orientation: Orientation,
    /// Image dimensions after rotation.
    rw: u32,
    rh: u32,
    xstart: i64,
    ystart: i64,
    xsize: u32,
    ysize: u32,
}

impl Layout {
    fn compute(options: &Options, image: &ImageRef<'_>) -> Result<Self> {
        let header = &options.header;
        let (width, height) = (i64::from(header.width), i64::from(header.height));
        let (xres, yres) = (
            i64::from(header.hw_resolution[0]),
            i64::from(header.hw_resolution[1]),
        );

        let (left, top, right, bottom) = if options.scaling == Scaling::FILL {
            (0, 0, width, height)
        } else {
            let media = &options.media;
            (
                i64::from(media.left_margin) * xres / 2540,
                i64::from(media.top_margin) * yres / 2540,
                width - i64::from(media.right_margin) * xres / 2540,
                height - i64::from(media.bottom_margin) * yres / 2540,
            )
        };
        if right <= left || bottom <= top {
            return Err(DruckwerkError::DocumentUnprintable(
                "margins leave no imageable area".into(),
            ));
        }
        let (iwidth, iheight) = (right - left, bottom - top);

        let orientation = match options.orientation {
            Orientation::None => {
                if (image.width > image.height) != (iwidth > iheight) {
                    Orientation::Landscape
                } else {
                    Orientation::Portrait
                }
            }
            other => other,
        };
        let (rw, rh) = match orientation {
            Orientation::Landscape | Orientation::ReverseLandscape => (image.height, image.width),
            _ => (image.width, image.height),
        };
        let (rw64, rh64) = (i64::from(rw), i64::from(rh));

        let fit = || {
            let mut xsize = iwidth;
            let mut ysize = rh64 * iwidth / rw64;
            if ysize > iheight {
                ysize = iheight;
                xsize = rw64 * iheight / rh64;
            }
            (xsize, ysize)
        };
        let actual = || {
            let ppi = i64::from(image.ppi);
            (rw64 * xres / ppi, rh64 * yres / ppi)
        };

        let (xsize, ysize) = match options.scaling {
            s if s == Scaling::FILL => {
                let mut xsize = iwidth;
                let mut ysize = rh64 * iwidth / rw64;
                if ysize < iheight {
                    ysize = iheight;
                    xsize = rw64 * iheight / rh64;
                }
                (xsize, ysize)
            }
            s if s == Scaling::NONE && image.ppi > 0 => actual(),
            s if s == Scaling::AUTO && image.ppi > 0 => {
                let (xsize, ysize) = actual();
                if xsize <= iwidth && ysize <= iheight {
                    (xsize, ysize)
                } else {
                    fit()
                }
            }
            _ => fit(),
        };
        let (xsize, ysize) = (xsize.max(1), ysize.max(1));

        Ok(Self {
            orientation,
            rw,
            rh,
            xstart: left + (iwidth - xsize) / 2,
            ystart: top + (iheight - ysize) / 2,
            xsize: xsize as u32,
            ysize: ysize as u32,
        })
    }

    /// Source pixel for rotated coordinates `(u, v)`.
    fn source(&self, image: &ImageRef<'_>, u: u32, v: u32) -> [u8; 3] {
        let (w, h) = (image.width, image.height);
        let (sx, sy) = match self.orientation {
            Orientation::Landscape => (v, h - 1 - u),
            Orientation::ReverseLandscape => (w - 1 - v, u),
            Orientation::ReversePortrait => (w - 1 - u, h - 1 - v),
            _ => (u, v),
        };
        image.pixel(sx, sy)
    }
}

/// Render `image` onto as many pages and copies as `options` requests.
///
/// Driver failures stop the loop immediately; `end_job` is still attempted.
/// Cancellation is checked before every page and every line.
#[instrument(skip_all, fields(width = image.width, height = image.height, depth = image.depth))]
pub fn filter_image(
    target: &mut dyn RasterTarget,
    options: &Options,
    image: &ImageRef<'_>,
    smoothing: bool,
    cancel: &CancelToken,
) -> Result<RenderOutcome> {
    let options = options.for_content(image.is_color());
    let layout = Layout::compute(&options, image)?;
    debug!(
        orientation = ?layout.orientation,
        xsize = layout.xsize,
        ysize = layout.ysize,
        xstart = layout.xstart,
        ystart = layout.ystart,
        "image placed"
    );

    target.start_job(&options)?;
    match render_copies(target, &options, image, &layout, smoothing, cancel) {
        Ok(outcome) => {
            target.end_job(&options)?;
            Ok(outcome)
        }
        Err(err) => {
            if let Err(end_err) = target.end_job(&options) {
                warn!(error = %end_err, "end_job failed after render error");
            }
            Err(err)
        }
    }
}

fn render_copies(
    target: &mut dyn RasterTarget,
    options: &Options,
    image: &ImageRef<'_>,
    layout: &Layout,
    smoothing: bool,
    cancel: &CancelToken,
) -> Result<RenderOutcome> {
    let mut outcome = RenderOutcome::default();
    let header = &options.header;
    let mut line = vec![0u8; header.bytes_per_line as usize];

    for _ in 0..options.software_copies() {
        if cancel.is_canceled() {
            outcome.canceled = true;
            return Ok(outcome);
        }
        let page = outcome.pages + 1;
        target.start_page(options, page)?;
        let finished = render_page(target, options, image, layout, smoothing, cancel, &mut line)?;
        target.end_page(options, page)?;
        outcome.pages = page;
        if !finished {
            outcome.canceled = true;
            return Ok(outcome);
        }
        outcome.copies += 1;
        target.end_copy(outcome.copies)?;
    }
    Ok(outcome)
}

/// Returns `false` when canceled part way.
fn render_page(
    target: &mut dyn RasterTarget,
    options: &Options,
    image: &ImageRef<'_>,
    layout: &Layout,
    smoothing: bool,
    cancel: &CancelToken,
    line: &mut [u8],
) -> Result<bool> {
    let header = &options.header;
    let blank = header.blank_byte();
    let gray_source = !image.is_color();
    let (xsize, ysize) = (layout.xsize, layout.ysize);
    let (xstep, xmod) = (layout.rw / xsize, layout.rw % xsize);
    let (ystep, ymod) = (layout.rh / ysize, layout.rh % ysize);

    let mut v = 0u32;
    let mut verr = 0u32;
    for y in 0..header.height {
        if cancel.is_canceled() {
            return Ok(false);
        }
        line.fill(blank);

        let dy = i64::from(y) - layout.ystart;
        if dy >= 0 && dy < i64::from(ysize) {
            let mut u = 0u32;
            let mut uerr = 0u32;
            for dx in 0..xsize {
                let x = layout.xstart + i64::from(dx);
                if x >= 0 && x < i64::from(header.width) {
                    let px = if smoothing && (uerr != 0 || verr != 0) {
                        blend(image, layout, u, v, uerr * 256 / xsize, verr * 256 / ysize)
                    } else {
                        layout.source(image, u, v)
                    };
                    put_pixel(line, header, &options.dither, x as u32, y, px, gray_source);
                }
                u += xstep;
                uerr += xmod;
                if uerr >= xsize {
                    uerr -= xsize;
                    u += 1;
                }
            }

            v += ystep;
            verr += ymod;
            if verr >= ysize {
                verr -= ysize;
                v += 1;
            }
        }

        target.write_line(options, y, line)?;
    }
    Ok(true)
}

/// Bilinear blend of the four rotated-space neighbours; `fx`/`fy` in 1/256.
fn blend(image: &ImageRef<'_>, layout: &Layout, u: u32, v: u32, fx: u32, fy: u32) -> [u8; 3] {
    let u1 = (u + 1).min(layout.rw - 1);
    let v1 = (v + 1).min(layout.rh - 1);
    let p00 = layout.source(image, u, v);
    let p10 = layout.source(image, u1, v);
    let p01 = layout.source(image, u, v1);
    let p11 = layout.source(image, u1, v1);

    let mut out = [0u8; 3];
    for c in 0..3 {
        let top = u32::from(p00[c]) * (256 - fx) + u32::from(p10[c]) * fx;
        let bottom = u32::from(p01[c]) * (256 - fx) + u32::from(p11[c]) * fx;
        out[c] = ((top * (256 - fy) + bottom * fy) >> 16) as u8;
    }
    out
}

/// Luminance from RGB.
pub fn gray_of(rgb: [u8; 3]) -> u8 {
    ((u32::from(rgb[0]) * 31 + u32::from(rgb[1]) * 61 + u32::from(rgb[2]) * 8) / 100) as u8
}

/// Store one pixel at column `x` of `line` in the header's pixel format.
fn put_pixel(
    line: &mut [u8],
    header: &PageHeader,
    dither: &Dither,
    x: u32,
    y: u32,
    rgb: [u8; 3],
    gray_source: bool,
) {
    let gray = if gray_source { rgb[0] } else { gray_of(rgb) };

    if header.bits_per_pixel == 1 {
        if gray <= dither[(y & 15) as usize][(x & 15) as usize] {
            line[(x / 8) as usize] |= 0x80 >> (x & 7);
        }
        return;
    }

    let mut components = [0u8; 4];
    let count = match header.num_colors {
        1 if header.color_space == crate::header::color_space::K => {
            components[0] = 255 - gray;
            1
        }
        1 => {
            components[0] = gray;
            1
        }
        4 => {
            let (c, m, ye) = (255 - rgb[0], 255 - rgb[1], 255 - rgb[2]);
            let k = c.min(m).min(ye);
            components = [c - k, m - k, ye - k, k];
            4
        }
        _ => {
            components[..3].copy_from_slice(&rgb);
            3
        }
    };

    if header.bits_per_color == 16 {
        let base = x as usize * count * 2;
        for (i, c) in components[..count].iter().enumerate() {
            let wide = u16::from(*c) * 257;
            line[base + i * 2..base + i * 2 + 2].copy_from_slice(&wide.to_be_bytes());
        }
    } else {
        let base = x as usize * count;
        line[base..base + count].copy_from_slice(&components[..count]);
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Call log entry of a [`RecordingTarget`].
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        StartJob,
        StartPage(u32),
        EndPage(u32),
        EndCopy(u32),
        EndJob,
    }

    /// Records callbacks and scanlines; optionally fails or cancels.
    #[derive(Default)]
    pub struct RecordingTarget {
        pub calls: Vec<Call>,
        pub lines: Vec<Vec<u8>>,
        /// Output header of each started page.
        pub headers: Vec<crate::header::PageHeader>,
        pub fail_on_page: Option<u32>,
        pub cancel_after_page: Option<(u32, CancelToken)>,
    }

    impl RasterTarget for RecordingTarget {
        fn start_job(&mut self, _options: &Options) -> Result<()> {
            self.calls.push(Call::StartJob);
            Ok(())
        }

        fn start_page(&mut self, options: &Options, page: u32) -> Result<()> {
            self.calls.push(Call::StartPage(page));
            self.headers.push(options.header.clone());
            if self.fail_on_page == Some(page) {
                return Err(DruckwerkError::driver("start_page", "media jam"));
            }
            Ok(())
        }

        fn write_line(&mut self, _options: &Options, _y: u32, line: &[u8]) -> Result<()> {
            self.lines.push(line.to_vec());
            Ok(())
        }

        fn end_page(&mut self, _options: &Options, page: u32) -> Result<()> {
            self.calls.push(Call::EndPage(page));
            if let Some((after, token)) = &self.cancel_after_page {
                if *after == page {
                    token.cancel();
                }
            }
            Ok(())
        }

        fn end_job(&mut self, _options: &Options) -> Result<()> {
            self.calls.push(Call::EndJob);
            Ok(())
        }

        fn end_copy(&mut self, copies_done: u32) -> Result<()> {
            self.calls.push(Call::EndCopy(copies_done));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{Call, RecordingTarget};
    use super::*;
    use crate::options::test_support::tiny_options;
    use druckwerk_core::RasterType;

    fn gradient(width: u32, height: u32) -> Vec<u8> {
        (0..height)
            .flat_map(|y| (0..width).map(move |x| ((x * 7 + y * 13) % 256) as u8))
            .collect()
    }

    #[test]
    fn dithering_is_deterministic() {
        let pixels = gradient(100, 100);
        let image = ImageRef::new(&pixels, 100, 100, 1, 0).expect("image");
        let options = tiny_options(RasterType::BLACK_1);

        let mut first = RecordingTarget::default();
        let mut second = RecordingTarget::default();
        filter_image(&mut first, &options, &image, true, &CancelToken::new()).expect("render");
        filter_image(&mut second, &options, &image, true, &CancelToken::new()).expect("render");

        assert_eq!(first.lines.len(), 72);
        assert_eq!(first.lines, second.lines);
        assert!(first.lines.iter().all(|l| l.len() == 9));
    }

    #[test]
    fn white_image_leaves_no_marks() {
        let pixels = vec![255u8; 30 * 30];
        let image = ImageRef::new(&pixels, 30, 30, 1, 0).expect("image");
        let options = tiny_options(RasterType::BLACK_1);
        let mut target = RecordingTarget::default();
        filter_image(&mut target, &options, &image, false, &CancelToken::new()).expect("render");
        assert!(target.lines.iter().flatten().all(|b| *b == 0));
    }

    #[test]
    fn black_image_fills_the_page_at_fit() {
        let pixels = vec![0u8; 10 * 10];
        let image = ImageRef::new(&pixels, 10, 10, 1, 0).expect("image");
        let options = tiny_options(RasterType::SGRAY_8);
        let mut target = RecordingTarget::default();
        filter_image(&mut target, &options, &image, false, &CancelToken::new()).expect("render");
        assert_eq!(target.lines.len(), 72);
        assert!(target.lines.iter().flatten().all(|b| *b == 0));
    }

    #[test]
    fn wide_image_is_centred_with_blank_padding() {
        // 20x10 on a 72x72 page at portrait fit: 72x36 box starting at row 18.
        let pixels = vec![0u8; 20 * 10];
        let image = ImageRef::new(&pixels, 20, 10, 1, 0).expect("image");
        let mut options = tiny_options(RasterType::SGRAY_8);
        options.orientation = Orientation::Portrait;
        let mut target = RecordingTarget::default();
        filter_image(&mut target, &options, &image, false, &CancelToken::new()).expect("render");

        assert!(target.lines[17].iter().all(|b| *b == 0xFF));
        assert!(target.lines[18].iter().all(|b| *b == 0));
        assert!(target.lines[53].iter().all(|b| *b == 0));
        assert!(target.lines[54].iter().all(|b| *b == 0xFF));
    }

    #[test]
    fn auto_orientation_rotates_to_match_media() {
        let mut options = tiny_options(RasterType::SGRAY_8);
        options.orientation = Orientation::None;
        // The page is square, so only the image counts as wide.
        let pixels = vec![0u8; 20 * 10];
        let image = ImageRef::new(&pixels, 20, 10, 1, 0).expect("image");
        let layout = Layout::compute(&options, &image).expect("layout");
        assert_eq!(layout.orientation, Orientation::Landscape);
        assert_eq!((layout.rw, layout.rh), (10, 20));
    }

    #[test]
    fn rotation_maps_corners() {
        // 2x1 image: left pixel black, right pixel white.
        let pixels = [0u8, 255u8];
        let image = ImageRef::new(&pixels, 2, 1, 1, 0).expect("image");
        let mut options = tiny_options(RasterType::SGRAY_8);

        options.orientation = Orientation::Landscape;
        let layout = Layout::compute(&options, &image).expect("layout");
        // Rotated image is 1 wide, 2 tall; the left source pixel ends up on top.
        assert_eq!(layout.source(&image, 0, 0), [0, 0, 0]);
        assert_eq!(layout.source(&image, 0, 1), [255, 255, 255]);

        options.orientation = Orientation::ReverseLandscape;
        let layout = Layout::compute(&options, &image).expect("layout");
        assert_eq!(layout.source(&image, 0, 0), [255, 255, 255]);

        options.orientation = Orientation::ReversePortrait;
        let layout = Layout::compute(&options, &image).expect("layout");
        assert_eq!(layout.source(&image, 0, 0), [255, 255, 255]);
        assert_eq!(layout.source(&image, 1, 0), [0, 0, 0]);
    }

    #[test]
    fn software_copies_repeat_the_page_sequence() {
        let pixels = vec![128u8; 8 * 8];
        let image = ImageRef::new(&pixels, 8, 8, 1, 0).expect("image");
        let mut options = tiny_options(RasterType::SGRAY_8);
        options.copies = 3;
        let mut target = RecordingTarget::default();
        let outcome =
            filter_image(&mut target, &options, &image, false, &CancelToken::new()).expect("render");

        assert_eq!(outcome, RenderOutcome { pages: 3, copies: 3, canceled: false });
        assert_eq!(
            target.calls,
            vec![
                Call::StartJob,
                Call::StartPage(1),
                Call::EndPage(1),
                Call::EndCopy(1),
                Call::StartPage(2),
                Call::EndPage(2),
                Call::EndCopy(2),
                Call::StartPage(3),
                Call::EndPage(3),
                Call::EndCopy(3),
                Call::EndJob,
            ]
        );
    }

    #[test]
    fn cancel_between_pages_stops_new_pages() {
        let pixels = vec![0u8; 8 * 8];
        let image = ImageRef::new(&pixels, 8, 8, 1, 0).expect("image");
        let mut options = tiny_options(RasterType::SGRAY_8);
        options.copies = 5;
        let cancel = CancelToken::new();
        let mut target = RecordingTarget {
            cancel_after_page: Some((2, cancel.clone())),
            ..RecordingTarget::default()
        };
        let outcome = filter_image(&mut target, &options, &image, false, &cancel).expect("render");

        assert!(outcome.canceled);
        assert_eq!(outcome.pages, 2);
        assert!(!target.calls.contains(&Call::StartPage(3)));
        assert_eq!(target.calls.last(), Some(&Call::EndJob));
    }

    #[test]
    fn driver_failure_aborts_but_ends_job() {
        let pixels = vec![0u8; 8 * 8];
        let image = ImageRef::new(&pixels, 8, 8, 1, 0).expect("image");
        let mut options = tiny_options(RasterType::SGRAY_8);
        options.copies = 2;
        let mut target = RecordingTarget {
            fail_on_page: Some(2),
            ..RecordingTarget::default()
        };
        let err = filter_image(&mut target, &options, &image, false, &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, DruckwerkError::Driver { callback: "start_page", .. }));
        assert_eq!(target.calls.last(), Some(&Call::EndJob));
    }

    #[test]
    fn color_pixels_pack_for_each_color_space() {
        let red = [255u8, 0, 0];
        let mut line = vec![0u8; 8];

        let rgb = tiny_options(RasterType::SRGB_8).header;
        put_pixel(&mut line, &rgb, &[[0; 16]; 16], 1, 0, red, false);
        assert_eq!(&line[3..6], &[255, 0, 0]);

        let cmyk = tiny_options(RasterType::CMYK_8).header;
        put_pixel(&mut line, &cmyk, &[[0; 16]; 16], 0, 0, red, false);
        assert_eq!(&line[0..4], &[0, 255, 255, 0]);

        let black = tiny_options(RasterType::BLACK_8).header;
        put_pixel(&mut line, &black, &[[0; 16]; 16], 0, 0, [0, 0, 0], true);
        assert_eq!(line[0], 255);

        let gray16 = tiny_options(RasterType::SGRAY_16).header;
        put_pixel(&mut line, &gray16, &[[0; 16]; 16], 1, 0, [0x80; 3], true);
        assert_eq!(&line[2..4], &[0x80, 0x80]);
    }

    #[test]
    fn grayscale_image_on_color_printer_uses_mono_header() {
        let pixels = vec![0u8; 4 * 4];
        let image = ImageRef::new(&pixels, 4, 4, 1, 0).expect("image");
        let options = tiny_options(RasterType::SRGB_8);
        let mut target = RecordingTarget::default();
        filter_image(&mut target, &options, &image, false, &CancelToken::new()).expect("render");
        assert_eq!(target.lines[0].len(), 72);
    }

    #[test]
    fn bad_buffers_are_rejected() {
        assert!(ImageRef::new(&[0u8; 5], 2, 2, 1, 0).is_err());
        assert!(ImageRef::new(&[0u8; 8], 2, 2, 2, 0).is_err());
    }
}
