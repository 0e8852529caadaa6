// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for the raster engine: image placement and dithering
// onto a letter-size 300 dpi page, and PWG raster stream decoding.

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use druckwerk_core::{CancelToken, MediaCol, RasterType, Resolution, Result};
use druckwerk_raster::{
    ImageRef, Options, PageHeader, PageLimits, RasterFormat, RasterTarget, RasterWriter, filter_image,
    process_raster_stream,
};

/// Target that only counts bytes, so the benchmark measures the engine.
#[derive(Default)]
struct CountingTarget {
    bytes: usize,
}

impl RasterTarget for CountingTarget {
    fn start_job(&mut self, _options: &Options) -> Result<()> {
        Ok(())
    }

    fn start_page(&mut self, _options: &Options, _page: u32) -> Result<()> {
        Ok(())
    }

    fn write_line(&mut self, _options: &Options, _y: u32, line: &[u8]) -> Result<()> {
        self.bytes += line.len();
        Ok(())
    }

    fn end_page(&mut self, _options: &Options, _page: u32) -> Result<()> {
        Ok(())
    }

    fn end_job(&mut self, _options: &Options) -> Result<()> {
        Ok(())
    }
}

fn letter_options(raster_type: RasterType) -> Options {
    let media = MediaCol::from_pwg_name("na_letter_8.5x11in", 635, 1270).unwrap_or_default();
    Options::new(media, Resolution::new(300, 300), raster_type)
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

/// Dither a 640x480 gray gradient to black_1 with and without smoothing.
fn bench_filter_image(c: &mut Criterion) {
    let (width, height) = (640u32, 480u32);
    let pixels: Vec<u8> = (0..height)
        .flat_map(|y| (0..width).map(move |x| ((x + y) % 256) as u8))
        .collect();
    let options = letter_options(RasterType::BLACK_1);
    let cancel = CancelToken::new();

    for smoothing in [false, true] {
        let name = format!("filter_image black_1 (smoothing={smoothing})");
        c.bench_function(&name, |b| {
            b.iter(|| {
                let image = ImageRef::new(black_box(&pixels), width, height, 1, 0)
                    .unwrap_or_else(|e| panic!("image: {e}"));
                let mut target = CountingTarget::default();
                let outcome = filter_image(&mut target, &options, &image, smoothing, &cancel);
                black_box((outcome.is_ok(), target.bytes));
            });
        });
    }
}

/// Decode a two-page 8-bit PWG raster stream.
fn bench_raster_stream(c: &mut Criterion) {
    let options = letter_options(RasterType::SGRAY_8);
    let header: PageHeader = options.header.clone();
    let mut writer = match RasterWriter::new(Vec::new(), RasterFormat::Pwg, 2) {
        Ok(w) => w,
        Err(e) => panic!("writer: {e}"),
    };
    for _ in 0..2 {
        let started = writer.start_page(&header);
        assert!(started.is_ok());
        for y in 0..header.height {
            let line: Vec<u8> = (0..header.bytes_per_line)
                .map(|x| if (x / 64 + y / 64) % 2 == 0 { 0 } else { 255 })
                .collect();
            assert!(writer.write_line(&line).is_ok());
        }
    }
    let bytes = match writer.finish() {
        Ok(b) => b,
        Err(e) => panic!("finish: {e}"),
    };

    c.bench_function("process_raster_stream sgray_8 (2 pages)", |b| {
        b.iter(|| {
            let mut target = CountingTarget::default();
            let mut resolve = |_: u32, _: &PageHeader| Ok(options.clone());
            let outcome = process_raster_stream(
                &mut target,
                black_box(bytes.as_slice()),
                None,
                PageLimits::unbounded(),
                &mut resolve,
                &CancelToken::new(),
            );
            black_box((outcome.is_ok(), target.bytes));
        });
    });
}

criterion_group!(benches, bench_filter_image, bench_raster_stream);
criterion_main!(benches);
