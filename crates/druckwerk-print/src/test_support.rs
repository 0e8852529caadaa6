// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Shared fixtures for the scheduler, system, and server tests.

use std::io::{self, Cursor, Read, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use druckwerk_core::{
    ColorMode, DriverData, DruckwerkError, MediaCol, RasterType, Resolution, Result, SystemConfig,
};
use druckwerk_raster::{Options, PageHeader, RasterFormat, RasterWriter};
use tempfile::TempDir;

use crate::device::DeviceHandle;
use crate::driver::Driver;
use crate::events::MemoryEventSink;
use crate::job::Job;
use crate::system::System;

pub fn test_config(spool: &TempDir) -> SystemConfig {
    SystemConfig {
        spool_dir: spool.path().to_path_buf(),
        device_retry_interval_ms: 20,
        device_wait_interval_ms: 10,
        shutdown_timeout_ms: 2_000,
        ..SystemConfig::default()
    }
}

pub fn test_system_with(
    tweak: impl FnOnce(&mut SystemConfig),
) -> (Arc<System>, Arc<MemoryEventSink>, TempDir) {
    let spool = TempDir::new().expect("spool dir");
    let mut config = test_config(&spool);
    tweak(&mut config);
    let events = Arc::new(MemoryEventSink::new());
    let system = System::new(config, events.clone()).expect("system");
    (system, events, spool)
}

pub fn test_system() -> (Arc<System>, Arc<MemoryEventSink>, TempDir) {
    test_system_with(|_| {})
}

/// Poll `condition` every few milliseconds for up to five seconds.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// In-memory device contents shared with the test.
#[derive(Debug, Clone, Default)]
pub struct MemoryDevice(Arc<Mutex<Vec<u8>>>);

impl MemoryDevice {
    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Write for MemoryDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for MemoryDevice {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Ok(0)
    }
}

type PageHook = Box<dyn Fn(&Job, u32) + Send + Sync>;

/// Driver that records every callback as a short string.
#[derive(Default)]
pub struct RecordingDriver {
    pub calls: Mutex<Vec<String>>,
    /// Output header of each started page.
    pub headers: Mutex<Vec<PageHeader>>,
    /// Fail `start_page` for this page.
    pub fail_page: Option<u32>,
    /// Run after each `end_page`.
    pub after_page: Option<PageHook>,
}

impl RecordingDriver {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn record(&self, call: String) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    pub fn headers(&self) -> Vec<PageHeader> {
        self.headers.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Driver for RecordingDriver {
    fn name(&self) -> &str {
        "recording"
    }

    fn start_job(&self, job: &Job, _options: &Options, _device: &mut DeviceHandle) -> Result<()> {
        self.record(format!("start_job {}", job.id()));
        Ok(())
    }

    fn start_page(
        &self,
        _job: &Job,
        options: &Options,
        _device: &mut DeviceHandle,
        page: u32,
    ) -> Result<()> {
        if self.fail_page == Some(page) {
            return Err(DruckwerkError::driver("start_page", "media jam"));
        }
        self.record(format!("start_page {page}"));
        self.headers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(options.header.clone());
        Ok(())
    }

    fn write_line(
        &self,
        _job: &Job,
        _options: &Options,
        device: &mut DeviceHandle,
        _y: u32,
        line: &[u8],
    ) -> Result<()> {
        device.write(line)
    }

    fn end_page(&self, job: &Job, _options: &Options, _device: &mut DeviceHandle, page: u32) -> Result<()> {
        self.record(format!("end_page {page}"));
        if let Some(hook) = &self.after_page {
            hook(job, page);
        }
        Ok(())
    }

    fn end_job(&self, job: &Job, _options: &Options, _device: &mut DeviceHandle) -> Result<()> {
        self.record(format!("end_job {}", job.id()));
        Ok(())
    }
}

/// Borderless 1in square media.
pub fn tiny_media() -> MediaCol {
    MediaCol {
        size_name: "oe_square_1x1in".into(),
        size_width: 2540,
        size_length: 2540,
        bottom_margin: 0,
        left_margin: 0,
        right_margin: 0,
        top_margin: 0,
        ..MediaCol::default()
    }
}

/// A 1in square page at 72 dpi in 8-bit gray.
pub fn tiny_header() -> PageHeader {
    PageHeader::pwg(&tiny_media(), Resolution::new(72, 72), RasterType::SGRAY_8)
}

/// A colour printer with 72 dpi tiny media and automatic colour.
pub fn tiny_color_data() -> DriverData {
    let media = tiny_media();
    DriverData {
        resolutions: vec![Resolution::new(72, 72)],
        resolution_default: Resolution::new(72, 72),
        raster_types: RasterType::SRGB_8 | RasterType::SGRAY_8,
        color_supported: ColorMode::AUTO | ColorMode::MONOCHROME | ColorMode::COLOR,
        color_default: ColorMode::AUTO,
        media: vec![media.size_name.clone()],
        left_right: 0,
        bottom_top: 0,
        media_default: media,
        ..DriverData::default()
    }
}

/// A PNG of a gray gradient.
pub fn gray_png(width: u32, height: u32) -> Vec<u8> {
    let image = image::GrayImage::from_fn(width, height, |x, y| {
        image::Luma([((x * 7 + y * 3) % 256) as u8])
    });
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}

/// A PWG document whose single page declares `height` lines but carries
/// only `lines` of them.
pub fn pwg_page_claiming(height: u32, lines: u32) -> Vec<u8> {
    let mut header = tiny_header();
    header.height = height;
    let mut writer = RasterWriter::new(Vec::new(), RasterFormat::Pwg, 1).expect("writer");
    writer.start_page(&header).expect("start page");
    let line = vec![0x40u8; header.bytes_per_line as usize];
    for _ in 0..lines {
        writer.write_line(&line).expect("line");
    }
    writer.finish().expect("finish")
}

/// A PWG raster document of `pages` tiny pages.
pub fn pwg_document(pages: u32) -> Vec<u8> {
    let header = tiny_header();
    let mut writer = RasterWriter::new(Vec::new(), RasterFormat::Pwg, pages).expect("writer");
    for page in 0..pages {
        writer.start_page(&header).expect("start page");
        for y in 0..header.height {
            let line: Vec<u8> = (0..header.bytes_per_line)
                .map(|x| ((x + y + page) % 251) as u8)
                .collect();
            writer.write_line(&line).expect("line");
        }
        writer.end_page().expect("end page");
    }
    writer.finish().expect("finish")
}
