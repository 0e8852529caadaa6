// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Reference driver: re-encodes every page as PWG or Apple raster for
// devices that accept it natively (IPP Everywhere and AirPrint class
// printers reached over a raw socket).

use druckwerk_core::Result;
use druckwerk_raster::writer::{APPLE_SYNC, PWG_SYNC, encode_line};
use druckwerk_raster::{Options, RasterFormat};
use tracing::debug;

use crate::device::DeviceHandle;
use crate::driver::Driver;
use crate::job::Job;

/// Stateless raster driver. Lines are sent as they arrive, each with a
/// repeat count of zero.
#[derive(Debug, Clone, Copy)]
pub struct PwgDriver {
    format: RasterFormat,
}

impl PwgDriver {
    pub fn new(format: RasterFormat) -> Self {
        Self { format }
    }
}

impl Default for PwgDriver {
    fn default() -> Self {
        Self::new(RasterFormat::Pwg)
    }
}

impl Driver for PwgDriver {
    fn name(&self) -> &str {
        match self.format {
            RasterFormat::Pwg => "pwg",
            RasterFormat::Apple => "urf",
        }
    }

    fn format(&self) -> &str {
        self.format.mime_type()
    }

    fn start_job(&self, job: &Job, options: &Options, device: &mut DeviceHandle) -> Result<()> {
        debug!(job_id = job.id(), format = self.format.mime_type(), "raster job start");
        match self.format {
            RasterFormat::Pwg => device.write(PWG_SYNC),
            RasterFormat::Apple => {
                device.write(APPLE_SYNC)?;
                let pages = options.num_pages.saturating_mul(options.copies.max(1));
                device.write(&pages.to_be_bytes())
            }
        }
    }

    fn start_page(
        &self,
        _job: &Job,
        options: &Options,
        device: &mut DeviceHandle,
        _page: u32,
    ) -> Result<()> {
        let header = &options.header;
        header.validate()?;
        match self.format {
            RasterFormat::Pwg => device.write(&header.encode_pwg()),
            RasterFormat::Apple => device.write(&header.encode_apple()),
        }
    }

    fn write_line(
        &self,
        _job: &Job,
        options: &Options,
        device: &mut DeviceHandle,
        _y: u32,
        line: &[u8],
    ) -> Result<()> {
        let mut encoded = Vec::with_capacity(line.len() + line.len() / 64 + 2);
        encoded.push(0);
        encode_line(line, options.header.bytes_per_pixel(), &mut encoded);
        device.write(&encoded)
    }

    fn end_page(
        &self,
        _job: &Job,
        _options: &Options,
        _device: &mut DeviceHandle,
        _page: u32,
    ) -> Result<()> {
        Ok(())
    }

    fn end_job(&self, job: &Job, _options: &Options, device: &mut DeviceHandle) -> Result<()> {
        device.flush()?;
        debug!(job_id = job.id(), written = device.metrics().write_bytes, "raster job end");
        Ok(())
    }
}
