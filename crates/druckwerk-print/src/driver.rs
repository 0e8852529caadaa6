// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Driver interface and the adapter that connects a driver to the raster
// engine for one job.

use std::fmt;
use std::sync::Arc;

use druckwerk_core::{JobState, Result};
use druckwerk_raster::{Options, RasterTarget};
use tracing::debug;

use crate::device::DeviceHandle;
use crate::events::{Event, EventSink};
use crate::job::Job;
use crate::printer::Printer;

/// A printer driver.
///
/// The raster callbacks are called in the order
/// `start_job (start_page write_line* end_page)* end_job` from the job's
/// processing thread, with no locks held. Any error aborts the job;
/// `end_job` is still attempted after a failure part way through.
pub trait Driver: Send + Sync {
    fn name(&self) -> &str;

    /// MIME type the driver sends to the device.
    fn format(&self) -> &str {
        "image/pwg-raster"
    }

    fn start_job(&self, job: &Job, options: &Options, device: &mut DeviceHandle) -> Result<()>;

    fn start_page(
        &self,
        job: &Job,
        options: &Options,
        device: &mut DeviceHandle,
        page: u32,
    ) -> Result<()>;

    fn write_line(
        &self,
        job: &Job,
        options: &Options,
        device: &mut DeviceHandle,
        y: u32,
        line: &[u8],
    ) -> Result<()>;

    fn end_page(&self, job: &Job, options: &Options, device: &mut DeviceHandle, page: u32)
    -> Result<()>;

    fn end_job(&self, job: &Job, options: &Options, device: &mut DeviceHandle) -> Result<()>;

    /// Keep the device open between jobs while more jobs are queued.
    fn keep_device_open(&self) -> bool {
        false
    }

    /// Refresh printer status (supply levels, state reasons). Called with
    /// the device opened out of band.
    fn status(&self, _printer: &Printer, _device: &mut DeviceHandle) -> Result<()> {
        Ok(())
    }
}

impl fmt::Debug for dyn Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Driver({})", self.name())
    }
}

/// Feeds engine output for one job into its driver and keeps the job's
/// progress counters current.
pub struct JobTarget<'a> {
    printer: &'a Printer,
    job: &'a Job,
    driver: Arc<dyn Driver>,
    device: &'a mut DeviceHandle,
    events: &'a dyn EventSink,
    /// Impressions completed by earlier documents of the job.
    base_impressions: u32,
    /// The job was canceled before this page started.
    skip_page: bool,
}

impl<'a> JobTarget<'a> {
    pub fn new(
        printer: &'a Printer,
        job: &'a Job,
        device: &'a mut DeviceHandle,
        events: &'a dyn EventSink,
    ) -> Self {
        Self {
            printer,
            job,
            driver: printer.driver(),
            device,
            events,
            base_impressions: job.impressions_completed(),
            skip_page: false,
        }
    }

    pub fn job(&self) -> &Job {
        self.job
    }

    pub fn device(&mut self) -> &mut DeviceHandle {
        self.device
    }

    /// Park the processing thread while the job is suspended.
    fn wait_while_stopped(&self) {
        let wait = self.printer.wait_interval();
        loop {
            let seen = self.printer.signal().generation();
            if self.job.state() != JobState::Stopped
                || self.job.is_canceled()
                || self.printer.is_shutting_down()
            {
                return;
            }
            debug!(job_id = self.job.id(), "job stopped, processing paused");
            self.printer.signal().wait_since(seen, wait);
        }
    }
}

impl RasterTarget for JobTarget<'_> {
    fn start_job(&mut self, options: &Options) -> Result<()> {
        self.driver.start_job(self.job, options, self.device)
    }

    fn start_page(&mut self, options: &Options, page: u32) -> Result<()> {
        self.wait_while_stopped();
        if self.job.is_canceled() {
            debug!(job_id = self.job.id(), page, "job canceled, page skipped");
            self.skip_page = true;
            return Ok(());
        }
        self.job.set_impressions(self.base_impressions + page);
        self.driver.start_page(self.job, options, self.device, page)
    }

    fn write_line(&mut self, options: &Options, y: u32, line: &[u8]) -> Result<()> {
        if self.skip_page {
            return Ok(());
        }
        self.driver.write_line(self.job, options, self.device, y, line)
    }

    fn end_page(&mut self, options: &Options, page: u32) -> Result<()> {
        if std::mem::take(&mut self.skip_page) {
            return Ok(());
        }
        self.driver.end_page(self.job, options, self.device, page)?;
        let done = self.base_impressions + page;
        self.job.set_impressions_completed(done);
        self.events.notify(Event::JobProgress {
            printer: self.printer.name().to_string(),
            job_id: self.job.id(),
            impressions_completed: done,
        });
        Ok(())
    }

    fn end_job(&mut self, options: &Options) -> Result<()> {
        self.driver.end_job(self.job, options, self.device)
    }

    fn end_copy(&mut self, copies_done: u32) -> Result<()> {
        self.job.set_copies_completed(copies_done);
        Ok(())
    }
}
