// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Job scheduling: picking the next job, the per-job processing thread,
// device acquisition with retry, completion, cancellation, and the
// hold/release/suspend/resume operations.
//
// At most one job per printer is processing. The processing thread holds
// no lock while the driver runs; every state change happens under the
// printer lock, and events go out after it is released.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use druckwerk_core::{
    AttributeGroup, DruckwerkError, JobReasons, JobState, PrinterReasons, PrinterState, Result,
};
use druckwerk_raster::RenderOutcome;
use tracing::{debug, error, info, instrument, warn};

use crate::device::DeviceHandle;
use crate::driver::JobTarget;
use crate::events::Event;
use crate::filter::FilterContext;
use crate::job::{Document, Job};
use crate::printer::{LockedPrinter, Printer};
use crate::system::System;

/// Reasons that only describe a job in flight.
const TRANSIENT_REASONS: JobReasons = JobReasons::JOB_PRINTING
    .union(JobReasons::JOB_QUEUED)
    .union(JobReasons::JOB_INCOMING)
    .union(JobReasons::JOB_HOLD_UNTIL_SPECIFIED)
    .union(JobReasons::PROCESSING_TO_STOP_POINT)
    .union(JobReasons::JOB_STOPPED)
    .union(JobReasons::JOB_TRANSFORMING)
    .union(JobReasons::PRINTER_STOPPED);

/// Result of waiting for the device.
pub(crate) enum StartOutcome {
    Started(DeviceHandle),
    /// Back in the queue, nothing printed.
    Requeued,
    Canceled,
}

impl Printer {
    /// Start the next pending job if the printer is free. Returns `true`
    /// when a processing thread was started.
    pub fn check_jobs(self: &Arc<Self>) -> bool {
        if self.is_shutting_down() {
            return false;
        }
        let job = {
            let mut printer = self.lock();
            if printer.is_deleted
                || printer.state == PrinterState::Stopped
                || printer.stop_pending
                || printer.processing_job.is_some()
            {
                return false;
            }
            let next = printer
                .active
                .iter()
                .filter_map(|handle| printer.job(*handle))
                .find(|job| {
                    job.state() == JobState::Pending && !job.is_streaming() && !job.is_canceled()
                });
            let Some(job) = next else {
                return false;
            };
            printer.processing_job = Some(job.handle());
            job
        };

        let worker = Arc::clone(self);
        let thread_job = Arc::clone(&job);
        let spawned = thread::Builder::new()
            .name(format!("{}-job-{}", self.name(), job.id()))
            .spawn(move || worker.process_job(thread_job));
        match spawned {
            Ok(_) => {
                debug!(printer = %self.name(), job_id = job.id(), "processing thread started");
                true
            }
            Err(err) => {
                error!(printer = %self.name(), job_id = job.id(), error = %err, "could not start processing thread");
                let mut printer = self.lock();
                if printer.processing_job == Some(job.handle()) {
                    printer.processing_job = None;
                }
                false
            }
        }
    }

    /// Body of the processing thread.
    #[instrument(skip_all, fields(printer = %self.name(), job_id = job.id()))]
    fn process_job(self: Arc<Self>, job: Arc<Job>) {
        match self.start_job(&job) {
            StartOutcome::Started(mut device) => {
                let result = self.print_documents(&job, &mut device);
                if let Err(err) = &result {
                    error!(error = %err, "job failed");
                }
                self.finish_job(&job, result.as_ref().err(), Some(device));
            }
            StartOutcome::Canceled => self.finish_job(&job, None, None),
            StartOutcome::Requeued => {
                self.check_jobs();
            }
        }
    }

    /// Wait until the printer is free and the device is open, then move
    /// the job to `processing`. An open failure stops the printer with
    /// `offline-report` and retries every `device_retry_interval`.
    pub(crate) fn start_job(&self, job: &Arc<Job>) -> StartOutcome {
        let Ok(system) = self.system() else {
            return self.requeue(job);
        };
        let mine = Some(job.handle());
        loop {
            let mut events = Vec::new();
            let mut printer = self.lock();
            if self.is_shutting_down() {
                drop(printer);
                return self.requeue(job);
            }
            if job.is_canceled() {
                return StartOutcome::Canceled;
            }
            let state = printer.lock_job(job).state();
            if state.is_terminal() {
                return StartOutcome::Canceled;
            }
            if state == JobState::Held {
                // Held again before it got the device.
                if printer.processing_job == mine {
                    printer.processing_job = None;
                }
                drop(printer);
                self.signal().notify();
                info!(job_id = job.id(), "job held before printing");
                return StartOutcome::Requeued;
            }

            let busy = (printer.processing_job.is_some() && printer.processing_job != mine)
                || (printer.state == PrinterState::Stopped
                    && printer.reasons.contains(PrinterReasons::PAUSED))
                || printer.device_in_use;
            if busy {
                let seen = self.signal().generation();
                drop(printer);
                self.signal().wait_since(seen, self.wait_interval());
                continue;
            }

            printer.processing_job = mine;
            printer.device_in_use = true;
            {
                let mut locked = printer.lock_job(job);
                if locked.state() == JobState::Pending && locked.transition(JobState::Processing).is_ok() {
                    locked.set_reasons(JobReasons::JOB_PRINTING, JobReasons::JOB_QUEUED);
                    events.push(locked.state_event());
                }
            }
            if let Some(device) = printer.device.take() {
                events.extend(printer.set_state(
                    PrinterState::Processing,
                    PrinterReasons::empty(),
                    PrinterReasons::OFFLINE_REPORT,
                ));
                drop(printer);
                self.emit(events);
                debug!(job_id = job.id(), "reusing open device");
                return StartOutcome::Started(device);
            }
            let uri = printer.device_uri.clone();
            drop(printer);
            self.emit(events);

            match DeviceHandle::open(&uri, system.devices(), Some(job.id())) {
                Ok(device) => {
                    let event = {
                        let mut printer = self.lock();
                        if std::mem::take(&mut printer.device_offline) {
                            info!(printer = %self.name(), uri, "device back online");
                        }
                        printer.set_state(
                            PrinterState::Processing,
                            PrinterReasons::empty(),
                            PrinterReasons::OFFLINE_REPORT,
                        )
                    };
                    self.emit(event.into_iter().collect());
                    info!(job_id = job.id(), uri, "device opened for job");
                    return StartOutcome::Started(device);
                }
                Err(err) => {
                    let (seen, event, first_failure) = {
                        let mut printer = self.lock();
                        printer.device_in_use = false;
                        let first_failure = !std::mem::replace(&mut printer.device_offline, true);
                        // The event goes out on every attempt, changed or not.
                        let event = printer
                            .set_state(
                                PrinterState::Stopped,
                                PrinterReasons::OFFLINE_REPORT,
                                PrinterReasons::empty(),
                            )
                            .unwrap_or_else(|| printer.state_event());
                        (self.signal().generation(), event, first_failure)
                    };
                    if first_failure {
                        warn!(printer = %self.name(), uri, error = %err, "device unavailable, retrying");
                    } else {
                        debug!(printer = %self.name(), uri, error = %err, "device still unavailable");
                    }
                    self.emit(vec![event]);
                    self.signal()
                        .wait_since(seen, system.config().device_retry_interval());
                }
            }
        }
    }

    /// Put a job that never reached the device back in the queue.
    fn requeue(&self, job: &Job) -> StartOutcome {
        let event = {
            let mut printer = self.lock();
            if printer.processing_job == Some(job.handle()) {
                printer.processing_job = None;
                printer.device_in_use = false;
            }
            let mut locked = printer.lock_job(job);
            if locked.state() == JobState::Processing && locked.transition(JobState::Pending).is_ok()
            {
                locked.set_reasons(JobReasons::JOB_QUEUED, JobReasons::JOB_PRINTING);
                Some(locked.state_event())
            } else {
                None
            }
        };
        self.signal().notify();
        self.emit(event.into_iter().collect());
        info!(printer = %self.name(), job_id = job.id(), "job requeued");
        StartOutcome::Requeued
    }

    fn print_documents(&self, job: &Job, device: &mut DeviceHandle) -> Result<()> {
        let system = self.system()?;
        for document in job.documents() {
            if job.is_canceled() {
                break;
            }
            let Some(path) = document.file.clone() else {
                continue;
            };
            let file = File::open(&path)
                .map_err(|e| DruckwerkError::Spool(format!("open {}: {e}", path.display())))?;
            let mut input = BufReader::new(file);
            self.run_document(&system, job, &document, device, &mut input)?;
        }
        Ok(())
    }

    /// Run one document through its filter into the driver.
    fn run_document(
        &self,
        system: &System,
        job: &Job,
        document: &Document,
        device: &mut DeviceHandle,
        input: &mut dyn Read,
    ) -> Result<RenderOutcome> {
        let driver = self.driver();
        let filter = system
            .filters()
            .find(&document.format, driver.format())
            .ok_or_else(|| DruckwerkError::UnsupportedFormat(document.format.clone()))?;
        let driver_data = self.driver_data();

        job.update_document(document.number, |d| d.state = JobState::Processing);
        let mut ctx = FilterContext {
            job,
            document,
            driver_data: &driver_data,
            config: system.config(),
            target: JobTarget::new(self, job, device, system.events()),
        };
        let result = filter(&mut ctx, input);

        let state = match &result {
            Ok(outcome) if outcome.canceled || job.is_canceled() => JobState::Canceled,
            Ok(_) => JobState::Completed,
            Err(_) => JobState::Aborted,
        };
        job.update_document(document.number, |d| d.state = state);
        match &result {
            Ok(outcome) => info!(
                job_id = job.id(),
                document = document.number,
                format = %document.format,
                pages = outcome.pages,
                copies = outcome.copies,
                sha256 = %document.sha256,
                ?state,
                "document processed"
            ),
            Err(err) => warn!(job_id = job.id(), document = document.number, error = %err, "document failed"),
        }
        result
    }

    /// Record a job's final state and free the printer. `device` is the
    /// handle the job printed on; it is kept for the next job when the
    /// driver asks for that and more jobs are queued.
    pub(crate) fn finish_job(
        self: &Arc<Self>,
        job: &Arc<Job>,
        failure: Option<&DruckwerkError>,
        device: Option<DeviceHandle>,
    ) {
        let max_completed = self.config().max_completed_jobs;
        let mut events = Vec::new();
        let mut close = None;
        let (mut unlink, remove, check) = {
            let mut printer = self.lock();
            let ours = printer.processing_job == Some(job.handle());
            complete_locked(&mut printer, job, failure, &mut events);
            if ours {
                printer.processing_job = None;
                printer.device_in_use = false;
                let keep = !printer.active.is_empty()
                    && !printer.is_deleted
                    && (printer.driver_data.keep_device_open || self.driver().keep_device_open());
                match device {
                    Some(device) if keep => printer.device = Some(device),
                    other => close = other,
                }
                let change = if printer.stop_pending {
                    printer.stop_pending = false;
                    printer.set_state(
                        PrinterState::Stopped,
                        PrinterReasons::PAUSED,
                        PrinterReasons::MOVING_TO_PAUSED | PrinterReasons::OFFLINE_REPORT,
                    )
                } else if printer.state == PrinterState::Stopped
                    && printer.reasons.contains(PrinterReasons::PAUSED)
                {
                    None
                } else {
                    printer.set_state(
                        PrinterState::Idle,
                        PrinterReasons::empty(),
                        PrinterReasons::OFFLINE_REPORT,
                    )
                };
                events.extend(change);
            } else {
                close = device;
            }
            let unlink = trim_history(&mut printer, max_completed);
            let remove = printer.is_deleted && printer.processing_job.is_none();
            let check = !printer.is_deleted
                && printer
                    .active
                    .iter()
                    .filter_map(|handle| printer.job(*handle))
                    .any(|job| job.state() == JobState::Pending);
            (unlink, remove, check)
        };

        if let Some(device) = close {
            let metrics = device.close();
            debug!(?metrics, "device closed");
        }
        self.signal().notify();
        self.emit(events);
        unlink.extend(job.spool_files());
        self.unlink(unlink);

        if remove {
            if let Ok(system) = self.system() {
                system.remove_printer(self.handle());
            }
        } else if check {
            self.check_jobs();
        }
    }

    fn unlink(&self, files: Vec<PathBuf>) {
        if files.is_empty() {
            return;
        }
        let Ok(system) = self.system() else {
            return;
        };
        for path in files {
            if let Err(err) = system.spool().remove(&path) {
                warn!(path = %path.display(), error = %err, "spool file not removed");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Job operations
    // -----------------------------------------------------------------------

    /// Cancel a job. A job that is printing stops at the next page
    /// boundary; any other job is canceled immediately.
    #[instrument(skip(self), fields(printer = %self.name()))]
    pub fn cancel_job(self: &Arc<Self>, id: i32) -> Result<()> {
        let max_completed = self.config().max_completed_jobs;
        let mut events = Vec::new();
        let unlink = {
            let mut printer = self.lock();
            let job = printer.find_job(id).ok_or(DruckwerkError::JobNotFound(id))?;
            let state = job.state();
            if state.is_terminal() {
                return Err(DruckwerkError::InvalidTransition {
                    from: state,
                    to: JobState::Canceled,
                });
            }
            job.cancel_token().cancel();
            if printer.processing_job == Some(job.handle()) {
                let mut locked = printer.lock_job(&job);
                locked.set_reasons(JobReasons::PROCESSING_TO_STOP_POINT, JobReasons::empty());
                events.push(locked.state_event());
                Vec::new()
            } else {
                complete_locked(&mut printer, &job, None, &mut events);
                let mut files = job.spool_files();
                files.extend(trim_history(&mut printer, max_completed));
                files
            }
        };
        info!(job_id = id, "job cancel requested");
        self.signal().notify();
        self.emit(events);
        self.unlink(unlink);
        Ok(())
    }

    /// Hold a pending job.
    pub fn hold_job(&self, id: i32) -> Result<()> {
        let event = {
            let printer = self.lock();
            let job = printer.find_job(id).ok_or(DruckwerkError::JobNotFound(id))?;
            let mut locked = printer.lock_job(&job);
            match locked.state() {
                JobState::Pending | JobState::Held => {
                    locked.transition(JobState::Held)?;
                    locked.set_reasons(JobReasons::JOB_HOLD_UNTIL_SPECIFIED, JobReasons::JOB_QUEUED);
                    locked.state_event()
                }
                from => {
                    return Err(DruckwerkError::InvalidTransition {
                        from,
                        to: JobState::Held,
                    });
                }
            }
        };
        info!(printer = %self.name(), job_id = id, "job held");
        self.emit(vec![event]);
        Ok(())
    }

    /// Release a held job back to the queue.
    pub fn release_job(self: &Arc<Self>, id: i32) -> Result<()> {
        let event = {
            let printer = self.lock();
            let job = printer.find_job(id).ok_or(DruckwerkError::JobNotFound(id))?;
            let mut locked = printer.lock_job(&job);
            let from = locked.state();
            if from != JobState::Held || locked.reasons().contains(JobReasons::JOB_INCOMING) {
                return Err(DruckwerkError::InvalidTransition {
                    from,
                    to: JobState::Pending,
                });
            }
            locked.transition(JobState::Pending)?;
            locked.set_reasons(JobReasons::JOB_QUEUED, JobReasons::JOB_HOLD_UNTIL_SPECIFIED);
            locked.state_event()
        };
        info!(printer = %self.name(), job_id = id, "job released");
        self.emit(vec![event]);
        self.check_jobs();
        Ok(())
    }

    /// Suspend a pending or printing job. A printing job parks at the
    /// next page boundary.
    pub fn suspend_job(&self, id: i32) -> Result<()> {
        let event = {
            let printer = self.lock();
            let job = printer.find_job(id).ok_or(DruckwerkError::JobNotFound(id))?;
            let mut locked = printer.lock_job(&job);
            locked.transition(JobState::Stopped)?;
            locked.set_reasons(
                JobReasons::JOB_STOPPED,
                JobReasons::JOB_PRINTING | JobReasons::JOB_QUEUED,
            );
            locked.state_event()
        };
        info!(printer = %self.name(), job_id = id, "job suspended");
        self.emit(vec![event]);
        Ok(())
    }

    /// Resume a suspended job where it left off.
    pub fn resume_job(self: &Arc<Self>, id: i32) -> Result<()> {
        let event = {
            let printer = self.lock();
            let job = printer.find_job(id).ok_or(DruckwerkError::JobNotFound(id))?;
            let processing = printer.processing_job == Some(job.handle());
            let mut locked = printer.lock_job(&job);
            if locked.state() != JobState::Stopped {
                return Err(DruckwerkError::InvalidTransition {
                    from: locked.state(),
                    to: JobState::Pending,
                });
            }
            if processing {
                locked.transition(JobState::Processing)?;
                locked.set_reasons(JobReasons::JOB_PRINTING, JobReasons::JOB_STOPPED);
            } else {
                locked.transition(JobState::Pending)?;
                locked.set_reasons(JobReasons::JOB_QUEUED, JobReasons::JOB_STOPPED);
            }
            locked.state_event()
        };
        info!(printer = %self.name(), job_id = id, "job resumed");
        self.signal().notify();
        self.emit(vec![event]);
        self.check_jobs();
        Ok(())
    }

    /// Print a single document read straight from the client, without
    /// spooling. The call returns once the document has printed. A job
    /// that will be held is spooled instead.
    #[instrument(skip_all, fields(printer = %self.name(), job_id = job.id(), format = %format))]
    pub fn stream_job(
        self: &Arc<Self>,
        job: &Arc<Job>,
        format: &str,
        attributes: AttributeGroup,
        reader: &mut dyn Read,
    ) -> Result<()> {
        let held = job.hold_until().is_some() || self.read().hold_new_jobs;
        if held {
            self.add_document(job, format, job.name(), attributes, reader)?;
            return self.submit_job(job);
        }

        let system = self.system()?;
        job.set_streaming(true);
        let number = job.push_document(Document {
            number: 0,
            format: format.to_string(),
            name: job.name().to_string(),
            file: None,
            state: JobState::Pending,
            impressions: 0,
            is_color: None,
            size: 0,
            sha256: String::new(),
            attributes,
        });
        self.submit_job(job)?;

        match self.start_job(job) {
            StartOutcome::Started(mut device) => {
                let result = match job.document(number) {
                    Some(document) => self
                        .run_document(&system, job, &document, &mut device, reader)
                        .map(|_| ()),
                    None => Err(DruckwerkError::Spool(format!("document {number} missing"))),
                };
                job.set_streaming(false);
                self.finish_job(job, result.as_ref().err(), Some(device));
                result
            }
            StartOutcome::Canceled => {
                job.set_streaming(false);
                self.finish_job(job, None, None);
                Ok(())
            }
            StartOutcome::Requeued => {
                // The data cannot be replayed later.
                job.set_streaming(false);
                let err = DruckwerkError::ShuttingDown;
                self.finish_job(job, Some(&err), None);
                Err(err)
            }
        }
    }

    /// Stop accepting work and cancel every queued job. Returns `true` when
    /// no job is printing, so the printer can be removed now.
    pub(crate) fn mark_deleted(self: &Arc<Self>) -> bool {
        let max_completed = self.config().max_completed_jobs;
        let mut events = Vec::new();
        let (drained, unlink) = {
            let mut printer = self.lock();
            printer.is_deleted = true;
            printer.accepting = false;
            let state = printer.state;
            events.extend(printer.set_state(state, PrinterReasons::DELETING, PrinterReasons::empty()));
            let jobs: Vec<Arc<Job>> = printer
                .active
                .iter()
                .filter_map(|handle| printer.job(*handle))
                .collect();
            let mut files = Vec::new();
            for job in &jobs {
                job.cancel_token().cancel();
                if printer.processing_job == Some(job.handle()) {
                    let mut locked = printer.lock_job(job);
                    locked.set_reasons(JobReasons::PROCESSING_TO_STOP_POINT, JobReasons::empty());
                    events.push(locked.state_event());
                } else {
                    complete_locked(&mut printer, job, None, &mut events);
                    files.extend(job.spool_files());
                }
            }
            files.extend(trim_history(&mut printer, max_completed));
            (printer.processing_job.is_none(), files)
        };
        info!(printer = %self.name(), drained, "printer marked for deletion");
        self.signal().notify();
        self.emit(events);
        self.unlink(unlink);
        drained
    }
}

/// Move `job` to its terminal state and into the completed list. Returns
/// `false` when it was already terminal.
fn complete_locked(
    printer: &mut LockedPrinter<'_>,
    job: &Job,
    failure: Option<&DruckwerkError>,
    events: &mut Vec<Event>,
) -> bool {
    let impressions = {
        let mut locked = printer.lock_job(job);
        if locked.state().is_terminal() {
            return false;
        }
        let (target, reason) = if job.is_canceled() {
            (JobState::Canceled, JobReasons::JOB_CANCELED_BY_USER)
        } else if let Some(err) = failure {
            (JobState::Aborted, err.job_reason())
        } else {
            (JobState::Completed, JobReasons::JOB_COMPLETED_SUCCESSFULLY)
        };
        if target == JobState::Completed && locked.state() == JobState::Stopped {
            let _ = locked.transition(JobState::Processing);
        }
        let (state, reason) = match locked.transition(target) {
            Ok(()) => (target, reason),
            Err(err) => {
                warn!(job_id = job.id(), error = %err, "job could not complete, aborting");
                let _ = locked.transition(JobState::Aborted);
                (JobState::Aborted, JobReasons::ABORTED_BY_SYSTEM)
            }
        };
        locked.set_reasons(reason, TRANSIENT_REASONS);
        if let Some(err) = failure {
            locked.set_message(err.to_string());
        }
        locked.settle_documents();
        events.push(locked.state_event());
        events.push(Event::JobCompleted {
            printer: job.printer_name().to_string(),
            job_id: job.id(),
            state,
        });
        info!(job_id = job.id(), ?state, "job finished");
        locked.impressions_completed()
    };
    let handle = job.handle();
    printer.active.retain(|h| *h != handle);
    printer.completed.push(handle);
    printer.impressions_completed += u64::from(impressions);
    true
}

/// Drop the oldest completed jobs beyond `max`; returns their spool files.
fn trim_history(printer: &mut LockedPrinter<'_>, max: usize) -> Vec<PathBuf> {
    let mut files = Vec::new();
    while printer.completed.len() > max {
        let handle = printer.completed.remove(0);
        if let Some(job) = printer.jobs.remove(handle) {
            debug!(job_id = job.id(), "job dropped from history");
            files.extend(job.spool_files());
        }
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::{OnceLock, Weak};

    use druckwerk_core::{AttrValue, DriverData};

    use crate::driver::Driver;
    use crate::events::MemoryEventSink;
    use crate::printer::WhichJobs;
    use crate::test_support::{
        MemoryDevice, RecordingDriver, gray_png, pwg_document, pwg_page_claiming, test_system,
        test_system_with, tiny_color_data, wait_until,
    };

    fn add_printer(
        system: &Arc<System>,
        driver: RecordingDriver,
    ) -> (Arc<Printer>, Arc<RecordingDriver>, MemoryDevice) {
        add_printer_with(system, driver, DriverData::default())
    }

    fn add_printer_with(
        system: &Arc<System>,
        driver: RecordingDriver,
        data: DriverData,
    ) -> (Arc<Printer>, Arc<RecordingDriver>, MemoryDevice) {
        let device = MemoryDevice::default();
        let shared = device.clone();
        system.devices().register("mem", move |_| Ok(Box::new(shared.clone())));
        let driver = Arc::new(driver);
        let dyn_driver: Arc<dyn Driver> = driver.clone();
        let printer = system
            .create_printer("test", dyn_driver, data, "mem://out")
            .expect("printer");
        (printer, driver, device)
    }

    fn finished(job: &Job) -> bool {
        job.state().is_terminal()
    }

    fn completions(events: &MemoryEventSink, id: i32) -> usize {
        events
            .events()
            .iter()
            .filter(|e| matches!(e, Event::JobCompleted { job_id, .. } if *job_id == id))
            .count()
    }

    #[test]
    fn raster_job_prints_every_page() {
        let (system, events, _spool) = test_system();
        let (printer, driver, device) = add_printer(&system, RecordingDriver::default());

        let job = printer
            .print_job("alice", "pages", AttributeGroup::new(), "image/pwg-raster", Cursor::new(pwg_document(2)))
            .expect("print");
        assert!(wait_until(|| finished(&job)));

        assert_eq!(job.state(), JobState::Completed);
        assert!(job.reasons().contains(JobReasons::JOB_COMPLETED_SUCCESSFULLY));
        assert!(!job.reasons().intersects(TRANSIENT_REASONS));
        assert_eq!(job.impressions_completed(), 2);
        assert_eq!(
            driver.calls(),
            vec![
                format!("start_job {}", job.id()),
                "start_page 1".into(),
                "end_page 1".into(),
                "start_page 2".into(),
                "end_page 2".into(),
                format!("end_job {}", job.id()),
            ]
        );
        assert_eq!(device.contents().len(), 2 * 72 * 72);
        assert!(wait_until(|| completions(&events, job.id()) == 1));
        assert!(wait_until(|| printer.state() == PrinterState::Idle));
        assert_eq!(printer.status().impressions_completed, 2);
    }

    #[test]
    fn one_job_processes_at_a_time() {
        let (system, events, _spool) = test_system();
        let (printer, _driver, _device) = add_printer(&system, RecordingDriver::default());
        printer.pause();

        let jobs: Vec<Arc<Job>> = (0..3)
            .map(|n| {
                printer
                    .print_job("bob", &format!("job {n}"), AttributeGroup::new(), "image/pwg-raster", Cursor::new(pwg_document(1)))
                    .expect("print")
            })
            .collect();
        assert!(!printer.check_jobs());
        assert!(jobs.iter().all(|job| job.state() == JobState::Pending));

        printer.resume();
        assert!(wait_until(|| jobs.iter().all(|job| finished(job))));
        // Never two jobs in processing at once.
        let mut processing = 0i32;
        for event in events.events() {
            match event {
                Event::JobStateChanged { state: JobState::Processing, .. } => {
                    processing += 1;
                    assert!(processing <= 1);
                }
                Event::JobCompleted { .. } => processing = 0.max(processing - 1),
                _ => {}
            }
        }
        let order: Vec<i32> = printer.jobs(WhichJobs::Completed).iter().map(|j| j.id()).collect();
        assert_eq!(order, jobs.iter().map(|j| j.id()).collect::<Vec<_>>());
    }

    #[test]
    fn terminal_states_stick() {
        let (system, _events, _spool) = test_system();
        let (printer, _driver, _device) = add_printer(&system, RecordingDriver::default());
        let job = printer
            .print_job("carol", "done", AttributeGroup::new(), "image/pwg-raster", Cursor::new(pwg_document(1)))
            .expect("print");
        assert!(wait_until(|| finished(&job)));

        assert!(matches!(
            printer.cancel_job(job.id()),
            Err(DruckwerkError::InvalidTransition { from: JobState::Completed, to: JobState::Canceled })
        ));
        assert!(printer.hold_job(job.id()).is_err());
        assert!(printer.suspend_job(job.id()).is_err());
        assert_eq!(job.state(), JobState::Completed);
        assert!(matches!(printer.cancel_job(999), Err(DruckwerkError::JobNotFound(999))));
    }

    #[test]
    fn unavailable_device_is_retried() {
        let (system, events, _spool) = test_system();
        let attempts = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let device = MemoryDevice::default();
        {
            let attempts = Arc::clone(&attempts);
            let device = device.clone();
            system.devices().register("flaky", move |request| {
                if attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst) < 3 {
                    return Err(DruckwerkError::DeviceOpen {
                        uri: request.uri.to_string(),
                        reason: "connection refused".into(),
                    });
                }
                Ok(Box::new(device.clone()))
            });
        }
        let printer = system
            .create_printer("flaky", Arc::new(RecordingDriver::default()), DriverData::default(), "flaky://printer")
            .expect("printer");

        let job = printer
            .print_job("dave", "retry", AttributeGroup::new(), "image/pwg-raster", Cursor::new(pwg_document(1)))
            .expect("print");
        assert!(wait_until(|| finished(&job)));
        assert_eq!(job.state(), JobState::Completed);
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 4);
        assert!(!device.contents().is_empty());

        let changes: Vec<(PrinterState, PrinterReasons)> = events
            .events()
            .into_iter()
            .filter_map(|event| match event {
                Event::PrinterStateChanged { state, reasons, .. } => Some((state, reasons)),
                _ => None,
            })
            .collect();
        let processing = changes
            .iter()
            .position(|(state, _)| *state == PrinterState::Processing)
            .expect("processing");
        assert_eq!(processing, 3);
        assert!(changes[..processing].iter().all(|(state, reasons)| {
            *state == PrinterState::Stopped && reasons.contains(PrinterReasons::OFFLINE_REPORT)
        }));
        assert!(!changes[processing].1.contains(PrinterReasons::OFFLINE_REPORT));
        assert_eq!(events.printer_states("flaky").last(), Some(&PrinterState::Idle));
    }

    #[test]
    fn cancel_mid_job_stops_at_page_boundary() {
        let (system, events, _spool) = test_system();
        let cell: Arc<OnceLock<Weak<Printer>>> = Arc::new(OnceLock::new());
        let hook_cell = Arc::clone(&cell);
        let driver = RecordingDriver {
            after_page: Some(Box::new(move |job: &Job, page: u32| {
                if page == 2 {
                    if let Some(printer) = hook_cell.get().and_then(Weak::upgrade) {
                        printer.cancel_job(job.id()).expect("cancel");
                    }
                }
            })),
            ..RecordingDriver::default()
        };
        let (printer, driver, _device) = add_printer(&system, driver);
        let _ = cell.set(Arc::downgrade(&printer));

        let job = printer
            .print_job("erin", "five", AttributeGroup::new(), "image/pwg-raster", Cursor::new(pwg_document(5)))
            .expect("print");
        assert!(wait_until(|| finished(&job)));

        assert_eq!(job.state(), JobState::Canceled);
        assert!(job.reasons().contains(JobReasons::JOB_CANCELED_BY_USER));
        assert!(!job.reasons().contains(JobReasons::PROCESSING_TO_STOP_POINT));
        let calls = driver.calls();
        assert!(calls.contains(&"end_page 2".to_string()));
        assert!(!calls.contains(&"start_page 3".to_string()));
        assert_eq!(calls.last(), Some(&format!("end_job {}", job.id())));
        assert!(wait_until(|| completions(&events, job.id()) == 1));
        assert_eq!(job.impressions_completed(), 2);
    }

    #[test]
    fn driver_failure_aborts_job() {
        let (system, _events, _spool) = test_system();
        let driver = RecordingDriver {
            fail_page: Some(1),
            ..RecordingDriver::default()
        };
        let (printer, driver, _device) = add_printer(&system, driver);
        let job = printer
            .print_job("frank", "jam", AttributeGroup::new(), "image/pwg-raster", Cursor::new(pwg_document(1)))
            .expect("print");
        assert!(wait_until(|| finished(&job)));

        assert_eq!(job.state(), JobState::Aborted);
        assert!(job.reasons().contains(JobReasons::ABORTED_BY_SYSTEM));
        assert!(job.message().contains("media jam"));
        assert_eq!(driver.calls().last(), Some(&format!("end_job {}", job.id())));
        assert!(wait_until(|| printer.state() == PrinterState::Idle));
    }

    #[test]
    fn unsupported_format_aborts_with_format_error() {
        let (system, _events, _spool) = test_system();
        let (printer, _driver, _device) = add_printer(&system, RecordingDriver::default());
        let job = printer
            .print_job("gail", "doc", AttributeGroup::new(), "application/pdf", Cursor::new(b"%PDF-1.7".to_vec()))
            .expect("print");
        assert!(wait_until(|| finished(&job)));
        assert_eq!(job.state(), JobState::Aborted);
        assert!(job.reasons().contains(JobReasons::DOCUMENT_FORMAT_ERROR));
    }

    #[test]
    fn history_is_trimmed_and_spool_files_removed() {
        let (system, _events, spool) = test_system_with(|config| config.max_completed_jobs = 2);
        let (printer, _driver, _device) = add_printer(&system, RecordingDriver::default());
        let mut jobs = Vec::new();
        for n in 0..4 {
            let job = printer
                .print_job("hana", &format!("job {n}"), AttributeGroup::new(), "image/pwg-raster", Cursor::new(pwg_document(1)))
                .expect("print");
            assert!(wait_until(|| finished(&job)));
            jobs.push(job);
        }
        assert!(wait_until(|| printer.jobs(WhichJobs::Completed).len() == 2));
        let kept: Vec<i32> = printer.jobs(WhichJobs::Completed).iter().map(|j| j.id()).collect();
        assert_eq!(kept, vec![jobs[2].id(), jobs[3].id()]);
        assert!(printer.find_job(jobs[0].id()).is_none());
        assert!(wait_until(|| std::fs::read_dir(spool.path()).map(|d| d.count()).unwrap_or(1) == 0));
    }

    #[test]
    fn held_job_waits_for_release() {
        let (system, _events, _spool) = test_system();
        let (printer, _driver, _device) = add_printer(&system, RecordingDriver::default());
        let attributes = AttributeGroup::new()
            .with("job-hold-until", druckwerk_core::AttrValue::keyword("indefinite"));
        let job = printer
            .print_job("ivan", "held", attributes, "image/pwg-raster", Cursor::new(pwg_document(1)))
            .expect("print");
        assert_eq!(job.state(), JobState::Held);
        assert!(job.reasons().contains(JobReasons::JOB_HOLD_UNTIL_SPECIFIED));
        assert!(!printer.check_jobs());

        printer.release_job(job.id()).expect("release");
        assert!(wait_until(|| finished(&job)));
        assert_eq!(job.state(), JobState::Completed);
    }

    #[test]
    fn canceling_queued_job_is_immediate() {
        let (system, events, _spool) = test_system();
        let (printer, driver, _device) = add_printer(&system, RecordingDriver::default());
        printer.pause();
        let job = printer
            .print_job("jo", "queued", AttributeGroup::new(), "image/pwg-raster", Cursor::new(pwg_document(1)))
            .expect("print");
        printer.cancel_job(job.id()).expect("cancel");
        assert_eq!(job.state(), JobState::Canceled);
        assert_eq!(completions(&events, job.id()), 1);
        printer.resume();
        assert!(!printer.check_jobs());
        assert!(driver.calls().is_empty());
    }

    #[test]
    fn pause_waits_for_current_job() {
        let (system, _events, _spool) = test_system();
        let cell: Arc<OnceLock<Weak<Printer>>> = Arc::new(OnceLock::new());
        let hook_cell = Arc::clone(&cell);
        let driver = RecordingDriver {
            after_page: Some(Box::new(move |_job: &Job, page: u32| {
                if page == 1 {
                    if let Some(printer) = hook_cell.get().and_then(Weak::upgrade) {
                        printer.pause();
                    }
                }
            })),
            ..RecordingDriver::default()
        };
        let (printer, _driver, _device) = add_printer(&system, driver);
        let _ = cell.set(Arc::downgrade(&printer));

        let first = printer
            .print_job("kim", "first", AttributeGroup::new(), "image/pwg-raster", Cursor::new(pwg_document(2)))
            .expect("print");
        let second = printer
            .print_job("kim", "second", AttributeGroup::new(), "image/pwg-raster", Cursor::new(pwg_document(1)))
            .expect("print");
        assert!(wait_until(|| finished(&first)));
        assert!(wait_until(|| printer.state() == PrinterState::Stopped));
        assert!(printer.reasons().contains(PrinterReasons::PAUSED));
        assert_eq!(first.state(), JobState::Completed);
        assert_eq!(second.state(), JobState::Pending);

        printer.resume();
        assert!(wait_until(|| finished(&second)));
    }

    #[test]
    fn deleting_printer_cancels_queued_jobs() {
        let (system, events, _spool) = test_system();
        let (printer, _driver, _device) = add_printer(&system, RecordingDriver::default());
        printer.pause();
        let queued = printer
            .print_job("lee", "queued", AttributeGroup::new(), "image/pwg-raster", Cursor::new(pwg_document(1)))
            .expect("print");
        system.delete_printer(printer.handle()).expect("delete");
        assert_eq!(queued.state(), JobState::Canceled);
        assert!(system.find_printer(printer.handle()).is_none());
        assert!(events.events().contains(&Event::PrinterDeleted { printer: "test".into() }));
        assert!(matches!(
            printer.create_job("lee", "late", AttributeGroup::new()),
            Err(DruckwerkError::PrinterNotFound(_))
        ));
    }

    #[test]
    fn streamed_job_prints_without_spooling() {
        let (system, _events, spool) = test_system();
        let (printer, driver, _device) = add_printer(&system, RecordingDriver::default());
        let job = printer
            .create_job("mo", "stream", AttributeGroup::new())
            .expect("create");
        let mut input = Cursor::new(pwg_document(3));
        printer
            .stream_job(&job, "image/pwg-raster", AttributeGroup::new(), &mut input)
            .expect("stream");
        assert_eq!(job.state(), JobState::Completed);
        assert!(!job.is_streaming());
        assert_eq!(job.impressions_completed(), 3);
        assert!(driver.calls().contains(&"end_page 3".to_string()));
        assert_eq!(std::fs::read_dir(spool.path()).map(|d| d.count()).unwrap_or(1), 0);
    }

    #[test]
    fn suspended_job_resumes() {
        let (system, _events, _spool) = test_system();
        let (printer, _driver, _device) = add_printer(&system, RecordingDriver::default());
        printer.pause();
        let job = printer
            .print_job("ned", "later", AttributeGroup::new(), "image/pwg-raster", Cursor::new(pwg_document(1)))
            .expect("print");
        printer.suspend_job(job.id()).expect("suspend");
        assert_eq!(job.state(), JobState::Stopped);
        assert!(job.reasons().contains(JobReasons::JOB_STOPPED));
        printer.resume();
        assert!(!printer.check_jobs());

        printer.resume_job(job.id()).expect("resume job");
        assert!(wait_until(|| finished(&job)));
        assert_eq!(job.state(), JobState::Completed);
    }

    fn start_pages(driver: &RecordingDriver) -> usize {
        driver.calls().iter().filter(|c| c.starts_with("start_page")).count()
    }

    #[test]
    fn spooled_raster_repeats_for_software_copies() {
        let (system, _events, _spool) = test_system();
        let (printer, driver, device) = add_printer(&system, RecordingDriver::default());
        let attributes = AttributeGroup::new().with("copies", AttrValue::Integer(3));

        let job = printer
            .print_job("olga", "three", attributes, "image/pwg-raster", Cursor::new(pwg_document(1)))
            .expect("print");
        assert!(wait_until(|| finished(&job)));

        assert_eq!(job.state(), JobState::Completed);
        assert_eq!(start_pages(&driver), 3);
        assert_eq!(job.copies_completed(), 3);
        assert_eq!(job.impressions_completed(), 3);
        assert_eq!(device.contents().len(), 3 * 72 * 72);
        assert!(driver.headers().iter().all(|h| h.num_copies == 1));
    }

    #[test]
    fn raster_page_over_size_limit_is_unprintable() {
        let (system, _events, _spool) = test_system_with(|config| config.max_image_height = 100);
        let (printer, driver, _device) = add_printer(&system, RecordingDriver::default());

        let job = printer
            .print_job("pia", "tall", AttributeGroup::new(), "image/pwg-raster", Cursor::new(pwg_page_claiming(50_000, 10)))
            .expect("print");
        assert!(wait_until(|| finished(&job)));

        assert_eq!(job.state(), JobState::Aborted);
        assert!(job.reasons().contains(JobReasons::DOCUMENT_UNPRINTABLE_ERROR));
        assert_eq!(start_pages(&driver), 0);
    }

    #[test]
    fn gray_png_prints_with_mono_header() {
        let (system, _events, _spool) = test_system();
        let (printer, driver, device) = add_printer_with(&system, RecordingDriver::default(), tiny_color_data());
        let attributes = AttributeGroup::new().with("print-color-mode", AttrValue::keyword("auto"));

        let job = printer
            .print_job("quinn", "photo", attributes, "image/png", Cursor::new(gray_png(48, 32)))
            .expect("print");
        assert!(wait_until(|| finished(&job)));

        assert_eq!(job.state(), JobState::Completed);
        let headers = driver.headers();
        assert_eq!(headers.len(), 1);
        assert!(!headers[0].is_color());
        assert_eq!(device.contents().len(), 72 * 72);
        assert_eq!(job.document(1).and_then(|d| d.is_color), Some(false));
    }

    #[test]
    fn image_over_size_limit_is_unprintable() {
        let (system, _events, _spool) = test_system_with(|config| config.max_image_width = 16);
        let (printer, driver, _device) = add_printer_with(&system, RecordingDriver::default(), tiny_color_data());

        let job = printer
            .print_job("rosa", "wide", AttributeGroup::new(), "image/png", Cursor::new(gray_png(32, 8)))
            .expect("print");
        assert!(wait_until(|| finished(&job)));

        assert_eq!(job.state(), JobState::Aborted);
        assert!(job.reasons().contains(JobReasons::DOCUMENT_UNPRINTABLE_ERROR));
        assert_eq!(start_pages(&driver), 0);
    }

    #[test]
    fn image_over_byte_limit_is_unprintable() {
        let png = gray_png(48, 32);
        let limit = png.len() - 1;
        let (system, _events, _spool) = test_system_with(|config| config.max_image_bytes = limit);
        let (printer, _driver, _device) = add_printer_with(&system, RecordingDriver::default(), tiny_color_data());

        let job = printer
            .print_job("sam", "big", AttributeGroup::new(), "image/png", Cursor::new(png))
            .expect("print");
        assert!(wait_until(|| finished(&job)));
        assert_eq!(job.state(), JobState::Aborted);
        assert!(job.reasons().contains(JobReasons::DOCUMENT_UNPRINTABLE_ERROR));
    }

    #[test]
    fn png_copies_print_three_pages() {
        let (system, _events, _spool) = test_system();
        let (printer, driver, _device) = add_printer_with(&system, RecordingDriver::default(), tiny_color_data());
        let attributes = AttributeGroup::new().with("copies", AttrValue::Integer(3));

        let job = printer
            .print_job("tom", "thrice", attributes, "image/png", Cursor::new(gray_png(48, 32)))
            .expect("print");
        assert!(wait_until(|| finished(&job)));

        assert_eq!(job.state(), JobState::Completed);
        assert_eq!(start_pages(&driver), 3);
        assert_eq!(job.copies_completed(), 3);
    }
}
