// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Printer objects: identity, capabilities, job arena, and the locking types
// that fix the printer-before-job lock order.

use std::io::Read;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use druckwerk_core::{
    Arena, AttributeGroup, DriverData, DruckwerkError, Handle, JobReasons, JobState,
    PrinterReasons, PrinterState, PrinterStatus, Result, SystemConfig,
};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::device::DeviceHandle;
use crate::driver::Driver;
use crate::events::Event;
use crate::job::{Document, Job, LockedJob};
use crate::signal::Signal;
use crate::system::System;

/// Which jobs a listing returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhichJobs {
    /// Not yet terminal, oldest first.
    Active,
    /// Terminal, oldest first.
    Completed,
    All,
}

impl WhichJobs {
    /// Parse an IPP `which-jobs` keyword.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "not-completed" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "all" => Some(Self::All),
            _ => None,
        }
    }
}

/// Mutable printer state, guarded by the printer's RwLock.
pub(crate) struct PrinterInner {
    pub driver_data: DriverData,
    pub state: PrinterState,
    pub reasons: PrinterReasons,
    pub state_time: DateTime<Utc>,
    pub device_uri: String,
    /// Device kept open between jobs.
    pub device: Option<DeviceHandle>,
    /// A thread holds the device.
    pub device_in_use: bool,
    pub jobs: Arena<Arc<Job>>,
    pub active: Vec<Handle<Arc<Job>>>,
    pub completed: Vec<Handle<Arc<Job>>>,
    pub processing_job: Option<Handle<Arc<Job>>>,
    pub next_job_id: i32,
    pub impressions_completed: u64,
    pub stop_pending: bool,
    pub is_deleted: bool,
    pub hold_new_jobs: bool,
    pub accepting: bool,
    /// The last device open failed; cleared by the next success.
    pub device_offline: bool,
}

impl PrinterInner {
    pub fn job(&self, handle: Handle<Arc<Job>>) -> Option<Arc<Job>> {
        self.jobs.get(handle).cloned()
    }

    pub fn find_job(&self, id: i32) -> Option<Arc<Job>> {
        self.jobs
            .iter()
            .find(|(_, job)| job.id() == id)
            .map(|(_, job)| Arc::clone(job))
    }

    pub fn processing(&self) -> Option<Arc<Job>> {
        self.processing_job.and_then(|handle| self.job(handle))
    }
}

/// A printer write guard.
pub(crate) struct LockedPrinter<'a> {
    printer: &'a Printer,
    inner: RwLockWriteGuard<'a, PrinterInner>,
}

impl<'a> LockedPrinter<'a> {
    pub fn printer(&self) -> &'a Printer {
        self.printer
    }

    /// Write-lock `job`. The guard borrows this printer guard, so the job
    /// lock is always taken second and released first.
    pub fn lock_job<'j>(&'j self, job: &'j Job) -> LockedJob<'j> {
        LockedJob::new(self, job)
    }

    /// Change state and reasons; returns an event when anything changed.
    pub fn set_state(
        &mut self,
        state: PrinterState,
        add: PrinterReasons,
        remove: PrinterReasons,
    ) -> Option<Event> {
        let reasons = (self.inner.reasons - remove) | add;
        if state == self.inner.state && reasons == self.inner.reasons {
            return None;
        }
        debug!(printer = %self.printer.name, from = ?self.inner.state, to = ?state, "printer state change");
        self.inner.state = state;
        self.inner.reasons = reasons;
        self.inner.state_time = Utc::now();
        Some(self.state_event())
    }

    pub fn state_event(&self) -> Event {
        Event::PrinterStateChanged {
            printer: self.printer.name.clone(),
            state: self.inner.state,
            reasons: self.inner.reasons,
        }
    }
}

impl Deref for LockedPrinter<'_> {
    type Target = PrinterInner;

    fn deref(&self) -> &PrinterInner {
        &self.inner
    }
}

impl DerefMut for LockedPrinter<'_> {
    fn deref_mut(&mut self) -> &mut PrinterInner {
        &mut self.inner
    }
}

/// One addressable print queue.
pub struct Printer {
    id: u32,
    name: String,
    resource: String,
    uuid: Uuid,
    handle: Handle<Arc<Printer>>,
    driver: Arc<dyn Driver>,
    system: Weak<System>,
    signal: Signal,
    inner: RwLock<PrinterInner>,
}

impl Printer {
    pub(crate) fn new(
        id: u32,
        name: &str,
        handle: Handle<Arc<Printer>>,
        driver: Arc<dyn Driver>,
        driver_data: DriverData,
        device_uri: &str,
        system: Weak<System>,
    ) -> Self {
        Self {
            id,
            name: name.to_string(),
            resource: format!("/ipp/print/{name}"),
            uuid: Uuid::new_v4(),
            handle,
            driver,
            system,
            signal: Signal::new(),
            inner: RwLock::new(PrinterInner {
                driver_data,
                state: PrinterState::Idle,
                reasons: PrinterReasons::empty(),
                state_time: Utc::now(),
                device_uri: device_uri.to_string(),
                device: None,
                device_in_use: false,
                jobs: Arena::new(),
                active: Vec::new(),
                completed: Vec::new(),
                processing_job: None,
                next_job_id: 1,
                impressions_completed: 0,
                stop_pending: false,
                is_deleted: false,
                hold_new_jobs: false,
                accepting: true,
                device_offline: false,
            }),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resource path, `/ipp/print/<name>`.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn handle(&self) -> Handle<Arc<Printer>> {
        self.handle
    }

    pub fn driver(&self) -> Arc<dyn Driver> {
        Arc::clone(&self.driver)
    }

    pub(crate) fn signal(&self) -> &Signal {
        &self.signal
    }

    pub(crate) fn system(&self) -> Result<Arc<System>> {
        self.system.upgrade().ok_or(DruckwerkError::ShuttingDown)
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, PrinterInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn lock(&self) -> LockedPrinter<'_> {
        LockedPrinter {
            printer: self,
            inner: self.inner.write().unwrap_or_else(PoisonError::into_inner),
        }
    }

    pub(crate) fn is_shutting_down(&self) -> bool {
        self.system
            .upgrade()
            .is_none_or(|system| system.is_shutting_down())
    }

    pub(crate) fn config(&self) -> SystemConfig {
        self.system
            .upgrade()
            .map(|system| system.config().clone())
            .unwrap_or_default()
    }

    pub(crate) fn wait_interval(&self) -> Duration {
        self.config().device_wait_interval()
    }

    /// Deliver events. Never called with a lock held.
    pub(crate) fn emit(&self, events: Vec<Event>) {
        if let Some(system) = self.system.upgrade() {
            for event in events {
                system.events().notify(event);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Status
    // -----------------------------------------------------------------------

    pub fn state(&self) -> PrinterState {
        self.read().state
    }

    pub fn reasons(&self) -> PrinterReasons {
        self.read().reasons
    }

    pub fn driver_data(&self) -> DriverData {
        self.read().driver_data.clone()
    }

    pub fn set_driver_data(&self, driver_data: DriverData) {
        self.lock().driver_data = driver_data;
        info!(printer = %self.name, "driver data updated");
    }

    pub fn device_uri(&self) -> String {
        self.read().device_uri.clone()
    }

    pub fn set_device_uri(&self, uri: &str) {
        let mut printer = self.lock();
        printer.device_uri = uri.to_string();
        if let Some(device) = printer.device.take() {
            device.close();
        }
    }

    pub fn is_accepting(&self) -> bool {
        let printer = self.read();
        printer.accepting && !printer.is_deleted
    }

    pub fn set_accepting(&self, accepting: bool) {
        self.lock().accepting = accepting;
    }

    pub fn is_deleted(&self) -> bool {
        self.read().is_deleted
    }

    pub fn status(&self) -> PrinterStatus {
        let printer = self.read();
        PrinterStatus {
            id: self.id,
            name: self.name.clone(),
            uuid: self.uuid,
            resource: self.resource.clone(),
            state: printer.state,
            reasons: printer.reasons,
            state_time: printer.state_time,
            device_uri: printer.device_uri.clone(),
            accepting: printer.accepting && !printer.is_deleted,
            active_jobs: printer.active.len(),
            completed_jobs: printer.completed.len(),
            processing_job: printer.processing().map(|job| job.id()),
            impressions_completed: printer.impressions_completed,
        }
    }

    pub fn find_job(&self, id: i32) -> Option<Arc<Job>> {
        self.read().find_job(id)
    }

    pub fn jobs(&self, which: WhichJobs) -> Vec<Arc<Job>> {
        let printer = self.read();
        let handles: Vec<Handle<Arc<Job>>> = match which {
            WhichJobs::Active => printer.active.clone(),
            WhichJobs::Completed => printer.completed.clone(),
            WhichJobs::All => printer
                .completed
                .iter()
                .chain(printer.active.iter())
                .copied()
                .collect(),
        };
        handles
            .into_iter()
            .filter_map(|handle| printer.job(handle))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Job creation
    // -----------------------------------------------------------------------

    /// Create a job in `pending-held` with `job-incoming`. It is not
    /// scheduled until `submit_job`.
    #[instrument(skip(self, attributes), fields(printer = %self.name))]
    pub fn create_job(
        &self,
        username: &str,
        name: &str,
        attributes: AttributeGroup,
    ) -> Result<Arc<Job>> {
        if self.is_shutting_down() {
            return Err(DruckwerkError::ShuttingDown);
        }
        let job = {
            let mut printer = self.lock();
            if printer.is_deleted {
                return Err(DruckwerkError::PrinterNotFound(self.name.clone()));
            }
            if !printer.accepting {
                return Err(DruckwerkError::NotAccepting);
            }
            let id = printer.next_job_id;
            printer.next_job_id += 1;
            let handle = printer.jobs.next_handle();
            let job = Arc::new(Job::new(
                id,
                handle,
                self.handle,
                self.id,
                &self.name,
                username,
                name,
                attributes,
            ));
            let inserted = printer.jobs.insert(Arc::clone(&job));
            debug_assert_eq!(inserted, handle);
            printer.active.push(handle);
            job
        };

        info!(job_id = job.id(), username, "job created");
        self.emit(vec![Event::JobCreated {
            printer: self.name.clone(),
            job_id: job.id(),
            state: job.state(),
        }]);
        Ok(job)
    }

    /// Spool a document for `job`; returns its number.
    pub fn add_document(
        &self,
        job: &Job,
        format: &str,
        name: &str,
        attributes: AttributeGroup,
        reader: impl Read,
    ) -> Result<usize> {
        let system = self.system()?;
        if job.state().is_terminal() {
            return Err(DruckwerkError::InvalidTransition {
                from: job.state(),
                to: JobState::Pending,
            });
        }
        let number = job.document_count() + 1;
        let file = system
            .spool()
            .store(self.id, job.id(), number, format, reader)?;
        Ok(job.push_document(Document {
            number,
            format: format.to_string(),
            name: name.to_string(),
            file: Some(file.path),
            state: JobState::Pending,
            impressions: 0,
            is_color: None,
            size: file.size,
            sha256: file.sha256,
            attributes,
        }))
    }

    /// Queue an incoming job: `pending` with `job-queued`, or held when
    /// `job-hold-until` asks for it or new jobs are being held.
    #[instrument(skip(self, job), fields(printer = %self.name, job_id = job.id()))]
    pub fn submit_job(self: &Arc<Self>, job: &Arc<Job>) -> Result<()> {
        let event = {
            let printer = self.lock();
            let hold = job.hold_until().is_some() || printer.hold_new_jobs;
            let mut locked = printer.lock_job(job);
            if locked.state() != JobState::Held
                || !locked.reasons().contains(JobReasons::JOB_INCOMING)
            {
                return Err(DruckwerkError::InvalidTransition {
                    from: locked.state(),
                    to: JobState::Pending,
                });
            }
            if hold {
                locked.set_reasons(JobReasons::JOB_HOLD_UNTIL_SPECIFIED, JobReasons::JOB_INCOMING);
            } else {
                locked.transition(JobState::Pending)?;
                locked.set_reasons(JobReasons::JOB_QUEUED, JobReasons::JOB_INCOMING);
            }
            locked.state_event()
        };

        info!(state = ?job.state(), "job queued");
        self.emit(vec![event]);
        self.check_jobs();
        Ok(())
    }

    /// Create, spool, and queue a single-document job.
    pub fn print_job(
        self: &Arc<Self>,
        username: &str,
        name: &str,
        attributes: AttributeGroup,
        format: &str,
        reader: impl Read,
    ) -> Result<Arc<Job>> {
        let job = self.create_job(username, name, attributes)?;
        if let Err(err) = self.add_document(&job, format, name, AttributeGroup::new(), reader) {
            self.finish_job(&job, Some(&err), None);
            return Err(err);
        }
        self.submit_job(&job)?;
        Ok(job)
    }

    // -----------------------------------------------------------------------
    // Printer control
    // -----------------------------------------------------------------------

    /// Stop after the current job, or now when idle.
    pub fn pause(&self) {
        let event = {
            let mut printer = self.lock();
            if printer.processing_job.is_some() {
                printer.stop_pending = true;
                let state = printer.state;
                printer.set_state(state, PrinterReasons::MOVING_TO_PAUSED, PrinterReasons::empty())
            } else {
                printer.set_state(
                    PrinterState::Stopped,
                    PrinterReasons::PAUSED,
                    PrinterReasons::MOVING_TO_PAUSED,
                )
            }
        };
        info!(printer = %self.name, "printer paused");
        self.emit(event.into_iter().collect());
    }

    pub fn resume(self: &Arc<Self>) {
        let event = {
            let mut printer = self.lock();
            printer.stop_pending = false;
            if printer.state == PrinterState::Stopped
                && printer.reasons.contains(PrinterReasons::PAUSED)
            {
                printer.set_state(
                    PrinterState::Idle,
                    PrinterReasons::empty(),
                    PrinterReasons::PAUSED | PrinterReasons::MOVING_TO_PAUSED,
                )
            } else {
                let state = printer.state;
                printer.set_state(state, PrinterReasons::empty(), PrinterReasons::MOVING_TO_PAUSED)
            }
        };
        info!(printer = %self.name, "printer resumed");
        self.signal.notify();
        self.emit(event.into_iter().collect());
        self.check_jobs();
    }

    /// Hold every job submitted from now on.
    pub fn hold_new_jobs(&self) {
        self.lock().hold_new_jobs = true;
        info!(printer = %self.name, "holding new jobs");
    }

    /// Stop holding new jobs and queue the ones held only for that reason.
    pub fn release_held_new_jobs(self: &Arc<Self>) {
        let mut events = Vec::new();
        {
            let mut printer = self.lock();
            printer.hold_new_jobs = false;
            let held: Vec<Arc<Job>> = printer
                .active
                .iter()
                .filter_map(|handle| printer.job(*handle))
                .filter(|job| job.hold_until().is_none())
                .collect();
            for job in &held {
                let mut locked = printer.lock_job(job);
                if locked.state() == JobState::Held
                    && locked.reasons().contains(JobReasons::JOB_HOLD_UNTIL_SPECIFIED)
                    && locked.transition(JobState::Pending).is_ok()
                {
                    locked.set_reasons(JobReasons::JOB_QUEUED, JobReasons::JOB_HOLD_UNTIL_SPECIFIED);
                    events.push(locked.state_event());
                }
            }
        }
        info!(printer = %self.name, released = events.len(), "released held jobs");
        self.emit(events);
        self.check_jobs();
    }

    // -----------------------------------------------------------------------
    // Out-of-band device access
    // -----------------------------------------------------------------------

    /// Take the device for status polling or similar. Fails with
    /// `DeviceBusy` while a job holds it.
    pub fn open_device(&self) -> Result<DeviceHandle> {
        let system = self.system()?;
        let uri = {
            let mut printer = self.lock();
            if printer.device_in_use || printer.processing_job.is_some() {
                return Err(DruckwerkError::DeviceBusy);
            }
            printer.device_in_use = true;
            if let Some(device) = printer.device.take() {
                return Ok(device);
            }
            printer.device_uri.clone()
        };
        match DeviceHandle::open(&uri, system.devices(), None) {
            Ok(device) => Ok(device),
            Err(err) => {
                self.lock().device_in_use = false;
                self.signal.notify();
                Err(err)
            }
        }
    }

    /// Return a device taken with `open_device`.
    pub fn close_device(&self, device: DeviceHandle) {
        {
            let mut printer = self.lock();
            printer.device_in_use = false;
        }
        device.close();
        self.signal.notify();
    }

    /// Ask the driver to refresh status over an out-of-band device.
    pub fn update_status(&self) -> Result<()> {
        let mut device = self.open_device()?;
        let result = self.driver.status(self, &mut device);
        self.close_device(device);
        result
    }
}

impl std::fmt::Debug for Printer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Printer")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("driver", &self.driver.name())
            .finish()
    }
}
