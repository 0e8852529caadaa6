// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Job state machine.
//
// A job's own fields live behind the job's RwLock. Progress counters and
// reasons may be updated through `&Job` from any thread; state transitions
// go through `LockedJob`, which can only be obtained from a locked printer.

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use druckwerk_core::{
    AttributeGroup, CancelToken, DruckwerkError, Handle, JobReasons, JobState, JobStatus, Result,
};
use tracing::debug;

use crate::events::Event;
use crate::printer::{LockedPrinter, Printer};

/// One file within a job.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// 1-based position within the job.
    pub number: usize,
    pub format: String,
    pub name: String,
    /// Spool file, absent for documents streamed from the client.
    pub file: Option<PathBuf>,
    pub state: JobState,
    /// Detected impression count, 0 when unknown.
    pub impressions: u32,
    /// Colour content, once a filter has looked.
    pub is_color: Option<bool>,
    pub size: u64,
    pub sha256: String,
    /// Document-level template attributes.
    pub attributes: AttributeGroup,
}

#[derive(Debug)]
pub(crate) struct JobInner {
    pub state: JobState,
    pub reasons: JobReasons,
    pub message: String,
    pub processing: Option<DateTime<Utc>>,
    pub completed: Option<DateTime<Utc>>,
    pub documents: Vec<Document>,
    pub impressions: u32,
    pub impressions_completed: u32,
    pub copies: u32,
    pub copies_completed: u32,
    pub k_octets: u64,
    pub streaming: bool,
}

/// A print job, owned by its printer's job arena.
#[derive(Debug)]
pub struct Job {
    id: i32,
    handle: Handle<Arc<Job>>,
    printer: Handle<Arc<Printer>>,
    printer_id: u32,
    printer_name: String,
    name: String,
    username: String,
    attributes: AttributeGroup,
    created: DateTime<Utc>,
    cancel: CancelToken,
    inner: RwLock<JobInner>,
}

impl Job {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: i32,
        handle: Handle<Arc<Job>>,
        printer: Handle<Arc<Printer>>,
        printer_id: u32,
        printer_name: &str,
        username: &str,
        name: &str,
        attributes: AttributeGroup,
    ) -> Self {
        let copies = attributes
            .integer("copies")
            .and_then(|c| u32::try_from(c).ok())
            .filter(|c| (1..=9999).contains(c))
            .unwrap_or(1);
        Self {
            id,
            handle,
            printer,
            printer_id,
            printer_name: printer_name.to_string(),
            name: name.to_string(),
            username: username.to_string(),
            attributes,
            created: Utc::now(),
            cancel: CancelToken::new(),
            inner: RwLock::new(JobInner {
                state: JobState::Held,
                reasons: JobReasons::JOB_INCOMING,
                message: String::new(),
                processing: None,
                completed: None,
                documents: Vec::new(),
                impressions: 0,
                impressions_completed: 0,
                copies,
                copies_completed: 0,
                k_octets: 0,
                streaming: false,
            }),
        }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn handle(&self) -> Handle<Arc<Job>> {
        self.handle
    }

    /// Handle of the owning printer in the system arena.
    pub fn printer(&self) -> Handle<Arc<Printer>> {
        self.printer
    }

    pub fn printer_id(&self) -> u32 {
        self.printer_id
    }

    pub fn printer_name(&self) -> &str {
        &self.printer_name
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Job template attributes as submitted.
    pub fn attributes(&self) -> &AttributeGroup {
        &self.attributes
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    /// `job-hold-until` other than `no-hold`.
    pub fn hold_until(&self) -> Option<&str> {
        self.attributes
            .string("job-hold-until")
            .filter(|value| *value != "no-hold")
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.is_canceled()
    }

    fn read(&self) -> RwLockReadGuard<'_, JobInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, JobInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> JobState {
        self.read().state
    }

    pub fn reasons(&self) -> JobReasons {
        self.read().reasons
    }

    pub fn message(&self) -> String {
        self.read().message.clone()
    }

    pub fn set_message(&self, message: impl Into<String>) {
        self.write().message = message.into();
    }

    pub fn set_reasons(&self, add: JobReasons, remove: JobReasons) {
        let mut inner = self.write();
        inner.reasons = (inner.reasons - remove) | add;
    }

    pub fn add_reasons(&self, add: JobReasons) {
        self.set_reasons(add, JobReasons::empty());
    }

    pub fn impressions(&self) -> u32 {
        self.read().impressions
    }

    pub fn impressions_completed(&self) -> u32 {
        self.read().impressions_completed
    }

    pub fn copies_completed(&self) -> u32 {
        self.read().copies_completed
    }

    /// Raise the expected impression count. Smaller values are ignored.
    pub fn set_impressions(&self, impressions: u32) {
        let mut inner = self.write();
        inner.impressions = inner.impressions.max(impressions);
    }

    pub fn set_impressions_completed(&self, completed: u32) {
        let mut inner = self.write();
        if completed > inner.impressions_completed {
            inner.impressions_completed = completed;
            inner.impressions = inner.impressions.max(completed);
        }
    }

    pub fn set_copies_completed(&self, completed: u32) {
        let mut inner = self.write();
        inner.copies_completed = inner.copies_completed.max(completed);
    }

    pub fn documents(&self) -> Vec<Document> {
        self.read().documents.clone()
    }

    pub fn document(&self, number: usize) -> Option<Document> {
        self.read()
            .documents
            .iter()
            .find(|d| d.number == number)
            .cloned()
    }

    pub fn document_count(&self) -> usize {
        self.read().documents.len()
    }

    /// Processed on the submitting connection instead of a job thread.
    pub fn is_streaming(&self) -> bool {
        self.read().streaming
    }

    pub(crate) fn set_streaming(&self, streaming: bool) {
        self.write().streaming = streaming;
    }

    /// Append a document; returns its number.
    pub(crate) fn push_document(&self, mut document: Document) -> usize {
        let mut inner = self.write();
        document.number = inner.documents.len() + 1;
        inner.k_octets += document.size.div_ceil(1024);
        let number = document.number;
        debug!(job_id = self.id, document = number, format = %document.format, "document added");
        inner.documents.push(document);
        number
    }

    pub(crate) fn update_document(&self, number: usize, update: impl FnOnce(&mut Document)) {
        let mut inner = self.write();
        if let Some(document) = inner.documents.iter_mut().find(|d| d.number == number) {
            update(document);
        }
    }

    /// Spool files still referenced by this job.
    pub(crate) fn spool_files(&self) -> Vec<PathBuf> {
        self.read()
            .documents
            .iter()
            .filter_map(|d| d.file.clone())
            .collect()
    }

    /// Snapshot for status queries.
    pub fn status(&self) -> JobStatus {
        let inner = self.read();
        JobStatus {
            id: self.id,
            printer_id: self.printer_id,
            name: self.name.clone(),
            username: self.username.clone(),
            state: inner.state,
            reasons: inner.reasons,
            message: inner.message.clone(),
            created: self.created,
            processing: inner.processing,
            completed: inner.completed,
            documents: inner.documents.len(),
            impressions: inner.impressions,
            impressions_completed: inner.impressions_completed,
            copies: inner.copies,
            copies_completed: inner.copies_completed,
            k_octets: inner.k_octets,
        }
    }
}

/// A job write guard. Borrowing from a `LockedPrinter` it cannot be taken
/// before, or held after, the printer's write lock.
pub(crate) struct LockedJob<'p> {
    job: &'p Job,
    inner: RwLockWriteGuard<'p, JobInner>,
}

impl<'p> LockedJob<'p> {
    pub(crate) fn new(_printer: &'p LockedPrinter<'_>, job: &'p Job) -> Self {
        Self {
            job,
            inner: job.write(),
        }
    }

    pub fn job(&self) -> &Job {
        self.job
    }

    pub fn state(&self) -> JobState {
        self.inner.state
    }

    pub fn reasons(&self) -> JobReasons {
        self.inner.reasons
    }

    pub fn impressions_completed(&self) -> u32 {
        self.inner.impressions_completed
    }

    pub fn transition(&mut self, to: JobState) -> Result<()> {
        let from = self.inner.state;
        if from == to {
            return Ok(());
        }
        if !from.can_transition(to) {
            return Err(DruckwerkError::InvalidTransition { from, to });
        }
        debug!(job_id = self.job.id, ?from, ?to, "job state change");
        self.inner.state = to;
        match to {
            JobState::Processing if self.inner.processing.is_none() => {
                self.inner.processing = Some(Utc::now());
            }
            JobState::Canceled | JobState::Aborted | JobState::Completed => {
                self.inner.completed = Some(Utc::now());
            }
            _ => {}
        }
        Ok(())
    }

    pub fn set_reasons(&mut self, add: JobReasons, remove: JobReasons) {
        self.inner.reasons = (self.inner.reasons - remove) | add;
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.inner.message = message.into();
    }

    pub fn state_event(&self) -> Event {
        Event::JobStateChanged {
            printer: self.job.printer_name.clone(),
            job_id: self.job.id,
            state: self.inner.state,
            reasons: self.inner.reasons,
        }
    }

    /// Mark every document with the job's final state.
    pub fn settle_documents(&mut self) {
        let state = self.inner.state;
        for document in &mut self.inner.documents {
            if !document.state.is_terminal() {
                document.state = state;
            }
        }
    }
}
