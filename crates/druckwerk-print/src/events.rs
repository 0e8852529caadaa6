// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// State-change notifications. The scheduler reports every job and printer
// transition through a single sink; subscription fan-out lives elsewhere.

use std::sync::{Mutex, PoisonError};

use druckwerk_core::{JobReasons, JobState, PrinterReasons, PrinterState};
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum Event {
    PrinterCreated {
        printer: String,
    },
    PrinterDeleted {
        printer: String,
    },
    PrinterStateChanged {
        printer: String,
        state: PrinterState,
        reasons: PrinterReasons,
    },
    JobCreated {
        printer: String,
        job_id: i32,
        state: JobState,
    },
    JobStateChanged {
        printer: String,
        job_id: i32,
        state: JobState,
        reasons: JobReasons,
    },
    JobProgress {
        printer: String,
        job_id: i32,
        impressions_completed: u32,
    },
    JobCompleted {
        printer: String,
        job_id: i32,
        state: JobState,
    },
}

/// Receiver of state-change notifications. Called with no locks held.
pub trait EventSink: Send + Sync {
    fn notify(&self, event: Event);
}

/// Writes every event to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn notify(&self, event: Event) {
        match &event {
            Event::JobProgress { .. } => debug!(?event, "event"),
            _ => info!(?event, "event"),
        }
    }
}

/// Keeps events in memory for inspection.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<Event>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything received so far.
    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Printer state transitions seen for `printer`, in order.
    pub fn printer_states(&self, printer: &str) -> Vec<PrinterState> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::PrinterStateChanged {
                    printer: p, state, ..
                } if p == printer => Some(state),
                _ => None,
            })
            .collect()
    }

    /// Job state transitions seen for `job_id`, in order.
    pub fn job_states(&self, job_id: i32) -> Vec<JobState> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::JobStateChanged {
                    job_id: id, state, ..
                } if id == job_id => Some(state),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for MemoryEventSink {
    fn notify(&self, event: Event) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
