// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Point-in-time status snapshots returned to status queries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{JobReasons, JobState, PrinterReasons, PrinterState};

/// Snapshot of one job, taken under the job's read lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub id: i32,
    pub printer_id: u32,
    pub name: String,
    pub username: String,
    pub state: JobState,
    pub reasons: JobReasons,
    pub message: String,
    pub created: DateTime<Utc>,
    pub processing: Option<DateTime<Utc>>,
    pub completed: Option<DateTime<Utc>>,
    pub documents: usize,
    pub impressions: u32,
    pub impressions_completed: u32,
    pub copies: u32,
    pub copies_completed: u32,
    pub k_octets: u64,
}

/// Snapshot of one printer, taken under the printer's read lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrinterStatus {
    pub id: u32,
    pub name: String,
    pub uuid: Uuid,
    pub resource: String,
    pub state: PrinterState,
    pub reasons: PrinterReasons,
    pub state_time: DateTime<Utc>,
    pub device_uri: String,
    pub accepting: bool,
    pub active_jobs: usize,
    pub completed_jobs: usize,
    pub processing_job: Option<i32>,
    pub impressions_completed: u64,
}
