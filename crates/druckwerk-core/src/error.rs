// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Druckwerk.

use thiserror::Error;

use crate::types::{JobReasons, JobState};

/// Top-level error type for all Druckwerk operations.
#[derive(Debug, Error)]
pub enum DruckwerkError {
    // -- Device errors --
    #[error("unable to open device '{uri}': {reason}")]
    DeviceOpen { uri: String, reason: String },

    #[error("unsupported device URI scheme: {0}")]
    DeviceScheme(String),

    #[error("device I/O failed: {0}")]
    DeviceIo(String),

    #[error("device already in use")]
    DeviceBusy,

    // -- Driver errors --
    #[error("driver callback '{callback}' failed: {reason}")]
    Driver {
        callback: &'static str,
        reason: String,
    },

    // -- Document errors --
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("document format error: {0}")]
    DocumentFormat(String),

    #[error("document unprintable: {0}")]
    DocumentUnprintable(String),

    #[error("image processing failed: {0}")]
    ImageError(String),

    // -- Job / printer lifecycle --
    #[error("job state cannot change from {from:?} to {to:?}")]
    InvalidTransition { from: JobState, to: JobState },

    #[error("job {0} not found")]
    JobNotFound(i32),

    #[error("printer '{0}' not found")]
    PrinterNotFound(String),

    #[error("printer name '{0}' is already in use")]
    PrinterExists(String),

    #[error("printer is not accepting jobs")]
    NotAccepting,

    #[error("system is shutting down")]
    ShuttingDown,

    // -- Server --
    #[error("print server error: {0}")]
    PrintServer(String),

    #[error("malformed IPP request: {0}")]
    BadRequest(String),

    // -- Storage / configuration --
    #[error("spool error: {0}")]
    Spool(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DruckwerkError {
    /// Build a driver callback error.
    pub fn driver(callback: &'static str, reason: impl Into<String>) -> Self {
        Self::Driver {
            callback,
            reason: reason.into(),
        }
    }

    /// Job state reason to attach when this error aborts a job.
    pub fn job_reason(&self) -> JobReasons {
        match self {
            Self::UnsupportedFormat(_) | Self::DocumentFormat(_) => {
                JobReasons::DOCUMENT_FORMAT_ERROR
            }
            Self::DocumentUnprintable(_) | Self::ImageError(_) => {
                JobReasons::DOCUMENT_UNPRINTABLE_ERROR
            }
            Self::Io(_) | Self::Spool(_) => JobReasons::DOCUMENT_ACCESS_ERROR,
            _ => JobReasons::ABORTED_BY_SYSTEM,
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DruckwerkError>;
