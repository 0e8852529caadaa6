// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Druckwerk — Core types, errors, and configuration shared across all crates.

pub mod arena;
pub mod attributes;
pub mod cancel;
pub mod config;
pub mod driver_data;
pub mod error;
pub mod media;
pub mod status;
pub mod types;

pub use arena::{Arena, Handle};
pub use attributes::{AttrValue, Attribute, AttributeGroup, RES_PER_CM, RES_PER_INCH};
pub use cancel::CancelToken;
pub use config::SystemConfig;
pub use driver_data::DriverData;
pub use error::{DruckwerkError, Result};
pub use media::{MediaCol, parse_pwg_dimensions};
pub use status::{JobStatus, PrinterStatus};
pub use types::*;
