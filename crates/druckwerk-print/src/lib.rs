// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// druckwerk-print — Printers, jobs, and the scheduler that drives them.
//
// A `System` owns printers; each printer owns its jobs and runs at most one
// at a time on a dedicated thread, pushing pages through its `Driver` to a
// device opened from the `DeviceRegistry`. The embedded `IppServer` exposes
// every printer over IPP.

pub mod device;
pub mod driver;
pub mod drivers;
pub mod events;
pub mod filter;
pub mod ipp;
pub mod job;
pub mod printer;
pub mod resolver;
mod scheduler;
pub mod signal;
pub mod spool;
pub mod system;

#[cfg(test)]
pub(crate) mod test_support;

pub use device::{DeviceHandle, DeviceRegistry, Transport};
pub use driver::{Driver, JobTarget};
pub use drivers::PwgDriver;
pub use events::{Event, EventSink, LogEventSink, MemoryEventSink};
pub use filter::FilterRegistry;
pub use ipp::IppServer;
pub use job::{Document, Job};
pub use printer::{Printer, WhichJobs};
pub use resolver::resolve_options;
pub use spool::Spool;
pub use system::System;
