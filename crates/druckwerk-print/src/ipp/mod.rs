// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// IPP over HTTP: wire codec, request framing, operations, and the server.

pub mod http;
pub mod operations;
mod server;
pub mod wire;

pub use server::IppServer;
pub use wire::{IppGroup, IppMessage, WireError};
