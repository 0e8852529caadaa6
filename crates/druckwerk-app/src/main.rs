// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Druckwerk — standalone printer application.
//
// Usage: druckwerk [CONFIG.json] [DEVICE-URI]
//
// Loads the configuration (defaults when no file is given), creates one PWG
// raster printer on the device, and serves it over IPP until Ctrl-C.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use druckwerk_core::{DriverData, DruckwerkError, Result, SystemConfig};
use druckwerk_print::{EventSink, IppServer, LogEventSink, PwgDriver, System};
use tracing::{error, info, warn};

/// Name of the printer created at startup.
const PRINTER_NAME: &str = "druckwerk";

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "druckwerk failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => SystemConfig::load(Path::new(&path))?,
        None => {
            info!("no configuration file given, using defaults");
            SystemConfig::default()
        }
    };
    let device_uri = args.next().unwrap_or_else(|| {
        format!("file://{}", config.spool_dir.join("output.prn").display())
    });

    info!(server = %config.server_name, "Druckwerk starting");
    let events: Arc<dyn EventSink> = Arc::new(LogEventSink);
    let system = System::new(config, events)?;
    system.create_printer(
        PRINTER_NAME,
        Arc::new(PwgDriver::default()),
        DriverData::default(),
        &device_uri,
    )?;

    let mut server = IppServer::new(Arc::clone(&system));
    let addr = server.start().await?;
    info!(%addr, printer = PRINTER_NAME, device_uri = %device_uri, "ready");

    tokio::signal::ctrl_c().await?;
    info!("interrupt received, shutting down");
    server.stop().await?;

    // Draining waits on printing threads.
    let drained = tokio::task::spawn_blocking(move || system.shutdown())
        .await
        .map_err(|e| DruckwerkError::PrintServer(format!("shutdown join: {e}")))?;
    if drained {
        info!("all printers drained");
    } else {
        warn!("shutdown timed out with jobs still printing");
    }
    Ok(())
}
