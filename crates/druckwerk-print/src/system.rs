// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The system: owner of every printer, the shared registries, and the spool.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use druckwerk_core::{Arena, DriverData, DruckwerkError, Handle, Result, SystemConfig};
use tracing::{info, instrument, warn};

use crate::device::DeviceRegistry;
use crate::driver::Driver;
use crate::events::{Event, EventSink};
use crate::filter::FilterRegistry;
use crate::printer::Printer;
use crate::spool::Spool;

/// Longest single wait while draining printers at shutdown.
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

struct SystemInner {
    printers: Arena<Arc<Printer>>,
    next_printer_id: u32,
    default_printer: Option<Handle<Arc<Printer>>>,
}

/// Root object. Printers hold a weak reference back to it.
pub struct System {
    config: SystemConfig,
    inner: RwLock<SystemInner>,
    devices: DeviceRegistry,
    filters: FilterRegistry,
    spool: Spool,
    events: Arc<dyn EventSink>,
    shutdown: AtomicBool,
}

impl System {
    pub fn new(config: SystemConfig, events: Arc<dyn EventSink>) -> Result<Arc<Self>> {
        config.validate()?;
        let spool = Spool::new(config.spool_dir.clone())?;
        info!(server = %config.server_name, spool = %spool.dir().display(), "system created");
        Ok(Arc::new(Self {
            config,
            inner: RwLock::new(SystemInner {
                printers: Arena::new(),
                next_printer_id: 1,
                default_printer: None,
            }),
            devices: DeviceRegistry::new(),
            filters: FilterRegistry::new(),
            spool,
            events,
            shutdown: AtomicBool::new(false),
        }))
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    pub fn events(&self) -> &dyn EventSink {
        self.events.as_ref()
    }

    pub fn devices(&self) -> &DeviceRegistry {
        &self.devices
    }

    pub fn filters(&self) -> &FilterRegistry {
        &self.filters
    }

    pub fn spool(&self) -> &Spool {
        &self.spool
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn read(&self) -> RwLockReadGuard<'_, SystemInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SystemInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    // -----------------------------------------------------------------------
    // Printers
    // -----------------------------------------------------------------------

    /// Add a printer. The first printer becomes the default.
    #[instrument(skip(self, driver, driver_data), fields(driver = driver.name()))]
    pub fn create_printer(
        self: &Arc<Self>,
        name: &str,
        driver: Arc<dyn Driver>,
        driver_data: DriverData,
        device_uri: &str,
    ) -> Result<Arc<Printer>> {
        if self.is_shutting_down() {
            return Err(DruckwerkError::ShuttingDown);
        }
        if name.is_empty() || name.contains('/') || name.chars().any(char::is_whitespace) {
            return Err(DruckwerkError::Config(format!("invalid printer name '{name}'")));
        }

        let printer = {
            let mut inner = self.write();
            if inner.printers.iter().any(|(_, p)| p.name() == name) {
                return Err(DruckwerkError::PrinterExists(name.to_string()));
            }
            let id = inner.next_printer_id;
            inner.next_printer_id += 1;
            let handle = inner.printers.next_handle();
            let printer = Arc::new(Printer::new(
                id,
                name,
                handle,
                driver,
                driver_data,
                device_uri,
                Arc::downgrade(self),
            ));
            inner.printers.insert(Arc::clone(&printer));
            if inner.default_printer.is_none() {
                inner.default_printer = Some(handle);
            }
            printer
        };

        info!(printer = name, id = printer.id(), device_uri, "printer created");
        self.events.notify(Event::PrinterCreated {
            printer: name.to_string(),
        });
        Ok(printer)
    }

    pub fn find_printer(&self, handle: Handle<Arc<Printer>>) -> Option<Arc<Printer>> {
        self.read().printers.get(handle).cloned()
    }

    pub fn find_printer_by_name(&self, name: &str) -> Option<Arc<Printer>> {
        self.read()
            .printers
            .iter()
            .find(|(_, p)| p.name() == name)
            .map(|(_, p)| Arc::clone(p))
    }

    /// Printer served at an IPP resource path such as `/ipp/print/<name>`.
    pub fn find_printer_by_resource(&self, resource: &str) -> Option<Arc<Printer>> {
        self.read()
            .printers
            .iter()
            .find(|(_, p)| p.resource() == resource)
            .map(|(_, p)| Arc::clone(p))
    }

    pub fn default_printer(&self) -> Option<Arc<Printer>> {
        let inner = self.read();
        inner
            .default_printer
            .and_then(|handle| inner.printers.get(handle).cloned())
    }

    pub fn set_default_printer(&self, handle: Handle<Arc<Printer>>) -> Result<()> {
        let mut inner = self.write();
        let name = inner
            .printers
            .get(handle)
            .map(|p| p.name().to_string())
            .ok_or_else(|| DruckwerkError::PrinterNotFound(format!("{handle:?}")))?;
        inner.default_printer = Some(handle);
        info!(printer = %name, "default printer set");
        Ok(())
    }

    /// Live printers in creation order.
    pub fn printers(&self) -> Vec<Arc<Printer>> {
        self.read()
            .printers
            .iter()
            .map(|(_, p)| Arc::clone(p))
            .collect()
    }

    /// Delete a printer. Queued jobs are canceled; a job that is printing
    /// runs to its next page boundary, and the printer is removed when it
    /// finishes.
    pub fn delete_printer(&self, handle: Handle<Arc<Printer>>) -> Result<()> {
        let printer = self
            .find_printer(handle)
            .ok_or_else(|| DruckwerkError::PrinterNotFound(format!("{handle:?}")))?;
        if printer.mark_deleted() {
            self.remove_printer(handle);
        }
        Ok(())
    }

    pub(crate) fn remove_printer(&self, handle: Handle<Arc<Printer>>) {
        let printer = {
            let mut inner = self.write();
            let Some(printer) = inner.printers.remove(handle) else {
                return;
            };
            if inner.default_printer == Some(handle) {
                let next = inner.printers.iter().next().map(|(h, _)| h);
                inner.default_printer = next;
            }
            printer
        };

        let (files, device) = {
            let mut locked = printer.lock();
            let files: Vec<_> = locked
                .jobs
                .iter()
                .flat_map(|(_, job)| job.spool_files())
                .collect();
            (files, locked.device.take())
        };
        if let Some(device) = device {
            device.close();
        }
        for path in files {
            if let Err(err) = self.spool.remove(&path) {
                warn!(path = %path.display(), error = %err, "spool file not removed");
            }
        }
        info!(printer = %printer.name(), "printer removed");
        self.events.notify(Event::PrinterDeleted {
            printer: printer.name().to_string(),
        });
    }

    // -----------------------------------------------------------------------
    // Shutdown
    // -----------------------------------------------------------------------

    /// Stop scheduling, wake every waiting thread, and wait up to the
    /// configured shutdown timeout for printing jobs to finish. Jobs still
    /// waiting for a device are requeued. Returns `true` when every printer
    /// drained in time.
    #[instrument(skip(self))]
    pub fn shutdown(&self) -> bool {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return true;
        }
        let printers = self.printers();
        for printer in &printers {
            printer.signal().notify();
        }

        let deadline = Instant::now() + self.config.shutdown_timeout();
        let mut drained = true;
        for printer in &printers {
            loop {
                let seen = printer.signal().generation();
                if printer.read().processing_job.is_none() {
                    break;
                }
                let now = Instant::now();
                if now >= deadline {
                    warn!(printer = %printer.name(), "job still printing at shutdown");
                    drained = false;
                    break;
                }
                printer
                    .signal()
                    .wait_since(seen, SHUTDOWN_POLL.min(deadline - now));
            }
            let device = printer.lock().device.take();
            if let Some(device) = device {
                device.close();
            }
        }
        info!(drained, "system shut down");
        drained
    }
}

impl std::fmt::Debug for System {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("System")
            .field("server_name", &self.config.server_name)
            .field("printers", &self.read().printers.len())
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MemoryEventSink;
    use crate::test_support::{RecordingDriver, test_system};

    fn driver() -> Arc<dyn Driver> {
        Arc::new(RecordingDriver::default())
    }

    #[test]
    fn first_printer_becomes_default() {
        let (system, events, _spool) = test_system();
        let a = system
            .create_printer("alpha", driver(), DriverData::default(), "file:///dev/null")
            .expect("alpha");
        let b = system
            .create_printer("beta", driver(), DriverData::default(), "file:///dev/null")
            .expect("beta");
        assert_eq!(system.default_printer().map(|p| p.id()), Some(a.id()));
        assert_eq!(b.resource(), "/ipp/print/beta");
        assert_eq!(
            system.find_printer_by_resource("/ipp/print/beta").map(|p| p.id()),
            Some(b.id())
        );
        assert_eq!(system.printers().len(), 2);
        assert!(events.events().contains(&Event::PrinterCreated {
            printer: "beta".into()
        }));
    }

    #[test]
    fn duplicate_and_invalid_names_are_rejected() {
        let (system, _events, _spool) = test_system();
        system
            .create_printer("alpha", driver(), DriverData::default(), "file:///dev/null")
            .expect("alpha");
        assert!(matches!(
            system.create_printer("alpha", driver(), DriverData::default(), "file:///dev/null"),
            Err(DruckwerkError::PrinterExists(_))
        ));
        assert!(matches!(
            system.create_printer("bad name", driver(), DriverData::default(), "file:///dev/null"),
            Err(DruckwerkError::Config(_))
        ));
    }

    #[test]
    fn deleting_idle_printer_moves_default() {
        let (system, events, _spool) = test_system();
        let a = system
            .create_printer("alpha", driver(), DriverData::default(), "file:///dev/null")
            .expect("alpha");
        let b = system
            .create_printer("beta", driver(), DriverData::default(), "file:///dev/null")
            .expect("beta");
        system.delete_printer(a.handle()).expect("delete");
        assert!(system.find_printer(a.handle()).is_none());
        assert_eq!(system.default_printer().map(|p| p.id()), Some(b.id()));
        assert!(events.events().contains(&Event::PrinterDeleted {
            printer: "alpha".into()
        }));
        assert!(matches!(
            system.delete_printer(a.handle()),
            Err(DruckwerkError::PrinterNotFound(_))
        ));
    }

    #[test]
    fn shutdown_refuses_new_printers() {
        let (system, _events, _spool) = test_system();
        assert!(system.shutdown());
        assert!(matches!(
            system.create_printer("late", driver(), DriverData::default(), "file:///dev/null"),
            Err(DruckwerkError::ShuttingDown)
        ));
    }

    #[test]
    fn bad_config_is_rejected() {
        let config = SystemConfig {
            device_retry_interval_ms: 0,
            ..SystemConfig::default()
        };
        assert!(System::new(config, Arc::new(MemoryEventSink::new())).is_err());
    }
}
