// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document spool: files named `p<printer>j<job>d<doc>.<ext>` under one
// directory, hashed as they are written.

use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use druckwerk_core::{DruckwerkError, Result};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// A document written to the spool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpooledFile {
    pub path: PathBuf,
    pub size: u64,
    /// Hex SHA-256 of the file contents.
    pub sha256: String,
}

#[derive(Debug, Clone)]
pub struct Spool {
    dir: PathBuf,
}

impl Spool {
    /// Open (creating if needed) the spool directory.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| DruckwerkError::Spool(format!("create {}: {e}", dir.display())))?;
        let dir = dir
            .canonicalize()
            .map_err(|e| DruckwerkError::Spool(format!("resolve {}: {e}", dir.display())))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, printer_id: u32, job_id: i32, document: usize, format: &str) -> PathBuf {
        self.dir.join(format!(
            "p{printer_id:05}j{job_id:05}d{document}.{}",
            extension_for(format)
        ))
    }

    /// Copy `reader` into a new spool file.
    pub fn store(
        &self,
        printer_id: u32,
        job_id: i32,
        document: usize,
        format: &str,
        mut reader: impl Read,
    ) -> Result<SpooledFile> {
        let path = self.path_for(printer_id, job_id, document, format);
        let mut file = File::create(&path)
            .map_err(|e| DruckwerkError::Spool(format!("create {}: {e}", path.display())))?;

        let mut hasher = Sha256::new();
        let mut size = 0u64;
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    drop(file);
                    self.discard(&path);
                    return Err(DruckwerkError::Spool(format!("read document: {e}")));
                }
            };
            if let Err(e) = file.write_all(&buf[..n]) {
                drop(file);
                self.discard(&path);
                return Err(DruckwerkError::Spool(format!("write {}: {e}", path.display())));
            }
            hasher.update(&buf[..n]);
            size += n as u64;
        }
        file.flush()?;

        let sha256 = hex::encode(hasher.finalize());
        debug!(path = %path.display(), size, sha256 = %sha256, "document spooled");
        Ok(SpooledFile { path, size, sha256 })
    }

    /// Convenience for in-memory documents.
    pub fn store_bytes(
        &self,
        printer_id: u32,
        job_id: i32,
        document: usize,
        format: &str,
        data: &[u8],
    ) -> Result<SpooledFile> {
        self.store(printer_id, job_id, document, format, data)
    }

    /// Delete a spool file. Paths outside the spool directory are refused;
    /// a file that is already gone is not an error.
    pub fn remove(&self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .and_then(|p| p.canonicalize().ok())
            .ok_or_else(|| DruckwerkError::Spool(format!("{} is not spooled", path.display())))?;
        if parent != self.dir {
            return Err(DruckwerkError::Spool(format!(
                "refusing to remove {} outside {}",
                path.display(),
                self.dir.display()
            )));
        }
        match fs::remove_file(path) {
            Ok(()) => {
                debug!(path = %path.display(), "spool file removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DruckwerkError::Spool(format!("remove {}: {e}", path.display()))),
        }
    }

    fn discard(&self, path: &Path) {
        if let Err(e) = fs::remove_file(path) {
            warn!(path = %path.display(), error = %e, "could not discard partial spool file");
        }
    }
}

/// File extension for a document MIME type.
pub fn extension_for(format: &str) -> &'static str {
    match format {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/pwg-raster" => "pwg",
        "image/urf" => "urf",
        "application/pdf" => "pdf",
        "application/postscript" => "ps",
        "text/plain" => "txt",
        _ => "dat",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn files_are_named_by_printer_job_and_document() {
        let dir = tempfile::tempdir().expect("tempdir");
        let spool = Spool::new(dir.path()).expect("spool");
        let path = spool.path_for(1, 42, 2, "image/png");
        assert_eq!(
            path.file_name().and_then(|n| n.to_str()),
            Some("p00001j00042d2.png")
        );
    }

    #[test]
    fn store_records_size_and_digest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let spool = Spool::new(dir.path()).expect("spool");
        let file = spool
            .store_bytes(1, 1, 1, "text/plain", b"abc")
            .expect("store");
        assert_eq!(file.size, 3);
        assert_eq!(
            file.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(fs::read(&file.path).expect("read"), b"abc");
    }

    #[test]
    fn remove_refuses_foreign_paths() {
        let spool_dir = tempfile::tempdir().expect("tempdir");
        let other = tempfile::tempdir().expect("tempdir");
        let spool = Spool::new(spool_dir.path()).expect("spool");

        let foreign = other.path().join("keep.txt");
        fs::write(&foreign, b"x").expect("write");
        assert!(matches!(spool.remove(&foreign), Err(DruckwerkError::Spool(_))));
        assert!(foreign.exists());

        let file = spool.store_bytes(1, 1, 1, "text/plain", b"x").expect("store");
        spool.remove(&file.path).expect("remove");
        assert!(!file.path.exists());
        spool.remove(&file.path).expect("second remove is a no-op");
    }
}
