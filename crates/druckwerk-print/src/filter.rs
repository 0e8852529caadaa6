// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// MIME filter registry and the built-in filters.
//
// A filter reads one document and drives the job's raster target. Lookup
// for a `(source, driver format)` pair tries the exact pair, then
// `(source, image/pwg-raster)`, then raw passthrough when the source is
// already the driver's format.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Cursor, ErrorKind, Read};
use std::sync::{Arc, PoisonError, RwLock};

use druckwerk_core::{CancelToken, DriverData, DruckwerkError, Quality, Result, SystemConfig};
use druckwerk_raster::{
    ImageRef, Options, PageHeader, PageLimits, RenderOutcome, Replay, filter_image,
    process_raster_stream,
};
use image::ImageReader;
use tracing::{debug, info, instrument};

use crate::driver::JobTarget;
use crate::job::{Document, Job};
use crate::resolver::resolve_options;

pub const PWG_RASTER: &str = "image/pwg-raster";

/// Everything a filter needs for one document.
pub struct FilterContext<'a> {
    pub job: &'a Job,
    pub document: &'a Document,
    /// Printer capabilities as of job start.
    pub driver_data: &'a DriverData,
    pub config: &'a SystemConfig,
    pub target: JobTarget<'a>,
}

impl FilterContext<'_> {
    /// Resolve rendering options for this document.
    pub fn options(&self, page_count: u32, is_color: bool) -> Options {
        resolve_options(
            self.driver_data,
            self.job.attributes(),
            &self.document.attributes,
            page_count,
            is_color,
        )
    }

    pub fn cancel(&self) -> &CancelToken {
        self.job.cancel_token()
    }
}

pub type FilterFn =
    dyn Fn(&mut FilterContext<'_>, &mut dyn Read) -> Result<RenderOutcome> + Send + Sync;

/// Filters keyed by `(source, destination)` MIME type.
pub struct FilterRegistry {
    filters: RwLock<HashMap<(String, String), Arc<FilterFn>>>,
}

impl FilterRegistry {
    /// A registry with the JPEG, PNG, PWG and Apple raster filters.
    pub fn new() -> Self {
        let registry = Self {
            filters: RwLock::new(HashMap::new()),
        };
        registry.register("image/jpeg", PWG_RASTER, image_filter);
        registry.register("image/png", PWG_RASTER, image_filter);
        registry.register(PWG_RASTER, PWG_RASTER, raster_filter);
        registry.register("image/urf", PWG_RASTER, raster_filter);
        registry
    }

    pub fn register<F>(&self, source: &str, destination: &str, filter: F)
    where
        F: Fn(&mut FilterContext<'_>, &mut dyn Read) -> Result<RenderOutcome> + Send + Sync + 'static,
    {
        self.filters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((source.to_string(), destination.to_string()), Arc::new(filter));
    }

    fn get(&self, source: &str, destination: &str) -> Option<Arc<FilterFn>> {
        self.filters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(source.to_string(), destination.to_string()))
            .cloned()
    }

    /// Filter for documents of `source` type printed by a driver that
    /// emits `driver_format`.
    pub fn find(&self, source: &str, driver_format: &str) -> Option<Arc<FilterFn>> {
        if let Some(filter) = self.get(source, driver_format) {
            return Some(filter);
        }
        if let Some(filter) = self.get(source, PWG_RASTER) {
            return Some(filter);
        }
        if source == driver_format {
            let raw: Arc<FilterFn> = Arc::new(passthrough_filter);
            return Some(raw);
        }
        None
    }

    /// Source formats with a filter to `driver_format`.
    pub fn sources_for(&self, driver_format: &str) -> Vec<String> {
        let filters = self.filters.read().unwrap_or_else(PoisonError::into_inner);
        let mut sources: Vec<String> = filters
            .keys()
            .filter(|(_, dst)| dst == driver_format || dst == PWG_RASTER)
            .map(|(src, _)| src.clone())
            .collect();
        if !sources.iter().any(|s| s == driver_format) {
            sources.push(driver_format.to_string());
        }
        sources.sort();
        sources.dedup();
        sources
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let filters = self.filters.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("FilterRegistry")
            .field("filters", &filters.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Built-in filters
// ---------------------------------------------------------------------------

/// JPEG/PNG: decode with the `image` crate and render one page per copy.
#[instrument(skip_all, fields(job_id = ctx.job.id(), document = ctx.document.number))]
fn image_filter(ctx: &mut FilterContext<'_>, input: &mut dyn Read) -> Result<RenderOutcome> {
    let limit = ctx.config.max_image_bytes;
    let mut data = Vec::new();
    input
        .take(limit as u64 + 1)
        .read_to_end(&mut data)
        .map_err(|e| DruckwerkError::Spool(format!("read document: {e}")))?;
    if data.len() > limit {
        return Err(DruckwerkError::DocumentUnprintable(format!(
            "image larger than {limit} bytes"
        )));
    }

    let (width, height) = ImageReader::new(Cursor::new(&data))
        .with_guessed_format()
        .map_err(|e| DruckwerkError::DocumentFormat(format!("image format detection: {e}")))?
        .into_dimensions()
        .map_err(|e| DruckwerkError::DocumentFormat(format!("image header: {e}")))?;
    if width > ctx.config.max_image_width || height > ctx.config.max_image_height {
        return Err(DruckwerkError::DocumentUnprintable(format!(
            "image is {width}x{height}, limit {}x{}",
            ctx.config.max_image_width, ctx.config.max_image_height
        )));
    }

    let decoded = image::load_from_memory(&data)
        .map_err(|e| DruckwerkError::DocumentFormat(format!("image decode: {e}")))?;
    drop(data);
    let is_color = decoded.color().has_color();
    let (pixels, depth) = if is_color {
        (decoded.to_rgb8().into_raw(), 3)
    } else {
        (decoded.to_luma8().into_raw(), 1)
    };
    drop(decoded);
    debug!(width, height, is_color, "image decoded");

    let number = ctx.document.number;
    ctx.job.update_document(number, |d| {
        d.is_color = Some(is_color);
        d.impressions = 1;
    });

    let options = ctx.options(1, is_color);
    ctx.job.set_impressions(ctx.job.impressions_completed() + options.copies);
    let image = ImageRef::new(&pixels, width, height, depth, 0)?;
    let smoothing = options.quality == Quality::High;
    let cancel = ctx.job.cancel_token();
    filter_image(&mut ctx.target, &options, &image, smoothing, cancel)
}

/// PWG and Apple raster: re-render page by page, following the client's
/// per-page colour. Software copies read the spool file again.
#[instrument(skip_all, fields(job_id = ctx.job.id(), document = ctx.document.number))]
fn raster_filter(ctx: &mut FilterContext<'_>, input: &mut dyn Read) -> Result<RenderOutcome> {
    let (job, document, driver_data) = (ctx.job, ctx.document, ctx.driver_data);
    let limits = PageLimits::new(ctx.config.max_image_width, ctx.config.max_image_height);
    let mut resolve = |page: u32, header: &PageHeader| -> Result<Options> {
        debug!(page, color = header.is_color(), "resolving raster page");
        Ok(resolve_options(
            driver_data,
            job.attributes(),
            &document.attributes,
            header.total_page_count(),
            header.is_color(),
        ))
    };

    let mut passes = 1u32;
    let mut reopen = || -> Result<Box<dyn Read>> {
        let path = document
            .file
            .as_ref()
            .ok_or_else(|| DruckwerkError::Spool("streamed document cannot be read again".into()))?;
        let file = File::open(path)
            .map_err(|e| DruckwerkError::Spool(format!("open {}: {e}", path.display())))?;
        passes += 1;
        Ok(Box::new(BufReader::new(file)))
    };
    let replay = match document.file {
        Some(_) => Some(&mut reopen as &mut Replay<'_>),
        None => None,
    };

    let outcome = process_raster_stream(
        &mut ctx.target,
        input,
        replay,
        limits,
        &mut resolve,
        job.cancel_token(),
    )?;
    job.update_document(document.number, |d| d.impressions = outcome.pages / passes);
    Ok(outcome)
}

/// Copy the document to the device unchanged.
fn passthrough_filter(ctx: &mut FilterContext<'_>, input: &mut dyn Read) -> Result<RenderOutcome> {
    let cancel = ctx.job.cancel_token().clone();
    let device = ctx.target.device();
    let mut buf = vec![0u8; 64 * 1024];
    let mut total = 0u64;
    let mut canceled = false;
    loop {
        if cancel.is_canceled() {
            canceled = true;
            break;
        }
        let n = match input.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(DruckwerkError::Spool(format!("read document: {e}"))),
        };
        device.write(&buf[..n])?;
        total += n as u64;
    }
    device.flush()?;
    info!(bytes = total, canceled, "document passed through");
    Ok(RenderOutcome {
        pages: 0,
        copies: u32::from(!canceled),
        canceled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_formats_reach_pwg_drivers() {
        let registry = FilterRegistry::new();
        for source in ["image/jpeg", "image/png", "image/pwg-raster", "image/urf"] {
            assert!(registry.find(source, PWG_RASTER).is_some(), "{source}");
        }
        assert!(registry.find("application/pdf", PWG_RASTER).is_none());
    }

    #[test]
    fn native_format_falls_back_to_passthrough() {
        let registry = FilterRegistry::new();
        assert!(registry.find("application/vnd.zebra-zpl", "application/vnd.zebra-zpl").is_some());
        assert!(registry.find("application/vnd.zebra-zpl", PWG_RASTER).is_none());
        // Images still go through the raster path for a ZPL driver.
        assert!(registry.find("image/png", "application/vnd.zebra-zpl").is_some());
    }

    #[test]
    fn sources_include_registered_and_native_formats() {
        let registry = FilterRegistry::new();
        registry.register("image/x-test", "application/x-native", |_, _| Ok(RenderOutcome::default()));
        let sources = registry.sources_for("application/x-native");
        assert!(sources.contains(&"image/x-test".to_string()));
        assert!(sources.contains(&"image/png".to_string()));
        assert!(sources.contains(&"application/x-native".to_string()));
    }
}
