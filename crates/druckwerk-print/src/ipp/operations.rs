// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// IPP operation dispatch: validates a parsed request, routes it to the
// printer or job it names, and builds the response message.
//
// Supported operations (RFC 8011 §4):
//
//   - Print-Job              (0x0002)
//   - Validate-Job           (0x0004)
//   - Create-Job             (0x0005)
//   - Send-Document          (0x0006)
//   - Cancel-Job             (0x0008)
//   - Get-Job-Attributes     (0x0009)
//   - Get-Jobs               (0x000A)
//   - Get-Printer-Attributes (0x000B)
//   - Hold-Job               (0x000C)
//   - Release-Job            (0x000D)
//   - Pause-Printer          (0x0010)
//   - Resume-Printer         (0x0011)
//
// Handlers run on the blocking pool: they take printer and job locks and a
// raster Print-Job prints before it returns.

use std::io::Cursor;
use std::sync::Arc;

use chrono::Utc;
use druckwerk_core::{
    AttrValue, Attribute, AttributeGroup, DriverData, DruckwerkError, Finishings, JobReasons,
    JobState, PrinterReasons, Quality, RES_PER_INCH, Resolution,
};
use tracing::{debug, info, warn};

use super::wire::{
    IppMessage, TAG_DOCUMENT_ATTRIBUTES, TAG_JOB_ATTRIBUTES, TAG_OPERATION_ATTRIBUTES,
    TAG_PRINTER_ATTRIBUTES, TAG_UNSUPPORTED_ATTRIBUTES, VALUE_TAG_NO_VALUE,
};
use crate::filter::PWG_RASTER;
use crate::job::Job;
use crate::printer::{Printer, WhichJobs};
use crate::system::System;

// ---------------------------------------------------------------------------
// Operation ids (RFC 8011 §5.4.15)
// ---------------------------------------------------------------------------

pub const OP_PRINT_JOB: u16 = 0x0002;
pub const OP_VALIDATE_JOB: u16 = 0x0004;
pub const OP_CREATE_JOB: u16 = 0x0005;
pub const OP_SEND_DOCUMENT: u16 = 0x0006;
pub const OP_CANCEL_JOB: u16 = 0x0008;
pub const OP_GET_JOB_ATTRIBUTES: u16 = 0x0009;
pub const OP_GET_JOBS: u16 = 0x000A;
pub const OP_GET_PRINTER_ATTRIBUTES: u16 = 0x000B;
pub const OP_HOLD_JOB: u16 = 0x000C;
pub const OP_RELEASE_JOB: u16 = 0x000D;
pub const OP_PAUSE_PRINTER: u16 = 0x0010;
pub const OP_RESUME_PRINTER: u16 = 0x0011;

const SUPPORTED_OPERATIONS: [u16; 12] = [
    OP_PRINT_JOB,
    OP_VALIDATE_JOB,
    OP_CREATE_JOB,
    OP_SEND_DOCUMENT,
    OP_CANCEL_JOB,
    OP_GET_JOB_ATTRIBUTES,
    OP_GET_JOBS,
    OP_GET_PRINTER_ATTRIBUTES,
    OP_HOLD_JOB,
    OP_RELEASE_JOB,
    OP_PAUSE_PRINTER,
    OP_RESUME_PRINTER,
];

// ---------------------------------------------------------------------------
// Status codes (RFC 8011 §B)
// ---------------------------------------------------------------------------

pub const STATUS_OK: u16 = 0x0000;
pub const STATUS_BAD_REQUEST: u16 = 0x0400;
pub const STATUS_NOT_POSSIBLE: u16 = 0x0404;
pub const STATUS_NOT_FOUND: u16 = 0x0406;
pub const STATUS_DOCUMENT_FORMAT_NOT_SUPPORTED: u16 = 0x040A;
pub const STATUS_ATTRIBUTES_NOT_SUPPORTED: u16 = 0x040B;
pub const STATUS_CHARSET_NOT_SUPPORTED: u16 = 0x040D;
pub const STATUS_DOCUMENT_FORMAT_ERROR: u16 = 0x0411;
pub const STATUS_INTERNAL_ERROR: u16 = 0x0500;
pub const STATUS_OPERATION_NOT_SUPPORTED: u16 = 0x0501;
pub const STATUS_SERVICE_UNAVAILABLE: u16 = 0x0502;
pub const STATUS_VERSION_NOT_SUPPORTED: u16 = 0x0503;
pub const STATUS_NOT_ACCEPTING_JOBS: u16 = 0x0506;
pub const STATUS_BUSY: u16 = 0x0507;

const OCTET_STREAM: &str = "application/octet-stream";
const URF: &str = "image/urf";

/// Outcome of one HTTP request carrying IPP.
#[derive(Debug)]
pub(crate) enum Reply {
    Ipp(Vec<u8>),
    /// The resource names no printer.
    NotFound,
}

/// Handle one request body posted to `path`. `host` is the authority the
/// client used, for building URIs.
pub(crate) fn handle(system: &Arc<System>, path: &str, host: &str, body: &[u8]) -> Reply {
    let Some((printer, path_job)) = resolve_path(system, path) else {
        debug!(path, "no printer at resource");
        return Reply::NotFound;
    };
    let (request, offset) = match IppMessage::parse(body) {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!(error = %err, "malformed IPP request");
            let placeholder = IppMessage::new((1, 1), 0, 0);
            let failure = Failure::new(STATUS_BAD_REQUEST, format!("malformed IPP request: {err}"));
            return Reply::Ipp(failure.into_response(&placeholder).encode());
        }
    };

    let response = match validate(&request) {
        Ok(op) => {
            let ctx = Context {
                system,
                printer,
                host,
                request: &request,
                op,
                document: &body[offset..],
                path_job,
            };
            dispatch(&ctx)
        }
        Err(failure) => Err(failure),
    };
    let message = response.unwrap_or_else(|failure| {
        debug!(status = %format!("{:#06x}", failure.status), message = %failure.message, "request failed");
        failure.into_response(&request)
    });
    Reply::Ipp(message.encode())
}

/// Printer (and job id, for job URIs) served at `path`. `/` and
/// `/ipp/print` are the default printer.
fn resolve_path(system: &System, path: &str) -> Option<(Arc<Printer>, Option<i32>)> {
    let path = path.split('?').next().unwrap_or(path).trim_end_matches('/');
    if path.is_empty() || path == "/ipp/print" {
        return system.default_printer().map(|p| (p, None));
    }
    if let Some(printer) = system.find_printer_by_resource(path) {
        return Some((printer, None));
    }
    let (base, id) = path.rsplit_once('/')?;
    let id: i32 = id.parse().ok()?;
    let printer = if base == "/ipp/print" {
        system.default_printer()?
    } else {
        system.find_printer_by_resource(base)?
    };
    Some((printer, Some(id)))
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

/// A non-successful IPP status with its message.
#[derive(Debug)]
struct Failure {
    status: u16,
    message: String,
    unsupported: Option<Attribute>,
}

impl Failure {
    fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            unsupported: None,
        }
    }

    fn unsupported(mut self, attr: Attribute) -> Self {
        self.unsupported = Some(attr);
        self
    }

    fn into_response(self, request: &IppMessage) -> IppMessage {
        let mut response = response_for(request, self.status, &self.message);
        if let Some(attr) = self.unsupported {
            response.push_group(TAG_UNSUPPORTED_ATTRIBUTES).insert(attr);
        }
        response
    }
}

impl From<DruckwerkError> for Failure {
    fn from(err: DruckwerkError) -> Self {
        let status = match &err {
            DruckwerkError::JobNotFound(_) | DruckwerkError::PrinterNotFound(_) => STATUS_NOT_FOUND,
            DruckwerkError::InvalidTransition { .. } => STATUS_NOT_POSSIBLE,
            DruckwerkError::NotAccepting => STATUS_NOT_ACCEPTING_JOBS,
            DruckwerkError::ShuttingDown => STATUS_SERVICE_UNAVAILABLE,
            DruckwerkError::DeviceBusy => STATUS_BUSY,
            DruckwerkError::UnsupportedFormat(_) => STATUS_DOCUMENT_FORMAT_NOT_SUPPORTED,
            DruckwerkError::DocumentFormat(_) => STATUS_DOCUMENT_FORMAT_ERROR,
            DruckwerkError::BadRequest(_) => STATUS_BAD_REQUEST,
            _ => STATUS_INTERNAL_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

type Outcome = Result<IppMessage, Failure>;

/// Response header and operation group, echoing the request's version
/// when it is one we speak.
fn response_for(request: &IppMessage, status: u16, message: &str) -> IppMessage {
    let version = if matches!(request.version.0, 1 | 2) {
        request.version
    } else {
        (1, 1)
    };
    let mut response = IppMessage::new(version, status, request.request_id);
    let op = response.push_group(TAG_OPERATION_ATTRIBUTES);
    op.insert(Attribute::new("attributes-charset", AttrValue::Charset("utf-8".into())));
    op.insert(Attribute::new(
        "attributes-natural-language",
        AttrValue::Language("en".into()),
    ));
    if !message.is_empty() {
        op.insert(Attribute::new("status-message", AttrValue::text(message)));
    }
    response
}

/// Check the version, request id, and leading operation attributes.
fn validate(request: &IppMessage) -> Result<&AttributeGroup, Failure> {
    if !matches!(request.version.0, 1 | 2) {
        return Err(Failure::new(
            STATUS_VERSION_NOT_SUPPORTED,
            format!("IPP/{}.{} is not supported", request.version.0, request.version.1),
        ));
    }
    if request.request_id == 0 {
        return Err(Failure::new(STATUS_BAD_REQUEST, "request-id must not be zero"));
    }
    let op = request
        .groups
        .first()
        .filter(|g| g.tag == TAG_OPERATION_ATTRIBUTES)
        .map(|g| &g.attributes)
        .ok_or_else(|| Failure::new(STATUS_BAD_REQUEST, "missing operation attributes"))?;

    let leading: Vec<&str> = op.iter().take(2).map(|a| a.name.as_str()).collect();
    if leading != ["attributes-charset", "attributes-natural-language"] {
        return Err(Failure::new(
            STATUS_BAD_REQUEST,
            "attributes-charset and attributes-natural-language must come first",
        ));
    }
    let charset = op.string("attributes-charset").unwrap_or_default();
    if !charset.eq_ignore_ascii_case("utf-8") && !charset.eq_ignore_ascii_case("us-ascii") {
        return Err(Failure::new(
            STATUS_CHARSET_NOT_SUPPORTED,
            format!("charset '{charset}' is not supported"),
        ));
    }
    Ok(op)
}

// ---------------------------------------------------------------------------
// Request context
// ---------------------------------------------------------------------------

struct Context<'a> {
    system: &'a Arc<System>,
    printer: Arc<Printer>,
    host: &'a str,
    request: &'a IppMessage,
    op: &'a AttributeGroup,
    document: &'a [u8],
    /// Job id taken from a job URI in the request path.
    path_job: Option<i32>,
}

impl Context<'_> {
    fn ok(&self) -> IppMessage {
        response_for(self.request, STATUS_OK, "successful-ok")
    }

    fn username(&self) -> String {
        self.op
            .string("requesting-user-name")
            .filter(|u| !u.is_empty())
            .unwrap_or("anonymous")
            .to_string()
    }

    fn job_name(&self) -> String {
        self.op
            .string("job-name")
            .or_else(|| self.op.string("document-name"))
            .unwrap_or("Untitled")
            .to_string()
    }

    fn job_template(&self) -> AttributeGroup {
        self.request
            .group(TAG_JOB_ATTRIBUTES)
            .cloned()
            .unwrap_or_default()
    }

    fn document_template(&self) -> AttributeGroup {
        self.request
            .group(TAG_DOCUMENT_ATTRIBUTES)
            .cloned()
            .unwrap_or_default()
    }

    fn printer_uri(&self) -> String {
        format!("ipp://{}{}", self.host, self.printer.resource())
    }

    fn job_uri(&self, job: &Job) -> String {
        format!("{}/{}", self.printer_uri(), job.id())
    }

    /// The job named by `job-id`, `job-uri`, or the request path.
    fn target_job(&self) -> Result<Arc<Job>, Failure> {
        let id = self
            .op
            .integer("job-id")
            .or_else(|| {
                self.op
                    .string("job-uri")
                    .and_then(|uri| uri.rsplit('/').next())
                    .and_then(|id| id.parse().ok())
            })
            .or(self.path_job)
            .ok_or_else(|| Failure::new(STATUS_BAD_REQUEST, "missing job-id or job-uri"))?;
        self.printer
            .find_job(id)
            .ok_or_else(|| Failure::new(STATUS_NOT_FOUND, format!("job {id} not found")))
    }

    fn requested(&self, default: &[&str]) -> Requested {
        let names = self.op.strings("requested-attributes");
        if names.is_empty() {
            return if default.is_empty() {
                Requested::All
            } else {
                Requested::Names(default.iter().map(|s| s.to_string()).collect())
            };
        }
        if names.iter().any(|n| {
            matches!(
                *n,
                "all" | "job-description" | "job-template" | "printer-description"
            )
        }) {
            return Requested::All;
        }
        Requested::Names(names.into_iter().map(str::to_string).collect())
    }

    /// Resolve `document-format`, sniffing `application/octet-stream` when
    /// data is at hand, and check that a filter exists for it.
    fn document_format(&self, data: Option<&[u8]>) -> Result<String, Failure> {
        let requested = self.op.string("document-format").unwrap_or(OCTET_STREAM);
        let format = if requested == OCTET_STREAM {
            match data.and_then(sniff_format) {
                Some(detected) => detected,
                None if data.is_none() => return Ok(OCTET_STREAM.to_string()),
                None => OCTET_STREAM,
            }
        } else {
            requested
        };
        let driver = self.printer.driver();
        if self.system.filters().find(format, driver.format()).is_none() {
            return Err(Failure::new(
                STATUS_DOCUMENT_FORMAT_NOT_SUPPORTED,
                format!("document format '{format}' is not supported"),
            )
            .unsupported(Attribute::new(
                "document-format",
                AttrValue::MimeType(requested.to_string()),
            )));
        }
        Ok(format.to_string())
    }
}

enum Requested {
    All,
    Names(Vec<String>),
}

impl Requested {
    fn filter(&self, group: AttributeGroup) -> AttributeGroup {
        match self {
            Self::All => group,
            Self::Names(names) => {
                let mut filtered = AttributeGroup::new();
                for attr in group.iter().filter(|a| names.contains(&a.name)) {
                    filtered.insert(attr.clone());
                }
                filtered
            }
        }
    }
}

/// Recognize a document from its leading bytes.
fn sniff_format(data: &[u8]) -> Option<&'static str> {
    if data.starts_with(b"RaS2") {
        Some(PWG_RASTER)
    } else if data.starts_with(b"UNIRAST") {
        Some(URF)
    } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if data.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("image/png")
    } else if data.starts_with(b"%PDF") {
        Some("application/pdf")
    } else {
        None
    }
}

fn is_raster(format: &str) -> bool {
    format == PWG_RASTER || format == URF
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

fn operation_name(code: u16) -> &'static str {
    match code {
        OP_PRINT_JOB => "Print-Job",
        OP_VALIDATE_JOB => "Validate-Job",
        OP_CREATE_JOB => "Create-Job",
        OP_SEND_DOCUMENT => "Send-Document",
        OP_CANCEL_JOB => "Cancel-Job",
        OP_GET_JOB_ATTRIBUTES => "Get-Job-Attributes",
        OP_GET_JOBS => "Get-Jobs",
        OP_GET_PRINTER_ATTRIBUTES => "Get-Printer-Attributes",
        OP_HOLD_JOB => "Hold-Job",
        OP_RELEASE_JOB => "Release-Job",
        OP_PAUSE_PRINTER => "Pause-Printer",
        OP_RESUME_PRINTER => "Resume-Printer",
        _ => "unsupported",
    }
}

fn dispatch(ctx: &Context<'_>) -> Outcome {
    let code = ctx.request.code;
    debug!(
        operation = operation_name(code),
        printer = %ctx.printer.name(),
        request_id = ctx.request.request_id,
        doc_bytes = ctx.document.len(),
        "IPP request"
    );
    match code {
        OP_PRINT_JOB => print_job(ctx),
        OP_VALIDATE_JOB => validate_job(ctx),
        OP_CREATE_JOB => create_job(ctx),
        OP_SEND_DOCUMENT => send_document(ctx),
        OP_CANCEL_JOB => cancel_job(ctx),
        OP_GET_JOB_ATTRIBUTES => get_job_attributes(ctx),
        OP_GET_JOBS => get_jobs(ctx),
        OP_GET_PRINTER_ATTRIBUTES => get_printer_attributes(ctx),
        OP_HOLD_JOB => hold_job(ctx),
        OP_RELEASE_JOB => release_job(ctx),
        OP_PAUSE_PRINTER => {
            ctx.printer.pause();
            Ok(ctx.ok())
        }
        OP_RESUME_PRINTER => {
            ctx.printer.resume();
            Ok(ctx.ok())
        }
        other => {
            warn!(operation = %format!("{other:#06x}"), "unsupported IPP operation");
            Err(Failure::new(
                STATUS_OPERATION_NOT_SUPPORTED,
                format!("operation {other:#06x} is not supported"),
            ))
        }
    }
}

// ---------------------------------------------------------------------------
// Job submission
// ---------------------------------------------------------------------------

fn check_accepting(ctx: &Context<'_>) -> Result<(), Failure> {
    if ctx.system.is_shutting_down() {
        return Err(Failure::new(STATUS_SERVICE_UNAVAILABLE, "server is shutting down"));
    }
    if !ctx.printer.is_accepting() {
        return Err(Failure::new(STATUS_NOT_ACCEPTING_JOBS, "printer is not accepting jobs"));
    }
    Ok(())
}

fn print_job(ctx: &Context<'_>) -> Outcome {
    check_accepting(ctx)?;
    if ctx.document.is_empty() {
        return Err(Failure::new(STATUS_BAD_REQUEST, "no document data"));
    }
    let format = ctx.document_format(Some(ctx.document))?;
    let name = ctx.job_name();
    let job = ctx
        .printer
        .create_job(&ctx.username(), &name, ctx.job_template())?;

    if is_raster(&format) {
        let mut reader = Cursor::new(ctx.document);
        if let Err(err) = ctx
            .printer
            .stream_job(&job, &format, ctx.document_template(), &mut reader)
        {
            warn!(job_id = job.id(), error = %err, "streamed job failed");
        }
    } else {
        spool_document(ctx, &job, &format, &name)?;
        ctx.printer.submit_job(&job)?;
    }

    info!(
        printer = %ctx.printer.name(),
        job_id = job.id(),
        format = %format,
        bytes = ctx.document.len(),
        "Print-Job accepted"
    );
    Ok(job_response(ctx, &job))
}

/// Spool one document; a failure aborts the job.
fn spool_document(ctx: &Context<'_>, job: &Arc<Job>, format: &str, name: &str) -> Result<(), Failure> {
    let result = ctx.printer.add_document(
        job,
        format,
        name,
        ctx.document_template(),
        Cursor::new(ctx.document),
    );
    if let Err(err) = result {
        ctx.printer.finish_job(job, Some(&err), None);
        return Err(err.into());
    }
    Ok(())
}

fn validate_job(ctx: &Context<'_>) -> Outcome {
    check_accepting(ctx)?;
    ctx.document_format(None)?;
    Ok(ctx.ok())
}

fn create_job(ctx: &Context<'_>) -> Outcome {
    check_accepting(ctx)?;
    let job = ctx
        .printer
        .create_job(&ctx.username(), &ctx.job_name(), ctx.job_template())?;
    info!(printer = %ctx.printer.name(), job_id = job.id(), "Create-Job accepted");
    Ok(job_response(ctx, &job))
}

fn send_document(ctx: &Context<'_>) -> Outcome {
    let job = ctx.target_job()?;
    let last = ctx
        .op
        .boolean("last-document")
        .ok_or_else(|| Failure::new(STATUS_BAD_REQUEST, "missing last-document"))?;
    if job.state() != JobState::Held || !job.reasons().contains(JobReasons::JOB_INCOMING) {
        return Err(Failure::new(
            STATUS_NOT_POSSIBLE,
            format!("job {} is not accepting documents", job.id()),
        ));
    }

    let mut streamed = false;
    if !ctx.document.is_empty() {
        let format = ctx.document_format(Some(ctx.document))?;
        let name = ctx
            .op
            .string("document-name")
            .unwrap_or(job.name())
            .to_string();
        if is_raster(&format) && last && job.document_count() == 0 {
            let mut reader = Cursor::new(ctx.document);
            if let Err(err) = ctx
                .printer
                .stream_job(&job, &format, ctx.document_template(), &mut reader)
            {
                warn!(job_id = job.id(), error = %err, "streamed job failed");
            }
            streamed = true;
        } else {
            spool_document(ctx, &job, &format, &name)?;
        }
    }

    if last && !streamed {
        if job.document_count() == 0 {
            return Err(Failure::new(STATUS_BAD_REQUEST, "no document data"));
        }
        ctx.printer.submit_job(&job)?;
    }
    info!(
        printer = %ctx.printer.name(),
        job_id = job.id(),
        last,
        documents = job.document_count(),
        "Send-Document accepted"
    );
    Ok(job_response(ctx, &job))
}

// ---------------------------------------------------------------------------
// Job control and status
// ---------------------------------------------------------------------------

fn cancel_job(ctx: &Context<'_>) -> Outcome {
    let job = ctx.target_job()?;
    ctx.printer.cancel_job(job.id())?;
    Ok(ctx.ok())
}

fn hold_job(ctx: &Context<'_>) -> Outcome {
    let job = ctx.target_job()?;
    ctx.printer.hold_job(job.id())?;
    Ok(ctx.ok())
}

fn release_job(ctx: &Context<'_>) -> Outcome {
    let job = ctx.target_job()?;
    ctx.printer.release_job(job.id())?;
    Ok(ctx.ok())
}

fn get_job_attributes(ctx: &Context<'_>) -> Outcome {
    let job = ctx.target_job()?;
    let requested = ctx.requested(&[]);
    let mut response = ctx.ok();
    *response.push_group(TAG_JOB_ATTRIBUTES) = requested.filter(job_attributes(ctx, &job));
    Ok(response)
}

fn get_jobs(ctx: &Context<'_>) -> Outcome {
    let which = match ctx.op.string("which-jobs") {
        None => WhichJobs::Active,
        Some(keyword) => WhichJobs::from_keyword(keyword).ok_or_else(|| {
            Failure::new(
                STATUS_ATTRIBUTES_NOT_SUPPORTED,
                format!("which-jobs '{keyword}' is not supported"),
            )
            .unsupported(Attribute::new("which-jobs", AttrValue::keyword(keyword)))
        })?,
    };
    let limit = ctx
        .op
        .integer("limit")
        .filter(|l| *l > 0)
        .map_or(usize::MAX, |l| l as usize);
    let mine = ctx.op.boolean("my-jobs").unwrap_or(false);
    let username = ctx.username();
    let requested = ctx.requested(&["job-id", "job-uri"]);

    let mut response = ctx.ok();
    let jobs = ctx.printer.jobs(which);
    for job in jobs
        .iter()
        .filter(|job| !mine || job.username() == username)
        .take(limit)
    {
        *response.push_group(TAG_JOB_ATTRIBUTES) = requested.filter(job_attributes(ctx, job));
    }
    Ok(response)
}

/// The attributes returned with a newly created or updated job.
fn job_response(ctx: &Context<'_>, job: &Job) -> IppMessage {
    let requested = Requested::Names(
        ["job-id", "job-uri", "job-state", "job-state-reasons", "job-state-message"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
    );
    let mut response = ctx.ok();
    *response.push_group(TAG_JOB_ATTRIBUTES) = requested.filter(job_attributes(ctx, job));
    response
}

fn keywords_or_none(keywords: Vec<&str>) -> Vec<AttrValue> {
    if keywords.is_empty() {
        vec![AttrValue::keyword("none")]
    } else {
        keywords.into_iter().map(AttrValue::keyword).collect()
    }
}

fn no_value() -> AttrValue {
    AttrValue::Unknown {
        tag: VALUE_TAG_NO_VALUE,
        data: Vec::new(),
    }
}

fn timestamp(seconds: i64) -> AttrValue {
    AttrValue::Integer(i32::try_from(seconds).unwrap_or(i32::MAX))
}

fn count(value: impl TryInto<i32>) -> AttrValue {
    AttrValue::Integer(value.try_into().unwrap_or(i32::MAX))
}

fn job_attributes(ctx: &Context<'_>, job: &Job) -> AttributeGroup {
    let status = job.status();
    let mut group = AttributeGroup::new()
        .with("job-id", AttrValue::Integer(status.id))
        .with("job-uri", AttrValue::Uri(ctx.job_uri(job)))
        .with("job-printer-uri", AttrValue::Uri(ctx.printer_uri()))
        .with("job-name", AttrValue::name(status.name.clone()))
        .with(
            "job-originating-user-name",
            AttrValue::name(status.username.clone()),
        )
        .with("job-state", AttrValue::Enum(status.state.ipp_enum()))
        .with("job-impressions-completed", count(status.impressions_completed))
        .with("job-k-octets", count(status.k_octets))
        .with("number-of-documents", count(status.documents))
        .with("copies-completed", count(status.copies_completed))
        .with("time-at-creation", timestamp(status.created.timestamp()))
        .with(
            "time-at-processing",
            status
                .processing
                .map_or_else(no_value, |t| timestamp(t.timestamp())),
        )
        .with(
            "time-at-completed",
            status
                .completed
                .map_or_else(no_value, |t| timestamp(t.timestamp())),
        )
        .with("job-printer-up-time", timestamp(Utc::now().timestamp()));
    group.insert(Attribute::with_values(
        "job-state-reasons",
        keywords_or_none(status.reasons.keywords()),
    ));
    if status.impressions > 0 {
        group.insert(Attribute::new("job-impressions", count(status.impressions)));
    }
    if !status.message.is_empty() {
        group.insert(Attribute::new("job-state-message", AttrValue::text(status.message)));
    }
    if let Some(hold) = job.hold_until() {
        group.insert(Attribute::new("job-hold-until", AttrValue::keyword(hold)));
    }
    group
}

// ---------------------------------------------------------------------------
// Printer attributes
// ---------------------------------------------------------------------------

fn get_printer_attributes(ctx: &Context<'_>) -> Outcome {
    let requested = ctx.requested(&[]);
    let mut response = ctx.ok();
    *response.push_group(TAG_PRINTER_ATTRIBUTES) = requested.filter(printer_attributes(ctx));
    Ok(response)
}

fn keywords(values: &[&str]) -> Vec<AttrValue> {
    values.iter().map(|v| AttrValue::keyword(*v)).collect()
}

fn resolution(res: Resolution) -> AttrValue {
    AttrValue::Resolution {
        x: i32::try_from(res.x).unwrap_or(i32::MAX),
        y: i32::try_from(res.y).unwrap_or(i32::MAX),
        units: RES_PER_INCH,
    }
}

fn media_col(data: &DriverData) -> AttributeGroup {
    let media = &data.media_default;
    let size = AttributeGroup::new()
        .with("x-dimension", AttrValue::Integer(media.size_width))
        .with("y-dimension", AttrValue::Integer(media.size_length));
    let mut col = AttributeGroup::new()
        .with("media-size", AttrValue::Collection(size))
        .with("media-size-name", AttrValue::keyword(media.size_name.clone()))
        .with("media-bottom-margin", AttrValue::Integer(media.bottom_margin))
        .with("media-left-margin", AttrValue::Integer(media.left_margin))
        .with("media-right-margin", AttrValue::Integer(media.right_margin))
        .with("media-top-margin", AttrValue::Integer(media.top_margin));
    if !media.source.is_empty() {
        col.insert(Attribute::new("media-source", AttrValue::keyword(media.source.clone())));
    }
    if !media.media_type.is_empty() {
        col.insert(Attribute::new("media-type", AttrValue::keyword(media.media_type.clone())));
    }
    col
}

fn printer_attributes(ctx: &Context<'_>) -> AttributeGroup {
    let status = ctx.printer.status();
    let data = ctx.printer.driver_data();
    let driver = ctx.printer.driver();
    let mut formats = ctx.system.filters().sources_for(driver.format());
    formats.push(OCTET_STREAM.to_string());

    let reasons = if status.reasons.is_empty() {
        vec!["none"]
    } else {
        status.reasons.keywords()
    };
    let operations = SUPPORTED_OPERATIONS
        .iter()
        .map(|op| AttrValue::Enum(i32::from(*op)))
        .collect();
    let finishings = std::iter::once(AttrValue::Enum(3))
        .chain(
            Finishings::all()
                .iter()
                .filter(|f| data.finishings.contains(*f))
                .filter_map(Finishings::ipp_enum)
                .map(AttrValue::Enum),
        )
        .collect();

    let mut group = AttributeGroup::new()
        .with("printer-uri-supported", AttrValue::Uri(ctx.printer_uri()))
        .with("uri-security-supported", AttrValue::keyword("none"))
        .with("uri-authentication-supported", AttrValue::keyword("none"))
        .with("printer-name", AttrValue::name(status.name.clone()))
        .with("printer-info", AttrValue::text(status.name.clone()))
        .with(
            "printer-make-and-model",
            AttrValue::text(data.make_and_model.clone()),
        )
        .with("printer-uuid", AttrValue::Uri(format!("urn:uuid:{}", status.uuid)))
        .with("printer-state", AttrValue::Enum(status.state.ipp_enum()))
        .with(
            "printer-state-change-time",
            timestamp(status.state_time.timestamp()),
        )
        .with("printer-is-accepting-jobs", AttrValue::Boolean(status.accepting))
        .with("queued-job-count", count(status.active_jobs))
        .with("printer-up-time", timestamp(Utc::now().timestamp()))
        .with("charset-configured", AttrValue::Charset("utf-8".into()))
        .with("natural-language-configured", AttrValue::Language("en".into()))
        .with(
            "generated-natural-language-supported",
            AttrValue::Language("en".into()),
        )
        .with("compression-supported", AttrValue::keyword("none"))
        .with("pdl-override-supported", AttrValue::keyword("attempted"))
        .with("document-format-default", AttrValue::MimeType(OCTET_STREAM.into()))
        .with("multiple-document-jobs-supported", AttrValue::Boolean(true))
        .with("job-ids-supported", AttrValue::Boolean(true))
        .with("color-supported", AttrValue::Boolean(data.supports_color()))
        .with(
            "copies-supported",
            AttrValue::Range {
                lower: 1,
                upper: i32::try_from(data.copies_supported.max(1)).unwrap_or(i32::MAX),
            },
        )
        .with("copies-default", count(data.copies_default.max(1)))
        .with("media-default", AttrValue::keyword(data.media_default.size_name.clone()))
        .with("media-col-default", AttrValue::Collection(media_col(&data)))
        .with("print-quality-default", AttrValue::Enum(data.quality_default.ipp_enum()))
        .with("orientation-requested-default", AttrValue::Enum(data.orient_default.ipp_enum()))
        .with("printer-resolution-default", resolution(data.resolution_default))
        .with("pages-per-minute", count(data.ppm));

    let lists: [(&str, Vec<AttrValue>); 9] = [
        ("printer-state-reasons", keywords(&reasons)),
        ("ipp-versions-supported", keywords(&["1.1", "2.0"])),
        ("operations-supported", operations),
        ("charset-supported", vec![
            AttrValue::Charset("utf-8".into()),
            AttrValue::Charset("us-ascii".into()),
        ]),
        (
            "document-format-supported",
            formats.into_iter().map(AttrValue::MimeType).collect(),
        ),
        ("which-jobs-supported", keywords(&["completed", "not-completed", "all"])),
        ("job-hold-until-supported", keywords(&["no-hold", "indefinite"])),
        (
            "print-quality-supported",
            [Quality::Draft, Quality::Normal, Quality::High]
                .iter()
                .map(|q| AttrValue::Enum(q.ipp_enum()))
                .collect(),
        ),
        ("finishings-supported", finishings),
    ];
    for (name, values) in lists {
        group.insert(Attribute::with_values(name, values));
    }

    let keyword_sets: [(&str, Vec<&str>); 8] = [
        ("print-color-mode-supported", data.color_supported.keywords()),
        ("print-color-mode-default", data.color_default.keywords()),
        ("sides-supported", data.sides_supported.keywords()),
        ("sides-default", data.sides_default.keywords()),
        ("print-content-optimize-default", data.content_default.keywords()),
        ("print-scaling-default", data.scaling_default.keywords()),
        ("pwg-raster-document-type-supported", data.raster_types.keywords()),
        (
            "media-supported",
            data.media.iter().map(String::as_str).collect(),
        ),
    ];
    for (name, values) in keyword_sets {
        if !values.is_empty() {
            group.insert(Attribute::with_values(name, keywords(&values)));
        }
    }
    for (name, values) in [
        ("media-source-supported", &data.sources),
        ("media-type-supported", &data.types),
    ] {
        if !values.is_empty() {
            group.insert(Attribute::with_values(
                name,
                values.iter().map(|v| AttrValue::keyword(v.clone())).collect(),
            ));
        }
    }

    if !data.resolutions.is_empty() {
        let values: Vec<AttrValue> = data.resolutions.iter().copied().map(resolution).collect();
        group.insert(Attribute::with_values("printer-resolution-supported", values.clone()));
        group.insert(Attribute::with_values(
            "pwg-raster-document-resolution-supported",
            values,
        ));
    }
    if data.supports_color() && data.ppm_color > 0 {
        group.insert(Attribute::new("pages-per-minute-color", count(data.ppm_color)));
    }
    if data.darkness_supported > 0 {
        group.insert(Attribute::new("print-darkness-supported", count(data.darkness_supported)));
        group.insert(Attribute::new("print-darkness-default", AttrValue::Integer(data.darkness_default)));
    }
    let (slow, fast) = data.speed_supported;
    if fast > 0 {
        group.insert(Attribute::new(
            "print-speed-supported",
            AttrValue::Range {
                lower: slow,
                upper: fast,
            },
        ));
        group.insert(Attribute::new("print-speed-default", AttrValue::Integer(data.speed_default)));
    }
    if status.reasons.contains(PrinterReasons::OFFLINE_REPORT) {
        group.insert(Attribute::new(
            "printer-state-message",
            AttrValue::text("device unavailable, retrying"),
        ));
    }
    group
}
