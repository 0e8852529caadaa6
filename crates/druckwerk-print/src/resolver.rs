// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Options resolver: document attributes, then job attributes, then the
// printer's defaults, flattened into one `Options`.
//
// Bad or unsupported values never fail a job. They are logged at debug and
// the default is used instead.

use druckwerk_core::{
    AttrValue, Attribute, AttributeGroup, ColorMode, ContentOptimize, DriverData, Finishings,
    MediaCol, Orientation, Quality, RasterType, Resolution, Scaling, Sides, parse_pwg_dimensions,
};
use druckwerk_raster::dither;
use druckwerk_raster::{Options, PageHeader};
use tracing::debug;

const COLOR_PREFERENCE: [RasterType; 3] =
    [RasterType::SRGB_8, RasterType::ADOBE_RGB_8, RasterType::RGB_8];
const MONO_PREFERENCE: [RasterType; 3] =
    [RasterType::SGRAY_8, RasterType::BLACK_8, RasterType::BLACK_1];

/// Document-over-job attribute lookup.
#[derive(Clone, Copy)]
struct Lookup<'a> {
    document: &'a AttributeGroup,
    job: &'a AttributeGroup,
}

impl<'a> Lookup<'a> {
    fn source(&self, name: &str) -> Option<&'a AttributeGroup> {
        if self.document.contains(name) {
            Some(self.document)
        } else if self.job.contains(name) {
            Some(self.job)
        } else {
            None
        }
    }

    fn get(&self, name: &str) -> Option<&'a Attribute> {
        self.source(name)?.get(name)
    }

    fn integer(&self, name: &str) -> Option<i32> {
        self.source(name)?.integer(name)
    }

    fn string(&self, name: &str) -> Option<&'a str> {
        self.source(name)?.string(name)
    }

    fn range(&self, name: &str) -> Option<(i32, i32)> {
        self.source(name)?.range(name)
    }

    fn resolution(&self, name: &str) -> Option<(i32, i32)> {
        self.source(name)?.resolution_dpi(name)
    }

    fn collection(&self, name: &str) -> Option<&'a AttributeGroup> {
        self.source(name)?.collection(name)
    }
}

/// Log and drop a value that cannot be used.
fn ignored<T>(name: &str, lookup: &Lookup<'_>) -> Option<T> {
    if let Some(attr) = lookup.get(name) {
        debug!(attribute = name, value = %attr.display_values(), "unsupported value, using default");
    }
    None
}

/// Resolve the options for one document.
///
/// `page_count` is the document's page count, 0 when unknown. `is_color`
/// says whether the content carries colour, for `print-color-mode=auto`.
pub fn resolve_options(
    data: &DriverData,
    job: &AttributeGroup,
    document: &AttributeGroup,
    page_count: u32,
    is_color: bool,
) -> Options {
    let lookup = Lookup { document, job };

    let media = resolve_media(data, &lookup);
    let color_mode = resolve_color_mode(data, &lookup, is_color);
    let content_optimize = lookup
        .string("print-content-optimize")
        .and_then(ContentOptimize::from_keyword)
        .or_else(|| ignored("print-content-optimize", &lookup))
        .unwrap_or(data.content_default);
    let quality = lookup
        .integer("print-quality")
        .and_then(Quality::from_ipp_enum)
        .or_else(|| ignored("print-quality", &lookup))
        .unwrap_or(data.quality_default);
    let resolution = resolve_resolution(data, &lookup, quality);
    let raster_type = select_raster_type(data, color_mode);
    let mono_type = if raster_type.intersects(RasterType::COLOR_TYPES) {
        mono_raster_type(data)
    } else {
        raster_type
    };

    let copies = lookup
        .integer("copies")
        .filter(|c| (1..=9999).contains(c))
        .map(|c| c as u32)
        .or_else(|| ignored("copies", &lookup))
        .unwrap_or(data.copies_default.max(1));
    let sides = lookup
        .string("sides")
        .and_then(Sides::from_keyword)
        .filter(|s| data.sides_supported.contains(*s))
        .or_else(|| ignored("sides", &lookup))
        .unwrap_or(data.sides_default);
    let darkness = resolve_darkness(data, &lookup);
    let (first_page, last_page) = resolve_page_range(&lookup, page_count);

    let mut options = Options::new(media, resolution, raster_type);
    options.copies = copies;
    options.finishings = resolve_finishings(data, &lookup);
    options.orientation = lookup
        .integer("orientation-requested")
        .and_then(Orientation::from_ipp_enum)
        .or_else(|| ignored("orientation-requested", &lookup))
        .unwrap_or(data.orient_default);
    options.color_mode = color_mode;
    options.content_optimize = content_optimize;
    options.quality = quality;
    options.darkness = darkness;
    options.speed = resolve_speed(data, &lookup);
    options.scaling = lookup
        .string("print-scaling")
        .and_then(Scaling::from_keyword)
        .or_else(|| ignored("print-scaling", &lookup))
        .unwrap_or(data.scaling_default);
    options.sides = sides;
    options.first_page = first_page;
    options.last_page = last_page;
    options.raster_types_supported = data.raster_types;
    options.dither = select_dither(data, raster_type, color_mode, content_optimize, quality, darkness);
    options.vendor = vendor_values(data, &lookup);
    options.num_pages = page_count;
    options.pages_per_set = lookup
        .integer("job-pages-per-set")
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0);

    // Hardware copies only when the device can produce them all.
    let hardware_copies = if data.copies_supported >= copies { copies } else { 1 };
    options.mono_header = PageHeader::pwg(&options.media, resolution, mono_type);
    for header in [&mut options.header, &mut options.mono_header] {
        header.num_copies = hardware_copies;
        header.set_sides(sides);
        header.set_quality(quality);
        header.set_total_page_count(page_count.saturating_mul(copies));
        header.media_type = options.media.media_type.clone();
    }

    debug!(
        media = %options.media.size_name,
        color_mode = ?options.color_mode,
        raster_type = ?options.raster_type,
        resolution = %options.resolution,
        copies = options.copies,
        "options resolved"
    );
    options
}

// ---------------------------------------------------------------------------
// Media
// ---------------------------------------------------------------------------

fn resolve_media(data: &DriverData, lookup: &Lookup<'_>) -> MediaCol {
    if let Some(col) = lookup.collection("media-col") {
        match media_from_col(data, col) {
            Some(media) => return media,
            None => debug!("unusable media-col, trying media"),
        }
    }
    if let Some(name) = lookup.string("media") {
        if data.supports_media(name) {
            if let Some(media) = media_from_name(data, name) {
                return media;
            }
        }
        debug!(media = name, "unsupported media, using default");
    }
    data.media_default.clone()
}

fn media_from_name(data: &DriverData, name: &str) -> Option<MediaCol> {
    if name == data.media_default.size_name {
        return Some(data.media_default.clone());
    }
    let mut media = MediaCol::from_pwg_name(name, data.left_right, data.bottom_top)?;
    media.source = data.media_default.source.clone();
    media.media_type = data.media_default.media_type.clone();
    Some(media)
}

fn media_from_col(data: &DriverData, col: &AttributeGroup) -> Option<MediaCol> {
    let mut media = if let Some(size) = col.collection("media-size") {
        let width = size.integer("x-dimension").filter(|w| *w > 0)?;
        let length = size.integer("y-dimension").filter(|l| *l > 0)?;
        let name = col
            .string("media-size-name")
            .map(str::to_string)
            .or_else(|| {
                data.media
                    .iter()
                    .find(|name| parse_pwg_dimensions(name) == Some((width, length)))
                    .cloned()
            })
            .unwrap_or_else(|| {
                format!(
                    "custom_{}x{}mm",
                    f64::from(width) / 100.0,
                    f64::from(length) / 100.0
                )
            });
        let mut media = media_from_name(data, &name).unwrap_or_else(|| MediaCol {
            size_name: name.clone(),
            size_width: width,
            size_length: length,
            bottom_margin: data.bottom_top,
            left_margin: data.left_right,
            right_margin: data.left_right,
            top_margin: data.bottom_top,
            source: data.media_default.source.clone(),
            media_type: data.media_default.media_type.clone(),
        });
        media.size_name = name;
        media.size_width = width;
        media.size_length = length;
        media
    } else if let Some(name) = col.string("media-size-name") {
        if !data.supports_media(name) {
            return None;
        }
        media_from_name(data, name)?
    } else {
        data.media_default.clone()
    };

    for (attr, margin) in [
        ("media-bottom-margin", &mut media.bottom_margin),
        ("media-left-margin", &mut media.left_margin),
        ("media-right-margin", &mut media.right_margin),
        ("media-top-margin", &mut media.top_margin),
    ] {
        match col.integer(attr) {
            Some(value) if value > 0 || (value == 0 && data.borderless) => *margin = value,
            Some(value) => debug!(attribute = attr, value, "margin not supported"),
            None => {}
        }
    }
    if let Some(source) = col.string("media-source") {
        if data.sources.iter().any(|s| s == source) {
            media.source = source.to_string();
        }
    }
    if let Some(media_type) = col.string("media-type") {
        if data.types.iter().any(|t| t == media_type) {
            media.media_type = media_type.to_string();
        }
    }
    Some(media)
}

// ---------------------------------------------------------------------------
// Colour and raster type
// ---------------------------------------------------------------------------

fn resolve_color_mode(data: &DriverData, lookup: &Lookup<'_>, is_color: bool) -> ColorMode {
    let requested = lookup
        .string("print-color-mode")
        .and_then(ColorMode::from_keyword)
        .filter(|mode| data.color_supported.contains(*mode))
        .or_else(|| ignored("print-color-mode", lookup))
        .unwrap_or(data.color_default);

    if requested == ColorMode::AUTO && is_color && data.supports_color() {
        ColorMode::COLOR
    } else if requested == ColorMode::AUTO || requested == ColorMode::AUTO_MONOCHROME {
        ColorMode::MONOCHROME
    } else if requested == ColorMode::COLOR && !data.supports_color() {
        ColorMode::MONOCHROME
    } else {
        requested
    }
}

fn first_supported(data: &DriverData, preference: &[RasterType]) -> Option<RasterType> {
    preference
        .iter()
        .copied()
        .find(|t| data.raster_types.contains(*t))
}

fn mono_raster_type(data: &DriverData) -> RasterType {
    first_supported(data, &MONO_PREFERENCE).unwrap_or(RasterType::SGRAY_8)
}

fn select_raster_type(data: &DriverData, color_mode: ColorMode) -> RasterType {
    if !data.force_raster_type.is_empty() {
        return data.force_raster_type;
    }
    if color_mode == ColorMode::BI_LEVEL && data.raster_types.contains(RasterType::BLACK_1) {
        return RasterType::BLACK_1;
    }
    if color_mode == ColorMode::COLOR {
        if let Some(t) = first_supported(data, &COLOR_PREFERENCE) {
            return t;
        }
    }
    first_supported(data, &MONO_PREFERENCE)
        .or_else(|| {
            // Lowest declared type when none of the usual ones is offered.
            let bits = data.raster_types.bits();
            (bits != 0).then(|| RasterType::from_bits_truncate(1 << bits.trailing_zeros()))
        })
        .unwrap_or(RasterType::SGRAY_8)
}

fn select_dither(
    data: &DriverData,
    raster_type: RasterType,
    color_mode: ColorMode,
    content: ContentOptimize,
    quality: Quality,
    darkness: i32,
) -> [[u8; 16]; 16] {
    let base = if raster_type == RasterType::BLACK_1
        && (color_mode == ColorMode::BI_LEVEL || quality == Quality::Draft)
    {
        dither::threshold()
    } else if content == ContentOptimize::PHOTO {
        data.pdither.unwrap_or_else(dither::bayer)
    } else {
        data.gdither.unwrap_or_else(dither::clustered)
    };
    dither::apply_darkness(&base, darkness)
}

// ---------------------------------------------------------------------------
// Scalar attributes
// ---------------------------------------------------------------------------

fn resolve_resolution(data: &DriverData, lookup: &Lookup<'_>, quality: Quality) -> Resolution {
    if let Some((x, y)) = lookup.resolution("printer-resolution") {
        if let Some(found) = data
            .resolutions
            .iter()
            .copied()
            .find(|r| i64::from(r.x) == i64::from(x) && i64::from(r.y) == i64::from(y))
        {
            return found;
        }
        debug!(x, y, "unsupported printer-resolution, using default");
        return data.resolution_default;
    }
    let area = |r: &Resolution| u64::from(r.x) * u64::from(r.y);
    match quality {
        Quality::Draft => data.resolutions.iter().copied().min_by_key(area),
        Quality::High => data.resolutions.iter().copied().max_by_key(area),
        Quality::Normal => None,
    }
    .unwrap_or(data.resolution_default)
}

fn resolve_finishings(data: &DriverData, lookup: &Lookup<'_>) -> Finishings {
    let Some(attr) = lookup.get("finishings") else {
        return Finishings::empty();
    };
    let mut finishings = Finishings::empty();
    for value in attr.values.iter().filter_map(AttrValue::as_i32) {
        match Finishings::from_ipp_enum(value) {
            Some(f) if data.finishings.contains(f) => finishings |= f,
            // 3 is "none".
            _ if value == 3 => {}
            _ => debug!(value, "unsupported finishing ignored"),
        }
    }
    finishings
}

fn resolve_darkness(data: &DriverData, lookup: &Lookup<'_>) -> i32 {
    let requested = if data.darkness_supported > 0 {
        lookup
            .integer("print-darkness")
            .filter(|d| (-100..=100).contains(d))
            .or_else(|| ignored("print-darkness", lookup))
            .unwrap_or(data.darkness_default)
    } else {
        data.darkness_default
    };
    requested.saturating_add(data.darkness_configured).clamp(-100, 100)
}

fn resolve_speed(data: &DriverData, lookup: &Lookup<'_>) -> i32 {
    let (low, high) = data.speed_supported;
    if high <= 0 {
        return data.speed_default;
    }
    lookup
        .integer("print-speed")
        .filter(|s| (low..=high).contains(s))
        .or_else(|| ignored("print-speed", lookup))
        .unwrap_or(data.speed_default)
}

/// First and last page to print, both 1-based and inclusive.
///
/// A range that starts past the end of the document prints nothing.
fn resolve_page_range(lookup: &Lookup<'_>, page_count: u32) -> (u32, u32) {
    let last_default = if page_count > 0 { page_count } else { u32::MAX };
    let Some((lower, upper)) = lookup.range("page-ranges") else {
        return (1, last_default);
    };
    if lower < 1 || upper < lower {
        debug!(lower, upper, "malformed page-ranges, printing all pages");
        return (1, last_default);
    }
    let (first, last) = (lower as u32, upper as u32);
    if page_count == 0 {
        return (first, last);
    }
    if first > page_count {
        return (page_count + 1, page_count);
    }
    (first, last.min(page_count))
}

/// Vendor attributes the driver declares, as name/value strings.
fn vendor_values(data: &DriverData, lookup: &Lookup<'_>) -> Vec<(String, String)> {
    data.vendor
        .iter()
        .filter_map(|name| {
            let value = lookup
                .get(name)
                .map(Attribute::display_values)
                .or_else(|| lookup.get(&format!("{name}-default")).map(Attribute::display_values))?;
            Some((name.clone(), value))
        })
        .collect()
}
