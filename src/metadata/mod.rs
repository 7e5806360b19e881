//! Image metadata: capture time (with uncertainty), GPS and camera settings.

pub mod cache;
pub mod dates;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use exif::{Exif, In, Rational, Tag, Value};
use log::debug;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::search::TimeRange;

pub use cache::MetadataCache;

/// Where the capture time came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DateSource {
    Exif,
    Filename,
    Directory,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ImageMetadata {
    /// Best single guess; the start of the range for date-only sources.
    pub datetime: Option<NaiveDateTime>,
    pub datetime_min: Option<NaiveDateTime>,
    pub datetime_max: Option<NaiveDateTime>,
    pub datetime_source: Option<DateSource>,
    /// `(latitude, longitude)` in decimal degrees.
    pub gps: Option<(f64, f64)>,
    pub camera: Option<String>,
    pub focal_length: Option<String>,
    pub aperture: Option<String>,
    pub iso: Option<String>,
    pub shutter_speed: Option<String>,
    /// File stem.
    pub filename: String,
}

impl ImageMetadata {
    pub fn time_range(&self) -> Option<TimeRange> {
        match (self.datetime_min, self.datetime_max) {
            (Some(a), Some(b)) => Some(TimeRange::new(a, b)),
            _ => self.datetime.map(TimeRange::exact),
        }
    }

    fn set_range(&mut self, range: TimeRange, source: DateSource) {
        self.datetime = Some(range.min);
        self.datetime_min = Some(range.min);
        self.datetime_max = Some(range.max);
        self.datetime_source = Some(source);
    }

    /// `lat, lon` with six decimals.
    pub fn location_str(&self) -> Option<String> {
        self.gps.map(|(lat, lon)| format!("{lat:.6}, {lon:.6}"))
    }
}

/// Anything that can produce [`ImageMetadata`] for a path. Never fails: missing data is `None`.
pub trait MetadataSource: Send + Sync {
    fn get_metadata(&self, path: &Path) -> ImageMetadata;
}

/// EXIF first, then file and directory name patterns.
#[derive(Clone, Debug, Default)]
pub struct ExifMetadata {
    root: Option<PathBuf>,
}

impl ExifMetadata {
    /// Directory dates are only taken from `root` and below.
    pub fn within(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }
}

impl MetadataSource for ExifMetadata {
    fn get_metadata(&self, path: &Path) -> ImageMetadata {
        let mut meta = ImageMetadata {
            filename: path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            ..Default::default()
        };

        if let Some(exif) = read_exif(path) {
            apply_exif(&exif, &mut meta);
        }

        if meta.datetime.is_none() {
            let by_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(dates::range_from_filename);
            if let Some(range) = by_name {
                meta.set_range(range, DateSource::Filename);
            } else if let Some(range) =
                dates::range_from_directories(path, self.root.as_deref())
            {
                meta.set_range(range, DateSource::Directory);
            }
        }
        meta
    }
}

fn read_exif(path: &Path) -> Option<Exif> {
    let file = File::open(path).ok()?;
    let mut reader = BufReader::new(file);
    match exif::Reader::new().read_from_container(&mut reader) {
        Ok(exif) => Some(exif),
        Err(e) => {
            debug!("no EXIF in {}: {}", path.display(), e);
            None
        }
    }
}

fn ascii(exif: &Exif, tag: Tag) -> Option<String> {
    match &exif.get_field(tag, In::PRIMARY)?.value {
        Value::Ascii(parts) => parts
            .first()
            .map(|b| String::from_utf8_lossy(b).trim().to_string())
            .filter(|s| !s.is_empty()),
        _ => None,
    }
}

fn rational(exif: &Exif, tag: Tag) -> Option<Rational> {
    match &exif.get_field(tag, In::PRIMARY)?.value {
        Value::Rational(v) => v.first().copied().filter(|r| r.denom != 0),
        _ => None,
    }
}

fn exif_datetime(exif: &Exif) -> Option<NaiveDateTime> {
    [Tag::DateTimeOriginal, Tag::DateTimeDigitized, Tag::DateTime]
        .into_iter()
        .find_map(|tag| {
            let field = exif.get_field(tag, In::PRIMARY)?;
            let Value::Ascii(parts) = &field.value else {
                return None;
            };
            let dt = exif::DateTime::from_ascii(parts.first()?).ok()?;
            let date = NaiveDate::from_ymd_opt(dt.year.into(), dt.month.into(), dt.day.into())?;
            let time = NaiveTime::from_hms_opt(dt.hour.into(), dt.minute.into(), dt.second.into())?;
            Some(date.and_time(time))
        })
}

fn gps_coord(exif: &Exif, value: Tag, reference: Tag, negative: &str) -> Option<f64> {
    let Value::Rational(dms) = &exif.get_field(value, In::PRIMARY)?.value else {
        return None;
    };
    if dms.len() < 3 || dms.iter().any(|r| r.denom == 0) {
        return None;
    }
    let deg = dms[0].to_f64() + dms[1].to_f64() / 60.0 + dms[2].to_f64() / 3600.0;
    let sign = ascii(exif, reference).filter(|r| r.eq_ignore_ascii_case(negative));
    Some(if sign.is_some() { -deg } else { deg })
}

fn apply_exif(exif: &Exif, meta: &mut ImageMetadata) {
    meta.camera = match (ascii(exif, Tag::Make), ascii(exif, Tag::Model)) {
        (Some(make), Some(model)) => Some(format!("{make} {model}")),
        (make, model) => model.or(make),
    };
    meta.focal_length = rational(exif, Tag::FocalLength).map(|r| format!("{:.1}mm", r.to_f64()));
    meta.aperture = rational(exif, Tag::FNumber).map(|r| format!("f/{:.1}", r.to_f64()));
    meta.iso = exif
        .get_field(Tag::PhotographicSensitivity, In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .map(|v| format!("ISO {v}"));
    meta.shutter_speed = rational(exif, Tag::ExposureTime).map(|r| {
        let secs = r.to_f64();
        if secs > 0.0 && secs < 1.0 {
            format!("1/{}s", (1.0 / secs).round() as u64)
        } else {
            format!("{secs:.1}s")
        }
    });

    if let Some(at) = exif_datetime(exif) {
        meta.set_range(TimeRange::exact(at), DateSource::Exif);
    }

    let lat = gps_coord(exif, Tag::GPSLatitude, Tag::GPSLatitudeRef, "S");
    let lon = gps_coord(exif, Tag::GPSLongitude, Tag::GPSLongitudeRef, "W");
    if let (Some(lat), Some(lon)) = (lat, lon) {
        meta.gps = Some((lat, lon));
    }
}
