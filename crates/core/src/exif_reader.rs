use crate::error::RenameError;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use exif::{Context, Exif, Field, In, Reader};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

const DATETIME_TAGS: &[&str] = &["DateTimeOriginal", "CreateDate", "ModifyDate"];

pub type TagMap = Map<String, Value>;

/// Tags grouped by IFD. `None` means no tag of that group was present.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ExifData {
    pub image: Option<TagMap>,
    pub exif: Option<TagMap>,
    pub gps: Option<TagMap>,
}

impl ExifData {
    pub fn is_empty(&self) -> bool {
        self.image.is_none() && self.exif.is_none() && self.gps.is_none()
    }

    pub fn exif_tag(&self, name: &str) -> Option<&Value> {
        self.exif.as_ref()?.get(name)
    }
}

pub trait ExifSource: Send + Sync {
    fn read(&self, path: &Path) -> Result<ExifData, RenameError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct KamadakExifReader;

impl ExifSource for KamadakExifReader {
    fn read(&self, path: &Path) -> Result<ExifData, RenameError> {
        let file = File::open(path).map_err(|err| {
            tracing::debug!("EXIF読み込み対象を開けませんでした: {}: {err}", path.display());
            RenameError::NoExifData(path.to_path_buf())
        })?;
        let mut buf = BufReader::new(file);
        let exif = Reader::new().read_from_container(&mut buf).map_err(|err| {
            tracing::debug!("EXIFを解析できませんでした: {}: {err}", path.display());
            RenameError::NoExifData(path.to_path_buf())
        })?;

        let data = collect_tags(&exif);
        if data.is_empty() {
            return Err(RenameError::NoExifData(path.to_path_buf()));
        }
        Ok(data)
    }
}

fn collect_tags(exif: &Exif) -> ExifData {
    let mut image = TagMap::new();
    let mut exif_tags = TagMap::new();
    let mut gps = TagMap::new();

    for field in exif.fields() {
        if field.ifd_num != In::PRIMARY {
            continue;
        }
        let name = tag_name(field);
        let value = to_json(field, exif, &name);
        match field.tag.context() {
            Context::Tiff => image.insert(name, value),
            Context::Gps => gps.insert(name, value),
            _ => exif_tags.insert(name, value),
        };
    }

    ExifData {
        image: non_empty(image),
        exif: non_empty(exif_tags),
        gps: non_empty(gps),
    }
}

fn tag_name(field: &Field) -> String {
    match field.tag.to_string().as_str() {
        "DateTimeDigitized" => "CreateDate".to_string(),
        "DateTime" => "ModifyDate".to_string(),
        other => other.to_string(),
    }
}

fn to_json(field: &Field, exif: &Exif, name: &str) -> Value {
    use exif::Value as V;

    match &field.value {
        V::Ascii(parts) => {
            let text = parts
                .first()
                .map(|raw| {
                    String::from_utf8_lossy(raw)
                        .trim_matches(|c: char| c == '\0' || c.is_whitespace())
                        .to_string()
                })
                .unwrap_or_default();
            if DATETIME_TAGS.contains(&name) {
                if let Some(seconds) = parse_exif_datetime(&text) {
                    return json!(seconds);
                }
            }
            Value::String(text)
        }
        V::Short(v) if v.len() == 1 => json!(v[0]),
        V::Long(v) if v.len() == 1 => json!(v[0]),
        V::SShort(v) if v.len() == 1 => json!(v[0]),
        V::SLong(v) if v.len() == 1 => json!(v[0]),
        V::Rational(v) if v.len() == 1 => json!(v[0].to_f64()),
        V::SRational(v) if v.len() == 1 => json!(v[0].to_f64()),
        _ => Value::String(field.display_value().with_unit(exif).to_string()),
    }
}

fn non_empty(map: TagMap) -> Option<TagMap> {
    if map.is_empty() {
        None
    } else {
        Some(map)
    }
}

/// Epoch seconds of a date-time tag, whether it was stored as a number or
/// still as EXIF text.
pub fn tag_seconds(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => parse_exif_datetime(s),
        _ => None,
    }
}

pub fn parse_exif_datetime(input: &str) -> Option<i64> {
    let normalized = input.trim();

    let candidates = [
        "%Y:%m:%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%:z",
        "%Y-%m-%dT%H:%M:%S%.f%:z",
    ];

    for fmt in candidates {
        if let Ok(dt) = DateTime::parse_from_str(normalized, fmt) {
            return Some(dt.timestamp());
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(normalized, fmt) {
            if let Some(local) = Local.from_local_datetime(&naive).single() {
                return Some(local.timestamp());
            }
        }
    }

    None
}
