use crate::config::RenamerConfig;
use crate::date_format::format_millis;
use crate::error::RenameError;
use crate::exif_reader::{tag_seconds, ExifData, ExifSource, TagMap};
use crate::path_info::{current_dir, PathInfo};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DatetimeSource {
    DateTimeOriginal,
    CreateDate,
    FileCtime,
}

/// Everything a template can refer to for one source file.
#[derive(Debug, Clone, Serialize)]
pub struct Metadata {
    #[serde(flatten)]
    pub info: PathInfo,
    pub image: Option<TagMap>,
    pub exif: Option<TagMap>,
    pub gps: Option<TagMap>,
    /// Milliseconds since the epoch.
    pub datetime: i64,
    pub datetime_source: DatetimeSource,
    pub date: String,
    pub time: String,
    pub here: PathBuf,
}

impl Metadata {
    /// Field tree used for placeholder lookup. Derived fields are written
    /// last so no tag group can shadow them.
    pub fn to_context(&self) -> Value {
        let mut context = match serde_json::to_value(&self.info) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        context.insert("image".to_string(), optional_map(&self.image));
        context.insert("exif".to_string(), optional_map(&self.exif));
        context.insert("gps".to_string(), optional_map(&self.gps));
        context.insert("datetime".to_string(), Value::from(self.datetime));
        context.insert("date".to_string(), Value::from(self.date.clone()));
        context.insert("time".to_string(), Value::from(self.time.clone()));
        context.insert(
            "here".to_string(),
            Value::from(self.here.to_string_lossy().to_string()),
        );
        Value::Object(context)
    }
}

pub fn resolve_metadata(
    path: &Path,
    config: &RenamerConfig,
    exif_source: &dyn ExifSource,
) -> Result<Metadata, RenameError> {
    let info = PathInfo::describe(path);
    let Some(stat) = info.stat else {
        return Err(RenameError::PathNotFound(info.path));
    };
    if stat.is_dir {
        return Err(RenameError::IsDirectory(info.path));
    }
    if !stat.is_file {
        return Err(RenameError::NotAFile(info.path));
    }
    if !config.accepts_extension(&info.ext) {
        return Err(RenameError::UnsupportedExtension(info.path));
    }

    let exif = match exif_source.read(&info.path) {
        Ok(data) => data,
        Err(err) => {
            if config.require_exif {
                return Err(RenameError::NoExifData(info.path));
            }
            tracing::debug!("EXIFなしで続行します: {err}");
            ExifData::default()
        }
    };

    let (datetime, datetime_source) = resolve_datetime(&exif, stat.ctime, config)
        .ok_or_else(|| RenameError::NoResolvableDatetime(info.path.clone()))?;
    let date = format_millis(datetime, &config.formats.date)
        .ok_or_else(|| RenameError::NoResolvableDatetime(info.path.clone()))?;
    let time = format_millis(datetime, &config.formats.time)
        .ok_or_else(|| RenameError::NoResolvableDatetime(info.path.clone()))?;

    Ok(Metadata {
        info,
        image: exif.image,
        exif: exif.exif,
        gps: exif.gps,
        datetime,
        datetime_source,
        date,
        time,
        here: current_dir(),
    })
}

fn resolve_datetime(
    exif: &ExifData,
    ctime: Option<i64>,
    config: &RenamerConfig,
) -> Option<(i64, DatetimeSource)> {
    let from_tag = |name: &str| {
        exif.exif_tag(name)
            .and_then(tag_seconds)
            .and_then(|seconds| seconds.checked_mul(1000))
    };

    if let Some(millis) = from_tag("DateTimeOriginal") {
        return Some((millis, DatetimeSource::DateTimeOriginal));
    }
    if let Some(millis) = from_tag("CreateDate") {
        return Some((millis, DatetimeSource::CreateDate));
    }
    if config.fallback_ctime {
        return ctime.map(|millis| (millis, DatetimeSource::FileCtime));
    }
    None
}

fn optional_map(map: &Option<TagMap>) -> Value {
    map.as_ref()
        .map(|m| Value::Object(m.clone()))
        .unwrap_or(Value::Null)
}
