mod apply;
mod batch;
mod config;
mod date_format;
mod error;
mod exif_reader;
mod metadata;
mod path_info;
mod planner;
mod renamer;
mod template;
mod watch;

#[cfg(test)]
mod test_support;

pub const DEFAULT_TEMPLATE: &str = "{{datetime}}_{{file}}";

pub use apply::{commit, rename_file};
pub use batch::{rename_dir, BatchEntry};
pub use config::{
    app_paths, load_config, load_config_from, save_config, save_config_to, AppConfig, AppPaths,
    DateFormats, RenamerConfig,
};
pub use date_format::{format_datetime, format_millis};
pub use error::RenameError;
pub use exif_reader::{
    parse_exif_datetime, tag_seconds, ExifData, ExifSource, KamadakExifReader, TagMap,
};
pub use metadata::{resolve_metadata, DatetimeSource, Metadata};
pub use path_info::{absolute_path, normalize_path, FileStat, PathInfo};
pub use planner::{process_file, ProcessResult, RenameStatus};
pub use renamer::ExifRenamer;
pub use template::{
    parse_template, render_parts, render_target, validate_template, Placeholder, Template,
    TemplateError, TemplateFn, TemplatePart,
};
pub use watch::{
    changes_from_event, watch, ChangeEvent, ChangeKind, EntryKind, IgnoreReason, Outcome,
    SessionState, WatchHandle, WatchSession, DEFAULT_WATCH_TTL,
};
