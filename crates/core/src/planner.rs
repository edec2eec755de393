use crate::config::RenamerConfig;
use crate::error::RenameError;
use crate::exif_reader::ExifSource;
use crate::metadata::{resolve_metadata, Metadata};
use crate::path_info::PathInfo;
use crate::template::{render_target, Template};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum RenameStatus {
    Planned,
    DryRun,
    Renamed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessResult {
    pub template: Template,
    pub status: RenameStatus,
    pub original: Metadata,
    pub processed: PathInfo,
}

impl ProcessResult {
    pub fn changed(&self) -> bool {
        self.original.info.path != self.processed.path
    }

    pub(crate) fn with_status(self, status: RenameStatus) -> Self {
        Self { status, ..self }
    }
}

/// Computes the rename plan for one file without touching the filesystem.
pub fn process_file(
    path: &Path,
    template: &Template,
    config: &RenamerConfig,
    exif_source: &dyn ExifSource,
) -> Result<ProcessResult, RenameError> {
    let original = resolve_metadata(path, config, exif_source)?;
    let target = render_target(&original, template, config)?;
    let processed = PathInfo::describe(&target);

    Ok(ProcessResult {
        template: template.clone(),
        status: RenameStatus::Planned,
        original,
        processed,
    })
}
