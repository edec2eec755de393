use crate::config::RenamerConfig;
use crate::error::RenameError;
use crate::exif_reader::ExifSource;
use crate::path_info::PathInfo;
use crate::planner::{process_file, ProcessResult, RenameStatus};
use crate::template::Template;
use std::fs;
use std::path::Path;

pub fn rename_file(
    path: &Path,
    template: &Template,
    config: &RenamerConfig,
    exif_source: &dyn ExifSource,
) -> Result<ProcessResult, RenameError> {
    let plan = process_file(path, template, config, exif_source)?;
    commit(plan, config)
}

/// Applies the overwrite policy against the live filesystem, then moves the
/// source with a single `rename`. Under `dryrun` nothing is touched.
pub fn commit(plan: ProcessResult, config: &RenamerConfig) -> Result<ProcessResult, RenameError> {
    let source = plan.original.info.path.clone();
    let target = plan.processed.path.clone();

    if let Ok(meta) = fs::symlink_metadata(&target) {
        if meta.is_dir() {
            return Err(RenameError::TargetIsDirectory(target));
        }
        if !config.overwrite {
            return Err(RenameError::TargetExists(target));
        }
    }

    if config.dryrun {
        tracing::info!("dry-run: {} -> {}", source.display(), target.display());
        return Ok(plan.with_status(RenameStatus::DryRun));
    }

    fs::create_dir_all(&plan.processed.dir)
        .map_err(|err| RenameError::io(&plan.processed.dir, err))?;
    fs::rename(&source, &target).map_err(|err| RenameError::io(&source, err))?;
    tracing::info!("renamed: {} -> {}", source.display(), target.display());

    Ok(ProcessResult {
        processed: PathInfo::describe(&target),
        ..plan.with_status(RenameStatus::Renamed)
    })
}
