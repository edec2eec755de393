use crate::apply::commit;
use crate::config::RenamerConfig;
use crate::error::RenameError;
use crate::exif_reader::ExifSource;
use crate::path_info::absolute_path;
use crate::planner::{process_file, ProcessResult};
use crate::template::Template;
use rayon::prelude::*;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub type BatchEntry = Result<ProcessResult, RenameError>;

/// Renames every regular file under `dir`. Each file yields exactly one
/// entry; a failing file never stops its siblings.
pub fn rename_dir(
    dir: &Path,
    template: &Template,
    recursive: bool,
    config: &RenamerConfig,
    exif_source: &dyn ExifSource,
) -> Result<Vec<BatchEntry>, RenameError> {
    let root = absolute_path(dir);
    match fs::metadata(&root) {
        Ok(meta) if meta.is_dir() => {}
        _ => return Err(RenameError::NotADirectory(root)),
    }

    let files = collect_files(&root, recursive)?;
    tracing::debug!("{}件のファイルを処理します: {}", files.len(), root.display());

    let plans: Vec<BatchEntry> = files
        .into_par_iter()
        .map(|file| file.and_then(|path| process_file(&path, template, config, exif_source)))
        .collect();

    Ok(reject_duplicate_targets(plans)
        .into_par_iter()
        .map(|plan| plan.and_then(|plan| commit(plan, config)))
        .collect())
}

fn collect_files(
    root: &Path,
    recursive: bool,
) -> Result<Vec<Result<PathBuf, RenameError>>, RenameError> {
    let mut out = Vec::new();

    if recursive {
        for entry in WalkDir::new(root).sort_by_file_name() {
            match entry {
                Ok(entry) if entry.file_type().is_file() => out.push(Ok(entry.into_path())),
                Ok(_) => {}
                Err(err) => {
                    let path = err.path().unwrap_or(root).to_path_buf();
                    tracing::warn!("フォルダ走査に失敗しました: {}: {err}", path.display());
                    out.push(Err(RenameError::io(path, err.into())));
                }
            }
        }
    } else {
        let entries = fs::read_dir(root).map_err(|err| RenameError::io(root, err))?;
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    out.push(Err(RenameError::io(root, err)));
                    continue;
                }
            };
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if is_file {
                out.push(Ok(entry.path()));
            }
        }
        out.sort_by(|a, b| match (a, b) {
            (Ok(a), Ok(b)) => a.cmp(b),
            (Ok(_), Err(_)) => std::cmp::Ordering::Less,
            (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
            (Err(_), Err(_)) => std::cmp::Ordering::Equal,
        });
    }

    Ok(out)
}

/// Two files planned onto one target would race; the first keeps it.
fn reject_duplicate_targets(plans: Vec<BatchEntry>) -> Vec<BatchEntry> {
    let mut seen_target_paths = HashSet::<PathBuf>::new();
    plans
        .into_iter()
        .map(|plan| {
            let plan = plan?;
            if seen_target_paths.insert(plan.processed.path.clone()) {
                Ok(plan)
            } else {
                Err(RenameError::TargetExists(plan.processed.path))
            }
        })
        .collect()
}
