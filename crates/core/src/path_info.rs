use serde::Serialize;
use std::env;
use std::fs;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct FileStat {
    pub is_file: bool,
    pub is_dir: bool,
    pub is_symlink: bool,
    pub len: u64,
    /// Change time in milliseconds since the epoch.
    pub ctime: Option<i64>,
}

/// Point-in-time view of a path. `stat` is `None` when nothing existed at
/// the path when it was described.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PathInfo {
    pub path: PathBuf,
    pub file: String,
    pub name: String,
    pub dir: PathBuf,
    pub dirname: String,
    pub ext: String,
    #[serde(rename = "EXT")]
    pub ext_upper: String,
    pub stat: Option<FileStat>,
}

impl PathInfo {
    pub fn describe(path: &Path) -> Self {
        let path = absolute_path(path);
        let file = lossy(path.file_name());
        let name = lossy(path.file_stem());
        let ext = lossy(path.extension());
        let dir = path.parent().unwrap_or(&path).to_path_buf();
        let dirname = lossy(dir.file_name());
        let stat = fs::symlink_metadata(&path).ok().map(|meta| FileStat {
            is_file: meta.is_file(),
            is_dir: meta.is_dir(),
            is_symlink: meta.file_type().is_symlink(),
            len: meta.len(),
            ctime: change_time_millis(&meta),
        });

        Self {
            file,
            name,
            dir,
            dirname,
            ext_upper: ext.to_uppercase(),
            ext: ext.to_lowercase(),
            stat,
            path,
        }
    }

    pub fn exists(&self) -> bool {
        self.stat.is_some()
    }
}

pub fn current_dir() -> PathBuf {
    env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

pub fn absolute_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize_path(path)
    } else {
        normalize_path(&current_dir().join(path))
    }
}

/// Folds `.` and `..` lexically. Symlinks are not resolved.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            Component::Normal(part) => out.push(part),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

#[cfg(unix)]
fn change_time_millis(meta: &fs::Metadata) -> Option<i64> {
    use std::os::unix::fs::MetadataExt;
    Some(meta.ctime() * 1000 + meta.ctime_nsec() / 1_000_000)
}

#[cfg(not(unix))]
fn change_time_millis(meta: &fs::Metadata) -> Option<i64> {
    use std::time::UNIX_EPOCH;
    let time = meta.created().or_else(|_| meta.modified()).ok()?;
    let millis = time.duration_since(UNIX_EPOCH).ok()?.as_millis();
    i64::try_from(millis).ok()
}

fn lossy(value: Option<&std::ffi::OsStr>) -> String {
    value
        .map(|v| v.to_string_lossy().to_string())
        .unwrap_or_default()
}
