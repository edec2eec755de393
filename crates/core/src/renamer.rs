use crate::apply::rename_file;
use crate::batch::{rename_dir, BatchEntry};
use crate::config::RenamerConfig;
use crate::error::RenameError;
use crate::exif_reader::{ExifData, ExifSource, KamadakExifReader};
use crate::path_info::absolute_path;
use crate::planner::{process_file, ProcessResult};
use crate::template::Template;
use crate::watch::{self, WatchHandle, DEFAULT_WATCH_TTL};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Entry point for every rename operation. Cloning is cheap and each clone
/// carries its own copy of the configuration.
#[derive(Clone)]
pub struct ExifRenamer {
    pub config: RenamerConfig,
    exif_source: Arc<dyn ExifSource>,
}

impl fmt::Debug for ExifRenamer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExifRenamer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for ExifRenamer {
    fn default() -> Self {
        Self::new(RenamerConfig::default())
    }
}

impl ExifRenamer {
    pub fn new(config: RenamerConfig) -> Self {
        Self::with_exif_source(config, KamadakExifReader)
    }

    pub fn with_exif_source(config: RenamerConfig, exif_source: impl ExifSource + 'static) -> Self {
        Self {
            config,
            exif_source: Arc::new(exif_source),
        }
    }

    pub fn exif(&self, path: &Path) -> Result<ExifData, RenameError> {
        self.exif_source.read(&absolute_path(path))
    }

    pub fn process(
        &self,
        path: &Path,
        template: impl Into<Template>,
    ) -> Result<ProcessResult, RenameError> {
        process_file(path, &template.into(), &self.config, self.exif_source.as_ref())
    }

    pub fn rename(
        &self,
        path: &Path,
        template: impl Into<Template>,
    ) -> Result<ProcessResult, RenameError> {
        rename_file(path, &template.into(), &self.config, self.exif_source.as_ref())
    }

    pub fn rename_dir(
        &self,
        dir: &Path,
        template: impl Into<Template>,
        recursive: bool,
    ) -> Result<Vec<BatchEntry>, RenameError> {
        rename_dir(
            dir,
            &template.into(),
            recursive,
            &self.config,
            self.exif_source.as_ref(),
        )
    }

    /// Starts a watch session on `dir`. The session renames with a snapshot
    /// of the current configuration.
    pub fn watch<S>(
        &self,
        dir: &Path,
        template: impl Into<Template>,
        sink: S,
    ) -> Result<WatchHandle, RenameError>
    where
        S: FnMut(Result<ProcessResult, RenameError>) + Send + 'static,
    {
        let renamer = self.clone();
        let template = template.into();
        watch::watch(
            dir,
            DEFAULT_WATCH_TTL,
            move |path: &Path| renamer.rename(path, template.clone()),
            sink,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Metadata;
    use crate::planner::RenameStatus;
    use crate::test_support::{touch, FixedExif};
    use serde_json::json;
    use std::sync::mpsc;
    use std::time::Duration;
    use tempfile::tempdir;

    fn renamer() -> ExifRenamer {
        ExifRenamer::with_exif_source(
            RenamerConfig::default(),
            FixedExif::with_exif(&[("DateTimeOriginal", json!(1_388_570_400))]),
        )
    }

    #[test]
    fn exif_reports_missing_tags() {
        let temp = tempdir().expect("tempdir");
        let photo = temp.path().join("plain.jpg");
        touch(&photo);

        let err = ExifRenamer::default().exif(&photo).expect_err("no exif");
        assert!(matches!(err, RenameError::NoExifData(p) if p == photo));

        let data = renamer().exif(&photo).expect("fixed exif");
        assert_eq!(data.exif_tag("DateTimeOriginal"), Some(&json!(1_388_570_400)));
    }

    #[test]
    fn config_changes_apply_to_the_next_call() {
        let temp = tempdir().expect("tempdir");
        let photo = temp.path().join("a.jpg");
        touch(&photo);

        let mut renamer = renamer();
        renamer.config.dryrun = true;
        let result = renamer.rename(&photo, "x_{{file}}").expect("dry run");
        assert_eq!(result.status, RenameStatus::DryRun);
        assert!(photo.exists());

        renamer.config.dryrun = false;
        let result = renamer.rename(&photo, "x_{{file}}").expect("rename");
        assert_eq!(result.status, RenameStatus::Renamed);
        assert!(!photo.exists());
    }

    #[test]
    fn process_accepts_custom_templates() {
        let temp = tempdir().expect("tempdir");
        let photo = temp.path().join("a.jpg");
        touch(&photo);

        let template = Template::custom(|m: &Metadata| format!("{}-{}", m.date, m.info.file));
        let result = renamer().process(&photo, template).expect("process");
        assert_eq!(
            result.processed.path,
            temp.path().join(format!("{}-a.jpg", result.original.date))
        );
        assert_eq!(result.template.to_string(), "<custom>");
    }

    #[test]
    fn rename_dir_uses_the_configured_source() {
        let temp = tempdir().expect("tempdir");
        touch(&temp.path().join("a.jpg"));
        touch(&temp.path().join("b.jpg"));

        let results = renamer()
            .rename_dir(temp.path(), "{{date}}_{{file}}", false)
            .expect("batch");
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.is_ok()));
    }

    #[test]
    fn watch_uses_a_config_snapshot() {
        let watched = tempdir().expect("watched dir");
        let staging = tempdir().expect("staging dir");
        let staged = staging.path().join("a.jpg");
        touch(&staged);

        let (tx, rx) = mpsc::channel();
        let mut renamer = renamer();
        let handle = renamer
            .watch(watched.path(), "x_{{file}}", move |result| {
                let _ = tx.send(result);
            })
            .expect("start watch");
        renamer.config.dryrun = true;

        std::fs::rename(&staged, handle.root().join("a.jpg")).expect("move into watched dir");
        let result = rx
            .recv_timeout(Duration::from_secs(10))
            .expect("one result")
            .expect("rename succeeds");
        assert_eq!(result.status, RenameStatus::Renamed);
        handle.stop();
    }
}
