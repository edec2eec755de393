use crate::DEFAULT_TEMPLATE;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DateFormats {
    pub datetime: String,
    pub date: String,
    pub time: String,
}

impl Default for DateFormats {
    fn default() -> Self {
        Self {
            datetime: "yyyymmdd-HHMMss".to_string(),
            date: "yyyy-mm-dd".to_string(),
            time: "HH:MM:ss".to_string(),
        }
    }
}

/// Options read by every operation of an [`crate::ExifRenamer`]. Changes
/// take effect on the next call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RenamerConfig {
    pub dryrun: bool,
    pub fallback_ctime: bool,
    pub overwrite: bool,
    pub require_exif: bool,
    pub path_separator: String,
    pub formats: DateFormats,
    pub valid_extensions: BTreeSet<String>,
}

impl Default for RenamerConfig {
    fn default() -> Self {
        Self {
            dryrun: false,
            fallback_ctime: true,
            overwrite: false,
            require_exif: false,
            path_separator: "/".to_string(),
            formats: DateFormats::default(),
            valid_extensions: ["jpg", "jpeg"].iter().map(|v| v.to_string()).collect(),
        }
    }
}

impl RenamerConfig {
    pub fn accepts_extension(&self, ext: &str) -> bool {
        !ext.is_empty()
            && self
                .valid_extensions
                .iter()
                .any(|valid| valid.trim_start_matches('.').eq_ignore_ascii_case(ext))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub template: String,
    pub renamer: RenamerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
            renamer: RenamerConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub config_path: PathBuf,
}

pub fn app_paths() -> Result<AppPaths> {
    let proj = ProjectDirs::from("com", "exif-renamer", "exif-renamer")
        .context("OS標準設定ディレクトリを取得できませんでした")?;
    let config_dir = proj.config_dir().to_path_buf();
    Ok(AppPaths {
        config_path: config_dir.join("config.toml"),
        config_dir,
    })
}

pub fn load_config() -> Result<AppConfig> {
    load_config_from(&app_paths()?.config_path)
}

pub fn save_config(config: &AppConfig) -> Result<PathBuf> {
    let path = app_paths()?.config_path;
    save_config_to(&path, config)?;
    Ok(path)
}

/// A missing file is not an error; it yields the defaults.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("設定ファイルを読めませんでした: {}", path.display()))?;
    parse_config(&raw)
}

pub fn save_config_to(path: &Path, config: &AppConfig) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("設定ディレクトリを作成できませんでした: {}", dir.display()))?;
    }
    let body = toml::to_string_pretty(config).context("設定のシリアライズに失敗しました")?;
    fs::write(path, body)
        .with_context(|| format!("設定ファイルを書き込めませんでした: {}", path.display()))
}

fn parse_config(raw: &str) -> Result<AppConfig> {
    toml::from_str::<AppConfig>(raw).context("設定ファイルのパースに失敗しました")
}
