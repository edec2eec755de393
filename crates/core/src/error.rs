use crate::template::TemplateError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenameError {
    #[error("ファイルが存在しません: {}", .0.display())]
    PathNotFound(PathBuf),
    #[error("ディレクトリは処理できません: {}", .0.display())]
    IsDirectory(PathBuf),
    #[error("通常ファイルではありません: {}", .0.display())]
    NotAFile(PathBuf),
    #[error("未対応の拡張子です: {}", .0.display())]
    UnsupportedExtension(PathBuf),
    #[error("EXIFが見つかりません: {}", .0.display())]
    NoExifData(PathBuf),
    #[error("日時を決定できませんでした: {}", .0.display())]
    NoResolvableDatetime(PathBuf),
    #[error("カスタムテンプレートが空の名前を返しました: {}", .0.display())]
    EmptyCustomOutput(PathBuf),
    #[error("テンプレートが不正です: {0}")]
    TemplateSyntax(#[from] TemplateError),
    #[error("リネーム先がディレクトリです: {}", .0.display())]
    TargetIsDirectory(PathBuf),
    #[error("リネーム先が既に存在します: {}", .0.display())]
    TargetExists(PathBuf),
    #[error("有効なディレクトリではありません: {}", .0.display())]
    NotADirectory(PathBuf),
    #[error("ファイル操作に失敗しました: {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("ファイル監視に失敗しました: {0}")]
    Watch(#[from] notify::Error),
}

impl RenameError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
