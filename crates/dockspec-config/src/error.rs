use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "設定ファイルが見つかりません: {0}\n\
        カレントディレクトリに docker_spec.yml を置くか、\n\
        DOCKER_SPEC_CONFIG 環境変数 / --config で直接指定してください"
    )]
    ConfigFileNotFound(PathBuf),

    #[error("ホームディレクトリが見つかりません")]
    HomeDirNotFound,

    #[error("ロックの取得に失敗しました: {path}\n理由: {message}")]
    LockFailed { path: PathBuf, message: String },

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
