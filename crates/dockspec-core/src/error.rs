use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("設定ファイルが見つかりません: {0}")]
    ConfigNotFound(PathBuf),

    #[error("ファイル読み込みエラー: {path}\n理由: {message}")]
    Io { path: PathBuf, message: String },

    #[error("YAMLとして読み込めません: {path}\n理由: {message}")]
    InvalidYaml { path: PathBuf, message: String },

    #[error("{field} が docker_spec.yml に定義されていません")]
    MissingField { field: String },

    #[error("無効な設定値 '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error(
        "環境変数 {var} の値 '{value}' を真偽値として解釈できません\n\
         使用できる値: true / yes / y / false / no / n"
    )]
    InvalidEnvValue { var: String, value: String },

    #[error("入力の読み込みに失敗しました: {0}")]
    Prompt(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
