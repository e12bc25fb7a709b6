use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Dockerfile not found: {0}")]
    DockerfileNotFound(PathBuf),

    #[error("Build context directory not found: {0}")]
    ContextNotFound(PathBuf),

    #[error("Docker connection error: {0}")]
    DockerConnection(#[from] bollard::errors::Error),

    #[error("docker build -t {image} failed: {message}")]
    BuildFailed { image: String, message: String },

    #[error("Image not found: {0}")]
    ImageNotFound(String),

    #[error("Invalid build configuration: {0}")]
    InvalidConfig(String),

    #[error("Registry credentials missing: {0}")]
    MissingCredentials(String),

    #[error("Authentication failed for {registry}: {message}")]
    AuthFailed { registry: String, message: String },

    #[error("Invalid tag: {tag}")]
    InvalidTag { tag: String },

    #[error("Push failed: {message}")]
    PushFailed { message: String },

    #[error("Tag store error ({path}): {message}")]
    TagStore { path: PathBuf, message: String },

    #[error(transparent)]
    Config(#[from] dockspec_config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BuildError {
    /// ユーザー向けの分かりやすいエラーメッセージ
    pub fn user_message(&self) -> String {
        match self {
            BuildError::DockerfileNotFound(path) => {
                format!(
                    "Dockerfileが見つかりません: {}\n\
                     \n\
                     ビルドコンテキスト（docker_spec.yml のあるディレクトリ）に\n\
                     Dockerfile を置いてください。",
                    path.display()
                )
            }
            BuildError::BuildFailed { image, message } => {
                format!(
                    "ビルドに失敗しました: docker build -t {}\n{}\n\
                     \n\
                     Dockerfileの内容を確認してください。",
                    image, message
                )
            }
            BuildError::MissingCredentials(what) => {
                format!(
                    "レジストリの認証情報が見つかりません: {}\n\
                     \n\
                     解決方法:\n\
                     1. docker login を実行してください\n\
                     2. docker_spec.yml の registry に username / password / email を指定してください",
                    what
                )
            }
            _ => format!("{}", self),
        }
    }
}

pub type BuildResult<T> = std::result::Result<T, BuildError>;
