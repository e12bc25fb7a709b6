//! dockspec のファイル発見とロック
//!
//! マニフェスト (`docker_spec.yml`)、レジストリ認証ファイル、
//! ロックファイルの場所を決定します。

pub mod error;
pub mod lock;

pub use error::*;
pub use lock::RunLock;

use std::path::{Path, PathBuf};

/// マニフェストのデフォルトファイル名
pub const CONFIG_FILE_NAME: &str = "docker_spec.yml";

/// マニフェストのパスを直接指定する環境変数
pub const CONFIG_PATH_ENV: &str = "DOCKER_SPEC_CONFIG";

/// マニフェストを探す
///
/// 優先順位:
/// 1. 明示的に渡されたパス（`--config` または DOCKER_SPEC_CONFIG）
/// 2. 作業ディレクトリの docker_spec.yml
pub fn find_config_file(explicit: Option<&Path>, work_dir: &Path) -> Result<PathBuf> {
    let path = match explicit {
        Some(path) if path.is_relative() => work_dir.join(path),
        Some(path) => path.to_path_buf(),
        None => work_dir.join(CONFIG_FILE_NAME),
    };

    if path.is_file() {
        tracing::debug!("Using manifest at {}", path.display());
        Ok(path)
    } else {
        Err(ConfigError::ConfigFileNotFound(path))
    }
}

/// レジストリ認証ファイル (config.json) のパス
///
/// DOCKER_CONFIG が設定されていればそのディレクトリ、なければ ~/.docker を使う
pub fn docker_config_path() -> Result<PathBuf> {
    let dir = match std::env::var_os("DOCKER_CONFIG") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => dirs::home_dir()
            .ok_or(ConfigError::HomeDirNotFound)?
            .join(".docker"),
    };
    Ok(dir.join("config.json"))
}

/// 先頭の `~` をホームディレクトリに展開
pub fn expand_home(path: &str) -> Result<PathBuf> {
    if path == "~" {
        return dirs::home_dir().ok_or(ConfigError::HomeDirNotFound);
    }
    match path.strip_prefix("~/") {
        Some(rest) => Ok(dirs::home_dir()
            .ok_or(ConfigError::HomeDirNotFound)?
            .join(rest)),
        None => Ok(PathBuf::from(path)),
    }
}
