//! タグカウンタの永続化
//!
//! YAML のマッピング `image_name -> tag` を1ファイルに保存する。
//! 値は整数 (`5`) か接頭辞付きの文字列 (`v5`)。

use crate::error::{BuildError, BuildResult};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct TagStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl TagStore {
    /// ストアを開く。ファイルが無ければ空として扱う
    pub fn open(path: &Path) -> BuildResult<Self> {
        let entries = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            parse_entries(&content).map_err(|message| BuildError::TagStore {
                path: path.to_path_buf(),
                message,
            })?
        } else {
            tracing::debug!("Tag store {} does not exist yet", path.display());
            BTreeMap::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, image_name: &str) -> Option<&str> {
        self.entries.get(image_name).map(String::as_str)
    }

    /// 次に付けるタグを計算する（ストアは変更しない）
    pub fn next_tag(&self, image_name: &str, prefix: Option<&str>) -> BuildResult<String> {
        next_tag(self.get(image_name), prefix).map_err(|message| BuildError::TagStore {
            path: self.path.clone(),
            message: format!("{}: {}", image_name, message),
        })
    }

    pub fn set(&mut self, image_name: &str, tag: &str) {
        self.entries.insert(image_name.to_string(), tag.to_string());
    }

    /// ファイルへ書き出す。親ディレクトリが無ければ作る
    pub fn save(&self) -> BuildResult<()> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)?;

        let content = serde_yaml::to_string(&self.entries).map_err(|e| BuildError::TagStore {
            path: self.path.clone(),
            message: e.to_string(),
        })?;

        let mut temp = tempfile::NamedTempFile::new_in(&parent)?;
        std::io::Write::write_all(&mut temp, content.as_bytes())?;
        temp.persist(&self.path).map_err(|e| e.error)?;

        tracing::debug!("Tag store saved to {}", self.path.display());
        Ok(())
    }
}

/// 現在値から次のタグを求める
///
/// - 値なし → `prefix + 1`
/// - `prefix + N` または `N` → `prefix + (N + 1)`
pub fn next_tag(current: Option<&str>, prefix: Option<&str>) -> Result<String, String> {
    let prefix = prefix.unwrap_or("");
    let counter = match current {
        None => 0,
        Some(value) => {
            let value = value.trim();
            let digits = value.strip_prefix(prefix).unwrap_or(value);
            digits
                .parse::<u64>()
                .map_err(|_| format!("stored tag '{}' has no numeric counter", value))?
        }
    };
    let next = counter
        .checked_add(1)
        .ok_or_else(|| format!("stored tag counter {} cannot be incremented", counter))?;
    Ok(format!("{}{}", prefix, next))
}

fn parse_entries(content: &str) -> Result<BTreeMap<String, String>, String> {
    if content.trim().is_empty() {
        return Ok(BTreeMap::new());
    }

    let raw: BTreeMap<String, Value> = serde_yaml::from_str(content).map_err(|e| e.to_string())?;
    raw.into_iter()
        .map(|(key, value)| match value {
            Value::String(s) => Ok((key, s)),
            Value::Number(n) => Ok((key, n.to_string())),
            other => Err(format!("unsupported value for {}: {:?}", key, other)),
        })
        .collect()
}
