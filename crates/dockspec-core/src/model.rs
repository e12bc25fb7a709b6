//! マニフェスト定義
//!
//! YAML形式：
//! ```yaml
//! name: web
//! account: acme
//! build_image: true
//! network_mode: host
//! env:
//!   TEST_ENV: Test
//! tag_db: ~/.docker_spec/tags.yml
//! tag_prefix: v
//! checks:
//!   - command: ls /file.test
//! ```

use serde::Deserialize;
use std::collections::BTreeMap;

/// コンテナ内で稼働を確認するプロセスのデフォルト
pub const DEFAULT_SUPERVISOR: &str = "supervisord";

/// 検証済みのマニフェスト
///
/// ロード後は不変。フラグの最終値は [`crate::FlagResolver`] で解決する。
#[derive(Debug, Clone, PartialEq)]
pub struct DockSpecConfig {
    pub name: String,
    pub account: String,
    /// `account/name`
    pub image_name: String,
    pub container_name: String,
    pub build_image: Option<bool>,
    pub build_root: Option<bool>,
    pub clear_cache: Option<bool>,
    pub push_container: Option<bool>,
    pub keep_running: Option<bool>,
    pub network_mode: Option<String>,
    pub env: BTreeMap<String, String>,
    pub tag_db: Option<String>,
    pub tag_prefix: Option<String>,
    pub supervisor: String,
    pub checks: Vec<CommandCheck>,
    pub registry: Option<RegistrySettings>,
}

impl DockSpecConfig {
    /// コンテナに渡す `KEY=VALUE` 形式の環境変数
    pub fn env_pairs(&self) -> Vec<String> {
        self.env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect()
    }

    /// 最新イメージの参照名 (`account/name:latest`)
    pub fn latest_reference(&self) -> String {
        format!("{}:latest", self.image_name)
    }
}

/// コンテナ内で実行する追加チェック
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommandCheck {
    pub name: Option<String>,
    pub command: String,
    #[serde(default)]
    pub exit_status: i64,
    /// 末尾の改行を1つ取り除いた標準出力と比較する
    pub stdout: Option<String>,
}

impl CommandCheck {
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("command '{}'", self.command))
    }
}

/// レジストリ認証設定
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RegistrySettings {
    pub username: Option<String>,
    pub password: Option<String>,
    pub email: Option<String>,
    /// プッシュ先レジストリのアドレス
    pub serveraddress: Option<String>,
    /// 認証ファイル内で参照するキー（serveraddress より優先）
    pub auth: Option<String>,
}

impl RegistrySettings {
    /// 明示的な認証情報が1つでも書かれているか
    pub fn has_explicit_credentials(&self) -> bool {
        self.username.is_some() || self.password.is_some() || self.email.is_some()
    }
}
