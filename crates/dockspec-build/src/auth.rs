//! レジストリ認証処理
//!
//! docker_spec.yml の registry セクション、または Docker の config.json から
//! 認証情報を取得し、Bollard の DockerCredentials に変換します。

use crate::error::{BuildError, BuildResult};
use base64::Engine;
use bollard::auth::DockerCredentials;
use dockspec_core::RegistrySettings;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// 認証ファイル内のデフォルトキー (Docker Hub)
pub const DEFAULT_SERVER: &str = "https://index.docker.io/v1/";

/// Docker config.json の構造
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DockerConfig {
    /// 認証情報 (レジストリ -> AuthEntry)
    #[serde(default)]
    auths: HashMap<String, AuthEntry>,
    /// credential helper 名 (例: "osxkeychain", "desktop")
    #[serde(default)]
    creds_store: Option<String>,
    /// レジストリごとの credential helper
    #[serde(default)]
    cred_helpers: HashMap<String, String>,
}

/// 認証エントリ
#[derive(Debug, Deserialize)]
struct AuthEntry {
    /// Base64エンコードされた "username:password"
    auth: Option<String>,
    email: Option<String>,
}

/// credential helper からのレスポンス
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CredentialResponse {
    username: String,
    secret: String,
}

/// 解決済みの認証情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryCredentials {
    pub username: String,
    pub password: String,
    pub email: Option<String>,
    pub serveraddress: String,
}

impl RegistryCredentials {
    pub fn to_docker(&self) -> DockerCredentials {
        DockerCredentials {
            username: Some(self.username.clone()),
            password: Some(self.password.clone()),
            email: self.email.clone(),
            serveraddress: Some(self.serveraddress.clone()),
            ..Default::default()
        }
    }
}

/// レジストリ認証を管理
#[derive(Debug)]
pub struct RegistryAuth {
    config_path: PathBuf,
}

impl RegistryAuth {
    /// DOCKER_CONFIG または ~/.docker/config.json を使用
    pub fn new() -> BuildResult<Self> {
        Ok(Self {
            config_path: dockspec_config::docker_config_path()?,
        })
    }

    /// 指定したパスの config.json を使用
    pub fn with_config_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// 認証情報を解決する
    ///
    /// registry セクションに username / password / email のいずれかがあれば
    /// 3つとも必須。なければ config.json を参照する。
    pub fn resolve(&self, settings: Option<&RegistrySettings>) -> BuildResult<RegistryCredentials> {
        let default_settings = RegistrySettings::default();
        let settings = settings.unwrap_or(&default_settings);
        let serveraddress = settings
            .serveraddress
            .clone()
            .unwrap_or_else(|| DEFAULT_SERVER.to_string());

        if settings.has_explicit_credentials() {
            return Self::from_explicit(settings, serveraddress);
        }

        let key = settings.auth.as_deref().unwrap_or(&serveraddress);
        self.from_config_file(key, &serveraddress)
    }

    fn from_explicit(
        settings: &RegistrySettings,
        serveraddress: String,
    ) -> BuildResult<RegistryCredentials> {
        let field = |value: &Option<String>, name: &str| {
            value.clone().ok_or_else(|| {
                BuildError::MissingCredentials(format!(
                    "registry->{} is not defined in docker_spec.yml",
                    name
                ))
            })
        };

        Ok(RegistryCredentials {
            username: field(&settings.username, "username")?,
            password: field(&settings.password, "password")?,
            email: Some(field(&settings.email, "email")?),
            serveraddress,
        })
    }

    fn from_config_file(&self, key: &str, serveraddress: &str) -> BuildResult<RegistryCredentials> {
        if !self.config_path.exists() {
            return Err(BuildError::MissingCredentials(format!(
                "{} does not exist",
                self.config_path.display()
            )));
        }

        let config = self.load_docker_config()?;

        // 1. auths セクションを確認
        let entry = config.auths.get(key);
        if let Some(auth_b64) = entry.and_then(|e| e.auth.as_deref()) {
            let (username, password) = decode_auth(auth_b64, key)?;
            tracing::debug!("Found credentials in auths for {}", key);
            return Ok(RegistryCredentials {
                username,
                password,
                email: entry.and_then(|e| e.email.clone()),
                serveraddress: serveraddress.to_string(),
            });
        }

        // 2. credential helper を確認
        let helper = config
            .cred_helpers
            .get(key)
            .or(config.creds_store.as_ref());
        if let Some(helper) = helper {
            tracing::debug!("Trying credential helper: {}", helper);
            if let Some((username, password)) = self.get_from_helper(helper, key)? {
                return Ok(RegistryCredentials {
                    username,
                    password,
                    email: None,
                    serveraddress: serveraddress.to_string(),
                });
            }
        }

        Err(BuildError::MissingCredentials(format!(
            "no auth entry for {} in {}",
            key,
            self.config_path.display()
        )))
    }

    /// Docker config.json を読み込み
    fn load_docker_config(&self) -> BuildResult<DockerConfig> {
        let content =
            std::fs::read_to_string(&self.config_path).map_err(|e| BuildError::AuthFailed {
                registry: self.config_path.display().to_string(),
                message: format!("Failed to read config.json: {}", e),
            })?;

        serde_json::from_str(&content).map_err(|e| BuildError::AuthFailed {
            registry: self.config_path.display().to_string(),
            message: format!("Failed to parse config.json: {}", e),
        })
    }

    /// credential helper から認証情報を取得
    fn get_from_helper(
        &self,
        helper: &str,
        registry: &str,
    ) -> BuildResult<Option<(String, String)>> {
        let helper_cmd = format!("docker-credential-{}", helper);

        let mut child = Command::new(&helper_cmd)
            .arg("get")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| BuildError::AuthFailed {
                registry: registry.to_string(),
                message: format!("Failed to run {}: {}", helper_cmd, e),
            })?;

        // レジストリ名を stdin に渡す
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(registry.as_bytes()).ok();
        }

        let output = child
            .wait_with_output()
            .map_err(|e| BuildError::AuthFailed {
                registry: registry.to_string(),
                message: format!("Credential helper failed: {}", e),
            })?;

        if !output.status.success() {
            // credential helper が認証情報を持っていない場合は None を返す
            tracing::debug!(
                "Credential helper returned error for {}: {}",
                registry,
                String::from_utf8_lossy(&output.stderr)
            );
            return Ok(None);
        }

        let response: CredentialResponse =
            serde_json::from_slice(&output.stdout).map_err(|e| BuildError::AuthFailed {
                registry: registry.to_string(),
                message: format!("Failed to parse credential helper response: {}", e),
            })?;

        Ok(Some((response.username, response.secret)))
    }
}

/// Base64エンコードされた "username:password" をデコード
///
/// パスワードに `:` が含まれてもよいよう、最初の `:` で分割する
fn decode_auth(auth_b64: &str, registry: &str) -> BuildResult<(String, String)> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(auth_b64.trim())
        .map_err(|e| BuildError::AuthFailed {
            registry: registry.to_string(),
            message: format!("Failed to decode auth: {}", e),
        })?;

    let auth_str = String::from_utf8(decoded).map_err(|e| BuildError::AuthFailed {
        registry: registry.to_string(),
        message: format!("Invalid UTF-8 in auth: {}", e),
    })?;

    auth_str
        .split_once(':')
        .map(|(user, pass)| (user.to_string(), pass.to_string()))
        .ok_or_else(|| BuildError::AuthFailed {
            registry: registry.to_string(),
            message: "auth is not in user:password form".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn encode(raw: &str) -> String {
        base64::engine::general_purpose::STANDARD.encode(raw)
    }

    fn write_config(dir: &Path, json: &str) -> PathBuf {
        let path = dir.join("config.json");
        fs::write(&path, json).unwrap();
        path
    }

    #[test]
    fn test_explicit_credentials() {
        let auth = RegistryAuth::with_config_path(PathBuf::from("/nonexistent/config.json"));
        let settings = RegistrySettings {
            username: Some("bob".into()),
            password: Some("secret".into()),
            email: Some("bob@example.com".into()),
            ..Default::default()
        };

        let creds = auth.resolve(Some(&settings)).unwrap();
        assert_eq!(creds.username, "bob");
        assert_eq!(creds.password, "secret");
        assert_eq!(creds.serveraddress, DEFAULT_SERVER);
        assert_eq!(creds.to_docker().email.as_deref(), Some("bob@example.com"));
    }

    #[test]
    fn test_explicit_credentials_missing_email() {
        let auth = RegistryAuth::with_config_path(PathBuf::from("/nonexistent/config.json"));
        let settings = RegistrySettings {
            username: Some("bob".into()),
            password: Some("secret".into()),
            ..Default::default()
        };

        match auth.resolve(Some(&settings)) {
            Err(BuildError::MissingCredentials(msg)) => assert!(msg.contains("email")),
            other => panic!("Expected MissingCredentials, got {:?}", other),
        }
    }

    #[test]
    fn test_credentials_from_config_file() {
        let dir = tempdir().unwrap();
        let path = write_config(
            dir.path(),
            &format!(
                r#"{{"auths": {{"{}": {{"auth": "{}", "email": "bob@example.com"}}}}}}"#,
                DEFAULT_SERVER,
                encode("bob:pa:ss")
            ),
        );

        let creds = RegistryAuth::with_config_path(path).resolve(None).unwrap();
        assert_eq!(creds.username, "bob");
        assert_eq!(creds.password, "pa:ss");
        assert_eq!(creds.email.as_deref(), Some("bob@example.com"));
    }

    #[test]
    fn test_auth_key_override() {
        let dir = tempdir().unwrap();
        let path = write_config(
            dir.path(),
            &format!(
                r#"{{"auths": {{"registry.example.com": {{"auth": "{}"}}}}}}"#,
                encode("alice:pw")
            ),
        );
        let settings = RegistrySettings {
            serveraddress: Some("https://registry.example.com/v2/".into()),
            auth: Some("registry.example.com".into()),
            ..Default::default()
        };

        let creds = RegistryAuth::with_config_path(path)
            .resolve(Some(&settings))
            .unwrap();
        assert_eq!(creds.username, "alice");
        assert_eq!(creds.email, None);
        assert_eq!(creds.serveraddress, "https://registry.example.com/v2/");
    }

    #[test]
    fn test_missing_entry() {
        let dir = tempdir().unwrap();
        let path = write_config(dir.path(), r#"{"auths": {}}"#);

        let result = RegistryAuth::with_config_path(path).resolve(None);
        assert!(matches!(result, Err(BuildError::MissingCredentials(_))));
    }

    #[test]
    fn test_missing_config_file() {
        let dir = tempdir().unwrap();
        let result =
            RegistryAuth::with_config_path(dir.path().join("config.json")).resolve(None);
        assert!(matches!(result, Err(BuildError::MissingCredentials(_))));
    }

    #[test]
    fn test_malformed_auth() {
        let dir = tempdir().unwrap();
        let path = write_config(
            dir.path(),
            &format!(
                r#"{{"auths": {{"{}": {{"auth": "{}"}}}}}}"#,
                DEFAULT_SERVER,
                encode("no-colon")
            ),
        );

        let result = RegistryAuth::with_config_path(path).resolve(None);
        assert!(matches!(result, Err(BuildError::AuthFailed { .. })));
    }
}
