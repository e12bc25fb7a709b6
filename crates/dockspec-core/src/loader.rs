//! マニフェストのロードと検証

use crate::error::{CoreError, Result};
use crate::flags::parse_bool;
use crate::model::{CommandCheck, DEFAULT_SUPERVISOR, DockSpecConfig, RegistrySettings};
use serde::{Deserialize, Deserializer, de};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, instrument};

#[derive(Debug, Default, Deserialize)]
struct RawManifest {
    name: Option<String>,
    account: Option<String>,
    container_name: Option<String>,
    #[serde(default, deserialize_with = "yaml_bool")]
    build_image: Option<bool>,
    #[serde(default, deserialize_with = "yaml_bool")]
    build_root: Option<bool>,
    #[serde(default, deserialize_with = "yaml_bool")]
    clear_cache: Option<bool>,
    #[serde(default, deserialize_with = "yaml_bool")]
    push_container: Option<bool>,
    #[serde(default, deserialize_with = "yaml_bool")]
    keep_running: Option<bool>,
    network_mode: Option<String>,
    #[serde(default)]
    env: BTreeMap<String, Value>,
    tag_db: Option<String>,
    tag_prefix: Option<String>,
    supervisor: Option<String>,
    #[serde(default)]
    checks: Vec<CommandCheck>,
    #[serde(alias = "dockerhub")]
    registry: Option<RegistrySettings>,
}

/// マニフェストファイルを読み込んで検証する
#[instrument(fields(path = %path.display()))]
pub fn load_config(path: &Path) -> Result<DockSpecConfig> {
    if !path.is_file() {
        return Err(CoreError::ConfigNotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path).map_err(|e| CoreError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    parse_config(&content, path)
}

/// YAML文字列からマニフェストを組み立てる
///
/// `path` はエラーメッセージ用
pub fn parse_config(content: &str, path: &Path) -> Result<DockSpecConfig> {
    let invalid = |message: String| CoreError::InvalidYaml {
        path: path.to_path_buf(),
        message,
    };

    let document: Value = serde_yaml::from_str(content).map_err(|e| invalid(e.to_string()))?;
    let document = match document {
        Value::Mapping(map) => Value::Mapping(normalize_keys(map)),
        Value::Null => return Err(invalid("ドキュメントが空です".to_string())),
        _ => return Err(invalid("トップレベルはマッピングである必要があります".to_string())),
    };

    let raw: RawManifest = serde_yaml::from_value(document).map_err(|e| invalid(e.to_string()))?;
    debug!("Parsed manifest: {:?}", raw);

    let name = required(raw.name, "name")?;
    let account = required(raw.account, "account")?;
    let image_name = format!("{}/{}", account, name);

    let mut env = BTreeMap::new();
    for (key, value) in raw.env {
        env.insert(key.clone(), scalar_to_string(&key, value)?);
    }

    Ok(DockSpecConfig {
        container_name: raw
            .container_name
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| name.clone()),
        name,
        account,
        image_name,
        build_image: raw.build_image,
        build_root: raw.build_root,
        clear_cache: raw.clear_cache,
        push_container: raw.push_container,
        keep_running: raw.keep_running,
        network_mode: raw.network_mode,
        env,
        tag_db: raw.tag_db,
        tag_prefix: raw.tag_prefix,
        supervisor: raw
            .supervisor
            .unwrap_or_else(|| DEFAULT_SUPERVISOR.to_string()),
        checks: raw.checks,
        registry: raw.registry,
    })
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(CoreError::MissingField {
            field: field.to_string(),
        }),
    }
}

/// `:name:` のようなシンボル風キーを `name` に揃える
fn normalize_keys(map: Mapping) -> Mapping {
    map.into_iter()
        .map(|(key, value)| {
            let key = match key {
                Value::String(s) => Value::String(s.strip_prefix(':').unwrap_or(&s).to_string()),
                other => other,
            };
            let value = match value {
                Value::Mapping(inner) => Value::Mapping(normalize_keys(inner)),
                other => other,
            };
            (key, value)
        })
        .collect()
}

/// `yes` / `no` / `on` / `off` も真偽値として受け付ける
fn yaml_bool<'de, D>(deserializer: D) -> std::result::Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(b)),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "on" => Ok(Some(true)),
            "off" => Ok(Some(false)),
            other => parse_bool(other)
                .map(Some)
                .ok_or_else(|| de::Error::custom(format!("真偽値ではありません: {}", s))),
        },
        Some(other) => Err(de::Error::custom(format!(
            "真偽値ではありません: {:?}",
            other
        ))),
    }
}

fn scalar_to_string(key: &str, value: Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        _ => Err(CoreError::InvalidField {
            field: format!("env.{}", key),
            message: "スカラー値を指定してください".to_string(),
        }),
    }
}
