//! フラグ解決
//!
//! 各フラグは次の順で決まる:
//! 1. 環境変数 `DOCKER_SPEC_<FLAG>`（`build_image` は旧名 `DOCKER_SPEC_BUILD_DOCKER_IMAGE` も可）
//! 2. マニフェストの値
//! 3. 対話プロンプト（デフォルトは No）

use crate::error::{CoreError, Result};
use crate::model::DockSpecConfig;
use crate::prompt::Prompter;
use std::env::VarError;

/// 環境変数名の接頭辞
pub const ENV_PREFIX: &str = "DOCKER_SPEC_";

/// 真偽値フラグ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    BuildImage,
    BuildRoot,
    ClearCache,
    PushContainer,
    KeepRunning,
}

impl Flag {
    pub const ALL: [Flag; 5] = [
        Flag::BuildImage,
        Flag::BuildRoot,
        Flag::ClearCache,
        Flag::PushContainer,
        Flag::KeepRunning,
    ];

    /// マニフェスト上のキー名
    pub fn key(self) -> &'static str {
        match self {
            Flag::BuildImage => "build_image",
            Flag::BuildRoot => "build_root",
            Flag::ClearCache => "clear_cache",
            Flag::PushContainer => "push_container",
            Flag::KeepRunning => "keep_running",
        }
    }

    pub fn env_var(self) -> String {
        format!("{}{}", ENV_PREFIX, self.key().to_uppercase())
    }

    /// 以前の名前。`env_var` が未設定のときだけ参照する
    pub fn legacy_env_var(self) -> Option<&'static str> {
        match self {
            Flag::BuildImage => Some("DOCKER_SPEC_BUILD_DOCKER_IMAGE"),
            _ => None,
        }
    }

    pub fn question(self) -> &'static str {
        match self {
            Flag::BuildImage => "Build docker image? ",
            Flag::BuildRoot => "Rebuild root filesystem? ",
            Flag::ClearCache => "Clear docker cache? ",
            Flag::PushContainer => "Push new tag? ",
            Flag::KeepRunning => "Keep container running? ",
        }
    }

    fn configured(self, config: &DockSpecConfig) -> Option<bool> {
        match self {
            Flag::BuildImage => config.build_image,
            Flag::BuildRoot => config.build_root,
            Flag::ClearCache => config.clear_cache,
            Flag::PushContainer => config.push_container,
            Flag::KeepRunning => config.keep_running,
        }
    }
}

/// 文字列設定（プロンプトなし）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Setting {
    TagDb,
    TagPrefix,
}

impl Setting {
    pub fn key(self) -> &'static str {
        match self {
            Setting::TagDb => "tag_db",
            Setting::TagPrefix => "tag_prefix",
        }
    }

    pub fn env_var(self) -> String {
        format!("{}{}", ENV_PREFIX, self.key().to_uppercase())
    }

    fn configured(self, config: &DockSpecConfig) -> Option<&str> {
        match self {
            Setting::TagDb => config.tag_db.as_deref(),
            Setting::TagPrefix => config.tag_prefix.as_deref(),
        }
    }
}

/// 値がどこから来たか
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagSource {
    Env,
    Manifest,
    Prompt,
}

/// `true/yes/y` と `false/no/n` を大文字小文字を区別せずに解釈する
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" => Some(true),
        "false" | "no" | "n" => Some(false),
        _ => None,
    }
}

/// マニフェストとプロンプトを束ねてフラグを解決する
pub struct FlagResolver<'a, P: Prompter> {
    config: &'a DockSpecConfig,
    prompter: &'a P,
}

impl<'a, P: Prompter> FlagResolver<'a, P> {
    pub fn new(config: &'a DockSpecConfig, prompter: &'a P) -> Self {
        Self { config, prompter }
    }

    pub fn config(&self) -> &DockSpecConfig {
        self.config
    }

    /// フラグを解決する
    pub fn resolve(&self, flag: Flag) -> Result<bool> {
        self.resolve_with_source(flag).map(|(value, _)| value)
    }

    pub fn resolve_with_source(&self, flag: Flag) -> Result<(bool, FlagSource)> {
        if let Some(value) = self.preset(flag)? {
            return Ok(value);
        }
        let answer = self.prompter.confirm(flag.question(), false)?;
        tracing::debug!("{} answered interactively: {}", flag.key(), answer);
        Ok((answer, FlagSource::Prompt))
    }

    /// 環境変数かマニフェストで決まっている値。未定ならプロンプトせずに `None`
    pub fn preset(&self, flag: Flag) -> Result<Option<(bool, FlagSource)>> {
        let primary = flag.env_var();
        let (var, raw) = match read_env(&primary)? {
            Some(raw) => (primary, Some(raw)),
            None => match flag.legacy_env_var() {
                Some(legacy) => (legacy.to_string(), read_env(legacy)?),
                None => (primary, None),
            },
        };
        if let Some(raw) = raw {
            let value = parse_bool(&raw).ok_or_else(|| CoreError::InvalidEnvValue {
                var: var.clone(),
                value: raw.clone(),
            })?;
            tracing::debug!("{} overridden by {}: {}", flag.key(), var, value);
            return Ok(Some((value, FlagSource::Env)));
        }
        Ok(flag
            .configured(self.config)
            .map(|value| (value, FlagSource::Manifest)))
    }

    /// 全フラグと設定の環境変数を検証する
    ///
    /// 副作用のある処理の前に呼び、不正な値があれば何もせずに失敗させる。
    /// プロンプトは出さない。
    pub fn check_env(&self) -> Result<()> {
        for flag in Flag::ALL {
            self.preset(flag)?;
        }
        for setting in [Setting::TagDb, Setting::TagPrefix] {
            self.setting(setting)?;
        }
        Ok(())
    }

    /// 文字列設定を解決する（環境変数 → マニフェスト）
    pub fn setting(&self, setting: Setting) -> Result<Option<String>> {
        if let Some(value) = read_env(&setting.env_var())? {
            return Ok(Some(value));
        }
        Ok(setting.configured(self.config).map(str::to_string))
    }
}

/// 空文字列は未設定として扱う
fn read_env(var: &str) -> Result<Option<String>> {
    match std::env::var(var) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => Ok(Some(value)),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(raw)) => Err(CoreError::InvalidEnvValue {
            var: var.to_string(),
            value: raw.to_string_lossy().into_owned(),
        }),
    }
}
