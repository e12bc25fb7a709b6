//! dockspec のマニフェストモデルとフラグ解決
//!
//! `docker_spec.yml` の読み込み・検証と、
//! 環境変数 → マニフェスト → 対話プロンプトの順で行うフラグ解決を提供します。

pub mod error;
pub mod flags;
pub mod loader;
pub mod model;
pub mod prompt;

pub use error::{CoreError, Result};
pub use flags::{ENV_PREFIX, Flag, FlagResolver, FlagSource, Setting, parse_bool};
pub use loader::{load_config, parse_config};
pub use model::{CommandCheck, DEFAULT_SUPERVISOR, DockSpecConfig, RegistrySettings};
pub use prompt::{NonInteractive, Prompter, StdinPrompter, ask};
