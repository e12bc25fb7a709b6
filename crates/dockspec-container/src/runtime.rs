use crate::error::Result;
use dockspec_core::DockSpecConfig;

/// コンテナランタイムのトレイト
///
/// ライフサイクル管理とチェックはこのトレイト越しにエンジンを操作する。
#[allow(async_fn_in_trait)]
pub trait ContainerRuntime {
    /// 名前が完全一致するコンテナのID（停止中も含む）
    async fn find_by_name(&self, name: &str) -> Result<Vec<String>>;
    async fn create(&self, spec: &ContainerSpec) -> Result<String>;
    async fn start(&self, id: &str) -> Result<()>;
    async fn inspect(&self, id: &str) -> Result<ContainerStatus>;
    /// 標準出力のログ全文
    async fn logs(&self, id: &str) -> Result<String>;
    async fn exec(&self, id: &str, cmd: &[String]) -> Result<ExecOutput>;
    async fn kill(&self, id: &str) -> Result<()>;
    async fn remove(&self, id: &str, force: bool) -> Result<()>;
}

/// 作成するコンテナの設定
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    /// `KEY=VALUE`
    pub env: Vec<String>,
    pub network_mode: Option<String>,
}

impl ContainerSpec {
    pub fn from_config(config: &DockSpecConfig) -> Self {
        Self {
            name: config.container_name.clone(),
            image: config.image_name.clone(),
            env: config.env_pairs(),
            network_mode: config.network_mode.clone(),
        }
    }
}

/// コンテナのステータス
#[derive(Debug, Clone)]
pub struct ContainerStatus {
    pub id: String,
    pub name: String,
    pub state: ContainerState,
    pub image: String,
}

/// コンテナの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Created,
    Running,
    Paused,
    Stopped,
    Unknown,
}

impl std::fmt::Display for ContainerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ContainerState::Created => "created",
            ContainerState::Running => "running",
            ContainerState::Paused => "paused",
            ContainerState::Stopped => "stopped",
            ContainerState::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// exec の結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}
