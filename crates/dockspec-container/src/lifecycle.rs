//! コンテナのライフサイクル管理
//!
//! absent → created → starting → running → stable → terminated の順に進む。
//! 同名コンテナは作成前に必ず強制削除するので、何度起動しても同名は一つだけ残る。

use crate::error::Result;
use crate::progress::WaitProgress;
use crate::runtime::{ContainerRuntime, ContainerSpec};
use crate::waiter::{LogStability, WaitTiming, wait_for_stable_logs, wait_until_running};
use colored::Colorize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Absent,
    Created,
    Starting,
    Running,
    Stable,
    Terminated,
}

/// 起動済みコンテナ
#[derive(Debug, Clone)]
pub struct ManagedContainer {
    pub id: String,
    pub name: String,
    pub state: LifecycleState,
    /// ログ安定待ちの結果（running まで進んでいなければ None）
    pub stability: Option<LogStability>,
}

/// 後片付けの結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Teardown {
    /// 起動したまま残した。接続コマンドを添える
    Kept { hint: String },
    Deleted,
}

pub fn connect_hint(container_name: &str) -> String {
    format!("docker exec -ti {} bash", container_name)
}

pub struct Lifecycle<'a, R: ContainerRuntime> {
    runtime: &'a R,
    timing: WaitTiming,
    show_progress: bool,
}

impl<'a, R: ContainerRuntime> Lifecycle<'a, R> {
    pub fn new(runtime: &'a R, timing: WaitTiming) -> Self {
        Self {
            runtime,
            timing,
            show_progress: true,
        }
    }

    /// スピナーを表示しない
    pub fn quiet(mut self) -> Self {
        self.show_progress = false;
        self
    }

    /// 同名コンテナを強制削除する。削除した数を返す
    pub async fn remove_existing(&self, name: &str) -> Result<usize> {
        let ids = self.runtime.find_by_name(name).await?;
        for id in &ids {
            tracing::info!("Removing existing container {} ({})", name, id);
            self.runtime.remove(id, true).await?;
        }
        Ok(ids.len())
    }

    /// コンテナを作成・起動し、ログが落ち着くまで待つ
    ///
    /// running にならなければ `RunningTimeout` を返す。その場合コンテナは残る。
    pub async fn launch(&self, spec: &ContainerSpec) -> Result<ManagedContainer> {
        let removed = self.remove_existing(&spec.name).await?;
        if removed > 0 {
            println!("  ℹ 既存のコンテナを削除しました: {}", spec.name.cyan());
        }

        let id = self.runtime.create(spec).await?;
        let mut container = ManagedContainer {
            id,
            name: spec.name.clone(),
            state: LifecycleState::Created,
            stability: None,
        };
        tracing::debug!("Created container {} ({})", container.name, container.id);

        self.runtime.start(&container.id).await?;
        container.state = LifecycleState::Starting;
        println!("  ✓ 起動: {}", container.name.cyan());

        wait_until_running(self.runtime, &container.id, &self.timing).await?;
        container.state = LifecycleState::Running;
        tracing::info!("Container {} is running", container.name);

        let progress = if self.show_progress {
            WaitProgress::new(&container.name)
        } else {
            WaitProgress::hidden()
        };
        let total = self.timing.log_samples;
        let stability = match wait_for_stable_logs(
            self.runtime,
            &container.id,
            &self.timing,
            |attempt, size| progress.sample(attempt, total, size),
        )
        .await
        {
            Ok(stability) => stability,
            Err(e) => {
                progress.finish_error(&e.to_string());
                return Err(e);
            }
        };

        match stability {
            LogStability::Stable { .. } => progress.finish_stable(),
            LogStability::Unsettled { .. } => progress.finish_unsettled(),
        }
        container.state = LifecycleState::Stable;
        container.stability = Some(stability);

        Ok(container)
    }

    /// 後片付け
    ///
    /// `keep_running` なら何もしない。そうでなければ kill してから削除する。
    /// 既に止まっているコンテナへの kill エラーは無視する。
    pub async fn teardown(
        &self,
        container: &mut ManagedContainer,
        keep_running: bool,
    ) -> Result<Teardown> {
        if keep_running {
            let hint = connect_hint(&container.name);
            println!("  ℹ コンテナを起動したままにします: {}", container.name.cyan());
            println!("    → {}", hint.cyan());
            return Ok(Teardown::Kept { hint });
        }

        if let Err(e) = self.runtime.kill(&container.id).await {
            tracing::debug!("Ignoring kill error for {}: {}", container.name, e);
        }
        self.runtime.remove(&container.id, false).await?;
        container.state = LifecycleState::Terminated;
        println!("  ✓ 削除完了: {}", container.name);

        Ok(Teardown::Deleted)
    }
}
