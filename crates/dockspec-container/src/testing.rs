//! テスト用のインメモリランタイム
//!
//! Docker デーモンなしでライフサイクル・チェック・パイプラインを検証するためのもの。
//! `test-utils` フィーチャーで他クレートのテストからも使える。

use crate::error::{ContainerError, Result};
use crate::runtime::{
    ContainerRuntime, ContainerSpec, ContainerState, ContainerStatus, ExecOutput,
};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
struct FakeContainer {
    id: String,
    name: String,
    image: String,
    state: ContainerState,
    started: bool,
    /// start 後の inspect 回数
    inspections: usize,
}

#[derive(Debug, Default)]
struct FakeState {
    containers: Vec<FakeContainer>,
    next_id: usize,
    log_reads: usize,
    calls: Vec<String>,
}

/// [`ContainerRuntime`] のインメモリ実装
#[derive(Debug)]
pub struct FakeRuntime {
    state: Mutex<FakeState>,
    start_delay: usize,
    never_running: bool,
    crash_after: Option<usize>,
    missing_images: Vec<String>,
    log_sizes: Vec<usize>,
    log_text: String,
    exec_results: Vec<(String, ExecOutput)>,
}

impl Default for FakeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            start_delay: 0,
            never_running: false,
            crash_after: None,
            missing_images: Vec::new(),
            log_sizes: Vec::new(),
            log_text: "booting\nready\n".to_string(),
            exec_results: Vec::new(),
        }
    }

    /// start 後、`inspections` 回目の inspect までは created のまま
    pub fn with_start_delay(mut self, inspections: usize) -> Self {
        self.start_delay = inspections;
        self
    }

    /// start しても running にならない
    pub fn never_running(mut self) -> Self {
        self.never_running = true;
        self
    }

    /// running になってから `inspections` 回 inspect されると停止する
    pub fn crash_after(mut self, inspections: usize) -> Self {
        self.crash_after = Some(inspections);
        self
    }

    /// create 時に ImageNotFound を返すイメージ
    pub fn with_missing_image(mut self, image: &str) -> Self {
        self.missing_images.push(image.to_string());
        self
    }

    /// logs を呼ぶたびに返すサイズの並び。使い切ったら最後の値を返し続ける
    pub fn with_log_sizes(mut self, sizes: Vec<usize>) -> Self {
        self.log_sizes = sizes;
        self
    }

    pub fn with_log_text(mut self, text: &str) -> Self {
        self.log_text = text.to_string();
        self
    }

    /// 連結したコマンドに `pattern` を含む exec の結果
    pub fn with_exec_result(mut self, pattern: &str, output: ExecOutput) -> Self {
        self.exec_results.push((pattern.to_string(), output));
        self
    }

    /// 既存コンテナを登録する（停止中扱い）
    pub fn insert_existing(&self, name: &str, image: &str) -> String {
        let mut state = self.lock();
        let id = Self::allocate_id(&mut state);
        state.containers.push(FakeContainer {
            id: id.clone(),
            name: name.to_string(),
            image: image.to_string(),
            state: ContainerState::Stopped,
            started: false,
            inspections: 0,
        });
        id
    }

    pub fn containers_named(&self, name: &str) -> usize {
        self.lock()
            .containers
            .iter()
            .filter(|c| c.name == name)
            .count()
    }

    pub fn log_reads(&self) -> usize {
        self.lock().log_reads
    }

    /// `"create web"` `"start fake-1"` 形式の呼び出し履歴
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn allocate_id(state: &mut FakeState) -> String {
        state.next_id += 1;
        format!("fake-{}", state.next_id)
    }

    fn not_found(id: &str) -> ContainerError {
        ContainerError::ContainerNotFound {
            container: id.to_string(),
        }
    }
}

impl ContainerRuntime for FakeRuntime {
    async fn find_by_name(&self, name: &str) -> Result<Vec<String>> {
        let mut state = self.lock();
        state.calls.push(format!("find {}", name));
        Ok(state
            .containers
            .iter()
            .filter(|c| c.name == name)
            .map(|c| c.id.clone())
            .collect())
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<String> {
        let mut state = self.lock();
        state.calls.push(format!("create {}", spec.name));
        if self.missing_images.contains(&spec.image) {
            return Err(ContainerError::ImageNotFound {
                image: spec.image.clone(),
            });
        }
        if state.containers.iter().any(|c| c.name == spec.name) {
            return Err(ContainerError::DockerApiError(format!(
                "Conflict. The container name \"/{}\" is already in use",
                spec.name
            )));
        }
        let id = Self::allocate_id(&mut state);
        state.containers.push(FakeContainer {
            id: id.clone(),
            name: spec.name.clone(),
            image: spec.image.clone(),
            state: ContainerState::Created,
            started: false,
            inspections: 0,
        });
        Ok(id)
    }

    async fn start(&self, id: &str) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(format!("start {}", id));
        let container = state
            .containers
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| Self::not_found(id))?;
        container.started = true;
        container.inspections = 0;
        if self.start_delay == 0 && !self.never_running {
            container.state = ContainerState::Running;
        }
        Ok(())
    }

    async fn inspect(&self, id: &str) -> Result<ContainerStatus> {
        let mut state = self.lock();
        let container = state
            .containers
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| Self::not_found(id))?;

        container.inspections += 1;
        match container.state {
            ContainerState::Created
                if container.started
                    && !self.never_running
                    && container.inspections > self.start_delay =>
            {
                container.state = ContainerState::Running;
                container.inspections = 1;
            }
            ContainerState::Running => {
                if self
                    .crash_after
                    .is_some_and(|limit| container.inspections > limit)
                {
                    container.state = ContainerState::Stopped;
                }
            }
            _ => {}
        }

        Ok(ContainerStatus {
            id: container.id.clone(),
            name: container.name.clone(),
            state: container.state,
            image: container.image.clone(),
        })
    }

    async fn logs(&self, id: &str) -> Result<String> {
        let mut state = self.lock();
        if !state.containers.iter().any(|c| c.id == id) {
            return Err(Self::not_found(id));
        }
        let read = state.log_reads;
        state.log_reads += 1;

        if self.log_sizes.is_empty() {
            return Ok(self.log_text.clone());
        }
        let size = self
            .log_sizes
            .get(read)
            .or_else(|| self.log_sizes.last())
            .copied()
            .unwrap_or_default();
        Ok("x".repeat(size))
    }

    async fn exec(&self, id: &str, cmd: &[String]) -> Result<ExecOutput> {
        let mut state = self.lock();
        let joined = cmd.join(" ");
        state.calls.push(format!("exec {}", joined));
        let container = state
            .containers
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| Self::not_found(id))?;
        if container.state != ContainerState::Running {
            return Err(ContainerError::ExecFailed {
                container: id.to_string(),
                message: "container is not running".to_string(),
            });
        }

        Ok(self
            .exec_results
            .iter()
            .find(|(pattern, _)| joined.contains(pattern.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_default())
    }

    async fn kill(&self, id: &str) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(format!("kill {}", id));
        let container = state
            .containers
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| Self::not_found(id))?;
        if container.state != ContainerState::Running {
            return Err(ContainerError::DockerApiError(format!(
                "Container {} is not running",
                id
            )));
        }
        container.state = ContainerState::Stopped;
        Ok(())
    }

    async fn remove(&self, id: &str, force: bool) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(format!("remove {}", id));
        let Some(index) = state.containers.iter().position(|c| c.id == id) else {
            return Ok(());
        };
        if state.containers[index].state == ContainerState::Running && !force {
            return Err(ContainerError::DockerApiError(format!(
                "You cannot remove a running container {}",
                id
            )));
        }
        state.containers.remove(index);
        Ok(())
    }
}
