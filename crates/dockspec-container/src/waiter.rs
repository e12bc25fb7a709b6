//! コンテナ起動待機モジュール
//!
//! Running 状態になるまでのポーリングと、ログ出力が止まるまでの待機を提供します。
//! ログが止まったことは「起動処理が一段落した」目安でしかなく、保証ではありません。

use crate::error::{ContainerError, Result};
use crate::runtime::{ContainerRuntime, ContainerState, ContainerStatus};
use std::time::Duration;
use tokio::time::sleep;

/// 待機パラメータ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitTiming {
    /// Running になるまでの上限
    pub running_timeout: Duration,
    /// Running 確認の間隔
    pub poll_interval: Duration,
    /// ログサイズを取る最大回数
    pub log_samples: usize,
    /// ログサイズを取る間隔
    pub sample_interval: Duration,
    /// 何回連続で同じサイズなら安定とみなすか
    pub stable_window: usize,
}

impl Default for WaitTiming {
    fn default() -> Self {
        Self {
            running_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
            log_samples: 60,
            sample_interval: Duration::from_secs(1),
            stable_window: 3,
        }
    }
}

/// ログ安定待ちの結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStability {
    /// 直近 `stable_window` 回のサイズが同じ（かつ 0 でない）
    Stable { samples: usize, size: usize },
    /// 上限回数まで取っても安定しなかった
    Unsettled { samples: usize },
}

impl LogStability {
    pub fn samples(&self) -> usize {
        match self {
            LogStability::Stable { samples, .. } | LogStability::Unsettled { samples } => *samples,
        }
    }
}

/// コンテナが Running になるまで待つ
///
/// # Returns
/// * `Ok(status)` - Running になった
/// * `Err(ContainerError::RunningTimeout)` - `running_timeout` 内に Running にならなかった
pub async fn wait_until_running<R: ContainerRuntime>(
    runtime: &R,
    id: &str,
    timing: &WaitTiming,
) -> Result<ContainerStatus> {
    let mut last_state = ContainerState::Unknown;
    let outcome = tokio::time::timeout(
        timing.running_timeout,
        poll_running(runtime, id, timing.poll_interval, &mut last_state),
    )
    .await;

    match outcome {
        Ok(result) => result,
        Err(_) => Err(ContainerError::RunningTimeout {
            container: id.to_string(),
            seconds: timing.running_timeout.as_secs(),
            last_state: last_state.to_string(),
        }),
    }
}

async fn poll_running<R: ContainerRuntime>(
    runtime: &R,
    id: &str,
    interval: Duration,
    last_state: &mut ContainerState,
) -> Result<ContainerStatus> {
    loop {
        let status = runtime.inspect(id).await?;
        if status.state == ContainerState::Running {
            return Ok(status);
        }
        *last_state = status.state;
        sleep(interval).await;
    }
}

/// 直近 `window` 個のサンプルが同じ値かつ 0 でないか
pub fn is_plateau(samples: &[usize], window: usize) -> bool {
    if window == 0 || samples.len() < window {
        return false;
    }
    let recent = &samples[samples.len() - window..];
    recent[0] > 0 && recent.iter().all(|&size| size == recent[0])
}

/// ログ出力が伸びなくなるまで待つ
///
/// 最大 `log_samples` 回サイズを取り、安定しなくてもエラーにはしない。
/// `on_sample` にはサンプル番号（1始まり）とサイズが渡る。
pub async fn wait_for_stable_logs<R, F>(
    runtime: &R,
    id: &str,
    timing: &WaitTiming,
    mut on_sample: F,
) -> Result<LogStability>
where
    R: ContainerRuntime,
    F: FnMut(usize, usize),
{
    let mut sizes = Vec::with_capacity(timing.log_samples);

    for attempt in 0..timing.log_samples {
        let size = runtime.logs(id).await?.len();
        sizes.push(size);
        on_sample(attempt + 1, size);

        if is_plateau(&sizes, timing.stable_window) {
            tracing::debug!("Logs of {} settled at {} bytes", id, size);
            return Ok(LogStability::Stable {
                samples: sizes.len(),
                size,
            });
        }

        // 最後の試行でなければ待機
        if attempt + 1 < timing.log_samples {
            sleep(timing.sample_interval).await;
        }
    }

    tracing::warn!(
        "Logs of {} did not settle after {} samples",
        id,
        sizes.len()
    );
    Ok(LogStability::Unsettled {
        samples: sizes.len(),
    })
}
