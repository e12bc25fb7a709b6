//! 受け入れチェック
//!
//! 起動したコンテナに対して固定のチェックを順に実行し、続けてマニフェストの
//! `checks:` を実行する。既定では最初の失敗で残りを打ち切る。

use crate::error::ContainerError;
use crate::runtime::{ContainerRuntime, ContainerState};
use colored::Colorize;
use dockspec_core::{CommandCheck, DockSpecConfig};

#[derive(Debug, Clone, PartialEq)]
pub enum Check {
    /// `account/name:latest` が見つかった
    ImageAvailable,
    StateRunning,
    /// `StateRunning` と同じ判定をもう一度行う
    StaysRunning,
    /// 標準出力ログに `exit` が含まれない
    NoExitInLogs,
    /// コンテナ内でプロセスが動いている
    ProcessRunning(String),
    Command(CommandCheck),
}

impl Check {
    pub fn name(&self) -> String {
        match self {
            Check::ImageAvailable => "should be available".to_string(),
            Check::StateRunning => "should have state running".to_string(),
            Check::StaysRunning => "should stay running".to_string(),
            Check::NoExitInLogs => "should not have exit processes".to_string(),
            Check::ProcessRunning(process) => format!("{} should be running", process),
            Check::Command(check) => check.display_name(),
        }
    }
}

/// マニフェストから組み立てるチェック一式
pub fn default_suite(config: &DockSpecConfig) -> Vec<Check> {
    let mut suite = vec![
        Check::ImageAvailable,
        Check::StateRunning,
        Check::StaysRunning,
        Check::NoExitInLogs,
        Check::ProcessRunning(config.supervisor.clone()),
    ];
    suite.extend(config.checks.iter().cloned().map(Check::Command));
    suite
}

/// プロセス確認コマンド
pub fn process_probe(process: &str) -> Vec<String> {
    vec![
        "sh".to_string(),
        "-c".to_string(),
        format!(
            "ps aux | grep -w -- {} | grep -qv grep",
            shell_escape(process)
        ),
    ]
}

/// シェル用に文字列をエスケープ
pub fn shell_escape(s: &str) -> String {
    // シングルクォートでラップしてエスケープ
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// チェック対象
#[derive(Debug, Clone, Copy)]
pub struct SuiteTarget<'a> {
    /// イメージ検索の結果（見つからなければ None）
    pub image_id: Option<&'a str>,
    pub container_id: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub name: String,
    pub passed: bool,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuiteReport {
    pub outcomes: Vec<CheckOutcome>,
    /// fail-fast で実行しなかった数
    pub skipped: usize,
}

impl SuiteReport {
    pub fn failed(&self) -> bool {
        self.outcomes.iter().any(|o| !o.passed)
    }

    pub fn passed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.passed).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.len() - self.passed_count()
    }
}

pub struct CheckRunner<'a, R: ContainerRuntime> {
    runtime: &'a R,
}

impl<'a, R: ContainerRuntime> CheckRunner<'a, R> {
    pub fn new(runtime: &'a R) -> Self {
        Self { runtime }
    }

    /// チェックを順に実行する
    ///
    /// チェック中のエラー（exec 失敗など）はそのチェックの失敗として扱い、
    /// `Err` にはしない。最初の失敗で残りはスキップする。
    pub async fn run(&self, checks: &[Check], target: SuiteTarget<'_>) -> SuiteReport {
        let mut report = SuiteReport::default();

        for (index, check) in checks.iter().enumerate() {
            let name = check.name();
            let outcome = match self.evaluate(check, target).await {
                Ok(()) => {
                    println!("  {} {}", "✓".green(), name);
                    CheckOutcome {
                        name,
                        passed: true,
                        detail: None,
                    }
                }
                Err(detail) => {
                    println!("  {} {}: {}", "✗".red(), name.red(), detail);
                    CheckOutcome {
                        name,
                        passed: false,
                        detail: Some(detail),
                    }
                }
            };

            let passed = outcome.passed;
            report.outcomes.push(outcome);
            if !passed {
                report.skipped = checks.len() - index - 1;
                break;
            }
        }

        let summary = format!(
            "{} 件成功 / {} 件失敗 / {} 件未実行",
            report.passed_count(),
            report.failed_count(),
            report.skipped
        );
        if report.failed() {
            println!("{}", summary.red().bold());
        } else {
            println!("{}", summary.green().bold());
        }
        tracing::info!(
            "Check suite finished: {} passed, {} failed, {} skipped",
            report.passed_count(),
            report.failed_count(),
            report.skipped
        );

        report
    }

    async fn evaluate(&self, check: &Check, target: SuiteTarget<'_>) -> Result<(), String> {
        match check {
            Check::ImageAvailable => match target.image_id {
                Some(_) => Ok(()),
                None => Err("image not found".to_string()),
            },
            Check::StateRunning | Check::StaysRunning => {
                let status = self
                    .runtime
                    .inspect(target.container_id)
                    .await
                    .map_err(describe)?;
                if status.state == ContainerState::Running {
                    Ok(())
                } else {
                    Err(format!("expected running, got {}", status.state))
                }
            }
            Check::NoExitInLogs => {
                let logs = self
                    .runtime
                    .logs(target.container_id)
                    .await
                    .map_err(describe)?;
                match logs.lines().find(|line| line.contains("exit")) {
                    Some(line) => Err(format!("log contains \"exit\": {}", line.trim())),
                    None => Ok(()),
                }
            }
            Check::ProcessRunning(process) => {
                let output = self
                    .runtime
                    .exec(target.container_id, &process_probe(process))
                    .await
                    .map_err(describe)?;
                if output.exit_code == 0 {
                    Ok(())
                } else {
                    Err(format!("process '{}' not found", process))
                }
            }
            Check::Command(command) => {
                let cmd = vec![
                    "sh".to_string(),
                    "-c".to_string(),
                    command.command.clone(),
                ];
                let output = self
                    .runtime
                    .exec(target.container_id, &cmd)
                    .await
                    .map_err(describe)?;
                if output.exit_code != command.exit_status {
                    return Err(format!(
                        "exit status {} (expected {})",
                        output.exit_code, command.exit_status
                    ));
                }
                if let Some(expected) = &command.stdout {
                    let actual = chomp(&output.stdout);
                    if actual != expected {
                        return Err(format!("stdout {:?} (expected {:?})", actual, expected));
                    }
                }
                Ok(())
            }
        }
    }
}

fn describe(err: ContainerError) -> String {
    err.to_string()
}

/// 末尾の改行を1つだけ取り除く
fn chomp(s: &str) -> &str {
    s.strip_suffix("\r\n")
        .or_else(|| s.strip_suffix('\n'))
        .unwrap_or(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{ContainerSpec, ExecOutput};
    use crate::testing::FakeRuntime;

    fn config_with_checks(checks: Vec<CommandCheck>) -> DockSpecConfig {
        let mut config = dockspec_core::parse_config(
            "name: web\naccount: acme\n",
            std::path::Path::new("docker_spec.yml"),
        )
        .unwrap();
        config.checks = checks;
        config
    }

    async fn running(runtime: &FakeRuntime) -> String {
        let spec = ContainerSpec {
            name: "web".into(),
            image: "acme/web".into(),
            env: vec![],
            network_mode: None,
        };
        let id = runtime.create(&spec).await.unwrap();
        runtime.start(&id).await.unwrap();
        id
    }

    #[test]
    fn test_default_suite_order() {
        let config = config_with_checks(vec![CommandCheck {
            name: None,
            command: "ls /file.test".into(),
            exit_status: 0,
            stdout: None,
        }]);
        let names: Vec<String> = default_suite(&config).iter().map(Check::name).collect();
        assert_eq!(
            names,
            vec![
                "should be available",
                "should have state running",
                "should stay running",
                "should not have exit processes",
                "supervisord should be running",
                "command 'ls /file.test'",
            ]
        );
    }

    #[test]
    fn test_shell_escape() {
        assert_eq!(shell_escape("supervisord"), "'supervisord'");
        assert_eq!(shell_escape("it's"), "'it'\\''s'");
        assert_eq!(
            process_probe("nginx")[2],
            "ps aux | grep -w -- 'nginx' | grep -qv grep"
        );
    }

    #[test]
    fn test_chomp_single_newline() {
        assert_eq!(chomp("ok\n"), "ok");
        assert_eq!(chomp("ok\n\n"), "ok\n");
        assert_eq!(chomp("ok"), "ok");
    }

    #[tokio::test]
    async fn test_suite_passes() {
        let runtime = FakeRuntime::new();
        let id = running(&runtime).await;
        let config = config_with_checks(vec![]);

        let report = CheckRunner::new(&runtime)
            .run(
                &default_suite(&config),
                SuiteTarget {
                    image_id: Some("sha256:abc"),
                    container_id: &id,
                },
            )
            .await;

        assert!(!report.failed());
        assert_eq!(report.passed_count(), 5);
        assert!(
            runtime
                .calls()
                .iter()
                .any(|c| c.contains("grep -w -- 'supervisord'"))
        );
    }

    #[tokio::test]
    async fn test_fail_fast_on_missing_image() {
        let runtime = FakeRuntime::new();
        let id = running(&runtime).await;
        let config = config_with_checks(vec![]);

        let report = CheckRunner::new(&runtime)
            .run(
                &default_suite(&config),
                SuiteTarget {
                    image_id: None,
                    container_id: &id,
                },
            )
            .await;

        assert!(report.failed());
        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.skipped, 4);
    }

    #[tokio::test]
    async fn test_exit_in_logs_fails() {
        let runtime = FakeRuntime::new().with_log_text("starting\nworker exited with code 1\n");
        let id = running(&runtime).await;

        let report = CheckRunner::new(&runtime)
            .run(
                &[Check::NoExitInLogs],
                SuiteTarget {
                    image_id: Some("sha256:abc"),
                    container_id: &id,
                },
            )
            .await;

        assert!(report.failed());
        assert!(
            report.outcomes[0]
                .detail
                .as_deref()
                .unwrap()
                .contains("worker exited")
        );
    }

    #[tokio::test]
    async fn test_process_not_running_fails() {
        let runtime = FakeRuntime::new().with_exec_result(
            "supervisord",
            ExecOutput {
                exit_code: 1,
                ..Default::default()
            },
        );
        let id = running(&runtime).await;

        let report = CheckRunner::new(&runtime)
            .run(
                &[Check::ProcessRunning("supervisord".into())],
                SuiteTarget {
                    image_id: Some("sha256:abc"),
                    container_id: &id,
                },
            )
            .await;
        assert!(report.failed());
    }

    #[tokio::test]
    async fn test_stays_running_detects_crash() {
        let runtime = FakeRuntime::new().crash_after(1);
        let id = running(&runtime).await;

        let report = CheckRunner::new(&runtime)
            .run(
                &[Check::StateRunning, Check::StaysRunning],
                SuiteTarget {
                    image_id: Some("sha256:abc"),
                    container_id: &id,
                },
            )
            .await;

        assert!(report.outcomes[0].passed);
        assert!(!report.outcomes[1].passed);
    }

    #[tokio::test]
    async fn test_command_check_compares_stdout() {
        let runtime = FakeRuntime::new().with_exec_result(
            "cat /etc/timezone",
            ExecOutput {
                exit_code: 0,
                stdout: "Asia/Tokyo\n".into(),
                stderr: String::new(),
            },
        );
        let id = running(&runtime).await;
        let checks = vec![
            Check::Command(CommandCheck {
                name: Some("timezone".into()),
                command: "cat /etc/timezone".into(),
                exit_status: 0,
                stdout: Some("Asia/Tokyo".into()),
            }),
            Check::Command(CommandCheck {
                name: None,
                command: "cat /etc/timezone".into(),
                exit_status: 0,
                stdout: Some("UTC".into()),
            }),
        ];

        let report = CheckRunner::new(&runtime)
            .run(
                &checks,
                SuiteTarget {
                    image_id: Some("sha256:abc"),
                    container_id: &id,
                },
            )
            .await;

        assert!(report.outcomes[0].passed);
        assert!(!report.outcomes[1].passed);
        assert_eq!(report.skipped, 0);
    }
}
