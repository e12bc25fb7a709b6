use crate::pipeline::{Pipeline, PipelineOptions};
use colored::Colorize;
use dockspec_build::{DockerImageEngine, RegistryAuth};
use dockspec_config::RunLock;
use dockspec_container::{DockerRuntime, WaitTiming};
use dockspec_core::{DockSpecConfig, NonInteractive, Prompter, StdinPrompter};
use std::path::Path;

/// パイプラインを実行する。チェックが全て通れば `true`
pub async fn handle(config_path: Option<&Path>, no_input: bool) -> anyhow::Result<bool> {
    let work_dir = std::env::current_dir()?;
    let manifest = dockspec_config::find_config_file(config_path, &work_dir)?;
    let config = dockspec_core::load_config(&manifest)?;

    println!(
        "{} {}",
        "イメージ:".blue(),
        config.image_name.cyan()
    );

    // 同じ account/name の実行は直列化する
    let lock_path = RunLock::lock_path(&config.account, &config.name);
    let _lock = match RunLock::try_acquire_at(&lock_path)? {
        Some(lock) => lock,
        None => {
            println!(
                "  ℹ 別の dockspec が {} を処理中です。終了を待っています...",
                config.image_name.cyan()
            );
            RunLock::acquire_at(&lock_path)?
        }
    };
    tracing::debug!("Holding run lock {}", lock_path.display());

    if no_input {
        execute(&config, &work_dir, &NonInteractive).await
    } else {
        execute(&config, &work_dir, &StdinPrompter).await
    }
}

async fn execute<P: Prompter>(
    config: &DockSpecConfig,
    work_dir: &Path,
    prompter: &P,
) -> anyhow::Result<bool> {
    let docker = crate::docker::init_docker_with_error_handling().await?;
    let engine = DockerImageEngine::new(docker.clone());
    let runtime = DockerRuntime::new(docker);

    let options = PipelineOptions {
        context_dir: work_dir.to_path_buf(),
        timing: WaitTiming::default(),
        show_progress: true,
    };
    let pipeline = Pipeline::new(&engine, &runtime, prompter, RegistryAuth::new()?, options);
    let report = pipeline.run(config).await?;

    println!();
    if report.passed() {
        match &report.published {
            Some(tag) => println!(
                "{}",
                format!("✓ 完了: {}:{} を公開しました", config.image_name, tag)
                    .green()
                    .bold()
            ),
            None => println!("{}", "✓ 全てのチェックに成功しました".green().bold()),
        }
    } else {
        println!("{}", "✗ チェックに失敗しました".red().bold());
    }

    Ok(report.passed())
}
