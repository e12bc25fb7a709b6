mod commands;
mod docker;
mod pipeline;

use clap::{Parser, Subcommand};
use colored::Colorize;
use dockspec_build::BuildError;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "dockspec")]
#[command(
    about = "Dockerイメージをビルドし、起動したコンテナで検証してから公開する",
    long_about = None
)]
struct Cli {
    /// マニフェストのパス（既定: ./docker_spec.yml）
    #[arg(short, long, env = "DOCKER_SPEC_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// 対話プロンプトを出さない（未設定のフラグは no として扱う）
    #[arg(long, global = true)]
    no_input: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// ビルド・起動・チェック・公開を実行（既定）
    Run,
    /// マニフェストを検証
    Validate,
    /// バージョン情報を表示
    Version,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // ログは stderr に出し、stdout は進捗表示に使う
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config_path = cli.config.as_deref();
    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Version => {
            println!("dockspec {}", env!("CARGO_PKG_VERSION"));
            Ok(true)
        }
        Commands::Validate => commands::validate::handle(config_path).map(|_| true),
        Commands::Run => commands::run::handle(config_path, cli.no_input).await,
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            report_error(&e);
            ExitCode::FAILURE
        }
    }
}

fn report_error(err: &anyhow::Error) {
    let message = match err.downcast_ref::<BuildError>() {
        Some(build_error) => build_error.user_message(),
        None => format!("{:#}", err),
    };

    eprintln!();
    eprintln!("{}", "✗ エラー".red().bold());
    for line in message.lines() {
        eprintln!("  {}", line);
    }
}
