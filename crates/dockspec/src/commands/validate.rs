use colored::Colorize;
use dockspec_core::{Flag, FlagResolver, FlagSource, NonInteractive, Setting};
use std::path::Path;

/// マニフェストを検証し、解決済みの設定を表示する（Docker には触れない）
pub fn handle(config_path: Option<&Path>) -> anyhow::Result<()> {
    println!("{}", "設定を検証中...".blue());

    let work_dir = std::env::current_dir()?;
    let manifest = dockspec_config::find_config_file(config_path, &work_dir)?;
    let config = dockspec_core::load_config(&manifest)?;
    let resolver = FlagResolver::new(&config, &NonInteractive);

    println!("設定ファイル: {}", manifest.display().to_string().cyan());
    println!("{}", "✓ 設定ファイルは正常です！".green().bold());
    println!();
    println!("サマリー:");
    println!("  イメージ: {}", config.image_name.cyan());
    println!("  コンテナ: {}", config.container_name.cyan());
    println!("  監視プロセス: {}", config.supervisor);
    if let Some(mode) = &config.network_mode {
        println!("  ネットワーク: {}", mode);
    }
    if !config.env.is_empty() {
        println!("  環境変数: {}個", config.env.len());
    }
    if !config.checks.is_empty() {
        println!("  追加チェック: {}個", config.checks.len());
    }

    println!("  フラグ:");
    for flag in Flag::ALL {
        let value = match resolver.preset(flag)? {
            Some((value, FlagSource::Env)) => format!("{} ({})", value, flag.env_var()),
            Some((value, _)) => format!("{} (docker_spec.yml)", value),
            None => "実行時に確認".to_string(),
        };
        println!("    - {}: {}", flag.key(), value);
    }

    for setting in [Setting::TagDb, Setting::TagPrefix] {
        let value = resolver
            .setting(setting)?
            .unwrap_or_else(|| "(未設定)".to_string());
        println!("  {}: {}", setting.key(), value);
    }

    Ok(())
}
