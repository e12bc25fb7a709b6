//! イメージプッシュ処理
//!
//! タグ付けしたイメージをコンテナレジストリにプッシュします。

use crate::error::{BuildError, BuildResult};
use bollard::Docker;
use bollard::auth::DockerCredentials;
use bollard::models::PushImageInfo;
use colored::Colorize;
use futures_util::StreamExt;
use std::io::Write;

/// イメージプッシュを実行するハンドラ
pub struct ImagePusher {
    docker: Docker,
}

impl ImagePusher {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// `repo:tag` をレジストリにプッシュし、完全なイメージ名を返す
    pub async fn push(
        &self,
        repo: &str,
        tag: &str,
        credentials: DockerCredentials,
    ) -> BuildResult<String> {
        let full_image = format!("{}:{}", repo, tag);

        validate_tag(tag)?;

        #[allow(deprecated)]
        let options = bollard::image::PushImageOptions::<String> {
            tag: tag.to_string(),
        };

        println!("  → {}", full_image.cyan());

        #[allow(deprecated)]
        let mut stream = self.docker.push_image(repo, Some(options), Some(credentials));

        let mut last_status = String::new();
        let mut error_message: Option<String> = None;

        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(err) = info.error.clone() {
                        error_message = Some(err);
                    } else {
                        handle_progress(&info, &mut last_status);
                    }
                }
                Err(e) => {
                    return Err(BuildError::PushFailed {
                        message: e.to_string(),
                    });
                }
            }
        }

        // 最終行の改行
        println!();

        if let Some(err) = error_message {
            return Err(BuildError::PushFailed { message: err });
        }

        tracing::info!("Pushed {}", full_image);
        Ok(full_image)
    }
}

/// タグのバリデーション
///
/// Docker タグの制約:
/// - 128文字以下
/// - 英数字、ピリオド、ハイフン、アンダースコアのみ
/// - 先頭はピリオドまたはハイフンではない
pub fn validate_tag(tag: &str) -> BuildResult<()> {
    if tag.is_empty() {
        return Err(BuildError::InvalidTag {
            tag: "(empty)".to_string(),
        });
    }

    if tag.len() > 128 {
        return Err(BuildError::InvalidTag {
            tag: format!("Tag too long ({} characters, max 128)", tag.len()),
        });
    }

    if tag.starts_with('.') || tag.starts_with('-') {
        return Err(BuildError::InvalidTag {
            tag: tag.to_string(),
        });
    }

    for c in tag.chars() {
        if !c.is_ascii_alphanumeric() && c != '.' && c != '-' && c != '_' {
            return Err(BuildError::InvalidTag {
                tag: format!("Invalid character '{}' in tag: {}", c, tag),
            });
        }
    }

    Ok(())
}

/// プッシュ進捗を表示
fn handle_progress(info: &PushImageInfo, last_status: &mut String) {
    if let Some(status) = &info.status {
        let progress = info.progress.as_deref().unwrap_or("");

        match status.as_str() {
            "Pushing" => {
                print!("\r  ↑ {} {}     ", status, progress);
                std::io::stdout().flush().ok();
            }
            "Pushed" => {
                println!("\r  {} Pushed                    ", "✓".green());
            }
            "Layer already exists" => {
                println!("\r  {} Layer already exists      ", "✓".green());
            }
            "Preparing" | "Waiting" => {
                // 準備中は表示をスキップ（ノイズ軽減）
            }
            _ => {
                if status != last_status {
                    println!("\r  ℹ {}                    ", status);
                    *last_status = status.clone();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_tag_accepts_counters() {
        assert!(validate_tag("6").is_ok());
        assert!(validate_tag("v6").is_ok());
        assert!(validate_tag("latest").is_ok());
        assert!(validate_tag("rel-1.2_3").is_ok());
    }

    #[test]
    fn test_validate_tag_rejects_invalid() {
        assert!(validate_tag("").is_err());
        assert!(validate_tag("-6").is_err());
        assert!(validate_tag(".6").is_err());
        assert!(validate_tag("v/6").is_err());
        assert!(validate_tag(&"a".repeat(129)).is_err());
    }
}
