use crate::error::{BuildError, BuildResult};
use bollard::Docker;
use colored::Colorize;
use futures_util::stream::StreamExt;

pub struct ImageBuilder {
    docker: Docker,
}

impl ImageBuilder {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// イメージをビルド
    ///
    /// ビルド出力はそのまま表示し、エラー行は赤で表示する。
    /// エンジンがエラーを返した時点で失敗とする（リトライなし）。
    pub async fn build_image(
        &self,
        context_data: Vec<u8>,
        tag: &str,
        no_cache: bool,
    ) -> BuildResult<()> {
        tracing::info!("Building image: {}", tag);

        #[allow(deprecated)]
        let options = bollard::image::BuildImageOptions {
            dockerfile: "Dockerfile",
            t: tag,
            nocache: no_cache,
            rm: true,      // 中間コンテナを削除
            forcerm: true, // ビルド失敗時も中間コンテナを削除
            ..Default::default()
        };

        tracing::debug!("Build options: nocache={}", no_cache);

        use bytes::Bytes;
        use http_body_util::{Either, Full};
        let body = Full::new(Bytes::from(context_data));
        let mut stream = self
            .docker
            .build_image(options, None, Some(Either::Left(body)));

        while let Some(msg) = stream.next().await {
            match msg {
                Ok(output) => {
                    handle_build_output(tag, output)?;
                }
                Err(bollard::errors::Error::DockerStreamError { error }) => {
                    eprintln!("{}", error.red());
                    return Err(BuildError::BuildFailed {
                        image: tag.to_string(),
                        message: error,
                    });
                }
                Err(e) => {
                    return Err(BuildError::DockerConnection(e));
                }
            }
        }

        tracing::info!("Successfully built: {}", tag);
        Ok(())
    }

    /// `repo:tag` 形式の参照に一致するイメージIDを探す
    pub async fn find_image(&self, reference: &str) -> BuildResult<Option<String>> {
        let images = self
            .docker
            .list_images(None::<bollard::query_parameters::ListImagesOptions>)
            .await?;

        Ok(images
            .into_iter()
            .find(|image| image.repo_tags.iter().any(|t| t == reference))
            .map(|image| image.id))
    }

    /// イメージに `repo:tag` を付ける
    pub async fn tag_image(&self, image_id: &str, repo: &str, tag: &str) -> BuildResult<()> {
        tracing::debug!("Tagging {} as {}:{}", image_id, repo, tag);

        #[allow(deprecated)]
        let options = bollard::image::TagImageOptions {
            repo: repo.to_string(),
            tag: tag.to_string(),
        };
        self.docker.tag_image(image_id, Some(options)).await?;
        Ok(())
    }
}

/// ビルド出力の処理
fn handle_build_output(tag: &str, output: bollard::models::BuildInfo) -> BuildResult<()> {
    if let Some(stream) = output.stream {
        print!("{}", stream);
    }

    if let Some(error) = output.error {
        eprintln!("{}", error.red());
        return Err(BuildError::BuildFailed {
            image: tag.to_string(),
            message: error,
        });
    }

    if let Some(error_detail) = output.error_detail {
        let error_msg = error_detail
            .message
            .unwrap_or_else(|| "Unknown build error".to_string());
        eprintln!("{}", error_msg.red());
        return Err(BuildError::BuildFailed {
            image: tag.to_string(),
            message: error_msg,
        });
    }

    if let Some(status) = output.status {
        println!("{}", status.cyan());
    }

    Ok(())
}
