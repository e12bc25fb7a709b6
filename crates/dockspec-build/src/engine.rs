//! イメージ操作の抽象
//!
//! パイプラインはこのトレイト越しにビルド・タグ付け・プッシュを行う。

use crate::auth::RegistryCredentials;
use crate::builder::ImageBuilder;
use crate::error::BuildResult;
use crate::pusher::ImagePusher;
use bollard::Docker;

/// コンテナエンジンのイメージ操作
#[allow(async_fn_in_trait)]
pub trait ImageEngine {
    /// ビルドコンテキスト (tar.gz) から `tag` をビルドする
    async fn build(&self, context: Vec<u8>, tag: &str, no_cache: bool) -> BuildResult<()>;

    /// `repo:tag` に一致するイメージIDを返す
    async fn find_image(&self, reference: &str) -> BuildResult<Option<String>>;

    async fn tag(&self, image_id: &str, repo: &str, tag: &str) -> BuildResult<()>;

    async fn push(
        &self,
        repo: &str,
        tag: &str,
        credentials: &RegistryCredentials,
    ) -> BuildResult<()>;
}

/// Bollard 経由の実装
pub struct DockerImageEngine {
    builder: ImageBuilder,
    pusher: ImagePusher,
}

impl DockerImageEngine {
    pub fn new(docker: Docker) -> Self {
        Self {
            builder: ImageBuilder::new(docker.clone()),
            pusher: ImagePusher::new(docker),
        }
    }
}

impl ImageEngine for DockerImageEngine {
    async fn build(&self, context: Vec<u8>, tag: &str, no_cache: bool) -> BuildResult<()> {
        self.builder.build_image(context, tag, no_cache).await
    }

    async fn find_image(&self, reference: &str) -> BuildResult<Option<String>> {
        self.builder.find_image(reference).await
    }

    async fn tag(&self, image_id: &str, repo: &str, tag: &str) -> BuildResult<()> {
        self.builder.tag_image(image_id, repo, tag).await
    }

    async fn push(
        &self,
        repo: &str,
        tag: &str,
        credentials: &RegistryCredentials,
    ) -> BuildResult<()> {
        self.pusher
            .push(repo, tag, credentials.to_docker())
            .await
            .map(|_| ())
    }
}
