//! dockspec のイメージビルドと公開
//!
//! ルートファイルシステムのパッケージング、ビルドコンテキスト作成、
//! イメージビルド、レジストリ認証、タグカウンタ、プッシュを提供します。

mod archive;
pub mod auth;
pub mod builder;
pub mod context;
pub mod engine;
pub mod error;
pub mod pusher;
pub mod rootfs;
pub mod tag_store;

pub use auth::{DEFAULT_SERVER, RegistryAuth, RegistryCredentials};
pub use builder::ImageBuilder;
pub use context::ContextBuilder;
pub use engine::{DockerImageEngine, ImageEngine};
pub use error::{BuildError, BuildResult};
pub use pusher::{ImagePusher, validate_tag};
pub use rootfs::{ROOT_ARCHIVE, ROOT_DIR, RootfsPackager};
pub use tag_store::{TagStore, next_tag};
