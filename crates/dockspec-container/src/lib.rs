//! dockspec のコンテナ操作
//!
//! 起動したコンテナのライフサイクル管理と受け入れチェックを提供します。
//! エンジンとのやり取りは [`ContainerRuntime`] 越しに行います。

pub mod checks;
pub mod docker;
pub mod error;
pub mod lifecycle;
pub mod progress;
pub mod runtime;
pub mod waiter;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use checks::*;
pub use docker::*;
pub use error::*;
pub use lifecycle::*;
pub use progress::*;
pub use runtime::*;
pub use waiter::*;
