use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error(
        "Dockerに接続できません: {0}\n\nヒント:\n  • Dockerが起動しているか確認してください\n  • docker ps コマンドが正常に動作するか確認してください"
    )]
    DockerConnectionFailed(String),

    #[error("コンテナ '{container}' が見つかりません")]
    ContainerNotFound { container: String },

    #[error(
        "イメージ '{image}' が見つかりません\n\nヒント:\n  • build_image を有効にしてイメージをビルドしてください"
    )]
    ImageNotFound { image: String },

    #[error("Docker APIエラー: {0}")]
    DockerApiError(String),

    #[error(
        "コンテナ '{container}' が {seconds} 秒以内に起動しませんでした（最後の状態: {last_state}）"
    )]
    RunningTimeout {
        container: String,
        seconds: u64,
        last_state: String,
    },

    #[error("コンテナ '{container}' でのコマンド実行に失敗しました: {message}")]
    ExecFailed { container: String, message: String },
}

impl From<bollard::errors::Error> for ContainerError {
    fn from(err: bollard::errors::Error) -> Self {
        match &err {
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            } => {
                // 404エラーは呼び出し側で適切に処理されるべき
                ContainerError::DockerApiError(err.to_string())
            }
            _ => {
                // 接続エラーの可能性をチェック
                let err_str = err.to_string();
                if err_str.contains("Connection refused")
                    || err_str.contains("No such file or directory")
                {
                    ContainerError::DockerConnectionFailed(err_str)
                } else {
                    ContainerError::DockerApiError(err_str)
                }
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, ContainerError>;
