use indicatif::{ProgressBar, ProgressStyle};

/// コンテナ起動待ちのスピナー
pub struct WaitProgress {
    progress_bar: ProgressBar,
}

impl WaitProgress {
    pub fn new(container_name: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        pb.set_style(style);
        pb.set_message(format!("Waiting for {}...", container_name));

        Self { progress_bar: pb }
    }

    /// テストやパイプ出力用に描画しないスピナー
    pub fn hidden() -> Self {
        Self {
            progress_bar: ProgressBar::hidden(),
        }
    }

    pub fn sample(&self, attempt: usize, total: usize, size: usize) {
        self.progress_bar
            .set_message(format!("Log sample {}/{} ({} bytes)", attempt, total, size));
        self.progress_bar.tick();
    }

    pub fn finish_stable(&self) {
        self.progress_bar.finish_with_message("Logs settled ✓");
    }

    pub fn finish_unsettled(&self) {
        self.progress_bar
            .finish_with_message("Logs still changing, continuing anyway");
    }

    pub fn finish_error(&self, error: &str) {
        self.progress_bar
            .finish_with_message(format!("Startup failed: {}", error));
    }
}
