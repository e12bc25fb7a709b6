//! ビルド → 起動 → チェック → 後片付け → 公開 の一本道
//!
//! エンジン・ランタイム・プロンプトはトレイト越しに受け取るので、
//! テストでは Docker なしで全体を流せる。

use anyhow::Context;
use colored::Colorize;
use dockspec_build::{
    BuildError, ContextBuilder, ImageEngine, RegistryAuth, RootfsPackager, TagStore,
    validate_tag,
};
use dockspec_container::{
    CheckRunner, ContainerRuntime, ContainerSpec, Lifecycle, SuiteReport, SuiteTarget, Teardown,
    WaitTiming, default_suite,
};
use dockspec_core::{DockSpecConfig, Flag, FlagResolver, Prompter, Setting};
use std::path::PathBuf;

/// 連番タグと一緒に付けるタグ
const LATEST_TAG: &str = "latest";

pub struct PipelineOptions {
    /// ビルドコンテキスト（Dockerfile と root/ のあるディレクトリ）
    pub context_dir: PathBuf,
    pub timing: WaitTiming,
    pub show_progress: bool,
}

/// 1回の実行結果
#[derive(Debug)]
pub struct RunReport {
    pub suite: SuiteReport,
    pub teardown: Teardown,
    /// プッシュした連番タグ
    pub published: Option<String>,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        !self.suite.failed()
    }
}

pub struct Pipeline<'a, E, R, P>
where
    E: ImageEngine,
    R: ContainerRuntime,
    P: Prompter,
{
    engine: &'a E,
    runtime: &'a R,
    prompter: &'a P,
    auth: RegistryAuth,
    options: PipelineOptions,
}

impl<'a, E, R, P> Pipeline<'a, E, R, P>
where
    E: ImageEngine,
    R: ContainerRuntime,
    P: Prompter,
{
    pub fn new(
        engine: &'a E,
        runtime: &'a R,
        prompter: &'a P,
        auth: RegistryAuth,
        options: PipelineOptions,
    ) -> Self {
        Self {
            engine,
            runtime,
            prompter,
            auth,
            options,
        }
    }

    /// パイプラインを実行する
    ///
    /// チェック失敗は `Ok` で返し（プッシュは行わない）、それ以外の失敗は `Err`。
    pub async fn run(&self, config: &DockSpecConfig) -> anyhow::Result<RunReport> {
        let resolver = FlagResolver::new(config, self.prompter);
        let reference = config.latest_reference();

        // 不正な環境変数はビルドやコンテナ起動の前に弾く
        resolver.check_env()?;

        let build_image = resolver.resolve(Flag::BuildImage)?;
        // ビルドしない場合はプロンプトせず、指定があるときだけ root/ を固める
        let build_root = if build_image {
            resolver.resolve(Flag::BuildRoot)?
        } else {
            resolver
                .preset(Flag::BuildRoot)?
                .is_some_and(|(value, _)| value)
        };
        if build_root {
            self.package_root()?;
        }
        if build_image {
            self.build(&resolver, &reference).await?;
        }

        let image_id = self.engine.find_image(&reference).await?;
        if image_id.is_none() {
            tracing::warn!("Image {} not found after build step", reference);
        }

        println!();
        println!("{}", "コンテナを起動中...".blue());
        let mut lifecycle = Lifecycle::new(self.runtime, self.options.timing);
        if !self.options.show_progress {
            lifecycle = lifecycle.quiet();
        }
        let mut container = lifecycle
            .launch(&ContainerSpec::from_config(config))
            .await?;

        println!();
        println!("{}", "チェックを実行中...".blue());
        let suite = CheckRunner::new(self.runtime)
            .run(
                &default_suite(config),
                SuiteTarget {
                    image_id: image_id.as_deref(),
                    container_id: &container.id,
                },
            )
            .await;

        println!();
        // 起動済みのコンテナを残さないよう、答えが得られなければ削除する
        let keep_running = match resolver.resolve(Flag::KeepRunning) {
            Ok(keep) => keep,
            Err(e) => {
                tracing::warn!("Could not resolve keep_running, removing container: {}", e);
                false
            }
        };
        let teardown = lifecycle.teardown(&mut container, keep_running).await?;

        let mut report = RunReport {
            suite,
            teardown,
            published: None,
        };

        if !report.passed() {
            println!(
                "{}",
                "⚠ チェックに失敗したため、プッシュをスキップします".yellow()
            );
            return Ok(report);
        }

        if resolver.resolve(Flag::PushContainer)? {
            let image_id = image_id.ok_or_else(|| BuildError::ImageNotFound(reference.clone()))?;
            report.published = Some(self.publish(&resolver, &image_id).await?);
        }

        Ok(report)
    }

    fn package_root(&self) -> anyhow::Result<()> {
        match RootfsPackager::for_context(&self.options.context_dir).package()? {
            Some(archive) => println!("  ✓ パッケージ作成: {}", archive.display()),
            None => println!("  ℹ root/ が無いためパッケージングをスキップします"),
        }
        Ok(())
    }

    async fn build(&self, resolver: &FlagResolver<'_, P>, reference: &str) -> anyhow::Result<()> {
        let clear_cache = resolver.resolve(Flag::ClearCache)?;

        println!();
        println!("{} {}", "イメージをビルド中:".blue(), reference.cyan());
        let context = ContextBuilder::create_context(&self.options.context_dir)?;
        self.engine.build(context, reference, clear_cache).await?;
        println!("  ✓ ビルド完了");
        Ok(())
    }

    /// 連番タグと latest を付けてプッシュし、カウンタを保存する
    ///
    /// タグ DB と認証情報はネットワークに触れる前に確定させる。
    async fn publish(
        &self,
        resolver: &FlagResolver<'_, P>,
        image_id: &str,
    ) -> anyhow::Result<String> {
        let config = resolver.config();
        let tag_db = resolver.setting(Setting::TagDb)?.ok_or_else(|| {
            BuildError::InvalidConfig(
                "tag_db is not defined (set it in docker_spec.yml or DOCKER_SPEC_TAG_DB)"
                    .to_string(),
            )
        })?;
        let prefix = resolver.setting(Setting::TagPrefix)?;
        let credentials = self.auth.resolve(config.registry.as_ref())?;

        let store_path = dockspec_config::expand_home(&tag_db)?;
        let mut store = TagStore::open(&store_path)?;
        let tag = store.next_tag(&config.image_name, prefix.as_deref())?;
        validate_tag(&tag)?;

        println!();
        println!(
            "{} {}:{}",
            "イメージを公開中:".blue(),
            config.image_name.cyan(),
            tag.cyan()
        );
        for current in [tag.as_str(), LATEST_TAG] {
            self.engine
                .tag(image_id, &config.image_name, current)
                .await?;
            self.engine
                .push(&config.image_name, current, &credentials)
                .await
                .with_context(|| format!("{}:{} のプッシュに失敗しました", config.image_name, current))?;
            println!("  ✓ プッシュ完了: {}:{}", config.image_name, current);
        }

        store.set(&config.image_name, &tag);
        store.save()?;
        tracing::info!(
            "Recorded tag {} for {} in {}",
            tag,
            config.image_name,
            store.path().display()
        );

        Ok(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockspec_build::{BuildResult, RegistryCredentials};
    use dockspec_container::testing::FakeRuntime;
    use dockspec_build::ROOT_ARCHIVE;
    use dockspec_core::{CoreError, NonInteractive, parse_config};
    use serial_test::serial;
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeEngine {
        fail_build: bool,
        missing_image: bool,
        calls: Mutex<Vec<String>>,
    }

    impl FakeEngine {
        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ImageEngine for FakeEngine {
        async fn build(&self, _context: Vec<u8>, tag: &str, no_cache: bool) -> BuildResult<()> {
            self.record(format!("build {} nocache={}", tag, no_cache));
            if self.fail_build {
                return Err(BuildError::BuildFailed {
                    image: tag.to_string(),
                    message: "RUN false returned 1".to_string(),
                });
            }
            Ok(())
        }

        async fn find_image(&self, _reference: &str) -> BuildResult<Option<String>> {
            if self.missing_image {
                Ok(None)
            } else {
                Ok(Some("sha256:feed".to_string()))
            }
        }

        async fn tag(&self, image_id: &str, repo: &str, tag: &str) -> BuildResult<()> {
            self.record(format!("tag {} {}:{}", image_id, repo, tag));
            Ok(())
        }

        async fn push(
            &self,
            repo: &str,
            tag: &str,
            credentials: &RegistryCredentials,
        ) -> BuildResult<()> {
            self.record(format!("push {}:{} as {}", repo, tag, credentials.username));
            Ok(())
        }
    }

    fn options(dir: &Path) -> PipelineOptions {
        PipelineOptions {
            context_dir: dir.to_path_buf(),
            timing: WaitTiming {
                running_timeout: Duration::from_millis(200),
                poll_interval: Duration::from_millis(1),
                log_samples: 5,
                sample_interval: Duration::from_millis(1),
                stable_window: 3,
            },
            show_progress: false,
        }
    }

    fn manifest(extra: &str) -> DockSpecConfig {
        let yaml = format!(
            "name: web\naccount: acme\nregistry:\n  username: bot\n  password: secret\n  email: bot@example.com\n{}",
            extra
        );
        parse_config(&yaml, Path::new("docker_spec.yml")).unwrap()
    }

    fn auth(dir: &TempDir) -> RegistryAuth {
        RegistryAuth::with_config_path(dir.path().join("config.json"))
    }

    #[tokio::test]
    #[serial]
    async fn test_build_failure_stops_before_container() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Dockerfile"), "FROM alpine\n").unwrap();
        let engine = FakeEngine {
            fail_build: true,
            ..Default::default()
        };
        let runtime = FakeRuntime::new();
        let config = manifest("build_image: true\nbuild_root: false\nclear_cache: true\n");

        let pipeline = Pipeline::new(&engine, &runtime, &NonInteractive, auth(&dir), options(dir.path()));
        let err = pipeline.run(&config).await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::BuildFailed { .. })
        ));
        assert_eq!(engine.calls(), vec!["build acme/web:latest nocache=true"]);
        assert!(runtime.calls().is_empty());
    }

    #[tokio::test]
    #[serial]
    async fn test_failed_check_skips_push_but_cleans_up() {
        let dir = TempDir::new().unwrap();
        let engine = FakeEngine::default();
        let runtime = FakeRuntime::new().with_log_text("worker exited\n");
        let tag_db = dir.path().join("tags.yml");
        let config = manifest(&format!(
            "build_image: false\nkeep_running: false\npush_container: true\ntag_db: {}\n",
            tag_db.display()
        ));

        let pipeline = Pipeline::new(&engine, &runtime, &NonInteractive, auth(&dir), options(dir.path()));
        let report = pipeline.run(&config).await.unwrap();

        assert!(!report.passed());
        assert_eq!(report.teardown, Teardown::Deleted);
        assert_eq!(report.published, None);
        assert_eq!(runtime.containers_named("web"), 0);
        assert!(engine.calls().iter().all(|c| !c.starts_with("push")));
        assert!(!tag_db.exists());
    }

    #[tokio::test]
    #[serial]
    async fn test_success_pushes_next_tag_and_latest() {
        let dir = TempDir::new().unwrap();
        let tag_db = dir.path().join("tags.yml");
        std::fs::write(&tag_db, "acme/web: \"5\"\n").unwrap();
        let engine = FakeEngine::default();
        let runtime = FakeRuntime::new();
        let config = manifest(&format!(
            "build_image: false\nkeep_running: true\npush_container: true\ntag_db: {}\n",
            tag_db.display()
        ));

        let pipeline = Pipeline::new(&engine, &runtime, &NonInteractive, auth(&dir), options(dir.path()));
        let report = pipeline.run(&config).await.unwrap();

        assert!(report.passed());
        assert_eq!(report.published.as_deref(), Some("6"));
        assert!(matches!(report.teardown, Teardown::Kept { .. }));
        assert_eq!(
            engine.calls(),
            vec![
                "tag sha256:feed acme/web:6",
                "push acme/web:6 as bot",
                "tag sha256:feed acme/web:latest",
                "push acme/web:latest as bot",
            ]
        );
        let store = TagStore::open(&tag_db).unwrap();
        assert_eq!(store.get("acme/web"), Some("6"));
    }

    #[tokio::test]
    #[serial]
    async fn test_missing_tag_db_fails_before_network() {
        let dir = TempDir::new().unwrap();
        let engine = FakeEngine::default();
        let runtime = FakeRuntime::new();
        let config = manifest("build_image: false\nkeep_running: false\npush_container: true\n");

        let pipeline = Pipeline::new(&engine, &runtime, &NonInteractive, auth(&dir), options(dir.path()));
        let err = pipeline.run(&config).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::InvalidConfig(_))
        ));
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    #[serial]
    async fn test_push_not_requested() {
        let dir = TempDir::new().unwrap();
        let engine = FakeEngine::default();
        let runtime = FakeRuntime::new();
        let config = manifest("build_image: false\nkeep_running: false\npush_container: false\n");

        let pipeline = Pipeline::new(&engine, &runtime, &NonInteractive, auth(&dir), options(dir.path()));
        let report = pipeline.run(&config).await.unwrap();

        assert!(report.passed());
        assert_eq!(report.published, None);
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    #[serial]
    async fn test_missing_image_fails_suite() {
        let dir = TempDir::new().unwrap();
        let engine = FakeEngine {
            missing_image: true,
            ..Default::default()
        };
        let runtime = FakeRuntime::new();
        let config = manifest("build_image: false\nkeep_running: false\npush_container: true\n");

        let pipeline = Pipeline::new(&engine, &runtime, &NonInteractive, auth(&dir), options(dir.path()));
        let report = pipeline.run(&config).await.unwrap();

        assert!(!report.passed());
        assert_eq!(report.suite.outcomes[0].name, "should be available");
        assert!(engine.calls().is_empty());
    }

    #[test]
    #[serial]
    fn test_invalid_env_flag_fails_before_any_side_effect() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Dockerfile"), "FROM alpine\n").unwrap();
        let engine = FakeEngine::default();
        let runtime = FakeRuntime::new();
        let config = manifest("build_image: true\nbuild_root: false\nclear_cache: false\n");

        let pipeline = Pipeline::new(&engine, &runtime, &NonInteractive, auth(&dir), options(dir.path()));
        let result = temp_env::with_var("DOCKER_SPEC_KEEP_RUNNING", Some("maybe"), || {
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap()
                .block_on(pipeline.run(&config))
        });

        let err = result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CoreError>(),
            Some(CoreError::InvalidEnvValue { .. })
        ));
        assert!(engine.calls().is_empty());
        assert!(runtime.calls().is_empty());
    }

    #[tokio::test]
    #[serial]
    async fn test_build_root_packs_without_image_build() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("root");
        std::fs::create_dir_all(root.join("etc")).unwrap();
        std::fs::write(root.join("etc/app.conf"), "port=80\n").unwrap();
        let engine = FakeEngine::default();
        let runtime = FakeRuntime::new();
        let config = manifest("build_image: false\nbuild_root: true\nkeep_running: false\npush_container: false\n");

        let pipeline = Pipeline::new(&engine, &runtime, &NonInteractive, auth(&dir), options(dir.path()));
        let report = pipeline.run(&config).await.unwrap();

        assert!(report.passed());
        assert!(dir.path().join(ROOT_ARCHIVE).is_file());
        assert!(engine.calls().iter().all(|c| !c.starts_with("build")));
    }

    /// 入力が閉じられたように振る舞う
    struct BrokenPrompter;

    impl Prompter for BrokenPrompter {
        fn confirm(&self, _question: &str, _default: bool) -> dockspec_core::Result<bool> {
            Err(CoreError::Prompt(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "stdin closed",
            )))
        }
    }

    #[tokio::test]
    #[serial]
    async fn test_keep_running_prompt_failure_still_removes_container() {
        let dir = TempDir::new().unwrap();
        let engine = FakeEngine::default();
        let runtime = FakeRuntime::new();
        let config = manifest("build_image: false\npush_container: false\n");

        let pipeline = Pipeline::new(&engine, &runtime, &BrokenPrompter, auth(&dir), options(dir.path()));
        let report = pipeline.run(&config).await.unwrap();

        assert_eq!(report.teardown, Teardown::Deleted);
        assert_eq!(runtime.containers_named("web"), 0);
    }
}
