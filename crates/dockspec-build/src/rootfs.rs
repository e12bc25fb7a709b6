//! ルートファイルシステムのパッケージング
//!
//! ビルドコンテキストの `root/` を `root.tar.gz` にまとめる。
//! mtime・所有者を固定するので、同じツリーからは同じバイト列ができる。

use crate::archive::append_tree;
use crate::error::BuildResult;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::path::{Path, PathBuf};
use tar::Builder;

/// パッケージ対象のディレクトリ名
pub const ROOT_DIR: &str = "root";

/// 出力するアーカイブ名
pub const ROOT_ARCHIVE: &str = "root.tar.gz";

pub struct RootfsPackager {
    source: PathBuf,
    output: PathBuf,
}

impl RootfsPackager {
    /// ビルドコンテキスト直下の `root/` → `root.tar.gz`
    pub fn for_context(context: &Path) -> Self {
        Self {
            source: context.join(ROOT_DIR),
            output: context.join(ROOT_ARCHIVE),
        }
    }

    pub fn new(source: PathBuf, output: PathBuf) -> Self {
        Self { source, output }
    }

    /// アーカイブを書き出す。`root/` が無ければ何もせず `None`
    pub fn package(&self) -> BuildResult<Option<PathBuf>> {
        if !self.source.is_dir() {
            tracing::debug!(
                "No root filesystem at {}, skipping",
                self.source.display()
            );
            return Ok(None);
        }

        tracing::info!(
            "Packaging {} into {}",
            self.source.display(),
            self.output.display()
        );

        let parent = match self.output.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        // 書き込み途中のファイルをビルドに拾わせないよう、一時ファイルから rename する
        let temp = tempfile::NamedTempFile::new_in(&parent)?;
        let entries = {
            let encoder = GzEncoder::new(temp.as_file(), Compression::default());
            let mut tar = Builder::new(encoder);
            tar.follow_symlinks(false);
            let entries = append_tree(&mut tar, &self.source, &|_| false)?;
            tar.into_inner()?.finish()?;
            entries
        };
        temp.persist(&self.output).map_err(|e| e.error)?;

        tracing::debug!("Root filesystem archive written: {} entries", entries);
        Ok(Some(self.output.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::symlink;
    use tempfile::tempdir;

    fn sample_tree(context: &Path) {
        let root = context.join(ROOT_DIR);
        fs::create_dir_all(root.join("etc/supervisor")).unwrap();
        fs::write(root.join("file.test"), "hello").unwrap();
        fs::write(root.join("etc/supervisor/app.conf"), "[program:app]").unwrap();
        symlink("file.test", root.join("link.test")).unwrap();
    }

    fn entries(archive: &Path) -> Vec<(String, u64, u64, u64, Option<String>)> {
        let file = fs::File::open(archive).unwrap();
        let mut tar = tar::Archive::new(flate2::read::GzDecoder::new(file));
        tar.entries()
            .unwrap()
            .map(|entry| {
                let entry = entry.unwrap();
                let header = entry.header();
                (
                    entry.path().unwrap().display().to_string(),
                    header.mtime().unwrap(),
                    header.uid().unwrap(),
                    header.gid().unwrap(),
                    header.username().unwrap().map(str::to_string),
                )
            })
            .collect()
    }

    #[test]
    fn test_package_absent_root_is_noop() {
        let context = tempdir().unwrap();
        let result = RootfsPackager::for_context(context.path()).package().unwrap();
        assert!(result.is_none());
        assert!(!context.path().join(ROOT_ARCHIVE).exists());
    }

    #[test]
    fn test_package_normalizes_headers() {
        let context = tempdir().unwrap();
        sample_tree(context.path());

        let archive = RootfsPackager::for_context(context.path())
            .package()
            .unwrap()
            .unwrap();
        let entries = entries(&archive);

        let names: Vec<_> = entries.iter().map(|e| e.0.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "etc",
                "etc/supervisor",
                "etc/supervisor/app.conf",
                "file.test",
                "link.test"
            ]
        );
        for (name, mtime, uid, gid, user) in &entries {
            assert_eq!(*mtime, 0, "{name}");
            assert_eq!((*uid, *gid), (0, 0), "{name}");
            assert_eq!(user.as_deref(), Some("root"), "{name}");
        }
    }

    #[test]
    fn test_package_is_reproducible() {
        let context = tempdir().unwrap();
        sample_tree(context.path());
        let source = context.path().join(ROOT_DIR);

        let first = context.path().join("first.tar.gz");
        let second = context.path().join("second.tar.gz");
        RootfsPackager::new(source.clone(), first.clone())
            .package()
            .unwrap();

        // mtime が変わっても出力は変わらない
        fs::write(source.join("file.test"), "hello").unwrap();
        RootfsPackager::new(source, second.clone()).package().unwrap();

        assert_eq!(fs::read(first).unwrap(), fs::read(second).unwrap());
    }

    #[test]
    fn test_package_keeps_symlink() {
        let context = tempdir().unwrap();
        sample_tree(context.path());
        let archive = RootfsPackager::for_context(context.path())
            .package()
            .unwrap()
            .unwrap();

        let file = fs::File::open(archive).unwrap();
        let mut tar = tar::Archive::new(flate2::read::GzDecoder::new(file));
        let link = tar
            .entries()
            .unwrap()
            .map(|e| e.unwrap())
            .find(|e| e.path().unwrap().ends_with("link.test"))
            .unwrap();
        assert_eq!(link.header().entry_type(), tar::EntryType::Symlink);
        assert_eq!(
            link.link_name().unwrap().unwrap().display().to_string(),
            "file.test"
        );
    }
}
