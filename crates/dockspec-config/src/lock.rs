//! 同一イメージに対するパイプラインの多重起動を防ぐ排他ロック

use crate::error::{ConfigError, Result};
use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// `account` + `name` 単位の排他ロック
///
/// Drop 時に解放される。
pub struct RunLock {
    _lock: Flock<File>,
    path: PathBuf,
}

impl RunLock {
    /// ロックファイルのパス
    ///
    /// `encode` は `.` を出力しないので、区切りの `.` で account と name が混ざらない。
    pub fn lock_path(account: &str, name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "docker-spec-{}.{}.lock",
            encode(account),
            encode(name)
        ))
    }

    /// 指定パスでロックを取得する。他のプロセスが保持している間はブロックする
    pub fn acquire_at(path: &Path) -> Result<Self> {
        tracing::debug!("Acquiring run lock {}", path.display());
        let file = open_lock_file(path)?;
        let lock = Flock::lock(file, FlockArg::LockExclusive).map_err(|(_, errno)| {
            ConfigError::LockFailed {
                path: path.to_path_buf(),
                message: errno.desc().to_string(),
            }
        })?;
        Ok(Self {
            _lock: lock,
            path: path.to_path_buf(),
        })
    }

    /// ロックを試みる。保持中のプロセスがあれば `Ok(None)`
    pub fn try_acquire_at(path: &Path) -> Result<Option<Self>> {
        let file = open_lock_file(path)?;
        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(lock) => Ok(Some(Self {
                _lock: lock,
                path: path.to_path_buf(),
            })),
            Err((_, Errno::EWOULDBLOCK)) => Ok(None),
            Err((_, errno)) => Err(ConfigError::LockFailed {
                path: path.to_path_buf(),
                message: errno.desc().to_string(),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    Ok(OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)?)
}

/// 英数字と `-` 以外を `_XX`（16進）に置き換える
fn encode(part: &str) -> String {
    let mut encoded = String::with_capacity(part.len());
    for byte in part.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("_{:02X}", byte));
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_path_is_scoped_to_account_and_name() {
        let a = RunLock::lock_path("acct", "img");
        let b = RunLock::lock_path("acct", "other");
        assert_ne!(a, b);
        assert!(a.ends_with("docker-spec-acct.img.lock"));
    }

    #[test]
    fn test_lock_path_encodes_separators() {
        let path = RunLock::lock_path("my/acct", "../img");
        let file_name = path.file_name().unwrap().to_str().unwrap();
        assert_eq!(file_name, "docker-spec-my_2Facct._2E_2E_2Fimg.lock");
    }

    #[test]
    fn test_lock_path_does_not_collide_across_split_points() {
        assert_ne!(
            RunLock::lock_path("a-b", "c"),
            RunLock::lock_path("a", "b-c")
        );
        assert_ne!(
            RunLock::lock_path("a_b", "c"),
            RunLock::lock_path("a.b", "c")
        );
    }

    #[test]
    fn test_second_holder_is_excluded_until_release() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("run.lock");

        let first = RunLock::acquire_at(&path).unwrap();
        assert!(RunLock::try_acquire_at(&path).unwrap().is_none());

        drop(first);
        let second = RunLock::try_acquire_at(&path).unwrap();
        assert!(second.is_some());
    }

    #[test]
    fn test_blocking_acquire_waits_for_release() {
        use std::sync::mpsc;
        use std::time::Duration;

        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("run.lock");
        let first = RunLock::acquire_at(&path).unwrap();

        let (tx, rx) = mpsc::channel();
        let waiter_path = path.clone();
        let waiter = std::thread::spawn(move || {
            let lock = RunLock::acquire_at(&waiter_path).unwrap();
            tx.send(()).unwrap();
            drop(lock);
        });

        // 保持中は取得できない
        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());

        drop(first);
        rx.recv_timeout(Duration::from_secs(10)).unwrap();
        waiter.join().unwrap();
    }
}
