//! 再現性のある tar アーカイブ作成
//!
//! エントリはパス順に並べ、mtime と所有者を固定する。

use std::fs::{self, File};
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tar::{Builder, EntryType, Header};

/// `root` 以下を `builder` に追加し、追加したエントリ数を返す
///
/// `skip` が true を返した相対パスは（ディレクトリなら配下ごと）除外する。
pub(crate) fn append_tree<W: Write>(
    builder: &mut Builder<W>,
    root: &Path,
    skip: &dyn Fn(&Path) -> bool,
) -> io::Result<usize> {
    let mut paths = Vec::new();
    collect(root, root, skip, &mut paths)?;

    for path in &paths {
        let relative = path
            .strip_prefix(root)
            .map_err(|e| io::Error::other(e.to_string()))?;
        let metadata = fs::symlink_metadata(path)?;
        let file_type = metadata.file_type();

        let mut header = Header::new_gnu();
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);
        header.set_username("root")?;
        header.set_groupname("root")?;
        header.set_mode(metadata.permissions().mode() & 0o7777);

        if file_type.is_symlink() {
            header.set_entry_type(EntryType::Symlink);
            header.set_size(0);
            let target = fs::read_link(path)?;
            builder.append_link(&mut header, relative, target)?;
        } else if file_type.is_dir() {
            header.set_entry_type(EntryType::Directory);
            header.set_size(0);
            builder.append_data(&mut header, relative, io::empty())?;
        } else if file_type.is_file() {
            header.set_entry_type(EntryType::Regular);
            header.set_size(metadata.len());
            builder.append_data(&mut header, relative, File::open(path)?)?;
        } else {
            tracing::warn!("Skipping special file {}", path.display());
        }
    }

    Ok(paths.len())
}

fn collect(
    dir: &Path,
    root: &Path,
    skip: &dyn Fn(&Path) -> bool,
    out: &mut Vec<PathBuf>,
) -> io::Result<()> {
    let mut entries = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<io::Result<Vec<_>>>()?;
    entries.sort();

    for path in entries {
        let relative = path
            .strip_prefix(root)
            .map_err(|e| io::Error::other(e.to_string()))?;
        if skip(relative) {
            continue;
        }
        let is_dir = fs::symlink_metadata(&path)?.is_dir();
        out.push(path.clone());
        if is_dir {
            collect(&path, root, skip, out)?;
        }
    }
    Ok(())
}
