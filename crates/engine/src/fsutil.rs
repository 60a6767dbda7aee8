//! Filesystem helpers: directory sizing, free-space probing, backup copies.

use std::fs;
use std::io;
use std::path::Path;

/// Total size in bytes of all regular files under `dir`, recursively.
pub(crate) fn dir_size(dir: &Path) -> io::Result<u64> {
    let mut size = 0u64;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if meta.is_dir() {
            size += dir_size(&entry.path())?;
        } else {
            size += meta.len();
        }
    }
    Ok(size)
}

/// Free bytes available on the filesystem holding `dir`.
pub(crate) fn available_disk_size(dir: &Path) -> io::Result<u64> {
    fs2::available_space(dir)
}

/// Recursively copies `src` into `dst`, skipping entries whose file name is
/// listed in `exclude`.
pub(crate) fn copy_dir(src: &Path, dst: &Path, exclude: &[&str]) -> io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        if exclude
            .iter()
            .any(|skip| name.to_string_lossy() == *skip)
        {
            continue;
        }
        let target = dst.join(&name);
        if entry.metadata()?.is_dir() {
            copy_dir(&entry.path(), &target, exclude)?;
        } else {
            fs::copy(entry.path(), target)?;
        }
    }
    Ok(())
}
