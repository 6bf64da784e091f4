use chrono::Utc;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Write `bytes` to `path` atomically: a temp file in the same directory
/// (so the final rename stays on one filesystem), full write, `fsync`, then
/// rename over the target. The temp file is removed on any failure path.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let suffix = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut tmp = tempfile::Builder::new()
        .prefix(".xlpatch_tmp_")
        .suffix(&suffix)
        .tempfile_in(dir)?;

    let result = (|| -> io::Result<()> {
        tmp.write_all(bytes)?;
        tmp.as_file_mut().sync_all()?;
        Ok(())
    })();

    if let Err(e) = result {
        let _ = tmp.close();
        return Err(e);
    }

    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// `<name>.<UTC-ts>.bak<ext>`, sibling to `path`.
pub fn backup_path(path: &Path) -> PathBuf {
    let ts = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    dir.join(format!("{stem}.{ts}.bak{ext}"))
}

/// Copy the current on-disk file to a timestamped sibling before a mutating
/// save, per the executor's `backup` option.
pub fn write_backup(path: &Path) -> io::Result<PathBuf> {
    let dest = backup_path(path);
    std::fs::copy(path, &dest)?;
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_creates_no_leftover_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("book.xlsx");
        atomic_write(&target, b"first").unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"first");

        atomic_write(&target, b"second, longer content").unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"second, longer content");

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".xlpatch_tmp_"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn backup_path_is_sibling_with_extension_preserved() {
        let p = Path::new("/tmp/book.xlsx");
        let b = backup_path(p);
        assert_eq!(b.parent().unwrap(), Path::new("/tmp"));
        assert!(b.to_string_lossy().ends_with(".xlsx"));
        assert!(b.to_string_lossy().contains(".bak"));
    }
}
