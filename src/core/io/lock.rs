use crate::core::errors::CoreError;
use chrono::Utc;
use fs4::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

fn lock_path(workbook: &Path) -> PathBuf {
    let mut name = workbook.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".xl.lock");
    workbook.with_file_name(name)
}

/// Holds the sidecar lock file open and releases the OS advisory lock (and
/// closes the handle) on drop, whatever the exit path.
pub struct LockGuard {
    file: File,
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

pub struct WorkbookLock;

impl WorkbookLock {
    /// Acquire an exclusive lock on `<workbook>.xl.lock`. `timeout = Some(0)`
    /// fails immediately if held; `None` waits forever; `Some(d)` polls at
    /// `min(100ms, d/20)` until acquired or `d` elapses.
    pub fn acquire(workbook: &Path, timeout: Option<Duration>) -> Result<LockGuard, CoreError> {
        let path = lock_path(workbook);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .read(true)
            .open(&path)
            .map_err(|e| CoreError::LockHeld(format!("cannot open lock file {}: {e}", path.display())))?;

        match timeout {
            Some(d) if d.is_zero() => {
                file.try_lock_exclusive().map_err(|_| {
                    CoreError::LockHeld(format!("lock held on {}", path.display()))
                })?;
            }
            None => {
                FileExt::lock_exclusive(&file)
                    .map_err(|e| CoreError::LockHeld(format!("failed to acquire lock: {e}")))?;
            }
            Some(d) => {
                let poll = Duration::from_millis(100).min(d / 20.max(1));
                let poll = if poll.is_zero() { Duration::from_millis(1) } else { poll };
                let deadline = Instant::now() + d;
                loop {
                    if file.try_lock_exclusive().is_ok() {
                        break;
                    }
                    if Instant::now() >= deadline {
                        return Err(CoreError::LockHeld(format!(
                            "timed out after {:?} waiting for lock on {}",
                            d,
                            path.display()
                        )));
                    }
                    std::thread::sleep(poll);
                }
            }
        }

        let mut guard = LockGuard { file, path };
        guard.write_diagnostics();
        Ok(guard)
    }
}

impl LockGuard {
    fn write_diagnostics(&mut self) {
        let contents = format!("pid={}\ntime={}\n", std::process::id(), Utc::now().to_rfc3339());
        let _ = self.file.set_len(0);
        use std::io::Seek;
        let _ = self.file.seek(std::io::SeekFrom::Start(0));
        let _ = self.file.write_all(contents.as_bytes());
        let _ = self.file.sync_all();
    }
}

/// Best-effort non-blocking probe used by `wb lock-status`. Returns `None`
/// if the lock is free (and immediately releases the probe lock), or
/// `Some(diagnostics)` parsed from the `pid=`/`time=` lines the holder wrote.
pub fn check_lock(workbook: &Path) -> Option<String> {
    let path = lock_path(workbook);
    let Ok(mut file) = OpenOptions::new().read(true).open(&path) else {
        return None;
    };
    if file.try_lock_exclusive().is_ok() {
        let _ = FileExt::unlock(&file);
        return None;
    }
    let mut contents = String::new();
    let _ = file.read_to_string(&mut contents);
    Some(contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_zero_timeout_acquire_fails_while_first_holds() {
        let dir = tempfile::tempdir().unwrap();
        let wb = dir.path().join("book.xlsx");
        std::fs::write(&wb, b"x").unwrap();

        let guard = WorkbookLock::acquire(&wb, Some(Duration::ZERO)).unwrap();
        let second = WorkbookLock::acquire(&wb, Some(Duration::ZERO));
        assert!(second.is_err());
        drop(guard);

        let third = WorkbookLock::acquire(&wb, Some(Duration::ZERO));
        assert!(third.is_ok());
    }

    #[test]
    fn lock_status_reports_pid_while_held() {
        let dir = tempfile::tempdir().unwrap();
        let wb = dir.path().join("book.xlsx");
        std::fs::write(&wb, b"x").unwrap();

        assert!(check_lock(&wb).is_none());
        let _guard = WorkbookLock::acquire(&wb, Some(Duration::ZERO)).unwrap();
        let status = check_lock(&wb).expect("lock should be held");
        assert!(status.contains("pid="));
    }
}
