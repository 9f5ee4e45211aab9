use std::{
    fs::File,
    path::Path,
    time::{Duration, Instant},
};

use fs4::fs_std::FileExt;
use log::debug;
use thiserror::Error;

const RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Exclusive advisory lock held until dropped.
pub struct FileLock {
    _file: File,
}

#[derive(Error, Debug)]
#[error(transparent)]
pub struct Error(#[from] std::io::Error);

impl FileLock {
    /// Locks `path`, creating the file if needed, waiting at most `timeout` for another holder.
    pub fn new(path: &Path, timeout: Duration) -> Result<Self, Error> {
        let file = File::create(path)?;
        let start = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(_) => {
                    return Ok(Self { _file: file });
                }
                Err(error)
                    if error.raw_os_error() == fs4::lock_contended_error().raw_os_error()
                        && start.elapsed() < timeout =>
                {
                    debug!("Failed to acquire a lock on {}, retrying", path.display());
                    std::thread::sleep(RETRY_INTERVAL);
                }
                Err(error) => return Err(error.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_is_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.lock");

        let lock = FileLock::new(&path, Duration::ZERO).unwrap();
        drop(lock);
        FileLock::new(&path, Duration::ZERO).unwrap();
    }
}
