mod factory;

use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::JoinHandle,
    time::Duration,
};

use git2::Repository;
use log::{debug, info, warn};
use tempfile::TempDir;
use thiserror::Error;

use crate::{
    cache::{CachePool, GitCachePool, NullCachePool},
    flock::{self, FileLock},
    git::{RefNamespace, RemoteCollection, RemoteError, RemoteName, RepositoryGuard},
    model::gitsplit::{Config, GitUrl},
};

pub use factory::WorkingSpaceFactory;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
    #[error("Cache lock cannot be acquired: {0}")]
    Lock(#[from] flock::Error),
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

#[derive(Error, Debug)]
pub enum WorkingSpaceError {
    #[error("Failed to {stage}: {source}")]
    Provisioning {
        stage: &'static str,
        source: RepositoryError,
    },
    #[error("Failed to {stage}: {source}")]
    Sync {
        stage: &'static str,
        source: RepositoryError,
    },
    #[error("Cache pool needs the {0} remote, the working space is not initialized")]
    CachePool(RemoteName),
    #[error("Failed to {stage} while closing the working space: {source}")]
    Teardown {
        stage: &'static str,
        source: RepositoryError,
    },
}

impl WorkingSpaceError {
    fn provisioning<E: Into<RepositoryError>>(stage: &'static str) -> impl FnOnce(E) -> Self {
        move |source| WorkingSpaceError::Provisioning {
            stage,
            source: source.into(),
        }
    }

    fn sync<E: Into<RepositoryError>>(stage: &'static str) -> impl FnOnce(E) -> Self {
        move |source| WorkingSpaceError::Sync {
            stage,
            source: source.into(),
        }
    }

    fn teardown<E: Into<RepositoryError>>(stage: &'static str) -> impl FnOnce(E) -> Self {
        move |source| WorkingSpaceError::Teardown {
            stage,
            source: source.into(),
        }
    }
}

/// Background pruning of stale remotes.
struct Cleaner {
    cancelled: Arc<AtomicBool>,
    handle: JoinHandle<Result<Vec<String>, RemoteError>>,
}

impl Cleaner {
    fn spawn(remotes: RemoteCollection) -> std::io::Result<Cleaner> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        let handle = std::thread::Builder::new()
            .name("gitsplit-clean".to_owned())
            .spawn(move || remotes.clean(&flag))?;
        Ok(Cleaner { cancelled, handle })
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    fn join(self) -> Result<Vec<String>, RemoteError> {
        self.handle
            .join()
            .unwrap_or(Err(RemoteError::CleanupAborted))
    }
}

/// A disposable bare repository wired to the cache, the project and every split target.
pub struct WorkingSpace {
    config: Config,
    path: PathBuf,
    remotes: RemoteCollection,
    cleaner: Option<Cleaner>,
    cache_lock_timeout: Duration,
    directory: Option<TempDir>,
}

impl WorkingSpace {
    /// Wraps an opened repository living in `directory`. No remote is registered yet.
    pub(crate) fn new(
        config: Config,
        directory: TempDir,
        repository: Repository,
        cache_lock_timeout: Duration,
    ) -> WorkingSpace {
        WorkingSpace {
            config,
            path: repository.path().to_path_buf(),
            remotes: RemoteCollection::new(repository),
            cleaner: None,
            cache_lock_timeout,
            directory: Some(directory),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The working repository, shared with the remote collection.
    ///
    /// Remote bookkeeping, including the background pruning, waits while the
    /// guard is held. Remotes should be changed through [`WorkingSpace::remotes`].
    pub fn repository(&self) -> Result<RepositoryGuard<'_>, RemoteError> {
        self.remotes.repository()
    }

    pub fn remotes(&self) -> &RemoteCollection {
        &self.remotes
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Registers the cache, origin and target remotes, fetches the cache and
    /// origin, starts pruning stale remotes in the background and persists
    /// the remote configuration.
    ///
    /// Meant to be called once. Pruning may still be running when this returns.
    pub fn init(&mut self) -> Result<(), WorkingSpaceError> {
        if let Some(cache_url) = self.config.cache_url.clone() {
            if cache_url.is_local() && !cache_url.schemeless().exists() {
                bootstrap_cache(&cache_url, self.cache_lock_timeout)
                    .map_err(WorkingSpaceError::sync("initialize the cache repository"))?;
            }
            self.remotes
                .add(RemoteName::Cache, cache_url.fetch_url(), &[RefNamespace::Split])
                .map_err(WorkingSpaceError::sync("register the cache remote"))?;
            self.remotes
                .fetch(&RemoteName::Cache)
                .map_err(WorkingSpaceError::sync("fetch the cache"))?;
        }

        self.remotes
            .add(
                RemoteName::Origin,
                self.config.project_url.fetch_url(),
                &[RefNamespace::Heads, RefNamespace::Tags],
            )
            .map_err(WorkingSpaceError::sync("register the origin remote"))?;
        self.remotes
            .fetch(&RemoteName::Origin)
            .map_err(WorkingSpaceError::sync("fetch the project"))?;

        for target in self.config.targets() {
            self.remotes
                .add(
                    RemoteName::target(target),
                    target,
                    &[RefNamespace::Heads, RefNamespace::Tags],
                )
                .map_err(WorkingSpaceError::sync("register a target remote"))?;
        }

        if let Some(previous) = self.cleaner.take() {
            if let Err(error) = previous.join() {
                warn!("Previous remote cleanup failed: {}", error);
            }
        }
        let cleaner = Cleaner::spawn(self.remotes.clone())
            .map_err(WorkingSpaceError::sync("start the remote cleanup"))?;
        self.cleaner = Some(cleaner);

        self.remotes
            .flush()
            .map_err(WorkingSpaceError::sync("persist the remotes"))?;

        info!("Working space ready at {}", self.path().display());
        Ok(())
    }

    /// Waits for the background pruning started by `init` and returns the
    /// names of the removed remotes. Returns nothing when no pruning is pending.
    pub fn wait_for_clean(&mut self) -> Result<Vec<String>, WorkingSpaceError> {
        match self.cleaner.take() {
            Some(cleaner) => cleaner
                .join()
                .map_err(WorkingSpaceError::sync("prune stale remotes")),
            None => Ok(Vec::new()),
        }
    }

    pub fn get_cache_pool(&self) -> Result<Box<dyn CachePool>, WorkingSpaceError> {
        if self.config.cache_url.is_none() {
            return Ok(Box::new(NullCachePool));
        }
        let remote = self
            .remotes
            .get(&RemoteName::Cache)
            .map_err(|_| WorkingSpaceError::CachePool(RemoteName::Cache))?;
        Ok(Box::new(GitCachePool::new(self.path(), remote)))
    }

    /// Persists pending remote changes and deletes the working repository.
    ///
    /// The directory is removed even when persisting fails.
    pub fn close(mut self) -> Result<(), WorkingSpaceError> {
        let cleanup = self.cleaner.take().map(|cleaner| {
            cleaner.cancel();
            cleaner.join()
        });
        let flush = self.remotes.flush();
        let removal = self.remove_directory();

        flush.map_err(WorkingSpaceError::teardown("persist the remotes"))?;
        removal.map_err(WorkingSpaceError::teardown("remove the working directory"))?;
        if let Some(Err(error)) = cleanup {
            return Err(WorkingSpaceError::teardown("prune stale remotes")(error));
        }
        Ok(())
    }

    fn remove_directory(&mut self) -> std::io::Result<()> {
        match self.directory.take() {
            Some(directory) => {
                info!("Removing working space {}", directory.path().display());
                match directory.close() {
                    Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
                    otherwise => otherwise,
                }
            }
            None => Ok(()),
        }
    }
}

impl Drop for WorkingSpace {
    fn drop(&mut self) {
        if let Some(cleaner) = self.cleaner.take() {
            cleaner.cancel();
            if let Err(error) = cleaner.join() {
                debug!("Remote cleanup of a dropped working space failed: {}", error);
            }
        }
    }
}

/// Creates an empty bare repository at a local cache location that has none.
pub(crate) fn bootstrap_cache(cache_url: &GitUrl, timeout: Duration) -> Result<(), RepositoryError> {
    let path = cache_url.schemeless();
    let _lock = lock_cache(&path, timeout)?;
    init_cache(&path)
}

pub(crate) fn init_cache(path: &Path) -> Result<(), RepositoryError> {
    if Repository::open_bare(path).is_err() {
        info!("Initializing cache repository at {}", path.display());
        Repository::init_bare(path)?;
    }
    Ok(())
}

pub(crate) fn lock_cache(path: &Path, timeout: Duration) -> Result<FileLock, RepositoryError> {
    let path: PathBuf = path.components().collect();
    let mut lock_path = path.as_os_str().to_owned();
    lock_path.push(".lock");
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    debug!("Acquiring a lock on the cache location: {}", path.display());
    Ok(FileLock::new(Path::new(&lock_path), timeout)?)
}
