use std::path::Path;

use git2::Repository;
use log::{info, warn};
use tempfile::TempDir;

use crate::{config::GitsplitSettings, fs::copy_dir_content, model::gitsplit::Config};

use super::{init_cache, lock_cache, RepositoryError, WorkingSpace, WorkingSpaceError};

/// Builds working spaces in fresh temporary directories.
#[derive(Debug, Clone, Default)]
pub struct WorkingSpaceFactory {
    settings: GitsplitSettings,
}

impl WorkingSpaceFactory {
    pub fn new(settings: GitsplitSettings) -> WorkingSpaceFactory {
        WorkingSpaceFactory { settings }
    }

    pub fn settings(&self) -> &GitsplitSettings {
        &self.settings
    }

    /// Builds and initializes a working space.
    ///
    /// If initialization fails the working space is closed before the error is returned.
    pub fn create_working_space(&self, config: Config) -> Result<WorkingSpace, WorkingSpaceError> {
        let mut working_space = self.build(config)?;
        if let Err(error) = working_space.init() {
            if let Err(close_error) = working_space.close() {
                warn!("Failed to discard the working space: {}", close_error);
            }
            return Err(error);
        }
        Ok(working_space)
    }

    /// Creates the working repository, seeded from a local cache when one is
    /// configured, without touching any remote.
    pub fn build(&self, config: Config) -> Result<WorkingSpace, WorkingSpaceError> {
        std::fs::create_dir_all(&self.settings.workdir_dir)
            .map_err(WorkingSpaceError::provisioning("create the working directory"))?;
        let directory = tempfile::Builder::new()
            .prefix(&self.settings.workdir_prefix)
            .tempdir_in(&self.settings.workdir_dir)
            .map_err(WorkingSpaceError::provisioning("create the working directory"))?;

        let repository = self.repository(&config, &directory)?;

        Ok(WorkingSpace::new(
            config,
            directory,
            repository,
            self.settings.cache_lock_timeout,
        ))
    }

    fn repository(
        &self,
        config: &Config,
        directory: &TempDir,
    ) -> Result<Repository, WorkingSpaceError> {
        match &config.cache_url {
            Some(cache_url) if cache_url.is_local() => {
                let cache_path = cache_url.schemeless();
                self.copy_cache(&cache_path, directory.path())
                    .map_err(WorkingSpaceError::provisioning(
                        "create the working space from the cache",
                    ))?;
                Repository::open_bare(directory.path())
                    .map_err(WorkingSpaceError::provisioning("open the working repository"))
            }
            _ => {
                info!("Creating new repository at {}", directory.path().display());
                Repository::init_bare(directory.path())
                    .map_err(WorkingSpaceError::provisioning("initialize the working repository"))
            }
        }
    }

    fn copy_cache(&self, cache_path: &Path, destination: &Path) -> Result<(), RepositoryError> {
        let _lock = lock_cache(cache_path, self.settings.cache_lock_timeout)?;
        init_cache(cache_path)?;
        info!(
            "Creating working space {} from cache {}",
            destination.display(),
            cache_path.display()
        );
        copy_dir_content(cache_path, destination)?;
        Ok(())
    }
}
