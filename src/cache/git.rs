use std::path::{Path, PathBuf};

use git2::{ErrorCode, Oid, Repository};
use log::{debug, info};

use crate::git::{transport, RefNamespace, Remote};

use super::{CacheError, CacheKey, CachePool};

const SPLIT_REFS: &str = "refs/split";

/// Cache pool backed by the `cache` remote of a working repository.
pub struct GitCachePool {
    repository_path: PathBuf,
    remote: Remote,
}

impl GitCachePool {
    pub fn new(repository_path: impl Into<PathBuf>, remote: Remote) -> GitCachePool {
        GitCachePool {
            repository_path: repository_path.into(),
            remote,
        }
    }

    pub fn repository_path(&self) -> &Path {
        &self.repository_path
    }

    pub fn remote(&self) -> &Remote {
        &self.remote
    }

    fn open(&self) -> Result<Repository, CacheError> {
        Ok(Repository::open(&self.repository_path)?)
    }

    fn local_ref(key: &CacheKey) -> String {
        format!("{SPLIT_REFS}/{}", key.ref_suffix())
    }

    fn fetched_ref(&self, key: &CacheKey) -> String {
        format!(
            "{}/{}",
            self.remote.tracking_prefix(RefNamespace::Split),
            key.ref_suffix()
        )
    }
}

fn resolve(repository: &Repository, name: &str) -> Result<Option<Oid>, CacheError> {
    match repository.refname_to_id(name) {
        Ok(oid) => Ok(Some(oid)),
        Err(error) if error.code() == ErrorCode::NotFound => Ok(None),
        Err(error) => Err(error.into()),
    }
}

impl CachePool for GitCachePool {
    fn get(&self, key: &CacheKey) -> Result<Option<Oid>, CacheError> {
        let repository = self.open()?;
        if let Some(oid) = resolve(&repository, &Self::local_ref(key))? {
            return Ok(Some(oid));
        }
        resolve(&repository, &self.fetched_ref(key))
    }

    fn save(&self, key: &CacheKey, commit: Oid) -> Result<(), CacheError> {
        let repository = self.open()?;
        debug!("Caching {} for {}", commit, key.as_str());
        repository.reference(
            &Self::local_ref(key),
            commit,
            true,
            &format!("gitsplit: cache {}", key.as_str()),
        )?;
        Ok(())
    }

    fn publish(&self) -> Result<(), CacheError> {
        let repository = self.open()?;
        let mut refspecs = Vec::new();
        for reference in repository.references_glob(&format!("{SPLIT_REFS}/*"))? {
            if let Some(name) = reference?.name() {
                refspecs.push(format!("+{name}:{name}"));
            }
        }
        if refspecs.is_empty() {
            debug!("Nothing to publish to {}", self.remote.url());
            return Ok(());
        }

        info!("Publishing {} cached splits to {}", refspecs.len(), self.remote.url());
        let git_config = repository.config()?;
        let mut remote = repository.remote_anonymous(self.remote.url())?;
        remote.push(&refspecs, Some(&mut transport::push_options(&git_config)))?;
        Ok(())
    }
}
