use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Display,
    ops::Deref,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use git2::{Direction, Repository};
use log::{debug, info, trace, warn};
use thiserror::Error;

use super::transport;

const CACHE: &str = "cache";
const ORIGIN: &str = "origin";
const TARGET_PREFIX: &str = "target-";

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),
    #[error("Remote {0} is not registered")]
    NotFound(RemoteName),
    #[error("Remote collection lock was poisoned by a panicking thread")]
    Poisoned,
    #[error("Remote cleanup did not run to completion")]
    CleanupAborted,
}

/// Identity of a remote in the working repository.
///
/// Targets are addressed by their url, the cache and the project source have
/// fixed roles so a target url can never shadow them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RemoteName {
    Cache,
    Origin,
    Target(String),
}

impl RemoteName {
    pub fn target(url: impl Into<String>) -> RemoteName {
        RemoteName::Target(url.into())
    }

    /// Name under which the remote is stored in the git configuration.
    ///
    /// Target urls are hex encoded since `:` and `@` are not allowed in remote names.
    pub fn git_name(&self) -> String {
        match self {
            RemoteName::Cache => CACHE.to_owned(),
            RemoteName::Origin => ORIGIN.to_owned(),
            RemoteName::Target(url) => format!("{TARGET_PREFIX}{}", hex::encode(url)),
        }
    }

    pub fn from_git_name(name: &str) -> Option<RemoteName> {
        match name {
            CACHE => Some(RemoteName::Cache),
            ORIGIN => Some(RemoteName::Origin),
            _ => {
                let encoded = name.strip_prefix(TARGET_PREFIX)?;
                let url = String::from_utf8(hex::decode(encoded).ok()?).ok()?;
                Some(RemoteName::Target(url))
            }
        }
    }
}

impl Display for RemoteName {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            RemoteName::Cache => f.write_str(CACHE),
            RemoteName::Origin => f.write_str(ORIGIN),
            RemoteName::Target(url) => f.write_str(url),
        }
    }
}

/// Class of references exchanged with a remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RefNamespace {
    Heads,
    Tags,
    Split,
}

impl RefNamespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefNamespace::Heads => "heads",
            RefNamespace::Tags => "tags",
            RefNamespace::Split => "split",
        }
    }
}

impl Display for RefNamespace {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remote {
    name: RemoteName,
    url: String,
    namespaces: BTreeSet<RefNamespace>,
}

impl Remote {
    pub fn new(name: RemoteName, url: impl Into<String>, namespaces: &[RefNamespace]) -> Remote {
        Remote {
            name,
            url: url.into(),
            namespaces: namespaces.iter().copied().collect(),
        }
    }

    pub fn name(&self) -> &RemoteName {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn namespaces(&self) -> &BTreeSet<RefNamespace> {
        &self.namespaces
    }

    /// Local prefix under which the refs of `namespace` fetched from this remote live.
    pub fn tracking_prefix(&self, namespace: RefNamespace) -> String {
        format!("refs/remotes/{}/{}", self.name.git_name(), namespace)
    }

    pub fn fetch_refspecs(&self) -> Vec<String> {
        self.namespaces
            .iter()
            .map(|namespace| format!("+refs/{namespace}/*:{}/*", self.tracking_prefix(*namespace)))
            .collect()
    }
}

struct Inner {
    repository: Repository,
    remotes: BTreeMap<RemoteName, Remote>,
}

/// Access to the repository owned by a [`RemoteCollection`], holding its lock.
pub struct RepositoryGuard<'a>(MutexGuard<'a, Inner>);

impl Deref for RepositoryGuard<'_> {
    type Target = Repository;

    fn deref(&self) -> &Repository {
        &self.0.repository
    }
}

/// The remotes of one repository.
///
/// All reads and writes of the repository's remote configuration go through
/// this collection and are serialized by a single lock, so it can be shared
/// with a background thread.
#[derive(Clone)]
pub struct RemoteCollection {
    inner: Arc<Mutex<Inner>>,
}

impl RemoteCollection {
    pub fn new(repository: Repository) -> RemoteCollection {
        RemoteCollection {
            inner: Arc::new(Mutex::new(Inner {
                repository,
                remotes: BTreeMap::new(),
            })),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, RemoteError> {
        self.inner.lock().map_err(|_| RemoteError::Poisoned)
    }

    /// The underlying repository. Remote bookkeeping waits while the guard is held.
    pub fn repository(&self) -> Result<RepositoryGuard<'_>, RemoteError> {
        Ok(RepositoryGuard(self.lock()?))
    }

    /// Registers a remote in memory; it reaches the git configuration on the next `flush`.
    ///
    /// The first registration of a name wins, later ones are ignored and the
    /// already registered remote is returned.
    pub fn add(
        &self,
        name: RemoteName,
        url: impl Into<String>,
        namespaces: &[RefNamespace],
    ) -> Result<Remote, RemoteError> {
        let remote = Remote::new(name, url, namespaces);
        let mut inner = self.lock()?;
        if let Some(existing) = inner.remotes.get(remote.name()) {
            if existing == &remote {
                debug!("Remote {} is already registered", remote.name());
            } else {
                warn!(
                    "Remote {} is already registered with url {} and namespaces {:?}, ignoring url {} and namespaces {:?}",
                    remote.name(),
                    existing.url(),
                    existing.namespaces(),
                    remote.url(),
                    remote.namespaces()
                );
            }
            return Ok(existing.clone());
        }
        trace!("Registering remote {} at {}", remote.name(), remote.url());
        inner.remotes.insert(remote.name().clone(), remote.clone());
        Ok(remote)
    }

    pub fn get(&self, name: &RemoteName) -> Result<Remote, RemoteError> {
        self.lock()?
            .remotes
            .get(name)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(name.clone()))
    }

    pub fn get_target(&self, url: &str) -> Result<Remote, RemoteError> {
        self.get(&RemoteName::target(url))
    }

    pub fn names(&self) -> Result<Vec<RemoteName>, RemoteError> {
        Ok(self.lock()?.remotes.keys().cloned().collect())
    }

    pub fn remotes(&self) -> Result<Vec<Remote>, RemoteError> {
        Ok(self.lock()?.remotes.values().cloned().collect())
    }

    /// Names of the remotes currently stored in the git configuration.
    pub fn persisted_names(&self) -> Result<Vec<String>, RemoteError> {
        let inner = self.lock()?;
        let names = inner.repository.remotes()?;
        Ok(names.iter().flatten().map(str::to_owned).collect())
    }

    /// Fetches the namespaces of a registered remote into its tracking refs.
    ///
    /// The fetch uses an anonymous remote so it does not depend on, nor
    /// modify, the persisted configuration.
    pub fn fetch(&self, name: &RemoteName) -> Result<(), RemoteError> {
        let inner = self.lock()?;
        let remote = inner
            .remotes
            .get(name)
            .ok_or_else(|| RemoteError::NotFound(name.clone()))?;
        let refspecs = remote.fetch_refspecs();
        info!("Fetching {} from {}", remote.name(), remote.url());

        let git_config = inner.repository.config()?;
        let mut anonymous = inner.repository.remote_anonymous(remote.url())?;
        anonymous.fetch(&refspecs, Some(&mut transport::fetch_options(&git_config)), None)?;
        Ok(())
    }

    /// Writes registered remotes that are missing or outdated to the git configuration.
    pub fn flush(&self) -> Result<(), RemoteError> {
        let inner = self.lock()?;
        let repository = &inner.repository;
        for remote in inner.remotes.values() {
            let git_name = remote.name().git_name();
            let wanted: BTreeSet<String> = remote.fetch_refspecs().into_iter().collect();

            match repository.find_remote(&git_name) {
                Ok(persisted) => {
                    if persisted.url() != Some(remote.url()) {
                        debug!(
                            "Updating url of remote {} from {:?} to {}",
                            remote.name(),
                            persisted.url(),
                            remote.url()
                        );
                        repository.remote_set_url(&git_name, remote.url())?;
                    }
                    let current: BTreeSet<String> = persisted
                        .refspecs()
                        .filter(|refspec| matches!(refspec.direction(), Direction::Fetch))
                        .filter_map(|refspec| refspec.str().map(str::to_owned))
                        .collect();
                    if current != wanted {
                        debug!("Updating refspecs of remote {}", remote.name());
                        let mut config = repository.config()?;
                        config.remove_multivar(&format!("remote.{git_name}.fetch"), ".*")?;
                        for refspec in &wanted {
                            repository.remote_add_fetch(&git_name, refspec)?;
                        }
                    }
                }
                Err(error) if error.code() == git2::ErrorCode::NotFound => {
                    debug!("Persisting remote {} as {}", remote.name(), git_name);
                    let mut refspecs = wanted.iter();
                    match refspecs.next() {
                        Some(first) => {
                            repository.remote_with_fetch(&git_name, remote.url(), first)?;
                        }
                        None => {
                            repository.remote_with_fetch(&git_name, remote.url(), "")?;
                        }
                    }
                    for refspec in refspecs {
                        repository.remote_add_fetch(&git_name, refspec)?;
                    }
                }
                Err(error) => return Err(error.into()),
            }
        }
        Ok(())
    }

    /// Deletes persisted remotes that are not registered in this collection,
    /// along with their tracking refs. Returns the deleted remote names.
    ///
    /// Stops before the next deletion once `cancelled` is raised.
    pub fn clean(&self, cancelled: &AtomicBool) -> Result<Vec<String>, RemoteError> {
        let inner = self.lock()?;
        let registered: BTreeSet<String> =
            inner.remotes.keys().map(RemoteName::git_name).collect();
        let persisted = inner.repository.remotes()?;

        let mut removed = Vec::new();
        for name in persisted.iter().flatten() {
            if registered.contains(name) {
                continue;
            }
            if cancelled.load(Ordering::Relaxed) {
                debug!("Remote cleanup cancelled");
                break;
            }
            match RemoteName::from_git_name(name) {
                Some(known) => info!("Removing stale remote {}", known),
                None => info!("Removing unknown remote {}", name),
            }
            inner.repository.remote_delete(name)?;
            removed.push(name.to_owned());
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::test_support::bare_repository;
    use pretty_assertions::assert_eq;

    #[test]
    fn target_names_survive_the_git_configuration() {
        let name = RemoteName::target("git@github.com:acme/foo.git");
        let git_name = name.git_name();
        assert!(git_name.starts_with(TARGET_PREFIX));
        assert!(git2::Remote::is_valid_name(&git_name));
        assert_eq!(RemoteName::from_git_name(&git_name), Some(name));
        assert_eq!(RemoteName::from_git_name("origin"), Some(RemoteName::Origin));
        assert_eq!(RemoteName::from_git_name("upstream"), None);
    }

    #[test]
    fn target_named_like_a_role_does_not_collide() {
        assert_ne!(RemoteName::target("origin").git_name(), RemoteName::Origin.git_name());
        assert_ne!(RemoteName::target("cache").git_name(), RemoteName::Cache.git_name());
    }

    #[test]
    fn refspecs_per_namespace() {
        let remote = Remote::new(
            RemoteName::Origin,
            "https://example/proj.git",
            &[RefNamespace::Tags, RefNamespace::Heads],
        );
        assert_eq!(
            remote.fetch_refspecs(),
            vec![
                "+refs/heads/*:refs/remotes/origin/heads/*".to_owned(),
                "+refs/tags/*:refs/remotes/origin/tags/*".to_owned(),
            ]
        );
    }

    #[test]
    fn duplicate_registration_keeps_the_first() {
        let (_dir, repository) = bare_repository();
        let remotes = RemoteCollection::new(repository);
        let first = remotes
            .add(RemoteName::target("git@host:t1.git"), "git@host:t1.git", &[RefNamespace::Heads])
            .unwrap();
        let second = remotes
            .add(
                RemoteName::target("git@host:t1.git"),
                "git@host:other.git",
                &[RefNamespace::Heads, RefNamespace::Tags],
            )
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(remotes.names().unwrap().len(), 1);
        assert_eq!(
            remotes.get_target("git@host:t1.git").unwrap().url(),
            "git@host:t1.git"
        );
    }

    #[test]
    fn get_unknown_remote() {
        let (_dir, repository) = bare_repository();
        let remotes = RemoteCollection::new(repository);
        assert!(matches!(
            remotes.get(&RemoteName::Cache),
            Err(RemoteError::NotFound(RemoteName::Cache))
        ));
    }

    #[test]
    fn flush_persists_and_updates_remotes() {
        let (dir, repository) = bare_repository();
        repository
            .remote_with_fetch("origin", "https://old.example/proj.git", "+refs/heads/*:refs/remotes/origin/*")
            .unwrap();

        let remotes = RemoteCollection::new(repository);
        remotes
            .add(RemoteName::Origin, "https://example/proj.git", &[RefNamespace::Heads, RefNamespace::Tags])
            .unwrap();
        remotes
            .add(RemoteName::target("git@host:t1.git"), "git@host:t1.git", &[RefNamespace::Heads])
            .unwrap();
        remotes.flush().unwrap();

        let reopened = Repository::open(dir.path()).unwrap();
        let origin = reopened.find_remote("origin").unwrap();
        assert_eq!(origin.url(), Some("https://example/proj.git"));
        let refspecs: BTreeSet<String> = origin
            .fetch_refspecs()
            .unwrap()
            .iter()
            .flatten()
            .map(str::to_owned)
            .collect();
        assert_eq!(
            refspecs,
            BTreeSet::from([
                "+refs/heads/*:refs/remotes/origin/heads/*".to_owned(),
                "+refs/tags/*:refs/remotes/origin/tags/*".to_owned(),
            ])
        );
        let target = reopened
            .find_remote(&RemoteName::target("git@host:t1.git").git_name())
            .unwrap();
        assert_eq!(target.url(), Some("git@host:t1.git"));
    }

    #[test]
    fn clean_removes_unregistered_remotes() {
        let (_dir, repository) = bare_repository();
        let stale = RemoteName::target("git@host:removed.git").git_name();
        repository
            .remote_with_fetch(&stale, "git@host:removed.git", "+refs/heads/*:refs/remotes/stale/heads/*")
            .unwrap();
        repository
            .remote_with_fetch("origin", "https://example/proj.git", "+refs/heads/*:refs/remotes/origin/heads/*")
            .unwrap();

        let remotes = RemoteCollection::new(repository);
        remotes
            .add(RemoteName::Origin, "https://example/proj.git", &[RefNamespace::Heads])
            .unwrap();

        let removed = remotes.clean(&AtomicBool::new(false)).unwrap();
        assert_eq!(removed, vec![stale]);
        assert_eq!(remotes.persisted_names().unwrap(), vec!["origin".to_owned()]);
    }

    #[test]
    fn cancelled_clean_removes_nothing() {
        let (_dir, repository) = bare_repository();
        repository
            .remote_with_fetch("leftover", "https://example/leftover.git", "+refs/heads/*:refs/remotes/leftover/*")
            .unwrap();

        let remotes = RemoteCollection::new(repository);
        let removed = remotes.clean(&AtomicBool::new(true)).unwrap();
        assert!(removed.is_empty());
        assert_eq!(remotes.persisted_names().unwrap(), vec!["leftover".to_owned()]);
    }
}
