mod git;

use git2::Oid;
use thiserror::Error;

pub use git::GitCachePool;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),
}

/// Identity of a cached split result.
///
/// The key is opaque to the pool, it is hex encoded into a ref name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(key: impl Into<String>) -> CacheKey {
        CacheKey(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn ref_suffix(&self) -> String {
        hex::encode(&self.0)
    }
}

/// Lookup and publication of previously computed splits.
pub trait CachePool {
    /// The commit previously saved for `key`, if any.
    fn get(&self, key: &CacheKey) -> Result<Option<Oid>, CacheError>;

    fn save(&self, key: &CacheKey, commit: Oid) -> Result<(), CacheError>;

    /// Pushes every saved entry to the cache.
    fn publish(&self) -> Result<(), CacheError>;
}

/// Cache pool used when no cache is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCachePool;

impl CachePool for NullCachePool {
    fn get(&self, _key: &CacheKey) -> Result<Option<Oid>, CacheError> {
        Ok(None)
    }

    fn save(&self, _key: &CacheKey, _commit: Oid) -> Result<(), CacheError> {
        Ok(())
    }

    fn publish(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_pool_never_finds_anything() {
        let pool = NullCachePool;
        let key = CacheKey::new("refs/heads/main:src/Foo");
        let commit = Oid::from_str("4b825dc642cb6eb9a060e54bf8d69288fbee4904").unwrap();

        pool.save(&key, commit).unwrap();
        pool.publish().unwrap();
        assert_eq!(pool.get(&key).unwrap(), None);
    }
}
