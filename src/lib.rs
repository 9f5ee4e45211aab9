pub mod cache;
pub mod cli;
pub mod config;
pub mod git;
pub mod model;
pub mod workspace;

mod flock;
mod fs;
#[cfg(test)]
mod test_support;

pub use crate::cache::{CacheError, CacheKey, CachePool, GitCachePool, NullCachePool};
pub use crate::config::GitsplitSettings;
pub use crate::git::{RefNamespace, Remote, RemoteCollection, RemoteError, RemoteName};
pub use crate::model::gitsplit::{Config, GitUrl, Split};
pub use crate::workspace::{WorkingSpace, WorkingSpaceError, WorkingSpaceFactory};
