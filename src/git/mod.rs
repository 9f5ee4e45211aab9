pub mod remote;
pub mod transport;

pub use remote::{RefNamespace, Remote, RemoteCollection, RemoteError, RemoteName, RepositoryGuard};
