use git2::{Oid, Repository, Signature};
use tempfile::TempDir;

pub fn bare_repository() -> (TempDir, Repository) {
    let dir = tempfile::tempdir().unwrap();
    let repository = Repository::init_bare(dir.path()).unwrap();
    (dir, repository)
}

/// Commits an empty tree on top of `reference`, creating it if needed.
pub fn commit(repository: &Repository, reference: &str, message: &str) -> Oid {
    let signature = Signature::now("gitsplit", "gitsplit@example.com").unwrap();
    let tree_id = repository.treebuilder(None).unwrap().write().unwrap();
    let tree = repository.find_tree(tree_id).unwrap();
    let parent = repository
        .refname_to_id(reference)
        .ok()
        .map(|oid| repository.find_commit(oid).unwrap());
    let parents: Vec<_> = parent.iter().collect();
    repository
        .commit(Some(reference), &signature, &signature, message, &tree, &parents)
        .unwrap()
}

/// A project with one branch and one tag.
pub fn project_repository() -> TempDir {
    let (dir, repository) = bare_repository();
    let oid = commit(&repository, "refs/heads/main", "initial import");
    let object = repository.find_object(oid, None).unwrap();
    repository.tag_lightweight("v1.0.0", &object, false).unwrap();
    dir
}
