use std::{io, path::Path};

use log::trace;
use walkdir::WalkDir;

/// Recursively copies the content of `from` into the existing directory `to`.
pub fn copy_dir_content(from: &Path, to: &Path) -> io::Result<()> {
    for entry in WalkDir::new(from).min_depth(1) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|error| io::Error::new(io::ErrorKind::Other, error))?;
        let destination = to.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&destination)?;
        } else {
            trace!("Copying {} to {}", entry.path().display(), destination.display());
            std::fs::copy(entry.path(), &destination)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn copy_nested_files() {
        let from = tempfile::tempdir().unwrap();
        let to = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(from.path().join("refs/heads")).unwrap();
        std::fs::write(from.path().join("HEAD"), "ref: refs/heads/main\n").unwrap();
        std::fs::write(from.path().join("refs/heads/main"), "abc\n").unwrap();

        copy_dir_content(from.path(), to.path()).unwrap();

        assert_eq!(
            std::fs::read_to_string(to.path().join("HEAD")).unwrap(),
            "ref: refs/heads/main\n"
        );
        assert_eq!(
            std::fs::read_to_string(to.path().join("refs/heads/main")).unwrap(),
            "abc\n"
        );
    }
}
