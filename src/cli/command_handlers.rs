use std::{error::Error, path::Path};

use log::info;

use crate::{
    config::GitsplitSettings,
    model::gitsplit::Config,
    workspace::{self, WorkingSpace, WorkingSpaceFactory},
};

/// Handler to check command
pub fn do_check(config_path: &Path, settings: GitsplitSettings) -> Result<(), Box<dyn Error>> {
    let config = Config::from_file(config_path)?;
    let factory = WorkingSpaceFactory::new(settings);

    let mut working_space = factory.create_working_space(config)?;
    let report = report_remotes(&mut working_space);
    working_space.close()?;
    report
}

fn report_remotes(working_space: &mut WorkingSpace) -> Result<(), Box<dyn Error>> {
    for pruned in working_space.wait_for_clean()? {
        info!("Pruned stale remote {}", pruned);
    }
    for remote in working_space.remotes().remotes()? {
        info!(
            "{} -> {} ({})",
            remote.name(),
            remote.url(),
            remote
                .namespaces()
                .iter()
                .map(|namespace| namespace.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    Ok(())
}

/// Handler to clear-cache command
pub fn do_clear_cache(config_path: &Path, settings: GitsplitSettings) -> Result<(), Box<dyn Error>> {
    let config = Config::from_file(config_path)?;
    let cache_url = match config.cache_url {
        Some(cache_url) => cache_url,
        None => {
            info!("No cache configured, nothing to do");
            return Ok(());
        }
    };
    if !cache_url.is_local() {
        return Err(format!("Cache {} is not a local directory", cache_url).into());
    }

    let location = cache_url.schemeless();
    let _lock = workspace::lock_cache(&location, settings.cache_lock_timeout)?;
    match std::fs::remove_dir_all(&location) {
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            info!("{} is already removed, nothing to do", location.display());
            Ok(())
        }
        Err(err) => Err(err.into()),
        Ok(()) => {
            info!("Cleared gitsplit cache {}", location.display());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    fn settings(workdir: &Path) -> GitsplitSettings {
        GitsplitSettings {
            workdir_dir: workdir.to_path_buf(),
            workdir_prefix: "gitsplit_cli_".to_owned(),
            cache_lock_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn clear_local_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("cache.git");
        git2::Repository::init_bare(&cache).unwrap();
        let config_path = dir.path().join(".gitsplit.toml");
        std::fs::write(
            &config_path,
            format!(
                "project_url = \"https://example/proj.git\"\ncache_url = \"file://{}\"\n",
                cache.display()
            ),
        )
        .unwrap();

        do_clear_cache(&config_path, settings(dir.path())).unwrap();
        assert!(!cache.exists());
        do_clear_cache(&config_path, settings(dir.path())).unwrap();
    }

    #[test]
    fn refuse_to_clear_remote_cache() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join(".gitsplit.toml");
        std::fs::write(
            &config_path,
            "project_url = \"https://example/proj.git\"\ncache_url = \"git@host:cache.git\"\n",
        )
        .unwrap();

        assert!(do_clear_cache(&config_path, settings(dir.path())).is_err());
    }

    #[test]
    fn check_local_project() {
        let project = crate::test_support::project_repository();
        let dir = tempfile::tempdir().unwrap();
        let workdir = dir.path().join("work");
        let config_path = dir.path().join(".gitsplit.toml");
        std::fs::write(
            &config_path,
            format!(
                "project_url = \"{}\"\n\n[[splits]]\nprefix = \"src\"\ntarget = \"git@host:t1.git\"\n",
                project.path().display()
            ),
        )
        .unwrap();

        do_check(&config_path, settings(&workdir)).unwrap();
        assert_eq!(std::fs::read_dir(&workdir).unwrap().count(), 0);
    }
}
