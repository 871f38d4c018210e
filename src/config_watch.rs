use std::{
    path::{Path, PathBuf},
    sync::mpsc::{self, Receiver},
};

use anyhow::{anyhow, Result};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};

use crate::config::Config;

/// Hot reload for the config file. Watches the containing directory, since
/// editors often replace the file instead of writing it in place.
pub struct ConfigWatcher {
    path: PathBuf,
    _watcher: RecommendedWatcher,
    changes_rx: Receiver<notify::Result<notify::Event>>,
}

impl ConfigWatcher {
    pub fn watch(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        if !dir.exists() {
            return Err(anyhow!("Config directory {} does not exist", dir.display()));
        }

        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;

        Ok(Self {
            path,
            _watcher: watcher,
            changes_rx: rx,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drain pending file events; returns the freshly parsed config when the
    /// watched file changed and still parses.
    pub fn poll(&self) -> Option<Config> {
        let mut touched = false;
        while let Ok(event) = self.changes_rx.try_recv() {
            match event {
                Ok(evt) => {
                    touched |= evt
                        .paths
                        .iter()
                        .any(|p| p.file_name() == self.path.file_name());
                }
                Err(err) => log::warn!("Config watcher error: {err}"),
            }
        }

        if !touched || !self.path.exists() {
            return None;
        }

        match Config::load_from(&self.path) {
            Ok(mut config) => {
                config.spotify.apply_env();
                log::info!("Reloaded config from {}", self.path.display());
                Some(config)
            }
            Err(err) => {
                log::warn!("Keeping previous config: {err:#}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{fs, thread, time::Duration, time::Instant};

    #[test]
    fn rewriting_the_file_yields_new_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[cache]\ncapacity = 5\n").unwrap();

        let watcher = ConfigWatcher::watch(&path).unwrap();
        thread::sleep(Duration::from_millis(100));
        fs::write(&path, "[cache]\ncapacity = 9\n").unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut capacity = None;
        // A reload can observe the file mid-write, so wait for the final value.
        while capacity != Some(9) && Instant::now() < deadline {
            if let Some(config) = watcher.poll() {
                capacity = Some(config.cache.capacity);
            }
            thread::sleep(Duration::from_millis(50));
        }
        assert_eq!(capacity, Some(9));
    }

    #[test]
    fn missing_directory_is_an_error() {
        assert!(ConfigWatcher::watch("/definitely/not/here/config.toml").is_err());
    }
}
