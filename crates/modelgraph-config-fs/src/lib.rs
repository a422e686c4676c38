// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Filesystem [`ConfigStore`] for the modelgraph indexer.
//!
//! Each key is one `<key>.json` file under a base directory, by default the
//! platform config directory. Writes go to a sibling temporary file that is
//! renamed over the target, so readers see either the old or the new document.

use directories::ProjectDirs;
use modelgraph_core::config::{ConfigError, ConfigStore};
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

/// Settings documents as JSON files under one directory.
#[derive(Debug, Clone)]
pub struct FsConfigStore {
    base: PathBuf,
}

impl FsConfigStore {
    /// Store under the user config directory (`~/.config/ModelGraph` on Linux).
    pub fn new() -> Result<Self, ConfigError> {
        let dirs = ProjectDirs::from("dev", "flyingrobots", "ModelGraph").ok_or_else(|| {
            ConfigError::Unavailable("no home directory to derive a config path from".into())
        })?;
        Self::at(dirs.config_dir())
    }

    /// Store under `base`, which is created when missing.
    pub fn at(base: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let base = base.as_ref().to_path_buf();
        fs::create_dir_all(&base)?;
        Ok(Self { base })
    }

    /// Directory holding the documents.
    pub fn base(&self) -> &Path {
        &self.base
    }

    fn document(&self, key: &str) -> Result<PathBuf, ConfigError> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(ConfigError::Io(io::Error::new(
                ErrorKind::InvalidInput,
                format!("config key {key:?} is not a plain file name"),
            )));
        }
        Ok(self.base.join(format!("{key}.json")))
    }
}

impl ConfigStore for FsConfigStore {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, ConfigError> {
        match fs::read(self.document(key)?) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn write(&self, key: &str, document: &[u8]) -> Result<(), ConfigError> {
        let target = self.document(key)?;
        let staging = target.with_extension("json.tmp");
        fs::write(&staging, document)?;
        fs::rename(&staging, &target)?;
        Ok(())
    }
}
