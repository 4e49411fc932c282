//! Source batch discovery and archival.

use chrono::Utc;
use sc_config::PipelineConfig;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const SOURCE_EXT: &str = ".csv";

/// Directory of incoming source batches plus the archive they move to.
#[derive(Debug, Clone)]
pub struct SourceDirectory {
    dir: PathBuf,
    prefix: String,
    archive_dir: PathBuf,
}

impl SourceDirectory {
    pub fn new(
        dir: impl Into<PathBuf>,
        prefix: impl Into<String>,
        archive_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            archive_dir: archive_dir.into(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.source_dir.clone(),
            config.source_prefix.clone(),
            config.archive_dir.clone(),
        )
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether a file name qualifies as a source batch.
    pub fn accepts(&self, file_name: &str) -> bool {
        file_name.starts_with(&self.prefix) && file_name.ends_with(SOURCE_EXT)
    }

    /// Matching files sorted by name. A missing directory yields nothing.
    pub fn discover(&self) -> io::Result<Vec<PathBuf>> {
        if !self.dir.exists() {
            info!(dir = %self.dir.display(), "source directory does not exist");
            return Ok(Vec::new());
        }
        let mut found = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if self.accepts(name) {
                found.push(entry.path());
            } else {
                debug!(file = name, "ignoring non-source file");
            }
        }
        found.sort();
        Ok(found)
    }

    /// Move an applied batch into the archive as `<YYYYmmdd_HHMMSS>_<name>`.
    pub fn archive(&self, path: &Path) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.archive_dir)?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "source path has no file name")
            })?;
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let mut target = self.archive_dir.join(format!("{stamp}_{name}"));
        let mut n = 1;
        while target.exists() {
            target = self.archive_dir.join(format!("{stamp}_{n}_{name}"));
            n += 1;
        }
        if fs::rename(path, &target).is_err() {
            // Cross-device moves need a copy.
            fs::copy(path, &target)?;
            fs::remove_file(path)?;
        }
        info!(from = %path.display(), to = %target.display(), "source archived");
        Ok(target)
    }
}
