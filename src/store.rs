//! On-disk layout of installed versions.
//!
//! ```text
//! <root>/<tool>/<version[-distribution]>/   installed version
//! <root>/<tool>/current                     alias to the active version
//! <root>/.downloads/                        artifacts and resumable partials
//! <root>/state.toml                         record of active versions
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;
use crate::error::{Error, Result};
use crate::link;
use crate::util::sort_versions;

pub const CURRENT: &str = "current";
const DOWNLOADS: &str = ".downloads";
const STATE_FILE: &str = "state.toml";

/// Secondary record of the active version per tool, for platforms where the
/// alias target cannot be read back.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
pub struct StateFile {
    #[serde(default)]
    pub current: BTreeMap<String, String>,
}

impl StateFile {
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(path.as_ref()) {
            Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
                warn!("Ignoring unreadable {}: {}", path.as_ref().display(), e);
                StateFile::default()
            }),
            Err(_) => StateFile::default(),
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("could not serialize state: {}", e)))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        fs::write(path, content).map_err(|e| Error::io(path, e))
    }
}

/// The install root and everything under it. Passed explicitly so tests can
/// point it at a temporary directory.
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tool_dir(&self, tool: &str) -> PathBuf {
        self.root.join(tool)
    }

    pub fn version_dir(&self, tool: &str, key: &str) -> PathBuf {
        self.tool_dir(tool).join(key)
    }

    pub fn current_path(&self, tool: &str) -> PathBuf {
        self.tool_dir(tool).join(CURRENT)
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.root.join(DOWNLOADS)
    }

    pub fn state_path(&self) -> PathBuf {
        self.root.join(STATE_FILE)
    }

    pub fn is_installed(&self, tool: &str, key: &str) -> bool {
        is_visible(key) && self.version_dir(tool, key).is_dir()
    }

    /// Installed version keys for `tool`, newest first.
    pub fn list_installed(&self, tool: &str) -> Result<Vec<String>> {
        let dir = self.tool_dir(tool);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::io(&dir, e)),
        };
        let mut versions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::io(&dir, e))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if !is_visible(&name) {
                continue;
            }
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if is_dir {
                versions.push(name);
            }
        }
        Ok(sort_versions(versions))
    }

    /// Tools with at least one directory under the root, sorted by name.
    pub fn installed_tools(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::io(&self.root, e)),
        };
        let mut tools: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .filter(|name| !name.starts_with('.'))
            .collect();
        tools.sort();
        Ok(tools)
    }

    /// The active version key. The alias is authoritative; the record is only
    /// consulted when an alias exists but cannot be read back.
    pub fn current(&self, tool: &str) -> Option<String> {
        let alias = self.current_path(tool);
        if !link::link_exists(&alias) {
            return None;
        }
        if let Some(target) = link::read_dir_link(&alias) {
            return target
                .file_name()
                .map(|name| name.to_string_lossy().to_string());
        }
        debug!("Alias {} unreadable, using state record", alias.display());
        self.recorded_current(tool)
    }

    /// The version `state.toml` names as active, which may lag behind the alias.
    pub fn recorded_current(&self, tool: &str) -> Option<String> {
        StateFile::load_or_default(self.state_path())
            .current
            .get(tool)
            .cloned()
    }

    pub fn record_current(&self, tool: &str, key: &str) -> Result<()> {
        let path = self.state_path();
        let mut state = StateFile::load_or_default(&path);
        state.current.insert(tool.to_string(), key.to_string());
        state.save(&path)
    }

    pub fn clear_current(&self, tool: &str) -> Result<()> {
        let path = self.state_path();
        let mut state = StateFile::load_or_default(&path);
        if state.current.remove(tool).is_some() {
            state.save(&path)?;
        }
        Ok(())
    }

    /// Total size in bytes of an installed version.
    pub fn disk_usage(&self, tool: &str, key: &str) -> u64 {
        WalkDir::new(self.version_dir(tool, key))
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| entry.metadata().ok())
            .map(|meta| meta.len())
            .sum()
    }
}

/// Hides the alias, staging directories and dotfiles from listings.
fn is_visible(name: &str) -> bool {
    !name.is_empty() && name != CURRENT && !name.starts_with('.')
}
