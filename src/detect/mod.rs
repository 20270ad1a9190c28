//! Project version detection.
//!
//! For each tool, its declaration file names are tried in priority order. A
//! name is searched for in the start directory and then every parent up to the
//! filesystem root; the first name found anywhere in that walk wins, so a
//! closer `.nvmrc` beats a farther one while a farther `.nvmrc` still beats a
//! closer lower-priority `.node-version`.

mod formats;

use std::fs;
use std::path::{Path, PathBuf};
use log::debug;
use serde::Serialize;
use crate::catalog::Catalog;

pub use formats::DeclarationFormat;

/// A version declared by a project file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetectedVersion {
    pub tool: String,
    pub version: String,
    pub source: PathBuf,
}

#[derive(Debug, Clone)]
struct Rule {
    tool: String,
    files: Vec<(String, DeclarationFormat)>,
}

#[derive(Debug, Clone, Default)]
pub struct Detector {
    rules: Vec<Rule>,
}

impl Detector {
    pub fn new() -> Self {
        Self::default()
    }

    /// One rule per catalog tool that declares version files.
    pub fn from_catalog(catalog: &Catalog) -> Self {
        catalog
            .iter()
            .filter(|tool| !tool.version_files.is_empty())
            .fold(Self::new(), |detector, tool| {
                let files: Vec<&str> = tool.version_files.iter().map(String::as_str).collect();
                detector.with_tool(&tool.name, &files)
            })
    }

    /// Registers a tool with declaration files in priority order.
    pub fn with_tool(mut self, tool: &str, files: &[&str]) -> Self {
        let files = files
            .iter()
            .map(|name| (name.to_string(), DeclarationFormat::for_file(name, tool)))
            .collect();
        self.rules.retain(|rule| rule.tool != tool);
        self.rules.push(Rule {
            tool: tool.to_string(),
            files,
        });
        self
    }

    /// Every registered tool with a declaration reachable from `start`.
    pub fn detect_all(&self, start: &Path) -> Vec<DetectedVersion> {
        let start = normalize(start);
        self.rules
            .iter()
            .filter_map(|rule| detect_rule(rule, &start))
            .collect()
    }

    /// The declaration for one tool, `None` when nothing is found or the tool
    /// is not registered.
    pub fn detect_one(&self, start: &Path, tool: &str) -> Option<DetectedVersion> {
        let rule = self.rules.iter().find(|rule| rule.tool == tool)?;
        detect_rule(rule, &normalize(start))
    }
}

fn normalize(start: &Path) -> PathBuf {
    fs::canonicalize(start).unwrap_or_else(|_| start.to_path_buf())
}

fn detect_rule(rule: &Rule, start: &Path) -> Option<DetectedVersion> {
    rule.files.iter().find_map(|(name, format)| {
        start.ancestors().find_map(|dir| {
            let path = dir.join(name);
            if !path.is_file() {
                return None;
            }
            let content = match fs::read_to_string(&path) {
                Ok(content) => content,
                Err(err) => {
                    debug!("Skipping unreadable {}: {}", path.display(), err);
                    return None;
                }
            };
            match format.parse(&content) {
                Some(version) => Some(DetectedVersion {
                    tool: rule.tool.clone(),
                    version,
                    source: path,
                }),
                None => {
                    debug!("{} declares no {} version", path.display(), rule.tool);
                    None
                }
            }
        })
    })
}
