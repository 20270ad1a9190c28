//! Health checks over the install root, the `current` aliases and the shell
//! startup files.

use std::fs;
use std::path::Path;
use serde::Serialize;
use crate::activate::missing_dependencies;
use crate::catalog::Catalog;
use crate::link;
use crate::persist::StartupFile;
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Ok,
    Info,
    Warn,
    Fail,
}

/// One observation, with a command that fixes it when there is one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub severity: Severity,
    pub message: String,
    pub hint: Option<String>,
}

impl Finding {
    fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            hint: None,
        }
    }

    fn hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Whether this finding counts as an issue in the summary.
    pub fn is_issue(&self) -> bool {
        self.severity >= Severity::Warn
    }
}

pub struct Doctor<'a> {
    store: &'a Store,
    catalog: &'a Catalog,
    startup_files: Vec<StartupFile>,
}

impl<'a> Doctor<'a> {
    pub fn new(store: &'a Store, catalog: &'a Catalog) -> Self {
        Self {
            store,
            catalog,
            startup_files: StartupFile::for_user(),
        }
    }

    pub fn with_startup_files(mut self, files: Vec<StartupFile>) -> Self {
        self.startup_files = files;
        self
    }

    /// Runs every check. Nothing is modified.
    pub fn run(&self) -> Vec<Finding> {
        let mut findings = Vec::new();
        if !self.check_root(&mut findings) {
            return findings;
        }
        self.check_downloads(&mut findings);
        let active = self.check_tools(&mut findings);
        if active > 0 {
            self.check_startup_files(&mut findings);
        }
        findings
    }

    fn check_root(&self, findings: &mut Vec<Finding>) -> bool {
        let root = self.store.root();
        if root.is_dir() {
            findings.push(Finding::new(Severity::Ok, format!("install root {}", root.display())));
            true
        } else if root.exists() {
            findings.push(
                Finding::new(Severity::Fail, format!("install root {} is not a directory", root.display()))
                    .hint("set `root` in config.toml or TOOLVER_ROOT to a directory"),
            );
            false
        } else {
            findings.push(
                Finding::new(Severity::Info, format!("install root {} does not exist yet", root.display()))
                    .hint("toolver install <tool> <version>"),
            );
            false
        }
    }

    fn check_downloads(&self, findings: &mut Vec<Finding>) {
        let downloads = self.store.downloads_dir();
        let partial = entries_named(&downloads, |name| name.ends_with(".part"));
        if partial > 0 {
            findings.push(
                Finding::new(
                    Severity::Info,
                    format!("{} interrupted download(s) in {}", partial, downloads.display()),
                )
                .hint("re-run the install to resume them"),
            );
        }
    }

    /// Checks each installed tool; returns how many have an active version.
    fn check_tools(&self, findings: &mut Vec<Finding>) -> usize {
        let tools = match self.store.installed_tools() {
            Ok(tools) => tools,
            Err(err) => {
                findings.push(Finding::new(Severity::Fail, err.to_string()));
                return 0;
            }
        };
        if tools.is_empty() {
            findings.push(
                Finding::new(Severity::Info, "no tools installed yet").hint("toolver install java 21"),
            );
            return 0;
        }

        let mut active = 0;
        for tool in tools {
            let tool_dir = self.store.tool_dir(&tool);
            let staging = entries_named(&tool_dir, |name| name.starts_with(".staging-"));
            if staging > 0 {
                findings.push(
                    Finding::new(Severity::Warn, format!("{}: {} leftover staging director(ies)", tool, staging))
                        .hint(format!("remove {}/.staging-*", tool_dir.display())),
                );
            }

            let Some(descriptor) = self.catalog.find(&tool) else {
                findings.push(
                    Finding::new(Severity::Warn, format!("{} is not a known tool", tool))
                        .hint("add a definition to definitions_dir or remove the directory"),
                );
                continue;
            };
            let installed = self.store.list_installed(&tool).unwrap_or_default();
            if installed.is_empty() {
                continue;
            }

            let alias = self.store.current_path(&tool);
            if !link::link_exists(&alias) {
                findings.push(
                    Finding::new(
                        Severity::Warn,
                        format!("{}: {} version(s) installed, none active", tool, installed.len()),
                    )
                    .hint(format!("toolver use {} {}", tool, installed[0])),
                );
            } else if !alias.is_dir() {
                findings.push(
                    Finding::new(Severity::Fail, format!("{}: current alias {} is broken", tool, alias.display()))
                        .hint(format!("toolver use {} {}", tool, installed[0])),
                );
            } else if let Some(current) = self.store.current(&tool) {
                active += 1;
                findings.push(Finding::new(
                    Severity::Ok,
                    format!("{} {} active ({} installed)", tool, current, installed.len()),
                ));
                if let Some(recorded) = self.store.recorded_current(&tool).filter(|r| *r != current) {
                    findings.push(
                        Finding::new(
                            Severity::Warn,
                            format!("{}: state.toml records {} but the alias points at {}", tool, recorded, current),
                        )
                        .hint(format!("toolver use {} {}", tool, current)),
                    );
                }
            }

            for missing in missing_dependencies(self.store, self.catalog, descriptor) {
                findings.push(Finding::new(Severity::Fail, missing));
            }
        }
        active
    }

    fn check_startup_files(&self, findings: &mut Vec<Finding>) {
        if self.startup_files.is_empty() {
            findings.push(
                Finding::new(Severity::Warn, "no shell startup file found")
                    .hint("add the output of `toolver init` to your shell profile"),
            );
            return;
        }
        for file in &self.startup_files {
            match file.markers() {
                Ok(markers) if markers.is_empty() => findings.push(
                    Finding::new(
                        Severity::Warn,
                        format!("{} does not load toolver; new shells will not see active tools", file.path().display()),
                    )
                    .hint("toolver init --install"),
                ),
                Ok(markers) => findings.push(Finding::new(
                    Severity::Ok,
                    format!("{} has {} toolver entr(ies)", file.path().display(), markers.len()),
                )),
                Err(err) => findings.push(Finding::new(
                    Severity::Fail,
                    format!("could not read {}: {}", file.path().display(), err),
                )),
            }
        }
    }
}

fn entries_named(dir: &Path, matches: impl Fn(&str) -> bool) -> usize {
    fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| matches(&e.file_name().to_string_lossy()))
                .count()
        })
        .unwrap_or(0)
}
