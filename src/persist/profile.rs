use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use log::debug;
use crate::config::home_dir;
use crate::util::{posix_escape, powershell_escape};

const MARKER_PREFIX: &str = "# toolver:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupSyntax {
    Posix,
    PowerShell,
}

/// A shell startup file holding one marked line per persisted value.
///
/// Each value sits on the line after its `# toolver: <key>` marker; applying
/// the same key again rewrites that line instead of appending another.
#[derive(Debug, Clone)]
pub struct StartupFile {
    path: PathBuf,
    syntax: StartupSyntax,
}

impl StartupFile {
    pub fn new(path: impl Into<PathBuf>, syntax: StartupSyntax) -> Self {
        Self {
            path: path.into(),
            syntax,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn syntax(&self) -> StartupSyntax {
        self.syntax
    }

    /// Keys of every marker in the file; empty when the file does not exist.
    pub fn markers(&self) -> io::Result<Vec<String>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        Ok(content
            .lines()
            .filter_map(|line| line.trim().strip_prefix(MARKER_PREFIX))
            .map(|key| key.trim().to_string())
            .collect())
    }

    /// The startup files the current user's shell reads.
    #[cfg(not(windows))]
    pub fn for_user() -> Vec<StartupFile> {
        let Some(home) = home_dir() else {
            return Vec::new();
        };
        let shell = std::env::var("SHELL").unwrap_or_default();
        let name = if shell.contains("zsh") {
            ".zshrc"
        } else if shell.contains("bash") {
            ".bashrc"
        } else {
            ".profile"
        };
        vec![StartupFile::new(home.join(name), StartupSyntax::Posix)]
    }

    #[cfg(windows)]
    pub fn for_user() -> Vec<StartupFile> {
        let documents = directories::UserDirs::new()
            .and_then(|dirs| dirs.document_dir().map(Path::to_path_buf))
            .or_else(|| home_dir().map(|home| home.join("Documents")));
        let Some(documents) = documents else {
            return Vec::new();
        };
        ["PowerShell", "WindowsPowerShell"]
            .iter()
            .map(|dir| {
                StartupFile::new(
                    documents.join(dir).join("Microsoft.PowerShell_profile.ps1"),
                    StartupSyntax::PowerShell,
                )
            })
            .collect()
    }

    pub fn var_line(&self, variable: &str, value: &str) -> String {
        match self.syntax {
            StartupSyntax::Posix => format!("export {}=\"{}\"", variable, posix_escape(value)),
            StartupSyntax::PowerShell => {
                format!("$env:{} = \"{}\"", variable, powershell_escape(value))
            }
        }
    }

    pub fn path_line(&self, dirs: &[String]) -> String {
        match self.syntax {
            StartupSyntax::Posix => {
                let dirs: Vec<String> = dirs.iter().map(|d| posix_escape(d)).collect();
                format!("export PATH=\"{}:$PATH\"", dirs.join(":"))
            }
            StartupSyntax::PowerShell => {
                let dirs: Vec<String> = dirs.iter().map(|d| powershell_escape(d)).collect();
                format!("$env:Path = \"{};\" + $env:Path", dirs.join(";"))
            }
        }
    }

    /// Writes all of a tool's values.
    pub fn apply_tool(
        &self,
        tool: &str,
        vars: &[(String, String)],
        path_dirs: &[String],
    ) -> io::Result<()> {
        for (variable, value) in vars {
            self.apply(variable, &self.var_line(variable, value))?;
        }
        if !path_dirs.is_empty() {
            self.apply(&format!("PATH {}", tool), &self.path_line(path_dirs))?;
        }
        Ok(())
    }

    /// Puts `line` under the marker for `key`. Returns whether the file changed.
    pub fn apply(&self, key: &str, line: &str) -> io::Result<bool> {
        let marker = format!("{} {}", MARKER_PREFIX, key);
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e),
        };
        let mut lines: Vec<String> = content.lines().map(str::to_string).collect();

        match lines.iter().position(|l| l.trim() == marker) {
            Some(i) if lines.get(i + 1).map(String::as_str) == Some(line) => return Ok(false),
            Some(i) if i + 1 < lines.len() => lines[i + 1] = line.to_string(),
            Some(_) => lines.push(line.to_string()),
            None => {
                if lines.last().is_some_and(|l| !l.trim().is_empty()) {
                    lines.push(String::new());
                }
                lines.push(marker);
                lines.push(line.to_string());
            }
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = lines.join("\n");
        out.push('\n');
        fs::write(&self.path, out)?;
        debug!("Updated {} in {}", key, self.path.display());
        Ok(true)
    }
}
