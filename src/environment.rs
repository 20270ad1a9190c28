//! Environment variables and search-path entries exposed by an active tool.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use serde::Serialize;
use crate::descriptor::ToolDescriptor;
use crate::util::{posix_escape, powershell_escape};

/// Target syntax for [`Environment::render`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shell {
    Posix,
    PowerShell,
    Cmd,
}

impl Shell {
    /// Best guess for the invoking shell.
    #[cfg(windows)]
    pub fn detect() -> Self {
        if crate::util::is_power_shell() {
            Shell::PowerShell
        } else {
            Shell::Cmd
        }
    }

    #[cfg(not(windows))]
    pub fn detect() -> Self {
        Shell::Posix
    }

    /// Escapes a value placed inside this shell's double quotes.
    pub fn escape(self, value: &str) -> String {
        match self {
            Shell::Posix => posix_escape(value),
            Shell::PowerShell => powershell_escape(value),
            Shell::Cmd => value.to_string(),
        }
    }

    /// The startup line that loads `program env` output into every new shell.
    pub fn init_hook(self, program: &str) -> String {
        match self {
            Shell::Posix => format!("eval \"$({} env --shell posix)\"", program),
            Shell::PowerShell => format!(
                "{} env --shell powershell | Out-String | Invoke-Expression",
                program
            ),
            Shell::Cmd => format!(
                "FOR /F \"usebackq delims=\" %%i IN (`{} env --shell cmd`) DO %%i",
                program
            ),
        }
    }

    pub fn path_separator(self) -> char {
        match self {
            Shell::Posix => ':',
            Shell::PowerShell | Shell::Cmd => ';',
        }
    }
}

impl FromStr for Shell {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "posix" | "sh" | "bash" | "zsh" => Ok(Shell::Posix),
            "powershell" | "pwsh" | "ps" => Ok(Shell::PowerShell),
            "cmd" => Ok(Shell::Cmd),
            other => Err(format!("unknown shell '{}' (expected posix, powershell or cmd)", other)),
        }
    }
}

impl fmt::Display for Shell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Shell::Posix => "posix",
            Shell::PowerShell => "powershell",
            Shell::Cmd => "cmd",
        })
    }
}

/// Values a shell needs for one or more tools to be usable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Environment {
    pub vars: Vec<(String, PathBuf)>,
    /// Directories to prepend to `PATH`, highest priority first.
    pub path_dirs: Vec<PathBuf>,
}

impl Environment {
    /// Resolves a tool's declared variables and path directories against
    /// `install_root`.
    pub fn for_tool(tool: &ToolDescriptor, install_root: &Path) -> Self {
        Self {
            vars: tool
                .env_vars
                .iter()
                .map(|(name, rel)| (name.clone(), resolve(install_root, rel)))
                .collect(),
            path_dirs: tool
                .path_dirs
                .iter()
                .map(|rel| resolve(install_root, rel))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty() && self.path_dirs.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Path> {
        self.vars
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value.as_path())
    }

    /// Appends `other`, keeping the first value for a repeated variable.
    pub fn extend(&mut self, other: Environment) {
        for (name, value) in other.vars {
            if self.get(&name).is_none() {
                self.vars.push((name, value));
            }
        }
        for dir in other.path_dirs {
            if !self.path_dirs.contains(&dir) {
                self.path_dirs.push(dir);
            }
        }
    }

    /// The `PATH` value with this environment's directories in front of `current`.
    /// Directories are escaped for `shell`; `current` is left as given.
    pub fn joined_path(&self, shell: Shell, current: &str) -> String {
        let sep = shell.path_separator().to_string();
        let mut parts: Vec<String> = self
            .path_dirs
            .iter()
            .map(|d| shell.escape(&d.display().to_string()))
            .collect();
        if !current.is_empty() {
            parts.push(current.to_string());
        }
        parts.join(&sep)
    }

    /// Shell statements applying this environment.
    pub fn render(&self, shell: Shell) -> String {
        let mut out = String::new();
        for (name, value) in &self.vars {
            let value = shell.escape(&value.display().to_string());
            let line = match shell {
                Shell::Posix => format!("export {}=\"{}\"\n", name, value),
                Shell::PowerShell => format!("$env:{} = \"{}\"\n", name, value),
                Shell::Cmd => format!("set \"{}={}\"\n", name, value),
            };
            out.push_str(&line);
        }
        if !self.path_dirs.is_empty() {
            let line = match shell {
                Shell::Posix => format!("export PATH=\"{}\"\n", self.joined_path(shell, "$PATH")),
                Shell::PowerShell => format!(
                    "$env:Path = \"{}\"\n",
                    self.joined_path(shell, "$env:Path")
                ),
                Shell::Cmd => format!("set \"PATH={}\"\n", self.joined_path(shell, "%PATH%")),
            };
            out.push_str(&line);
        }
        out
    }
}

/// `.` and the empty string mean the install root itself.
fn resolve(root: &Path, rel: &str) -> PathBuf {
    match rel.trim_matches(['/', '\\']) {
        "" | "." => root.to_path_buf(),
        rel => root.join(rel),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rust() -> ToolDescriptor {
        ToolDescriptor::from_json(
            "rust",
            r#"{"name":"rust","envVars":{"CARGO_HOME":"cargo","RUSTUP_HOME":"rustup"},"pathDirs":["cargo/bin"]}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_values_join_install_root() {
        let root = Path::new("/opt/toolver/rust/current");
        let env = Environment::for_tool(&rust(), root);
        assert_eq!(env.get("CARGO_HOME"), Some(root.join("cargo").as_path()));
        assert_eq!(env.path_dirs, vec![root.join("cargo/bin")]);
    }

    #[test]
    fn test_dot_means_root() {
        let tool = ToolDescriptor::from_json(
            "java",
            r#"{"name":"java","envVars":{"JAVA_HOME":"."},"pathDirs":["bin", "."]}"#,
        )
        .unwrap();
        let root = Path::new("/x/java/current");
        let env = Environment::for_tool(&tool, root);
        assert_eq!(env.get("JAVA_HOME"), Some(root));
        assert_eq!(env.path_dirs[1], root);
    }

    #[test]
    fn test_render_posix() {
        let env = Environment {
            vars: vec![("GOROOT".into(), PathBuf::from("/t/go/current"))],
            path_dirs: vec![PathBuf::from("/t/go/current/bin")],
        };
        assert_eq!(
            env.render(Shell::Posix),
            "export GOROOT=\"/t/go/current\"\nexport PATH=\"/t/go/current/bin:$PATH\"\n"
        );
    }

    #[test]
    fn test_render_windows_shells() {
        let env = Environment {
            vars: vec![("JAVA_HOME".into(), PathBuf::from("C:/t/java/current"))],
            path_dirs: vec![PathBuf::from("C:/t/java/current/bin")],
        };
        let ps = env.render(Shell::PowerShell);
        assert!(ps.contains("$env:JAVA_HOME = \"C:/t/java/current\""));
        assert!(ps.contains("$env:Path = \"C:/t/java/current/bin;$env:Path\""));
        let cmd = env.render(Shell::Cmd);
        assert!(cmd.contains("set \"PATH=C:/t/java/current/bin;%PATH%\""));
    }

    #[test]
    fn test_render_escapes_values() {
        let env = Environment {
            vars: vec![("GOROOT".into(), PathBuf::from("/home/x$y/go"))],
            path_dirs: vec![PathBuf::from("/home/x$y/go/bin")],
        };
        assert_eq!(
            env.render(Shell::Posix),
            "export GOROOT=\"/home/x\\$y/go\"\nexport PATH=\"/home/x\\$y/go/bin:$PATH\"\n"
        );
        assert!(env.render(Shell::PowerShell).contains("$env:GOROOT = \"/home/x`$y/go\""));
    }

    #[test]
    fn test_init_hooks() {
        assert_eq!(Shell::Posix.init_hook("toolver"), "eval \"$(toolver env --shell posix)\"");
        assert!(Shell::PowerShell.init_hook("toolver").ends_with("Invoke-Expression"));
        assert!(Shell::Cmd.init_hook("toolver").contains("toolver env --shell cmd"));
    }

    #[test]
    fn test_extend_keeps_first_value() {
        let mut env = Environment {
            vars: vec![("A".into(), PathBuf::from("/one"))],
            path_dirs: vec![PathBuf::from("/bin1")],
        };
        env.extend(Environment {
            vars: vec![("A".into(), PathBuf::from("/two")), ("B".into(), PathBuf::from("/b"))],
            path_dirs: vec![PathBuf::from("/bin1"), PathBuf::from("/bin2")],
        });
        assert_eq!(env.get("A"), Some(Path::new("/one")));
        assert_eq!(env.vars.len(), 2);
        assert_eq!(env.path_dirs.len(), 2);
    }

    #[test]
    fn test_shell_from_str() {
        assert_eq!("PWSH".parse::<Shell>().unwrap(), Shell::PowerShell);
        assert_eq!("zsh".parse::<Shell>().unwrap(), Shell::Posix);
        assert!("fish".parse::<Shell>().is_err());
    }
}
