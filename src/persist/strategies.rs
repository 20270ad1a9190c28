use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use super::{PersistStrategy, StartupSyntax};
use crate::util::{posix_escape, posix_unescape};

const USER_ENV_KEY: &str = r"HKCU\Environment";

fn run(command: &mut Command) -> io::Result<Output> {
    let output = command.output()?;
    if output.status.success() {
        Ok(output)
    } else {
        Err(io::Error::other(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ))
    }
}

/// Reads a value from `reg query` output:
/// `    JAVA_HOME    REG_EXPAND_SZ    C:\tools\java\current`.
pub(crate) fn parse_reg_query(stdout: &str, variable: &str) -> Option<String> {
    stdout.lines().find_map(|line| {
        let line = line.trim();
        let rest = line.strip_prefix(variable)?;
        let rest = rest.trim_start();
        let (kind, value) = rest.split_once(char::is_whitespace)?;
        kind.starts_with("REG_").then(|| value.trim().to_string())
    })
}

fn query_registry(variable: &str) -> io::Result<Option<String>> {
    let output = Command::new("reg")
        .args(["query", USER_ENV_KEY, "/v", variable])
        .output()?;
    if !output.status.success() {
        return Ok(None);
    }
    Ok(parse_reg_query(&String::from_utf8_lossy(&output.stdout), variable))
}

/// Writes `HKCU\Environment` directly with `reg add`.
pub struct RegistryStrategy;

impl PersistStrategy for RegistryStrategy {
    fn name(&self) -> &str {
        "registry"
    }

    fn write(&self, variable: &str, value: &str) -> io::Result<()> {
        run(Command::new("reg").args([
            "add",
            USER_ENV_KEY,
            "/v",
            variable,
            "/t",
            "REG_EXPAND_SZ",
            "/d",
            value,
            "/f",
        ]))
        .map(|_| ())
    }

    fn read(&self, variable: &str) -> io::Result<Option<String>> {
        query_registry(variable)
    }
}

/// `[Environment]::SetEnvironmentVariable(..., 'User')` through a PowerShell host.
pub struct PowerShellStrategy {
    program: String,
}

impl PowerShellStrategy {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }

    fn script(&self, script: &str) -> io::Result<Output> {
        run(Command::new(&self.program).args([
            "-NoProfile",
            "-NonInteractive",
            "-Command",
            script,
        ]))
    }
}

fn ps_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

impl PersistStrategy for PowerShellStrategy {
    fn name(&self) -> &str {
        &self.program
    }

    fn write(&self, variable: &str, value: &str) -> io::Result<()> {
        let script = format!(
            "[Environment]::SetEnvironmentVariable({}, {}, 'User')",
            ps_quote(variable),
            ps_quote(value)
        );
        self.script(&script).map(|_| ())
    }

    fn read(&self, variable: &str) -> io::Result<Option<String>> {
        let script = format!(
            "[Environment]::GetEnvironmentVariable({}, 'User')",
            ps_quote(variable)
        );
        let output = self.script(&script)?;
        let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok((!value.is_empty()).then_some(value))
    }
}

/// The legacy `setx` command, verified through the registry.
pub struct SetxStrategy;

impl PersistStrategy for SetxStrategy {
    fn name(&self) -> &str {
        "setx"
    }

    fn write(&self, variable: &str, value: &str) -> io::Result<()> {
        run(Command::new("setx").args([variable, value])).map(|_| ())
    }

    fn read(&self, variable: &str) -> io::Result<Option<String>> {
        query_registry(variable)
    }
}

/// A managed file of `export NAME="value"` lines. The startup file sources it
/// through [`PersistStrategy::startup_hook`].
pub struct EnvFile {
    path: PathBuf,
}

impl EnvFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lines(&self) -> io::Result<Vec<String>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(content.lines().map(str::to_string).collect()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}

fn export_prefix(variable: &str) -> String {
    format!("export {}=", variable)
}

impl PersistStrategy for EnvFile {
    fn name(&self) -> &str {
        "env file"
    }

    fn write(&self, variable: &str, value: &str) -> io::Result<()> {
        let prefix = export_prefix(variable);
        let line = format!("{}\"{}\"", prefix, posix_escape(value));
        let mut lines = self.lines()?;
        match lines.iter_mut().find(|l| l.starts_with(&prefix)) {
            Some(existing) => *existing = line,
            None => lines.push(line),
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut content = lines.join("\n");
        content.push('\n');
        fs::write(&self.path, content)
    }

    fn read(&self, variable: &str) -> io::Result<Option<String>> {
        let prefix = export_prefix(variable);
        Ok(self.lines()?.iter().find_map(|line| {
            let quoted = line.strip_prefix(&prefix)?.trim();
            let inner = quoted
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(quoted);
            Some(posix_unescape(inner))
        }))
    }

    fn startup_hook(&self, syntax: StartupSyntax) -> Option<String> {
        match syntax {
            StartupSyntax::Posix => Some(format!(". \"{}\"", posix_escape(&self.path.display().to_string()))),
            StartupSyntax::PowerShell => None,
        }
    }
}
