//! Durable user-level environment writes.
//!
//! A persistent activation walks an ordered chain of [`PersistStrategy`]s. Each
//! one writes the variable and reads it back; the first confirmed write wins.
//! A shell startup file is updated afterwards regardless, so the value is
//! reapplied by the next interactive shell even when every strategy failed.

mod profile;
mod strategies;

use std::io;
use std::path::{Path, PathBuf};
use log::{debug, warn};
use crate::error::{Error, Result};

pub use profile::{StartupFile, StartupSyntax};
pub use strategies::{EnvFile, PowerShellStrategy, RegistryStrategy, SetxStrategy};

/// One way of writing a persistent user variable.
pub trait PersistStrategy {
    /// Short label used in warnings and logs.
    fn name(&self) -> &str;
    fn write(&self, variable: &str, value: &str) -> io::Result<()>;
    /// Reads the persisted value back, `None` when unset.
    fn read(&self, variable: &str) -> io::Result<Option<String>>;
    /// A startup-file line a shell needs before it sees values written here.
    fn startup_hook(&self, _syntax: StartupSyntax) -> Option<String> {
        None
    }
}

/// Outcome of persisting one tool's environment.
#[derive(Debug, Default)]
pub struct PersistReport {
    /// Variable name and the strategy that stored it.
    pub stored: Vec<(String, String)>,
    /// Soft failures, one per variable no strategy could confirm.
    pub failures: Vec<Error>,
    pub startup_files: Vec<PathBuf>,
}

/// The ordered strategy chain plus startup-file backstop.
pub struct EnvPersister {
    strategies: Vec<Box<dyn PersistStrategy>>,
    startup_files: Vec<StartupFile>,
}

impl EnvPersister {
    pub fn new(strategies: Vec<Box<dyn PersistStrategy>>) -> Self {
        Self {
            strategies,
            startup_files: Vec::new(),
        }
    }

    /// A persister that stores nothing.
    pub fn disabled() -> Self {
        Self::new(Vec::new())
    }

    pub fn with_startup_file(mut self, file: StartupFile) -> Self {
        self.startup_files.push(file);
        self
    }

    /// The chain for this platform: registry, `pwsh`, `powershell`, `setx` on
    /// Windows; the managed env file under `root` elsewhere. Startup files come
    /// from the user's shell. Without a startup file to source it, the env file
    /// is left out of the chain.
    pub fn platform(root: &Path) -> Self {
        let startup_files = StartupFile::for_user();
        let strategies: Vec<Box<dyn PersistStrategy>> = if cfg!(windows) {
            vec![
                Box::new(RegistryStrategy),
                Box::new(PowerShellStrategy::new("pwsh")),
                Box::new(PowerShellStrategy::new("powershell")),
                Box::new(SetxStrategy),
            ]
        } else if startup_files.is_empty() {
            Vec::new()
        } else {
            vec![Box::new(EnvFile::new(root.join("env")))]
        };
        Self {
            strategies,
            startup_files,
        }
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Stores one variable through the first strategy whose write reads back
    /// equal. Returns that strategy's name, or [`Error::PersistenceFailure`].
    pub fn persist_var(&self, tool: &str, variable: &str, value: &str) -> Result<String> {
        let mut attempts = Vec::new();
        for strategy in &self.strategies {
            attempts.push(strategy.name().to_string());
            if let Err(err) = strategy.write(variable, value) {
                debug!("{} could not write {}: {}", strategy.name(), variable, err);
                continue;
            }
            match strategy.read(variable) {
                Ok(Some(read)) if read.trim() == value.trim() => {
                    debug!("Persisted {} via {}", variable, strategy.name());
                    return Ok(strategy.name().to_string());
                }
                Ok(read) => {
                    debug!(
                        "{} wrote {} but read back {:?}",
                        strategy.name(),
                        variable,
                        read
                    );
                }
                Err(err) => debug!("{} could not verify {}: {}", strategy.name(), variable, err),
            }
        }
        Err(Error::PersistenceFailure {
            tool: tool.to_string(),
            variable: variable.to_string(),
            attempts,
        })
    }

    /// Persists every variable, then records variables and path entries in the
    /// startup files under per-tool markers. Strategies that stored a value
    /// get their hook line into every startup file.
    pub fn persist(&self, tool: &str, vars: &[(String, String)], path_dirs: &[String]) -> PersistReport {
        let mut report = PersistReport::default();
        for (variable, value) in vars {
            match self.persist_var(tool, variable, value) {
                Ok(method) => report.stored.push((variable.clone(), method)),
                Err(err) => {
                    warn!("{}", err);
                    report.failures.push(err);
                }
            }
        }

        let used: Vec<&dyn PersistStrategy> = self
            .strategies
            .iter()
            .filter(|s| report.stored.iter().any(|(_, method)| method == s.name()))
            .map(|s| &**s)
            .collect();
        for file in &self.startup_files {
            let result = used
                .iter()
                .filter_map(|s| Some((s.name(), s.startup_hook(file.syntax())?)))
                .try_for_each(|(name, line)| file.apply(&format!("source {}", name), &line).map(|_| ()))
                .and_then(|()| file.apply_tool(tool, vars, path_dirs));
            match result {
                Ok(()) => report.startup_files.push(file.path().to_path_buf()),
                Err(err) => warn!("Could not update {}: {}", file.path().display(), err),
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// In-memory strategy with switchable failure points.
    struct Fake {
        name: &'static str,
        fail_write: bool,
        corrupt: bool,
        values: RefCell<HashMap<String, String>>,
        writes: RefCell<u32>,
    }

    impl Fake {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                fail_write: false,
                corrupt: false,
                values: RefCell::new(HashMap::new()),
                writes: RefCell::new(0),
            }
        }
    }

    impl PersistStrategy for &Fake {
        fn name(&self) -> &str {
            self.name
        }

        fn write(&self, variable: &str, value: &str) -> io::Result<()> {
            *self.writes.borrow_mut() += 1;
            if self.fail_write {
                return Err(io::Error::other("denied"));
            }
            let value = if self.corrupt { "garbled" } else { value };
            self.values.borrow_mut().insert(variable.into(), value.into());
            Ok(())
        }

        fn read(&self, variable: &str) -> io::Result<Option<String>> {
            Ok(self.values.borrow().get(variable).cloned())
        }
    }

    fn leak(fake: Fake) -> &'static Fake {
        Box::leak(Box::new(fake))
    }

    #[test]
    fn test_first_verified_strategy_wins() {
        let registry = leak(Fake { fail_write: true, ..Fake::new("registry") });
        let pwsh = leak(Fake { corrupt: true, ..Fake::new("pwsh") });
        let setx = leak(Fake::new("setx"));
        let after = leak(Fake::new("after"));
        let persister = EnvPersister::new(vec![
            Box::new(registry),
            Box::new(pwsh),
            Box::new(setx),
            Box::new(after),
        ]);

        let method = persister.persist_var("java", "JAVA_HOME", "/t/java/current").unwrap();
        assert_eq!(method, "setx");
        assert_eq!(*after.writes.borrow(), 0);
        assert_eq!(*registry.writes.borrow(), 1);
    }

    #[test]
    fn test_exhausted_chain_is_soft_failure() {
        let a = leak(Fake { fail_write: true, ..Fake::new("a") });
        let b = leak(Fake { corrupt: true, ..Fake::new("b") });
        let persister = EnvPersister::new(vec![Box::new(a), Box::new(b)]);

        let report = persister.persist(
            "java",
            &[("JAVA_HOME".to_string(), "/t/java/current".to_string())],
            &[],
        );
        assert!(report.stored.is_empty());
        assert_eq!(report.failures.len(), 1);
        match &report.failures[0] {
            Error::PersistenceFailure { attempts, .. } => assert_eq!(attempts, &["a", "b"]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_startup_file_written_even_when_chain_fails() {
        let dir = tempfile::tempdir().unwrap();
        let rc = dir.path().join(".bashrc");
        let persister = EnvPersister::disabled()
            .with_startup_file(StartupFile::new(&rc, StartupSyntax::Posix));
        let report = persister.persist(
            "go",
            &[("GOROOT".to_string(), "/t/go/current".to_string())],
            &["/t/go/current/bin".to_string()],
        );
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.startup_files, vec![rc.clone()]);
        let content = std::fs::read_to_string(rc).unwrap();
        assert!(content.contains("export GOROOT=\"/t/go/current\""));
        assert!(!content.contains("source"));
    }

    #[test]
    fn test_env_file_is_sourced_from_startup_file() {
        let dir = tempfile::tempdir().unwrap();
        let env_file = dir.path().join("root").join("env");
        let rc = dir.path().join(".zshrc");
        let persister = EnvPersister::new(vec![Box::new(EnvFile::new(&env_file))])
            .with_startup_file(StartupFile::new(&rc, StartupSyntax::Posix));

        for _ in 0..2 {
            let report = persister.persist(
                "java",
                &[("JAVA_HOME".to_string(), "/t/java/current".to_string())],
                &[],
            );
            assert_eq!(report.stored, vec![("JAVA_HOME".to_string(), "env file".to_string())]);
        }

        let content = std::fs::read_to_string(&rc).unwrap();
        let hook = format!(". \"{}\"", env_file.display());
        assert_eq!(content.matches(&hook).count(), 1);
        assert_eq!(content.matches("# toolver: source env file").count(), 1);
    }
}
