//! Switching the active version of a tool.

use std::path::PathBuf;
use log::{debug, info, warn};
use crate::catalog::Catalog;
use crate::descriptor::ToolDescriptor;
use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::link;
use crate::matcher::{DistributionAliases, ResolvedVersion, VersionExpression};
use crate::persist::{EnvPersister, PersistReport};
use crate::store::Store;

/// How far an activation's environment reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Values are only reported for the calling shell to apply.
    Session,
    /// Values are also written to the user's durable environment.
    Persistent,
}

/// Result of a successful activation.
#[derive(Debug)]
pub struct Activation {
    pub tool: String,
    pub version: ResolvedVersion,
    pub install_dir: PathBuf,
    /// The `current` alias now pointing at `install_dir`.
    pub link: PathBuf,
    /// Values computed against the alias, so they stay valid across switches.
    pub environment: Environment,
    /// Non-fatal problems such as missing dependencies or a stale state record.
    pub warnings: Vec<String>,
    pub persisted: Option<PersistReport>,
}

pub struct Activator<'a> {
    store: &'a Store,
    catalog: &'a Catalog,
    persister: EnvPersister,
}

impl<'a> Activator<'a> {
    pub fn new(store: &'a Store, catalog: &'a Catalog) -> Self {
        Self {
            store,
            catalog,
            persister: EnvPersister::platform(store.root()),
        }
    }

    pub fn with_persister(mut self, persister: EnvPersister) -> Self {
        self.persister = persister;
        self
    }

    /// Points the tool's `current` alias at an installed version.
    ///
    /// The previously active version is left untouched on disk. Missing
    /// dependencies and persistence failures are reported as warnings and
    /// never block the switch.
    ///
    /// # Errors
    /// [`Error::NotInstalled`] when the version directory does not exist, and
    /// [`Error::Io`] when the alias cannot be replaced.
    pub fn activate(
        &self,
        tool: &ToolDescriptor,
        version: &ResolvedVersion,
        scope: Scope,
    ) -> Result<Activation> {
        let key = version.key();
        let install_dir = self.store.version_dir(&tool.name, &key);
        if !self.store.is_installed(&tool.name, &key) {
            return Err(Error::NotInstalled {
                tool: tool.name.clone(),
                version: key,
            });
        }

        let mut warnings = self.missing_dependencies(tool);
        for warning in &warnings {
            warn!("{}", warning);
        }

        let alias = self.store.current_path(&tool.name);
        link::replace_dir_link(&install_dir, &alias).map_err(|e| Error::io(&alias, e))?;
        if let Err(err) = self.store.record_current(&tool.name, &key) {
            let msg = format!(
                "Could not record {} {} as current, state.toml is stale until the next switch: {}",
                tool.name, key, err
            );
            warn!("{}", msg);
            warnings.push(msg);
        }
        info!("Activated {} {}", tool.name, key);

        let environment = Environment::for_tool(tool, &alias);
        let persisted = match scope {
            Scope::Session => None,
            Scope::Persistent => {
                let report = self.persist(tool, &environment);
                warnings.extend(report.failures.iter().map(|e| e.to_string()));
                Some(report)
            }
        };

        Ok(Activation {
            tool: tool.name.clone(),
            version: version.clone(),
            install_dir,
            link: alias,
            environment,
            warnings,
            persisted,
        })
    }

    /// Removes the tool's alias and record, leaving installs in place.
    pub fn deactivate(&self, tool: &str) -> Result<()> {
        let alias = self.store.current_path(tool);
        link::remove_dir_link(&alias).map_err(|e| Error::io(&alias, e))?;
        self.store.clear_current(tool)
    }

    /// Environment of a tool's active version, if one is active.
    pub fn current_environment(&self, tool: &ToolDescriptor) -> Option<Environment> {
        self.store.current(&tool.name)?;
        Some(Environment::for_tool(tool, &self.store.current_path(&tool.name)))
    }

    pub fn missing_dependencies(&self, tool: &ToolDescriptor) -> Vec<String> {
        missing_dependencies(self.store, self.catalog, tool)
    }

    /// Resolves an expression against installed versions only, so `use 20`
    /// works offline when `20.10.0` is installed.
    pub fn resolve_installed(
        &self,
        tool: &ToolDescriptor,
        expression: &str,
    ) -> Result<ResolvedVersion> {
        let aliases = DistributionAliases::default();
        let expr = VersionExpression::parse(expression, &aliases);
        let wanted = tool.canonical(ResolvedVersion::new(&expr.version, expr.distribution.as_deref()));
        let suffix = wanted.distribution.as_ref().map(|d| format!("-{}", d));

        let known: Vec<String> = self
            .store
            .list_installed(&tool.name)?
            .into_iter()
            .filter_map(|key| match &suffix {
                Some(suffix) => key.strip_suffix(suffix.as_str()).map(str::to_string),
                None => Some(key),
            })
            .collect();

        let resolved = tool.resolve_against(&expr.version, &known, &aliases)?;
        Ok(ResolvedVersion {
            version: resolved.version,
            distribution: wanted.distribution,
        })
    }

    fn persist(&self, tool: &ToolDescriptor, environment: &Environment) -> PersistReport {
        debug!(
            "Persisting {} environment via [{}]",
            tool.name,
            self.persister.strategy_names().join(", ")
        );
        let vars: Vec<(String, String)> = environment
            .vars
            .iter()
            .map(|(name, value)| (name.clone(), value.display().to_string()))
            .collect();
        let dirs: Vec<String> = environment
            .path_dirs
            .iter()
            .map(|d| d.display().to_string())
            .collect();
        self.persister.persist(&tool.name, &vars, &dirs)
    }
}

/// Warnings for declared dependencies that have no installed version.
pub fn missing_dependencies(store: &Store, catalog: &Catalog, tool: &ToolDescriptor) -> Vec<String> {
    tool.dependencies
        .iter()
        .filter(|dep| {
            store
                .list_installed(dep)
                .map(|installed| installed.is_empty())
                .unwrap_or(true)
        })
        .map(|dep| {
            let display = catalog
                .find(dep)
                .map(|d| d.display_name().to_string())
                .unwrap_or_else(|| dep.clone());
            format!(
                "{} requires {}, but no {} version is installed (install the dependency first: toolver install {} <version>)",
                tool.display_name(),
                display,
                dep,
                dep
            )
        })
        .collect()
}
