use std::fs;
use std::path::{Path, PathBuf};
use log::{debug, info, warn};
use crate::activate::{Activator, missing_dependencies};
use crate::archive;
use crate::catalog::Catalog;
use crate::descriptor::{ArtifactKind, ToolDescriptor};
use crate::error::{Error, Result};
use crate::fetch::{FetchResult, Fetcher};
use crate::matcher::{DistributionAliases, ResolvedVersion, VersionExpression};
use crate::store::Store;

/// A freshly installed version.
#[derive(Debug)]
pub struct Installed {
    pub tool: String,
    pub version: ResolvedVersion,
    pub path: PathBuf,
    pub fetch: FetchResult,
    /// Missing dependencies and skipped checksum verification.
    pub warnings: Vec<String>,
}

/// Resolves, downloads and unpacks tool versions into a [`Store`].
pub struct Installer<'a> {
    store: &'a Store,
    catalog: &'a Catalog,
    fetcher: &'a Fetcher,
    skip_checksum: bool,
}

impl<'a> Installer<'a> {
    pub fn new(store: &'a Store, catalog: &'a Catalog, fetcher: &'a Fetcher) -> Self {
        Self {
            store,
            catalog,
            fetcher,
            skip_checksum: false,
        }
    }

    /// Installs without verifying published checksums.
    pub fn with_skip_checksum(mut self, skip: bool) -> Self {
        self.skip_checksum = skip;
        self
    }

    /// Resolves an expression against the tool's published versions and checks
    /// the result against its validation rule.
    pub fn resolve(&self, tool: &ToolDescriptor, expression: &str) -> Result<ResolvedVersion> {
        let resolved = tool.canonical(tool.resolve_version(expression, self.fetcher)?);
        if !tool.validate_version(&resolved.version) {
            return Err(Error::InvalidExpression {
                tool: tool.name.clone(),
                version: resolved.version,
                reason: format!("does not match {}", tool.version_regex),
            });
        }
        debug!("Resolved {} {} to {}", tool.name, expression, resolved);
        Ok(resolved)
    }

    /// Installs the version `expression` resolves to.
    ///
    /// # Arguments
    /// * `tool` - Catalog name, e.g. `"node"`.
    /// * `expression` - A version, partial version or wildcard, optionally with a
    ///   distribution suffix (`21-tem`).
    ///
    /// # Errors
    /// Resolution, download and extraction errors,
    /// [`Error::ChecksumUnavailable`] when a published checksum cannot be read,
    /// and [`Error::AlreadyInstalled`] when the version directory exists.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use toolver::{Catalog, Fetcher, Installer, RetryPolicy, Store};
    /// use std::time::Duration;
    ///
    /// let store = Store::new("/tmp/toolver");
    /// let catalog = Catalog::builtin().unwrap();
    /// let fetcher = Fetcher::new(RetryPolicy::default(), Duration::from_secs(600)).unwrap();
    /// let installed = Installer::new(&store, &catalog, &fetcher).install("node", "20").unwrap();
    /// assert!(installed.path.is_dir());
    /// ```
    pub fn install(&self, tool: &str, expression: &str) -> Result<Installed> {
        let tool = self.catalog.get(tool)?;
        let version = self.resolve(tool, expression)?;
        self.install_resolved(tool, &version)
    }

    /// Downloads and unpacks an already resolved version.
    ///
    /// The archive is unpacked into a hidden staging directory next to the
    /// final one and renamed into place, so a failed install never shows up in
    /// [`Store::list_installed`].
    pub fn install_resolved(&self, tool: &ToolDescriptor, version: &ResolvedVersion) -> Result<Installed> {
        let key = version.key();
        let dest = self.store.version_dir(&tool.name, &key);
        if dest.exists() {
            return Err(Error::AlreadyInstalled {
                tool: tool.name.clone(),
                version: key,
            });
        }

        let mut warnings = Vec::new();
        let distribution = version.distribution.as_deref();
        let url = tool.url_for(&version.version, distribution);
        let expected = if self.skip_checksum && tool.checksum_url_for(&version.version, distribution).is_some() {
            let msg = format!("Skipping checksum verification for {} {}", tool.name, key);
            warn!("{}", msg);
            warnings.push(msg);
            None
        } else {
            tool.checksum_for(&version.version, distribution, self.fetcher)?
        };

        let kind = tool.artifact_kind(&url);
        let downloads = self.store.downloads_dir();
        fs::create_dir_all(&downloads).map_err(|e| Error::io(&downloads, e))?;
        let artifact = downloads.join(artifact_name(&tool.name, &key, kind, &url));
        info!("Downloading {} {} from {}", tool.display_name(), key, url);
        let fetch = self.fetcher.fetch(&url, &artifact, expected.as_deref())?;

        self.unpack_into_place(tool, &key, kind, &artifact, &url, &dest)?;
        if artifact.exists() {
            let _ = fs::remove_file(&artifact);
        }
        info!("Installed {} {} to {}", tool.name, key, dest.display());

        let missing = missing_dependencies(self.store, self.catalog, tool);
        for warning in &missing {
            warn!("{}", warning);
        }
        warnings.extend(missing);

        Ok(Installed {
            tool: tool.name.clone(),
            version: version.clone(),
            path: dest,
            fetch,
            warnings,
        })
    }

    fn unpack_into_place(
        &self,
        tool: &ToolDescriptor,
        key: &str,
        kind: ArtifactKind,
        artifact: &Path,
        url: &str,
        dest: &Path,
    ) -> Result<()> {
        let tool_dir = self.store.tool_dir(&tool.name);
        fs::create_dir_all(&tool_dir).map_err(|e| Error::io(&tool_dir, e))?;
        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&tool_dir)
            .map_err(|e| Error::io(&tool_dir, e))?;

        let extraction_failure = |message: String| Error::ExtractionFailure {
            tool: tool.name.clone(),
            version: key.to_string(),
            message,
        };
        archive::unpack(kind, artifact, staging.path(), &url_file_name(url))
            .map_err(|e| extraction_failure(e.to_string()))?;
        let empty = fs::read_dir(staging.path())
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(true);
        if empty {
            return Err(extraction_failure("archive is empty".to_string()));
        }

        fs::rename(staging.path(), dest).map_err(|e| Error::io(dest, e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(dest, fs::Permissions::from_mode(0o755))
                .map_err(|e| Error::io(dest, e))?;
        }
        Ok(())
    }

    /// Removes an installed version, deactivating it first when it is current.
    ///
    /// `expression` is matched exactly against installed keys after alias and
    /// default-distribution normalisation, so `21` removes `21-temurin` for Java.
    pub fn uninstall(&self, tool: &str, expression: &str) -> Result<PathBuf> {
        let tool = self.catalog.get(tool)?;
        let key = self.installed_key(tool, expression).ok_or_else(|| Error::NotInstalled {
            tool: tool.name.clone(),
            version: expression.to_string(),
        })?;

        if self.store.current(&tool.name).as_deref() == Some(key.as_str()) {
            debug!("{} {} is current, removing alias", tool.name, key);
            Activator::new(self.store, self.catalog).deactivate(&tool.name)?;
        }
        let dir = self.store.version_dir(&tool.name, &key);
        fs::remove_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
        info!("Uninstalled {} {}", tool.name, key);
        Ok(dir)
    }

    fn installed_key(&self, tool: &ToolDescriptor, expression: &str) -> Option<String> {
        let expr = VersionExpression::parse(expression, &DistributionAliases::default());
        let canonical = tool
            .canonical(ResolvedVersion::new(&expr.version, expr.distribution.as_deref()))
            .key();
        [canonical, expression.trim().to_string()]
            .into_iter()
            .find(|key| self.store.is_installed(&tool.name, key))
    }
}

fn url_file_name(url: &str) -> String {
    url.split(['?', '#'])
        .next()
        .unwrap_or(url)
        .rsplit('/')
        .find(|s| !s.is_empty())
        .unwrap_or("artifact")
        .to_string()
}

/// Stable per-version download name, so an interrupted transfer is resumed
/// by the next attempt.
fn artifact_name(tool: &str, key: &str, kind: ArtifactKind, url: &str) -> String {
    match kind {
        ArtifactKind::Zip => format!("{}-{}.zip", tool, key),
        ArtifactKind::TarGz => format!("{}-{}.tar.gz", tool, key),
        ArtifactKind::File => format!("{}-{}-{}", tool, key, url_file_name(url)),
    }
}
