use std::collections::{BTreeMap, HashSet};
use log::debug;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use crate::error::{Error, Result};
use crate::fetch::{Fetcher, check_status, request_error};
use crate::matcher::{self, DistributionAliases, MatchError, ResolvedVersion, looks_partial};
use crate::util::{current_arch, current_os, is_hex};

/// A vendor variant of a tool sharing version numbers with its siblings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Distribution {
    /// Display name, e.g. `Eclipse Temurin`.
    #[serde(default)]
    pub display_name: String,
    /// Download URL template used instead of the tool's base template.
    pub download_url: String,
    #[serde(default)]
    pub checksum_url: Option<String>,
}

/// How a downloaded artifact becomes an install directory.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub enum ArtifactKind {
    #[serde(rename = "zip")]
    Zip,
    #[serde(rename = "tar.gz", alias = "tgz")]
    TarGz,
    /// A single executable or file, moved into place as-is.
    #[serde(rename = "file")]
    File,
}

impl ArtifactKind {
    /// Infers the kind from a URL's file name. Extension-less URLs get the
    /// platform's usual archive: zip on Windows, tar.gz elsewhere.
    pub fn from_url(url: &str) -> Self {
        let name = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            ArtifactKind::TarGz
        } else if name.ends_with(".zip") {
            ArtifactKind::Zip
        } else if name.ends_with(".exe") || name.ends_with(".jar") || name.ends_with(".sh") {
            ArtifactKind::File
        } else if cfg!(windows) {
            ArtifactKind::Zip
        } else {
            ArtifactKind::TarGz
        }
    }
}

/// A declarative description of one managed tool.
///
/// Loaded once from the catalog and never mutated afterwards.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    /// Endpoint listing available versions; empty means versions pass through.
    #[serde(default)]
    pub releases_url: String,
    /// Field holding the version in listing objects.
    #[serde(default = "default_version_field")]
    pub version_field: String,
    /// Prefix stripped from listed versions, e.g. `maven-`.
    #[serde(default)]
    pub version_prefix: String,
    #[serde(default)]
    pub download_url: String,
    #[serde(default)]
    pub download_type: Option<ArtifactKind>,
    /// Template for a checksum file next to the artifact.
    #[serde(default)]
    pub checksum_url: Option<String>,
    #[serde(default)]
    pub version_regex: String,
    /// Declaration files, highest priority first.
    #[serde(default)]
    pub version_files: Vec<String>,
    /// Environment variable → path relative to the install root (`.` is the root).
    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,
    /// Directories relative to the install root exposed on the search path.
    #[serde(default)]
    pub path_dirs: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub distributions: BTreeMap<String, Distribution>,
    #[serde(default)]
    pub default_distribution: String,
    /// Versions known without asking the listing endpoint.
    #[serde(default)]
    pub static_versions: Vec<String>,
    /// Vendor spelling of `{os}` tokens, e.g. `mac` → `darwin`.
    #[serde(default)]
    pub os_names: BTreeMap<String, String>,
    /// Vendor spelling of `{arch}` tokens, e.g. `x64` → `amd64`.
    #[serde(default)]
    pub arch_names: BTreeMap<String, String>,
}

fn default_version_field() -> String {
    "version".to_string()
}

impl ToolDescriptor {
    /// Parses a JSON tool definition.
    pub fn from_json(name: &str, json: &str) -> Result<Self> {
        let descriptor: ToolDescriptor = serde_json::from_str(json).map_err(|e| Error::Catalog {
            name: name.to_string(),
            message: e.to_string(),
        })?;
        if !descriptor.version_regex.is_empty() {
            Regex::new(&descriptor.version_regex).map_err(|e| Error::Catalog {
                name: descriptor.name.clone(),
                message: format!("bad versionRegex: {}", e),
            })?;
        }
        Ok(descriptor)
    }

    pub fn display_name(&self) -> &str {
        if self.display_name.is_empty() {
            &self.name
        } else {
            &self.display_name
        }
    }

    /// Checks a version string against the tool's validation rule.
    /// A distribution suffix is ignored; an empty rule accepts everything.
    pub fn validate_version(&self, version: &str) -> bool {
        if self.version_regex.is_empty() {
            return true;
        }
        let expr = matcher::VersionExpression::parse(version, &DistributionAliases::default());
        match Regex::new(&self.version_regex) {
            Ok(re) => re.is_match(&expr.version) || re.is_match(version),
            Err(_) => false,
        }
    }

    /// Canonical distribution to use: the normalised request, else the default,
    /// else the first configured one. `None` for tools without distributions.
    pub fn distribution_for(&self, requested: Option<&str>) -> Option<String> {
        if self.distributions.is_empty() {
            return requested.map(|d| DistributionAliases::default().normalize(d));
        }
        let aliases = DistributionAliases::default();
        match requested.filter(|d| !d.is_empty()) {
            Some(dist) => Some(aliases.normalize(dist)),
            None if !self.default_distribution.is_empty() => {
                Some(aliases.normalize(&self.default_distribution))
            }
            None => self.distributions.keys().next().cloned(),
        }
    }

    /// Fills in the default distribution for tools that have distributions, so
    /// `21` and `21-temurin` name the same install directory.
    pub fn canonical(&self, resolved: ResolvedVersion) -> ResolvedVersion {
        if self.distributions.is_empty() {
            return resolved;
        }
        let distribution = self.distribution_for(resolved.distribution.as_deref());
        ResolvedVersion {
            distribution,
            ..resolved
        }
    }

    pub fn distribution_display_name(&self, dist: &str) -> String {
        let dist = DistributionAliases::default().normalize(dist);
        match self.distributions.get(&dist) {
            Some(d) if !d.display_name.is_empty() => d.display_name.clone(),
            _ => dist,
        }
    }

    /// Download URL for a version and optional distribution.
    pub fn url_for(&self, version: &str, distribution: Option<&str>) -> String {
        let template = self
            .distribution_for(distribution)
            .and_then(|dist| self.distributions.get(&dist))
            .map(|d| d.download_url.as_str())
            .unwrap_or(&self.download_url);
        self.expand(template, version)
    }

    /// Checksum URL for a version, preferring the distribution's own template.
    pub fn checksum_url_for(&self, version: &str, distribution: Option<&str>) -> Option<String> {
        self.distribution_for(distribution)
            .and_then(|dist| self.distributions.get(&dist))
            .and_then(|d| d.checksum_url.as_deref())
            .or(self.checksum_url.as_deref())
            .filter(|t| !t.is_empty())
            .map(|t| self.expand(t, version))
    }

    /// Expected SHA-256 for an artifact, when the tool publishes checksums.
    ///
    /// # Errors
    /// [`Error::ChecksumUnavailable`] when a checksum URL is configured but the
    /// file cannot be fetched or holds no SHA-256 digest.
    pub fn checksum_for(
        &self,
        version: &str,
        distribution: Option<&str>,
        fetcher: &Fetcher,
    ) -> Result<Option<String>> {
        let Some(url) = self.checksum_url_for(version, distribution) else {
            return Ok(None);
        };
        debug!("Fetching checksum for {} {} from {}", self.name, version, url);
        let unavailable = |message: String| Error::ChecksumUnavailable {
            tool: self.name.clone(),
            version: version.to_string(),
            url: url.clone(),
            message,
        };
        let digest = fetcher
            .fetch_checksum(&url)
            .map_err(|e| unavailable(e.to_string()))?;
        if digest.len() != 64 || !is_hex(&digest) {
            return Err(unavailable("response holds no SHA-256 digest".to_string()));
        }
        Ok(Some(digest))
    }

    fn expand(&self, template: &str, version: &str) -> String {
        let os = current_os();
        let arch = current_arch();
        let os = self.os_names.get(os).map(String::as_str).unwrap_or(os);
        let arch = self.arch_names.get(arch).map(String::as_str).unwrap_or(arch);
        expand_template(template, version, os, arch)
    }

    pub fn artifact_kind(&self, url: &str) -> ArtifactKind {
        self.download_type.unwrap_or_else(|| ArtifactKind::from_url(url))
    }

    /// Lists versions from the static list and the listing endpoint, in that
    /// order, without duplicates.
    pub fn fetch_versions(&self, fetcher: &Fetcher) -> Result<Vec<String>> {
        let mut versions = self.static_versions.clone();
        if !self.releases_url.is_empty() {
            match self.fetch_remote_versions(fetcher) {
                Ok(remote) => versions.extend(remote),
                Err(err) if !versions.is_empty() => {
                    debug!("Listing {} failed, using static versions: {}", self.name, err);
                }
                Err(err) => return Err(err),
            }
        }
        let mut seen = HashSet::new();
        versions.retain(|v| seen.insert(v.clone()));
        Ok(versions)
    }

    fn fetch_remote_versions(&self, fetcher: &Fetcher) -> Result<Vec<String>> {
        let url = &self.releases_url;
        debug!("Fetching {} versions from {}", self.name, url);
        let response = fetcher
            .client()
            .get(url)
            .send()
            .map_err(|e| request_error(url, e))?;
        let body = check_status(url, response)?
            .text()
            .map_err(|e| request_error(url, e))?;
        self.parse_versions(&body)
    }

    /// Extracts version strings from a listing body.
    pub fn parse_versions(&self, body: &str) -> Result<Vec<String>> {
        let value: Value = serde_json::from_str(body).map_err(|e| Error::Catalog {
            name: self.name.clone(),
            message: format!("unreadable version listing: {}", e),
        })?;
        let items = match &value {
            Value::Array(items) => items.clone(),
            Value::Object(map) => {
                let fields = [
                    self.version_field.as_str(),
                    "versions",
                    "releases",
                    "available_releases",
                    "available_lts_releases",
                    "releases-index",
                ];
                fields
                    .iter()
                    .filter_map(|f| map.get(*f))
                    .find_map(|v| v.as_array().filter(|a| !a.is_empty()).cloned())
                    .unwrap_or_default()
            }
            _ => Vec::new(),
        };
        Ok(items.iter().filter_map(|item| self.extract_version(item)).collect())
    }

    fn extract_version(&self, item: &Value) -> Option<String> {
        let raw = match item {
            Value::String(s) => s.clone(),
            Value::Number(n) => return Some(n.to_string()),
            Value::Object(map) => match map.get(&self.version_field)? {
                Value::String(s) => s.clone(),
                Value::Number(n) => return Some(n.to_string()),
                _ => return None,
            },
            _ => return None,
        };
        let ver = raw.strip_prefix('v').unwrap_or(&raw);
        let ver = if self.version_prefix.is_empty() {
            ver
        } else {
            ver.strip_prefix(self.version_prefix.as_str()).unwrap_or(ver)
        };
        (!ver.is_empty()).then(|| ver.to_string())
    }

    /// Resolves an expression using the catalog's version listing.
    ///
    /// Without a listing endpoint the expression passes through. When the listing
    /// cannot be fetched, partial-looking expressions fail and complete-looking
    /// ones pass through.
    pub fn resolve_version(&self, expression: &str, fetcher: &Fetcher) -> Result<ResolvedVersion> {
        let aliases = DistributionAliases::default();
        if self.releases_url.is_empty() && self.static_versions.is_empty() {
            let expr = matcher::VersionExpression::parse(expression, &aliases);
            if expr.version.is_empty() {
                return self.resolve_against(expression, &[], &aliases);
            }
            return Ok(ResolvedVersion::new(&expr.version, expr.distribution.as_deref()));
        }
        let known = match self.fetch_versions(fetcher) {
            Ok(known) => known,
            Err(err) => {
                let expr = matcher::VersionExpression::parse(expression, &aliases);
                if looks_partial(&expr.version) {
                    return Err(err);
                }
                debug!("Could not list {} versions, trying {} as-is: {}", self.name, expression, err);
                Vec::new()
            }
        };
        let known = self.filter_valid(known);
        self.resolve_against(expression, &known, &aliases)
    }

    /// Runs the matcher against an already known list.
    pub fn resolve_against(
        &self,
        expression: &str,
        known: &[String],
        aliases: &DistributionAliases,
    ) -> Result<ResolvedVersion> {
        matcher::resolve(expression, known, aliases).map_err(|e| match e {
            MatchError::Empty => Error::InvalidExpression {
                tool: self.name.clone(),
                version: expression.to_string(),
                reason: "empty version".to_string(),
            },
            MatchError::NotFound(expression) => Error::NotFound {
                tool: self.name.clone(),
                expression,
            },
        })
    }

    fn filter_valid(&self, versions: Vec<String>) -> Vec<String> {
        let Ok(re) = Regex::new(&self.version_regex) else {
            return versions;
        };
        if self.version_regex.is_empty() {
            return versions;
        }
        versions
            .into_iter()
            .filter(|v| re.is_match(v) || re.is_match(&format!("v{}", v)))
            .collect()
    }
}

/// Substitutes `{version}`, `{majorVersion}`, `{os}`, `{arch}` and `{ext}`
/// (`zip` on Windows, `tar.gz` elsewhere).
pub fn expand_template(template: &str, version: &str, os: &str, arch: &str) -> String {
    let major = version.split('.').next().unwrap_or(version);
    let ext = if cfg!(windows) { "zip" } else { "tar.gz" };
    template
        .replace("{version}", version)
        .replace("{majorVersion}", major)
        .replace("{os}", os)
        .replace("{arch}", arch)
        .replace("{ext}", ext)
}
