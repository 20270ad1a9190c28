//! Version expression matching.
//!
//! Resolves user-supplied expressions such as `20`, `v20.9`, `2.13.x` or `21-tem`
//! against a list of known version strings. Everything here is pure: no network,
//! no filesystem.

use std::fmt;
use serde::Serialize;
use thiserror::Error;
use crate::util::compare_versions;

/// Why an expression could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    #[error("empty version expression")]
    Empty,
    #[error("no version found matching '{0}'")]
    NotFound(String),
}

/// Maps distribution suffix tokens to canonical distribution names.
///
/// Matching is exact and case-insensitive on the whole token.
#[derive(Debug, Clone)]
pub struct DistributionAliases {
    table: Vec<(String, String)>,
}

impl Default for DistributionAliases {
    fn default() -> Self {
        let table = [
            ("tem", "temurin"),
            ("temurin", "temurin"),
            ("amzn", "corretto"),
            ("corretto", "corretto"),
            ("zulu", "zulu"),
            ("graal", "graalce"),
            ("graalce", "graalce"),
        ];
        Self {
            table: table
                .iter()
                .map(|(alias, name)| (alias.to_string(), name.to_string()))
                .collect(),
        }
    }
}

impl DistributionAliases {
    /// Adds or replaces an alias.
    pub fn with_alias(mut self, alias: &str, canonical: &str) -> Self {
        let alias = alias.to_ascii_lowercase();
        self.table.retain(|(a, _)| *a != alias);
        self.table.push((alias, canonical.to_ascii_lowercase()));
        self
    }

    /// Canonical name for a known alias, `None` for anything else.
    pub fn canonical(&self, token: &str) -> Option<&str> {
        self.table
            .iter()
            .find(|(alias, _)| alias.eq_ignore_ascii_case(token))
            .map(|(_, name)| name.as_str())
    }

    /// Canonical name for a known alias; unknown names are lowercased and passed through.
    pub fn normalize(&self, dist: &str) -> String {
        self.canonical(dist)
            .map(str::to_string)
            .unwrap_or_else(|| dist.to_ascii_lowercase())
    }
}

/// A parsed, never-mutated version request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionExpression {
    /// Version part with any leading `v` and distribution suffix removed.
    pub version: String,
    /// Canonical distribution name if a known suffix was present.
    pub distribution: Option<String>,
}

impl VersionExpression {
    pub fn parse(raw: &str, aliases: &DistributionAliases) -> Self {
        let raw = raw.trim();
        let raw = raw.strip_prefix('v').unwrap_or(raw);
        if let Some((head, tail)) = raw.rsplit_once('-') {
            if !head.is_empty() {
                if let Some(dist) = aliases.canonical(tail) {
                    return Self {
                        version: head.to_string(),
                        distribution: Some(dist.to_string()),
                    };
                }
            }
        }
        Self {
            version: raw.to_string(),
            distribution: None,
        }
    }

    /// True for a trailing `.x`, `.X` or `.*`.
    pub fn is_wildcard(&self) -> bool {
        is_wildcard(&self.version)
    }

    /// The version with any wildcard suffix stripped.
    pub fn prefix(&self) -> &str {
        strip_wildcard(&self.version)
    }

    /// Heuristic for under-specified expressions: wildcards and two-component
    /// versions are partial; a single bare component or three or more are
    /// treated as complete.
    pub fn looks_partial(&self) -> bool {
        looks_partial(&self.version)
    }
}

/// A concrete version plus optional distribution; the only form accepted by the
/// fetcher and activation engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ResolvedVersion {
    pub version: String,
    pub distribution: Option<String>,
}

impl ResolvedVersion {
    pub fn new(version: &str, distribution: Option<&str>) -> Self {
        Self {
            version: version.to_string(),
            distribution: distribution.map(str::to_string),
        }
    }

    /// Directory name under `<root>/<tool>/`: `version` or `version-distribution`.
    pub fn key(&self) -> String {
        match &self.distribution {
            Some(dist) => format!("{}-{}", self.version, dist),
            None => self.version.clone(),
        }
    }
}

impl fmt::Display for ResolvedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

pub fn is_wildcard(v: &str) -> bool {
    v.ends_with(".x") || v.ends_with(".X") || v.ends_with(".*")
}

pub fn strip_wildcard(v: &str) -> &str {
    v.strip_suffix(".x")
        .or_else(|| v.strip_suffix(".X"))
        .or_else(|| v.strip_suffix(".*"))
        .unwrap_or(v)
}

pub fn looks_partial(v: &str) -> bool {
    let v = v.strip_prefix('v').unwrap_or(v);
    if is_wildcard(v) {
        return true;
    }
    v.split('.').count() == 2
}

/// Resolves `expression` against `known` versions.
///
/// Exact matches win immediately. Otherwise the newest version equal to the
/// prefix or starting with `prefix.` / `prefix-` is picked, falling back to
/// first-component matching for bare majors. With no candidates, partial-looking
/// expressions fail and complete-looking ones pass through unchanged so the
/// download attempt can act as the real validation.
pub fn resolve(
    expression: &str,
    known: &[String],
    aliases: &DistributionAliases,
) -> Result<ResolvedVersion, MatchError> {
    let expr = VersionExpression::parse(expression, aliases);
    if expr.version.is_empty() {
        return Err(MatchError::Empty);
    }
    let dist = expr.distribution.as_deref();

    if !expr.is_wildcard() && known.iter().any(|v| *v == expr.version) {
        return Ok(ResolvedVersion::new(&expr.version, dist));
    }

    let prefix = expr.prefix();
    if prefix.is_empty() {
        return Err(MatchError::Empty);
    }
    let dotted = format!("{}.", prefix);
    let dashed = format!("{}-", prefix);
    let mut candidates: Vec<&String> = known
        .iter()
        .filter(|v| *v == prefix || v.starts_with(&dotted) || v.starts_with(&dashed))
        .collect();

    if candidates.is_empty() && !prefix.contains('.') {
        candidates = known
            .iter()
            .filter(|v| v.split('.').next() == Some(prefix))
            .collect();
    }

    if let Some(best) = candidates
        .into_iter()
        .max_by(|a, b| compare_versions(a, b))
    {
        return Ok(ResolvedVersion::new(best, dist));
    }

    if expr.looks_partial() {
        return Err(MatchError::NotFound(expression.trim().to_string()));
    }
    Ok(ResolvedVersion::new(prefix, dist))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn versions(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn resolve_default(expr: &str, known: &[String]) -> Result<ResolvedVersion, MatchError> {
        resolve(expr, known, &DistributionAliases::default())
    }

    #[test]
    fn test_exact_member_resolves_to_itself() {
        let known = versions(&["20.10.0", "20.9.0", "18.19.0"]);
        for v in &known {
            assert_eq!(resolve_default(v, &known).unwrap().version, *v);
        }
    }

    #[test]
    fn test_major_picks_newest_numerically() {
        let known = versions(&["20.10.0", "20.9.0", "18.19.0"]);
        assert_eq!(resolve_default("20", &known).unwrap().version, "20.10.0");
    }

    #[test]
    fn test_minor_prefix() {
        let known = versions(&["20.10.0", "20.9.1", "20.9.0"]);
        assert_eq!(resolve_default("20.9", &known).unwrap().version, "20.9.1");
    }

    #[test]
    fn test_leading_v_is_stripped() {
        let known = versions(&["20.10.0", "20.9.0"]);
        assert_eq!(resolve_default("v20", &known).unwrap().version, "20.10.0");
    }

    #[test]
    fn test_wildcards_equal_plain_prefix() {
        let known = versions(&["2.13.18", "2.13.12", "2.12.19"]);
        let plain = resolve_default("2.13", &known).unwrap();
        for expr in ["2.13.x", "2.13.X", "2.13.*"] {
            assert_eq!(resolve_default(expr, &known).unwrap(), plain);
        }
        assert_eq!(plain.version, "2.13.18");
    }

    #[test]
    fn test_wildcard_never_short_circuits_on_exact() {
        // "20.x" is not itself a member even if someone published it.
        let known = versions(&["20.x", "20.18.0", "20.10.0"]);
        assert_eq!(resolve_default("20.x", &known).unwrap().version, "20.18.0");
    }

    #[test]
    fn test_bare_major_passes_through() {
        let known = versions(&["20.10.0", "18.19.0"]);
        assert_eq!(resolve_default("99", &known).unwrap().version, "99");
    }

    #[test]
    fn test_partial_without_match_fails() {
        let known = versions(&["20.10.0", "18.19.0"]);
        assert_eq!(
            resolve_default("99.1", &known),
            Err(MatchError::NotFound("99.1".to_string()))
        );
        assert!(resolve_default("99.x", &known).is_err());
    }

    #[test]
    fn test_full_version_without_match_passes_through() {
        let known = versions(&["20.10.0"]);
        assert_eq!(resolve_default("21.1.0", &known).unwrap().version, "21.1.0");
    }

    #[test]
    fn test_major_matches_build_qualified_versions() {
        let known = versions(&["21.0.1+12", "21.0.2+13", "17"]);
        assert_eq!(resolve_default("21", &known).unwrap().version, "21.0.2+13");
        assert_eq!(resolve_default("17", &known).unwrap().version, "17");
    }

    #[test]
    fn test_dash_suffixed_candidates() {
        let known = versions(&["3.12.0-rc1", "3.11.4"]);
        assert_eq!(resolve_default("3.12", &known).unwrap().version, "3.12.0-rc1");
    }

    #[test]
    fn test_distribution_suffix() {
        let known = versions(&["21.0.2", "21.0.1", "17.0.9"]);
        let resolved = resolve_default("21-tem", &known).unwrap();
        assert_eq!(resolved.version, "21.0.2");
        assert_eq!(resolved.distribution.as_deref(), Some("temurin"));
        assert_eq!(resolved.key(), "21.0.2-temurin");
    }

    #[test]
    fn test_parse_expression_distributions() {
        let aliases = DistributionAliases::default();
        let cases = [
            ("21", "21", None),
            ("21-tem", "21", Some("temurin")),
            ("21-AMZN", "21", Some("corretto")),
            ("17.0.9-zulu", "17.0.9", Some("zulu")),
            ("21-unknown", "21-unknown", None),
            ("21-beta-tem", "21-beta", Some("temurin")),
        ];
        for (input, version, dist) in cases {
            let expr = VersionExpression::parse(input, &aliases);
            assert_eq!(expr.version, version, "{input}");
            assert_eq!(expr.distribution.as_deref(), dist, "{input}");
        }
    }

    #[test]
    fn test_empty_expression() {
        assert_eq!(resolve_default("", &[]), Err(MatchError::Empty));
        assert_eq!(resolve_default("v", &[]), Err(MatchError::Empty));
    }

    #[test]
    fn test_looks_partial_heuristic() {
        assert!(looks_partial("2.13"));
        assert!(looks_partial("20.x"));
        assert!(!looks_partial("21"));
        assert!(!looks_partial("2.13.12"));
    }

    #[test]
    fn test_normalize_unknown_distribution() {
        let aliases = DistributionAliases::default().with_alias("sem", "semeru");
        assert_eq!(aliases.normalize("TEM"), "temurin");
        assert_eq!(aliases.normalize("sem"), "semeru");
        assert_eq!(aliases.normalize("Other"), "other");
    }
}
