use serde_json::Value;

/// How a declaration file encodes a version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclarationFormat {
    /// First meaningful line is the version, e.g. `.nvmrc` or `.java-version`.
    PlainText,
    /// A line `<keyword> <version>`, e.g. `go 1.21` in `go.mod`.
    BuildManifest { keyword: String },
    /// A JSON document with the version at a pointer, e.g. `/sdk/version`.
    StructuredJson { pointer: String },
    /// `[toolchain] channel = "..."`, falling back to a bare channel line.
    ToolchainPin,
    /// `key=value` lines; only the part before the first `.` is kept, since
    /// these pin vendor patch builds (`java=21.0.2-tem` → `21`).
    KeyValue { key: String },
}

impl DeclarationFormat {
    /// The format for a declaration file name.
    pub fn for_file(file_name: &str, tool: &str) -> Self {
        match file_name {
            "go.mod" => DeclarationFormat::BuildManifest {
                keyword: "go".to_string(),
            },
            "global.json" => DeclarationFormat::StructuredJson {
                pointer: "/sdk/version".to_string(),
            },
            "rust-toolchain.toml" | "rust-toolchain" => DeclarationFormat::ToolchainPin,
            ".sdkmanrc" => DeclarationFormat::KeyValue {
                key: tool.to_string(),
            },
            _ => DeclarationFormat::PlainText,
        }
    }

    /// Extracts the version, `None` when the content does not declare one.
    pub fn parse(&self, content: &str) -> Option<String> {
        let version = match self {
            DeclarationFormat::PlainText => plain_text(content),
            DeclarationFormat::BuildManifest { keyword } => build_manifest(content, keyword),
            DeclarationFormat::StructuredJson { pointer } => structured_json(content, pointer),
            DeclarationFormat::ToolchainPin => toolchain_pin(content),
            DeclarationFormat::KeyValue { key } => key_value(content, key),
        }?;
        let version = version.trim();
        (!version.is_empty()).then(|| version.to_string())
    }
}

fn meaningful_lines(content: &str) -> impl Iterator<Item = &str> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
}

fn plain_text(content: &str) -> Option<String> {
    let line = meaningful_lines(content).next()?;
    Some(line.strip_prefix('v').unwrap_or(line).to_string())
}

fn build_manifest(content: &str, keyword: &str) -> Option<String> {
    meaningful_lines(content).find_map(|line| {
        let rest = line.strip_prefix(keyword)?;
        if !rest.starts_with(char::is_whitespace) {
            return None;
        }
        rest.split_whitespace().next().map(str::to_string)
    })
}

fn structured_json(content: &str, pointer: &str) -> Option<String> {
    let value: Value = serde_json::from_str(content).ok()?;
    value.pointer(pointer)?.as_str().map(str::to_string)
}

fn toolchain_pin(content: &str) -> Option<String> {
    if let Ok(doc) = toml::from_str::<toml::Table>(content) {
        if let Some(channel) = doc
            .get("toolchain")
            .and_then(|t| t.get("channel"))
            .and_then(|c| c.as_str())
        {
            return Some(channel.to_string());
        }
        if doc.contains_key("toolchain") {
            return None;
        }
    }
    let line = meaningful_lines(content).next()?;
    (!line.contains('=') && !line.starts_with('[')).then(|| line.to_string())
}

fn key_value(content: &str, key: &str) -> Option<String> {
    meaningful_lines(content).find_map(|line| {
        let (k, v) = line.split_once('=')?;
        if k.trim() != key {
            return None;
        }
        let v = v.trim();
        Some(v.split('.').next().unwrap_or(v).to_string())
    })
}
