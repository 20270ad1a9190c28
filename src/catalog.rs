use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use log::{debug, warn};
use crate::descriptor::ToolDescriptor;
use crate::error::{Error, Result};

const BUILTIN: &[(&str, &str)] = &[
    ("java", include_str!("../definitions/java.json")),
    ("node", include_str!("../definitions/node.json")),
    ("go", include_str!("../definitions/go.json")),
    ("rust", include_str!("../definitions/rust.json")),
    ("python", include_str!("../definitions/python.json")),
    ("scala", include_str!("../definitions/scala.json")),
    ("maven", include_str!("../definitions/maven.json")),
    ("gradle", include_str!("../definitions/gradle.json")),
    ("dotnet", include_str!("../definitions/dotnet.json")),
    ("ruby", include_str!("../definitions/ruby.json")),
];

/// The read-only set of tool descriptors, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tools: BTreeMap<String, ToolDescriptor>,
}

impl Catalog {
    /// Definitions shipped with the binary.
    pub fn builtin() -> Result<Self> {
        let mut catalog = Catalog::default();
        for (name, json) in BUILTIN {
            catalog.insert(ToolDescriptor::from_json(name, json)?);
        }
        Ok(catalog)
    }

    /// Built-ins overlaid with every `*.json` definition in `dir`.
    ///
    /// # Arguments
    /// * `dir` - Optional directory of user definitions. A user definition
    ///   replaces the built-in one with the same `name`.
    ///
    /// # Errors
    /// Returns [`Error::Catalog`] for a definition that does not parse, and
    /// [`Error::Io`] if the directory exists but cannot be read.
    pub fn load(dir: Option<&Path>) -> Result<Self> {
        let mut catalog = Self::builtin()?;
        if let Some(dir) = dir.filter(|d| d.is_dir()) {
            catalog.load_dir(dir)?;
        }
        Ok(catalog)
    }

    fn load_dir(&mut self, dir: &Path) -> Result<()> {
        let entries = fs::read_dir(dir).map_err(|e| Error::io(dir, e))?;
        let mut paths: Vec<_> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();
        for path in paths {
            let json = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
            let label = path.display().to_string();
            let tool = ToolDescriptor::from_json(&label, &json)?;
            if self.tools.contains_key(&tool.name) {
                debug!("{} overrides built-in {}", label, tool.name);
            }
            self.insert(tool);
        }
        Ok(())
    }

    pub fn insert(&mut self, tool: ToolDescriptor) {
        if tool.name.is_empty() {
            warn!("Skipping tool definition without a name");
            return;
        }
        self.tools.insert(tool.name.clone(), tool);
    }

    pub fn find(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(&name.to_ascii_lowercase())
    }

    /// Looks up a tool, failing with [`Error::UnknownTool`].
    pub fn get(&self, name: &str) -> Result<&ToolDescriptor> {
        self.find(name)
            .ok_or_else(|| Error::UnknownTool(name.to_string()))
    }

    /// All tools in name order.
    pub fn iter(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.values()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
