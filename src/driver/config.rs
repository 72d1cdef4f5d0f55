use serde::{Deserialize, Serialize};

use crate::ir::lowering::LowerOptions;

/// A project config file. Namely Sable.toml.
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Config {
    pub package: Package,
    #[serde(default)]
    pub build: CompileOptions,
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

/// Meta information about the package.
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Package {
    /// The name of the package.
    pub name: String,
    /// The SEMVER compatible version of the package.
    pub version: String,
}

/// Per-invocation pipeline options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileOptions {
    /// Backends to emit through, in order. Output is keyed by backend id.
    pub backends: Vec<String>,
    /// Seed for the deterministic node id generator.
    pub id_seed: u64,
    /// Host-imposed node-count budget; the module is discarded when
    /// exceeded.
    pub node_budget: Option<usize>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            backends: vec!["lua".to_string()],
            id_seed: 1,
            node_budget: None,
        }
    }
}

impl CompileOptions {
    pub fn lower_options(&self) -> LowerOptions {
        LowerOptions {
            id_seed: self.id_seed,
            node_budget: self.node_budget,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_parses_with_defaults() {
        let config = Config::from_toml(
            r#"
[package]
name = "demo"
version = "0.1.0"
"#,
        )
        .expect("parses");
        assert_eq!(config.package.name, "demo");
        assert_eq!(config.build.backends, vec!["lua".to_string()]);
        assert_eq!(config.build.id_seed, 1);
    }

    #[test]
    fn build_section_overrides() {
        let config = Config::from_toml(
            r#"
[package]
name = "demo"
version = "0.1.0"

[build]
backends = ["lua", "stack"]
id_seed = 100
node_budget = 5000
"#,
        )
        .expect("parses");
        assert_eq!(config.build.backends.len(), 2);
        assert_eq!(config.build.node_budget, Some(5000));
    }
}
