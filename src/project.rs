//! Project descriptor and the well-known folder layout.

use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Descriptor file expected at the project root.
pub const DESCRIPTOR_FILE: &str = "project.json";

/// Staleness document kept next to the descriptor, outside `outputs/`.
const STATE_FILE: &str = ".jarpack.json";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Descriptor {
    name: String,
    #[serde(default)]
    main_class: Option<String>,
}

/// A project rooted at a folder containing `project.json` plus the
/// `sources/`, `tests/`, `outputs/` layout.
#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
    descriptor: Descriptor,
}

impl Project {
    /// Read and validate the descriptor. An unreadable descriptor is fatal.
    pub fn load(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let path = root.join(DESCRIPTOR_FILE);

        let content = fs::read_to_string(&path)
            .with_context(|| format!("failed to read project descriptor {}", path.display()))?;
        let descriptor: Descriptor = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse project descriptor {}", path.display()))?;

        if descriptor.name.trim().is_empty() {
            anyhow::bail!("project descriptor {} has an empty project name", path.display());
        }

        tracing::debug!("loaded project {} from {}", descriptor.name, path.display());
        Ok(Self { root, descriptor })
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn main_class(&self) -> Option<&str> {
        self.descriptor.main_class.as_deref()
    }

    pub fn sources_dir(&self) -> PathBuf {
        self.root.join("sources")
    }

    pub fn tests_dir(&self) -> PathBuf {
        self.root.join("tests")
    }

    pub fn outputs_dir(&self) -> PathBuf {
        self.root.join("outputs")
    }

    pub fn state_path(&self) -> PathBuf {
        self.root.join(STATE_FILE)
    }
}
