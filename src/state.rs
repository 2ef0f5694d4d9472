use std::{collections::BTreeMap, fs, path::Path};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One archive group's snapshot: relative path -> last-seen modification time.
/// BTreeMap keeps the serialized document stable across runs.
pub type FileSet = BTreeMap<String, DateTime<Utc>>;

/// One packaged file: where it sits relative to its group's base folder and
/// when it was last modified. Identity is the relative path alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveFile {
    pub relative_path: String,
    pub last_modified: DateTime<Utc>,
}

impl ArchiveFile {
    pub fn new(relative_path: impl AsRef<str>, last_modified: DateTime<Utc>) -> Self {
        Self {
            relative_path: normalize_separators(relative_path.as_ref()),
            last_modified,
        }
    }
}

/// Normalize path separators so `a\b\C.java` and `a/b/C.java` are the same key.
pub fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}

/// Selects one of the three independently-tracked archive groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Group {
    Sources,
    SourceOutputs,
    TestOutputs,
}

impl Group {
    /// Human-readable name used in progress lines.
    pub fn jar_description(&self) -> &'static str {
        match self {
            Group::Sources => "sources jar file",
            Group::SourceOutputs => "jar file",
            Group::TestOutputs => "tests jar file",
        }
    }
}

/// The staleness document persisted between runs.
///
/// Any of the maps and the project key may be absent in the document; absent
/// keys read as empty.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PackagingState {
    #[serde(default)]
    pub project: String,

    #[serde(default)]
    pub source_files: FileSet,

    #[serde(default)]
    pub source_output_files: FileSet,

    #[serde(default)]
    pub test_output_files: FileSet,
}

impl PackagingState {
    pub fn files(&self, group: Group) -> &FileSet {
        match group {
            Group::Sources => &self.source_files,
            Group::SourceOutputs => &self.source_output_files,
            Group::TestOutputs => &self.test_output_files,
        }
    }

    pub fn set_files(&mut self, group: Group, files: FileSet) {
        match group {
            Group::Sources => self.source_files = files,
            Group::SourceOutputs => self.source_output_files = files,
            Group::TestOutputs => self.test_output_files = files,
        }
    }

    /// Load the persisted document. A missing, unreadable, or unparsable
    /// document is `None`: packaging starts from empty and rebuilds everything.
    pub fn load(path: &Path) -> Result<Option<PackagingState>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("ignoring unreadable state document {}: {}", path.display(), err);
                return Ok(None);
            }
        };
        match serde_json::from_str(&content) {
            Ok(state) => Ok(Some(state)),
            Err(err) => {
                tracing::warn!("ignoring unparsable state document {}: {}", path.display(), err);
                Ok(None)
            }
        }
    }

    /// Atomically write the document: temp file in the same directory, then rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize packaging state")?;
        let temp_path = path.with_extension("tmp");

        fs::write(&temp_path, json)
            .with_context(|| format!("failed to write state document to {}", temp_path.display()))?;
        fs::rename(&temp_path, path)
            .with_context(|| format!("failed to move state document into {}", path.display()))?;

        Ok(())
    }
}
