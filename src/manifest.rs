//! Jar manifest synthesis.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

/// Fixed location of the synthesized manifest, relative to the output folder.
pub const MANIFEST_RELATIVE_PATH: &str = "META-INF/MANIFEST.MF";

/// Write a manifest declaring `main_class` as the entry point and return its path.
pub fn write_manifest(base_dir: &Path, main_class: &str) -> Result<PathBuf> {
    let path = base_dir.join(MANIFEST_RELATIVE_PATH);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let content = format!("Manifest-Version: 1.0\nMain-Class: {}\n", main_class);
    fs::write(&path, content)
        .with_context(|| format!("failed to write manifest {}", path.display()))?;

    Ok(path)
}
