//! Candidate file sets: what is on disk and eligible for each archive group.

use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use ignore::WalkBuilder;

use crate::state::{normalize_separators, ArchiveFile};

/// A candidate file: the snapshot entry plus its on-disk location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub file: ArchiveFile,
    pub path: PathBuf,
}

/// All files under `base` carrying `extension`, sorted lexically by relative
/// path. A missing base folder yields an empty set.
pub fn files_with_extension(base: &Path, extension: &str) -> Result<Vec<Candidate>> {
    if !base.is_dir() {
        return Ok(Vec::new());
    }

    let mut candidates = Vec::new();
    let walker = WalkBuilder::new(base)
        .standard_filters(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    for entry in walker {
        let entry = entry.with_context(|| format!("failed to scan {}", base.display()))?;
        if !entry.file_type().is_some_and(|kind| kind.is_file()) {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(extension) {
            continue;
        }

        let relative = path
            .strip_prefix(base)
            .with_context(|| format!("scanned file {} escapes {}", path.display(), base.display()))?;
        let modified = modified_at(path)?;

        candidates.push(Candidate {
            file: ArchiveFile::new(relative.to_string_lossy(), modified),
            path: path.to_path_buf(),
        });
    }

    candidates.sort_by(|a, b| a.file.relative_path.cmp(&b.file.relative_path));
    Ok(candidates)
}

/// Keep only compiled artifacts attributable to one of `sources`.
///
/// A compiled file corresponds to a source file when its relative path, with
/// the extension stripped and the final segment truncated at the first `$`
/// (the compiler's marker for inner and anonymous classes), equals a source
/// file's extension-stripped relative path. Artifacts from unrelated source
/// trees sharing the output folder drop out here.
pub fn attribute_outputs(outputs: Vec<Candidate>, sources: &[Candidate]) -> Vec<Candidate> {
    let source_stems: BTreeSet<&str> = sources
        .iter()
        .map(|candidate| strip_extension(&candidate.file.relative_path))
        .collect();

    outputs
        .into_iter()
        .filter(|candidate| source_stems.contains(attribution_key(&candidate.file.relative_path)))
        .collect()
}

fn modified_at(path: &Path) -> Result<DateTime<Utc>> {
    let metadata =
        fs::metadata(path).with_context(|| format!("failed to stat {}", path.display()))?;
    let modified = metadata
        .modified()
        .with_context(|| format!("no modification time for {}", path.display()))?;
    Ok(modified.into())
}

/// Drop the extension of the final path segment, leaving directories intact.
fn strip_extension(path: &str) -> &str {
    let name_start = path.rfind('/').map_or(0, |i| i + 1);
    match path[name_start..].rfind('.') {
        Some(dot) => &path[..name_start + dot],
        None => path,
    }
}

/// The source-file stem a compiled artifact belongs to: extension stripped,
/// final segment cut at the first `$`.
fn attribution_key(path: &str) -> &str {
    let stem = strip_extension(path);
    let name_start = stem.rfind('/').map_or(0, |i| i + 1);
    match stem[name_start..].find('$') {
        Some(marker) => &stem[..name_start + marker],
        None => stem,
    }
}
