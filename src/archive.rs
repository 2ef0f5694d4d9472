//! Archive creation: one capability, two implementations.
//!
//! `JarTool` shells out to the `jar` executable; `FakeTool` writes a
//! deterministic listing instead, so orchestration and staleness logic can be
//! exercised without the external tool installed. Callers hold an
//! `ArchiveTool` and never learn which one they have.

mod fake;
mod jar;

pub use fake::FakeTool;
pub use jar::JarTool;

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Result;
use thiserror::Error;

use crate::process::ProcessRunner;

/// Extension appended to every archive's base name.
pub const ARCHIVE_EXTENSION: &str = "jar";

/// Using an archive tool before it is fully configured.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArchiveError {
    #[error("archive base folder was never set")]
    MissingBaseDir,
    #[error("archive name was never set")]
    MissingName,
    #[error("archive content files were never set")]
    MissingContents,
}

/// What one archive-creation call produced.
#[derive(Debug, Clone)]
pub struct ArchiveOutcome {
    /// The output archive. May not exist on disk if the tool failed.
    pub file: PathBuf,
    /// The tool's exit status; zero on success.
    pub status: i32,
}

/// Configuration for one archive-creation call, populated builder-style.
///
/// The base folder, name, and content set are required; `create` reports the
/// first missing one as a configuration error. The content set may be set to
/// an explicitly empty list.
#[derive(Debug, Clone, Default)]
pub struct ArchiveRequest {
    base_dir: Option<PathBuf>,
    name: Option<String>,
    manifest: Option<PathBuf>,
    contents: Option<Vec<PathBuf>>,
}

impl ArchiveRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folder all relative paths are computed against; the tool's working folder.
    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Archive base name; the extension is appended internally.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Optional manifest file recorded specially in the archive.
    pub fn manifest(mut self, file: Option<PathBuf>) -> Self {
        self.manifest = file;
        self
    }

    /// The payload files.
    pub fn contents(mut self, files: Vec<PathBuf>) -> Self {
        self.contents = Some(files);
        self
    }

    /// Checked view used by the tool implementations.
    fn validated(&self) -> Result<ValidRequest<'_>, ArchiveError> {
        let base_dir = self.base_dir.as_deref().ok_or(ArchiveError::MissingBaseDir)?;
        let name = match self.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => return Err(ArchiveError::MissingName),
        };
        let contents = self.contents.as_deref().ok_or(ArchiveError::MissingContents)?;

        Ok(ValidRequest {
            base_dir,
            name,
            manifest: self.manifest.as_deref(),
            contents,
        })
    }
}

struct ValidRequest<'a> {
    base_dir: &'a Path,
    name: &'a str,
    manifest: Option<&'a Path>,
    contents: &'a [PathBuf],
}

impl ValidRequest<'_> {
    fn archive_file_name(&self) -> String {
        format!("{}.{}", self.name, ARCHIVE_EXTENSION)
    }

    fn output_file(&self) -> PathBuf {
        self.base_dir.join(self.archive_file_name())
    }
}

/// Strip the base folder from an absolute path; relative paths pass through.
fn relative_to<'a>(path: &'a Path, base: &Path) -> &'a Path {
    path.strip_prefix(base).unwrap_or(path)
}

pub trait ArchiveTool {
    /// Create the archive described by `request`.
    ///
    /// Configuration errors are `Err`. A tool that ran but exited non-zero is
    /// `Ok` with the status in the outcome, so one failed archive never stops
    /// the others. Child output is forwarded to `out`/`err` only in verbose
    /// mode.
    fn create(
        &self,
        request: &ArchiveRequest,
        runner: &dyn ProcessRunner,
        out: &mut dyn Write,
        err: &mut dyn Write,
        verbose: bool,
    ) -> Result<ArchiveOutcome>;
}
