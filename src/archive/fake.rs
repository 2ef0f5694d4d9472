//! Deterministic stand-in for the external jar tool.
//!
//! Writes a textual listing of what the real tool would have packaged, so
//! orchestration, staleness, and file-selection logic can be tested without
//! `jar` installed. Never spawns a process, always exits zero.

use std::{fs, io::Write};

use anyhow::{Context, Result};

use super::{relative_to, ArchiveOutcome, ArchiveRequest, ArchiveTool};
use crate::process::ProcessRunner;
use crate::state::normalize_separators;

#[derive(Debug, Clone, Copy)]
pub struct FakeTool;

impl ArchiveTool for FakeTool {
    fn create(
        &self,
        request: &ArchiveRequest,
        _runner: &dyn ProcessRunner,
        _out: &mut dyn Write,
        _err: &mut dyn Write,
        _verbose: bool,
    ) -> Result<ArchiveOutcome> {
        let valid = request.validated()?;

        // Manifest section first, then contents, separated by a blank line.
        let mut listing = String::new();
        if let Some(manifest) = valid.manifest {
            listing.push_str(&normalize_separators(
                &relative_to(manifest, valid.base_dir).to_string_lossy(),
            ));
            listing.push('\n');
            listing.push('\n');
        }
        for file in valid.contents {
            listing.push_str(&normalize_separators(
                &relative_to(file, valid.base_dir).to_string_lossy(),
            ));
            listing.push('\n');
        }

        let file = valid.output_file();
        fs::write(&file, listing)
            .with_context(|| format!("failed to write archive listing {}", file.display()))?;

        Ok(ArchiveOutcome { file, status: 0 })
    }
}
