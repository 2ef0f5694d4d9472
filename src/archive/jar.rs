//! Archive creation backed by the external `jar` executable.

use std::{ffi::OsString, io::Write, path::Path};

use anyhow::Result;

use super::{relative_to, ArchiveOutcome, ArchiveRequest, ArchiveTool};
use crate::process::ProcessRunner;

/// Executable expected on the PATH.
const JAR_PROGRAM: &str = "jar";

#[derive(Debug, Clone, Copy)]
pub struct JarTool;

/// Argument list for one invocation: flags, output path, manifest relative
/// path when set, then every content file relativized against the base folder.
fn arguments(
    base_dir: &Path,
    archive_file_name: &str,
    manifest: Option<&Path>,
    contents: &[std::path::PathBuf],
) -> Vec<OsString> {
    let mut flags = String::from("cf");
    if manifest.is_some() {
        flags.push('m');
    }

    let mut args: Vec<OsString> = vec![flags.into(), archive_file_name.into()];
    if let Some(manifest) = manifest {
        args.push(relative_to(manifest, base_dir).into());
    }
    for file in contents {
        args.push(relative_to(file, base_dir).into());
    }
    args
}

impl ArchiveTool for JarTool {
    fn create(
        &self,
        request: &ArchiveRequest,
        runner: &dyn ProcessRunner,
        out: &mut dyn Write,
        err: &mut dyn Write,
        verbose: bool,
    ) -> Result<ArchiveOutcome> {
        let valid = request.validated()?;
        let args = arguments(
            valid.base_dir,
            &valid.archive_file_name(),
            valid.manifest,
            valid.contents,
        );

        if verbose {
            let rendered: Vec<String> = args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned())
                .collect();
            writeln!(out, "{} {}", JAR_PROGRAM, rendered.join(" "))?;
        }

        tracing::debug!(
            "running {} in {} for {}",
            JAR_PROGRAM,
            valid.base_dir.display(),
            valid.archive_file_name()
        );
        let output = runner.run(JAR_PROGRAM, valid.base_dir, &args)?;

        if verbose {
            out.write_all(&output.stdout)?;
            err.write_all(&output.stderr)?;
        }
        if output.status != 0 {
            tracing::warn!(
                "{} exited with status {} for {}",
                JAR_PROGRAM,
                output.status,
                valid.archive_file_name()
            );
        }

        Ok(ArchiveOutcome {
            file: valid.output_file(),
            status: output.status,
        })
    }
}
