//! Drives one packaging run: scan candidates, decide staleness per group,
//! create the stale archives, persist the updated snapshot.

use std::{fs, io::Write, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use tokio::task::JoinSet;

use crate::{
    archive::{ArchiveOutcome, ArchiveRequest, ArchiveTool},
    manifest,
    process::ProcessRunner,
    project::Project,
    scan::{self, Candidate},
    staleness,
    state::{ArchiveFile, Group, PackagingState},
};

/// Extension of raw source files.
const SOURCE_EXTENSION: &str = "java";

/// Extension of compiled artifacts.
const OUTPUT_EXTENSION: &str = "class";

/// Runtime switches, explicit rather than ambient.
#[derive(Debug, Clone)]
pub struct PackagingConfig {
    /// Load and persist the staleness document.
    pub use_cache: bool,
    /// Create stale archives concurrently instead of one after another.
    pub parallel: bool,
    /// Echo tool command lines and per-archive confirmations.
    pub verbose: bool,
}

impl Default for PackagingConfig {
    fn default() -> Self {
        Self {
            use_cache: true,
            parallel: true,
            verbose: false,
        }
    }
}

/// An archive-creation unit of work for one stale group.
struct ScheduledTask {
    group: Group,
    request: ArchiveRequest,
}

/// A finished task plus the output it buffered while running. Tasks write to
/// their own buffers so parallel runs never share a stream; the controlling
/// thread flushes them in scheduling order after rejoin.
struct TaskResult {
    group: Group,
    outcome: ArchiveOutcome,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

pub struct Packager {
    project: Project,
    config: PackagingConfig,
    tool: Arc<dyn ArchiveTool + Send + Sync>,
    runner: Arc<dyn ProcessRunner + Send + Sync>,
    runtime: tokio::runtime::Runtime,
}

impl Packager {
    pub fn new(
        project: Project,
        config: PackagingConfig,
        tool: Arc<dyn ArchiveTool + Send + Sync>,
        runner: Arc<dyn ProcessRunner + Send + Sync>,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Runtime::new().context("failed to create tokio runtime")?;
        Ok(Self {
            project,
            config,
            tool,
            runner,
            runtime,
        })
    }

    /// Run packaging and return the process exit status: the upstream status
    /// when that already failed, otherwise the number of failed archives.
    pub fn run(&self, upstream_status: i32, out: &mut dyn Write, err: &mut dyn Write) -> Result<i32> {
        if upstream_status != 0 {
            tracing::info!(
                "upstream build failed with status {}; packaging skipped",
                upstream_status
            );
            return Ok(upstream_status);
        }

        let previous = if self.config.use_cache {
            PackagingState::load(&self.project.state_path())?
        } else {
            None
        };

        let project_name = self.project.name();
        let sources_dir = self.project.sources_dir();
        let outputs_dir = self.project.outputs_dir();
        let tests_dir = self.project.tests_dir();

        let sources = scan::files_with_extension(&sources_dir, SOURCE_EXTENSION)?;
        let outputs = scan::files_with_extension(&outputs_dir, OUTPUT_EXTENSION)?;
        let compiled_sources = scan::attribute_outputs(outputs.clone(), &sources);

        let mut next = PackagingState {
            project: project_name.to_string(),
            ..Default::default()
        };
        let mut tasks: Vec<ScheduledTask> = Vec::new();
        let mut rebuilt_any = false;

        // Raw sources, assembled inside the source folder and delivered later.
        let decision = staleness::decide(
            previous.as_ref(),
            Group::Sources,
            project_name,
            &snapshot_files(&sources),
        );
        next.set_files(Group::Sources, decision.snapshot);
        if decision.rebuild {
            rebuilt_any = true;
            writeln!(out, "Creating {}...", Group::Sources.jar_description())?;
            tasks.push(ScheduledTask {
                group: Group::Sources,
                request: ArchiveRequest::new()
                    .base_dir(&sources_dir)
                    .name(format!("{}.sources", project_name))
                    .contents(content_paths(&sources)),
            });
        } else {
            writeln!(out, "Skipping {}.", Group::Sources.jar_description())?;
        }

        // Compiled sources; this is the project's primary archive and the one
        // that carries the entry-point manifest.
        let decision = staleness::decide(
            previous.as_ref(),
            Group::SourceOutputs,
            project_name,
            &snapshot_files(&compiled_sources),
        );
        next.set_files(Group::SourceOutputs, decision.snapshot);
        if decision.rebuild {
            rebuilt_any = true;
            writeln!(out, "Creating {}...", Group::SourceOutputs.jar_description())?;
            let manifest_file = match self.project.main_class() {
                Some(main_class) => Some(manifest::write_manifest(&outputs_dir, main_class)?),
                None => None,
            };
            tasks.push(ScheduledTask {
                group: Group::SourceOutputs,
                request: ArchiveRequest::new()
                    .base_dir(&outputs_dir)
                    .name(project_name)
                    .manifest(manifest_file)
                    .contents(content_paths(&compiled_sources)),
            });
        } else {
            writeln!(out, "Skipping {}.", Group::SourceOutputs.jar_description())?;
        }

        // Compiled tests, only for projects that have a tests folder at all.
        if tests_dir.is_dir() {
            let test_sources = scan::files_with_extension(&tests_dir, SOURCE_EXTENSION)?;
            let compiled_tests = scan::attribute_outputs(outputs, &test_sources);

            let decision = staleness::decide(
                previous.as_ref(),
                Group::TestOutputs,
                project_name,
                &snapshot_files(&compiled_tests),
            );
            next.set_files(Group::TestOutputs, decision.snapshot);
            if decision.rebuild {
                rebuilt_any = true;
                writeln!(out, "Creating {}...", Group::TestOutputs.jar_description())?;
                tasks.push(ScheduledTask {
                    group: Group::TestOutputs,
                    request: ArchiveRequest::new()
                        .base_dir(&outputs_dir)
                        .name(format!("{}.tests", project_name))
                        .contents(content_paths(&compiled_tests)),
                });
            } else {
                writeln!(out, "Skipping {}.", Group::TestOutputs.jar_description())?;
            }
        }

        let results = if self.config.parallel {
            self.run_parallel(tasks)?
        } else {
            self.run_sequential(tasks)?
        };

        let mut failures = 0;
        for result in results {
            out.write_all(&result.stdout)?;
            err.write_all(&result.stderr)?;

            if result.outcome.status != 0 {
                failures += 1;
                writeln!(
                    err,
                    "Creating the {} failed with exit status {}.",
                    result.group.jar_description(),
                    result.outcome.status
                )?;
                continue;
            }

            let archive = if result.group == Group::Sources {
                self.deliver_sources_archive(&result.outcome, &outputs_dir)?
            } else {
                result.outcome.file
            };
            if self.config.verbose {
                writeln!(out, "Created {}.", archive.display())?;
            }
        }

        // The document never reflects a rebuild still in flight: every task
        // has completed by the time it is written.
        if self.config.use_cache && rebuilt_any {
            next.save(&self.project.state_path())?;
            tracing::debug!(
                "persisted staleness document {}",
                self.project.state_path().display()
            );
        }

        Ok(failures)
    }

    fn run_sequential(&self, tasks: Vec<ScheduledTask>) -> Result<Vec<TaskResult>> {
        tasks
            .into_iter()
            .map(|task| {
                execute_task(
                    self.tool.as_ref(),
                    self.runner.as_ref(),
                    task,
                    self.config.verbose,
                )
            })
            .collect()
    }

    /// Launch every task, then await them all. Tasks share no mutable state:
    /// each reads its own candidate list and writes its own archive file.
    fn run_parallel(&self, tasks: Vec<ScheduledTask>) -> Result<Vec<TaskResult>> {
        let verbose = self.config.verbose;
        let count = tasks.len();

        self.runtime.block_on(async {
            let mut set = JoinSet::new();
            for (index, task) in tasks.into_iter().enumerate() {
                let tool = Arc::clone(&self.tool);
                let runner = Arc::clone(&self.runner);
                set.spawn_blocking(move || {
                    (
                        index,
                        execute_task(tool.as_ref(), runner.as_ref(), task, verbose),
                    )
                });
            }

            let mut slots: Vec<Option<TaskResult>> = (0..count).map(|_| None).collect();
            while let Some(joined) = set.join_next().await {
                let (index, result) = joined.context("archive-creation task panicked")?;
                slots[index] = Some(result?);
            }

            let mut results = Vec::with_capacity(count);
            for slot in slots {
                results.push(slot.context("archive-creation task never completed")?);
            }
            Ok(results)
        })
    }

    /// The sources archive is assembled in the source folder; move it into
    /// the output folder next to the other archives.
    fn deliver_sources_archive(
        &self,
        outcome: &ArchiveOutcome,
        outputs_dir: &std::path::Path,
    ) -> Result<PathBuf> {
        let file_name = outcome
            .file
            .file_name()
            .context("sources archive path has no file name")?;
        let target = outputs_dir.join(file_name);

        fs::create_dir_all(outputs_dir)
            .with_context(|| format!("failed to create {}", outputs_dir.display()))?;
        fs::rename(&outcome.file, &target).with_context(|| {
            format!(
                "failed to move {} into {}",
                outcome.file.display(),
                outputs_dir.display()
            )
        })?;

        Ok(target)
    }
}

fn execute_task(
    tool: &dyn ArchiveTool,
    runner: &dyn ProcessRunner,
    task: ScheduledTask,
    verbose: bool,
) -> Result<TaskResult> {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let outcome = tool.create(&task.request, runner, &mut stdout, &mut stderr, verbose)?;
    Ok(TaskResult {
        group: task.group,
        outcome,
        stdout,
        stderr,
    })
}

fn snapshot_files(candidates: &[Candidate]) -> Vec<ArchiveFile> {
    candidates.iter().map(|c| c.file.clone()).collect()
}

fn content_paths(candidates: &[Candidate]) -> Vec<PathBuf> {
    candidates.iter().map(|c| c.path.clone()).collect()
}

#[cfg(test)]
mod tests {
    use std::{
        fs,
        path::Path,
        time::{Duration, SystemTime},
    };

    use tempfile::tempdir;

    use super::*;
    use crate::archive::FakeTool;
    use crate::process::SystemRunner;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn fixture(root: &Path, main_class: Option<&str>) {
        let descriptor = match main_class {
            Some(main) => format!(r#"{{"name": "my-project", "mainClass": "{main}"}}"#),
            None => r#"{"name": "my-project"}"#.to_string(),
        };
        write(&root.join("project.json"), &descriptor);
        write(&root.join("sources/A.java"), "class A {}");
        write(&root.join("outputs/A.class"), "cafebabe");
    }

    fn packager(root: &Path, config: PackagingConfig) -> Packager {
        let project = Project::load(root).unwrap();
        Packager::new(project, config, Arc::new(FakeTool), Arc::new(SystemRunner)).unwrap()
    }

    fn serial(root: &Path) -> Packager {
        packager(
            root,
            PackagingConfig {
                parallel: false,
                ..Default::default()
            },
        )
    }

    fn run(packager: &Packager, upstream: i32) -> (i32, String, String) {
        let mut out = Vec::new();
        let mut err = Vec::new();
        let status = packager.run(upstream, &mut out, &mut err).unwrap();
        (
            status,
            String::from_utf8(out).unwrap(),
            String::from_utf8(err).unwrap(),
        )
    }

    fn bump_mtime(path: &Path) {
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(5))
            .unwrap();
    }

    #[test]
    fn first_run_creates_sources_and_primary_archives() {
        let dir = tempdir().unwrap();
        fixture(dir.path(), None);

        let (status, out, err) = run(&serial(dir.path()), 0);

        assert_eq!(status, 0);
        assert!(err.is_empty());
        assert!(out.contains("Creating sources jar file..."));
        assert!(out.contains("Creating jar file..."));

        let sources_jar = dir.path().join("outputs/my-project.sources.jar");
        let primary_jar = dir.path().join("outputs/my-project.jar");
        assert_eq!(fs::read_to_string(&sources_jar).unwrap(), "A.java\n");
        assert_eq!(fs::read_to_string(&primary_jar).unwrap(), "A.class\n");

        let state = PackagingState::load(&dir.path().join(".jarpack.json"))
            .unwrap()
            .unwrap();
        assert_eq!(state.project, "my-project");
        assert!(state.source_files.contains_key("A.java"));
        assert!(state.source_output_files.contains_key("A.class"));
        assert!(state.test_output_files.is_empty());
    }

    #[test]
    fn main_class_produces_a_manifest_backed_primary_archive() {
        let dir = tempdir().unwrap();
        fixture(dir.path(), Some("A"));

        run(&serial(dir.path()), 0);

        let manifest = dir.path().join("outputs/META-INF/MANIFEST.MF");
        assert_eq!(
            fs::read_to_string(&manifest).unwrap(),
            "Manifest-Version: 1.0\nMain-Class: A\n"
        );
        let listing = fs::read_to_string(dir.path().join("outputs/my-project.jar")).unwrap();
        assert_eq!(listing, "META-INF/MANIFEST.MF\n\nA.class\n");
    }

    #[test]
    fn second_run_with_no_changes_skips_every_group() {
        let dir = tempdir().unwrap();
        fixture(dir.path(), None);
        let packager = serial(dir.path());

        run(&packager, 0);
        let state_before = fs::read(dir.path().join(".jarpack.json")).unwrap();

        let (status, out, _) = run(&packager, 0);

        assert_eq!(status, 0);
        assert!(out.contains("Skipping sources jar file."));
        assert!(out.contains("Skipping jar file."));
        assert!(!out.contains("Creating"));

        let state_after = fs::read(dir.path().join(".jarpack.json")).unwrap();
        assert_eq!(state_before, state_after);
    }

    #[test]
    fn touched_source_rebuilds_only_the_sources_group() {
        let dir = tempdir().unwrap();
        fixture(dir.path(), None);
        let packager = serial(dir.path());
        run(&packager, 0);

        bump_mtime(&dir.path().join("sources/A.java"));
        let (status, out, _) = run(&packager, 0);

        assert_eq!(status, 0);
        assert!(out.contains("Creating sources jar file..."));
        assert!(out.contains("Skipping jar file."));
    }

    #[test]
    fn touched_output_rebuilds_only_the_primary_group() {
        let dir = tempdir().unwrap();
        fixture(dir.path(), None);
        let packager = serial(dir.path());
        run(&packager, 0);

        bump_mtime(&dir.path().join("outputs/A.class"));
        let (status, out, _) = run(&packager, 0);

        assert_eq!(status, 0);
        assert!(out.contains("Skipping sources jar file."));
        assert!(out.contains("Creating jar file..."));
    }

    #[test]
    fn removed_source_rebuilds_the_sources_group() {
        let dir = tempdir().unwrap();
        fixture(dir.path(), None);
        write(&dir.path().join("sources/B.java"), "class B {}");
        let packager = serial(dir.path());
        run(&packager, 0);

        fs::remove_file(dir.path().join("sources/B.java")).unwrap();
        let (_, out, _) = run(&packager, 0);

        assert!(out.contains("Creating sources jar file..."));
        assert!(out.contains("Skipping jar file."));

        let state = PackagingState::load(&dir.path().join(".jarpack.json"))
            .unwrap()
            .unwrap();
        assert!(!state.source_files.contains_key("B.java"));
    }

    #[test]
    fn upstream_failure_skips_packaging_and_propagates_the_status() {
        let dir = tempdir().unwrap();
        fixture(dir.path(), None);

        let (status, out, err) = run(&serial(dir.path()), 3);

        assert_eq!(status, 3);
        assert!(out.is_empty());
        assert!(err.is_empty());
        assert!(!dir.path().join("outputs/my-project.jar").exists());
        assert!(!dir.path().join(".jarpack.json").exists());
    }

    #[test]
    fn tests_folder_adds_a_third_archive_in_parallel_mode() {
        let dir = tempdir().unwrap();
        fixture(dir.path(), Some("A"));
        write(&dir.path().join("tests/ATest.java"), "class ATest {}");
        write(&dir.path().join("outputs/ATest.class"), "cafebabe");
        write(&dir.path().join("outputs/ATest$1.class"), "cafebabe");

        let packager = packager(dir.path(), PackagingConfig::default());
        let (status, out, err) = run(&packager, 0);

        assert_eq!(status, 0);
        assert!(err.is_empty());
        assert!(out.contains("Creating tests jar file..."));

        let tests_listing =
            fs::read_to_string(dir.path().join("outputs/my-project.tests.jar")).unwrap();
        assert_eq!(tests_listing, "ATest$1.class\nATest.class\n");

        // Test classes are attributed to tests/, not to the primary archive.
        let primary_listing =
            fs::read_to_string(dir.path().join("outputs/my-project.jar")).unwrap();
        assert_eq!(primary_listing, "META-INF/MANIFEST.MF\n\nA.class\n");

        let state = PackagingState::load(&dir.path().join(".jarpack.json"))
            .unwrap()
            .unwrap();
        assert!(state.test_output_files.contains_key("ATest.class"));
        assert!(state.test_output_files.contains_key("ATest$1.class"));
    }

    #[test]
    fn parallel_and_serial_runs_skip_identically_on_the_second_pass() {
        let dir = tempdir().unwrap();
        fixture(dir.path(), None);

        run(&serial(dir.path()), 0);
        let (status, out, _) = run(&packager(dir.path(), PackagingConfig::default()), 0);

        assert_eq!(status, 0);
        assert!(out.contains("Skipping sources jar file."));
        assert!(out.contains("Skipping jar file."));
    }

    #[test]
    fn project_rename_rebuilds_every_group() {
        let dir = tempdir().unwrap();
        fixture(dir.path(), None);
        run(&serial(dir.path()), 0);

        write(&dir.path().join("project.json"), r#"{"name": "renamed"}"#);
        let (_, out, _) = run(&serial(dir.path()), 0);

        assert!(out.contains("Creating sources jar file..."));
        assert!(out.contains("Creating jar file..."));

        let state = PackagingState::load(&dir.path().join(".jarpack.json"))
            .unwrap()
            .unwrap();
        assert_eq!(state.project, "renamed");
    }

    #[test]
    fn disabled_cache_neither_loads_nor_persists() {
        let dir = tempdir().unwrap();
        fixture(dir.path(), None);
        let packager = packager(
            dir.path(),
            PackagingConfig {
                use_cache: false,
                parallel: false,
                ..Default::default()
            },
        );

        let (_, first, _) = run(&packager, 0);
        let (_, second, _) = run(&packager, 0);

        assert!(first.contains("Creating sources jar file..."));
        assert!(second.contains("Creating sources jar file..."));
        assert!(!dir.path().join(".jarpack.json").exists());
    }

    #[test]
    fn unrelated_artifacts_never_enter_the_primary_archive() {
        let dir = tempdir().unwrap();
        fixture(dir.path(), None);
        write(&dir.path().join("outputs/vendor/Lib.class"), "cafebabe");

        run(&serial(dir.path()), 0);

        let listing = fs::read_to_string(dir.path().join("outputs/my-project.jar")).unwrap();
        assert_eq!(listing, "A.class\n");

        let state = PackagingState::load(&dir.path().join(".jarpack.json"))
            .unwrap()
            .unwrap();
        assert!(!state.source_output_files.contains_key("vendor/Lib.class"));
    }

    #[test]
    fn empty_candidate_set_still_produces_an_archive() {
        let dir = tempdir().unwrap();
        write(&dir.path().join("project.json"), r#"{"name": "bare"}"#);
        fs::create_dir_all(dir.path().join("sources")).unwrap();
        fs::create_dir_all(dir.path().join("outputs")).unwrap();

        let (status, out, _) = run(&serial(dir.path()), 0);

        assert_eq!(status, 0);
        assert!(out.contains("Creating sources jar file..."));
        assert_eq!(
            fs::read_to_string(dir.path().join("outputs/bare.sources.jar")).unwrap(),
            ""
        );
    }

    #[test]
    fn failed_archives_are_counted_without_stopping_the_others() {
        /// Pretends the external tool exited non-zero for every archive.
        struct BrokenTool;

        impl ArchiveTool for BrokenTool {
            fn create(
                &self,
                request: &ArchiveRequest,
                runner: &dyn ProcessRunner,
                out: &mut dyn Write,
                err: &mut dyn Write,
                verbose: bool,
            ) -> anyhow::Result<crate::archive::ArchiveOutcome> {
                let mut outcome = FakeTool.create(request, runner, out, err, verbose)?;
                outcome.status = 2;
                Ok(outcome)
            }
        }

        let dir = tempdir().unwrap();
        fixture(dir.path(), None);
        let project = Project::load(dir.path()).unwrap();
        let packager = Packager::new(
            project,
            PackagingConfig {
                parallel: false,
                ..Default::default()
            },
            Arc::new(BrokenTool),
            Arc::new(SystemRunner),
        )
        .unwrap();

        let mut out = Vec::new();
        let mut err = Vec::new();
        let status = packager.run(0, &mut out, &mut err).unwrap();
        let err = String::from_utf8(err).unwrap();

        // Both groups ran and both failures are aggregated into the status.
        assert_eq!(status, 2);
        assert!(err.contains("Creating the sources jar file failed with exit status 2."));
        assert!(err.contains("Creating the jar file failed with exit status 2."));
    }

    #[test]
    fn verbose_mode_confirms_each_created_archive() {
        let dir = tempdir().unwrap();
        fixture(dir.path(), None);
        let packager = packager(
            dir.path(),
            PackagingConfig {
                parallel: false,
                verbose: true,
                ..Default::default()
            },
        );

        let (_, out, _) = run(&packager, 0);

        assert!(out.contains("Created "));
        assert!(out.contains("my-project.sources.jar"));
        assert!(out.contains("my-project.jar"));
    }
}
