//! Decides, per archive group, whether the archive must be rebuilt.

use crate::state::{ArchiveFile, FileSet, Group, PackagingState};

/// Outcome of diffing one group against its previous snapshot.
///
/// The snapshot always reflects the current candidates, even when no rebuild
/// is needed, so the persisted document tracks reality on every run.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub rebuild: bool,
    pub snapshot: FileSet,
}

/// Diff the current candidate files against the previous snapshot for `group`.
///
/// A rebuild is required when there is no previous state at all, when the
/// project name changed, when any candidate is new or carries a modification
/// timestamp different from the recorded one (exact equality, not newer-than),
/// or when a previously-recorded file no longer appears among the candidates.
pub fn decide(
    previous: Option<&PackagingState>,
    group: Group,
    project: &str,
    candidates: &[ArchiveFile],
) -> Decision {
    let Some(previous) = previous else {
        let snapshot = candidates
            .iter()
            .map(|file| (file.relative_path.clone(), file.last_modified))
            .collect();
        return Decision { rebuild: true, snapshot };
    };

    let prior = previous.files(group);
    let mut rebuild = previous.project != project;
    let mut snapshot = FileSet::new();

    for file in candidates {
        match prior.get(&file.relative_path) {
            Some(&recorded) if recorded == file.last_modified => {
                snapshot.insert(file.relative_path.clone(), recorded);
            }
            _ => {
                // New file, or a timestamp that differs in either direction.
                rebuild = true;
                snapshot.insert(file.relative_path.clone(), file.last_modified);
            }
        }
    }

    // A prior entry with no surviving candidate disappeared from the group.
    if prior.keys().any(|path| !snapshot.contains_key(path)) {
        rebuild = true;
    }

    Decision { rebuild, snapshot }
}
