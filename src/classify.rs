//! Diff classification: raw name-status lines into changed and removed
//! path sets.
//!
//! Input is the `status<TAB>path` text produced by
//! `git diff --name-status --no-renames`. Each entry runs through a
//! filter chain (empty path, hidden path, ignore rule, source-root
//! containment, optional whitespace-only suppression) and survivors are
//! routed by status: deletions into `removed`, everything else into
//! `changed`. The two sets stay disjoint at all times.

use crate::git::{GitError, RevisionStore};
use crate::project::ProjectContext;
use similar::{Algorithm, DiffOp};
use std::collections::BTreeSet;
use std::fmt;

/// Change status of a single diff entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Added,
    Modified,
    Deleted,
    /// Copies, type changes and other statuses git may emit; routed like
    /// modifications.
    Other,
}

impl Status {
    fn from_tag(tag: &str) -> Self {
        match tag.chars().next() {
            Some('A') => Status::Added,
            Some('M') => Status::Modified,
            Some('D') => Status::Deleted,
            _ => Status::Other,
        }
    }
}

/// One parsed line of name-status output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDiffEntry {
    pub status: Status,
    pub path: String,
}

/// Parse name-status diff text. Lines without a status/path pair or with
/// an empty path are skipped; entry order follows the diff tool and is
/// not significant.
pub fn parse_name_status(text: &str) -> Vec<RawDiffEntry> {
    text.lines()
        .filter_map(|line| {
            let (tag, path) = line.split_once('\t')?;
            let path = path.trim();
            if tag.is_empty() || path.is_empty() {
                return None;
            }
            Some(RawDiffEntry {
                status: Status::from_tag(tag),
                path: path.to_string(),
            })
        })
        .collect()
}

/// The classified outcome: paths to package and paths to remove.
///
/// Invariant: the sets are disjoint; recording a path under one status
/// withdraws it from the other set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub changed: BTreeSet<String>,
    pub removed: BTreeSet<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.removed.is_empty()
    }

    /// Route an entry by status, keeping the sets disjoint (the later
    /// entry wins if a path somehow appears twice).
    fn record(&mut self, status: Status, path: String) {
        match status {
            Status::Deleted => {
                self.changed.remove(&path);
                self.removed.insert(path);
            }
            _ => {
                self.removed.remove(&path);
                self.changed.insert(path);
            }
        }
    }
}

impl fmt::Display for ChangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Changed ({}):", self.changed.len())?;
        for path in &self.changed {
            writeln!(f, "  {}", path)?;
        }
        writeln!(f, "Removed ({}):", self.removed.len())?;
        for path in &self.removed {
            writeln!(f, "  {}", path)?;
        }
        Ok(())
    }
}

/// Classifier inputs beyond the diff text itself.
pub struct ClassifyOptions {
    /// Baseline revision of the diff.
    pub target: String,
    /// Packaged revision; `None` means the working copy.
    pub source: Option<String>,
    /// Suppress entries whose content differs only in whitespace.
    pub ignore_whitespace: bool,
}

/// Classify raw diff text into a [`ChangeSet`].
///
/// Blob fetches only happen in whitespace-insensitive mode, and only for
/// entries where both sides can exist; a fetch that fails at the process
/// level aborts the run.
pub fn classify(
    diff_text: &str,
    ctx: &ProjectContext,
    opts: &ClassifyOptions,
    store: &impl RevisionStore,
) -> Result<ChangeSet, GitError> {
    let mut set = ChangeSet::default();

    for entry in parse_name_status(diff_text) {
        if entry.path.starts_with('.') {
            log::debug!("Skipping hidden path {}", entry.path);
            continue;
        }
        if ctx.ignores(&entry.path) {
            log::debug!("Skipping ignored path {}", entry.path);
            continue;
        }
        if !ctx.is_source_path(&entry.path) {
            log::debug!("Skipping {} outside declared source roots", entry.path);
            continue;
        }
        if opts.ignore_whitespace
            && !matches!(entry.status, Status::Added | Status::Deleted)
            && whitespace_only_change(&entry.path, opts, store)?
        {
            log::debug!("Skipping whitespace-only change in {}", entry.path);
            continue;
        }

        set.record(entry.status, entry.path);
    }

    Ok(set)
}

/// Whether the entry's content at target and source differs only in
/// whitespace. A side where the file is absent always counts as a real
/// difference.
fn whitespace_only_change(
    path: &str,
    opts: &ClassifyOptions,
    store: &impl RevisionStore,
) -> Result<bool, GitError> {
    let old = store.read_blob(path, Some(&opts.target))?;
    let new = store.read_blob(path, opts.source.as_deref())?;
    match (old, new) {
        (Some(old), Some(new)) => Ok(!differs_beyond_whitespace(
            &String::from_utf8_lossy(&old),
            &String::from_utf8_lossy(&new),
        )),
        _ => Ok(false),
    }
}

/// Line-level comparison ignoring whitespace and newline tokens: the
/// blobs differ if at least one added or removed line survives after
/// stripping all whitespace and dropping emptied lines.
pub fn differs_beyond_whitespace(old: &str, new: &str) -> bool {
    let old_lines = normalized_lines(old);
    let new_lines = normalized_lines(new);
    similar::capture_diff_slices(Algorithm::Myers, &old_lines, &new_lines)
        .iter()
        .any(|op| !matches!(op, DiffOp::Equal { .. }))
}

fn normalized_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| line.split_whitespace().collect::<String>())
        .filter(|line| !line.is_empty())
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::git::testing::MemoryStore;
    use crate::project::ProjectContext;
    use similar_asserts::assert_eq;

    fn ctx() -> ProjectContext {
        ProjectContext::from_parts("/repo", vec!["force-app".to_string()], "")
    }

    fn opts() -> ClassifyOptions {
        ClassifyOptions {
            target: "master".to_string(),
            source: None,
            ignore_whitespace: false,
        }
    }

    #[test]
    fn parses_status_and_path() {
        let entries = parse_name_status("M\tforce-app/classes/Foo.cls\nD\tforce-app/old.cls\n");
        assert_eq!(
            entries,
            vec![
                RawDiffEntry {
                    status: Status::Modified,
                    path: "force-app/classes/Foo.cls".to_string(),
                },
                RawDiffEntry {
                    status: Status::Deleted,
                    path: "force-app/old.cls".to_string(),
                },
            ]
        );
    }

    #[test]
    fn skips_malformed_lines() {
        let entries = parse_name_status("nonsense\nM\t\n\nA\tforce-app/a.cls\n");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "force-app/a.cls");
    }

    #[test]
    fn unknown_status_routes_to_changed() {
        let store = MemoryStore::new();
        let set = classify("T\tforce-app/classes/Foo.cls\n", &ctx(), &opts(), &store).unwrap();
        assert!(set.changed.contains("force-app/classes/Foo.cls"));
        assert!(set.removed.is_empty());
    }

    #[test]
    fn modified_and_added_files_are_changed() {
        // Scenario: class file modified, its descriptor added.
        let diff = "M\tforce-app/classes/Foo.cls\nA\tforce-app/classes/Foo.cls-meta.xml\n";
        let store = MemoryStore::new();
        let set = classify(diff, &ctx(), &opts(), &store).unwrap();

        assert_eq!(
            set.changed.iter().cloned().collect::<Vec<_>>(),
            vec![
                "force-app/classes/Foo.cls".to_string(),
                "force-app/classes/Foo.cls-meta.xml".to_string(),
            ]
        );
        assert!(set.removed.is_empty());
    }

    #[test]
    fn paths_outside_source_roots_are_dropped() {
        let diff = "M\tdocs/notes.md\nM\tscripts/deploy.sh\n";
        let store = MemoryStore::new();
        let set = classify(diff, &ctx(), &opts(), &store).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn hidden_paths_are_dropped() {
        let store = MemoryStore::new();
        let set = classify("M\t.forceignore\n", &ctx(), &opts(), &store).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn ignored_paths_are_dropped() {
        let ctx = ProjectContext::from_parts("/repo", vec!["force-app".to_string()], "*.dup\n");
        let store = MemoryStore::new();
        let set = classify("M\tforce-app/classes/Foo.dup\n", &ctx, &opts(), &store).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn whitespace_only_edit_is_suppressed_when_flag_is_set() {
        let mut store = MemoryStore::new();
        store.insert(Some("master"), "force-app/classes/Foo.cls", "class Foo {\n  void run() {}\n}\n");
        store.insert(None, "force-app/classes/Foo.cls", "class Foo {\n\n    void run()   {}\n}\n");

        let diff = "M\tforce-app/classes/Foo.cls\n";
        let with_flag = ClassifyOptions {
            ignore_whitespace: true,
            ..opts()
        };
        let set = classify(diff, &ctx(), &with_flag, &store).unwrap();
        assert!(set.is_empty());

        // Same blobs without the flag keep the entry.
        let set = classify(diff, &ctx(), &opts(), &store).unwrap();
        assert!(set.changed.contains("force-app/classes/Foo.cls"));
    }

    #[test]
    fn real_edit_survives_whitespace_mode() {
        let mut store = MemoryStore::new();
        store.insert(Some("master"), "force-app/classes/Foo.cls", "class Foo {}\n");
        store.insert(None, "force-app/classes/Foo.cls", "class Foo { void x() {} }\n");

        let with_flag = ClassifyOptions {
            ignore_whitespace: true,
            ..opts()
        };
        let set = classify("M\tforce-app/classes/Foo.cls\n", &ctx(), &with_flag, &store).unwrap();
        assert!(set.changed.contains("force-app/classes/Foo.cls"));
    }

    #[test]
    fn classification_is_idempotent() {
        let diff = "M\tforce-app/classes/Foo.cls\nD\tforce-app/classes/Bar.cls\nA\tother/x.cls\n";
        let store = MemoryStore::new();
        let first = classify(diff, &ctx(), &opts(), &store).unwrap();
        let second = classify(diff, &ctx(), &opts(), &store).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn differs_beyond_whitespace_cases() {
        assert!(!differs_beyond_whitespace("a b c\n", "a   b\tc\n"));
        assert!(!differs_beyond_whitespace("a\nb\n", "a\n\n\nb"));
        assert!(differs_beyond_whitespace("a\nb\n", "a\nc\n"));
        assert!(differs_beyond_whitespace("a\n", "a\nb\n"));
    }

    #[test]
    fn change_set_display_is_stable() {
        let mut set = ChangeSet::default();
        set.record(Status::Modified, "force-app/classes/Foo.cls".to_string());
        set.record(Status::Added, "force-app/classes/Foo.cls-meta.xml".to_string());
        set.record(Status::Deleted, "force-app/classes/Old.cls".to_string());

        insta::assert_snapshot!(set.to_string(), @r"
        Changed (2):
          force-app/classes/Foo.cls
          force-app/classes/Foo.cls-meta.xml
        Removed (1):
          force-app/classes/Old.cls
        ");
    }
}
