//! Staging assembly: materialize the files a conversion pass needs.
//!
//! Each assembly builds one ephemeral tree containing, for every input
//! path, the complete file set of its component, copied from a single
//! side (a named revision or the working copy). The tree holds the
//! project manifest at its root and the declared source roots
//! pre-created, so the external converter sees a well-formed project.
//! Trees are never reused: one per conversion pass, dropped afterwards.

use crate::git::{GitError, RevisionStore};
use crate::project::{MANIFEST_FILE, ProjectContext};
use crate::resolve::{DescriptorPolicy, Registry};
use error_set::error_set;
use std::collections::BTreeSet;
use std::path::Path;
use tempfile::TempDir;

error_set! {
    /// Errors from staging-tree assembly
    StageError := {
        #[display("Failed to create staging tree: {message}")]
        CreateTree { message: String },
        #[display("Failed to write {path} into staging tree: {message}")]
        WriteFile { path: String, message: String },
        #[display("{file} is unavailable at the requested revision")]
        ManifestUnavailable { file: String },
        GitError(GitError),
    }
}

/// An assembled staging tree. The backing directory is removed when the
/// value is dropped.
pub struct StagedTree {
    dir: TempDir,
}

impl StagedTree {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Materialize a staging tree for `paths`, copying every resolvable
/// component member from `revision` (or the working copy when `None`).
///
/// Paths with no resolver are reported and skipped; members the revision
/// does not actually contain (phantom descriptors) are skipped quietly.
/// Absolute input paths are relativized against the project root first.
pub fn assemble(
    paths: &BTreeSet<String>,
    revision: Option<&str>,
    ctx: &ProjectContext,
    registry: &Registry,
    store: &impl RevisionStore,
    policy: DescriptorPolicy,
) -> Result<StagedTree, StageError> {
    let dir = tempfile::Builder::new()
        .prefix("sf-delta-")
        .tempdir()
        .map_err(|e| StageError::CreateTree {
            message: e.to_string(),
        })?;

    for root in ctx.source_roots() {
        create_dirs(dir.path().join(root).as_path())?;
    }

    let manifest = store
        .read_blob(MANIFEST_FILE, revision)?
        .ok_or(StageError::ManifestUnavailable {
            file: MANIFEST_FILE.to_string(),
        })?;
    write_file(dir.path(), MANIFEST_FILE, &manifest)?;

    for path in paths {
        let path = relativize(path, ctx.root());
        let Some(component) = registry.lookup(&path) else {
            log::warn!("No metadata resolver matches {}; skipping", path);
            continue;
        };

        for member in component.member_paths(revision, store, policy)? {
            match store.read_blob(&member, revision)? {
                Some(content) => write_file(dir.path(), &member, &content)?,
                None => {
                    log::debug!(
                        "Component member {} does not exist at {}; skipping",
                        member,
                        revision.unwrap_or("working copy"),
                    );
                }
            }
        }
    }

    Ok(StagedTree { dir })
}

/// Strip the project root from absolute paths; relative paths pass
/// through untouched.
fn relativize(path: &str, root: &Path) -> String {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        if let Ok(relative) = candidate.strip_prefix(root) {
            return relative.to_string_lossy().replace('\\', "/");
        }
    }
    path.to_string()
}

fn create_dirs(dir: &Path) -> Result<(), StageError> {
    std::fs::create_dir_all(dir).map_err(|e| StageError::CreateTree {
        message: e.to_string(),
    })
}

fn write_file(tree: &Path, path: &str, content: &[u8]) -> Result<(), StageError> {
    let dest = tree.join(path);
    if let Some(parent) = dest.parent() {
        create_dirs(parent)?;
    }
    std::fs::write(&dest, content).map_err(|e| StageError::WriteFile {
        path: path.to_string(),
        message: e.to_string(),
    })
}
