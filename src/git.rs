//! Subprocess access to the `git` binary.
//!
//! Everything the packager needs from revision control goes through here:
//! name-status diffs between two revisions, ahead/behind commit counts,
//! file content as of a revision, and tree listings. Failures from the
//! git process are fatal to the run; a path that simply does not exist at
//! a revision is not a failure and is reported as `None`/absent instead.

use error_set::error_set;
use std::path::{Path, PathBuf};
use std::process::Command;

error_set! {
    /// Errors from git command execution
    GitError := {
        #[display("Failed to run git {command}: {message}")]
        CommandFailed { command: String, message: String },
        #[display("git {command} failed: {stderr}")]
        CommandExit { command: String, stderr: String },
        #[display("Invalid UTF-8 in git {command} output: {message}")]
        InvalidUtf8 { command: String, message: String },
        #[display("Unexpected output from git {command}: {output}")]
        UnexpectedOutput { command: String, output: String },
        #[display("Failed to read {path} from working copy: {message}")]
        WorkingCopyRead { path: String, message: String },
    }
}

/// Read access to project files as of a revision or the working copy.
///
/// `revision: None` means the live working copy. Both operations are pure
/// functions of (path, revision, repository state): two consecutive calls
/// with the same arguments return the same result.
pub trait RevisionStore {
    /// File content at `revision`, or `Ok(None)` if the path does not
    /// exist there.
    fn read_blob(&self, path: &str, revision: Option<&str>) -> Result<Option<Vec<u8>>, GitError>;

    /// Every file path under `dir` (relative to the project root) as of
    /// `revision`, sorted. A directory that does not exist yields an
    /// empty list.
    fn list_files(&self, dir: &str, revision: Option<&str>) -> Result<Vec<String>, GitError>;
}

/// Handle to a git repository, rooted at its top-level directory.
pub struct GitRepo {
    root: PathBuf,
}

impl GitRepo {
    /// Open a repository at a known root directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Discover the repository containing `dir` via `git rev-parse
    /// --show-toplevel`, so the tool works from any subdirectory.
    pub fn discover(dir: &Path) -> Result<Self, GitError> {
        let output = Command::new("git")
            .args(["-C"])
            .arg(dir)
            .args(["rev-parse", "--show-toplevel"])
            .output()
            .map_err(|e| GitError::CommandFailed {
                command: "rev-parse".to_string(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(GitError::CommandExit {
                command: "rev-parse".to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let top = String::from_utf8(output.stdout).map_err(|e| GitError::InvalidUtf8 {
            command: "rev-parse".to_string(),
            message: e.to_string(),
        })?;

        Ok(Self::new(top.trim()))
    }

    /// The repository's top-level directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Raw `status<TAB>path` diff lines between `target` and `source`
    /// (or the working copy when `source` is `None`). Renames are
    /// disabled so every entry is a plain A/M/D against a single path.
    pub fn diff_name_status(
        &self,
        target: &str,
        source: Option<&str>,
    ) -> Result<String, GitError> {
        let mut args = vec!["diff", "--name-status", "--no-renames", target];
        if let Some(source) = source {
            args.push(source);
        }
        let stdout = self.run("diff", &args)?;
        String::from_utf8(stdout).map_err(|e| GitError::InvalidUtf8 {
            command: "diff".to_string(),
            message: e.to_string(),
        })
    }

    /// Commit counts `(behind, ahead)` of `source` relative to `target`:
    /// `behind` commits exist only on `target`, `ahead` only on `source`.
    pub fn ahead_behind(&self, target: &str, source: Option<&str>) -> Result<(u32, u32), GitError> {
        let range = format!("{}...{}", target, source.unwrap_or("HEAD"));
        let stdout = self.run("rev-list", &["rev-list", "--left-right", "--count", &range])?;
        let text = String::from_utf8(stdout).map_err(|e| GitError::InvalidUtf8 {
            command: "rev-list".to_string(),
            message: e.to_string(),
        })?;
        parse_count_pair(&text)
    }

    /// Run git in the repository root, returning stdout on success.
    fn run(&self, command: &str, args: &[&str]) -> Result<Vec<u8>, GitError> {
        let output = Command::new("git")
            .args(["-C"])
            .arg(&self.root)
            .args(args)
            .output()
            .map_err(|e| GitError::CommandFailed {
                command: command.to_string(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(GitError::CommandExit {
                command: command.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        Ok(output.stdout)
    }
}

/// Parse `git rev-list --left-right --count` output ("N<TAB>M").
fn parse_count_pair(text: &str) -> Result<(u32, u32), GitError> {
    let mut fields = text.split_whitespace();
    let left = fields.next().and_then(|f| f.parse::<u32>().ok());
    let right = fields.next().and_then(|f| f.parse::<u32>().ok());
    match (left, right) {
        (Some(left), Some(right)) => Ok((left, right)),
        _ => Err(GitError::UnexpectedOutput {
            command: "rev-list".to_string(),
            output: text.trim().to_string(),
        }),
    }
}

impl RevisionStore for GitRepo {
    fn read_blob(&self, path: &str, revision: Option<&str>) -> Result<Option<Vec<u8>>, GitError> {
        match revision {
            Some(revision) => {
                let spec = format!("{}:{}", revision, path);
                let output = Command::new("git")
                    .args(["-C"])
                    .arg(&self.root)
                    .args(["show", &spec])
                    .output()
                    .map_err(|e| GitError::CommandFailed {
                        command: "show".to_string(),
                        message: e.to_string(),
                    })?;

                // A nonzero exit here means the path does not exist at
                // that revision; the revision itself was validated by the
                // earlier diff.
                if output.status.success() {
                    Ok(Some(output.stdout))
                } else {
                    Ok(None)
                }
            }
            None => match std::fs::read(self.root.join(path)) {
                Ok(bytes) => Ok(Some(bytes)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(GitError::WorkingCopyRead {
                    path: path.to_string(),
                    message: e.to_string(),
                }),
            },
        }
    }

    fn list_files(&self, dir: &str, revision: Option<&str>) -> Result<Vec<String>, GitError> {
        match revision {
            Some(revision) => {
                let stdout = self.run(
                    "ls-tree",
                    &["ls-tree", "-r", "--name-only", revision, "--", dir],
                )?;
                let text = String::from_utf8(stdout).map_err(|e| GitError::InvalidUtf8 {
                    command: "ls-tree".to_string(),
                    message: e.to_string(),
                })?;
                let mut files: Vec<String> =
                    text.lines().filter(|l| !l.is_empty()).map(String::from).collect();
                files.sort();
                Ok(files)
            }
            None => {
                let base = self.root.join(dir);
                if !base.is_dir() {
                    return Ok(Vec::new());
                }
                let mut files = Vec::new();
                for entry in walkdir::WalkDir::new(&base).sort_by_file_name() {
                    let entry = entry.map_err(|e| GitError::WorkingCopyRead {
                        path: dir.to_string(),
                        message: e.to_string(),
                    })?;
                    if !entry.file_type().is_file() {
                        continue;
                    }
                    if let Ok(relative) = entry.path().strip_prefix(&self.root) {
                        files.push(relative.to_string_lossy().replace('\\', "/"));
                    }
                }
                files.sort();
                Ok(files)
            }
        }
    }
}


#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use similar_asserts::assert_eq;

    #[test]
    fn count_pair_parses_tab_separated_fields() {
        assert_eq!(parse_count_pair("2\t5\n").unwrap(), (2, 5));
    }

    #[test]
    fn count_pair_parses_zero_counts() {
        assert_eq!(parse_count_pair("0\t0\n").unwrap(), (0, 0));
    }

    #[test]
    fn count_pair_rejects_garbage() {
        assert!(matches!(
            parse_count_pair("not-a-count"),
            Err(GitError::UnexpectedOutput { .. })
        ));
    }

    #[test]
    fn count_pair_rejects_single_field() {
        assert!(parse_count_pair("3").is_err());
    }

    #[test]
    fn memory_store_lists_only_matching_revision() {
        use testing::MemoryStore;

        let mut store = MemoryStore::new();
        store.insert(Some("main"), "force-app/objects/Account/fields/A.field-meta.xml", "a");
        store.insert(None, "force-app/objects/Account/fields/B.field-meta.xml", "b");

        let at_main = store.list_files("force-app/objects/Account", Some("main")).unwrap();
        assert_eq!(
            at_main,
            vec!["force-app/objects/Account/fields/A.field-meta.xml".to_string()]
        );

        let in_wc = store.list_files("force-app/objects/Account", None).unwrap();
        assert_eq!(
            in_wc,
            vec!["force-app/objects/Account/fields/B.field-meta.xml".to_string()]
        );
    }
}
