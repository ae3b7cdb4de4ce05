//! Project-level context: the `sfdx-project.json` manifest and the
//! `.forceignore` exclusion rules.
//!
//! The context is loaded once per run and passed explicitly to the
//! classifier and assembler, so the core stays testable without a full
//! checkout.

use error_set::error_set;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Project manifest file, declared at the project root and copied into
/// every staging tree.
pub const MANIFEST_FILE: &str = "sfdx-project.json";

/// Ignore-rule source file at the project root.
pub const IGNORE_FILE: &str = ".forceignore";

error_set! {
    /// Errors from loading the project context
    ProjectError := {
        #[display("Failed to read {file}: {message}")]
        ManifestRead { file: String, message: String },
        #[display("Failed to parse {file}: {message}")]
        ManifestParse { file: String, message: String },
        #[display("{file} declares no package directories")]
        NoSourceRoots { file: String },
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectManifest {
    package_directories: Vec<PackageDirectory>,
}

#[derive(Debug, Deserialize)]
struct PackageDirectory {
    path: String,
}

/// Loaded project state: root directory, declared source roots, and the
/// compiled ignore predicate.
pub struct ProjectContext {
    root: PathBuf,
    source_roots: Vec<String>,
    ignore: Vec<glob::Pattern>,
}

impl ProjectContext {
    /// Load `sfdx-project.json` and `.forceignore` from `root`.
    ///
    /// A missing `.forceignore` means no ignore rules; a missing or
    /// empty manifest is an error because every later stage depends on
    /// the declared source roots.
    pub fn load(root: &Path) -> Result<Self, ProjectError> {
        let manifest_path = root.join(MANIFEST_FILE);
        let text =
            std::fs::read_to_string(&manifest_path).map_err(|e| ProjectError::ManifestRead {
                file: MANIFEST_FILE.to_string(),
                message: e.to_string(),
            })?;
        let manifest: ProjectManifest =
            serde_json::from_str(&text).map_err(|e| ProjectError::ManifestParse {
                file: MANIFEST_FILE.to_string(),
                message: e.to_string(),
            })?;

        let source_roots: Vec<String> = manifest
            .package_directories
            .into_iter()
            .map(|dir| dir.path.trim_matches('/').to_string())
            .filter(|path| !path.is_empty())
            .collect();
        if source_roots.is_empty() {
            return Err(ProjectError::NoSourceRoots {
                file: MANIFEST_FILE.to_string(),
            });
        }

        let ignore = match std::fs::read_to_string(root.join(IGNORE_FILE)) {
            Ok(text) => parse_ignore_rules(&text),
            Err(_) => Vec::new(),
        };

        Ok(Self {
            root: root.to_path_buf(),
            source_roots,
            ignore,
        })
    }

    /// Build a context directly from parts; test seam.
    pub fn from_parts(root: impl Into<PathBuf>, source_roots: Vec<String>, ignore_rules: &str) -> Self {
        Self {
            root: root.into(),
            source_roots,
            ignore: parse_ignore_rules(ignore_rules),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The declared package directories, relative to the project root.
    pub fn source_roots(&self) -> &[String] {
        &self.source_roots
    }

    /// Whether `path` falls under any declared source root (component-wise
    /// prefix match).
    pub fn is_source_path(&self, path: &str) -> bool {
        let path = Path::new(path);
        self.source_roots
            .iter()
            .any(|root| path.starts_with(root))
    }

    /// Whether `path` matches an ignore rule. Rules without a `/` match
    /// the file name at any depth; rules with a `/` match the whole
    /// project-relative path.
    pub fn ignores(&self, path: &str) -> bool {
        self.ignore.iter().any(|pattern| {
            if pattern.as_str().contains('/') {
                pattern.matches(path)
            } else {
                Path::new(path)
                    .file_name()
                    .map(|name| pattern.matches(&name.to_string_lossy()))
                    .unwrap_or(false)
            }
        })
    }
}

/// Compile ignore file contents into glob patterns. Comment and blank
/// lines are skipped; a pattern that fails to compile is reported and
/// dropped rather than failing the run.
fn parse_ignore_rules(text: &str) -> Vec<glob::Pattern> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| line.trim_start_matches('/').trim_end_matches('/'))
        .filter_map(|line| match glob::Pattern::new(line) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                log::warn!("Skipping unparseable {} rule '{}': {}", IGNORE_FILE, line, e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use similar_asserts::assert_eq;

    fn context(rules: &str) -> ProjectContext {
        ProjectContext::from_parts("/repo", vec!["force-app".to_string()], rules)
    }

    #[test]
    fn source_path_requires_whole_component_match() {
        let ctx = context("");
        assert!(ctx.is_source_path("force-app/classes/Foo.cls"));
        assert!(!ctx.is_source_path("force-application/classes/Foo.cls"));
        assert!(!ctx.is_source_path("docs/readme.md"));
    }

    #[test]
    fn bare_rules_match_file_names_anywhere() {
        let ctx = context("*.log\njsconfig.json\n");
        assert!(ctx.ignores("force-app/debug/run.log"));
        assert!(ctx.ignores("force-app/lwc/jsconfig.json"));
        assert!(!ctx.ignores("force-app/classes/Foo.cls"));
    }

    #[test]
    fn path_rules_match_whole_paths() {
        let ctx = context("force-app/generated/**\n");
        assert!(ctx.ignores("force-app/generated/classes/Gen.cls"));
        assert!(!ctx.ignores("force-app/classes/Gen.cls"));
    }

    #[test]
    fn comments_and_blanks_are_skipped() {
        let ctx = context("# comment\n\n*.tmp\n");
        assert!(ctx.ignores("force-app/a.tmp"));
        assert!(!ctx.ignores("force-app/comment"));
    }

    #[test]
    fn load_reads_manifest_and_ignore_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(MANIFEST_FILE),
            r#"{"packageDirectories": [{"path": "force-app", "default": true}, {"path": "unpackaged"}]}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join(IGNORE_FILE), "*.dup\n").unwrap();

        let ctx = ProjectContext::load(dir.path()).unwrap();
        assert_eq!(ctx.source_roots(), &["force-app", "unpackaged"]);
        assert!(ctx.ignores("force-app/classes/Foo.dup"));
    }

    #[test]
    fn load_rejects_manifest_without_roots() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), r#"{"packageDirectories": []}"#).unwrap();

        assert!(matches!(
            ProjectContext::load(dir.path()),
            Err(ProjectError::NoSourceRoots { .. })
        ));
    }
}
