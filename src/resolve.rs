//! Metadata component resolution.
//!
//! A logical component may be more than one file on disk: an Apex class
//! is `Foo.cls` plus `Foo.cls-meta.xml`, and bundle types (custom
//! objects, aura, lwc) span an entire directory. The registry maps a
//! path to its component via a closed rule table of bundle container
//! directory names and known flat source suffixes, and enumerates the
//! full member set of that component as of a revision.
//!
//! Paths that match no rule resolve to `None`; callers treat that as
//! "warn and skip", never as a fatal condition.

use crate::git::{GitError, RevisionStore};
use std::collections::BTreeSet;

/// Companion descriptor suffix for source files.
pub const META_SUFFIX: &str = "-meta.xml";

/// Container directories whose immediate children are directory-shaped
/// components.
const BUNDLE_DIRS: &[&str] = &["objects", "aura", "lwc"];

/// File suffixes of flat source files that carry a sibling descriptor.
const SOURCE_SUFFIXES: &[&str] = &[
    ".cls",
    ".trigger",
    ".page",
    ".component",
    ".resource",
    ".email",
];

/// How a component's files are laid out on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Single file, optionally paired with a sibling descriptor.
    Flat,
    /// Entire directory under a bundle container.
    Bundle,
}

/// Whether a member's descriptor counts toward the component's file set
/// without checking that it exists at the revision.
///
/// `Unconditional` is the historical behavior: the phantom entry is what
/// keeps a two-file bundle with one survivor classified as a partial
/// deletion, and it can also surface members that never existed.
/// `Probe` checks existence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DescriptorPolicy {
    #[default]
    Unconditional,
    Probe,
}

/// A resolved component, identified by one of its member paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    path: String,
    shape: Shape,
    bundle_root: Option<String>,
}

impl Component {
    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn is_bundle(&self) -> bool {
        self.shape == Shape::Bundle
    }

    /// The component's directory for bundle shapes
    /// (`.../objects/Account`), `None` for flat components.
    pub fn bundle_root(&self) -> Option<&str> {
        self.bundle_root.as_deref()
    }

    /// Every file path belonging to this component as of `revision`.
    ///
    /// Flat components are the member plus the sibling descriptor when it
    /// exists at the revision. Bundles are everything under the bundle
    /// root at the revision, plus the member's descriptor according to
    /// `policy`. Pure function of (path, revision, store state): the
    /// result is ordered and stable across calls.
    pub fn member_paths(
        &self,
        revision: Option<&str>,
        store: &impl RevisionStore,
        policy: DescriptorPolicy,
    ) -> Result<Vec<String>, GitError> {
        match self.shape {
            Shape::Flat => {
                let mut members = vec![self.path.clone()];
                let descriptor = companion(&self.path);
                if store.read_blob(&descriptor, revision)?.is_some() {
                    members.push(descriptor);
                }
                Ok(members)
            }
            Shape::Bundle => {
                let root = self.bundle_root.as_deref().unwrap_or(&self.path);
                let mut members: BTreeSet<String> =
                    store.list_files(root, revision)?.into_iter().collect();
                let descriptor = companion(&self.path);
                match policy {
                    DescriptorPolicy::Unconditional => {
                        members.insert(descriptor);
                    }
                    DescriptorPolicy::Probe => {
                        if store.read_blob(&descriptor, revision)?.is_some() {
                            members.insert(descriptor);
                        }
                    }
                }
                Ok(members.into_iter().collect())
            }
        }
    }
}

/// The sibling descriptor of a path: `Foo.cls` <-> `Foo.cls-meta.xml`.
pub fn companion(path: &str) -> String {
    match path.strip_suffix(META_SUFFIX) {
        Some(stripped) => stripped.to_string(),
        None => format!("{}{}", path, META_SUFFIX),
    }
}

/// Process-wide, stateless lookup table from path shape to component.
pub struct Registry {
    bundle_dirs: Vec<&'static str>,
    source_suffixes: Vec<&'static str>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::standard()
    }
}

impl Registry {
    /// The standard rule table for Salesforce DX source layout.
    pub fn standard() -> Self {
        Self {
            bundle_dirs: BUNDLE_DIRS.to_vec(),
            source_suffixes: SOURCE_SUFFIXES.to_vec(),
        }
    }

    /// Resolve `path` to its component, or `None` when no rule matches.
    ///
    /// Bundle rules win over flat rules, so a `.js` file inside an lwc
    /// bundle belongs to the bundle rather than resolving on its own.
    pub fn lookup(&self, path: &str) -> Option<Component> {
        if let Some(root) = self.bundle_root_of(path) {
            return Some(Component {
                path: path.to_string(),
                shape: Shape::Bundle,
                bundle_root: Some(root),
            });
        }

        let is_flat = path.ends_with(META_SUFFIX)
            || self
                .source_suffixes
                .iter()
                .any(|suffix| path.ends_with(suffix));
        if is_flat {
            return Some(Component {
                path: path.to_string(),
                shape: Shape::Flat,
                bundle_root: None,
            });
        }

        None
    }

    /// The `<container>/<name>` prefix of `path` when it lies inside a
    /// bundle component directory.
    fn bundle_root_of(&self, path: &str) -> Option<String> {
        let segments: Vec<&str> = path.split('/').collect();
        for (i, segment) in segments.iter().enumerate() {
            // Need a component name after the container and at least one
            // file below it; `objects/Account.object-meta.xml` is flat.
            if self.bundle_dirs.iter().any(|dir| dir == segment) && i + 3 <= segments.len() {
                return Some(segments[..=i + 1].join("/"));
            }
        }
        None
    }
}
