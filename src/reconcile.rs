//! Deletion reconciliation.
//!
//! Directory-shaped components are deleted file-by-file in a diff, so a
//! `D` entry alone does not prove the component is gone. A partial
//! deletion, where the component still has members on the packaged side,
//! is really a content change: the deployable package must carry the
//! surviving files instead of declaring a removal. Only a component with
//! nothing left behind is a true removal, and it is declared through a
//! single representative path.
//!
//! The whole step is a pure function over the removed set, computed with
//! set operations: every path is evaluated against revision-state
//! membership, never against the other removed paths, so the outcome is
//! independent of iteration order.

use crate::git::{GitError, RevisionStore};
use crate::resolve::{DescriptorPolicy, Registry};
use std::collections::{BTreeMap, BTreeSet};

/// Outcome of reconciliation: the surviving removals and the member
/// paths that must be packaged as changes instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciled {
    pub removed: BTreeSet<String>,
    pub additional_changed: BTreeSet<String>,
}

/// Reclassify partially-deleted bundle components out of `removed`.
///
/// `revision` is the packaged side (source revision, or the working copy
/// when `None`): a component counts as fully deleted only when its
/// member enumeration there is empty apart from the descriptor entry.
/// Flat and unresolved paths pass through untouched. Fully deleted
/// bundles collapse to one representative path per component root.
pub fn reconcile(
    removed: &BTreeSet<String>,
    revision: Option<&str>,
    registry: &Registry,
    store: &impl RevisionStore,
    policy: DescriptorPolicy,
) -> Result<Reconciled, GitError> {
    let mut kept = BTreeSet::new();
    let mut additional_changed = BTreeSet::new();
    let mut fully_removed: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for path in removed {
        let Some(component) = registry.lookup(path) else {
            kept.insert(path.clone());
            continue;
        };
        if !component.is_bundle() {
            kept.insert(path.clone());
            continue;
        }

        let members = component.member_paths(revision, store, policy)?;
        if members.len() > 1 {
            // Still has live members: not a removal. The survivors ride
            // along as changes; this path itself is dropped.
            additional_changed.extend(members);
        } else {
            let root = component.bundle_root().unwrap_or(path).to_string();
            fully_removed.entry(root).or_default().insert(path.clone());
        }
    }

    for listed in fully_removed.into_values() {
        if let Some(representative) = listed.into_iter().next() {
            kept.insert(representative);
        }
    }

    Ok(Reconciled {
        removed: kept,
        additional_changed,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::git::testing::MemoryStore;
    use similar_asserts::assert_eq;

    fn removed(paths: &[&str]) -> BTreeSet<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn flat_removals_pass_through() {
        let set = removed(&["force-app/classes/Old.cls"]);
        let result = reconcile(
            &set,
            None,
            &Registry::standard(),
            &MemoryStore::new(),
            DescriptorPolicy::default(),
        )
        .unwrap();
        assert_eq!(result.removed, set);
        assert!(result.additional_changed.is_empty());
    }

    #[test]
    fn unresolved_removals_pass_through() {
        let set = removed(&["force-app/img/logo.png"]);
        let result = reconcile(
            &set,
            None,
            &Registry::standard(),
            &MemoryStore::new(),
            DescriptorPolicy::default(),
        )
        .unwrap();
        assert_eq!(result.removed, set);
    }

    #[test]
    fn partial_bundle_deletion_becomes_a_change() {
        // One Account field deleted while others survive in the working
        // copy: nothing is removed, the survivors are packaged.
        let mut store = MemoryStore::new();
        store.insert(None, "force-app/objects/Account/fields/Y.field-meta.xml", "y");
        store.insert(None, "force-app/objects/Account/fields/Z.field-meta.xml", "z");

        let set = removed(&["force-app/objects/Account/fields/X.field-meta.xml"]);
        let result = reconcile(
            &set,
            None,
            &Registry::standard(),
            &store,
            DescriptorPolicy::Probe,
        )
        .unwrap();

        assert!(result.removed.is_empty());
        assert_eq!(
            result.additional_changed,
            removed(&[
                "force-app/objects/Account/fields/Y.field-meta.xml",
                "force-app/objects/Account/fields/Z.field-meta.xml",
            ])
        );
    }

    #[test]
    fn full_bundle_deletion_keeps_one_representative() {
        // Every Account file deleted and nothing survives: exactly one
        // path remains to declare the removal.
        let store = MemoryStore::new();
        let set = removed(&[
            "force-app/objects/Account/Account.object-meta.xml",
            "force-app/objects/Account/fields/X.field-meta.xml",
            "force-app/objects/Account/fields/Y.field-meta.xml",
        ]);
        let result = reconcile(
            &set,
            None,
            &Registry::standard(),
            &store,
            DescriptorPolicy::default(),
        )
        .unwrap();

        assert_eq!(
            result.removed,
            removed(&["force-app/objects/Account/Account.object-meta.xml"])
        );
        assert!(result.additional_changed.is_empty());
    }

    #[test]
    fn distinct_bundles_each_keep_a_representative() {
        let store = MemoryStore::new();
        let set = removed(&[
            "force-app/aura/One/One.cmp",
            "force-app/aura/One/OneController.js",
            "force-app/aura/Two/Two.cmp",
        ]);
        let result = reconcile(
            &set,
            None,
            &Registry::standard(),
            &store,
            DescriptorPolicy::default(),
        )
        .unwrap();

        assert_eq!(
            result.removed,
            removed(&["force-app/aura/One/One.cmp", "force-app/aura/Two/Two.cmp"])
        );
    }

    #[test]
    fn unconditional_descriptor_keeps_single_survivor_bundles_partial() {
        // Two-file bundle, one file deleted. The survivor alone would not
        // clear the >1 bar; the descriptor entry is what tips it.
        let mut store = MemoryStore::new();
        store.insert(None, "force-app/lwc/hello/hello.js", "export {}");

        let set = removed(&["force-app/lwc/hello/hello.html"]);
        let result = reconcile(
            &set,
            None,
            &Registry::standard(),
            &store,
            DescriptorPolicy::Unconditional,
        )
        .unwrap();

        assert!(result.removed.is_empty());
        assert!(result.additional_changed.contains("force-app/lwc/hello/hello.js"));
    }

    #[test]
    fn probing_descriptors_misses_single_survivor_bundles() {
        // Same layout under the probing policy: the lone survivor is not
        // enough and the deletion is treated as full.
        let mut store = MemoryStore::new();
        store.insert(None, "force-app/lwc/hello/hello.js", "export {}");

        let set = removed(&["force-app/lwc/hello/hello.html"]);
        let result = reconcile(
            &set,
            None,
            &Registry::standard(),
            &store,
            DescriptorPolicy::Probe,
        )
        .unwrap();

        assert_eq!(result.removed, set);
    }

    #[test]
    fn reconciled_sets_are_disjoint() {
        let mut store = MemoryStore::new();
        store.insert(None, "force-app/objects/Account/fields/Y.field-meta.xml", "y");

        let set = removed(&[
            "force-app/objects/Account/fields/X.field-meta.xml",
            "force-app/objects/Gone/Gone.object-meta.xml",
            "force-app/classes/Old.cls",
        ]);
        let result = reconcile(
            &set,
            None,
            &Registry::standard(),
            &store,
            DescriptorPolicy::default(),
        )
        .unwrap();

        assert!(result.removed.is_disjoint(&result.additional_changed));
    }
}
