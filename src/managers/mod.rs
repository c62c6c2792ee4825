//! Entity managers (spec §4.E): per-entity CRUD over the staging tree, enforcing
//! invariants and cross-references. Grounded in the `AppMemoryManager` /
//! `ChannelTypeMemoryManager` family in `cmd/insprd/memory/tree/*.go`.

pub mod alias;
pub mod apps;
pub mod channels;
pub mod types;

use crate::error::InsprError;
use crate::meta::App;

/// Walks `scope`'s dotted segments from `root`, mirroring `AppMemoryManager.GetApp`.
/// The empty scope denotes root.
pub(crate) fn get<'a>(root: &'a App, scope: &str) -> Result<&'a App, InsprError> {
    if scope.is_empty() {
        return Ok(root);
    }
    let mut node = root;
    for seg in scope.split('.') {
        node = node
            .spec
            .apps
            .get(seg)
            .ok_or_else(|| InsprError::not_found(format!("dApp not found for scope '{scope}'")))?;
    }
    Ok(node)
}

pub(crate) fn get_mut<'a>(root: &'a mut App, scope: &str) -> Result<&'a mut App, InsprError> {
    if scope.is_empty() {
        return Ok(root);
    }
    let mut node = root;
    for seg in scope.split('.') {
        node = node
            .spec
            .apps
            .get_mut(seg)
            .ok_or_else(|| InsprError::not_found(format!("dApp not found for scope '{scope}'")))?;
    }
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::Metadata;

    #[test]
    fn get_walks_nested_scopes_and_root_is_empty_string() {
        let mut root = App::default();
        let mut child = App {
            meta: Metadata {
                name: "a".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        child.spec.apps.insert(
            "b".into(),
            App {
                meta: Metadata {
                    name: "b".into(),
                    ..Default::default()
                },
                ..Default::default()
            },
        );
        root.spec.apps.insert("a".into(), child);

        assert!(get(&root, "").is_ok());
        assert_eq!(get(&root, "a.b").unwrap().meta.name, "b");
        assert!(get(&root, "a.missing").is_err());
    }
}
