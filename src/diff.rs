//! The diff engine (spec §4.C): computes a [`Changelog`] between two trees, classifying
//! every change by [`Kind`] and [`Operation`] bitmasks. Grounded directly in
//! `pkg/meta/utils/diff/diff.go` of the original implementation; the recursive walk and
//! the per-field comparisons below follow that file's structure field for field.

use crate::error::InsprError;
use crate::meta::{App, Boundary, Metadata, Node};
use crate::scope::join_scopes;
use std::collections::{BTreeMap, BTreeSet};

/// Bitmask over the kinds of thing a [`Difference`] can describe.
pub type Kind = u16;

pub const APP: Kind = 1 << 0;
pub const NODE: Kind = 1 << 1;
pub const META: Kind = 1 << 2;
pub const CHANNEL: Kind = 1 << 3;
pub const TYPE: Kind = 1 << 4;
pub const BOUNDARY: Kind = 1 << 5;
pub const FIELD: Kind = 1 << 6;
pub const ANNOTATION: Kind = 1 << 7;
pub const ALIAS: Kind = 1 << 8;
pub const ENVIRONMENT: Kind = 1 << 9;

/// Bitmask over the operation a [`Difference`] records.
pub type Operation = u8;

pub const DELETE: Operation = 1 << 0;
pub const UPDATE: Operation = 1 << 1;
pub const CREATE: Operation = 1 << 2;

const NIL: &str = "<nil>";
const OPAQUE: &str = "{...}";

/// A single field-level difference between two trees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Difference {
    pub field: String,
    pub from: String,
    pub to: String,
    pub kind: Kind,
    pub name: String,
    pub operation: Operation,
}

/// All differences found at one scope, i.e. one App compared against its counterpart.
/// `kind` and `operation` are the bitwise-OR of every [`Difference`] it carries.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Change {
    pub scope: String,
    pub diff: Vec<Difference>,
    pub kind: Kind,
    pub operation: Operation,
}

impl Change {
    fn new(scope: String) -> Self {
        Change {
            scope,
            ..Default::default()
        }
    }

    fn push(&mut self, d: Difference) {
        self.kind |= d.kind;
        self.operation |= d.operation;
        self.diff.push(d);
    }
}

/// An ordered sequence of [`Change`]s, depth-first from root; a parent's `Change`
/// precedes its descendants' (spec §4.C's ordering guarantee).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Changelog(pub Vec<Change>);

impl Changelog {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Change> {
        self.0.iter()
    }
}

impl IntoIterator for Changelog {
    type Item = Change;
    type IntoIter = std::vec::IntoIter<Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Computes the changelog between `from` and `to`, walking both trees in lockstep
/// keyed by App name.
pub fn diff(from: &App, to: &App) -> Result<Changelog, InsprError> {
    let mut cl = Changelog::default();
    diff_into(&mut cl, from, to, String::new())?;
    Ok(cl)
}

fn diff_into(cl: &mut Changelog, from: &App, to: &App, scope: String) -> Result<(), InsprError> {
    if from.meta.name != to.meta.name && !from.meta.name.is_empty() && !to.meta.name.is_empty() {
        return Err(InsprError::bad_request(format!(
            "cannot diff apps with disagreeing names '{}' and '{}'",
            from.meta.name, to.meta.name
        )));
    }

    let mut change = Change::new(scope.clone());
    diff_metadata(&mut change, &from.meta.name, APP, &from.meta, &to.meta, "");
    diff_nodes(&mut change, &from.spec.node, &to.spec.node);
    let pending = diff_apps_shallow(&mut change, &from.spec.apps, &to.spec.apps);
    diff_channels(&mut change, &from.spec.channels, &to.spec.channels);
    diff_types(&mut change, &from.spec.types, &to.spec.types);
    diff_aliases(&mut change, &from.spec.aliases, &to.spec.aliases);
    diff_boundaries(&mut change, &from.boundary, &to.boundary);

    if !change.diff.is_empty() {
        cl.0.push(change);
    }

    // Recurse only after this scope's own Change has been pushed, so a parent's
    // entry always precedes its descendants' (spec §4.C's ordering guarantee).
    for (name, from_app, to_app) in &pending {
        let new_scope = join_scopes(&scope, name)?;
        diff_into(cl, from_app, to_app, new_scope)?;
    }
    Ok(())
}

fn diff_nodes(change: &mut Change, from: &Node, to: &Node) {
    diff_metadata(change, &from.meta.name, NODE, &from.meta, &to.meta, "Spec.Node.");

    if from.spec.image != to.spec.image {
        change.push(Difference {
            field: "Spec.Node.Spec.Image".into(),
            from: from.spec.image.clone(),
            to: to.spec.image.clone(),
            kind: NODE,
            name: String::new(),
            operation: UPDATE,
        });
    }

    if from.spec.replicas != to.spec.replicas {
        change.push(Difference {
            field: "Spec.Node.Spec.Replicas".into(),
            from: from.spec.replicas.to_string(),
            to: to.spec.replicas.to_string(),
            kind: NODE,
            name: String::new(),
            operation: UPDATE,
        });
    }

    diff_env(change, &from.spec.environment, &to.spec.environment);
}

fn diff_env(change: &mut Change, from: &BTreeMap<String, String>, to: &BTreeMap<String, String>) {
    for (key, from_val) in from {
        match to.get(key) {
            Some(to_val) if to_val != from_val => change.push(Difference {
                field: format!("Spec.Node.Spec.Environment[{key}]"),
                from: from_val.clone(),
                to: to_val.clone(),
                kind: ENVIRONMENT,
                name: key.clone(),
                operation: UPDATE,
            }),
            Some(_) => {}
            None => change.push(Difference {
                field: format!("Spec.Node.Spec.Environment[{key}]"),
                from: from_val.clone(),
                to: NIL.into(),
                kind: ENVIRONMENT,
                name: key.clone(),
                operation: DELETE,
            }),
        }
    }
    for (key, to_val) in to {
        if !from.contains_key(key) {
            change.push(Difference {
                field: format!("Spec.Node.Spec.Environment[{key}]"),
                from: NIL.into(),
                to: to_val.clone(),
                kind: ENVIRONMENT,
                name: key.clone(),
                operation: CREATE,
            });
        }
    }
}

fn diff_boundaries(change: &mut Change, from: &Boundary, to: &Boundary) {
    diff_boundary_side(change, "Spec.Boundary.Input", &from.input_set(), &to.input_set());
    diff_boundary_side(change, "Spec.Boundary.Output", &from.output_set(), &to.output_set());
}

fn diff_boundary_side(change: &mut Change, field: &str, from: &BTreeSet<&str>, to: &BTreeSet<&str>) {
    for name in from.symmetric_difference(to) {
        let (from_val, to_val, op) = if from.contains(name) {
            (name.to_string(), NIL.into(), DELETE)
        } else {
            (NIL.into(), name.to_string(), CREATE)
        };
        change.push(Difference {
            field: field.into(),
            from: from_val,
            to: to_val,
            kind: BOUNDARY,
            name: name.to_string(),
            operation: op,
        });
    }
}

/// Appends the `Spec.Apps[name]` create/delete differences to `change` and returns
/// the `(name, from, to)` triples still needing a recursive [`diff_into`] — deferred
/// so the caller can push this scope's own `Change` before any descendant's.
fn diff_apps_shallow(change: &mut Change, from: &BTreeMap<String, App>, to: &BTreeMap<String, App>) -> Vec<(String, App, App)> {
    let from_keys: BTreeSet<&String> = from.keys().collect();
    let to_keys: BTreeSet<&String> = to.keys().collect();
    let mut pending = Vec::new();

    for name in from_keys.symmetric_difference(&to_keys) {
        let existed = from.contains_key(name.as_str());
        let (from_val, to_val, op) = if existed {
            (OPAQUE.into(), NIL.into(), DELETE)
        } else {
            (NIL.into(), OPAQUE.into(), CREATE)
        };
        if !existed {
            pending.push((name.to_string(), App::default(), to[name.as_str()].clone()));
        }
        change.push(Difference {
            field: format!("Spec.Apps[{name}]"),
            from: from_val,
            to: to_val,
            kind: APP,
            name: name.to_string(),
            operation: op,
        });
    }

    for name in from_keys.intersection(&to_keys) {
        pending.push((name.to_string(), from[name.as_str()].clone(), to[name.as_str()].clone()));
    }

    pending
}

fn diff_channels(
    change: &mut Change,
    from: &BTreeMap<String, crate::meta::Channel>,
    to: &BTreeMap<String, crate::meta::Channel>,
) {
    let from_keys: BTreeSet<&String> = from.keys().collect();
    let to_keys: BTreeSet<&String> = to.keys().collect();

    for name in from_keys.symmetric_difference(&to_keys) {
        let (from_val, to_val, op) = if from.contains_key(name.as_str()) {
            (OPAQUE.into(), NIL.into(), DELETE)
        } else {
            (NIL.into(), OPAQUE.into(), CREATE)
        };
        change.push(Difference {
            field: format!("Spec.Channels[{name}]"),
            from: from_val,
            to: to_val,
            kind: CHANNEL,
            name: name.to_string(),
            operation: op,
        });
    }

    for name in from_keys.intersection(&to_keys) {
        let from_ch = &from[name.as_str()];
        let to_ch = &to[name.as_str()];
        if from_ch.spec.r#type != to_ch.spec.r#type {
            change.push(Difference {
                field: format!("Spec.Channels[{name}].Spec.Type"),
                from: from_ch.spec.r#type.clone(),
                to: to_ch.spec.r#type.clone(),
                kind: CHANNEL,
                name: name.to_string(),
                operation: UPDATE,
            });
        }
        diff_metadata(change, name, CHANNEL, &from_ch.meta, &to_ch.meta, &format!("Spec.Channels[{name}]."));
    }
}

fn diff_types(change: &mut Change, from: &BTreeMap<String, crate::meta::Type>, to: &BTreeMap<String, crate::meta::Type>) {
    let from_keys: BTreeSet<&String> = from.keys().collect();
    let to_keys: BTreeSet<&String> = to.keys().collect();

    for name in from_keys.symmetric_difference(&to_keys) {
        let (from_val, to_val, op) = if from.contains_key(name.as_str()) {
            (OPAQUE.into(), NIL.into(), DELETE)
        } else {
            (NIL.into(), OPAQUE.into(), CREATE)
        };
        change.push(Difference {
            field: format!("Spec.Types[{name}]"),
            from: from_val,
            to: to_val,
            kind: TYPE,
            name: name.to_string(),
            operation: op,
        });
    }

    for name in from_keys.intersection(&to_keys) {
        let from_ty = &from[name.as_str()];
        let to_ty = &to[name.as_str()];
        if from_ty.schema != to_ty.schema {
            change.push(Difference {
                field: format!("Spec.Types[{name}].Schema"),
                from: OPAQUE.into(),
                to: OPAQUE.into(),
                kind: TYPE,
                name: name.to_string(),
                operation: UPDATE,
            });
        }
        diff_metadata(change, name, TYPE, &from_ty.meta, &to_ty.meta, &format!("Spec.Types[{name}]."));
    }
}

fn diff_aliases(change: &mut Change, from: &BTreeMap<String, crate::meta::Alias>, to: &BTreeMap<String, crate::meta::Alias>) {
    let from_keys: BTreeSet<&String> = from.keys().collect();
    let to_keys: BTreeSet<&String> = to.keys().collect();

    for name in from_keys.symmetric_difference(&to_keys) {
        let (from_val, to_val, op) = if from.contains_key(name.as_str()) {
            (OPAQUE.into(), NIL.into(), DELETE)
        } else {
            (NIL.into(), OPAQUE.into(), CREATE)
        };
        change.push(Difference {
            field: format!("Spec.Aliases[{name}]"),
            from: from_val,
            to: to_val,
            kind: ALIAS,
            name: name.to_string(),
            operation: op,
        });
    }

    for name in from_keys.intersection(&to_keys) {
        let from_al = &from[name.as_str()];
        let to_al = &to[name.as_str()];
        if from_al.target != to_al.target {
            change.push(Difference {
                field: format!("Spec.Aliases[{name}]"),
                from: from_al.target.clone(),
                to: to_al.target.clone(),
                kind: ALIAS,
                name: name.to_string(),
                operation: UPDATE,
            });
        }
    }
}

/// Compares `name`, `reference`, `parent`, and annotation set differences, tagging
/// every emitted [`Difference`] with `META | parent_kind` per the original's
/// `diffMetadata(parentElement, parentKind, from, to, ctx)`.
fn diff_metadata(change: &mut Change, parent_element: &str, parent_kind: Kind, from: &Metadata, to: &Metadata, ctx: &str) {
    let kind = META | parent_kind;

    if from.name != to.name {
        change.push(Difference {
            field: format!("{ctx}Meta.Name"),
            from: from.name.clone(),
            to: to.name.clone(),
            kind,
            name: parent_element.into(),
            operation: UPDATE,
        });
    }
    if from.reference != to.reference {
        change.push(Difference {
            field: format!("{ctx}Meta.Reference"),
            from: from.reference.clone(),
            to: to.reference.clone(),
            kind,
            name: parent_element.into(),
            operation: UPDATE,
        });
    }
    if from.parent != to.parent {
        change.push(Difference {
            field: format!("{ctx}Meta.Parent"),
            from: from.parent.clone(),
            to: to.parent.clone(),
            kind,
            name: parent_element.into(),
            operation: UPDATE,
        });
    }

    let from_keys: BTreeSet<&String> = from.annotations.keys().collect();
    let to_keys: BTreeSet<&String> = to.annotations.keys().collect();

    for key in from_keys.symmetric_difference(&to_keys) {
        let (from_val, to_val, op) = match (from.annotations.get(key.as_str()), to.annotations.get(key.as_str())) {
            (Some(v), None) => (v.clone(), NIL.into(), DELETE),
            (None, Some(v)) => (NIL.into(), v.clone(), CREATE),
            _ => unreachable!("symmetric difference guarantees exactly one side present"),
        };
        change.push(Difference {
            field: format!("{ctx}Meta.Annotations[{key}]"),
            from: from_val,
            to: to_val,
            kind: kind | ANNOTATION,
            name: parent_element.into(),
            operation: op,
        });
    }

    for key in from_keys.intersection(&to_keys) {
        let from_val = &from.annotations[key.as_str()];
        let to_val = &to.annotations[key.as_str()];
        if from_val != to_val {
            change.push(Difference {
                field: format!("{ctx}Meta.Annotations[{key}]"),
                from: from_val.clone(),
                to: to_val.clone(),
                kind: kind | ANNOTATION,
                name: parent_element.into(),
                operation: UPDATE,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{AppSpec, Node, NodeSpec};

    fn leaf(name: &str, image: &str) -> App {
        App {
            meta: Metadata {
                name: name.into(),
                ..Default::default()
            },
            spec: AppSpec {
                node: Node {
                    meta: Metadata {
                        name: name.into(),
                        ..Default::default()
                    },
                    spec: NodeSpec {
                        image: image.into(),
                        ..Default::default()
                    },
                },
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn create_leaf_under_root_yields_nested_app_create() {
        let from = App::default();
        let mut to = App::default();
        to.spec.apps.insert("pinger".into(), leaf("pinger", "ping:1"));

        let cl = diff(&from, &to).unwrap();
        assert_eq!(cl.0.len(), 2);

        let root_change = &cl.0[0];
        assert_eq!(root_change.scope, "");
        assert!(root_change.diff.iter().any(|d| d.field == "Spec.Apps[pinger]" && d.operation == CREATE));

        let child_change = &cl.0[1];
        assert_eq!(child_change.scope, "pinger");
        assert!(child_change.kind & NODE != 0);
    }

    #[test]
    fn identical_trees_produce_an_empty_changelog() {
        let a = leaf("x", "img:1");
        assert!(diff(&a, &a).unwrap().is_empty());
    }

    #[test]
    fn image_update_is_reported_as_node_kind_update() {
        let from = leaf("x", "img:1");
        let to = leaf("x", "img:2");
        let cl = diff(&from, &to).unwrap();
        assert_eq!(cl.0.len(), 1);
        assert!(cl.0[0].diff.iter().any(|d| d.field == "Spec.Node.Spec.Image" && d.operation == UPDATE));
    }

    #[test]
    fn boundary_side_diffs_are_set_based() {
        let mut from = App::default();
        from.boundary.input = vec!["a".into(), "b".into()];
        let mut to = App::default();
        to.boundary.input = vec!["b".into(), "a".into()];
        assert!(diff(&from, &to).unwrap().is_empty());
    }

    #[test]
    fn disagreeing_root_names_are_rejected() {
        let mut from = App::default();
        from.meta.name = "a".into();
        let mut to = App::default();
        to.meta.name = "b".into();
        let err = diff(&from, &to).unwrap_err();
        assert!(err.has_kind(crate::error::BAD_REQUEST));
    }
}
