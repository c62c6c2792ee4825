//! The Apps entity manager (spec §4.E "Apps"). Grounded in `dapp.go`'s
//! `AppMemoryManager` and the wiring helpers in `dapp_utils.go`
//! (`addAppInTree`, `connectAppsBoundaries`, `attachRoutes`).

use super::{get, get_mut};
use crate::broker::BrokersConfig;
use crate::error::{InsprError, MultiError};
use crate::meta::{App, AppAuth, RouteConnection};
use crate::scope::{inject_uuid, join_scopes, remove_last_part_in_scope};
use crate::validation;
use std::collections::BTreeMap;
use tracing::debug;

/// Walks `scope`'s dotted path under `root`. The empty scope denotes root itself.
pub fn get_app<'a>(root: &'a App, scope: &str) -> Result<&'a App, InsprError> {
    get(root, scope)
}

/// Creates `app` under `scope`. Steps, per spec §4.E: (i) validate the subtree
/// recursively; (ii) inject UUIDs and propagate `auth` downward unless overridden;
/// (iii) insert into the parent; (iv) validate boundaries against ancestor scopes;
/// (v) wire `connectedApps`/`connectedAliases`/`connectedChannels`.
pub fn create(
    root: &mut App,
    scope: &str,
    mut app: App,
    brokers: &BrokersConfig,
    committed: &App,
) -> Result<(), MultiError> {
    let parent = get(root, scope)?;
    if parent.spec.apps.contains_key(&app.meta.name) {
        return Err(InsprError::already_exists(format!(
            "dApp '{}' already exists in scope '{scope}'",
            app.meta.name
        ))
        .into());
    }
    let parent_is_leaf = parent.is_leaf();

    validation::recursive_check_and_refine_app(&mut app, scope, parent_is_leaf, brokers)?;

    let old_sibling = get(committed, scope)
        .ok()
        .and_then(|p| p.spec.apps.get(&app.meta.name));
    assign_identity(&mut app, old_sibling);
    propagate_auth(&mut app, &parent.auth.clone());

    let new_scope = join_scopes(scope, &app.meta.name)?;
    let parent_mut = get_mut(root, scope)?;
    parent_mut.spec.apps.insert(app.meta.name.clone(), app);

    validation::recursive_boundary_validation(root, &new_scope)?;
    wire(root, &new_scope)?;

    debug!(scope = %new_scope, "dApp created");
    Ok(())
}

/// Updates the App at `scope`. Refuses renames and leaf/composite conversion;
/// preserves UUIDs by lookup in the committed tree.
pub fn update(
    root: &mut App,
    scope: &str,
    mut app: App,
    brokers: &BrokersConfig,
    committed: &App,
) -> Result<(), MultiError> {
    let existing = get(root, scope)?;
    if existing.meta.name != app.meta.name {
        return Err(InsprError::invalid_app("cannot rename a dApp via update").into());
    }
    if existing.is_leaf() != app.is_leaf() {
        return Err(InsprError::invalid_app(
            "cannot convert a leaf dApp to composite (or vice versa) via update",
        )
        .into());
    }

    let (parent_scope, _) = remove_last_part_in_scope(scope)?;
    let parent_is_leaf = get(root, &parent_scope)?.is_leaf();
    validation::recursive_check_and_refine_app(&mut app, &parent_scope, parent_is_leaf, brokers)?;

    let old = get(committed, scope).ok();
    assign_identity(&mut app, old);

    let parent_mut = get_mut(root, &parent_scope)?;
    parent_mut.spec.apps.insert(app.meta.name.clone(), app);

    validation::recursive_boundary_validation(root, scope)?;
    wire(root, scope)?;

    debug!(scope, "dApp updated");
    Ok(())
}

/// Deletes the App at `scope`. Refuses if the App is still referenced (its own
/// channels still have connected apps/aliases, or a sibling channel/alias still
/// points at it); recursive children, channels, types, and aliases are dropped with
/// it. Deleting root is forbidden.
pub fn delete(root: &mut App, scope: &str) -> Result<(), MultiError> {
    if scope.is_empty() {
        return Err(InsprError::invalid_app("cannot delete the root dApp").into());
    }

    let app = get(root, scope)?;
    for (ch_name, ch) in &app.spec.channels {
        if !ch.connected_apps.is_empty() || !ch.connected_aliases.is_empty() {
            return Err(InsprError::invalid_app(format!(
                "cannot delete dApp '{}': channel '{ch_name}' is still referenced",
                app.meta.name
            ))
            .into());
        }
    }

    let (parent_scope, name) = remove_last_part_in_scope(scope)?;
    let parent = get(root, &parent_scope)?;
    for (ch_name, ch) in &parent.spec.channels {
        if ch.connected_apps.iter().any(|a| a == &name) {
            return Err(InsprError::invalid_app(format!(
                "cannot delete dApp '{name}': still referenced by channel '{ch_name}'"
            ))
            .into());
        }
    }
    for (alias_name, alias) in &parent.spec.aliases {
        if alias.source == name || alias.destination == name {
            return Err(InsprError::invalid_app(format!(
                "cannot delete dApp '{name}': alias '{alias_name}' still points into it"
            ))
            .into());
        }
    }

    let parent_mut = get_mut(root, &parent_scope)?;
    parent_mut.spec.apps.remove(&name);
    debug!(scope, "dApp deleted");
    Ok(())
}

/// Returns `(input, output)` mappings of boundary name to fully qualified resolved
/// target for the App at `scope`, walking through `usePerm`'s tree.
pub fn resolve_boundary(tree: &App, scope: &str) -> Result<validation::ResolvedBoundary, MultiError> {
    validation::resolve_boundary(tree, scope)
}

/// New UUIDs for a freshly created subtree; old UUIDs carried over one level at a
/// time by name lookup in the previous committed app, per `updateUUID`.
fn assign_identity(app: &mut App, old: Option<&App>) {
    match old {
        Some(old_app) => {
            app.meta.uuid = old_app.meta.uuid.clone();
            for (name, ch) in app.spec.channels.iter_mut() {
                match old_app.spec.channels.get(name) {
                    Some(old_ch) => ch.meta.uuid = old_ch.meta.uuid.clone(),
                    None => inject_uuid(&mut ch.meta),
                }
            }
            for (name, ty) in app.spec.types.iter_mut() {
                match old_app.spec.types.get(name) {
                    Some(old_ty) => ty.meta.uuid = old_ty.meta.uuid.clone(),
                    None => inject_uuid(&mut ty.meta),
                }
            }
            for (name, al) in app.spec.aliases.iter_mut() {
                match old_app.spec.aliases.get(name) {
                    Some(old_al) => al.meta.uuid = old_al.meta.uuid.clone(),
                    None => inject_uuid(&mut al.meta),
                }
            }
        }
        None => {
            inject_uuid(&mut app.meta);
            for ch in app.spec.channels.values_mut() {
                inject_uuid(&mut ch.meta);
            }
            for ty in app.spec.types.values_mut() {
                inject_uuid(&mut ty.meta);
            }
            for al in app.spec.aliases.values_mut() {
                inject_uuid(&mut al.meta);
            }
        }
    }

    for child in app.spec.apps.values_mut() {
        let old_child = old.and_then(|o| o.spec.apps.get(&child.meta.name));
        assign_identity(child, old_child);
    }
}

/// A child's `auth` defaults to its parent's when the child declares no permissions
/// of its own, per `addAppInTree`'s `Permissions == nil` condition.
fn propagate_auth(app: &mut App, parent_auth: &AppAuth) {
    if app.auth.is_unset() {
        app.auth = parent_auth.clone();
    }
    let auth_for_children = app.auth.clone();
    for child in app.spec.apps.values_mut() {
        propagate_auth(child, &auth_for_children);
    }
}

/// Post-insertion wiring for the subtree rooted at `scope`: connects each app's
/// aliases to its own channels' `connectedAliases`, computes the sibling route table,
/// and connects each non-root app's boundary against its parent's channels.
fn wire(root: &mut App, scope: &str) -> Result<(), MultiError> {
    let mut errs = MultiError::new();
    wire_node(root, scope, &mut errs);
    errs.into_result()
}

fn wire_node(root: &mut App, scope: &str, errs: &mut MultiError) {
    if let Ok(app) = get_mut(root, scope) {
        let alias_targets: Vec<(String, String)> = app
            .spec
            .aliases
            .iter()
            .map(|(k, v)| (k.clone(), v.target.clone()))
            .collect();
        for (alias_name, target) in alias_targets {
            if let Some(ch) = app.spec.channels.get_mut(&target)
                && !ch.connected_aliases.iter().any(|a| a == &alias_name) {
                    ch.connected_aliases.push(alias_name);
                }
        }
        attach_routes(app);
    }

    if !scope.is_empty()
        && let Err(e) = connect_boundary(root, scope) {
            errs.push(e);
        }

    let child_names: Vec<String> = get(root, scope)
        .map(|a| a.spec.apps.keys().cloned().collect())
        .unwrap_or_default();
    for name in child_names {
        if let Ok(child_scope) = join_scopes(scope, &name) {
            wire_node(root, &child_scope, errs);
        }
    }
}

/// Connects `app_scope`'s boundary names against its parent's channels (or the
/// parent's own boundary, or an alias that already covers it), mirroring
/// `connectAppBoundary`.
fn connect_boundary(root: &mut App, app_scope: &str) -> Result<(), InsprError> {
    let (parent_scope, app_name) = remove_last_part_in_scope(app_scope)?;
    let boundary_names: Vec<String> = get(root, app_scope)?
        .boundary
        .all()
        .into_iter()
        .map(str::to_string)
        .collect();

    let parent = get_mut(root, &parent_scope)?;
    for name in boundary_names {
        let alias_key = format!("{app_name}.{name}");
        if parent.spec.aliases.contains_key(&alias_key) {
            continue;
        }
        if let Some(ch) = parent.spec.channels.get_mut(&name) {
            if !ch.connected_apps.iter().any(|a| a == &app_name) {
                ch.connected_apps.push(app_name.clone());
            }
            continue;
        }
        if parent.boundary.contains(&name) {
            continue;
        }
        return Err(InsprError::invalid_app(format!(
            "{app_name} boundary '{name}' is invalid"
        )));
    }
    Ok(())
}

/// Computes the sibling route table (spec §9 supplement): when more than one node
/// child exposes endpoints, every node child gets every *other* node's route entry.
fn attach_routes(app: &mut App) {
    let mut routes = BTreeMap::new();
    let mut node_count = 0;
    for (name, child) in &app.spec.apps {
        if child.is_leaf() && !child.meta.uuid.is_empty() {
            node_count += 1;
            if !child.spec.node.spec.endpoints.is_empty() {
                routes.insert(
                    name.clone(),
                    RouteConnection {
                        address: child.meta.uuid.clone(),
                        endpoints: child.spec.node.spec.endpoints.clone(),
                    },
                );
            }
        }
    }
    if node_count > 1 && !routes.is_empty() {
        for (name, child) in app.spec.apps.iter_mut() {
            if child.is_leaf() {
                for (route_name, conn) in &routes {
                    if route_name != name {
                        child.routes.insert(route_name.clone(), conn.clone());
                    }
                }
            }
        }
        app.routes = routes;
    }
}
