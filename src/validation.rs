//! Structural validation and the boundary resolver (spec §4.F). Grounded in
//! `dapp_utils.go`'s `validAppStructure`, `recursiveCheckAndRefineApp`,
//! `checkAndUpdates`, `validAliases`, and the `ResolveBoundary` contract confirmed by
//! `dapp_test.go`.

use crate::broker::{select_broker_from_priority_list, BrokersConfig};
use crate::error::{InsprError, MultiError};
use crate::managers::get;
use crate::meta::App;
use crate::scope::{join_scopes, remove_last_part_in_scope, structure_name_is_valid};
use std::collections::BTreeMap;

/// `(input, output)` mappings of boundary name to fully qualified resolved target.
pub type ResolvedBoundary = (BTreeMap<String, String>, BTreeMap<String, String>);

/// Individual structural checks for one App against its parent's leaf-ness, run
/// top-down by [`recursive_check_and_refine_app`]. Mutates `app` in place: this is
/// also where broker selection and `Type.connectedChannels` wiring happens, following
/// the original's `checkAndUpdates`.
pub fn valid_app_structure(
    app: &mut App,
    parent_is_leaf: bool,
    brokers: &BrokersConfig,
) -> Result<(), MultiError> {
    let mut errs = MultiError::new();

    if let Err(e) = structure_name_is_valid(&app.meta.name) {
        errs.push(e);
    }
    if app.is_leaf() && !app.spec.apps.is_empty() {
        errs.push(InsprError::invalid_app(
            "a node cannot contain child dApps",
        ));
    }
    if parent_is_leaf {
        errs.push(InsprError::invalid_app(
            "cannot create a dApp whose parent is a Node",
        ));
    }
    if let Err(e) = check_and_updates(app, brokers) {
        errs.push(e);
    }
    if let Err(e) = valid_aliases(app) {
        errs.push(e);
    }

    errs.into_result()
}

/// Runs [`valid_app_structure`] top-down over `app` and its descendants, refining
/// `meta.parent` on every descendant as it goes (mirrors
/// `recursiveCheckAndRefineApp`).
pub fn recursive_check_and_refine_app(
    app: &mut App,
    parent_scope: &str,
    parent_is_leaf: bool,
    brokers: &BrokersConfig,
) -> Result<(), MultiError> {
    app.meta.parent = parent_scope.to_string();
    if app.is_leaf() {
        app.spec.node.meta.parent = parent_scope.to_string();
    }

    let mut errs = MultiError::new();
    if let Err(e) = valid_app_structure(app, parent_is_leaf, brokers) {
        errs.extend(e.into_errors());
    }

    let own_scope = join_scopes(parent_scope, &app.meta.name).unwrap_or_default();
    let own_is_leaf = app.is_leaf();
    for child in app.spec.apps.values_mut() {
        if let Err(e) = recursive_check_and_refine_app(child, &own_scope, own_is_leaf, brokers) {
            errs.extend(e.into_errors());
        }
    }

    errs.into_result()
}

fn check_and_updates(app: &mut App, brokers: &BrokersConfig) -> Result<(), InsprError> {
    let boundary_names = app.boundary.all();

    for type_name in app.spec.types.keys() {
        structure_name_is_valid(type_name)
            .map_err(|_| InsprError::invalid_type(format!("invalid type name '{type_name}'")))?;
    }

    let channel_names: Vec<String> = app.spec.channels.keys().cloned().collect();
    for channel_name in &channel_names {
        structure_name_is_valid(channel_name).map_err(|_| {
            InsprError::invalid_channel(format!("invalid channel name '{channel_name}'"))
        })?;

        let type_name = app.spec.channels[channel_name].spec.r#type.clone();
        if !type_name.is_empty() {
            if !app.spec.types.contains_key(&type_name) {
                return Err(InsprError::invalid_channel(format!(
                    "channel '{channel_name}' using unexistent type '{type_name}'"
                )));
            }

            let priority = app.spec.channels[channel_name].spec.broker_priority_list.clone();
            let broker = select_broker_from_priority_list(&priority, brokers)?;
            app.spec.channels.get_mut(channel_name).unwrap().spec.selected_broker = broker;

            let connected = &mut app.spec.types.get_mut(&type_name).unwrap().connected_channels;
            if !connected.iter().any(|c| c == channel_name) {
                connected.push(channel_name.clone());
            }
        }

        if boundary_names.contains(channel_name.as_str()) {
            return Err(InsprError::invalid_app(format!(
                "channel and boundary with same name '{channel_name}'"
            )));
        }
    }

    Ok(())
}

fn valid_aliases(app: &App) -> Result<(), InsprError> {
    let mut messages = Vec::new();
    for (key, alias) in &app.spec.aliases {
        if app.spec.channels.contains_key(&alias.target) || app.boundary.contains(&alias.target) {
            continue;
        }
        messages.push(format!(
            "alias '{key}' points to an unexistent channel '{}'",
            alias.target
        ));
    }
    if messages.is_empty() {
        Ok(())
    } else {
        Err(InsprError::invalid_alias(messages.join("; ")))
    }
}

/// Validates every boundary name of `scope` and its descendants resolves, without
/// mutating the tree. Mirrors `recursiveBoundaryValidation`.
pub fn recursive_boundary_validation(root: &App, scope: &str) -> Result<(), MultiError> {
    let mut errs = MultiError::new();
    if let Err(e) = resolve_boundary(root, scope) {
        errs.extend(e.into_errors());
        return errs.into_result();
    }

    let app = match get(root, scope) {
        Ok(app) => app,
        Err(e) => {
            errs.push(e);
            return errs.into_result();
        }
    };
    let child_names: Vec<String> = app.spec.apps.keys().cloned().collect();
    for name in child_names {
        let Ok(child_scope) = join_scopes(scope, &name) else {
            continue;
        };
        if let Err(e) = recursive_boundary_validation(root, &child_scope) {
            errs.extend(e.into_errors());
        }
    }
    errs.into_result()
}

/// Resolves every boundary name of the App at `scope`, returning `(input, output)`
/// mappings of boundary name to fully qualified target, per `ResolveBoundary`.
pub fn resolve_boundary(root: &App, scope: &str) -> Result<ResolvedBoundary, MultiError> {
    let app = get(root, scope)?;
    let mut errs = MultiError::new();
    let mut input = BTreeMap::new();
    let mut output = BTreeMap::new();

    for name in &app.boundary.input {
        match resolve_boundary_name(root, scope, name) {
            Ok(resolved) => {
                input.insert(name.clone(), resolved);
            }
            Err(e) => errs.push(e),
        }
    }
    for name in &app.boundary.output {
        match resolve_boundary_name(root, scope, name) {
            Ok(resolved) => {
                output.insert(name.clone(), resolved);
            }
            Err(e) => errs.push(e),
        }
    }

    if !errs.is_empty() {
        return Err(errs);
    }
    Ok((input, output))
}

/// Per boundary name `b`: look up `parent.aliases["<appName>.<b>"]`; if present, use
/// its `target` as the new name and ascend to the grandparent; else look up
/// `parent.channels[b]`; if present, return its fully qualified scope; else ascend.
/// Terminates on reaching root without a match (failure) or a channel (success);
/// cycles are impossible because every step strictly ascends.
fn resolve_boundary_name(root: &App, scope: &str, name: &str) -> Result<String, InsprError> {
    let mut current_scope = scope.to_string();
    let mut current_name = name.to_string();

    loop {
        if current_scope.is_empty() {
            return Err(InsprError::bad_request(format!(
                "boundary '{name}' could not be resolved from scope '{scope}'"
            )));
        }

        let (parent_scope, app_name) = remove_last_part_in_scope(&current_scope)?;
        let parent = get(root, &parent_scope)?;
        let alias_key = format!("{app_name}.{current_name}");

        if let Some(alias) = parent.spec.aliases.get(&alias_key) {
            current_name = alias.target.clone();
            current_scope = parent_scope;
            continue;
        }
        if parent.spec.channels.contains_key(&current_name) {
            return join_scopes(&parent_scope, &current_name);
        }
        current_scope = parent_scope;
    }
}
