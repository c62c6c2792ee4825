//! The Alias entity manager (spec §4.E "Alias"). Name format `<childApp>.<boundaryName>`.

use super::{get, get_mut};
use crate::error::InsprError;
use crate::meta::{Alias, App};
use crate::scope::inject_uuid;

fn split_name(name: &str) -> Result<(&str, &str), InsprError> {
    name.split_once('.')
        .ok_or_else(|| InsprError::invalid_alias(format!("alias name '{name}' must be '<childApp>.<boundaryName>'")))
}

fn target_resolves(app: &App, target: &str) -> bool {
    app.spec.channels.contains_key(target)
        || app.boundary.contains(target)
        || app.spec.aliases.contains_key(target)
}

pub fn get_alias<'a>(root: &'a App, scope: &str, name: &str) -> Result<&'a Alias, InsprError> {
    get(root, scope)?
        .spec
        .aliases
        .get(name)
        .ok_or_else(|| InsprError::not_found(format!("alias '{name}' not found in scope '{scope}'")))
}

/// Requires both that `<childApp>` exists under `scope` and that `target` resolves
/// (a local channel, or an outer alias/boundary visible to the parent).
pub fn create(root: &mut App, scope: &str, mut alias: Alias) -> Result<(), InsprError> {
    let (child_name, _boundary_name) = split_name(&alias.meta.name)?;
    let app = get_mut(root, scope)?;

    if !app.spec.apps.contains_key(child_name) {
        return Err(InsprError::invalid_alias(format!(
            "child dApp '{child_name}' does not exist in scope '{scope}'"
        )));
    }
    if app.spec.aliases.contains_key(&alias.meta.name) {
        return Err(InsprError::already_exists(format!(
            "alias '{}' already exists in scope '{scope}'",
            alias.meta.name
        )));
    }
    if !target_resolves(app, &alias.target) {
        return Err(InsprError::invalid_alias(format!(
            "alias '{}' points to an unexistent channel '{}'",
            alias.meta.name, alias.target
        )));
    }

    inject_uuid(&mut alias.meta);
    alias.meta.parent = scope.to_string();
    if let Some(ch) = app.spec.channels.get_mut(&alias.target) {
        ch.connected_aliases.push(alias.meta.name.clone());
    }
    app.spec.aliases.insert(alias.meta.name.clone(), alias);
    Ok(())
}

/// Renaming an alias is not supported: per spec §9's UUID-tracks-name rule, a rename
/// is a delete followed by a create, not an update.
pub fn update(root: &mut App, scope: &str, mut alias: Alias) -> Result<(), InsprError> {
    let app = get_mut(root, scope)?;
    let existing = app
        .spec
        .aliases
        .get(&alias.meta.name)
        .ok_or_else(|| InsprError::not_found(format!("alias '{}' not found", alias.meta.name)))?;

    if !target_resolves(app, &alias.target) {
        return Err(InsprError::invalid_alias(format!(
            "alias '{}' points to an unexistent channel '{}'",
            alias.meta.name, alias.target
        )));
    }

    let old_target = existing.target.clone();
    alias.meta.uuid = existing.meta.uuid.clone();
    alias.meta.parent = scope.to_string();

    if old_target != alias.target {
        if let Some(ch) = app.spec.channels.get_mut(&old_target) {
            ch.connected_aliases.retain(|a| a != &alias.meta.name);
        }
        if let Some(ch) = app.spec.channels.get_mut(&alias.target) {
            ch.connected_aliases.push(alias.meta.name.clone());
        }
    }
    app.spec.aliases.insert(alias.meta.name.clone(), alias);
    Ok(())
}

/// Refuses if the named child's boundary still declares the aliased name.
pub fn delete(root: &mut App, scope: &str, name: &str) -> Result<(), InsprError> {
    let (child_name, boundary_name) = split_name(name)?;
    let app = get_mut(root, scope)?;
    let alias = app
        .spec
        .aliases
        .get(name)
        .cloned()
        .ok_or_else(|| InsprError::not_found(format!("alias '{name}' not found")))?;

    if let Some(child) = app.spec.apps.get(child_name)
        && child.boundary.contains(boundary_name) {
            return Err(InsprError::invalid_alias(format!(
                "boundary '{boundary_name}' of '{child_name}' still depends on alias '{name}'"
            )));
        }

    if let Some(ch) = app.spec.channels.get_mut(&alias.target) {
        ch.connected_aliases.retain(|a| a != name);
    }
    app.spec.aliases.remove(name);
    Ok(())
}
