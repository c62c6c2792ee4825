//! The Types entity manager (spec §4.E "Types").

use super::{get, get_mut};
use crate::error::InsprError;
use crate::meta::{App, Type};
use crate::scope::{inject_uuid, structure_name_is_valid};

pub fn get_type<'a>(root: &'a App, scope: &str, name: &str) -> Result<&'a Type, InsprError> {
    get(root, scope)?
        .spec
        .types
        .get(name)
        .ok_or_else(|| InsprError::not_found(format!("type '{name}' not found in scope '{scope}'")))
}

pub fn create(root: &mut App, scope: &str, mut ty: Type) -> Result<(), InsprError> {
    structure_name_is_valid(&ty.meta.name)?;
    let app = get_mut(root, scope)?;
    if app.spec.types.contains_key(&ty.meta.name) {
        return Err(InsprError::already_exists(format!(
            "type '{}' already exists in scope '{scope}'",
            ty.meta.name
        )));
    }
    inject_uuid(&mut ty.meta);
    ty.meta.parent = scope.to_string();
    ty.connected_channels.clear();
    app.spec.types.insert(ty.meta.name.clone(), ty);
    Ok(())
}

/// Updating the schema of a Type with connected channels must cascade node updates;
/// that cascade is the reactor's responsibility (spec §4.G "Type Update"), not this
/// manager's — it only preserves `connectedChannels` and the UUID.
pub fn update(root: &mut App, scope: &str, mut ty: Type) -> Result<(), InsprError> {
    let app = get_mut(root, scope)?;
    let existing = app
        .spec
        .types
        .get(&ty.meta.name)
        .ok_or_else(|| InsprError::not_found(format!("type '{}' not found", ty.meta.name)))?;
    ty.meta.uuid = existing.meta.uuid.clone();
    ty.meta.parent = scope.to_string();
    ty.connected_channels = existing.connected_channels.clone();
    app.spec.types.insert(ty.meta.name.clone(), ty);
    Ok(())
}

/// Refuses if `connectedChannels` is non-empty.
pub fn delete(root: &mut App, scope: &str, name: &str) -> Result<(), InsprError> {
    let app = get_mut(root, scope)?;
    let ty = app
        .spec
        .types
        .get(name)
        .ok_or_else(|| InsprError::not_found(format!("type '{name}' not found")))?;
    if !ty.connected_channels.is_empty() {
        return Err(InsprError::invalid_type(format!(
            "type '{name}' is still used by channels {:?}",
            ty.connected_channels
        )));
    }
    app.spec.types.remove(name);
    Ok(())
}
