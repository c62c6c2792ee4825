//! The Channels entity manager (spec §4.E "Channels").

use super::{get, get_mut};
use crate::broker::{select_broker_from_priority_list, BrokersConfig};
use crate::error::InsprError;
use crate::meta::{App, Channel};
use crate::scope::{inject_uuid, structure_name_is_valid};

pub fn get_channel<'a>(root: &'a App, scope: &str, name: &str) -> Result<&'a Channel, InsprError> {
    get(root, scope)?
        .spec
        .channels
        .get(name)
        .ok_or_else(|| InsprError::not_found(format!("channel '{name}' not found in scope '{scope}'")))
}

/// `spec.type` must reference an existing Type in the same scope; the selected
/// broker is resolved from `spec.brokerPriorityList`.
pub fn create(
    root: &mut App,
    scope: &str,
    mut channel: Channel,
    brokers: &BrokersConfig,
) -> Result<(), InsprError> {
    structure_name_is_valid(&channel.meta.name)?;
    let app = get_mut(root, scope)?;

    if app.spec.channels.contains_key(&channel.meta.name) {
        return Err(InsprError::already_exists(format!(
            "channel '{}' already exists in scope '{scope}'",
            channel.meta.name
        )));
    }
    if !app.spec.types.contains_key(&channel.spec.r#type) {
        return Err(InsprError::invalid_channel(format!(
            "channel '{}' using unexistent type '{}'",
            channel.meta.name, channel.spec.r#type
        )));
    }

    inject_uuid(&mut channel.meta);
    channel.meta.parent = scope.to_string();
    channel.spec.selected_broker =
        select_broker_from_priority_list(&channel.spec.broker_priority_list, brokers)?;
    channel.connected_apps.clear();
    channel.connected_aliases.clear();

    let name = channel.meta.name.clone();
    let type_name = channel.spec.r#type.clone();
    app.spec.channels.insert(name.clone(), channel);
    let connected = &mut app.spec.types.get_mut(&type_name).unwrap().connected_channels;
    if !connected.iter().any(|c| c == &name) {
        connected.push(name);
    }
    Ok(())
}

/// Preserves `connectedApps`/`connectedAliases` across an update; only `spec.type`
/// and `spec.brokerPriorityList` are meaningfully mutable from the caller's payload.
pub fn update(
    root: &mut App,
    scope: &str,
    mut channel: Channel,
    brokers: &BrokersConfig,
) -> Result<(), InsprError> {
    let app = get_mut(root, scope)?;
    let existing = app
        .spec
        .channels
        .get(&channel.meta.name)
        .ok_or_else(|| InsprError::not_found(format!("channel '{}' not found", channel.meta.name)))?;

    channel.meta.uuid = existing.meta.uuid.clone();
    channel.meta.parent = scope.to_string();
    channel.connected_apps = existing.connected_apps.clone();
    channel.connected_aliases = existing.connected_aliases.clone();

    if !app.spec.types.contains_key(&channel.spec.r#type) {
        return Err(InsprError::invalid_channel(format!(
            "channel '{}' using unexistent type '{}'",
            channel.meta.name, channel.spec.r#type
        )));
    }
    channel.spec.selected_broker =
        select_broker_from_priority_list(&channel.spec.broker_priority_list, brokers)?;

    app.spec.channels.insert(channel.meta.name.clone(), channel);
    Ok(())
}

/// Refuses if either `connectedApps` or `connectedAliases` is non-empty.
pub fn delete(root: &mut App, scope: &str, name: &str) -> Result<(), InsprError> {
    let app = get_mut(root, scope)?;
    let channel = app
        .spec
        .channels
        .get(name)
        .ok_or_else(|| InsprError::not_found(format!("channel '{name}' not found")))?;

    if !channel.connected_apps.is_empty() || !channel.connected_aliases.is_empty() {
        return Err(InsprError::invalid_channel(format!(
            "channel '{name}' is still referenced"
        )));
    }

    let type_name = channel.spec.r#type.clone();
    app.spec.channels.remove(name);
    if let Some(ty) = app.spec.types.get_mut(&type_name) {
        ty.connected_channels.retain(|c| c != name);
    }
    Ok(())
}
