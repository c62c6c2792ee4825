//! The reactor framework (spec §4.G): binds predicates over `Changelog` entries to
//! side-effect callbacks on the Channel and Node operators, applying them in a
//! defined order and aggregating errors. Grounded directly in
//! `pkg/api/handlers/reactions.go`'s reaction wiring.

use crate::diff::{Change, Changelog, Difference, ALIAS, APP, CHANNEL, CREATE, DELETE, NODE, TYPE, UPDATE};
use crate::error::{InsprError, MultiError};
use crate::managers::get;
use crate::meta::App;
use crate::operators::{ChannelOperators, NodeOperator};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Process-wide (but explicitly constructed, never global) configuration for the
/// reactor's operator calls — spec §5's "per-call timeout, suggested default 30s".
#[derive(Debug, Clone)]
pub struct ReactorConfig {
    pub operator_timeout: Duration,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        ReactorConfig {
            operator_timeout: Duration::from_secs(30),
        }
    }
}

/// Receives individual [`Difference`]s.
pub struct DifferenceReaction {
    pub name: &'static str,
    pub predicate: Box<dyn Fn(&str, &Difference, &App, &App) -> bool + Send + Sync>,
    pub apply: Box<dyn Fn(&str, &Difference, &App, &App) -> Result<(), InsprError> + Send + Sync>,
}

/// Receives whole [`Change`]s, used when per-scope aggregate state matters.
pub struct ChangeReaction {
    pub name: &'static str,
    pub predicate: Box<dyn Fn(&Change, &App, &App) -> bool + Send + Sync>,
    pub apply: Box<dyn Fn(&Change, &App, &App) -> Result<(), InsprError> + Send + Sync>,
}

/// Visits every `Difference` in `cl`, invoking every reaction whose predicate
/// matches; aggregates errors into a multi-error. No reactor aborts the pipeline.
pub fn for_each_diff_filtered(
    cl: &Changelog,
    reactions: &[DifferenceReaction],
    tree: &App,
    committed: &App,
) -> Result<(), MultiError> {
    let mut errs = MultiError::new();
    for change in cl.iter() {
        for d in &change.diff {
            for r in reactions {
                if (r.predicate)(&change.scope, d, tree, committed)
                    && let Err(e) = (r.apply)(&change.scope, d, tree, committed) {
                        warn!(reaction = r.name, scope = %change.scope, error = %e, "reaction failed");
                        errs.push(e);
                    }
            }
        }
    }
    errs.into_result()
}

/// Visits every `Change` in `cl`, invoking every reaction whose predicate matches.
pub fn for_each_filtered(
    cl: &Changelog,
    reactions: &[ChangeReaction],
    tree: &App,
    committed: &App,
) -> Result<(), MultiError> {
    let mut errs = MultiError::new();
    for change in cl.iter() {
        for r in reactions {
            if (r.predicate)(change, tree, committed)
                && let Err(e) = (r.apply)(change, tree, committed) {
                    warn!(reaction = r.name, scope = %change.scope, error = %e, "reaction failed");
                    errs.push(e);
                }
        }
    }
    errs.into_result()
}

/// Binds the built-in reactor table (spec §4.G) to a set of operators. Reactors run
/// sequentially within one transaction; the tree lock is held throughout by the
/// caller (see [`crate::tree::Transaction`]).
pub struct Reactor {
    channel_ops: Arc<ChannelOperators>,
    node_op: Arc<dyn NodeOperator>,
    config: ReactorConfig,
}

impl Reactor {
    pub fn new(channel_ops: ChannelOperators, node_op: Arc<dyn NodeOperator>, config: ReactorConfig) -> Self {
        Reactor {
            channel_ops: Arc::new(channel_ops),
            node_op,
            config,
        }
    }

    pub fn config(&self) -> &ReactorConfig {
        &self.config
    }

    /// Runs the full built-in pipeline over `cl`, observing `tree` (staging) and
    /// `committed` (what was). Called before `Commit`; on any error the caller must
    /// `Cancel` the transaction instead. Reactors run sequentially within one
    /// transaction, the difference reactions before the change reactions, with the
    /// tree lock held throughout by the caller (spec §4.G, §5).
    pub fn apply(&self, cl: &Changelog, tree: &App, committed: &App) -> Result<(), MultiError> {
        let mut errs = MultiError::new();
        if let Err(e) = for_each_diff_filtered(cl, &self.difference_reactions(), tree, committed) {
            errs.extend(e.into_errors());
        }
        if let Err(e) = for_each_filtered(cl, &self.change_reactions(), tree, committed) {
            errs.extend(e.into_errors());
        }
        errs.into_result()
    }

    fn difference_reactions(&self) -> Vec<DifferenceReaction> {
        let channel_ops_create = self.channel_ops.clone();
        let channel_ops_delete = self.channel_ops.clone();
        let channel_ops_update = self.channel_ops.clone();
        let node_op_update_via_channel = self.node_op.clone();
        let node_op_alias = self.node_op.clone();

        vec![
            DifferenceReaction {
                name: "channel-create",
                predicate: Box::new(|_scope, d, _tree, _committed| d.kind & CHANNEL != 0 && d.operation & CREATE != 0),
                apply: Box::new(move |scope, d, tree, _committed| {
                    let app = get(tree, scope)?;
                    let channel = app
                        .spec
                        .channels
                        .get(&d.name)
                        .ok_or_else(|| InsprError::internal_server(format!("channel '{}' vanished from staging", d.name)))?;
                    channel_ops_create.for_broker(&channel.spec.selected_broker)?.create(scope, channel)?;
                    info!(scope, channel = %d.name, "channel created on broker");
                    Ok(())
                }),
            },
            DifferenceReaction {
                name: "channel-delete",
                predicate: Box::new(|_scope, d, _tree, _committed| d.kind & CHANNEL != 0 && d.operation & DELETE != 0),
                apply: Box::new(move |scope, d, _tree, committed| {
                    let app = get(committed, scope)?;
                    let channel = app
                        .spec
                        .channels
                        .get(&d.name)
                        .ok_or_else(|| InsprError::internal_server(format!("channel '{}' missing from committed tree", d.name)))?;
                    channel_ops_delete.for_broker(&channel.spec.selected_broker)?.delete(scope, &d.name)?;
                    info!(scope, channel = %d.name, "channel deleted from broker");
                    Ok(())
                }),
            },
            DifferenceReaction {
                name: "channel-update",
                predicate: Box::new(|_scope, d, _tree, _committed| d.kind & CHANNEL != 0 && d.operation & UPDATE != 0),
                apply: Box::new(move |scope, d, tree, _committed| {
                    let app = get(tree, scope)?;
                    let channel = app
                        .spec
                        .channels
                        .get(&d.name)
                        .ok_or_else(|| InsprError::internal_server(format!("channel '{}' vanished from staging", d.name)))?;
                    channel_ops_update.for_broker(&channel.spec.selected_broker)?.update(scope, channel)?;
                    for connected in &channel.connected_apps {
                        if let Ok(child) = get(app, connected)
                            && child.is_leaf() {
                                node_op_update_via_channel.update_node(scope, child)?;
                            }
                    }
                    info!(scope, channel = %d.name, "channel updated on broker");
                    Ok(())
                }),
            },
            DifferenceReaction {
                name: "alias-update",
                predicate: Box::new(|_scope, d, _tree, _committed| d.kind & ALIAS != 0 && d.operation & UPDATE != 0),
                apply: Box::new(move |scope, d, tree, _committed| {
                    let app = get(tree, scope)?;
                    let Some((child_name, _boundary)) = d.name.split_once('.') else {
                        return Ok(());
                    };
                    if let Ok(child) = get(app, child_name)
                        && child.is_leaf() {
                            node_op_alias.update_node(scope, child)?;
                        }
                    Ok(())
                }),
            },
        ]
    }

    fn change_reactions(&self) -> Vec<ChangeReaction> {
        let node_op_create = self.node_op.clone();
        let node_op_update = self.node_op.clone();
        let node_op_type_cascade = self.node_op.clone();
        let node_op_app_delete = self.node_op.clone();
        let channel_ops_app_delete = self.channel_ops.clone();

        vec![
            ChangeReaction {
                name: "node-create",
                predicate: Box::new(|change, _tree, committed| {
                    change.kind & NODE != 0 && get(committed, &change.scope).is_err()
                }),
                apply: Box::new(move |change, tree, _committed| {
                    let app = get(tree, &change.scope)?;
                    node_op_create.create_node(&change.scope, app)?;
                    Ok(())
                }),
            },
            ChangeReaction {
                name: "node-update",
                predicate: Box::new(|change, _tree, committed| {
                    change.kind & NODE != 0
                        && get(committed, &change.scope)
                            .map(|a| a.is_leaf())
                            .unwrap_or(false)
                }),
                apply: Box::new(move |change, tree, _committed| {
                    let app = get(tree, &change.scope)?;
                    node_op_update.update_node(&change.scope, app)?;
                    Ok(())
                }),
            },
            ChangeReaction {
                name: "type-update-cascade",
                predicate: Box::new(|change, _tree, _committed| change.kind & TYPE != 0 && change.operation & UPDATE != 0),
                apply: Box::new(move |change, tree, _committed| {
                    let app = get(tree, &change.scope)?;
                    let mut errs = MultiError::new();
                    for d in &change.diff {
                        if d.kind & TYPE == 0 || d.operation & UPDATE == 0 {
                            continue;
                        }
                        let Some(ty) = app.spec.types.get(&d.name) else {
                            continue;
                        };
                        for channel_name in &ty.connected_channels {
                            let Some(channel) = app.spec.channels.get(channel_name) else {
                                continue;
                            };
                            for connected in &channel.connected_apps {
                                if let Ok(child) = get(app, connected)
                                    && child.is_leaf()
                                        && let Err(e) = node_op_type_cascade.update_node(&change.scope, child) {
                                            errs.push(e);
                                        }
                            }
                        }
                    }
                    errs.into_result().map_err(|e| InsprError::internal_server(e.to_string()))
                }),
            },
            ChangeReaction {
                name: "app-delete-cascade",
                predicate: Box::new(|change, _tree, _committed| change.kind & APP != 0 && change.operation & DELETE != 0),
                apply: Box::new(move |change, _tree, committed| {
                    let mut errs = MultiError::new();
                    for d in &change.diff {
                        if d.kind & APP == 0 || d.operation & DELETE == 0 {
                            continue;
                        }
                        let Ok(deleted_scope) = crate::scope::join_scopes(&change.scope, &d.name) else {
                            continue;
                        };
                        let Ok(deleted) = get(committed, &deleted_scope) else {
                            continue;
                        };
                        cascade_delete(deleted, &deleted_scope, &*node_op_app_delete, &channel_ops_app_delete, &mut errs);
                    }
                    errs.into_result().map_err(|e| InsprError::internal_server(e.to_string()))
                }),
            },
        ]
    }

}

fn cascade_delete(
    app: &App,
    scope: &str,
    node_op: &dyn NodeOperator,
    channel_ops: &ChannelOperators,
    errs: &mut MultiError,
) {
    for (name, channel) in &app.spec.channels {
        if let Ok(op) = channel_ops.for_broker(&channel.spec.selected_broker)
            && let Err(e) = op.delete(scope, name) {
                errs.push(e);
            }
    }
    if app.is_leaf()
        && let Err(e) = node_op.delete_node(scope, &app.meta.name) {
            errs.push(e);
        }
    for (name, child) in &app.spec.apps {
        let Ok(child_scope) = crate::scope::join_scopes(scope, name) else {
            continue;
        };
        cascade_delete(child, &child_scope, node_op, channel_ops, errs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff;
    use crate::meta::{AppSpec, Metadata, Node, NodeSpec};
    use crate::operators::mock::RecordingNodeOperator;

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
    fn node_create_reaction_fires_exactly_once_for_a_new_leaf() {
        let from = App::default();
        let mut to = App::default();
        to.spec.apps.insert("pinger".into(), leaf("pinger", "ping:1"));

        let cl = diff::diff(&from, &to).unwrap();
        let node_op = Arc::new(RecordingNodeOperator::default());
        let reactor = Reactor::new(ChannelOperators::new(), node_op.clone(), ReactorConfig::default());
        reactor.apply(&cl, &to, &from).unwrap();

        let calls = node_op.calls.lock().unwrap();
        assert_eq!(calls.iter().filter(|c| c.starts_with("create_node")).count(), 1);
    }

    #[test]
    fn node_update_reaction_fires_for_an_existing_leafs_change() {
        let from = leaf("pinger", "ping:1");
        let to = leaf("pinger", "ping:2");

        let cl = diff::diff(&from, &to).unwrap();
        let node_op = Arc::new(RecordingNodeOperator::default());
        let reactor = Reactor::new(ChannelOperators::new(), node_op.clone(), ReactorConfig::default());
        reactor.apply(&cl, &to, &from).unwrap();

        let calls = node_op.calls.lock().unwrap();
        assert!(calls.iter().any(|c| c.starts_with("update_node")));
        assert!(!calls.iter().any(|c| c.starts_with("create_node")));
    }
}
