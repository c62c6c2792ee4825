//! End-to-end scenarios over `Tree`, the entity managers, the diff engine, and the
//! reactor, driven through a full transaction lifecycle the way an API handler would.

use inspr_core::{
    broker::BrokersConfig,
    managers::{apps, channels, types},
    meta::{Alias, App, AppSpec, Channel, ChannelSpec, Metadata, Node, NodeSpec, Type},
    ChannelOperator, ChannelOperators, InsprError, NodeOperator, Reactor, ReactorConfig, Tree,
};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct RecordingChannelOperator {
    calls: Mutex<Vec<String>>,
}

impl ChannelOperator for RecordingChannelOperator {
    fn create(&self, scope: &str, channel: &Channel) -> Result<(), InsprError> {
        self.calls.lock().unwrap().push(format!("create:{scope}.{}", channel.meta.name));
        Ok(())
    }
    fn update(&self, scope: &str, channel: &Channel) -> Result<(), InsprError> {
        self.calls.lock().unwrap().push(format!("update:{scope}.{}", channel.meta.name));
        Ok(())
    }
    fn delete(&self, scope: &str, name: &str) -> Result<(), InsprError> {
        self.calls.lock().unwrap().push(format!("delete:{scope}.{name}"));
        Ok(())
    }
}

#[derive(Default)]
struct RecordingNodeOperator {
    calls: Mutex<Vec<String>>,
}

impl NodeOperator for RecordingNodeOperator {
    fn create_node(&self, scope: &str, app: &App) -> Result<(), InsprError> {
        self.calls.lock().unwrap().push(format!("create_node:{scope}.{}", app.meta.name));
        Ok(())
    }
    fn update_node(&self, scope: &str, app: &App) -> Result<(), InsprError> {
        self.calls.lock().unwrap().push(format!("update_node:{scope}.{}", app.meta.name));
        Ok(())
    }
    fn delete_node(&self, scope: &str, name: &str) -> Result<(), InsprError> {
        self.calls.lock().unwrap().push(format!("delete_node:{scope}.{name}"));
        Ok(())
    }
}

fn brokers() -> BrokersConfig {
    BrokersConfig {
        available: vec!["kafka".into()],
        default: "kafka".into(),
    }
}

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

fn reactor_with(node_op: Arc<RecordingNodeOperator>) -> Reactor {
    let mut ops = ChannelOperators::new();
    ops.register("kafka", Box::new(RecordingChannelOperator::default()));
    Reactor::new(ops, node_op, ReactorConfig::default())
}

/// S1: create a leaf dApp under root, commit, and confirm the node operator saw
/// exactly one create call.
#[test]
fn create_leaf_under_root_commits_and_reacts() {
    let tree = Tree::new(App::default());
    let mut txn = tree.init_transaction();
    let committed = txn.perm().clone();
    apps::create(txn.tree_mut(), "", leaf("pinger", "ping:1"), &brokers(), &committed).unwrap();

    let cl = txn.changes().unwrap();
    let node_op = Arc::new(RecordingNodeOperator::default());
    let r = reactor_with(node_op.clone());
    r.apply(&cl, txn.tree(), txn.perm()).unwrap();
    txn.commit();

    assert!(tree.perm().spec.apps.contains_key("pinger"));
    let calls = node_op.calls.lock().unwrap();
    assert_eq!(calls.iter().filter(|c| c.starts_with("create_node")).count(), 1);
}

/// Creating a channel against a type that doesn't exist in the same scope is
/// rejected before it ever touches the tree.
#[test]
fn channel_create_rejects_dangling_type_reference() {
    let tree = Tree::new(App::default());
    let mut txn = tree.init_transaction();

    let channel = Channel {
        meta: Metadata {
            name: "events".into(),
            ..Default::default()
        },
        spec: ChannelSpec {
            r#type: "NoSuchType".into(),
            ..Default::default()
        },
        ..Default::default()
    };
    let err = channels::create(txn.tree_mut(), "", channel, &brokers()).unwrap_err();
    assert!(err.has_kind(inspr_core::error::INVALID_CHANNEL));
    txn.cancel();
}

/// S3: boundary resolution walks through an alias up to a grandparent channel. The
/// alias is wired directly (rather than through `alias::create`, which only accepts
/// targets resolving in its own scope) to exercise `resolve_boundary`'s ascent across
/// two scope levels on its own terms.
#[test]
fn boundary_resolves_through_an_alias_up_the_tree() {
    let mut root = App::default();
    let committed = App::default();

    root.spec.channels.insert(
        "three".into(),
        Channel {
            meta: Metadata {
                name: "three".into(),
                ..Default::default()
            },
            ..Default::default()
        },
    );

    apps::create(
        &mut root,
        "",
        App {
            meta: Metadata {
                name: "A".into(),
                ..Default::default()
            },
            ..Default::default()
        },
        &brokers(),
        &committed,
    )
    .unwrap();
    apps::create(&mut root, "A", leaf("N", "ping:1"), &brokers(), &committed).unwrap();

    let a = root.spec.apps.get_mut("A").unwrap();
    a.spec.aliases.insert(
        "N.four".into(),
        Alias {
            meta: Metadata {
                name: "N.four".into(),
                ..Default::default()
            },
            target: "three".into(),
            ..Default::default()
        },
    );
    a.spec.apps.get_mut("N").unwrap().boundary.input = vec!["four".into()];

    let (input, _output) = apps::resolve_boundary(&root, "A.N").unwrap();
    assert_eq!(input.get("four"), Some(&"three".to_string()));
}

/// S4: deleting an App whose channel still has a connected app is refused; once the
/// reference is gone, delete succeeds.
#[test]
fn delete_is_refused_while_channel_still_referenced_then_succeeds() {
    let mut root = App::default();
    let committed = App::default();
    apps::create(&mut root, "", leaf("pinger", "ping:1"), &brokers(), &committed).unwrap();

    let app = root.spec.apps.get_mut("pinger").unwrap();
    app.spec.channels.insert(
        "out".into(),
        Channel {
            meta: Metadata {
                name: "out".into(),
                ..Default::default()
            },
            connected_apps: vec!["somewhere".into()],
            ..Default::default()
        },
    );

    assert!(apps::delete(&mut root, "pinger").is_err());

    root.spec
        .apps
        .get_mut("pinger")
        .unwrap()
        .spec
        .channels
        .get_mut("out")
        .unwrap()
        .connected_apps
        .clear();
    apps::delete(&mut root, "pinger").unwrap();
    assert!(!root.spec.apps.contains_key("pinger"));
}

/// S5: updating a Type's schema cascades an update_node call to every leaf reachable
/// through a channel that uses the Type.
#[test]
fn type_update_cascades_to_connected_nodes() {
    let mut from = App::default();
    from.spec.types.insert(
        "Ping".into(),
        Type {
            meta: Metadata {
                name: "Ping".into(),
                ..Default::default()
            },
            schema: vec![1],
            connected_channels: vec!["pings".into()],
        },
    );
    from.spec.channels.insert(
        "pings".into(),
        Channel {
            meta: Metadata {
                name: "pings".into(),
                ..Default::default()
            },
            spec: ChannelSpec {
                r#type: "Ping".into(),
                selected_broker: "kafka".into(),
                ..Default::default()
            },
            connected_apps: vec!["pinger".into()],
            ..Default::default()
        },
    );
    from.spec.apps.insert("pinger".into(), leaf("pinger", "ping:1"));

    let mut to = from.clone();
    to.spec.types.get_mut("Ping").unwrap().schema = vec![2];

    let cl = inspr_core::diff::diff(&from, &to).unwrap();
    let node_op = Arc::new(RecordingNodeOperator::default());
    let r = reactor_with(node_op.clone());
    r.apply(&cl, &to, &from).unwrap();

    let calls = node_op.calls.lock().unwrap();
    assert!(calls.iter().any(|c| c.starts_with("update_node") && c.contains("pinger")));
}

/// S6 (dry run): computing the changelog without calling `commit` leaves the tree
/// untouched — the caller can inspect `Changelog` and then `cancel`.
#[test]
fn dry_run_inspects_changes_without_committing() {
    let tree = Tree::new(App::default());
    let mut txn = tree.init_transaction();
    let committed = txn.perm().clone();
    apps::create(txn.tree_mut(), "", leaf("pinger", "ping:1"), &brokers(), &committed).unwrap();

    let cl = txn.changes().unwrap();
    assert!(!cl.is_empty());
    txn.cancel();

    assert!(!tree.perm().spec.apps.contains_key("pinger"));
}

/// Creating the same dApp twice yields `AlreadyExists` both times through `Tree`.
#[test]
fn create_twice_through_tree_yields_already_exists() {
    let tree = Tree::new(App::default());
    let mut first = tree.init_transaction();
    let committed = first.perm().clone();
    apps::create(first.tree_mut(), "", leaf("pinger", "ping:1"), &brokers(), &committed).unwrap();
    first.commit();

    let mut second = tree.init_transaction();
    let committed = second.perm().clone();
    let err = apps::create(second.tree_mut(), "", leaf("pinger", "ping:1"), &brokers(), &committed)
        .unwrap_err();
    assert!(err.kind() & inspr_core::error::ALREADY_EXISTS != 0);
    second.cancel();
}

/// Cancel restores the tree bit-for-bit: no residue from a rejected staging mutation.
#[test]
fn cancel_restores_the_tree_exactly() {
    let tree = Tree::new(App::default());
    let before = tree.perm();

    let mut txn = tree.init_transaction();
    let committed = txn.perm().clone();
    apps::create(txn.tree_mut(), "", leaf("pinger", "ping:1"), &brokers(), &committed).unwrap();
    txn.cancel();

    assert_eq!(tree.perm(), before);
}

/// Create then delete returns the tree to its prior shape.
#[test]
fn create_then_delete_returns_to_the_prior_shape() {
    let tree = Tree::new(App::default());
    let before = tree.perm();

    let mut txn = tree.init_transaction();
    let committed = txn.perm().clone();
    apps::create(txn.tree_mut(), "", leaf("pinger", "ping:1"), &brokers(), &committed).unwrap();
    txn.commit();

    let mut txn = tree.init_transaction();
    apps::delete(txn.tree_mut(), "pinger").unwrap();
    txn.commit();

    assert_eq!(tree.perm(), before);
}

/// Types and channels created through separate transactions survive into a later
/// transaction's `perm()` read-only snapshot.
#[test]
fn committed_entities_are_visible_across_transactions() {
    let tree = Tree::new(App::default());

    let mut txn = tree.init_transaction();
    types::create(
        txn.tree_mut(),
        "",
        Type {
            meta: Metadata {
                name: "Ping".into(),
                ..Default::default()
            },
            ..Default::default()
        },
    )
    .unwrap();
    txn.commit();

    let mut txn = tree.init_transaction();
    channels::create(
        txn.tree_mut(),
        "",
        Channel {
            meta: Metadata {
                name: "pings".into(),
                ..Default::default()
            },
            spec: ChannelSpec {
                r#type: "Ping".into(),
                ..Default::default()
            },
            ..Default::default()
        },
        &brokers(),
    )
    .unwrap();
    txn.commit();

    let snapshot = tree.perm();
    assert!(snapshot.spec.types.contains_key("Ping"));
    assert!(snapshot.spec.channels.contains_key("pings"));
}
