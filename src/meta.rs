//! The typed data model (spec §3, §4.B): `App`, `Channel`, `Type`, `Alias`, `Node`,
//! `Metadata`, `Boundary`. Pure data plus the getters and set-based comparisons spec
//! §4.B calls for — no validation or mutation logic lives here, that belongs to the
//! entity managers in [`crate::managers`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata attached to every entity.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    #[serde(default)]
    pub parent: String,
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub uuid: String,
}

/// Two ordered sequences of channel names; duplicates are not allowed within a side,
/// and equality/containment are set-based per spec §4.B.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Boundary {
    #[serde(default)]
    pub input: Vec<String>,
    #[serde(default)]
    pub output: Vec<String>,
}

impl Boundary {
    pub fn input_set(&self) -> std::collections::BTreeSet<&str> {
        self.input.iter().map(String::as_str).collect()
    }

    pub fn output_set(&self) -> std::collections::BTreeSet<&str> {
        self.output.iter().map(String::as_str).collect()
    }

    /// The union of input and output channel names, deduplicated.
    pub fn all(&self) -> std::collections::BTreeSet<&str> {
        self.input_set().union(&self.output_set()).copied().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.input.iter().any(|n| n == name) || self.output.iter().any(|n| n == name)
    }
}

/// Set equality over a side's channel names, ignoring order and duplicates.
impl Boundary {
    pub fn sides_equal(&self, other: &Boundary) -> bool {
        self.input_set() == other.input_set() && self.output_set() == other.output_set()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeSpec {
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub replicas: u32,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    /// Endpoints this node exposes to siblings, fed into the parent's route table
    /// (spec §9 supplement) when more than one sibling node exposes endpoints.
    #[serde(default)]
    pub endpoints: Vec<String>,
}

/// A leaf workload.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Node {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub spec: NodeSpec,
}

impl Node {
    pub fn is_empty(&self) -> bool {
        self.meta.annotations.is_empty()
            && self.meta.name.is_empty()
            && self.meta.parent.is_empty()
            && self.spec.image.is_empty()
    }
}

/// Auth scope and permission list attached to a dApp; children inherit their parent's
/// auth unless they declare their own (spec §4.E Apps.Create step ii).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AppAuth {
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl AppAuth {
    pub fn is_unset(&self) -> bool {
        self.permissions.is_empty()
    }
}

/// A single entry of an App's computed route table (spec §9 supplement: address +
/// endpoints for a sibling node, mirrored into each node child when more than one
/// node child exposes endpoints).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RouteConnection {
    pub address: String,
    #[serde(default)]
    pub endpoints: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChannelSpec {
    #[serde(default)]
    pub r#type: String,
    #[serde(default)]
    pub broker_priority_list: Vec<String>,
    #[serde(default)]
    pub selected_broker: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Channel {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub spec: ChannelSpec,
    /// Child app names in the same scope that reference this channel via boundary.
    /// Maintained exclusively by the entity managers, never set by callers.
    #[serde(default)]
    pub connected_apps: Vec<String>,
    /// Aliases in the same scope whose target is this channel.
    #[serde(default)]
    pub connected_aliases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Type {
    #[serde(default)]
    pub meta: Metadata,
    /// Opaque schema payload (typically Avro).
    #[serde(default)]
    pub schema: Vec<u8>,
    /// Channel names in the same scope that use this Type.
    #[serde(default)]
    pub connected_channels: Vec<String>,
}

/// Rewrites what a specific child's named boundary resolves to.
/// `meta.name` has the form `<childApp>.<boundaryName>`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Alias {
    #[serde(default)]
    pub meta: Metadata,
    /// A channel name or an outer alias name visible in the parent scope.
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub destination: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AppSpec {
    #[serde(default)]
    pub node: Node,
    #[serde(default)]
    pub apps: BTreeMap<String, App>,
    #[serde(default)]
    pub channels: BTreeMap<String, Channel>,
    #[serde(default)]
    pub types: BTreeMap<String, Type>,
    #[serde(default)]
    pub aliases: BTreeMap<String, Alias>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct App {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub spec: AppSpec,
    #[serde(default)]
    pub boundary: Boundary,
    #[serde(default)]
    pub auth: AppAuth,
    /// Computed: address table for sibling node children (spec §9 supplement).
    #[serde(default)]
    pub routes: BTreeMap<String, RouteConnection>,
}

impl App {
    /// A leaf is an App whose node is non-empty.
    pub fn is_leaf(&self) -> bool {
        !self.spec.node.is_empty()
    }

    pub fn is_composite(&self) -> bool {
        !self.is_leaf()
    }

    pub fn new_root() -> App {
        App::default()
    }
}
