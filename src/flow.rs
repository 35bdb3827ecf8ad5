// src/flow.rs

use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Type tag of a graph container node (a top-level "tab" grouping entry
/// nodes; for a container `z == id`).
pub const CONTAINER_TYPE: &str = "tab";

/// The fixed set of entry-node type tags that accept external trigger input.
static ENTRY_TYPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^gcp-cloud-functions-(http|bucket|topic)-in$")
        .expect("entry-type pattern is valid")
});

/// One node record of a loaded flow graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FlowNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    /// Owning-graph id. A container owns itself (`z == id`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl FlowNode {
    /// A graph container ("tab") node.
    pub fn container(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            z: Some(id.clone()),
            id,
            node_type: CONTAINER_TYPE.to_string(),
            label: None,
        }
    }

    /// A node of `node_type` owned by the container `z`.
    pub fn in_graph(
        id: impl Into<String>,
        node_type: impl Into<String>,
        z: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            z: Some(z.into()),
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn is_container(&self) -> bool {
        self.node_type == CONTAINER_TYPE
    }

    pub fn is_entry(&self) -> bool {
        ENTRY_TYPE.is_match(&self.node_type)
    }

    /// True when this node belongs to the container with `container_id`.
    pub fn in_container(&self, container_id: &str) -> bool {
        self.z.as_deref() == Some(container_id)
    }
}

/// Predicate form of a flow reference.
pub type NodePredicate = Arc<dyn Fn(&FlowNode) -> bool + Send + Sync>;

/// A logical reference to a flow, resolved against the loaded graph set.
#[derive(Clone, Default)]
pub enum FlowReference {
    /// The first graph container by insertion order.
    #[default]
    Default,
    /// A node whose id or label equals the string.
    ByIdOrLabel(String),
    /// An arbitrary predicate over nodes.
    Predicate(NodePredicate),
}

impl FlowReference {
    pub fn named(name: impl Into<String>) -> Self {
        FlowReference::ByIdOrLabel(name.into())
    }

    pub fn matching(f: impl Fn(&FlowNode) -> bool + Send + Sync + 'static) -> Self {
        FlowReference::Predicate(Arc::new(f))
    }

    /// Reference the first node carrying the given type tag. This is the
    /// convention embedding deployments use: each trigger entry point passes
    /// the entry-node tag of its trigger kind.
    pub fn entry_type(tag: impl Into<String>) -> Self {
        let tag = tag.into();
        Self::matching(move |node| node.node_type == tag)
    }

    fn matches(&self, node: &FlowNode) -> bool {
        match self {
            FlowReference::Default => node.is_container(),
            FlowReference::ByIdOrLabel(s) => node.id == *s || node.label.as_deref() == Some(s),
            FlowReference::Predicate(p) => p(node),
        }
    }
}

impl fmt::Debug for FlowReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowReference::Default => f.write_str("Default"),
            FlowReference::ByIdOrLabel(s) => f.debug_tuple("ByIdOrLabel").field(s).finish(),
            FlowReference::Predicate(_) => f.write_str("Predicate"),
        }
    }
}

/// Ordered set of nodes loaded atomically by the runtime host at startup.
/// At most one node per id; iteration order is insertion order. Read-only
/// for the duration of a dispatch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct FlowGraphSet {
    nodes: Vec<FlowNode>,
}

impl FlowGraphSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_nodes(nodes: impl IntoIterator<Item = FlowNode>) -> Self {
        let mut set = Self::new();
        for node in nodes {
            set.insert(node);
        }
        set
    }

    /// Insert a node, keeping the first record for any duplicate id.
    pub fn insert(&mut self, node: FlowNode) {
        if self.nodes.iter().any(|n| n.id == node.id) {
            warn!(id = %node.id, "duplicate node id in graph set; keeping the first record");
            return;
        }
        self.nodes.push(node);
    }

    pub fn get(&self, id: &str) -> Option<&FlowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FlowNode> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Resolve a flow reference to the concrete node an envelope should be
    /// delivered to.
    ///
    /// The first node matching the reference wins. A matched container is
    /// never a delivery target itself: resolution redirects to the first
    /// entry node it contains, or `None` if it holds no entry node.
    pub fn resolve(&self, reference: &FlowReference) -> Option<&FlowNode> {
        let node = self.nodes.iter().find(|n| reference.matches(n))?;
        if node.is_container() {
            self.nodes
                .iter()
                .find(|n| n.in_container(&node.id) && n.is_entry())
        } else {
            Some(node)
        }
    }
}
