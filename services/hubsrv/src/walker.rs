//! Address-space walker
//!
//! Recursively explores the remote node graph from a root and produces a
//! forest of [`NodeDefinition`]s. Only objects and variables are emitted;
//! anything else is walked through and its emitted descendants are hoisted
//! into the nearest emitted ancestor. References back to a node already on
//! the current branch are not followed.

use std::collections::HashSet;
use std::time::Instant;

use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use tracing::{debug, info, info_span, Instrument};

use crate::address_space::{
    AddressSpace, AttributeId, AttributeRead, AttributeStatus, AttributeValue, DataType,
    NodeClass, NodeId, ReferenceKind, ACCESS_LEVEL_CURRENT_WRITE,
};
use crate::error::{HubSrvError, Result};

/// Deepest level visited; the root is level 0
pub const MAX_DEPTH: usize = 10;

/// Read for every visited node, in this order
const WALK_ATTRIBUTES: [AttributeId; 5] = [
    AttributeId::NodeClass,
    AttributeId::BrowseName,
    AttributeId::Description,
    AttributeId::AccessLevel,
    AttributeId::DataType,
];

/// One emitted node with its emitted descendants
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeDefinition {
    pub node_id: NodeId,
    pub node_class: NodeClass,
    pub browse_name: String,
    pub description: String,
    /// Normalized type name, or the type node id for custom types
    pub data_type: String,
    pub writable: bool,
    /// Browse names of emitted ancestors and self, joined by `.`
    pub path: String,
    pub children: Vec<NodeDefinition>,
}

impl NodeDefinition {
    /// Number of nodes in this subtree, self included
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(NodeDefinition::subtree_len).sum::<usize>()
    }
}

/// Decoded attribute batch
struct NodeAttributes {
    class: NodeClass,
    browse_name: String,
    description: String,
    writable: bool,
    data_type: String,
}

pub struct Walker<'a> {
    space: &'a dyn AddressSpace,
    max_depth: usize,
}

impl<'a> Walker<'a> {
    pub fn new(space: &'a dyn AddressSpace) -> Self {
        Self {
            space,
            max_depth: MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Walk the graph below `root`
    ///
    /// Any attribute or browse failure aborts the whole walk.
    pub async fn walk(&self, root: &NodeId) -> Result<Vec<NodeDefinition>> {
        let span = info_span!("walk", root = %root, endpoint = %self.space.endpoint());
        async {
            let start = Instant::now();
            let forest = self.visit(root.clone(), None, HashSet::new(), 0).await?;
            let total: usize = forest.iter().map(NodeDefinition::subtree_len).sum();
            info!(
                "Walk finished: {} top-level, {} nodes in {:?}",
                forest.len(),
                total,
                start.elapsed()
            );
            Ok(forest)
        }
        .instrument(span)
        .await
    }

    fn visit<'s>(
        &'s self,
        node: NodeId,
        parent_path: Option<String>,
        mut lineage: HashSet<NodeId>,
        level: usize,
    ) -> BoxFuture<'s, Result<Vec<NodeDefinition>>> {
        async move {
            if level > self.max_depth {
                debug!("Depth limit reached at {} (level {})", node, level);
                return Ok(Vec::new());
            }

            let reads = self.space.read_attributes(&node, &WALK_ATTRIBUTES).await?;
            let attrs = decode_attributes(&node, reads)?;
            let emitted = attrs.class.is_retained();

            let path = if emitted {
                Some(match &parent_path {
                    Some(parent) => format!("{}.{}", parent, attrs.browse_name),
                    None => attrs.browse_name.clone(),
                })
            } else {
                debug!("Walking through {} ({})", node, attrs.class);
                parent_path
            };

            // Ids on the branch from the root down to this node
            lineage.insert(node.clone());

            let mut children: Vec<NodeDefinition> = Vec::new();
            let mut seen = HashSet::new();
            for child in self.child_ids(&node).await? {
                if lineage.contains(&child) {
                    debug!("Skipping reference from {} back to ancestor {}", node, child);
                    continue;
                }
                for def in self
                    .visit(child, path.clone(), lineage.clone(), level + 1)
                    .await?
                {
                    if seen.insert(def.node_id.clone()) {
                        children.push(def);
                    }
                }
            }

            if !emitted {
                return Ok(children);
            }

            Ok(vec![NodeDefinition {
                node_id: node,
                node_class: attrs.class,
                browse_name: attrs.browse_name,
                description: attrs.description,
                data_type: attrs.data_type,
                writable: attrs.writable,
                path: path.unwrap_or_default(),
                children,
            }])
        }
        .boxed()
    }

    /// Forward targets over all walked reference kinds, first occurrence kept
    async fn child_ids(&self, node: &NodeId) -> Result<Vec<NodeId>> {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for kind in ReferenceKind::WALK_ORDER {
            for target in self.space.browse(node, kind).await? {
                if seen.insert(target.clone()) {
                    ids.push(target);
                }
            }
        }
        Ok(ids)
    }
}

fn decode_attributes(node: &NodeId, reads: Vec<AttributeRead>) -> Result<NodeAttributes> {
    if reads.len() != WALK_ATTRIBUTES.len() {
        return Err(HubSrvError::traversal(
            node.to_string(),
            "*",
            format!(
                "expected {} attribute results, got {}",
                WALK_ATTRIBUTES.len(),
                reads.len()
            ),
        ));
    }

    let mut attrs = NodeAttributes {
        class: NodeClass::Unspecified,
        browse_name: String::new(),
        description: String::new(),
        writable: false,
        data_type: String::new(),
    };

    for (attribute, read) in WALK_ATTRIBUTES.iter().zip(reads) {
        let mandatory = matches!(attribute, AttributeId::NodeClass | AttributeId::BrowseName);
        let value = match read.status {
            AttributeStatus::Good => read.value,
            AttributeStatus::NotApplicable if !mandatory => continue,
            AttributeStatus::NotApplicable => {
                return Err(HubSrvError::traversal(
                    node.to_string(),
                    attribute.name(),
                    "BadAttributeIdInvalid",
                ))
            },
            AttributeStatus::Bad(code) => {
                return Err(HubSrvError::traversal(
                    node.to_string(),
                    attribute.name(),
                    code,
                ))
            },
        };

        match (attribute, value) {
            (AttributeId::NodeClass, AttributeValue::NodeClass(class)) => attrs.class = class,
            (AttributeId::BrowseName, AttributeValue::Text(name)) => attrs.browse_name = name,
            (AttributeId::Description, AttributeValue::Text(text)) => attrs.description = text,
            (AttributeId::AccessLevel, AttributeValue::Byte(level)) => {
                attrs.writable = level & ACCESS_LEVEL_CURRENT_WRITE != 0
            },
            (AttributeId::DataType, AttributeValue::NodeId(type_node)) => {
                attrs.data_type = DataType::from_type_node(&type_node).to_string()
            },
            // Good but empty optional values keep their zero value
            (
                AttributeId::Description | AttributeId::AccessLevel | AttributeId::DataType,
                AttributeValue::Empty,
            ) => {},
            (attribute, other) => {
                return Err(HubSrvError::traversal(
                    node.to_string(),
                    attribute.name(),
                    format!("unexpected value {:?}", other),
                ))
            },
        }
    }

    Ok(attrs)
}
