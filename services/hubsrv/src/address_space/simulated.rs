//! In-memory address space
//!
//! Serves a fixed node graph, either built in code or loaded from a YAML
//! fixture, so the walk can run without a live server. Attribute and browse
//! failures can be injected per node.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{
    AddressSpace, AttributeId, AttributeRead, AttributeValue, NodeClass, NodeId, ReferenceKind,
    ACCESS_LEVEL_CURRENT_WRITE,
};
use crate::error::{HubSrvError, Result};

/// Status name returned for ids the simulation does not know
pub const BAD_NODE_ID_UNKNOWN: &str = "BadNodeIdUnknown";

/// One node served by [`SimulatedAddressSpace`]
#[derive(Debug, Clone)]
pub struct SimulatedNode {
    pub class: NodeClass,
    pub browse_name: String,
    pub description: Option<String>,
    /// Type node of a variable
    pub data_type: Option<NodeId>,
    pub access_level: Option<u8>,
}

impl SimulatedNode {
    pub fn object(browse_name: impl Into<String>) -> Self {
        Self {
            class: NodeClass::Object,
            browse_name: browse_name.into(),
            description: None,
            data_type: None,
            access_level: None,
        }
    }

    /// Readable variable, writable when `writable` is set
    pub fn variable(browse_name: impl Into<String>, data_type: NodeId, writable: bool) -> Self {
        let access_level = if writable {
            0x01 | ACCESS_LEVEL_CURRENT_WRITE
        } else {
            0x01
        };
        Self {
            class: NodeClass::Variable,
            browse_name: browse_name.into(),
            description: None,
            data_type: Some(data_type),
            access_level: Some(access_level),
        }
    }

    pub fn with_class(mut self, class: NodeClass) -> Self {
        self.class = class;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    fn read(&self, attribute: AttributeId) -> AttributeRead {
        match attribute {
            AttributeId::NodeClass => AttributeRead::good(AttributeValue::NodeClass(self.class)),
            AttributeId::BrowseName => {
                AttributeRead::good(AttributeValue::Text(self.browse_name.clone()))
            },
            AttributeId::Description => match &self.description {
                Some(text) => AttributeRead::good(AttributeValue::Text(text.clone())),
                None => AttributeRead::not_applicable(),
            },
            AttributeId::DataType => match &self.data_type {
                Some(id) => AttributeRead::good(AttributeValue::NodeId(id.clone())),
                None => AttributeRead::not_applicable(),
            },
            AttributeId::AccessLevel => match self.access_level {
                Some(level) => AttributeRead::good(AttributeValue::Byte(level)),
                None => AttributeRead::not_applicable(),
            },
        }
    }
}

/// Address space backed by a `HashMap`
#[derive(Debug, Default)]
pub struct SimulatedAddressSpace {
    endpoint: String,
    nodes: HashMap<NodeId, SimulatedNode>,
    references: HashMap<(NodeId, ReferenceKind), Vec<NodeId>>,
    attribute_faults: HashMap<(NodeId, AttributeId), String>,
    browse_faults: HashMap<(NodeId, ReferenceKind), String>,
    read_calls: AtomicUsize,
}

impl SimulatedAddressSpace {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    pub fn add_node(&mut self, id: NodeId, node: SimulatedNode) -> &mut Self {
        self.nodes.insert(id, node);
        self
    }

    /// Forward reference `from --kind--> to`, appended in call order
    pub fn add_reference(&mut self, from: &NodeId, kind: ReferenceKind, to: &NodeId) -> &mut Self {
        self.references
            .entry((from.clone(), kind))
            .or_default()
            .push(to.clone());
        self
    }

    /// Add `child` and a HasComponent reference to it from `parent`
    pub fn add_component(&mut self, parent: &NodeId, child: NodeId, node: SimulatedNode) -> &mut Self {
        self.add_reference(parent, ReferenceKind::HasComponent, &child);
        self.add_node(child, node)
    }

    /// Make `attribute` of `node` answer with status `code`
    pub fn fail_attribute(
        &mut self,
        node: &NodeId,
        attribute: AttributeId,
        code: impl Into<String>,
    ) -> &mut Self {
        self.attribute_faults
            .insert((node.clone(), attribute), code.into());
        self
    }

    /// Make browsing `kind` references of `node` fail with status `code`
    pub fn fail_browse(
        &mut self,
        node: &NodeId,
        kind: ReferenceKind,
        code: impl Into<String>,
    ) -> &mut Self {
        self.browse_faults.insert((node.clone(), kind), code.into());
        self
    }

    pub fn node_mut(&mut self, id: &NodeId) -> Option<&mut SimulatedNode> {
        self.nodes.get_mut(id)
    }

    /// Number of batched reads served so far
    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::Relaxed)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let fixture: Fixture = serde_yaml::from_str(yaml)
            .map_err(|e| HubSrvError::config(format!("Invalid simulation fixture: {}", e)))?;
        Ok(fixture.into_address_space())
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            HubSrvError::config(format!(
                "Cannot read simulation fixture {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml_str(&yaml)
    }
}

#[async_trait]
impl AddressSpace for SimulatedAddressSpace {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn read_attributes(
        &self,
        node: &NodeId,
        attributes: &[AttributeId],
    ) -> Result<Vec<AttributeRead>> {
        self.read_calls.fetch_add(1, Ordering::Relaxed);
        let known = self.nodes.get(node);

        Ok(attributes
            .iter()
            .map(|attribute| {
                if let Some(code) = self.attribute_faults.get(&(node.clone(), *attribute)) {
                    return AttributeRead::bad(code.clone());
                }
                match known {
                    Some(n) => n.read(*attribute),
                    None => AttributeRead::bad(BAD_NODE_ID_UNKNOWN),
                }
            })
            .collect())
    }

    async fn browse(&self, node: &NodeId, kind: ReferenceKind) -> Result<Vec<NodeId>> {
        if let Some(code) = self.browse_faults.get(&(node.clone(), kind)) {
            return Err(HubSrvError::traversal(
                node.to_string(),
                format!("{:?}", kind),
                code.clone(),
            ));
        }
        if !self.nodes.contains_key(node) {
            return Err(HubSrvError::traversal(
                node.to_string(),
                format!("{:?}", kind),
                BAD_NODE_ID_UNKNOWN,
            ));
        }

        let targets = self
            .references
            .get(&(node.clone(), kind))
            .cloned()
            .unwrap_or_default();
        debug!("browse {} {:?}: {} targets", node, kind, targets.len());
        Ok(targets)
    }
}

// ============================================================================
// YAML fixture
// ============================================================================

#[derive(Debug, Deserialize)]
struct Fixture {
    #[serde(default)]
    endpoint: Option<String>,
    #[serde(default)]
    nodes: Vec<FixtureNode>,
}

#[derive(Debug, Deserialize)]
struct FixtureNode {
    node_id: NodeId,
    class: NodeClass,
    browse_name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    data_type: Option<NodeId>,
    #[serde(default)]
    writable: bool,
    #[serde(default)]
    components: Vec<NodeId>,
    #[serde(default)]
    organizes: Vec<NodeId>,
    #[serde(default)]
    properties: Vec<NodeId>,
}

impl Fixture {
    fn into_address_space(self) -> SimulatedAddressSpace {
        let mut space =
            SimulatedAddressSpace::new(self.endpoint.unwrap_or_else(|| "sim://fixture".into()));

        for entry in self.nodes {
            let access_level = (entry.class == NodeClass::Variable).then(|| {
                if entry.writable {
                    0x01 | ACCESS_LEVEL_CURRENT_WRITE
                } else {
                    0x01
                }
            });
            let links = [
                (ReferenceKind::HasComponent, entry.components),
                (ReferenceKind::Organizes, entry.organizes),
                (ReferenceKind::HasProperty, entry.properties),
            ];
            for (kind, targets) in links {
                for target in targets {
                    space.add_reference(&entry.node_id, kind, &target);
                }
            }
            space.add_node(
                entry.node_id,
                SimulatedNode {
                    class: entry.class,
                    browse_name: entry.browse_name,
                    description: entry.description,
                    data_type: entry.data_type,
                    access_level,
                },
            );
        }
        space
    }
}
