//! Remote address space model
//!
//! The walker only needs two capabilities from a server: a batched attribute
//! read and forward reference enumeration by kind. [`AddressSpace`] captures
//! exactly that, so the same walk runs against a live OPC UA session or the
//! in-memory [`simulated::SimulatedAddressSpace`].

pub mod simulated;

#[cfg(feature = "opcua-client")]
pub mod opcua_session;

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::Result;

// ============================================================================
// Node identifiers
// ============================================================================

/// Identifier kind of a [`NodeId`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdentifierType {
    Numeric,
    String,
    Guid,
    Opaque,
    /// Text form carried no `x=` prefix
    Unspecified,
}

impl IdentifierType {
    /// Single-letter code used in text form and in the collector config
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentifierType::Numeric => "i",
            IdentifierType::String => "s",
            IdentifierType::Guid => "g",
            IdentifierType::Opaque => "b",
            IdentifierType::Unspecified => "",
        }
    }

    fn from_prefix(prefix: &str) -> Self {
        match prefix {
            "i" => IdentifierType::Numeric,
            "s" => IdentifierType::String,
            "g" => IdentifierType::Guid,
            "b" => IdentifierType::Opaque,
            _ => IdentifierType::Unspecified,
        }
    }
}

/// Error returned when a node identifier string cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseNodeIdError {
    #[error("node id must not be empty")]
    Empty,
    #[error("namespace index out of range: {0}")]
    Namespace(String),
    #[error("node id pattern unavailable")]
    Pattern,
    #[error("identifier type prefix (i=, s=, g= or b=) is missing")]
    MissingType,
}

/// Namespace + identifier type + identifier
///
/// Text form is `ns=<n>;<t>=<id>`, with `ns=0;` omitted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId {
    pub namespace: u16,
    pub identifier_type: IdentifierType,
    pub identifier: String,
}

const NODE_ID_PATTERN: &str = r"^(?:ns=(\d+);)?([isgb]=)?(.+)$";
static NODE_ID_RE: OnceLock<Option<Regex>> = OnceLock::new();

impl NodeId {
    pub fn numeric(namespace: u16, id: u32) -> Self {
        Self {
            namespace,
            identifier_type: IdentifierType::Numeric,
            identifier: id.to_string(),
        }
    }

    pub fn string(namespace: u16, id: impl Into<String>) -> Self {
        Self {
            namespace,
            identifier_type: IdentifierType::String,
            identifier: id.into(),
        }
    }

    /// Parse a node id that must spell out its identifier type
    ///
    /// Ids coming back from clients name stored nodes, which always carry one.
    pub fn parse_qualified(s: &str) -> std::result::Result<Self, ParseNodeIdError> {
        let id: NodeId = s.parse()?;
        if id.identifier_type == IdentifierType::Unspecified {
            return Err(ParseNodeIdError::MissingType);
        }
        Ok(id)
    }

    /// Numeric identifier in namespace 0, if this is one
    pub fn standard_numeric(&self) -> Option<u32> {
        if self.namespace == 0 && self.identifier_type == IdentifierType::Numeric {
            self.identifier.parse().ok()
        } else {
            None
        }
    }
}

impl FromStr for NodeId {
    type Err = ParseNodeIdError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ParseNodeIdError::Empty);
        }

        let re = NODE_ID_RE
            .get_or_init(|| Regex::new(NODE_ID_PATTERN).ok())
            .as_ref()
            .ok_or(ParseNodeIdError::Pattern)?;
        let caps = re.captures(s).ok_or(ParseNodeIdError::Empty)?;

        let namespace = match caps.get(1) {
            Some(ns) => ns
                .as_str()
                .parse::<u16>()
                .map_err(|_| ParseNodeIdError::Namespace(ns.as_str().to_string()))?,
            None => 0,
        };
        let identifier_type = caps
            .get(2)
            .map(|t| IdentifierType::from_prefix(&t.as_str()[..1]))
            .unwrap_or(IdentifierType::Unspecified);
        let identifier = caps
            .get(3)
            .map(|m| m.as_str().to_string())
            .ok_or(ParseNodeIdError::Empty)?;

        Ok(Self {
            namespace,
            identifier_type,
            identifier,
        })
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace != 0 {
            write!(f, "ns={};", self.namespace)?;
        }
        match self.identifier_type {
            IdentifierType::Unspecified => write!(f, "{}", self.identifier),
            t => write!(f, "{}={}", t.as_str(), self.identifier),
        }
    }
}

impl TryFrom<String> for NodeId {
    type Error = ParseNodeIdError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.to_string()
    }
}

// ============================================================================
// Node classes and attributes
// ============================================================================

/// OPC UA node class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeClass {
    Unspecified,
    Object,
    Variable,
    Method,
    ObjectType,
    VariableType,
    ReferenceType,
    DataType,
    View,
}

impl NodeClass {
    /// Encoded enumeration value
    pub fn from_value(value: i32) -> Option<Self> {
        Some(match value {
            0 => NodeClass::Unspecified,
            1 => NodeClass::Object,
            2 => NodeClass::Variable,
            4 => NodeClass::Method,
            8 => NodeClass::ObjectType,
            16 => NodeClass::VariableType,
            32 => NodeClass::ReferenceType,
            64 => NodeClass::DataType,
            128 => NodeClass::View,
            _ => return None,
        })
    }

    /// Stored form; the web client matches on `NodeClassVariable`
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeClass::Unspecified => "NodeClassUnspecified",
            NodeClass::Object => "NodeClassObject",
            NodeClass::Variable => "NodeClassVariable",
            NodeClass::Method => "NodeClassMethod",
            NodeClass::ObjectType => "NodeClassObjectType",
            NodeClass::VariableType => "NodeClassVariableType",
            NodeClass::ReferenceType => "NodeClassReferenceType",
            NodeClass::DataType => "NodeClassDataType",
            NodeClass::View => "NodeClassView",
        }
    }

    /// Only objects and variables make it into the snapshot
    pub fn is_retained(&self) -> bool {
        matches!(self, NodeClass::Object | NodeClass::Variable)
    }
}

impl fmt::Display for NodeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attributes read for every visited node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeId {
    NodeClass,
    BrowseName,
    Description,
    DataType,
    AccessLevel,
}

impl AttributeId {
    /// Numeric attribute id on the wire
    pub fn code(&self) -> u32 {
        match self {
            AttributeId::NodeClass => 2,
            AttributeId::BrowseName => 3,
            AttributeId::Description => 5,
            AttributeId::DataType => 14,
            AttributeId::AccessLevel => 17,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AttributeId::NodeClass => "NodeClass",
            AttributeId::BrowseName => "BrowseName",
            AttributeId::Description => "Description",
            AttributeId::DataType => "DataType",
            AttributeId::AccessLevel => "AccessLevel",
        }
    }
}

/// Per-attribute outcome of a batched read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeStatus {
    Good,
    /// `BadAttributeIdInvalid`: the attribute does not exist for this node class
    NotApplicable,
    /// Any other failure, with the server's status name
    Bad(String),
}

/// Decoded attribute value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    Empty,
    NodeClass(NodeClass),
    Text(String),
    Byte(u8),
    NodeId(NodeId),
}

/// One entry of a batched attribute read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeRead {
    pub status: AttributeStatus,
    pub value: AttributeValue,
}

impl AttributeRead {
    pub fn good(value: AttributeValue) -> Self {
        Self {
            status: AttributeStatus::Good,
            value,
        }
    }

    pub fn not_applicable() -> Self {
        Self {
            status: AttributeStatus::NotApplicable,
            value: AttributeValue::Empty,
        }
    }

    pub fn bad(code: impl Into<String>) -> Self {
        Self {
            status: AttributeStatus::Bad(code.into()),
            value: AttributeValue::Empty,
        }
    }
}

/// `AccessLevel` bit for "current value writable"
pub const ACCESS_LEVEL_CURRENT_WRITE: u8 = 0x02;

// ============================================================================
// References and data types
// ============================================================================

/// Hierarchical forward references the walker follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferenceKind {
    HasComponent,
    Organizes,
    HasProperty,
}

impl ReferenceKind {
    /// Enumeration order used when building a child list
    pub const WALK_ORDER: [ReferenceKind; 3] = [
        ReferenceKind::HasComponent,
        ReferenceKind::Organizes,
        ReferenceKind::HasProperty,
    ];

    /// Reference type node in namespace 0
    pub fn type_id(&self) -> u32 {
        match self {
            ReferenceKind::HasComponent => 47,
            ReferenceKind::Organizes => 35,
            ReferenceKind::HasProperty => 46,
        }
    }
}

/// Normalized value type of a variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    String,
    Timestamp,
    /// Anything else keeps the type node's text form
    Other(String),
}

impl DataType {
    /// Map a DataType attribute (a type node id) onto the fixed vocabulary
    pub fn from_type_node(type_node: &NodeId) -> Self {
        match type_node.standard_numeric() {
            Some(1) => DataType::Bool,
            Some(2) => DataType::Int8,
            Some(3) => DataType::UInt8,
            Some(4) => DataType::Int16,
            Some(5) => DataType::UInt16,
            Some(6) => DataType::Int32,
            Some(7) => DataType::UInt32,
            Some(8) => DataType::Int64,
            Some(9) => DataType::UInt64,
            Some(10) => DataType::Float32,
            Some(11) => DataType::Float64,
            Some(12) => DataType::String,
            Some(13) | Some(294) => DataType::Timestamp,
            _ => DataType::Other(type_node.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            DataType::Bool => "bool",
            DataType::Int8 => "int8",
            DataType::Int16 => "int16",
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::UInt8 => "uint8",
            DataType::UInt16 => "uint16",
            DataType::UInt32 => "uint32",
            DataType::UInt64 => "uint64",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
            DataType::String => "string",
            DataType::Timestamp => "timestamp",
            DataType::Other(raw) => raw,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Capability trait
// ============================================================================

/// Read-only view of a remote node graph
#[async_trait]
pub trait AddressSpace: Send + Sync {
    /// Endpoint description for logs
    fn endpoint(&self) -> &str;

    /// Read `attributes` of `node` in one request; one result per attribute, same order
    async fn read_attributes(
        &self,
        node: &NodeId,
        attributes: &[AttributeId],
    ) -> Result<Vec<AttributeRead>>;

    /// Forward references of `kind` (including subtypes), in server order
    async fn browse(&self, node: &NodeId, kind: ReferenceKind) -> Result<Vec<NodeId>>;
}
