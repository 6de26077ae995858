//! Live OPC UA session (feature `opcua-client`)
//!
//! Wraps the synchronous client of the `opcua` crate. Every service call runs
//! on the blocking pool. Anonymous identity, no message security.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use opcua::client::prelude::{
    AttributeService, BrowseDescription, BrowseDirection, BrowseResultMask, ClientBuilder,
    DataValue, IdentityToken, MessageSecurityMode, QualifiedName, ReadValueId, SecurityPolicy,
    Session, StatusCode, TimestampsToReturn, UAString, UserTokenPolicy, Variant, ViewService,
};
use opcua::sync::RwLock;
use tracing::{debug, info};

use super::{
    AddressSpace, AttributeId, AttributeRead, AttributeValue, NodeClass, NodeId, ReferenceKind,
};
use crate::config::OpcUaSection;
use crate::error::{HubSrvError, Result};

pub struct OpcUaSession {
    endpoint: String,
    session: Arc<RwLock<Session>>,
}

impl OpcUaSession {
    /// Open an anonymous, unsecured session to `section.endpoint`
    pub async fn connect(section: OpcUaSection) -> Result<Self> {
        let endpoint = section.endpoint.clone();
        let session = tokio::task::spawn_blocking(move || {
            let mut client = ClientBuilder::new()
                .application_name("hubsrv")
                .application_uri("urn:hubsrv")
                .trust_server_certs(true)
                .create_sample_keypair(false)
                .session_retry_limit(0)
                .client()
                .ok_or_else(|| HubSrvError::connection("invalid OPC UA client configuration"))?;

            client
                .connect_to_endpoint(
                    (
                        section.endpoint.as_str(),
                        SecurityPolicy::None.to_str(),
                        MessageSecurityMode::None,
                        UserTokenPolicy::anonymous(),
                    ),
                    IdentityToken::Anonymous,
                )
                .map_err(|status| {
                    HubSrvError::connection(format!("{}: {}", section.endpoint, status))
                })
        })
        .await
        .map_err(|e| HubSrvError::internal(format!("connect task failed: {}", e)))??;

        info!("OPC UA session established: {}", endpoint);
        Ok(Self { endpoint, session })
    }

    fn to_wire(node: &NodeId) -> Result<opcua::types::NodeId> {
        opcua::types::NodeId::from_str(&node.to_string()).map_err(|_| {
            HubSrvError::traversal(node.to_string(), "NodeId", "BadNodeIdInvalid")
        })
    }

    fn from_wire(node: &opcua::types::NodeId) -> Result<NodeId> {
        node.to_string().parse().map_err(|e| {
            HubSrvError::traversal(node.to_string(), "NodeId", format!("{}", e))
        })
    }
}

fn decode(attribute: AttributeId, value: DataValue) -> AttributeRead {
    let status = value.status.unwrap_or(StatusCode::Good);
    if status == StatusCode::BadAttributeIdInvalid {
        return AttributeRead::not_applicable();
    }
    if !status.is_good() {
        return AttributeRead::bad(status.to_string());
    }

    let decoded = match (attribute, value.value) {
        (AttributeId::NodeClass, Some(Variant::Int32(raw))) => {
            AttributeValue::NodeClass(NodeClass::from_value(raw).unwrap_or(NodeClass::Unspecified))
        },
        (AttributeId::BrowseName, Some(Variant::QualifiedName(name))) => {
            AttributeValue::Text(name.name.to_string())
        },
        (AttributeId::Description, Some(Variant::LocalizedText(text))) => {
            AttributeValue::Text(text.text.to_string())
        },
        (AttributeId::AccessLevel, Some(Variant::Byte(level))) => AttributeValue::Byte(level),
        (AttributeId::DataType, Some(Variant::NodeId(id))) => {
            match OpcUaSession::from_wire(&id) {
                Ok(id) => AttributeValue::NodeId(id),
                Err(e) => return AttributeRead::bad(e.to_string()),
            }
        },
        (_, None) | (_, Some(Variant::Empty)) => AttributeValue::Empty,
        (attribute, Some(other)) => {
            return AttributeRead::bad(format!(
                "unexpected {} value {:?}",
                attribute.name(),
                other
            ))
        },
    };
    AttributeRead::good(decoded)
}

#[async_trait]
impl AddressSpace for OpcUaSession {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn read_attributes(
        &self,
        node: &NodeId,
        attributes: &[AttributeId],
    ) -> Result<Vec<AttributeRead>> {
        let wire_id = Self::to_wire(node)?;
        let requests: Vec<ReadValueId> = attributes
            .iter()
            .map(|attribute| ReadValueId {
                node_id: wire_id.clone(),
                attribute_id: attribute.code(),
                index_range: UAString::null(),
                data_encoding: QualifiedName::null(),
            })
            .collect();

        let session = self.session.clone();
        let values = tokio::task::spawn_blocking(move || {
            session
                .read()
                .read(&requests, TimestampsToReturn::Neither, 0.0)
        })
        .await
        .map_err(|e| HubSrvError::internal(format!("read task failed: {}", e)))?
        .map_err(|status| HubSrvError::traversal(node.to_string(), "*", status.to_string()))?;

        if values.len() != attributes.len() {
            return Err(HubSrvError::traversal(
                node.to_string(),
                "*",
                format!("{} results for {} attributes", values.len(), attributes.len()),
            ));
        }

        Ok(attributes
            .iter()
            .zip(values)
            .map(|(attribute, value)| decode(*attribute, value))
            .collect())
    }

    async fn browse(&self, node: &NodeId, kind: ReferenceKind) -> Result<Vec<NodeId>> {
        let description = BrowseDescription {
            node_id: Self::to_wire(node)?,
            browse_direction: BrowseDirection::Forward,
            reference_type_id: opcua::types::NodeId::new(0, kind.type_id()),
            include_subtypes: true,
            node_class_mask: 0,
            result_mask: BrowseResultMask::All as u32,
        };

        let session = self.session.clone();
        let node_text = node.to_string();
        let targets = tokio::task::spawn_blocking(move || -> Result<Vec<opcua::types::NodeId>> {
            let session = session.read();
            let fail = |status: StatusCode| {
                HubSrvError::traversal(node_text.clone(), format!("{:?}", kind), status.to_string())
            };

            let mut targets = Vec::new();
            let mut results = session.browse(&[description]).map_err(fail)?.unwrap_or_default();
            while let Some(result) = results.pop() {
                if !result.status_code.is_good() {
                    return Err(fail(result.status_code));
                }
                targets.extend(
                    result
                        .references
                        .unwrap_or_default()
                        .into_iter()
                        .map(|r| r.node_id.node_id),
                );
                if result.continuation_point.is_null() {
                    break;
                }
                results = session
                    .browse_next(false, &[result.continuation_point])
                    .map_err(fail)?
                    .unwrap_or_default();
            }
            Ok(targets)
        })
        .await
        .map_err(|e| HubSrvError::internal(format!("browse task failed: {}", e)))??;

        debug!("browse {} {:?}: {} targets", node, kind, targets.len());
        targets.iter().map(Self::from_wire).collect()
    }
}
