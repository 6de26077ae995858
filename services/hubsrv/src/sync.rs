//! Sync orchestration
//!
//! Connects to the remote server with bounded retry, walks it from the
//! configured root and republishes the result into the node store.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::retry::{retry_with_policy, RetryPolicy};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::address_space::simulated::SimulatedAddressSpace;
use crate::address_space::{AddressSpace, NodeId};
use crate::config::OpcUaSection;
use crate::error::{HubSrvError, Result};
use crate::node_store::NodeStore;
use crate::walker::Walker;

/// Result of one walk + upsert
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub top_level: usize,
    pub nodes: usize,
    pub elapsed_ms: u64,
}

/// Run `connect` until it succeeds; exhaustion becomes a connection error
pub async fn connect_with_retry<S, F, Fut>(
    policy: &RetryPolicy,
    endpoint: &str,
    connect: F,
) -> Result<S>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<S>>,
{
    retry_with_policy(policy, &format!("connect {}", endpoint), connect)
        .await
        .map_err(|e| HubSrvError::connection(e.to_string()))
}

/// Open the address space described by `section`
///
/// A simulation fixture takes precedence over the endpoint.
pub async fn connect_address_space(
    section: &OpcUaSection,
    policy: &RetryPolicy,
) -> Result<Arc<dyn AddressSpace>> {
    if let Some(fixture) = &section.simulation_file {
        info!("Using simulated address space from {}", fixture.display());
        let space = SimulatedAddressSpace::from_yaml_file(fixture)?;
        return Ok(Arc::new(space));
    }

    connect_live(section, policy).await
}

#[cfg(feature = "opcua-client")]
async fn connect_live(
    section: &OpcUaSection,
    policy: &RetryPolicy,
) -> Result<Arc<dyn AddressSpace>> {
    use crate::address_space::opcua_session::OpcUaSession;

    let session = connect_with_retry(policy, &section.endpoint, || {
        OpcUaSession::connect(section.clone())
    })
    .await?;
    Ok(Arc::new(session))
}

#[cfg(not(feature = "opcua-client"))]
async fn connect_live(
    section: &OpcUaSection,
    _policy: &RetryPolicy,
) -> Result<Arc<dyn AddressSpace>> {
    Err(HubSrvError::config(format!(
        "Cannot connect to {}: built without the opcua-client feature; set opcua.simulation_file",
        section.endpoint
    )))
}

pub struct SyncOrchestrator {
    store: NodeStore,
    root: NodeId,
}

impl SyncOrchestrator {
    pub fn new(store: NodeStore, root: NodeId) -> Self {
        Self { store, root }
    }

    pub fn root(&self) -> &NodeId {
        &self.root
    }

    /// Walk `space` from the root and upsert everything found
    pub async fn sync_once(&self, space: &dyn AddressSpace) -> Result<SyncReport> {
        let start = Instant::now();
        let forest = Walker::new(space).walk(&self.root).await?;
        let nodes = self.store.upsert_forest(&forest).await?;

        let report = SyncReport {
            top_level: forest.len(),
            nodes,
            elapsed_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            "Sync from {} complete: {} nodes ({} top-level) in {}ms",
            space.endpoint(),
            report.nodes,
            report.top_level,
            report.elapsed_ms
        );
        Ok(report)
    }

    /// Re-walk every `interval` until `token` is cancelled
    ///
    /// A failed round is logged and retried on the next tick.
    pub fn spawn_periodic(
        self: Arc<Self>,
        space: Arc<dyn AddressSpace>,
        interval: Duration,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The startup sync already covered the first tick
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.sync_once(space.as_ref()).await {
                            error!("Periodic sync failed: {}", e);
                        }
                    }
                    () = token.cancelled() => {
                        info!("Periodic sync received cancellation signal, shutting down");
                        break;
                    }
                }
            }
        })
    }
}

/// Log a warning when the walk produced nothing, usually a wrong root node
pub fn warn_if_empty(report: &SyncReport, root: &NodeId) {
    if report.nodes == 0 {
        warn!("Walk from {} emitted no objects or variables", root);
    }
}
