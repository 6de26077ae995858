//! Config apply coordination
//!
//! Synthesis and the flag transition run under one mutex so concurrent
//! applies cannot interleave. Flags only move after the document write
//! succeeded.

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::Result;
use crate::node_store::{NodeStore, StoredNode};
use crate::reconcile::{classify, filter_by_state, transition_plan, ReconciliationState};
use crate::telegraf::{OpcUaInputSettings, TelegrafDocument};

/// What an apply changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyOutcome {
    /// Nodes now listed in the collector config
    pub written: usize,
    /// Added nodes moved into the config
    pub included: usize,
    /// Removed nodes dropped from the config
    pub excluded: usize,
}

pub struct ConfigApplier {
    store: NodeStore,
    document: TelegrafDocument,
    input: OpcUaInputSettings,
    lock: Mutex<()>,
}

impl ConfigApplier {
    pub fn new(store: NodeStore, document: TelegrafDocument, input: OpcUaInputSettings) -> Self {
        Self {
            store,
            document,
            input,
            lock: Mutex::new(()),
        }
    }

    pub fn document(&self) -> &TelegrafDocument {
        &self.document
    }

    /// Write every history-enabled node to the config, then mark Added as
    /// included and Removed as excluded
    pub async fn apply(&self) -> Result<ApplyOutcome> {
        let _guard = self.lock.lock().await;

        let nodes = self.store.all_nodes().await?;
        let classified = classify(&nodes);
        let selected: Vec<StoredNode> = filter_by_state(
            &classified,
            &[
                ReconciliationState::Added,
                ReconciliationState::HistoryEnabledNoChange,
            ],
        )
        .into_iter()
        .map(|c| c.node.clone())
        .collect();

        let written = match self.document.synthesize(&self.input, &selected).await {
            Ok(written) => written,
            Err(e) => {
                warn!("Config synthesis failed, flags left unchanged: {}", e);
                return Err(e);
            },
        };

        let plan = transition_plan(&classified);
        self.store.apply_transition(&plan).await?;

        let outcome = ApplyOutcome {
            written,
            included: plan.include.len(),
            excluded: plan.exclude.len(),
        };
        info!(
            "Config applied: {} nodes written, {} added, {} removed",
            outcome.written, outcome.included, outcome.excluded
        );
        Ok(outcome)
    }

    /// Rewrite the document from the applied set without touching flags
    ///
    /// Run at startup to repair a crash between a write and its transition.
    pub async fn restore_applied(&self) -> Result<usize> {
        let _guard = self.lock.lock().await;
        let applied = self.store.nodes_in_config().await?;
        let written = self.document.synthesize(&self.input, &applied).await?;
        info!("Config restored from {} applied nodes", written);
        Ok(written)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::address_space::NodeClass;
    use crate::config::{OpcUaSection, TelegrafSection};
    use crate::error::HubSrvError;
    use crate::walker::NodeDefinition;
    use common::sqlite::SqliteClient;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn leaf(id: &str, name: &str) -> NodeDefinition {
        NodeDefinition {
            node_id: id.parse().unwrap(),
            node_class: NodeClass::Variable,
            browse_name: name.to_string(),
            description: String::new(),
            data_type: "float64".to_string(),
            writable: false,
            path: name.to_string(),
            children: vec![],
        }
    }

    async fn setup() -> (TempDir, NodeStore, ConfigApplier) {
        let dir = tempfile::tempdir().unwrap();
        let client = SqliteClient::new(dir.path().join("nodes.db"), 2)
            .await
            .unwrap();
        let store = NodeStore::new(client.pool().clone()).await.unwrap();
        store
            .upsert_forest(&[leaf("ns=2;s=A", "A"), leaf("ns=2;s=B", "B")])
            .await
            .unwrap();

        let document = TelegrafDocument::new(dir.path().join("telegraf.conf"));
        document.bootstrap(&TelegrafSection::default()).await.unwrap();
        let applier = ConfigApplier::new(
            store.clone(),
            document,
            OpcUaInputSettings::from(&OpcUaSection::default()),
        );
        (dir, store, applier)
    }

    async fn written_names(applier: &ConfigApplier) -> Vec<String> {
        let table = applier.document().read_table().await.unwrap();
        table
            .get("inputs")
            .and_then(|i| i.get("opcua"))
            .and_then(|o| o.get(0))
            .and_then(|s| s.get("nodes"))
            .and_then(|n| n.as_array())
            .map(|nodes| {
                nodes
                    .iter()
                    .filter_map(|n| n.get("name").and_then(|v| v.as_str()).map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_apply_writes_enabled_nodes_and_settles() {
        let (_dir, store, applier) = setup().await;
        store.set_history("ns=2;s=A", true).await.unwrap();

        let outcome = applier.apply().await.unwrap();
        assert_eq!(
            outcome,
            ApplyOutcome {
                written: 1,
                included: 1,
                excluded: 0
            }
        );
        assert_eq!(written_names(&applier).await, vec!["A"]);
        assert!(store.config_up_to_date().await.unwrap());

        // Disable A, enable B
        store.set_history("ns=2;s=A", false).await.unwrap();
        store.set_history("ns=2;s=B", true).await.unwrap();
        let outcome = applier.apply().await.unwrap();
        assert_eq!(outcome.included, 1);
        assert_eq!(outcome.excluded, 1);
        assert_eq!(written_names(&applier).await, vec!["B"]);
    }

    #[tokio::test]
    async fn test_apply_with_nothing_enabled_removes_stanza() {
        let (_dir, _store, applier) = setup().await;
        let outcome = applier.apply().await.unwrap();
        assert_eq!(outcome, ApplyOutcome::default());
        assert!(written_names(&applier).await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_synthesis_leaves_flags() {
        let (_dir, store, applier) = setup().await;
        store.set_history("ns=2;s=A", true).await.unwrap();
        std::fs::write(applier.document().path(), "not = [valid").unwrap();

        assert!(matches!(
            applier.apply().await,
            Err(HubSrvError::ConfigSynthesis(_))
        ));
        let a = store.get("ns=2;s=A").await.unwrap().unwrap();
        assert!(a.history_enabled);
        assert!(!a.included_in_config);
    }

    #[tokio::test]
    async fn test_restore_applied_ignores_pending_changes() {
        let (_dir, store, applier) = setup().await;
        store.set_history("ns=2;s=A", true).await.unwrap();
        applier.apply().await.unwrap();

        // Pending change plus a lost document
        store.set_history("ns=2;s=B", true).await.unwrap();
        std::fs::remove_file(applier.document().path()).unwrap();
        applier
            .document()
            .bootstrap(&TelegrafSection::default())
            .await
            .unwrap();

        assert_eq!(applier.restore_applied().await.unwrap(), 1);
        assert_eq!(written_names(&applier).await, vec!["A"]);
        let b = store.get("ns=2;s=B").await.unwrap().unwrap();
        assert!(!b.included_in_config);
    }

    #[tokio::test]
    async fn test_concurrent_applies_serialize() {
        let (_dir, store, applier) = setup().await;
        store.set_history("ns=2;s=A", true).await.unwrap();
        store.set_history("ns=2;s=B", true).await.unwrap();
        let applier = Arc::new(applier);

        let (first, second) = tokio::join!(applier.apply(), applier.apply());
        let included = first.unwrap().included + second.unwrap().included;
        // Whichever ran second found nothing left to include
        assert_eq!(included, 2);
        assert_eq!(written_names(&applier).await, vec!["A", "B"]);
    }
}
