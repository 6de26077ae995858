//! Persisted node snapshot
//!
//! One row per node id. Structural fields follow the latest walk; the two
//! history flags only change through [`NodeStore::set_history`],
//! [`NodeStore::mark_removed`] and [`NodeStore::apply_transition`].

use std::collections::{HashMap, HashSet};

use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::{Sqlite, SqlitePool};
use tracing::{debug, info};

use crate::address_space::NodeId;
use crate::error::{HubSrvError, Result};
use crate::reconcile::{ReconciliationState, TransitionPlan};
use crate::walker::NodeDefinition;

pub const NODES_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS nodes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        node_id TEXT NOT NULL UNIQUE,
        namespace INTEGER NOT NULL DEFAULT 0,
        identifier_type TEXT NOT NULL DEFAULT '',
        identifier TEXT NOT NULL DEFAULT '',
        parent_id TEXT NOT NULL,
        browse_name TEXT NOT NULL,
        node_class TEXT NOT NULL,
        data_type TEXT NOT NULL DEFAULT '',
        writable BOOLEAN NOT NULL DEFAULT 0,
        last_updated TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        removed BOOLEAN NOT NULL DEFAULT 0,
        node_path TEXT NOT NULL,
        history_enabled BOOLEAN NOT NULL DEFAULT 0,
        included_in_config BOOLEAN NOT NULL DEFAULT 0
    )
"#;

pub const NODES_PARENT_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_nodes_parent_id ON nodes(parent_id)";

const SELECT_NODES: &str = "SELECT id, node_id, namespace, identifier_type, identifier, \
     parent_id, browse_name, node_class, data_type, writable, last_updated, removed, \
     node_path, history_enabled, included_in_config FROM nodes";

/// Row of the `nodes` table
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct StoredNode {
    pub id: i64,
    pub node_id: String,
    pub namespace: i64,
    pub identifier_type: String,
    pub identifier: String,
    /// Equal to `node_id` for hierarchy roots
    pub parent_id: String,
    pub browse_name: String,
    pub node_class: String,
    pub data_type: String,
    pub writable: bool,
    pub last_updated: NaiveDateTime,
    pub removed: bool,
    pub node_path: String,
    pub history_enabled: bool,
    pub included_in_config: bool,
}

impl StoredNode {
    pub fn is_root(&self) -> bool {
        self.parent_id == self.node_id
    }
}

/// Structural fields written by an upsert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    pub node_id: NodeId,
    pub parent_id: NodeId,
    pub browse_name: String,
    pub node_class: String,
    pub data_type: String,
    pub writable: bool,
    pub node_path: String,
}

impl NodeRecord {
    /// Record for `def`; `parent` of `None` makes it a self-parented root
    pub fn from_definition(def: &NodeDefinition, parent: Option<&NodeId>) -> Self {
        Self {
            node_id: def.node_id.clone(),
            parent_id: parent.unwrap_or(&def.node_id).clone(),
            browse_name: def.browse_name.clone(),
            node_class: def.node_class.as_str().to_string(),
            data_type: def.data_type.clone(),
            writable: def.writable,
            node_path: def.path.clone(),
        }
    }
}

/// Stored node with its non-removed children, as served to the web client
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct NodeTree {
    #[serde(rename = "ID")]
    pub id: i64,
    #[serde(rename = "NodeID")]
    pub node_id: String,
    #[serde(rename = "ParentID")]
    pub parent_id: String,
    pub browse_name: String,
    pub node_class: String,
    pub data_type: String,
    pub writable: bool,
    pub history_enabled: bool,
    pub included_in_config: bool,
    pub last_updated: NaiveDateTime,
    pub removed: bool,
    pub namespace: i64,
    pub identifier_type: String,
    pub identifier: String,
    pub node_path: String,
    #[serde(rename = "DBActionRequired")]
    pub db_action_required: ReconciliationState,
    pub children: Vec<NodeTree>,
}

impl NodeTree {
    fn leaf(node: StoredNode) -> Self {
        Self {
            db_action_required: ReconciliationState::of_node(&node),
            id: node.id,
            node_id: node.node_id,
            parent_id: node.parent_id,
            browse_name: node.browse_name,
            node_class: node.node_class,
            data_type: node.data_type,
            writable: node.writable,
            history_enabled: node.history_enabled,
            included_in_config: node.included_in_config,
            last_updated: node.last_updated,
            removed: node.removed,
            namespace: node.namespace,
            identifier_type: node.identifier_type,
            identifier: node.identifier,
            node_path: node.node_path,
            children: Vec::new(),
        }
    }
}

/// SQLite-backed node store
#[derive(Clone)]
pub struct NodeStore {
    pool: SqlitePool,
}

impl NodeStore {
    /// Wrap `pool` and make sure the schema exists
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn init_schema(&self) -> Result<()> {
        for statement in [NODES_TABLE, NODES_PARENT_INDEX] {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("Node schema ready");
        Ok(())
    }

    /// Insert or refresh structural fields; history flags are left alone
    pub async fn upsert(&self, record: &NodeRecord) -> Result<()> {
        upsert_with(&self.pool, record).await
    }

    /// Flatten a walk result depth-first and upsert it in one transaction
    ///
    /// A node met more than once keeps the first record, so a top-level node
    /// stays self-parented. Returns the number of distinct nodes written.
    pub async fn upsert_forest(&self, forest: &[NodeDefinition]) -> Result<usize> {
        let mut records = Vec::new();
        for root in forest {
            flatten(root, None, &mut records);
        }
        let mut seen = HashSet::new();
        records.retain(|record| seen.insert(record.node_id.clone()));

        let mut tx = self.pool.begin().await?;
        for record in &records {
            upsert_with(&mut *tx, record).await?;
        }
        tx.commit().await?;

        info!("Upserted {} nodes", records.len());
        Ok(records.len())
    }

    /// Rebuild the forest of non-removed nodes
    ///
    /// Siblings are ordered by browse name. Rows whose parent is absent or
    /// removed are left out of the result but stay in storage.
    pub async fn load_hierarchy(&self) -> Result<Vec<NodeTree>> {
        let rows = sqlx::query_as::<_, StoredNode>(&format!(
            "{} WHERE removed = 0 ORDER BY browse_name",
            SELECT_NODES
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(build_forest(rows))
    }

    /// Flag a node as gone from the server and drop it from history
    pub async fn mark_removed(&self, node_id: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE nodes SET removed = 1, history_enabled = 0, last_updated = CURRENT_TIMESTAMP \
             WHERE node_id = ?",
        )
        .bind(node_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(HubSrvError::not_found(format!("node {}", node_id)));
        }
        info!("Node {} marked removed", node_id);
        Ok(())
    }

    /// Set the desired history flag of a live node
    pub async fn set_history(&self, node_id: &str, enabled: bool) -> Result<()> {
        let result =
            sqlx::query("UPDATE nodes SET history_enabled = ? WHERE node_id = ? AND removed = 0")
                .bind(enabled)
                .bind(node_id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(HubSrvError::not_found(format!("node {}", node_id)));
        }
        debug!("history_enabled={} for {}", enabled, node_id);
        Ok(())
    }

    pub async fn get(&self, node_id: &str) -> Result<Option<StoredNode>> {
        let node = sqlx::query_as::<_, StoredNode>(&format!("{} WHERE node_id = ?", SELECT_NODES))
            .bind(node_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(node)
    }

    /// Every row, removed ones included
    pub async fn all_nodes(&self) -> Result<Vec<StoredNode>> {
        let nodes = sqlx::query_as::<_, StoredNode>(&format!("{} ORDER BY id", SELECT_NODES))
            .fetch_all(&self.pool)
            .await?;
        Ok(nodes)
    }

    /// Rows currently written to the collector config
    pub async fn nodes_in_config(&self) -> Result<Vec<StoredNode>> {
        let nodes = sqlx::query_as::<_, StoredNode>(&format!(
            "{} WHERE included_in_config = 1 ORDER BY id",
            SELECT_NODES
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(nodes)
    }

    /// No node is Added or Removed
    pub async fn config_up_to_date(&self) -> Result<bool> {
        let pending: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM nodes WHERE history_enabled != included_in_config",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(pending == 0)
    }

    /// Apply `plan` atomically; returns the number of rows changed
    pub async fn apply_transition(&self, plan: &TransitionPlan) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut changed = 0;

        for (node_ids, included) in [(&plan.include, true), (&plan.exclude, false)] {
            for node_id in node_ids {
                changed += sqlx::query("UPDATE nodes SET included_in_config = ? WHERE node_id = ?")
                    .bind(included)
                    .bind(node_id)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();
            }
        }

        tx.commit().await?;
        info!(
            "Transition applied: {} included, {} excluded",
            plan.include.len(),
            plan.exclude.len()
        );
        Ok(changed)
    }
}

async fn upsert_with<'e, E>(executor: E, record: &NodeRecord) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO nodes (node_id, namespace, identifier_type, identifier, parent_id,
                           browse_name, node_class, data_type, writable, node_path)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(node_id) DO UPDATE SET
            namespace = excluded.namespace,
            identifier_type = excluded.identifier_type,
            identifier = excluded.identifier,
            parent_id = excluded.parent_id,
            browse_name = excluded.browse_name,
            node_class = excluded.node_class,
            data_type = excluded.data_type,
            writable = excluded.writable,
            node_path = excluded.node_path,
            removed = 0,
            last_updated = CURRENT_TIMESTAMP
        "#,
    )
    .bind(record.node_id.to_string())
    .bind(i64::from(record.node_id.namespace))
    .bind(record.node_id.identifier_type.as_str())
    .bind(&record.node_id.identifier)
    .bind(record.parent_id.to_string())
    .bind(&record.browse_name)
    .bind(&record.node_class)
    .bind(&record.data_type)
    .bind(record.writable)
    .bind(&record.node_path)
    .execute(executor)
    .await?;
    Ok(())
}

fn flatten(def: &NodeDefinition, parent: Option<&NodeId>, out: &mut Vec<NodeRecord>) {
    out.push(NodeRecord::from_definition(def, parent));
    for child in &def.children {
        flatten(child, Some(&def.node_id), out);
    }
}

/// Two-phase flat-to-tree build: index by node id, then link children
fn build_forest(rows: Vec<StoredNode>) -> Vec<NodeTree> {
    let index: HashMap<String, usize> = rows
        .iter()
        .enumerate()
        .map(|(i, row)| (row.node_id.clone(), i))
        .collect();

    let mut roots = Vec::new();
    let mut children_of: Vec<Vec<usize>> = vec![Vec::new(); rows.len()];
    for (i, row) in rows.iter().enumerate() {
        if row.is_root() {
            roots.push(i);
        } else if let Some(&parent) = index.get(&row.parent_id) {
            children_of[parent].push(i);
        } else {
            debug!("Orphan {} (parent {} not loaded)", row.node_id, row.parent_id);
        }
    }

    let mut slots: Vec<Option<StoredNode>> = rows.into_iter().map(Some).collect();
    roots
        .into_iter()
        .filter_map(|i| link(i, &mut slots, &children_of))
        .collect()
}

fn link(i: usize, slots: &mut [Option<StoredNode>], children_of: &[Vec<usize>]) -> Option<NodeTree> {
    let mut tree = NodeTree::leaf(slots.get_mut(i)?.take()?);
    tree.children = children_of[i]
        .iter()
        .filter_map(|&child| link(child, slots, children_of))
        .collect();
    Some(tree)
}
