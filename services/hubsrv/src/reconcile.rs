//! History-flag reconciliation
//!
//! Each node carries a desired flag (`history_enabled`) and an applied flag
//! (`included_in_config`). Comparing the two gives a [`ReconciliationState`];
//! an apply collapses desired into applied.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::node_store::StoredNode;

/// Desired vs applied history state of one node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReconciliationState {
    #[default]
    NoAction,
    /// Enabled but not yet in the collector config
    Added,
    /// In the collector config but no longer enabled
    Removed,
    HistoryEnabledNoChange,
    HistoryDisabledNoChange,
}

impl ReconciliationState {
    pub fn of(history_enabled: bool, included_in_config: bool) -> Self {
        match (history_enabled, included_in_config) {
            (true, false) => ReconciliationState::Added,
            (false, true) => ReconciliationState::Removed,
            (true, true) => ReconciliationState::HistoryEnabledNoChange,
            (false, false) => ReconciliationState::HistoryDisabledNoChange,
        }
    }

    pub fn of_node(node: &StoredNode) -> Self {
        Self::of(node.history_enabled, node.included_in_config)
    }

    /// Added and Removed need a config rewrite
    pub fn requires_action(&self) -> bool {
        matches!(
            self,
            ReconciliationState::Added | ReconciliationState::Removed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReconciliationState::NoAction => "No Action",
            ReconciliationState::Added => "Added",
            ReconciliationState::Removed => "Removed",
            ReconciliationState::HistoryEnabledNoChange => "History Enabled No Change",
            ReconciliationState::HistoryDisabledNoChange => "History Disabled No Change",
        }
    }
}

impl fmt::Display for ReconciliationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ReconciliationState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedNode {
    pub node: StoredNode,
    pub state: ReconciliationState,
}

/// Classify every node by its two flags
pub fn classify(nodes: &[StoredNode]) -> Vec<ClassifiedNode> {
    nodes
        .iter()
        .map(|node| ClassifiedNode {
            state: ReconciliationState::of_node(node),
            node: node.clone(),
        })
        .collect()
}

/// Nodes whose state is in `wanted`, in input order
pub fn filter_by_state<'a>(
    classified: &'a [ClassifiedNode],
    wanted: &[ReconciliationState],
) -> Vec<&'a ClassifiedNode> {
    classified
        .iter()
        .filter(|c| wanted.contains(&c.state))
        .collect()
}

/// Flag writes that make applied state match desired state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionPlan {
    /// Node ids to set `included_in_config = 1`
    pub include: Vec<String>,
    /// Node ids to set `included_in_config = 0`
    pub exclude: Vec<String>,
}

impl TransitionPlan {
    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    pub fn len(&self) -> usize {
        self.include.len() + self.exclude.len()
    }
}

/// Added nodes get included, Removed nodes get excluded, the rest are left alone
pub fn transition_plan(classified: &[ClassifiedNode]) -> TransitionPlan {
    let mut plan = TransitionPlan::default();
    for c in classified {
        match c.state {
            ReconciliationState::Added => plan.include.push(c.node.node_id.clone()),
            ReconciliationState::Removed => plan.exclude.push(c.node.node_id.clone()),
            _ => {},
        }
    }
    plan
}
