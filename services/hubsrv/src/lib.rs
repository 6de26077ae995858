//! OPC UA Time-Series Hub
//!
//! Keeps a relational snapshot of a remote OPC UA address space, lets an
//! operator select nodes for history collection and rewrites the Telegraf
//! configuration to match.
//!
//! - [`walker`] turns the remote node graph into a path-annotated forest
//! - [`node_store`] persists it and owns the two history flags
//! - [`reconcile`] compares desired and applied state
//! - [`telegraf`] rewrites the `[[inputs.opcua]]` section
//! - [`apply`] ties synthesis and the flag transition together

pub mod address_space;
pub mod api;
pub mod app_state;
pub mod apply;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod node_store;
pub mod reconcile;
pub mod sync;
pub mod telegraf;
pub mod walker;

pub use address_space::{AddressSpace, NodeId};
pub use error::{HubSrvError, Result};
