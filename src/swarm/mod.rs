//! Docker Swarm bootstrap
//!
//! Control-plane initialization, node labeling and join directives for the
//! Serpens cluster.

pub mod bootstrap;
pub mod cluster;
pub mod labels;
pub mod node;

pub use bootstrap::{BootstrapOptions, ClusterBootstrapper, SELF_NODE};
pub use cluster::{ClusterState, ControlPlaneState, JoinDirective, JoinTokens, LocalSwarmStatus};
pub use labels::NodeLabels;
pub use node::{Node, NodeAvailability, NodeRole, NodeState};
