//! Serpens - Docker Swarm bootstrap for the Serpens deployment cluster
//!
//! Serpens brings a small swarm to life and keeps its node metadata in
//! order:
//!
//! - Control-plane initialization that runs exactly once
//! - Node labeling with the `type` / `name` scheme the deployment stack schedules on
//! - Worker and manager join directives, with token rotation
//! - The attachable overlay network deployed services attach to

pub mod config;
pub mod engine;
pub mod error;
pub mod swarm;

pub use error::{Result, SerpensError};
