//! Cluster state: the data model, AEAD secret sealing, YAML persistence,
//! and the concurrent manager the controller drives.

pub mod manager;
pub mod model;
pub mod persist;
pub mod secret;

pub use manager::Manager;
pub use model::{AgentConfig, ClusterConfig, ControllerSettings, ProbeSpec, RouterRecord};
pub use secret::Sealer;
