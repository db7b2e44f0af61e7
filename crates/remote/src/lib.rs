//! Remote shell transport, platform classification, and network
//! discovery for hosts the controller manages.

pub mod netdiscover;
pub mod platform;
pub mod transport;
pub mod types;

pub use platform::{normalize_arch, RemotePlatform};
pub use transport::{RemoteTransport, SshTransport};
pub use types::{CommandOutput, ConnectSpec, Credential};
