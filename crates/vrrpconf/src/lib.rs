//! VRRP config synthesis and lifecycle management.
//!
//! This crate does not speak VRRP: it renders the userspace daemon's
//! config file deterministically from an [`types::RenderInput`], applies
//! it atomically, drives the daemon's reload/start/stop/enable lifecycle,
//! and reconciles its reported state against what the network interface
//! actually shows.

pub mod lifecycle;
pub mod reconcile;
pub mod render;
pub mod types;

pub use lifecycle::{apply, atomic_write, Platform, STATE_FILE_PATH};
pub use reconcile::reconcile;
pub use render::render;
pub use types::{RenderInput, Role, VrrpState};
