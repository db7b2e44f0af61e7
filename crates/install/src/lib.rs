//! Remote install/uninstall orchestration: binary caching, the ordered
//! install state machine with LIFO rollback, and bounded progress logs.

pub mod cache;
pub mod orchestrator;
pub mod progress;

pub use cache::BinaryCache;
pub use orchestrator::{InstallReport, Installer};
pub use progress::{ProgressEvent, ProgressLog};
