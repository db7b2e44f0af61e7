//! Shared application state handed to every route handler.

use std::sync::Arc;

use cluster::{ControllerSettings, Manager};
use install::Installer;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<Manager>,
    pub installer: Arc<Installer>,
    pub settings: Arc<ControllerSettings>,
}

impl AppState {
    pub fn new(manager: Arc<Manager>, installer: Arc<Installer>, settings: ControllerSettings) -> Self {
        Self {
            manager,
            installer,
            settings: Arc::new(settings),
        }
    }

    pub fn release_bases(&self) -> Vec<String> {
        self.installer.release_bases().to_vec()
    }
}
