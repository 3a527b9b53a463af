//! Loaded integration entries and the state store they publish into

use std::sync::Arc;

use ha_components::demo::{self, DemoEntry};
use ha_config::IntegrationConfig;
use ha_coordinator::SetupError;
use ha_state_store::StateStore;
use tracing::{error, info, warn};

enum LoadedEntry {
    Demo(DemoEntry),
}

impl LoadedEntry {
    fn name(&self) -> &str {
        match self {
            Self::Demo(entry) => entry.name(),
        }
    }

    async fn unload(self) {
        match self {
            Self::Demo(entry) => entry.unload().await,
        }
    }
}

/// Owns every loaded entry
pub struct Host {
    states: Arc<StateStore>,
    entries: Vec<LoadedEntry>,
}

impl Host {
    pub fn new(states: Arc<StateStore>) -> Self {
        Self {
            states,
            entries: Vec::new(),
        }
    }

    pub fn states(&self) -> &Arc<StateStore> {
        &self.states
    }

    /// Set up each entry in order; a failing entry is logged and skipped
    pub async fn setup_integrations(&mut self, configs: &[IntegrationConfig]) -> usize {
        let mut loaded = 0;
        for config in configs {
            let result = match config.platform.as_str() {
                demo::DOMAIN => demo::async_setup_entry(config, self.states.clone())
                    .await
                    .map(LoadedEntry::Demo),
                other => {
                    warn!(platform = %other, entry = %config.name, "Unknown platform, skipping");
                    continue;
                }
            };

            match result {
                Ok(entry) => {
                    self.entries.push(entry);
                    loaded += 1;
                }
                Err(err @ SetupError::AuthFailed { .. }) => {
                    error!(entry = %config.name, error = %err, "Credentials rejected, entry not loaded");
                }
                Err(err) => {
                    error!(entry = %config.name, error = %err, "Entry not ready, skipping");
                }
            }
        }
        info!(loaded, configured = configs.len(), "Integrations set up");
        loaded
    }

    pub fn entry_names(&self) -> Vec<&str> {
        self.entries.iter().map(LoadedEntry::name).collect()
    }

    /// Unload entries in reverse setup order
    pub async fn shutdown(mut self) {
        while let Some(entry) = self.entries.pop() {
            let name = entry.name().to_string();
            entry.unload().await;
            info!(entry = %name, "Entry unloaded");
        }
    }
}
