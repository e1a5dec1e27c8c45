//! Application State

use std::sync::Arc;

use pump_core::Settings;
use pump_runtime::AgentRunner;
use pump_store::Store;

use crate::worker::RunTracker;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Research database
    pub store: Store,

    /// Executes agent sessions (Claude CLI, or a fake in tests)
    pub runner: Arc<dyn AgentRunner>,

    /// Active run and live log buffer
    pub tracker: Arc<RunTracker>,

    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(store: Store, runner: Arc<dyn AgentRunner>, settings: Settings) -> Self {
        Self {
            store,
            runner,
            tracker: Arc::new(RunTracker::new(settings.log_buffer_lines)),
            settings: Arc::new(settings),
        }
    }
}
