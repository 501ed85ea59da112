use crate::core::config::AppConfig;
use crate::tickets::{TicketLifecycle, TicketStore};

/// Shared state handed to every HTTP handler.
pub struct AppState<S: TicketStore> {
    pub config: AppConfig,
    pub lifecycle: TicketLifecycle<S>,
}

impl<S: TicketStore> AppState<S> {
    pub fn new(config: AppConfig, lifecycle: TicketLifecycle<S>) -> Self {
        Self { config, lifecycle }
    }
}
