pub mod config;
pub mod guard;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod session;
pub mod startup;

use config::{RouteSettings, SessionSettings};
use services::ConsoleMetrics;
use session::SessionRegistry;

/// Shared application state: per-browser session resolvers and console-wide metrics.
#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionRegistry,
    pub metrics: ConsoleMetrics,
    pub routes: RouteSettings,
    pub session_settings: SessionSettings,
}

impl AppState {
    pub fn new(sessions: SessionRegistry, metrics: ConsoleMetrics, routes: RouteSettings) -> Self {
        Self {
            sessions,
            metrics,
            routes,
            session_settings: SessionSettings::default(),
        }
    }

    pub fn with_session_settings(mut self, settings: SessionSettings) -> Self {
        self.session_settings = settings;
        self
    }
}
