pub mod auth;
pub mod config;
pub mod directory;
pub mod error;
pub mod gateway;
pub mod routes;

use std::sync::Arc;

use auth::SessionAuth;
use config::Config;
use gateway::online::OnlineUsers;
use gateway::registry::BrokerRegistry;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub auth: Arc<dyn SessionAuth>,
    pub online: OnlineUsers,
    pub registry: BrokerRegistry,
}
