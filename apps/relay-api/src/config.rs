/// Relay API configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// NATS server URL the event queues live on (e.g. `nats://localhost:4222`).
    pub nats_url: String,
    /// The auth service origin used to resolve connection tokens.
    pub auth_url: String,
    /// The chat service origin used for membership lookups.
    pub chat_url: String,
    /// Port the HTTP server binds to.
    pub port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        Self {
            nats_url: required_var("NATS_URL"),
            auth_url: required_var("AUTH_SERVICE_URL"),
            chat_url: required_var("CHAT_SERVICE_URL"),
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4003),
        }
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}
