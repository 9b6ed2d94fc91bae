use std::time::Duration;

use gateway_auth::AuthMode;

/// Gateway configuration, loaded once at startup from the environment.
/// Fails fast with a descriptive error rather than falling back to
/// something that would run insecurely.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub base_uri: String,
    pub redis_url: String,
    pub redis_password: Option<String>,
    pub redis_tls: bool,
    pub auth_mode: AuthMode,
    pub auth_server_url: Option<String>,
    pub auth_server_port: Option<u16>,
    pub session_inactivity_timeout: Duration,
    pub log_level: String,
    pub human_readable_logs: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let port = env_or("PORT", "8080")
            .parse()
            .map_err(|e| format!("PORT must be a valid port number: {e}"))?;

        let base_uri = env_or("BASE_URI", &format!("http://127.0.0.1:{port}"));

        let redis_url = env_or("REDIS_URL", "redis://127.0.0.1:6379");
        let redis_password = std::env::var("REDIS_PASSWORD").ok();
        let redis_tls = env_or("REDIS_TLS", "false")
            .parse()
            .map_err(|e| format!("REDIS_TLS must be true or false: {e}"))?;

        let auth_mode = match env_or("AUTH_MODE", "embedded").as_str() {
            "embedded" => AuthMode::Embedded,
            "external" => AuthMode::External,
            "auth_only" => AuthMode::AuthOnly,
            other => return Err(format!("AUTH_MODE must be embedded, external, or auth_only, got {other:?}")),
        };

        let auth_server_url = std::env::var("AUTH_SERVER_URL").ok();
        if auth_mode == AuthMode::External && auth_server_url.is_none() {
            return Err("AUTH_SERVER_URL is required when AUTH_MODE=external".to_string());
        }

        let auth_server_port = std::env::var("AUTH_SERVER_PORT")
            .ok()
            .map(|s| s.parse().map_err(|e| format!("AUTH_SERVER_PORT must be a valid port number: {e}")))
            .transpose()?;

        let session_inactivity_timeout = Duration::from_secs(
            env_or("SESSION_TIMEOUT_SECS", "300")
                .parse()
                .map_err(|e| format!("SESSION_TIMEOUT_SECS must be a number of seconds: {e}"))?,
        );

        let log_level = env_or("LOG_LEVEL", "info");
        let human_readable_logs = env_or("LOG_FORMAT", "json") == "human";

        Ok(Self {
            port,
            base_uri,
            redis_url,
            redis_password,
            redis_tls,
            auth_mode,
            auth_server_url,
            auth_server_port,
            session_inactivity_timeout,
            log_level,
            human_readable_logs,
        })
    }

    /// The port to actually bind: a dedicated auth-only process may be given
    /// its own via `AUTH_SERVER_PORT`.
    pub fn listen_port(&self) -> u16 {
        match (self.auth_mode, self.auth_server_port) {
            (AuthMode::AuthOnly, Some(port)) => port,
            _ => self.port,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
