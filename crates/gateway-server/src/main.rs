mod config;
mod handler;
mod logging;

use std::net::SocketAddr;
use std::sync::Arc;

use config::Config;
use gateway_http::{build_router, AppState};
use gateway_kv::EncryptedKv;
use handler::ReferenceMcpFactory;

#[tokio::main]
async fn main() {
    let config = Config::from_env().unwrap_or_else(|err| {
        eprintln!("configuration error: {err}");
        std::process::exit(1);
    });

    if let Err(err) = logging::init(&config.log_level, config.human_readable_logs) {
        eprintln!("failed to initialize logging: {err}");
        std::process::exit(1);
    }

    tracing::info!(
        port = config.listen_port(),
        auth_mode = ?config.auth_mode,
        "starting gateway"
    );

    let redis_url = redis_connection_url(&config);

    let kv = match EncryptedKv::connect(&redis_url).await {
        Ok(kv) => Arc::new(kv),
        Err(err) => {
            tracing::error!(%err, "failed to connect to redis");
            std::process::exit(1);
        }
    };

    let relay_client = match redis::Client::open(redis_url.as_str()) {
        Ok(client) => client,
        Err(err) => {
            tracing::error!(%err, "failed to build redis client for session relay");
            std::process::exit(1);
        }
    };

    let state = AppState::new(
        kv,
        relay_client,
        config.base_uri.clone(),
        config.auth_mode,
        config.auth_server_url.clone(),
        Arc::new(ReferenceMcpFactory),
        config.session_inactivity_timeout,
    );

    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", config.listen_port());
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(%err, %addr, "failed to bind");
            std::process::exit(1);
        }
    };

    tracing::info!(%addr, "gateway listening");

    // Peer addresses feed the per-source rate limiter.
    let service = app.into_make_service_with_connect_info::<SocketAddr>();
    if let Err(err) = axum::serve(listener, service).await {
        tracing::error!(%err, "server error");
        std::process::exit(1);
    }
}

fn redis_connection_url(config: &Config) -> String {
    let mut url = config.redis_url.clone();
    if config.redis_tls && url.starts_with("redis://") {
        url = url.replacen("redis://", "rediss://", 1);
    }
    if let Some(password) = &config.redis_password {
        if let Some(rest) = url.strip_prefix("redis://") {
            url = format!("redis://:{password}@{rest}");
        } else if let Some(rest) = url.strip_prefix("rediss://") {
            url = format!("rediss://:{password}@{rest}");
        }
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            port: 8080,
            base_uri: "http://127.0.0.1:8080".into(),
            redis_url: "redis://127.0.0.1:6379".into(),
            redis_password: None,
            redis_tls: false,
            auth_mode: gateway_http::AuthMode::Embedded,
            auth_server_url: None,
            auth_server_port: None,
            session_inactivity_timeout: std::time::Duration::from_secs(300),
            log_level: "info".into(),
            human_readable_logs: false,
        }
    }

    #[test]
    fn redis_url_gains_tls_scheme_and_password() {
        let mut config = base_config();
        config.redis_tls = true;
        config.redis_password = Some("hunter2".into());
        assert_eq!(
            redis_connection_url(&config),
            "rediss://:hunter2@127.0.0.1:6379"
        );
    }

    #[test]
    fn auth_only_mode_prefers_its_dedicated_port() {
        let mut config = base_config();
        config.auth_mode = gateway_http::AuthMode::AuthOnly;
        config.auth_server_port = Some(9000);
        assert_eq!(config.listen_port(), 9000);
        config.auth_mode = gateway_http::AuthMode::Embedded;
        assert_eq!(config.listen_port(), 8080);
    }
}
