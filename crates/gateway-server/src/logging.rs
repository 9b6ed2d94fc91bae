use std::io;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize structured logging to stderr. `RUST_LOG` takes precedence over
/// `default_level`; output is JSON unless `human_readable` is set (useful
/// for a local/dev environment).
pub fn init(default_level: &str, human_readable: bool) -> io::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);

    if human_readable {
        registry
            .with(fmt::layer().with_writer(io::stderr))
            .try_init()
            .map_err(io::Error::other)
    } else {
        registry
            .with(fmt::layer().json().with_writer(io::stderr))
            .try_init()
            .map_err(io::Error::other)
    }
}
