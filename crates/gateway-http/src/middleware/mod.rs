mod bearer;
mod rate_limit;
mod security_headers;

pub use bearer::require_bearer;
pub use rate_limit::{layer_for, RateLimitConfig};
pub use security_headers::{apply_security_headers, no_store};
