use url::Url;

use crate::error::AuthError;

/// Canonicalize a `resource` parameter (RFC 8707) or a `BASE_URI` for
/// audience comparison: lowercase scheme and host, strip default ports
/// (443/80), strip query and fragment, trim a trailing slash except on the
/// root path.
pub fn canonicalize_resource(uri: &str) -> Result<String, AuthError> {
    let url = Url::parse(uri).map_err(|e| AuthError::InvalidGrant {
        reason: format!("invalid resource URI: {e}"),
    })?;

    match url.scheme() {
        "https" | "http" => {}
        scheme => {
            return Err(AuthError::InvalidGrant {
                reason: format!("resource URI must use http or https, got: {scheme}"),
            });
        }
    }

    let host = url.host_str().ok_or_else(|| AuthError::InvalidGrant {
        reason: "resource URI must have a host".into(),
    })?;

    if url.fragment().is_some() {
        return Err(AuthError::InvalidGrant {
            reason: "resource URI must not contain a fragment".into(),
        });
    }

    let scheme = url.scheme().to_lowercase();
    let host_lower = host.to_lowercase();

    let port_str = match url.port() {
        Some(port) if (scheme == "https" && port == 443) || (scheme == "http" && port == 80) => {
            String::new()
        }
        Some(port) => format!(":{port}"),
        None => String::new(),
    };

    let path = url.path();
    let normalized_path = if path == "/" {
        path.to_string()
    } else {
        path.trim_end_matches('/').to_string()
    };

    Ok(format!("{scheme}://{host_lower}{port_str}{normalized_path}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_trailing_slash() {
        assert_eq!(
            canonicalize_resource("HTTPS://API.EXAMPLE.COM/mcp/").unwrap(),
            "https://api.example.com/mcp"
        );
    }

    #[test]
    fn strips_default_port() {
        assert_eq!(
            canonicalize_resource("https://api.example.com:443/mcp").unwrap(),
            "https://api.example.com/mcp"
        );
    }

    #[test]
    fn preserves_non_default_port() {
        assert_eq!(
            canonicalize_resource("https://api.example.com:8443/mcp").unwrap(),
            "https://api.example.com:8443/mcp"
        );
    }

    #[test]
    fn root_path_keeps_slash() {
        assert_eq!(
            canonicalize_resource("https://api.example.com/").unwrap(),
            "https://api.example.com/"
        );
    }

    #[test]
    fn rejects_fragment() {
        assert!(canonicalize_resource("https://api.example.com/mcp#x").is_err());
    }
}
