use url::Url;

use crate::error::AuthError;

/// Validate a client's `redirect_uri` at registration time and again at
/// `/authorize` time.
///
/// `https` is always allowed; `http` only for localhost/127.0.0.1/0.0.0.0
/// (native-app loopback redirects, RFC 8252); fragments are rejected per the
/// OAuth 2.0 core spec; path traversal segments are rejected defensively
/// even though `url::Url` already normalizes `..` out of the path.
pub fn validate_redirect_uri(uri: &str) -> Result<Url, AuthError> {
    let parsed = Url::parse(uri).map_err(|e| AuthError::InvalidClientMetadata {
        reason: format!("invalid redirect_uri: {e}"),
    })?;

    match parsed.scheme() {
        "https" => {}
        "http" => {
            let host = parsed.host_str().ok_or_else(|| AuthError::InvalidClientMetadata {
                reason: "redirect_uri must have a host".into(),
            })?;
            if !is_loopback(host) {
                return Err(AuthError::InvalidClientMetadata {
                    reason: "http redirect_uri is only allowed for loopback addresses".into(),
                });
            }
        }
        scheme => {
            return Err(AuthError::InvalidClientMetadata {
                reason: format!("unsupported redirect_uri scheme: {scheme}"),
            });
        }
    }

    if parsed.fragment().is_some() {
        return Err(AuthError::InvalidClientMetadata {
            reason: "redirect_uri must not contain a fragment".into(),
        });
    }

    if let Some(segments) = parsed.path_segments() {
        if segments.clone().any(|s| s == "..") {
            return Err(AuthError::InvalidClientMetadata {
                reason: "redirect_uri path must not contain traversal segments".into(),
            });
        }
    }

    Ok(parsed)
}

fn is_loopback(host: &str) -> bool {
    host == "localhost" || host == "127.0.0.1" || host == "0.0.0.0" || host == "::1"
}
