use gateway_crypto::generate_token;
use gateway_kv::{client_key, ClientRegistration, EncryptedKv, CLIENT_TTL};
use serde::Deserialize;

use crate::error::AuthError;
use crate::redirect::validate_redirect_uri;

/// Request body for `POST /register` (RFC 7591).
#[derive(Debug, Deserialize)]
pub struct RegisterClientRequest {
    pub client_name: Option<String>,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    pub client_uri: Option<String>,
}

/// Dynamically register a new OAuth client, persisting it for 30 days.
///
/// Every `redirect_uri` is validated up front; registration is rejected
/// atomically if any one of them is invalid, rather than silently dropping
/// the bad ones. The issued `client_secret` is returned exactly once, here.
pub async fn register_client(
    kv: &EncryptedKv,
    req: RegisterClientRequest,
) -> Result<ClientRegistration, AuthError> {
    if req.redirect_uris.is_empty() {
        return Err(AuthError::InvalidClientMetadata {
            reason: "redirect_uris must not be empty".into(),
        });
    }
    for uri in &req.redirect_uris {
        validate_redirect_uri(uri)?;
    }

    let registration = ClientRegistration {
        client_id: generate_token(),
        client_name: req.client_name,
        redirect_uris: req.redirect_uris,
        client_uri: req.client_uri,
        client_secret: Some(generate_token()),
    };

    kv.save_plain(&client_key(&registration.client_id), &registration, Some(CLIENT_TTL))
        .await?;

    Ok(registration)
}

/// Look up a registered client by id.
pub async fn get_client(kv: &EncryptedKv, client_id: &str) -> Result<ClientRegistration, AuthError> {
    kv.read_plain(&client_key(client_id))
        .await?
        .ok_or_else(|| AuthError::InvalidClient {
            reason: format!("unknown client_id: {client_id}"),
        })
}
