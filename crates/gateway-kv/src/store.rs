use std::time::Duration;

use gateway_crypto::{cipher_key, fingerprint};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::KvError;
use crate::Result;

const MAX_RETRIES: u32 = 3;

/// Atomically reads the current value of `KEYS[1]` and, only if it exists,
/// overwrites it with `ARGV[1]` while preserving the remaining TTL. Returns
/// the value that was there before the write, or nil. A missing key is left
/// missing — an exchange against an expired record must not resurrect it.
const EXCHANGE_SCRIPT: &str = r#"
local previous = redis.call('GET', KEYS[1])
if previous then
  redis.call('SET', KEYS[1], ARGV[1], 'KEEPTTL')
end
return previous
"#;

/// Redis-backed KV store in which every secret-keyed record is encrypted at
/// rest under its own lookup token: the storage key is
/// `{prefix}:{sha256(token)}` and the value is AES-256-CBC of the JSON
/// payload, keyed by the token's 32 raw bytes. A dump of the KV contents
/// alone yields neither live tokens nor the records they look up.
#[derive(Clone)]
pub struct EncryptedKv {
    client: Client,
    conn: ConnectionManager,
}

impl EncryptedKv {
    /// Connect to Redis and establish the auto-reconnecting manager.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        let conn = ConnectionManager::new(client.clone()).await?;
        Ok(Self { client, conn })
    }

    /// Save a secret-keyed record: encrypted under `token`, stored at
    /// `{prefix}:{sha256(token)}` with the given TTL.
    pub(crate) async fn save_secret<T: Serialize>(
        &self,
        prefix: &str,
        token: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<()> {
        let key = secret_storage_key(prefix, token);
        let payload = encrypt_record(token, value)?;
        self.with_retries(|mut conn| {
            let key = key.clone();
            let payload = payload.clone();
            let ttl_secs = ttl.as_secs().max(1);
            async move { conn.set_ex::<_, _, ()>(key, payload, ttl_secs).await }
        })
        .await?;
        Ok(())
    }

    /// Read a secret-keyed record. A token that cannot key a record (wrong
    /// shape) or whose record has expired reads as absent.
    pub(crate) async fn read_secret<T: DeserializeOwned>(
        &self,
        prefix: &str,
        token: &str,
    ) -> Result<Option<T>> {
        let Some(key_bytes) = cipher_key(token) else {
            return Ok(None);
        };
        let key = secret_storage_key(prefix, token);
        let raw: Option<String> = self
            .with_retries(|mut conn| {
                let key = key.clone();
                async move { conn.get(key).await }
            })
            .await?;

        match raw {
            Some(payload) => Ok(Some(decrypt_record(&key_bytes, &payload)?)),
            None => Ok(None),
        }
    }

    /// Atomically read and delete a secret-keyed record (`GETDEL`). Of two
    /// concurrent callers, exactly one observes the record.
    pub(crate) async fn take_secret<T: DeserializeOwned>(
        &self,
        prefix: &str,
        token: &str,
    ) -> Result<Option<T>> {
        let Some(key_bytes) = cipher_key(token) else {
            return Ok(None);
        };
        let key = secret_storage_key(prefix, token);
        let raw: Option<String> = self
            .with_retries(|mut conn| {
                let key = key.clone();
                async move { conn.get_del(key).await }
            })
            .await?;

        match raw {
            Some(payload) => Ok(Some(decrypt_record(&key_bytes, &payload)?)),
            None => Ok(None),
        }
    }

    /// Atomically rewrite a secret-keyed record with `new_value`, preserving
    /// its TTL, and return what was there before the write. Absent records
    /// stay absent and return `None`.
    pub(crate) async fn exchange_secret<T>(
        &self,
        prefix: &str,
        token: &str,
        new_value: &T,
    ) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
    {
        let Some(key_bytes) = cipher_key(token) else {
            return Ok(None);
        };
        let key = secret_storage_key(prefix, token);
        let payload = encrypt_record(token, new_value)?;

        let previous: Option<String> = self
            .with_retries(|mut conn| {
                let key = key.clone();
                let payload = payload.clone();
                async move {
                    Script::new(EXCHANGE_SCRIPT)
                        .key(key)
                        .arg(payload)
                        .invoke_async(&mut conn)
                        .await
                }
            })
            .await?;

        match previous {
            Some(payload) => Ok(Some(decrypt_record(&key_bytes, &payload)?)),
            None => Ok(None),
        }
    }

    pub(crate) async fn delete_secret(&self, prefix: &str, token: &str) -> Result<()> {
        self.delete(&secret_storage_key(prefix, token)).await
    }

    /// Save a plaintext record at a directly addressable key, optionally
    /// with a TTL. Used for client registrations and session owners, whose
    /// keys are public identifiers rather than secrets.
    pub async fn save_plain<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let payload = String::from_utf8(serde_json::to_vec(value)?)
            .expect("serde_json output is valid UTF-8");
        self.with_retries(|mut conn| {
            let key = key.to_string();
            let payload = payload.clone();
            async move {
                match ttl {
                    Some(ttl) => conn.set_ex::<_, _, ()>(key, payload, ttl.as_secs().max(1)).await,
                    None => conn.set::<_, _, ()>(key, payload).await,
                }
            }
        })
        .await?;
        Ok(())
    }

    /// Read a plaintext record, if present.
    pub async fn read_plain<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let raw: Option<String> = self
            .with_retries(|mut conn| {
                let key = key.to_string();
                async move { conn.get(key).await }
            })
            .await?;
        match raw {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    /// Delete a record outright, by storage key.
    pub async fn delete(&self, key: &str) -> Result<()> {
        self.with_retries(|mut conn| {
            let key = key.to_string();
            async move { conn.del::<_, ()>(key).await }
        })
        .await?;
        Ok(())
    }

    /// A fresh Redis client handle, for components (the session relay) that
    /// need their own pub/sub connections rather than sharing this store's.
    pub fn client(&self) -> Client {
        self.client.clone()
    }

    async fn with_retries<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: Fn(ConnectionManager) -> Fut,
        Fut: std::future::Future<Output = redis::RedisResult<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match operation(self.conn.clone()).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= MAX_RETRIES => {
                    warn!(error = %e, attempts = attempt, "redis operation failed, giving up");
                    return Err(KvError::from(e));
                }
                Err(e) => {
                    debug!(error = %e, attempt, "redis operation failed, retrying");
                    tokio::time::sleep(Duration::from_millis(50 * attempt as u64)).await;
                }
            }
        }
    }
}

fn secret_storage_key(prefix: &str, token: &str) -> String {
    format!("{prefix}:{}", fingerprint(token))
}

fn encrypt_record<T: Serialize>(token: &str, value: &T) -> Result<String> {
    let key_bytes = cipher_key(token).ok_or(KvError::InvalidLookupToken)?;
    let json = serde_json::to_vec(value)?;
    Ok(gateway_crypto::encrypt(&key_bytes, &json))
}

fn decrypt_record<T: DeserializeOwned>(key_bytes: &[u8; 32], payload: &str) -> Result<T> {
    let json = gateway_crypto::decrypt(key_bytes, payload)?;
    Ok(serde_json::from_slice(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{McpTokens, TokenExchange};

    fn token() -> String {
        gateway_crypto::generate_token()
    }

    #[test]
    fn storage_key_is_prefix_plus_fingerprint_never_the_token() {
        let token = token();
        let key = secret_storage_key("auth:exch", &token);
        assert!(key.starts_with("auth:exch:"));
        assert!(!key.contains(&token));
    }

    #[test]
    fn record_round_trips_under_its_own_token() {
        let token = token();
        let record = TokenExchange {
            mcp_access_token: gateway_crypto::generate_token(),
            already_used: false,
        };
        let payload = encrypt_record(&token, &record).unwrap();
        assert!(payload.contains(':'), "wire format is hex(iv):hex(ciphertext)");

        let key_bytes = cipher_key(&token).unwrap();
        let decoded: TokenExchange = decrypt_record(&key_bytes, &payload).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn record_is_unreadable_under_a_different_token() {
        let record = McpTokens {
            access_token: token(),
            refresh_token: token(),
            expires_in: 3600,
        };
        let payload = encrypt_record(&token(), &record).unwrap();
        let wrong_key = cipher_key(&token()).unwrap();
        assert!(decrypt_record::<McpTokens>(&wrong_key, &payload).is_err());
    }

    #[test]
    fn non_token_lookup_cannot_store() {
        assert!(matches!(
            encrypt_record("not-a-token", &TokenExchange {
                mcp_access_token: String::new(),
                already_used: false,
            }),
            Err(KvError::InvalidLookupToken)
        ));
    }
}
