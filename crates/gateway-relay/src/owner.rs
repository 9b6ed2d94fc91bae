use gateway_kv::{session_owner_key, EncryptedKv};

use crate::Result;

/// Bind a session to the user that created it. Called exactly once, when the
/// session is first established; the binding is immutable for the session's
/// lifetime — there is no update path, only deletion at teardown.
pub async fn set_session_owner(kv: &EncryptedKv, session_id: &str, user_id: &str) -> Result<()> {
    kv.save_plain(&session_owner_key(session_id), &user_id, None)
        .await?;
    Ok(())
}

/// The user id a session was bound to, if the session (still) exists.
pub async fn get_session_owner(kv: &EncryptedKv, session_id: &str) -> Result<Option<String>> {
    Ok(kv.read_plain(&session_owner_key(session_id)).await?)
}

/// Remove the binding at explicit teardown.
pub async fn delete_session_owner(kv: &EncryptedKv, session_id: &str) -> Result<()> {
    kv.delete(&session_owner_key(session_id)).await?;
    Ok(())
}
