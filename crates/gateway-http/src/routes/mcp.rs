use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use futures::StreamExt;
use gateway_relay::{
    delete_session_owner, get_session_owner, set_session_owner, RelayError, RelayMessage,
    request_id_segment,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;
use uuid::Uuid;

use crate::context::RequestContext;
use crate::error::GatewayError;
use crate::state::AppState;

const SESSION_ID_HEADER: &str = "mcp-session-id";
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

fn session_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// The verified-token context attached to every envelope relayed for this
/// request, for the MCP server instance on the far side of the bus.
fn auth_info_of(ctx: &RequestContext) -> Value {
    json!({
        "clientId": ctx.verified.client_id,
        "userId": ctx.verified.user_id,
        "scopes": ctx.verified.scopes,
        "expiresAt": ctx.verified.expires_at,
    })
}

/// A session id is usable by this caller iff the session is live (someone
/// subscribes to its `toserver` channel) and it was created by the same
/// user. A dead session is 404; a live session owned by someone else is a
/// hijack attempt and 400s.
async fn ensure_session_access(
    state: &AppState,
    session_id: &str,
    user_id: &str,
) -> Result<(), GatewayError> {
    if !state.relay.is_live(session_id).await? {
        return Err(RelayError::SessionGone.into());
    }
    match get_session_owner(&state.kv, session_id).await? {
        Some(owner) if owner == user_id => Ok(()),
        _ => Err(RelayError::SessionNotOwned.into()),
    }
}

/// `POST /mcp`: the Streamable HTTP transport's client-to-server leg.
///
/// Without a session header only an `initialize` request is accepted; it
/// allocates the session, spins up the server-side transport, and binds the
/// session to the authenticated user. With a header, the request is relayed
/// to the session's MCP server instance after the ownership check.
pub async fn post_mcp(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Response, GatewayError> {
    let auth_info = auth_info_of(&ctx);

    let session_id = match session_id_from_headers(&headers) {
        Some(session_id) => {
            ensure_session_access(&state, &session_id, &ctx.verified.user_id).await?;
            session_id
        }
        None => {
            if body.get("method").and_then(Value::as_str) != Some("initialize") {
                return Err(GatewayError::BadRequest(
                    "a request without Mcp-Session-Id must be an initialize request".into(),
                ));
            }
            let session_id = Uuid::new_v4().to_string();
            set_session_owner(&state.kv, &session_id, &ctx.verified.user_id).await?;
            state.sessions.start_session(&session_id).await?;
            session_id
        }
    };

    let envelope = RelayMessage::mcp_with_auth(body, Some(auth_info));

    if envelope.request_id().is_some() {
        let message = state
            .relay
            .request_response(&session_id, &envelope, RESPONSE_TIMEOUT)
            .await?;
        Ok((session_header(&session_id), Json(message)).into_response())
    } else {
        state.relay.publish_to_server(&session_id, &envelope).await?;
        Ok((session_header(&session_id), StatusCode::ACCEPTED).into_response())
    }
}

/// `GET /mcp`: the Streamable HTTP transport's server-to-client stream for
/// an existing session.
pub async fn get_mcp(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    let session_id = session_id_from_headers(&headers).ok_or_else(|| {
        GatewayError::BadRequest("Mcp-Session-Id header is required for GET /mcp".into())
    })?;
    ensure_session_access(&state, &session_id, &ctx.verified.user_id).await?;

    let incoming = state.relay.subscribe_stream(&session_id).await?;
    let stream = futures::StreamExt::filter_map(incoming, |envelope| async move {
        match envelope {
            RelayMessage::Mcp { message, .. } => {
                Some(Ok::<_, Infallible>(Event::default().event("message").data(message.to_string())))
            }
            RelayMessage::Control { .. } => None,
        }
    });

    let sse = Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(30)).text("keep-alive"));
    Ok((session_header(&session_id), sse).into_response())
}

/// `DELETE /mcp`: explicit, ownership-checked session teardown.
pub async fn delete_mcp(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    headers: HeaderMap,
) -> Result<StatusCode, GatewayError> {
    let session_id = session_id_from_headers(&headers).ok_or_else(|| {
        GatewayError::BadRequest("Mcp-Session-Id header is required for DELETE /mcp".into())
    })?;
    ensure_session_access(&state, &session_id, &ctx.verified.user_id).await?;

    state.relay.shutdown(&session_id).await?;
    if let Err(err) = delete_session_owner(&state.kv, &session_id).await {
        warn!(%err, "failed to delete session owner on explicit teardown");
    }

    Ok(StatusCode::NO_CONTENT)
}

/// `GET /sse`: the legacy (2024-11-05) HTTP+SSE transport. Every connection
/// is its own session; the first event tells the client where to POST.
pub async fn get_sse(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<Response, GatewayError> {
    let session_id = Uuid::new_v4().to_string();
    set_session_owner(&state.kv, &session_id, &ctx.verified.user_id).await?;
    state.sessions.start_session(&session_id).await?;

    let mut incoming = Box::pin(state.relay.subscribe_stream(&session_id).await?);
    let endpoint = format!("/message?sessionId={session_id}");

    let stream = async_stream::stream! {
        yield Ok::<_, Infallible>(Event::default().event("endpoint").data(endpoint));

        while let Some(envelope) = incoming.next().await {
            if let RelayMessage::Mcp { message, .. } = envelope {
                yield Ok(Event::default().event("message").data(message.to_string()));
            }
        }
    };

    let sse = Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(30)).text("keep-alive"));
    Ok((session_header(&session_id), sse).into_response())
}

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

/// `POST /message`: the legacy SSE transport's client-to-server leg. Always
/// answers 202; responses to requests are delivered over the session's open
/// `GET /sse` stream, not in this response body.
pub async fn post_message(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<MessageQuery>,
    Json(body): Json<Value>,
) -> Result<StatusCode, GatewayError> {
    ensure_session_access(&state, &query.session_id, &ctx.verified.user_id).await?;

    let is_request = request_id_segment(&body).is_some();
    let envelope = RelayMessage::mcp_with_auth(body, Some(auth_info_of(&ctx)));

    if is_request {
        // Await the response off to the side and hand it to the session's
        // SSE stream; the subscription is scoped to the spawned task and
        // released on every exit path.
        let relay = state.relay.clone();
        let session_id = query.session_id.clone();
        tokio::spawn(async move {
            match relay.request_response(&session_id, &envelope, RESPONSE_TIMEOUT).await {
                Ok(response) => {
                    let forward = RelayMessage::mcp(response);
                    if let Err(err) = relay.publish_to_client_stream(&session_id, &forward).await {
                        warn!(%err, "failed to forward relayed response onto the SSE stream");
                    }
                }
                Err(err) => warn!(%err, "relayed request produced no response"),
            }
        });
    } else {
        state.relay.publish_to_server(&query.session_id, &envelope).await?;
    }

    Ok(StatusCode::ACCEPTED)
}

fn session_header(session_id: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    match HeaderValue::from_str(session_id) {
        Ok(value) => {
            headers.insert(SESSION_ID_HEADER, value);
        }
        Err(_) => warn!("session id was not a valid header value"),
    }
    headers
}
