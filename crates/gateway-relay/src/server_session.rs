use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use gateway_kv::{session_owner_key, EncryptedKv};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::channels::{
    control_channel, to_client_channel, to_client_stream_channel, to_server_channel,
};
use crate::envelope::{request_id_segment, ControlAction, RelayMessage};
use crate::Result;

/// The MCP server instance bound to one session: given an inbound JSON-RPC
/// message, produce the response — `Some` for requests, `None` for
/// notifications. The relay treats the message as opaque; method dispatch
/// belongs entirely to the implementor.
#[async_trait]
pub trait McpServerHandle: Send + Sync {
    async fn handle(
        &self,
        message: serde_json::Value,
        auth_info: Option<serde_json::Value>,
    ) -> Option<serde_json::Value>;
}

/// Creates an [`McpServerHandle`] for each freshly initialized session.
pub trait McpSessionFactory: Send + Sync {
    fn create(&self, session_id: &str) -> Arc<dyn McpServerHandle>;
}

/// The server-side transport for one session: subscribed to the session's
/// `toserver` and `control` channels, dispatching each MCP envelope to its
/// handler and publishing responses back out. Owns the session's inactivity
/// timer — five minutes (configurable) without a `toserver` message and the
/// transport publishes `SHUTDOWN` on the control channel, which closes this
/// transport and everything else subscribed to the session.
pub struct ServerSessionTransport {
    session_id: String,
    kv: Arc<EncryptedKv>,
    handler: Arc<dyn McpServerHandle>,
    inactivity_timeout: Duration,
}

impl ServerSessionTransport {
    /// Subscribe to the session's channels and spawn the serving loop.
    /// Returns only once the subscriptions are established, so an envelope
    /// published immediately afterwards cannot be missed.
    pub async fn start(
        client: redis::Client,
        kv: Arc<EncryptedKv>,
        session_id: String,
        handler: Arc<dyn McpServerHandle>,
        inactivity_timeout: Duration,
    ) -> Result<JoinHandle<()>> {
        let mut pubsub = client.get_async_pubsub().await?;
        pubsub.subscribe(to_server_channel(&session_id)).await?;
        pubsub.subscribe(control_channel(&session_id)).await?;
        let publish_conn = client.get_multiplexed_async_connection().await?;

        let transport = Self {
            session_id,
            kv,
            handler,
            inactivity_timeout,
        };
        Ok(tokio::spawn(transport.run(pubsub, publish_conn)))
    }

    async fn run(self, pubsub: redis::aio::PubSub, mut publish_conn: MultiplexedConnection) {
        let control = control_channel(&self.session_id);
        let mut messages = pubsub.into_on_message();
        let deadline = tokio::time::sleep(self.inactivity_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                msg = messages.next() => {
                    let Some(msg) = msg else {
                        warn!(session_id = %self.session_id, "pub/sub connection lost, closing session");
                        break;
                    };

                    let payload: String = match msg.get_payload() {
                        Ok(p) => p,
                        Err(err) => {
                            warn!(%err, "dropping unreadable relay payload");
                            continue;
                        }
                    };
                    let envelope: RelayMessage = match serde_json::from_str(&payload) {
                        Ok(e) => e,
                        Err(err) => {
                            warn!(%err, "dropping envelope that failed to deserialize");
                            continue;
                        }
                    };

                    if msg.get_channel_name() == control {
                        if matches!(envelope, RelayMessage::Control { action: ControlAction::Shutdown, .. }) {
                            debug!(session_id = %self.session_id, "shutdown requested");
                            break;
                        }
                        continue;
                    }

                    deadline.as_mut().reset(Instant::now() + self.inactivity_timeout);
                    self.dispatch(envelope, &mut publish_conn).await;
                }
                () = &mut deadline => {
                    info!(session_id = %self.session_id, "session idle past timeout, shutting down");
                    match serde_json::to_string(&RelayMessage::shutdown()) {
                        Ok(shutdown) => {
                            if let Err(err) = publish_conn.publish::<_, _, ()>(&control, shutdown).await {
                                warn!(%err, "failed to publish inactivity shutdown");
                            }
                        }
                        Err(err) => warn!(%err, "failed to serialize shutdown envelope"),
                    }
                    break;
                }
            }
        }

        // The owner binding lives exactly as long as the session.
        if let Err(err) = self.kv.delete(&session_owner_key(&self.session_id)).await {
            warn!(%err, session_id = %self.session_id, "failed to delete session owner on shutdown");
        }
    }

    async fn dispatch(&self, envelope: RelayMessage, publish_conn: &mut MultiplexedConnection) {
        let RelayMessage::Mcp { message, extra, .. } = envelope else {
            return;
        };
        let request_id = request_id_segment(&message);
        let auth_info = extra.and_then(|e| e.auth_info);

        let Some(response) = self.handler.handle(message, auth_info).await else {
            return;
        };

        // Responses to identified requests go to that request's channel;
        // anything else is a server-initiated push onto the GET stream.
        let (channel, out) = match request_id {
            Some(rid) => (
                to_client_channel(&self.session_id, &rid),
                RelayMessage::response(response, serde_json::Value::String(rid.clone())),
            ),
            None => (
                to_client_stream_channel(&self.session_id),
                RelayMessage::mcp(response),
            ),
        };

        match serde_json::to_string(&out) {
            Ok(serialized) => {
                if let Err(err) = publish_conn.publish::<_, _, ()>(channel, serialized).await {
                    warn!(%err, "failed to publish relay response");
                }
            }
            Err(err) => warn!(%err, "failed to serialize relay response"),
        }
    }
}

/// Spawns a [`ServerSessionTransport`] per freshly initialized session,
/// binding it to a handler from the configured factory.
#[derive(Clone)]
pub struct SessionHost {
    client: redis::Client,
    kv: Arc<EncryptedKv>,
    factory: Arc<dyn McpSessionFactory>,
    inactivity_timeout: Duration,
}

impl SessionHost {
    pub fn new(
        client: redis::Client,
        kv: Arc<EncryptedKv>,
        factory: Arc<dyn McpSessionFactory>,
        inactivity_timeout: Duration,
    ) -> Self {
        Self {
            client,
            kv,
            factory,
            inactivity_timeout,
        }
    }

    /// Bring up the server side of a new session. Once this returns, the
    /// session is live: `toserver` has a subscriber and envelopes can flow.
    pub async fn start_session(&self, session_id: &str) -> Result<()> {
        let handler = self.factory.create(session_id);
        ServerSessionTransport::start(
            self.client.clone(),
            self.kv.clone(),
            session_id.to_string(),
            handler,
            self.inactivity_timeout,
        )
        .await?;
        Ok(())
    }
}
