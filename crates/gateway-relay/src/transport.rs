use std::time::Duration;

use futures::{Stream, StreamExt};
use redis::AsyncCommands;
use tracing::{debug, instrument};

use crate::channels::{
    control_channel, to_client_channel, to_client_stream_channel, to_server_channel,
};
use crate::envelope::RelayMessage;
use crate::error::RelayError;
use crate::Result;

/// The HTTP edge's side of the session relay: publish client envelopes onto
/// `toserver`, await the matching response on `toclient:{requestId}`,
/// subscribe to the session's `__GET_stream` for server-initiated pushes,
/// and check or command liveness via `NUMSUB` and the control channel.
#[derive(Clone)]
pub struct SessionRelay {
    client: redis::Client,
}

impl SessionRelay {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    /// Publish an envelope for the MCP server process, without awaiting any
    /// response. Used for notifications.
    #[instrument(skip(self, envelope))]
    pub async fn publish_to_server(&self, session_id: &str, envelope: &RelayMessage) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(envelope)?;
        let _: () = conn.publish(to_server_channel(session_id), payload).await?;
        Ok(())
    }

    /// Publish a request envelope and await its response.
    ///
    /// The response subscription is established before the request is
    /// published — the MCP server may answer faster than a subscribe
    /// round-trip, and a response published to a channel nobody listens on
    /// is gone for good.
    #[instrument(skip(self, envelope))]
    pub async fn request_response(
        &self,
        session_id: &str,
        envelope: &RelayMessage,
        timeout: Duration,
    ) -> Result<serde_json::Value> {
        let request_id = envelope.request_id().ok_or(RelayError::MissingRequestId)?;

        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub
            .subscribe(to_client_channel(session_id, &request_id))
            .await?;
        let mut responses = pubsub.into_on_message();

        self.publish_to_server(session_id, envelope).await?;

        let msg = tokio::time::timeout(timeout, responses.next())
            .await
            .map_err(|_| RelayError::Timeout)?
            .ok_or(RelayError::SessionGone)?;

        let payload: String = msg.get_payload()?;
        match serde_json::from_str(&payload)? {
            RelayMessage::Mcp { message, .. } => Ok(message),
            RelayMessage::Control { .. } => Err(RelayError::SessionGone),
        }
    }

    /// Publish onto the session's server-push stream. Used by the legacy SSE
    /// transport's client-to-server leg to hand a relayed response to the
    /// session's open SSE connection.
    #[instrument(skip(self, envelope))]
    pub async fn publish_to_client_stream(
        &self,
        session_id: &str,
        envelope: &RelayMessage,
    ) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(envelope)?;
        let _: () = conn
            .publish(to_client_stream_channel(session_id), payload)
            .await?;
        Ok(())
    }

    /// Subscribe to a session's server-push stream, for forwarding onto its
    /// SSE connection. The subscription ends when the returned stream is
    /// dropped.
    #[instrument(skip(self))]
    pub async fn subscribe_stream(
        &self,
        session_id: &str,
    ) -> Result<impl Stream<Item = RelayMessage> + use<>> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub
            .subscribe(to_client_stream_channel(session_id))
            .await?;

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = msg.get_payload().ok()?;
            serde_json::from_str(&payload).ok()
        });

        Ok(stream)
    }

    /// A session is live iff its `toserver` channel has at least one
    /// subscriber — the MCP server process handling it.
    pub async fn is_live(&self, session_id: &str) -> Result<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let counts: Vec<(String, usize)> = redis::cmd("PUBSUB")
            .arg("NUMSUB")
            .arg(to_server_channel(session_id))
            .query_async(&mut conn)
            .await?;
        Ok(counts.into_iter().any(|(_, n)| n > 0))
    }

    /// Publish a `SHUTDOWN` control message, telling every process holding a
    /// piece of this session to tear it down.
    #[instrument(skip(self))]
    pub async fn shutdown(&self, session_id: &str) -> Result<()> {
        debug!("publishing shutdown");
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(&RelayMessage::shutdown())?;
        let _: () = conn.publish(control_channel(session_id), payload).await?;
        Ok(())
    }
}
