//! Per-connection realtime session
//!
//! Registers the socket with the hub, then runs two halves until either ends:
//! a writer draining the connection's outbound queue onto the socket, and a
//! reader feeding lock/unlock frames into the hub. Unknown or malformed frames
//! are ignored. The connection unregisters itself on the way out.

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

use super::{ClientMessage, Connection, HubHandle};
use crate::types::Result;

/// Serve one realtime viewer until it disconnects or the hub drops it
pub async fn serve_connection<S>(ws: WebSocketStream<S>, hub: HubHandle) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let Connection { id, mut outbound } = hub.register().await?;
    let (mut sender, mut receiver) = ws.split();

    info!(connection = %id, "Realtime viewer connected");

    let writer = async {
        while let Some(message) = outbound.recv().await {
            let json = match serde_json::to_string(message.as_ref()) {
                Ok(json) => json,
                Err(e) => {
                    warn!(connection = %id, error = %e, "Failed to encode outbound message");
                    continue;
                }
            };
            if let Err(e) = sender.send(WsMessage::Text(json)).await {
                debug!(connection = %id, error = %e, "Send failed");
                return;
            }
        }
        // Hub released this connection
        let _ = sender.send(WsMessage::Close(None)).await;
    };

    let reader = async {
        while let Some(frame) = receiver.next().await {
            let text = match frame {
                Ok(WsMessage::Text(text)) => text,
                Ok(WsMessage::Binary(data)) => match String::from_utf8(data) {
                    Ok(text) => text,
                    Err(_) => continue,
                },
                Ok(WsMessage::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    debug!(connection = %id, error = %e, "Read failed");
                    break;
                }
            };

            if dispatch(&hub, &text).await.is_err() {
                break;
            }
        }
    };

    tokio::select! {
        _ = writer => debug!(connection = %id, "Writer finished"),
        _ = reader => debug!(connection = %id, "Reader finished"),
    }

    // Idempotent; fails only if the hub itself is gone
    let _ = hub.unregister(id).await;
    info!(connection = %id, "Realtime viewer disconnected");

    Ok(())
}

async fn dispatch(hub: &HubHandle, frame: &str) -> Result<()> {
    match ClientMessage::decode(frame) {
        Some(ClientMessage::Lock { username }) => hub.lock(username).await,
        Some(ClientMessage::Unlock { username }) => hub.unlock(username).await,
        None => {
            debug!("Ignoring unrecognized realtime frame");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::{Hub, HubConfig, ServerMessage};
    use std::collections::BTreeMap;
    use std::time::Duration;
    use tokio::io::DuplexStream;
    use tokio_tungstenite::tungstenite::protocol::Role;

    async fn socket_pair() -> (WebSocketStream<DuplexStream>, WebSocketStream<DuplexStream>) {
        let (client_io, server_io) = tokio::io::duplex(16 * 1024);
        let server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
        let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
        (client, server)
    }

    async fn next_message(client: &mut WebSocketStream<DuplexStream>) -> ServerMessage {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(1), client.next())
                .await
                .expect("timed out")
                .expect("stream ended")
                .expect("read error");
            if let WsMessage::Text(text) = frame {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_lock_round_trip_over_socket() {
        let hub = Hub::spawn(HubConfig::default());
        let (mut client, server) = socket_pair().await;
        tokio::spawn(serve_connection(server, hub.clone()));

        assert_eq!(
            next_message(&mut client).await,
            ServerMessage::Locks {
                locks: BTreeMap::new()
            }
        );

        client
            .send(WsMessage::Text(r#"{"type":"lock","username":"user1"}"#.into()))
            .await
            .unwrap();

        assert_eq!(
            next_message(&mut client).await,
            ServerMessage::Locks {
                locks: BTreeMap::from([("user1".to_string(), true)])
            }
        );
    }

    #[tokio::test]
    async fn test_noise_is_ignored() {
        let hub = Hub::spawn(HubConfig::default());
        let (mut client, server) = socket_pair().await;
        tokio::spawn(serve_connection(server, hub.clone()));
        next_message(&mut client).await;

        for noise in ["garbage", r#"{"type":"wave","username":"user1"}"#, r#"{"type":"lock"}"#] {
            client.send(WsMessage::Text(noise.into())).await.unwrap();
        }
        client
            .send(WsMessage::Binary(br#"{"type":"lock","username":"user2"}"#.to_vec()))
            .await
            .unwrap();

        // Connection survived the noise and the binary frame was honoured
        assert_eq!(
            next_message(&mut client).await,
            ServerMessage::Locks {
                locks: BTreeMap::from([("user2".to_string(), true)])
            }
        );
    }

    #[tokio::test]
    async fn test_disconnect_unregisters_but_keeps_locks() {
        let hub = Hub::spawn(HubConfig::default());
        let (mut client, server) = socket_pair().await;
        let session = tokio::spawn(serve_connection(server, hub.clone()));
        next_message(&mut client).await;

        client
            .send(WsMessage::Text(r#"{"type":"lock","username":"user1"}"#.into()))
            .await
            .unwrap();
        next_message(&mut client).await;

        drop(client);
        tokio::time::timeout(Duration::from_secs(1), session)
            .await
            .expect("session did not end")
            .unwrap()
            .unwrap();

        assert_eq!(hub.connection_count().await.unwrap(), 0);
        assert_eq!(hub.locks().await.unwrap().get("user1"), Some(&true));
    }
}
