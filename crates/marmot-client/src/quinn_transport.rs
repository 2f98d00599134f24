//! Production [`MoqTransport`] over a single `quinn` QUIC connection to a
//! MoQ relay: one unidirectional `SendStream` per published track, one
//! `RecvStream` per subscription, authorization carried as a capability
//! token in the connect URL's query string.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use quinn::{Connection, Endpoint, RecvStream, SendStream};
use tokio::sync::{Mutex, mpsc};

use crate::transport::{MoqTransport, TransportError};

/// MoQ's negotiated ALPN identifier.
pub const MOQ_ALPN: &[u8] = b"moq-00";

/// Query parameter carrying the bearer capability token the relay checks
/// before accepting a publish or subscribe.
pub const CAPABILITY_TOKEN_PARAM: &str = "token";

/// A `quinn`-backed connection to one MoQ relay, multiplexing every
/// published and subscribed track for a group session over QUIC streams.
pub struct QuinnTransport {
    connection: Connection,
    publish_streams: Mutex<HashMap<String, SendStream>>,
}

impl QuinnTransport {
    /// Dial `relay_url` (e.g. `https://relay.example:4443/moq`) with
    /// `capability_token` appended as a query parameter, negotiating the
    /// MoQ ALPN.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionClosed`] if the QUIC handshake
    /// fails.
    pub async fn connect(
        endpoint: &Endpoint,
        relay_url: &str,
        capability_token: &str,
    ) -> Result<Self, TransportError> {
        let url = authorize_url(relay_url, capability_token);
        let server_name = host_of(&url).ok_or_else(|| TransportError::Rejected("invalid relay url".to_string()))?;
        let addr = resolve_one(&url).await.ok_or(TransportError::ConnectionClosed)?;

        let connecting = endpoint
            .connect(addr, &server_name)
            .map_err(|_| TransportError::ConnectionClosed)?;
        let connection = connecting.await.map_err(|_| TransportError::ConnectionClosed)?;

        Ok(Self { connection, publish_streams: Mutex::new(HashMap::new()) })
    }

    async fn open_publish_stream(&self, track: &str) -> Result<(), TransportError> {
        let mut streams = self.publish_streams.lock().await;
        if streams.contains_key(track) {
            return Ok(());
        }
        let mut send = self.connection.open_uni().await.map_err(|_| TransportError::ConnectionClosed)?;
        send_track_header(&mut send, track).await?;
        streams.insert(track.to_string(), send);
        Ok(())
    }
}

#[async_trait]
impl MoqTransport for QuinnTransport {
    async fn publish(&self, track: &str, frame: Bytes) -> Result<(), TransportError> {
        self.open_publish_stream(track).await?;

        let mut streams = self.publish_streams.lock().await;
        let Some(stream) = streams.get_mut(track) else {
            return Err(TransportError::ConnectionClosed);
        };

        let mut framed = BytesMut::with_capacity(4 + frame.len());
        framed.extend_from_slice(&u32::try_from(frame.len()).unwrap_or(u32::MAX).to_be_bytes());
        framed.extend_from_slice(&frame);

        stream.write_all(&framed).await.map_err(|_| TransportError::StreamReset(track.to_string()))
    }

    async fn subscribe(&self, track: &str) -> Result<mpsc::Receiver<Bytes>, TransportError> {
        let mut recv = self
            .connection
            .accept_uni()
            .await
            .map_err(|_| TransportError::TrackNotFound(track.to_string()))?;

        let (tx, rx) = mpsc::channel(64);
        let track_name = track.to_string();
        tokio::spawn(async move {
            while let Some(frame) = read_frame(&mut recv).await {
                if tx.send(frame).await.is_err() {
                    break;
                }
            }
            tracing::debug!(track = %track_name, "subscription stream ended");
        });
        Ok(rx)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.connection.close(0u32.into(), b"done");
        Ok(())
    }
}

async fn send_track_header(stream: &mut SendStream, track: &str) -> Result<(), TransportError> {
    let name = track.as_bytes();
    let mut header = BytesMut::with_capacity(2 + name.len());
    header.extend_from_slice(&u16::try_from(name.len()).unwrap_or(u16::MAX).to_be_bytes());
    header.extend_from_slice(name);
    stream.write_all(&header).await.map_err(|_| TransportError::StreamReset(track.to_string()))
}

async fn read_frame(stream: &mut RecvStream) -> Option<Bytes> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await.ok()?;
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await.ok()?;
    Some(Bytes::from(body))
}

fn authorize_url(relay_url: &str, capability_token: &str) -> String {
    let separator = if relay_url.contains('?') { '&' } else { '?' };
    format!("{relay_url}{separator}{CAPABILITY_TOKEN_PARAM}={capability_token}")
}

fn host_of(url: &str) -> Option<String> {
    let without_scheme = url.split("://").nth(1)?;
    let host_port = without_scheme.split('/').next()?;
    let host = host_port.split(':').next()?;
    Some(host.to_string())
}

async fn resolve_one(url: &str) -> Option<std::net::SocketAddr> {
    let without_scheme = url.split("://").nth(1)?;
    let host_port = without_scheme.split('/').next()?;
    tokio::net::lookup_host(host_port).await.ok()?.next()
}

/// Shared `quinn` client endpoint and connection pool are left to the
/// caller; this type only wraps one already-established connection so
/// `marmot-app` controls endpoint lifetime and retry policy.
pub type SharedQuinnTransport = Arc<QuinnTransport>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorize_url_appends_query_param() {
        assert_eq!(authorize_url("https://relay.example/moq", "abc"), "https://relay.example/moq?token=abc");
        assert_eq!(authorize_url("https://relay.example/moq?x=1", "abc"), "https://relay.example/moq?x=1&token=abc");
    }

    #[test]
    fn host_of_strips_scheme_and_path() {
        assert_eq!(host_of("https://relay.example:4443/moq?token=abc"), Some("relay.example".to_string()));
    }
}
