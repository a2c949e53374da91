//! Registered phone lookup over the push channel.
//!
//! The PBX only reveals which phone an extension is bound to on its websocket
//! push bus, and only after a fixed set of state queries has been POSTed to
//! the binary RPC endpoint. The bus has no request ids; the answer is found
//! by matching the frame's content prefix while unrelated notifications
//! stream past.

use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use thiserror::Error;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async_tls_with_config, Connector};
use tracing::debug;

use crate::config::PbxConfig;

use super::protocol;
use super::session::SessionContext;

/// Readiness handshake the PBX sends as soon as the socket is up.
const READY_TOKEN: &str = "START";

/// Push channel or query failure.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] WsError),

    #[error("TLS setup failed: {0}")]
    Tls(#[from] native_tls::Error),

    #[error("expected the START greeting, got {0}")]
    UnexpectedGreeting(String),

    #[error("query frame {index} rejected with status {status}")]
    QueryRejected { index: usize, status: StatusCode },

    #[error("push channel closed before the phone announcement arrived")]
    ChannelClosed,

    #[error("no push message within {0:?}")]
    ReadTimeout(Duration),

    #[error("phone announcement carries no usable line identifier")]
    LineMissing,
}

/// Finds the line the extension's phone is currently registered on.
pub async fn locate_phone_line(
    config: &PbxConfig,
    session: &SessionContext,
) -> Result<String, ProtocolError> {
    let url = config.ws_url(&session.session_key, &session.ws_pass);
    let request = url.clone().into_client_request()?;

    // The PBX serves this endpoint with a self-signed certificate; only this
    // connection skips verification.
    let tls = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .build()?;
    let (mut ws, _) =
        connect_async_tls_with_config(request, None, false, Some(Connector::NativeTls(tls)))
            .await?;
    debug!("push channel open at {url}");

    let result = run_query(config, session, &mut ws).await;
    if let Err(e) = ws.close(None).await {
        debug!("push channel close failed: {e}");
    }
    result
}

async fn run_query<S>(
    config: &PbxConfig,
    session: &SessionContext,
    ws: &mut S,
) -> Result<String, ProtocolError>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let greeting = next_message(ws, config.ws_read_timeout).await?;
    check_greeting(&greeting)?;

    for (index, frame) in protocol::QUERY_FRAMES.into_iter().enumerate() {
        post_query_frame(config, session, index, frame).await?;
    }

    let announcement = await_phone_announcement(ws, config.ws_read_timeout).await?;
    protocol::extract_phone_line(&announcement).ok_or(ProtocolError::LineMissing)
}

fn check_greeting(message: &Message) -> Result<(), ProtocolError> {
    match message {
        Message::Text(text) if text.as_str() == READY_TOKEN => Ok(()),
        other => Err(ProtocolError::UnexpectedGreeting(format!("{other:?}"))),
    }
}

async fn post_query_frame(
    config: &PbxConfig,
    session: &SessionContext,
    index: usize,
    frame: &'static [u8],
) -> Result<(), ProtocolError> {
    let response = session
        .client
        .post(config.api_url(protocol::BINARY_RPC_PATH))
        .header(CONTENT_TYPE, protocol::BINARY_CONTENT_TYPE)
        .header(protocol::SESSION_HEADER, &session.session_key)
        .body(frame)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(ProtocolError::QueryRejected { index, status });
    }
    debug!("query frame {index} accepted");
    Ok(())
}

/// Scans the push bus until the phone announcement frame shows up.
async fn await_phone_announcement<S>(
    ws: &mut S,
    read_timeout: Duration,
) -> Result<Bytes, ProtocolError>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    loop {
        match next_message(ws, read_timeout).await? {
            Message::Binary(frame) if protocol::is_phone_announcement(&frame) => {
                debug!("phone announcement received ({} bytes)", frame.len());
                return Ok(frame);
            }
            Message::Close(_) => return Err(ProtocolError::ChannelClosed),
            // The bus interleaves unrelated text notifications; skip them.
            _ => {}
        }
    }
}

async fn next_message<S>(ws: &mut S, read_timeout: Duration) -> Result<Message, ProtocolError>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    match timeout(read_timeout, ws.next()).await {
        Ok(Some(Ok(message))) => Ok(message),
        Ok(Some(Err(e))) => Err(e.into()),
        Ok(None) => Err(ProtocolError::ChannelClosed),
        Err(_) => Err(ProtocolError::ReadTimeout(read_timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[tokio::test]
    async fn scanner_skips_interleaved_noise() {
        let messages: Vec<Result<Message, WsError>> = vec![
            Ok(Message::text("hello")),
            Ok(Message::binary(vec![0x00, 0x01])),
            Ok(Message::binary(b"\x08\xc9\x01\xca\x0c\x1a(sip:X\"".to_vec())),
            Ok(Message::text("trailer")),
        ];
        let mut bus = stream::iter(messages);

        let frame = await_phone_announcement(&mut bus, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(protocol::extract_phone_line(&frame).as_deref(), Some("(sip:X"));
    }

    #[tokio::test]
    async fn exhausted_bus_is_an_error() {
        let messages: Vec<Result<Message, WsError>> = vec![Ok(Message::text("only noise"))];
        let mut bus = stream::iter(messages);

        let err = await_phone_announcement(&mut bus, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::ChannelClosed));
    }

    #[tokio::test]
    async fn silent_bus_times_out() {
        let mut bus = stream::pending::<Result<Message, WsError>>();

        let err = next_message(&mut bus, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::ReadTimeout(_)));
    }

    #[test]
    fn greeting_must_be_the_ready_token() {
        assert!(check_greeting(&Message::text("START")).is_ok());
        assert!(check_greeting(&Message::text("NOPE")).is_err());
        assert!(check_greeting(&Message::binary(b"START".to_vec())).is_err());
    }
}
