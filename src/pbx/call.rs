//! Dial command dispatch.

use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::info;

use crate::config::PbxConfig;

use super::number;
use super::protocol::{self, EncodeError};
use super::session::SessionContext;

/// Call command rejected or lost.
#[derive(Error, Debug)]
pub enum CallError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("call command rejected with status {status}")]
    Rejected { status: StatusCode },

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("no digits left in destination number {0:?}")]
    NoDigits(String),
}

/// A single outbound call: what to dial and which line to ring.
#[derive(Debug, Clone)]
pub struct DialRequest {
    pub digits: String,
    pub phone_line: String,
}

impl DialRequest {
    /// Normalizes `raw_number` and binds it to the registered line.
    pub fn new(raw_number: &str, phone_line: String) -> Result<Self, CallError> {
        let digits = number::normalize(raw_number);
        if digits.is_empty() {
            return Err(CallError::NoDigits(raw_number.to_string()));
        }
        Ok(Self { digits, phone_line })
    }
}

/// Makes the PBX ring the registered line and bridge it to the destination.
///
/// Once the PBX accepts this request the caller's phone rings for real;
/// there is nothing left for this process to manage.
pub async fn place_call(
    config: &PbxConfig,
    session: &SessionContext,
    request: &DialRequest,
) -> Result<(), CallError> {
    let frame = protocol::encode_dial_command(&request.digits, &request.phone_line)?;

    let mut post = session
        .client
        .post(config.api_url(protocol::BINARY_RPC_PATH))
        .header(CONTENT_TYPE, protocol::BINARY_CONTENT_TYPE)
        .header(protocol::SESSION_HEADER, &session.session_key)
        .body(frame);
    if let Some(token) = &session.bearer_token {
        post = post.bearer_auth(token);
    }

    let response = post.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(CallError::Rejected { status });
    }

    info!("dial command for {} accepted", request.digits);
    Ok(())
}
