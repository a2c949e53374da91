//! Click-to-dial workflow against the PBX webclient API.
//!
//! The workflow is four strictly sequential stages: log in, find the phone
//! the extension is registered on, log in again, send the dial command. The
//! second login is not an accident; the PBX tears down the query session
//! when its push channel closes, so the call leg needs a session of its own.

mod call;
mod locator;
mod number;
mod protocol;
mod session;

pub use call::{place_call, CallError, DialRequest};
pub use locator::{locate_phone_line, ProtocolError};
pub use session::{authenticate, AuthError, SessionContext};

use thiserror::Error;
use tracing::info;

use crate::config::PbxConfig;

/// Failure of one stage of the dial workflow.
#[derive(Error, Debug)]
pub enum DialError {
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("phone lookup failed: {0}")]
    Locate(#[from] ProtocolError),

    #[error("call placement failed: {0}")]
    Call(#[from] CallError),
}

/// Rings `extension`'s registered phone and bridges it to `number`.
pub async fn click_to_dial(
    config: &PbxConfig,
    extension: &str,
    password: &str,
    number: &str,
) -> Result<(), DialError> {
    let session = authenticate(config, extension, password).await?;
    let phone_line = locate_phone_line(config, &session).await?;
    info!("extension {extension} is registered at {phone_line}");

    let session = authenticate(config, extension, password).await?;
    let request = DialRequest::new(number, phone_line)?;
    place_call(config, &session, &request).await?;
    Ok(())
}
