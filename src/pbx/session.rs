//! PBX login handshake.
//!
//! Establishes the webclient session that the push channel and the binary RPC
//! endpoint authenticate against. Two API dialects exist in the field: the
//! modern one trades an access-token cookie for a bearer token before asking
//! for a phone session, the legacy one goes straight from login cookie to
//! phone session and never sees a bearer token.

use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{Dialect, PbxConfig};

const ACCESS_TOKEN_PATH: &str = "/webclient/api/Login/GetAccessToken";
const LEGACY_LOGIN_PATH: &str = "/webclient/api/Login";
const CONNECT_TOKEN_PATH: &str = "/connect/token";
const PHONE_SESSION_PATH: &str = "/webclient/api/MyPhone/session";

/// How the client announces itself to the phone session endpoint.
const CLIENT_NAME: &str = "Webclient";
const CLIENT_VERSION: &str = "nope";

const STAGE_ACCESS_TOKEN: &str = "access token request";
const STAGE_LOGIN: &str = "login request";
const STAGE_CONNECT_TOKEN: &str = "token exchange";
const STAGE_PHONE_SESSION: &str = "phone session request";

/// Login or session establishment failure.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{stage} failed with status {status}")]
    Rejected {
        stage: &'static str,
        status: StatusCode,
    },
}

/// An authenticated webclient session.
///
/// The cookie jar lives inside the session's own `Client`, so the cookies of
/// one login round-trip can never be combined with the keys of another.
#[derive(Debug)]
pub struct SessionContext {
    pub client: Client,
    pub session_key: String,
    pub bearer_token: Option<String>,
    pub ws_pass: String,
}

/// Runs the login handshake for `extension` and returns the session the
/// other stages authenticate with.
pub async fn authenticate(
    config: &PbxConfig,
    extension: &str,
    password: &str,
) -> Result<SessionContext, AuthError> {
    let base = format!("https://{}", config.host);
    let session = login(&base, config.dialect, extension, password).await?;
    info!("extension {extension} authenticated against {}", config.host);
    Ok(session)
}

async fn login(
    base: &str,
    dialect: Dialect,
    extension: &str,
    password: &str,
) -> Result<SessionContext, AuthError> {
    match dialect {
        Dialect::Modern => modern_login(base, extension, password).await,
        Dialect::Legacy => legacy_login(base, extension, password).await,
        Dialect::Auto => match modern_login(base, extension, password).await {
            Err(AuthError::Rejected { stage, status })
                if stage == STAGE_ACCESS_TOKEN && status == StatusCode::NOT_FOUND =>
            {
                debug!("no access-token endpoint on this PBX, retrying with the legacy login");
                legacy_login(base, extension, password).await
            }
            other => other,
        },
    }
}

/// Modern dialect: credentials buy a cookie, the cookie buys a bearer token,
/// and both together buy the phone session.
async fn modern_login(
    base: &str,
    extension: &str,
    password: &str,
) -> Result<SessionContext, AuthError> {
    let client = session_client()?;

    let response = client
        .post(format!("{base}{ACCESS_TOKEN_PATH}"))
        .json(&LoginRequest {
            username: extension,
            password,
        })
        .send()
        .await?;
    check_status(STAGE_ACCESS_TOKEN, &response)?;

    let response = client
        .post(format!("{base}{CONNECT_TOKEN_PATH}"))
        .form(&TokenExchangeRequest {
            client_id: CLIENT_NAME,
            grant_type: "refresh_token",
        })
        .send()
        .await?;
    check_status(STAGE_CONNECT_TOKEN, &response)?;
    let token: TokenResponse = response.json().await?;

    let session = phone_session(&client, base, Some(&token.access_token)).await?;
    Ok(SessionContext {
        client,
        session_key: session.session_key,
        bearer_token: Some(token.access_token),
        ws_pass: session.pass,
    })
}

/// Legacy dialect: the login cookie alone buys the phone session.
async fn legacy_login(
    base: &str,
    extension: &str,
    password: &str,
) -> Result<SessionContext, AuthError> {
    let client = session_client()?;

    let response = client
        .post(format!("{base}{LEGACY_LOGIN_PATH}"))
        .json(&LoginRequest {
            username: extension,
            password,
        })
        .send()
        .await?;
    check_status(STAGE_LOGIN, &response)?;

    let session = phone_session(&client, base, None).await?;
    Ok(SessionContext {
        client,
        session_key: session.session_key,
        bearer_token: None,
        ws_pass: session.pass,
    })
}

async fn phone_session(
    client: &Client,
    base: &str,
    bearer: Option<&str>,
) -> Result<PhoneSessionResponse, AuthError> {
    let mut request = client
        .post(format!("{base}{PHONE_SESSION_PATH}"))
        .json(&ClientAnnouncement {
            name: CLIENT_NAME,
            version: CLIENT_VERSION,
            is_human: true,
        });
    if let Some(token) = bearer {
        request = request.bearer_auth(token);
    }

    let response = request.send().await?;
    check_status(STAGE_PHONE_SESSION, &response)?;
    Ok(response.json().await?)
}

/// One client per login round-trip; the cookie jar is the session.
fn session_client() -> Result<Client, AuthError> {
    Ok(Client::builder().cookie_store(true).build()?)
}

fn check_status(stage: &'static str, response: &Response) -> Result<(), AuthError> {
    let status = response.status();
    if !status.is_success() {
        return Err(AuthError::Rejected { stage, status });
    }
    Ok(())
}

// Request/Response types

#[derive(Serialize)]
struct LoginRequest<'a> {
    #[serde(rename = "Username")]
    username: &'a str,
    #[serde(rename = "Password")]
    password: &'a str,
}

#[derive(Serialize)]
struct TokenExchangeRequest<'a> {
    client_id: &'a str,
    grant_type: &'a str,
}

#[derive(Serialize)]
struct ClientAnnouncement<'a> {
    name: &'a str,
    version: &'a str,
    #[serde(rename = "isHuman")]
    is_human: bool,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct PhoneSessionResponse {
    #[serde(rename = "sessionKey")]
    session_key: String,
    pass: String,
}
