//! Request signing.
//!
//! Two HMAC-SHA256 uses live here:
//!
//! - verifying Slack's `X-Slack-Signature` on inbound requests
//!   (`v0=hex(hmac(signing_secret, "v0:{timestamp}:{body}"))`)
//! - sealing the OAuth `state` parameter that carries `{team_id, user_id}`
//!   through the Spotify authorization redirect

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::{AppError, AppResult};

type HmacSha256 = Hmac<Sha256>;

/// Requests older than this are treated as replays.
pub const MAX_REQUEST_AGE_SECS: i64 = 60 * 5;

const SLACK_SIGNATURE_VERSION: &str = "v0";

fn mac(secret: &str) -> AppResult<HmacSha256> {
    HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Internal(format!("Invalid HMAC key: {e}")))
}

/// Compute the Slack signature for a request body.
pub fn slack_signature(signing_secret: &str, timestamp: &str, body: &[u8]) -> AppResult<String> {
    let mut mac = mac(signing_secret)?;
    mac.update(format!("{SLACK_SIGNATURE_VERSION}:{timestamp}:").as_bytes());
    mac.update(body);
    Ok(format!(
        "{SLACK_SIGNATURE_VERSION}={}",
        hex::encode(mac.finalize().into_bytes())
    ))
}

/// Verify a Slack request signature.
///
/// `now` is the current unix time in seconds.
pub fn verify_slack_signature(
    signing_secret: &str,
    timestamp: &str,
    body: &[u8],
    signature: &str,
    now: i64,
) -> AppResult<()> {
    let sent_at: i64 = timestamp
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid request timestamp".to_string()))?;

    if (now - sent_at).abs() > MAX_REQUEST_AGE_SECS {
        return Err(AppError::Unauthorized);
    }

    let hex_sig = signature
        .strip_prefix("v0=")
        .ok_or(AppError::Unauthorized)?;
    let expected = hex::decode(hex_sig).map_err(|_| AppError::Unauthorized)?;

    let mut mac = mac(signing_secret)?;
    mac.update(format!("{SLACK_SIGNATURE_VERSION}:{timestamp}:").as_bytes());
    mac.update(body);
    mac.verify_slice(&expected).map_err(|_| AppError::Unauthorized)
}

/// Identity carried through an OAuth redirect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthState {
    /// Workspace the installation belongs to.
    pub team_id: String,
    /// User who started the flow.
    pub user_id: String,
}

impl OAuthState {
    /// Create a new state.
    #[must_use]
    pub fn new(team_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            team_id: team_id.into(),
            user_id: user_id.into(),
        }
    }

    /// Encode as `base64url(json).hex(hmac)`.
    pub fn seal(&self, secret: &str) -> AppResult<String> {
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(self)?);
        let mut mac = mac(secret)?;
        mac.update(payload.as_bytes());
        Ok(format!(
            "{payload}.{}",
            hex::encode(mac.finalize().into_bytes())
        ))
    }

    /// Decode and authenticate a sealed state.
    pub fn open(sealed: &str, secret: &str) -> AppResult<Self> {
        let (payload, tag) = sealed
            .split_once('.')
            .ok_or_else(|| AppError::BadRequest("Malformed OAuth state".to_string()))?;
        let tag = hex::decode(tag)
            .map_err(|_| AppError::BadRequest("Malformed OAuth state".to_string()))?;

        let mut mac = mac(secret)?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&tag).map_err(|_| AppError::Unauthorized)?;

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| AppError::BadRequest("Malformed OAuth state".to_string()))?;
        Ok(serde_json::from_slice(&json)?)
    }
}
