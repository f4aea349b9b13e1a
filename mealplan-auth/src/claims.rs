//! ID token claims and the projection into a [`UserProfile`].
//!
//! The ID token is received directly from the token endpoint over TLS, so its
//! payload is decoded but its signature is not verified here.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use mealplan_core::errors::ClaimsError;
use mealplan_core::UserProfile;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Standard OIDC claims plus whatever else the authority sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdTokenClaims {
    /// Subject identifier.
    #[serde(default)]
    pub sub: String,
    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Expiry (seconds since the epoch).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Issued-at (seconds since the epoch).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Nonce echoed from the authorization request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// Login name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    /// Email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Full name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Remaining claims.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl IdTokenClaims {
    /// Email, falling back to the first entry of an `emails` array claim.
    pub fn primary_email(&self) -> Option<&str> {
        non_empty(self.email.as_deref()).or_else(|| {
            self.extra
                .get("emails")
                .and_then(Value::as_array)
                .and_then(|emails| emails.first())
                .and_then(Value::as_str)
                .filter(|e| !e.is_empty())
        })
    }
}

/// Decode the payload of a compact JWT.
pub fn decode_id_token(id_token: &str) -> Result<IdTokenClaims, ClaimsError> {
    let mut parts = id_token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(ClaimsError::Malformed("expected three dot-separated segments".into()));
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| ClaimsError::Malformed(format!("payload is not base64url: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| ClaimsError::Malformed(format!("payload is not a claims object: {e}")))
}

/// Overlay userinfo claims onto ID token claims.
///
/// The userinfo `sub` must match the ID token's.
pub fn merge_userinfo(claims: IdTokenClaims, userinfo: Value) -> Result<IdTokenClaims, ClaimsError> {
    let Value::Object(userinfo) = userinfo else {
        return Err(ClaimsError::Malformed("userinfo is not an object".into()));
    };
    if let Some(sub) = userinfo.get("sub") {
        if sub.as_str() != Some(claims.sub.as_str()) {
            return Err(ClaimsError::SubjectMismatch);
        }
    }

    let Value::Object(mut merged) =
        serde_json::to_value(&claims).map_err(|e| ClaimsError::Malformed(e.to_string()))?
    else {
        return Err(ClaimsError::Malformed("claims did not serialize to an object".into()));
    };
    merged.extend(userinfo.into_iter().filter(|(_, v)| !v.is_null()));

    serde_json::from_value(Value::Object(merged)).map_err(|e| ClaimsError::Malformed(e.to_string()))
}

/// Project claims into the application user.
///
/// Fails closed: a missing subject, or neither `preferred_username` nor an
/// email, is an error rather than a user with empty fields.
pub fn map_claims_to_profile(claims: &IdTokenClaims) -> Result<UserProfile, ClaimsError> {
    let id = non_empty(Some(claims.sub.as_str())).ok_or(ClaimsError::Missing("sub"))?;
    let email = claims.primary_email();
    let username = non_empty(claims.preferred_username.as_deref())
        .or(email)
        .ok_or(ClaimsError::Missing("preferred_username"))?;

    Ok(UserProfile {
        id: id.to_string(),
        username: username.to_string(),
        email: email.unwrap_or_default().to_string(),
        full_name: non_empty(claims.name.as_deref()).map(str::to_string),
    })
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
