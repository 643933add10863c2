use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::VerificationError;

const STANDARD_CLAIMS: &[&str] = &[
    "iss", "sub", "aud", "azp", "exp", "iat", "auth_time", "nonce", "org_id",
];

/// The `aud` claim, which OpenID Connect allows to be a string or an array.
/// Never empty: an empty array is read as a missing claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Multiple(Vec<String>),
}

impl Audience {
    pub fn values(&self) -> &[String] {
        match self {
            Audience::Single(value) => std::slice::from_ref(value),
            Audience::Multiple(values) => values,
        }
    }

    pub fn contains(&self, audience: &str) -> bool {
        self.values().iter().any(|value| value == audience)
    }

    /// True for an array `aud`, which always holds at least one value.
    pub fn is_multi_valued(&self) -> bool {
        self.values().len() > 1
    }

    fn from_claim(value: &Value) -> Option<Self> {
        match value {
            Value::String(single) => Some(Audience::Single(single.clone())),
            Value::Array(items) if !items.is_empty() => items
                .iter()
                .map(|item| item.as_str().map(str::to_owned))
                .collect::<Option<Vec<_>>>()
                .map(Audience::Multiple),
            _ => None,
        }
    }
}

/// Renders the literal value, or `[a, b]` for multi-valued audiences.
impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Audience::Single(value) => f.write_str(value),
            Audience::Multiple(values) => write!(f, "[{}]", values.join(", ")),
        }
    }
}

/// JOSE header fields the pipeline reads.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenHeader {
    #[serde(rename = "alg")]
    pub algorithm: String,
    #[serde(rename = "kid", default)]
    pub key_id: Option<String>,
    #[serde(rename = "typ", default)]
    pub token_type: Option<String>,
}

/// Typed view over the payload. A claim of the wrong JSON type reads as absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdTokenClaims {
    pub issuer: Option<String>,
    pub subject: Option<String>,
    pub audience: Option<Audience>,
    pub authorized_party: Option<String>,
    pub expires_at: Option<i64>,
    pub issued_at: Option<i64>,
    pub auth_time: Option<i64>,
    pub nonce: Option<String>,
    pub organization_id: Option<String>,
    /// Every non-standard claim, untouched.
    pub additional: Map<String, Value>,
}

impl From<Map<String, Value>> for IdTokenClaims {
    fn from(mut value: Map<String, Value>) -> Self {
        let claims = Self {
            issuer: string_claim(&value, "iss"),
            subject: string_claim(&value, "sub"),
            audience: value.get("aud").and_then(Audience::from_claim),
            authorized_party: string_claim(&value, "azp"),
            expires_at: numeric_claim(&value, "exp"),
            issued_at: numeric_claim(&value, "iat"),
            auth_time: numeric_claim(&value, "auth_time"),
            nonce: string_claim(&value, "nonce"),
            organization_id: string_claim(&value, "org_id"),
            additional: Map::new(),
        };
        value.retain(|name, _| !STANDARD_CLAIMS.contains(&name.as_str()));
        Self {
            additional: value,
            ..claims
        }
    }
}

fn string_claim(claims: &Map<String, Value>, name: &str) -> Option<String> {
    claims.get(name).and_then(Value::as_str).map(str::to_owned)
}

fn numeric_claim(claims: &Map<String, Value>, name: &str) -> Option<i64> {
    let value = claims.get(name)?;
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|seconds| seconds.is_finite())
            .map(|seconds| seconds.floor() as i64)
    })
}

/// A compact token split into header, claims and signature. Nothing here is
/// trusted until [`crate::SignatureVerifier`] has checked the signature.
#[derive(Debug, Clone)]
pub struct DecodedToken {
    header: TokenHeader,
    claims: IdTokenClaims,
    signing_input: String,
    signature: String,
}

impl DecodedToken {
    pub(crate) fn decode(token: &str) -> Result<Self, VerificationError> {
        if token.is_empty() {
            return Err(VerificationError::malformed("token is empty"));
        }

        let mut segments = token.split('.');
        let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(VerificationError::malformed(
                "expected three dot-separated segments",
            ));
        };

        let header_bytes = decode_segment("header", header_b64)?;
        let header: TokenHeader = serde_json::from_slice(&header_bytes)
            .map_err(|err| VerificationError::malformed(format!("invalid header JSON: {err}")))?;

        let payload_bytes = decode_segment("payload", payload_b64)?;
        let payload: Map<String, Value> = serde_json::from_slice(&payload_bytes)
            .map_err(|err| VerificationError::malformed(format!("invalid payload JSON: {err}")))?;

        Ok(Self {
            header,
            claims: IdTokenClaims::from(payload),
            signing_input: format!("{header_b64}.{payload_b64}"),
            signature: signature_b64.to_owned(),
        })
    }

    pub fn header(&self) -> &TokenHeader {
        &self.header
    }

    pub fn claims(&self) -> &IdTokenClaims {
        &self.claims
    }

    pub(crate) fn signing_input(&self) -> &[u8] {
        self.signing_input.as_bytes()
    }

    pub(crate) fn signature(&self) -> &str {
        &self.signature
    }

    pub(crate) fn into_claims(self) -> IdTokenClaims {
        self.claims
    }
}

fn decode_segment(name: &str, segment: &str) -> Result<Vec<u8>, VerificationError> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|err| VerificationError::malformed(format!("{name} is not base64url: {err}")))
}

/// Claims that passed every check of the ID token pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedClaims {
    pub issuer: String,
    pub subject: String,
    pub audience: Audience,
    pub authorized_party: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub issued_at: DateTime<Utc>,
    pub auth_time: Option<DateTime<Utc>>,
    pub nonce: Option<String>,
    pub organization_id: Option<String>,
    pub additional: Map<String, Value>,
}

/// Seconds since epoch to a UTC instant, clamped to chrono's range.
pub(crate) fn to_datetime(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(seconds, 0).single().unwrap_or(if seconds < 0 {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    })
}
