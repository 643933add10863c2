use std::error::Error as StdError;

use thiserror::Error;

pub type IdTokenResult<T> = Result<T, IdTokenValidationError>;

/// Raised while building a verifier configuration. These are programmer errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("issuer is required")]
    MissingIssuer,
    #[error("audience is required")]
    MissingAudience,
    #[error("organization must not be empty when configured")]
    EmptyOrganization,
    #[error("environment variable {0} is required")]
    MissingEnv(&'static str),
    #[error("leeway must be a non-negative number of seconds, got '{0}'")]
    InvalidLeeway(String),
}

/// Failure reported by a [`crate::PublicKeyProvider`].
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("token does not declare a key id (kid)")]
    MissingKeyId,
    #[error("no public key registered for kid '{0}'")]
    UnknownKeyId(String),
    #[error("failed to parse public key for kid '{0}': {1}")]
    KeyParse(String, String),
    #[error("failed to parse JWKS document: {0}")]
    JwksDecode(String),
    #[error("JWKS entry missing key id (kid)")]
    JwksMissingKid,
    #[error("JWKS key '{0}' missing required RSA components")]
    JwksMissingComponents(String),
    #[error("JWKS key '{kid}' uses unsupported key type '{kty}'")]
    JwksUnsupportedKey { kid: String, kty: String },
    #[error("JWKS key '{kid}' uses unsupported alg '{alg}'")]
    JwksUnsupportedAlg { kid: String, alg: String },
    #[error("key provider failed: {0}")]
    Backend(#[source] Box<dyn StdError + Send + Sync>),
}

/// Failure of the decode + signature stage.
#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("ID token could not be decoded: {reason}")]
    MalformedToken { reason: String },
    #[error(
        "Signature algorithm of \"{found}\" is not supported. Expected the ID token to be signed with \"{expected}\""
    )]
    AlgorithmMismatch {
        expected: &'static str,
        found: String,
    },
    #[error("Could not find a public key for Key ID (kid) \"{}\"", .key_id.as_deref().unwrap_or("null"))]
    KeyResolutionFailed {
        key_id: Option<String>,
        #[source]
        source: ProviderError,
    },
    #[error("Invalid ID token signature")]
    InvalidSignature {
        #[source]
        source: Option<jsonwebtoken::errors::Error>,
    },
}

impl VerificationError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedToken {
            reason: reason.into(),
        }
    }
}

/// One variant per step of the ID token pipeline. Messages are part of the
/// public contract.
#[derive(Debug, Error)]
pub enum IdTokenValidationError {
    #[error("ID token is required but missing")]
    MissingToken,
    #[error("ID token could not be decoded")]
    DecodeFailed(#[source] VerificationError),
    #[error("Invalid ID token signature")]
    InvalidSignature(#[source] VerificationError),
    #[error("Issuer (iss) claim must be a string present in the ID token")]
    IssuerMissing,
    #[error("Issuer (iss) claim mismatch in the ID token, expected \"{expected}\", found \"{found}\"")]
    IssuerMismatch { expected: String, found: String },
    #[error("Subject (sub) claim must be a string present in the ID token")]
    SubjectMissing,
    #[error("Audience (aud) claim must be a string or array of strings present in the ID token")]
    AudienceMissing,
    #[error(
        "Audience (aud) claim mismatch in the ID token; expected \"{expected}\" but found \"{found}\""
    )]
    AudienceMismatch { expected: String, found: String },
    #[error(
        "Authorized Party (azp) claim must be a string present in the ID token when Audience (aud) claim has multiple values"
    )]
    AzpMissing,
    #[error(
        "Authorized Party (azp) claim mismatch in the ID token; expected \"{expected}\", found \"{found}\""
    )]
    AzpMismatch { expected: String, found: String },
    #[error("Expiration Time (exp) claim must be a number present in the ID token")]
    ExpMissing,
    #[error(
        "Expiration Time (exp) claim error in the ID token; current time ({now}) is after expiration time ({expires_at_with_leeway})"
    )]
    TokenExpired { now: i64, expires_at_with_leeway: i64 },
    #[error("Issued At (iat) claim must be a number present in the ID token")]
    IatMissing,
    #[error("Nonce (nonce) claim must be a string present in the ID token")]
    NonceMissing,
    #[error("Nonce (nonce) claim mismatch in the ID token; expected \"{expected}\", found \"{found}\"")]
    NonceMismatch { expected: String, found: String },
    #[error(
        "Authentication Time (auth_time) claim must be a number present in the ID token when Max Age (max_age) is specified"
    )]
    AuthTimeMissing,
    #[error(
        "Authentication Time (auth_time) claim in the ID token indicates that too much time has passed since the last end-user authentication. Current time ({now}) is after last auth at ({threshold})"
    )]
    AuthTimeExceeded { now: i64, threshold: i64 },
    #[error("Organization Id (org_id) claim must be a string present in the ID token")]
    OrganizationIdMissing,
    #[error(
        "Organization (org_id) claim mismatch in the ID token; expected \"{expected}\", found \"{found}\""
    )]
    OrganizationMismatch { expected: String, found: String },
}

impl IdTokenValidationError {
    /// Stable identifier for the failed step, suitable for logs and metrics labels.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingToken => "missing_token",
            Self::DecodeFailed(_) => "decode_failed",
            Self::InvalidSignature(_) => "invalid_signature",
            Self::IssuerMissing => "iss_missing",
            Self::IssuerMismatch { .. } => "iss_mismatch",
            Self::SubjectMissing => "sub_missing",
            Self::AudienceMissing => "aud_missing",
            Self::AudienceMismatch { .. } => "aud_mismatch",
            Self::AzpMissing => "azp_missing",
            Self::AzpMismatch { .. } => "azp_mismatch",
            Self::ExpMissing => "exp_missing",
            Self::TokenExpired { .. } => "token_expired",
            Self::IatMissing => "iat_missing",
            Self::NonceMissing => "nonce_missing",
            Self::NonceMismatch { .. } => "nonce_mismatch",
            Self::AuthTimeMissing => "auth_time_missing",
            Self::AuthTimeExceeded { .. } => "auth_time_exceeded",
            Self::OrganizationIdMissing => "org_id_missing",
            Self::OrganizationMismatch { .. } => "org_id_mismatch",
        }
    }

    /// The decode/signature failure behind `DecodeFailed` or `InvalidSignature`.
    pub fn signature_error(&self) -> Option<&VerificationError> {
        match self {
            Self::DecodeFailed(inner) | Self::InvalidSignature(inner) => Some(inner),
            _ => None,
        }
    }
}

impl From<VerificationError> for IdTokenValidationError {
    fn from(value: VerificationError) -> Self {
        match value {
            VerificationError::MalformedToken { .. } => Self::DecodeFailed(value),
            VerificationError::AlgorithmMismatch { .. }
            | VerificationError::KeyResolutionFailed { .. }
            | VerificationError::InvalidSignature { .. } => Self::InvalidSignature(value),
        }
    }
}
