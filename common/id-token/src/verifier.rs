use tracing::debug;

use crate::claims::{to_datetime, Audience, IdTokenClaims, ValidatedClaims};
use crate::config::VerifierConfig;
use crate::error::{IdTokenResult, IdTokenValidationError};

/// Per-call inputs that switch on the optional nonce and max-age checks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyOptions {
    pub nonce: Option<String>,
    pub max_age: Option<u64>,
}

impl VerifyOptions {
    pub fn with_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }

    pub fn with_max_age(mut self, seconds: u64) -> Self {
        self.max_age = Some(seconds);
        self
    }
}

/// Verifies OpenID Connect ID tokens against a fixed [`VerifierConfig`].
///
/// Checks run in a fixed order and the first failure is returned:
/// presence, signature, `iss`, `sub`, `aud`, `azp` (multi-valued `aud` only),
/// `exp`, `iat`, `nonce` (when requested), `auth_time` (when a max age is
/// requested) and `org_id` (when an organization is configured).
///
/// Holds no mutable state; one instance can serve concurrent callers.
#[derive(Debug, Clone)]
pub struct IdTokenVerifier {
    config: VerifierConfig,
}

impl IdTokenVerifier {
    pub fn new(config: VerifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Verify with no nonce and no max age.
    pub fn verify_token(&self, token: &str) -> IdTokenResult<ValidatedClaims> {
        self.verify(token, &VerifyOptions::default())
    }

    pub fn verify(&self, token: &str, options: &VerifyOptions) -> IdTokenResult<ValidatedClaims> {
        match self.run(token, options) {
            Ok(claims) => {
                debug!(subject = %claims.subject, "verified ID token");
                Ok(claims)
            }
            Err(err) => {
                debug!(code = err.code(), error = %err, "ID token rejected");
                Err(err)
            }
        }
    }

    fn run(&self, token: &str, options: &VerifyOptions) -> IdTokenResult<ValidatedClaims> {
        if token.is_empty() {
            return Err(IdTokenValidationError::MissingToken);
        }

        let claims = self
            .config
            .signature_verifier()
            .verify_signature(token)?
            .into_claims();

        let issuer = self.check_issuer(&claims)?;
        let subject = claims
            .subject
            .clone()
            .ok_or(IdTokenValidationError::SubjectMissing)?;
        let audience = self.check_audience(&claims)?;
        self.check_authorized_party(&claims, &audience)?;

        let now = self.config.clock().now().timestamp();
        let leeway = i64::from(self.config.leeway_seconds());

        let expires_at = claims.expires_at.ok_or(IdTokenValidationError::ExpMissing)?;
        let expires_at_with_leeway = expires_at.saturating_add(leeway);
        if now > expires_at_with_leeway {
            return Err(IdTokenValidationError::TokenExpired {
                now,
                expires_at_with_leeway,
            });
        }

        let issued_at = claims.issued_at.ok_or(IdTokenValidationError::IatMissing)?;

        if let Some(expected) = options.nonce.as_deref() {
            check_nonce(&claims, expected)?;
        }

        if let Some(max_age) = options.max_age {
            let auth_time = claims
                .auth_time
                .ok_or(IdTokenValidationError::AuthTimeMissing)?;
            let max_age = i64::try_from(max_age).unwrap_or(i64::MAX);
            let threshold = auth_time.saturating_add(max_age).saturating_add(leeway);
            if now > threshold {
                return Err(IdTokenValidationError::AuthTimeExceeded { now, threshold });
            }
        }

        if let Some(expected) = self.config.organization() {
            check_organization(&claims, expected)?;
        }

        Ok(ValidatedClaims {
            issuer,
            subject,
            audience,
            authorized_party: claims.authorized_party,
            expires_at: to_datetime(expires_at),
            issued_at: to_datetime(issued_at),
            auth_time: claims.auth_time.map(to_datetime),
            nonce: claims.nonce,
            organization_id: claims.organization_id,
            additional: claims.additional,
        })
    }

    fn check_issuer(&self, claims: &IdTokenClaims) -> IdTokenResult<String> {
        let found = claims
            .issuer
            .as_deref()
            .ok_or(IdTokenValidationError::IssuerMissing)?;
        let expected = self.config.issuer();
        if found != expected {
            return Err(IdTokenValidationError::IssuerMismatch {
                expected: expected.to_owned(),
                found: found.to_owned(),
            });
        }
        Ok(found.to_owned())
    }

    fn check_audience(&self, claims: &IdTokenClaims) -> IdTokenResult<Audience> {
        let audience = claims
            .audience
            .as_ref()
            .ok_or(IdTokenValidationError::AudienceMissing)?;
        let expected = self.config.audience();
        if !audience.contains(expected) {
            return Err(IdTokenValidationError::AudienceMismatch {
                expected: expected.to_owned(),
                found: audience.to_string(),
            });
        }
        Ok(audience.clone())
    }

    fn check_authorized_party(&self, claims: &IdTokenClaims, audience: &Audience) -> IdTokenResult<()> {
        if !audience.is_multi_valued() {
            return Ok(());
        }
        let found = claims
            .authorized_party
            .as_deref()
            .ok_or(IdTokenValidationError::AzpMissing)?;
        let expected = self.config.audience();
        if found != expected {
            return Err(IdTokenValidationError::AzpMismatch {
                expected: expected.to_owned(),
                found: found.to_owned(),
            });
        }
        Ok(())
    }
}

fn check_nonce(claims: &IdTokenClaims, expected: &str) -> IdTokenResult<()> {
    let found = claims
        .nonce
        .as_deref()
        .ok_or(IdTokenValidationError::NonceMissing)?;
    if found != expected {
        return Err(IdTokenValidationError::NonceMismatch {
            expected: expected.to_owned(),
            found: found.to_owned(),
        });
    }
    Ok(())
}

fn check_organization(claims: &IdTokenClaims, expected: &str) -> IdTokenResult<()> {
    let found = claims
        .organization_id
        .as_deref()
        .ok_or(IdTokenValidationError::OrganizationIdMissing)?;
    if found != expected {
        return Err(IdTokenValidationError::OrganizationMismatch {
            expected: expected.to_owned(),
            found: found.to_owned(),
        });
    }
    Ok(())
}
