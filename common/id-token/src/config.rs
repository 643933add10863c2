use std::env;
use std::sync::Arc;

use tracing::warn;

use crate::clock::{Clock, SystemClock};
use crate::error::ConfigError;
use crate::signature::SignatureVerifier;

pub const DEFAULT_LEEWAY_SECONDS: u32 = 60;

const ENV_ISSUER: &str = "ID_TOKEN_ISSUER";
const ENV_AUDIENCE: &str = "ID_TOKEN_AUDIENCE";
const ENV_LEEWAY: &str = "ID_TOKEN_LEEWAY_SECONDS";
const ENV_ORGANIZATION: &str = "ID_TOKEN_ORGANIZATION";

/// Immutable settings for [`crate::IdTokenVerifier`].
///
/// Built once through [`VerifierConfig::new`] and the `with_*` modifiers, then
/// shared across any number of `verify` calls.
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    issuer: String,
    audience: String,
    signature_verifier: SignatureVerifier,
    organization: Option<String>,
    leeway_seconds: u32,
    clock: Arc<dyn Clock>,
}

impl VerifierConfig {
    /// Validate the required fields. The issuer is normalized here and
    /// nowhere else: a bare host becomes `https://<host>/`, anything with a
    /// scheme is kept as given.
    pub fn new(
        issuer: impl Into<String>,
        audience: impl Into<String>,
        signature_verifier: SignatureVerifier,
    ) -> Result<Self, ConfigError> {
        let issuer = normalize_issuer(&issuer.into()).ok_or(ConfigError::MissingIssuer)?;
        let audience = normalize_optional(&audience.into()).ok_or(ConfigError::MissingAudience)?;

        Ok(Self {
            issuer,
            audience,
            signature_verifier,
            organization: None,
            leeway_seconds: DEFAULT_LEEWAY_SECONDS,
            clock: Arc::new(SystemClock),
        })
    }

    /// Expected `org_id` claim.
    pub fn with_organization(mut self, organization: impl Into<String>) -> Result<Self, ConfigError> {
        let organization =
            normalize_optional(&organization.into()).ok_or(ConfigError::EmptyOrganization)?;
        self.organization = Some(organization);
        Ok(self)
    }

    /// Clock skew tolerated on `exp` and `auth_time` checks.
    pub fn with_leeway(mut self, seconds: u32) -> Self {
        if seconds > 3600 {
            warn!(leeway_seconds = seconds, "ID token leeway exceeds one hour");
        }
        self.leeway_seconds = seconds;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    pub fn signature_verifier(&self) -> &SignatureVerifier {
        &self.signature_verifier
    }

    pub fn organization(&self) -> Option<&str> {
        self.organization.as_deref()
    }

    pub fn leeway_seconds(&self) -> u32 {
        self.leeway_seconds
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }
}

/// Verifier settings read from the process environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierSettings {
    pub issuer: String,
    pub audience: String,
    pub leeway_seconds: u32,
    pub organization: Option<String>,
}

impl VerifierSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`VerifierSettings::from_env`] over an arbitrary lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).and_then(|value| normalize_optional(&value));

        let issuer = read(ENV_ISSUER).ok_or(ConfigError::MissingEnv(ENV_ISSUER))?;
        let audience = read(ENV_AUDIENCE).ok_or(ConfigError::MissingEnv(ENV_AUDIENCE))?;
        let leeway_seconds = read(ENV_LEEWAY)
            .map(|value| {
                value
                    .parse::<u32>()
                    .map_err(|_| ConfigError::InvalidLeeway(value.clone()))
            })
            .transpose()?
            .unwrap_or(DEFAULT_LEEWAY_SECONDS);
        let organization = read(ENV_ORGANIZATION);

        Ok(Self {
            issuer,
            audience,
            leeway_seconds,
            organization,
        })
    }

    pub fn into_config(self, signature_verifier: SignatureVerifier) -> Result<VerifierConfig, ConfigError> {
        let config = VerifierConfig::new(self.issuer, self.audience, signature_verifier)?
            .with_leeway(self.leeway_seconds);
        match self.organization {
            Some(organization) => config.with_organization(organization),
            None => Ok(config),
        }
    }
}

fn normalize_optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn normalize_issuer(value: &str) -> Option<String> {
    let issuer = normalize_optional(value)?;
    if issuer.contains("://") {
        Some(issuer)
    } else {
        Some(format!("https://{}/", issuer.trim_end_matches('/')))
    }
}
