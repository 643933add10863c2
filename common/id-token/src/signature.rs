use std::fmt;
use std::sync::Arc;

use jsonwebtoken::{crypto, Algorithm, DecodingKey};
use tracing::debug;

use crate::claims::DecodedToken;
use crate::error::VerificationError;
use crate::provider::PublicKeyProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SigningAlgorithm {
    Hs256,
    Rs256,
}

impl SigningAlgorithm {
    fn as_str(self) -> &'static str {
        match self {
            SigningAlgorithm::Hs256 => "HS256",
            SigningAlgorithm::Rs256 => "RS256",
        }
    }

    fn jwt_algorithm(self) -> Algorithm {
        match self {
            SigningAlgorithm::Hs256 => Algorithm::HS256,
            SigningAlgorithm::Rs256 => Algorithm::RS256,
        }
    }
}

#[derive(Clone)]
enum KeySource {
    Secret(DecodingKey),
    Provider(Arc<dyn PublicKeyProvider>),
}

/// Checks that a compact token is well formed, declares the one algorithm this
/// verifier accepts, and carries a valid signature. Expiry is not checked here.
#[derive(Clone)]
pub struct SignatureVerifier {
    algorithm: SigningAlgorithm,
    keys: KeySource,
}

impl SignatureVerifier {
    /// HS256 with a shared secret.
    pub fn for_shared_secret(secret: impl AsRef<[u8]>) -> Self {
        Self {
            algorithm: SigningAlgorithm::Hs256,
            keys: KeySource::Secret(DecodingKey::from_secret(secret.as_ref())),
        }
    }

    /// RS256 with keys resolved through `provider` by the header `kid`.
    pub fn for_asymmetric_key(provider: Arc<dyn PublicKeyProvider>) -> Self {
        Self {
            algorithm: SigningAlgorithm::Rs256,
            keys: KeySource::Provider(provider),
        }
    }

    /// The only `alg` header value this verifier accepts.
    pub fn algorithm(&self) -> &'static str {
        self.algorithm.as_str()
    }

    pub fn verify_signature(&self, token: &str) -> Result<DecodedToken, VerificationError> {
        let decoded = DecodedToken::decode(token)?;

        let expected = self.algorithm();
        let declared = decoded.header().algorithm.as_str();
        if declared != expected {
            debug!(alg = declared, expected, "token algorithm rejected");
            return Err(VerificationError::AlgorithmMismatch {
                expected,
                found: declared.to_owned(),
            });
        }

        let key = self.resolve_key(decoded.header().key_id.as_deref())?;
        let valid = crypto::verify(
            decoded.signature(),
            decoded.signing_input(),
            &key,
            self.algorithm.jwt_algorithm(),
        )
        .map_err(|err| VerificationError::InvalidSignature { source: Some(err) })?;

        if !valid {
            debug!(kid = ?decoded.header().key_id, alg = expected, "token signature mismatch");
            return Err(VerificationError::InvalidSignature { source: None });
        }

        Ok(decoded)
    }

    fn resolve_key(&self, key_id: Option<&str>) -> Result<DecodingKey, VerificationError> {
        match &self.keys {
            KeySource::Secret(key) => Ok(key.clone()),
            KeySource::Provider(provider) => provider.public_key_by_id(key_id).map_err(|source| {
                debug!(kid = ?key_id, error = %source, "public key lookup failed");
                VerificationError::KeyResolutionFailed {
                    key_id: key_id.map(str::to_owned),
                    source,
                }
            }),
        }
    }
}

impl fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys = match self.keys {
            KeySource::Secret(_) => "shared-secret",
            KeySource::Provider(_) => "public-key-provider",
        };
        f.debug_struct("SignatureVerifier")
            .field("algorithm", &self.algorithm())
            .field("keys", &keys)
            .finish()
    }
}
