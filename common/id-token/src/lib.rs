pub mod claims;
pub mod clock;
pub mod config;
pub mod error;
pub mod provider;
pub mod signature;
pub mod verifier;

pub use claims::{Audience, DecodedToken, IdTokenClaims, TokenHeader, ValidatedClaims};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{VerifierConfig, VerifierSettings, DEFAULT_LEEWAY_SECONDS};
pub use error::{
    ConfigError, IdTokenResult, IdTokenValidationError, ProviderError, VerificationError,
};
pub use provider::{parse_jwks, InMemoryKeyStore, PublicKeyProvider};
pub use signature::SignatureVerifier;
pub use verifier::{IdTokenVerifier, VerifyOptions};
