#![allow(dead_code)]

use std::sync::{Arc, OnceLock};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use common_id_token::{FixedClock, IdTokenVerifier, SignatureVerifier, VerifierConfig};
use jsonwebtoken::{encode, Algorithm, DecodingKey, EncodingKey, Header};
use rsa::pkcs1::{EncodeRsaPrivateKey, EncodeRsaPublicKey, LineEnding};
use rsa::rand_core::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde_json::{json, Map, Value};
use tracing_subscriber::EnvFilter;

pub const NOW: i64 = 1_700_000_000;
pub const ISSUER: &str = "https://example.com/";
pub const AUDIENCE: &str = "audA";
pub const SECRET: &str = "secret";

pub struct KeyMaterial {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub modulus: String,
    pub exponent: String,
}

/// One RSA key per test binary; generation dominates test time otherwise.
pub fn key_material() -> &'static KeyMaterial {
    static MATERIAL: OnceLock<KeyMaterial> = OnceLock::new();
    MATERIAL.get_or_init(generate_key_material)
}

fn generate_key_material() -> KeyMaterial {
    let mut rng = OsRng;
    let private_key = RsaPrivateKey::new(&mut rng, 2048).expect("key generation");
    let public_key = private_key.to_public_key();

    let private_pem = private_key
        .to_pkcs1_pem(LineEnding::LF)
        .expect("private pem");
    let public_pem = public_key.to_pkcs1_pem(LineEnding::LF).expect("public pem");

    KeyMaterial {
        encoding: EncodingKey::from_rsa_pem(private_pem.as_bytes()).expect("encoding key"),
        decoding: DecodingKey::from_rsa_pem(public_pem.as_bytes()).expect("decoding key"),
        modulus: URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
        exponent: URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn claims() -> Map<String, Value> {
    match json!({
        "iss": ISSUER,
        "sub": "auth0|user-1",
        "aud": AUDIENCE,
        "exp": NOW + 600,
        "iat": NOW,
    }) {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

pub fn sign_hs256(secret: &str, claims: &Map<String, Value>) -> String {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("sign HS256 token")
}

pub fn sign_rs256(kid: Option<&str>, claims: &Map<String, Value>) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_owned);
    encode(&header, claims, &key_material().encoding).expect("sign RS256 token")
}

/// A token with an arbitrary header, e.g. `alg: none`, and a literal signature segment.
pub fn forge(header: Value, claims: &Map<String, Value>, signature: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(header.to_string());
    let payload = URL_SAFE_NO_PAD.encode(Value::Object(claims.clone()).to_string());
    format!("{header}.{payload}.{signature}")
}

pub fn config(signature_verifier: SignatureVerifier, now: i64) -> VerifierConfig {
    VerifierConfig::new(ISSUER, AUDIENCE, signature_verifier)
        .expect("valid config")
        .with_clock(Arc::new(FixedClock::at_timestamp(now)))
}

pub fn hs256_verifier(secret: &str) -> IdTokenVerifier {
    IdTokenVerifier::new(config(SignatureVerifier::for_shared_secret(secret), NOW))
}
