use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use tracing::debug;

use crate::error::ProviderError;

/// Resolves the public key used to check an asymmetrically signed token.
///
/// `key_id` is the token's `kid` header, or `None` when the header has none.
/// How keys are obtained, cached or rotated is up to the implementation.
pub trait PublicKeyProvider: Send + Sync {
    fn public_key_by_id(&self, key_id: Option<&str>) -> Result<DecodingKey, ProviderError>;
}

#[derive(Default)]
struct KeyTable {
    keys: HashMap<String, DecodingKey>,
    default_kid: Option<String>,
}

/// Thread-safe key store for keys loaded from PEM, RSA components or a JWKS document.
#[derive(Clone, Default)]
pub struct InMemoryKeyStore {
    inner: Arc<RwLock<KeyTable>>,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from an already-fetched JWKS document.
    pub fn from_jwks_json(document: &str) -> Result<Self, ProviderError> {
        let store = Self::new();
        store.replace_all(parse_jwks(document)?);
        Ok(store)
    }

    pub fn insert_key(&self, kid: impl Into<String>, key: DecodingKey) {
        let mut table = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        table.keys.insert(kid.into(), key);
    }

    pub fn insert_rsa_pem(&self, kid: impl Into<String>, pem: &[u8]) -> Result<(), ProviderError> {
        let kid = kid.into();
        let key = DecodingKey::from_rsa_pem(pem)
            .map_err(|err| ProviderError::KeyParse(kid.clone(), err.to_string()))?;
        self.insert_key(kid, key);
        Ok(())
    }

    /// Insert an RSA key from its base64url modulus and exponent.
    pub fn insert_rsa_components(
        &self,
        kid: impl Into<String>,
        modulus: &str,
        exponent: &str,
    ) -> Result<(), ProviderError> {
        let kid = kid.into();
        let key = DecodingKey::from_rsa_components(modulus, exponent)
            .map_err(|err| ProviderError::KeyParse(kid.clone(), err.to_string()))?;
        self.insert_key(kid, key);
        Ok(())
    }

    /// Key served for tokens whose header carries no `kid`.
    pub fn set_default_key_id(&self, kid: impl Into<String>) {
        let mut table = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        table.default_kid = Some(kid.into());
    }

    pub fn get(&self, kid: &str) -> Option<DecodingKey> {
        let table = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        table.keys.get(kid).cloned()
    }

    pub fn contains(&self, kid: &str) -> bool {
        let table = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        table.keys.contains_key(kid)
    }

    pub fn len(&self) -> usize {
        let table = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        table.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn replace_all<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (String, DecodingKey)>,
    {
        let mut table = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        table.keys.clear();
        for (kid, key) in entries.into_iter() {
            table.keys.insert(kid, key);
        }
    }
}

impl fmt::Debug for InMemoryKeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut kids: Vec<&String> = table.keys.keys().collect();
        kids.sort();
        f.debug_struct("InMemoryKeyStore")
            .field("kids", &kids)
            .field("default_kid", &table.default_kid)
            .finish()
    }
}

impl PublicKeyProvider for InMemoryKeyStore {
    fn public_key_by_id(&self, key_id: Option<&str>) -> Result<DecodingKey, ProviderError> {
        let table = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let kid = match key_id {
            Some(kid) => kid,
            None => table
                .default_kid
                .as_deref()
                .ok_or(ProviderError::MissingKeyId)?,
        };
        table
            .keys
            .get(kid)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownKeyId(kid.to_owned()))
    }
}

/// Parse the RSA signing keys out of a JWKS document.
///
/// Entries marked for a use other than `sig` are skipped. Any other entry that
/// is not an RS256-capable RSA key fails the whole document.
pub fn parse_jwks(document: &str) -> Result<Vec<(String, DecodingKey)>, ProviderError> {
    let body: JwksDocument =
        serde_json::from_str(document).map_err(|err| ProviderError::JwksDecode(err.to_string()))?;

    let mut keys = Vec::new();
    for key in body.keys.into_iter() {
        if key.use_.as_deref().is_some_and(|value| value != "sig") {
            continue;
        }

        let kid = key.kid.ok_or(ProviderError::JwksMissingKid)?;
        let kty = key.kty.unwrap_or_else(|| "RSA".to_string());
        if kty != "RSA" {
            return Err(ProviderError::JwksUnsupportedKey { kid, kty });
        }

        if let Some(alg) = key.alg {
            if alg != "RS256" {
                return Err(ProviderError::JwksUnsupportedAlg { kid, alg });
            }
        }

        let modulus = key
            .n
            .ok_or_else(|| ProviderError::JwksMissingComponents(kid.clone()))?;
        let exponent = key
            .e
            .ok_or_else(|| ProviderError::JwksMissingComponents(kid.clone()))?;

        let decoding_key = DecodingKey::from_rsa_components(&modulus, &exponent)
            .map_err(|err| ProviderError::KeyParse(kid.clone(), err.to_string()))?;
        keys.push((kid, decoding_key));
    }

    debug!(count = keys.len(), "parsed JWKS document");
    Ok(keys)
}

#[derive(Debug, Deserialize)]
struct JwksDocument {
    keys: Vec<JwkEntry>,
}

#[derive(Debug, Deserialize)]
struct JwkEntry {
    kid: Option<String>,
    kty: Option<String>,
    alg: Option<String>,
    #[serde(rename = "use")]
    use_: Option<String>,
    n: Option<String>,
    e: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    const EXPONENT: &str = "AQAB";

    // Components only need to decode here, never to verify a signature.
    fn modulus() -> String {
        URL_SAFE_NO_PAD.encode([0xC5u8; 256])
    }

    fn jwks(keys: serde_json::Value) -> String {
        json!({ "keys": keys }).to_string()
    }

    #[test]
    fn key_store_insert_replace_round_trip() {
        let store = InMemoryKeyStore::new();
        assert!(!store.contains("kid"));
        store.insert_key("kid", DecodingKey::from_secret(b"secret"));
        assert!(store.contains("kid"));
        assert!(store.get("kid").is_some());

        store.replace_all(vec![(
            "another".to_string(),
            DecodingKey::from_secret(b"other"),
        )]);
        assert!(!store.contains("kid"));
        assert!(store.contains("another"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn provider_resolves_by_kid_or_default() {
        let store = InMemoryKeyStore::new();
        store
            .insert_rsa_components("primary", &modulus(), EXPONENT)
            .expect("components parse");

        assert!(store.public_key_by_id(Some("primary")).is_ok());
        assert!(matches!(
            store.public_key_by_id(None),
            Err(ProviderError::MissingKeyId)
        ));

        store.set_default_key_id("primary");
        assert!(store.public_key_by_id(None).is_ok());

        match store.public_key_by_id(Some("rotated")) {
            Err(ProviderError::UnknownKeyId(kid)) => assert_eq!(kid, "rotated"),
            other => panic!("unexpected result: {:?}", other.err()),
        }
    }

    #[test]
    fn insert_rsa_pem_rejects_garbage() {
        let store = InMemoryKeyStore::new();
        let err = store
            .insert_rsa_pem("bad", b"-----BEGIN PUBLIC KEY-----\nnope\n-----END PUBLIC KEY-----\n")
            .expect_err("should fail");
        assert!(matches!(err, ProviderError::KeyParse(kid, _) if kid == "bad"));
        assert!(store.is_empty());
    }

    #[test]
    fn jwks_document_loads_signing_keys() {
        let document = jwks(json!([
            { "kid": "k1", "kty": "RSA", "alg": "RS256", "use": "sig", "n": modulus(), "e": EXPONENT },
            { "kid": "k2", "n": modulus(), "e": EXPONENT },
            { "kid": "enc", "kty": "RSA", "use": "enc", "n": modulus(), "e": EXPONENT }
        ]));

        let store = InMemoryKeyStore::from_jwks_json(&document).expect("document parses");
        assert_eq!(store.len(), 2);
        assert!(store.contains("k1"));
        assert!(store.contains("k2"));
        assert!(!store.contains("enc"));
    }

    #[test]
    fn jwks_document_failures_are_specific() {
        assert!(matches!(
            parse_jwks("not json"),
            Err(ProviderError::JwksDecode(_))
        ));
        assert!(matches!(
            parse_jwks(&jwks(json!([{ "kty": "RSA", "n": modulus(), "e": EXPONENT }]))),
            Err(ProviderError::JwksMissingKid)
        ));
        assert!(matches!(
            parse_jwks(&jwks(json!([{ "kid": "k1", "kty": "EC" }]))),
            Err(ProviderError::JwksUnsupportedKey { kty, .. }) if kty == "EC"
        ));
        assert!(matches!(
            parse_jwks(&jwks(json!([{ "kid": "k1", "alg": "RS512", "n": modulus(), "e": EXPONENT }]))),
            Err(ProviderError::JwksUnsupportedAlg { alg, .. }) if alg == "RS512"
        ));
        assert!(matches!(
            parse_jwks(&jwks(json!([{ "kid": "k1", "n": modulus() }]))),
            Err(ProviderError::JwksMissingComponents(kid)) if kid == "k1"
        ));
    }
}
