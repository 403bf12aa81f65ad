//! Authentication primitives for mx-server.
//!
//! - **Passwords**: Argon2id hashing and verification
//! - **JWT**: Ed25519-signed tokens for the admin session
//! - **Secrets**: random API token and auth-code generation

use base64::{
    Engine,
    engine::general_purpose::{STANDARD as BASE64, URL_SAFE_NO_PAD},
};
use ed25519_dalek::SigningKey;
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Issuer stamped into, and required on, every token.
pub const ISSUER: &str = "mx-server";

/// Prefix of pre-issued API tokens, so they are recognizable in headers.
pub const API_TOKEN_PREFIX: &str = "txo";

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid password")]
    InvalidPassword,
    #[error("password hashing failed: {0}")]
    HashError(String),
    #[error("JWT error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),
    #[error("invalid signing key")]
    InvalidKey,
}

// ── Password Hashing (Argon2id) ─────────────────────────────────────

/// Hash a password using Argon2id with a random salt.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    use argon2::{
        Argon2, PasswordHasher,
        password_hash::{SaltString, rand_core::OsRng as PhcOsRng},
    };

    let salt = SaltString::generate(&mut PhcOsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AuthError::HashError(e.to_string()))?;
    Ok(hash.to_string())
}

/// Verify a password against an Argon2id hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    use argon2::{Argon2, PasswordVerifier, password_hash::PasswordHash};

    let parsed_hash = PasswordHash::new(hash).map_err(|e| AuthError::HashError(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

// ── JWT (Ed25519-signed) ────────────────────────────────────────────

/// Claims embedded in a session JWT.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject — user ID (`usr_...`).
    pub sub: String,
    /// Issuer — always [`ISSUER`].
    pub iss: String,
    /// Expiration time (Unix timestamp).
    pub exp: i64,
    /// Issued-at time (Unix timestamp).
    pub iat: i64,
    /// The user's auth code at signing time. Rotating the stored code
    /// invalidates every token signed before the rotation.
    pub auth_code: String,
}

impl Claims {
    /// Build claims for `user_id` valid for `ttl_secs` from `now`.
    pub fn new(user_id: impl Into<String>, auth_code: impl Into<String>, now: i64, ttl_secs: i64) -> Self {
        Self {
            sub: user_id.into(),
            iss: ISSUER.into(),
            exp: now + ttl_secs,
            iat: now,
            auth_code: auth_code.into(),
        }
    }
}

/// JWT signing/verification context.
pub struct JwtContext {
    encoding_key: jsonwebtoken::EncodingKey,
    decoding_key: jsonwebtoken::DecodingKey,
}

impl JwtContext {
    /// Create a JWT context from an Ed25519 private key (32 bytes, base64-encoded).
    pub fn from_ed25519_seed(seed_b64: &str) -> Result<Self, AuthError> {
        let seed_bytes = BASE64.decode(seed_b64).map_err(|_| AuthError::InvalidKey)?;
        let seed: [u8; 32] = seed_bytes
            .as_slice()
            .try_into()
            .map_err(|_| AuthError::InvalidKey)?;

        let signing_key = SigningKey::from_bytes(&seed);
        let verifying_key = signing_key.verifying_key();

        // jsonwebtoken expects PKCS8v2 DER for the Ed25519 private key:
        //   SEQUENCE { INTEGER 0, SEQUENCE { OID 1.3.101.112 },
        //              OCTET STRING { OCTET STRING { <32 seed bytes> } } }
        let pkcs8_prefix: &[u8] = &[
            0x30, 0x2e, // SEQUENCE, 46 bytes
            0x02, 0x01, 0x00, // INTEGER 0 (version)
            0x30, 0x05, // SEQUENCE, 5 bytes
            0x06, 0x03, 0x2b, 0x65, 0x70, // OID 1.3.101.112 (Ed25519)
            0x04, 0x22, // OCTET STRING, 34 bytes
            0x04, 0x20, // OCTET STRING, 32 bytes (the seed)
        ];
        let mut pkcs8_der = Vec::with_capacity(48);
        pkcs8_der.extend_from_slice(pkcs8_prefix);
        pkcs8_der.extend_from_slice(&seed);

        let encoding_key = jsonwebtoken::EncodingKey::from_ed_der(&pkcs8_der);
        // The public half is the raw 32-byte key.
        let decoding_key = jsonwebtoken::DecodingKey::from_ed_der(verifying_key.as_bytes());

        Ok(Self {
            encoding_key,
            decoding_key,
        })
    }

    /// Generate a new random Ed25519 seed and create a JWT context.
    /// Returns `(context, seed_b64)` — store the seed securely.
    pub fn generate() -> (Self, String) {
        let signing_key = SigningKey::generate(&mut OsRng);
        let seed_b64 = BASE64.encode(signing_key.to_bytes());
        let ctx =
            Self::from_ed25519_seed(&seed_b64).expect("freshly generated key should be valid");
        (ctx, seed_b64)
    }

    /// Create and sign a JWT token.
    pub fn create_token(&self, claims: &Claims) -> Result<String, AuthError> {
        let header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::EdDSA);
        let token = jsonwebtoken::encode(&header, claims, &self.encoding_key)?;
        Ok(token)
    }

    /// Validate and decode a JWT token.
    pub fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::EdDSA);
        validation.set_issuer(&[ISSUER]);
        validation.validate_exp = true;

        let token_data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)?;
        Ok(token_data.claims)
    }
}

// ── Secrets ─────────────────────────────────────────────────────────

fn random_b64(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a pre-issued API token secret: `txo<43 base64url chars>`.
pub fn generate_api_token() -> String {
    format!("{API_TOKEN_PREFIX}{}", random_b64(32))
}

/// Generate a fresh per-user auth code.
pub fn generate_auth_code() -> String {
    random_b64(16)
}
