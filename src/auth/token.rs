// JWT credential provider: issues and verifies access/refresh token pairs

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::auth::models::TokenPair;

/// Library default lifetime of access tokens
pub const DEFAULT_ACCESS_TTL_SECS: i64 = 60 * 60;
/// Library default lifetime of refresh tokens
pub const DEFAULT_REFRESH_TTL_SECS: i64 = 7 * 24 * 60 * 60;

/// Token verification and signing failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("Token is malformed: {0}")]
    Malformed(String),

    #[error("Token signature is invalid")]
    InvalidSignature,

    #[error("Token has expired")]
    Expired,

    #[error("Token claim '{0}' is missing or invalid")]
    InvalidClaim(&'static str),

    #[error("Token subject does not match the session owner")]
    SubjectMismatch,

    #[error("Access and refresh token were not issued together")]
    PairMismatch,

    #[error("Failed to sign token: {0}")]
    Signing(String),

    #[error("Invalid key material: {0}")]
    Key(String),
}

/// JWT claims structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid, // user_id
    pub iat: i64,  // issued at timestamp
    pub exp: i64,  // expiration timestamp
    pub jti: Uuid, // pair id shared by the access and refresh token
}

impl Claims {
    /// Rejects nil ids, an issue time after the expiry, and (when
    /// `enforce_expiry` is set) tokens whose expiry is not after `now`
    pub fn validate(&self, now: DateTime<Utc>, enforce_expiry: bool) -> Result<(), TokenError> {
        if self.sub.is_nil() {
            return Err(TokenError::InvalidClaim("sub"));
        }
        if self.jti.is_nil() {
            return Err(TokenError::InvalidClaim("jti"));
        }
        if self.iat > self.exp {
            return Err(TokenError::InvalidClaim("iat"));
        }
        if enforce_expiry && self.exp <= now.timestamp() {
            return Err(TokenError::Expired);
        }
        Ok(())
    }
}

/// Signing and verification keys
#[derive(Clone)]
pub struct Credentials {
    algorithm: Algorithm,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl Credentials {
    /// Shared HMAC secret (HS256)
    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            algorithm: Algorithm::HS256,
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    /// RSA key pair in PEM format (RS256)
    pub fn from_rsa_pem(private_pem: &[u8], public_pem: &[u8]) -> Result<Self, TokenError> {
        let encoding =
            EncodingKey::from_rsa_pem(private_pem).map_err(|e| TokenError::Key(e.to_string()))?;
        let decoding =
            DecodingKey::from_rsa_pem(public_pem).map_err(|e| TokenError::Key(e.to_string()))?;
        Ok(Self {
            algorithm: Algorithm::RS256,
            encoding,
            decoding,
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Issues and verifies token pairs
///
/// Stateless apart from its key material and lifetimes, so a single instance
/// is shared by every request.
#[derive(Debug, Clone)]
pub struct CredentialProvider {
    credentials: Credentials,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl CredentialProvider {
    /// Provider with the default lifetimes (1 hour access, 7 days refresh)
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            access_ttl: Duration::seconds(DEFAULT_ACCESS_TTL_SECS),
            refresh_ttl: Duration::seconds(DEFAULT_REFRESH_TTL_SECS),
        }
    }

    pub fn with_access_ttl(mut self, ttl: Duration) -> Self {
        self.access_ttl = ttl;
        self
    }

    pub fn with_refresh_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_ttl = ttl;
        self
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Signs an access and a refresh token for `user_id`, both carrying
    /// `pair_id` as their `jti`
    pub fn generate_pair(
        &self,
        user_id: Uuid,
        pair_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, TokenError> {
        let access = Claims {
            sub: user_id,
            iat: now.timestamp(),
            exp: expiry(now, self.access_ttl)?,
            jti: pair_id,
        };
        let refresh = Claims {
            exp: expiry(now, self.refresh_ttl)?,
            ..access.clone()
        };

        Ok(TokenPair {
            access_token: self.sign(&access)?,
            refresh_token: self.sign(&refresh)?,
        })
    }

    /// Checks that both tokens were signed by us for `user_id` in the same
    /// issuance
    ///
    /// The access token may already be expired; the refresh token may not.
    pub fn verify_pair(
        &self,
        user_id: Uuid,
        pair: &TokenPair,
        now: DateTime<Utc>,
    ) -> Result<(), TokenError> {
        let access = self.decode_claims(&pair.access_token)?;
        access.validate(now, false)?;
        let refresh = self.decode_claims(&pair.refresh_token)?;
        refresh.validate(now, true)?;

        if access.sub != user_id || refresh.sub != user_id {
            debug!(%user_id, "Token pair subject mismatch");
            return Err(TokenError::SubjectMismatch);
        }
        if access.jti != refresh.jti {
            debug!(%user_id, "Token pair id mismatch");
            return Err(TokenError::PairMismatch);
        }
        Ok(())
    }

    /// Verifies signature and expiry and returns the subject
    pub fn parse_token(&self, token: &str, now: DateTime<Utc>) -> Result<Uuid, TokenError> {
        let claims = self.decode_claims(token)?;
        claims.validate(now, true)?;
        Ok(claims.sub)
    }

    fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(
            &Header::new(self.credentials.algorithm),
            claims,
            &self.credentials.encoding,
        )
        .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verifies the signature and decodes the claims without validating them
    pub fn decode_claims(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(self.credentials.algorithm);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        decode::<Claims>(token, &self.credentials.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                _ => TokenError::Malformed(e.to_string()),
            })
    }
}

fn expiry(now: DateTime<Utc>, ttl: Duration) -> Result<i64, TokenError> {
    now.checked_add_signed(ttl)
        .map(|at| at.timestamp())
        .ok_or_else(|| TokenError::Signing("token lifetime out of range".to_string()))
}
