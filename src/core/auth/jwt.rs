//! JWT utilities for token generation and validation
//!
//! Provides JWT token creation and validation using HS256 algorithm.
//! Access tokens are short-lived (15 minutes), refresh tokens are long-lived (7 days).
//! Each token class is signed with its own secret, so a leaked access secret
//! cannot mint refresh tokens and vice versa.

use chrono::{TimeDelta, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::config::Config;

/// Default access token expiration time (15 minutes)
const ACCESS_TOKEN_EXPIRATION_MINUTES: i64 = 15;

/// Default refresh token expiration time (7 days)
const REFRESH_TOKEN_EXPIRATION_DAYS: i64 = 7;

const DEFAULT_ISSUER: &str = "tasktrack";

/// JWT configuration
#[derive(Clone)]
pub struct JwtConfig {
    /// Secret key for signing access tokens
    pub access_secret: String,
    /// Secret key for signing refresh tokens
    pub refresh_secret: String,
    /// Access token expiration in minutes
    pub access_token_expiration_minutes: i64,
    /// Refresh token expiration in days
    pub refresh_token_expiration_days: i64,
    /// Token issuer
    pub issuer: String,
}

impl JwtConfig {
    /// Create a new JWT configuration
    pub fn new(access_secret: impl Into<String>, refresh_secret: impl Into<String>) -> Self {
        Self {
            access_secret: access_secret.into(),
            refresh_secret: refresh_secret.into(),
            access_token_expiration_minutes: ACCESS_TOKEN_EXPIRATION_MINUTES,
            refresh_token_expiration_days: REFRESH_TOKEN_EXPIRATION_DAYS,
            issuer: DEFAULT_ISSUER.to_string(),
        }
    }

    /// Build from the application config
    pub fn from_config(config: &Config) -> Result<Self, JwtError> {
        let access = config
            .access_secret
            .clone()
            .ok_or(JwtError::MissingSecret("JWT_ACCESS_SECRET"))?;
        let refresh = config
            .refresh_secret
            .clone()
            .ok_or(JwtError::MissingSecret("JWT_REFRESH_SECRET"))?;

        Ok(Self::new(access, refresh)
            .access_token_expiration(config.access_token_expiration_minutes)
            .refresh_token_expiration(config.refresh_token_expiration_days)
            .issuer(config.issuer.clone()))
    }

    /// Set access token expiration
    pub fn access_token_expiration(mut self, minutes: i64) -> Self {
        self.access_token_expiration_minutes = minutes;
        self
    }

    /// Set refresh token expiration
    pub fn refresh_token_expiration(mut self, days: i64) -> Self {
        self.refresh_token_expiration_days = days;
        self
    }

    /// Set issuer
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }
}

/// JWT errors
///
/// `Malformed`, `BadSignature` and `Expired` stay distinct here even though
/// the refresh endpoint reports all of them as one invalid-token response.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("{0} environment variable not set")]
    MissingSecret(&'static str),

    #[error("Token encoding failed: {0}")]
    Encoding(String),

    #[error("Malformed token")]
    Malformed,

    #[error("Invalid token signature")]
    BadSignature,

    #[error("Token expired")]
    Expired,

    #[error("Invalid token type")]
    WrongTokenType,
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => JwtError::Expired,
            ErrorKind::InvalidSignature => JwtError::BadSignature,
            _ => JwtError::Malformed,
        }
    }
}

/// Token type enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenType::Access => write!(f, "access"),
            TokenType::Refresh => write!(f, "refresh"),
        }
    }
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Token type (access or refresh)
    pub token_type: TokenType,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issuer
    pub iss: String,
    /// JWT ID, keeps two tokens minted in the same second distinct
    pub jti: String,
}

impl Claims {
    /// Get user ID as UUID
    pub fn user_id(&self) -> Result<Uuid, JwtError> {
        Uuid::parse_str(&self.sub).map_err(|_| JwtError::Malformed)
    }
}

/// A signed token and its expiry
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    /// Expiration (Unix timestamp)
    pub expires_at: i64,
}

/// Token pair (access + refresh)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    /// Access token (short-lived)
    pub access_token: String,
    /// Refresh token (long-lived)
    pub refresh_token: String,
}

#[derive(Clone)]
struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKeys {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// JWT service: issues and verifies both token classes
#[derive(Clone)]
pub struct JwtService {
    config: JwtConfig,
    access_keys: SigningKeys,
    refresh_keys: SigningKeys,
}

impl JwtService {
    /// Create a new JWT service
    pub fn new(config: JwtConfig) -> Self {
        let access_keys = SigningKeys::from_secret(&config.access_secret);
        let refresh_keys = SigningKeys::from_secret(&config.refresh_secret);

        Self {
            config,
            access_keys,
            refresh_keys,
        }
    }

    fn keys(&self, token_type: TokenType) -> &SigningKeys {
        match token_type {
            TokenType::Access => &self.access_keys,
            TokenType::Refresh => &self.refresh_keys,
        }
    }

    fn issue(&self, user_id: Uuid, token_type: TokenType) -> Result<IssuedToken, JwtError> {
        let now = Utc::now();
        let lifetime = match token_type {
            TokenType::Access => TimeDelta::try_minutes(self.config.access_token_expiration_minutes),
            TokenType::Refresh => TimeDelta::try_days(self.config.refresh_token_expiration_days),
        };
        let exp = lifetime
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| JwtError::Encoding(format!("{} token lifetime out of range", token_type)))?;

        let claims = Claims {
            sub: user_id.to_string(),
            token_type,
            iat: now.timestamp(),
            exp: exp.timestamp(),
            iss: self.config.issuer.clone(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::default(), &claims, &self.keys(token_type).encoding)
            .map_err(|e| JwtError::Encoding(e.to_string()))?;

        Ok(IssuedToken {
            token,
            expires_at: exp.timestamp(),
        })
    }

    /// Generate an access token
    pub fn issue_access(&self, user_id: Uuid) -> Result<IssuedToken, JwtError> {
        self.issue(user_id, TokenType::Access)
    }

    /// Generate a refresh token
    pub fn issue_refresh(&self, user_id: Uuid) -> Result<IssuedToken, JwtError> {
        self.issue(user_id, TokenType::Refresh)
    }

    /// Generate both access and refresh tokens
    pub fn issue_pair(&self, user_id: Uuid) -> Result<TokenPair, JwtError> {
        let access = self.issue_access(user_id)?;
        let refresh = self.issue_refresh(user_id)?;

        Ok(TokenPair {
            access_token: access.token,
            refresh_token: refresh.token,
        })
    }

    /// Validate and decode a token against the secret of the given class
    pub fn verify(&self, token: &str, token_type: TokenType) -> Result<Claims, JwtError> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        // Set leeway to 0 for strict expiration checking
        validation.leeway = 0;

        let token_data = decode::<Claims>(token, &self.keys(token_type).decoding, &validation)?;

        if token_data.claims.token_type != token_type {
            return Err(JwtError::WrongTokenType);
        }

        Ok(token_data.claims)
    }

    /// Validate an access token and return its user ID
    pub fn verify_access(&self, token: &str) -> Result<Uuid, JwtError> {
        self.verify(token, TokenType::Access)?.user_id()
    }

    /// Validate a refresh token and return its user ID
    pub fn verify_refresh(&self, token: &str) -> Result<Uuid, JwtError> {
        self.verify(token, TokenType::Refresh)?.user_id()
    }
}
