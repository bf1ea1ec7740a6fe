//! Caller identity as seen by the services.
//!
//! Tokens are HS256 JWTs. Decoding validates signature and expiry; the
//! resulting [`Claims`] are then passed explicitly into service calls.

use std::{fmt, str::FromStr};

use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum AuthnError {
    #[error("jwt secret must be at least 32 bytes")]
    WeakSecret,
    #[error("unknown role: {0}")]
    UnknownRole(String),
    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Role {
    System,
    Admin,
    Researcher,
    Annotator,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::System, Role::Admin, Role::Researcher, Role::Annotator];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::Admin => "admin",
            Role::Researcher => "researcher",
            Role::Annotator => "annotator",
        }
    }
}

impl FromStr for Role {
    type Err = AuthnError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "system" => Ok(Role::System),
            "admin" => Ok(Role::Admin),
            "researcher" => Ok(Role::Researcher),
            "annotator" => Ok(Role::Annotator),
            other => Err(AuthnError::UnknownRole(other.to_string())),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated token payload.
///
/// `role` stays a raw string so that a token minted for a role this build
/// does not know still decodes; [`Claims::role`] then yields `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: String,
    pub exp: usize,
    pub iat: usize,
}

impl Claims {
    /// Claims for in-process callers (seeding, tests). Expiry is never
    /// consulted past token decoding.
    pub fn new(sub: Uuid, role: Role) -> Self {
        let now = Utc::now().timestamp() as usize;
        Self {
            sub,
            role: role.as_str().to_string(),
            exp: now,
            iat: now,
        }
    }

    pub fn role(&self) -> Option<Role> {
        self.role.parse().ok()
    }
}

#[derive(Clone)]
pub struct JwtConfig {
    secret: String,
    pub token_ttl_minutes: i64,
}

impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("token_ttl_minutes", &self.token_ttl_minutes)
            .finish()
    }
}

impl JwtConfig {
    pub fn new(secret: impl Into<String>) -> Result<Self, AuthnError> {
        let secret = secret.into();
        if secret.len() < MIN_SECRET_LEN {
            return Err(AuthnError::WeakSecret);
        }
        Ok(Self {
            secret,
            token_ttl_minutes: 60,
        })
    }

    pub fn with_ttl_minutes(mut self, minutes: i64) -> Self {
        self.token_ttl_minutes = minutes;
        self
    }

    fn encoding_key(&self) -> EncodingKey {
        EncodingKey::from_secret(self.secret.as_bytes())
    }

    fn decoding_key(&self) -> DecodingKey {
        DecodingKey::from_secret(self.secret.as_bytes())
    }

    pub fn issue_token(&self, sub: Uuid, role: &str) -> Result<String, AuthnError> {
        let now = Utc::now();
        let exp = now
            .checked_add_signed(Duration::minutes(self.token_ttl_minutes))
            .unwrap_or(now)
            .timestamp() as usize;
        let claims = Claims {
            sub,
            role: role.to_string(),
            exp,
            iat: now.timestamp() as usize,
        };
        Ok(jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &self.encoding_key(),
        )?)
    }

    pub fn decode_token(&self, token: &str) -> Result<Claims, AuthnError> {
        let data =
            jsonwebtoken::decode::<Claims>(token, &self.decoding_key(), &Validation::default())?;
        Ok(data.claims)
    }
}

/// Pulls the token out of an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
