use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::future::{ready, Ready};

use crate::error::ApiError;
use crate::models::{Id, User};

const TOKEN_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Id,
    pub username: String,
    #[serde(default)]
    pub avatar: String,
    pub exp: usize,
}

/// HS256 signing material, registered as `web::Data<JwtKeys>`.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl JwtKeys {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    /// Create a JWT for a user
    pub fn issue(&self, user: &User) -> Result<String, jsonwebtoken::errors::Error> {
        let exp = (chrono::Utc::now() + chrono::Duration::hours(TOKEN_TTL_HOURS)).timestamp() as usize;
        let claims = Claims {
            sub: user.id,
            username: user.username.clone(),
            avatar: user.avatar.clone(),
            exp,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
    }

    /// Validate a JWT and return its claims.
    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        Ok(decode::<Claims>(token, &self.decoding, &validation)?.claims)
    }
}

/// Extractor yielding validated `Claims`. Use `Option<Auth>` for optional auth.
pub struct Auth(pub Claims);

impl Auth {
    pub fn user_id(&self) -> Id {
        self.0.sub
    }

    /// A `user_id` supplied alongside the token must name the caller.
    pub fn ensure_self(&self, claimed: Option<Id>) -> Result<Id, ApiError> {
        match claimed {
            Some(id) if id != self.0.sub => Err(ApiError::Forbidden),
            _ => Ok(self.0.sub),
        }
    }
}

impl FromRequest for Auth {
    type Error = ApiError;
    type Future = Ready<Result<Self, ApiError>>;

    fn from_request(req: &HttpRequest, pl: &mut Payload) -> Self::Future {
        let Some(keys) = req.app_data::<web::Data<JwtKeys>>() else {
            tracing::error!("JwtKeys not registered as app data");
            return ready(Err(ApiError::Internal));
        };
        // Delegate to BearerAuth to parse the header.
        let Ok(bearer) = BearerAuth::from_request(req, pl).into_inner() else {
            return ready(Err(ApiError::Unauthorized));
        };
        ready(match keys.verify(bearer.token()) {
            Ok(claims) => Ok(Auth(claims)),
            Err(e) => {
                tracing::debug!("rejected bearer token: {e}");
                Err(ApiError::Unauthorized)
            }
        })
    }
}

pub fn hash_password(pw: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default().hash_password(pw.as_bytes(), &salt)?.to_string())
}

/// False for a wrong password and for an unparseable stored hash.
pub fn verify_password(hash: &str, pw: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default().verify_password(pw.as_bytes(), &parsed).is_ok(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user() -> User {
        User {
            id: 42,
            username: "alice".into(),
            email: "alice@example.com".into(),
            password_hash: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            bio: String::new(),
            website: String::new(),
            avatar: "/uploads/avatars/a.png".into(),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn issued_token_round_trips_claims() {
        let keys = JwtKeys::new(b"0123456789abcdef0123456789abcdef");
        let token = keys.issue(&user()).unwrap();
        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.avatar, "/uploads/avatars/a.png");
    }

    #[test]
    fn token_from_other_secret_is_rejected() {
        let a = JwtKeys::new(b"0123456789abcdef0123456789abcdef");
        let b = JwtKeys::new(b"fedcba9876543210fedcba9876543210");
        let token = a.issue(&user()).unwrap();
        assert!(b.verify(&token).is_err());
    }

    #[test]
    fn password_hash_verifies() {
        let hashed = hash_password("correct horse").unwrap();
        assert!(verify_password(&hashed, "correct horse"));
        assert!(!verify_password(&hashed, "wrong"));
        assert!(!verify_password("not-a-phc-string", "correct horse"));
    }

    #[test]
    fn ensure_self_rejects_foreign_user_id() {
        let auth = Auth(Claims { sub: 3, username: "c".into(), avatar: String::new(), exp: 0 });
        assert_eq!(auth.ensure_self(None).unwrap(), 3);
        assert_eq!(auth.ensure_self(Some(3)).unwrap(), 3);
        assert!(matches!(auth.ensure_self(Some(4)), Err(ApiError::Forbidden)));
    }
}
