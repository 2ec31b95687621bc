//! Bearer-token authentication.
//!
//! Tokens are minted by the identity provider with a shared HS256 secret. The
//! [`AuthContext`] extractor validates the token once per request, provisions
//! the caller's user record and hands handlers the resolved [`User`].

use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use futures_util::future::LocalBoxFuture;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::models::{Id, User};
use crate::routes::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id, decimal.
    pub sub: String,
    pub name: String,
    pub exp: usize,
}

impl Claims {
    pub fn user_id(&self) -> Result<Id, ApiError> {
        self.sub.parse().map_err(|_| ApiError::Unauthorized)
    }
}

pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtKeys {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Validate a JWT and return its claims.
    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        Ok(decode::<Claims>(token, &self.decoding, &self.validation)?.claims)
    }

    /// Mint a token for `user_id`, valid for `ttl`.
    pub fn issue(&self, user_id: Id, name: &str, ttl: chrono::Duration) -> Result<String, jsonwebtoken::errors::Error> {
        let exp = (chrono::Utc::now() + ttl).timestamp().max(0) as usize;
        let claims = Claims { sub: user_id.to_string(), name: name.to_string(), exp };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
    }
}

/// The authenticated caller, resolved once per request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user: User,
}

impl AuthContext {
    pub fn user_id(&self) -> Id {
        self.user.id
    }
}

impl FromRequest for AuthContext {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, ApiError>>;

    fn from_request(req: &HttpRequest, pl: &mut Payload) -> Self::Future {
        // Delegate to BearerAuth to parse the header.
        let bearer = BearerAuth::from_request(req, pl).into_inner();
        let state = req.app_data::<web::Data<AppState>>().cloned();
        Box::pin(async move {
            let state = state.ok_or_else(|| {
                tracing::error!("AppState missing from app data");
                ApiError::Internal
            })?;
            let bearer = bearer.map_err(|_| ApiError::Unauthorized)?;
            let claims = state.jwt.verify(bearer.token()).map_err(|e| {
                tracing::debug!(error = %e, "rejected bearer token");
                ApiError::Unauthorized
            })?;
            let user = state.repo.ensure_user(claims.user_id()?, &claims.name).await?;
            Ok(AuthContext { user })
        })
    }
}
