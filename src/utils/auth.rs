use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, Response, header};
use axum::middleware::Next;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::core::error::Error;
use crate::core::state::AppState;
use crate::types::user::{Claims, Session, UserId};

const ISSUER: &str = "campus-market";

/// Why a token failed verification. Only ever logged; clients see one
/// generic 401.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenRejection {
    Expired,
    BadSignature,
    Malformed,
}

/// Issues and verifies the stateless session tokens. Built once at startup
/// from the configured secret.
#[derive(Clone)]
pub(crate) struct SessionKeys {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    lifetime: Duration,
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeys")
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

impl SessionKeys {
    pub(crate) fn new(secret: &str, lifetime: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            lifetime,
        }
    }

    pub(crate) fn issue(&self, user_id: UserId) -> Result<String, Error> {
        self.issue_at(user_id, Utc::now())
    }

    pub(crate) fn issue_at(&self, user_id: UserId, now: DateTime<Utc>) -> Result<String, Error> {
        let claims = Claims {
            exp: (now + self.lifetime).timestamp() as usize,
            iat: now.timestamp() as usize,
            sub: user_id.to_string(),
            iss: ISSUER.into(),
        };

        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.encoding_key,
        )?)
    }

    pub(crate) fn verify(&self, token: &str) -> Result<Session, TokenRejection> {
        self.verify_at(token, Utc::now())
    }

    pub(crate) fn verify_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Session, TokenRejection> {
        let mut validation = Validation::new(Algorithm::HS256);
        // expiry is checked below against `now` so it stays exact and testable
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_issuer(&[ISSUER]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);

        let token_data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => TokenRejection::BadSignature,
                ErrorKind::ExpiredSignature => TokenRejection::Expired,
                _ => TokenRejection::Malformed,
            })?;

        if now.timestamp() as usize > token_data.claims.exp {
            return Err(TokenRejection::Expired);
        }

        let user_id = token_data
            .claims
            .sub
            .parse::<UserId>()
            .map_err(|_| TokenRejection::Malformed)?;

        Ok(Session { user_id })
    }

    /// Resolves the bearer credential carried by a request.
    pub(crate) fn authenticate(&self, headers: &HeaderMap) -> Result<Session, Error> {
        let header = headers
            .get(header::AUTHORIZATION)
            .ok_or(Error::NoCredentials)?;

        let token = header
            .to_str()
            .ok()
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(Error::InvalidCredential(TokenRejection::Malformed))?;

        self.verify(token).map_err(Error::InvalidCredential)
    }
}

pub(crate) async fn authorize(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response<Body>, Error> {
    let session = state.sessions.authenticate(request.headers())?;

    request.extensions_mut().insert(session);

    Ok(next.run(request).await)
}

pub(crate) async fn authorize_admin(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response<Body>, Error> {
    let session = state.sessions.authenticate(request.headers())?;

    // a valid token for an account that no longer exists is still unauthenticated
    let user = state
        .user_controller
        .find(session.user_id)
        .await?
        .ok_or(Error::InvalidCredential(TokenRejection::Malformed))?;

    if !user.is_admin() {
        return Err(Error::Forbidden);
    }

    tracing::debug!(admin = %user.username, "admin access granted");

    request.extensions_mut().insert(session);
    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}
