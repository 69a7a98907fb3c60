use axum::{extract::FromRequestParts, http::header, http::request::Parts};
use jsonwebtoken::{DecodingKey, Validation, decode};
use uuid::Uuid;

use crate::{dto::auth::Claims, error::AppError, models::Owner, state::AppState};

/// Header carrying the anonymous session token of a signed-out shopper.
pub const ANONYMOUS_ID_HEADER: &str = "x-anonymous-id";

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: String,
}

pub fn ensure_role(user: &AuthUser, role: &str) -> Result<(), AppError> {
    if user.role != role {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

pub fn ensure_admin(user: &AuthUser) -> Result<(), AppError> {
    ensure_role(user, "admin")
}

pub fn decode_token(token: &str, secret: &str) -> Result<AuthUser, AppError> {
    let decoded = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::Unauthorized)?;

    let user_id = Uuid::parse_str(&decoded.claims.sub)
        .map_err(|_| AppError::BadRequest("Invalid user id in token".into()))?;

    Ok(AuthUser {
        user_id,
        role: decoded.claims.role,
    })
}

fn bearer_token(parts: &Parts) -> Result<Option<&str>, AppError> {
    let Some(auth_header) = parts.headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    let auth_str = auth_header
        .to_str()
        .map_err(|_| AppError::BadRequest("Invalid Authorization header".into()))?;

    let token = auth_str
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::BadRequest("Invalid Authorization scheme".into()))?;
    Ok(Some(token.trim()))
}

pub fn anonymous_id(parts: &Parts) -> Result<Option<Uuid>, AppError> {
    let Some(value) = parts.headers.get(ANONYMOUS_ID_HEADER) else {
        return Ok(None);
    };
    let id = value
        .to_str()
        .ok()
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
        .ok_or_else(|| AppError::BadRequest("Invalid X-Anonymous-Id header".into()))?;
    Ok(Some(id))
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?
            .ok_or_else(|| AppError::BadRequest("Missing Authorization header".into()))?;
        decode_token(token, &state.config.jwt_secret)
    }
}

/// Resolves the cart owner of a request: a signed-in user when a bearer token
/// is present, otherwise the anonymous session from `X-Anonymous-Id`.
#[derive(Debug, Clone, Copy)]
pub struct CartOwner(pub Owner);

impl FromRequestParts<AppState> for CartOwner {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(token) = bearer_token(parts)? {
            let user = decode_token(token, &state.config.jwt_secret)?;
            return Ok(CartOwner(Owner::User(user.user_id)));
        }
        match anonymous_id(parts)? {
            Some(id) => Ok(CartOwner(Owner::Anonymous(id))),
            None => Err(AppError::BadRequest(
                "Missing Authorization or X-Anonymous-Id header".into(),
            )),
        }
    }
}

/// The anonymous session being handed over at sign-in. Required.
#[derive(Debug, Clone, Copy)]
pub struct AnonymousId(pub Uuid);

impl FromRequestParts<AppState> for AnonymousId {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        anonymous_id(parts)?
            .map(AnonymousId)
            .ok_or_else(|| AppError::BadRequest("Missing X-Anonymous-Id header".into()))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;
    use chrono::{Duration, Utc};
    use jsonwebtoken::{EncodingKey, Header, encode};

    use super::*;

    fn parts_with(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/api/cart");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn decodes_valid_token() {
        let user_id = Uuid::new_v4();
        let claims = Claims {
            sub: user_id.to_string(),
            role: "user".into(),
            exp: (Utc::now() + Duration::hours(1)).timestamp() as usize,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();

        let user = decode_token(&token, "secret").unwrap();
        assert_eq!(user.user_id, user_id);
        assert!(matches!(
            decode_token(&token, "other"),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn reads_anonymous_header() {
        let id = Uuid::new_v4();
        let parts = parts_with(&[(ANONYMOUS_ID_HEADER, &id.to_string())]);
        assert_eq!(anonymous_id(&parts).unwrap(), Some(id));

        let parts = parts_with(&[(ANONYMOUS_ID_HEADER, "nope")]);
        assert!(anonymous_id(&parts).is_err());

        let parts = parts_with(&[]);
        assert_eq!(anonymous_id(&parts).unwrap(), None);
    }

    #[test]
    fn rejects_non_bearer_scheme() {
        let parts = parts_with(&[("authorization", "Basic abc")]);
        assert!(bearer_token(&parts).is_err());
    }
}
