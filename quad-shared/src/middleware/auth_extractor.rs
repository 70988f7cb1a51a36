use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

use crate::errors::{AppError, ErrorCode};
use crate::types::auth::{AccountRole, AuthUser, Claims};

pub const JWT_SECRET_ENV: &str = "QUAD_JWT_SECRET";
const DEV_SECRET: &str = "development-secret-change-in-production";

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)?;
        let claims = validate_jwt(&token)?;

        if claims.is_expired() {
            return Err(AppError::new(ErrorCode::TokenExpired, "token has expired"));
        }

        Ok(AuthUser::from(claims))
    }
}

fn extract_bearer_token(headers: &HeaderMap) -> Result<String, AppError> {
    let auth_header = headers
        .get("Authorization")
        .ok_or_else(|| AppError::new(ErrorCode::Unauthorized, "missing authorization header"))?
        .to_str()
        .map_err(|_| AppError::new(ErrorCode::Unauthorized, "invalid authorization header"))?;

    auth_header
        .strip_prefix("Bearer ")
        .map(str::to_string)
        .ok_or_else(|| AppError::new(ErrorCode::Unauthorized, "authorization header must use Bearer scheme"))
}

fn jwt_secret() -> String {
    std::env::var(JWT_SECRET_ENV).unwrap_or_else(|_| DEV_SECRET.to_string())
}

fn validate_jwt(token: &str) -> Result<Claims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret().as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
            AppError::new(ErrorCode::TokenExpired, "token has expired")
        }
        _ => AppError::new(ErrorCode::TokenInvalid, format!("invalid token: {e}")),
    })?;

    Ok(token_data.claims)
}

/// Optional auth extractor. Anonymous viewers resolve to `None`.
pub struct OptionalAuthUser(pub Option<AuthUser>);

#[axum::async_trait]
impl<S> FromRequestParts<S> for OptionalAuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if !parts.headers.contains_key("Authorization") {
            return Ok(Self(None));
        }
        // A present but broken token is an error, not an anonymous visit.
        AuthUser::from_request_parts(parts, state).await.map(|user| Self(Some(user)))
    }
}

/// Require the back-office Admin role
pub struct AdminUser(pub AuthUser);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if user.role != AccountRole::Admin {
            return Err(AppError::new(ErrorCode::Forbidden, "admin access required"));
        }
        Ok(Self(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use uuid::Uuid;

    fn token_for(claims: &Claims) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(jwt_secret().as_bytes()),
        )
        .unwrap()
    }

    fn parts_with(header: Option<String>) -> Parts {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = header {
            builder = builder.header("Authorization", value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn bearer_token_resolves_user() {
        let user_id = Uuid::new_v4();
        let claims = Claims::new(user_id, AccountRole::Member, 600);
        let mut parts = parts_with(Some(format!("Bearer {}", token_for(&claims))));

        let user = AuthUser::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(user.id, user_id);
        assert_eq!(user.role, AccountRole::Member);
    }

    #[tokio::test]
    async fn missing_header_is_anonymous_for_optional_extractor() {
        let mut parts = parts_with(None);
        let OptionalAuthUser(user) = OptionalAuthUser::from_request_parts(&mut parts, &()).await.unwrap();
        assert!(user.is_none());
    }

    #[tokio::test]
    async fn non_bearer_scheme_is_rejected() {
        let mut parts = parts_with(Some("Basic abc".into()));
        let err = AuthUser::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::Unauthorized));
    }

    #[tokio::test]
    async fn admin_extractor_requires_admin_role() {
        let claims = Claims::new(Uuid::new_v4(), AccountRole::Member, 600);
        let mut parts = parts_with(Some(format!("Bearer {}", token_for(&claims))));
        let err = AdminUser::from_request_parts(&mut parts, &()).await.err().unwrap();
        assert_eq!(err.code(), Some(ErrorCode::Forbidden));

        let claims = Claims::new(Uuid::new_v4(), AccountRole::Admin, 600);
        let mut parts = parts_with(Some(format!("Bearer {}", token_for(&claims))));
        assert!(AdminUser::from_request_parts(&mut parts, &()).await.is_ok());
    }

    #[tokio::test]
    async fn garbage_token_is_invalid() {
        let mut parts = parts_with(Some("Bearer not-a-jwt".into()));
        let err = AuthUser::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::TokenInvalid));
    }
}
