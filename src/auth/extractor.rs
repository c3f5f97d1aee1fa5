/// Request extractor for the authenticated user
///
/// The access token is read from the `Authentication` cookie, falling back to an
/// `Authorization: Bearer` header for non-browser clients.

use crate::auth::tokens::{TokenService, ACCESS_COOKIE};
use crate::error::AppError;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
};
use std::sync::Arc;

/// Identity attached to a request by a valid access token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
}

impl<S> FromRequestParts<S> for AuthUser
where
    Arc<TokenService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let tokens = Arc::<TokenService>::from_ref(state);

        let token = cookie_value(&parts.headers, ACCESS_COOKIE)
            .or_else(|| bearer_token(&parts.headers))
            .ok_or_else(|| AppError::Unauthenticated("Missing access token".to_string()))?;

        let claims = tokens.verify_access_token(&token)?;
        Ok(AuthUser {
            id: claims.sub,
            email: claims.email,
        })
    }
}

/// Value of a named cookie across all `Cookie` headers
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn finds_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("theme=dark; Authentication=abc"));
        headers.append(header::COOKIE, HeaderValue::from_static("Refresh=def"));

        assert_eq!(cookie_value(&headers, "Authentication").as_deref(), Some("abc"));
        assert_eq!(cookie_value(&headers, "Refresh").as_deref(), Some("def"));
        assert_eq!(cookie_value(&headers, "Missing"), None);
    }

    #[test]
    fn empty_cookies_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("Authentication="));
        assert_eq!(cookie_value(&headers, "Authentication"), None);
    }

    #[test]
    fn reads_bearer_tokens() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer xyz"));
        assert_eq!(bearer_token(&headers).as_deref(), Some("xyz"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic xyz"));
        assert_eq!(bearer_token(&headers), None);
    }
}
