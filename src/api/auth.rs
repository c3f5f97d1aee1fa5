/// Account endpoints: register, login, token refresh, logout and the current user
///
/// Successful sign-ins answer with the user and two `Set-Cookie` headers carrying the
/// access and refresh tokens.

use crate::{
    api::AppState,
    auth::{extractor::cookie_value, AuthUser, REFRESH_COOKIE},
    error::{AppError, AppResult},
    users::{password, User},
};
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{AppendHeaders, IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Deserialize;

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub name: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub fn create_auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route("/users/me", get(me))
}

/// Create an account with its starting credit balance
///
/// POST /auth/register
/// Body: { "email": "...", "name": "...", "password": "..." }
async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<impl IntoResponse> {
    let email = payload.email.trim();
    if !email.contains('@') {
        return Err(AppError::InvalidArgument("A valid email is required".to_string()));
    }
    if payload.name.trim().is_empty() {
        return Err(AppError::InvalidArgument("Name is required".to_string()));
    }
    if payload.password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::InvalidArgument(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    if state.users.find_by_email(email).await?.is_some() {
        return Err(AppError::AlreadyExists(format!("User {} already exists", email)));
    }

    let password_hash = password::hash_password(&payload.password, state.config.auth.password_rounds);
    let user = state
        .users
        .create_user(email, payload.name.trim(), &password_hash)
        .await
        .map_err(|e| AppError::from(e).on_conflict(format!("User {} already exists", email)))?;
    state
        .balances
        .open_account(&user.id, state.config.billing.initial_credits)
        .await?;

    sign_in(&state, user, StatusCode::CREATED).await
}

/// Exchange credentials for auth cookies
///
/// POST /auth/login
async fn login(State(state): State<AppState>, Json(payload): Json<LoginRequest>) -> AppResult<impl IntoResponse> {
    let invalid = || AppError::Unauthenticated("Invalid email or password".to_string());

    let credentials = state.users.find_by_email(&payload.email).await?.ok_or_else(invalid)?;
    if !password::verify_password(&payload.password, &credentials.password_hash) {
        return Err(invalid());
    }

    tracing::info!("🔑 User {} logged in", credentials.user.id);
    sign_in(&state, credentials.user, StatusCode::OK).await
}

/// Rotate both tokens using the `Refresh` cookie
///
/// POST /auth/refresh
async fn refresh(State(state): State<AppState>, headers: HeaderMap) -> AppResult<impl IntoResponse> {
    let token = cookie_value(&headers, REFRESH_COOKIE)
        .ok_or_else(|| AppError::Unauthenticated("Missing refresh token".to_string()))?;
    let claims = state.tokens.verify_refresh_token(&token)?;

    let credentials = state
        .users
        .get_credentials(&claims.sub)
        .await?
        .ok_or_else(|| AppError::Unauthenticated("Unknown user".to_string()))?;

    // Only the most recently issued refresh token is accepted
    let current = credentials
        .refresh_token_hash
        .as_deref()
        .is_some_and(|stored| password::verify_token(&token, stored));
    if !current {
        return Err(AppError::Unauthenticated("Refresh token has been revoked".to_string()));
    }

    sign_in(&state, credentials.user, StatusCode::OK).await
}

/// Forget the refresh token and expire both cookies
///
/// POST /auth/logout
async fn logout(State(state): State<AppState>, user: AuthUser) -> AppResult<impl IntoResponse> {
    state.users.set_refresh_token_hash(&user.id, None).await?;
    tracing::info!("👋 User {} logged out", user.id);

    let [access, refresh] = state.tokens.cleared_cookies();
    Ok((
        StatusCode::NO_CONTENT,
        AppendHeaders([(header::SET_COOKIE, access), (header::SET_COOKIE, refresh)]),
    ))
}

/// GET /users/me
async fn me(State(state): State<AppState>, user: AuthUser) -> AppResult<Json<User>> {
    state
        .users
        .get_user(&user.id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user.id)))
}

/// Issue a fresh token pair, persist the refresh digest and build the response
async fn sign_in(state: &AppState, user: User, status: StatusCode) -> AppResult<impl IntoResponse> {
    let access = state.tokens.issue_access_token(&user)?;
    let refresh = state.tokens.issue_refresh_token(&user)?;
    state
        .users
        .set_refresh_token_hash(&user.id, Some(&password::hash_token(&refresh)))
        .await?;

    Ok((
        status,
        AppendHeaders([
            (header::SET_COOKIE, state.tokens.access_cookie(&access)),
            (header::SET_COOKIE, state.tokens.refresh_cookie(&refresh)),
        ]),
        Json(user),
    ))
}
