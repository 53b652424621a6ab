use axum::{extract::State, http::StatusCode, Json};
use bcrypt::{hash, verify, BcryptError};
use common::{Credentials, LoginResponse, RegisterPayload, UserDto};
use rand::RngCore; // Import RngCore for random token generation
use std::borrow::Cow;

use axum::{
    extract::Request,
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{
    authorization::{Bearer, Credentials as AuthScheme},
    Authorization, HeaderMapExt,
};

use validator::{Validate, ValidationError, ValidationErrors};

use crate::config::AuthConfig;
use crate::db::DbPool;
use crate::error::AppError;
use crate::extractors::{AppJson, AuthUser};
use crate::web_server::AppState;

// --- User & Token Structs ---

#[derive(sqlx::FromRow, Debug)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// `Authorization: Token <key>`, the scheme token-auth API clients commonly send.
#[derive(Debug, Clone)]
pub struct TokenKey(pub String);

impl AuthScheme for TokenKey {
    const SCHEME: &'static str = "Token";

    fn decode(value: &HeaderValue) -> Option<Self> {
        let raw = value.to_str().ok()?;
        let key = raw.get(Self::SCHEME.len()..)?.trim();
        if key.is_empty() {
            return None;
        }
        Some(TokenKey(key.to_owned()))
    }

    fn encode(&self) -> HeaderValue {
        HeaderValue::from_str(&format!("{} {}", Self::SCHEME, self.0))
            .unwrap_or_else(|_| HeaderValue::from_static("Token"))
    }
}

/// Pulls the token key out of either a `Bearer` or a `Token` authorization header.
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    if let Some(Authorization(bearer)) = headers.typed_get::<Authorization<Bearer>>() {
        return Some(bearer.token().to_owned());
    }
    headers
        .typed_get::<Authorization<TokenKey>>()
        .map(|Authorization(TokenKey(key))| key)
}

// --- Token Helper ---

/// Returns the user's login token, minting one on first login.
/// Later logins hand back the same key until the user is deleted.
async fn get_or_create_token(
    user_id: i64,
    db_pool: &DbPool,
    auth_config: &AuthConfig,
) -> Result<String, AppError> {
    let mut key_bytes = vec![0u8; auth_config.token_bytes];
    rand::rng().fill_bytes(&mut key_bytes);
    let candidate = hex::encode(key_bytes);

    // A concurrent login may win the insert; either way exactly one key survives.
    sqlx::query(
        "INSERT INTO auth_tokens (key, user_id) VALUES ($1, $2)
         ON CONFLICT (user_id) DO NOTHING",
    )
    .bind(&candidate)
    .bind(user_id)
    .execute(db_pool)
    .await?;

    let key: String = sqlx::query_scalar("SELECT key FROM auth_tokens WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(db_pool)
        .await?;

    Ok(key)
}

/// Checks `password` against the user's stored hash. An unknown user still
/// costs one bcrypt round at `cost`, so response time does not tell
/// existing usernames apart from missing ones.
fn password_matches(user: Option<&User>, password: &str, cost: u32) -> Result<bool, BcryptError> {
    match user {
        Some(user) => verify(password, &user.password_hash),
        None => {
            hash(password, cost)?;
            Ok(false)
        }
    }
}

fn username_taken() -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    errors.add(
        "username",
        ValidationError::new("unique")
            .with_message(Cow::Borrowed("A user with that username already exists.")),
    );
    errors
}

// --- API Handlers ---

/// ## Register a new user
/// Takes username, optional email and password, hashes the password, and stores the user.
#[utoipa::path(
    post,
    path = "/api/accounts/register/",
    tag = "accounts",
    request_body = RegisterPayload,
    responses(
        (status = 201, description = "User created successfully", body = UserDto),
        (status = 400, description = "Invalid data or username already taken"),
    )
)]
pub async fn register(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RegisterPayload>,
) -> Result<(StatusCode, Json<UserDto>), AppError> {
    // Validate the incoming payload
    payload.validate()?;

    tracing::info!("Registering user: {}", &payload.username);
    // Check if user already exists
    let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE username = $1")
        .bind(&payload.username)
        .fetch_optional(&state.db_pool)
        .await?;

    if existing.is_some() {
        return Err(username_taken().into());
    }

    let password_hash = hash(&payload.password, state.app_config.auth.bcrypt_cost)?;
    let email = payload.email.unwrap_or_default();

    let user = sqlx::query_as::<_, UserDto>(
        "INSERT INTO users (username, email, password_hash) VALUES ($1, $2, $3)
         RETURNING id, username, email",
    )
    .bind(&payload.username)
    .bind(&email)
    .bind(&password_hash)
    .fetch_one(&state.db_pool)
    .await
    .map_err(|e| match e {
        // Lost a race with another registration of the same name.
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::from(username_taken())
        }
        other => AppError::from(other),
    })?;

    Ok((StatusCode::CREATED, Json(user)))
}

/// ## Login an existing user
/// Takes username and password, verifies them, and returns the user's token.
#[utoipa::path(
    post,
    path = "/api/accounts/login/",
    tag = "accounts",
    request_body = Credentials,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid Credentials"),
    )
)]
pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<Credentials>,
) -> Result<Json<LoginResponse>, AppError> {
    payload.validate()?;

    tracing::info!("Logging in user: {}", &payload.username);
    let user = sqlx::query_as::<_, User>(
        "SELECT id, username, email, password_hash FROM users WHERE username = $1",
    )
    .bind(&payload.username)
    .fetch_optional(&state.db_pool)
    .await?;

    let cost = state.app_config.auth.bcrypt_cost;
    let matches = password_matches(user.as_ref(), &payload.password, cost)?;
    let user = match user {
        Some(user) if matches => user,
        _ => {
            tracing::warn!("Rejected login for user: {}", &payload.username);
            return Err(AppError::Unauthorized);
        }
    };

    let token = get_or_create_token(user.id, &state.db_pool, &state.app_config.auth).await?;

    Ok(Json(LoginResponse { token }))
}

/// ## Current user's profile
#[utoipa::path(
    get,
    path = "/api/accounts/profile/",
    tag = "accounts",
    security(
        ("token_auth" = [])
    ),
    responses(
        (status = 200, description = "The authenticated user", body = UserDto),
        (status = 401, description = "Invalid token"),
        (status = 403, description = "Authentication credentials were not provided")
    )
)]
pub async fn profile(user: AuthUser) -> Json<UserDto> {
    Json(UserDto {
        id: user.id,
        username: user.username,
        email: user.email,
    })
}

// --- Middleware for Token Authentication ---

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let key = token_from_headers(request.headers()).ok_or(AppError::MissingCredentials)?;

    // Resolve the caller ONCE here; handlers read it back through `AuthUser`.
    let user = sqlx::query_as::<_, UserDto>(
        "SELECT u.id, u.username, u.email
         FROM auth_tokens t JOIN users u ON u.id = t.user_id
         WHERE t.key = $1",
    )
    .bind(&key)
    .fetch_optional(&state.db_pool)
    .await?
    .ok_or_else(|| {
        tracing::warn!("Rejected unknown token");
        AppError::InvalidToken
    })?;

    request.extensions_mut().insert(AuthUser {
        id: user.id,
        username: user.username,
        email: user.email,
    });

    Ok(next.run(request).await)
}
