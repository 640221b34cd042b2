//! REST API layer using Axum.
//!
//! Route groups mirror the original service surface:
//! - `/api/auth/*`: registration, login, and the session-protected profile
//!   operations.
//! - `/api/players`: public card listing, with ownership flags for a
//!   signed-in caller (optional authentication).
//! - `/api/collection`: the caller's cards and the purchase endpoint.
//!
//! The session token travels in the `authToken` cookie (HttpOnly,
//! SameSite=Lax) or a `Bearer` Authorization header; the cookie wins when
//! both are present.

use axum::{
    extract::{Path, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post, put},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::{
    extract_token, hash_password, password_meets_policy, verify_password, TokenKeys, TOKEN_COOKIE,
};
use crate::config::Config;
use crate::error::ApiError;
use crate::models::{Identity, OwnedCard, Player, PublicUser};
use crate::storage::{Storage, StoreError};

/// Shared app state for REST handlers (Arc-wrapped for concurrency).
pub struct AppState {
    storage: Storage,
    keys: TokenKeys,
    allow_duplicate_owners: bool,
    starting_balance: Option<Decimal>,
    bcrypt_cost: u32,
    cookie_secure: bool,
}

/// Build the router: public auth/player routes plus two middleware-gated
/// groups (required and optional authentication).
pub fn create_router(storage: Storage, config: &Config) -> Router {
    let state = Arc::new(AppState {
        storage,
        keys: TokenKeys::new(config.jwt_secret.as_bytes(), config.token_ttl_days),
        allow_duplicate_owners: config.allow_duplicate_owners,
        starting_balance: config.starting_balance,
        bcrypt_cost: config.bcrypt_cost,
        cookie_secure: config.cookie_secure,
    });

    let player_routes = Router::new()
        .route("/players", get(list_players_handler))
        .route("/players/:player_id", get(get_player_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            optional_auth_middleware,
        ));

    let session_routes = Router::new()
        .route(
            "/auth/profile",
            get(get_profile_handler).put(update_profile_handler),
        )
        .route("/auth/change-password", put(change_password_handler))
        .route("/auth/logout", post(logout_handler))
        .route("/auth/account", delete(delete_account_handler))
        .route("/users/:user_id/balance", patch(set_balance_handler))
        .route("/collection", get(get_collection_handler))
        .route("/collection/buy", post(buy_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let api = Router::new()
        .route("/auth/register", post(register_handler))
        .route("/auth/login", post(login_handler))
        .merge(player_routes)
        .merge(session_routes);

    Router::new()
        .route("/health", get(health_handler))
        .nest("/api", api)
        .with_state(state)
}

// --- Authentication middleware ---

/// Convert the request's token back into an identity: cookie or bearer
/// header, signature + expiry, and the subject must still exist (account
/// deletion revokes implicitly). The response reason stays opaque; the
/// concrete cause goes to the debug log.
fn resolve_identity(state: &AppState, headers: &HeaderMap) -> Result<Identity, ApiError> {
    let token = extract_token(headers)
        .ok_or_else(|| ApiError::Unauthorized("No authentication token provided".to_string()))?;
    let claims = state.keys.verify(&token).map_err(|err| {
        tracing::debug!(error = %err, "session token failed verification");
        ApiError::Unauthorized("Invalid or expired token".to_string())
    })?;
    let user = state.storage.get_user(&claims.sub)?.ok_or_else(|| {
        tracing::debug!(user = %claims.sub, "session token references a deleted user");
        ApiError::Unauthorized("Invalid or expired token".to_string())
    })?;
    Ok(Identity {
        id: user.id,
        email: user.email,
        name: user.name,
    })
}

async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = resolve_identity(&state, req.headers())?;
    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

/// Same extraction and verification, but verification errors silently yield
/// an anonymous request instead of rejecting it.
async fn optional_auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    match resolve_identity(&state, req.headers()) {
        Ok(identity) => {
            req.extensions_mut().insert(identity);
        }
        Err(err) => {
            tracing::debug!(error = %err, "request continues anonymously");
        }
    }
    next.run(req).await
}

// --- Session cookie plumbing ---

fn session_cookie(state: &AppState, token: &str) -> String {
    let mut cookie = format!(
        "{TOKEN_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        state.keys.ttl_seconds()
    );
    if state.cookie_secure {
        cookie.push_str("; Secure");
    }
    cookie
}

fn cleared_cookie(state: &AppState) -> String {
    let mut cookie = format!("{TOKEN_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if state.cookie_secure {
        cookie.push_str("; Secure");
    }
    cookie
}

fn with_cookie<T: Serialize>(
    status: StatusCode,
    body: T,
    cookie: &str,
) -> Result<Response, ApiError> {
    let mut response = (status, Json(body)).into_response();
    let value = HeaderValue::from_str(cookie)
        .map_err(|e| ApiError::Internal(format!("invalid cookie header: {e}")))?;
    response.headers_mut().append(header::SET_COOKIE, value);
    Ok(response)
}

// --- Request/response DTOs ---

#[derive(Deserialize)]
pub struct RegisterBody {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginBody {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct AuthData {
    pub user: PublicUser,
    pub token: String,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub message: String,
    pub data: AuthData,
}

#[derive(Serialize)]
pub struct ApiMessage {
    pub message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileData {
    #[serde(flatten)]
    pub user: PublicUser,
    pub collection_count: usize,
}

#[derive(Serialize)]
pub struct ProfileResponse {
    pub message: String,
    pub data: ProfileData,
}

#[derive(Serialize)]
pub struct UserResponse {
    pub message: String,
    pub data: PublicUser,
}

#[derive(Deserialize)]
pub struct UpdateProfileBody {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordBody {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Deserialize)]
pub struct BalanceBody {
    pub balance: Decimal,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyBody {
    pub player_id: String,
    /// Legacy field: older clients sent the buyer id in the body. It is only
    /// accepted when it matches the authenticated session.
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Player card plus an ownership flag for signed-in callers; anonymous
/// listings omit the flag entirely.
#[derive(Serialize)]
pub struct PlayerListing {
    #[serde(flatten)]
    pub player: Player,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owned: Option<bool>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub version: &'static str,
}

// --- Validation helpers ---

fn is_valid_email(email: &str) -> bool {
    if email.len() > 254 || email.contains(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

fn validate_name(name: &str) -> Result<String, ApiError> {
    let name = name.trim();
    if name.is_empty() || name.len() > 100 {
        return Err(ApiError::Validation(
            "Name must be between 1 and 100 characters".to_string(),
        ));
    }
    Ok(name.to_string())
}

fn validate_email(email: &str) -> Result<String, ApiError> {
    if !is_valid_email(email) {
        return Err(ApiError::Validation(
            "A valid email address is required".to_string(),
        ));
    }
    Ok(email.to_string())
}

fn validate_password(password: &str) -> Result<(), ApiError> {
    if !password_meets_policy(password) {
        return Err(ApiError::Validation(
            "Password must be at least 8 characters and contain a letter and a digit".to_string(),
        ));
    }
    Ok(())
}

// --- Handlers ---

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK",
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn register_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterBody>,
) -> Result<Response, ApiError> {
    let name = validate_name(&body.name)?;
    let email = validate_email(&body.email)?;
    validate_password(&body.password)?;

    let password_hash = hash_password(body.password, state.bcrypt_cost).await?;
    let user = state
        .storage
        .create_user(&name, &email, &password_hash, state.starting_balance)?;
    let token = state.keys.issue(&user.id, &user.email)?;

    tracing::info!(email = %user.email, "user registered");
    with_cookie(
        StatusCode::CREATED,
        AuthResponse {
            message: "User registered successfully".to_string(),
            data: AuthData {
                user: PublicUser::from(&user),
                token: token.clone(),
            },
        },
        &session_cookie(&state, &token),
    )
}

async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginBody>,
) -> Result<Response, ApiError> {
    // One message for "no such user" and "wrong password": the response must
    // not reveal which half of the credentials failed.
    let invalid = || ApiError::Unauthorized("Invalid email or password".to_string());

    let user = state
        .storage
        .find_user_by_email(&body.email)?
        .ok_or_else(invalid)?;
    if !verify_password(body.password, user.password_hash.clone()).await? {
        return Err(invalid());
    }
    let token = state.keys.issue(&user.id, &user.email)?;

    tracing::info!(email = %user.email, "user logged in");
    with_cookie(
        StatusCode::OK,
        AuthResponse {
            message: "Login successful".to_string(),
            data: AuthData {
                user: PublicUser::from(&user),
                token: token.clone(),
            },
        },
        &session_cookie(&state, &token),
    )
}

async fn get_profile_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let user = state
        .storage
        .get_user(&identity.id)?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    let collection_count = state.storage.owned_count(&identity.id)?;
    Ok(Json(ProfileResponse {
        message: "Profile retrieved successfully".to_string(),
        data: ProfileData {
            user: PublicUser::from(&user),
            collection_count,
        },
    }))
}

async fn update_profile_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<UpdateProfileBody>,
) -> Result<Json<UserResponse>, ApiError> {
    let name = body.name.as_deref().map(validate_name).transpose()?;
    let email = body.email.as_deref().map(validate_email).transpose()?;

    let user = state
        .storage
        .update_profile(&identity.id, name.as_deref(), email.as_deref())
        .map_err(|err| match err {
            StoreError::EmailTaken => ApiError::Conflict("Email is already taken".to_string()),
            other => other.into(),
        })?;

    tracing::info!(user = %identity.id, "profile updated");
    Ok(Json(UserResponse {
        message: "Profile updated successfully".to_string(),
        data: PublicUser::from(&user),
    }))
}

async fn change_password_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<ChangePasswordBody>,
) -> Result<Json<ApiMessage>, ApiError> {
    let user = state
        .storage
        .get_user(&identity.id)?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    if !verify_password(body.current_password, user.password_hash.clone()).await? {
        return Err(ApiError::Unauthorized(
            "Current password is incorrect".to_string(),
        ));
    }
    validate_password(&body.new_password)?;

    let password_hash = hash_password(body.new_password, state.bcrypt_cost).await?;
    state.storage.update_password(&identity.id, &password_hash)?;

    tracing::info!(user = %identity.id, "password changed");
    Ok(Json(ApiMessage {
        message: "Password changed successfully".to_string(),
    }))
}

async fn logout_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Response, ApiError> {
    // Logout only clears the client cookie. The token itself stays valid
    // until expiry; there is no server-side revocation list.
    tracing::info!(user = %identity.id, "user logged out");
    with_cookie(
        StatusCode::OK,
        ApiMessage {
            message: "Logged out successfully".to_string(),
        },
        &cleared_cookie(&state),
    )
}

async fn delete_account_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<ApiMessage>, ApiError> {
    state.storage.delete_user(&identity.id)?;
    tracing::info!(user = %identity.id, "account deleted");
    Ok(Json(ApiMessage {
        message: "Account deleted successfully".to_string(),
    }))
}

async fn set_balance_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(body): Json<BalanceBody>,
) -> Result<Json<UserResponse>, ApiError> {
    if body.balance < Decimal::ZERO {
        return Err(ApiError::Validation(
            "Balance must be non-negative".to_string(),
        ));
    }
    let user = state.storage.set_balance(&user_id, body.balance)?;
    tracing::info!(user = %user_id, balance = %body.balance, "balance adjusted");
    Ok(Json(UserResponse {
        message: "Balance updated successfully".to_string(),
        data: PublicUser::from(&user),
    }))
}

async fn list_players_handler(
    State(state): State<Arc<AppState>>,
    identity: Option<Extension<Identity>>,
) -> Result<Json<Vec<PlayerListing>>, ApiError> {
    let players = state.storage.list_players()?;
    let mut listings = Vec::with_capacity(players.len());
    for player in players {
        let owned = match &identity {
            Some(Extension(identity)) => Some(state.storage.owns(&identity.id, &player.id)?),
            None => None,
        };
        listings.push(PlayerListing { player, owned });
    }
    Ok(Json(listings))
}

async fn get_player_handler(
    State(state): State<Arc<AppState>>,
    Path(player_id): Path<String>,
    identity: Option<Extension<Identity>>,
) -> Result<Json<PlayerListing>, ApiError> {
    let player = state
        .storage
        .get_player(&player_id)?
        .ok_or_else(|| ApiError::NotFound("Player not found".to_string()))?;
    let owned = match &identity {
        Some(Extension(identity)) => Some(state.storage.owns(&identity.id, &player.id)?),
        None => None,
    };
    Ok(Json(PlayerListing { player, owned }))
}

async fn get_collection_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<OwnedCard>>, ApiError> {
    Ok(Json(state.storage.collection_for(&identity.id)?))
}

async fn buy_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<BuyBody>,
) -> Result<Json<ApiMessage>, ApiError> {
    // The buyer is always the session user; a caller-supplied id is only
    // tolerated when it agrees with the session.
    if let Some(user_id) = &body.user_id {
        if user_id != &identity.id {
            return Err(ApiError::BadRequest(
                "userId does not match the authenticated user".to_string(),
            ));
        }
    }

    let record = state
        .storage
        .buy_player(&identity.id, &body.player_id, state.allow_duplicate_owners)?;
    tracing::info!(
        user = %identity.id,
        player = %body.player_id,
        record = %record.id,
        "player purchased"
    );
    Ok(Json(ApiMessage {
        message: "Player purchased and added to collection".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewPlayer, Position};
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use std::fs;
    use tower::ServiceExt; // for .oneshot() testing

    fn dec(s: &str) -> Decimal {
        s.parse().expect("decimal literal")
    }

    fn test_config(starting_balance: Option<Decimal>, allow_duplicates: bool) -> Config {
        Config {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            data_dir: String::new(),
            jwt_secret: "test-secret".to_string(),
            token_ttl_days: 7,
            bcrypt_cost: 4, // keep bcrypt fast in tests
            allow_duplicate_owners: allow_duplicates,
            starting_balance,
            cookie_secure: false,
        }
    }

    fn test_app(
        name: &str,
        starting_balance: Option<Decimal>,
    ) -> (Router, Storage, std::path::PathBuf) {
        let dir = std::env::temp_dir().join(name);
        let _ = fs::remove_dir_all(&dir);
        let storage = Storage::open(dir.to_str().unwrap()).expect("open storage");
        let app = create_router(storage.clone(), &test_config(starting_balance, true));
        (app, storage, dir)
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn bearer_request(method: &str, uri: &str, token: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    async fn register(app: &Router, name: &str, email: &str) -> (String, String) {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/auth/register",
                json!({"name": name, "email": email, "password": "hunter2abc1"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        (
            body["data"]["user"]["id"].as_str().unwrap().to_string(),
            body["data"]["token"].as_str().unwrap().to_string(),
        )
    }

    fn seed_player(storage: &Storage, name: &str, price: &str) -> Player {
        storage
            .create_player(NewPlayer {
                name: name.to_string(),
                team: "Hammarby".to_string(),
                position: Position::Midfielder,
                price: dec(price),
                description: None,
                image_url: None,
                stats: None,
            })
            .expect("seed player")
    }

    #[tokio::test]
    async fn register_sets_session_cookie_and_rejects_duplicates() {
        let (app, _storage, dir) = test_app("cardmarket_rest_register", None);

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/auth/register",
                json!({"name": "Maja", "email": "maja@example.com", "password": "hunter2abc1"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .expect("session cookie")
            .to_str()
            .unwrap()
            .to_string();
        assert!(cookie.starts_with("authToken="));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        let body = body_json(response).await;
        assert!(body["data"]["token"].is_string());
        assert!(body["data"]["user"]["passwordHash"].is_null());

        // Same email again: conflict, first account untouched.
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/auth/register",
                json!({"name": "Majken", "email": "maja@example.com", "password": "hunter2abc1"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "CONFLICT");

        let _ = fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn login_failures_are_indistinguishable() {
        let (app, _storage, dir) = test_app("cardmarket_rest_login", None);
        register(&app, "Nils", "nils@example.com").await;

        let wrong_password = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/auth/login",
                json!({"email": "nils@example.com", "password": "wrongpass1"}),
            ))
            .await
            .unwrap();
        let unknown_email = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/auth/login",
                json!({"email": "ghost@example.com", "password": "wrongpass1"}),
            ))
            .await
            .unwrap();

        assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(unknown_email.status(), StatusCode::UNAUTHORIZED);
        let a = body_json(wrong_password).await;
        let b = body_json(unknown_email).await;
        assert_eq!(a["error"]["message"], b["error"]["message"]);
        assert_eq!(a["error"]["message"], "Invalid email or password");

        let _ = fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn token_works_until_the_account_is_deleted() {
        let (app, _storage, dir) = test_app("cardmarket_rest_revoke", None);
        let (_, token) = register(&app, "Ola", "ola@example.com").await;

        let response = app
            .clone()
            .oneshot(bearer_request("GET", "/api/auth/profile", &token))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(bearer_request("DELETE", "/api/auth/account", &token))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // The token is still within its lifetime but its subject is gone.
        let response = app
            .clone()
            .oneshot(bearer_request("GET", "/api/auth/profile", &token))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let _ = fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn wrongly_signed_token_is_unauthorized() {
        let (app, _storage, dir) = test_app("cardmarket_rest_badsig", None);
        register(&app, "Per", "per@example.com").await;

        // Syntactically valid JWT signed with a different secret.
        let forged = TokenKeys::new(b"some-other-secret", 7)
            .issue("any-user", "per@example.com")
            .unwrap();
        let response = app
            .clone()
            .oneshot(bearer_request("GET", "/api/auth/profile", &forged))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");

        let _ = fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn buy_flow_debits_balance_and_fills_the_collection() {
        let (app, storage, dir) = test_app("cardmarket_rest_buy", Some(dec("10.0")));
        let player = seed_player(&storage, "Ayari", "4.5");
        let (_, token) = register(&app, "Rut", "rut@example.com").await;

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/collection/buy")
                    .header("content-type", "application/json")
                    .header("authorization", format!("Bearer {token}"))
                    .body(Body::from(json!({"playerId": player.id}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Player purchased and added to collection");

        let response = app
            .clone()
            .oneshot(bearer_request("GET", "/api/auth/profile", &token))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["data"]["balance"], json!(5.5));
        assert_eq!(body["data"]["collectionCount"], json!(1));

        let response = app
            .clone()
            .oneshot(bearer_request("GET", "/api/collection", &token))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["player"]["id"], json!(player.id));

        let _ = fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn buy_failures_map_to_the_right_status_codes() {
        let (app, storage, dir) = test_app("cardmarket_rest_buy_err", Some(dec("3.0")));
        let player = seed_player(&storage, "Nanasi", "4.5");
        let (user_id, token) = register(&app, "Siv", "siv@example.com").await;

        // Unknown player: 404 with the shared not-found message.
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/collection/buy")
                    .header("content-type", "application/json")
                    .header("authorization", format!("Bearer {token}"))
                    .body(Body::from(json!({"playerId": "no-such-card"}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["error"]["message"], "User or player not found");

        // Affordable check: 3.0 < 4.5.
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/collection/buy")
                    .header("content-type", "application/json")
                    .header("authorization", format!("Bearer {token}"))
                    .body(Body::from(json!({"playerId": player.id}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["message"], "Insufficient balance");

        // Body identity that contradicts the session is rejected outright.
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/collection/buy")
                    .header("content-type", "application/json")
                    .header("authorization", format!("Bearer {token}"))
                    .body(Body::from(
                        json!({"playerId": player.id, "userId": "someone-else"}).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // Balance and collection are untouched after all three failures.
        let user = storage.get_user(&user_id).unwrap().unwrap();
        assert_eq!(user.balance, Some(dec("3.0")));
        assert_eq!(storage.owned_count(&user_id).unwrap(), 0);

        let _ = fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn anonymous_and_signed_in_player_listings_differ() {
        let (app, storage, dir) = test_app("cardmarket_rest_listing", Some(dec("10.0")));
        let player = seed_player(&storage, "Claesson", "2.0");
        let (user_id, token) = register(&app, "Tuva", "tuva@example.com").await;
        storage.buy_player(&user_id, &player.id, true).unwrap();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/players")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(body[0].get("owned").is_none(), "anonymous listing: {body}");

        let response = app
            .clone()
            .oneshot(bearer_request("GET", "/api/players", &token))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body[0]["owned"], json!(true));

        // A garbage token degrades to anonymous instead of failing.
        let response = app
            .clone()
            .oneshot(bearer_request("GET", "/api/players", "not-a-jwt"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let _ = fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn profile_update_and_password_change_round_trip() {
        let (app, _storage, dir) = test_app("cardmarket_rest_profile", None);
        let (_, token) = register(&app, "Ulla", "ulla@example.com").await;
        register(&app, "Vera", "vera@example.com").await;

        // Taking another user's email is a conflict.
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/api/auth/profile")
                    .header("content-type", "application/json")
                    .header("authorization", format!("Bearer {token}"))
                    .body(Body::from(json!({"email": "vera@example.com"}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        assert_eq!(body["error"]["message"], "Email is already taken");

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/api/auth/change-password")
                    .header("content-type", "application/json")
                    .header("authorization", format!("Bearer {token}"))
                    .body(Body::from(
                        json!({"currentPassword": "hunter2abc1", "newPassword": "brandnew99"})
                            .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Old password no longer logs in; the new one does.
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/auth/login",
                json!({"email": "ulla@example.com", "password": "hunter2abc1"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/auth/login",
                json!({"email": "ulla@example.com", "password": "brandnew99"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let _ = fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn logout_clears_the_cookie() {
        let (app, _storage, dir) = test_app("cardmarket_rest_logout", None);
        let (_, token) = register(&app, "Wilma", "wilma@example.com").await;

        let response = app
            .clone()
            .oneshot(bearer_request("POST", "/api/auth/logout", &token))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(cookie.starts_with("authToken=;"));
        assert!(cookie.contains("Max-Age=0"));

        let _ = fs::remove_dir_all(dir);
    }
}
