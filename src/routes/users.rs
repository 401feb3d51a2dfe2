use actix_multipart::Multipart;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::form::{discard, store_files, MultipartForm};
use super::{enforce_rate, AppState};
use crate::auth::{hash_password, verify_password, Auth, JwtKeys};
use crate::error::ApiError;
use crate::models::{Id, NewUser, PublicUser, UpdateProfile, User};
use crate::rate_limit::RateLimiterFacade;
use crate::storage::{public_url, AVATARS};

const MIN_PASSWORD_LEN: usize = 8;
const MAX_USERNAME_LEN: usize = 32;

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RegisterResponse {
    pub token: String,
    pub message: String,
    pub user: PublicUser,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[serde(alias = "email")]
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginUser {
    pub id: Id,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub user: LoginUser,
}

fn issue_token(keys: &JwtKeys, user: &User) -> Result<String, ApiError> {
    keys.issue(user).map_err(|e| {
        tracing::error!(user_id = user.id, "jwt encode failed: {e}");
        ApiError::Internal
    })
}

fn normalize_email(raw: &str) -> Result<String, ApiError> {
    let email = raw.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(ApiError::bad_request("a valid email is required")),
    }
}

/// Usernames share the login field with emails, so they never contain `@`.
fn is_username_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

fn validate_username(raw: &str) -> Result<String, ApiError> {
    let name = raw.trim();
    if name.chars().count() > MAX_USERNAME_LEN || !name.chars().all(is_username_char) {
        return Err(ApiError::bad_request(format!(
            "username must be at most {MAX_USERNAME_LEN} letters, digits, '.', '-' or '_'"
        )));
    }
    Ok(name.to_string())
}

/// Username seed from the email's local part.
fn username_seed(email: &str) -> String {
    let local = email.split('@').next().unwrap_or_default();
    let seed: String = local.chars().filter(|c| is_username_char(*c)).take(MAX_USERNAME_LEN - 4).collect();
    if seed.is_empty() { "user".to_string() } else { seed }
}

async fn derive_username(data: &AppState, email: &str) -> Result<String, ApiError> {
    let seed = username_seed(email);
    let mut n = 0u32;
    loop {
        let candidate = if n == 0 { seed.clone() } else { format!("{seed}{n}") };
        if !data.repo.username_taken(&candidate).await? {
            return Ok(candidate);
        }
        n += 1;
    }
}

#[utoipa::path(
    post,
    path = "/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User created", body = RegisterResponse),
        (status = 400, description = "Missing or invalid fields"),
        (status = 409, description = "Email or username taken"),
        (status = 429, description = "Rate limited")
    )
)]
pub async fn register(
    req: HttpRequest,
    data: web::Data<AppState>,
    keys: web::Data<JwtKeys>,
    payload: web::Json<RegisterRequest>,
) -> Result<HttpResponse, ApiError> {
    enforce_rate(&data, &req, RateLimiterFacade::allow_auth)?;
    let body = payload.into_inner();
    if body.email.trim().is_empty() || body.password.is_empty() {
        return Err(ApiError::bad_request("email and password are required"));
    }
    let email = normalize_email(&body.email)?;
    if body.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!("password must be at least {MIN_PASSWORD_LEN} characters")));
    }
    let username = match body.username.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
        Some(u) => validate_username(u)?,
        None => derive_username(&data, &email).await?,
    };
    let password_hash = hash_password(&body.password).map_err(|e| {
        tracing::error!("password hashing failed: {e}");
        ApiError::Internal
    })?;
    let user = data.repo.create_user(NewUser { username, email, password_hash }).await?;
    let token = issue_token(&keys, &user)?;
    tracing::info!(user_id = user.id, username = %user.username, "user registered");
    Ok(HttpResponse::Created().json(RegisterResponse {
        token,
        message: "registered successfully".into(),
        user: user.into(),
    }))
}

#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token issued", body = LoginResponse),
        (status = 401, description = "Bad credentials"),
        (status = 429, description = "Rate limited")
    )
)]
pub async fn login(
    req: HttpRequest,
    data: web::Data<AppState>,
    keys: web::Data<JwtKeys>,
    payload: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    enforce_rate(&data, &req, RateLimiterFacade::allow_auth)?;
    let body = payload.into_inner();
    let user = match data.repo.find_user_by_login(body.username.trim()).await {
        Ok(u) => u,
        Err(crate::repo::RepoError::NotFound) => return Err(ApiError::Unauthorized),
        Err(e) => return Err(e.into()),
    };
    if !user.is_active || !verify_password(&user.password_hash, &body.password) {
        tracing::info!(login = %body.username, "failed login");
        return Err(ApiError::Unauthorized);
    }
    let token = issue_token(&keys, &user)?;
    Ok(HttpResponse::Ok().json(LoginResponse { token, user: LoginUser { id: user.id, name: user.username } }))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Current user", body = PublicUser),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn me(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let user = data.repo.get_user(auth.user_id()).await?;
    Ok(HttpResponse::Ok().json(PublicUser::from(user)))
}

#[utoipa::path(
    get,
    path = "/users/{id}",
    params(("id" = Id, Path, description = "User id")),
    responses(
        (status = 200, description = "Public profile", body = PublicUser),
        (status = 404, description = "No such user")
    )
)]
pub async fn get_user(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let user = data.repo.get_user(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(PublicUser::from(user)))
}

/// Multipart profile update; only the profile owner may call it.
#[utoipa::path(
    put,
    path = "/users/{id}",
    params(("id" = Id, Path, description = "User id")),
    responses(
        (status = 200, description = "Updated profile", body = PublicUser),
        (status = 403, description = "Not your profile"),
        (status = 409, description = "Email taken"),
        (status = 413, description = "Payload too large")
    )
)]
pub async fn update_user(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    if id != auth.user_id() {
        return Err(ApiError::Forbidden);
    }
    let form = MultipartForm::read(payload, data.max_upload_bytes).await?;
    let email = form.non_blank("email").map(|e| normalize_email(&e)).transpose()?;
    let stored = store_files(data.media.as_ref(), AVATARS, form.files_named("avatar").take(1)).await?;
    let upd = UpdateProfile {
        first_name: form.text("first_name").map(|v| v.trim().to_string()),
        last_name: form.text("last_name").map(|v| v.trim().to_string()),
        bio: form.text("bio").map(str::to_string),
        website: form.text("website").map(|v| v.trim().to_string()),
        email,
        avatar: stored.first().map(|k| public_url(k)),
    };
    match data.repo.update_profile(id, upd).await {
        Ok(user) => {
            tracing::info!(user_id = id, "profile updated");
            Ok(HttpResponse::Ok().json(PublicUser::from(user)))
        }
        Err(e) => {
            discard(data.media.as_ref(), &stored).await;
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_seed_uses_local_part() {
        assert_eq!(username_seed("alice@example.com"), "alice");
        assert_eq!(username_seed("a+b@example.com"), "ab");
        assert_eq!(username_seed("++@example.com"), "user");
    }

    #[test]
    fn usernames_cannot_look_like_emails() {
        assert_eq!(validate_username(" sam_1.x-y ").unwrap(), "sam_1.x-y");
        assert!(validate_username("victim@example.com").is_err());
        assert!(validate_username("two words").is_err());
        assert!(validate_username(&"a".repeat(MAX_USERNAME_LEN + 1)).is_err());
    }

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email("  Bob@Example.COM ").unwrap(), "bob@example.com");
        assert!(normalize_email("nobody").is_err());
        assert!(normalize_email("@example.com").is_err());
    }
}
