use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::{AppState, MessageResponse};
use crate::auth::Auth;
use crate::error::ApiError;
use crate::models::{Id, Notification, NotificationView, Reaction};

const MAX_REACTION_LEN: usize = 32;

#[derive(Debug, Deserialize, IntoParams)]
pub struct NotificationQuery {
    /// Optional; when present it must be the caller's id.
    pub user_id: Option<Id>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UnreadCount {
    pub count: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MarkedRead {
    pub updated: u64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReactionBody {
    /// Free-form reaction such as `like`, `dislike` or an emoji.
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[utoipa::path(
    get,
    path = "/notifications",
    params(NotificationQuery),
    responses(
        (status = 200, description = "Caller's notifications, newest first", body = [NotificationView]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "user_id names someone else")
    )
)]
pub async fn list_notifications(
    auth: Auth,
    data: web::Data<AppState>,
    query: web::Query<NotificationQuery>,
) -> Result<HttpResponse, ApiError> {
    let user_id = auth.ensure_self(query.user_id)?;
    let items = data.repo.list_notifications(user_id).await?;
    Ok(HttpResponse::Ok().json(items))
}

#[utoipa::path(
    get,
    path = "/notifications/unread-count",
    responses(
        (status = 200, description = "Unread notifications", body = UnreadCount),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn unread_count(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let count = data.repo.unread_count(auth.user_id()).await?;
    Ok(HttpResponse::Ok().json(UnreadCount { count }))
}

#[utoipa::path(
    post,
    path = "/notifications/{id}/read",
    params(("id" = Id, Path, description = "Notification id")),
    responses(
        (status = 200, description = "Marked read", body = Notification),
        (status = 404, description = "No such notification for the caller")
    )
)]
pub async fn mark_read(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let n = data.repo.mark_read(auth.user_id(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(n))
}

#[utoipa::path(
    post,
    path = "/notifications/read-all",
    responses(
        (status = 200, description = "Number of notifications marked read", body = MarkedRead),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn mark_all_read(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let updated = data.repo.mark_all_read(auth.user_id()).await?;
    tracing::debug!(user_id = auth.user_id(), updated, "notifications marked read");
    Ok(HttpResponse::Ok().json(MarkedRead { updated }))
}

#[utoipa::path(
    post,
    path = "/notifications/{id}/reaction",
    params(("id" = Id, Path, description = "Notification id")),
    request_body = ReactionBody,
    responses(
        (status = 200, description = "Reaction stored", body = MessageResponse),
        (status = 400, description = "Missing or oversized reaction type"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "No such notification for the caller")
    )
)]
pub async fn react(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    body: web::Json<ReactionBody>,
) -> Result<HttpResponse, ApiError> {
    let kind = body.into_inner().kind.trim().to_string();
    if kind.is_empty() || kind.chars().count() > MAX_REACTION_LEN {
        return Err(ApiError::bad_request(format!("type must be 1 to {MAX_REACTION_LEN} characters")));
    }
    let reaction = data.repo.react(auth.user_id(), path.into_inner(), kind).await?;
    tracing::info!(notification_id = reaction.notification_id, user_id = reaction.user_id, kind = %reaction.kind, "notification reaction");
    Ok(HttpResponse::Ok().json(MessageResponse::new("reaction added successfully")))
}

#[utoipa::path(
    get,
    path = "/notifications/{id}/reactions",
    params(("id" = Id, Path, description = "Notification id")),
    responses(
        (status = 200, description = "Reactions, oldest first", body = [Reaction]),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "No such notification for the caller")
    )
)]
pub async fn list_reactions(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let items = data.repo.list_reactions(auth.user_id(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(items))
}
