use actix_web::{web, HttpResponse};

use super::{AppState, MessageResponse};
use crate::auth::Auth;
use crate::error::ApiError;
use crate::models::{Id, LikeSummary, LikeTarget};
use crate::telemetry;

async fn like(auth: Auth, data: web::Data<AppState>, target: LikeTarget) -> Result<HttpResponse, ApiError> {
    data.repo.like(auth.user_id(), target).await?;
    telemetry::like_recorded(target.label());
    tracing::debug!(user_id = auth.user_id(), target = target.label(), id = target.id(), "liked");
    Ok(HttpResponse::Ok().json(MessageResponse::new("liked successfully")))
}

async fn unlike(auth: Auth, data: web::Data<AppState>, target: LikeTarget) -> Result<HttpResponse, ApiError> {
    data.repo.unlike(auth.user_id(), target).await?;
    Ok(HttpResponse::Ok().json(MessageResponse::new("unliked successfully")))
}

/// `isLiked` is only ever true for an authenticated viewer.
async fn summary(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    target: LikeTarget,
) -> Result<HttpResponse, ApiError> {
    let viewer = auth.map(|a| a.user_id());
    let summary = data.repo.like_summary(target, viewer).await?;
    Ok(HttpResponse::Ok().json(summary))
}

#[utoipa::path(
    post,
    path = "/posts/{id}/like",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Liked", body = MessageResponse),
        (status = 404, description = "Post not found"),
        (status = 409, description = "Already liked")
    )
)]
pub async fn like_post(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    like(auth, data, LikeTarget::Post(path.into_inner())).await
}

#[utoipa::path(
    delete,
    path = "/posts/{id}/like",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Unliked", body = MessageResponse),
        (status = 404, description = "No like to remove")
    )
)]
pub async fn unlike_post(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    unlike(auth, data, LikeTarget::Post(path.into_inner())).await
}

#[utoipa::path(
    get,
    path = "/posts/{id}/likes",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Like count and viewer state", body = LikeSummary),
        (status = 404, description = "Post not found")
    )
)]
pub async fn post_likes(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    summary(auth, data, LikeTarget::Post(path.into_inner())).await
}

#[utoipa::path(
    post,
    path = "/comments/{id}/like",
    params(("id" = Id, Path, description = "Comment id")),
    responses(
        (status = 200, description = "Liked", body = MessageResponse),
        (status = 404, description = "Comment not found"),
        (status = 409, description = "Already liked")
    )
)]
pub async fn like_comment(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    like(auth, data, LikeTarget::Comment(path.into_inner())).await
}

#[utoipa::path(
    delete,
    path = "/comments/{id}/like",
    params(("id" = Id, Path, description = "Comment id")),
    responses(
        (status = 200, description = "Unliked", body = MessageResponse),
        (status = 404, description = "No like to remove")
    )
)]
pub async fn unlike_comment(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    unlike(auth, data, LikeTarget::Comment(path.into_inner())).await
}

#[utoipa::path(
    get,
    path = "/comments/{id}/likes",
    params(("id" = Id, Path, description = "Comment id")),
    responses(
        (status = 200, description = "Like count and viewer state", body = LikeSummary),
        (status = 404, description = "Comment not found")
    )
)]
pub async fn comment_likes(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    summary(auth, data, LikeTarget::Comment(path.into_inner())).await
}

#[utoipa::path(
    post,
    path = "/replies/{id}/like",
    params(("id" = Id, Path, description = "Reply id")),
    responses(
        (status = 200, description = "Liked", body = MessageResponse),
        (status = 404, description = "Reply not found"),
        (status = 409, description = "Already liked")
    )
)]
pub async fn like_reply(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    like(auth, data, LikeTarget::Reply(path.into_inner())).await
}

#[utoipa::path(
    delete,
    path = "/replies/{id}/like",
    params(("id" = Id, Path, description = "Reply id")),
    responses(
        (status = 200, description = "Unliked", body = MessageResponse),
        (status = 404, description = "No like to remove")
    )
)]
pub async fn unlike_reply(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    unlike(auth, data, LikeTarget::Reply(path.into_inner())).await
}

#[utoipa::path(
    get,
    path = "/replies/{id}/likes",
    params(("id" = Id, Path, description = "Reply id")),
    responses(
        (status = 200, description = "Like count and viewer state", body = LikeSummary),
        (status = 404, description = "Reply not found")
    )
)]
pub async fn reply_likes(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    summary(auth, data, LikeTarget::Reply(path.into_inner())).await
}
