use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use utoipa::ToSchema;

use super::{enforce_rate, require_content, AppState, MessageResponse};
use crate::auth::Auth;
use crate::error::ApiError;
use crate::models::{CommentView, Id, NewComment, NewReply, ReplyView};
use crate::rate_limit::RateLimiterFacade;
use crate::telemetry;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ContentBody {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct CommentPath {
    pub post_id: Id,
    pub id: Id,
}

#[derive(Debug, Deserialize)]
pub struct ReplyPath {
    pub comment_id: Id,
    pub id: Id,
}

/// The comment must belong to the post named in the path.
async fn check_comment_in_post(data: &AppState, p: &CommentPath) -> Result<(), ApiError> {
    let comment = data.repo.get_comment(p.id).await?;
    if comment.post_id != p.post_id {
        return Err(ApiError::bad_request("comment does not belong to this post"));
    }
    Ok(())
}

async fn check_reply_in_comment(data: &AppState, p: &ReplyPath) -> Result<(), ApiError> {
    let reply = data.repo.get_reply(p.id).await?;
    if reply.parent_id != p.comment_id {
        return Err(ApiError::bad_request("reply does not belong to this comment"));
    }
    Ok(())
}

#[utoipa::path(
    post,
    path = "/posts/{id}/comments",
    request_body = ContentBody,
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 201, description = "Comment created", body = CommentView),
        (status = 400, description = "Empty content"),
        (status = 404, description = "Post not found"),
        (status = 429, description = "Rate limited")
    )
)]
pub async fn create_comment(
    req: HttpRequest,
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<ContentBody>,
) -> Result<HttpResponse, ApiError> {
    enforce_rate(&data, &req, RateLimiterFacade::allow_comment)?;
    let content = require_content(&payload.content)?;
    let post_id = path.into_inner();
    let comment = data.repo.create_comment(NewComment { post_id, author_id: auth.user_id(), content }).await?;
    telemetry::comment_created();
    tracing::info!(comment_id = comment.id, post_id, "comment created");
    Ok(HttpResponse::Created().json(comment))
}

#[utoipa::path(
    get,
    path = "/posts/{id}/comments",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Comments oldest first, replies nested", body = [CommentView]),
        (status = 404, description = "Post not found")
    )
)]
pub async fn list_comments(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let comments = data.repo.list_comments(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(comments))
}

#[utoipa::path(
    put,
    path = "/posts/{post_id}/comments/{id}",
    request_body = ContentBody,
    params(
        ("post_id" = Id, Path, description = "Post id"),
        ("id" = Id, Path, description = "Comment id")
    ),
    responses(
        (status = 200, description = "Comment updated", body = crate::models::Comment),
        (status = 400, description = "Empty content or wrong post"),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Comment not found")
    )
)]
pub async fn update_comment(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<CommentPath>,
    payload: web::Json<ContentBody>,
) -> Result<HttpResponse, ApiError> {
    let content = require_content(&payload.content)?;
    check_comment_in_post(&data, &path).await?;
    let comment = data.repo.update_comment(path.id, auth.user_id(), content).await?;
    Ok(HttpResponse::Ok().json(comment))
}

#[utoipa::path(
    delete,
    path = "/posts/{post_id}/comments/{id}",
    params(
        ("post_id" = Id, Path, description = "Post id"),
        ("id" = Id, Path, description = "Comment id")
    ),
    responses(
        (status = 200, description = "Comment and its replies deleted", body = MessageResponse),
        (status = 400, description = "Wrong post"),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Comment not found")
    )
)]
pub async fn delete_comment(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<CommentPath>,
) -> Result<HttpResponse, ApiError> {
    check_comment_in_post(&data, &path).await?;
    data.repo.delete_comment(path.id, auth.user_id()).await?;
    tracing::info!(comment_id = path.id, post_id = path.post_id, "comment deleted");
    Ok(HttpResponse::Ok().json(MessageResponse::new("comment deleted")))
}

#[utoipa::path(
    post,
    path = "/comments/{id}/replies",
    request_body = ContentBody,
    params(("id" = Id, Path, description = "Comment id")),
    responses(
        (status = 201, description = "Reply created", body = ReplyView),
        (status = 400, description = "Empty content"),
        (status = 404, description = "Comment not found"),
        (status = 429, description = "Rate limited")
    )
)]
pub async fn create_reply(
    req: HttpRequest,
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<ContentBody>,
) -> Result<HttpResponse, ApiError> {
    enforce_rate(&data, &req, RateLimiterFacade::allow_comment)?;
    let content = require_content(&payload.content)?;
    let parent_id = path.into_inner();
    let reply = data.repo.create_reply(NewReply { parent_id, author_id: auth.user_id(), content }).await?;
    telemetry::comment_created();
    tracing::info!(reply_id = reply.id, parent_id, "reply created");
    Ok(HttpResponse::Created().json(reply))
}

#[utoipa::path(
    get,
    path = "/comments/{id}/replies",
    params(("id" = Id, Path, description = "Comment id")),
    responses(
        (status = 200, description = "Replies oldest first", body = [ReplyView]),
        (status = 404, description = "Comment not found")
    )
)]
pub async fn list_replies(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let replies = data.repo.list_replies(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(replies))
}

#[utoipa::path(
    get,
    path = "/replies/{id}",
    params(("id" = Id, Path, description = "Reply id")),
    responses(
        (status = 200, description = "Reply with live like count", body = ReplyView),
        (status = 404, description = "Reply not found")
    )
)]
pub async fn get_reply(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let reply = data.repo.get_reply(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(reply))
}

#[utoipa::path(
    put,
    path = "/comments/{comment_id}/replies/{id}",
    request_body = ContentBody,
    params(
        ("comment_id" = Id, Path, description = "Parent comment id"),
        ("id" = Id, Path, description = "Reply id")
    ),
    responses(
        (status = 200, description = "Reply updated", body = crate::models::Reply),
        (status = 400, description = "Empty content or wrong comment"),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Reply not found")
    )
)]
pub async fn update_reply(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<ReplyPath>,
    payload: web::Json<ContentBody>,
) -> Result<HttpResponse, ApiError> {
    let content = require_content(&payload.content)?;
    check_reply_in_comment(&data, &path).await?;
    let reply = data.repo.update_reply(path.id, auth.user_id(), content).await?;
    Ok(HttpResponse::Ok().json(reply))
}

#[utoipa::path(
    delete,
    path = "/comments/{comment_id}/replies/{id}",
    params(
        ("comment_id" = Id, Path, description = "Parent comment id"),
        ("id" = Id, Path, description = "Reply id")
    ),
    responses(
        (status = 200, description = "Reply deleted", body = MessageResponse),
        (status = 400, description = "Wrong comment"),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Reply not found")
    )
)]
pub async fn delete_reply(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<ReplyPath>,
) -> Result<HttpResponse, ApiError> {
    check_reply_in_comment(&data, &path).await?;
    data.repo.delete_reply(path.id, auth.user_id()).await?;
    tracing::info!(reply_id = path.id, "reply deleted");
    Ok(HttpResponse::Ok().json(MessageResponse::new("reply deleted")))
}
