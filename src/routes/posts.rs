use actix_multipart::Multipart;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use utoipa::{IntoParams, ToSchema};

use super::form::{discard, store_files, MultipartForm};
use super::{enforce_rate, AppState, MessageResponse};
use crate::auth::Auth;
use crate::error::ApiError;
use crate::models::{Id, NewImage, NewMap, NewPost, NewVideo, PostDetail, PostFilter, PostView, UpdatePost};
use crate::rate_limit::RateLimiterFacade;
use crate::storage::{key_from_url, public_url, IMAGES};
use crate::telemetry;

#[derive(Debug, Deserialize, IntoParams)]
pub struct SearchQuery {
    pub search: Option<String>,
    pub tag: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SaveStatus {
    pub post_id: Id,
    #[serde(rename = "isSaved")]
    pub is_saved: bool,
}

fn views(details: Vec<PostDetail>) -> Vec<PostView> {
    details.into_iter().map(PostView::from).collect()
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

#[utoipa::path(
    get,
    path = "/posts",
    responses((status = 200, description = "All posts, newest first", body = [PostView]))
)]
pub async fn list_posts(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let posts = data.repo.list_posts(PostFilter::default()).await?;
    Ok(HttpResponse::Ok().json(views(posts)))
}

#[utoipa::path(
    get,
    path = "/search",
    params(SearchQuery),
    responses((status = 200, description = "Matching posts, possibly empty", body = [PostView]))
)]
pub async fn search(data: web::Data<AppState>, query: web::Query<SearchQuery>) -> Result<HttpResponse, ApiError> {
    let q = query.into_inner();
    let filter = PostFilter { author_id: None, search: non_empty(q.search), tag: non_empty(q.tag) };
    let posts = data.repo.list_posts(filter).await?;
    Ok(HttpResponse::Ok().json(views(posts)))
}

#[utoipa::path(
    get,
    path = "/posts/myblogs",
    responses(
        (status = 200, description = "Caller's posts", body = [PostView]),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn my_posts(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let filter = PostFilter { author_id: Some(auth.user_id()), ..PostFilter::default() };
    let posts = data.repo.list_posts(filter).await?;
    Ok(HttpResponse::Ok().json(views(posts)))
}

#[utoipa::path(
    get,
    path = "/posts/{id}",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post", body = PostView),
        (status = 404, description = "Post not found")
    )
)]
pub async fn get_post(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let post = data.repo.get_post(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(PostView::from(post)))
}

/// Multipart create: `title`, `description`, JSON-encoded `tags`, `maps`,
/// `videos`, `tables`, plus any number of `images` file parts.
#[utoipa::path(
    post,
    path = "/posts/create",
    responses(
        (status = 201, description = "Post created", body = PostView),
        (status = 400, description = "Missing title or malformed JSON field"),
        (status = 401, description = "Unauthorized"),
        (status = 413, description = "Payload too large"),
        (status = 429, description = "Rate limited")
    )
)]
pub async fn create_post(
    req: HttpRequest,
    auth: Auth,
    data: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    enforce_rate(&data, &req, RateLimiterFacade::allow_post)?;
    let form = MultipartForm::read(payload, data.max_upload_bytes).await?;
    let title = form.non_blank("title").ok_or_else(|| ApiError::bad_request("title is required"))?;
    let tags: Vec<String> = form.json_list("tags")?;
    let maps: Vec<NewMap> = form.json_list("maps")?;
    let videos: Vec<NewVideo> = form.json_list("videos")?;
    let tables: Vec<Box<RawValue>> = form.json_list("tables")?;

    let stored = store_files(data.media.as_ref(), IMAGES, form.files_named("images")).await?;
    let new = NewPost {
        title,
        description: form.text("description").unwrap_or_default().to_string(),
        author_id: auth.user_id(),
        tags,
        images: stored.iter().map(|k| NewImage { url: public_url(k), alt_text: String::new() }).collect(),
        maps,
        videos,
        tables,
    };
    match data.repo.create_post(new).await {
        Ok(detail) => {
            telemetry::post_created();
            tracing::info!(post_id = detail.post.id, slug = %detail.post.slug, author_id = auth.user_id(), "post created");
            Ok(HttpResponse::Created().json(PostView::from(detail)))
        }
        Err(e) => {
            discard(data.media.as_ref(), &stored).await;
            Err(e.into())
        }
    }
}

#[utoipa::path(
    put,
    path = "/posts/{id}",
    request_body = UpdatePost,
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post updated", body = PostView),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn update_post(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdatePost>,
) -> Result<HttpResponse, ApiError> {
    let mut upd = payload.into_inner();
    if let Some(ref title) = upd.title {
        if title.trim().is_empty() {
            return Err(ApiError::bad_request("title must not be empty"));
        }
        upd.title = Some(title.trim().to_string());
    }
    let post = data.repo.update_post(path.into_inner(), auth.user_id(), upd).await?;
    Ok(HttpResponse::Ok().json(PostView::from(post)))
}

#[utoipa::path(
    delete,
    path = "/posts/{id}",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post deleted", body = MessageResponse),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn delete_post(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let removed = data.repo.delete_post(id, auth.user_id()).await?;
    let keys: Vec<String> = removed.iter().filter_map(|img| key_from_url(&img.url)).map(str::to_string).collect();
    discard(data.media.as_ref(), &keys).await;
    tracing::info!(post_id = id, images = keys.len(), "post deleted");
    Ok(HttpResponse::Ok().json(MessageResponse::new("post deleted")))
}

#[utoipa::path(
    post,
    path = "/posts/{id}/save",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 201, description = "Saved", body = MessageResponse),
        (status = 404, description = "Post not found"),
        (status = 409, description = "Already saved")
    )
)]
pub async fn save_post(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    data.repo.save_post(auth.user_id(), path.into_inner()).await?;
    Ok(HttpResponse::Created().json(MessageResponse::new("post saved")))
}

#[utoipa::path(
    delete,
    path = "/posts/{id}/save",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Unsaved", body = MessageResponse),
        (status = 404, description = "Post was not saved")
    )
)]
pub async fn unsave_post(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    data.repo.unsave_post(auth.user_id(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(MessageResponse::new("post unsaved")))
}

#[utoipa::path(
    get,
    path = "/posts/{id}/save-status",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Whether the caller saved the post", body = SaveStatus),
        (status = 404, description = "Post not found")
    )
)]
pub async fn save_status(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let post_id = path.into_inner();
    let is_saved = data.repo.is_saved(auth.user_id(), post_id).await?;
    Ok(HttpResponse::Ok().json(SaveStatus { post_id, is_saved }))
}

#[utoipa::path(
    get,
    path = "/posts/saved-blogs",
    responses(
        (status = 200, description = "Caller's saved posts", body = [PostView]),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn saved_posts(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let posts = data.repo.list_saved_posts(auth.user_id()).await?;
    Ok(HttpResponse::Ok().json(views(posts)))
}
