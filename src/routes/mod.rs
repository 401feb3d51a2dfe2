use std::sync::Arc;

use actix_web::{web, HttpRequest, HttpResponse};

use crate::error::ApiError;
use crate::rate_limit::RateLimiterFacade;
use crate::repo::Repo;
use crate::storage::MediaStore;
use crate::telemetry;

pub mod comments;
mod form;
pub mod likes;
pub mod media;
pub mod notifications;
pub mod posts;
pub mod users;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub media: Arc<dyn MediaStore>,
    pub rate_limiter: Option<RateLimiterFacade>,
    pub max_upload_bytes: usize,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    // users & auth
    cfg.service(web::resource("/register").route(web::post().to(users::register)))
        .service(web::resource("/login").route(web::post().to(users::login)))
        .service(web::resource("/auth/me").route(web::get().to(users::me)))
        .service(
            web::resource("/users/{id:\\d+}")
                .route(web::get().to(users::get_user))
                .route(web::put().to(users::update_user)),
        );

    // posts
    cfg.service(
        web::resource("/posts")
            .route(web::get().to(posts::list_posts))
            .route(web::post().to(posts::create_post)),
    )
    .service(web::resource("/posts/create").route(web::post().to(posts::create_post)))
    .service(web::resource("/posts/myblogs").route(web::get().to(posts::my_posts)))
    .service(web::resource("/posts/saved-blogs").route(web::get().to(posts::saved_posts)))
    .service(
        web::resource("/posts/{id:\\d+}")
            .route(web::get().to(posts::get_post))
            .route(web::put().to(posts::update_post))
            .route(web::delete().to(posts::delete_post)),
    )
    .service(
        web::resource("/posts/{id:\\d+}/save")
            .route(web::post().to(posts::save_post))
            .route(web::delete().to(posts::unsave_post)),
    )
    .service(web::resource("/posts/{id:\\d+}/save-status").route(web::get().to(posts::save_status)))
    .service(web::resource("/search").route(web::get().to(posts::search)));

    // comments & replies
    cfg.service(
        web::resource("/posts/{id:\\d+}/comments")
            .route(web::post().to(comments::create_comment))
            .route(web::get().to(comments::list_comments)),
    )
    .service(
        web::resource("/posts/{post_id:\\d+}/comments/{id:\\d+}")
            .route(web::put().to(comments::update_comment))
            .route(web::delete().to(comments::delete_comment)),
    )
    .service(
        web::resource("/comments/{id:\\d+}/replies")
            .route(web::post().to(comments::create_reply))
            .route(web::get().to(comments::list_replies)),
    )
    .service(
        web::resource("/comments/{comment_id:\\d+}/replies/{id:\\d+}")
            .route(web::put().to(comments::update_reply))
            .route(web::delete().to(comments::delete_reply)),
    )
    .service(web::resource("/replies/{id:\\d+}").route(web::get().to(comments::get_reply)));

    // likes
    cfg.service(
        web::resource("/posts/{id:\\d+}/like")
            .route(web::post().to(likes::like_post))
            .route(web::delete().to(likes::unlike_post)),
    )
    .service(web::resource("/posts/{id:\\d+}/likes").route(web::get().to(likes::post_likes)))
    .service(
        web::resource("/comments/{id:\\d+}/like")
            .route(web::post().to(likes::like_comment))
            .route(web::delete().to(likes::unlike_comment)),
    )
    .service(web::resource("/comments/{id:\\d+}/likes").route(web::get().to(likes::comment_likes)))
    .service(
        web::resource("/replies/{id:\\d+}/like")
            .route(web::post().to(likes::like_reply))
            .route(web::delete().to(likes::unlike_reply)),
    )
    .service(web::resource("/replies/{id:\\d+}/likes").route(web::get().to(likes::reply_likes)));

    // notifications
    cfg.service(web::resource("/notifications").route(web::get().to(notifications::list_notifications)))
        .service(web::resource("/notifications/unread-count").route(web::get().to(notifications::unread_count)))
        .service(web::resource("/notifications/read-all").route(web::post().to(notifications::mark_all_read)))
        .service(web::resource("/notifications/{id:\\d+}/read").route(web::post().to(notifications::mark_read)))
        .service(web::resource("/notifications/{id:\\d+}/reaction").route(web::post().to(notifications::react)))
        .service(web::resource("/notifications/{id:\\d+}/reactions").route(web::get().to(notifications::list_reactions)));

    // public fetch route so <img src="/uploads/..."> works
    cfg.route("/uploads/{key:.+}", web::get().to(media::serve_upload))
        .route("/metrics", web::get().to(metrics));
}

pub async fn metrics() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(telemetry::render())
}

/// Best-effort client address for rate limiting.
fn client_ip(req: &HttpRequest) -> String {
    req.connection_info().realip_remote_addr().unwrap_or("unknown").to_string()
}

/// `Err(TooManyRequests)` when the limiter rejects this caller for `allow`.
pub(crate) fn enforce_rate(
    data: &AppState,
    req: &HttpRequest,
    allow: fn(&RateLimiterFacade, &str) -> bool,
) -> Result<(), ApiError> {
    match data.rate_limiter {
        Some(ref rl) if !allow(rl, &client_ip(req)) => {
            tracing::warn!(path = req.path(), "rate limited");
            Err(ApiError::TooManyRequests)
        }
        _ => Ok(()),
    }
}

/// Common shape for `{"message": ..}` acknowledgements.
#[derive(Debug, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Blank content is rejected before it reaches the store.
pub(crate) fn require_content(content: &str) -> Result<String, ApiError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(ApiError::bad_request("content must not be empty"));
    }
    Ok(trimmed.to_string())
}
