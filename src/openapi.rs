use crate::error::ApiErrorBody;
use crate::models::{
    ActorSummary, AuthorSummary, Comment, CommentView, ImageBlock, LikeSummary, MapBlock, Notification,
    NotificationKind, NotificationView, PublicUser, Reaction, Reply, ReplyView, Tag, UpdatePost, VideoBlock, PostView,
};
use crate::routes::{comments, likes, notifications, posts, users, MessageResponse};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        users::register,
        users::login,
        users::me,
        users::get_user,
        users::update_user,
        posts::list_posts,
        posts::search,
        posts::my_posts,
        posts::saved_posts,
        posts::get_post,
        posts::create_post,
        posts::update_post,
        posts::delete_post,
        posts::save_post,
        posts::unsave_post,
        posts::save_status,
        comments::create_comment,
        comments::list_comments,
        comments::update_comment,
        comments::delete_comment,
        comments::create_reply,
        comments::list_replies,
        comments::get_reply,
        comments::update_reply,
        comments::delete_reply,
        likes::like_post,
        likes::unlike_post,
        likes::post_likes,
        likes::like_comment,
        likes::unlike_comment,
        likes::comment_likes,
        likes::like_reply,
        likes::unlike_reply,
        likes::reply_likes,
        notifications::list_notifications,
        notifications::unread_count,
        notifications::mark_read,
        notifications::mark_all_read,
        notifications::react,
        notifications::list_reactions,
    ),
    components(schemas(
        PublicUser, AuthorSummary, PostView, Tag, ImageBlock, MapBlock, VideoBlock, UpdatePost,
        Comment, Reply, CommentView, ReplyView, LikeSummary,
        Notification, NotificationKind, NotificationView, ActorSummary, Reaction,
        ApiErrorBody, MessageResponse,
        users::RegisterRequest, users::RegisterResponse, users::LoginRequest, users::LoginResponse, users::LoginUser,
        posts::SaveStatus, comments::ContentBody,
        notifications::UnreadCount, notifications::MarkedRead, notifications::ReactionBody,
    )),
    tags(
        (name = "users", description = "Registration, login and profiles"),
        (name = "posts", description = "Posts, tags, search and saved posts"),
        (name = "comments", description = "Comments and replies"),
        (name = "notifications", description = "Per-user notifications"),
    )
)]
pub struct ApiDoc;
