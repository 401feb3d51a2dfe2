use async_trait::async_trait;

use crate::models::*;

pub mod inmem;
pub mod pg;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("forbidden")] Forbidden,
    #[error("invalid: {0}")] Invalid(String),
    #[error("internal: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Conflict when the username or email is already registered.
    async fn create_user(&self, new: NewUser) -> RepoResult<User>;
    async fn get_user(&self, id: Id) -> RepoResult<User>;
    /// Lookup by username, falling back to email.
    async fn find_user_by_login(&self, login: &str) -> RepoResult<User>;
    async fn username_taken(&self, username: &str) -> RepoResult<bool>;
    async fn update_profile(&self, id: Id, upd: UpdateProfile) -> RepoResult<User>;
}

#[async_trait]
pub trait PostRepo: Send + Sync {
    /// Post, slug, content blocks and tags in one unit.
    async fn create_post(&self, new: NewPost) -> RepoResult<PostDetail>;
    async fn get_post(&self, id: Id) -> RepoResult<PostDetail>;
    /// Newest first.
    async fn list_posts(&self, filter: PostFilter) -> RepoResult<Vec<PostDetail>>;
    async fn update_post(&self, id: Id, actor: Id, upd: UpdatePost) -> RepoResult<PostDetail>;
    /// Removes the post with everything that hangs off it. Returns the image
    /// blocks that went with it so their uploads can be dropped too.
    async fn delete_post(&self, id: Id, actor: Id) -> RepoResult<Vec<ImageBlock>>;
}

#[async_trait]
pub trait SavedPostRepo: Send + Sync {
    async fn save_post(&self, user_id: Id, post_id: Id) -> RepoResult<SavedPost>;
    async fn unsave_post(&self, user_id: Id, post_id: Id) -> RepoResult<()>;
    async fn is_saved(&self, user_id: Id, post_id: Id) -> RepoResult<bool>;
    /// Most recently saved first.
    async fn list_saved_posts(&self, user_id: Id) -> RepoResult<Vec<PostDetail>>;
}

#[async_trait]
pub trait CommentRepo: Send + Sync {
    /// Also notifies the post author.
    async fn create_comment(&self, new: NewComment) -> RepoResult<CommentView>;
    async fn get_comment(&self, id: Id) -> RepoResult<Comment>;
    /// Oldest first, replies nested.
    async fn list_comments(&self, post_id: Id) -> RepoResult<Vec<CommentView>>;
    async fn update_comment(&self, id: Id, actor: Id, content: String) -> RepoResult<Comment>;
    /// Cascades over replies, likes and notifications.
    async fn delete_comment(&self, id: Id, actor: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait ReplyRepo: Send + Sync {
    /// Also notifies the parent comment's author.
    async fn create_reply(&self, new: NewReply) -> RepoResult<ReplyView>;
    async fn get_reply(&self, id: Id) -> RepoResult<ReplyView>;
    async fn list_replies(&self, comment_id: Id) -> RepoResult<Vec<ReplyView>>;
    async fn update_reply(&self, id: Id, actor: Id, content: String) -> RepoResult<Reply>;
    async fn delete_reply(&self, id: Id, actor: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait LikeRepo: Send + Sync {
    /// Conflict on a repeated like; notifies the target's author.
    async fn like(&self, user_id: Id, target: LikeTarget) -> RepoResult<Like>;
    /// NotFound when there is no like to remove.
    async fn unlike(&self, user_id: Id, target: LikeTarget) -> RepoResult<()>;
    async fn like_summary(&self, target: LikeTarget, viewer: Option<Id>) -> RepoResult<LikeSummary>;
}

#[async_trait]
pub trait NotificationRepo: Send + Sync {
    /// Newest first, enriched with actor and target content.
    async fn list_notifications(&self, user_id: Id) -> RepoResult<Vec<NotificationView>>;
    async fn unread_count(&self, user_id: Id) -> RepoResult<i64>;
    /// NotFound unless `user_id` is the recipient.
    async fn mark_read(&self, user_id: Id, id: Id) -> RepoResult<Notification>;
    /// Number of notifications that flipped to read.
    async fn mark_all_read(&self, user_id: Id) -> RepoResult<u64>;
    /// Adds or replaces `user_id`'s reaction and notifies the other party.
    /// NotFound unless `user_id` is the notification's recipient or actor.
    async fn react(&self, user_id: Id, notification_id: Id, kind: String) -> RepoResult<Reaction>;
    /// Oldest first; same visibility rule as [`NotificationRepo::react`].
    async fn list_reactions(&self, user_id: Id, notification_id: Id) -> RepoResult<Vec<Reaction>>;
}

pub trait Repo: UserRepo + PostRepo + SavedPostRepo + CommentRepo + ReplyRepo + LikeRepo + NotificationRepo {}

impl<T> Repo for T where
    T: UserRepo + PostRepo + SavedPostRepo + CommentRepo + ReplyRepo + LikeRepo + NotificationRepo
{
}

/// Trimmed, de-duplicated (first occurrence wins) and without empties.
pub fn normalize_tags(names: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(names.len());
    for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
        if !out.iter().any(|seen| seen == name) {
            out.push(name.to_string());
        }
    }
    out
}
