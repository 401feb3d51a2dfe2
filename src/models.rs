use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use utoipa::ToSchema;

// Always Postgres-shaped ids, the in-memory store hands out the same type
pub type Id = i64;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct User {
    pub id: Id,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
    pub website: String,
    pub avatar: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Profile shape returned to clients.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PublicUser {
    pub id: Id,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
    pub website: String,
    pub avatar: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            username: u.username,
            email: u.email,
            first_name: u.first_name,
            last_name: u.last_name,
            bio: u.bio,
            website: u.website,
            avatar: u.avatar,
            is_active: u.is_active,
            created_at: u.created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// Partial profile update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateProfile {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub email: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AuthorSummary {
    pub id: Id,
    pub name: String,
    #[serde(rename = "imageUrl")]
    pub image_url: String,
}

impl From<&User> for AuthorSummary {
    fn from(u: &User) -> Self {
        Self { id: u.id, name: u.username.clone(), image_url: u.avatar.clone() }
    }
}

// ---------------- posts & content blocks ----------------

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Post {
    pub id: Id,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub author_id: Id,
    pub date: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Tag {
    pub id: Id,
    pub name: String,
    #[serde(skip_serializing, default)]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct ImageBlock {
    pub id: Id,
    pub post_id: Id,
    pub url: String,
    pub alt_text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct MapBlock {
    pub id: Id,
    pub post_id: Id,
    pub latitude: f64,
    pub longitude: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct VideoBlock {
    pub id: Id,
    pub post_id: Id,
    pub url: String,
    pub caption: String,
    pub created_at: DateTime<Utc>,
}

/// Table payloads are opaque: stored and returned byte for byte as the client sent them.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TableBlock {
    pub id: Id,
    pub post_id: Id,
    pub data: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewImage {
    pub url: String,
    #[serde(default)]
    pub alt_text: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct NewMap {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewVideo {
    pub url: String,
    #[serde(default)]
    pub caption: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewPost {
    pub title: String,
    pub description: String,
    pub author_id: Id,
    pub tags: Vec<String>,
    pub images: Vec<NewImage>,
    pub maps: Vec<NewMap>,
    pub videos: Vec<NewVideo>,
    /// Each entry is kept as the exact JSON text the client sent.
    pub tables: Vec<Box<RawValue>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdatePost {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// Search/listing filter; all criteria are ANDed.
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub author_id: Option<Id>,
    pub search: Option<String>,
    pub tag: Option<String>,
}

/// A post with everything hanging off it, as loaded by the store.
#[derive(Debug, Clone)]
pub struct PostDetail {
    pub post: Post,
    pub author: AuthorSummary,
    pub tags: Vec<Tag>,
    pub images: Vec<ImageBlock>,
    pub maps: Vec<MapBlock>,
    pub videos: Vec<VideoBlock>,
    pub tables: Vec<TableBlock>,
    pub likes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PostView {
    pub id: Id,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub date: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub author: AuthorSummary,
    pub tags: Vec<Tag>,
    pub images: Vec<ImageBlock>,
    pub maps: Vec<MapBlock>,
    pub videos: Vec<VideoBlock>,
    #[schema(value_type = Vec<Object>)]
    pub tables: Vec<Box<RawValue>>,
    pub likes: i64,
}

impl From<PostDetail> for PostView {
    fn from(d: PostDetail) -> Self {
        let tables = d
            .tables
            .iter()
            .filter_map(|t| match RawValue::from_string(t.data.clone()) {
                Ok(v) => Some(v),
                Err(e) => {
                    tracing::warn!(table_id = t.id, post_id = t.post_id, "skipping unparseable table block: {e}");
                    None
                }
            })
            .collect();
        Self {
            id: d.post.id,
            title: d.post.title,
            slug: d.post.slug,
            description: d.post.description,
            date: d.post.date,
            updated_at: d.post.updated_at,
            author: d.author,
            tags: d.tags,
            images: d.images,
            maps: d.maps,
            videos: d.videos,
            tables,
            likes: d.likes,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct SavedPost {
    pub id: Id,
    pub user_id: Id,
    pub post_id: Id,
    pub created_at: DateTime<Utc>,
}

// ---------------- comments & replies ----------------

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Comment {
    pub id: Id,
    pub post_id: Id,
    pub author_id: Id,
    pub content: String,
    pub likes: i64,
    pub edited: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Reply {
    pub id: Id,
    pub parent_id: Id,
    pub post_id: Id,
    pub author_id: Id,
    pub content: String,
    pub likes: i64,
    pub edited: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewComment {
    pub post_id: Id,
    pub author_id: Id,
    pub content: String,
}

/// `post_id` is not part of the input: a reply always inherits its parent's post.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewReply {
    pub parent_id: Id,
    pub author_id: Id,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReplyView {
    pub id: Id,
    pub parent_id: Id,
    pub post_id: Id,
    pub author_id: Id,
    pub content: String,
    pub likes: i64,
    pub edited: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub author: AuthorSummary,
}

impl ReplyView {
    pub fn new(r: Reply, author: AuthorSummary) -> Self {
        Self {
            id: r.id,
            parent_id: r.parent_id,
            post_id: r.post_id,
            author_id: r.author_id,
            content: r.content,
            likes: r.likes,
            edited: r.edited,
            created_at: r.created_at,
            updated_at: r.updated_at,
            author,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CommentView {
    pub id: Id,
    pub post_id: Id,
    pub author_id: Id,
    pub content: String,
    pub likes: i64,
    pub edited: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub author: AuthorSummary,
    pub replies: Vec<ReplyView>,
}

impl CommentView {
    pub fn new(c: Comment, author: AuthorSummary, replies: Vec<ReplyView>) -> Self {
        Self {
            id: c.id,
            post_id: c.post_id,
            author_id: c.author_id,
            content: c.content,
            likes: c.likes,
            edited: c.edited,
            created_at: c.created_at,
            updated_at: c.updated_at,
            author,
            replies,
        }
    }
}

// ---------------- likes ----------------

/// What a like points at. Exactly one target per like row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum LikeTarget {
    Post(Id),
    Comment(Id),
    Reply(Id),
}

impl LikeTarget {
    pub fn id(&self) -> Id {
        match *self {
            LikeTarget::Post(id) | LikeTarget::Comment(id) | LikeTarget::Reply(id) => id,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LikeTarget::Post(_) => "post",
            LikeTarget::Comment(_) => "comment",
            LikeTarget::Reply(_) => "reply",
        }
    }

    /// Column split used by the relational schema: `(post_id, comment_id, reply_id)`.
    pub fn columns(&self) -> (Option<Id>, Option<Id>, Option<Id>) {
        match *self {
            LikeTarget::Post(id) => (Some(id), None, None),
            LikeTarget::Comment(id) => (None, Some(id), None),
            LikeTarget::Reply(id) => (None, None, Some(id)),
        }
    }

    /// Inverse of [`LikeTarget::columns`]; `None` unless exactly one column is set.
    pub fn from_columns(post_id: Option<Id>, comment_id: Option<Id>, reply_id: Option<Id>) -> Option<Self> {
        match (post_id, comment_id, reply_id) {
            (Some(id), None, None) => Some(LikeTarget::Post(id)),
            (None, Some(id), None) => Some(LikeTarget::Comment(id)),
            (None, None, Some(id)) => Some(LikeTarget::Reply(id)),
            _ => None,
        }
    }

    pub fn notification_kind(&self) -> NotificationKind {
        match self {
            LikeTarget::Post(_) => NotificationKind::LikePost,
            LikeTarget::Comment(_) => NotificationKind::LikeComment,
            LikeTarget::Reply(_) => NotificationKind::LikeReply,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Like {
    pub id: Id,
    pub user_id: Id,
    pub target: LikeTarget,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LikeSummary {
    pub likes: i64,
    #[serde(rename = "isLiked")]
    pub is_liked: bool,
}

// ---------------- notifications ----------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    LikePost,
    Comment,
    LikeComment,
    Reply,
    LikeReply,
    ReactionToNotification,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::LikePost => "like_post",
            NotificationKind::Comment => "comment",
            NotificationKind::LikeComment => "like_comment",
            NotificationKind::Reply => "reply",
            NotificationKind::LikeReply => "like_reply",
            NotificationKind::ReactionToNotification => "reaction_to_notification",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "like_post" => Some(NotificationKind::LikePost),
            "comment" => Some(NotificationKind::Comment),
            "like_comment" => Some(NotificationKind::LikeComment),
            "reply" => Some(NotificationKind::Reply),
            "like_reply" => Some(NotificationKind::LikeReply),
            "reaction_to_notification" => Some(NotificationKind::ReactionToNotification),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Notification {
    pub id: Id,
    pub user_id: Id,
    pub actor_id: Id,
    pub kind: NotificationKind,
    pub post_id: Option<Id>,
    pub comment_id: Option<Id>,
    pub reply_id: Option<Id>,
    /// Set on reactions: the notification that was reacted to.
    pub notification_id: Option<Id>,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn target_id(&self) -> Id {
        self.notification_id.or(self.reply_id).or(self.comment_id).or(self.post_id).unwrap_or_default()
    }

    /// Either party of the notification may react to it.
    pub fn involves(&self, user_id: Id) -> bool {
        self.user_id == user_id || self.actor_id == user_id
    }

    /// The other party from `user_id`'s point of view.
    pub fn counterpart(&self, user_id: Id) -> Id {
        if self.user_id == user_id { self.actor_id } else { self.user_id }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub user_id: Id,
    pub actor_id: Id,
    pub kind: NotificationKind,
    pub post_id: Option<Id>,
    pub comment_id: Option<Id>,
    pub reply_id: Option<Id>,
    pub notification_id: Option<Id>,
    pub message: String,
}

impl NewNotification {
    /// The most specific entity the notification is about. Together with
    /// recipient, actor and kind it forms the de-duplication key.
    pub fn target_id(&self) -> Id {
        self.notification_id.or(self.reply_id).or(self.comment_id).or(self.post_id).unwrap_or_default()
    }
}

/// One user's reaction to a notification; reacting again replaces the type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Reaction {
    pub id: Id,
    pub user_id: Id,
    pub notification_id: Id,
    #[serde(rename = "type")]
    pub kind: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ActorSummary {
    pub id: Id,
    pub name: String,
    pub avatar: String,
}

impl From<&User> for ActorSummary {
    fn from(u: &User) -> Self {
        Self { id: u.id, name: u.username.clone(), avatar: u.avatar.clone() }
    }
}

/// Stored notification plus the actor and the content it refers to.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NotificationView {
    pub id: Id,
    pub user_id: Id,
    pub actor_id: Id,
    pub kind: NotificationKind,
    pub post_id: Option<Id>,
    pub comment_id: Option<Id>,
    pub reply_id: Option<Id>,
    pub notification_id: Option<Id>,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub actor: ActorSummary,
    pub target_content: Option<String>,
}

impl NotificationView {
    pub fn new(n: Notification, actor: ActorSummary, target_content: Option<String>) -> Self {
        Self {
            id: n.id,
            user_id: n.user_id,
            actor_id: n.actor_id,
            kind: n.kind,
            post_id: n.post_id,
            comment_id: n.comment_id,
            reply_id: n.reply_id,
            notification_id: n.notification_id,
            message: n.message,
            is_read: n.is_read,
            created_at: n.created_at,
            actor,
            target_content,
        }
    }
}
