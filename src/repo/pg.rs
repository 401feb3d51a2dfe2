//! Postgres store. Every multi-row mutation runs inside one transaction;
//! helpers take `&mut PgConnection` so they work on a pooled connection and
//! on a transaction alike.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Pool, Postgres};

use super::*;
use crate::notify::{self, Event, Refs};
use crate::{slug, telemetry};

/// Extra attempts after a slug collision lost to a concurrent insert.
const SLUG_RETRIES: u32 = 3;

impl From<sqlx::Error> for RepoError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            sqlx::Error::Database(ref db) => match db.code().as_deref() {
                Some("23505") => RepoError::Conflict,
                Some("23503") => RepoError::NotFound,
                _ => RepoError::Internal(e.to_string()),
            },
            other => RepoError::Internal(other.to_string()),
        }
    }
}

const USER_COLS: &str =
    "id, username, email, password_hash, first_name, last_name, bio, website, avatar, is_active, created_at, updated_at";

const POST_SELECT: &str = "SELECT p.id, p.title, p.slug, p.description, p.author_id, p.date, p.updated_at, \
     u.username AS author_name, u.avatar AS author_avatar \
     FROM posts p JOIN users u ON u.id = p.author_id";

const COMMENT_COLS: &str = "id, post_id, author_id, content, likes, edited, created_at, updated_at";

const COMMENT_SELECT: &str = "SELECT c.id, c.post_id, c.author_id, c.content, c.likes, c.edited, c.created_at, c.updated_at, \
     u.username AS author_name, u.avatar AS author_avatar \
     FROM comments c JOIN users u ON u.id = c.author_id";

const REPLY_COLS: &str = "id, parent_id, post_id, author_id, content, likes, edited, created_at, updated_at";

const REPLY_SELECT: &str = "SELECT r.id, r.parent_id, r.post_id, r.author_id, r.content, r.likes, r.edited, r.created_at, r.updated_at, \
     u.username AS author_name, u.avatar AS author_avatar \
     FROM replies r JOIN users u ON u.id = r.author_id";

const NOTIFICATION_COLS: &str =
    "id, user_id, actor_id, kind, post_id, comment_id, reply_id, notification_id, message, is_read, created_at";
const REACTION_COLS: &str = "id, user_id, notification_id, kind, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct PostRow {
    #[sqlx(flatten)]
    post: Post,
    author_name: String,
    author_avatar: String,
}

#[derive(sqlx::FromRow)]
struct PostTagRow {
    post_id: Id,
    #[sqlx(flatten)]
    tag: Tag,
}

#[derive(sqlx::FromRow)]
struct CommentRow {
    #[sqlx(flatten)]
    comment: Comment,
    author_name: String,
    author_avatar: String,
}

impl CommentRow {
    fn into_view(self, replies: Vec<ReplyView>) -> CommentView {
        let author = AuthorSummary { id: self.comment.author_id, name: self.author_name, image_url: self.author_avatar };
        CommentView::new(self.comment, author, replies)
    }
}

#[derive(sqlx::FromRow)]
struct ReplyRow {
    #[sqlx(flatten)]
    reply: Reply,
    author_name: String,
    author_avatar: String,
}

impl From<ReplyRow> for ReplyView {
    fn from(row: ReplyRow) -> Self {
        let author = AuthorSummary { id: row.reply.author_id, name: row.author_name, image_url: row.author_avatar };
        ReplyView::new(row.reply, author)
    }
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: Id,
    user_id: Id,
    actor_id: Id,
    kind: String,
    post_id: Option<Id>,
    comment_id: Option<Id>,
    reply_id: Option<Id>,
    notification_id: Option<Id>,
    message: String,
    is_read: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = RepoError;

    fn try_from(r: NotificationRow) -> RepoResult<Self> {
        let kind = NotificationKind::parse(&r.kind)
            .ok_or_else(|| RepoError::Internal(format!("unknown notification kind {:?}", r.kind)))?;
        Ok(Notification {
            id: r.id,
            user_id: r.user_id,
            actor_id: r.actor_id,
            kind,
            post_id: r.post_id,
            comment_id: r.comment_id,
            reply_id: r.reply_id,
            notification_id: r.notification_id,
            message: r.message,
            is_read: r.is_read,
            created_at: r.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct NotificationViewRow {
    #[sqlx(flatten)]
    notification: NotificationRow,
    actor_name: String,
    actor_avatar: String,
    target_content: Option<String>,
}

fn group_by<T>(items: Vec<T>, key: impl Fn(&T) -> Id) -> HashMap<Id, Vec<T>> {
    let mut map: HashMap<Id, Vec<T>> = HashMap::new();
    for item in items {
        map.entry(key(&item)).or_default().push(item);
    }
    map
}

/// `%q%` with LIKE wildcards in `q` escaped.
fn like_pattern(q: &str) -> String {
    let escaped = q.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    format!("%{escaped}%")
}

/// Attach tags, blocks and like counts to post rows, keeping row order.
async fn hydrate(conn: &mut PgConnection, rows: Vec<PostRow>) -> RepoResult<Vec<PostDetail>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<Id> = rows.iter().map(|r| r.post.id).collect();

    let tags = sqlx::query_as::<_, PostTagRow>(
        "SELECT pt.post_id, t.id, t.name, t.created_at FROM post_tags pt JOIN tags t ON t.id = pt.tag_id \
         WHERE pt.post_id = ANY($1) ORDER BY t.name",
    )
    .bind(&ids[..])
    .fetch_all(&mut *conn)
    .await?;
    let images = sqlx::query_as::<_, ImageBlock>(
        "SELECT id, post_id, url, alt_text, created_at FROM post_images WHERE post_id = ANY($1) ORDER BY id",
    )
    .bind(&ids[..])
    .fetch_all(&mut *conn)
    .await?;
    let maps = sqlx::query_as::<_, MapBlock>(
        "SELECT id, post_id, latitude, longitude, created_at FROM post_maps WHERE post_id = ANY($1) ORDER BY id",
    )
    .bind(&ids[..])
    .fetch_all(&mut *conn)
    .await?;
    let videos = sqlx::query_as::<_, VideoBlock>(
        "SELECT id, post_id, url, caption, created_at FROM post_videos WHERE post_id = ANY($1) ORDER BY id",
    )
    .bind(&ids[..])
    .fetch_all(&mut *conn)
    .await?;
    let tables = sqlx::query_as::<_, TableBlock>(
        "SELECT id, post_id, data, created_at FROM post_tables WHERE post_id = ANY($1) ORDER BY id",
    )
    .bind(&ids[..])
    .fetch_all(&mut *conn)
    .await?;
    let likes: HashMap<Id, i64> = sqlx::query_as::<_, (Id, i64)>(
        "SELECT post_id, COUNT(*) FROM likes WHERE post_id = ANY($1) GROUP BY post_id",
    )
    .bind(&ids[..])
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .collect();

    let mut tags = group_by(tags, |t| t.post_id);
    let mut images = group_by(images, |b| b.post_id);
    let mut maps = group_by(maps, |b| b.post_id);
    let mut videos = group_by(videos, |b| b.post_id);
    let mut tables = group_by(tables, |b| b.post_id);

    Ok(rows
        .into_iter()
        .map(|row| {
            let id = row.post.id;
            PostDetail {
                author: AuthorSummary { id: row.post.author_id, name: row.author_name, image_url: row.author_avatar },
                tags: tags.remove(&id).unwrap_or_default().into_iter().map(|t| t.tag).collect(),
                images: images.remove(&id).unwrap_or_default(),
                maps: maps.remove(&id).unwrap_or_default(),
                videos: videos.remove(&id).unwrap_or_default(),
                tables: tables.remove(&id).unwrap_or_default(),
                likes: likes.get(&id).copied().unwrap_or(0),
                post: row.post,
            }
        })
        .collect())
}

/// Full replace of a post's tag set; new names are created on the fly.
async fn set_post_tags(conn: &mut PgConnection, post_id: Id, names: &[String]) -> RepoResult<()> {
    let names = normalize_tags(names);
    sqlx::query("DELETE FROM post_tags WHERE post_id = $1").bind(post_id).execute(&mut *conn).await?;
    if names.is_empty() {
        return Ok(());
    }
    sqlx::query("INSERT INTO tags (name) SELECT UNNEST($1::TEXT[]) ON CONFLICT (name) DO NOTHING")
        .bind(names.as_slice())
        .execute(&mut *conn)
        .await?;
    sqlx::query("INSERT INTO post_tags (post_id, tag_id) SELECT $1, id FROM tags WHERE name = ANY($2)")
        .bind(post_id)
        .bind(names.as_slice())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn author_summary(conn: &mut PgConnection, id: Id) -> RepoResult<AuthorSummary> {
    let (id, name, image_url) = sqlx::query_as::<_, (Id, String, String)>("SELECT id, username, avatar FROM users WHERE id = $1")
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(AuthorSummary { id, name, image_url })
}

/// Insert-or-ignore; returns the kind when a row was actually written.
async fn insert_notification(
    conn: &mut PgConnection,
    planned: Option<NewNotification>,
) -> RepoResult<Option<NotificationKind>> {
    let Some(n) = planned else { return Ok(None) };
    let res = sqlx::query(
        "INSERT INTO notifications (user_id, actor_id, kind, post_id, comment_id, reply_id, notification_id, target_id, message) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         ON CONFLICT (user_id, actor_id, kind, target_id) DO NOTHING",
    )
    .bind(n.user_id)
    .bind(n.actor_id)
    .bind(n.kind.as_str())
    .bind(n.post_id)
    .bind(n.comment_id)
    .bind(n.reply_id)
    .bind(n.notification_id)
    .bind(n.target_id())
    .bind(&n.message)
    .execute(&mut *conn)
    .await?;
    Ok((res.rows_affected() == 1).then_some(n.kind))
}

fn record_notification(kind: Option<NotificationKind>) {
    if let Some(kind) = kind {
        telemetry::notification_created(kind.as_str());
    }
}

/// `(owner, post_id, parent comment)` of a like target.
async fn like_target(conn: &mut PgConnection, target: LikeTarget) -> RepoResult<(Id, Id, Option<Id>)> {
    let sql = match target {
        LikeTarget::Post(_) => "SELECT author_id, id, NULL::BIGINT FROM posts WHERE id = $1",
        LikeTarget::Comment(_) => "SELECT author_id, post_id, NULL::BIGINT FROM comments WHERE id = $1",
        LikeTarget::Reply(_) => "SELECT author_id, post_id, parent_id FROM replies WHERE id = $1",
    };
    Ok(sqlx::query_as::<_, (Id, Id, Option<Id>)>(sql).bind(target.id()).fetch_one(&mut *conn).await?)
}

async fn owner_for_update(conn: &mut PgConnection, table: &str, id: Id) -> RepoResult<Id> {
    let sql = format!("SELECT author_id FROM {table} WHERE id = $1 FOR UPDATE");
    Ok(sqlx::query_scalar::<_, Id>(&sql).bind(id).fetch_one(&mut *conn).await?)
}

async fn exists(conn: &mut PgConnection, table: &str, id: Id) -> RepoResult<bool> {
    let sql = format!("SELECT EXISTS (SELECT 1 FROM {table} WHERE id = $1)");
    Ok(sqlx::query_scalar::<_, bool>(&sql).bind(id).fetch_one(&mut *conn).await?)
}

#[derive(Clone)]
pub struct PgRepo {
    pool: Pool<Postgres>,
}

impl PgRepo {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }

    async fn try_create_post(&self, new: &NewPost) -> RepoResult<Id> {
        let mut tx = self.pool.begin().await?;
        let base = slug::base(&new.title);
        let taken: HashSet<String> = sqlx::query_scalar::<_, String>("SELECT slug FROM posts WHERE slug = $1 OR slug LIKE $2")
            .bind(&base)
            .bind(format!("{base}-%"))
            .fetch_all(&mut *tx)
            .await?
            .into_iter()
            .collect();
        let slug = slug::first_free(&base, |c| taken.contains(c));

        let id = sqlx::query_scalar::<_, Id>(
            "INSERT INTO posts (title, slug, description, author_id) VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(&new.title)
        .bind(&slug)
        .bind(&new.description)
        .bind(new.author_id)
        .fetch_one(&mut *tx)
        .await?;

        for img in &new.images {
            sqlx::query("INSERT INTO post_images (post_id, url, alt_text) VALUES ($1, $2, $3)")
                .bind(id)
                .bind(&img.url)
                .bind(&img.alt_text)
                .execute(&mut *tx)
                .await?;
        }
        for m in &new.maps {
            sqlx::query("INSERT INTO post_maps (post_id, latitude, longitude) VALUES ($1, $2, $3)")
                .bind(id)
                .bind(m.latitude)
                .bind(m.longitude)
                .execute(&mut *tx)
                .await?;
        }
        for v in &new.videos {
            sqlx::query("INSERT INTO post_videos (post_id, url, caption) VALUES ($1, $2, $3)")
                .bind(id)
                .bind(&v.url)
                .bind(&v.caption)
                .execute(&mut *tx)
                .await?;
        }
        for raw in &new.tables {
            sqlx::query("INSERT INTO post_tables (post_id, data) VALUES ($1, $2)")
                .bind(id)
                .bind(raw.get())
                .execute(&mut *tx)
                .await?;
        }
        set_post_tags(&mut tx, id, &new.tags).await?;
        tx.commit().await?;
        Ok(id)
    }
}

#[async_trait]
impl UserRepo for PgRepo {
    async fn create_user(&self, new: NewUser) -> RepoResult<User> {
        let sql = format!("INSERT INTO users (username, email, password_hash) VALUES ($1, $2, $3) RETURNING {USER_COLS}");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(&new.username)
            .bind(&new.email)
            .bind(&new.password_hash)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn get_user(&self, id: Id) -> RepoResult<User> {
        let sql = format!("SELECT {USER_COLS} FROM users WHERE id = $1");
        Ok(sqlx::query_as::<_, User>(&sql).bind(id).fetch_one(&self.pool).await?)
    }

    async fn find_user_by_login(&self, login: &str) -> RepoResult<User> {
        let sql = format!(
            "SELECT {USER_COLS} FROM users WHERE username = $1 OR email = $1 ORDER BY (username = $1) DESC LIMIT 1"
        );
        Ok(sqlx::query_as::<_, User>(&sql).bind(login).fetch_one(&self.pool).await?)
    }

    async fn username_taken(&self, username: &str) -> RepoResult<bool> {
        Ok(sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM users WHERE username = $1)")
            .bind(username)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn update_profile(&self, id: Id, upd: UpdateProfile) -> RepoResult<User> {
        let sql = format!(
            "UPDATE users SET \
               first_name = COALESCE($2, first_name), \
               last_name = COALESCE($3, last_name), \
               bio = COALESCE($4, bio), \
               website = COALESCE($5, website), \
               email = COALESCE($6, email), \
               avatar = COALESCE($7, avatar), \
               updated_at = now() \
             WHERE id = $1 RETURNING {USER_COLS}"
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(upd.first_name)
            .bind(upd.last_name)
            .bind(upd.bio)
            .bind(upd.website)
            .bind(upd.email)
            .bind(upd.avatar)
            .fetch_one(&self.pool)
            .await?)
    }
}

#[async_trait]
impl PostRepo for PgRepo {
    async fn create_post(&self, new: NewPost) -> RepoResult<PostDetail> {
        let mut attempt = 0;
        let id = loop {
            match self.try_create_post(&new).await {
                Err(RepoError::Conflict) if attempt < SLUG_RETRIES => {
                    attempt += 1;
                    tracing::warn!(attempt, title = %new.title, "slug collision, retrying post insert");
                }
                other => break other?,
            }
        };
        self.get_post(id).await
    }

    async fn get_post(&self, id: Id) -> RepoResult<PostDetail> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!("{POST_SELECT} WHERE p.id = $1");
        let row = sqlx::query_as::<_, PostRow>(&sql).bind(id).fetch_one(&mut *conn).await?;
        hydrate(&mut conn, vec![row]).await?.into_iter().next().ok_or(RepoError::NotFound)
    }

    async fn list_posts(&self, filter: PostFilter) -> RepoResult<Vec<PostDetail>> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!(
            "{POST_SELECT} \
             WHERE ($1::BIGINT IS NULL OR p.author_id = $1) \
               AND ($2::TEXT IS NULL OR p.title ILIKE $2 OR p.description ILIKE $2) \
               AND ($3::TEXT IS NULL OR EXISTS ( \
                     SELECT 1 FROM post_tags pt JOIN tags t ON t.id = pt.tag_id \
                     WHERE pt.post_id = p.id AND t.name = $3)) \
             ORDER BY p.date DESC, p.id DESC"
        );
        let rows = sqlx::query_as::<_, PostRow>(&sql)
            .bind(filter.author_id)
            .bind(filter.search.as_deref().map(like_pattern))
            .bind(filter.tag)
            .fetch_all(&mut *conn)
            .await?;
        hydrate(&mut conn, rows).await
    }

    async fn update_post(&self, id: Id, actor: Id, upd: UpdatePost) -> RepoResult<PostDetail> {
        let mut tx = self.pool.begin().await?;
        if owner_for_update(&mut tx, "posts", id).await? != actor {
            return Err(RepoError::Forbidden);
        }
        sqlx::query(
            "UPDATE posts SET title = COALESCE($2, title), description = COALESCE($3, description), updated_at = now() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(upd.title.as_deref())
        .bind(upd.description.as_deref())
        .execute(&mut *tx)
        .await?;
        if let Some(tags) = &upd.tags {
            set_post_tags(&mut tx, id, tags).await?;
        }
        tx.commit().await?;
        self.get_post(id).await
    }

    async fn delete_post(&self, id: Id, actor: Id) -> RepoResult<Vec<ImageBlock>> {
        let mut tx = self.pool.begin().await?;
        if owner_for_update(&mut tx, "posts", id).await? != actor {
            return Err(RepoError::Forbidden);
        }
        let images = sqlx::query_as::<_, ImageBlock>(
            "DELETE FROM post_images WHERE post_id = $1 RETURNING id, post_id, url, alt_text, created_at",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;
        for sql in [
            "DELETE FROM notifications WHERE post_id = $1 \
               OR comment_id IN (SELECT id FROM comments WHERE post_id = $1) \
               OR reply_id IN (SELECT id FROM replies WHERE post_id = $1)",
            "DELETE FROM likes WHERE post_id = $1 \
               OR comment_id IN (SELECT id FROM comments WHERE post_id = $1) \
               OR reply_id IN (SELECT id FROM replies WHERE post_id = $1)",
            "DELETE FROM replies WHERE post_id = $1",
            "DELETE FROM comments WHERE post_id = $1",
            "DELETE FROM saved_posts WHERE post_id = $1",
            "DELETE FROM post_tags WHERE post_id = $1",
            "DELETE FROM post_maps WHERE post_id = $1",
            "DELETE FROM post_videos WHERE post_id = $1",
            "DELETE FROM post_tables WHERE post_id = $1",
            "DELETE FROM posts WHERE id = $1",
        ] {
            sqlx::query(sql).bind(id).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(images)
    }
}

#[async_trait]
impl SavedPostRepo for PgRepo {
    async fn save_post(&self, user_id: Id, post_id: Id) -> RepoResult<SavedPost> {
        Ok(sqlx::query_as::<_, SavedPost>(
            "INSERT INTO saved_posts (user_id, post_id) VALUES ($1, $2) RETURNING id, user_id, post_id, created_at",
        )
        .bind(user_id)
        .bind(post_id)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn unsave_post(&self, user_id: Id, post_id: Id) -> RepoResult<()> {
        let res = sqlx::query("DELETE FROM saved_posts WHERE user_id = $1 AND post_id = $2")
            .bind(user_id)
            .bind(post_id)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn is_saved(&self, user_id: Id, post_id: Id) -> RepoResult<bool> {
        let mut conn = self.pool.acquire().await?;
        if !exists(&mut conn, "posts", post_id).await? {
            return Err(RepoError::NotFound);
        }
        Ok(sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM saved_posts WHERE user_id = $1 AND post_id = $2)",
        )
        .bind(user_id)
        .bind(post_id)
        .fetch_one(&mut *conn)
        .await?)
    }

    async fn list_saved_posts(&self, user_id: Id) -> RepoResult<Vec<PostDetail>> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!(
            "{POST_SELECT} JOIN saved_posts s ON s.post_id = p.id WHERE s.user_id = $1 ORDER BY s.created_at DESC, s.id DESC"
        );
        let rows = sqlx::query_as::<_, PostRow>(&sql).bind(user_id).fetch_all(&mut *conn).await?;
        hydrate(&mut conn, rows).await
    }
}

#[async_trait]
impl CommentRepo for PgRepo {
    async fn create_comment(&self, new: NewComment) -> RepoResult<CommentView> {
        let mut tx = self.pool.begin().await?;
        let post_author = sqlx::query_scalar::<_, Id>("SELECT author_id FROM posts WHERE id = $1")
            .bind(new.post_id)
            .fetch_one(&mut *tx)
            .await?;
        let author = author_summary(&mut tx, new.author_id).await?;
        let sql = format!("INSERT INTO comments (post_id, author_id, content) VALUES ($1, $2, $3) RETURNING {COMMENT_COLS}");
        let comment = sqlx::query_as::<_, Comment>(&sql)
            .bind(new.post_id)
            .bind(new.author_id)
            .bind(&new.content)
            .fetch_one(&mut *tx)
            .await?;
        let planned = notify::plan(&Event {
            actor_id: new.author_id,
            actor_name: &author.name,
            recipient_id: post_author,
            kind: NotificationKind::Comment,
            refs: Refs::comment(new.post_id, comment.id),
        });
        let notified = insert_notification(&mut tx, planned).await?;
        tx.commit().await?;
        record_notification(notified);
        Ok(CommentView::new(comment, author, Vec::new()))
    }

    async fn get_comment(&self, id: Id) -> RepoResult<Comment> {
        let sql = format!("SELECT {COMMENT_COLS} FROM comments WHERE id = $1");
        Ok(sqlx::query_as::<_, Comment>(&sql).bind(id).fetch_one(&self.pool).await?)
    }

    async fn list_comments(&self, post_id: Id) -> RepoResult<Vec<CommentView>> {
        let mut conn = self.pool.acquire().await?;
        if !exists(&mut conn, "posts", post_id).await? {
            return Err(RepoError::NotFound);
        }
        let sql = format!("{COMMENT_SELECT} WHERE c.post_id = $1 ORDER BY c.created_at, c.id");
        let comments = sqlx::query_as::<_, CommentRow>(&sql).bind(post_id).fetch_all(&mut *conn).await?;
        let sql = format!("{REPLY_SELECT} WHERE r.post_id = $1 ORDER BY r.created_at, r.id");
        let replies = sqlx::query_as::<_, ReplyRow>(&sql).bind(post_id).fetch_all(&mut *conn).await?;
        let mut replies = group_by(replies, |r| r.reply.parent_id);
        Ok(comments
            .into_iter()
            .map(|c| {
                let nested = replies.remove(&c.comment.id).unwrap_or_default().into_iter().map(ReplyView::from).collect();
                c.into_view(nested)
            })
            .collect())
    }

    async fn update_comment(&self, id: Id, actor: Id, content: String) -> RepoResult<Comment> {
        let mut tx = self.pool.begin().await?;
        if owner_for_update(&mut tx, "comments", id).await? != actor {
            return Err(RepoError::Forbidden);
        }
        let sql = format!(
            "UPDATE comments SET content = $2, edited = TRUE, updated_at = now() WHERE id = $1 RETURNING {COMMENT_COLS}"
        );
        let comment = sqlx::query_as::<_, Comment>(&sql).bind(id).bind(&content).fetch_one(&mut *tx).await?;
        tx.commit().await?;
        Ok(comment)
    }

    async fn delete_comment(&self, id: Id, actor: Id) -> RepoResult<()> {
        let mut tx = self.pool.begin().await?;
        if owner_for_update(&mut tx, "comments", id).await? != actor {
            return Err(RepoError::Forbidden);
        }
        for sql in [
            "DELETE FROM likes WHERE reply_id IN (SELECT id FROM replies WHERE parent_id = $1)",
            "DELETE FROM notifications WHERE reply_id IN (SELECT id FROM replies WHERE parent_id = $1)",
            "DELETE FROM replies WHERE parent_id = $1",
            "DELETE FROM likes WHERE comment_id = $1",
            "DELETE FROM notifications WHERE comment_id = $1",
            "DELETE FROM comments WHERE id = $1",
        ] {
            sqlx::query(sql).bind(id).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl ReplyRepo for PgRepo {
    async fn create_reply(&self, new: NewReply) -> RepoResult<ReplyView> {
        let mut tx = self.pool.begin().await?;
        let (post_id, parent_author) =
            sqlx::query_as::<_, (Id, Id)>("SELECT post_id, author_id FROM comments WHERE id = $1")
                .bind(new.parent_id)
                .fetch_one(&mut *tx)
                .await?;
        let author = author_summary(&mut tx, new.author_id).await?;
        let sql = format!(
            "INSERT INTO replies (parent_id, post_id, author_id, content) VALUES ($1, $2, $3, $4) RETURNING {REPLY_COLS}"
        );
        let reply = sqlx::query_as::<_, Reply>(&sql)
            .bind(new.parent_id)
            .bind(post_id)
            .bind(new.author_id)
            .bind(&new.content)
            .fetch_one(&mut *tx)
            .await?;
        let planned = notify::plan(&Event {
            actor_id: new.author_id,
            actor_name: &author.name,
            recipient_id: parent_author,
            kind: NotificationKind::Reply,
            refs: Refs::reply(post_id, new.parent_id, reply.id),
        });
        let notified = insert_notification(&mut tx, planned).await?;
        tx.commit().await?;
        record_notification(notified);
        Ok(ReplyView::new(reply, author))
    }

    async fn get_reply(&self, id: Id) -> RepoResult<ReplyView> {
        let sql = format!("{REPLY_SELECT} WHERE r.id = $1");
        Ok(sqlx::query_as::<_, ReplyRow>(&sql).bind(id).fetch_one(&self.pool).await?.into())
    }

    async fn list_replies(&self, comment_id: Id) -> RepoResult<Vec<ReplyView>> {
        let mut conn = self.pool.acquire().await?;
        if !exists(&mut conn, "comments", comment_id).await? {
            return Err(RepoError::NotFound);
        }
        let sql = format!("{REPLY_SELECT} WHERE r.parent_id = $1 ORDER BY r.created_at, r.id");
        let rows = sqlx::query_as::<_, ReplyRow>(&sql).bind(comment_id).fetch_all(&mut *conn).await?;
        Ok(rows.into_iter().map(ReplyView::from).collect())
    }

    async fn update_reply(&self, id: Id, actor: Id, content: String) -> RepoResult<Reply> {
        let mut tx = self.pool.begin().await?;
        if owner_for_update(&mut tx, "replies", id).await? != actor {
            return Err(RepoError::Forbidden);
        }
        let sql = format!(
            "UPDATE replies SET content = $2, edited = TRUE, updated_at = now() WHERE id = $1 RETURNING {REPLY_COLS}"
        );
        let reply = sqlx::query_as::<_, Reply>(&sql).bind(id).bind(&content).fetch_one(&mut *tx).await?;
        tx.commit().await?;
        Ok(reply)
    }

    async fn delete_reply(&self, id: Id, actor: Id) -> RepoResult<()> {
        let mut tx = self.pool.begin().await?;
        if owner_for_update(&mut tx, "replies", id).await? != actor {
            return Err(RepoError::Forbidden);
        }
        for sql in [
            "DELETE FROM likes WHERE reply_id = $1",
            "DELETE FROM notifications WHERE reply_id = $1",
            "DELETE FROM replies WHERE id = $1",
        ] {
            sqlx::query(sql).bind(id).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl LikeRepo for PgRepo {
    async fn like(&self, user_id: Id, target: LikeTarget) -> RepoResult<Like> {
        let mut tx = self.pool.begin().await?;
        let (owner, post_id, parent_id) = like_target(&mut tx, target).await?;
        let actor_name = sqlx::query_scalar::<_, String>("SELECT username FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;
        let (p, c, r) = target.columns();
        let (id, created_at) = sqlx::query_as::<_, (Id, DateTime<Utc>)>(
            "INSERT INTO likes (user_id, post_id, comment_id, reply_id) VALUES ($1, $2, $3, $4) RETURNING id, created_at",
        )
        .bind(user_id)
        .bind(p)
        .bind(c)
        .bind(r)
        .fetch_one(&mut *tx)
        .await?;
        let counter = match target {
            LikeTarget::Post(_) => None,
            LikeTarget::Comment(_) => Some("UPDATE comments SET likes = likes + 1 WHERE id = $1"),
            LikeTarget::Reply(_) => Some("UPDATE replies SET likes = likes + 1 WHERE id = $1"),
        };
        if let Some(sql) = counter {
            sqlx::query(sql).bind(target.id()).execute(&mut *tx).await?;
        }
        let planned = notify::plan(&Event {
            actor_id: user_id,
            actor_name: &actor_name,
            recipient_id: owner,
            kind: target.notification_kind(),
            refs: Refs::for_like(target, post_id, parent_id),
        });
        let notified = insert_notification(&mut tx, planned).await?;
        tx.commit().await?;
        record_notification(notified);
        Ok(Like { id, user_id, target, created_at })
    }

    async fn unlike(&self, user_id: Id, target: LikeTarget) -> RepoResult<()> {
        let mut tx = self.pool.begin().await?;
        let (delete, counter) = match target {
            LikeTarget::Post(_) => ("DELETE FROM likes WHERE user_id = $1 AND post_id = $2", None),
            LikeTarget::Comment(_) => (
                "DELETE FROM likes WHERE user_id = $1 AND comment_id = $2",
                Some("UPDATE comments SET likes = GREATEST(likes - 1, 0) WHERE id = $1"),
            ),
            LikeTarget::Reply(_) => (
                "DELETE FROM likes WHERE user_id = $1 AND reply_id = $2",
                Some("UPDATE replies SET likes = GREATEST(likes - 1, 0) WHERE id = $1"),
            ),
        };
        let res = sqlx::query(delete).bind(user_id).bind(target.id()).execute(&mut *tx).await?;
        if res.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        if let Some(sql) = counter {
            sqlx::query(sql).bind(target.id()).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn like_summary(&self, target: LikeTarget, viewer: Option<Id>) -> RepoResult<LikeSummary> {
        let mut conn = self.pool.acquire().await?;
        like_target(&mut conn, target).await?;
        let sql = match target {
            LikeTarget::Post(_) => {
                "SELECT COUNT(*), COALESCE(BOOL_OR(user_id = $2), FALSE) FROM likes WHERE post_id = $1"
            }
            LikeTarget::Comment(_) => {
                "SELECT COUNT(*), COALESCE(BOOL_OR(user_id = $2), FALSE) FROM likes WHERE comment_id = $1"
            }
            LikeTarget::Reply(_) => {
                "SELECT COUNT(*), COALESCE(BOOL_OR(user_id = $2), FALSE) FROM likes WHERE reply_id = $1"
            }
        };
        let (likes, is_liked) = sqlx::query_as::<_, (i64, bool)>(sql)
            .bind(target.id())
            .bind(viewer)
            .fetch_one(&mut *conn)
            .await?;
        Ok(LikeSummary { likes, is_liked })
    }
}

#[async_trait]
impl NotificationRepo for PgRepo {
    async fn list_notifications(&self, user_id: Id) -> RepoResult<Vec<NotificationView>> {
        let rows = sqlx::query_as::<_, NotificationViewRow>(
            "SELECT n.id, n.user_id, n.actor_id, n.kind, n.post_id, n.comment_id, n.reply_id, n.notification_id, \
                    n.message, n.is_read, n.created_at, \
                    u.username AS actor_name, u.avatar AS actor_avatar, \
                    COALESCE(r.content, c.content) AS target_content \
             FROM notifications n \
             JOIN users u ON u.id = n.actor_id \
             LEFT JOIN comments c ON c.id = n.comment_id \
             LEFT JOIN replies r ON r.id = n.reply_id \
             WHERE n.user_id = $1 \
             ORDER BY n.created_at DESC, n.id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| {
                let actor = ActorSummary { id: row.notification.actor_id, name: row.actor_name, avatar: row.actor_avatar };
                Ok(NotificationView::new(row.notification.try_into()?, actor, row.target_content))
            })
            .collect()
    }

    async fn unread_count(&self, user_id: Id) -> RepoResult<i64> {
        Ok(sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND NOT is_read")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn mark_read(&self, user_id: Id, id: Id) -> RepoResult<Notification> {
        let sql = format!("UPDATE notifications SET is_read = TRUE WHERE id = $1 AND user_id = $2 RETURNING {NOTIFICATION_COLS}");
        sqlx::query_as::<_, NotificationRow>(&sql)
            .bind(id)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?
            .try_into()
    }

    async fn mark_all_read(&self, user_id: Id) -> RepoResult<u64> {
        let res = sqlx::query("UPDATE notifications SET is_read = TRUE WHERE user_id = $1 AND NOT is_read")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }

    async fn react(&self, user_id: Id, notification_id: Id, kind: String) -> RepoResult<Reaction> {
        let mut tx = self.pool.begin().await?;
        let sql = format!(
            "SELECT {NOTIFICATION_COLS} FROM notifications WHERE id = $1 AND (user_id = $2 OR actor_id = $2) FOR SHARE"
        );
        let parent: Notification = sqlx::query_as::<_, NotificationRow>(&sql)
            .bind(notification_id)
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?
            .try_into()?;
        let actor_name = sqlx::query_scalar::<_, String>("SELECT username FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;
        let sql = format!(
            "INSERT INTO notification_reactions (user_id, notification_id, kind) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id, notification_id) DO UPDATE SET kind = EXCLUDED.kind, updated_at = now() \
             RETURNING {REACTION_COLS}"
        );
        let reaction = sqlx::query_as::<_, Reaction>(&sql)
            .bind(user_id)
            .bind(notification_id)
            .bind(&kind)
            .fetch_one(&mut *tx)
            .await?;
        let planned = notify::plan(&Event {
            actor_id: user_id,
            actor_name: &actor_name,
            recipient_id: parent.counterpart(user_id),
            kind: NotificationKind::ReactionToNotification,
            refs: Refs::reaction(&parent),
        });
        let notified = insert_notification(&mut tx, planned).await?;
        tx.commit().await?;
        record_notification(notified);
        Ok(reaction)
    }

    async fn list_reactions(&self, user_id: Id, notification_id: Id) -> RepoResult<Vec<Reaction>> {
        let mut conn = self.pool.acquire().await?;
        let visible = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM notifications WHERE id = $1 AND (user_id = $2 OR actor_id = $2))",
        )
        .bind(notification_id)
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;
        if !visible {
            return Err(RepoError::NotFound);
        }
        let sql = format!("SELECT {REACTION_COLS} FROM notification_reactions WHERE notification_id = $1 ORDER BY created_at, id");
        Ok(sqlx::query_as::<_, Reaction>(&sql).bind(notification_id).fetch_all(&mut *conn).await?)
    }
}
