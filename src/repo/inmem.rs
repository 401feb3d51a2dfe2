//! Lock-protected in-memory store. Each operation takes the write lock once,
//! so multi-row mutations are all-or-nothing just like the Postgres
//! transactions.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;

use super::*;
use crate::notify::{self, Event, Refs};
use crate::{slug, telemetry};

#[derive(Default)]
struct State {
    users: BTreeMap<Id, User>,
    posts: BTreeMap<Id, Post>,
    tags: BTreeMap<Id, Tag>,
    post_tags: BTreeSet<(Id, Id)>,
    images: BTreeMap<Id, ImageBlock>,
    maps: BTreeMap<Id, MapBlock>,
    videos: BTreeMap<Id, VideoBlock>,
    tables: BTreeMap<Id, TableBlock>,
    comments: BTreeMap<Id, Comment>,
    replies: BTreeMap<Id, Reply>,
    likes: BTreeMap<Id, Like>,
    notifications: BTreeMap<Id, Notification>,
    reactions: BTreeMap<Id, Reaction>,
    saved: BTreeMap<Id, SavedPost>,
    next_id: Id,
}

impl State {
    fn next_id(&mut self) -> Id {
        self.next_id += 1;
        self.next_id
    }

    fn username(&self, id: Id) -> RepoResult<String> {
        self.users.get(&id).map(|u| u.username.clone()).ok_or(RepoError::NotFound)
    }

    fn author(&self, id: Id) -> AuthorSummary {
        self.users
            .get(&id)
            .map(AuthorSummary::from)
            .unwrap_or(AuthorSummary { id, name: String::new(), image_url: String::new() })
    }

    fn detail(&self, post: &Post) -> PostDetail {
        let pid = post.id;
        PostDetail {
            post: post.clone(),
            author: self.author(post.author_id),
            tags: self
                .post_tags
                .iter()
                .filter(|(p, _)| *p == pid)
                .filter_map(|(_, t)| self.tags.get(t).cloned())
                .collect(),
            images: self.images.values().filter(|b| b.post_id == pid).cloned().collect(),
            maps: self.maps.values().filter(|b| b.post_id == pid).cloned().collect(),
            videos: self.videos.values().filter(|b| b.post_id == pid).cloned().collect(),
            tables: self.tables.values().filter(|b| b.post_id == pid).cloned().collect(),
            likes: self.likes.values().filter(|l| l.target == LikeTarget::Post(pid)).count() as i64,
        }
    }

    fn reply_view(&self, r: &Reply) -> ReplyView {
        ReplyView::new(r.clone(), self.author(r.author_id))
    }

    fn comment_view(&self, c: &Comment) -> CommentView {
        let replies = self.replies.values().filter(|r| r.parent_id == c.id).map(|r| self.reply_view(r)).collect();
        CommentView::new(c.clone(), self.author(c.author_id), replies)
    }

    fn set_post_tags(&mut self, post_id: Id, names: &[String]) {
        self.post_tags.retain(|(p, _)| *p != post_id);
        for name in normalize_tags(names) {
            let existing = self.tags.values().find(|t| t.name == name).map(|t| t.id);
            let tag_id = match existing {
                Some(id) => id,
                None => {
                    let id = self.next_id();
                    self.tags.insert(id, Tag { id, name, created_at: Utc::now() });
                    id
                }
            };
            self.post_tags.insert((post_id, tag_id));
        }
    }

    /// Insert-or-ignore on `(user_id, actor_id, kind, target)`.
    fn notify(&mut self, planned: Option<NewNotification>) {
        let Some(n) = planned else { return };
        let target = n.target_id();
        let duplicate = self.notifications.values().any(|e| {
            e.user_id == n.user_id && e.actor_id == n.actor_id && e.kind == n.kind && e.target_id() == target
        });
        if duplicate {
            return;
        }
        let id = self.next_id();
        telemetry::notification_created(n.kind.as_str());
        self.notifications.insert(
            id,
            Notification {
                id,
                user_id: n.user_id,
                actor_id: n.actor_id,
                kind: n.kind,
                post_id: n.post_id,
                comment_id: n.comment_id,
                reply_id: n.reply_id,
                notification_id: n.notification_id,
                message: n.message,
                is_read: false,
                created_at: Utc::now(),
            },
        );
    }

    /// `(owner, post_id, parent comment)` of a like target.
    fn like_target(&self, target: LikeTarget) -> RepoResult<(Id, Id, Option<Id>)> {
        match target {
            LikeTarget::Post(id) => self.posts.get(&id).map(|p| (p.author_id, p.id, None)),
            LikeTarget::Comment(id) => self.comments.get(&id).map(|c| (c.author_id, c.post_id, None)),
            LikeTarget::Reply(id) => self.replies.get(&id).map(|r| (r.author_id, r.post_id, Some(r.parent_id))),
        }
        .ok_or(RepoError::NotFound)
    }

    fn bump_likes(&mut self, target: LikeTarget, delta: i64) {
        let counter = match target {
            LikeTarget::Post(_) => None,
            LikeTarget::Comment(id) => self.comments.get_mut(&id).map(|c| &mut c.likes),
            LikeTarget::Reply(id) => self.replies.get_mut(&id).map(|r| &mut r.likes),
        };
        if let Some(likes) = counter {
            *likes = (*likes + delta).max(0);
        }
    }

    fn drop_orphaned_reactions(&mut self) {
        let notifications = &self.notifications;
        self.reactions.retain(|_, r| notifications.contains_key(&r.notification_id));
    }

    fn purge_reply(&mut self, reply_id: Id) {
        self.likes.retain(|_, l| l.target != LikeTarget::Reply(reply_id));
        self.notifications.retain(|_, n| n.reply_id != Some(reply_id));
        self.drop_orphaned_reactions();
        self.replies.remove(&reply_id);
    }

    fn purge_comment(&mut self, comment_id: Id) {
        let replies: Vec<Id> = self.replies.values().filter(|r| r.parent_id == comment_id).map(|r| r.id).collect();
        for reply_id in replies {
            self.purge_reply(reply_id);
        }
        self.likes.retain(|_, l| l.target != LikeTarget::Comment(comment_id));
        self.notifications.retain(|_, n| n.comment_id != Some(comment_id));
        self.drop_orphaned_reactions();
        self.comments.remove(&comment_id);
    }

    fn purge_post(&mut self, post_id: Id) {
        let comments: Vec<Id> = self.comments.values().filter(|c| c.post_id == post_id).map(|c| c.id).collect();
        for comment_id in comments {
            self.purge_comment(comment_id);
        }
        self.likes.retain(|_, l| l.target != LikeTarget::Post(post_id));
        self.notifications.retain(|_, n| n.post_id != Some(post_id));
        self.drop_orphaned_reactions();
        self.saved.retain(|_, s| s.post_id != post_id);
        self.post_tags.retain(|(p, _)| *p != post_id);
        self.images.retain(|_, b| b.post_id != post_id);
        self.maps.retain(|_, b| b.post_id != post_id);
        self.videos.retain(|_, b| b.post_id != post_id);
        self.tables.retain(|_, b| b.post_id != post_id);
        self.posts.remove(&post_id);
    }
}

#[derive(Clone, Default)]
pub struct InMemRepo {
    state: Arc<RwLock<State>>,
}

impl InMemRepo {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RepoResult<RwLockReadGuard<'_, State>> {
        self.state.read().map_err(|_| RepoError::Internal("state lock poisoned".into()))
    }

    fn write(&self) -> RepoResult<RwLockWriteGuard<'_, State>> {
        self.state.write().map_err(|_| RepoError::Internal("state lock poisoned".into()))
    }
}

#[async_trait]
impl UserRepo for InMemRepo {
    async fn create_user(&self, new: NewUser) -> RepoResult<User> {
        let mut s = self.write()?;
        if s.users.values().any(|u| u.username == new.username || u.email == new.email) {
            return Err(RepoError::Conflict);
        }
        let id = s.next_id();
        let now = Utc::now();
        let user = User {
            id,
            username: new.username,
            email: new.email,
            password_hash: new.password_hash,
            first_name: String::new(),
            last_name: String::new(),
            bio: String::new(),
            website: String::new(),
            avatar: String::new(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        s.users.insert(id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: Id) -> RepoResult<User> {
        self.read()?.users.get(&id).cloned().ok_or(RepoError::NotFound)
    }

    async fn find_user_by_login(&self, login: &str) -> RepoResult<User> {
        let s = self.read()?;
        s.users
            .values()
            .find(|u| u.username == login)
            .or_else(|| s.users.values().find(|u| u.email == login))
            .cloned()
            .ok_or(RepoError::NotFound)
    }

    async fn username_taken(&self, username: &str) -> RepoResult<bool> {
        Ok(self.read()?.users.values().any(|u| u.username == username))
    }

    async fn update_profile(&self, id: Id, upd: UpdateProfile) -> RepoResult<User> {
        let mut s = self.write()?;
        if let Some(ref email) = upd.email {
            if s.users.values().any(|u| u.email == *email && u.id != id) {
                return Err(RepoError::Conflict);
            }
        }
        let user = s.users.get_mut(&id).ok_or(RepoError::NotFound)?;
        if let Some(v) = upd.first_name { user.first_name = v; }
        if let Some(v) = upd.last_name { user.last_name = v; }
        if let Some(v) = upd.bio { user.bio = v; }
        if let Some(v) = upd.website { user.website = v; }
        if let Some(v) = upd.email { user.email = v; }
        if let Some(v) = upd.avatar { user.avatar = v; }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }
}

#[async_trait]
impl PostRepo for InMemRepo {
    async fn create_post(&self, new: NewPost) -> RepoResult<PostDetail> {
        let tables: Vec<String> = new.tables.iter().map(|raw| raw.get().to_string()).collect();

        let mut s = self.write()?;
        if !s.users.contains_key(&new.author_id) {
            return Err(RepoError::NotFound);
        }
        let base = slug::base(&new.title);
        let slug = slug::first_free(&base, |c| s.posts.values().any(|p| p.slug == c));
        let id = s.next_id();
        let now = Utc::now();
        let post = Post {
            id,
            title: new.title,
            slug,
            description: new.description,
            author_id: new.author_id,
            date: now,
            updated_at: now,
        };
        s.posts.insert(id, post.clone());
        for img in new.images {
            let bid = s.next_id();
            s.images.insert(bid, ImageBlock { id: bid, post_id: id, url: img.url, alt_text: img.alt_text, created_at: now });
        }
        for m in new.maps {
            let bid = s.next_id();
            s.maps.insert(bid, MapBlock { id: bid, post_id: id, latitude: m.latitude, longitude: m.longitude, created_at: now });
        }
        for v in new.videos {
            let bid = s.next_id();
            s.videos.insert(bid, VideoBlock { id: bid, post_id: id, url: v.url, caption: v.caption, created_at: now });
        }
        for data in tables {
            let bid = s.next_id();
            s.tables.insert(bid, TableBlock { id: bid, post_id: id, data, created_at: now });
        }
        s.set_post_tags(id, &new.tags);
        Ok(s.detail(&post))
    }

    async fn get_post(&self, id: Id) -> RepoResult<PostDetail> {
        let s = self.read()?;
        let post = s.posts.get(&id).ok_or(RepoError::NotFound)?;
        Ok(s.detail(post))
    }

    async fn list_posts(&self, filter: PostFilter) -> RepoResult<Vec<PostDetail>> {
        let s = self.read()?;
        let needle = filter.search.as_ref().map(|q| q.to_lowercase());
        let tag_id = match filter.tag {
            Some(ref name) => match s.tags.values().find(|t| t.name == *name) {
                Some(t) => Some(t.id),
                None => return Ok(Vec::new()),
            },
            None => None,
        };
        let mut posts: Vec<&Post> = s
            .posts
            .values()
            .filter(|p| filter.author_id.map_or(true, |a| p.author_id == a))
            .filter(|p| {
                needle.as_ref().map_or(true, |q| {
                    p.title.to_lowercase().contains(q.as_str()) || p.description.to_lowercase().contains(q.as_str())
                })
            })
            .filter(|p| tag_id.map_or(true, |t| s.post_tags.contains(&(p.id, t))))
            .collect();
        posts.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));
        Ok(posts.into_iter().map(|p| s.detail(p)).collect())
    }

    async fn update_post(&self, id: Id, actor: Id, upd: UpdatePost) -> RepoResult<PostDetail> {
        let mut s = self.write()?;
        let post = s.posts.get_mut(&id).ok_or(RepoError::NotFound)?;
        if post.author_id != actor {
            return Err(RepoError::Forbidden);
        }
        if let Some(title) = upd.title { post.title = title; }
        if let Some(description) = upd.description { post.description = description; }
        post.updated_at = Utc::now();
        let post = post.clone();
        if let Some(tags) = upd.tags {
            s.set_post_tags(id, &tags);
        }
        Ok(s.detail(&post))
    }

    async fn delete_post(&self, id: Id, actor: Id) -> RepoResult<Vec<ImageBlock>> {
        let mut s = self.write()?;
        let post = s.posts.get(&id).ok_or(RepoError::NotFound)?;
        if post.author_id != actor {
            return Err(RepoError::Forbidden);
        }
        let images = s.images.values().filter(|b| b.post_id == id).cloned().collect();
        s.purge_post(id);
        Ok(images)
    }
}

#[async_trait]
impl SavedPostRepo for InMemRepo {
    async fn save_post(&self, user_id: Id, post_id: Id) -> RepoResult<SavedPost> {
        let mut s = self.write()?;
        if !s.posts.contains_key(&post_id) || !s.users.contains_key(&user_id) {
            return Err(RepoError::NotFound);
        }
        if s.saved.values().any(|sp| sp.user_id == user_id && sp.post_id == post_id) {
            return Err(RepoError::Conflict);
        }
        let id = s.next_id();
        let saved = SavedPost { id, user_id, post_id, created_at: Utc::now() };
        s.saved.insert(id, saved.clone());
        Ok(saved)
    }

    async fn unsave_post(&self, user_id: Id, post_id: Id) -> RepoResult<()> {
        let mut s = self.write()?;
        let id = s
            .saved
            .values()
            .find(|sp| sp.user_id == user_id && sp.post_id == post_id)
            .map(|sp| sp.id)
            .ok_or(RepoError::NotFound)?;
        s.saved.remove(&id);
        Ok(())
    }

    async fn is_saved(&self, user_id: Id, post_id: Id) -> RepoResult<bool> {
        let s = self.read()?;
        if !s.posts.contains_key(&post_id) {
            return Err(RepoError::NotFound);
        }
        Ok(s.saved.values().any(|sp| sp.user_id == user_id && sp.post_id == post_id))
    }

    async fn list_saved_posts(&self, user_id: Id) -> RepoResult<Vec<PostDetail>> {
        let s = self.read()?;
        Ok(s.saved
            .values()
            .rev()
            .filter(|sp| sp.user_id == user_id)
            .filter_map(|sp| s.posts.get(&sp.post_id))
            .map(|p| s.detail(p))
            .collect())
    }
}

#[async_trait]
impl CommentRepo for InMemRepo {
    async fn create_comment(&self, new: NewComment) -> RepoResult<CommentView> {
        let mut s = self.write()?;
        let post_author = s.posts.get(&new.post_id).map(|p| p.author_id).ok_or(RepoError::NotFound)?;
        let actor_name = s.username(new.author_id)?;
        let id = s.next_id();
        let now = Utc::now();
        let comment = Comment {
            id,
            post_id: new.post_id,
            author_id: new.author_id,
            content: new.content,
            likes: 0,
            edited: false,
            created_at: now,
            updated_at: now,
        };
        s.comments.insert(id, comment.clone());
        s.notify(notify::plan(&Event {
            actor_id: new.author_id,
            actor_name: &actor_name,
            recipient_id: post_author,
            kind: NotificationKind::Comment,
            refs: Refs::comment(new.post_id, id),
        }));
        Ok(s.comment_view(&comment))
    }

    async fn get_comment(&self, id: Id) -> RepoResult<Comment> {
        self.read()?.comments.get(&id).cloned().ok_or(RepoError::NotFound)
    }

    async fn list_comments(&self, post_id: Id) -> RepoResult<Vec<CommentView>> {
        let s = self.read()?;
        if !s.posts.contains_key(&post_id) {
            return Err(RepoError::NotFound);
        }
        Ok(s.comments.values().filter(|c| c.post_id == post_id).map(|c| s.comment_view(c)).collect())
    }

    async fn update_comment(&self, id: Id, actor: Id, content: String) -> RepoResult<Comment> {
        let mut s = self.write()?;
        let comment = s.comments.get_mut(&id).ok_or(RepoError::NotFound)?;
        if comment.author_id != actor {
            return Err(RepoError::Forbidden);
        }
        comment.content = content;
        comment.edited = true;
        comment.updated_at = Utc::now();
        Ok(comment.clone())
    }

    async fn delete_comment(&self, id: Id, actor: Id) -> RepoResult<()> {
        let mut s = self.write()?;
        let comment = s.comments.get(&id).ok_or(RepoError::NotFound)?;
        if comment.author_id != actor {
            return Err(RepoError::Forbidden);
        }
        s.purge_comment(id);
        Ok(())
    }
}

#[async_trait]
impl ReplyRepo for InMemRepo {
    async fn create_reply(&self, new: NewReply) -> RepoResult<ReplyView> {
        let mut s = self.write()?;
        let (post_id, parent_author) = s
            .comments
            .get(&new.parent_id)
            .map(|c| (c.post_id, c.author_id))
            .ok_or(RepoError::NotFound)?;
        let actor_name = s.username(new.author_id)?;
        let id = s.next_id();
        let now = Utc::now();
        let reply = Reply {
            id,
            parent_id: new.parent_id,
            post_id,
            author_id: new.author_id,
            content: new.content,
            likes: 0,
            edited: false,
            created_at: now,
            updated_at: now,
        };
        s.replies.insert(id, reply.clone());
        s.notify(notify::plan(&Event {
            actor_id: new.author_id,
            actor_name: &actor_name,
            recipient_id: parent_author,
            kind: NotificationKind::Reply,
            refs: Refs::reply(post_id, new.parent_id, id),
        }));
        Ok(s.reply_view(&reply))
    }

    async fn get_reply(&self, id: Id) -> RepoResult<ReplyView> {
        let s = self.read()?;
        let reply = s.replies.get(&id).ok_or(RepoError::NotFound)?;
        Ok(s.reply_view(reply))
    }

    async fn list_replies(&self, comment_id: Id) -> RepoResult<Vec<ReplyView>> {
        let s = self.read()?;
        if !s.comments.contains_key(&comment_id) {
            return Err(RepoError::NotFound);
        }
        Ok(s.replies.values().filter(|r| r.parent_id == comment_id).map(|r| s.reply_view(r)).collect())
    }

    async fn update_reply(&self, id: Id, actor: Id, content: String) -> RepoResult<Reply> {
        let mut s = self.write()?;
        let reply = s.replies.get_mut(&id).ok_or(RepoError::NotFound)?;
        if reply.author_id != actor {
            return Err(RepoError::Forbidden);
        }
        reply.content = content;
        reply.edited = true;
        reply.updated_at = Utc::now();
        Ok(reply.clone())
    }

    async fn delete_reply(&self, id: Id, actor: Id) -> RepoResult<()> {
        let mut s = self.write()?;
        let reply = s.replies.get(&id).ok_or(RepoError::NotFound)?;
        if reply.author_id != actor {
            return Err(RepoError::Forbidden);
        }
        s.purge_reply(id);
        Ok(())
    }
}

#[async_trait]
impl LikeRepo for InMemRepo {
    async fn like(&self, user_id: Id, target: LikeTarget) -> RepoResult<Like> {
        let mut s = self.write()?;
        let (owner, post_id, parent_id) = s.like_target(target)?;
        let actor_name = s.username(user_id)?;
        if s.likes.values().any(|l| l.user_id == user_id && l.target == target) {
            return Err(RepoError::Conflict);
        }
        let id = s.next_id();
        let like = Like { id, user_id, target, created_at: Utc::now() };
        s.likes.insert(id, like.clone());
        s.bump_likes(target, 1);
        s.notify(notify::plan(&Event {
            actor_id: user_id,
            actor_name: &actor_name,
            recipient_id: owner,
            kind: target.notification_kind(),
            refs: Refs::for_like(target, post_id, parent_id),
        }));
        Ok(like)
    }

    async fn unlike(&self, user_id: Id, target: LikeTarget) -> RepoResult<()> {
        let mut s = self.write()?;
        let id = s
            .likes
            .values()
            .find(|l| l.user_id == user_id && l.target == target)
            .map(|l| l.id)
            .ok_or(RepoError::NotFound)?;
        s.likes.remove(&id);
        s.bump_likes(target, -1);
        Ok(())
    }

    async fn like_summary(&self, target: LikeTarget, viewer: Option<Id>) -> RepoResult<LikeSummary> {
        let s = self.read()?;
        s.like_target(target)?;
        let mut likes = 0;
        let mut is_liked = false;
        for l in s.likes.values().filter(|l| l.target == target) {
            likes += 1;
            is_liked |= Some(l.user_id) == viewer;
        }
        Ok(LikeSummary { likes, is_liked })
    }
}

#[async_trait]
impl NotificationRepo for InMemRepo {
    async fn list_notifications(&self, user_id: Id) -> RepoResult<Vec<NotificationView>> {
        let s = self.read()?;
        Ok(s.notifications
            .values()
            .rev()
            .filter(|n| n.user_id == user_id)
            .map(|n| {
                let actor = s
                    .users
                    .get(&n.actor_id)
                    .map(ActorSummary::from)
                    .unwrap_or(ActorSummary { id: n.actor_id, name: String::new(), avatar: String::new() });
                let target_content = match (n.reply_id, n.comment_id) {
                    (Some(r), _) => s.replies.get(&r).map(|r| r.content.clone()),
                    (None, Some(c)) => s.comments.get(&c).map(|c| c.content.clone()),
                    (None, None) => None,
                };
                NotificationView::new(n.clone(), actor, target_content)
            })
            .collect())
    }

    async fn unread_count(&self, user_id: Id) -> RepoResult<i64> {
        Ok(self.read()?.notifications.values().filter(|n| n.user_id == user_id && !n.is_read).count() as i64)
    }

    async fn mark_read(&self, user_id: Id, id: Id) -> RepoResult<Notification> {
        let mut s = self.write()?;
        let n = s.notifications.get_mut(&id).filter(|n| n.user_id == user_id).ok_or(RepoError::NotFound)?;
        n.is_read = true;
        Ok(n.clone())
    }

    async fn mark_all_read(&self, user_id: Id) -> RepoResult<u64> {
        let mut s = self.write()?;
        let mut changed = 0;
        for n in s.notifications.values_mut().filter(|n| n.user_id == user_id && !n.is_read) {
            n.is_read = true;
            changed += 1;
        }
        Ok(changed)
    }

    async fn react(&self, user_id: Id, notification_id: Id, kind: String) -> RepoResult<Reaction> {
        let mut s = self.write()?;
        let parent = s
            .notifications
            .get(&notification_id)
            .filter(|n| n.involves(user_id))
            .cloned()
            .ok_or(RepoError::NotFound)?;
        let actor_name = s.username(user_id)?;
        let now = Utc::now();
        let existing = s
            .reactions
            .values()
            .find(|r| r.user_id == user_id && r.notification_id == notification_id)
            .map(|r| r.id);
        let reaction = match existing {
            Some(id) => {
                let r = s.reactions.get_mut(&id).ok_or(RepoError::NotFound)?;
                r.kind = kind;
                r.updated_at = now;
                r.clone()
            }
            None => {
                let id = s.next_id();
                let r = Reaction { id, user_id, notification_id, kind, created_at: now, updated_at: now };
                s.reactions.insert(id, r.clone());
                r
            }
        };
        s.notify(notify::plan(&Event {
            actor_id: user_id,
            actor_name: &actor_name,
            recipient_id: parent.counterpart(user_id),
            kind: NotificationKind::ReactionToNotification,
            refs: Refs::reaction(&parent),
        }));
        Ok(reaction)
    }

    async fn list_reactions(&self, user_id: Id, notification_id: Id) -> RepoResult<Vec<Reaction>> {
        let s = self.read()?;
        s.notifications.get(&notification_id).filter(|n| n.involves(user_id)).ok_or(RepoError::NotFound)?;
        Ok(s.reactions.values().filter(|r| r.notification_id == notification_id).cloned().collect())
    }
}
