//! Runs against a real database when `DATABASE_URL` is set; skipped otherwise.

use blog_platform::models::{LikeTarget, NewComment, NewPost, NewReply, NewUser, NotificationKind, PostFilter, UpdatePost, User};
use blog_platform::repo::pg::PgRepo;
use blog_platform::repo::{CommentRepo, LikeRepo, NotificationRepo, PostRepo, ReplyRepo, RepoError, SavedPostRepo, UserRepo};
use sqlx::postgres::PgPoolOptions;

async fn pg_repo() -> Option<PgRepo> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(&url)
        .await
        .ok()?;
    sqlx::migrate!("./migrations").run(&pool).await.ok()?;
    Some(PgRepo::new(pool))
}

async fn user(r: &PgRepo, prefix: &str) -> User {
    let name = format!("{prefix}-{}", uuid::Uuid::new_v4().simple());
    r.create_user(NewUser { email: format!("{name}@example.com"), username: name, password_hash: "x".into() })
        .await
        .unwrap()
}

#[tokio::test]
#[serial_test::serial]
async fn pg_post_lifecycle_with_cascade() {
    let Some(r) = pg_repo().await else { eprintln!("skip: no DATABASE_URL"); return; };
    let a = user(&r, "author").await;
    let b = user(&r, "reader").await;
    let title = format!("Pg Title {}", uuid::Uuid::new_v4().simple());
    let tag = format!("tag-{}", uuid::Uuid::new_v4().simple());

    let first = r
        .create_post(NewPost {
            title: title.clone(),
            author_id: a.id,
            tags: vec![tag.clone(), tag.clone()],
            tables: vec![serde_json::value::RawValue::from_string(r#"{"rows":[[1]],"a":0}"#.into()).unwrap()],
            ..NewPost::default()
        })
        .await
        .unwrap();
    let second = r
        .create_post(NewPost { title: title.clone(), author_id: a.id, ..NewPost::default() })
        .await
        .unwrap();
    assert_eq!(second.post.slug, format!("{}-1", first.post.slug));
    assert_eq!(first.tags.len(), 1);
    assert_eq!(first.tables[0].data, r#"{"rows":[[1]],"a":0}"#);
    assert_eq!(first.author.name, a.username);

    let by_tag = r.list_posts(PostFilter { tag: Some(tag.clone()), ..PostFilter::default() }).await.unwrap();
    assert_eq!(by_tag.len(), 1);
    let upd = UpdatePost { tags: Some(vec![]), ..UpdatePost::default() };
    assert!(matches!(r.update_post(first.post.id, b.id, upd.clone()).await, Err(RepoError::Forbidden)));
    let updated = r.update_post(first.post.id, a.id, upd).await.unwrap();
    assert!(updated.tags.is_empty());

    let pid = first.post.id;
    let c = r.create_comment(NewComment { post_id: pid, author_id: b.id, content: "hi".into() }).await.unwrap();
    let reply = r.create_reply(NewReply { parent_id: c.id, author_id: a.id, content: "yo".into() }).await.unwrap();
    assert_eq!(reply.post_id, pid);

    r.like(b.id, LikeTarget::Post(pid)).await.unwrap();
    assert!(matches!(r.like(b.id, LikeTarget::Post(pid)).await, Err(RepoError::Conflict)));
    r.like(b.id, LikeTarget::Reply(reply.id)).await.unwrap();
    r.like(a.id, LikeTarget::Comment(c.id)).await.unwrap();
    assert_eq!(r.get_comment(c.id).await.unwrap().likes, 1);
    r.save_post(b.id, pid).await.unwrap();

    let a_feed = r.list_notifications(a.id).await.unwrap();
    let kinds: Vec<_> = a_feed.iter().map(|n| n.kind).collect();
    assert_eq!(a_feed.len(), 3, "{kinds:?}");
    assert!(kinds.contains(&NotificationKind::Comment));
    let like_reply = a_feed.iter().find(|n| n.kind == NotificationKind::LikeReply).unwrap();
    assert_eq!(like_reply.target_content.as_deref(), Some("yo"));
    assert_eq!(like_reply.actor.name, b.username);

    // unlike + like again does not duplicate
    r.unlike(b.id, LikeTarget::Post(pid)).await.unwrap();
    r.like(b.id, LikeTarget::Post(pid)).await.unwrap();
    assert_eq!(r.unread_count(a.id).await.unwrap(), 3);

    r.delete_comment(c.id, b.id).await.unwrap();
    assert!(matches!(r.get_reply(reply.id).await, Err(RepoError::NotFound)));
    let kinds: Vec<_> = r.list_notifications(a.id).await.unwrap().into_iter().map(|n| n.kind).collect();
    assert_eq!(kinds, [NotificationKind::LikePost]);

    assert!(matches!(r.delete_post(pid, b.id).await, Err(RepoError::Forbidden)));
    r.delete_post(pid, a.id).await.unwrap();
    assert!(matches!(r.get_post(pid).await, Err(RepoError::NotFound)));
    assert!(r.list_notifications(a.id).await.unwrap().is_empty());
    assert!(r.list_saved_posts(b.id).await.unwrap().is_empty());
    r.delete_post(second.post.id, a.id).await.unwrap();
}

#[tokio::test]
#[serial_test::serial]
async fn pg_notification_read_state() {
    let Some(r) = pg_repo().await else { eprintln!("skip: no DATABASE_URL"); return; };
    let a = user(&r, "owner").await;
    let b = user(&r, "fan").await;
    let pid = r
        .create_post(NewPost { title: "read state".into(), author_id: a.id, ..NewPost::default() })
        .await
        .unwrap()
        .post
        .id;
    r.like(b.id, LikeTarget::Post(pid)).await.unwrap();
    r.like(a.id, LikeTarget::Post(pid)).await.unwrap();

    let feed = r.list_notifications(a.id).await.unwrap();
    assert_eq!(feed.len(), 1);

    let c = user(&r, "stranger").await;
    assert!(matches!(r.react(c.id, feed[0].id, "like".into()).await, Err(RepoError::NotFound)));
    let first = r.react(a.id, feed[0].id, "like".into()).await.unwrap();
    let again = r.react(a.id, feed[0].id, "emoji".into()).await.unwrap();
    assert_eq!((first.id, again.kind.as_str()), (again.id, "emoji"));
    let reactions = r.list_reactions(b.id, feed[0].id).await.unwrap();
    assert_eq!(reactions.len(), 1);
    let b_feed = r.list_notifications(b.id).await.unwrap();
    assert_eq!(b_feed.len(), 1);
    assert_eq!(b_feed[0].kind, NotificationKind::ReactionToNotification);
    assert_eq!(b_feed[0].notification_id, Some(feed[0].id));

    assert!(matches!(r.mark_read(b.id, feed[0].id).await, Err(RepoError::NotFound)));
    assert!(r.mark_read(a.id, feed[0].id).await.unwrap().is_read);
    assert_eq!(r.mark_all_read(a.id).await.unwrap(), 0);
    assert_eq!(r.unread_count(a.id).await.unwrap(), 0);
    r.delete_post(pid, a.id).await.unwrap();
    assert!(r.list_notifications(b.id).await.unwrap().is_empty());
    assert!(matches!(r.list_reactions(a.id, feed[0].id).await, Err(RepoError::NotFound)));
}
