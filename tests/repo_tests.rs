use blog_platform::models::{
    LikeTarget, NewComment, NewImage, NewPost, NewReply, NewUser, NotificationKind, PostFilter, UpdatePost, User,
};
use blog_platform::repo::{inmem::InMemRepo, RepoError};
// Bring trait method namespaces into scope so calls on InMemRepo resolve.
use blog_platform::repo::{CommentRepo, LikeRepo, NotificationRepo, PostRepo, ReplyRepo, SavedPostRepo, UserRepo};

async fn user(r: &InMemRepo, name: &str) -> User {
    r.create_user(NewUser { username: name.into(), email: format!("{name}@example.com"), password_hash: "x".into() })
        .await
        .unwrap()
}

fn raw(json: &str) -> Box<serde_json::value::RawValue> {
    serde_json::value::RawValue::from_string(json.to_string()).unwrap()
}

fn post(author: &User, title: &str) -> NewPost {
    NewPost { title: title.into(), author_id: author.id, ..NewPost::default() }
}

#[tokio::test]
async fn users_are_unique_and_findable() {
    let r = InMemRepo::new();
    let alice = user(&r, "alice").await;

    let err = r
        .create_user(NewUser { username: "alice".into(), email: "other@example.com".into(), password_hash: String::new() })
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::Conflict));
    let err = r
        .create_user(NewUser { username: "alice2".into(), email: "alice@example.com".into(), password_hash: String::new() })
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::Conflict));

    assert_eq!(r.find_user_by_login("alice").await.unwrap().id, alice.id);
    assert_eq!(r.find_user_by_login("alice@example.com").await.unwrap().id, alice.id);
    assert!(matches!(r.find_user_by_login("ghost").await, Err(RepoError::NotFound)));
    assert!(r.username_taken("alice").await.unwrap());
    assert!(!r.username_taken("bob").await.unwrap());
}

#[tokio::test]
async fn slugs_take_the_next_free_suffix() {
    let r = InMemRepo::new();
    let a = user(&r, "a").await;
    let slugs: Vec<String> = {
        let mut out = Vec::new();
        for _ in 0..3 {
            out.push(r.create_post(post(&a, "Same Title")).await.unwrap().post.slug);
        }
        out
    };
    assert_eq!(slugs, ["same-title", "same-title-1", "same-title-2"]);
    assert_eq!(r.create_post(post(&a, "!!!")).await.unwrap().post.slug, "post");
}

#[tokio::test]
async fn tags_are_shared_and_replaced() {
    let r = InMemRepo::new();
    let a = user(&r, "a").await;
    let p1 = r
        .create_post(NewPost { tags: vec!["rust".into(), "web".into()], ..post(&a, "one") })
        .await
        .unwrap();
    let p2 = r.create_post(NewPost { tags: vec!["rust".into()], ..post(&a, "two") }).await.unwrap();
    let rust_1 = p1.tags.iter().find(|t| t.name == "rust").unwrap().id;
    assert_eq!(p2.tags[0].id, rust_1);

    let updated = r
        .update_post(p1.post.id, a.id, UpdatePost { tags: Some(vec!["go".into()]), ..UpdatePost::default() })
        .await
        .unwrap();
    assert_eq!(updated.tags.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(), ["go"]);

    let by_tag = r.list_posts(PostFilter { tag: Some("rust".into()), ..PostFilter::default() }).await.unwrap();
    assert_eq!(by_tag.len(), 1);
    assert_eq!(by_tag[0].post.id, p2.post.id);

    // untouched fields survive a partial update
    let kept = r.update_post(p2.post.id, a.id, UpdatePost::default()).await.unwrap();
    assert_eq!(kept.post.title, "two");
    assert_eq!(kept.tags.len(), 1);
}

#[tokio::test]
async fn only_authors_mutate() {
    let r = InMemRepo::new();
    let a = user(&r, "a").await;
    let b = user(&r, "b").await;
    let p = r.create_post(post(&a, "mine")).await.unwrap().post.id;
    let c = r.create_comment(NewComment { post_id: p, author_id: a.id, content: "c".into() }).await.unwrap().id;
    let re = r.create_reply(NewReply { parent_id: c, author_id: a.id, content: "r".into() }).await.unwrap().id;

    let upd = UpdatePost { title: Some("stolen".into()), ..UpdatePost::default() };
    assert!(matches!(r.update_post(p, b.id, upd).await, Err(RepoError::Forbidden)));
    assert!(matches!(r.delete_post(p, b.id).await, Err(RepoError::Forbidden)));
    assert!(matches!(r.update_comment(c, b.id, "x".into()).await, Err(RepoError::Forbidden)));
    assert!(matches!(r.delete_comment(c, b.id).await, Err(RepoError::Forbidden)));
    assert!(matches!(r.update_reply(re, b.id, "x".into()).await, Err(RepoError::Forbidden)));
    assert!(matches!(r.delete_reply(re, b.id).await, Err(RepoError::Forbidden)));

    assert_eq!(r.get_post(p).await.unwrap().post.title, "mine");
    assert_eq!(r.get_comment(c).await.unwrap().content, "c");
    assert_eq!(r.get_reply(re).await.unwrap().content, "r");
}

#[tokio::test]
async fn replies_inherit_the_parent_post() {
    let r = InMemRepo::new();
    let a = user(&r, "a").await;
    let b = user(&r, "b").await;
    let p = r.create_post(post(&a, "p")).await.unwrap().post.id;
    let c = r.create_comment(NewComment { post_id: p, author_id: b.id, content: "c".into() }).await.unwrap();
    let reply = r.create_reply(NewReply { parent_id: c.id, author_id: a.id, content: "r".into() }).await.unwrap();
    assert_eq!(reply.post_id, p);
    assert_eq!(reply.author.name, "a");

    let err = r.create_reply(NewReply { parent_id: 424242, author_id: a.id, content: "r".into() }).await.unwrap_err();
    assert!(matches!(err, RepoError::NotFound));
}

#[tokio::test]
async fn likes_are_unique_and_counted() {
    let r = InMemRepo::new();
    let a = user(&r, "a").await;
    let b = user(&r, "b").await;
    let p = r.create_post(post(&a, "p")).await.unwrap().post.id;
    let c = r.create_comment(NewComment { post_id: p, author_id: a.id, content: "c".into() }).await.unwrap().id;
    let target = LikeTarget::Comment(c);

    let like = r.like(b.id, target).await.unwrap();
    assert_eq!(like.target, target);
    assert!(matches!(r.like(b.id, target).await, Err(RepoError::Conflict)));
    assert_eq!(r.get_comment(c).await.unwrap().likes, 1);

    let s = r.like_summary(target, Some(b.id)).await.unwrap();
    assert_eq!((s.likes, s.is_liked), (1, true));
    let s = r.like_summary(target, Some(a.id)).await.unwrap();
    assert!(!s.is_liked);

    r.unlike(b.id, target).await.unwrap();
    assert!(matches!(r.unlike(b.id, target).await, Err(RepoError::NotFound)));
    assert_eq!(r.get_comment(c).await.unwrap().likes, 0);

    assert!(matches!(r.like(b.id, LikeTarget::Reply(999)).await, Err(RepoError::NotFound)));
    assert!(matches!(r.like_summary(LikeTarget::Post(999), None).await, Err(RepoError::NotFound)));
}

#[tokio::test]
async fn notifications_are_deduplicated_and_never_self_addressed() {
    let r = InMemRepo::new();
    let a = user(&r, "a").await;
    let b = user(&r, "b").await;
    let p = r.create_post(post(&a, "p")).await.unwrap().post.id;

    r.like(b.id, LikeTarget::Post(p)).await.unwrap();
    r.unlike(b.id, LikeTarget::Post(p)).await.unwrap();
    r.like(b.id, LikeTarget::Post(p)).await.unwrap();
    r.like(a.id, LikeTarget::Post(p)).await.unwrap();

    let list = r.list_notifications(a.id).await.unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].kind, NotificationKind::LikePost);
    assert_eq!(list[0].actor.name, "b");
    assert_eq!(list[0].message, "b liked your post");
    assert!(r.list_notifications(b.id).await.unwrap().is_empty());

    // a different actor on the same target is a separate notification
    let c = user(&r, "c").await;
    r.like(c.id, LikeTarget::Post(p)).await.unwrap();
    assert_eq!(r.unread_count(a.id).await.unwrap(), 2);

    let newest = &r.list_notifications(a.id).await.unwrap()[0];
    assert_eq!(newest.actor_id, c.id);
    assert!(matches!(r.mark_read(b.id, newest.id).await, Err(RepoError::NotFound)));
    assert!(r.mark_read(a.id, newest.id).await.unwrap().is_read);
    assert_eq!(r.mark_all_read(a.id).await.unwrap(), 1);
    assert_eq!(r.mark_all_read(a.id).await.unwrap(), 0);
    assert_eq!(r.unread_count(a.id).await.unwrap(), 0);
}

#[tokio::test]
async fn reactions_notify_the_other_party_once() {
    let r = InMemRepo::new();
    let a = user(&r, "a").await;
    let b = user(&r, "b").await;
    let c = user(&r, "c").await;
    let p = r.create_post(post(&a, "p")).await.unwrap().post.id;
    let cid = r.create_comment(NewComment { post_id: p, author_id: b.id, content: "hi".into() }).await.unwrap().id;
    let nid = r.list_notifications(a.id).await.unwrap()[0].id;

    // outsiders cannot see or react
    assert!(matches!(r.react(c.id, nid, "like".into()).await, Err(RepoError::NotFound)));
    assert!(matches!(r.list_reactions(c.id, nid).await, Err(RepoError::NotFound)));

    let first = r.react(a.id, nid, "like".into()).await.unwrap();
    let again = r.react(a.id, nid, "emoji".into()).await.unwrap();
    assert_eq!(first.id, again.id);
    assert_eq!(again.kind, "emoji");

    let b_feed = r.list_notifications(b.id).await.unwrap();
    assert_eq!(b_feed.len(), 1);
    assert_eq!(b_feed[0].kind, NotificationKind::ReactionToNotification);
    assert_eq!(b_feed[0].notification_id, Some(nid));
    assert_eq!(b_feed[0].message, "a reacted to your notification");
    assert_eq!(b_feed[0].target_content.as_deref(), Some("hi"));

    r.react(b.id, nid, "dislike".into()).await.unwrap();
    let kinds: Vec<_> = r.list_reactions(a.id, nid).await.unwrap().into_iter().map(|x| x.kind).collect();
    assert_eq!(kinds, ["emoji", "dislike"]);
    assert_eq!(r.unread_count(a.id).await.unwrap(), 2);

    r.delete_comment(cid, b.id).await.unwrap();
    assert!(matches!(r.list_reactions(a.id, nid).await, Err(RepoError::NotFound)));
    assert!(r.list_notifications(a.id).await.unwrap().is_empty());
    assert!(r.list_notifications(b.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn deleting_a_comment_removes_its_thread() {
    let r = InMemRepo::new();
    let a = user(&r, "a").await;
    let b = user(&r, "b").await;
    let p = r.create_post(post(&a, "p")).await.unwrap().post.id;
    let c = r.create_comment(NewComment { post_id: p, author_id: b.id, content: "c".into() }).await.unwrap().id;
    let mut replies = Vec::new();
    for i in 0..3 {
        let reply = r.create_reply(NewReply { parent_id: c, author_id: a.id, content: format!("r{i}") }).await.unwrap();
        r.like(b.id, LikeTarget::Reply(reply.id)).await.unwrap();
        replies.push(reply.id);
    }
    r.like(a.id, LikeTarget::Comment(c)).await.unwrap();

    r.delete_comment(c, b.id).await.unwrap();

    assert!(matches!(r.get_comment(c).await, Err(RepoError::NotFound)));
    for id in replies {
        assert!(matches!(r.get_reply(id).await, Err(RepoError::NotFound)));
        assert!(matches!(r.like_summary(LikeTarget::Reply(id), None).await, Err(RepoError::NotFound)));
    }
    assert!(r.list_notifications(a.id).await.unwrap().is_empty());
    assert!(r.list_notifications(b.id).await.unwrap().is_empty());
    assert!(r.list_comments(p).await.unwrap().is_empty());
}

#[tokio::test]
async fn deleting_a_post_removes_everything_under_it() {
    let r = InMemRepo::new();
    let a = user(&r, "a").await;
    let b = user(&r, "b").await;
    let p = r
        .create_post(NewPost {
            tags: vec!["t".into()],
            images: vec![NewImage { url: "/uploads/images/1_0_a.png".into(), alt_text: String::new() }],
            tables: vec![raw(r#"{"cells": []}"#)],
            ..post(&a, "p")
        })
        .await
        .unwrap()
        .post
        .id;
    let c = r.create_comment(NewComment { post_id: p, author_id: b.id, content: "c".into() }).await.unwrap().id;
    r.create_reply(NewReply { parent_id: c, author_id: a.id, content: "r".into() }).await.unwrap();
    r.like(b.id, LikeTarget::Post(p)).await.unwrap();
    r.save_post(b.id, p).await.unwrap();

    let removed = r.delete_post(p, a.id).await.unwrap();
    let urls: Vec<_> = removed.iter().map(|img| img.url.as_str()).collect();
    assert_eq!(urls, ["/uploads/images/1_0_a.png"]);

    assert!(matches!(r.get_post(p).await, Err(RepoError::NotFound)));
    assert!(matches!(r.get_comment(c).await, Err(RepoError::NotFound)));
    assert!(r.list_saved_posts(b.id).await.unwrap().is_empty());
    assert!(r.list_notifications(a.id).await.unwrap().is_empty());
    assert!(r.list_notifications(b.id).await.unwrap().is_empty());
    let by_tag = r.list_posts(PostFilter { tag: Some("t".into()), ..PostFilter::default() }).await.unwrap();
    assert!(by_tag.is_empty());
}

#[tokio::test]
async fn table_blocks_keep_the_client_text() {
    let r = InMemRepo::new();
    let a = user(&r, "a").await;
    let sent = [r#"{"zeta":1,"alpha":2.50}"#, r#"[["b","a"],[10,1e3]]"#];
    let detail = r
        .create_post(NewPost { tables: sent.iter().map(|t| raw(t)).collect(), ..post(&a, "tables") })
        .await
        .unwrap();
    let stored: Vec<&str> = detail.tables.iter().map(|t| t.data.as_str()).collect();
    assert_eq!(stored, sent);

    let view = blog_platform::models::PostView::from(r.get_post(detail.post.id).await.unwrap());
    let body = serde_json::to_string(&view).unwrap();
    assert!(body.contains(r#""tables":[{"zeta":1,"alpha":2.50},[["b","a"],[10,1e3]]]"#), "{body}");
}

#[tokio::test]
async fn saved_posts_round_trip() {
    let r = InMemRepo::new();
    let a = user(&r, "a").await;
    let p1 = r.create_post(post(&a, "one")).await.unwrap().post.id;
    let p2 = r.create_post(post(&a, "two")).await.unwrap().post.id;

    r.save_post(a.id, p1).await.unwrap();
    r.save_post(a.id, p2).await.unwrap();
    assert!(matches!(r.save_post(a.id, p1).await, Err(RepoError::Conflict)));
    assert!(r.is_saved(a.id, p1).await.unwrap());

    // most recently saved first
    let saved: Vec<_> = r.list_saved_posts(a.id).await.unwrap().into_iter().map(|d| d.post.id).collect();
    assert_eq!(saved, [p2, p1]);

    r.unsave_post(a.id, p1).await.unwrap();
    assert!(!r.is_saved(a.id, p1).await.unwrap());
    assert!(matches!(r.unsave_post(a.id, p1).await, Err(RepoError::NotFound)));
    assert!(matches!(r.is_saved(a.id, 999).await, Err(RepoError::NotFound)));
}
