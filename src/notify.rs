//! Deciding who hears about an action.
//!
//! Stores call [`plan`] inside the same transaction that records the action
//! and insert the result with insert-or-ignore semantics on
//! `(user_id, actor_id, kind, target_id)`.

use crate::models::{Id, LikeTarget, NewNotification, Notification, NotificationKind};

/// Entities a notification points at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Refs {
    pub post_id: Option<Id>,
    pub comment_id: Option<Id>,
    pub reply_id: Option<Id>,
    pub notification_id: Option<Id>,
}

impl Refs {
    pub fn post(post_id: Id) -> Self {
        Self { post_id: Some(post_id), ..Self::default() }
    }

    pub fn comment(post_id: Id, comment_id: Id) -> Self {
        Self { post_id: Some(post_id), comment_id: Some(comment_id), ..Self::default() }
    }

    pub fn reply(post_id: Id, comment_id: Id, reply_id: Id) -> Self {
        Self { post_id: Some(post_id), comment_id: Some(comment_id), reply_id: Some(reply_id), notification_id: None }
    }

    /// References for a like on `target`. `post_id` and `parent_id` describe
    /// where the target lives; `parent_id` only matters for replies.
    pub fn for_like(target: LikeTarget, post_id: Id, parent_id: Option<Id>) -> Self {
        match target {
            LikeTarget::Post(id) => Self::post(id),
            LikeTarget::Comment(id) => Self::comment(post_id, id),
            LikeTarget::Reply(id) => Self {
                post_id: Some(post_id),
                comment_id: parent_id,
                reply_id: Some(id),
                notification_id: None,
            },
        }
    }

    /// A reaction points at the parent notification and inherits what it
    /// referenced, so it goes away together with that content.
    pub fn reaction(parent: &Notification) -> Self {
        Self {
            post_id: parent.post_id,
            comment_id: parent.comment_id,
            reply_id: parent.reply_id,
            notification_id: Some(parent.id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Event<'a> {
    pub actor_id: Id,
    pub actor_name: &'a str,
    pub recipient_id: Id,
    pub kind: NotificationKind,
    pub refs: Refs,
}

pub fn message(kind: NotificationKind, actor_name: &str) -> String {
    match kind {
        NotificationKind::LikePost => format!("{actor_name} liked your post"),
        NotificationKind::Comment => format!("{actor_name} commented on your post"),
        NotificationKind::LikeComment => format!("{actor_name} liked your comment"),
        NotificationKind::Reply => format!("{actor_name} replied to your comment"),
        NotificationKind::LikeReply => format!("{actor_name} liked your reply"),
        NotificationKind::ReactionToNotification => format!("{actor_name} reacted to your notification"),
    }
}

/// `None` when the actor would be notifying themselves.
pub fn plan(ev: &Event<'_>) -> Option<NewNotification> {
    if ev.actor_id == ev.recipient_id {
        return None;
    }
    Some(NewNotification {
        user_id: ev.recipient_id,
        actor_id: ev.actor_id,
        kind: ev.kind,
        post_id: ev.refs.post_id,
        comment_id: ev.refs.comment_id,
        reply_id: ev.refs.reply_id,
        notification_id: ev.refs.notification_id,
        message: message(ev.kind, ev.actor_name),
    })
}
