//! Best-effort notification side channel.
//!
//! A notification write must never fail the action that triggered it, so
//! [`emit`] logs storage errors and returns nothing.

use crate::models::{Id, NewNotification, NotificationKind, ReactionKind, ReactionTarget};
use crate::repo::NotificationRepo;

pub async fn emit<R>(repo: &R, new: NewNotification)
where
    R: NotificationRepo + ?Sized,
{
    let (recipient, kind) = (new.user_id, new.kind);
    match repo.create_notification(new).await {
        Ok(n) => tracing::debug!(notification_id = n.id, recipient, kind = kind.as_str(), "notification stored"),
        Err(e) => tracing::warn!(recipient, kind = kind.as_str(), error = %e, "failed to store notification"),
    }
}

/// Someone commented on `post_id`, owned by `post_author`.
pub fn comment_notice(post_author: Id, post_id: Id, comment_id: Id, from_user_id: Id) -> NewNotification {
    NewNotification {
        user_id: post_author,
        kind: NotificationKind::Comment,
        post_id,
        comment_id: Some(comment_id),
        from_user_id,
        message: "Someone commented on your post.".into(),
    }
}

/// Reaction placed on a post or comment owned by `owner`. `post_id` is the
/// post itself or the post the comment belongs to.
pub fn reaction_notice(
    owner: Id,
    post_id: Id,
    target: ReactionTarget,
    kind: ReactionKind,
    from_user_id: Id,
) -> NewNotification {
    let (kind, comment_id, message) = match (target, kind) {
        (ReactionTarget::Post(_), ReactionKind::Like) => {
            (NotificationKind::Like, None, "Your post was liked.")
        }
        (ReactionTarget::Post(_), ReactionKind::Helpful) => {
            (NotificationKind::Helpful, None, "Your post was marked helpful.")
        }
        (ReactionTarget::Comment(id), ReactionKind::Like) => {
            (NotificationKind::CommentLike, Some(id), "Someone liked your comment.")
        }
        (ReactionTarget::Comment(id), ReactionKind::Helpful) => {
            (NotificationKind::CommentHelpful, Some(id), "Someone marked your comment as helpful.")
        }
    };
    NewNotification { user_id: owner, kind, post_id, comment_id, from_user_id, message: message.into() }
}
