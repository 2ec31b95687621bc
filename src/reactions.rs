use crate::error::ApiError;
use crate::models::{Id, ReactionKind, ReactionTarget, ToggleOutcome};
use crate::notify;
use crate::repo::Repo;

/// Flips `user_id`'s like/helpful mark on a post or comment and returns the new state with the live count.
///
/// The owner is notified only when the mark is switched on by someone else.
pub async fn toggle<R>(
    repo: &R,
    user_id: Id,
    target: ReactionTarget,
    kind: ReactionKind,
) -> Result<ToggleOutcome, ApiError>
where
    R: Repo + ?Sized,
{
    let (owner, post_id) = match target {
        ReactionTarget::Post(id) => {
            let post = repo.get_post(id).await?;
            (post.author_id, post.id)
        }
        ReactionTarget::Comment(id) => {
            let comment = repo.get_comment(id).await?;
            (comment.author_id, comment.post_id)
        }
    };

    // Losing a race to a concurrent toggle by the same user leaves the row in the
    // state we were heading for; only the writer that actually inserted notifies.
    let (active, inserted) = if repo.has_reaction(user_id, target, kind).await? {
        repo.remove_reaction(user_id, target, kind).await?;
        (false, false)
    } else {
        (true, repo.add_reaction(user_id, target, kind).await?)
    };
    let count = repo.count_reactions(target, kind).await?;

    tracing::info!(user_id, ?target, ?kind, active, inserted, count, "reaction toggled");

    if inserted && owner != user_id {
        notify::emit(repo, notify::reaction_notice(owner, post_id, target, kind, user_id)).await;
    }
    Ok(ToggleOutcome { active, count })
}
