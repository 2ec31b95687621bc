use crate::error::ApiError;
use crate::models::{Comment, Id, Post, UpdatePost};
use crate::repo::Repo;

fn ensure_owner(owner: Id, requester: Id) -> Result<(), ApiError> {
    if owner == requester { Ok(()) } else { Err(ApiError::Forbidden) }
}

pub async fn update_post<R>(repo: &R, id: Id, requester: Id, upd: UpdatePost) -> Result<Post, ApiError>
where
    R: Repo + ?Sized,
{
    let post = repo.get_post(id).await?;
    ensure_owner(post.author_id, requester)?;
    Ok(repo.update_post(id, upd.normalize()?).await?)
}

/// Owner-only. Saves, reactions, comments and reports go with the post.
pub async fn delete_post<R>(repo: &R, id: Id, requester: Id) -> Result<(), ApiError>
where
    R: Repo + ?Sized,
{
    let post = repo.get_post(id).await?;
    ensure_owner(post.author_id, requester)?;
    repo.delete_post(id).await?;
    tracing::info!(post_id = id, requester, "post deleted");
    Ok(())
}

pub async fn update_comment<R>(repo: &R, id: Id, requester: Id, content: String) -> Result<Comment, ApiError>
where
    R: Repo + ?Sized,
{
    let comment = repo.get_comment(id).await?;
    ensure_owner(comment.author_id, requester)?;
    Ok(repo.update_comment(id, content).await?)
}

/// Owner-only. Replies to the comment stay behind as orphans.
pub async fn delete_comment<R>(repo: &R, id: Id, requester: Id) -> Result<(), ApiError>
where
    R: Repo + ?Sized,
{
    let comment = repo.get_comment(id).await?;
    ensure_owner(comment.author_id, requester)?;
    repo.delete_comment(id).await?;
    tracing::info!(comment_id = id, post_id = comment.post_id, requester, "comment deleted");
    Ok(())
}
