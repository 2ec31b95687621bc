//! Comment threading.
//!
//! Storage hands back a flat, consistently ordered list of comments; the
//! grouping into a reply tree happens here, on read.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::models::{CommentView, Id};
use crate::repo::CommentRepo;

/// A comment with its replies, recursively.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ThreadNode {
    #[serde(flatten)]
    pub comment: CommentView,
    pub replies: Vec<ThreadNode>,
}

/// Parent/child index over a flat comment list. Borrowed; input order is preserved within each group.
pub struct CommentTree<'a> {
    roots: Vec<&'a CommentView>,
    children: HashMap<Id, Vec<&'a CommentView>>,
}

impl<'a> CommentTree<'a> {
    pub fn build(flat: &'a [CommentView]) -> Self {
        let mut roots = Vec::new();
        let mut children: HashMap<Id, Vec<&CommentView>> = HashMap::new();
        for c in flat {
            match c.parent_id {
                None => roots.push(c),
                Some(parent) => children.entry(parent).or_default().push(c),
            }
        }
        Self { roots, children }
    }

    pub fn roots(&self) -> &[&'a CommentView] {
        &self.roots
    }

    pub fn replies_of(&self, id: Id) -> &[&'a CommentView] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Nested form reachable from the roots. Replies to missing parents are
    /// unreachable and therefore absent.
    pub fn nested(&self) -> Vec<ThreadNode> {
        let mut seen = HashSet::new();
        self.roots.iter().filter_map(|c| self.node(c, &mut seen)).collect()
    }

    fn node(&self, c: &CommentView, seen: &mut HashSet<Id>) -> Option<ThreadNode> {
        if !seen.insert(c.id) {
            return None;
        }
        let replies = self.replies_of(c.id).iter().filter_map(|r| self.node(r, seen)).collect();
        Some(ThreadNode { comment: c.clone(), replies })
    }
}

/// A reply must name an existing comment on the same post.
pub async fn validate_parent<R>(repo: &R, post_id: Id, parent_id: Option<Id>) -> Result<(), ApiError>
where
    R: CommentRepo + ?Sized,
{
    let Some(parent_id) = parent_id else { return Ok(()) };
    match repo.get_comment(parent_id).await {
        Ok(parent) if parent.post_id == post_id => Ok(()),
        Ok(_) => Err(ApiError::validation("parent comment belongs to another post")),
        Err(crate::repo::RepoError::NotFound) => Err(ApiError::validation("parent comment does not exist")),
        Err(e) => Err(e.into()),
    }
}
