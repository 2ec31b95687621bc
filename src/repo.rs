use async_trait::async_trait;

use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("storage failure: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

impl From<sqlx::Error> for RepoError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            sqlx::Error::Database(ref db) if db.is_unique_violation() => RepoError::Conflict,
            other => RepoError::Internal(other.to_string()),
        }
    }
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Returns the user, creating it from token claims on first sight.
    async fn ensure_user(&self, id: Id, name: &str) -> RepoResult<User>;
    async fn get_user(&self, id: Id) -> RepoResult<User>;
    async fn update_profile(&self, id: Id, upd: UpdateProfile) -> RepoResult<User>;
}

#[async_trait]
pub trait PostRepo: Send + Sync {
    async fn list_posts(&self, viewer: Option<Id>) -> RepoResult<Vec<PostView>>;
    async fn get_post(&self, id: Id) -> RepoResult<Post>;
    async fn get_post_view(&self, id: Id, viewer: Option<Id>) -> RepoResult<PostView>;
    async fn create_post(&self, author_id: Id, new: NewPost) -> RepoResult<Post>;
    async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post>;
    /// Removes saves, reactions, comments (with their reactions) and reports, then the post.
    async fn delete_post(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait CommentRepo: Send + Sync {
    /// Flat listing: top-level first, then by parent id, creation time and id.
    async fn list_comments(&self, post_id: Id, viewer: Option<Id>) -> RepoResult<Vec<CommentView>>;
    async fn get_comment(&self, id: Id) -> RepoResult<Comment>;
    async fn get_comment_view(&self, id: Id, viewer: Option<Id>) -> RepoResult<CommentView>;
    async fn create_comment(&self, post_id: Id, author_id: Id, new: NewComment) -> RepoResult<Comment>;
    async fn update_comment(&self, id: Id, content: String) -> RepoResult<Comment>;
    /// Removes the comment and its reactions. Replies are left in place.
    async fn delete_comment(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait ReactionRepo: Send + Sync {
    async fn has_reaction(&self, user_id: Id, target: ReactionTarget, kind: ReactionKind) -> RepoResult<bool>;
    /// `false` when the row already existed.
    async fn add_reaction(&self, user_id: Id, target: ReactionTarget, kind: ReactionKind) -> RepoResult<bool>;
    /// `false` when there was nothing to remove.
    async fn remove_reaction(&self, user_id: Id, target: ReactionTarget, kind: ReactionKind) -> RepoResult<bool>;
    async fn count_reactions(&self, target: ReactionTarget, kind: ReactionKind) -> RepoResult<i64>;
}

#[async_trait]
pub trait SavedPostRepo: Send + Sync {
    async fn save_post(&self, user_id: Id, post_id: Id) -> RepoResult<()>;
    async fn unsave_post(&self, user_id: Id, post_id: Id) -> RepoResult<()>;
    async fn list_saved_posts(&self, user_id: Id) -> RepoResult<Vec<PostView>>;
}

#[async_trait]
pub trait ReportRepo: Send + Sync {
    /// `Conflict` while the same user already has a pending report on the post.
    async fn create_report(&self, post_id: Id, user_id: Id, reason: Option<String>) -> RepoResult<Report>;
}

#[async_trait]
pub trait NotificationRepo: Send + Sync {
    async fn create_notification(&self, new: NewNotification) -> RepoResult<Notification>;
    async fn list_notifications(&self, user_id: Id) -> RepoResult<Vec<NotificationView>>;
    async fn unread_count(&self, user_id: Id) -> RepoResult<i64>;
    /// `NotFound` unless the notification belongs to `user_id`.
    async fn mark_read(&self, user_id: Id, id: Id) -> RepoResult<()>;
    async fn mark_all_read(&self, user_id: Id) -> RepoResult<u64>;
}

pub trait Repo:
    UserRepo + PostRepo + CommentRepo + ReactionRepo + SavedPostRepo + ReportRepo + NotificationRepo
{
}

impl<T> Repo for T where
    T: UserRepo + PostRepo + CommentRepo + ReactionRepo + SavedPostRepo + ReportRepo + NotificationRepo
{
}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};
    use std::collections::{HashMap, HashSet};
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

    /// Reaction rows keyed by (user_id, target_id); set membership is the toggled state.
    type ReactionSet = HashSet<(Id, Id)>;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct SavedEntry {
        user_id: Id,
        post_id: Id,
        created_at: DateTime<Utc>,
    }

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        users: HashMap<Id, User>,
        posts: HashMap<Id, Post>,
        comments: HashMap<Id, Comment>,
        post_likes: ReactionSet,
        post_helpful: ReactionSet,
        comment_likes: ReactionSet,
        comment_helpful: ReactionSet,
        saved: Vec<SavedEntry>,
        reports: HashMap<Id, Report>,
        notifications: HashMap<Id, Notification>,
        next_id: Id,
    }

    impl State {
        fn next_id(&mut self) -> Id {
            self.next_id += 1;
            self.next_id
        }

        fn reactions(&self, target: ReactionTarget, kind: ReactionKind) -> &ReactionSet {
            match (target, kind) {
                (ReactionTarget::Post(_), ReactionKind::Like) => &self.post_likes,
                (ReactionTarget::Post(_), ReactionKind::Helpful) => &self.post_helpful,
                (ReactionTarget::Comment(_), ReactionKind::Like) => &self.comment_likes,
                (ReactionTarget::Comment(_), ReactionKind::Helpful) => &self.comment_helpful,
            }
        }

        fn reactions_mut(&mut self, target: ReactionTarget, kind: ReactionKind) -> &mut ReactionSet {
            match (target, kind) {
                (ReactionTarget::Post(_), ReactionKind::Like) => &mut self.post_likes,
                (ReactionTarget::Post(_), ReactionKind::Helpful) => &mut self.post_helpful,
                (ReactionTarget::Comment(_), ReactionKind::Like) => &mut self.comment_likes,
                (ReactionTarget::Comment(_), ReactionKind::Helpful) => &mut self.comment_helpful,
            }
        }

        fn count(&self, target: ReactionTarget, kind: ReactionKind) -> i64 {
            let id = target.id();
            self.reactions(target, kind).iter().filter(|(_, t)| *t == id).count() as i64
        }

        fn reacted(&self, viewer: Option<Id>, target: ReactionTarget, kind: ReactionKind) -> bool {
            viewer.map_or(false, |u| self.reactions(target, kind).contains(&(u, target.id())))
        }

        fn summary(&self, user_id: Id) -> UserSummary {
            match self.users.get(&user_id) {
                Some(u) => UserSummary::from(u),
                None => UserSummary { id: user_id, name: "unknown".into(), avatar_url: None },
            }
        }

        fn post_view(&self, p: &Post, viewer: Option<Id>) -> PostView {
            let target = ReactionTarget::Post(p.id);
            PostView {
                id: p.id,
                title: p.title.clone(),
                description: p.description.clone(),
                content: p.content.clone(),
                code_snippet: p.code_snippet.clone(),
                tags: p.tags.clone(),
                image_url: p.image_url.clone(),
                created_at: p.created_at,
                author: self.summary(p.author_id),
                likes: self.count(target, ReactionKind::Like),
                helpful_count: self.count(target, ReactionKind::Helpful),
                comment_count: self.comments.values().filter(|c| c.post_id == p.id).count() as i64,
                liked: self.reacted(viewer, target, ReactionKind::Like),
                helpful: self.reacted(viewer, target, ReactionKind::Helpful),
                saved: viewer.map_or(false, |u| {
                    self.saved.iter().any(|s| s.user_id == u && s.post_id == p.id)
                }),
            }
        }

        fn comment_view(&self, c: &Comment, viewer: Option<Id>) -> CommentView {
            let target = ReactionTarget::Comment(c.id);
            CommentView {
                id: c.id,
                post_id: c.post_id,
                author: self.summary(c.author_id),
                content: c.content.clone(),
                image_url: c.image_url.clone(),
                parent_id: c.parent_id,
                created_at: c.created_at,
                liked: self.reacted(viewer, target, ReactionKind::Like),
                helpful: self.reacted(viewer, target, ReactionKind::Helpful),
                like_count: self.count(target, ReactionKind::Like),
                helpful_count: self.count(target, ReactionKind::Helpful),
            }
        }

        fn drop_comment_reactions(&mut self, comment_id: Id) {
            self.comment_likes.retain(|(_, c)| *c != comment_id);
            self.comment_helpful.retain(|(_, c)| *c != comment_id);
        }
    }

    /// Lock-guarded in-memory store, optionally mirrored to a JSON snapshot on every write.
    #[derive(Clone)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Option<Arc<PathBuf>>,
    }

    impl InMemRepo {
        /// Nothing is written to disk.
        pub fn ephemeral() -> Self {
            Self { state: Arc::new(RwLock::new(State::default())), snapshot_path: None }
        }

        /// Loads `<data_dir>/state.json` if present and persists back to it.
        pub fn with_snapshot(data_dir: impl AsRef<Path>) -> Self {
            let path = data_dir.as_ref().join("state.json");
            let state = Self::load_state_from(&path);
            Self { state: Arc::new(RwLock::new(state)), snapshot_path: Some(Arc::new(path)) }
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => {
                        tracing::info!(path = %path.display(), "loaded snapshot");
                        s
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "unreadable snapshot, starting empty");
                        State::default()
                    }
                },
                Err(e) => {
                    tracing::info!(path = %path.display(), error = %e, "no snapshot, starting empty");
                    State::default()
                }
            }
        }

        fn persist(&self) {
            let Some(path) = self.snapshot_path.as_deref() else { return };
            let bytes = match self.state.read() {
                Ok(s) => serde_json::to_vec_pretty(&*s),
                Err(_) => return,
            };
            match bytes {
                Ok(bytes) => {
                    if let Some(dir) = path.parent() {
                        let _ = std::fs::create_dir_all(dir);
                    }
                    if let Err(e) = std::fs::write(path, bytes) {
                        tracing::warn!(path = %path.display(), error = %e, "failed to write snapshot");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "failed to serialise snapshot"),
            }
        }

        fn read(&self) -> RepoResult<RwLockReadGuard<'_, State>> {
            self.state.read().map_err(|_| RepoError::Internal("state lock poisoned".into()))
        }

        fn write(&self) -> RepoResult<RwLockWriteGuard<'_, State>> {
            self.state.write().map_err(|_| RepoError::Internal("state lock poisoned".into()))
        }
    }

    impl Default for InMemRepo {
        fn default() -> Self { Self::ephemeral() }
    }

    #[async_trait]
    impl UserRepo for InMemRepo {
        async fn ensure_user(&self, id: Id, name: &str) -> RepoResult<User> {
            if let Some(u) = self.read()?.users.get(&id) {
                return Ok(u.clone());
            }
            let mut s = self.write()?;
            let user = s.users.entry(id).or_insert_with(|| User {
                id,
                name: name.to_string(),
                country: None,
                avatar_url: None,
                created_at: Utc::now(),
            }).clone();
            drop(s);
            self.persist();
            Ok(user)
        }

        async fn get_user(&self, id: Id) -> RepoResult<User> {
            self.read()?.users.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn update_profile(&self, id: Id, upd: UpdateProfile) -> RepoResult<User> {
            let mut s = self.write()?;
            let user = s.users.get_mut(&id).ok_or(RepoError::NotFound)?;
            if let Some(name) = upd.name { user.name = name; }
            if let Some(country) = upd.country { user.country = Some(country); }
            if let Some(avatar) = upd.avatar_url { user.avatar_url = Some(avatar); }
            let updated = user.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }
    }

    #[async_trait]
    impl PostRepo for InMemRepo {
        async fn list_posts(&self, viewer: Option<Id>) -> RepoResult<Vec<PostView>> {
            let s = self.read()?;
            let mut posts: Vec<&Post> = s.posts.values().collect();
            posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))); // newest first
            Ok(posts.into_iter().map(|p| s.post_view(p, viewer)).collect())
        }

        async fn get_post(&self, id: Id) -> RepoResult<Post> {
            self.read()?.posts.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn get_post_view(&self, id: Id, viewer: Option<Id>) -> RepoResult<PostView> {
            let s = self.read()?;
            let post = s.posts.get(&id).ok_or(RepoError::NotFound)?;
            Ok(s.post_view(post, viewer))
        }

        async fn create_post(&self, author_id: Id, new: NewPost) -> RepoResult<Post> {
            let mut s = self.write()?;
            let id = s.next_id();
            let post = Post {
                id,
                title: new.title,
                description: new.description,
                content: new.content,
                code_snippet: new.code_snippet,
                tags: new.tags,
                image_url: new.image_url,
                created_at: Utc::now(),
                author_id,
            };
            s.posts.insert(id, post.clone());
            drop(s);
            self.persist();
            Ok(post)
        }

        async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post> {
            let mut s = self.write()?;
            let post = s.posts.get_mut(&id).ok_or(RepoError::NotFound)?;
            if let Some(title) = upd.title { post.title = title; }
            if let Some(description) = upd.description { post.description = description; }
            if let Some(content) = upd.content { post.content = content; }
            if let Some(snippet) = upd.code_snippet { post.code_snippet = Some(snippet); }
            if let Some(tags) = upd.tags { post.tags = tags; }
            if let Some(image) = upd.image_url { post.image_url = Some(image); }
            let updated = post.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }

        async fn delete_post(&self, id: Id) -> RepoResult<()> {
            let mut s = self.write()?;
            if !s.posts.contains_key(&id) {
                return Err(RepoError::NotFound);
            }
            s.saved.retain(|e| e.post_id != id);
            s.post_likes.retain(|(_, p)| *p != id);
            s.post_helpful.retain(|(_, p)| *p != id);
            let comment_ids: Vec<Id> = s.comments.values().filter(|c| c.post_id == id).map(|c| c.id).collect();
            for cid in comment_ids {
                s.drop_comment_reactions(cid);
                s.comments.remove(&cid);
            }
            s.reports.retain(|_, r| r.post_id != id);
            s.posts.remove(&id);
            drop(s);
            self.persist();
            Ok(())
        }
    }

    #[async_trait]
    impl CommentRepo for InMemRepo {
        async fn list_comments(&self, post_id: Id, viewer: Option<Id>) -> RepoResult<Vec<CommentView>> {
            let s = self.read()?;
            let mut v: Vec<&Comment> = s.comments.values().filter(|c| c.post_id == post_id).collect();
            // None < Some(_) puts top-level comments ahead of every reply group
            v.sort_by(|a, b| {
                a.parent_id
                    .cmp(&b.parent_id)
                    .then(a.created_at.cmp(&b.created_at))
                    .then(a.id.cmp(&b.id))
            });
            Ok(v.into_iter().map(|c| s.comment_view(c, viewer)).collect())
        }

        async fn get_comment(&self, id: Id) -> RepoResult<Comment> {
            self.read()?.comments.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn get_comment_view(&self, id: Id, viewer: Option<Id>) -> RepoResult<CommentView> {
            let s = self.read()?;
            let c = s.comments.get(&id).ok_or(RepoError::NotFound)?;
            Ok(s.comment_view(c, viewer))
        }

        async fn create_comment(&self, post_id: Id, author_id: Id, new: NewComment) -> RepoResult<Comment> {
            let mut s = self.write()?;
            if !s.posts.contains_key(&post_id) {
                return Err(RepoError::NotFound);
            }
            let id = s.next_id();
            let comment = Comment {
                id,
                post_id,
                author_id,
                content: new.content,
                image_url: new.image_url,
                parent_id: new.parent_id,
                created_at: Utc::now(),
            };
            s.comments.insert(id, comment.clone());
            drop(s);
            self.persist();
            Ok(comment)
        }

        async fn update_comment(&self, id: Id, content: String) -> RepoResult<Comment> {
            let mut s = self.write()?;
            let c = s.comments.get_mut(&id).ok_or(RepoError::NotFound)?;
            c.content = content;
            let updated = c.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }

        async fn delete_comment(&self, id: Id) -> RepoResult<()> {
            let mut s = self.write()?;
            if s.comments.remove(&id).is_none() {
                return Err(RepoError::NotFound);
            }
            s.drop_comment_reactions(id);
            drop(s);
            self.persist();
            Ok(())
        }
    }

    #[async_trait]
    impl ReactionRepo for InMemRepo {
        async fn has_reaction(&self, user_id: Id, target: ReactionTarget, kind: ReactionKind) -> RepoResult<bool> {
            Ok(self.read()?.reactions(target, kind).contains(&(user_id, target.id())))
        }

        async fn add_reaction(&self, user_id: Id, target: ReactionTarget, kind: ReactionKind) -> RepoResult<bool> {
            let inserted = self.write()?.reactions_mut(target, kind).insert((user_id, target.id()));
            if inserted { self.persist(); }
            Ok(inserted)
        }

        async fn remove_reaction(&self, user_id: Id, target: ReactionTarget, kind: ReactionKind) -> RepoResult<bool> {
            let removed = self.write()?.reactions_mut(target, kind).remove(&(user_id, target.id()));
            if removed { self.persist(); }
            Ok(removed)
        }

        async fn count_reactions(&self, target: ReactionTarget, kind: ReactionKind) -> RepoResult<i64> {
            Ok(self.read()?.count(target, kind))
        }
    }

    #[async_trait]
    impl SavedPostRepo for InMemRepo {
        async fn save_post(&self, user_id: Id, post_id: Id) -> RepoResult<()> {
            let mut s = self.write()?;
            if !s.posts.contains_key(&post_id) {
                return Err(RepoError::NotFound);
            }
            if s.saved.iter().any(|e| e.user_id == user_id && e.post_id == post_id) {
                return Ok(());
            }
            s.saved.push(SavedEntry { user_id, post_id, created_at: Utc::now() });
            drop(s);
            self.persist();
            Ok(())
        }

        async fn unsave_post(&self, user_id: Id, post_id: Id) -> RepoResult<()> {
            let mut s = self.write()?;
            if !s.posts.contains_key(&post_id) {
                return Err(RepoError::NotFound);
            }
            s.saved.retain(|e| !(e.user_id == user_id && e.post_id == post_id));
            drop(s);
            self.persist();
            Ok(())
        }

        async fn list_saved_posts(&self, user_id: Id) -> RepoResult<Vec<PostView>> {
            let s = self.read()?;
            let mut entries: Vec<&SavedEntry> = s.saved.iter().filter(|e| e.user_id == user_id).collect();
            // most recently saved first; push order breaks timestamp ties
            entries.reverse();
            entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(entries
                .into_iter()
                .filter_map(|e| s.posts.get(&e.post_id))
                .map(|p| s.post_view(p, Some(user_id)))
                .collect())
        }
    }

    #[async_trait]
    impl ReportRepo for InMemRepo {
        async fn create_report(&self, post_id: Id, user_id: Id, reason: Option<String>) -> RepoResult<Report> {
            let mut s = self.write()?;
            if !s.posts.contains_key(&post_id) {
                return Err(RepoError::NotFound);
            }
            if s.reports.values().any(|r| {
                r.post_id == post_id && r.user_id == user_id && r.status == ReportStatus::Pending
            }) {
                return Err(RepoError::Conflict);
            }
            let id = s.next_id();
            let report = Report { id, post_id, user_id, reason, status: ReportStatus::Pending, created_at: Utc::now() };
            s.reports.insert(id, report.clone());
            drop(s);
            self.persist();
            Ok(report)
        }
    }

    #[async_trait]
    impl NotificationRepo for InMemRepo {
        async fn create_notification(&self, new: NewNotification) -> RepoResult<Notification> {
            let mut s = self.write()?;
            let id = s.next_id();
            let n = Notification {
                id,
                user_id: new.user_id,
                kind: new.kind,
                post_id: new.post_id,
                comment_id: new.comment_id,
                from_user_id: new.from_user_id,
                message: new.message,
                is_read: false,
                created_at: Utc::now(),
            };
            s.notifications.insert(id, n.clone());
            drop(s);
            self.persist();
            Ok(n)
        }

        async fn list_notifications(&self, user_id: Id) -> RepoResult<Vec<NotificationView>> {
            let s = self.read()?;
            let mut v: Vec<&Notification> = s.notifications.values().filter(|n| n.user_id == user_id).collect();
            v.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
            Ok(v.into_iter()
                .map(|n| NotificationView {
                    id: n.id,
                    kind: n.kind,
                    post_id: n.post_id,
                    comment_id: n.comment_id,
                    from_user: s.summary(n.from_user_id),
                    message: n.message.clone(),
                    is_read: n.is_read,
                    created_at: n.created_at,
                })
                .collect())
        }

        async fn unread_count(&self, user_id: Id) -> RepoResult<i64> {
            let s = self.read()?;
            Ok(s.notifications.values().filter(|n| n.user_id == user_id && !n.is_read).count() as i64)
        }

        async fn mark_read(&self, user_id: Id, id: Id) -> RepoResult<()> {
            let mut s = self.write()?;
            match s.notifications.get_mut(&id) {
                Some(n) if n.user_id == user_id => n.is_read = true,
                _ => return Err(RepoError::NotFound),
            }
            drop(s);
            self.persist();
            Ok(())
        }

        async fn mark_all_read(&self, user_id: Id) -> RepoResult<u64> {
            let mut s = self.write()?;
            let mut updated = 0;
            for n in s.notifications.values_mut().filter(|n| n.user_id == user_id && !n.is_read) {
                n.is_read = true;
                updated += 1;
            }
            drop(s);
            if updated > 0 { self.persist(); }
            Ok(updated)
        }
    }
}

#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use chrono::{DateTime, Utc};
    use sqlx::{Pool, Postgres};

    #[derive(Clone)]
    pub struct PgRepo { pool: Pool<Postgres> }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }

        pub async fn migrate(&self) -> RepoResult<()> {
            sqlx::migrate!("./migrations")
                .run(&self.pool)
                .await
                .map_err(|e| RepoError::Internal(e.to_string()))
        }
    }

    fn reaction_table(target: ReactionTarget, kind: ReactionKind) -> (&'static str, &'static str) {
        match (target, kind) {
            (ReactionTarget::Post(_), ReactionKind::Like) => ("post_likes", "post_id"),
            (ReactionTarget::Post(_), ReactionKind::Helpful) => ("post_helpfuls", "post_id"),
            (ReactionTarget::Comment(_), ReactionKind::Like) => ("comment_likes", "comment_id"),
            (ReactionTarget::Comment(_), ReactionKind::Helpful) => ("comment_helpfuls", "comment_id"),
        }
    }

    // $1 = viewer id (nullable); a NULL viewer never matches so the flags come back false
    const POST_VIEW_SELECT: &str = r#"
        SELECT p.id, p.title, p.description, p.content, p.code_snippet, p.tags, p.image_url,
               p.created_at, p.author_id,
               COALESCE(u.name, 'unknown') AS author_name, u.avatar_url AS author_avatar_url,
               (SELECT COUNT(*) FROM post_likes l WHERE l.post_id = p.id) AS likes,
               (SELECT COUNT(*) FROM post_helpfuls h WHERE h.post_id = p.id) AS helpful_count,
               (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id) AS comment_count,
               EXISTS (SELECT 1 FROM post_likes l WHERE l.post_id = p.id AND l.user_id = $1) AS liked,
               EXISTS (SELECT 1 FROM post_helpfuls h WHERE h.post_id = p.id AND h.user_id = $1) AS helpful,
               EXISTS (SELECT 1 FROM saved_posts s WHERE s.post_id = p.id AND s.user_id = $1) AS saved
        FROM posts p
        LEFT JOIN users u ON u.id = p.author_id
    "#;

    const COMMENT_VIEW_SELECT: &str = r#"
        SELECT c.id, c.post_id, c.author_id, c.content, c.image_url, c.parent_id, c.created_at,
               COALESCE(u.name, 'unknown') AS author_name, u.avatar_url AS author_avatar_url,
               EXISTS (SELECT 1 FROM comment_likes l WHERE l.comment_id = c.id AND l.user_id = $1) AS liked,
               EXISTS (SELECT 1 FROM comment_helpfuls h WHERE h.comment_id = c.id AND h.user_id = $1) AS helpful,
               (SELECT COUNT(*) FROM comment_likes l WHERE l.comment_id = c.id) AS like_count,
               (SELECT COUNT(*) FROM comment_helpfuls h WHERE h.comment_id = c.id) AS helpful_count
        FROM comments c
        LEFT JOIN users u ON u.id = c.author_id
    "#;

    #[derive(sqlx::FromRow)]
    struct PostViewRow {
        id: Id,
        title: String,
        description: String,
        content: String,
        code_snippet: Option<String>,
        tags: Vec<String>,
        image_url: Option<String>,
        created_at: DateTime<Utc>,
        author_id: Id,
        author_name: String,
        author_avatar_url: Option<String>,
        likes: i64,
        helpful_count: i64,
        comment_count: i64,
        liked: bool,
        helpful: bool,
        saved: bool,
    }

    impl From<PostViewRow> for PostView {
        fn from(r: PostViewRow) -> Self {
            PostView {
                id: r.id,
                title: r.title,
                description: r.description,
                content: r.content,
                code_snippet: r.code_snippet,
                tags: r.tags,
                image_url: r.image_url,
                created_at: r.created_at,
                author: UserSummary { id: r.author_id, name: r.author_name, avatar_url: r.author_avatar_url },
                likes: r.likes,
                helpful_count: r.helpful_count,
                comment_count: r.comment_count,
                liked: r.liked,
                helpful: r.helpful,
                saved: r.saved,
            }
        }
    }

    #[derive(sqlx::FromRow)]
    struct CommentViewRow {
        id: Id,
        post_id: Id,
        author_id: Id,
        content: String,
        image_url: Option<String>,
        parent_id: Option<Id>,
        created_at: DateTime<Utc>,
        author_name: String,
        author_avatar_url: Option<String>,
        liked: bool,
        helpful: bool,
        like_count: i64,
        helpful_count: i64,
    }

    impl From<CommentViewRow> for CommentView {
        fn from(r: CommentViewRow) -> Self {
            CommentView {
                id: r.id,
                post_id: r.post_id,
                author: UserSummary { id: r.author_id, name: r.author_name, avatar_url: r.author_avatar_url },
                content: r.content,
                image_url: r.image_url,
                parent_id: r.parent_id,
                created_at: r.created_at,
                liked: r.liked,
                helpful: r.helpful,
                like_count: r.like_count,
                helpful_count: r.helpful_count,
            }
        }
    }

    #[derive(sqlx::FromRow)]
    struct NotificationRow {
        id: Id,
        user_id: Id,
        kind: String,
        post_id: Id,
        comment_id: Option<Id>,
        from_user_id: Id,
        message: String,
        is_read: bool,
        created_at: DateTime<Utc>,
    }

    impl TryFrom<NotificationRow> for Notification {
        type Error = RepoError;
        fn try_from(r: NotificationRow) -> Result<Self, Self::Error> {
            Ok(Notification {
                id: r.id,
                user_id: r.user_id,
                kind: r.kind.parse().map_err(RepoError::Internal)?,
                post_id: r.post_id,
                comment_id: r.comment_id,
                from_user_id: r.from_user_id,
                message: r.message,
                is_read: r.is_read,
                created_at: r.created_at,
            })
        }
    }

    #[derive(sqlx::FromRow)]
    struct NotificationViewRow {
        id: Id,
        kind: String,
        post_id: Id,
        comment_id: Option<Id>,
        from_user_id: Id,
        from_user_name: String,
        from_user_avatar_url: Option<String>,
        message: String,
        is_read: bool,
        created_at: DateTime<Utc>,
    }

    #[derive(sqlx::FromRow)]
    struct ReportRow {
        id: Id,
        post_id: Id,
        user_id: Id,
        reason: Option<String>,
        status: String,
        created_at: DateTime<Utc>,
    }

    #[async_trait]
    impl UserRepo for PgRepo {
        async fn ensure_user(&self, id: Id, name: &str) -> RepoResult<User> {
            sqlx::query("INSERT INTO users (id, name) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING")
                .bind(id)
                .bind(name)
                .execute(&self.pool)
                .await?;
            self.get_user(id).await
        }

        async fn get_user(&self, id: Id) -> RepoResult<User> {
            let user = sqlx::query_as::<_, User>(
                "SELECT id, name, country, avatar_url, created_at FROM users WHERE id = $1",
            )
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
            Ok(user)
        }

        async fn update_profile(&self, id: Id, upd: UpdateProfile) -> RepoResult<User> {
            let user = sqlx::query_as::<_, User>(
                "UPDATE users SET name = COALESCE($2, name), country = COALESCE($3, country),
                        avatar_url = COALESCE($4, avatar_url)
                 WHERE id = $1
                 RETURNING id, name, country, avatar_url, created_at",
            )
            .bind(id)
            .bind(upd.name)
            .bind(upd.country)
            .bind(upd.avatar_url)
            .fetch_one(&self.pool)
            .await?;
            Ok(user)
        }
    }

    #[async_trait]
    impl PostRepo for PgRepo {
        async fn list_posts(&self, viewer: Option<Id>) -> RepoResult<Vec<PostView>> {
            let sql = format!("{POST_VIEW_SELECT} ORDER BY p.created_at DESC, p.id DESC");
            let rows = sqlx::query_as::<_, PostViewRow>(&sql)
                .bind(viewer)
                .fetch_all(&self.pool)
                .await?;
            Ok(rows.into_iter().map(PostView::from).collect())
        }

        async fn get_post(&self, id: Id) -> RepoResult<Post> {
            let post = sqlx::query_as::<_, Post>(
                "SELECT id, title, description, content, code_snippet, tags, image_url, created_at, author_id
                 FROM posts WHERE id = $1",
            )
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
            Ok(post)
        }

        async fn get_post_view(&self, id: Id, viewer: Option<Id>) -> RepoResult<PostView> {
            let sql = format!("{POST_VIEW_SELECT} WHERE p.id = $2");
            let row = sqlx::query_as::<_, PostViewRow>(&sql)
                .bind(viewer)
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
            Ok(row.into())
        }

        async fn create_post(&self, author_id: Id, new: NewPost) -> RepoResult<Post> {
            let post = sqlx::query_as::<_, Post>(
                "INSERT INTO posts (title, description, content, code_snippet, tags, image_url, author_id)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)
                 RETURNING id, title, description, content, code_snippet, tags, image_url, created_at, author_id",
            )
            .bind(&new.title)
            .bind(&new.description)
            .bind(&new.content)
            .bind(&new.code_snippet)
            .bind(&new.tags)
            .bind(&new.image_url)
            .bind(author_id)
            .fetch_one(&self.pool)
            .await?;
            Ok(post)
        }

        async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post> {
            let post = sqlx::query_as::<_, Post>(
                "UPDATE posts SET title = COALESCE($2, title), description = COALESCE($3, description),
                        content = COALESCE($4, content), code_snippet = COALESCE($5, code_snippet),
                        tags = COALESCE($6, tags), image_url = COALESCE($7, image_url)
                 WHERE id = $1
                 RETURNING id, title, description, content, code_snippet, tags, image_url, created_at, author_id",
            )
            .bind(id)
            .bind(upd.title)
            .bind(upd.description)
            .bind(upd.content)
            .bind(upd.code_snippet)
            .bind(upd.tags)
            .bind(upd.image_url)
            .fetch_one(&self.pool)
            .await?;
            Ok(post)
        }

        async fn delete_post(&self, id: Id) -> RepoResult<()> {
            let mut tx = self.pool.begin().await?;
            let exists: Option<Id> = sqlx::query_scalar("SELECT id FROM posts WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
            if exists.is_none() {
                return Err(RepoError::NotFound);
            }
            // no FK cascades: dependents go first, in this order
            for sql in [
                "DELETE FROM saved_posts WHERE post_id = $1",
                "DELETE FROM post_likes WHERE post_id = $1",
                "DELETE FROM post_helpfuls WHERE post_id = $1",
                "DELETE FROM comment_likes WHERE comment_id IN (SELECT id FROM comments WHERE post_id = $1)",
                "DELETE FROM comment_helpfuls WHERE comment_id IN (SELECT id FROM comments WHERE post_id = $1)",
                "DELETE FROM comments WHERE post_id = $1",
                "DELETE FROM reports WHERE post_id = $1",
                "DELETE FROM posts WHERE id = $1",
            ] {
                sqlx::query(sql).bind(id).execute(&mut *tx).await?;
            }
            tx.commit().await?;
            Ok(())
        }
    }

    #[async_trait]
    impl CommentRepo for PgRepo {
        async fn list_comments(&self, post_id: Id, viewer: Option<Id>) -> RepoResult<Vec<CommentView>> {
            let sql = format!(
                "{COMMENT_VIEW_SELECT} WHERE c.post_id = $2 ORDER BY c.parent_id ASC NULLS FIRST, c.created_at ASC, c.id ASC"
            );
            let rows = sqlx::query_as::<_, CommentViewRow>(&sql)
                .bind(viewer)
                .bind(post_id)
                .fetch_all(&self.pool)
                .await?;
            Ok(rows.into_iter().map(CommentView::from).collect())
        }

        async fn get_comment(&self, id: Id) -> RepoResult<Comment> {
            let c = sqlx::query_as::<_, Comment>(
                "SELECT id, post_id, author_id, content, image_url, parent_id, created_at FROM comments WHERE id = $1",
            )
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
            Ok(c)
        }

        async fn get_comment_view(&self, id: Id, viewer: Option<Id>) -> RepoResult<CommentView> {
            let sql = format!("{COMMENT_VIEW_SELECT} WHERE c.id = $2");
            let row = sqlx::query_as::<_, CommentViewRow>(&sql)
                .bind(viewer)
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
            Ok(row.into())
        }

        async fn create_comment(&self, post_id: Id, author_id: Id, new: NewComment) -> RepoResult<Comment> {
            let exists: Option<Id> = sqlx::query_scalar("SELECT id FROM posts WHERE id = $1")
                .bind(post_id)
                .fetch_optional(&self.pool)
                .await?;
            if exists.is_none() {
                return Err(RepoError::NotFound);
            }
            let c = sqlx::query_as::<_, Comment>(
                "INSERT INTO comments (post_id, author_id, content, image_url, parent_id)
                 VALUES ($1, $2, $3, $4, $5)
                 RETURNING id, post_id, author_id, content, image_url, parent_id, created_at",
            )
            .bind(post_id)
            .bind(author_id)
            .bind(&new.content)
            .bind(&new.image_url)
            .bind(new.parent_id)
            .fetch_one(&self.pool)
            .await?;
            Ok(c)
        }

        async fn update_comment(&self, id: Id, content: String) -> RepoResult<Comment> {
            let c = sqlx::query_as::<_, Comment>(
                "UPDATE comments SET content = $2 WHERE id = $1
                 RETURNING id, post_id, author_id, content, image_url, parent_id, created_at",
            )
            .bind(id)
            .bind(content)
            .fetch_one(&self.pool)
            .await?;
            Ok(c)
        }

        async fn delete_comment(&self, id: Id) -> RepoResult<()> {
            let mut tx = self.pool.begin().await?;
            sqlx::query("DELETE FROM comment_likes WHERE comment_id = $1").bind(id).execute(&mut *tx).await?;
            sqlx::query("DELETE FROM comment_helpfuls WHERE comment_id = $1").bind(id).execute(&mut *tx).await?;
            let res = sqlx::query("DELETE FROM comments WHERE id = $1").bind(id).execute(&mut *tx).await?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            tx.commit().await?;
            Ok(())
        }
    }

    #[async_trait]
    impl ReactionRepo for PgRepo {
        async fn has_reaction(&self, user_id: Id, target: ReactionTarget, kind: ReactionKind) -> RepoResult<bool> {
            let (table, col) = reaction_table(target, kind);
            let sql = format!("SELECT EXISTS (SELECT 1 FROM {table} WHERE user_id = $1 AND {col} = $2)");
            let found: bool = sqlx::query_scalar(&sql)
                .bind(user_id)
                .bind(target.id())
                .fetch_one(&self.pool)
                .await?;
            Ok(found)
        }

        async fn add_reaction(&self, user_id: Id, target: ReactionTarget, kind: ReactionKind) -> RepoResult<bool> {
            let (table, col) = reaction_table(target, kind);
            let sql = format!("INSERT INTO {table} (user_id, {col}) VALUES ($1, $2) ON CONFLICT DO NOTHING");
            let res = sqlx::query(&sql).bind(user_id).bind(target.id()).execute(&self.pool).await?;
            Ok(res.rows_affected() == 1)
        }

        async fn remove_reaction(&self, user_id: Id, target: ReactionTarget, kind: ReactionKind) -> RepoResult<bool> {
            let (table, col) = reaction_table(target, kind);
            let sql = format!("DELETE FROM {table} WHERE user_id = $1 AND {col} = $2");
            let res = sqlx::query(&sql).bind(user_id).bind(target.id()).execute(&self.pool).await?;
            Ok(res.rows_affected() == 1)
        }

        async fn count_reactions(&self, target: ReactionTarget, kind: ReactionKind) -> RepoResult<i64> {
            let (table, col) = reaction_table(target, kind);
            let sql = format!("SELECT COUNT(*) FROM {table} WHERE {col} = $1");
            let n: i64 = sqlx::query_scalar(&sql).bind(target.id()).fetch_one(&self.pool).await?;
            Ok(n)
        }
    }

    #[async_trait]
    impl SavedPostRepo for PgRepo {
        async fn save_post(&self, user_id: Id, post_id: Id) -> RepoResult<()> {
            self.get_post(post_id).await?;
            sqlx::query("INSERT INTO saved_posts (user_id, post_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
                .bind(user_id)
                .bind(post_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        }

        async fn unsave_post(&self, user_id: Id, post_id: Id) -> RepoResult<()> {
            self.get_post(post_id).await?;
            sqlx::query("DELETE FROM saved_posts WHERE user_id = $1 AND post_id = $2")
                .bind(user_id)
                .bind(post_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        }

        async fn list_saved_posts(&self, user_id: Id) -> RepoResult<Vec<PostView>> {
            let sql = format!(
                "{POST_VIEW_SELECT} JOIN saved_posts sp ON sp.post_id = p.id AND sp.user_id = $1
                 ORDER BY sp.created_at DESC"
            );
            let rows = sqlx::query_as::<_, PostViewRow>(&sql)
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;
            Ok(rows.into_iter().map(PostView::from).collect())
        }
    }

    #[async_trait]
    impl ReportRepo for PgRepo {
        async fn create_report(&self, post_id: Id, user_id: Id, reason: Option<String>) -> RepoResult<Report> {
            self.get_post(post_id).await?;
            // partial unique index (post_id, user_id) WHERE status = 'pending' turns a duplicate into Conflict
            let row = sqlx::query_as::<_, ReportRow>(
                "INSERT INTO reports (post_id, user_id, reason) VALUES ($1, $2, $3)
                 RETURNING id, post_id, user_id, reason, status, created_at",
            )
            .bind(post_id)
            .bind(user_id)
            .bind(reason)
            .fetch_one(&self.pool)
            .await?;
            Ok(Report {
                id: row.id,
                post_id: row.post_id,
                user_id: row.user_id,
                reason: row.reason,
                status: row.status.parse().map_err(RepoError::Internal)?,
                created_at: row.created_at,
            })
        }
    }

    #[async_trait]
    impl NotificationRepo for PgRepo {
        async fn create_notification(&self, new: NewNotification) -> RepoResult<Notification> {
            let row = sqlx::query_as::<_, NotificationRow>(
                "INSERT INTO notifications (user_id, kind, post_id, comment_id, from_user_id, message)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 RETURNING id, user_id, kind, post_id, comment_id, from_user_id, message, is_read, created_at",
            )
            .bind(new.user_id)
            .bind(new.kind.as_str())
            .bind(new.post_id)
            .bind(new.comment_id)
            .bind(new.from_user_id)
            .bind(&new.message)
            .fetch_one(&self.pool)
            .await?;
            row.try_into()
        }

        async fn list_notifications(&self, user_id: Id) -> RepoResult<Vec<NotificationView>> {
            let rows = sqlx::query_as::<_, NotificationViewRow>(
                "SELECT n.id, n.kind, n.post_id, n.comment_id, n.from_user_id,
                        COALESCE(u.name, 'unknown') AS from_user_name, u.avatar_url AS from_user_avatar_url,
                        n.message, n.is_read, n.created_at
                 FROM notifications n
                 LEFT JOIN users u ON u.id = n.from_user_id
                 WHERE n.user_id = $1
                 ORDER BY n.created_at DESC, n.id DESC",
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
            rows.into_iter()
                .map(|r| {
                    Ok(NotificationView {
                        id: r.id,
                        kind: r.kind.parse().map_err(RepoError::Internal)?,
                        post_id: r.post_id,
                        comment_id: r.comment_id,
                        from_user: UserSummary {
                            id: r.from_user_id,
                            name: r.from_user_name,
                            avatar_url: r.from_user_avatar_url,
                        },
                        message: r.message,
                        is_read: r.is_read,
                        created_at: r.created_at,
                    })
                })
                .collect()
        }

        async fn unread_count(&self, user_id: Id) -> RepoResult<i64> {
            let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND NOT is_read")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
            Ok(n)
        }

        async fn mark_read(&self, user_id: Id, id: Id) -> RepoResult<()> {
            let res = sqlx::query("UPDATE notifications SET is_read = TRUE WHERE id = $1 AND user_id = $2")
                .bind(id)
                .bind(user_id)
                .execute(&self.pool)
                .await?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        }

        async fn mark_all_read(&self, user_id: Id) -> RepoResult<u64> {
            let res = sqlx::query("UPDATE notifications SET is_read = TRUE WHERE user_id = $1 AND NOT is_read")
                .bind(user_id)
                .execute(&self.pool)
                .await?;
            Ok(res.rows_affected())
        }
    }
}
