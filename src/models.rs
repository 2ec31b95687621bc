use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ApiError;

pub type Id = i64;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Id,
    pub name: String,
    pub country: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Author / actor reference embedded in views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Id,
    pub name: String,
    pub avatar_url: Option<String>,
}

impl From<&User> for UserSummary {
    fn from(u: &User) -> Self {
        UserSummary { id: u.id, name: u.name.clone(), avatar_url: u.avatar_url.clone() }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfile {
    pub name: Option<String>,
    pub country: Option<String>,
    pub avatar_url: Option<String>,
}

impl UpdateProfile {
    pub fn validate(&self) -> Result<(), ApiError> {
        match &self.name {
            Some(n) if n.trim().is_empty() => Err(ApiError::validation("name must not be blank")),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Id,
    pub title: String,
    pub description: String,
    pub content: String,
    pub code_snippet: Option<String>,
    pub tags: Vec<String>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub author_id: Id,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewPost {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub content: String,
    pub code_snippet: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub image_url: Option<String>,
}

impl NewPost {
    /// Checks required fields and canonicalises tags (trimmed, blanks dropped, order kept).
    pub fn normalize(mut self) -> Result<Self, ApiError> {
        if self.title.trim().is_empty() {
            return Err(ApiError::validation("title is required"));
        }
        if self.content.trim().is_empty() {
            return Err(ApiError::validation("content is required"));
        }
        self.tags = normalize_tags(self.tags);
        self.code_snippet = self.code_snippet.filter(|s| !s.trim().is_empty());
        Ok(self)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePost {
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub code_snippet: Option<String>,
    pub tags: Option<Vec<String>>,
    pub image_url: Option<String>,
}

impl UpdatePost {
    pub fn normalize(mut self) -> Result<Self, ApiError> {
        if matches!(&self.title, Some(t) if t.trim().is_empty()) {
            return Err(ApiError::validation("title must not be blank"));
        }
        if matches!(&self.content, Some(c) if c.trim().is_empty()) {
            return Err(ApiError::validation("content must not be blank"));
        }
        self.tags = self.tags.map(normalize_tags);
        Ok(self)
    }
}

fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub id: Id,
    pub title: String,
    pub description: String,
    pub content: String,
    pub code_snippet: Option<String>,
    pub tags: Vec<String>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub author: UserSummary,
    pub likes: i64,
    pub helpful_count: i64,
    pub comment_count: i64,
    pub liked: bool,
    pub helpful: bool,
    pub saved: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: Id,
    pub post_id: Id,
    pub author_id: Id,
    pub content: String,
    pub image_url: Option<String>,
    pub parent_id: Option<Id>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    #[serde(default)]
    pub content: String,
    pub parent_id: Option<Id>,
    pub image_url: Option<String>,
}

impl NewComment {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.content.trim().is_empty() {
            return Err(ApiError::validation("content is required"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateComment {
    #[serde(default)]
    pub content: String,
}

impl UpdateComment {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.content.trim().is_empty() {
            return Err(ApiError::validation("content is required"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: Id,
    pub post_id: Id,
    pub author: UserSummary,
    pub content: String,
    pub image_url: Option<String>,
    pub parent_id: Option<Id>,
    pub created_at: DateTime<Utc>,
    pub liked: bool,
    pub helpful: bool,
    pub like_count: i64,
    pub helpful_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReactionTarget {
    Post(Id),
    Comment(Id),
}

impl ReactionTarget {
    pub fn id(&self) -> Id {
        match *self {
            ReactionTarget::Post(id) | ReactionTarget::Comment(id) => id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReactionKind {
    Like,
    Helpful,
}

/// Result of a like/helpful toggle: whether the caller's reaction is now set, and the live total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleOutcome {
    pub active: bool,
    pub count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Comment,
    CommentLike,
    CommentHelpful,
    Like,
    Helpful,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Comment => "comment",
            NotificationKind::CommentLike => "comment_like",
            NotificationKind::CommentHelpful => "comment_helpful",
            NotificationKind::Like => "like",
            NotificationKind::Helpful => "helpful",
        }
    }
}

impl FromStr for NotificationKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "comment" => Ok(NotificationKind::Comment),
            "comment_like" => Ok(NotificationKind::CommentLike),
            "comment_helpful" => Ok(NotificationKind::CommentHelpful),
            "like" => Ok(NotificationKind::Like),
            "helpful" => Ok(NotificationKind::Helpful),
            other => Err(format!("unknown notification type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Id,
    pub user_id: Id,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub post_id: Id,
    pub comment_id: Option<Id>,
    pub from_user_id: Id,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationView {
    pub id: Id,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub post_id: Id,
    pub comment_id: Option<Id>,
    pub from_user: UserSummary,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub user_id: Id,
    pub kind: NotificationKind,
    pub post_id: Id,
    pub comment_id: Option<Id>,
    pub from_user_id: Id,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pending,
    Resolved,
}

impl FromStr for ReportStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReportStatus::Pending),
            "resolved" => Ok(ReportStatus::Resolved),
            other => Err(format!("unknown report status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: Id,
    pub post_id: Id,
    pub user_id: Id,
    pub reason: Option<String>,
    pub status: ReportStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct NewReport {
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_post_requires_title_and_content() {
        let missing_title = NewPost { content: "fix".into(), ..Default::default() };
        assert!(matches!(missing_title.normalize(), Err(ApiError::Validation(_))));

        let blank_content = NewPost { title: "t".into(), content: "  ".into(), ..Default::default() };
        assert!(matches!(blank_content.normalize(), Err(ApiError::Validation(_))));
    }

    #[test]
    fn tags_are_trimmed_and_blank_ones_dropped() {
        let p = NewPost {
            title: "borrowck".into(),
            content: "clone it".into(),
            tags: vec![" rust ".into(), "".into(), "lifetimes".into(), "   ".into()],
            code_snippet: Some(" ".into()),
            ..Default::default()
        }
        .normalize()
        .unwrap();
        assert_eq!(p.tags, vec!["rust", "lifetimes"]);
        assert!(p.code_snippet.is_none());
    }

    #[test]
    fn notification_kind_wire_names() {
        for kind in [
            NotificationKind::Comment,
            NotificationKind::CommentLike,
            NotificationKind::CommentHelpful,
            NotificationKind::Like,
            NotificationKind::Helpful,
        ] {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, kind.as_str());
            assert_eq!(kind.as_str().parse::<NotificationKind>().unwrap(), kind);
        }
    }

    #[test]
    fn report_status_reads_stored_text() {
        let status: ReportStatus = "pending".parse().unwrap();
        assert_eq!(status, ReportStatus::Pending);
        assert_eq!(serde_json::to_value(status).unwrap(), "pending");
        assert!("open".parse::<ReportStatus>().is_err());
    }

    #[test]
    fn comment_view_uses_camel_case() {
        let v = CommentView {
            id: 1,
            post_id: 2,
            author: UserSummary { id: 3, name: "ada".into(), avatar_url: None },
            content: "hi".into(),
            image_url: None,
            parent_id: None,
            created_at: Utc::now(),
            liked: false,
            helpful: false,
            like_count: 0,
            helpful_count: 0,
        };
        let json = serde_json::to_value(&v).unwrap();
        assert!(json.get("parentId").is_some());
        assert!(json.get("likeCount").is_some());
        assert_eq!(json["author"]["name"], "ada");
    }
}
