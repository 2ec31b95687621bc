use crate::models::{
    Comment, CommentView, NewComment, NewPost, NewReport, Notification, NotificationKind, NotificationView, Post,
    PostView, Report, ReportStatus, UpdateComment, UpdatePost, UpdateProfile, User, UserSummary,
};
use crate::routes::{HelpfulToggled, LikeToggled, MarkedAllRead, MarkedRead, SavedState, UnreadCount, UploadResponse};
use crate::threads::ThreadNode;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::list_posts,
        crate::routes::create_post,
        crate::routes::get_post,
        crate::routes::update_post,
        crate::routes::delete_post,
        crate::routes::like_post,
        crate::routes::helpful_post,
        crate::routes::save_post,
        crate::routes::unsave_post,
        crate::routes::report_post,
        crate::routes::list_comments,
        crate::routes::comment_thread,
        crate::routes::create_comment,
        crate::routes::update_comment,
        crate::routes::delete_comment,
        crate::routes::like_comment,
        crate::routes::helpful_comment,
        crate::routes::list_notifications,
        crate::routes::unread_count,
        crate::routes::mark_all_read,
        crate::routes::mark_read,
        crate::routes::get_me,
        crate::routes::update_me,
        crate::routes::saved_posts,
        crate::routes::upload_image,
    ),
    components(schemas(
        User, UserSummary, UpdateProfile,
        Post, PostView, NewPost, UpdatePost,
        Comment, CommentView, ThreadNode, NewComment, UpdateComment,
        Notification, NotificationView, NotificationKind,
        Report, ReportStatus, NewReport,
        LikeToggled, HelpfulToggled, SavedState, UnreadCount, MarkedAllRead, MarkedRead, UploadResponse
    )),
    modifiers(&BearerScheme),
    tags(
        (name = "posts", description = "Posts, reactions, saves and reports"),
        (name = "comments", description = "Threaded comments"),
        (name = "notifications", description = "Activity on the caller's content"),
        (name = "users", description = "The caller's profile"),
        (name = "uploads", description = "Image uploads"),
    )
)]
pub struct ApiDoc;

struct BearerScheme;

impl Modify for BearerScheme {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).bearer_format("JWT").build()),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/posts",
            "/api/posts/{id}/like",
            "/api/comments/post/{post_id}/thread",
            "/api/notifications/{id}/mark-read",
            "/api/users/me/saved-posts",
            "/api/uploads",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
        let json = serde_json::to_value(&doc).unwrap();
        assert!(json["components"]["securitySchemes"]["bearer"].is_object());
    }

    #[test]
    fn thread_response_describes_nested_replies() {
        let json = serde_json::to_value(ApiDoc::openapi()).unwrap();
        let schema = &json["paths"]["/api/comments/post/{post_id}/thread"]["get"]["responses"]["200"]["content"]
            ["application/json"]["schema"];
        assert_eq!(schema["items"]["$ref"], "#/components/schemas/ThreadNode");
        assert!(json["components"]["schemas"]["ThreadNode"].to_string().contains("replies"));
    }
}
