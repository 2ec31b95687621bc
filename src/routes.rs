use std::sync::Arc;

use actix_multipart::Multipart;
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse};
use futures_util::TryStreamExt as _;
use serde::Serialize;
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use crate::auth::{AuthContext, JwtKeys};
use crate::error::ApiError;
use crate::models::*;
use crate::notify;
use crate::ownership;
use crate::rate_limit::{Action, RateLimiterFacade};
use crate::reactions;
use crate::repo::{Repo, RepoError};
use crate::storage::{self, ImageStore, ImageStoreError};
use crate::threads::{self, CommentTree, ThreadNode};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        ApiError::validation(err.to_string()).into()
    }));
    cfg.service(
        web::scope("/api")
            .service(
                web::resource("/posts")
                    .route(web::get().to(list_posts))
                    .route(web::post().to(create_post)),
            )
            .service(
                web::resource("/posts/{id}")
                    .route(web::get().to(get_post))
                    .route(web::put().to(update_post))
                    .route(web::delete().to(delete_post)),
            )
            .service(web::resource("/posts/{id}/like").route(web::post().to(like_post)))
            .service(web::resource("/posts/{id}/helpful").route(web::post().to(helpful_post)))
            .service(web::resource("/posts/{id}/save").route(web::post().to(save_post)))
            .service(web::resource("/posts/{id}/unsave").route(web::post().to(unsave_post)))
            .service(web::resource("/posts/{id}/report").route(web::post().to(report_post)))
            .service(
                web::resource("/comments/post/{post_id}")
                    .route(web::get().to(list_comments))
                    .route(web::post().to(create_comment)),
            )
            .service(web::resource("/comments/post/{post_id}/thread").route(web::get().to(comment_thread)))
            .service(
                web::resource("/comments/{id}")
                    .route(web::put().to(update_comment))
                    .route(web::delete().to(delete_comment)),
            )
            .service(web::resource("/comments/{id}/like").route(web::post().to(like_comment)))
            .service(web::resource("/comments/{id}/helpful").route(web::post().to(helpful_comment)))
            .service(web::resource("/notifications").route(web::get().to(list_notifications)))
            .service(web::resource("/notifications/unread-count").route(web::get().to(unread_count)))
            .service(web::resource("/notifications/mark-all-read").route(web::post().to(mark_all_read)))
            .service(web::resource("/notifications/{id}/mark-read").route(web::post().to(mark_read)))
            .service(
                web::resource("/users/me")
                    .route(web::get().to(get_me))
                    .route(web::put().to(update_me)),
            )
            .service(web::resource("/users/me/saved-posts").route(web::get().to(saved_posts)))
            .service(web::resource("/uploads").route(web::post().to(upload_image))),
    );
    // outside /api so <img src="/uploads/{hash}"> works
    cfg.route("/uploads/{hash}", web::get().to(get_image));
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub image_store: Arc<dyn ImageStore>,
    pub jwt: Arc<JwtKeys>,
    /// `None` disables rate limiting entirely.
    pub rate_limiter: Option<RateLimiterFacade>,
}

fn check_rate(data: &AppState, action: Action, user_id: Id) -> Result<(), ApiError> {
    match &data.rate_limiter {
        Some(rl) if !rl.allow(action, user_id) => {
            tracing::warn!(user_id, ?action, "rate limited");
            Err(ApiError::TooManyRequests)
        }
        _ => Ok(()),
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LikeToggled {
    pub liked: bool,
    pub count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HelpfulToggled {
    pub helpful: bool,
    pub count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SavedState {
    pub saved: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UnreadCount {
    pub count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MarkedAllRead {
    pub updated: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MarkedRead {
    pub success: bool,
}

// ---------------- posts -----------------------------------------------

#[utoipa::path(
    get,
    path = "/api/posts",
    tag = "posts",
    responses((status = 200, description = "All posts, newest first", body = [PostView]))
)]
pub async fn list_posts(auth: Option<AuthContext>, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let viewer = auth.map(|a| a.user_id());
    let posts = data.repo.list_posts(viewer).await?;
    Ok(HttpResponse::Ok().json(posts))
}

#[utoipa::path(
    post,
    path = "/api/posts",
    tag = "posts",
    request_body = NewPost,
    responses(
        (status = 201, description = "Post created", body = Post),
        (status = 400, description = "Missing title or content"),
        (status = 401, description = "Unauthorized"),
        (status = 429, description = "Too many posts")
    )
)]
pub async fn create_post(
    auth: AuthContext,
    data: web::Data<AppState>,
    payload: web::Json<NewPost>,
) -> Result<HttpResponse, ApiError> {
    check_rate(&data, Action::Post, auth.user_id())?;
    let new = payload.into_inner().normalize()?;
    let post = data.repo.create_post(auth.user_id(), new).await?;
    tracing::info!(post_id = post.id, author_id = post.author_id, "post created");
    Ok(HttpResponse::Created().json(post))
}

#[utoipa::path(
    get,
    path = "/api/posts/{id}",
    tag = "posts",
    params(("id" = i64, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post", body = PostView),
        (status = 404, description = "Post not found")
    )
)]
pub async fn get_post(
    auth: Option<AuthContext>,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let viewer = auth.map(|a| a.user_id());
    let post = data.repo.get_post_view(path.into_inner(), viewer).await?;
    Ok(HttpResponse::Ok().json(post))
}

#[utoipa::path(
    put,
    path = "/api/posts/{id}",
    tag = "posts",
    params(("id" = i64, Path, description = "Post id")),
    request_body = UpdatePost,
    responses(
        (status = 200, description = "Post updated", body = Post),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn update_post(
    auth: AuthContext,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdatePost>,
) -> Result<HttpResponse, ApiError> {
    let post = ownership::update_post(&*data.repo, path.into_inner(), auth.user_id(), payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(post))
}

#[utoipa::path(
    delete,
    path = "/api/posts/{id}",
    tag = "posts",
    params(("id" = i64, Path, description = "Post id")),
    responses(
        (status = 204, description = "Post and everything hanging off it deleted"),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn delete_post(auth: AuthContext, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    ownership::delete_post(&*data.repo, path.into_inner(), auth.user_id()).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    post,
    path = "/api/posts/{id}/like",
    tag = "posts",
    params(("id" = i64, Path, description = "Post id")),
    responses((status = 200, description = "OK", body = LikeToggled), (status = 404, description = "Post not found"))
)]
pub async fn like_post(auth: AuthContext, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let out = reactions::toggle(&*data.repo, auth.user_id(), ReactionTarget::Post(path.into_inner()), ReactionKind::Like).await?;
    Ok(HttpResponse::Ok().json(LikeToggled { liked: out.active, count: out.count }))
}

#[utoipa::path(
    post,
    path = "/api/posts/{id}/helpful",
    tag = "posts",
    params(("id" = i64, Path, description = "Post id")),
    responses((status = 200, description = "OK", body = HelpfulToggled), (status = 404, description = "Post not found"))
)]
pub async fn helpful_post(auth: AuthContext, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let out = reactions::toggle(&*data.repo, auth.user_id(), ReactionTarget::Post(path.into_inner()), ReactionKind::Helpful).await?;
    Ok(HttpResponse::Ok().json(HelpfulToggled { helpful: out.active, count: out.count }))
}

#[utoipa::path(
    post,
    path = "/api/posts/{id}/save",
    tag = "posts",
    params(("id" = i64, Path, description = "Post id")),
    responses((status = 200, description = "OK", body = SavedState), (status = 404, description = "Post not found"))
)]
pub async fn save_post(auth: AuthContext, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    data.repo.save_post(auth.user_id(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(SavedState { saved: true }))
}

#[utoipa::path(
    post,
    path = "/api/posts/{id}/unsave",
    tag = "posts",
    params(("id" = i64, Path, description = "Post id")),
    responses((status = 200, description = "OK", body = SavedState), (status = 404, description = "Post not found"))
)]
pub async fn unsave_post(auth: AuthContext, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    data.repo.unsave_post(auth.user_id(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(SavedState { saved: false }))
}

#[utoipa::path(
    post,
    path = "/api/posts/{id}/report",
    tag = "posts",
    params(("id" = i64, Path, description = "Post id")),
    request_body(content = NewReport, description = "Optional; the reason may be omitted"),
    responses(
        (status = 201, description = "Report filed", body = Report),
        (status = 404, description = "Post not found"),
        (status = 409, description = "A pending report already exists")
    )
)]
pub async fn report_post(
    auth: AuthContext,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: Option<web::Json<NewReport>>,
) -> Result<HttpResponse, ApiError> {
    check_rate(&data, Action::Report, auth.user_id())?;
    let reason = payload
        .and_then(|p| p.into_inner().reason)
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty());
    let report = data.repo.create_report(path.into_inner(), auth.user_id(), reason).await.map_err(|e| match e {
        RepoError::Conflict => ApiError::Conflict("post already reported".into()),
        other => other.into(),
    })?;
    tracing::info!(report_id = report.id, post_id = report.post_id, user_id = report.user_id, "post reported");
    Ok(HttpResponse::Created().json(report))
}

// ---------------- comments --------------------------------------------

#[utoipa::path(
    get,
    path = "/api/comments/post/{post_id}",
    tag = "comments",
    params(("post_id" = i64, Path, description = "Post id")),
    responses(
        (status = 200, description = "Flat listing, top-level comments first; empty for an unknown post", body = [CommentView])
    )
)]
pub async fn list_comments(
    auth: Option<AuthContext>,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let post_id = path.into_inner();
    let comments = data.repo.list_comments(post_id, auth.map(|a| a.user_id())).await?;
    Ok(HttpResponse::Ok().json(comments))
}

#[utoipa::path(
    get,
    path = "/api/comments/post/{post_id}/thread",
    tag = "comments",
    params(("post_id" = i64, Path, description = "Post id")),
    responses(
        (status = 200, description = "Comments nested under their parents; empty for an unknown post", body = [ThreadNode])
    )
)]
pub async fn comment_thread(
    auth: Option<AuthContext>,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let post_id = path.into_inner();
    let flat = data.repo.list_comments(post_id, auth.map(|a| a.user_id())).await?;
    Ok(HttpResponse::Ok().json(CommentTree::build(&flat).nested()))
}

#[utoipa::path(
    post,
    path = "/api/comments/post/{post_id}",
    tag = "comments",
    params(("post_id" = i64, Path, description = "Post id")),
    request_body = NewComment,
    responses(
        (status = 201, description = "Comment created", body = CommentView),
        (status = 400, description = "Empty content or bad parent"),
        (status = 404, description = "Post not found"),
        (status = 429, description = "Too many comments")
    )
)]
pub async fn create_comment(
    auth: AuthContext,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<NewComment>,
) -> Result<HttpResponse, ApiError> {
    let post_id = path.into_inner();
    let user_id = auth.user_id();
    check_rate(&data, Action::Comment, user_id)?;
    let new = payload.into_inner();
    new.validate()?;
    let post = data.repo.get_post(post_id).await?;
    threads::validate_parent(&*data.repo, post_id, new.parent_id).await?;

    let comment = data.repo.create_comment(post_id, user_id, new).await?;
    tracing::info!(comment_id = comment.id, post_id, user_id, parent_id = ?comment.parent_id, "comment created");
    if post.author_id != user_id {
        notify::emit(&*data.repo, notify::comment_notice(post.author_id, post_id, comment.id, user_id)).await;
    }
    let view = data.repo.get_comment_view(comment.id, Some(user_id)).await?;
    Ok(HttpResponse::Created().json(view))
}

#[utoipa::path(
    put,
    path = "/api/comments/{id}",
    tag = "comments",
    params(("id" = i64, Path, description = "Comment id")),
    request_body = UpdateComment,
    responses(
        (status = 200, description = "Comment updated", body = CommentView),
        (status = 400, description = "Empty content"),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Comment not found")
    )
)]
pub async fn update_comment(
    auth: AuthContext,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdateComment>,
) -> Result<HttpResponse, ApiError> {
    let upd = payload.into_inner();
    upd.validate()?;
    let comment = ownership::update_comment(&*data.repo, path.into_inner(), auth.user_id(), upd.content).await?;
    let view = data.repo.get_comment_view(comment.id, Some(auth.user_id())).await?;
    Ok(HttpResponse::Ok().json(view))
}

#[utoipa::path(
    delete,
    path = "/api/comments/{id}",
    tag = "comments",
    params(("id" = i64, Path, description = "Comment id")),
    responses(
        (status = 204, description = "Comment deleted; replies are kept"),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Comment not found")
    )
)]
pub async fn delete_comment(auth: AuthContext, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    ownership::delete_comment(&*data.repo, path.into_inner(), auth.user_id()).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    post,
    path = "/api/comments/{id}/like",
    tag = "comments",
    params(("id" = i64, Path, description = "Comment id")),
    responses((status = 200, description = "OK", body = LikeToggled), (status = 404, description = "Comment not found"))
)]
pub async fn like_comment(auth: AuthContext, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let out = reactions::toggle(&*data.repo, auth.user_id(), ReactionTarget::Comment(path.into_inner()), ReactionKind::Like).await?;
    Ok(HttpResponse::Ok().json(LikeToggled { liked: out.active, count: out.count }))
}

#[utoipa::path(
    post,
    path = "/api/comments/{id}/helpful",
    tag = "comments",
    params(("id" = i64, Path, description = "Comment id")),
    responses((status = 200, description = "OK", body = HelpfulToggled), (status = 404, description = "Comment not found"))
)]
pub async fn helpful_comment(auth: AuthContext, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let out = reactions::toggle(&*data.repo, auth.user_id(), ReactionTarget::Comment(path.into_inner()), ReactionKind::Helpful).await?;
    Ok(HttpResponse::Ok().json(HelpfulToggled { helpful: out.active, count: out.count }))
}

// ---------------- notifications ---------------------------------------

#[utoipa::path(
    get,
    path = "/api/notifications",
    tag = "notifications",
    responses((status = 200, description = "Caller's notifications, newest first", body = [NotificationView]))
)]
pub async fn list_notifications(auth: AuthContext, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(data.repo.list_notifications(auth.user_id()).await?))
}

#[utoipa::path(
    get,
    path = "/api/notifications/unread-count",
    tag = "notifications",
    responses((status = 200, description = "OK", body = UnreadCount))
)]
pub async fn unread_count(auth: AuthContext, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let count = data.repo.unread_count(auth.user_id()).await?;
    Ok(HttpResponse::Ok().json(UnreadCount { count }))
}

#[utoipa::path(
    post,
    path = "/api/notifications/mark-all-read",
    tag = "notifications",
    responses((status = 200, description = "OK", body = MarkedAllRead))
)]
pub async fn mark_all_read(auth: AuthContext, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let updated = data.repo.mark_all_read(auth.user_id()).await?;
    Ok(HttpResponse::Ok().json(MarkedAllRead { updated }))
}

#[utoipa::path(
    post,
    path = "/api/notifications/{id}/mark-read",
    tag = "notifications",
    params(("id" = i64, Path, description = "Notification id")),
    responses((status = 200, description = "OK", body = MarkedRead), (status = 404, description = "No such notification for the caller"))
)]
pub async fn mark_read(auth: AuthContext, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    data.repo.mark_read(auth.user_id(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(MarkedRead { success: true }))
}

// ---------------- users -----------------------------------------------

#[utoipa::path(
    get,
    path = "/api/users/me",
    tag = "users",
    responses((status = 200, description = "OK", body = User), (status = 401, description = "Unauthorized"))
)]
pub async fn get_me(auth: AuthContext) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(auth.user))
}

#[utoipa::path(
    put,
    path = "/api/users/me",
    tag = "users",
    request_body = UpdateProfile,
    responses((status = 200, description = "OK", body = User), (status = 400, description = "Blank name"))
)]
pub async fn update_me(
    auth: AuthContext,
    data: web::Data<AppState>,
    payload: web::Json<UpdateProfile>,
) -> Result<HttpResponse, ApiError> {
    let mut upd = payload.into_inner();
    upd.validate()?;
    upd.name = upd.name.map(|n| n.trim().to_string());
    let user = data.repo.update_profile(auth.user_id(), upd).await?;
    Ok(HttpResponse::Ok().json(user))
}

#[utoipa::path(
    get,
    path = "/api/users/me/saved-posts",
    tag = "users",
    responses((status = 200, description = "Saved posts, most recently saved first", body = [PostView]))
)]
pub async fn saved_posts(auth: AuthContext, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(data.repo.list_saved_posts(auth.user_id()).await?))
}

// ---------------- uploads ---------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadResponse {
    /// Where the image is served from; store this as `imageUrl`.
    pub url: String,
    pub mime: String,
    pub size: usize,
    /// The same bytes were uploaded before.
    pub duplicate: bool,
}

pub const IMAGE_SIZE_LIMIT: usize = 10 * 1024 * 1024; // 10 MiB

const ALLOWED_MIME: &[&str] = &["image/png", "image/jpeg", "image/gif", "image/webp"];

#[utoipa::path(
    post,
    path = "/api/uploads",
    tag = "uploads",
    responses(
        (status = 201, description = "Image stored (new)", body = UploadResponse),
        (status = 200, description = "Image already existed", body = UploadResponse),
        (status = 400, description = "No `file` field"),
        (status = 413, description = "Payload too large"),
        (status = 415, description = "Unsupported media type")
    )
)]
pub async fn upload_image(
    auth: AuthContext,
    data: web::Data<AppState>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    check_rate(&data, Action::Upload, auth.user_id())?;
    while let Some(mut field) = payload.try_next().await.map_err(|e| {
        tracing::warn!(error = %e, "multipart error");
        ApiError::validation("malformed multipart body")
    })? {
        if field.content_disposition().get_name() != Some("file") {
            continue;
        }
        let mut bytes: Vec<u8> = Vec::new();
        let mut hasher = Sha256::new();
        while let Some(chunk) = field.try_next().await.map_err(|e| {
            tracing::warn!(error = %e, "upload stream error");
            ApiError::validation("malformed multipart body")
        })? {
            if bytes.len() + chunk.len() > IMAGE_SIZE_LIMIT {
                return Err(ApiError::PayloadTooLarge);
            }
            hasher.update(&chunk);
            bytes.extend_from_slice(&chunk);
        }
        let hash = format!("{:x}", hasher.finalize());
        let mime = infer::get(&bytes)
            .map(|t| t.mime_type().to_string())
            .unwrap_or_else(|| "application/octet-stream".into());
        if !ALLOWED_MIME.contains(&mime.as_str()) {
            return Err(ApiError::UnsupportedMediaType);
        }
        let (status, duplicate) = match data.image_store.save(&hash, &mime, &bytes).await {
            Ok(()) => (StatusCode::CREATED, false),
            Err(ImageStoreError::Duplicate) => (StatusCode::OK, true),
            Err(e) => {
                tracing::error!(error = %e, %hash, "image store save failed");
                return Err(ApiError::Internal);
            }
        };
        tracing::info!(user_id = auth.user_id(), %hash, %mime, size = bytes.len(), duplicate, "image uploaded");
        let resp = UploadResponse { url: storage::public_url(&hash), mime, size: bytes.len(), duplicate };
        return Ok(HttpResponse::build(status).json(resp));
    }
    Err(ApiError::validation("multipart field `file` is required"))
}

pub async fn get_image(data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let hash = path.into_inner();
    if !storage::is_valid_hash(&hash) {
        return Err(ApiError::NotFound);
    }
    match data.image_store.load(&hash).await {
        Ok((bytes, mime)) => Ok(HttpResponse::Ok()
            .insert_header(("Content-Type", mime))
            .insert_header(("Cache-Control", "public, max-age=31536000, immutable"))
            .body(bytes)),
        Err(ImageStoreError::NotFound) => Err(ApiError::NotFound),
        Err(e) => {
            tracing::error!(error = %e, %hash, "image store load failed");
            Err(ApiError::Internal)
        }
    }
}
