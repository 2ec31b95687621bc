#![cfg(feature = "inmem-store")]

#[macro_use]
mod common;

use actix_web::test;
use common::{bearer, ctx};
use fixlog::models::{NewNotification, NotificationKind};
use fixlog::repo::NotificationRepo;
use serde_json::{json, Value};

fn notice(recipient: i64, from: i64) -> NewNotification {
    NewNotification {
        user_id: recipient,
        kind: NotificationKind::Like,
        post_id: 1,
        comment_id: None,
        from_user_id: from,
        message: "Your post was liked.".into(),
    }
}

#[actix_web::test]
async fn read_state_is_per_recipient() {
    let ctx = ctx();
    let app = init_app!(ctx.state.clone());
    let first = ctx.repo.create_notification(notice(1, 2)).await.unwrap();
    ctx.repo.create_notification(notice(1, 3)).await.unwrap();
    ctx.repo.create_notification(notice(2, 1)).await.unwrap();

    let req = test::TestRequest::get().uri("/api/notifications/unread-count").insert_header(bearer(1, "ada")).to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body, json!({"count": 2}));

    // newest first
    let req = test::TestRequest::get().uri("/api/notifications").insert_header(bearer(1, "ada")).to_request();
    let list: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(list.as_array().unwrap().len(), 2);
    assert_eq!(list[1]["id"], first.id);
    assert_eq!(list[0]["isRead"], false);

    // someone else's notification cannot be marked
    let req = test::TestRequest::post()
        .uri(&format!("/api/notifications/{}/mark-read", first.id))
        .insert_header(bearer(2, "brian"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    let req = test::TestRequest::post()
        .uri(&format!("/api/notifications/{}/mark-read", first.id))
        .insert_header(bearer(1, "ada"))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body, json!({"success": true}));
    assert_eq!(ctx.repo.unread_count(1).await.unwrap(), 1);

    let req = test::TestRequest::post().uri("/api/notifications/mark-all-read").insert_header(bearer(1, "ada")).to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body, json!({"updated": 1}));
    assert_eq!(ctx.repo.unread_count(1).await.unwrap(), 0);
    assert_eq!(ctx.repo.unread_count(2).await.unwrap(), 1);
}

#[actix_web::test]
async fn notifications_require_auth() {
    let ctx = ctx();
    let app = init_app!(ctx.state.clone());
    for uri in ["/api/notifications", "/api/notifications/unread-count"] {
        let req = test::TestRequest::get().uri(uri).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 401);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "unauthorized");
    }
}
