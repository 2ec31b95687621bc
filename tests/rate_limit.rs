#![cfg(feature = "inmem-store")]

#[macro_use]
mod common;

use actix_web::test;
use common::{bearer, ctx_with_limits};
use fixlog::rate_limit::RateLimitConfig;
use serde_json::{json, Value};
use std::time::Duration;

fn tight() -> RateLimitConfig {
    let w = Duration::from_secs(300);
    RateLimitConfig {
        post_limit: 1,
        post_window: w,
        comment_limit: 2,
        comment_window: w,
        report_limit: 100,
        report_window: w,
        upload_limit: 100,
        upload_window: w,
    }
}

#[actix_web::test]
async fn rate_limit_post_creation() {
    let ctx = ctx_with_limits(tight());
    let app = init_app!(ctx.state.clone());

    let req = test::TestRequest::post()
        .uri("/api/posts")
        .insert_header(bearer(1, "ada"))
        .set_json(json!({"title": "S1", "content": "B1"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 201, "first post allowed");

    let req = test::TestRequest::post()
        .uri("/api/posts")
        .insert_header(bearer(1, "ada"))
        .set_json(json!({"title": "S2", "content": "B2"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 429, "second post should be rate limited");
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "too many requests");

    // budgets are per user
    let req = test::TestRequest::post()
        .uri("/api/posts")
        .insert_header(bearer(2, "brian"))
        .set_json(json!({"title": "S3", "content": "B3"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 201);
}

#[actix_web::test]
async fn rate_limit_comment_creation() {
    let ctx = ctx_with_limits(tight());
    let app = init_app!(ctx.state.clone());

    let req = test::TestRequest::post()
        .uri("/api/posts")
        .insert_header(bearer(1, "ada"))
        .set_json(json!({"title": "S1", "content": "B1"}))
        .to_request();
    let post: Value = test::call_and_read_body_json(&app, req).await;
    let uri = format!("/api/comments/post/{}", post["id"]);

    let statuses: Vec<u16> = {
        let mut v = Vec::new();
        for i in 0..3 {
            let req = test::TestRequest::post()
                .uri(&uri)
                .insert_header(bearer(2, "brian"))
                .set_json(json!({"content": format!("c{i}")}))
                .to_request();
            v.push(test::call_service(&app, req).await.status().as_u16());
        }
        v
    };
    assert_eq!(statuses, vec![201, 201, 429]);
}
