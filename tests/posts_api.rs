#![cfg(feature = "inmem-store")]

#[macro_use]
mod common;

use actix_web::test;
use common::{bearer, ctx};
use serde_json::{json, Value};

#[actix_web::test]
async fn post_crud_flow() {
    let ctx = ctx();
    let app = init_app!(ctx.state.clone());

    // anonymous listing starts empty
    let req = test::TestRequest::get().uri("/api/posts").to_request();
    let posts: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(posts.as_array().unwrap().len(), 0);

    // create requires a token
    let req = test::TestRequest::post()
        .uri("/api/posts")
        .set_json(json!({"title": "t", "content": "c"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    let req = test::TestRequest::post()
        .uri("/api/posts")
        .insert_header(bearer(1, "ada"))
        .set_json(json!({
            "title": "Borrow checker fights",
            "description": "E0502",
            "content": "Clone the key before the lookup.",
            "codeSnippet": "let k = key.clone();",
            "tags": [" rust ", "", "borrowck"]
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let post: Value = test::read_body_json(resp).await;
    let id = post["id"].as_i64().unwrap();
    assert_eq!(post["authorId"], 1);
    assert_eq!(post["tags"], json!(["rust", "borrowck"]));

    // single post view with author and computed counters
    let req = test::TestRequest::get().uri(&format!("/api/posts/{id}")).to_request();
    let view: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(view["author"]["name"], "ada");
    assert_eq!(view["likes"], 0);
    assert_eq!(view["commentCount"], 0);
    assert_eq!(view["liked"], false);

    // only the author may edit
    let req = test::TestRequest::put()
        .uri(&format!("/api/posts/{id}"))
        .insert_header(bearer(2, "brian"))
        .set_json(json!({"title": "mine now"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);

    let req = test::TestRequest::put()
        .uri(&format!("/api/posts/{id}"))
        .insert_header(bearer(1, "ada"))
        .set_json(json!({"title": "Borrow checker, solved"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let updated: Value = test::read_body_json(resp).await;
    assert_eq!(updated["title"], "Borrow checker, solved");
    assert_eq!(updated["content"], "Clone the key before the lookup.");

    // delete: non-owner forbidden, owner 204, then gone
    let req = test::TestRequest::delete().uri(&format!("/api/posts/{id}")).insert_header(bearer(2, "brian")).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);
    let req = test::TestRequest::delete().uri(&format!("/api/posts/{id}")).insert_header(bearer(1, "ada")).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 204);
    let req = test::TestRequest::get().uri(&format!("/api/posts/{id}")).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}

#[actix_web::test]
async fn validation_errors_are_json() {
    let ctx = ctx();
    let app = init_app!(ctx.state.clone());

    let req = test::TestRequest::post()
        .uri("/api/posts")
        .insert_header(bearer(1, "ada"))
        .set_json(json!({"title": "   ", "content": "c"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "title is required");

    // malformed JSON goes through the same error shape
    let req = test::TestRequest::post()
        .uri("/api/posts")
        .insert_header(bearer(1, "ada"))
        .insert_header(("Content-Type", "application/json"))
        .set_payload("{not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].is_string());
}

#[actix_web::test]
async fn listing_is_newest_first_with_viewer_flags() {
    let ctx = ctx();
    let app = init_app!(ctx.state.clone());

    let mut ids = Vec::new();
    for title in ["first", "second"] {
        let req = test::TestRequest::post()
            .uri("/api/posts")
            .insert_header(bearer(1, "ada"))
            .set_json(json!({"title": title, "content": "body"}))
            .to_request();
        let post: Value = test::call_and_read_body_json(&app, req).await;
        ids.push(post["id"].as_i64().unwrap());
    }

    let req = test::TestRequest::post().uri(&format!("/api/posts/{}/save", ids[0])).insert_header(bearer(2, "brian")).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    let req = test::TestRequest::get().uri("/api/posts").insert_header(bearer(2, "brian")).to_request();
    let posts: Value = test::call_and_read_body_json(&app, req).await;
    let posts = posts.as_array().unwrap();
    assert_eq!(posts[0]["title"], "second");
    assert_eq!(posts[1]["saved"], true);
    assert_eq!(posts[0]["saved"], false);

    // anonymous viewers never see flags set
    let req = test::TestRequest::get().uri("/api/posts").to_request();
    let posts: Value = test::call_and_read_body_json(&app, req).await;
    assert!(posts.as_array().unwrap().iter().all(|p| p["saved"] == false));
}

#[actix_web::test]
async fn save_unsave_and_saved_list() {
    let ctx = ctx();
    let app = init_app!(ctx.state.clone());

    let req = test::TestRequest::post()
        .uri("/api/posts")
        .insert_header(bearer(1, "ada"))
        .set_json(json!({"title": "t", "content": "c"}))
        .to_request();
    let post: Value = test::call_and_read_body_json(&app, req).await;
    let id = post["id"].as_i64().unwrap();

    for _ in 0..2 {
        let req = test::TestRequest::post().uri(&format!("/api/posts/{id}/save")).insert_header(bearer(2, "brian")).to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, json!({"saved": true}));
    }
    let req = test::TestRequest::get().uri("/api/users/me/saved-posts").insert_header(bearer(2, "brian")).to_request();
    let saved: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(saved.as_array().unwrap().len(), 1);
    assert_eq!(saved[0]["id"], id);

    let req = test::TestRequest::post().uri(&format!("/api/posts/{id}/unsave")).insert_header(bearer(2, "brian")).to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body, json!({"saved": false}));
    let req = test::TestRequest::get().uri("/api/users/me/saved-posts").insert_header(bearer(2, "brian")).to_request();
    let saved: Value = test::call_and_read_body_json(&app, req).await;
    assert!(saved.as_array().unwrap().is_empty());

    let req = test::TestRequest::post().uri("/api/posts/9999/save").insert_header(bearer(2, "brian")).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}

#[actix_web::test]
async fn reporting_twice_conflicts() {
    let ctx = ctx();
    let app = init_app!(ctx.state.clone());

    let req = test::TestRequest::post()
        .uri("/api/posts")
        .insert_header(bearer(1, "ada"))
        .set_json(json!({"title": "t", "content": "c"}))
        .to_request();
    let post: Value = test::call_and_read_body_json(&app, req).await;
    let id = post["id"].as_i64().unwrap();

    let req = test::TestRequest::post()
        .uri(&format!("/api/posts/{id}/report"))
        .insert_header(bearer(2, "brian"))
        .set_json(json!({"reason": "  spam  "}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let report: Value = test::read_body_json(resp).await;
    assert_eq!(report["status"], "pending");
    assert_eq!(report["reason"], "spam");

    // no body at all is fine, but a second pending report is not
    let req = test::TestRequest::post().uri(&format!("/api/posts/{id}/report")).insert_header(bearer(2, "brian")).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 409);

    let req = test::TestRequest::post().uri(&format!("/api/posts/{id}/report")).insert_header(bearer(3, "cleo")).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let report: Value = test::read_body_json(resp).await;
    assert!(report["reason"].is_null());

    let req = test::TestRequest::post().uri("/api/posts/9999/report").insert_header(bearer(2, "brian")).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}

#[actix_web::test]
async fn deleting_a_post_removes_its_comments() {
    let ctx = ctx();
    let app = init_app!(ctx.state.clone());

    let req = test::TestRequest::post()
        .uri("/api/posts")
        .insert_header(bearer(1, "ada"))
        .set_json(json!({"title": "t", "content": "c"}))
        .to_request();
    let post: Value = test::call_and_read_body_json(&app, req).await;
    let id = post["id"].as_i64().unwrap();

    let req = test::TestRequest::post()
        .uri(&format!("/api/comments/post/{id}"))
        .insert_header(bearer(2, "brian"))
        .set_json(json!({"content": "works for me"}))
        .to_request();
    let comment: Value = test::call_and_read_body_json(&app, req).await;
    let cid = comment["id"].as_i64().unwrap();

    let req = test::TestRequest::delete().uri(&format!("/api/posts/{id}")).insert_header(bearer(1, "ada")).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 204);

    let req = test::TestRequest::post().uri(&format!("/api/comments/{cid}/like")).insert_header(bearer(1, "ada")).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
    let req = test::TestRequest::get().uri(&format!("/api/comments/post/{id}")).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}
